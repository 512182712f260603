//! Adapters so a sink can sit behind an ordinary `io::Write` front end such as
//! `tracing_subscriber::fmt`.
//!
//! Every `write` call is taken to carry whole records: the buffer is split on
//! newlines and each line is queued on its own, so formatters that emit one
//! newline-terminated event per call map one event to one line. `flush` writes
//! the queue out synchronously, like [`RotatingFileSink::flush`].

use {crate::RotatingFileSink, std::io};

#[allow(clippy::io_other_error)]
impl io::Write for RotatingFileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        for line in text.lines() {
            self.shared.push(line.to_owned());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.shared
            .flush()
            .map(|_| ())
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))
    }
}

#[cfg(feature = "tracing-subscriber")]
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingFileSink {
    type Writer = RotatingFileSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
