//! In-memory buffer of formatted lines waiting for the next flush.

use parking_lot::Mutex;

/// An unbounded, thread-safe FIFO of log lines.
///
/// Pushing only takes a short-lived mutex and never touches the filesystem,
/// so producers are never held up by a slow disk or a contended cleanup lock.
#[derive(Debug, Default)]
pub struct LineQueue {
    lines: Mutex<Vec<String>>,
}

impl LineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line to the tail of the queue.
    pub fn push(&self, line: String) {
        self.lines.lock().push(line);
    }

    /// Remove and return every queued line in the order it was pushed.
    ///
    /// Returns an empty `Vec` straight away when nothing is queued.
    pub fn drain_all(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{sync::Arc, thread},
    };

    #[test]
    fn drain_returns_lines_in_push_order() {
        let queue = LineQueue::new();
        queue.push("a".to_string());
        queue.push("b".to_string());
        queue.push("c".to_string());

        assert_eq!(queue.drain_all(), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_on_empty_queue_is_immediate() {
        let queue = LineQueue::new();
        assert!(queue.drain_all().is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn concurrent_pushes_keep_per_thread_order() {
        let queue = Arc::new(LineQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..500 {
                        queue.push(format!("{t}:{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let lines = queue.drain_all();
        assert_eq!(lines.len(), 2000);
        for t in 0..4 {
            let seen: Vec<usize> = lines
                .iter()
                .filter_map(|l| l.strip_prefix(&format!("{t}:")))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(seen, (0..500).collect::<Vec<_>>());
        }
    }
}
