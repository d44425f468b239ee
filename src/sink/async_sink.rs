//! Asynchronous sink decorator: a bounded FIFO plus one consumer thread
//! in front of any inner sink, decoupling slow destinations (file,
//! network) from fast producers.
//!
//! Ordering: entries from a single producer are delivered FIFO;
//! cross-producer order is the enqueue order established under the queue
//! lock.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::entry::LogEntry;

use super::{Sink, SinkCore};

/// What to do when the bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Park the producer until space frees or shutdown (backpressure).
    Block,
    /// Evict the oldest queued entry to make room.
    DropOldest,
    /// Drop the incoming entry (default).
    DropNewest,
}

/// Configuration for [`AsyncSink`].
#[derive(Debug, Clone)]
pub struct AsyncOptions {
    pub queue_size: usize,
    pub overflow_policy: OverflowPolicy,
    /// Periodic consumer wake-up in milliseconds; 0 = drain on signal
    /// only.
    pub flush_interval_ms: u64,
}

impl Default for AsyncOptions {
    fn default() -> Self {
        AsyncOptions {
            queue_size: 8192,
            overflow_policy: OverflowPolicy::DropNewest,
            flush_interval_ms: 0,
        }
    }
}

struct QueueInner {
    entries: VecDeque<LogEntry>,
    stopped: bool,
}

/// Bounded FIFO shared between producers and the consumer thread.
struct BoundedQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl BoundedQueue {
    fn new(capacity: usize) -> Self {
        BoundedQueue {
            inner: Mutex::new(QueueInner {
                entries: VecDeque::new(),
                stopped: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false if the entry was dropped (policy or shutdown).
    fn push(&self, entry: LogEntry, policy: OverflowPolicy) -> bool {
        let mut inner = self.inner.lock();
        if inner.stopped {
            return false;
        }
        if inner.entries.len() >= self.capacity {
            match policy {
                OverflowPolicy::Block => {
                    self.not_full
                        .wait_while(&mut inner, |q| q.entries.len() >= self.capacity && !q.stopped);
                    if inner.stopped {
                        return false;
                    }
                }
                OverflowPolicy::DropOldest => {
                    inner.entries.pop_front();
                }
                OverflowPolicy::DropNewest => return false,
            }
        }
        inner.entries.push_back(entry);
        self.not_empty.notify_one();
        true
    }

    fn drain(&self, out: &mut Vec<LogEntry>) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        out.reserve(count);
        out.extend(inner.entries.drain(..));
        if count > 0 {
            self.not_full.notify_all();
        }
        count
    }

    fn wait_for_data(&self, timeout: Option<Duration>) {
        let mut inner = self.inner.lock();
        match timeout {
            Some(t) => {
                let _ = self
                    .not_empty
                    .wait_while_for(&mut inner, |q| q.entries.is_empty() && !q.stopped, t);
            }
            None => {
                self.not_empty
                    .wait_while(&mut inner, |q| q.entries.is_empty() && !q.stopped);
            }
        }
    }

    fn wake(&self) {
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

/// Decorator wrapping an inner sink with a bounded queue and a dedicated
/// consumer thread. The decorator's own [`SinkCore`] carries the filter
/// chain the logger evaluates; the inner sink formats and writes.
pub struct AsyncSink<S: Sink + 'static> {
    core: SinkCore,
    inner: Arc<S>,
    queue: Arc<BoundedQueue>,
    running: Arc<AtomicBool>,
    opts: AsyncOptions,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Sink + 'static> AsyncSink<S> {
    pub fn new(inner: S) -> Self {
        AsyncSink::with_options(AsyncOptions::default(), inner)
    }

    pub fn with_options(opts: AsyncOptions, inner: S) -> Self {
        let inner = Arc::new(inner);
        let queue = Arc::new(BoundedQueue::new(opts.queue_size));
        let running = Arc::new(AtomicBool::new(true));

        let worker = {
            let inner = Arc::clone(&inner);
            let queue = Arc::clone(&queue);
            let running = Arc::clone(&running);
            let interval = opts.flush_interval_ms;
            std::thread::Builder::new()
                .name("lunar-log-async".to_string())
                .spawn(move || consumer_loop(inner, queue, running, interval))
                .expect("failed to spawn async sink consumer")
        };

        AsyncSink {
            core: SinkCore::new(),
            inner,
            queue,
            running,
            opts,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Access the inner sink (for inspection and tests).
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn consumer_loop<S: Sink>(
    inner: Arc<S>,
    queue: Arc<BoundedQueue>,
    running: Arc<AtomicBool>,
    interval_ms: u64,
) {
    let mut batch = Vec::new();
    while running.load(Ordering::Acquire) {
        batch.clear();
        let timeout = if interval_ms > 0 {
            Some(Duration::from_millis(interval_ms))
        } else {
            None
        };
        queue.wait_for_data(timeout);
        queue.drain(&mut batch);
        for entry in &batch {
            let _ = catch_unwind(AssertUnwindSafe(|| inner.write(entry)));
        }
    }

    // Final drain after the stop signal.
    batch.clear();
    queue.drain(&mut batch);
    for entry in &batch {
        let _ = catch_unwind(AssertUnwindSafe(|| inner.write(entry)));
    }
}

impl<S: Sink + 'static> Sink for AsyncSink<S> {
    fn core(&self) -> &SinkCore {
        &self.core
    }

    /// Clone the entry and enqueue it under the configured overflow
    /// policy.
    fn write(&self, entry: &LogEntry) {
        self.queue.push(entry.clone(), self.opts.overflow_policy);
    }

    /// Wake the consumer and wait until the queue is empty, plus a small
    /// settling delay for the write in flight.
    fn flush(&self) {
        self.queue.wake();
        while !self.queue.is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(5));
        self.inner.flush();
    }
}

impl<S: Sink + 'static> Drop for AsyncSink<S> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.queue.stop();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        // Synchronously deliver anything that raced past the consumer.
        let mut residual = Vec::new();
        self.queue.drain(&mut residual);
        for entry in &residual {
            let _ = catch_unwind(AssertUnwindSafe(|| self.inner.write(entry)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LogLevel;
    use crate::sink::MemorySink;

    fn entry(msg: &str) -> LogEntry {
        LogEntry::new(LogLevel::Info, msg)
    }

    #[test]
    fn test_fifo_delivery() {
        let sink = AsyncSink::new(MemorySink::new());
        for i in 0..100 {
            sink.write(&entry(&format!("m{}", i)));
        }
        sink.flush();
        let lines: Vec<String> = sink.inner().entries().iter().map(|e| e.message.clone()).collect();
        assert_eq!(lines.len(), 100);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(line, &format!("m{}", i));
        }
    }

    #[test]
    fn test_drop_newest_policy() {
        let queue = BoundedQueue::new(2);
        assert!(queue.push(entry("a"), OverflowPolicy::DropNewest));
        assert!(queue.push(entry("b"), OverflowPolicy::DropNewest));
        assert!(!queue.push(entry("c"), OverflowPolicy::DropNewest));
        let mut out = Vec::new();
        queue.drain(&mut out);
        let msgs: Vec<&str> = out.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["a", "b"]);
    }

    #[test]
    fn test_drop_oldest_policy() {
        let queue = BoundedQueue::new(2);
        queue.push(entry("a"), OverflowPolicy::DropOldest);
        queue.push(entry("b"), OverflowPolicy::DropOldest);
        queue.push(entry("c"), OverflowPolicy::DropOldest);
        assert_eq!(queue.len(), 2);
        let mut out = Vec::new();
        queue.drain(&mut out);
        let msgs: Vec<&str> = out.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["b", "c"]);
    }

    #[test]
    fn test_drop_delivers_residual_entries() {
        let captured;
        {
            let sink = AsyncSink::with_options(
                AsyncOptions {
                    queue_size: 1024,
                    overflow_policy: OverflowPolicy::Block,
                    flush_interval_ms: 0,
                },
                MemorySink::new(),
            );
            for i in 0..50 {
                sink.write(&entry(&format!("m{}", i)));
            }
            captured = Arc::clone(&sink.inner);
        }
        assert_eq!(captured.len(), 50);
    }

    #[test]
    fn test_stopped_queue_rejects_pushes() {
        let queue = BoundedQueue::new(4);
        queue.stop();
        assert!(!queue.push(entry("x"), OverflowPolicy::Block));
    }
}
