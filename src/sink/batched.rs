//! Batch-and-retry delivery engine.
//!
//! [`BatchedSink`] buffers entries and hands them to a [`BatchDelivery`]
//! implementation in batches, on three triggers: the buffer reaching the
//! batch size, the periodic timer firing, or an explicit `flush()`.
//!
//! Latency note: a size-triggered flush runs on the **producer** thread,
//! retries included. With the defaults (3 retries, 100 ms delay) a
//! failing delivery can hold the producer for several hundred
//! milliseconds; wrap latency-sensitive paths in an
//! [`AsyncSink`](super::AsyncSink) to move that work to a dedicated
//! thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::entry::LogEntry;
use crate::error::BatchError;

use super::{Sink, SinkCore};

/// Batch buffering, retry, and overflow configuration.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    batch_size: usize,
    flush_interval_ms: u64,
    max_queue_size: usize,
    max_retries: usize,
    retry_delay_ms: u64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            batch_size: 100,
            flush_interval_ms: 5000,
            max_queue_size: 10_000,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

impl BatchOptions {
    pub fn new() -> Self {
        BatchOptions::default()
    }

    /// Flush when the buffer reaches this size. 0 is clamped to 1 to
    /// prevent an all-buffering configuration.
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }

    /// Periodic flush interval in milliseconds; 0 disables the timer.
    pub fn flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// Maximum buffered entries; overflow drops with a counter.
    pub fn max_queue_size(mut self, n: usize) -> Self {
        self.max_queue_size = n;
        self
    }

    pub fn max_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }
}

/// Delivery target for a [`BatchedSink`].
///
/// `write_batch` calls are serialized by the sink's internal mutex; the
/// callbacks are not, so they must be thread-safe where size- and
/// timer-triggered flushes can overlap.
pub trait BatchDelivery: Send + Sync + 'static {
    /// Deliver one batch. The engine retries per its policy on `Err`.
    fn write_batch(&self, batch: &[LogEntry]) -> Result<(), BatchError>;

    /// Invoked after each successful delivery.
    fn on_flush(&self) {}

    /// Invoked for each failed attempt (0-based).
    fn on_batch_error(&self, _error: &BatchError, _attempt: usize) {}
}

struct BatchShared<T: BatchDelivery> {
    opts: BatchOptions,
    delivery: T,
    buffer: Mutex<Vec<LogEntry>>,
    write_mutex: Mutex<()>,
    timer_mutex: Mutex<()>,
    timer_cv: Condvar,
    running: AtomicBool,
    dropped: AtomicUsize,
}

impl<T: BatchDelivery> BatchShared<T> {
    /// Deliver one batch with retries. Never holds the buffer mutex.
    fn do_flush(&self, entries: Vec<LogEntry>) {
        if entries.is_empty() {
            return;
        }

        let mut success = false;
        for attempt in 0..=self.opts.max_retries {
            let result = {
                let _serialize = self.write_mutex.lock();
                catch_unwind(AssertUnwindSafe(|| self.delivery.write_batch(&entries)))
            };
            match result {
                Ok(Ok(())) => {
                    success = true;
                    break;
                }
                Ok(Err(err)) => {
                    let _ = catch_unwind(AssertUnwindSafe(|| {
                        self.delivery.on_batch_error(&err, attempt)
                    }));
                    if attempt < self.opts.max_retries {
                        if !self.running.load(Ordering::Acquire) {
                            break;
                        }
                        // Sleep on the timer condvar so shutdown can
                        // interrupt the delay.
                        let mut guard = self.timer_mutex.lock();
                        let _ = self.timer_cv.wait_while_for(
                            &mut guard,
                            |_| self.running.load(Ordering::Acquire),
                            Duration::from_millis(self.opts.retry_delay_ms),
                        );
                        drop(guard);
                        if !self.running.load(Ordering::Acquire) {
                            break;
                        }
                    }
                }
                // A panicking delivery gets no retries.
                Err(_) => break,
            }
        }

        if success {
            let _ = catch_unwind(AssertUnwindSafe(|| self.delivery.on_flush()));
        }
    }

    fn take_buffer(&self) -> Vec<LogEntry> {
        let mut buffer = self.buffer.lock();
        std::mem::take(&mut *buffer)
    }
}

/// Buffering sink that delivers entries in batches with retry.
pub struct BatchedSink<T: BatchDelivery> {
    core: SinkCore,
    shared: Arc<BatchShared<T>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: BatchDelivery> BatchedSink<T> {
    pub fn new(delivery: T) -> Self {
        BatchedSink::with_options(BatchOptions::default(), delivery)
    }

    pub fn with_options(opts: BatchOptions, delivery: T) -> Self {
        let shared = Arc::new(BatchShared {
            opts,
            delivery,
            buffer: Mutex::new(Vec::new()),
            write_mutex: Mutex::new(()),
            timer_mutex: Mutex::new(()),
            timer_cv: Condvar::new(),
            running: AtomicBool::new(true),
            dropped: AtomicUsize::new(0),
        });

        let timer = if shared.opts.flush_interval_ms > 0 {
            let shared = Arc::clone(&shared);
            Some(
                std::thread::Builder::new()
                    .name("lunar-log-batch".to_string())
                    .spawn(move || timer_loop(shared))
                    .expect("failed to spawn batch timer"),
            )
        } else {
            None
        };

        BatchedSink {
            core: SinkCore::new(),
            shared,
            timer: Mutex::new(timer),
        }
    }

    pub fn delivery(&self) -> &T {
        &self.shared.delivery
    }

    pub fn options(&self) -> &BatchOptions {
        &self.shared.opts
    }

    /// Entries dropped because the buffer was at `max_queue_size`.
    pub fn dropped_count(&self) -> usize {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stop the timer and deliver everything still buffered. Idempotent;
    /// also invoked on drop.
    pub fn stop_and_flush(&self) {
        if self
            .shared
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        {
            let _guard = self.shared.timer_mutex.lock();
            self.shared.timer_cv.notify_all();
        }
        if let Some(timer) = self.timer.lock().take() {
            let _ = timer.join();
        }
        self.shared.do_flush(self.shared.take_buffer());
    }
}

fn timer_loop<T: BatchDelivery>(shared: Arc<BatchShared<T>>) {
    loop {
        {
            let mut guard = shared.timer_mutex.lock();
            let _ = shared.timer_cv.wait_while_for(
                &mut guard,
                |_| shared.running.load(Ordering::Acquire),
                Duration::from_millis(shared.opts.flush_interval_ms),
            );
        }
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        let batch = shared.take_buffer();
        shared.do_flush(batch);
    }
}

impl<T: BatchDelivery> Sink for BatchedSink<T> {
    fn core(&self) -> &SinkCore {
        &self.core
    }

    /// Buffer the entry; a full batch flushes on this (producer) thread.
    fn write(&self, entry: &LogEntry) {
        if !self.shared.running.load(Ordering::Acquire) {
            return;
        }

        let to_flush = {
            let mut buffer = self.shared.buffer.lock();
            if self.shared.opts.max_queue_size > 0
                && buffer.len() >= self.shared.opts.max_queue_size
            {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            buffer.push(entry.clone());
            if buffer.len() >= self.shared.opts.batch_size {
                std::mem::take(&mut *buffer)
            } else {
                Vec::new()
            }
        };
        self.shared.do_flush(to_flush);
    }

    fn flush(&self) {
        self.shared.do_flush(self.shared.take_buffer());
    }
}

impl<T: BatchDelivery> Drop for BatchedSink<T> {
    fn drop(&mut self) {
        self.stop_and_flush();
    }
}
