//! The logger front end: level gate, rate limiter, template binding,
//! context snapshot, ingestion queue, and the background consumer that
//! fans entries out to the sinks.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

use crate::entry::{fnv1a32, ExceptionInfo, LogEntry};
use crate::enrich::Enricher;
use crate::error::ConfigError;
use crate::filter::{eval_predicate, parse_compact_filter, FilterPredicate, FilterRule};
use crate::format::{Formatter, HumanReadableFormatter};
use crate::level::LogLevel;
use crate::sink::{ConsoleSink, Sink};
use crate::template::{
    extract_properties, map_arguments, render_message, split_tags, validate_placeholders,
    TemplateCache,
};

/// Loggable argument. Blanket-implemented for every `Display` type, which
/// yields the canonical lexical forms (integers as decimal digits,
/// booleans as `true`/`false`, floats as shortest round-trip text).
pub trait LogArg {
    fn to_log_string(&self) -> String;
}

impl<T: std::fmt::Display + ?Sized> LogArg for T {
    fn to_log_string(&self) -> String {
        self.to_string()
    }
}

const DEFAULT_RATE_LIMIT_MAX: usize = 1000;
const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(1);

static RATE_ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

/// Sliding-reset rate limiter.
///
/// Best-effort at the window boundary: when the window expires, the
/// thread winning the CAS resets the window and counts itself; threads
/// racing the reset may be accepted beyond the limit or lost just after
/// it. Validation warnings bypass the limiter entirely.
struct RateLimiter {
    window_start_nanos: AtomicU64,
    count: AtomicUsize,
    max: AtomicUsize,
    window_nanos: AtomicU64,
}

impl RateLimiter {
    fn new(max: usize, window: Duration) -> Self {
        RateLimiter {
            window_start_nanos: AtomicU64::new(Self::now_nanos()),
            count: AtomicUsize::new(0),
            max: AtomicUsize::new(max),
            window_nanos: AtomicU64::new(window.as_nanos() as u64),
        }
    }

    fn now_nanos() -> u64 {
        RATE_ORIGIN.elapsed().as_nanos() as u64
    }

    fn set(&self, max: usize, window: Duration) {
        self.max.store(max, Ordering::Relaxed);
        self.window_nanos
            .store(window.as_nanos() as u64, Ordering::Relaxed);
    }

    fn check(&self) -> bool {
        let now = Self::now_nanos();
        let window = self.window_nanos.load(Ordering::Relaxed);
        let mut start = self.window_start_nanos.load(Ordering::Relaxed);

        loop {
            if now.saturating_sub(start) < window {
                break;
            }
            match self.window_start_nanos.compare_exchange_weak(
                start,
                now,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.count.store(1, Ordering::Relaxed);
                    return true;
                }
                Err(actual) => start = actual,
            }
        }

        self.count.fetch_add(1, Ordering::Relaxed) < self.max.load(Ordering::Relaxed)
    }
}

struct LoggerShared {
    min_level: AtomicU8,
    running: AtomicBool,
    capture_source: AtomicBool,
    has_context: AtomicBool,
    write_in_progress: AtomicBool,
    logging_started: AtomicBool,
    queue: Mutex<VecDeque<LogEntry>>,
    work_cv: Condvar,
    flush_cv: Condvar,
    sinks: Mutex<Vec<Arc<dyn Sink>>>,
    context: Mutex<IndexMap<String, String>>,
    enrichers: Mutex<Vec<Enricher>>,
    global_predicate: Mutex<Option<FilterPredicate>>,
    global_rules: Mutex<Vec<FilterRule>>,
    rate: RateLimiter,
    cache: TemplateCache,
    locale: Mutex<String>,
}

impl LoggerShared {
    /// Global predicate → global rules → per-sink chains → write.
    fn deliver(&self, entry: &LogEntry) {
        if let Some(pred) = self.global_predicate.lock().as_ref() {
            if !eval_predicate(pred, entry) {
                return;
            }
        }
        if !self.global_rules.lock().iter().all(|r| r.evaluate(entry)) {
            return;
        }

        let sinks: Vec<Arc<dyn Sink>> = self.sinks.lock().clone();
        for sink in sinks {
            if sink.core().accepts(entry) {
                // A panicking sink must not starve the others.
                let _ = catch_unwind(AssertUnwindSafe(|| sink.write(entry)));
            }
        }
    }
}

fn consumer_loop(shared: Arc<LoggerShared>) {
    loop {
        let mut queue = shared.queue.lock();
        shared
            .work_cv
            .wait_while(&mut queue, |q| {
                q.is_empty() && shared.running.load(Ordering::Acquire)
            });

        if queue.is_empty() && !shared.running.load(Ordering::Acquire) {
            return;
        }

        while let Some(entry) = queue.pop_front() {
            shared.write_in_progress.store(true, Ordering::Release);
            drop(queue);

            shared.deliver(&entry);
            shared.write_in_progress.store(false, Ordering::Release);
            // Notify after every write so flush() wakes promptly even
            // while producers keep adding entries.
            shared.flush_cv.notify_all();

            queue = shared.queue.lock();
        }
    }
}

/// The multi-producer logging front end.
///
/// One background consumer drains the ingestion queue and hands each
/// entry to every attached sink. The logger must outlive all threads
/// that call into it; sinks must be attached before the first log call.
pub struct Logger {
    shared: Arc<LoggerShared>,
    worker: Option<JoinHandle<()>>,
}

impl Logger {
    /// Logger with the given minimum level and a default console sink.
    pub fn new(min_level: LogLevel) -> Self {
        let logger = Logger::without_default_sink(min_level);
        let _ = logger.add_sink(ConsoleSink::new());
        logger
    }

    /// Logger with no sinks attached; messages are discarded until a
    /// sink is added.
    pub fn without_default_sink(min_level: LogLevel) -> Self {
        let shared = Arc::new(LoggerShared {
            min_level: AtomicU8::new(min_level as u8),
            running: AtomicBool::new(true),
            capture_source: AtomicBool::new(false),
            has_context: AtomicBool::new(false),
            write_in_progress: AtomicBool::new(false),
            logging_started: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
            work_cv: Condvar::new(),
            flush_cv: Condvar::new(),
            sinks: Mutex::new(Vec::new()),
            context: Mutex::new(IndexMap::new()),
            enrichers: Mutex::new(Vec::new()),
            global_predicate: Mutex::new(None),
            global_rules: Mutex::new(Vec::new()),
            rate: RateLimiter::new(DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW),
            cache: TemplateCache::default(),
            locale: Mutex::new("C".to_string()),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("lunar-log-consumer".to_string())
                .spawn(move || consumer_loop(shared))
                .expect("failed to spawn log consumer")
        };

        Logger {
            shared,
            worker: Some(worker),
        }
    }

    // ------------------------------------------------------------------
    //  Configuration
    // ------------------------------------------------------------------

    pub fn set_min_level(&self, level: LogLevel) {
        self.shared.min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn min_level(&self) -> LogLevel {
        LogLevel::from_index(self.shared.min_level.load(Ordering::Relaxed))
    }

    pub fn set_capture_source_location(&self, capture: bool) {
        self.shared.capture_source.store(capture, Ordering::Relaxed);
    }

    pub fn capture_source_location(&self) -> bool {
        self.shared.capture_source.load(Ordering::Relaxed)
    }

    pub fn set_rate_limit(&self, max_per_window: usize, window: Duration) {
        self.shared.rate.set(max_per_window, window);
    }

    pub fn set_template_cache_size(&self, capacity: usize) {
        self.shared.cache.set_capacity(capacity);
    }

    pub fn set_locale(&self, locale: &str) {
        *self.shared.locale.lock() = locale.to_string();
    }

    pub fn locale(&self) -> String {
        self.shared.locale.lock().clone()
    }

    /// Attach a sink. Sinks must be attached before the first log call.
    pub fn add_sink<S: Sink + 'static>(&self, sink: S) -> Result<SinkHandle<'_>, ConfigError> {
        let name = format!("sink_{}", self.shared.sinks.lock().len());
        self.attach(Arc::new(sink), &name)
    }

    /// Attach a named sink for later lookup via [`Logger::sink`].
    pub fn add_sink_named<S: Sink + 'static>(
        &self,
        name: &str,
        sink: S,
    ) -> Result<SinkHandle<'_>, ConfigError> {
        self.attach(Arc::new(sink), name)
    }

    /// Attach a sink with a replacement formatter in one call.
    pub fn add_sink_with<S: Sink + 'static>(
        &self,
        sink: S,
        formatter: Box<dyn Formatter>,
    ) -> Result<SinkHandle<'_>, ConfigError> {
        sink.core().set_formatter(formatter);
        self.add_sink(sink)
    }

    pub(crate) fn attach(
        &self,
        sink: Arc<dyn Sink>,
        name: &str,
    ) -> Result<SinkHandle<'_>, ConfigError> {
        if self.shared.logging_started.load(Ordering::Acquire) {
            return Err(ConfigError::SinksLocked);
        }
        sink.core().set_name(name);
        self.shared.sinks.lock().push(Arc::clone(&sink));
        Ok(SinkHandle { logger: self, sink })
    }

    /// Fluent handle for a previously-attached named sink.
    pub fn sink(&self, name: &str) -> Result<SinkHandle<'_>, ConfigError> {
        let sink = self
            .shared
            .sinks
            .lock()
            .iter()
            .find(|s| s.core().name() == name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownSink(name.to_string()))?;
        Ok(SinkHandle { logger: self, sink })
    }

    /// Register an enricher, applied in registration order on every
    /// entry.
    pub fn enrich(&self, enricher: Enricher) {
        self.shared.enrichers.lock().push(enricher);
    }

    /// Register a closure enricher.
    pub fn enrich_with(&self, f: impl Fn(&mut LogEntry) + Send + Sync + 'static) {
        self.enrich(Arc::new(f));
    }

    /// Set the global predicate filter.
    pub fn set_filter(&self, predicate: impl Fn(&LogEntry) -> bool + Send + Sync + 'static) {
        *self.shared.global_predicate.lock() = Some(Arc::new(predicate));
    }

    pub fn clear_filter(&self) {
        *self.shared.global_predicate.lock() = None;
    }

    /// Add a global DSL filter rule.
    pub fn add_filter_rule(&self, rule: &str) -> Result<(), ConfigError> {
        let parsed = FilterRule::parse(rule)?;
        self.shared.global_rules.lock().push(parsed);
        Ok(())
    }

    /// Add global compact-syntax filter rules (AND-combined).
    pub fn filter(&self, compact: &str) -> Result<(), ConfigError> {
        let rules = parse_compact_filter(compact)?;
        self.shared.global_rules.lock().extend(rules);
        Ok(())
    }

    pub fn clear_filter_rules(&self) {
        self.shared.global_rules.lock().clear();
    }

    // ------------------------------------------------------------------
    //  Context
    // ------------------------------------------------------------------

    pub fn set_context(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut context = self.shared.context.lock();
        context.insert(key.into(), value.into());
        self.shared.has_context.store(true, Ordering::Release);
    }

    pub fn clear_context(&self, key: &str) {
        let mut context = self.shared.context.lock();
        context.shift_remove(key);
        self.shared
            .has_context
            .store(!context.is_empty(), Ordering::Release);
    }

    pub fn clear_all_context(&self) {
        self.shared.context.lock().clear();
        self.shared.has_context.store(false, Ordering::Release);
    }

    /// Set a context key for the lifetime of the returned guard (LIFO).
    /// Overlapping guards for the same key across threads collide; the
    /// key is removed when the guard drops.
    pub fn scoped_context(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> ContextScope<'_> {
        let key = key.into();
        self.set_context(key.clone(), value);
        ContextScope { logger: self, key }
    }

    // ------------------------------------------------------------------
    //  Logging
    // ------------------------------------------------------------------

    pub fn log(&self, level: LogLevel, template: &str, args: &[&dyn LogArg]) {
        self.log_inner(level, "", 0, "", template, args, None);
    }

    pub fn trace(&self, template: &str, args: &[&dyn LogArg]) {
        self.log(LogLevel::Trace, template, args);
    }

    pub fn debug(&self, template: &str, args: &[&dyn LogArg]) {
        self.log(LogLevel::Debug, template, args);
    }

    pub fn info(&self, template: &str, args: &[&dyn LogArg]) {
        self.log(LogLevel::Info, template, args);
    }

    pub fn warn(&self, template: &str, args: &[&dyn LogArg]) {
        self.log(LogLevel::Warn, template, args);
    }

    pub fn error(&self, template: &str, args: &[&dyn LogArg]) {
        self.log(LogLevel::Error, template, args);
    }

    pub fn fatal(&self, template: &str, args: &[&dyn LogArg]) {
        self.log(LogLevel::Fatal, template, args);
    }

    pub fn log_with_source_location(
        &self,
        level: LogLevel,
        file: &str,
        line: u32,
        function: &str,
        template: &str,
        args: &[&dyn LogArg],
    ) {
        self.log_inner(level, file, line, function, template, args, None);
    }

    /// Log with an attached exception, its cause chain captured
    /// outermost-first.
    pub fn log_with_exception(
        &self,
        level: LogLevel,
        error: &(dyn std::error::Error + 'static),
        template: &str,
        args: &[&dyn LogArg],
    ) {
        self.log_inner(
            level,
            "",
            0,
            "",
            template,
            args,
            Some(ExceptionInfo::from_error(error)),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn log_inner(
        &self,
        level: LogLevel,
        file: &str,
        line: u32,
        function: &str,
        template: &str,
        args: &[&dyn LogArg],
        exception: Option<ExceptionInfo>,
    ) {
        let shared = &self.shared;
        if !shared.running.load(Ordering::Acquire) {
            return;
        }
        if level < self.min_level() {
            return;
        }
        if !shared.rate.check() {
            return;
        }
        shared.logging_started.store(true, Ordering::Release);

        let values: Vec<String> = args.iter().map(|a| a.to_log_string()).collect();
        let (tags, body) = split_tags(template);
        let plan = shared.cache.get_or_parse(body);
        let warnings = validate_placeholders(&plan, &values);
        let locale = shared.locale.lock().clone();

        let message = render_message(&plan, &values, &locale);
        let properties = extract_properties(&plan, &values);
        let arguments = map_arguments(&plan, &values);

        let now = Utc::now();
        let capture = shared.capture_source.load(Ordering::Relaxed);
        let thread_id = format!("{:?}", std::thread::current().id());

        let mut entry = LogEntry {
            level,
            message,
            timestamp: now,
            template_str: template.to_string(),
            template_hash: fnv1a32(template),
            arguments,
            properties,
            file: if capture { file.to_string() } else { String::new() },
            line: if capture { line } else { 0 },
            function: if capture { function.to_string() } else { String::new() },
            custom_context: IndexMap::new(),
            tags,
            locale,
            thread_id: thread_id.clone(),
            exception,
        };

        {
            let enrichers = shared.enrichers.lock();
            for enricher in enrichers.iter() {
                enricher(&mut entry);
            }
        }

        // User-supplied context is applied last and wins over enrichers.
        if shared.has_context.load(Ordering::Acquire) {
            let snapshot = shared.context.lock().clone();
            for (key, value) in snapshot {
                entry.custom_context.insert(key, value);
            }
        }

        let mut queue = shared.queue.lock();
        queue.push_back(entry);

        // Validation warnings bypass the rate limiter.
        for warning in warnings {
            let mut warn_entry = LogEntry::new(LogLevel::Warn, warning.clone());
            warn_entry.timestamp = now;
            warn_entry.template_str = warning.clone();
            warn_entry.template_hash = fnv1a32(&warning);
            warn_entry.thread_id = thread_id.clone();
            if capture {
                warn_entry.file = file.to_string();
                warn_entry.line = line;
                warn_entry.function = function.to_string();
            }
            queue.push_back(warn_entry);
        }

        drop(queue);
        shared.work_cv.notify_one();
    }

    /// Block until the ingestion queue is empty and no sink write is in
    /// progress.
    pub fn flush(&self) {
        let shared = &self.shared;
        let mut queue = shared.queue.lock();
        shared.flush_cv.wait_while(&mut queue, |q| {
            !q.is_empty() || shared.write_in_progress.load(Ordering::Acquire)
        });
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.flush();
        self.shared.running.store(false, Ordering::Release);
        self.shared.work_cv.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// RAII guard removing a context key on drop. Strictly LIFO.
pub struct ContextScope<'a> {
    logger: &'a Logger,
    key: String,
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        self.logger.clear_context(&self.key);
    }
}

/// Fluent configuration handle for an attached sink.
pub struct SinkHandle<'a> {
    logger: &'a Logger,
    sink: Arc<dyn Sink>,
}

impl SinkHandle<'_> {
    pub fn name(&self) -> String {
        self.sink.core().name()
    }

    pub fn level(&self, level: LogLevel) -> &Self {
        self.sink.core().set_min_level(level);
        self
    }

    /// Add a DSL filter rule to this sink.
    pub fn filter_rule(&self, rule: &str) -> Result<&Self, ConfigError> {
        self.sink.core().add_rule(FilterRule::parse(rule)?);
        Ok(self)
    }

    /// Add compact-syntax filter rules to this sink (batch, atomic).
    pub fn filter(&self, compact: &str) -> Result<&Self, ConfigError> {
        self.sink.core().add_rules(parse_compact_filter(compact)?);
        Ok(self)
    }

    pub fn predicate(&self, p: impl Fn(&LogEntry) -> bool + Send + Sync + 'static) -> &Self {
        self.sink.core().set_predicate(Arc::new(p));
        self
    }

    pub fn clear_predicate(&self) -> &Self {
        self.sink.core().clear_predicate();
        self
    }

    /// Clear predicate and DSL rules; tag filters stay (see
    /// [`SinkHandle::clear_tag_filters`]).
    pub fn clear_filters(&self) -> &Self {
        self.sink.core().clear_filters();
        self
    }

    pub fn clear_filter_rules(&self) -> &Self {
        self.sink.core().clear_rules();
        self
    }

    /// Restrict this sink to entries carrying `tag` (any match among the
    /// accumulated only-tags accepts).
    pub fn only(&self, tag: &str) -> &Self {
        self.sink.core().add_only_tag(tag);
        self
    }

    /// Reject entries carrying `tag`.
    pub fn except(&self, tag: &str) -> &Self {
        self.sink.core().add_except_tag(tag);
        self
    }

    pub fn clear_tag_filters(&self) -> &Self {
        self.sink.core().clear_tag_filters();
        self
    }

    /// Per-sink locale override; locale-aware format specs re-render
    /// under this locale for this sink only.
    pub fn locale(&self, locale: &str) -> &Self {
        self.sink.core().set_locale(locale);
        self
    }

    /// Replace the sink's formatter. Permitted only before the first log
    /// call.
    pub fn formatter(&self, formatter: Box<dyn Formatter>) -> Result<&Self, ConfigError> {
        if self.logger.shared.logging_started.load(Ordering::Acquire) {
            return Err(ConfigError::SinksLocked);
        }
        self.sink.core().set_formatter(formatter);
        Ok(self)
    }

    /// Install a human-readable formatter rendering through the given
    /// output template. Same before-first-log constraint as
    /// [`SinkHandle::formatter`].
    pub fn output_template(&self, template: &str) -> Result<&Self, ConfigError> {
        self.formatter(Box::new(HumanReadableFormatter::with_output_template(template)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_caps_within_window() {
        let limiter = RateLimiter::new(100, Duration::from_secs(60));
        let accepted = (0..500).filter(|_| limiter.check()).count();
        assert_eq!(accepted, 100);
    }

    #[test]
    fn test_rate_limiter_resets_after_window() {
        let limiter = RateLimiter::new(2, Duration::from_millis(20));
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check());
    }

    #[test]
    fn test_level_gate_skips_work() {
        let logger = Logger::without_default_sink(LogLevel::Warn);
        logger.info("skipped {x}", &[&1]);
        logger.flush();
        // The gate fires before the sink-lock flag is set, so attaching
        // is still allowed.
        assert!(logger.add_sink(crate::sink::MemorySink::new()).is_ok());
    }

    #[test]
    fn test_sinks_locked_after_first_log() {
        let logger = Logger::without_default_sink(LogLevel::Info);
        let _ = logger.add_sink(crate::sink::MemorySink::new());
        logger.info("first", &[]);
        let err = logger.add_sink(crate::sink::MemorySink::new());
        assert!(matches!(err, Err(ConfigError::SinksLocked)));
    }

    #[test]
    fn test_unknown_sink_lookup() {
        let logger = Logger::without_default_sink(LogLevel::Info);
        assert!(matches!(
            logger.sink("nope"),
            Err(ConfigError::UnknownSink(_))
        ));
    }
}
