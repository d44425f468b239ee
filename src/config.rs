//! Logger configuration: a fluent builder and a serde-loadable model.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enrich::Enricher;
use crate::error::ConfigError;
use crate::format::{
    CompactJsonFormatter, Formatter, HumanReadableFormatter, JsonFormatter, XmlFormatter,
};
use crate::level::LogLevel;
use crate::logger::{Logger, SinkHandle};
use crate::sink::{
    ColorConsoleSink, ConsoleSink, ConsoleStream, FileSink, HttpSink, HttpSinkOptions,
    RollingFileSink, RollingPolicy, Sink,
};

type Configure = Box<dyn FnOnce(&SinkHandle<'_>) -> Result<(), ConfigError>>;

struct SinkRegistration {
    name: Option<String>,
    sink: Arc<dyn Sink>,
    configure: Option<Configure>,
}

/// Fluent builder producing a fully-configured, running [`Logger`].
///
/// ```no_run
/// use lunar_log::{LoggerBuilder, LogLevel};
/// use lunar_log::sink::{ConsoleSink, FileSink};
///
/// let logger = LoggerBuilder::new()
///     .min_level(LogLevel::Debug)
///     .write_to(ConsoleSink::new())
///     .write_to_named("json-out", FileSink::new("app.jsonl"))
///     .enrich(lunar_log::enrich::thread_id())
///     .build()
///     .unwrap();
/// logger.info("ready", &[]);
/// ```
pub struct LoggerBuilder {
    min_level: LogLevel,
    capture_source_location: bool,
    rate_limit: Option<(usize, Duration)>,
    template_cache_size: Option<usize>,
    locale: Option<String>,
    enrichers: Vec<Enricher>,
    compact_filters: Vec<String>,
    filter_rules: Vec<String>,
    sinks: Vec<SinkRegistration>,
}

impl LoggerBuilder {
    pub fn new() -> Self {
        LoggerBuilder {
            min_level: LogLevel::Info,
            capture_source_location: false,
            rate_limit: None,
            template_cache_size: None,
            locale: None,
            enrichers: Vec::new(),
            compact_filters: Vec::new(),
            filter_rules: Vec::new(),
            sinks: Vec::new(),
        }
    }

    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn capture_source_location(mut self, enable: bool) -> Self {
        self.capture_source_location = enable;
        self
    }

    pub fn rate_limit(mut self, max_per_window: usize, window: Duration) -> Self {
        self.rate_limit = Some((max_per_window, window));
        self
    }

    pub fn template_cache_size(mut self, capacity: usize) -> Self {
        self.template_cache_size = Some(capacity);
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn enrich(mut self, enricher: Enricher) -> Self {
        self.enrichers.push(enricher);
        self
    }

    /// Add global compact filter rules (space-separated, AND-combined).
    pub fn filter(mut self, compact: impl Into<String>) -> Self {
        self.compact_filters.push(compact.into());
        self
    }

    /// Add a global DSL filter rule.
    pub fn filter_rule(mut self, rule: impl Into<String>) -> Self {
        self.filter_rules.push(rule.into());
        self
    }

    /// Add an unnamed sink (auto-named `sink_0`, `sink_1`, …).
    pub fn write_to<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(SinkRegistration {
            name: None,
            sink: Arc::new(sink),
            configure: None,
        });
        self
    }

    /// Add a named sink.
    pub fn write_to_named<S: Sink + 'static>(mut self, name: impl Into<String>, sink: S) -> Self {
        self.sinks.push(SinkRegistration {
            name: Some(name.into()),
            sink: Arc::new(sink),
            configure: None,
        });
        self
    }

    /// Add a named sink with a post-attach configuration callback.
    pub fn write_to_with<S, F>(mut self, name: impl Into<String>, sink: S, configure: F) -> Self
    where
        S: Sink + 'static,
        F: FnOnce(&SinkHandle<'_>) -> Result<(), ConfigError> + 'static,
    {
        self.sinks.push(SinkRegistration {
            name: Some(name.into()),
            sink: Arc::new(sink),
            configure: Some(Box::new(configure)),
        });
        self
    }

    /// Construct the configured logger and start its consumer thread.
    ///
    /// A logger built without any sinks silently discards all messages;
    /// a warning is emitted to stderr in that case.
    pub fn build(self) -> Result<Logger, ConfigError> {
        let logger = Logger::without_default_sink(self.min_level);
        logger.set_capture_source_location(self.capture_source_location);
        if let Some((max, window)) = self.rate_limit {
            logger.set_rate_limit(max, window);
        }
        if let Some(capacity) = self.template_cache_size {
            logger.set_template_cache_size(capacity);
        }
        if let Some(locale) = &self.locale {
            logger.set_locale(locale);
        }
        for enricher in self.enrichers {
            logger.enrich(enricher);
        }
        for compact in &self.compact_filters {
            logger.filter(compact)?;
        }
        for rule in &self.filter_rules {
            logger.add_filter_rule(rule)?;
        }

        if self.sinks.is_empty() {
            eprintln!("lunar-log: logger built without sinks; all messages will be discarded");
        }

        for (index, registration) in self.sinks.into_iter().enumerate() {
            let name = registration
                .name
                .unwrap_or_else(|| format!("sink_{}", index));
            let handle = logger.attach(registration.sink, &name)?;
            if let Some(configure) = registration.configure {
                configure(&handle)?;
            }
        }

        Ok(logger)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        LoggerBuilder::new()
    }
}

/// Formatter selection in declarative configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatKind {
    Human,
    Json,
    CompactJson,
    Xml,
}

impl Default for FormatKind {
    fn default() -> Self {
        FormatKind::Human
    }
}

impl FormatKind {
    fn formatter(self) -> Box<dyn Formatter> {
        match self {
            FormatKind::Human => Box::new(HumanReadableFormatter::new()),
            FormatKind::Json => Box::new(JsonFormatter::new()),
            FormatKind::CompactJson => Box::new(CompactJsonFormatter::new()),
            FormatKind::Xml => Box::new(XmlFormatter::new()),
        }
    }
}

/// Settings shared by every declarative sink entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkCommon {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub format: FormatKind,
    #[serde(default)]
    pub min_level: Option<LogLevel>,
    #[serde(default)]
    pub only_tags: Vec<String>,
    #[serde(default)]
    pub except_tags: Vec<String>,
    /// Compact filter expression applied to this sink.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub output_template: Option<String>,
}

/// Declarative sink description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SinkConfig {
    Console {
        #[serde(default)]
        colored: bool,
        #[serde(default)]
        stderr: bool,
        #[serde(flatten)]
        common: SinkCommon,
    },
    File {
        path: std::path::PathBuf,
        #[serde(flatten)]
        common: SinkCommon,
    },
    RollingFile {
        path: std::path::PathBuf,
        #[serde(default)]
        max_bytes: u64,
        /// `daily` or `hourly`; omitted = size-only.
        #[serde(default)]
        interval: Option<String>,
        #[serde(default)]
        max_files: usize,
        #[serde(default)]
        max_total_size: u64,
        #[serde(flatten)]
        common: SinkCommon,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: Vec<(String, String)>,
        #[serde(default)]
        batch_size: Option<usize>,
        #[serde(default)]
        flush_interval_ms: Option<u64>,
        #[serde(flatten)]
        common: SinkCommon,
    },
    #[cfg(unix)]
    Syslog {
        ident: String,
        #[serde(default)]
        include_level: bool,
        #[serde(flatten)]
        common: SinkCommon,
    },
}

impl SinkConfig {
    fn common(&self) -> &SinkCommon {
        match self {
            SinkConfig::Console { common, .. }
            | SinkConfig::File { common, .. }
            | SinkConfig::RollingFile { common, .. }
            | SinkConfig::Http { common, .. } => common,
            #[cfg(unix)]
            SinkConfig::Syslog { common, .. } => common,
        }
    }

    fn build_sink(&self) -> Result<Arc<dyn Sink>, ConfigError> {
        let sink: Arc<dyn Sink> = match self {
            SinkConfig::Console { colored, stderr, .. } => {
                let stream = if *stderr {
                    ConsoleStream::Stderr
                } else {
                    ConsoleStream::Stdout
                };
                if *colored {
                    Arc::new(ColorConsoleSink::on(stream))
                } else {
                    Arc::new(ConsoleSink::on(stream))
                }
            }
            SinkConfig::File { path, .. } => Arc::new(FileSink::new(path)),
            SinkConfig::RollingFile {
                path,
                max_bytes,
                interval,
                max_files,
                max_total_size,
                ..
            } => {
                let mut policy = match interval.as_deref() {
                    Some("daily") => RollingPolicy::daily(path),
                    Some("hourly") => RollingPolicy::hourly(path),
                    Some(other) => {
                        return Err(ConfigError::Invalid(format!(
                            "unknown rolling interval: {}",
                            other
                        )))
                    }
                    None => RollingPolicy::size(path, *max_bytes),
                };
                if *max_bytes > 0 {
                    policy = policy.max_size(*max_bytes);
                }
                if *max_files > 0 {
                    policy = policy.max_files(*max_files);
                }
                if *max_total_size > 0 {
                    policy = policy.max_total_size(*max_total_size);
                }
                Arc::new(RollingFileSink::new(policy))
            }
            SinkConfig::Http {
                url,
                headers,
                batch_size,
                flush_interval_ms,
                ..
            } => {
                let mut opts = HttpSinkOptions::new(url.clone());
                for (key, value) in headers {
                    opts = opts.header(key.clone(), value.clone());
                }
                if let Some(n) = batch_size {
                    opts = opts.batch_size(*n);
                }
                if let Some(ms) = flush_interval_ms {
                    opts = opts.flush_interval_ms(*ms);
                }
                Arc::new(HttpSink::http(opts))
            }
            #[cfg(unix)]
            SinkConfig::Syslog {
                ident,
                include_level,
                ..
            } => Arc::new(crate::sink::SyslogSink::with_options(
                ident,
                crate::sink::SyslogOptions::default().include_level(*include_level),
            )),
        };
        Ok(sink)
    }
}

/// Declarative logger configuration, loadable from TOML or JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default)]
    pub min_level: LogLevel,
    #[serde(default)]
    pub capture_source_location: bool,
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: usize,
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    #[serde(default = "default_template_cache_size")]
    pub template_cache_size: usize,
    #[serde(default)]
    pub locale: Option<String>,
    /// Global compact filter expressions.
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

fn default_rate_limit_max() -> usize {
    1000
}

fn default_rate_limit_window_ms() -> u64 {
    1000
}

fn default_template_cache_size() -> usize {
    crate::template::DEFAULT_CACHE_CAPACITY
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            min_level: LogLevel::Info,
            capture_source_location: false,
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            template_cache_size: default_template_cache_size(),
            locale: None,
            filters: Vec::new(),
            sinks: Vec::new(),
        }
    }
}

impl LoggerConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: LoggerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: LoggerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sinks.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one sink must be configured".to_string(),
            ));
        }
        if self.rate_limit_max == 0 {
            return Err(ConfigError::Invalid(
                "rate limit must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "rate limit window must be greater than 0".to_string(),
            ));
        }
        for filter in &self.filters {
            crate::filter::parse_compact_filter(filter)?;
        }
        for sink in &self.sinks {
            if let Some(filter) = &sink.common().filter {
                crate::filter::parse_compact_filter(filter)?;
            }
        }
        Ok(())
    }

    /// Construct a running logger from this configuration.
    pub fn build(&self) -> Result<Logger, ConfigError> {
        self.validate()?;

        let logger = Logger::without_default_sink(self.min_level);
        logger.set_capture_source_location(self.capture_source_location);
        logger.set_rate_limit(
            self.rate_limit_max,
            Duration::from_millis(self.rate_limit_window_ms),
        );
        logger.set_template_cache_size(self.template_cache_size);
        if let Some(locale) = &self.locale {
            logger.set_locale(locale);
        }
        for filter in &self.filters {
            logger.filter(filter)?;
        }

        for (index, sink_config) in self.sinks.iter().enumerate() {
            let common = sink_config.common().clone();
            let sink = sink_config.build_sink()?;
            let name = common
                .name
                .clone()
                .unwrap_or_else(|| format!("sink_{}", index));
            let handle = logger.attach(sink, &name)?;

            match &common.output_template {
                Some(template) => {
                    handle.output_template(template)?;
                }
                None => {
                    handle.formatter(common.format.formatter())?;
                }
            }
            if let Some(level) = common.min_level {
                handle.level(level);
            }
            for tag in &common.only_tags {
                handle.only(tag);
            }
            for tag in &common.except_tags {
                handle.except(tag);
            }
            if let Some(filter) = &common.filter {
                handle.filter(filter)?;
            }
            if let Some(locale) = &common.locale {
                handle.locale(locale);
            }
        }

        Ok(logger)
    }
}
