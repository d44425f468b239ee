//! End-to-end pipeline tests: template rendering, tag routing, filters,
//! rate limiting, rolling files, structured output, and concurrency.

use std::time::Duration;

use pretty_assertions::assert_eq;

use lunar_log::format::{CompactJsonFormatter, JsonFormatter};
use lunar_log::sink::{
    AsyncOptions, AsyncSink, MemoryHandle, MemorySink, OverflowPolicy, RollingFileSink,
    RollingPolicy,
};
use lunar_log::{fnv1a32, LogLevel, Logger, LoggerBuilder};

fn memory_logger(min_level: LogLevel) -> (Logger, MemoryHandle) {
    let logger = Logger::without_default_sink(min_level);
    let sink = MemorySink::new();
    let handle = sink.handle();
    logger.add_sink_named("mem", sink).unwrap();
    (logger, handle)
}

#[test]
fn renders_template_with_properties_and_hash() {
    let (logger, mem) = memory_logger(LogLevel::Info);

    logger.info(
        "User {username} logged in from {ip}",
        &[&"alice", &"192.168.1.1"],
    );
    logger.flush();

    let entries = mem.entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.message, "User alice logged in from 192.168.1.1");
    assert_eq!(entry.template_str, "User {username} logged in from {ip}");
    assert_eq!(
        entry.template_hash,
        fnv1a32("User {username} logged in from {ip}")
    );
    assert_eq!(entry.properties.len(), 2);
    assert_eq!(entry.properties[0].name, "username");
    assert_eq!(entry.properties[0].value, "alice");
    assert_eq!(entry.properties[1].name, "ip");
    assert_eq!(entry.arguments[0].0, "username");
}

#[test]
fn destructured_property_is_native_json_number() {
    let logger = Logger::without_default_sink(LogLevel::Info);
    let sink = MemorySink::new();
    let mem = sink.handle();
    let handle = logger.add_sink(sink).unwrap();
    handle.formatter(Box::new(JsonFormatter::new())).unwrap();

    logger.info("Amount: {@amount:.2f}", &[&3.14159]);
    logger.flush();

    let lines = mem.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("Amount: 3.14"));
    let parsed: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(parsed["properties"]["amount"], serde_json::json!(3.14159));
}

#[test]
fn tags_are_parsed_and_stripped() {
    let (logger, mem) = memory_logger(LogLevel::Info);

    logger.info("[auth][security] Login from {ip}", &[&"10.0.0.99"]);
    logger.flush();

    let entries = mem.entries();
    assert_eq!(entries[0].tags, vec!["auth", "security"]);
    assert_eq!(entries[0].message, "Login from 10.0.0.99");
}

#[test]
fn tag_routing_between_sinks() {
    let logger = Logger::without_default_sink(LogLevel::Trace);

    let auth_sink = MemorySink::new();
    let auth = auth_sink.handle();
    logger
        .add_sink_named("auth-log", auth_sink)
        .unwrap()
        .only("auth");

    let main_sink = MemorySink::new();
    let main = main_sink.handle();
    logger
        .add_sink_named("main-log", main_sink)
        .unwrap()
        .except("health");

    logger.info("[auth] User {name} logged in", &[&"alice"]);
    logger.info("[db] Query executed in {ms}ms", &[&42]);
    logger.info("[health] Heartbeat OK", &[]);
    logger.info("General message without tags", &[]);
    logger.flush();

    assert_eq!(auth.messages(), vec!["User alice logged in"]);
    assert_eq!(
        main.messages(),
        vec![
            "User alice logged in",
            "Query executed in 42ms",
            "General message without tags",
        ]
    );
}

#[test]
fn compact_filter_pipeline() {
    let (logger, mem) = memory_logger(LogLevel::Trace);
    logger.filter("WARN+ !~heartbeat").unwrap();

    logger.warn("Real warning", &[]);
    logger.info("anything", &[]);
    logger.warn("Noisy heartbeat pulse", &[]);
    logger.flush();

    assert_eq!(mem.messages(), vec!["Real warning"]);
}

#[test]
fn global_predicate_and_sink_level_compose() {
    let logger = Logger::without_default_sink(LogLevel::Trace);
    let sink = MemorySink::new();
    let mem = sink.handle();
    logger.add_sink(sink).unwrap().level(LogLevel::Warn);
    logger.set_filter(|entry| !entry.message.contains("drop-me"));

    logger.warn("kept", &[]);
    logger.warn("drop-me please", &[]);
    logger.info("below sink level", &[]);
    logger.flush();

    assert_eq!(mem.messages(), vec!["kept"]);
}

#[test]
fn validation_warnings_are_emitted_as_secondary_entries() {
    let (logger, mem) = memory_logger(LogLevel::Trace);

    logger.info("User {name} from {name}", &[&"alice", &"alice"]);
    logger.flush();

    let messages = mem.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], "User alice from alice");
    assert_eq!(messages[1], "Warning: Repeated placeholder name: name");
    assert_eq!(mem.entries()[1].level, LogLevel::Warn);

    mem.clear();
    logger.info("No placeholders here", &[&"extra"]);
    logger.flush();
    let messages = mem.messages();
    assert_eq!(
        messages[1],
        "Warning: More values provided than placeholders"
    );

    mem.clear();
    logger.info("Missing {a} and {b}", &[&1]);
    logger.flush();
    let messages = mem.messages();
    assert_eq!(messages[0], "Missing 1 and {b}");
    assert_eq!(
        messages[1],
        "Warning: More placeholders than provided values"
    );
}

#[test]
fn rate_limiter_caps_throughput_and_recovers() {
    let (logger, mem) = memory_logger(LogLevel::Info);
    logger.set_rate_limit(100, Duration::from_millis(250));

    for i in 0..500 {
        logger.info("burst {i}", &[&i]);
    }
    logger.flush();

    let delivered = mem.len();
    assert!(delivered <= 105, "delivered {} entries", delivered);
    assert!(delivered >= 95, "delivered {} entries", delivered);

    std::thread::sleep(Duration::from_millis(300));
    logger.info("after window", &[]);
    logger.flush();
    assert_eq!(mem.len(), delivered + 1);
}

#[test]
fn context_and_enricher_precedence() {
    let (logger, mem) = memory_logger(LogLevel::Info);
    logger.enrich(lunar_log::enrich::property("service", "enriched"));
    logger.enrich(lunar_log::enrich::property("stage", "from-enricher"));
    logger.set_context("service", "user-set");

    logger.info("precedence", &[]);
    logger.flush();

    let entry = &mem.entries()[0];
    // User-supplied context wins over enrichers.
    assert_eq!(entry.custom_context.get("service").unwrap(), "user-set");
    assert_eq!(entry.custom_context.get("stage").unwrap(), "from-enricher");
}

#[test]
fn scoped_context_removes_key_on_drop() {
    let (logger, mem) = memory_logger(LogLevel::Info);

    {
        let _scope = logger.scoped_context("request_id", "r-1");
        logger.info("inside", &[]);
        logger.flush();
    }
    logger.info("outside", &[]);
    logger.flush();

    let entries = mem.entries();
    assert_eq!(entries[0].custom_context.get("request_id").unwrap(), "r-1");
    assert!(!entries[1].custom_context.contains_key("request_id"));
}

#[test]
fn source_location_capture_toggle() {
    let (logger, mem) = memory_logger(LogLevel::Info);

    logger.log_with_source_location(LogLevel::Info, "main.rs", 10, "boot", "without", &[]);
    logger.set_capture_source_location(true);
    logger.log_with_source_location(LogLevel::Info, "main.rs", 20, "serve", "with", &[]);
    logger.flush();

    let entries = mem.entries();
    assert!(entries[0].file.is_empty());
    assert_eq!(entries[0].line, 0);
    assert_eq!(entries[1].file, "main.rs");
    assert_eq!(entries[1].line, 20);
    assert_eq!(entries[1].function, "serve");
}

#[test]
fn clef_output_end_to_end() {
    let logger = Logger::without_default_sink(LogLevel::Trace);
    let sink = MemorySink::new();
    let mem = sink.handle();
    let handle = logger.add_sink(sink).unwrap();
    handle
        .formatter(Box::new(CompactJsonFormatter::new()))
        .unwrap();
    logger.set_context("env", "prod");

    logger.warn("[auth] Login failed for {@attempts} attempts", &[&3]);
    logger.flush();

    let lines = mem.lines();
    let parsed: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(parsed["@l"], "WRN");
    assert_eq!(parsed["@mt"], "[auth] Login failed for {@attempts} attempts");
    assert_eq!(parsed["attempts"], serde_json::json!(3));
    assert_eq!(parsed["env"], "prod");
    assert_eq!(parsed["tags"][0], "auth");
    assert_eq!(
        parsed["@i"],
        format!(
            "{:08x}",
            fnv1a32("[auth] Login failed for {@attempts} attempts")
        )
    );
}

#[test]
fn exception_attachment_reaches_clef() {
    let logger = Logger::without_default_sink(LogLevel::Trace);
    let sink = MemorySink::new();
    let mem = sink.handle();
    logger
        .add_sink(sink)
        .unwrap()
        .formatter(Box::new(CompactJsonFormatter::new()))
        .unwrap();

    let err = std::io::Error::new(std::io::ErrorKind::Other, "disk unavailable");
    logger.log_with_exception(
        LogLevel::Error,
        &err,
        "write failed for {path}",
        &[&"/tmp/x"],
    );
    logger.flush();

    let parsed: serde_json::Value = serde_json::from_str(&mem.lines()[0]).unwrap();
    let x = parsed["@x"].as_str().unwrap();
    assert!(x.contains("disk unavailable"));
    assert_eq!(parsed["@l"], "ERR");
}

#[test]
fn rolling_size_policy_keeps_bounded_rolled_set() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("app.log");

    let logger = Logger::without_default_sink(LogLevel::Info);
    let sink = RollingFileSink::new(RollingPolicy::size(&base, 1024).max_files(3));
    logger.add_sink_named("rolling", sink).unwrap();

    for i in 0..100 {
        logger.info("log line number {n} padding padding", &[&i]);
    }
    logger.flush();
    drop(logger);

    let mut rolled: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n != "app.log")
        .collect();
    rolled.sort();

    assert!(base.exists(), "active file must exist");
    assert_eq!(rolled.len(), 3, "rolled files: {:?}", rolled);
    for name in &rolled {
        assert!(name.starts_with("app."));
        assert!(name.ends_with(".log"));
        let middle = name.trim_start_matches("app.").trim_end_matches(".log");
        assert_eq!(middle.len(), 3);
        assert!(middle.bytes().all(|b| b.is_ascii_digit()));
    }
    let indices: Vec<u32> = rolled
        .iter()
        .map(|n| {
            n.trim_start_matches("app.")
                .trim_end_matches(".log")
                .parse()
                .unwrap()
        })
        .collect();
    for pair in indices.windows(2) {
        assert!(pair[0] < pair[1], "indices not monotonic: {:?}", indices);
    }
}

#[test]
fn async_sink_in_pipeline_preserves_order() {
    let logger = Logger::without_default_sink(LogLevel::Info);
    let inner = MemorySink::new();
    let mem = inner.handle();
    let wrapped = AsyncSink::with_options(
        AsyncOptions {
            queue_size: 64,
            overflow_policy: OverflowPolicy::Block,
            flush_interval_ms: 0,
        },
        inner,
    );
    logger.add_sink_named("async", wrapped).unwrap();

    for i in 0..200 {
        logger.info("ordered {i}", &[&i]);
    }
    logger.flush();
    drop(logger);

    let messages = mem.messages();
    assert_eq!(messages.len(), 200);
    for (i, msg) in messages.iter().enumerate() {
        assert_eq!(msg, &format!("ordered {}", i));
    }
}

#[test]
fn flush_postcondition_queue_empty() {
    let (logger, mem) = memory_logger(LogLevel::Info);
    logger.set_rate_limit(1_000_000, Duration::from_secs(10));
    for i in 0..500 {
        logger.info("msg {i}", &[&i]);
    }
    logger.flush();
    assert_eq!(mem.len(), 500);
}

#[test]
fn multi_producer_per_thread_fifo() {
    let (logger, mem) = memory_logger(LogLevel::Info);
    logger.set_rate_limit(1_000_000, Duration::from_secs(10));

    std::thread::scope(|scope| {
        for t in 0..4 {
            let logger = &logger;
            scope.spawn(move || {
                for i in 0..250 {
                    logger.info("producer {t} message {i}", &[&t, &i]);
                }
            });
        }
    });
    logger.flush();

    let messages = mem.messages();
    assert_eq!(messages.len(), 1000);
    // Per-producer FIFO: each thread's messages appear in its send order.
    for t in 0..4 {
        let prefix = format!("producer {} message ", t);
        let mine: Vec<usize> = messages
            .iter()
            .filter_map(|m| m.strip_prefix(prefix.as_str()))
            .map(|rest| rest.parse().unwrap())
            .collect();
        assert_eq!(mine.len(), 250);
        for (expected, actual) in mine.iter().enumerate() {
            assert_eq!(expected, *actual);
        }
    }
}

#[test]
fn per_sink_locale_rerenders_numbers() {
    let logger = Logger::without_default_sink(LogLevel::Info);
    logger.set_locale("en_US");

    let en_sink = MemorySink::new();
    let en = en_sink.handle();
    logger.add_sink_named("en", en_sink).unwrap();

    let de_sink = MemorySink::new();
    let de = de_sink.handle();
    logger.add_sink_named("de", de_sink).unwrap().locale("de_DE");

    logger.info("Total: {val:n}", &[&1234567.89]);
    logger.flush();

    assert!(en.lines()[0].contains("Total: 1,234,567.89"));
    assert!(de.lines()[0].contains("Total: 1.234.567,89"));
}

#[test]
fn builder_end_to_end_with_silent_logger() {
    let logger = LoggerBuilder::new()
        .min_level(LogLevel::Debug)
        .rate_limit(10_000, Duration::from_secs(1))
        .locale("en_US")
        .enrich(lunar_log::enrich::property("service", "billing"))
        .build()
        .unwrap();

    // No sinks: calls are safe and flush returns.
    logger.debug("into the void {x}", &[&1]);
    logger.flush();
}

#[test]
fn escaped_braces_render_literally() {
    let (logger, mem) = memory_logger(LogLevel::Info);
    logger.info("literal {{braces}} and {value}", &[&7]);
    logger.flush();
    assert_eq!(mem.messages()[0], "literal {braces} and 7");
}

#[test]
fn unterminated_placeholder_is_literal() {
    let (logger, mem) = memory_logger(LogLevel::Info);
    logger.info("tail {oops", &[]);
    logger.flush();
    assert_eq!(mem.messages(), vec!["tail {oops"]);
}
