//! Enrichers attach metadata to `custom_context` before delivery.
//!
//! Static enrichers (`property`, `from_env`, `machine_name`,
//! `environment`, `process_id`) evaluate once at construction and close
//! over the cached string; dynamic enrichers (`thread_id`, `caller`)
//! evaluate per entry.

use std::sync::Arc;

use crate::entry::LogEntry;

/// Function-object enricher. Applied in registration order; later
/// enrichers overwrite earlier keys, and user-set context wins over all
/// of them.
pub type Enricher = Arc<dyn Fn(&mut LogEntry) + Send + Sync>;

/// Attaches `threadId`: the producing thread's identifier.
pub fn thread_id() -> Enricher {
    Arc::new(|entry: &mut LogEntry| {
        let id = entry.thread_id.clone();
        entry.custom_context.insert("threadId".to_string(), id);
    })
}

/// Attaches `processId`, cached at construction (the PID is constant for
/// the process lifetime).
pub fn process_id() -> Enricher {
    let cached = std::process::id().to_string();
    Arc::new(move |entry: &mut LogEntry| {
        entry
            .custom_context
            .insert("processId".to_string(), cached.clone());
    })
}

/// Attaches `machine`: the hostname, cached at construction.
pub fn machine_name() -> Enricher {
    let cached = gethostname::gethostname().to_string_lossy().to_string();
    Arc::new(move |entry: &mut LogEntry| {
        entry
            .custom_context
            .insert("machine".to_string(), cached.clone());
    })
}

/// Attaches `environment` from `$APP_ENV`, falling back to
/// `$ENVIRONMENT`, cached at construction. Empty when neither is set.
pub fn environment() -> Enricher {
    let cached = std::env::var("APP_ENV")
        .or_else(|_| std::env::var("ENVIRONMENT"))
        .unwrap_or_default();
    Arc::new(move |entry: &mut LogEntry| {
        entry
            .custom_context
            .insert("environment".to_string(), cached.clone());
    })
}

/// Attaches a static key/value pair.
pub fn property(key: impl Into<String>, value: impl Into<String>) -> Enricher {
    let key = key.into();
    let value = value.into();
    Arc::new(move |entry: &mut LogEntry| {
        entry.custom_context.insert(key.clone(), value.clone());
    })
}

/// Attaches the value of an environment variable under `key`, cached at
/// construction.
pub fn from_env(var: &str, key: impl Into<String>) -> Enricher {
    let key = key.into();
    let cached = std::env::var(var).unwrap_or_default();
    Arc::new(move |entry: &mut LogEntry| {
        entry.custom_context.insert(key.clone(), cached.clone());
    })
}

/// Attaches `caller`: the function name from source location, only when
/// capture is enabled and the name is non-empty.
pub fn caller() -> Enricher {
    Arc::new(|entry: &mut LogEntry| {
        if !entry.function.is_empty() {
            let function = entry.function.clone();
            entry.custom_context.insert("caller".to_string(), function);
        }
    })
}
