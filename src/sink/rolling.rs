//! Rolling file sink: size, time, and hybrid rotation with retention and
//! recovery of pre-existing rolled files.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use crate::entry::LogEntry;

use super::{Sink, SinkCore};

/// Time-based rotation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollInterval {
    None,
    Daily,
    Hourly,
}

/// Rotation policy for a [`RollingFileSink`].
///
/// Rolled-file naming:
/// - size-only: `stem.NNN.ext` (three-digit zero-padded index, growing
///   wider past 999)
/// - time-only: `stem.<period>.ext` where the period key is `YYYY-MM-DD`
///   (daily) or `YYYY-MM-DD.HH` (hourly)
/// - hybrid: `stem.<period>.NNN.ext`, the index resetting each period
#[derive(Debug, Clone)]
pub struct RollingPolicy {
    base_path: PathBuf,
    max_size_bytes: u64,
    interval: RollInterval,
    max_files: usize,
    max_total_size: u64,
}

impl RollingPolicy {
    /// Size-based rolling: rotate when the current file reaches `max_bytes`.
    pub fn size(path: impl AsRef<Path>, max_bytes: u64) -> Self {
        RollingPolicy {
            base_path: path.as_ref().to_path_buf(),
            max_size_bytes: max_bytes,
            interval: RollInterval::None,
            max_files: 0,
            max_total_size: 0,
        }
    }

    /// Daily rolling. If rotation triggers twice within one day, the
    /// second rolled file overwrites the first (one rolled file per
    /// period).
    pub fn daily(path: impl AsRef<Path>) -> Self {
        RollingPolicy {
            base_path: path.as_ref().to_path_buf(),
            max_size_bytes: 0,
            interval: RollInterval::Daily,
            max_files: 0,
            max_total_size: 0,
        }
    }

    /// Hourly rolling. Same one-rolled-file-per-period caveat as
    /// [`RollingPolicy::daily`].
    pub fn hourly(path: impl AsRef<Path>) -> Self {
        RollingPolicy {
            base_path: path.as_ref().to_path_buf(),
            max_size_bytes: 0,
            interval: RollInterval::Hourly,
            max_files: 0,
            max_total_size: 0,
        }
    }

    /// Maximum size per file; on a daily/hourly policy this enables
    /// hybrid size+time rolling.
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Maximum number of rolled files to keep (0 = unlimited).
    pub fn max_files(mut self, n: usize) -> Self {
        self.max_files = n;
        self
    }

    /// Maximum total size of all rolled files combined (0 = unlimited).
    /// Oldest files are deleted first when the bound is exceeded.
    pub fn max_total_size(mut self, bytes: u64) -> Self {
        self.max_total_size = bytes;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn interval(&self) -> RollInterval {
        self.interval
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }
}

/// Rolled-name middle grammar: pure digits; `YYYY-MM-DD`;
/// `YYYY-MM-DD.<digits>`; `YYYY-MM-DD.HH.<digits>`.
static ROLLED_MIDDLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+|\d{4}-\d{2}-\d{2}(?:\.\d+)?|\d{4}-\d{2}-\d{2}\.\d{2}\.\d+)$").unwrap()
});

struct RollState {
    file: Option<BufWriter<File>>,
    current_size: u64,
    last_period: String,
    last_rolled_period: String,
    size_roll_index: u32,
    last_period_check: i64,
    rolled_files: VecDeque<PathBuf>,
}

/// File sink with rotation. All write/rotate/cleanup operations hold a
/// single per-sink mutex; formatting happens outside it.
pub struct RollingFileSink {
    core: SinkCore,
    policy: RollingPolicy,
    stem: String,
    ext: String,
    state: Mutex<RollState>,
}

impl RollingFileSink {
    pub fn new(policy: RollingPolicy) -> Self {
        let (stem, ext) = split_base_path(&policy.base_path);
        RollingFileSink {
            core: SinkCore::new(),
            policy,
            stem,
            ext,
            state: Mutex::new(RollState {
                file: None,
                current_size: 0,
                last_period: String::new(),
                last_rolled_period: String::new(),
                size_roll_index: 0,
                last_period_check: 0,
                rolled_files: VecDeque::new(),
            }),
        }
    }

    /// Paths of the currently-tracked rolled files, oldest first.
    pub fn rolled_files(&self) -> Vec<PathBuf> {
        self.state.lock().rolled_files.iter().cloned().collect()
    }

    fn ensure_open(&self, state: &mut RollState) {
        if state.file.is_some() {
            return;
        }
        if let Some(parent) = self.policy.base_path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.policy.base_path)
        {
            Ok(f) => f,
            Err(err) => {
                eprintln!(
                    "lunar-log: rolling sink failed to open {}: {}",
                    self.policy.base_path.display(),
                    err
                );
                return;
            }
        };
        state.current_size = file_size(&self.policy.base_path);
        state.file = Some(BufWriter::new(file));
        if self.policy.interval != RollInterval::None {
            let now = Local::now();
            state.last_period_check = now.timestamp();
            state.last_period = self.period_string(&now);
        }
        self.discover_rolled_files(state);
    }

    fn period_string(&self, now: &chrono::DateTime<Local>) -> String {
        match self.policy.interval {
            RollInterval::Hourly => now.format("%Y-%m-%d.%H").to_string(),
            _ => now.format("%Y-%m-%d").to_string(),
        }
    }

    fn needs_rotation(&self, state: &mut RollState) -> bool {
        if state.file.is_none() {
            return false;
        }
        if self.policy.max_size_bytes > 0 && state.current_size >= self.policy.max_size_bytes {
            return true;
        }
        if self.policy.interval != RollInterval::None {
            let now = Local::now();
            // Re-derive the period key at most once per wall-clock second.
            if now.timestamp() != state.last_period_check {
                state.last_period_check = now.timestamp();
                if self.period_string(&now) != state.last_period {
                    return true;
                }
            }
        }
        false
    }

    fn build_rolled_name(&self, state: &mut RollState) -> PathBuf {
        let has_size = self.policy.max_size_bytes > 0;
        let has_time = self.policy.interval != RollInterval::None;

        if has_time && has_size {
            if state.last_period != state.last_rolled_period {
                state.size_roll_index = 0;
                state.last_rolled_period = state.last_period.clone();
            }
            state.size_roll_index += 1;
            return PathBuf::from(format!(
                "{}.{}.{:03}{}",
                self.stem, state.last_period, state.size_roll_index, self.ext
            ));
        }
        if has_time {
            return PathBuf::from(format!("{}.{}{}", self.stem, state.last_period, self.ext));
        }
        state.size_roll_index += 1;
        PathBuf::from(format!("{}.{:03}{}", self.stem, state.size_roll_index, self.ext))
    }

    fn rotate(&self, state: &mut RollState) {
        if let Some(mut file) = state.file.take() {
            let _ = file.flush();
        }

        let rolled = self.build_rolled_name(state);
        match std::fs::rename(&self.policy.base_path, &rolled) {
            Ok(()) => state.rolled_files.push_back(rolled),
            Err(err) => eprintln!(
                "lunar-log: rolling sink failed to rename {} to {}: {}",
                self.policy.base_path.display(),
                rolled.display(),
                err
            ),
        }

        if self.policy.interval != RollInterval::None {
            let now = Local::now();
            state.last_period_check = now.timestamp();
            state.last_period = self.period_string(&now);
        }

        self.cleanup(state);

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.policy.base_path)
        {
            Ok(f) => {
                state.current_size = file_size(&self.policy.base_path);
                state.file = Some(BufWriter::new(f));
            }
            Err(err) => eprintln!(
                "lunar-log: rolling sink failed to reopen {}: {}",
                self.policy.base_path.display(),
                err
            ),
        }
    }

    fn cleanup(&self, state: &mut RollState) {
        if self.policy.max_files > 0 {
            while state.rolled_files.len() > self.policy.max_files {
                if let Some(oldest) = state.rolled_files.pop_front() {
                    let _ = std::fs::remove_file(oldest);
                }
            }
        }

        if self.policy.max_total_size > 0 {
            let sizes: Vec<u64> = state.rolled_files.iter().map(|p| file_size(p)).collect();
            let mut total: u64 = sizes.iter().sum();
            let mut idx = 0;
            while total > self.policy.max_total_size && !state.rolled_files.is_empty() {
                total -= sizes[idx];
                if let Some(oldest) = state.rolled_files.pop_front() {
                    let _ = std::fs::remove_file(oldest);
                }
                idx += 1;
            }
        }
    }

    /// Recovery scan: enumerate the directory, keep names matching
    /// `stem.<middle><ext>` with a valid middle, seed the rolled-file
    /// queue oldest-first (by mtime), and resume the size index from the
    /// highest one observed.
    fn discover_rolled_files(&self, state: &mut RollState) {
        state.rolled_files.clear();
        state.size_roll_index = 0;

        let stem_path = PathBuf::from(&self.stem);
        let dir = stem_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem_filename = match stem_path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => return,
        };
        let prefix = format!("{}.", stem_filename);

        let entries = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(_) => return,
        };

        struct Found {
            path: PathBuf,
            middle: String,
            mtime: SystemTime,
        }
        let mut found: Vec<Found> = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let middle = match name.strip_prefix(&prefix) {
                Some(rest) if !self.ext.is_empty() => match rest.strip_suffix(&self.ext) {
                    Some(mid) => mid.to_string(),
                    None => continue,
                },
                Some(rest) => rest.to_string(),
                None => continue,
            };
            if middle.is_empty() || !ROLLED_MIDDLE_RE.is_match(&middle) {
                continue;
            }
            let path = PathBuf::from(format!("{}.{}{}", self.stem, middle, self.ext));
            let mtime = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push(Found { path, middle, mtime });
        }

        found.sort_by_key(|f| f.mtime);

        let has_size = self.policy.max_size_bytes > 0;
        let has_time = self.policy.interval != RollInterval::None;

        for f in found {
            if has_size {
                let idx = if !has_time {
                    parse_leading_digits(&f.middle)
                } else if !state.last_period.is_empty() {
                    f.middle
                        .strip_prefix(&state.last_period)
                        .and_then(|rest| rest.strip_prefix('.'))
                        .map(parse_leading_digits)
                        .unwrap_or(0)
                } else {
                    0
                };
                if idx > state.size_roll_index {
                    state.size_roll_index = idx;
                }
            }
            state.rolled_files.push_back(f.path);
        }
    }

    fn write_line(&self, state: &mut RollState, formatted: &str) {
        if let Some(file) = state.file.as_mut() {
            if writeln!(file, "{}", formatted).and_then(|_| file.flush()).is_ok() {
                state.current_size += formatted.len() as u64 + 1;
            }
        }
    }
}

impl Sink for RollingFileSink {
    fn core(&self) -> &SinkCore {
        &self.core
    }

    fn write(&self, entry: &LogEntry) {
        let formatted = self.core.format(entry);

        let mut state = self.state.lock();
        self.ensure_open(&mut state);
        if self.needs_rotation(&mut state) {
            self.rotate(&mut state);
        }
        self.write_line(&mut state, &formatted);
    }

    fn flush(&self) {
        if let Some(file) = self.state.lock().file.as_mut() {
            let _ = file.flush();
        }
    }
}

fn split_base_path(path: &Path) -> (String, String) {
    let full = path.to_string_lossy();
    let sep = full.rfind(|c| c == '/' || c == '\\');
    match full.rfind('.') {
        Some(dot) if sep.map_or(true, |s| dot > s) => {
            (full[..dot].to_string(), full[dot..].to_string())
        }
        _ => (full.to_string(), String::new()),
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn parse_leading_digits(s: &str) -> u32 {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LogLevel;
    use tempfile::tempdir;

    fn write_n(sink: &RollingFileSink, n: usize, payload: &str) {
        for i in 0..n {
            sink.write(&LogEntry::new(LogLevel::Info, format!("{} {}", payload, i)));
        }
    }

    #[test]
    fn test_split_base_path() {
        assert_eq!(
            split_base_path(Path::new("/var/log/app.log")),
            ("/var/log/app".to_string(), ".log".to_string())
        );
        assert_eq!(
            split_base_path(Path::new("noext")),
            ("noext".to_string(), String::new())
        );
        // A dot in a directory name is not an extension separator.
        assert_eq!(
            split_base_path(Path::new("/srv/app.d/current")),
            ("/srv/app.d/current".to_string(), String::new())
        );
    }

    #[test]
    fn test_rolled_middle_grammar() {
        for ok in ["001", "123456", "2024-01-15", "2024-01-15.001", "2024-01-15.09.002"] {
            assert!(ROLLED_MIDDLE_RE.is_match(ok), "{} should match", ok);
        }
        for bad in ["", "abc", "2024-1-15", "2024-01-15.", "2024-01-15.xx.001", "001a"] {
            assert!(!ROLLED_MIDDLE_RE.is_match(bad), "{} should not match", bad);
        }
    }

    #[test]
    fn test_size_rotation_names_and_retention() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("roll.log");
        let sink = RollingFileSink::new(RollingPolicy::size(&base, 256).max_files(3));

        write_n(&sink, 60, "payload payload payload");

        let rolled = sink.rolled_files();
        assert_eq!(rolled.len(), 3);
        // Monotonic zero-padded indices, oldest first.
        for (a, b) in rolled.iter().zip(rolled.iter().skip(1)) {
            assert!(a.to_string_lossy() < b.to_string_lossy());
        }
        for p in &rolled {
            let name = p.file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with("roll."));
            assert!(name.ends_with(".log"));
            let middle = name
                .trim_start_matches("roll.")
                .trim_end_matches(".log")
                .to_string();
            assert_eq!(middle.len(), 3);
            assert!(middle.bytes().all(|b| b.is_ascii_digit()));
        }
        // Retention removed the earliest indices from disk.
        assert!(base.exists());
        let on_disk: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(on_disk.iter().filter(|n| *n != "roll.log").count(), 3);
    }

    #[test]
    fn test_recovery_resumes_index() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("roll.log");
        std::fs::write(dir.path().join("roll.001.log"), "old\n").unwrap();
        std::fs::write(dir.path().join("roll.002.log"), "old\n").unwrap();
        // Not a rolled file; must be ignored.
        std::fs::write(dir.path().join("roll.notes.log"), "x\n").unwrap();

        let sink = RollingFileSink::new(RollingPolicy::size(&base, 64));
        write_n(&sink, 20, "some reasonably long payload line");

        let rolled = sink.rolled_files();
        assert!(rolled.len() > 2);
        let names: Vec<String> = rolled
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"roll.001.log".to_string()));
        assert!(names.contains(&"roll.002.log".to_string()));
        // New indices continue after the recovered maximum.
        assert!(names.contains(&"roll.003.log".to_string()));
        assert!(!names.contains(&"roll.notes.log".to_string()));
    }

    #[test]
    fn test_max_total_size_retention() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("cap.log");
        let sink = RollingFileSink::new(RollingPolicy::size(&base, 128).max_total_size(300));

        write_n(&sink, 60, "a fairly long line of log payload data");

        let total: u64 = sink.rolled_files().iter().map(|p| file_size(p)).sum();
        assert!(total <= 300, "total rolled size {} exceeds bound", total);
    }
}
