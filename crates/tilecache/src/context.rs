//! Build context collecting log entries and phase timers during bulk builds
//!
//! Entries are kept in memory for inspection after a build and mirrored to
//! the `log` facade as they are recorded.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use web_time::Instant;

/// Default bound on retained log entries
pub const MAX_LOG_ENTRIES: usize = 1024;

/// Log level for context messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

/// Bulk build phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerCategory {
    /// Whole build
    Total,
    /// Rasterizing tile columns into heightfield layers
    RasterizeLayers,
    /// Encoding layers and inserting them into the cache
    CompressLayers,
    /// Building navigation mesh tiles from stored layers
    BuildNavMeshTiles,
}

/// Recorded log message
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: Instant,
    pub message: String,
    /// Optional grouping, usually a tile coordinate
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct TimerTotal {
    duration: Duration,
    count: usize,
}

/// Collects diagnostics for a bulk build
#[derive(Debug)]
pub struct BuildContext {
    logs: VecDeque<LogEntry>,
    active_timers: HashMap<TimerCategory, Instant>,
    timers: HashMap<TimerCategory, TimerTotal>,
    min_log_level: LogLevel,
    enable_timing: bool,
    max_log_entries: usize,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildContext {
    pub fn new() -> Self {
        Self {
            logs: VecDeque::new(),
            active_timers: HashMap::new(),
            timers: HashMap::new(),
            min_log_level: LogLevel::Info,
            enable_timing: true,
            max_log_entries: MAX_LOG_ENTRIES,
        }
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.min_log_level = level;
    }

    pub fn set_timing_enabled(&mut self, enabled: bool) {
        self.enable_timing = enabled;
    }

    /// Bounds retained entries; the oldest are dropped first
    pub fn set_max_log_entries(&mut self, max_entries: usize) {
        self.max_log_entries = max_entries;
        while self.logs.len() > self.max_log_entries {
            self.logs.pop_front();
        }
    }

    pub fn log_debug(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, None);
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn log_warning(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message, None);
    }

    pub fn log_warning_with_category(
        &mut self,
        message: impl Into<String>,
        category: impl Into<String>,
    ) {
        self.log(LogLevel::Warning, message, Some(category.into()));
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, None);
    }

    pub fn log_error_with_category(
        &mut self,
        message: impl Into<String>,
        category: impl Into<String>,
    ) {
        self.log(LogLevel::Error, message, Some(category.into()));
    }

    fn log(&mut self, level: LogLevel, message: impl Into<String>, category: Option<String>) {
        let message = message.into();

        let target = match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        };
        match &category {
            Some(c) => log::log!(target, "[{}] {}", c, message),
            None => log::log!(target, "{}", message),
        }

        if level < self.min_log_level || self.max_log_entries == 0 {
            return;
        }
        if self.logs.len() == self.max_log_entries {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            level,
            timestamp: Instant::now(),
            message,
            category,
        });
    }

    pub fn start_timer(&mut self, category: TimerCategory) {
        if self.enable_timing {
            self.active_timers.insert(category, Instant::now());
        }
    }

    /// Stops a running timer and adds its time to the category total
    pub fn stop_timer(&mut self, category: TimerCategory) {
        if let Some(start) = self.active_timers.remove(&category) {
            let total = self.timers.entry(category).or_default();
            total.duration += start.elapsed();
            total.count += 1;
        }
    }

    /// Accumulated time for a category
    pub fn timer_duration(&self, category: TimerCategory) -> Option<Duration> {
        self.timers.get(&category).map(|t| t.duration)
    }

    /// How many times a category timer was stopped
    pub fn timer_count(&self, category: TimerCategory) -> usize {
        self.timers.get(&category).map_or(0, |t| t.count)
    }

    pub fn logs(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        self.logs.iter()
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    pub fn logs_by_level(&self, level: LogLevel) -> Vec<&LogEntry> {
        self.logs.iter().filter(|e| e.level == level).collect()
    }

    pub fn logs_by_category(&self, category: &str) -> Vec<&LogEntry> {
        self.logs
            .iter()
            .filter(|e| e.category.as_deref() == Some(category))
            .collect()
    }

    /// Clears logs and timers
    pub fn reset(&mut self) {
        self.logs.clear();
        self.active_timers.clear();
        self.timers.clear();
    }

    /// Writes the timer totals to the `log` facade, slowest first
    pub fn log_timer_summary(&self) {
        let mut sorted: Vec<_> = self.timers.iter().collect();
        sorted.sort_by(|a, b| b.1.duration.cmp(&a.1.duration));

        for (category, total) in sorted {
            let ms = total.duration.as_secs_f64() * 1000.0;
            log::info!(
                "{:20} {:8.2}ms ({} calls, avg: {:.2}ms)",
                format!("{:?}", category),
                ms,
                total.count,
                ms / total.count.max(1) as f64
            );
        }
    }
}
