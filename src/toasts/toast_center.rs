use chrono::{DateTime, Duration, Utc};
use log::{log, warn, Level};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Kind of feedback a toast carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToastLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl fmt::Display for ToastLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ToastLevel::Success => "success",
            ToastLevel::Info => "info",
            ToastLevel::Warning => "warning",
            ToastLevel::Error => "error",
        };
        f.write_str(label)
    }
}

/// How long each kind of toast stays visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToastDurations {
    pub success: std::time::Duration,
    pub info: std::time::Duration,
    pub warning: std::time::Duration,
    pub error: std::time::Duration,
}

impl Default for ToastDurations {
    fn default() -> Self {
        Self {
            success: std::time::Duration::from_millis(3000),
            info: std::time::Duration::from_millis(3000),
            warning: std::time::Duration::from_millis(3000),
            error: std::time::Duration::from_millis(5000),
        }
    }
}

impl ToastDurations {
    fn for_level(&self, level: ToastLevel) -> Duration {
        let duration = match level {
            ToastLevel::Success => self.success,
            ToastLevel::Info => self.info,
            ToastLevel::Warning => self.warning,
            ToastLevel::Error => self.error,
        };
        Duration::from_std(duration).unwrap_or_else(|_| Duration::seconds(5))
    }
}

/// A transient feedback message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub level: ToastLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub duration: Duration,
}

impl Toast {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + self.duration
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

impl fmt::Display for Toast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Holds the toasts currently on screen
///
/// Toasts dismiss themselves once their duration has elapsed; the console
/// calls [`ToastCenter::prune_expired`] on every tick. At most `max_visible`
/// toasts are kept, the oldest being dropped first. Every toast is also
/// written to the log, at debug level when the caller prints toasts itself.
#[derive(Debug)]
pub struct ToastCenter {
    active: VecDeque<Toast>,
    durations: ToastDurations,
    max_visible: usize,
    max_message_length: usize,
    next_id: u64,
    /// Highest id already handed out by `drain_new`
    drained_up_to: u64,
    printed_by_caller: bool,
}

impl Default for ToastCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl ToastCenter {
    pub fn new() -> Self {
        Self::with_settings(ToastDurations::default(), 5, 512)
    }

    pub fn with_settings(
        durations: ToastDurations,
        max_visible: usize,
        max_message_length: usize,
    ) -> Self {
        Self {
            active: VecDeque::new(),
            durations,
            max_visible: max_visible.max(1),
            max_message_length,
            next_id: 0,
            drained_up_to: 0,
            printed_by_caller: false,
        }
    }

    /// The caller prints every drained toast, so keep them out of the
    /// default log output
    pub fn printed_by_caller(mut self) -> Self {
        self.printed_by_caller = true;
        self
    }

    /// Log level a toast of `level` is written at
    pub fn log_level(&self, level: ToastLevel) -> Level {
        if self.printed_by_caller {
            return Level::Debug;
        }
        match level {
            ToastLevel::Error => Level::Error,
            ToastLevel::Warning => Level::Warn,
            ToastLevel::Success | ToastLevel::Info => Level::Info,
        }
    }

    pub fn success(&mut self, message: &str) -> u64 {
        self.push(ToastLevel::Success, message)
    }

    pub fn info(&mut self, message: &str) -> u64 {
        self.push(ToastLevel::Info, message)
    }

    pub fn warning(&mut self, message: &str) -> u64 {
        self.push(ToastLevel::Warning, message)
    }

    pub fn error(&mut self, message: &str) -> u64 {
        self.push(ToastLevel::Error, message)
    }

    pub fn push(&mut self, level: ToastLevel, message: &str) -> u64 {
        self.push_at(level, message, Utc::now())
    }

    /// Show a toast created at a specific time
    ///
    /// This is primarily used for testing with controlled timestamps.
    pub fn push_at(&mut self, level: ToastLevel, message: &str, now: DateTime<Utc>) -> u64 {
        let message = Self::truncate_text(message, self.max_message_length);

        log!(self.log_level(level), "{}", message);

        if self.active.len() >= self.max_visible {
            if let Some(dropped) = self.active.pop_front() {
                warn!("Too many toasts, dismissing oldest: {}", dropped.message);
            }
        }

        self.next_id += 1;
        self.active.push_back(Toast {
            id: self.next_id,
            level,
            message,
            created_at: now,
            duration: self.durations.for_level(level),
        });
        self.next_id
    }

    /// Dismiss toasts whose time is up, returning how many were removed
    pub fn prune_expired(&mut self) -> usize {
        self.prune_expired_at(Utc::now())
    }

    pub fn prune_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.active.len();
        self.active.retain(|toast| !toast.is_expired_at(now));
        before - self.active.len()
    }

    /// Dismiss a toast early (the "close" action)
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.active.len();
        self.active.retain(|toast| toast.id != id);
        before != self.active.len()
    }

    pub fn active(&self) -> impl Iterator<Item = &Toast> {
        self.active.iter()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn latest(&self) -> Option<&Toast> {
        self.active.back()
    }

    /// Toasts not handed out before, oldest first
    pub fn drain_new(&mut self) -> Vec<Toast> {
        let fresh: Vec<Toast> = self
            .active
            .iter()
            .filter(|toast| toast.id > self.drained_up_to)
            .cloned()
            .collect();
        self.drained_up_to = self.next_id;
        fresh
    }

    /// Truncate text at a UTF-8 boundary, marking the cut with "..."
    fn truncate_text(text: &str, max_length: usize) -> String {
        if text.len() <= max_length {
            return text.to_string();
        }

        let mut truncate_at = max_length.saturating_sub(3);
        while truncate_at > 0 && !text.is_char_boundary(truncate_at) {
            truncate_at -= 1;
        }
        format!("{}...", &text[..truncate_at])
    }
}

/// Cloneable handle panels use to raise toasts
#[derive(Debug, Clone, Default)]
pub struct Toaster {
    center: Arc<Mutex<ToastCenter>>,
}

impl Toaster {
    pub fn new(center: ToastCenter) -> Self {
        Self {
            center: Arc::new(Mutex::new(center)),
        }
    }

    /// Lock the underlying center; a poisoned lock is recovered
    pub fn lock(&self) -> MutexGuard<'_, ToastCenter> {
        self.center.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn success(&self, message: &str) {
        self.lock().success(message);
    }

    pub fn info(&self, message: &str) {
        self.lock().info(message);
    }

    pub fn warning(&self, message: &str) {
        self.lock().warning(message);
    }

    pub fn error(&self, message: &str) {
        self.lock().error(message);
    }

    pub fn latest(&self) -> Option<Toast> {
        self.lock().latest().cloned()
    }

    pub fn tick(&self) -> usize {
        self.lock().prune_expired()
    }

    pub fn drain_new(&self) -> Vec<Toast> {
        self.lock().drain_new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_durations() {
        let mut center = ToastCenter::new();
        center.success("saved");
        center.error("failed");
        center.info("done");
        center.warning("throttled");

        let durations: Vec<i64> = center.active().map(|t| t.duration.num_milliseconds()).collect();
        assert_eq!(durations, vec![3000, 5000, 3000, 3000]);
    }

    #[test]
    fn test_toasts_expire() {
        let mut center = ToastCenter::new();
        let start = Utc::now();
        center.push_at(ToastLevel::Success, "saved", start);
        center.push_at(ToastLevel::Error, "failed", start);

        assert_eq!(center.prune_expired_at(start + Duration::milliseconds(2999)), 0);
        assert_eq!(center.prune_expired_at(start + Duration::milliseconds(3000)), 1);
        assert_eq!(center.latest().unwrap().level, ToastLevel::Error);
        assert_eq!(center.prune_expired_at(start + Duration::milliseconds(5000)), 1);
        assert_eq!(center.active_count(), 0);
    }

    #[test]
    fn test_visible_cap_drops_oldest() {
        let mut center = ToastCenter::with_settings(ToastDurations::default(), 2, 512);
        center.info("first");
        center.info("second");
        center.info("third");

        let messages: Vec<&str> = center.active().map(|t| t.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "third"]);
    }

    #[test]
    fn test_dismiss() {
        let mut center = ToastCenter::new();
        let id = center.error("failed");
        assert!(center.dismiss(id));
        assert!(!center.dismiss(id));
        assert_eq!(center.active_count(), 0);
    }

    #[test]
    fn test_drain_new_hands_out_each_toast_once() {
        let mut center = ToastCenter::new();
        center.success("one");
        center.success("two");
        assert_eq!(center.drain_new().len(), 2);
        assert!(center.drain_new().is_empty());

        center.warning("three");
        let fresh = center.drain_new();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].message, "three");
    }

    #[test]
    fn test_log_level_follows_toast_level() {
        let center = ToastCenter::new();
        assert_eq!(center.log_level(ToastLevel::Error), Level::Error);
        assert_eq!(center.log_level(ToastLevel::Warning), Level::Warn);
        assert_eq!(center.log_level(ToastLevel::Success), Level::Info);
    }

    #[test]
    fn test_printed_toasts_log_at_debug() {
        let mut center = ToastCenter::new().printed_by_caller();
        assert_eq!(center.log_level(ToastLevel::Error), Level::Debug);
        assert_eq!(center.log_level(ToastLevel::Warning), Level::Debug);

        // Still queued and drained as usual
        center.error("Error creating client: duplicate");
        let drained: Vec<Toast> = center.drain_new();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].level, ToastLevel::Error);
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(ToastCenter::truncate_text("short", 10), "short");
        assert_eq!(ToastCenter::truncate_text("exactly10!", 10), "exactly10!");
        assert_eq!(ToastCenter::truncate_text("this is too long", 10), "this is...");
    }

    #[test]
    fn test_truncate_text_respects_char_boundaries() {
        // 'é' is two bytes; the cut must not land inside it
        let text = "ééééééé";
        let truncated = ToastCenter::truncate_text(text, 8);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 8);
        assert_eq!(truncated, "éé...");
    }

    #[test]
    fn test_long_messages_are_truncated_on_push() {
        let mut center = ToastCenter::with_settings(ToastDurations::default(), 5, 20);
        center.error(&"x".repeat(100));
        assert_eq!(center.latest().unwrap().message.len(), 20);
    }

    #[test]
    fn test_toaster_shares_center() {
        let toaster = Toaster::default();
        let clone = toaster.clone();
        clone.warning("Rate limit exceeded");

        let latest = toaster.latest().unwrap();
        assert_eq!(latest.level, ToastLevel::Warning);
        assert_eq!(latest.to_string(), "[warning] Rate limit exceeded");
    }
}
