//! Ordered accept/reject predicates evaluated per record.
//!
//! This module provides:
//! - [`Filter`] — The predicate capability a [`FilterChain`] evaluates
//! - [`FilterChain`] — Short-circuiting, insertion-ordered evaluation
//! - Built-in stateful predicates: [`LevelFilter`], [`RegexFilter`],
//!   [`RateLimitFilter`], [`UserFilter`], [`TimeWindowFilter`],
//!   [`KeywordFilter`], [`SamplingFilter`], [`DuplicateFilter`]
//! - [`FnFilter`] — Adapter for closures

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use regex::Regex;

use crate::error::{LoggerError, Result};
use crate::types::{LogContext, LogLevel};

/// A predicate deciding whether a record may be logged.
///
/// Implementations may carry internal state (counters, windows); they are
/// shared across threads, so that state needs interior synchronisation.
pub trait Filter: Send + Sync {
    /// Returns true to accept the record.
    fn accept(&self, message: &str, level: LogLevel, context: &LogContext) -> bool;
}

/// Adapter turning a closure into a [`Filter`].
pub struct FnFilter<F>(pub F);

impl<F> Filter for FnFilter<F>
where
    F: Fn(&str, LogLevel, &LogContext) -> bool + Send + Sync,
{
    fn accept(&self, message: &str, level: LogLevel, context: &LogContext) -> bool {
        (self.0)(message, level, context)
    }
}

/// Ordered list of filters; a record passes only if every filter accepts.
///
/// Evaluation stops at the first rejection, so filters after a rejecting
/// one do not observe that record. Adding or clearing filters waits for
/// in-flight evaluations to finish.
#[derive(Default)]
pub struct FilterChain {
    filters: RwLock<Vec<Arc<dyn Filter>>>,
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filter_count())
            .finish()
    }
}

impl FilterChain {
    /// Creates an empty chain, which accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter to the end of the chain.
    pub fn add_filter(&self, filter: Arc<dyn Filter>) {
        self.filters.write().push(filter);
    }

    /// Appends a closure as a filter.
    pub fn add_fn<F>(&self, predicate: F)
    where
        F: Fn(&str, LogLevel, &LogContext) -> bool + Send + Sync + 'static,
    {
        self.add_filter(Arc::new(FnFilter(predicate)));
    }

    /// Removes every filter.
    pub fn clear_filters(&self) {
        self.filters.write().clear();
    }

    /// Evaluates the chain in insertion order, stopping at the first rejection.
    #[must_use]
    pub fn should_log(&self, message: &str, level: LogLevel, context: &LogContext) -> bool {
        self.filters
            .read()
            .iter()
            .all(|filter| filter.accept(message, level, context))
    }

    /// Number of filters in the chain.
    #[must_use]
    pub fn filter_count(&self) -> usize {
        self.filters.read().len()
    }
}

/// Accepts records at or above a minimum level.
#[derive(Debug, Clone, Copy)]
pub struct LevelFilter {
    min: LogLevel,
}

impl LevelFilter {
    /// Creates a level filter.
    #[must_use]
    pub const fn new(min: LogLevel) -> Self {
        Self { min }
    }
}

impl Filter for LevelFilter {
    fn accept(&self, _message: &str, level: LogLevel, _context: &LogContext) -> bool {
        level >= self.min
    }
}

/// Accepts messages that match (`include`) or don't match (`!include`) a pattern.
#[derive(Debug, Clone)]
pub struct RegexFilter {
    pattern: Regex,
    include: bool,
}

impl RegexFilter {
    /// Compiles `pattern` into a filter.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfig`] if the pattern does not compile.
    pub fn new(pattern: &str, include: bool) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| LoggerError::invalid_config(format!("invalid filter regex: {e}")))?;
        Ok(Self { pattern, include })
    }
}

impl Filter for RegexFilter {
    fn accept(&self, message: &str, _level: LogLevel, _context: &LogContext) -> bool {
        self.include == self.pattern.is_match(message)
    }
}

#[derive(Debug)]
struct RateWindow {
    started: Instant,
    count: u32,
}

/// Accepts at most `max_per_second` records per one-second window.
#[derive(Debug)]
pub struct RateLimitFilter {
    max_per_second: u32,
    window: Mutex<RateWindow>,
}

impl RateLimitFilter {
    const WINDOW: Duration = Duration::from_secs(1);

    /// Creates a rate limiter. `0` rejects everything.
    #[must_use]
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            window: Mutex::new(RateWindow {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Records accepted in the current window.
    #[must_use]
    pub fn current_count(&self) -> u32 {
        self.window.lock().count
    }
}

impl Filter for RateLimitFilter {
    fn accept(&self, _message: &str, _level: LogLevel, _context: &LogContext) -> bool {
        let mut window = self.window.lock();
        let now = Instant::now();
        if now.duration_since(window.started) >= Self::WINDOW {
            window.started = now;
            window.count = 0;
        }

        if window.count < self.max_per_second {
            window.count += 1;
            true
        } else {
            false
        }
    }
}

/// Accepts records without a user, or whose user is allowed.
#[derive(Debug, Clone)]
pub struct UserFilter {
    allowed: HashSet<String>,
}

impl UserFilter {
    /// Creates a user filter from the allowed IDs.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Filter for UserFilter {
    fn accept(&self, _message: &str, _level: LogLevel, context: &LogContext) -> bool {
        context
            .user_id()
            .is_none_or(|user| self.allowed.contains(user))
    }
}

/// Accepts records only while the wall clock lies in `[start, end]`.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindowFilter {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindowFilter {
    /// Creates a time window filter (both bounds inclusive).
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Checks whether `at` lies inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

impl Filter for TimeWindowFilter {
    fn accept(&self, _message: &str, _level: LogLevel, _context: &LogContext) -> bool {
        self.contains(Utc::now())
    }
}

/// Accepts messages that contain (`include`) or lack (`!include`) any keyword.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    keywords: Vec<String>,
    include: bool,
}

impl KeywordFilter {
    /// Creates a keyword filter.
    pub fn new<I, S>(keywords: I, include: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            include,
        }
    }
}

impl Filter for KeywordFilter {
    fn accept(&self, message: &str, _level: LogLevel, _context: &LogContext) -> bool {
        let found = self.keywords.iter().any(|k| message.contains(k.as_str()));
        self.include == found
    }
}

/// Deterministically keeps one record in every `floor(1 / rate)`.
#[derive(Debug)]
pub struct SamplingFilter {
    rate: f64,
    counter: AtomicU64,
}

impl SamplingFilter {
    /// Creates a sampling filter.
    #[must_use]
    pub const fn new(rate: f64) -> Self {
        Self {
            rate,
            counter: AtomicU64::new(0),
        }
    }

    /// Number of records seen so far.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Filter for SamplingFilter {
    fn accept(&self, _message: &str, _level: LogLevel, _context: &LogContext) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        if self.rate <= 0.0 {
            return false;
        }
        let interval = (1.0 / self.rate).floor() as u64;
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        index % interval.max(1) == 0
    }
}

/// Suppresses a message repeated within `window` of its last acceptance.
///
/// Keyed on the exact message text only; level and context are ignored.
#[derive(Debug)]
pub struct DuplicateFilter {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DuplicateFilter {
    /// Creates a duplicate filter. A zero window never suppresses.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Number of messages currently remembered.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.seen.lock().len()
    }
}

impl Filter for DuplicateFilter {
    fn accept(&self, message: &str, _level: LogLevel, _context: &LogContext) -> bool {
        if self.window.is_zero() {
            return true;
        }

        let now = Instant::now();
        let mut seen = self.seen.lock();
        seen.retain(|_, accepted_at| now.duration_since(*accepted_at) < self.window);

        if seen.contains_key(message) {
            false
        } else {
            seen.insert(message.to_string(), now);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use test_case::test_case;

    fn ctx() -> LogContext {
        LogContext::new()
    }

    /// Accepts everything and counts how often it ran.
    #[derive(Default)]
    struct CountingFilter {
        calls: AtomicU64,
    }

    impl Filter for CountingFilter {
        fn accept(&self, _message: &str, _level: LogLevel, _context: &LogContext) -> bool {
            self.calls.fetch_add(1, Ordering::Relaxed);
            true
        }
    }

    // ===========================================
    // FilterChain Tests
    // ===========================================

    #[test]
    fn empty_chain_accepts_everything() {
        let chain = FilterChain::new();
        assert_eq!(chain.filter_count(), 0);
        assert!(chain.should_log("anything", LogLevel::Trace, &ctx()));
    }

    #[test]
    fn chain_short_circuits_on_first_rejection() {
        let chain = FilterChain::new();
        let observer = Arc::new(CountingFilter::default());
        chain.add_fn(|_, _, _| false);
        chain.add_filter(Arc::clone(&observer) as Arc<dyn Filter>);

        assert!(!chain.should_log("m", LogLevel::Info, &ctx()));
        assert_eq!(observer.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn rejecting_filter_still_updates_its_own_state() {
        let chain = FilterChain::new();
        let limiter = Arc::new(RateLimitFilter::new(1));
        let observer = Arc::new(CountingFilter::default());
        chain.add_filter(Arc::clone(&limiter) as Arc<dyn Filter>);
        chain.add_filter(Arc::clone(&observer) as Arc<dyn Filter>);

        assert!(chain.should_log("a", LogLevel::Info, &ctx()));
        assert!(!chain.should_log("b", LogLevel::Info, &ctx()));

        assert_eq!(limiter.current_count(), 1);
        assert_eq!(observer.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn chain_requires_all_filters() {
        let chain = FilterChain::new();
        chain.add_filter(Arc::new(LevelFilter::new(LogLevel::Warn)));
        chain.add_filter(Arc::new(KeywordFilter::new(["db"], true)));

        assert!(chain.should_log("db down", LogLevel::Error, &ctx()));
        assert!(!chain.should_log("db down", LogLevel::Info, &ctx()));
        assert!(!chain.should_log("cache down", LogLevel::Error, &ctx()));
    }

    #[test]
    fn clear_filters_restores_accept_all() {
        let chain = FilterChain::new();
        chain.add_fn(|_, _, _| false);
        assert_eq!(chain.filter_count(), 1);

        chain.clear_filters();

        assert_eq!(chain.filter_count(), 0);
        assert!(chain.should_log("m", LogLevel::Info, &ctx()));
    }

    #[test]
    fn concurrent_evaluation_and_mutation() {
        let chain = Arc::new(FilterChain::new());
        let mut handles = Vec::new();
        for i in 0..4 {
            let chain = Arc::clone(&chain);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    if i == 0 {
                        chain.add_filter(Arc::new(LevelFilter::new(LogLevel::Trace)));
                    } else {
                        assert!(chain.should_log("m", LogLevel::Info, &LogContext::new()));
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread panicked");
        }
        assert_eq!(chain.filter_count(), 100);
    }

    // ===========================================
    // Built-in Filter Tests
    // ===========================================

    #[test_case(LogLevel::Debug, false ; "below minimum")]
    #[test_case(LogLevel::Warn, true ; "at minimum")]
    #[test_case(LogLevel::Critical, true ; "above minimum")]
    fn level_filter(level: LogLevel, expected: bool) {
        let filter = LevelFilter::new(LogLevel::Warn);
        assert_eq!(filter.accept("m", level, &ctx()), expected);
    }

    #[test_case("user 42 logged in", true, true ; "include match")]
    #[test_case("heartbeat", true, false ; "include miss")]
    #[test_case("user 42 logged in", false, false ; "exclude match")]
    #[test_case("heartbeat", false, true ; "exclude miss")]
    fn regex_filter(message: &str, include: bool, expected: bool) {
        let filter = RegexFilter::new(r"user \d+", include).expect("valid regex");
        assert_eq!(filter.accept(message, LogLevel::Info, &ctx()), expected);
    }

    #[test]
    fn regex_filter_rejects_bad_pattern() {
        let result = RegexFilter::new("(unclosed", true);
        assert!(result.is_err());
    }

    #[test]
    fn rate_limit_window_reset() {
        let filter = RateLimitFilter::new(2);
        let results: Vec<bool> = (0..5)
            .map(|_| filter.accept("m", LogLevel::Info, &ctx()))
            .collect();
        assert_eq!(results, vec![true, true, false, false, false]);

        thread::sleep(Duration::from_millis(1100));

        assert!(filter.accept("m", LogLevel::Info, &ctx()));
    }

    #[test]
    fn rate_limit_zero_rejects_everything() {
        let filter = RateLimitFilter::new(0);
        assert!(!filter.accept("m", LogLevel::Critical, &ctx()));
        assert!(!filter.accept("m", LogLevel::Critical, &ctx()));
    }

    #[test]
    fn user_filter_allows_anonymous_and_listed() {
        let filter = UserFilter::new(["alice", "bob"]);
        assert!(filter.accept("m", LogLevel::Info, &ctx()));
        assert!(filter.accept("m", LogLevel::Info, &ctx().with_user_id("")));
        assert!(filter.accept("m", LogLevel::Info, &ctx().with_user_id("alice")));
        assert!(!filter.accept("m", LogLevel::Info, &ctx().with_user_id("mallory")));
    }

    #[test]
    fn time_window_filter_bounds() {
        let now = Utc::now();
        let open = TimeWindowFilter::new(now - chrono::Duration::hours(1), now + chrono::Duration::hours(1));
        assert!(open.accept("m", LogLevel::Info, &ctx()));

        let past = TimeWindowFilter::new(now - chrono::Duration::hours(2), now - chrono::Duration::hours(1));
        assert!(!past.accept("m", LogLevel::Info, &ctx()));

        let bounds = TimeWindowFilter::new(now, now + chrono::Duration::seconds(5));
        assert!(bounds.contains(now));
        assert!(bounds.contains(now + chrono::Duration::seconds(5)));
        assert!(!bounds.contains(now - chrono::Duration::seconds(1)));
    }

    #[test_case(&["error", "fail"], true, "request failed", true ; "include hit")]
    #[test_case(&["error", "fail"], true, "all good", false ; "include miss")]
    #[test_case(&["error", "fail"], false, "request failed", false ; "exclude hit")]
    #[test_case(&[], true, "anything", false ; "empty include rejects")]
    #[test_case(&[], false, "anything", true ; "empty exclude accepts")]
    fn keyword_filter(keywords: &[&str], include: bool, message: &str, expected: bool) {
        let filter = KeywordFilter::new(keywords.iter().copied(), include);
        assert_eq!(filter.accept(message, LogLevel::Info, &ctx()), expected);
    }

    #[test]
    fn sampling_filter_every_other() {
        let filter = SamplingFilter::new(0.5);
        let results: Vec<bool> = (0..6)
            .map(|_| filter.accept("m", LogLevel::Info, &ctx()))
            .collect();
        assert_eq!(results, vec![true, false, true, false, true, false]);
        assert_eq!(filter.calls(), 6);
    }

    #[test]
    fn sampling_filter_uses_floor_of_inverse_rate() {
        // 1 / 0.3 = 3.33 -> every third call
        let filter = SamplingFilter::new(0.3);
        let accepted = (0..9)
            .filter(|_| filter.accept("m", LogLevel::Info, &ctx()))
            .count();
        assert_eq!(accepted, 3);
    }

    #[test_case(1.0, true ; "full rate")]
    #[test_case(2.5, true ; "above one")]
    #[test_case(0.0, false ; "zero")]
    #[test_case(-1.0, false ; "negative")]
    fn sampling_filter_extremes(rate: f64, expected: bool) {
        let filter = SamplingFilter::new(rate);
        for _ in 0..4 {
            assert_eq!(filter.accept("m", LogLevel::Info, &ctx()), expected);
        }
    }

    #[test]
    fn duplicate_filter_suppresses_within_window() {
        let filter = DuplicateFilter::new(Duration::from_secs(2));
        assert!(filter.accept("m", LogLevel::Info, &ctx()));
        assert!(!filter.accept("m", LogLevel::Info, &ctx()));
        // Different level and context still count as the same message
        assert!(!filter.accept("m", LogLevel::Error, &ctx().with_user_id("u")));
        assert!(filter.accept("other", LogLevel::Info, &ctx()));

        thread::sleep(Duration::from_secs(2));

        assert!(filter.accept("m", LogLevel::Info, &ctx()));
    }

    #[test]
    fn duplicate_filter_purges_expired_entries() {
        let filter = DuplicateFilter::new(Duration::from_millis(50));
        assert!(filter.accept("a", LogLevel::Info, &ctx()));
        assert!(filter.accept("b", LogLevel::Info, &ctx()));
        assert_eq!(filter.tracked(), 2);

        thread::sleep(Duration::from_millis(80));
        assert!(filter.accept("c", LogLevel::Info, &ctx()));

        assert_eq!(filter.tracked(), 1);
    }

    #[test]
    fn duplicate_filter_zero_window_never_suppresses() {
        let filter = DuplicateFilter::new(Duration::ZERO);
        for _ in 0..3 {
            assert!(filter.accept("m", LogLevel::Info, &ctx()));
        }
    }
}
