use crate::config::RetrySettings;
use rand::Rng;
use std::time::Duration;
use streamkv_common::metadata::{retry_delay_of, routing_cookies_of};
use streamkv_common::{Code, MetadataMap, Status};

/// Codes after which an attempt is worth repeating
pub fn is_transient(code: Code) -> bool {
    matches!(
        code,
        Code::Unavailable | Code::Aborted | Code::DeadlineExceeded
    )
}

/// Exponential backoff with up to 25% jitter
#[derive(Debug)]
pub struct Backoff {
    settings: RetrySettings,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(settings: RetrySettings) -> Self {
        let current = settings.initial_backoff;
        Self {
            settings,
            current,
            attempts: 0,
        }
    }

    /// Attempts made so far, counting the first one
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn exhausted(&self) -> bool {
        self.settings
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
    }

    /// Delay before the next attempt. A server hint wins over the computed
    /// value, the backoff still advances either way.
    pub fn next_delay(&mut self, server_hint: Option<Duration>) -> Duration {
        let base = self.current;
        let next = base.mul_f64(self.settings.multiplier.max(1.0));
        self.current = next.min(self.settings.max_backoff);
        match server_hint {
            Some(hint) => hint,
            None => {
                let jitter = rand::thread_rng().gen_range(1.0..=1.25);
                base.mul_f64(jitter)
            }
        }
    }
}

/// Server hints carried from one attempt of an operation to the next
#[derive(Debug, Default, Clone)]
pub struct RoutingState {
    cookies: MetadataMap,
    retry_delay: Option<Duration>,
}

impl RoutingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cookies stay until a later error carries new ones; the retry delay
    /// only ever reflects the latest error.
    pub fn observe(&mut self, status: &Status) {
        let cookies = routing_cookies_of(&status.metadata);
        if !cookies.is_empty() {
            self.cookies = cookies;
        }
        self.retry_delay = retry_delay_of(status);
    }

    pub fn cookies(&self) -> &MetadataMap {
        &self.cookies
    }

    pub fn retry_delay(&self) -> Option<Duration> {
        self.retry_delay
    }

    /// Echo the sticky cookies on an outgoing attempt
    pub fn apply(&self, metadata: &mut MetadataMap) {
        metadata.merge(&self.cookies);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamkv_common::metadata::{attach_retry_info, encode_routing_cookie};

    const COOKIE_HEADER: &str = "x-goog-cbt-cookie-test";

    fn error_with_cookie(cookie: &str) -> Status {
        let mut status = Status::unavailable("retry");
        encode_routing_cookie(&mut status.metadata, COOKIE_HEADER, cookie);
        status
    }

    #[test]
    fn test_transient_codes() {
        assert!(is_transient(Code::Unavailable));
        assert!(is_transient(Code::Aborted));
        assert!(is_transient(Code::DeadlineExceeded));
        assert!(!is_transient(Code::PermissionDenied));
        assert!(!is_transient(Code::Internal));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = Backoff::new(RetrySettings {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            multiplier: 2.0,
            max_attempts: None,
        });
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay(None)).collect();
        assert!(delays[0] >= Duration::from_millis(10) && delays[0] <= Duration::from_micros(12_500));
        assert!(delays[1] >= Duration::from_millis(20));
        assert!(delays[2] >= Duration::from_millis(40));
        assert!(delays[4] <= Duration::from_millis(50));
    }

    #[test]
    fn test_server_hint_wins() {
        let mut backoff = Backoff::new(RetrySettings::default());
        assert_eq!(
            backoff.next_delay(Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        // The hint consumed a step of the schedule
        assert!(backoff.next_delay(None) >= Duration::from_millis(20));
    }

    #[test]
    fn test_max_attempts() {
        let mut backoff = Backoff::new(RetrySettings {
            max_attempts: Some(2),
            ..Default::default()
        });
        backoff.record_attempt();
        assert!(!backoff.exhausted());
        backoff.record_attempt();
        assert!(backoff.exhausted());
    }

    #[test]
    fn test_cookie_is_sticky_until_replaced() {
        let mut state = RoutingState::new();
        state.observe(&error_with_cookie("test-cookie"));
        state.observe(&Status::unavailable("no cookie"));

        let mut md = MetadataMap::new();
        state.apply(&mut md);
        assert_eq!(md.get(COOKIE_HEADER), Some("test-cookie"));

        state.observe(&error_with_cookie("new-test-cookie"));
        let mut md = MetadataMap::new();
        state.apply(&mut md);
        assert_eq!(md.get(COOKIE_HEADER), Some("new-test-cookie"));
    }

    #[test]
    fn test_retry_delay_reflects_latest_error() {
        let mut state = RoutingState::new();
        let mut status = Status::unavailable("slow down");
        attach_retry_info(&mut status, Duration::from_secs(2));
        state.observe(&status);
        assert_eq!(state.retry_delay(), Some(Duration::from_secs(2)));

        state.observe(&Status::unavailable("plain"));
        assert_eq!(state.retry_delay(), None);
    }
}
