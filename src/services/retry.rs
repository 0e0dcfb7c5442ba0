// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Response classification for provider reads.
//!
//! A pure function over (status, Retry-After, remaining budget, attempt
//! history) that decides what the client does next. Each recovery (forced
//! token refresh, rate-limit wait) happens at most once per call.

use std::time::Duration;

/// Wait used when Retry-After is absent or out of range.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Longest Retry-After honored.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(300);

/// Budget kept in reserve for the retried request after a wait.
pub const RATE_LIMIT_SAFETY_MARGIN: Duration = Duration::from_secs(5);

/// Recoveries already spent on this call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttemptState {
    pub refreshed: bool,
    pub waited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    Accept,
    RefreshAndRetry,
    WaitAndRetry(Duration),
    Fail(Failure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Second authorization rejection
    AuthRejected,
    /// Second rate-limit response
    RateLimited,
    /// The wait would not fit in the caller's deadline
    InsufficientBudget { wait: Duration, remaining: Duration },
    /// Any other non-success status
    Remote { status: u16 },
}

/// Parse a Retry-After value in seconds and clamp it to [1s, 300s].
///
/// Missing, unparsable, zero/negative or oversized values fall back to 60s.
pub fn clamp_retry_after(header: Option<&str>) -> Duration {
    match header.and_then(|h| h.trim().parse::<i64>().ok()) {
        Some(secs) if secs >= 1 && secs as u64 <= MAX_RATE_LIMIT_WAIT.as_secs() => {
            Duration::from_secs(secs as u64)
        }
        _ => DEFAULT_RATE_LIMIT_WAIT,
    }
}

/// Decide the next step after a response.
///
/// `remaining` is the caller's budget; `None` means no deadline.
pub fn next_action(
    status: u16,
    retry_after: Option<&str>,
    remaining: Option<Duration>,
    state: &AttemptState,
) -> NextAction {
    match status {
        200..=299 => NextAction::Accept,
        401 if state.refreshed => NextAction::Fail(Failure::AuthRejected),
        401 => NextAction::RefreshAndRetry,
        429 if state.waited => NextAction::Fail(Failure::RateLimited),
        429 => {
            let wait = clamp_retry_after(retry_after);
            match remaining {
                Some(remaining) if remaining < wait + RATE_LIMIT_SAFETY_MARGIN => {
                    NextAction::Fail(Failure::InsufficientBudget { wait, remaining })
                }
                _ => NextAction::WaitAndRetry(wait),
            }
        }
        other => NextAction::Fail(Failure::Remote { status: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRESH: AttemptState = AttemptState {
        refreshed: false,
        waited: false,
    };

    #[test]
    fn test_success_is_accepted() {
        assert_eq!(next_action(200, None, None, &FRESH), NextAction::Accept);
    }

    #[test]
    fn test_auth_rejection_refreshes_once() {
        assert_eq!(
            next_action(401, None, None, &FRESH),
            NextAction::RefreshAndRetry
        );
        let after = AttemptState {
            refreshed: true,
            ..FRESH
        };
        assert_eq!(
            next_action(401, None, None, &after),
            NextAction::Fail(Failure::AuthRejected)
        );
    }

    #[test]
    fn test_rate_limit_waits_when_budget_allows() {
        let action = next_action(429, Some("30"), Some(Duration::from_secs(600)), &FRESH);
        assert_eq!(action, NextAction::WaitAndRetry(Duration::from_secs(30)));
    }

    #[test]
    fn test_rate_limit_fails_fast_without_budget() {
        // 600 is out of range and becomes 60; 60 + 5 > 60
        let remaining = Duration::from_secs(60);
        let action = next_action(429, Some("600"), Some(remaining), &FRESH);
        assert_eq!(
            action,
            NextAction::Fail(Failure::InsufficientBudget {
                wait: DEFAULT_RATE_LIMIT_WAIT,
                remaining
            })
        );
    }

    #[test]
    fn test_rate_limit_margin_boundary() {
        let wait = Duration::from_secs(10);
        let exact = wait + RATE_LIMIT_SAFETY_MARGIN;
        assert_eq!(
            next_action(429, Some("10"), Some(exact), &FRESH),
            NextAction::WaitAndRetry(wait)
        );
        assert!(matches!(
            next_action(429, Some("10"), Some(exact - Duration::from_millis(1)), &FRESH),
            NextAction::Fail(Failure::InsufficientBudget { .. })
        ));
    }

    #[test]
    fn test_rate_limit_only_waits_once() {
        let after = AttemptState {
            waited: true,
            ..FRESH
        };
        assert_eq!(
            next_action(429, Some("1"), None, &after),
            NextAction::Fail(Failure::RateLimited)
        );
    }

    #[test]
    fn test_other_statuses_are_fatal() {
        for status in [400u16, 403, 404, 500, 503] {
            assert_eq!(
                next_action(status, None, None, &FRESH),
                NextAction::Fail(Failure::Remote { status })
            );
        }
    }

    #[test]
    fn test_clamp_retry_after() {
        assert_eq!(clamp_retry_after(None), DEFAULT_RATE_LIMIT_WAIT);
        assert_eq!(clamp_retry_after(Some("0")), DEFAULT_RATE_LIMIT_WAIT);
        assert_eq!(clamp_retry_after(Some("-3")), DEFAULT_RATE_LIMIT_WAIT);
        assert_eq!(clamp_retry_after(Some("301")), DEFAULT_RATE_LIMIT_WAIT);
        assert_eq!(clamp_retry_after(Some("soon")), DEFAULT_RATE_LIMIT_WAIT);
        assert_eq!(clamp_retry_after(Some(" 1 ")), Duration::from_secs(1));
        assert_eq!(clamp_retry_after(Some("300")), MAX_RATE_LIMIT_WAIT);
    }
}
