/*!
 * Tests for retry backoff and rate limiting
 */

use std::time::Duration;
use tokio::time::Instant;

use panelglot::orchestrator::{RateLimitConfig, RateLimiter, RetryPolicy};

#[test]
fn test_retryPolicy_delays_shouldBeNonDecreasingAndCapped() {
    let policy = RetryPolicy::new(10, Duration::from_millis(250), Duration::from_secs(8));

    for fraction in [0.0, 0.3, 0.999] {
        let delays: Vec<Duration> = (0..16)
            .map(|attempt| policy.delay_with_jitter(attempt, fraction))
            .collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(delays.iter().all(|delay| *delay <= policy.max_delay));
        assert_eq!(delays[15], policy.max_delay);
    }
}

#[test]
fn test_retryPolicy_default_shouldMatchDocumentedValues() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.base_delay, Duration::from_secs(1));
    assert_eq!(policy.max_delay, Duration::from_secs(30));
}

#[test]
fn test_retryPolicy_new_withCapBelowBase_shouldRaiseCap() {
    let policy = RetryPolicy::new(1, Duration::from_secs(2), Duration::from_secs(1));
    assert_eq!(policy.max_delay, Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_rateLimiter_burstOverBudget_shouldSpreadAcrossWindows() {
    let limiter = RateLimiter::new(Some(RateLimitConfig::new(2, Duration::from_secs(10))));
    let start = Instant::now();

    for _ in 0..5 {
        limiter.acquire().await;
    }

    // Two slots per 10s window: calls 3-4 wait one window, call 5 waits two.
    assert_eq!(start.elapsed(), Duration::from_secs(20));
}
