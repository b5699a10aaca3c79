//! Exponential-backoff wait for the inference server to come up.
//!
//! The worker calls [`wait_until_ready`] at startup so the first job does
//! not burn its retries against a server that is still loading.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::EngineApi;

/// Tunable parameters for the backoff.
pub struct ReadinessConfig {
    /// Delay after the first failed probe.
    pub initial_delay: Duration,
    /// Upper bound on the delay between probes.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Give up after this many probes.
    pub max_attempts: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 10,
        }
    }
}

/// Next delay, clamped to [`ReadinessConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReadinessConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Probe `GET /health` until it succeeds.
///
/// Returns `false` when cancelled or out of attempts.
pub async fn wait_until_ready(
    api: &EngineApi,
    config: &ReadinessConfig,
    cancel: &CancellationToken,
) -> bool {
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            result = api.health() => {
                match result {
                    Ok(()) => {
                        tracing::info!(url = %api.api_url(), attempt, "Generation engine ready");
                        return true;
                    }
                    Err(e) => {
                        tracing::warn!(
                            url = %api.api_url(),
                            attempt,
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "Generation engine not ready",
                        );
                    }
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = next_delay(delay, config);
    }

    false
}
