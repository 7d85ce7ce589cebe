//! Client configuration types.
//!
//! This module defines the endpoint, reconnect and pacing settings. Every
//! field has a serde default so a partial config deserializes cleanly.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the chat client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint (e.g., "ws://localhost:8090").
    #[serde(default = "ClientConfig::default_endpoint")]
    pub endpoint: String,

    /// Reconnect/backoff policy.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Simulated-typing settings.
    #[serde(default)]
    pub pacing: PacingConfig,
}

impl ClientConfig {
    fn default_endpoint() -> String {
        "ws://localhost:8090".to_string()
    }

    /// Build a config for the given endpoint with default policies.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            reconnect: ReconnectPolicy::default(),
            pacing: PacingConfig::default(),
        }
    }
}

/// Exponential backoff for reconnect attempts.
///
/// The delay before retry `n` (1-based) is
/// `min(max_delay, base_delay * growth^(n-1))`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ReconnectPolicy {
    /// Automatic retries before reporting `failed`.
    #[serde(default = "ReconnectPolicy::default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "ReconnectPolicy::default_base_delay")]
    pub base_delay_ms: u64,

    /// Multiplier applied per attempt. Values below 1 (or NaN) act as 1.
    #[serde(default = "ReconnectPolicy::default_growth")]
    pub growth: f64,

    /// Upper bound on the delay, in milliseconds.
    #[serde(default = "ReconnectPolicy::default_max_delay")]
    pub max_delay_ms: u64,
}

impl ReconnectPolicy {
    const fn default_max_retries() -> u32 {
        10
    }

    const fn default_base_delay() -> u64 {
        1000
    }

    const fn default_growth() -> f64 {
        1.5
    }

    const fn default_max_delay() -> u64 {
        30_000
    }

    /// Get the base delay as a `Duration`.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay before the given retry attempt (1-based).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let cap = self.max_delay_ms as f64;
        let growth = self.growth.max(1.0);
        let millis = (self.base_delay_ms as f64 * growth.powi(exponent)).min(cap);
        Duration::from_millis(millis.round() as u64)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::default_max_retries(),
            base_delay_ms: Self::default_base_delay(),
            growth: Self::default_growth(),
            max_delay_ms: Self::default_max_delay(),
        }
    }
}

/// Simulated-typing settings for revealing streamed replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PacingConfig {
    /// When false, fragments are applied as soon as they arrive.
    #[serde(default = "PacingConfig::default_enabled")]
    pub enabled: bool,

    /// Smallest chunk revealed per tick, in characters.
    #[serde(default = "PacingConfig::default_min_chunk")]
    pub min_chunk: usize,

    /// Largest chunk revealed per tick, in characters.
    #[serde(default = "PacingConfig::default_max_chunk")]
    pub max_chunk: usize,

    /// Lower bound of the per-chunk delay, in milliseconds.
    #[serde(default = "PacingConfig::default_min_delay")]
    pub min_delay_ms: u64,

    /// Upper bound of the per-chunk delay, in milliseconds.
    #[serde(default = "PacingConfig::default_max_delay")]
    pub max_delay_ms: u64,

    /// Lower bound of the extra pause after punctuation, in milliseconds.
    #[serde(default = "PacingConfig::default_punctuation_min")]
    pub punctuation_min_ms: u64,

    /// Upper bound of the extra pause after punctuation, in milliseconds.
    #[serde(default = "PacingConfig::default_punctuation_max")]
    pub punctuation_max_ms: u64,
}

impl PacingConfig {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_min_chunk() -> usize {
        1
    }

    const fn default_max_chunk() -> usize {
        4
    }

    const fn default_min_delay() -> u64 {
        20
    }

    const fn default_max_delay() -> u64 {
        100
    }

    const fn default_punctuation_min() -> u64 {
        150
    }

    const fn default_punctuation_max() -> u64 {
        300
    }

    /// Pacing turned off: fragments render immediately.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            min_chunk: Self::default_min_chunk(),
            max_chunk: Self::default_max_chunk(),
            min_delay_ms: Self::default_min_delay(),
            max_delay_ms: Self::default_max_delay(),
            punctuation_min_ms: Self::default_punctuation_min(),
            punctuation_max_ms: Self::default_punctuation_max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, "ws://localhost:8090");
        assert_eq!(config.reconnect.max_retries, 10);
        assert_eq!(config.reconnect.base_delay(), Duration::from_millis(1000));
        assert!(config.pacing.enabled);
        assert_eq!(config.pacing.max_chunk, 4);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"endpoint":"ws://example:1","reconnect":{"max_retries":3},"pacing":{"enabled":false}}"#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "ws://example:1");
        assert_eq!(config.reconnect.max_retries, 3);
        assert_eq!(config.reconnect.base_delay_ms, 1000);
        assert!(!config.pacing.enabled);
        assert_eq!(config.pacing.punctuation_max_ms, 300);
    }

    #[test]
    fn backoff_grows_by_factor() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2250));
    }

    #[test]
    fn backoff_is_non_decreasing_and_capped() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<Duration> = (1..=20).map(|n| policy.delay_for(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(delays.last().copied(), Some(Duration::from_millis(30_000)));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(30_000)));
    }

    #[test]
    fn shrinking_growth_never_shortens_the_delay() {
        for growth in [0.5, -2.0, f64::NAN] {
            let policy = ReconnectPolicy {
                growth,
                ..ReconnectPolicy::default()
            };
            let delays: Vec<Duration> = (1..=6).map(|n| policy.delay_for(n)).collect();
            assert!(
                delays.iter().all(|d| *d == Duration::from_millis(1000)),
                "growth {growth}: {delays:?}"
            );
        }

        let policy: ReconnectPolicy = serde_json::from_str(r#"{"growth":0.25}"#).unwrap();
        assert!(policy.delay_for(3) >= policy.delay_for(2));
    }

    #[test]
    fn backoff_survives_huge_attempts() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
    }
}
