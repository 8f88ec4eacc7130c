//! Cooperative pre-request pauses.

use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use tracing::trace;

use crate::config::ConfigError;

/// Pause applied before a task's request.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WaitSpec {
    /// No pause.
    #[default]
    None,
    /// Always pause this long.
    Fixed(Duration),
    /// Pause a uniformly random duration in `[0, max]`.
    Jittered(Duration),
}

impl WaitSpec {
    /// Jittered wait of `batch_len / rate` seconds, bounding the steady-state
    /// request rate of a batch to roughly `rate` per second.
    #[must_use]
    pub fn per_batch(rate_per_second: f64, batch_len: usize) -> Self {
        if !rate_per_second.is_finite() || rate_per_second <= 0.0 || batch_len == 0 {
            return Self::None;
        }
        #[allow(clippy::cast_precision_loss)]
        let secs = batch_len as f64 / rate_per_second;
        Duration::try_from_secs_f64(secs).map_or(Self::None, Self::Jittered)
    }

    /// Draws the pause for one request.
    #[must_use]
    pub fn sample(&self) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => d,
            Self::Jittered(max) if max.is_zero() => Duration::ZERO,
            Self::Jittered(max) => {
                let secs = rand::thread_rng().gen_range(0.0..=max.as_secs_f64());
                Duration::from_secs_f64(secs)
            }
        }
    }

    /// Sleeps for one sampled pause.
    pub async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            trace!(delay_ms = delay.as_millis(), "pausing before request");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Batch-level wait configuration, resolved to a [`WaitSpec`] once the batch
/// size is known.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WaitPolicy {
    /// Use the orchestrator default.
    #[default]
    Auto,
    /// Use this spec for every task.
    Uniform(WaitSpec),
    /// Derive from the batch size with [`WaitSpec::per_batch`].
    PerBatch {
        /// Target requests per second.
        rate: f64,
    },
}

impl WaitPolicy {
    /// Resolves the policy for a batch of `batch_len` tasks. `Auto` resolves
    /// to `fallback`.
    #[must_use]
    pub fn resolve(&self, batch_len: usize, fallback: WaitSpec) -> WaitSpec {
        match *self {
            Self::Auto => fallback,
            Self::Uniform(spec) => spec,
            Self::PerBatch { rate } => WaitSpec::per_batch(rate, batch_len),
        }
    }
}

impl FromStr for WaitPolicy {
    type Err = ConfigError;

    /// Accepts `auto`, `none`, `fixed:<secs>`, `jitter:<secs>`, `rate:<per-sec>`,
    /// or a bare number of seconds (jittered).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = |reason: &str| ConfigError::InvalidWaitSpec {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let seconds = |v: &str| {
            v.trim()
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| invalid("expected a non-negative number of seconds"))
        };

        match raw.to_ascii_lowercase().as_str() {
            "auto" => return Ok(Self::Auto),
            "none" | "0" => return Ok(Self::Uniform(WaitSpec::None)),
            _ => {}
        }
        if let Some((kind, value)) = raw.split_once(':') {
            return match kind.trim().to_ascii_lowercase().as_str() {
                "fixed" => Ok(Self::Uniform(WaitSpec::Fixed(seconds(value)?))),
                "jitter" => Ok(Self::Uniform(WaitSpec::Jittered(seconds(value)?))),
                "rate" => {
                    let rate = value
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|r| r.is_finite() && *r > 0.0)
                        .ok_or_else(|| invalid("rate must be a positive number"))?;
                    Ok(Self::PerBatch { rate })
                }
                _ => Err(invalid("unknown kind; use fixed, jitter or rate")),
            };
        }
        Ok(Self::Uniform(WaitSpec::Jittered(seconds(raw)?)))
    }
}
