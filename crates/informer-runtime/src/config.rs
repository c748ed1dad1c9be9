//! Synchronizer and retry configuration.

use std::time::Duration;

use informer_core::{InformerError, InformerResult, ListSelector};

/// Exponential backoff parameters.
///
/// Delay `n` is `initial_delay * multiplier^n`, capped at `max_delay`, plus
/// up to `jitter * delay` of random extra on top of the capped value.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// First delay.
    pub initial_delay: Duration,
    /// Growth factor per step (>= 1.0).
    pub multiplier: f64,
    /// Upper bound on the delay before jitter.
    pub max_delay: Duration,
    /// Random extra as a fraction of the delay (0.0 disables jitter).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    /// Relist backoff used by reflectors: 800ms doubling to 30s, plus up to 100% jitter.
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(800),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 1.0,
        }
    }
}

impl BackoffPolicy {
    /// Fixed delay with no growth or jitter.
    pub fn constant(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
            jitter: 0.0,
        }
    }

    /// Validate the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`InformerError::Configuration`] for a multiplier below 1.0,
    /// a negative or non-finite jitter, or an initial delay above the cap.
    pub fn validate(&self) -> InformerResult<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(InformerError::Configuration(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            return Err(InformerError::Configuration(format!(
                "backoff jitter must be >= 0.0, got {}",
                self.jitter
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(InformerError::Configuration(format!(
                "initial delay {:?} exceeds max delay {:?}",
                self.initial_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

/// Retry budget for conflict-safe mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first (>= 1).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Growth factor per retry (>= 1.0).
    pub multiplier: f64,
    /// Upper bound on the delay before jitter.
    pub max_delay: Duration,
    /// Random extra as a fraction of the delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_retry()
    }
}

impl RetryPolicy {
    /// Budget for resolving update conflicts: 5 attempts, 10ms apart, 10% jitter.
    pub fn default_retry() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            multiplier: 1.0,
            max_delay: Duration::from_millis(10),
            jitter: 0.1,
        }
    }

    /// Budget for operations expected to take a while: 4 attempts growing 5x from 10ms.
    pub fn default_backoff() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(10),
            multiplier: 5.0,
            max_delay: Duration::from_secs(1),
            jitter: 0.1,
        }
    }

    /// Set the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Disable jitter, making delays deterministic.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Backoff parameters for the delays between attempts.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: self.initial_delay,
            multiplier: self.multiplier,
            max_delay: self.max_delay,
            jitter: self.jitter,
        }
    }

    /// Validate the policy.
    ///
    /// # Errors
    ///
    /// Returns [`InformerError::Configuration`] for a zero attempt budget or
    /// invalid backoff parameters.
    pub fn validate(&self) -> InformerResult<()> {
        if self.max_attempts == 0 {
            return Err(InformerError::Configuration(
                "retry policy needs at least one attempt".into(),
            ));
        }
        self.backoff().validate()
    }
}

/// Configuration for a [`crate::Synchronizer`].
#[derive(Debug, Clone)]
pub struct SynchronizerConfig {
    /// Resource kind label used in logs and metrics.
    pub kind: String,
    /// Namespace and label scope of the list/watch.
    pub selector: ListSelector,
    /// Force a relist this often, regardless of stream health.
    pub resync_period: Option<Duration>,
    /// Delay policy for relisting after failures.
    pub relist_backoff: BackoffPolicy,
    /// Deadline for a single list or watch-open call.
    pub request_timeout: Option<Duration>,
    /// How long `stop` waits for the worker before aborting it.
    pub stop_grace_period: Duration,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            kind: "resource".to_string(),
            selector: ListSelector::all(),
            resync_period: None,
            relist_backoff: BackoffPolicy::default(),
            request_timeout: Some(Duration::from_secs(60)),
            stop_grace_period: Duration::from_secs(5),
        }
    }
}

impl SynchronizerConfig {
    /// Start building a configuration.
    pub fn builder() -> SynchronizerConfigBuilder {
        SynchronizerConfigBuilder::default()
    }
}

/// Builder for [`SynchronizerConfig`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use informer_core::ListSelector;
/// use informer_runtime::SynchronizerConfig;
///
/// let config = SynchronizerConfig::builder()
///     .kind("deployments")
///     .selector(ListSelector::namespace("default"))
///     .resync_period(Duration::from_secs(300))
///     .build()
///     .unwrap();
/// assert_eq!(config.kind, "deployments");
/// ```
#[derive(Debug, Default)]
pub struct SynchronizerConfigBuilder {
    kind: Option<String>,
    selector: Option<ListSelector>,
    resync_period: Option<Duration>,
    relist_backoff: Option<BackoffPolicy>,
    request_timeout: Option<Option<Duration>>,
    stop_grace_period: Option<Duration>,
}

impl SynchronizerConfigBuilder {
    /// Set the resource kind label.
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the list/watch scope.
    pub fn selector(mut self, selector: ListSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Enable periodic resync.
    pub fn resync_period(mut self, period: Duration) -> Self {
        self.resync_period = Some(period);
        self
    }

    /// Set the relist backoff policy.
    pub fn relist_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.relist_backoff = Some(policy);
        self
    }

    /// Set the per-call deadline for list and watch-open.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(Some(timeout));
        self
    }

    /// Remove the per-call deadline.
    pub fn no_request_timeout(mut self) -> Self {
        self.request_timeout = Some(None);
        self
    }

    /// Set the stop grace period.
    pub fn stop_grace_period(mut self, grace: Duration) -> Self {
        self.stop_grace_period = Some(grace);
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The kind label is empty
    /// - The resync period is zero
    /// - The relist backoff is invalid
    pub fn build(self) -> InformerResult<SynchronizerConfig> {
        let defaults = SynchronizerConfig::default();
        let config = SynchronizerConfig {
            kind: self.kind.unwrap_or(defaults.kind),
            selector: self.selector.unwrap_or(defaults.selector),
            resync_period: self.resync_period,
            relist_backoff: self.relist_backoff.unwrap_or(defaults.relist_backoff),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            stop_grace_period: self.stop_grace_period.unwrap_or(defaults.stop_grace_period),
        };

        if config.kind.is_empty() {
            return Err(InformerError::Configuration("kind must not be empty".into()));
        }
        if config.resync_period == Some(Duration::ZERO) {
            return Err(InformerError::Configuration(
                "resync period must be non-zero".into(),
            ));
        }
        config.relist_backoff.validate()?;

        Ok(config)
    }
}
