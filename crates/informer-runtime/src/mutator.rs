//! Conflict-safe read-modify-write.
//!
//! [`Mutator::mutate`] re-reads the object from the remote store (never the
//! local cache) on every attempt, applies the caller's transform, and writes
//! it back conditioned on the version it read. A [`InformerError::Conflict`]
//! means someone else wrote in between; the attempt is retried after a
//! backoff delay until the [`RetryPolicy`] budget is spent.
//!
//! Every other failure, including `NotFound`, is returned immediately.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use informer_core::{InformerError, Object, ResourceKey, Result, SharedStore};
use tracing::{debug, trace, warn};

use crate::backoff::Backoff;
use crate::config::RetryPolicy;
use crate::metrics::MutatorMetrics;

/// State of one retry loop.
#[derive(Debug)]
pub struct MutationAttempt {
    /// Key being mutated.
    pub key: ResourceKey,
    /// 1-based number of the current attempt.
    pub attempt: u32,
    /// Conflict that ended the previous attempt.
    pub last_error: Option<InformerError>,
}

impl MutationAttempt {
    fn new(key: ResourceKey) -> Self {
        Self {
            key,
            attempt: 0,
            last_error: None,
        }
    }
}

/// Run `op` until it succeeds, fails with something other than a conflict,
/// or the policy's attempt budget is spent.
///
/// `op` receives the 1-based attempt number.
///
/// # Errors
///
/// - [`InformerError::Configuration`] for an invalid policy
/// - [`InformerError::ConflictExhausted`] carrying the last conflict
/// - any non-conflict error from `op`, unchanged
///
/// # Example
///
/// ```rust
/// use informer_core::{InformerError, ResourceKey, ResourceVersion};
/// use informer_runtime::{retry_on_conflict, RetryPolicy};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let key = ResourceKey::namespaced("default", "web");
/// let result = retry_on_conflict(&RetryPolicy::default_retry(), &key, |attempt| {
///     let key = key.clone();
///     async move {
///         if attempt < 3 {
///             Err(InformerError::Conflict {
///                 key,
///                 expected: ResourceVersion::from(1u64),
///                 current: ResourceVersion::from(2u64),
///             })
///         } else {
///             Ok(attempt)
///         }
///     }
/// })
/// .await;
/// assert_eq!(result.unwrap(), 3);
/// # }
/// ```
pub async fn retry_on_conflict<T, F, Fut>(
    policy: &RetryPolicy,
    key: &ResourceKey,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    policy.validate()?;
    let metrics = MutatorMetrics;
    let mut backoff = Backoff::new(policy.backoff());
    let mut state = MutationAttempt::new(key.clone());

    loop {
        state.attempt += 1;
        let err = match op(state.attempt).await {
            Ok(value) => {
                if state.attempt > 1 {
                    debug!(key = %state.key, attempt = state.attempt, "succeeded after conflicts");
                }
                return Ok(value);
            }
            Err(err) if err.is_conflict() => err,
            Err(err) => return Err(err),
        };

        metrics.record_conflict();
        if state.attempt >= policy.max_attempts {
            warn!(
                key = %state.key,
                attempts = state.attempt,
                error = %err,
                "conflict retry budget exhausted"
            );
            return Err(InformerError::ConflictExhausted {
                key: state.key,
                attempts: state.attempt,
                last: Box::new(err),
            });
        }

        let delay = backoff.next_delay();
        debug!(
            key = %state.key,
            attempt = state.attempt,
            ?delay,
            error = %err,
            "conflict, retrying"
        );
        state.last_error = Some(err);
        tokio::time::sleep(delay).await;
    }
}

/// Performs conflict-retrying updates against a remote store.
#[derive(Debug, Clone)]
pub struct Mutator {
    store: SharedStore,
    metrics: MutatorMetrics,
}

impl Mutator {
    /// Create a mutator for `store`.
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            metrics: MutatorMetrics,
        }
    }

    /// The underlying store.
    #[inline]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Read `key`, apply `transform`, and write the result back, retrying on
    /// conflicts.
    ///
    /// `transform` gets the freshly read object and returns the desired
    /// state; it may run once per attempt, so it must not have side effects
    /// that cannot be repeated. Returns the stored object with its new version.
    ///
    /// # Errors
    ///
    /// - [`InformerError::NotFound`] if the object does not exist
    /// - [`InformerError::ConflictExhausted`] if every attempt conflicted
    /// - [`InformerError::InvalidObject`] if `transform` changes the key
    /// - any error returned by `transform`
    pub async fn mutate<F>(
        &self,
        key: &ResourceKey,
        transform: F,
        policy: &RetryPolicy,
    ) -> Result<Object>
    where
        F: Fn(&Object) -> Result<Object> + Send + Sync,
    {
        self.mutate_with_deadline(key, transform, policy, None).await
    }

    /// [`Mutator::mutate`] bounded by an overall deadline.
    ///
    /// # Errors
    ///
    /// As [`Mutator::mutate`], plus [`InformerError::Timeout`] when the
    /// deadline passes first, whether during a call or a backoff delay.
    pub async fn mutate_with_deadline<F>(
        &self,
        key: &ResourceKey,
        transform: F,
        policy: &RetryPolicy,
        deadline: Option<Duration>,
    ) -> Result<Object>
    where
        F: Fn(&Object) -> Result<Object> + Send + Sync,
    {
        let attempts = AtomicU32::new(0);
        let transform = &transform;
        let attempts_ref = &attempts;

        let run = retry_on_conflict(policy, key, |attempt| {
            attempts_ref.store(attempt, Ordering::Relaxed);
            let store = self.store.clone();
            async move {
                let current = store.get(key).await?;
                let desired = transform(&current)?;
                if desired.key() != key {
                    return Err(InformerError::InvalidObject {
                        key: key.clone(),
                        reason: format!("transform changed the key to {}", desired.key()),
                    });
                }
                trace!(key = %key, attempt, expected = %current.version(), "updating");
                store.update(desired, current.version()).await
            }
        });

        let result = match deadline {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(key = %key, ?limit, "mutation deadline exceeded");
                    Err(InformerError::Timeout {
                        operation: format!("mutate {key}"),
                    })
                }
            },
            None => run.await,
        };

        let attempts = attempts.load(Ordering::Relaxed);
        let outcome = match &result {
            Ok(_) => "success",
            Err(InformerError::ConflictExhausted { .. }) => "conflict_exhausted",
            Err(InformerError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        self.metrics.record_outcome(outcome, attempts);
        if let Ok(updated) = &result {
            debug!(key = %key, version = %updated.version(), attempts, "mutation applied");
        }
        result
    }
}
