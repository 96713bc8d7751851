// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines traits for retry policies and some common implementations.
//!
//! The pipeline automatically retries requests when they fail due to
//! transient errors. A retry policy decides if a failure is transient, and
//! for how long the retry loop may continue.
//!
//! Applications may override the default behavior. For example, some
//! services return `429 Too Many Requests` for requests that may succeed
//! later.
//!
//! # Example
//! ```
//! # use cloud_client_gax::retry_policy::*;
//! use std::time::Duration;
//! // Retry for at most 30 seconds or at most 5 attempts: whichever limit is
//! // reached first stops the retry loop.
//! let policy = RetryableStatusCodes::default()
//!     .with_time_limit(Duration::from_secs(30))
//!     .with_attempt_limit(5);
//! ```

use crate::error::Error;
pub use crate::retry_result::{Failure, RetryResult};
pub use crate::retry_state::RetryState;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Determines how failures are handled in the retry loop.
///
/// Implementations of this trait determine if a failure may resolve in
/// future attempts, and for how long the retry loop may continue.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Query the retry policy after a failed attempt.
    ///
    /// # Parameters
    /// * `state` - the state of the retry loop. The attempt count includes
    ///   the attempt that just failed.
    /// * `failure` - the error, or the response with a 4xx or 5xx status
    ///   code, returned by the last attempt.
    fn on_error(&self, state: &RetryState, failure: Failure) -> RetryResult;

    /// The remaining time in the retry policy.
    ///
    /// For policies based on time, this returns the remaining time in the
    /// policy. The retry loop uses this value to bound the next attempt and
    /// the next backoff. For policies that are not time based this returns
    /// `None`.
    fn remaining_time(&self, _state: &RetryState) -> Option<Duration> {
        None
    }
}

/// A helper type to use [RetryPolicy] in client options.
#[derive(Clone, Debug)]
pub struct RetryPolicyArg(pub(crate) Arc<dyn RetryPolicy>);

impl<T> std::convert::From<T> for RetryPolicyArg
where
    T: RetryPolicy + 'static,
{
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl std::convert::From<Arc<dyn RetryPolicy>> for RetryPolicyArg {
    fn from(value: Arc<dyn RetryPolicy>) -> Self {
        Self(value)
    }
}

impl From<RetryPolicyArg> for Arc<dyn RetryPolicy> {
    fn from(value: RetryPolicyArg) -> Arc<dyn RetryPolicy> {
        value.0
    }
}

/// Extension trait for [RetryPolicy].
pub trait RetryPolicyExt: RetryPolicy + Sized {
    /// Decorate a [RetryPolicy] to limit the total elapsed time in the retry
    /// loop.
    ///
    /// While the time spent in the retry loop (including time in backoff) is
    /// less than the prescribed duration the `on_error()` method returns the
    /// results of the inner policy. After that time it returns
    /// [Exhausted][RetryResult::Exhausted] if the inner policy returns
    /// [Continue][RetryResult::Continue].
    fn with_time_limit(self, maximum_duration: Duration) -> LimitedElapsedTime<Self> {
        LimitedElapsedTime::custom(self, maximum_duration)
    }

    /// Decorate a [RetryPolicy] to limit the number of attempts.
    ///
    /// The policy passes through the results from the inner policy as long as
    /// `attempt_count < maximum_attempts`. Once the maximum number of attempts
    /// is reached, the policy returns [Exhausted][RetryResult::Exhausted] if
    /// the inner policy returns [Continue][RetryResult::Continue].
    ///
    /// # Example
    /// ```
    /// # use cloud_client_gax::retry_policy::*;
    /// # use cloud_client_gax::error::Error;
    /// let policy = RetryableStatusCodes::default().with_attempt_limit(4);
    /// let state = RetryState::new(true).set_attempt_count(4_u32);
    /// let flow = policy.on_error(&state, Failure::Error(Error::transport("reset")));
    /// assert!(flow.is_exhausted());
    /// ```
    fn with_attempt_limit(self, maximum_attempts: u32) -> LimitedAttemptCount<Self> {
        LimitedAttemptCount::custom(self, maximum_attempts)
    }
}

impl<T: RetryPolicy> RetryPolicyExt for T {}

/// Retries transport errors, attempt timeouts, and a set of status codes.
///
/// The default set of status codes is `408`, `500`, `502`, `503`, and `504`.
/// This policy should be decorated to limit the number of attempts or the
/// duration of the retry loop.
///
/// The policy does not examine the request idempotency. The retry loop
/// refuses to resend requests whose body cannot be replayed.
///
/// # Example
/// ```
/// # use cloud_client_gax::retry_policy::*;
/// # use cloud_client_gax::error::Error;
/// let policy = RetryableStatusCodes::new([429, 503]);
/// let state = RetryState::new(true).set_attempt_count(1_u32);
/// let error = Error::http(429, http::HeaderMap::new(), bytes::Bytes::new());
/// assert!(policy.on_error(&state, Failure::Error(error)).is_continue());
/// let error = Error::http(404, http::HeaderMap::new(), bytes::Bytes::new());
/// assert!(policy.on_error(&state, Failure::Error(error)).is_permanent());
/// ```
#[derive(Clone, Debug)]
pub struct RetryableStatusCodes {
    codes: BTreeSet<u16>,
}

impl RetryableStatusCodes {
    pub fn new<I: IntoIterator<Item = u16>>(codes: I) -> Self {
        Self {
            codes: codes.into_iter().collect(),
        }
    }
}

impl Default for RetryableStatusCodes {
    fn default() -> Self {
        Self::new([408, 500, 502, 503, 504])
    }
}

impl RetryPolicy for RetryableStatusCodes {
    fn on_error(&self, _state: &RetryState, failure: Failure) -> RetryResult {
        if let Some(e) = failure.error() {
            if e.is_transport() || e.is_timeout() {
                return RetryResult::Continue(failure);
            }
        }
        match failure.http_status_code() {
            Some(code) if self.codes.contains(&code) => RetryResult::Continue(failure),
            _ => RetryResult::Permanent(failure),
        }
    }
}

/// A retry policy that never retries.
#[derive(Clone, Debug)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn on_error(&self, _state: &RetryState, failure: Failure) -> RetryResult {
        RetryResult::Permanent(failure)
    }
}

/// A retry policy decorator that limits the total time in the retry loop.
///
/// The `remaining_time()` function returns the remaining time. This is always
/// [Duration::ZERO] once or after the policy's deadline is reached.
///
/// Once the deadline passes, retryable failures become
/// [operation timeouts][crate::error::Error::is_operation_timeout] wrapping the
/// last failure. A deadline too far in the future to represent is no limit.
///
/// # Parameters
/// * `P` - the inner retry policy, defaults to [RetryableStatusCodes].
#[derive(Debug)]
pub struct LimitedElapsedTime<P = RetryableStatusCodes>
where
    P: RetryPolicy,
{
    inner: P,
    maximum_duration: Duration,
}

impl LimitedElapsedTime {
    /// Creates a new instance, with the default inner policy.
    pub fn new(maximum_duration: Duration) -> Self {
        Self::custom(RetryableStatusCodes::default(), maximum_duration)
    }
}

impl<P> LimitedElapsedTime<P>
where
    P: RetryPolicy,
{
    /// Creates a new instance with a custom inner policy.
    pub fn custom(inner: P, maximum_duration: Duration) -> Self {
        Self {
            inner,
            maximum_duration,
        }
    }

    fn deadline(&self, state: &RetryState) -> Option<std::time::Instant> {
        state.start.checked_add(self.maximum_duration)
    }
}

impl<P> RetryPolicy for LimitedElapsedTime<P>
where
    P: RetryPolicy,
{
    fn on_error(&self, state: &RetryState, failure: Failure) -> RetryResult {
        match self.inner.on_error(state, failure) {
            RetryResult::Permanent(f) => RetryResult::Permanent(f),
            RetryResult::Exhausted(f) => RetryResult::Exhausted(f),
            RetryResult::Continue(f) if self.deadline(state).is_some_and(|d| now() >= d) => {
                RetryResult::Exhausted(Failure::Error(Error::operation_timeout(f.into_error())))
            }
            RetryResult::Continue(f) => RetryResult::Continue(f),
        }
    }

    fn remaining_time(&self, state: &RetryState) -> Option<Duration> {
        let Some(deadline) = self.deadline(state) else {
            return self.inner.remaining_time(state);
        };
        let remaining = deadline.saturating_duration_since(now());
        self.inner
            .remaining_time(state)
            .map(|inner| std::cmp::min(remaining, inner))
            .or(Some(remaining))
    }
}

/// A retry policy decorator that limits the number of attempts.
///
/// # Parameters
/// * `P` - the inner retry policy, defaults to [RetryableStatusCodes].
#[derive(Debug)]
pub struct LimitedAttemptCount<P = RetryableStatusCodes>
where
    P: RetryPolicy,
{
    inner: P,
    maximum_attempts: u32,
}

impl LimitedAttemptCount {
    /// Creates a new instance, with the default inner policy.
    pub fn new(maximum_attempts: u32) -> Self {
        Self::custom(RetryableStatusCodes::default(), maximum_attempts)
    }
}

impl<P> LimitedAttemptCount<P>
where
    P: RetryPolicy,
{
    /// Creates a new instance with a custom inner policy.
    pub fn custom(inner: P, maximum_attempts: u32) -> Self {
        Self {
            inner,
            maximum_attempts,
        }
    }
}

impl<P> RetryPolicy for LimitedAttemptCount<P>
where
    P: RetryPolicy,
{
    fn on_error(&self, state: &RetryState, failure: Failure) -> RetryResult {
        match self.inner.on_error(state, failure) {
            RetryResult::Continue(f) if state.attempt_count >= self.maximum_attempts => {
                RetryResult::Exhausted(f)
            }
            flow => flow,
        }
    }

    fn remaining_time(&self, state: &RetryState) -> Option<Duration> {
        self.inner.remaining_time(state)
    }
}

// Use the tokio clock, so tests with a paused clock observe the time spent in
// backoff.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
