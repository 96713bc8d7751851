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

//! Defines the types for polling error policies.
//!
//! # Example
//! ```
//! # use cloud_client_gax::polling_error_policy::*;
//! use std::time::Duration;
//! // Poll for at most 15 minutes or at most 50 attempts: whichever limit is
//! // reached first stops the polling loop.
//! let policy = Strict
//!     .with_time_limit(Duration::from_secs(15 * 60))
//!     .with_attempt_limit(50);
//! ```
//!
//! A poller queries the status of a long-running operation until it
//! completes. Some of these queries fail. The poller needs to (1) distinguish
//! between transient and permanent errors, and (2) limit the duration of the
//! polling loop.
//!
//! Applications may implement [PollingErrorPolicy] to customize the behavior
//! of the polling loop. The implementations in this module should meet most
//! needs.

use crate::error::Error;
use crate::loop_state::LoopState;
use std::sync::Arc;

/// Determines how errors are handled in the polling loop.
///
/// Implementations of this trait determine if polling errors may resolve in
/// future attempts, and for how long the polling loop may continue.
pub trait PollingErrorPolicy: Send + Sync + std::fmt::Debug {
    /// Query the polling policy after an error.
    ///
    /// # Parameters
    /// * `loop_start` - when the polling loop started.
    /// * `attempt_count` - the number of poll attempts, including the one that
    ///   failed. This method is only called after the operation starts, so it
    ///   is always non-zero.
    /// * `error` - the last error when polling.
    fn on_error(&self, loop_start: std::time::Instant, attempt_count: u32, error: Error)
    -> LoopState;

    /// Called when the operation is successfully polled, but is still in
    /// progress.
    ///
    /// Returning an error stops the polling loop, and the operation is
    /// considered failed.
    fn on_in_progress(
        &self,
        _loop_start: std::time::Instant,
        _attempt_count: u32,
    ) -> Option<Error> {
        None
    }
}

/// A helper type to use [PollingErrorPolicy] in poller options.
#[derive(Clone, Debug)]
pub struct PollingErrorPolicyArg(pub(crate) Arc<dyn PollingErrorPolicy>);

impl<T> std::convert::From<T> for PollingErrorPolicyArg
where
    T: PollingErrorPolicy + 'static,
{
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl std::convert::From<Arc<dyn PollingErrorPolicy>> for PollingErrorPolicyArg {
    fn from(value: Arc<dyn PollingErrorPolicy>) -> Self {
        Self(value)
    }
}

impl std::convert::From<PollingErrorPolicyArg> for Arc<dyn PollingErrorPolicy> {
    fn from(value: PollingErrorPolicyArg) -> Self {
        value.0
    }
}

/// Extension trait for [PollingErrorPolicy]
pub trait PollingErrorPolicyExt: PollingErrorPolicy + Sized {
    /// Decorate a [PollingErrorPolicy] to limit the total elapsed time in the
    /// polling loop.
    ///
    /// While the time spent in the polling loop (including time in backoff) is
    /// less than the prescribed duration the `on_error()` method returns the
    /// results of the inner policy. After that time it returns
    /// [Exhausted][LoopState::Exhausted] if the inner policy returns
    /// [Continue][LoopState::Continue].
    ///
    /// # Example
    /// ```
    /// # use cloud_client_gax::polling_error_policy::*;
    /// use cloud_client_gax::error::Error;
    /// use std::time::{Duration, Instant};
    /// let policy = Strict.with_time_limit(Duration::from_secs(10)).with_attempt_limit(3);
    /// let attempt_count = 4;
    /// let error = Error::http(503, http::HeaderMap::new(), bytes::Bytes::new());
    /// assert!(policy.on_error(Instant::now(), attempt_count, error).is_exhausted());
    /// ```
    fn with_time_limit(self, maximum_duration: std::time::Duration) -> LimitedElapsedTime<Self> {
        LimitedElapsedTime::custom(self, maximum_duration)
    }

    /// Decorate a [PollingErrorPolicy] to limit the number of poll attempts.
    ///
    /// The policy passes through the results from the inner policy as long as
    /// `attempt_count < maximum_attempts`. Once the maximum number of attempts
    /// is reached, the policy returns [Exhausted][LoopState::Exhausted] if the
    /// inner policy returns [Continue][LoopState::Continue], and passes the
    /// inner policy result otherwise.
    ///
    /// # Example
    /// ```
    /// # use cloud_client_gax::polling_error_policy::*;
    /// use cloud_client_gax::error::Error;
    /// use std::time::Instant;
    /// let policy = Strict.with_attempt_limit(3);
    /// let error = || Error::transport("connection reset");
    /// assert!(policy.on_error(Instant::now(), 1, error()).is_continue());
    /// assert!(policy.on_error(Instant::now(), 2, error()).is_continue());
    /// assert!(policy.on_error(Instant::now(), 3, error()).is_exhausted());
    /// ```
    fn with_attempt_limit(self, maximum_attempts: u32) -> LimitedAttemptCount<Self> {
        LimitedAttemptCount::custom(self, maximum_attempts)
    }
}

impl<T: PollingErrorPolicy> PollingErrorPolicyExt for T {}

/// The default polling policy.
///
/// Many services briefly return `404 Not Found` right after a long-running
/// operation starts, while the operation record replicates. This policy
/// treats those as transient, together with transport errors, attempt
/// timeouts, exhausted retry budgets, `408 Request Timeout`, `429 Too Many Requests`, and any `5xx` status.
///
/// This policy should be decorated, or used with a poller overall timeout, to
/// bound the polling loop.
///
/// # Example
/// ```
/// # use cloud_client_gax::polling_error_policy::*;
/// use cloud_client_gax::error::Error;
/// use std::time::Instant;
/// let error = |code| Error::http(code, http::HeaderMap::new(), bytes::Bytes::new());
/// assert!(Optimistic.on_error(Instant::now(), 1, error(404)).is_continue());
/// assert!(Optimistic.on_error(Instant::now(), 1, error(403)).is_permanent());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Optimistic;

impl PollingErrorPolicy for Optimistic {
    fn on_error(
        &self,
        _loop_start: std::time::Instant,
        _attempt_count: u32,
        error: Error,
    ) -> LoopState {
        if error.is_transport() || error.is_timeout() || error.is_operation_timeout() {
            return LoopState::Continue(error);
        }
        match error.http_status_code() {
            Some(404 | 408 | 429) => LoopState::Continue(error),
            Some(code) if (500..600).contains(&code) => LoopState::Continue(error),
            _ => LoopState::Permanent(error),
        }
    }
}

/// A polling policy that only tolerates transport errors, timeouts, and
/// `503 Service Unavailable`.
///
/// Timeouts include both a single attempt running out of time and the retry
/// stage running out of its overall budget for one poll.
///
/// This policy must be decorated to limit the number of polling attempts or the
/// duration of the polling loop.
///
/// # Example
/// ```
/// # use cloud_client_gax::polling_error_policy::*;
/// use cloud_client_gax::error::Error;
/// use std::time::Instant;
/// let error = |code| Error::http(code, http::HeaderMap::new(), bytes::Bytes::new());
/// assert!(Strict.on_error(Instant::now(), 1, error(503)).is_continue());
/// assert!(Strict.on_error(Instant::now(), 1, error(404)).is_permanent());
/// ```
#[derive(Clone, Debug)]
pub struct Strict;

impl PollingErrorPolicy for Strict {
    fn on_error(
        &self,
        _loop_start: std::time::Instant,
        _attempt_count: u32,
        error: Error,
    ) -> LoopState {
        if error.is_transport() || error.is_timeout() || error.is_operation_timeout() {
            return LoopState::Continue(error);
        }
        match error.http_status_code() {
            Some(code) if code == http::StatusCode::SERVICE_UNAVAILABLE.as_u16() => {
                LoopState::Continue(error)
            }
            _ => LoopState::Permanent(error),
        }
    }
}

/// A polling policy that continues on any error.
///
/// This policy must be decorated to limit the number of polling attempts or the
/// duration of the polling loop.
#[derive(Clone, Debug)]
pub struct AlwaysContinue;

impl PollingErrorPolicy for AlwaysContinue {
    fn on_error(
        &self,
        _loop_start: std::time::Instant,
        _attempt_count: u32,
        error: Error,
    ) -> LoopState {
        LoopState::Continue(error)
    }
}

/// A polling policy decorator that limits the total time in the polling loop.
///
/// While the time spent in the polling loop (including time in backoff)
/// is less than the prescribed duration the `on_error()` method returns the
/// results of the inner policy. After that time it returns
/// [Exhausted][LoopState::Exhausted] if the inner policy returns
/// [Continue][LoopState::Continue]. Likewise, `on_in_progress()` returns an
/// [operation timeout][Error::is_operation_timeout] once the time is spent.
///
/// # Parameters
/// * `P` - the inner polling policy, defaults to [Optimistic].
#[derive(Debug)]
pub struct LimitedElapsedTime<P = Optimistic>
where
    P: PollingErrorPolicy,
{
    inner: P,
    maximum_duration: std::time::Duration,
}

impl LimitedElapsedTime {
    /// Creates a new instance, with the default inner policy.
    ///
    /// # Example
    /// ```
    /// # use cloud_client_gax::polling_error_policy::*;
    /// use cloud_client_gax::error::Error;
    /// use std::time::{Duration, Instant};
    /// let policy = LimitedElapsedTime::new(Duration::from_secs(10));
    /// let start = Instant::now() - Duration::from_secs(20);
    /// assert!(policy.on_error(start, 1, Error::transport("reset")).is_exhausted());
    /// ```
    pub fn new(maximum_duration: std::time::Duration) -> Self {
        Self {
            inner: Optimistic,
            maximum_duration,
        }
    }
}

impl<P> LimitedElapsedTime<P>
where
    P: PollingErrorPolicy,
{
    /// Creates a new instance with a custom inner policy.
    pub fn custom(inner: P, maximum_duration: std::time::Duration) -> Self {
        Self {
            inner,
            maximum_duration,
        }
    }

    // A deadline beyond the range of the clock never expires.
    fn expired(&self, start: std::time::Instant, now: std::time::Instant) -> bool {
        start
            .checked_add(self.maximum_duration)
            .is_some_and(|deadline| now >= deadline)
    }

    fn in_progress_impl(&self, start: std::time::Instant) -> Option<Error> {
        let now = now();
        if !self.expired(start, now) {
            return None;
        }
        Some(Error::operation_timeout(Exhausted::new(
            "elapsed time",
            format!("{:?}", now.saturating_duration_since(start)),
            format!("{:?}", self.maximum_duration),
        )))
    }
}

impl<P> PollingErrorPolicy for LimitedElapsedTime<P>
where
    P: PollingErrorPolicy + 'static,
{
    fn on_error(&self, start: std::time::Instant, count: u32, error: Error) -> LoopState {
        match self.inner.on_error(start, count, error) {
            LoopState::Continue(e) if self.expired(start, now()) => {
                LoopState::Exhausted(e)
            }
            state => state,
        }
    }

    fn on_in_progress(&self, start: std::time::Instant, count: u32) -> Option<Error> {
        self.inner
            .on_in_progress(start, count)
            .or_else(|| self.in_progress_impl(start))
    }
}

/// A polling policy decorator that limits the number of attempts.
///
/// The policy passes through the results from the inner policy as long as
/// `attempt_count < maximum_attempts`. However, once the maximum number of
/// attempts is reached, the policy replaces any [Continue][LoopState::Continue]
/// result with [Exhausted][LoopState::Exhausted].
///
/// # Parameters
/// * `P` - the inner polling policy, defaults to [Optimistic].
#[derive(Debug)]
pub struct LimitedAttemptCount<P = Optimistic>
where
    P: PollingErrorPolicy,
{
    inner: P,
    maximum_attempts: u32,
}

impl LimitedAttemptCount {
    /// Creates a new instance, with the default inner policy.
    pub fn new(maximum_attempts: u32) -> Self {
        Self {
            inner: Optimistic,
            maximum_attempts,
        }
    }
}

impl<P> LimitedAttemptCount<P>
where
    P: PollingErrorPolicy,
{
    /// Creates a new instance with a custom inner policy.
    ///
    /// # Example
    /// ```
    /// # use cloud_client_gax::polling_error_policy::*;
    /// use cloud_client_gax::error::Error;
    /// use std::time::Instant;
    /// let policy = LimitedAttemptCount::custom(AlwaysContinue, 2);
    /// let error = || Error::validation("bad input");
    /// assert!(policy.on_error(Instant::now(), 1, error()).is_continue());
    /// assert!(policy.on_error(Instant::now(), 2, error()).is_exhausted());
    /// ```
    pub fn custom(inner: P, maximum_attempts: u32) -> Self {
        Self {
            inner,
            maximum_attempts,
        }
    }

    fn in_progress_impl(&self, count: u32) -> Option<Error> {
        if count < self.maximum_attempts {
            return None;
        }
        Some(Error::operation_timeout(Exhausted::new(
            "attempt count",
            count.to_string(),
            self.maximum_attempts.to_string(),
        )))
    }
}

impl<P> PollingErrorPolicy for LimitedAttemptCount<P>
where
    P: PollingErrorPolicy,
{
    fn on_error(&self, start: std::time::Instant, count: u32, error: Error) -> LoopState {
        match self.inner.on_error(start, count, error) {
            LoopState::Continue(e) if count >= self.maximum_attempts => LoopState::Exhausted(e),
            state => state,
        }
    }

    fn on_in_progress(&self, start: std::time::Instant, count: u32) -> Option<Error> {
        self.inner
            .on_in_progress(start, count)
            .or_else(|| self.in_progress_impl(count))
    }
}

/// Indicates that a polling loop has been exhausted.
#[derive(Debug)]
pub struct Exhausted {
    limit_name: &'static str,
    value: String,
    limit: String,
}

impl Exhausted {
    pub fn new(limit_name: &'static str, value: String, limit: String) -> Self {
        Self {
            limit_name,
            value,
            limit,
        }
    }
}

impl std::fmt::Display for Exhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "polling loop exhausted, {} value ({}) exceeds limit ({})",
            self.limit_name, self.value, self.limit
        )
    }
}

impl std::error::Error for Exhausted {}

// Use the tokio clock, so tests with a paused clock see consistent time.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use std::error::Error as _;
    use std::time::{Duration, Instant};
    use test_case::test_case;

    mockall::mock! {
        #[derive(Debug)]
        Policy {}
        impl PollingErrorPolicy for Policy {
            fn on_error(&self, loop_start: std::time::Instant, attempt_count: u32, error: Error) -> LoopState;
            fn on_in_progress(&self, loop_start: std::time::Instant, attempt_count: u32) -> Option<Error>;
        }
    }

    fn http_error(code: u16) -> Error {
        Error::http(code, HeaderMap::new(), bytes::Bytes::new())
    }

    // Verify `PollingErrorPolicyArg` can be converted from the desired types.
    #[test]
    fn polling_policy_arg() {
        let policy = LimitedAttemptCount::new(3);
        let _ = PollingErrorPolicyArg::from(policy);

        let policy: Arc<dyn PollingErrorPolicy> = Arc::new(LimitedAttemptCount::new(3));
        let arg = PollingErrorPolicyArg::from(policy);
        let _: Arc<dyn PollingErrorPolicy> = arg.into();
    }

    #[test_case(http_error(404), true)]
    #[test_case(http_error(408), true)]
    #[test_case(http_error(429), true)]
    #[test_case(http_error(500), true)]
    #[test_case(http_error(503), true)]
    #[test_case(Error::transport("reset"), true)]
    #[test_case(Error::timeout("slow"), true)]
    #[test_case(Error::operation_timeout("retry budget"), true)]
    #[test_case(http_error(400), false)]
    #[test_case(http_error(403), false)]
    #[test_case(Error::deser("bad json"), false)]
    #[test_case(Error::validation("bad input"), false)]
    fn optimistic(error: Error, want_continue: bool) {
        let now = Instant::now();
        assert!(Optimistic.on_in_progress(now, 1).is_none());
        let state = Optimistic.on_error(now, 1, error);
        assert_eq!(state.is_continue(), want_continue, "{state:?}");
        assert_eq!(state.is_permanent(), !want_continue, "{state:?}");
    }

    #[test_case(http_error(503), true)]
    #[test_case(Error::transport("reset"), true)]
    #[test_case(http_error(404), false)]
    #[test_case(http_error(500), false)]
    #[test_case(Error::timeout("slow"), true)]
    #[test_case(Error::operation_timeout("retry budget"), true)]
    #[test_case(Error::deser("bad json"), false)]
    fn strict(error: Error, want_continue: bool) {
        let now = Instant::now();
        assert!(Strict.on_in_progress(now, 1).is_none());
        let state = Strict.on_error(now, 1, error);
        assert_eq!(state.is_continue(), want_continue, "{state:?}");
    }

    #[test_case(http_error(403))]
    #[test_case(Error::deser("bad json"))]
    #[test_case(Error::transport("reset"))]
    fn always_continue(error: Error) {
        let now = Instant::now();
        assert!(AlwaysContinue.on_in_progress(now, 1).is_none());
        assert!(AlwaysContinue.on_error(now, 1, error).is_continue());
    }

    #[test]
    fn with_time_limit() {
        let policy = AlwaysContinue.with_time_limit(Duration::from_secs(10));
        let start = now() - Duration::from_secs(1);
        assert!(policy.on_error(start, 1, http_error(403)).is_continue());
        assert!(policy.on_in_progress(start, 1).is_none());

        let start = now() - Duration::from_secs(20);
        let state = policy.on_error(start, 1, http_error(403));
        assert!(state.is_exhausted(), "{state:?}");
        let err = policy.on_in_progress(start, 1);
        assert!(
            err.as_ref().is_some_and(|e| e.is_operation_timeout()),
            "{err:?}"
        );
        let msg = err
            .and_then(|e| e.source().map(|s| s.to_string()))
            .unwrap_or_default();
        assert!(msg.contains("elapsed time"), "{msg}");
    }

    #[test]
    fn time_limit_beyond_clock_range() {
        let policy = AlwaysContinue.with_time_limit(Duration::MAX);
        let start = now();
        assert!(policy.on_error(start, 1, http_error(403)).is_continue());
        assert!(policy.on_in_progress(start, 1).is_none());
    }

    #[test]
    fn time_limit_passes_inner_decisions() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(1)
            .returning(|_, _, e| LoopState::Permanent(e));
        mock.expect_on_in_progress()
            .times(1)
            .returning(|_, _| Some(Error::validation("inner")));
        let policy = LimitedElapsedTime::custom(mock, Duration::from_secs(10));
        let start = now();
        assert!(policy.on_error(start, 1, http_error(503)).is_permanent());
        let err = policy.on_in_progress(start, 1);
        assert!(err.is_some_and(|e| e.is_validation()));
    }

    #[test]
    fn with_attempt_limit() {
        let policy = AlwaysContinue.with_attempt_limit(3);
        let start = now();
        assert!(policy.on_error(start, 1, http_error(403)).is_continue());
        assert!(policy.on_error(start, 2, http_error(403)).is_continue());
        assert!(policy.on_error(start, 3, http_error(403)).is_exhausted());
        assert!(policy.on_in_progress(start, 2).is_none());
        let err = policy.on_in_progress(start, 3);
        assert!(
            err.as_ref().is_some_and(|e| e.is_operation_timeout()),
            "{err:?}"
        );
    }

    #[test]
    fn attempt_limit_passes_inner_decisions() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(2)
            .returning(|_, _, e| LoopState::Permanent(e));
        mock.expect_on_in_progress().times(1).returning(|_, _| None);
        let policy = LimitedAttemptCount::custom(mock, 2);
        let start = now();
        assert!(policy.on_error(start, 1, http_error(503)).is_permanent());
        assert!(policy.on_error(start, 5, http_error(503)).is_permanent());
        assert!(policy.on_in_progress(start, 1).is_none());
    }

    #[test]
    fn exhausted_display() {
        let e = Exhausted::new("attempt count", "5".to_string(), "3".to_string());
        let fmt = e.to_string();
        assert!(fmt.contains("attempt count"), "{fmt}");
        assert!(fmt.contains("(5)"), "{fmt}");
        assert!(fmt.contains("(3)"), "{fmt}");
    }
}
