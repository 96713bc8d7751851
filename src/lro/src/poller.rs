// Copyright 2025 Google LLC
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

//! The [Poller] state machine.
//!
//! A poller starts a long-running operation exactly once (the activation),
//! then queries its status until the status is terminal. Ticks for the same
//! poller never overlap: a tick holds the driver lock from the moment it
//! reads the latest observation until it records the new one.
//!
//! Any number of tasks may observe the poller concurrently. The latest
//! observation lives in a [watch] channel, so readers never wait for a tick
//! in progress.

use crate::{OperationStatus, PollResponse};
use futures::FutureExt;
use futures::Stream;
use futures::future::{BoxFuture, Shared};
use gax::Result;
use gax::error::Error;
use gax::loop_state::LoopState;
use gax::polling_backoff_policy::{FixedInterval, PollingBackoffPolicy, PollingBackoffPolicyArg};
use gax::polling_error_policy::{Optimistic, PollingErrorPolicy, PollingErrorPolicyArg};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OnceCell, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Configures the polling loop.
///
/// The defaults poll every second, tolerate the errors classified as
/// transient by [Optimistic] (including `404`), and give up after 30 minutes.
///
/// # Example
/// ```
/// # use cloud_client_lro::PollerOptions;
/// # use gax::polling_error_policy::Strict;
/// use std::time::Duration;
/// let options = PollerOptions::default()
///     .with_poll_interval(Duration::from_secs(5))
///     .with_error_policy(Strict)
///     .with_timeout(Duration::from_secs(600));
/// ```
#[derive(Clone, Debug)]
pub struct PollerOptions {
    backoff: Arc<dyn PollingBackoffPolicy>,
    error_policy: Arc<dyn PollingErrorPolicy>,
    timeout: Option<Duration>,
}

impl PollerOptions {
    /// Waits the same amount of time between polls.
    pub fn with_poll_interval(mut self, v: Duration) -> Self {
        self.backoff = Arc::new(FixedInterval::new(v));
        self
    }

    pub fn with_backoff_policy<V: Into<PollingBackoffPolicyArg>>(mut self, v: V) -> Self {
        self.backoff = v.into().into();
        self
    }

    /// Decides which polling errors are transient.
    pub fn with_error_policy<V: Into<PollingErrorPolicyArg>>(mut self, v: V) -> Self {
        self.error_policy = v.into().into();
        self
    }

    /// Limits the time in the polling loop, measured from the activation.
    pub fn with_timeout(mut self, v: Duration) -> Self {
        self.timeout = Some(v);
        self
    }

    /// Polls without a time limit.
    ///
    /// Only use this with an error policy that eventually gives up.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            backoff: Arc::new(FixedInterval::default()),
            error_policy: Arc::new(Optimistic),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

type Activation<T> = Shared<BoxFuture<'static, std::result::Result<PollResponse<T>, Arc<Error>>>>;
type Operation<T, R> = Box<dyn Fn(PollResponse<T>) -> BoxFuture<'static, Result<R>> + Send + Sync>;

fn boxed_operation<T, R, F, Fut>(f: F) -> Operation<T, R>
where
    F: Fn(PollResponse<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    Box::new(move |r: PollResponse<T>| f(r).boxed())
}

/// Assembles a [Poller] from the operations that drive it.
pub struct PollerBuilder<T, U> {
    activation: BoxFuture<'static, Result<PollResponse<T>>>,
    poll: Operation<T, PollResponse<T>>,
    cancel: Option<Operation<T, PollResponse<T>>>,
    fetch: Operation<T, U>,
    options: PollerOptions,
}

impl<T, U> PollerBuilder<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    /// Sets the operation to cancel the remote operation.
    ///
    /// The operation receives the latest observation, and must return a
    /// response with [OperationStatus::UserCancelled] to confirm the
    /// cancellation.
    pub fn with_cancel_operation<C, CF>(mut self, cancel: C) -> Self
    where
        C: Fn(PollResponse<T>) -> CF + Send + Sync + 'static,
        CF: Future<Output = Result<PollResponse<T>>> + Send + 'static,
    {
        self.cancel = Some(boxed_operation(cancel));
        self
    }

    pub fn with_options(mut self, v: PollerOptions) -> Self {
        self.options = v;
        self
    }

    pub fn build(self) -> Poller<T, U> {
        let activation = self.activation.map(|r| r.map_err(Arc::new)).boxed().shared();
        let (state, _) = watch::channel(State::default());
        Poller {
            inner: Arc::new(Inner {
                options: self.options,
                activation,
                poll: self.poll,
                cancel: self.cancel,
                fetch: self.fetch,
                driver: tokio::sync::Mutex::new(()),
                state,
                result: OnceCell::new(),
                stopped: CancellationToken::new(),
            }),
            auto_polling: Mutex::new(None),
        }
    }
}

/// Drives a long-running operation to completion.
///
/// # Parameters
/// * `T` - the value carried by each [PollResponse].
/// * `U` - the final result of the operation.
///
/// The operation is activated lazily, on the first call to [activate],
/// [poll], or any of the `block_until*()` functions. Activation runs exactly
/// once, even if several tasks use the poller concurrently. If it fails the
/// poller moves directly to [OperationStatus::Failed].
///
/// Dropping the poller stops any background polling. The remote operation is
/// not affected.
///
/// # Example
/// ```
/// # use cloud_client_lro::*;
/// # async fn sample() -> gax::Result<()> {
/// let poller = Poller::builder(
///     || async { Ok(PollResponse::in_progress("op-123".to_string())) },
///     |latest| async move {
///         let id = latest.into_value().unwrap_or_default();
///         Ok(PollResponse::completed(id))
///     },
///     |done| async move { Ok(done.into_value().unwrap_or_default().len()) },
/// )
/// .build();
/// let response = poller.block_until_done().await?;
/// assert!(response.status().is_success());
/// let result = poller.get_result().await?;
/// # Ok(()) }
/// ```
///
/// [activate]: Poller::activate
/// [poll]: Poller::poll
pub struct Poller<T, U> {
    inner: Arc<Inner<T, U>>,
    auto_polling: Mutex<Option<DropGuard>>,
}

impl<T, U> Poller<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    /// Starts building a poller.
    ///
    /// # Parameters
    /// * `activation` - starts the remote operation, returning the first
    ///   observation.
    /// * `poll` - queries the status of the operation, receiving the latest
    ///   observation.
    /// * `fetch_result` - produces the final result once the operation
    ///   completes successfully. It runs at most once per poller.
    pub fn builder<A, AF, P, PF, F, FF>(
        activation: A,
        poll: P,
        fetch_result: F,
    ) -> PollerBuilder<T, U>
    where
        A: FnOnce() -> AF + Send + 'static,
        AF: Future<Output = Result<PollResponse<T>>> + Send + 'static,
        P: Fn(PollResponse<T>) -> PF + Send + Sync + 'static,
        PF: Future<Output = Result<PollResponse<T>>> + Send + 'static,
        F: Fn(PollResponse<T>) -> FF + Send + Sync + 'static,
        FF: Future<Output = Result<U>> + Send + 'static,
    {
        PollerBuilder {
            activation: async move { activation().await }.boxed(),
            poll: boxed_operation(poll),
            cancel: None,
            fetch: boxed_operation(fetch_result),
            options: PollerOptions::default(),
        }
    }

    /// The status of the latest observation.
    pub fn status(&self) -> OperationStatus {
        self.inner.state.borrow().status()
    }

    pub fn is_complete(&self) -> bool {
        self.status().is_complete()
    }

    /// The latest observation, if the poller has been activated.
    pub fn latest_response(&self) -> Option<PollResponse<T>> {
        self.inner.latest()
    }

    /// The response returned by the activation, if it succeeded.
    pub fn activation_response(&self) -> Option<PollResponse<T>> {
        self.inner.state.borrow().activation.clone()
    }

    /// The error that moved the poller to [OperationStatus::Failed], if any.
    ///
    /// Operations that report their own failure do not have an error here,
    /// their details are in the latest response.
    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.inner.state.borrow().error.clone()
    }

    /// Returns true once [cancel][Poller::cancel] stops the local polling.
    pub fn is_detached(&self) -> bool {
        self.inner.stopped.is_cancelled()
    }

    /// Activates the operation, if needed, and returns the activation
    /// response.
    ///
    /// Fails if [cancel][Poller::cancel] stopped the poller before the
    /// operation started.
    pub async fn activate(&self) -> Result<PollResponse<T>> {
        if self.inner.stopped.is_cancelled() && self.inner.latest().is_none() {
            return Err(Error::cancelled(StatusError::Detached));
        }
        self.inner.activate().await
    }

    /// Runs one poll tick, activating the operation first if needed.
    ///
    /// Does not query the service if the operation is complete, or if local
    /// polling has stopped. Returns the polling error when the error policy
    /// considers it transient. The poller status does not change in that case.
    pub async fn poll(&self) -> Result<PollResponse<T>> {
        match self.inner.tick(None).await? {
            Tick::Done(r) | Tick::Pending(r) | Tick::Stopped(r) => Ok(r),
            Tick::Transient(e) => Err(e),
        }
    }

    /// Polls until the operation reaches a terminal status.
    ///
    /// Returns the final observation, which may be a failure reported by the
    /// service. Returns an error if the activation fails, if polling fails
    /// with a permanent error, or if the polling budget runs out. If local
    /// polling stops, returns the last observation.
    ///
    /// Dropping the returned future stops waiting. The poller remains usable,
    /// so callers may use [tokio::time::timeout] or `tokio::select!` with a
    /// cancellation token to bound the wait.
    pub async fn block_until_done(&self) -> Result<PollResponse<T>> {
        self.inner.run_until(OperationStatus::is_complete).await
    }

    /// Polls until the operation reaches `target` or a terminal status.
    pub async fn block_until(&self, target: OperationStatus) -> Result<PollResponse<T>> {
        self.inner
            .run_until(move |s| s == &target || s.is_complete())
            .await
    }

    /// Cancels the operation.
    ///
    /// If the poller has a cancel operation and the operation is in progress,
    /// calls it. The status becomes [OperationStatus::UserCancelled] only if
    /// the cancel operation confirms it. In every other case the poller stops
    /// polling but keeps its status, and the remote operation may continue.
    ///
    /// Returns the status after the cancellation.
    pub async fn cancel(&self) -> Result<OperationStatus> {
        let status = self.status();
        if status.is_complete() {
            return Ok(status);
        }
        let Some(cancel) = &self.inner.cancel else {
            self.inner.stop("the poller has no cancel operation");
            return Ok(status);
        };
        let _driver = self.inner.driver.lock().await;
        let Some(latest) = self.latest_response() else {
            self.inner.stop("the operation has not started");
            return Ok(OperationStatus::NotStarted);
        };
        if latest.status().is_complete() {
            return Ok(latest.status().clone());
        }
        let response = cancel(latest).await?;
        if response.status() == &OperationStatus::UserCancelled {
            self.inner.record(response);
            self.inner.stop("the operation was cancelled");
            return Ok(OperationStatus::UserCancelled);
        }
        self.inner.stop("the service did not confirm the cancellation");
        Ok(self.status())
    }

    /// Returns the final result of a successful operation.
    ///
    /// The result is fetched once and cached, later calls return the same
    /// value without any requests.
    ///
    /// Fails with [is_not_complete] before the operation completes, with
    /// [is_cancelled] if it was cancelled, and with [is_operation_failed] for
    /// any other terminal status.
    ///
    /// [is_not_complete]: Error::is_not_complete
    /// [is_cancelled]: Error::is_cancelled
    /// [is_operation_failed]: Error::is_operation_failed
    pub async fn get_result(&self) -> Result<U> {
        if let Some(v) = self.inner.result.get() {
            return Ok(v.clone());
        }
        let state = self.inner.state.borrow().clone();
        let status = state.status();
        match (status, state.latest, state.error) {
            (OperationStatus::SuccessfullyCompleted, Some(latest), _) => {
                let fetch = &self.inner.fetch;
                let v = self.inner.result.get_or_try_init(|| fetch(latest)).await?;
                Ok(v.clone())
            }
            (OperationStatus::UserCancelled, _, _) => {
                Err(Error::cancelled(StatusError::Cancelled))
            }
            (_, _, Some(e)) => Err(Error::operation_failed(e)),
            (s, _, None) if s.is_complete() => {
                Err(Error::operation_failed(StatusError::Failed(s)))
            }
            (s, _, None) => Err(Error::not_complete(StatusError::NotComplete(s))),
        }
    }

    /// Starts or stops polling in a background task.
    ///
    /// The task runs until the operation completes, the polling loop fails,
    /// auto polling is disabled, or the poller is dropped. Must be called
    /// from within a Tokio runtime. Use
    /// [status_changes][Poller::status_changes] to observe its progress.
    pub fn set_auto_polling(&self, enabled: bool) {
        let mut slot = self
            .auto_polling
            .lock()
            .expect("auto polling lock is poisoned");
        if !enabled {
            *slot = None;
            return;
        }
        if slot.is_some() {
            return;
        }
        let token = self.inner.stopped.child_token();
        let inner = self.inner.clone();
        let cancelled = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => tracing::debug!("auto polling stopped"),
                r = inner.run_until(OperationStatus::is_complete) => match r {
                    Ok(r) => tracing::debug!(status = %r.status(), "auto polling finished"),
                    Err(e) => tracing::debug!("auto polling finished: {e}"),
                },
            }
        });
        *slot = Some(token.drop_guard());
    }

    /// Returns true if a background task is polling the operation.
    pub fn is_auto_polling(&self) -> bool {
        self.auto_polling
            .lock()
            .expect("auto polling lock is poisoned")
            .is_some()
    }

    /// Streams the observations of the operation.
    ///
    /// The stream starts with the latest observation, if any, and ends after
    /// a terminal observation, or when local polling stops. Observations
    /// made while the consumer is busy may be skipped, the stream always
    /// yields the most recent one.
    pub fn status_changes(&self) -> impl Stream<Item = PollResponse<T>> + Send + 'static {
        let rx = self.inner.state.subscribe();
        let stopped = self.inner.stopped.clone();
        futures::stream::unfold(
            (rx, stopped, 0_u64, false),
            |(mut rx, stopped, seen, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    let (observed, latest) = {
                        let state = rx.borrow_and_update();
                        (state.observed, state.latest.clone())
                    };
                    if let Some(r) = latest.filter(|_| observed > seen) {
                        let finished = r.status().is_complete();
                        return Some((r, (rx, stopped, observed, finished)));
                    }
                    tokio::select! {
                        changed = rx.changed() => changed.ok()?,
                        _ = stopped.cancelled() => return None,
                    }
                }
            },
        )
    }
}

impl<T, U> std::fmt::Debug for Poller<T, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("status", &self.inner.state.borrow().status())
            .field("detached", &self.inner.stopped.is_cancelled())
            .field("options", &self.inner.options)
            .finish()
    }
}

struct Inner<T, U> {
    options: PollerOptions,
    activation: Activation<T>,
    poll: Operation<T, PollResponse<T>>,
    cancel: Option<Operation<T, PollResponse<T>>>,
    fetch: Operation<T, U>,
    // Held for the duration of each tick and cancel request.
    driver: tokio::sync::Mutex<()>,
    state: watch::Sender<State<T>>,
    result: OnceCell<U>,
    stopped: CancellationToken,
}

#[derive(Clone, Debug)]
struct State<T> {
    activated: bool,
    activation: Option<PollResponse<T>>,
    latest: Option<PollResponse<T>>,
    error: Option<Arc<Error>>,
    loop_start: Option<std::time::Instant>,
    attempt_count: u32,
    // Incremented each time `latest` changes.
    observed: u64,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            activated: false,
            activation: None,
            latest: None,
            error: None,
            loop_start: None,
            attempt_count: 0,
            observed: 0,
        }
    }
}

impl<T> State<T> {
    fn status(&self) -> OperationStatus {
        self.latest
            .as_ref()
            .map(|r| r.status().clone())
            .unwrap_or(OperationStatus::NotStarted)
    }
}

enum Tick<T> {
    Done(PollResponse<T>),
    Pending(PollResponse<T>),
    Stopped(PollResponse<T>),
    Transient(Error),
}

impl<T, U> Inner<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    async fn activate(&self) -> Result<PollResponse<T>> {
        let result = self.activation.clone().await;
        self.state.send_if_modified(|s| {
            if s.activated {
                return false;
            }
            s.activated = true;
            s.loop_start = Some(now());
            s.observed += 1;
            match &result {
                Ok(r) => {
                    tracing::debug!(status = %r.status(), "operation activated");
                    s.activation = Some(r.clone());
                    s.latest = Some(r.clone());
                }
                Err(e) => {
                    tracing::info!("operation activation failed: {e}");
                    s.error = Some(e.clone());
                    s.latest = Some(PollResponse::new(OperationStatus::Failed, None));
                }
            }
            true
        });
        result.map_err(Error::operation_failed)
    }

    /// Polls the operation once.
    ///
    /// With `paced`, the attempt count seen before waiting for the poll
    /// interval: if another caller polled in the meantime, this tick returns
    /// that observation instead of polling again.
    async fn tick(&self, paced: Option<u32>) -> Result<Tick<T>> {
        if self.stopped.is_cancelled() && self.latest().is_none() {
            return Ok(Tick::Stopped(PollResponse::new(OperationStatus::NotStarted, None)));
        }
        let activation = self.activate().await?;
        let _driver = self.driver.lock().await;
        let state = self.state.borrow().clone();
        let latest = state.latest.unwrap_or(activation);
        if latest.status().is_complete() {
            return Ok(Tick::Done(latest));
        }
        if self.stopped.is_cancelled() {
            return Ok(Tick::Stopped(latest));
        }
        if paced.is_some_and(|seen| seen != state.attempt_count) {
            return Ok(Tick::Pending(latest));
        }
        let loop_start = state.loop_start.unwrap_or_else(now);
        if let Some(limit) = self.options.timeout {
            // A deadline beyond the range of the clock never expires.
            if loop_start.checked_add(limit).is_some_and(|d| now() >= d) {
                return Err(Error::operation_timeout(PollingTimeout(limit)));
            }
        }
        let attempt_count = state.attempt_count + 1;
        self.state.send_modify(|s| s.attempt_count = attempt_count);

        let response = match (self.poll)(latest).await {
            Ok(r) => r,
            Err(e) => {
                return match self.options.error_policy.on_error(loop_start, attempt_count, e) {
                    LoopState::Continue(e) => {
                        tracing::debug!(attempt_count, "transient polling error: {e}");
                        Ok(Tick::Transient(e))
                    }
                    LoopState::Exhausted(e) => Err(Error::operation_timeout(e)),
                    LoopState::Permanent(e) => {
                        let e = Arc::new(e);
                        self.fail(e.clone());
                        Err(Error::operation_failed(e))
                    }
                };
            }
        };
        self.record(response.clone());
        if response.status().is_complete() {
            tracing::info!(attempt_count, status = %response.status(), "operation completed");
            return Ok(Tick::Done(response));
        }
        if let Some(e) = self
            .options
            .error_policy
            .on_in_progress(loop_start, attempt_count)
        {
            return Err(e);
        }
        Ok(Tick::Pending(response))
    }

    async fn run_until<F>(&self, done: F) -> Result<PollResponse<T>>
    where
        F: Fn(&OperationStatus) -> bool,
    {
        let mut latest = match self.latest() {
            Some(r) => r,
            None if self.stopped.is_cancelled() => {
                return Ok(PollResponse::new(OperationStatus::NotStarted, None));
            }
            None => self.activate().await?,
        };
        loop {
            if done(latest.status()) || self.stopped.is_cancelled() {
                return Ok(latest);
            }
            let seen = self.state.borrow().attempt_count;
            let delay = latest
                .retry_after()
                .unwrap_or_else(|| self.wait_period());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = self.stopped.cancelled() => {},
            }
            latest = match self.tick(Some(seen)).await? {
                Tick::Done(r) => return Ok(r),
                Tick::Pending(r) | Tick::Stopped(r) => r,
                Tick::Transient(_) => self.latest().unwrap_or(latest),
            };
        }
    }

    fn latest(&self) -> Option<PollResponse<T>> {
        self.state.borrow().latest.clone()
    }

    fn wait_period(&self) -> Duration {
        let state = self.state.borrow();
        let loop_start = state.loop_start.unwrap_or_else(now);
        self.options
            .backoff
            .wait_period(loop_start, state.attempt_count.max(1))
    }

    fn record(&self, response: PollResponse<T>) {
        self.state.send_modify(|s| {
            s.latest = Some(response);
            s.observed += 1;
        });
    }

    fn fail(&self, error: Arc<Error>) {
        tracing::info!("polling failed: {error}");
        self.state.send_modify(|s| {
            let value = s.latest.take().and_then(PollResponse::into_value);
            s.latest = Some(PollResponse::new(OperationStatus::Failed, value));
            s.error = Some(error);
            s.observed += 1;
        });
    }

    fn stop(&self, reason: &'static str) {
        if !self.stopped.is_cancelled() {
            tracing::info!("stopped polling: {reason}");
            self.stopped.cancel();
        }
    }
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

#[derive(thiserror::Error, Debug)]
enum StatusError {
    #[error("the operation was cancelled")]
    Cancelled,
    #[error("the poller was cancelled before the operation started")]
    Detached,
    #[error("the operation completed with status {0}")]
    Failed(OperationStatus),
    #[error("the operation is not complete, its status is {0}")]
    NotComplete(OperationStatus),
}

#[derive(thiserror::Error, Debug)]
#[error("the polling loop exceeded its time limit of {0:?}")]
struct PollingTimeout(Duration);
