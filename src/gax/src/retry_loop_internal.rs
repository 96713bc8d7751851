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

use super::Result;
use super::backoff_policy::BackoffPolicy;
use super::error::Error;
use super::response::Response;
use super::retry_policy::{Failure, RetryPolicy, RetryResult, RetryState};
use std::sync::Arc;
use std::time::Duration;

enum RetryLoopAttempt {
    // The first attempt
    Initial,
    // (Attempt count, backoff delay, previous failure)
    Retry(u32, Duration, Failure),
}

impl RetryLoopAttempt {
    fn count(&self) -> u32 {
        match self {
            RetryLoopAttempt::Initial => 0,
            RetryLoopAttempt::Retry(count, _, _) => *count,
        }
    }
}

/// Runs the retry loop for a given function.
///
/// This functions calls an inner function as long as (1) the retry policy has
/// not expired, (2) the inner function has not returned a successful response,
/// and (3) the request can be sent again.
///
/// In between calls the function waits the amount of time prescribed by the
/// server (`Retry-After` and friends) or, if the server does not say, by the
/// backoff policy. It uses `sleep` to implement any sleep.
///
/// Responses with a 4xx or 5xx status code count as failures. If the loop
/// stops on such a response the response is returned, as `Ok()`, with its
/// attempt count updated.
pub async fn retry_loop<F, Fut, S, SFut>(
    mut inner: F,
    sleep: S,
    idempotent: bool,
    replayable: bool,
    retry_policy: Arc<dyn RetryPolicy>,
    backoff_policy: Arc<dyn BackoffPolicy>,
) -> Result<Response>
where
    F: FnMut(Option<Duration>) -> Fut + Send,
    Fut: Future<Output = Result<Response>> + Send,
    S: Fn(Duration) -> SFut + Send,
    SFut: Future<Output = ()> + Send,
{
    let loop_start = tokio::time::Instant::now().into_std();
    let state = RetryState::new(idempotent).set_start(loop_start);
    let mut attempt_state = RetryLoopAttempt::Initial;
    loop {
        let mut attempt_count = attempt_state.count();
        let remaining_time =
            retry_policy.remaining_time(&state.clone().set_attempt_count(attempt_count));

        if let RetryLoopAttempt::Retry(attempt_count, delay, prev) = attempt_state {
            if remaining_time.is_some_and(|remaining| remaining < delay) {
                return Err(Error::operation_timeout(prev.into_error())
                    .with_attempt_count(attempt_count));
            }
            tracing::warn!(
                attempt_count,
                delay_ms = delay.as_millis() as u64,
                "retrying request after failure: {prev}"
            );
            sleep(delay).await;
        }
        attempt_count += 1;
        let failure = match inner(remaining_time).await {
            Ok(r) if !r.is_error_status() => return Ok(r.set_attempt_count(attempt_count)),
            Ok(r) => Failure::Response(r),
            Err(e) => Failure::Error(e),
        };
        let flow = retry_policy.on_error(&state.clone().set_attempt_count(attempt_count), failure);
        let failure = match flow {
            RetryResult::Permanent(f) | RetryResult::Exhausted(f) => {
                return f.into_result(attempt_count);
            }
            RetryResult::Continue(f) => f,
        };
        if !replayable {
            if !idempotent {
                return failure.into_result(attempt_count);
            }
            return Err(Error::transport(NotReplayable(failure.to_string()))
                .with_attempt_count(attempt_count));
        }
        let delay = failure
            .headers()
            .and_then(crate::retry_after::from_headers)
            .unwrap_or_else(|| backoff_policy.on_failure(loop_start, attempt_count));
        attempt_state = RetryLoopAttempt::Retry(attempt_count, delay, failure);
    }
}

/// A helper to compute the time available for an attempt, given the attempt
/// timeout and the time remaining in the retry loop.
pub fn effective_timeout(
    attempt_timeout: Option<Duration>,
    remaining_time: Option<Duration>,
) -> Option<Duration> {
    match (attempt_timeout, remaining_time) {
        (None, None) => None,
        (None, Some(t)) => Some(t),
        (Some(t), None) => Some(t),
        (Some(a), Some(r)) => Some(std::cmp::min(a, r)),
    }
}

#[derive(Debug)]
struct NotReplayable(String);

impl std::fmt::Display for NotReplayable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "the request body cannot be replayed, cannot retry after: {}",
            self.0
        )
    }
}

impl std::error::Error for NotReplayable {}
