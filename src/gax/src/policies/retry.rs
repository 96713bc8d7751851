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

use crate::Result;
use crate::backoff_policy::{BackoffPolicy, BackoffPolicyArg};
use crate::error::Error;
use crate::exponential_backoff::ExponentialBackoff;
use crate::options::RetryOptions;
use crate::policy::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::retry_loop_internal::{effective_timeout, retry_loop};
use crate::retry_policy::{
    RetryPolicy as RetryDecider, RetryPolicyArg, RetryPolicyExt, RetryableStatusCodes,
};
use std::sync::Arc;
use std::time::Duration;

/// Sends the request again on transient failures.
///
/// Every policy after this one in the pipeline runs once per attempt. The
/// attempt count of the final response (or error) includes the first attempt.
///
/// # Example
/// ```
/// # use cloud_client_gax::policies::RetryPolicy;
/// # use cloud_client_gax::options::RetryOptions;
/// # use std::time::Duration;
/// # fn sample() -> anyhow::Result<()> {
/// let options = RetryOptions::builder()
///     .with_max_retries(2)
///     .with_per_try_timeout(Duration::from_secs(5))
///     .build()?;
/// let policy = RetryPolicy::new(&options);
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    retry: Arc<dyn RetryDecider>,
    backoff: Arc<dyn BackoffPolicy>,
    per_try_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Creates the policy from the retry settings in the client options.
    pub fn new(options: &RetryOptions) -> Self {
        let codes = RetryableStatusCodes::new(options.retryable_status_codes().iter().copied())
            .with_attempt_limit(options.max_retries().saturating_add(1));
        let retry: Arc<dyn RetryDecider> = match options.overall_timeout() {
            Some(t) => Arc::new(codes.with_time_limit(t)),
            None => Arc::new(codes),
        };
        Self {
            retry,
            backoff: Arc::new(ExponentialBackoff::from_retry_options(options)),
            per_try_timeout: options.per_try_timeout(),
        }
    }

    /// Creates the policy with a custom retry and backoff policy.
    pub fn custom<R, B>(retry: R, backoff: B) -> Self
    where
        R: Into<RetryPolicyArg>,
        B: Into<BackoffPolicyArg>,
    {
        Self {
            retry: retry.into().into(),
            backoff: backoff.into().into(),
            per_try_timeout: None,
        }
    }

    /// Limits the time for each attempt.
    pub fn with_per_try_timeout(mut self, v: Duration) -> Self {
        self.per_try_timeout = Some(v);
        self
    }
}

impl Policy for RetryPolicy {
    async fn send(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let idempotent = request.is_idempotent();
        let replayable = request.body().is_replayable();
        let per_try_timeout = self.per_try_timeout;
        let request = &request;
        let inner = move |remaining: Option<Duration>| {
            let mut attempt = request.clone();
            let timeout = effective_timeout(per_try_timeout, remaining);
            attempt.set_attempt_timeout(timeout);
            async move {
                match timeout {
                    None => next.run(attempt).await,
                    Some(t) => match tokio::time::timeout(t, next.run(attempt)).await {
                        Ok(r) => r,
                        Err(e) => Err(Error::timeout(e)),
                    },
                }
            }
        };
        retry_loop(
            inner,
            tokio::time::sleep,
            idempotent,
            replayable,
            self.retry.clone(),
            self.backoff.clone(),
        )
        .await
    }
}
