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

use crate::OperationStatus;
use std::time::Duration;

/// A single observation of a long-running operation.
///
/// The poller keeps the first observation (the activation response) and the
/// latest one.
#[derive(Clone, Debug, PartialEq)]
pub struct PollResponse<T> {
    status: OperationStatus,
    value: Option<T>,
    retry_after: Option<Duration>,
}

impl<T> PollResponse<T> {
    pub fn new(status: OperationStatus, value: Option<T>) -> Self {
        Self {
            status,
            value,
            retry_after: None,
        }
    }

    /// A response for an operation that is still running.
    pub fn in_progress(value: T) -> Self {
        Self::new(OperationStatus::InProgress, Some(value))
    }

    /// A response for an operation that completed successfully.
    pub fn completed(value: T) -> Self {
        Self::new(OperationStatus::SuccessfullyCompleted, Some(value))
    }

    /// Requests a different wait before the next poll.
    ///
    /// Typically set from the `Retry-After` header of the status response. It
    /// takes precedence over the poller's backoff policy.
    pub fn with_retry_after(mut self, v: Duration) -> Self {
        self.retry_after = Some(v);
        self
    }

    pub fn status(&self) -> &OperationStatus {
        &self.status
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let r = PollResponse::in_progress(42);
        assert_eq!(r.status(), &OperationStatus::InProgress);
        assert_eq!(r.value(), Some(&42));
        assert_eq!(r.retry_after(), None);

        let r = r.with_retry_after(Duration::from_secs(3));
        assert_eq!(r.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(r.into_value(), Some(42));

        let r = PollResponse::<i32>::new(OperationStatus::Failed, None);
        assert!(r.status().is_complete());
        assert_eq!(r.value(), None);
    }
}
