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

//! Polling loop control types.
//!
//! A [PollingErrorPolicy][crate::polling_error_policy::PollingErrorPolicy]
//! returns a [LoopState] for each error observed while polling a long-running
//! operation. Applications only need these types when implementing their own
//! polling policies.

use crate::error::Error;

/// The result of a polling loop control decision.
#[derive(Debug)]
pub enum LoopState {
    /// The error is not recoverable, the operation has failed.
    Permanent(Error),

    /// The error is recoverable, but the policy is stopping the loop.
    ///
    /// For example, the policy only tolerates a limited number of errors, or
    /// the polling budget is spent.
    Exhausted(Error),

    /// The error is recoverable, keep polling.
    Continue(Error),
}

impl LoopState {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }

    /// Returns the error that triggered this decision.
    pub fn error(&self) -> &Error {
        match self {
            Self::Permanent(e) | Self::Exhausted(e) | Self::Continue(e) => e,
        }
    }

    /// Consumes the decision, returning the error that triggered it.
    pub fn into_error(self) -> Error {
        match self {
            Self::Permanent(e) | Self::Exhausted(e) | Self::Continue(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;

    #[test]
    fn loop_state() {
        let flow = LoopState::Permanent(http_error(403));
        assert!(flow.is_permanent(), "{flow:?}");
        assert!(!flow.is_exhausted(), "{flow:?}");
        assert!(!flow.is_continue(), "{flow:?}");

        let flow = LoopState::Exhausted(http_error(503));
        assert!(!flow.is_permanent(), "{flow:?}");
        assert!(flow.is_exhausted(), "{flow:?}");
        assert!(!flow.is_continue(), "{flow:?}");

        let flow = LoopState::Continue(http_error(503));
        assert!(!flow.is_permanent(), "{flow:?}");
        assert!(!flow.is_exhausted(), "{flow:?}");
        assert!(flow.is_continue(), "{flow:?}");
    }

    #[test]
    fn error() {
        let flow = LoopState::Exhausted(http_error(503));
        assert_eq!(flow.error().http_status_code(), Some(503));
        let err = flow.into_error();
        assert_eq!(err.http_status_code(), Some(503));
    }

    fn http_error(code: u16) -> Error {
        Error::http(code, HeaderMap::new(), bytes::Bytes::new())
    }
}
