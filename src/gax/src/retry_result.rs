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

use crate::error::Error;
use crate::response::Response;

/// The outcome of a failed attempt.
///
/// Transports return responses for all status codes. The retry loop treats
/// 4xx and 5xx responses as failures, but keeps the response intact: if the
/// loop stops, the caller receives the last response unchanged.
#[derive(Debug)]
pub enum Failure {
    /// The attempt did not produce a response.
    Error(Error),
    /// The attempt produced a response with a 4xx or 5xx status code.
    Response(Response),
}

impl Failure {
    /// The HTTP status code, from either the response or the error.
    pub fn http_status_code(&self) -> Option<u16> {
        match self {
            Self::Error(e) => e.http_status_code(),
            Self::Response(r) => Some(r.status().as_u16()),
        }
    }

    /// The response headers, if any.
    pub fn headers(&self) -> Option<&http::HeaderMap> {
        match self {
            Self::Error(e) => e.http_headers(),
            Self::Response(r) => Some(r.headers()),
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Error(e) => Some(e),
            Self::Response(_) => None,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Error(_) => None,
            Self::Response(r) => Some(r),
        }
    }

    /// Converts the failure into an error.
    pub fn into_error(self) -> Error {
        match self {
            Self::Error(e) => e,
            Self::Response(r) => r.into_error(),
        }
    }

    /// Converts the failure into the result surfaced by the retry loop,
    /// annotated with the number of attempts.
    pub(crate) fn into_result(self, attempt_count: u32) -> crate::Result<Response> {
        match self {
            Self::Error(e) => Err(e.with_attempt_count(attempt_count)),
            Self::Response(r) => Ok(r.set_attempt_count(attempt_count)),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::Response(r) => write!(f, "the service responded with {}", r.status()),
        }
    }
}

/// The result of a retry policy decision.
#[derive(Debug)]
pub enum RetryResult {
    /// The failure is non-retryable, stop the loop.
    Permanent(Failure),

    /// The failure is retryable, but the policy is stopping the loop.
    ///
    /// Loop control policies may stop the loop on retryable failures, for
    /// example, because the policy only allows a limited number of attempts.
    Exhausted(Failure),

    /// The failure was retryable, continue the loop.
    Continue(Failure),
}

impl RetryResult {
    pub fn is_permanent(&self) -> bool {
        match &self {
            Self::Permanent(_) => true,
            Self::Exhausted(_) | Self::Continue(_) => false,
        }
    }
    pub fn is_exhausted(&self) -> bool {
        match &self {
            Self::Exhausted(_) => true,
            Self::Permanent(_) | Self::Continue(_) => false,
        }
    }
    pub fn is_continue(&self) -> bool {
        match &self {
            Self::Continue(_) => true,
            Self::Permanent(_) | Self::Exhausted(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use http::StatusCode;

    fn response(status: StatusCode) -> Response {
        let url = url::Url::parse("https://example.com/v1/things").unwrap();
        Response::new(Request::new(http::Method::GET, url), status)
    }

    #[test]
    fn retry_result() {
        let flow = RetryResult::Permanent(Failure::Response(response(StatusCode::NOT_FOUND)));
        assert!(flow.is_permanent(), "{flow:?}");
        assert!(!flow.is_exhausted(), "{flow:?}");
        assert!(!flow.is_continue(), "{flow:?}");

        let flow = RetryResult::Exhausted(Failure::Error(Error::transport("reset")));
        assert!(!flow.is_permanent(), "{flow:?}");
        assert!(flow.is_exhausted(), "{flow:?}");
        assert!(!flow.is_continue(), "{flow:?}");

        let flow = RetryResult::Continue(Failure::Error(Error::timeout("slow")));
        assert!(!flow.is_permanent(), "{flow:?}");
        assert!(!flow.is_exhausted(), "{flow:?}");
        assert!(flow.is_continue(), "{flow:?}");
    }

    #[test]
    fn failure_response() {
        let failure = Failure::Response(response(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(failure.http_status_code(), Some(503));
        assert!(failure.headers().is_some());
        assert!(failure.response().is_some());
        assert!(failure.error().is_none());
        let got = failure.into_result(4);
        let response = got.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.attempt_count(), 4);

        let failure = Failure::Response(response_with_body());
        let error = failure.into_error();
        assert_eq!(error.http_status_code(), Some(409));
        assert_eq!(error.http_payload().map(|p| p.as_ref()), Some(b"conflict".as_slice()));
    }

    fn response_with_body() -> Response {
        response(StatusCode::CONFLICT).set_body("conflict")
    }

    #[test]
    fn failure_error() {
        let failure = Failure::Error(Error::transport("reset"));
        assert_eq!(failure.http_status_code(), None);
        assert!(failure.headers().is_none());
        assert!(failure.error().is_some());
        assert!(failure.response().is_none());
        let got = failure.into_result(2);
        let err = got.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
        assert_eq!(err.attempt_count(), Some(2));
    }
}
