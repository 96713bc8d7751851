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

use super::ServiceError;
use http::HeaderMap;
use std::error::Error as StdError;

type BoxError = Box<dyn StdError + Send + Sync>;

/// The core error returned by all client libraries.
///
/// The client libraries report errors from multiple sources. For example, the
/// service may return an error, the transport may be unable to create the
/// necessary connection to make a request, the request may timeout before a
/// response is received, the retry policy may be exhausted, or the library may
/// be unable to format the request due to invalid or missing application
/// inputs.
///
/// Most applications will just return the error or log it, without any further
/// action. However, some applications may need to interrogate the error
/// details. This type offers a series of predicates to determine the error
/// kind. The type also offers accessors to query the most common error details.
/// Applications can query the error [source][std::error::Error::source] for
/// deeper information.
///
/// # Example
/// ```
/// use cloud_client_gax::error::Error;
/// match example_function() {
///     Err(e) if e.http_status_code() == Some(404) => {
///         println!("not found {e}, debug using {:?}", e.service_error());
///     },
///     Err(e) if e.is_timeout() => { println!("not enough time {e}"); },
///     Err(e) => { println!("some other error {e}"); },
///     Ok(_) => { println!("success, how boring"); },
/// }
///
/// fn example_function() -> Result<String, Error> {
///     // ... details omitted ...
///     # Err(Error::http(404, http::HeaderMap::new(), bytes::Bytes::from_static(b"NOT FOUND")))
/// }
/// ```
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<BoxError>,
    attempt_count: Option<u32>,
}

impl Error {
    /// Creates an error from a response with a 4xx or 5xx status code.
    ///
    /// If the payload contains a JSON error envelope it is parsed and made
    /// available via [service_error()][Error::service_error].
    ///
    /// # Example
    /// ```
    /// use cloud_client_gax::error::Error;
    /// let payload = bytes::Bytes::from_static(br#"{"error": {"code": "Gone", "message": "deleted"}}"#);
    /// let error = Error::http(410, http::HeaderMap::new(), payload);
    /// assert_eq!(error.http_status_code(), Some(410));
    /// assert_eq!(error.service_error().map(|e| e.code()), Some("Gone"));
    /// ```
    pub fn http(status_code: u16, headers: HeaderMap, payload: bytes::Bytes) -> Self {
        let service_error = ServiceError::from_payload(&payload);
        let details = HttpDetails {
            status_code,
            headers,
            payload,
            service_error,
        };
        Self::new(ErrorKind::Http(Box::new(details)), None)
    }

    /// A response with an unsuccessful HTTP status code.
    ///
    /// # Troubleshooting
    ///
    /// Consult the service documentation for the meaning of the status code.
    /// Many services include a more detailed description in the payload,
    /// see [service_error()][Error::service_error].
    pub fn is_http(&self) -> bool {
        matches!(self.kind, ErrorKind::Http(_))
    }

    /// Creates an error representing a problem sending or receiving a request
    /// without a full HTTP response.
    ///
    /// Examples include: a connection that cannot be established, a broken
    /// connection after the request is sent, or a request body that cannot be
    /// replayed.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use cloud_client_gax::error::Error;
    /// let error = Error::transport("connection reset by peer");
    /// assert!(error.is_transport());
    /// assert!(error.source().is_some());
    /// ```
    pub fn transport<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Transport, Some(source.into()))
    }

    /// A problem in the transport layer without a full HTTP response.
    ///
    /// # Troubleshooting
    ///
    /// This indicates a problem completing the request. This type of error is
    /// rare, but includes crashes and restarts on proxies and load balancers.
    ///
    /// Most often, the solution is to use the right retry policy.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport)
    }

    /// Creates an error representing a timeout in a single attempt.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use cloud_client_gax::error::Error;
    /// let error = Error::timeout("simulated timeout");
    /// assert!(error.is_timeout());
    /// assert!(error.source().is_some());
    /// ```
    pub fn timeout<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Timeout, Some(source.into()))
    }

    /// The request attempt could not be completed before its deadline.
    ///
    /// This is always a client-side generated error. Note that the request may
    /// or may not have started, and it may or may not complete in the service.
    ///
    /// Retry policies treat these errors as transient.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Creates an error representing an exhausted time budget.
    ///
    /// Both the retry loop and the long-running operation poller return this
    /// error when their overall time budget is exceeded.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use cloud_client_gax::error::Error;
    /// let error = Error::operation_timeout("polling for more than 10 minutes");
    /// assert!(error.is_operation_timeout());
    /// assert!(error.source().is_some());
    /// ```
    pub fn operation_timeout<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::OperationTimeout, Some(source.into()))
    }

    /// The overall time budget for a retry loop or a polling loop expired.
    ///
    /// # Troubleshooting
    ///
    /// The most common cause of this problem is a transient problem that lasts
    /// longer than your policy. If your application can tolerate longer
    /// recovery times then extend the budget.
    pub fn is_operation_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::OperationTimeout)
    }

    /// Creates an error representing invalid local inputs.
    ///
    /// These errors are never retried.
    ///
    /// # Example
    /// ```
    /// use cloud_client_gax::error::Error;
    /// let error = Error::validation("the resource name cannot be empty");
    /// assert!(error.is_validation());
    /// ```
    pub fn validation<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Validation, Some(source.into()))
    }

    /// The request could not be created because some inputs are invalid.
    ///
    /// # Troubleshooting
    ///
    /// Typically this indicates a problem in the application. A required field
    /// was not initialized or the format of the field does not match the
    /// expectations.
    pub fn is_validation(&self) -> bool {
        matches!(self.kind, ErrorKind::Validation)
    }

    /// Creates an error representing a failure to create the authentication
    /// headers.
    pub fn authentication<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Authentication, Some(source.into()))
    }

    /// Could not create the authentication headers before sending the request.
    ///
    /// The request never left the client.
    pub fn is_authentication(&self) -> bool {
        matches!(self.kind, ErrorKind::Authentication)
    }

    /// Creates an error representing a deserialization problem.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use cloud_client_gax::error::Error;
    /// let error = Error::deser("simulated problem");
    /// assert!(error.is_deserialization());
    /// assert!(error.source().is_some());
    /// ```
    pub fn deser<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Deserialization, Some(source.into()))
    }

    /// The response could not be deserialized.
    pub fn is_deserialization(&self) -> bool {
        matches!(self.kind, ErrorKind::Deserialization)
    }

    /// Creates an error for a long-running operation that completed with a
    /// failure.
    ///
    /// The source should describe, or contain, the last error reported by
    /// the service.
    pub fn operation_failed<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::OperationFailed, Some(source.into()))
    }

    /// The long-running operation reached a terminal failed state.
    pub fn is_operation_failed(&self) -> bool {
        matches!(self.kind, ErrorKind::OperationFailed)
    }

    /// Creates an error for a result requested before the operation completed.
    ///
    /// # Example
    /// ```
    /// use cloud_client_gax::error::Error;
    /// let error = Error::not_complete("the copy operation is still running");
    /// assert!(error.is_not_complete());
    /// ```
    pub fn not_complete<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::NotComplete, Some(source.into()))
    }

    /// The result of a long-running operation was requested before the
    /// operation completed successfully.
    pub fn is_not_complete(&self) -> bool {
        matches!(self.kind, ErrorKind::NotComplete)
    }

    /// Creates an error for a result requested from a cancelled operation.
    pub fn cancelled<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Cancelled, Some(source.into()))
    }

    /// The long-running operation was cancelled by the application.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Creates an unclassified error.
    pub fn other<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Other, Some(source.into()))
    }

    /// The HTTP status code, if any, associated with this error.
    ///
    /// # Example
    /// ```
    /// use cloud_client_gax::error::Error;
    /// let e = search_for_thing("the thing");
    /// if let Some(code) = e.http_status_code() {
    ///     if code == 404 {
    ///         println!("cannot find the thing, more details in {e}");
    ///     }
    /// }
    ///
    /// fn search_for_thing(name: &str) -> Error {
    ///     # Error::http(404, http::HeaderMap::new(), bytes::Bytes::from_static(b"NOT FOUND"))
    /// }
    /// ```
    pub fn http_status_code(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::Http(d) => Some(d.status_code),
            _ => None,
        }
    }

    /// The headers, if any, associated with this error.
    pub fn http_headers(&self) -> Option<&HeaderMap> {
        match &self.kind {
            ErrorKind::Http(d) => Some(&d.headers),
            _ => None,
        }
    }

    /// The payload, if any, associated with this error.
    pub fn http_payload(&self) -> Option<&bytes::Bytes> {
        match &self.kind {
            ErrorKind::Http(d) => Some(&d.payload),
            _ => None,
        }
    }

    /// The error details reported by the service, if the payload included
    /// them.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match &self.kind {
            ErrorKind::Http(d) => d.service_error.as_ref(),
            _ => None,
        }
    }

    /// The number of attempts made before this error was returned.
    ///
    /// Only errors surfaced by a retry loop carry this value.
    pub fn attempt_count(&self) -> Option<u32> {
        self.attempt_count
    }

    /// Annotates the error with the number of attempts.
    pub fn with_attempt_count(mut self, attempt_count: u32) -> Self {
        self.attempt_count = Some(attempt_count);
        self
    }

    fn new(kind: ErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            attempt_count: None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.source) {
            (ErrorKind::Http(d), _) => d.display(f)?,
            (ErrorKind::Transport, Some(e)) => write!(f, "the transport reports an error: {e}")?,
            (ErrorKind::Timeout, Some(e)) => {
                write!(f, "the request exceeded the attempt deadline: {e}")?
            }
            (ErrorKind::OperationTimeout, Some(e)) => {
                write!(f, "the operation exceeded its time budget: {e}")?
            }
            (ErrorKind::Validation, Some(e)) => write!(f, "invalid request: {e}")?,
            (ErrorKind::Authentication, Some(e)) => {
                write!(f, "cannot create the authentication headers: {e}")?
            }
            (ErrorKind::Deserialization, Some(e)) => {
                write!(f, "cannot deserialize the response: {e}")?
            }
            (ErrorKind::OperationFailed, Some(e)) => {
                write!(f, "the long-running operation failed: {e}")?
            }
            (ErrorKind::NotComplete, Some(e)) => {
                write!(f, "the long-running operation is not complete: {e}")?
            }
            (ErrorKind::Cancelled, Some(e)) => {
                write!(f, "the long-running operation was cancelled: {e}")?
            }
            (ErrorKind::Other, Some(e)) => {
                write!(f, "an unclassified problem making a request: {e}")?
            }
            (kind, None) => write!(f, "{kind:?}")?,
        }
        if let Some(count) = self.attempt_count {
            write!(f, " (after {count} attempt(s))")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error))
    }
}

/// The type of error held by an [Error] instance.
#[derive(Debug)]
enum ErrorKind {
    Http(Box<HttpDetails>),
    Transport,
    Timeout,
    OperationTimeout,
    Validation,
    Authentication,
    Deserialization,
    OperationFailed,
    NotComplete,
    Cancelled,
    /// A uncategorized error.
    Other,
}

#[derive(Debug)]
struct HttpDetails {
    status_code: u16,
    headers: HeaderMap,
    payload: bytes::Bytes,
    service_error: Option<ServiceError>,
}

impl HttpDetails {
    fn display(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.status_code;
        if let Some(e) = &self.service_error {
            return write!(f, "the service reports a [{code}] error: {e}");
        }
        if let Ok(message) = std::str::from_utf8(self.payload.as_ref()) {
            write!(f, "the service reports a [{code}] error: {message}")
        } else {
            write!(f, "the service reports a [{code}] error: {:?}", self.payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use std::error::Error as StdError;

    #[test]
    fn http() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let payload = bytes::Bytes::from_static(
            br#"{"error": {"code": "ResourceNotFound", "message": "not there"}}"#,
        );
        let error = Error::http(404, headers.clone(), payload.clone());
        assert!(error.is_http(), "{error:?}");
        assert!(!error.is_transport(), "{error:?}");
        assert_eq!(error.http_status_code(), Some(404));
        assert_eq!(error.http_headers(), Some(&headers));
        assert_eq!(error.http_payload(), Some(&payload));
        assert_eq!(
            error.service_error(),
            Some(&ServiceError::new("ResourceNotFound", "not there"))
        );
        let got = error.to_string();
        assert!(got.contains("[404]"), "{got}");
        assert!(got.contains("ResourceNotFound"), "{got}");
        assert!(error.source().is_none(), "{error:?}");
    }

    #[test]
    fn http_without_service_error() {
        let payload = bytes::Bytes::from_static(b"bad gateway");
        let error = Error::http(502, HeaderMap::new(), payload);
        assert_eq!(error.service_error(), None);
        let got = error.to_string();
        assert!(got.contains("bad gateway"), "{got}");
    }

    #[test]
    fn transport() {
        let error = Error::transport("connection reset");
        assert!(error.is_transport(), "{error:?}");
        assert!(!error.is_http(), "{error:?}");
        assert_eq!(error.http_status_code(), None);
        assert_eq!(error.http_headers(), None);
        assert_eq!(error.http_payload(), None);
        assert!(error.source().is_some(), "{error:?}");
        let got = error.to_string();
        assert!(got.contains("connection reset"), "{got}");
    }

    #[test]
    fn predicates() {
        let cases = [
            (Error::timeout("t"), "timeout"),
            (Error::operation_timeout("t"), "operation_timeout"),
            (Error::validation("t"), "validation"),
            (Error::authentication("t"), "authentication"),
            (Error::deser("t"), "deser"),
            (Error::operation_failed("t"), "operation_failed"),
            (Error::not_complete("t"), "not_complete"),
            (Error::cancelled("t"), "cancelled"),
            (Error::other("t"), "other"),
        ];
        for (error, name) in cases {
            assert_eq!(error.is_timeout(), name == "timeout", "{error:?}");
            assert_eq!(
                error.is_operation_timeout(),
                name == "operation_timeout",
                "{error:?}"
            );
            assert_eq!(error.is_validation(), name == "validation", "{error:?}");
            assert_eq!(
                error.is_authentication(),
                name == "authentication",
                "{error:?}"
            );
            assert_eq!(error.is_deserialization(), name == "deser", "{error:?}");
            assert_eq!(
                error.is_operation_failed(),
                name == "operation_failed",
                "{error:?}"
            );
            assert_eq!(error.is_not_complete(), name == "not_complete", "{error:?}");
            assert_eq!(error.is_cancelled(), name == "cancelled", "{error:?}");
            assert!(!error.is_http(), "{error:?}");
            assert!(!error.is_transport(), "{error:?}");
            assert!(error.source().is_some(), "{error:?}");
        }
    }

    #[test]
    fn attempt_count() {
        let error = Error::transport("reset");
        assert_eq!(error.attempt_count(), None);
        let error = error.with_attempt_count(4);
        assert_eq!(error.attempt_count(), Some(4));
        assert!(error.is_transport(), "{error:?}");
        let got = error.to_string();
        assert!(got.contains("after 4 attempt(s)"), "{got}");
    }
}
