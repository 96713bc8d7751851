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

use bytes::Bytes;
use futures::stream::BoxStream;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A stream of bytes used as a one-shot request body.
pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, BoxError>>;

/// The payload of a [Request].
///
/// Bodies backed by [Bytes] can be re-sent as many times as needed. Bodies
/// backed by a stream can be sent once, the retry policy never resends them.
#[derive(Clone, Default)]
pub enum Body {
    /// No payload.
    #[default]
    Empty,
    /// A fully buffered payload.
    Bytes(Bytes),
    /// A one-shot payload. Clones share the same underlying stream.
    Stream(Arc<Mutex<Option<ByteStream>>>),
}

impl Body {
    /// Creates a one-shot body from a stream.
    ///
    /// # Example
    /// ```
    /// # use cloud_client_gax::request::Body;
    /// let chunks = vec![Ok(bytes::Bytes::from_static(b"hello "))];
    /// let body = Body::from_stream(futures::stream::iter(chunks));
    /// assert!(!body.is_replayable());
    /// ```
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = std::result::Result<Bytes, BoxError>> + Send + 'static,
    {
        use futures::StreamExt;
        Self::Stream(Arc::new(Mutex::new(Some(stream.boxed()))))
    }

    /// Returns true if the body can be sent more than once.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Self::Stream(_))
    }

    /// Returns true if the body is a stream that was already taken.
    pub fn is_consumed(&self) -> bool {
        match self {
            Self::Stream(s) => s.lock().expect("body stream lock is poisoned").is_none(),
            Self::Empty | Self::Bytes(_) => false,
        }
    }

    /// Takes the underlying stream, if this is a stream body that was not
    /// consumed yet.
    pub fn take_stream(&self) -> Option<ByteStream> {
        match self {
            Self::Stream(s) => s.lock().expect("body stream lock is poisoned").take(),
            Self::Empty | Self::Bytes(_) => None,
        }
    }

    /// The buffered payload, if any.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Empty | Self::Stream(_) => None,
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

/// An HTTP request before it enters the pipeline.
///
/// The pipeline treats the request as immutable once it is sent: each retry
/// attempt starts from a clone of the original request.
///
/// # Example
/// ```
/// # use cloud_client_gax::request::Request;
/// let url = url::Url::parse("https://example.com/v1/things/123").unwrap();
/// let request = Request::new(http::Method::DELETE, url)
///     .set_header(http::header::IF_MATCH, http::HeaderValue::from_static("\"abc\""));
/// assert!(request.is_idempotent());
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    url: url::Url,
    headers: HeaderMap,
    body: Body,
    idempotent: Option<bool>,
    attempt_timeout: Option<Duration>,
}

impl Request {
    /// Creates a request without headers or payload.
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::Empty,
            idempotent: None,
            attempt_timeout: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }

    pub fn url_mut(&mut self) -> &mut url::Url {
        &mut self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Sets a header, replacing any previous values.
    pub fn set_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the payload.
    pub fn set_body<B: Into<Body>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Overrides the idempotency inferred from the method.
    ///
    /// Services that support idempotency keys (or conditional requests) make
    /// some `POST` and `PATCH` requests safe to retry.
    pub fn set_idempotent(mut self, v: bool) -> Self {
        self.idempotent = Some(v);
        self
    }

    /// Returns true if the request is safe to send more than once.
    ///
    /// `GET`, `HEAD`, `OPTIONS`, `TRACE`, `PUT` and `DELETE` are idempotent
    /// unless overridden with [set_idempotent][Request::set_idempotent].
    pub fn is_idempotent(&self) -> bool {
        self.idempotent.unwrap_or_else(|| {
            matches!(
                self.method,
                Method::GET
                    | Method::HEAD
                    | Method::OPTIONS
                    | Method::TRACE
                    | Method::PUT
                    | Method::DELETE
            )
        })
    }

    /// Sets the deadline for a single attempt.
    ///
    /// The retry policy sets this value before each attempt. Transports use
    /// it to bound the time waiting for a response.
    pub fn set_attempt_timeout(&mut self, v: Option<Duration>) {
        self.attempt_timeout = v;
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use test_case::test_case;

    fn url() -> url::Url {
        url::Url::parse("https://example.com/v1/things").unwrap()
    }

    #[test_case(Method::GET, true)]
    #[test_case(Method::HEAD, true)]
    #[test_case(Method::OPTIONS, true)]
    #[test_case(Method::TRACE, true)]
    #[test_case(Method::PUT, true)]
    #[test_case(Method::DELETE, true)]
    #[test_case(Method::POST, false)]
    #[test_case(Method::PATCH, false)]
    fn idempotency(method: Method, want: bool) {
        let request = Request::new(method.clone(), url());
        assert_eq!(request.is_idempotent(), want, "{method}");
        let request = request.set_idempotent(!want);
        assert_eq!(request.is_idempotent(), !want, "{method}");
    }

    #[test]
    fn builders() {
        let mut request = Request::new(Method::POST, url())
            .set_header(
                HeaderName::from_static("x-test"),
                HeaderValue::from_static("v1"),
            )
            .set_header(
                HeaderName::from_static("x-test"),
                HeaderValue::from_static("v2"),
            )
            .set_body("payload");
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url(), &url());
        assert_eq!(
            request.headers().get("x-test"),
            Some(&HeaderValue::from_static("v2"))
        );
        assert_eq!(
            request.body().as_bytes(),
            Some(&Bytes::from_static(b"payload"))
        );
        assert_eq!(request.attempt_timeout(), None);
        request.set_attempt_timeout(Some(Duration::from_secs(5)));
        assert_eq!(request.attempt_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn replayable() {
        assert!(Body::Empty.is_replayable());
        assert!(Body::from("abc").is_replayable());
        assert!(Body::from(vec![1_u8, 2, 3]).is_replayable());
        assert!(Body::from(String::from("abc")).is_replayable());
        let stream = Body::from_stream(futures::stream::empty());
        assert!(!stream.is_replayable());
        assert!(!Body::Empty.is_consumed());
    }

    #[tokio::test]
    async fn stream_is_one_shot() {
        let chunks = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let body = Body::from_stream(futures::stream::iter(chunks));
        let clone = body.clone();
        assert!(!body.is_consumed());

        let stream = body.take_stream().expect("first take succeeds");
        assert!(body.is_consumed());
        assert!(clone.is_consumed());
        assert!(clone.take_stream().is_none());

        let got: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(got.concat(), b"hello world");
    }
}
