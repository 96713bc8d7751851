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

use crate::Result;
use crate::error::Error;
use crate::request::Request;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

/// An HTTP response, with the payload already collected.
///
/// Responses keep a copy of the request that produced them. Long-running
/// operation helpers use it to resolve relative status URLs.
///
/// Transports return responses for any status code. Use
/// [error_for_status()][Response::error_for_status] to convert unsuccessful
/// responses into errors.
///
/// # Example
/// ```
/// # use cloud_client_gax::request::Request;
/// # use cloud_client_gax::response::Response;
/// let url = url::Url::parse("https://example.com/v1/things/123").unwrap();
/// let response = Response::new(Request::new(http::Method::GET, url), http::StatusCode::NOT_FOUND);
/// let error = response.error_for_status().unwrap_err();
/// assert_eq!(error.http_status_code(), Some(404));
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    request: Request,
    attempt_count: u32,
}

impl Response {
    /// Creates a response without headers or payload.
    pub fn new(request: Request, status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request,
            attempt_count: 1,
        }
    }

    /// Sets a header, replacing any previous values.
    pub fn set_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces all the headers.
    pub fn set_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the payload.
    pub fn set_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the number of attempts used to obtain this response.
    ///
    /// The retry policy annotates the responses it returns.
    pub fn set_attempt_count(mut self, v: u32) -> Self {
        self.attempt_count = v;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The request that produced this response.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The number of attempts used to obtain this response.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Returns true for 4xx and 5xx status codes.
    pub fn is_error_status(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    /// Converts 4xx and 5xx responses into an [Error].
    ///
    /// The error keeps the status code, headers and payload, and it is
    /// annotated with the attempt count.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_error_status() {
            return Err(self.into_error());
        }
        Ok(self)
    }

    /// Converts the response into an [Http][Error::is_http] error,
    /// regardless of the status code.
    pub fn into_error(self) -> Error {
        let attempt_count = self.attempt_count;
        Error::http(self.status.as_u16(), self.headers, self.body).with_attempt_count(attempt_count)
    }

    /// Deserializes the payload as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Error::deser)
    }
}
