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

//! Defines the contract between the pipeline and the HTTP client.
//!
//! The pipeline does not implement TLS, connection pooling, or name
//! resolution. Those belong to the transport. A transport sends one request
//! and returns the full response, for any status code. Transports report
//! connection problems as [transport][crate::error::Error::is_transport]
//! errors and expired attempt deadlines as
//! [timeout][crate::error::Error::is_timeout] errors.

use crate::Result;
use crate::request::Request;
use crate::response::Response;

/// Sends a single request attempt.
///
/// Applications rarely need to implement this trait, except to mock the
/// network in tests.
pub trait Transport: std::fmt::Debug {
    /// Sends `request` and waits for the full response.
    ///
    /// Implementations should honor
    /// [Request::attempt_timeout()][Request::attempt_timeout].
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send;
}

pub mod dynamic {
    use super::{Request, Response, Result};

    /// A dyn-compatible, crate-private version of [Transport][super::Transport].
    #[async_trait::async_trait]
    pub trait Transport: Send + Sync + std::fmt::Debug {
        async fn send(&self, request: Request) -> Result<Response>;
    }

    /// The public Transport implements the dyn-compatible Transport.
    #[async_trait::async_trait]
    impl<T> Transport for T
    where
        T: super::Transport + Send + Sync,
    {
        async fn send(&self, request: Request) -> Result<Response> {
            T::send(self, request).await
        }
    }
}

#[cfg(feature = "reqwest-transport")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(feature = "reqwest-transport")]
mod reqwest_transport {
    use super::{Request, Response, Result};
    use crate::error::Error;
    use crate::request::Body;

    /// A [Transport][super::Transport] based on [reqwest].
    #[derive(Clone, Debug, Default)]
    pub struct ReqwestTransport {
        inner: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Uses an existing client, for example, one configured with custom
        /// TLS roots or proxies.
        pub fn with_client(inner: reqwest::Client) -> Self {
            Self { inner }
        }

        fn map_send_error(err: reqwest::Error) -> Error {
            match err {
                e if e.is_timeout() => Error::timeout(e),
                e => Error::transport(e),
            }
        }
    }

    impl super::Transport for ReqwestTransport {
        async fn send(&self, request: Request) -> Result<Response> {
            let mut builder = self
                .inner
                .request(request.method().clone(), request.url().clone())
                .headers(request.headers().clone());
            builder = request
                .attempt_timeout()
                .into_iter()
                .fold(builder, |b, t| b.timeout(t));
            builder = match request.body() {
                Body::Empty => builder,
                Body::Bytes(b) => builder.body(b.clone()),
                body @ Body::Stream(_) => {
                    let stream = body.take_stream().ok_or_else(|| {
                        Error::transport("the request body is a stream that was already sent")
                    })?;
                    builder.body(reqwest::Body::wrap_stream(stream))
                }
            };
            let response = builder.send().await.map_err(Self::map_send_error)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(Self::map_send_error)?;
            Ok(Response::new(request, status)
                .set_headers(headers)
                .set_body(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Echo;

    impl Transport for Echo {
        async fn send(&self, request: Request) -> Result<Response> {
            let body = request.body().as_bytes().cloned().unwrap_or_default();
            Ok(Response::new(request, http::StatusCode::OK).set_body(body))
        }
    }

    #[tokio::test]
    async fn dynamic_transport() -> anyhow::Result<()> {
        let transport: std::sync::Arc<dyn dynamic::Transport> = std::sync::Arc::new(Echo);
        let url = url::Url::parse("https://example.com/echo")?;
        let request = Request::new(http::Method::POST, url).set_body("hello");
        let response = transport.send(request).await?;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"hello");
        Ok(())
    }
}
