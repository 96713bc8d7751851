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
use crate::options::{HttpLogDetailLevel, HttpLogOptions};
use crate::policy::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use http::HeaderMap;

const REDACTED: &str = "REDACTED";

/// Logs requests and responses using [tracing].
///
/// Header values and query parameter values are replaced with `REDACTED`
/// unless their names are in the allow-lists of the [HttpLogOptions].
/// Payloads are only logged at the [BodyAndHeaders][HttpLogDetailLevel::BodyAndHeaders]
/// level, and only if they are buffered.
#[derive(Clone, Debug, Default)]
pub struct LoggingPolicy {
    options: HttpLogOptions,
}

impl LoggingPolicy {
    pub fn new(options: HttpLogOptions) -> Self {
        Self { options }
    }

    fn log_request(&self, request: &Request) {
        let level = self.options.detail_level();
        let method = request.method();
        let url = redact_url(request.url(), &self.options);
        if level < HttpLogDetailLevel::Headers {
            tracing::info!(%method, %url, "sending request");
            return;
        }
        let headers = redact_headers(request.headers(), &self.options);
        match (level, request.body().as_bytes()) {
            (HttpLogDetailLevel::BodyAndHeaders, Some(body)) => {
                let body = String::from_utf8_lossy(body);
                tracing::info!(%method, %url, ?headers, %body, "sending request");
            }
            _ => tracing::info!(%method, %url, ?headers, "sending request"),
        }
    }

    fn log_response(&self, response: &Response, elapsed: std::time::Duration) {
        let level = self.options.detail_level();
        let status = response.status().as_u16();
        let elapsed_ms = elapsed.as_millis() as u64;
        if level < HttpLogDetailLevel::Headers {
            tracing::info!(status, elapsed_ms, "received response");
            return;
        }
        let headers = redact_headers(response.headers(), &self.options);
        if level == HttpLogDetailLevel::BodyAndHeaders {
            let body = String::from_utf8_lossy(response.body());
            tracing::info!(status, elapsed_ms, ?headers, %body, "received response");
        } else {
            tracing::info!(status, elapsed_ms, ?headers, "received response");
        }
    }
}

impl Policy for LoggingPolicy {
    async fn send(&self, request: Request, next: Next<'_>) -> Result<Response> {
        if self.options.detail_level() == HttpLogDetailLevel::None {
            return next.run(request).await;
        }
        self.log_request(&request);
        let start = tokio::time::Instant::now();
        let result = next.run(request).await;
        match &result {
            Ok(response) => self.log_response(response, start.elapsed()),
            Err(e) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                tracing::warn!(elapsed_ms, "request failed: {e}");
            }
        }
        result
    }
}

/// Removes any user info and replaces the values of query parameters that are
/// not allowed.
pub(crate) fn redact_url(url: &url::Url, options: &HttpLogOptions) -> url::Url {
    let mut redacted = url.clone();
    // Both fail only for URLs that cannot carry credentials.
    let _ = redacted.set_password(None);
    let _ = redacted.set_username("");
    if redacted.query().is_none() {
        return redacted;
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if options.is_query_param_allowed(&k) {
                v.into_owned()
            } else {
                REDACTED.to_string()
            };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted
}

/// Returns the headers, in order, replacing the values that are not allowed.
pub(crate) fn redact_headers(
    headers: &HeaderMap,
    options: &HttpLogOptions,
) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = match value.to_str() {
                Ok(v) if options.is_header_allowed(name.as_str()) && !value.is_sensitive() => {
                    v.to_string()
                }
                _ => REDACTED.to_string(),
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}
