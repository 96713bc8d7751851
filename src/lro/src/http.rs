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

//! Pollers for operations that report their progress over plain HTTP.
//!
//! The service accepts the initial request with a `202 Accepted` (or a
//! `201 Created`) response, and returns the URL to monitor the operation in
//! one of the `operation-location`, `azure-asyncoperation`, or `location`
//! headers. The poller queries that URL with `GET` until the operation
//! completes.

use crate::{OperationStatus, PollResponse, Poller, PollerOptions};
use bytes::Bytes;
use gax::Result;
use gax::error::Error;
use gax::pipeline::Pipeline;
use gax::request::Request;
use gax::response::Response;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

const POLLING_HEADERS: [&str; 3] = ["operation-location", "azure-asyncoperation", "location"];

/// The state of an HTTP long-running operation, as of the latest response.
#[derive(Clone, Debug)]
pub struct HttpOperation {
    method: Method,
    resource_url: Url,
    poll_url: Option<Url>,
    status_code: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpOperation {
    /// The URL of the request that started the operation.
    pub fn resource_url(&self) -> &Url {
        &self.resource_url
    }

    /// The URL used to query the operation status.
    pub fn poll_url(&self) -> Option<&Url> {
        self.poll_url.as_ref()
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    fn observe(
        method: Method,
        resource_url: Url,
        previous: Option<Url>,
        response: Response,
    ) -> Result<Self> {
        let poll_url = poll_location(response.headers(), response.request().url())?.or(previous);
        Ok(Self {
            method,
            resource_url,
            poll_url,
            status_code: response.status(),
            headers: response.headers().clone(),
            body: response.body().clone(),
        })
    }

    fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// The status reported in the payload, if any.
    fn reported_status(&self) -> Option<OperationStatus> {
        let json = self.json()?;
        let status = json
            .get("status")
            .or_else(|| json.pointer("/properties/provisioningState"))?
            .as_str()?;
        Some(map_status(status))
    }

    // Where to find the final result, if not in the last response.
    fn final_url(&self) -> Result<Option<Url>> {
        if let Some(location) = self
            .json()
            .as_ref()
            .and_then(|j| j.get("resourceLocation"))
            .and_then(|v| v.as_str())
        {
            return self.resource_url.join(location).map(Some).map_err(Error::deser);
        }
        if self.method == Method::PUT || self.method == Method::PATCH {
            return Ok(Some(self.resource_url.clone()));
        }
        Ok(None)
    }
}

/// Creates [Poller]s for HTTP long-running operations.
///
/// # Example
/// ```no_run
/// # use cloud_client_lro::http::LocationPoller;
/// # use gax::pipeline::Pipeline;
/// # use gax::request::Request;
/// # async fn sample(pipeline: Pipeline, url: url::Url) -> gax::Result<()> {
/// let request = Request::new(http::Method::POST, url).set_body(r#"{"size": 42}"#);
/// let poller = LocationPoller::new(pipeline).begin::<serde_json::Value>(request);
/// poller.block_until_done().await?;
/// let result = poller.get_result().await?;
/// println!("{result}");
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct LocationPoller {
    pipeline: Pipeline,
    options: PollerOptions,
}

impl LocationPoller {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            options: PollerOptions::default(),
        }
    }

    pub fn with_options(mut self, v: PollerOptions) -> Self {
        self.options = v;
        self
    }

    /// Returns a poller that sends `request` on activation.
    ///
    /// The final result is read from the `resourceLocation` in the last
    /// status payload, from the original URL for `PUT` and `PATCH` requests,
    /// or from the last status payload otherwise. An empty payload
    /// deserializes as `null`.
    pub fn begin<U>(&self, request: Request) -> Poller<HttpOperation, U>
    where
        U: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let start = self.pipeline.clone();
        let activation = move || async move {
            let method = request.method().clone();
            let resource_url = request.url().clone();
            let response = start.send(request).await?.error_for_status()?;
            let op = HttpOperation::observe(method, resource_url, None, response)?;
            let status = match op.reported_status() {
                Some(s) => s,
                None if op.poll_url.is_some() => OperationStatus::InProgress,
                None => OperationStatus::SuccessfullyCompleted,
            };
            Ok(to_poll_response(status, op))
        };

        let query = self.pipeline.clone();
        let poll = move |latest: PollResponse<HttpOperation>| {
            let pipeline = query.clone();
            async move {
                let op = latest
                    .into_value()
                    .ok_or_else(|| Error::deser("missing operation state"))?;
                let Some(url) = op.poll_url.clone() else {
                    return Err(Error::deser("the service did not return a polling URL"));
                };
                let request = Request::new(Method::GET, url.clone());
                let response = pipeline.send(request).await?.error_for_status()?;
                let op = HttpOperation::observe(op.method, op.resource_url, Some(url), response)?;
                let status = match op.reported_status() {
                    Some(s) => s,
                    None if op.status_code == StatusCode::ACCEPTED => OperationStatus::InProgress,
                    None => OperationStatus::SuccessfullyCompleted,
                };
                Ok(to_poll_response(status, op))
            }
        };

        let fetch = self.pipeline.clone();
        let fetch_result = move |done: PollResponse<HttpOperation>| {
            let pipeline = fetch.clone();
            async move {
                let op = done
                    .into_value()
                    .ok_or_else(|| Error::deser("missing operation state"))?;
                match op.final_url()? {
                    Some(url) => {
                        let request = Request::new(Method::GET, url);
                        let response = pipeline.send(request).await?.error_for_status()?;
                        parse_body(response.body())
                    }
                    None => parse_body(&op.body),
                }
            }
        };

        Poller::builder(activation, poll, fetch_result)
            .with_options(self.options.clone())
            .build()
    }
}

fn to_poll_response(status: OperationStatus, op: HttpOperation) -> PollResponse<HttpOperation> {
    let retry_after = gax::retry_after::from_headers(op.headers());
    let response = PollResponse::new(status, Some(op));
    match retry_after {
        Some(d) => response.with_retry_after(d),
        None => response,
    }
}

fn parse_body<U: DeserializeOwned>(body: &Bytes) -> Result<U> {
    let body: &[u8] = if body.is_empty() { b"null" } else { body };
    serde_json::from_slice(body).map_err(Error::deser)
}

fn poll_location(headers: &HeaderMap, base: &Url) -> Result<Option<Url>> {
    let Some(value) = POLLING_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
    else {
        return Ok(None);
    };
    let value = value.to_str().map_err(Error::deser)?;
    base.join(value).map(Some).map_err(Error::deser)
}

/// Maps the status vocabulary of HTTP operations.
///
/// Any other value is kept verbatim as a non-terminal custom status.
fn map_status(value: &str) -> OperationStatus {
    match value.to_ascii_lowercase().as_str() {
        "succeeded" => OperationStatus::SuccessfullyCompleted,
        "failed" => OperationStatus::Failed,
        "canceled" | "cancelled" => OperationStatus::UserCancelled,
        "inprogress" => OperationStatus::InProgress,
        _ => OperationStatus::custom(value, false),
    }
}
