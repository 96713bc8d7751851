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
use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use http::HeaderValue;
use http::header::DATE;

/// Sets the `date` header to the current time, in the IMF-fixdate format.
///
/// The header is refreshed on every pass, so retries carry the time of the
/// attempt when this policy runs after the retry policy.
#[derive(Clone, Debug, Default)]
pub struct DatePolicy;

impl DatePolicy {
    fn format(now: chrono::DateTime<chrono::Utc>) -> String {
        now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }
}

impl Policy for DatePolicy {
    async fn send(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let value = Self::format(chrono::Utc::now());
        let value = HeaderValue::from_str(&value).map_err(Error::validation)?;
        next.run(request.set_header(DATE, value)).await
    }
}
