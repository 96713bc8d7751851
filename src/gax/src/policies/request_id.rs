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
use http::{HeaderName, HeaderValue};

/// The header used to correlate client and service logs.
pub const REQUEST_ID_HEADER: &str = "x-client-request-id";

/// Sets a unique request id, unless the caller already set one.
///
/// The id is set once per call. When placed before the retry policy, as in
/// the default pipeline, all the attempts for a call share the same id.
#[derive(Clone, Debug, Default)]
pub struct RequestIdPolicy;

impl Policy for RequestIdPolicy {
    async fn send(&self, request: Request, next: Next<'_>) -> Result<Response> {
        if request.headers().contains_key(REQUEST_ID_HEADER) {
            return next.run(request).await;
        }
        let id = uuid::Uuid::new_v4().to_string();
        let value = HeaderValue::from_str(&id).map_err(Error::validation)?;
        let name = HeaderName::from_static(REQUEST_ID_HEADER);
        next.run(request.set_header(name, value)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::tests::{FakeTransport, request, run};

    #[tokio::test]
    async fn sets_uuid() -> anyhow::Result<()> {
        let transport = FakeTransport::default();
        run(RequestIdPolicy, &transport, request()).await?;
        run(RequestIdPolicy, &transport, request()).await?;
        let requests = transport.requests.lock().unwrap();
        let ids: Vec<_> = requests
            .iter()
            .map(|r| r.headers().get(REQUEST_ID_HEADER).cloned())
            .collect();
        let first = ids[0].as_ref().unwrap().to_str()?;
        let second = ids[1].as_ref().unwrap().to_str()?;
        assert!(uuid::Uuid::parse_str(first).is_ok(), "{first}");
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn keeps_existing() -> anyhow::Result<()> {
        let transport = FakeTransport::default();
        let request = request().set_header(
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderValue::from_static("mine"),
        );
        run(RequestIdPolicy, &transport, request).await?;
        let got = transport.last_request();
        assert_eq!(got.headers().get(REQUEST_ID_HEADER).unwrap(), "mine");
        Ok(())
    }
}
