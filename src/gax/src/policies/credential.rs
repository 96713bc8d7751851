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
use crate::credentials::Credential;
use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::Request;
use crate::response::Response;

/// Inserts the headers produced by a [Credential].
///
/// The credential headers replace any headers with the same name. Credential
/// failures are reported as [authentication][Error::is_authentication]
/// errors, and the request is not sent.
#[derive(Clone, Debug)]
pub struct CredentialPolicy {
    credential: Credential,
}

impl CredentialPolicy {
    pub fn new<V: Into<Credential>>(credential: V) -> Self {
        Self {
            credential: credential.into(),
        }
    }
}

impl Policy for CredentialPolicy {
    async fn send(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        let headers = self.credential.headers().await.map_err(|e| {
            if e.is_authentication() {
                e
            } else {
                Error::authentication(e)
            }
        })?;
        for (name, value) in headers.iter() {
            request.headers_mut().insert(name.clone(), value.clone());
        }
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{BearerToken, CredentialTrait};
    use crate::policies::tests::{FakeTransport, request, run};
    use http::HeaderMap;

    #[derive(Debug)]
    struct Broken;

    impl CredentialTrait for Broken {
        async fn headers(&self) -> Result<HeaderMap> {
            Err(Error::transport("metadata server unavailable"))
        }
    }

    #[tokio::test]
    async fn inserts_headers() -> anyhow::Result<()> {
        let transport = FakeTransport::default();
        let request = request().set_header(
            http::header::AUTHORIZATION,
            http::HeaderValue::from_static("Bearer stale"),
        );
        run(
            CredentialPolicy::new(BearerToken::new("fresh")),
            &transport,
            request,
        )
        .await?;
        let got = transport.last_request();
        let values: Vec<_> = got.headers().get_all(http::header::AUTHORIZATION).iter().collect();
        assert_eq!(values, vec!["Bearer fresh"]);
        Ok(())
    }

    #[tokio::test]
    async fn failure_is_authentication() {
        let transport = FakeTransport::default();
        let err = run(CredentialPolicy::new(Broken), &transport, request())
            .await
            .unwrap_err();
        assert!(err.is_authentication(), "{err:?}");
        assert_eq!(transport.request_count(), 0);
    }
}
