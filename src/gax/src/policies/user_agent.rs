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
use http::header::USER_AGENT;

/// Sets the `user-agent` header.
///
/// The value is `[<application id> ]cloud-client-gax/<version> rust/<os>-<arch>`.
#[derive(Clone, Debug)]
pub struct UserAgentPolicy {
    value: HeaderValue,
}

impl UserAgentPolicy {
    /// Fails if the application id cannot be used in a header value.
    pub fn new(application_id: Option<&str>) -> Result<Self> {
        let base = format!(
            "cloud-client-gax/{} rust/{}-{}",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        let value = match application_id {
            Some(id) => format!("{id} {base}"),
            None => base,
        };
        let value = HeaderValue::from_str(&value).map_err(Error::validation)?;
        Ok(Self { value })
    }

    pub fn value(&self) -> &HeaderValue {
        &self.value
    }
}

impl Policy for UserAgentPolicy {
    async fn send(&self, request: Request, next: Next<'_>) -> Result<Response> {
        next.run(request.set_header(USER_AGENT, self.value.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::tests::{FakeTransport, request, run};

    #[test]
    fn format() -> anyhow::Result<()> {
        let policy = UserAgentPolicy::new(None)?;
        let value = policy.value().to_str()?;
        assert!(value.starts_with("cloud-client-gax/"), "{value}");
        assert!(value.contains(" rust/"), "{value}");
        assert!(value.contains(std::env::consts::OS), "{value}");

        let policy = UserAgentPolicy::new(Some("my-app"))?;
        let value = policy.value().to_str()?;
        assert!(value.starts_with("my-app cloud-client-gax/"), "{value}");
        Ok(())
    }

    #[test]
    fn invalid() {
        let err = UserAgentPolicy::new(Some("bad\napp")).unwrap_err();
        assert!(err.is_validation(), "{err:?}");
    }

    #[tokio::test]
    async fn sets_header() -> anyhow::Result<()> {
        let transport = FakeTransport::default();
        let policy = UserAgentPolicy::new(Some("my-app"))?;
        let expected = policy.value().clone();
        run(policy, &transport, request()).await?;
        let got = transport.last_request();
        assert_eq!(got.headers().get(USER_AGENT), Some(&expected));
        Ok(())
    }
}
