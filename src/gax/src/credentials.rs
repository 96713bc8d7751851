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

//! Types to attach authorization headers to requests.
//!
//! The pipeline does not acquire or refresh tokens. Applications supply a
//! [Credential], and the [CredentialPolicy][crate::policies::CredentialPolicy]
//! inserts the headers it produces into each request.

use crate::Result;
use crate::error::Error;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;

/// A type-erased [CredentialTrait].
///
/// # Example
/// ```
/// # use cloud_client_gax::credentials::*;
/// # tokio_test::block_on(async {
/// let credential = Credential::from(BearerToken::new("my-token"));
/// let headers = credential.headers().await?;
/// assert_eq!(headers.get(http::header::AUTHORIZATION).unwrap(), "Bearer my-token");
/// # Ok::<(), cloud_client_gax::error::Error>(())
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct Credential {
    // Credentials are shared by every pipeline that uses them, so they must be
    // `Send + Sync` and cheap to clone.
    inner: Arc<dyn dynamic::CredentialTrait>,
}

impl<T> std::convert::From<T> for Credential
where
    T: CredentialTrait + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl Credential {
    /// Returns the headers to insert in a request.
    pub async fn headers(&self) -> Result<HeaderMap> {
        self.inner.headers().await
    }
}

/// Produces the authorization headers for a request.
///
/// Implementations may cache and refresh tokens as needed. Failures should be
/// reported as [authentication][Error::is_authentication] errors.
pub trait CredentialTrait: std::fmt::Debug {
    fn headers(&self) -> impl Future<Output = Result<HeaderMap>> + Send;
}

pub mod dynamic {
    use super::{HeaderMap, Result};

    /// A dyn-compatible, crate-private version of `CredentialTrait`.
    #[async_trait::async_trait]
    pub trait CredentialTrait: Send + Sync + std::fmt::Debug {
        async fn headers(&self) -> Result<HeaderMap>;
    }

    /// The public CredentialTrait implements the dyn-compatible CredentialTrait.
    #[async_trait::async_trait]
    impl<T> CredentialTrait for T
    where
        T: super::CredentialTrait + Send + Sync,
    {
        async fn headers(&self) -> Result<HeaderMap> {
            T::headers(self).await
        }
    }
}

/// Sends a fixed bearer token in the `authorization` header.
#[derive(Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new<T: Into<String>>(token: T) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("token", &"[censored]")
            .finish()
    }
}

impl CredentialTrait for BearerToken {
    async fn headers(&self) -> Result<HeaderMap> {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {}", self.token)).map_err(Error::authentication)?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, value);
        Ok(headers)
    }
}

/// Sends a fixed key in a service specific header.
///
/// # Example
/// ```
/// # use cloud_client_gax::credentials::*;
/// let credential = KeyCredential::new(http::HeaderName::from_static("x-api-key"), "my-key");
/// let credential = Credential::from(credential);
/// ```
#[derive(Clone)]
pub struct KeyCredential {
    header: HeaderName,
    key: String,
}

impl KeyCredential {
    pub fn new<K: Into<String>>(header: HeaderName, key: K) -> Self {
        Self {
            header,
            key: key.into(),
        }
    }
}

impl std::fmt::Debug for KeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCredential")
            .field("header", &self.header)
            .field("key", &"[censored]")
            .finish()
    }
}

impl CredentialTrait for KeyCredential {
    async fn headers(&self) -> Result<HeaderMap> {
        let mut value = HeaderValue::from_str(&self.key).map_err(Error::authentication)?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(self.header.clone(), value);
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bearer() -> anyhow::Result<()> {
        let credential = Credential::from(BearerToken::new("test-token"));
        let headers = credential.headers().await?;
        let value = headers.get(http::header::AUTHORIZATION).unwrap();
        assert_eq!(value, "Bearer test-token");
        assert!(value.is_sensitive(), "{value:?}");
        let fmt = format!("{credential:?}");
        assert!(!fmt.contains("test-token"), "{fmt}");
        Ok(())
    }

    #[tokio::test]
    async fn bearer_invalid() {
        let credential = Credential::from(BearerToken::new("bad\ntoken"));
        let err = credential.headers().await.unwrap_err();
        assert!(err.is_authentication(), "{err:?}");
    }

    #[tokio::test]
    async fn key() -> anyhow::Result<()> {
        let credential =
            Credential::from(KeyCredential::new(HeaderName::from_static("x-api-key"), "k1"));
        let headers = credential.headers().await?;
        assert_eq!(headers.get("x-api-key").unwrap(), "k1");
        let fmt = format!("{credential:?}");
        assert!(!fmt.contains("k1"), "{fmt}");
        assert!(fmt.contains("x-api-key"), "{fmt}");
        Ok(())
    }
}
