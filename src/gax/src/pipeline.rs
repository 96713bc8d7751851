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

//! An ordered chain of policies terminating in a transport.
//!
//! Requests flow from the first policy to the transport, and responses flow
//! back in reverse order. A pipeline is immutable once built, and it is cheap
//! to clone: clones share the same policies and transport. Many requests may
//! run through the same pipeline concurrently.
//!
//! ## Example: the default pipeline
//! ```
//! # use cloud_client_gax::pipeline::Pipeline;
//! # use cloud_client_gax::options::{ClientOptions, RetryOptions};
//! # use cloud_client_gax::credentials::BearerToken;
//! # fn sample() -> anyhow::Result<()> {
//! let options = ClientOptions::default()
//!     .with_application_id("my-app")?
//!     .with_retry_options(RetryOptions::builder().with_max_retries(5).build()?);
//! let pipeline = Pipeline::builder()
//!     .with_client_options(options)
//!     .with_credential(BearerToken::new("my-token"))
//!     .build()?;
//! # Ok(()) }
//! ```

use crate::Result;
use crate::credentials::Credential;
use crate::options::ClientOptions;
use crate::policies;
use crate::policy::{Next, PolicyArg, dynamic::Policy};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{Transport, dynamic::Transport as DynTransport};
use std::sync::Arc;

/// Sends requests through an ordered list of policies and a transport.
#[derive(Clone, Debug)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    policies: Vec<Arc<dyn Policy>>,
    transport: Arc<dyn DynTransport>,
}

impl Pipeline {
    /// Creates a pipeline with exactly the given policies, in the given order.
    ///
    /// Most applications should use [Pipeline::builder()], which installs the
    /// built-in policies in the recommended order.
    ///
    /// # Example
    /// ```
    /// # use cloud_client_gax::pipeline::Pipeline;
    /// # use cloud_client_gax::policies::RequestIdPolicy;
    /// # use cloud_client_gax::policy::PolicyArg;
    /// # use cloud_client_gax::transport::ReqwestTransport;
    /// let pipeline = Pipeline::new([PolicyArg::from(RequestIdPolicy)], ReqwestTransport::new());
    /// ```
    pub fn new<P, T>(policies: P, transport: T) -> Self
    where
        P: IntoIterator<Item = PolicyArg>,
        T: Transport + Send + Sync + 'static,
    {
        Self::from_parts(policies.into_iter().map(|p| p.0).collect(), Arc::new(transport))
    }

    /// Returns a builder for the default policy order.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    fn from_parts(policies: Vec<Arc<dyn Policy>>, transport: Arc<dyn DynTransport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                policies,
                transport,
            }),
        }
    }

    /// Sends `request` through every policy and the transport.
    ///
    /// The returned response may have any status code, use
    /// [Response::error_for_status] to convert 4xx and 5xx responses into
    /// errors.
    pub async fn send(&self, request: Request) -> Result<Response> {
        Next::new(&self.inner.policies, self.inner.transport.as_ref())
            .run(request)
            .await
    }
}

/// Assembles a [Pipeline] with the built-in policies.
///
/// The policies run in this order, from the caller to the wire:
/// 1. [UserAgentPolicy][policies::UserAgentPolicy]
/// 1. [RequestIdPolicy][policies::RequestIdPolicy]
/// 1. [DatePolicy][policies::DatePolicy]
/// 1. [CredentialPolicy][policies::CredentialPolicy], if a credential is
///    configured.
/// 1. The per-call policies in [ClientOptions], in insertion order.
/// 1. [RetryPolicy][policies::RetryPolicy]
/// 1. The per-retry policies in [ClientOptions], in insertion order.
/// 1. [LoggingPolicy][policies::LoggingPolicy]
/// 1. The transport.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    options: ClientOptions,
    credential: Option<Credential>,
    transport: Option<Arc<dyn DynTransport>>,
}

impl PipelineBuilder {
    pub fn with_client_options(mut self, v: ClientOptions) -> Self {
        self.options = v;
        self
    }

    pub fn with_credential<V: Into<Credential>>(mut self, v: V) -> Self {
        self.credential = Some(v.into());
        self
    }

    /// Replaces the default transport.
    pub fn with_transport<T>(mut self, v: T) -> Self
    where
        T: Transport + Send + Sync + 'static,
    {
        self.transport = Some(Arc::new(v));
        self
    }

    /// Creates the pipeline.
    ///
    /// Fails if the application id cannot be used in a header, or if there is
    /// no transport available.
    pub fn build(self) -> Result<Pipeline> {
        let transport = match self.transport {
            Some(t) => t,
            None => default_transport()?,
        };
        let options = self.options;

        let mut stages: Vec<Arc<dyn Policy>> = vec![
            Arc::new(policies::UserAgentPolicy::new(options.application_id())?),
            Arc::new(policies::RequestIdPolicy),
            Arc::new(policies::DatePolicy),
        ];
        if let Some(credential) = self.credential {
            stages.push(Arc::new(policies::CredentialPolicy::new(credential)));
        }
        stages.extend(options.per_call_policies().iter().map(|p| p.0.clone()));
        stages.push(Arc::new(policies::RetryPolicy::new(options.retry_options())));
        stages.extend(options.per_retry_policies().iter().map(|p| p.0.clone()));
        stages.push(Arc::new(policies::LoggingPolicy::new(
            options.log_options().clone(),
        )));
        tracing::debug!(policies = stages.len(), "pipeline built");
        Ok(Pipeline::from_parts(stages, transport))
    }
}

#[cfg(feature = "reqwest-transport")]
fn default_transport() -> Result<Arc<dyn DynTransport>> {
    Ok(Arc::new(crate::transport::ReqwestTransport::new()))
}

#[cfg(not(feature = "reqwest-transport"))]
fn default_transport() -> Result<Arc<dyn DynTransport>> {
    Err(crate::error::Error::validation(
        "no transport configured, use `with_transport()` or enable the `reqwest-transport` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ConfigError;
    use http::StatusCode;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        requests: Mutex<Vec<Request>>,
    }

    #[derive(Clone, Debug, Default)]
    struct RecordingTransport(Arc<Recorder>);

    impl Transport for RecordingTransport {
        async fn send(&self, request: Request) -> Result<Response> {
            self.0.requests.lock().unwrap().push(request.clone());
            Ok(Response::new(request, StatusCode::OK))
        }
    }

    #[derive(Debug)]
    struct Tag(&'static str);

    impl crate::policy::Policy for Tag {
        async fn send(&self, request: Request, next: Next<'_>) -> Result<Response> {
            let mut request = request;
            request
                .headers_mut()
                .append("x-tag", http::HeaderValue::from_static(self.0));
            next.run(request).await
        }
    }

    fn request() -> Request {
        let url = url::Url::parse("https://example.com/v1/things").unwrap();
        Request::new(http::Method::GET, url)
    }

    #[tokio::test]
    async fn explicit_order() -> anyhow::Result<()> {
        let transport = RecordingTransport::default();
        let pipeline = Pipeline::new(
            [
                PolicyArg::from(Tag("a")),
                PolicyArg::from(Tag("b")),
                PolicyArg::from(Tag("c")),
            ],
            transport.clone(),
        );
        let response = pipeline.send(request()).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let requests = transport.0.requests.lock().unwrap();
        let tags: Vec<_> = requests[0]
            .headers()
            .get_all("x-tag")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_pipeline() -> anyhow::Result<()> {
        let transport = RecordingTransport::default();
        let pipeline = Pipeline::new(Vec::<PolicyArg>::new(), transport.clone());
        let _ = pipeline.send(request()).await?;
        assert_eq!(transport.0.requests.lock().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn builder_order() -> anyhow::Result<()> {
        let transport = RecordingTransport::default();
        let options = ClientOptions::default()
            .with_application_id("test-app")?
            .with_per_call_policy(Tag("per-call"))
            .with_per_retry_policy(Tag("per-retry"));
        let pipeline = Pipeline::builder()
            .with_client_options(options)
            .with_credential(crate::credentials::BearerToken::new("test-token"))
            .with_transport(transport.clone())
            .build()?;
        let _ = pipeline.send(request()).await?;

        let requests = transport.0.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let headers = requests[0].headers();
        let user_agent = headers.get(http::header::USER_AGENT).unwrap().to_str()?;
        assert!(user_agent.starts_with("test-app cloud-client-gax/"), "{user_agent}");
        assert!(headers.contains_key("x-client-request-id"), "{headers:?}");
        assert!(headers.contains_key(http::header::DATE), "{headers:?}");
        assert_eq!(
            headers.get(http::header::AUTHORIZATION).unwrap(),
            "Bearer test-token"
        );
        let tags: Vec<_> = headers.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["per-call", "per-retry"]);
        Ok(())
    }

    #[tokio::test]
    async fn clones_share_policies() -> anyhow::Result<()> {
        let transport = RecordingTransport::default();
        let pipeline = Pipeline::new([PolicyArg::from(Tag("shared"))], transport.clone());
        let clone = pipeline.clone();
        let (a, b) = tokio::join!(pipeline.send(request()), clone.send(request()));
        a?;
        b?;
        assert_eq!(transport.0.requests.lock().unwrap().len(), 2);
        assert!(Arc::ptr_eq(&pipeline.inner, &clone.inner));
        Ok(())
    }

    #[test]
    fn bad_application_id() {
        let err = ClientOptions::default().with_application_id("has spaces");
        assert!(
            matches!(err, Err(ConfigError::InvalidApplicationId(_))),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn policy_can_be_called_directly() -> anyhow::Result<()> {
        let transport = RecordingTransport::default();
        let policies: Vec<Arc<dyn Policy>> = Vec::new();
        let response = crate::policy::Policy::send(
            &Tag("direct"),
            request(),
            Next::new(&policies, &transport),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }
}
