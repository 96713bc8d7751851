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
use crate::request::Request;
use crate::response::Response;
use std::sync::Arc;

/// A unit of middleware in a [Pipeline][crate::pipeline::Pipeline].
///
/// A policy receives the request and the rest of the chain. It may change
/// the request, call [Next::run] (possibly more than once), and observe or
/// change the response on the way back.
///
/// Policies should only return without calling `next` to produce a
/// synthetic response or to fail a request that cannot be sent, for
/// example, because some local input is invalid. Policies must propagate
/// errors from the rest of the chain unless they are designed to translate
/// them, as the retry policy does.
///
/// # Example
/// ```
/// # use cloud_client_gax::policy::{Next, Policy};
/// # use cloud_client_gax::request::Request;
/// # use cloud_client_gax::response::Response;
/// # use cloud_client_gax::Result;
/// #[derive(Debug)]
/// struct Tenant(http::HeaderValue);
///
/// impl Policy for Tenant {
///     async fn send(&self, request: Request, next: Next<'_>) -> Result<Response> {
///         let request = request.set_header(http::HeaderName::from_static("x-tenant"), self.0.clone());
///         next.run(request).await
///     }
/// }
/// ```
pub trait Policy: std::fmt::Debug {
    fn send(
        &self,
        request: Request,
        next: Next<'_>,
    ) -> impl Future<Output = Result<Response>> + Send;
}

pub mod dynamic {
    use super::{Next, Request, Response, Result};

    /// A dyn-compatible, crate-private version of [Policy][super::Policy].
    #[async_trait::async_trait]
    pub trait Policy: Send + Sync + std::fmt::Debug {
        async fn send(&self, request: Request, next: Next<'_>) -> Result<Response>;
    }

    /// The public Policy implements the dyn-compatible Policy.
    #[async_trait::async_trait]
    impl<T> Policy for T
    where
        T: super::Policy + Send + Sync,
    {
        async fn send(&self, request: Request, next: Next<'_>) -> Result<Response> {
            T::send(self, request, next).await
        }
    }
}

/// A helper type to use [Policy] in client options.
#[derive(Clone, Debug)]
pub struct PolicyArg(pub(crate) Arc<dyn dynamic::Policy>);

impl<T> std::convert::From<T> for PolicyArg
where
    T: Policy + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl std::convert::From<Arc<dyn dynamic::Policy>> for PolicyArg {
    fn from(value: Arc<dyn dynamic::Policy>) -> Self {
        Self(value)
    }
}

/// The remainder of the chain, as seen by a [Policy].
#[derive(Clone, Copy, Debug)]
pub struct Next<'a> {
    policies: &'a [Arc<dyn dynamic::Policy>],
    transport: &'a dyn crate::transport::dynamic::Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        policies: &'a [Arc<dyn dynamic::Policy>],
        transport: &'a dyn crate::transport::dynamic::Transport,
    ) -> Self {
        Self {
            policies,
            transport,
        }
    }

    /// Sends `request` through the rest of the chain.
    pub async fn run(self, request: Request) -> Result<Response> {
        match self.policies.split_first() {
            Some((head, tail)) => head.send(request, Next::new(tail, self.transport)).await,
            None => self.transport.send(request).await,
        }
    }
}
