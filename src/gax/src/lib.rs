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

//! HTTP pipeline helpers.
//!
//! This crate contains the request pipeline used by the Cloud Client
//! Libraries for Rust: an ordered chain of [policies][policy::Policy]
//! terminating in a [transport][transport::Transport], the built-in policies
//! (user agent, request id, credentials, retries, logging), and the helpers
//! to consume paginated collections.
//!
//! # Example
//! ```no_run
//! # use cloud_client_gax::*;
//! # async fn sample() -> Result<()> {
//! use cloud_client_gax::request::Request;
//! let pipeline = pipeline::Pipeline::builder().build()?;
//! let url = url::Url::parse("https://example.com/v1/things").map_err(error::Error::validation)?;
//! let response = pipeline.send(Request::new(http::Method::GET, url)).await?;
//! let response = response.error_for_status()?;
//! println!("{}", response.status());
//! # Ok(()) }
//! ```

/// An alias of [std::result::Result] where the error is always [crate::error::Error].
///
/// This is the result type used by all functions that send requests.
pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// The core error types used by the pipeline.
pub mod error;

/// The request sent through a [Pipeline][pipeline::Pipeline].
pub mod request;

/// The response returned by a [Pipeline][pipeline::Pipeline].
pub mod response;

pub mod transport;

pub mod credentials;

/// Defines the [Policy][policy::Policy] trait and the chain continuation.
pub mod policy;

pub mod pipeline;

/// The policies installed by [Pipeline::builder()][pipeline::Pipeline::builder].
pub mod policies;

pub mod options;

pub mod backoff_policy;
pub mod exponential_backoff;
pub mod loop_state;
pub mod polling_backoff_policy;
pub mod polling_error_policy;
pub mod retry_after;
pub mod retry_policy;
pub mod retry_result;
pub mod retry_state;

#[doc(hidden)]
pub mod retry_loop_internal;

/// Types and helpers to consume paginated collections as a
/// [Stream][futures::Stream].
pub mod paginator;

#[cfg(test)]
pub(crate) mod mock_rng;
