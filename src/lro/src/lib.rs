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

//! Long-running operation helpers.
//!
//! Some operations complete after the initial request returns: the service
//! accepts the request and the client polls the status of the operation
//! until it completes. The [Poller] in this crate implements that state
//! machine:
//!
//! ```text
//! NOT_STARTED -> IN_PROGRESS -> { SUCCESSFULLY_COMPLETED | FAILED | USER_CANCELLED }
//! ```
//!
//! Services may report additional statuses, see [OperationStatus::custom].
//!
//! Pollers are built from closures: one to start the operation, one to
//! query its status, one to fetch the final result, and optionally one to
//! cancel it. The [http] module builds these closures for services that use
//! the `Location` family of headers.

mod poll_response;
mod poller;
mod status;

pub mod http;

pub use gax::Result;
pub use gax::error::Error;
pub use poll_response::PollResponse;
pub use poller::{Poller, PollerBuilder, PollerOptions};
pub use status::OperationStatus;
