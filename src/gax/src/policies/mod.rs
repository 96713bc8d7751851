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

//! Each policy is a [Policy][crate::policy::Policy]. Applications may use
//! them to assemble a custom [Pipeline][crate::pipeline::Pipeline] with
//! [Pipeline::new()][crate::pipeline::Pipeline::new].

mod credential;
mod date;
mod logging;
mod request_id;
mod retry;
mod user_agent;

pub use credential::CredentialPolicy;
pub use date::DatePolicy;
pub use logging::LoggingPolicy;
pub use request_id::{REQUEST_ID_HEADER, RequestIdPolicy};
pub use retry::RetryPolicy;
pub use user_agent::UserAgentPolicy;
