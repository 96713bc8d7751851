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

/// The status of a long-running operation, as observed by a
/// [Poller][crate::Poller].
///
/// Services may report statuses outside the standard vocabulary. Use
/// [OperationStatus::custom] to represent them, declaring whether the status
/// is terminal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum OperationStatus {
    /// The operation has not started, the poller has not been activated.
    NotStarted,
    /// The operation is running.
    InProgress,
    /// The operation completed successfully. This is terminal.
    SuccessfullyCompleted,
    /// The operation failed. This is terminal.
    Failed,
    /// The operation was cancelled. This is terminal.
    UserCancelled,
    /// A status reported by the service outside the standard vocabulary.
    Custom { name: String, complete: bool },
}

impl OperationStatus {
    /// Creates a custom status.
    ///
    /// # Example
    /// ```
    /// # use cloud_client_lro::OperationStatus;
    /// let status = OperationStatus::custom("COPY_START_FAILED", true);
    /// assert!(status.is_complete());
    /// assert_eq!(status.name(), "COPY_START_FAILED");
    /// ```
    pub fn custom<V: Into<String>>(name: V, complete: bool) -> Self {
        Self::Custom {
            name: name.into(),
            complete,
        }
    }

    /// Returns true for statuses with no outgoing transitions.
    pub fn is_complete(&self) -> bool {
        match self {
            Self::NotStarted | Self::InProgress => false,
            Self::SuccessfullyCompleted | Self::Failed | Self::UserCancelled => true,
            Self::Custom { complete, .. } => *complete,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::SuccessfullyCompleted)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::SuccessfullyCompleted => "SUCCESSFULLY_COMPLETED",
            Self::Failed => "FAILED",
            Self::UserCancelled => "USER_CANCELLED",
            Self::Custom { name, .. } => name.as_str(),
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
