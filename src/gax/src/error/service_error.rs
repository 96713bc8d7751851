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

use serde::Deserialize;

/// An error returned by a service in the body of a failed response.
///
/// Most REST services wrap their error details in an envelope:
///
/// ```json
/// {"error": {"code": "ResourceNotFound", "message": "The thing is not there"}}
/// ```
///
/// Some services omit the envelope, and some send numeric codes. This type
/// normalizes all of these into a string code and a message.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct ServiceError {
    code: String,
    message: String,
    target: Option<String>,
    details: Vec<ServiceError>,
}

impl ServiceError {
    /// Creates a new instance.
    ///
    /// # Example
    /// ```
    /// # use cloud_client_gax::error::ServiceError;
    /// let e = ServiceError::new("Conflict", "the resource already exists");
    /// assert_eq!(e.code(), "Conflict");
    /// ```
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// The service specific error code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// A human-readable description of the problem.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The request element the error refers to, if the service reports one.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Additional, more specific, errors.
    pub fn details(&self) -> &[ServiceError] {
        &self.details
    }

    /// Sets the [target][ServiceError::target].
    pub fn set_target<T: Into<String>>(mut self, v: T) -> Self {
        self.target = Some(v.into());
        self
    }

    /// Sets the [details][ServiceError::details].
    pub fn set_details<T, I>(mut self, v: T) -> Self
    where
        T: IntoIterator<Item = I>,
        I: Into<ServiceError>,
    {
        self.details = v.into_iter().map(Into::into).collect();
        self
    }

    /// Parses the payload of a failed response.
    ///
    /// Returns `None` if the payload is not JSON, or if it does not contain
    /// an error code.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let wire = serde_json::from_slice::<Envelope>(payload).ok()?;
        let body = match wire {
            Envelope::Wrapped { error } => error,
            Envelope::Bare(body) => body,
        };
        body.code.as_ref()?;
        Some(Self::from(body))
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { error: WireError },
    Bare(WireError),
}

#[derive(Deserialize)]
struct WireError {
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    details: Vec<WireError>,
}

impl From<WireError> for ServiceError {
    fn from(value: WireError) -> Self {
        let code = match value.code {
            Some(serde_json::Value::String(s)) => s,
            Some(v) => v.to_string(),
            None => String::new(),
        };
        Self {
            code,
            message: value.message.unwrap_or_default(),
            target: value.target,
            details: value.details.into_iter().map(Self::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn wrapped() {
        let payload = serde_json::json!({"error": {
            "code": "ResourceNotFound",
            "message": "The thing is not there, oh noes!",
            "details": [{"code": "Inner", "message": "we searched everywhere, honest"}]
        }});
        let got = ServiceError::from_payload(payload.to_string().as_bytes());
        let want = ServiceError::new("ResourceNotFound", "The thing is not there, oh noes!")
            .set_details([ServiceError::new("Inner", "we searched everywhere, honest")]);
        assert_eq!(got, Some(want));
    }

    #[test]
    fn bare_with_numeric_code() {
        let payload = serde_json::json!({"code": 409, "message": "conflict", "target": "name"});
        let got = ServiceError::from_payload(payload.to_string().as_bytes());
        let want = ServiceError::new("409", "conflict").set_target("name");
        assert_eq!(got, Some(want));
    }

    #[test_case(b""; "empty")]
    #[test_case(b"<html>bad gateway</html>"; "not json")]
    #[test_case(b"{\"value\": []}"; "no code")]
    fn unparseable(payload: &[u8]) {
        assert_eq!(ServiceError::from_payload(payload), None);
    }

    #[test]
    fn display() {
        let e = ServiceError::new("Conflict", "already exists");
        assert_eq!(e.to_string(), "Conflict: already exists");
    }
}
