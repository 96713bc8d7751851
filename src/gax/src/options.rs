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

//! Pipeline configuration.
//!
//! While the defaults are intended to work for most applications, it is
//! sometimes necessary to change the configuration. Applications change the
//! retry limits, enable request logging, or add their own policies.
//!
//! All the configuration types are plain values. They are validated when
//! created, and each call to `default()` returns a fresh value.

use crate::policy::PolicyArg;
use std::collections::BTreeSet;
use std::time::Duration;

/// Indicates a problem in the pipeline configuration.
#[derive(thiserror::Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("the base delay should be greater than zero")]
    ZeroBaseDelay,
    #[error(
        "the maximum delay ({maximum:?}) should be greater than or equal to the base delay ({base:?})"
    )]
    EmptyRange { maximum: Duration, base: Duration },
    #[error("the jitter ({0}) should be in the [0.0, 1.0] range")]
    InvalidJitter(f64),
    #[error("the per-try timeout should be greater than zero")]
    ZeroPerTryTimeout,
    #[error("the overall timeout should be greater than zero")]
    ZeroOverallTimeout,
    #[error(
        "the application id ({0:?}) should have at most 24 characters and no whitespace or control characters"
    )]
    InvalidApplicationId(String),
}

/// Configures the retry policy in the pipeline.
///
/// # Example
/// ```
/// # use cloud_client_gax::options::*;
/// use std::time::Duration;
/// let options = RetryOptions::builder()
///     .with_max_retries(5)
///     .with_base_delay(Duration::from_millis(500))
///     .with_max_delay(Duration::from_secs(30))
///     .with_additional_status_code(429)
///     .build()?;
/// assert!(options.is_retryable_status(429));
/// assert!(options.is_retryable_status(503));
/// # Ok::<(), ConfigError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RetryOptions {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
    retryable_status_codes: BTreeSet<u16>,
    per_try_timeout: Option<Duration>,
    overall_timeout: Option<Duration>,
}

impl RetryOptions {
    pub fn builder() -> RetryOptionsBuilder {
        RetryOptionsBuilder {
            inner: Self::default(),
        }
    }

    /// The maximum number of retries. The total number of attempts is one
    /// more than this value.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// The additive jitter, as a fraction of the backoff delay.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn retryable_status_codes(&self) -> &BTreeSet<u16> {
        &self.retryable_status_codes
    }

    pub fn is_retryable_status(&self, code: u16) -> bool {
        self.retryable_status_codes.contains(&code)
    }

    pub fn per_try_timeout(&self) -> Option<Duration> {
        self.per_try_timeout
    }

    pub fn overall_timeout(&self) -> Option<Duration> {
        self.overall_timeout
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(8),
            jitter: 0.2,
            retryable_status_codes: BTreeSet::from([408, 500, 502, 503, 504]),
            per_try_timeout: None,
            overall_timeout: None,
        }
    }
}

/// Builds and validates a [RetryOptions].
#[derive(Clone, Debug)]
pub struct RetryOptionsBuilder {
    inner: RetryOptions,
}

impl RetryOptionsBuilder {
    pub fn with_max_retries(mut self, v: u32) -> Self {
        self.inner.max_retries = v;
        self
    }

    pub fn with_base_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.inner.base_delay = v.into();
        self
    }

    pub fn with_max_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.inner.max_delay = v.into();
        self
    }

    pub fn with_jitter(mut self, v: f64) -> Self {
        self.inner.jitter = v;
        self
    }

    /// Replaces the set of retryable status codes.
    pub fn with_retryable_status_codes<I: IntoIterator<Item = u16>>(mut self, v: I) -> Self {
        self.inner.retryable_status_codes = v.into_iter().collect();
        self
    }

    /// Adds a status code to the set of retryable status codes.
    pub fn with_additional_status_code(mut self, v: u16) -> Self {
        self.inner.retryable_status_codes.insert(v);
        self
    }

    pub fn with_per_try_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.inner.per_try_timeout = Some(v.into());
        self
    }

    pub fn with_overall_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.inner.overall_timeout = Some(v.into());
        self
    }

    pub fn build(self) -> Result<RetryOptions, ConfigError> {
        let o = self.inner;
        if o.base_delay.is_zero() {
            return Err(ConfigError::ZeroBaseDelay);
        }
        if o.max_delay < o.base_delay {
            return Err(ConfigError::EmptyRange {
                maximum: o.max_delay,
                base: o.base_delay,
            });
        }
        if !(0.0..=1.0).contains(&o.jitter) {
            return Err(ConfigError::InvalidJitter(o.jitter));
        }
        if o.per_try_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroPerTryTimeout);
        }
        if o.overall_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroOverallTimeout);
        }
        Ok(o)
    }
}

/// How much detail the logging policy includes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum HttpLogDetailLevel {
    /// Logging is disabled.
    #[default]
    None,
    /// Log the method, the redacted URL, the status code, and the latency.
    Basic,
    /// Also log the redacted headers.
    Headers,
    /// Also log buffered payloads.
    BodyAndHeaders,
}

/// Configures the logging policy.
///
/// Header values and query parameter values are replaced with `REDACTED`
/// unless their names are in the allow-lists.
///
/// # Example
/// ```
/// # use cloud_client_gax::options::*;
/// let options = HttpLogOptions::default_options()
///     .with_detail_level(HttpLogDetailLevel::Headers)
///     .with_allowed_header_name("x-custom-header")
///     .with_allowed_query_param("comp");
/// assert!(options.is_header_allowed("X-Custom-Header"));
/// assert!(!options.is_header_allowed("authorization"));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct HttpLogOptions {
    detail_level: HttpLogDetailLevel,
    allowed_header_names: BTreeSet<String>,
    allowed_query_params: BTreeSet<String>,
}

const DEFAULT_ALLOWED_HEADERS: &[&str] = &[
    "accept",
    "azure-asyncoperation",
    "cache-control",
    "connection",
    "content-length",
    "content-type",
    "date",
    "etag",
    "expires",
    "if-match",
    "if-modified-since",
    "if-none-match",
    "if-unmodified-since",
    "last-modified",
    "location",
    "operation-location",
    "pragma",
    "request-id",
    "retry-after",
    "retry-after-ms",
    "server",
    "traceparent",
    "transfer-encoding",
    "user-agent",
    "x-client-request-id",
    "x-ms-client-request-id",
    "x-ms-request-id",
    "x-ms-retry-after-ms",
];

const DEFAULT_ALLOWED_QUERY_PARAMS: &[&str] = &["api-version"];

impl HttpLogOptions {
    /// Returns a new value with logging disabled and the default allow-lists.
    pub fn default_options() -> Self {
        Self {
            detail_level: HttpLogDetailLevel::None,
            allowed_header_names: DEFAULT_ALLOWED_HEADERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_query_params: DEFAULT_ALLOWED_QUERY_PARAMS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_detail_level(mut self, v: HttpLogDetailLevel) -> Self {
        self.detail_level = v;
        self
    }

    /// Adds a header name to the allow-list. Header names are not case
    /// sensitive.
    pub fn with_allowed_header_name<V: Into<String>>(mut self, v: V) -> Self {
        self.allowed_header_names
            .insert(v.into().to_ascii_lowercase());
        self
    }

    /// Adds a query parameter name to the allow-list.
    pub fn with_allowed_query_param<V: Into<String>>(mut self, v: V) -> Self {
        self.allowed_query_params.insert(v.into());
        self
    }

    pub fn detail_level(&self) -> HttpLogDetailLevel {
        self.detail_level
    }

    pub fn is_header_allowed(&self, name: &str) -> bool {
        self.allowed_header_names
            .contains(&name.to_ascii_lowercase())
    }

    pub fn is_query_param_allowed(&self, name: &str) -> bool {
        self.allowed_query_params.contains(name)
    }
}

impl Default for HttpLogOptions {
    fn default() -> Self {
        Self::default_options()
    }
}

/// Configures the policies installed by
/// [Pipeline::builder()][crate::pipeline::Pipeline::builder].
///
/// # Example
/// ```
/// # use cloud_client_gax::options::*;
/// let options = ClientOptions::default()
///     .with_application_id("my-app")?
///     .with_retry_options(RetryOptions::builder().with_max_retries(5).build()?)
///     .with_log_options(HttpLogOptions::default_options().with_detail_level(HttpLogDetailLevel::Basic));
/// assert_eq!(options.application_id(), Some("my-app"));
/// # Ok::<(), ConfigError>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct ClientOptions {
    application_id: Option<String>,
    retry: RetryOptions,
    log: HttpLogOptions,
    per_call_policies: Vec<PolicyArg>,
    per_retry_policies: Vec<PolicyArg>,
}

impl ClientOptions {
    /// Sets the application id, used as a prefix in the `user-agent` header.
    pub fn with_application_id<V: Into<String>>(mut self, v: V) -> Result<Self, ConfigError> {
        let v = v.into();
        if v.chars().count() > 24 || v.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ConfigError::InvalidApplicationId(v));
        }
        self.application_id = Some(v);
        Ok(self)
    }

    pub fn with_retry_options(mut self, v: RetryOptions) -> Self {
        self.retry = v;
        self
    }

    pub fn with_log_options(mut self, v: HttpLogOptions) -> Self {
        self.log = v;
        self
    }

    /// Adds a policy that runs once per call, before the retry policy.
    pub fn with_per_call_policy<V: Into<PolicyArg>>(mut self, v: V) -> Self {
        self.per_call_policies.push(v.into());
        self
    }

    /// Adds a policy that runs once per attempt, after the retry policy.
    pub fn with_per_retry_policy<V: Into<PolicyArg>>(mut self, v: V) -> Self {
        self.per_retry_policies.push(v.into());
        self
    }

    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }

    pub fn retry_options(&self) -> &RetryOptions {
        &self.retry
    }

    pub fn log_options(&self) -> &HttpLogOptions {
        &self.log
    }

    pub fn per_call_policies(&self) -> &[PolicyArg] {
        &self.per_call_policies
    }

    pub fn per_retry_policies(&self) -> &[PolicyArg] {
        &self.per_retry_policies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn retry_defaults() {
        let options = RetryOptions::default();
        assert_eq!(options.max_retries(), 3);
        assert_eq!(options.base_delay(), Duration::from_millis(800));
        assert_eq!(options.max_delay(), Duration::from_secs(8));
        assert_eq!(
            options.retryable_status_codes(),
            &BTreeSet::from([408, 500, 502, 503, 504])
        );
        assert!(!options.is_retryable_status(429));
        assert!(!options.is_retryable_status(404));
        assert_eq!(options.per_try_timeout(), None);
        assert_eq!(options.overall_timeout(), None);
        assert_eq!(RetryOptions::builder().build(), Ok(options));
    }

    #[test]
    fn retry_builder() -> anyhow::Result<()> {
        let options = RetryOptions::builder()
            .with_max_retries(7)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10))
            .with_jitter(0.5)
            .with_retryable_status_codes([503])
            .with_additional_status_code(429)
            .with_per_try_timeout(Duration::from_secs(3))
            .with_overall_timeout(Duration::from_secs(60))
            .build()?;
        assert_eq!(options.max_retries(), 7);
        assert_eq!(options.base_delay(), Duration::from_secs(1));
        assert_eq!(options.max_delay(), Duration::from_secs(10));
        assert_eq!(options.jitter(), 0.5);
        assert_eq!(options.retryable_status_codes(), &BTreeSet::from([429, 503]));
        assert_eq!(options.per_try_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(options.overall_timeout(), Some(Duration::from_secs(60)));
        Ok(())
    }

    #[test]
    fn retry_builder_errors() {
        let e = RetryOptions::builder()
            .with_base_delay(Duration::ZERO)
            .build();
        assert!(matches!(e, Err(ConfigError::ZeroBaseDelay)), "{e:?}");

        let e = RetryOptions::builder()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(1))
            .build();
        assert!(matches!(e, Err(ConfigError::EmptyRange { .. })), "{e:?}");

        let e = RetryOptions::builder()
            .with_per_try_timeout(Duration::ZERO)
            .build();
        assert!(matches!(e, Err(ConfigError::ZeroPerTryTimeout)), "{e:?}");

        let e = RetryOptions::builder()
            .with_overall_timeout(Duration::ZERO)
            .build();
        assert!(matches!(e, Err(ConfigError::ZeroOverallTimeout)), "{e:?}");
    }

    #[test_case(-0.1)]
    #[test_case(1.5)]
    #[test_case(f64::NAN)]
    fn retry_builder_jitter(jitter: f64) {
        let e = RetryOptions::builder().with_jitter(jitter).build();
        assert!(matches!(e, Err(ConfigError::InvalidJitter(_))), "{e:?}");
    }

    #[test]
    fn log_options() {
        let options = HttpLogOptions::default();
        assert_eq!(options, HttpLogOptions::default_options());
        assert_eq!(options.detail_level(), HttpLogDetailLevel::None);
        assert!(options.is_header_allowed("Content-Type"));
        assert!(options.is_header_allowed("x-client-request-id"));
        assert!(!options.is_header_allowed("authorization"));
        assert!(options.is_query_param_allowed("api-version"));
        assert!(!options.is_query_param_allowed("sig"));

        let options = options
            .with_detail_level(HttpLogDetailLevel::BodyAndHeaders)
            .with_allowed_header_name("X-Custom")
            .with_allowed_query_param("comp");
        assert_eq!(options.detail_level(), HttpLogDetailLevel::BodyAndHeaders);
        assert!(options.is_header_allowed("x-custom"));
        assert!(options.is_query_param_allowed("comp"));
    }

    #[test_case("my-app", true)]
    #[test_case("", true)]
    #[test_case("has space", false)]
    #[test_case("a-very-long-application-identifier", false)]
    fn application_id(id: &str, valid: bool) {
        let got = ClientOptions::default().with_application_id(id);
        match got {
            Ok(o) => {
                assert!(valid, "{o:?}");
                assert_eq!(o.application_id(), Some(id));
            }
            Err(e) => {
                assert!(!valid, "{e:?}");
                assert!(matches!(e, ConfigError::InvalidApplicationId(_)), "{e:?}");
            }
        }
    }
}
