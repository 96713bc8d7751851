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

//! Parse the server hints for the delay before the next request.
//!
//! Services return these hints with throttling errors, and with the responses
//! to poll a long-running operation. The retry policy and the pollers use the
//! hint, when present, instead of their backoff policy.

use http::HeaderMap;
use std::time::Duration;

const RETRY_AFTER_MS: &str = "retry-after-ms";
const X_MS_RETRY_AFTER_MS: &str = "x-ms-retry-after-ms";

/// The longest delay accepted from a server hint.
///
/// Larger hints, including far-future dates, are clamped to this value.
pub const MAX_DELAY: Duration = Duration::from_secs(5 * 60);

/// Returns the delay requested by the server, if any.
///
/// The millisecond headers (`retry-after-ms` and `x-ms-retry-after-ms`) take
/// precedence. Then the standard `retry-after` header is used, either as a
/// number of seconds or as an HTTP date. A date in the past yields a zero
/// delay. Malformed values are ignored. The result never exceeds
/// [MAX_DELAY].
///
/// # Example
/// ```
/// # use cloud_client_gax::retry_after::from_headers;
/// use http::{HeaderMap, HeaderValue};
/// use std::time::Duration;
/// let mut headers = HeaderMap::new();
/// headers.insert("retry-after", HeaderValue::from_static("3"));
/// assert_eq!(from_headers(&headers), Some(Duration::from_secs(3)));
/// ```
pub fn from_headers(headers: &HeaderMap) -> Option<Duration> {
    [RETRY_AFTER_MS, X_MS_RETRY_AFTER_MS]
        .into_iter()
        .find_map(|name| header_str(headers, name).and_then(parse_millis))
        .or_else(|| {
            header_str(headers, http::header::RETRY_AFTER.as_str())
                .and_then(|v| parse_seconds(v).or_else(|| parse_date(v, chrono::Utc::now())))
        })
        .map(|d| d.min(MAX_DELAY))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

fn parse_millis(value: &str) -> Option<Duration> {
    if let Ok(v) = value.parse::<u64>() {
        return Some(Duration::from_millis(v));
    }
    parse_number(value).and_then(|v| Duration::try_from_secs_f64(v / 1000.0).ok())
}

fn parse_seconds(value: &str) -> Option<Duration> {
    if let Ok(v) = value.parse::<u64>() {
        return Some(Duration::from_secs(v));
    }
    parse_number(value).and_then(|v| Duration::try_from_secs_f64(v).ok())
}

fn parse_number(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_date(value: &str, now: chrono::DateTime<chrono::Utc>) -> Option<Duration> {
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
