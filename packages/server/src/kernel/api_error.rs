//! Common error shape for external API calls.
//!
//! The weather and ad-platform clients each surface their own error types;
//! the kernel traits normalize them into [`ApiError`] so the rate limiter
//! can classify a failure without knowing which service produced it.

/// An external API failure with enough structure to classify.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
    /// Server-provided Retry-After, in milliseconds
    pub retry_after_ms: Option<u64>,
    pub message: String,
}

/// How the retry driver should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The service told us to slow down
    RateLimited,
    /// Transient; retry with exponential backoff
    Retryable,
    /// Retrying will not help
    Terminal,
}

const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "too many requests",
    "quota exceeded",
    "throttled",
];

const RETRYABLE_PHRASES: &[&str] = &[
    "network",
    "timeout",
    "connection",
    "connection reset",
    "socket hang up",
];

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            retry_after_ms: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after_ms(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }

    /// The "gave up" error raised when the retry driver exhausts its budget.
    pub fn retries_exhausted(service: &str, attempts: u32, last: ApiError) -> Self {
        Self {
            status: last.status,
            retry_after_ms: last.retry_after_ms,
            message: format!(
                "{} retries exhausted after {} attempts: {}",
                service, attempts, last.message
            ),
        }
    }

    pub fn classify(&self) -> ErrorClass {
        let message = self.message.to_lowercase();

        if matches!(self.status, Some(429) | Some(503))
            || RATE_LIMIT_PHRASES.iter().any(|p| message.contains(p))
        {
            return ErrorClass::RateLimited;
        }

        if matches!(self.status, Some(408 | 429 | 500 | 502 | 503 | 504))
            || RETRYABLE_PHRASES.iter().any(|p| message.contains(p))
        {
            return ErrorClass::Retryable;
        }

        ErrorClass::Terminal
    }
}

impl From<openweather::Error> for ApiError {
    fn from(err: openweather::Error) -> Self {
        match err {
            openweather::Error::Http(e) => from_reqwest("openweather", e),
            openweather::Error::Api {
                status,
                retry_after_ms,
                message,
            } => ApiError {
                status: Some(status),
                retry_after_ms,
                message: format!("openweather error {}: {}", status, message),
            },
        }
    }
}

impl From<meta_ads::Error> for ApiError {
    fn from(err: meta_ads::Error) -> Self {
        match err {
            meta_ads::Error::Http(e) => from_reqwest("meta ads", e),
            meta_ads::Error::Api {
                status,
                retry_after_ms,
                message,
            } => ApiError {
                status: Some(status),
                retry_after_ms,
                message: format!("meta ads error {}: {}", status, message),
            },
        }
    }
}

impl From<google_ads::Error> for ApiError {
    fn from(err: google_ads::Error) -> Self {
        match err {
            google_ads::Error::Http(e) => from_reqwest("google ads", e),
            google_ads::Error::Api {
                status,
                retry_after_ms,
                message,
            } => ApiError {
                status: Some(status),
                retry_after_ms,
                message: format!("google ads error {}: {}", status, message),
            },
            google_ads::Error::InvalidId(id) => ApiError::new(format!(
                "google ads target has malformed id {:?}",
                id
            )),
        }
    }
}

fn from_reqwest(service: &str, err: reqwest::Error) -> ApiError {
    let kind = if err.is_timeout() { "timeout" } else { "network" };
    ApiError {
        status: err.status().map(|s| s.as_u16()),
        retry_after_ms: None,
        message: format!("{} {} error: {}", service, kind, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        let err = ApiError::new("anything").with_status(429);
        assert_eq!(err.classify(), ErrorClass::RateLimited);
    }

    #[test]
    fn status_503_is_rate_limited() {
        // 503 is classified as a slow-down signal before generic retry
        let err = ApiError::new("service unavailable").with_status(503);
        assert_eq!(err.classify(), ErrorClass::RateLimited);
    }

    #[test]
    fn rate_limit_phrases_without_status() {
        for msg in [
            "Rate limit hit",
            "too many requests from this app",
            "daily quota exceeded",
            "request throttled",
        ] {
            assert_eq!(ApiError::new(msg).classify(), ErrorClass::RateLimited);
        }
    }

    #[test]
    fn transient_statuses_are_retryable() {
        for status in [408u16, 500, 502, 504] {
            let err = ApiError::new("boom").with_status(status);
            assert_eq!(err.classify(), ErrorClass::Retryable, "status {status}");
        }
    }

    #[test]
    fn transient_phrases_are_retryable() {
        for msg in ["network unreachable", "read timeout", "connection reset by peer"] {
            assert_eq!(ApiError::new(msg).classify(), ErrorClass::Retryable);
        }
    }

    #[test]
    fn everything_else_is_terminal() {
        assert_eq!(
            ApiError::new("invalid parameter").with_status(400).classify(),
            ErrorClass::Terminal
        );
        assert_eq!(ApiError::new("permission denied").classify(), ErrorClass::Terminal);
    }
}
