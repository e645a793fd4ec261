// Error types module
//
// Two layers:
// - `RegionError` is the only error the map screen ever sees
// - `NonFatal<T>` carries cache/warming failures that were absorbed at the
//   point they happened, so tests can observe them without the caller failing

use thiserror::Error;

use crate::cache::CacheError;
use crate::geo::GeoError;

/// Failure of a `request_region` call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegionError {
    /// The region fetch failed (timeout, non-2xx, connectivity)
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// A newer request replaced this one before its fetch settled
    #[error("Request superseded by a newer region request")]
    Superseded,

    /// The center or radius cannot be evaluated
    #[error("Invalid region request: {0}")]
    InvalidRequest(String),
}

impl From<GeoError> for RegionError {
    fn from(err: GeoError) -> Self {
        RegionError::InvalidRequest(err.to_string())
    }
}

/// Region fetch failure reported by the network collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl RegionError {
    /// True if the UI should offer a retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegionError::Network(_))
    }
}

/// Result of an operation whose failure must not propagate.
///
/// `Degraded` still carries the value the caller should proceed with (for a
/// failed load that is `None`, for a failed save `()`), plus the error that
/// was absorbed.
#[derive(Debug)]
#[must_use]
pub enum NonFatal<T> {
    Ok(T),
    Degraded { value: T, error: CacheError },
}

impl<T> NonFatal<T> {
    /// Wrap an absorbed failure, logging it once at the boundary
    pub fn degraded(value: T, error: CacheError, operation: &'static str) -> Self {
        tracing::warn!(
            operation = operation,
            error_kind = error.kind(),
            error = %error,
            "Cache operation degraded"
        );
        NonFatal::Degraded { value, error }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, NonFatal::Degraded { .. })
    }

    pub fn error(&self) -> Option<&CacheError> {
        match self {
            NonFatal::Ok(_) => None,
            NonFatal::Degraded { error, .. } => Some(error),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            NonFatal::Ok(value) | NonFatal::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            NonFatal::Ok(value) | NonFatal::Degraded { value, .. } => value,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> NonFatal<U> {
        match self {
            NonFatal::Ok(value) => NonFatal::Ok(f(value)),
            NonFatal::Degraded { value, error } => NonFatal::Degraded {
                value: f(value),
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_retryable() {
        assert!(RegionError::Network(NetworkError::Timeout).is_retryable());
        assert!(!RegionError::Superseded.is_retryable());
        assert!(!RegionError::InvalidRequest("radius".into()).is_retryable());
    }

    #[test]
    fn test_geo_error_becomes_invalid_request() {
        let err: RegionError = GeoError::LatitudeOutOfRange(99.0).into();
        assert!(matches!(err, RegionError::InvalidRequest(msg) if msg.contains("99")));
    }

    #[test]
    fn test_non_fatal_keeps_value_and_error() {
        let result: NonFatal<Option<u32>> = NonFatal::degraded(
            None,
            CacheError::Serialization("bad".into()),
            "test",
        );
        assert!(result.is_degraded());
        assert!(matches!(result.error(), Some(CacheError::Serialization(_))));
        assert_eq!(result.into_value(), None);
    }

    #[test]
    fn test_non_fatal_map_preserves_degradation() {
        let result = NonFatal::degraded(2, CacheError::Configuration("x".into()), "test");
        let mapped = result.map(|v| v * 10);
        assert_eq!(*mapped.value(), 20);
        assert!(mapped.is_degraded());

        let ok = NonFatal::Ok(1).map(|v| v + 1);
        assert!(!ok.is_degraded());
        assert_eq!(ok.into_value(), 2);
    }
}
