use thiserror::Error;

/// Errors surfaced at the analytics domain boundary.
///
/// Store internals use `anyhow` with context; whatever bubbles up to an
/// operation the API exposes gets folded into one of these.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The request itself is malformed (missing song id, missing
    /// engagement type, ...). Maps to HTTP 400.
    #[error("{0}")]
    Validation(String),

    /// The requested entity does not exist. Maps to HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// The backing store failed. Maps to HTTP 500, detail is logged
    /// server-side only.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_message() {
        let err = AnalyticsError::Validation("Song ID is required".to_string());
        assert_eq!(err.to_string(), "Song ID is required");
    }

    #[test]
    fn store_error_wraps_anyhow() {
        let err: AnalyticsError = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, AnalyticsError::Store(_)));
    }
}
