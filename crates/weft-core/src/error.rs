use http::StatusCode;

/// Trait for domain errors that can be classified at an outer boundary
///
/// Implemented by each feature crate's error type. Callers that surface
/// errors over HTTP (or simply want a stable category) use this instead of
/// matching on crate-specific variants.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `invalid_request_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;
}
