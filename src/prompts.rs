//! Fixed request text sent to the vision-analysis service.
//!
//! Kept in one place so prompt changes never touch transport code, and so
//! tests can assert against the exact wording.
//!
//! Callers can override both values via
//! [`crate::config::ReportConfigBuilder::query`] and
//! [`crate::config::ReportConfigBuilder::user`].

/// Instruction attached to every uploaded image.
pub const DEFAULT_ANALYSIS_QUERY: &str =
    "Analyze this image and provide a detailed description and value assessment";

/// End-user identifier forwarded with uploads and chat requests.
///
/// The service scopes uploaded files to this id; the file id returned by the
/// upload call is only usable by the same user in the follow-up request.
pub const DEFAULT_USER: &str = "abc-123";

/// Prefix of the text recorded for an image whose analysis failed.
pub const ERROR_MARKER_PREFIX: &str = "Error processing image: ";

/// Build the error-marker text stored in place of an analysis.
pub fn error_marker(detail: impl std::fmt::Display) -> String {
    format!("{ERROR_MARKER_PREFIX}{detail}")
}
