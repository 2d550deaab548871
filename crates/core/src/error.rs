/// Identity failures the service reports to callers.
///
/// The `Display` text is the message clients show to the user.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Register input was missing or malformed.
    #[error("{0}")]
    Validation(String),

    #[error("User already exists")]
    UserExists,

    /// Unknown email or wrong password. Both read the same.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, malformed or expired bearer token, or one whose user is gone.
    #[error("{0}")]
    Unauthorized(String),
}
