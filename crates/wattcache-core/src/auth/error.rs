use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Email and password are required for authentication")]
    MissingCredentials,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Network error during login: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}
