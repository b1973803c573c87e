use std::fmt::Display;

#[derive(Debug)]
pub enum AuthError {
    MissingKey,
    InvalidKey,
    Revoked,
    Storage(String),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingKey => write!(f, "missing sentinel key"),
            AuthError::InvalidKey => write!(f, "invalid sentinel key"),
            AuthError::Revoked => write!(f, "revoked sentinel key"),
            AuthError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl From<String> for AuthError {
    fn from(error: String) -> Self {
        AuthError::Storage(error)
    }
}
