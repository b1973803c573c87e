use std::fmt::Display;

#[derive(Debug)]
pub enum IdentityError {
    /// Also covers projects that exist but belong to another owner, so the
    /// response shape does not reveal which case applied.
    NotFound,
    EmailTaken,
    InvalidCredentials,
    Storage(String),
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::NotFound => write!(f, "not found"),
            IdentityError::EmailTaken => write!(f, "email already registered"),
            IdentityError::InvalidCredentials => write!(f, "invalid credentials"),
            IdentityError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl From<String> for IdentityError {
    fn from(error: String) -> Self {
        IdentityError::Storage(error)
    }
}
