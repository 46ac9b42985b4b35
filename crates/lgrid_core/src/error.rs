use thiserror::Error;

/// Validation failures raised by the profile catalog. These are surfaced inline
/// on the form that triggered them and never touch grid state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileValidationError {
    #[error("Profile name cannot be empty")]
    EmptyName,

    #[error("A profile named '{0}' already exists")]
    DuplicateName(String),

    #[error("The default profile cannot be removed")]
    DefaultProfileIsPermanent,

    #[error("Shared profiles are disabled for this grid")]
    SharedProfilesDisabled,

    #[error("Not allowed to modify shared profiles")]
    NotAuthorized,
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("Grid state id is required to persist per-instance state")]
    MissingStateId,

    #[error(transparent)]
    Validation(#[from] ProfileValidationError),

    #[error("Row rejected: {}", .0.join("; "))]
    RowValidation(Vec<String>),

    #[error("Remote call failed with status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GridError {
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::RowValidation(_))
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_validation_joins_messages() {
        let err = GridError::RowValidation(vec!["Name is required".into(), "Age < 0".into()]);
        assert_eq!(err.to_string(), "Row rejected: Name is required; Age < 0");
        assert!(err.is_validation());
    }

    #[test]
    fn profile_validation_is_transparent() {
        let err: GridError = ProfileValidationError::DuplicateName("MyView".into()).into();
        assert_eq!(err.to_string(), "A profile named 'MyView' already exists");
    }
}
