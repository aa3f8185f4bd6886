use thiserror::Error;

/// Registry lookup and mutation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Tunnel not found: {id}. Check the ID or search by kind instead")]
    NotFound { id: String },

    #[error("No tunnels of kind {kind} found")]
    KindNotFound { kind: String },

    #[error("Group not found: {path}")]
    GroupNotFound { path: String },

    #[error("Invalid group name: {0:?}")]
    InvalidGroupName(String),

    #[error("Group {group} already holds a different tunnel with ID {id}")]
    DuplicateId { id: String, group: String },
}

impl RegistryError {
    /// True for the "nothing matched" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::NotFound { .. } | RegistryError::KindNotFound { .. }
        )
    }
}
