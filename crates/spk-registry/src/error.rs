use spk_engine::EngineError;

/// Failure of a registry operation.
#[derive(Debug)]
pub enum RegistryError {
    /// No record exists for the node and the operation does not create one.
    UnknownNode(String),
    /// The engine rejected the event; the record is unchanged.
    Engine(EngineError),
    /// Every conditional write lost to a concurrent writer.
    Conflict { node_id: String, attempts: u32 },
    /// The space store failed.
    Storage(anyhow::Error),
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::UnknownNode(_) => "NOT_FOUND",
            RegistryError::Engine(e) => e.code(),
            RegistryError::Conflict { .. } => "CONFLICT",
            RegistryError::Storage(_) => "STORAGE",
        }
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::UnknownNode(node_id) => write!(f, "NOT_FOUND: unknown node {node_id}"),
            RegistryError::Engine(e) => write!(f, "{e}"),
            RegistryError::Conflict { node_id, attempts } => write!(
                f,
                "CONFLICT: node {node_id} still contended after {attempts} write attempts"
            ),
            RegistryError::Storage(e) => write!(f, "STORAGE: {e:#}"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Engine(e) => Some(e),
            RegistryError::Storage(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<EngineError> for RegistryError {
    fn from(e: EngineError) -> Self {
        RegistryError::Engine(e)
    }
}
