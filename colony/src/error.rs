use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColonyError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("\"{op}\" is a root colony method")]
    RootOnly { op: &'static str },

    #[error("Unknown scope: {0}")]
    UnknownScope(String),

    #[error("Unsupported sort order: {0}")]
    SortOrder(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ColonyError>;
