use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("Unsupported object group {0}, only group 0 is handled")]
    UnsupportedGroup(u64),

    #[error("Role mismatch: {0}")]
    RoleMismatch(String),

    #[error("Role record error: {0}")]
    RoleRecord(String),

    #[error("Last id error: {0}")]
    LastId(String),

    #[error("Unrecognized object name {name:?} in {dir}")]
    BadObjectName { name: String, dir: String },

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Run aborted: {0}")]
    Aborted(String),

    #[error("Failed to close {} table(s): {}", .0.len(), .0.join("; "))]
    Cleanup(Vec<String>),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn map_rocks_err(err: rocksdb::Error) -> Error {
    Error::Storage(err.to_string())
}
