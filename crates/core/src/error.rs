use thiserror::Error;

/// Crate-wide error type for conditions that are fatal to the calling
/// operation. Recoverable per-item failures (bad depth, collision exhausted,
/// mount busy, ...) are modelled as outcome enums on the relevant component,
/// never as `Err` — see the component docs for why.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("path is not absolute: {0}")]
    PathNotAbsolute(String),

    #[error("branch link escapes branch directory: {link} is not under {branch_dir}")]
    LinkEscapesBranchDirectory { link: String, branch_dir: String },

    #[error("filesystem entry exists and is not a symlink: {0}")]
    UnexpectedEntryKind(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CoreError>;
