use std::fmt;

/// Stage-tagged pipeline errors so a failed run says which step broke.
#[derive(Debug)]
pub enum StageError {
    Config(String),
    Resolve(String),
    Fetch(String),
    Compute(String),
    Write(String),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StageError::Config(msg) => write!(f, "config error: {}", msg),
            StageError::Resolve(msg) => write!(f, "resolve error: {}", msg),
            StageError::Fetch(msg) => write!(f, "fetch error: {}", msg),
            StageError::Compute(msg) => write!(f, "compute error: {}", msg),
            StageError::Write(msg) => write!(f, "write error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}
