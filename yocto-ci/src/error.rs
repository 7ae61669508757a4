use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BootError>;

#[derive(Debug, Error)]
pub enum BootError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for pid {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("console line is not valid utf-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
    #[error("failed to read console output: {0}")]
    Read(#[source] io::Error),
}

impl BootError {
    /// True when the launcher binary itself could not be found.
    pub fn is_not_found(&self) -> bool {
        match self {
            BootError::Launch { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
