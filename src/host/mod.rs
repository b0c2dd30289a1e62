pub mod cli;
pub mod docker;
#[cfg(test)]
pub mod memory;

use std::process::ExitStatus;

/// - Copies an archive stream out of a container
/// - Unpacks an archive stream into a container directory
pub trait Transport {
    /// `<id>:<path>` as a tar stream, like `docker cp <id>:<path> -`
    fn copy_out(&self, id: &str, path: &str) -> Result<Vec<u8>, TransportError>;
    /// unpack `archive` into `dir`, like `docker cp - <id>:<dir>`
    fn copy_in(&self, id: &str, dir: &str, archive: &[u8]) -> Result<(), TransportError>;
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("io")]
    Io(#[from] std::io::Error),
    #[error("engine api")]
    Engine(#[from] bollard::errors::Error),
}
