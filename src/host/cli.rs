use std::{
    io::Write,
    process::{Command, Output, Stdio},
};
use tracing::debug;

use super::{Transport, TransportError};

/// Talks to the container through the runtime's own command line
pub struct Cli {
    /// e.g. `docker` or `podman`
    pub runtime: String,
}

impl Cli {
    pub fn new(runtime: impl Into<String>) -> Self {
        Cli {
            runtime: runtime.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.runtime);
        cmd.args(args);
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> TransportError {
        TransportError::Spawn {
            program: self.runtime.clone(),
            source,
        }
    }

    fn check(&self, args: &[&str], output: Output) -> Result<Vec<u8>, TransportError> {
        if !output.status.success() {
            return Err(TransportError::Failed {
                command: format!("{} {}", self.runtime, args.join(" ")),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

impl Transport for Cli {
    fn copy_out(&self, id: &str, path: &str) -> Result<Vec<u8>, TransportError> {
        let source = format!("{}:{}", id, path);
        let args = ["cp", source.as_str(), "-"];
        debug!("{} {:?}", self.runtime, args);

        let output = self
            .command(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        self.check(&args, output)
    }

    fn copy_in(&self, id: &str, dir: &str, archive: &[u8]) -> Result<(), TransportError> {
        let target = format!("{}:{}", id, dir);
        let args = ["cp", "-", target.as_str()];
        debug!("{} {:?} ({} byte archive)", self.runtime, args, archive.len());

        let mut child = self
            .command(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // dropping stdin closes the pipe so the runtime sees EOF
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(archive),
            None => Ok(()),
        };

        // a runtime that bailed early breaks the pipe, its stderr says why
        let output = child.wait_with_output()?;
        self.check(&args, output)?;
        written?;

        Ok(())
    }
}
