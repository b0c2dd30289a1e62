use anyhow::{bail, Context};
use std::{
    os::unix::process::CommandExt,
    path::Path,
    process::{Command, Stdio},
};
use tracing::{debug, info};

use crate::{config::Config, identity::Identity};

/// Lifecycle of the one named container, all through the runtime cli
pub struct Runtime<'a> {
    pub config: &'a Config,
}

impl<'a> Runtime<'a> {
    pub fn new(config: &'a Config) -> Self {
        Runtime { config }
    }

    /// Runs the runtime and returns the first line it prints
    fn first_line(&self, args: &[String]) -> anyhow::Result<String> {
        debug!("{} {:?}", self.config.runtime, args);

        let output = Command::new(&self.config.runtime)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to run {}", self.config.runtime))?;

        if !output.status.success() {
            bail!(
                "`{} {}` failed with {}: {}",
                self.config.runtime,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8(output.stdout).context("runtime printed invalid utf-8")?;
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }

    /// Replaces this process with the runtime, only returns if that failed
    fn replace(&self, args: Vec<String>) -> anyhow::Error {
        info!("exec {} {:?}", self.config.runtime, args);

        let err = Command::new(&self.config.runtime).args(&args).exec();
        anyhow::Error::new(err).context(format!("failed to exec {}", self.config.runtime))
    }

    pub fn ps_args(&self) -> Vec<String> {
        vec![
            String::from("ps"),
            String::from("--quiet"),
            String::from("--filter"),
            format!("name={}", self.config.name),
        ]
    }

    /// Id of the running container, if any
    pub fn find_running(&self) -> anyhow::Result<Option<String>> {
        let id = self.first_line(&self.ps_args())?;
        Ok(Some(id).filter(|id| !id.is_empty()))
    }

    pub fn create_args(
        &self,
        identity: Identity,
        workdir: &Path,
        home: &Path,
        command: &[String],
    ) -> Vec<String> {
        let config = self.config;

        let mut args = vec![
            String::from("create"),
            String::from("--tty"),
            String::from("--interactive"),
            format!("--name={}", config.name),
            String::from("--rm=true"),
        ];
        args.extend(config.env.iter().map(|e| format!("--env={}", e)));
        args.extend(config.publish.iter().map(|p| format!("--publish={}", p)));
        args.push(format!("--user={}:{}", identity.uid, identity.gid));
        args.push(format!(
            "--volume={}:{}",
            workdir.display(),
            config.workdir_mount
        ));
        args.push(format!("--volume={}:{}", home.display(), config.home_mount));
        args.push(config.image.clone());
        args.extend(command.iter().cloned());

        args
    }

    /// Creates (but does not start) the container
    pub fn create(
        &self,
        identity: Identity,
        workdir: &Path,
        home: &Path,
        command: &[String],
    ) -> anyhow::Result<String> {
        let id = self.first_line(&self.create_args(identity, workdir, home, command))?;
        if id.is_empty() {
            bail!("{} create printed no container id", self.config.runtime);
        }

        info!("created container {}", id);
        Ok(id)
    }

    pub fn start(&self, id: &str) -> anyhow::Result<String> {
        self.first_line(&[String::from("start"), id.to_string()])
    }

    pub fn stop(&self, id: &str) -> anyhow::Result<()> {
        let output = self.first_line(&[String::from("stop"), id.to_string()])?;

        // the runtime echoes what it stopped
        if output != id {
            bail!("Error stopping the container: {}", output);
        }
        Ok(())
    }

    pub fn start_attached(&self, id: &str) -> anyhow::Error {
        self.replace(vec![
            String::from("start"),
            String::from("--interactive"),
            String::from("--attach"),
            id.to_string(),
        ])
    }

    pub fn attach(&self, id: &str) -> anyhow::Error {
        self.replace(vec![String::from("attach"), id.to_string()])
    }

    pub fn exec(&self, id: &str, command: &[String]) -> anyhow::Error {
        let mut args = vec![
            String::from("exec"),
            String::from("--interactive"),
            String::from("--tty"),
            id.to_string(),
        ];
        args.extend(command.iter().cloned());

        self.replace(args)
    }
}
