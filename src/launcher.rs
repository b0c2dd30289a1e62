//! Maps an operation name onto the container lifecycle.
//!
//! `start`, `exec`, `run` and `attach` create the container when it is not
//! running, provision the host user inside it and only then start it.

use anyhow::Context;
use std::{path::PathBuf, process::ExitCode, str::FromStr};
use tracing::info;

use crate::{
    config::{Config, TransportKind},
    host::{cli::Cli, docker::Engine, Transport},
    identity::{self, Identity},
    runtime::Runtime,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    /// start the container in the background
    Start,
    /// stop the container if it is running
    Stop,
    /// tell whether the container is running
    Status,
    /// attach to the container, starting it first if needed
    Attach,
    /// run an interactive command in the running container
    Exec,
    /// create the container with a command and run it in the foreground
    Run,
}

impl Operation {
    pub const DEFAULT: Operation = Operation::Attach;

    fn needs_command(self) -> bool {
        matches!(self, Operation::Exec | Operation::Run)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub operation: Operation,
    /// only used by `exec` and `run`
    pub command: Vec<String>,
}

/// Why a request could not be built, both are reported and exit cleanly
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("unknown operation `{0}`")]
    Unknown(String),
    #[error("The operation '{0}' needs a command for the container")]
    MissingCommand(Operation),
}

impl Request {
    pub fn parse(args: &[String]) -> Result<Self, RequestError> {
        let Some((first, rest)) = args.split_first() else {
            return Ok(Request {
                operation: Operation::DEFAULT,
                command: vec![],
            });
        };

        let operation =
            Operation::from_str(first).map_err(|_| RequestError::Unknown(first.clone()))?;

        if operation.needs_command() && rest.is_empty() {
            return Err(RequestError::MissingCommand(operation));
        }

        Ok(Request {
            operation,
            command: if operation.needs_command() {
                rest.to_vec()
            } else {
                vec![]
            },
        })
    }
}

pub fn usage(program: &str) -> String {
    use strum::IntoEnumIterator;

    let ops = Operation::iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join("|");

    format!(
        "Usage: {} [{}]\n\nIf no operation is given the default one is '{}'",
        program,
        ops,
        Operation::DEFAULT
    )
}

pub fn transport(config: &Config) -> anyhow::Result<Box<dyn Transport>> {
    Ok(match config.transport {
        TransportKind::Cli => Box::new(Cli::new(config.runtime.clone())),
        TransportKind::Api => {
            Box::new(Engine::connect().context("failed to connect to the engine api")?)
        }
    })
}

/// Creates, provisions and starts the container.
///
/// `run` never comes back from here when everything works, the runtime takes
/// over the process.
fn bring_up(rt: &Runtime, request: &Request) -> anyhow::Result<String> {
    let config = rt.config;
    let identity = Identity::effective();
    let workdir = std::env::current_dir().context("no current directory")?;
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .context("HOME is not set")?;

    let command: &[String] = if request.operation == Operation::Run {
        &request.command
    } else {
        &[]
    };
    let id = rt.create(identity, &workdir, &home, command)?;

    let transport = transport(config)?;
    identity::provision(transport.as_ref(), &id, identity, &config.home_mount)
        .with_context(|| {
            format!(
                "failed to set up user {}:{} in {}",
                identity.uid, identity.gid, id
            )
        })?;
    drop(transport);

    if request.operation == Operation::Run {
        return Err(rt.start_attached(&id));
    }

    println!("{}", rt.start(&id)?);
    Ok(id)
}

pub fn launch(config: &Config, request: Request) -> anyhow::Result<ExitCode> {
    let rt = Runtime::new(config);
    let name = &config.name;
    let running = rt.find_running()?;

    match (request.operation, running.as_deref()) {
        (Operation::Status | Operation::Stop, None) => {
            println!("Container '{}' not running", name);
            return Ok(ExitCode::SUCCESS);
        }
        (Operation::Status, Some(id)) => {
            println!("Container '{}' running with ID '{}'", name, id);
            return Ok(ExitCode::SUCCESS);
        }
        (Operation::Stop, Some(id)) => {
            println!("Stopping container '{}' running with ID '{}'", name, id);
            rt.stop(id)?;
            return Ok(ExitCode::SUCCESS);
        }
        (Operation::Start, Some(id)) => {
            println!("Container '{}' already running with ID '{}'", name, id);
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let fresh = running.is_none();
    let id = match running {
        Some(id) => id,
        None => bring_up(&rt, &request)?,
    };
    info!("using container {}", id);

    match request.operation {
        Operation::Start => {
            println!("Container '{}' started with ID '{}'", name, id);
            Ok(ExitCode::SUCCESS)
        }
        Operation::Attach => Err(rt.attach(&id)),
        Operation::Exec => Err(rt.exec(&id, &request.command)),
        Operation::Run if !fresh => {
            println!("Container '{}' is running with ID '{}'", name, id);
            println!(
                "Stop it and call 'run' again or use 'attach' and invoke the command interactively"
            );
            Ok(ExitCode::FAILURE)
        }
        // status and stop returned above, a fresh `run` was exec'd in bring_up
        Operation::Run | Operation::Status | Operation::Stop => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_attach() {
        assert_eq!(
            Request::parse(&[]),
            Ok(Request {
                operation: Operation::Attach,
                command: vec![],
            })
        );
    }

    #[test]
    fn operations() {
        for (name, op) in [
            ("start", Operation::Start),
            ("stop", Operation::Stop),
            ("status", Operation::Status),
            ("attach", Operation::Attach),
        ] {
            assert_eq!(Request::parse(&args(&[name])).unwrap().operation, op);
        }

        assert_eq!(
            Request::parse(&args(&["restart"])),
            Err(RequestError::Unknown(String::from("restart")))
        );
    }

    #[test]
    fn commands() {
        assert_eq!(
            Request::parse(&args(&["exec", "ls", "-la"])),
            Ok(Request {
                operation: Operation::Exec,
                command: args(&["ls", "-la"]),
            })
        );

        assert_eq!(
            Request::parse(&args(&["run"])),
            Err(RequestError::MissingCommand(Operation::Run))
        );
        assert_eq!(
            RequestError::MissingCommand(Operation::Exec).to_string(),
            "The operation 'exec' needs a command for the container"
        );

        // extra words after other operations are ignored
        assert!(Request::parse(&args(&["status", "now"]))
            .unwrap()
            .command
            .is_empty());
    }

    #[test]
    fn usage_lists_everything() {
        let text = usage("launch");
        assert!(text.starts_with("Usage: launch [start|stop|status|attach|exec|run]"));
        assert!(text.ends_with("the default one is 'attach'"));
    }

    #[test]
    fn cli_transport_uses_configured_runtime() {
        let config = Config {
            runtime: String::from("no-such-runtime-here"),
            ..Default::default()
        };

        let t = transport(&config).unwrap();
        let err = t.copy_out("abc", "/etc/group").unwrap_err();
        assert!(err.to_string().contains("no-such-runtime-here"));
    }
}
