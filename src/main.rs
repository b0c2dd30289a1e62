use std::{path::PathBuf, process::ExitCode};

use gollum_launch::{
    config::{Config, Overrides, TransportKind},
    launcher::{self, Request, RequestError},
};
use tracing_subscriber::EnvFilter;

#[derive(argh::FromArgs)]
/// manage the gollum-adoc container: start, stop, status, attach, exec, run
struct Arguments {
    #[argh(option, short = 'r')]
    /// container runtime binary (default: docker)
    runtime: Option<String>,

    #[argh(option, short = 'n')]
    /// container name (default: gollum-adoc)
    name: Option<String>,

    #[argh(option, short = 'i')]
    /// image to create the container from
    image: Option<String>,

    #[argh(option, short = 't')]
    /// how files are copied into the container: cli or api
    transport: Option<TransportKind>,

    #[argh(option, short = 'c')]
    /// json config file
    config: Option<PathBuf>,

    #[argh(positional, greedy)]
    /// operation, then the command for exec and run (passed on untouched)
    args: Vec<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Arguments {
        runtime,
        name,
        image,
        transport,
        config,
        args,
    } = argh::from_env();

    let config = Config::resolve(
        config.as_deref(),
        Overrides {
            runtime,
            name,
            image,
            transport,
        },
    )?;

    let request = match Request::parse(&args) {
        Ok(request) => request,
        Err(RequestError::Unknown(_)) => {
            let program = std::env::args().next().unwrap_or_else(|| String::from("gollum-launch"));
            println!("{}", launcher::usage(&program));
            return Ok(ExitCode::SUCCESS);
        }
        Err(e @ RequestError::MissingCommand(_)) => {
            println!("{}", e);
            return Ok(ExitCode::SUCCESS);
        }
    };

    launcher::launch(&config, request)
}
