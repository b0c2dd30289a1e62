use anyhow::Context;
use serde::Deserialize;
use std::{fs, path::Path};

/// How files get in and out of the container
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, strum::EnumString, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransportKind {
    /// `<runtime> cp`
    #[default]
    Cli,
    /// engine api socket
    Api,
}

/// Which container to manage and how to create it.
///
/// Every field can come from a json file, the command line wins over it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// runtime binary, `docker` or anything with the same cli
    pub runtime: String,
    /// container name
    pub name: String,
    pub image: String,
    pub transport: TransportKind,
    /// `--publish` values
    pub publish: Vec<String>,
    /// host environment variables passed through with `--env`
    pub env: Vec<String>,
    /// where the current directory shows up
    pub workdir_mount: String,
    /// where the home directory shows up, also the home of `user`
    pub home_mount: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            runtime: String::from("docker"),
            name: String::from("gollum-adoc"),
            image: String::from("stodh/gollum-adoc"),
            transport: TransportKind::Cli,
            publish: vec![String::from("4000:4000")],
            env: vec![String::from("LANG")],
            workdir_mount: String::from("/documents"),
            home_mount: String::from("/user"),
        }
    }
}

/// Command line values, `None` means "not given"
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub runtime: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub transport: Option<TransportKind>,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// defaults < file < command line
    pub fn resolve(file: Option<&Path>, overrides: Overrides) -> anyhow::Result<Self> {
        let base = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        Ok(base.apply(overrides))
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        let Overrides {
            runtime,
            name,
            image,
            transport,
        } = overrides;

        if let Some(runtime) = runtime {
            self.runtime = runtime;
        }
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(image) = image {
            self.image = image;
        }
        if let Some(transport) = transport {
            self.transport = transport;
        }

        self
    }
}
