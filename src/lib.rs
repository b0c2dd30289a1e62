pub mod archive;
pub mod config;
pub mod host;
pub mod identity;
pub mod launcher;
pub mod runtime;
