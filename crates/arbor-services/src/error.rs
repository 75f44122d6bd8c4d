//! Errors raised while instantiating services

use arbor_core::{BuildError, PathError, TreeError};
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Registry(#[from] BuildError),
    #[error(transparent)]
    DuplicateName(#[from] TreeError),
    #[error("Root path of service {service} does not resolve: {source}")]
    RootPath {
        service: String,
        #[source]
        source: PathError,
    },
    #[error("Failed to bind {scheme} service on {addr}: {source}")]
    Bind {
        scheme: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to launch MQTT broker {command:?}: {source}")]
    BrokerLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("MQTT broker {command:?} exited with {status}")]
    BrokerExit { command: String, status: ExitStatus },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
