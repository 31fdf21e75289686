use std::io;

use http::uri::InvalidUri;

use crate::{http::network::FetchError, worker::lifecycle::WorkerState};

#[allow(clippy::enum_variant_names)]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // from
    #[error("failed io {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode toml {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("failed to handle http {0}")]
    Http(#[from] http::Error),
    #[error("failed to convert url {0}")]
    InvalidUri(#[from] InvalidUri),
    #[error("failed to handle json {0}")]
    Json(#[from] serde_json::Error),
    #[error("fetch failed {0}")]
    Fetch(#[from] FetchError),

    #[error("invalid config: {0}")]
    Config(String),
    #[error("install failed on {url}: {reason}")]
    InstallFailed { url: String, reason: String },
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },
    #[error("cache storage error: {0}")]
    Storage(String),
    #[error("internal server error {0}")]
    Any(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = anyhow::Result<T, E>;
