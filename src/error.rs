use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Local form problems, caught before anything touches the network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no file selected")]
    MissingFile,
    #[error("no name or roll number entered")]
    MissingLabel,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered with {status}")]
    Status { endpoint: &'static str, status: StatusCode },

    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid server url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;
