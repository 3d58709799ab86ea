//! Client-side error type.

use kfarms_core::FarmError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The program rejected the transaction.
    #[error("program error: {0}")]
    Program(#[from] FarmError),

    #[error("transport error: {0}")]
    Transport(String),

    /// JSON-RPC error that does not carry a program error code.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config error: {0}")]
    Config(String),
}

impl ClientError {
    /// The program error behind this failure, if any.
    pub fn program_error(&self) -> Option<FarmError> {
        match self {
            ClientError::Program(e) => Some(*e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::InvalidInput(format!("malformed json: {e}"))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
