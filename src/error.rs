use std::sync::Arc;

use thiserror::Error;

use crate::model::DeviceData;

/// Errors returned by the WURFL Microservice client
#[derive(Debug, Error)]
pub enum WmError {
    /// Could not reach the server (DNS, connect, timeout, transfer failure)
    #[error("Connection to WM server failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body was not the JSON shape the server contract defines
    #[error("Failed to decode WM server response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Server answered with a non-success status and an undecodable body
    #[error("WM server returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Server embedded an error in an otherwise valid response.
    ///
    /// `device` keeps the metadata the server sent alongside the message
    /// (api version, timestamps, any capabilities).
    #[error("Received error from WM server: {message}")]
    Server {
        message: String,
        device: Arc<DeviceData>,
    },

    /// Endpoint parameters rejected before any connection was attempted
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    /// Info endpoint returned empty data or a wrong JSON format
    #[error("Server returned empty data or a wrong json format")]
    InvalidServerInfo,

    /// Requested key does not exist in an auxiliary table
    #[error("Error getting data from WM server: {kind} '{key}' does not exist")]
    NotFound { kind: &'static str, key: String },

    /// Client connection was destroyed
    #[error("WM client connection has been destroyed")]
    Closed,

    /// Operation aborted through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,
}

impl WmError {
    /// Partial device data attached to an application-level server error
    pub fn device_data(&self) -> Option<&Arc<DeviceData>> {
        match self {
            WmError::Server { device, .. } => Some(device),
            _ => None,
        }
    }

    /// Whether the error came from failing to reach the server
    pub fn is_connectivity(&self) -> bool {
        matches!(self, WmError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, WmError>;
