use thiserror::Error;

use crate::hostlist::HostlistError;

#[derive(Error, Debug)]
pub enum SbenchError {
    #[error("Cluster directory unavailable: {0}")]
    DirectoryUnavailable(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Failed to launch job on {nodelist}: {source}")]
    LaunchFailed {
        nodelist: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed node range: {0}")]
    Hostlist(#[from] HostlistError),
}
