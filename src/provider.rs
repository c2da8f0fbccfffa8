use std::{io, process::ExitStatus};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

pub use self::{
    cibadmin::{CibadminConnection, CibadminProvider},
    file::{FileConnection, FileProvider},
};

mod cibadmin;
mod file;

/// Events delivered by a subscribed [`CibConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CibEvent {
    /// The document changed; this is its new contents.
    Updated(String),
    /// The connection to the provider was lost.
    Disconnected(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Command exited with {status}: {stderr}")]
    Command { status: ExitStatus, stderr: String },
    #[error("Document is not valid UTF-8")]
    InvalidDocument(#[from] std::string::FromUtf8Error),
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),
    #[error("Timed out waiting for provider")]
    Timeout,
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// A source of the CIB that connections can be opened against.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CibProvider: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CibConnection>, ProviderError>;
}

/// An open connection to a CIB provider.
///
/// Dropping the connection cancels its subscription.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CibConnection: Send + Sync {
    /// Fetch the whole current document.
    async fn query(&self) -> Result<String, ProviderError>;

    /// Start delivering change and disconnect events into `events`.
    async fn subscribe(&self, events: mpsc::UnboundedSender<CibEvent>)
    -> Result<(), ProviderError>;
}
