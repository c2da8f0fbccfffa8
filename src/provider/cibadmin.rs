use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use bon::Builder;
use tokio::{process::Command, sync::mpsc, time::sleep};
use tracing::{debug, info};

use crate::droppable_handle::DroppableHandle;

use super::{CibConnection, CibEvent, CibProvider, ProviderError};

// Reads the CIB through Pacemaker's `cibadmin` tool, polling it for changes.
#[derive(Builder, Debug, Clone)]
pub struct CibadminProvider {
    // Path to the cibadmin executable.
    #[builder(into)]
    path: PathBuf,
    // How often a subscribed connection re-queries the CIB.
    poll_interval: Duration,
    // Upper bound for a single cibadmin invocation.
    command_timeout: Duration,
}

#[async_trait]
impl CibProvider for CibadminProvider {
    async fn open(&self) -> Result<Box<dyn CibConnection>, ProviderError> {
        // A successful query means the CIB manager is reachable.
        query_cib(&self.path, self.command_timeout).await?;
        debug!(path = %self.path.display(), "Connected to CIB through cibadmin.");
        Ok(Box::new(CibadminConnection {
            provider: self.clone(),
            poller: Mutex::new(None),
        }))
    }
}

pub struct CibadminConnection {
    provider: CibadminProvider,
    poller: Mutex<Option<DroppableHandle<()>>>,
}

#[async_trait]
impl CibConnection for CibadminConnection {
    async fn query(&self) -> Result<String, ProviderError> {
        query_cib(&self.provider.path, self.provider.command_timeout).await
    }

    async fn subscribe(
        &self,
        events: mpsc::UnboundedSender<CibEvent>,
    ) -> Result<(), ProviderError> {
        let mut last = self.query().await?;
        let CibadminProvider {
            path,
            poll_interval,
            command_timeout,
        } = self.provider.clone();
        let poller = DroppableHandle::spawn(async move {
            loop {
                sleep(poll_interval).await;
                match query_cib(&path, command_timeout).await {
                    Ok(document) if document == last => (),
                    Ok(document) => {
                        last = document.clone();
                        if events.send(CibEvent::Updated(document)).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        info!(%error, "Lost connection to CIB.");
                        let _ = events.send(CibEvent::Disconnected(error.to_string()));
                        break;
                    }
                }
            }
        });
        // Replacing a previous poller aborts it.
        *self
            .poller
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(poller);
        Ok(())
    }
}

// Run `cibadmin --query --local` and return its output.
async fn query_cib(path: &Path, command_timeout: Duration) -> Result<String, ProviderError> {
    let output = tokio::time::timeout(
        command_timeout,
        Command::new(path)
            .args(["--query", "--local"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| ProviderError::Timeout)??;
    if !output.status.success() {
        return Err(ProviderError::Command {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8(output.stdout)?)
}
