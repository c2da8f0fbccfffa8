use std::{
    mem,
    num::NonZero,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bon::Builder;
use tokio::{
    sync::{mpsc, watch},
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::provider::{CibConnection, CibEvent, CibProvider};

/// Delay between attempts to reach the CIB provider.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Consecutive subscribe failures tolerated before reopening the provider connection.
pub const DEFAULT_SUBSCRIBE_ATTEMPTS: NonZero<usize> = NonZero::new(5).unwrap();

/// The last known CIB document, shared between the sync task and HTTP handlers.
///
/// Reads return a copy, so a writer never waits on what a reader does with the document.
#[derive(Debug, Default)]
pub struct CibCache {
    document: Mutex<String>,
}

impl CibCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the document. The previous value is freed after the lock is released.
    pub fn write(&self, document: String) {
        let previous = mem::replace(&mut *self.lock(), document);
        drop(previous);
    }

    /// The most recently written document, or an empty string before the first write.
    pub fn read(&self) -> String {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        // Assignments can't be interrupted halfway, so a poisoned value is still whole.
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Where the sync task is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    ConnectedSyncing,
    ConnectedSubscribed,
}

/// Keeps a [`CibCache`] in sync with a [`CibProvider`], reconnecting forever.
#[derive(Builder)]
pub struct CibSync<P: CibProvider> {
    provider: P,
    cache: Arc<CibCache>,
    // Delay after a failed open or subscribe.
    #[builder(default = DEFAULT_RETRY_INTERVAL)]
    retry_interval: Duration,
    // Consecutive subscribe failures after which the connection is considered lost.
    #[builder(default = DEFAULT_SUBSCRIBE_ATTEMPTS)]
    subscribe_attempts: NonZero<usize>,
    #[builder(skip = watch::channel(SyncState::Disconnected).0)]
    state: watch::Sender<SyncState>,
}

impl<P: CibProvider> CibSync<P> {
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Run the sync loop. Never returns; cancel it by dropping the future.
    pub async fn run(&self) {
        loop {
            self.sync_connection().await;
            self.state.send_replace(SyncState::Disconnected);
        }
    }

    // Go through a single connection to the provider, returning once it's lost.
    async fn sync_connection(&self) {
        let connection = match self.provider.open().await {
            Ok(connection) => connection,
            Err(error) => {
                warn!(%error, "Failed to connect to CIB provider.");
                sleep(self.retry_interval).await;
                return;
            }
        };
        self.state.send_replace(SyncState::ConnectedSyncing);
        match connection.query().await {
            Ok(document) => {
                info!("Got new CIB, writing to cache.");
                self.cache.write(document);
            }
            // The connection may still deliver updates.
            Err(error) => warn!(%error, "Failed to query CIB."),
        }
        let Some(mut events) = self.subscribe(connection.as_ref()).await else {
            return;
        };
        self.state.send_replace(SyncState::ConnectedSubscribed);
        while let Some(event) = events.recv().await {
            match event {
                CibEvent::Updated(document) => {
                    info!("Got new CIB update event, writing to cache.");
                    self.cache.write(document);
                }
                CibEvent::Disconnected(reason) => {
                    info!(%reason, "Lost connection to CIB provider.");
                    return;
                }
            }
        }
        info!("CIB provider stopped sending events.");
    }

    // Subscribe to the connection's events, retrying a limited number of times.
    async fn subscribe(
        &self,
        connection: &dyn CibConnection,
    ) -> Option<mpsc::UnboundedReceiver<CibEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for attempt in 1..=self.subscribe_attempts.get() {
            match connection.subscribe(tx.clone()).await {
                Ok(()) => return Some(rx),
                Err(error) => {
                    warn!(
                        %error,
                        attempt,
                        retry_in = ?self.retry_interval,
                        "Failed to subscribe to CIB."
                    );
                    sleep(self.retry_interval).await;
                }
            }
        }
        debug!("Giving up on subscribing; reconnecting to CIB provider.");
        None
    }
}
