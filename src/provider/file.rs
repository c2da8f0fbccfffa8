use std::{
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{AccessKind, AccessMode, ModifyKind},
};
use tokio::{fs, sync::mpsc};
use tracing::debug;

use super::{CibConnection, CibEvent, CibProvider, ProviderError};

// Reads the CIB from an XML file, watching it for changes.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileProvider { path: path.into() }
    }
}

#[async_trait]
impl CibProvider for FileProvider {
    async fn open(&self) -> Result<Box<dyn CibConnection>, ProviderError> {
        // Watcher events carry absolute paths.
        let path = fs::canonicalize(&self.path).await?;
        if !fs::metadata(&path).await?.is_file() {
            return Err(ProviderError::Unavailable(format!(
                "{} is not a file",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Opened CIB file.");
        Ok(Box::new(FileConnection {
            path,
            watcher: Mutex::new(None),
        }))
    }
}

pub struct FileConnection {
    path: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

#[async_trait]
impl CibConnection for FileConnection {
    async fn query(&self) -> Result<String, ProviderError> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    async fn subscribe(
        &self,
        events: mpsc::UnboundedSender<CibEvent>,
    ) -> Result<(), ProviderError> {
        let directory = self
            .path
            .parent()
            .ok_or_else(|| ProviderError::Unavailable("CIB file has no parent directory".into()))?;
        let path = self.path.clone();
        // Watch the directory rather than the file, so that atomic replacements are seen.
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Some(event) = file_event(&path, res) {
                    let _ = events.send(event);
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(directory, RecursiveMode::NonRecursive)?;
        *self
            .watcher
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(watcher);
        Ok(())
    }
}

// Turn a watcher notification into an event for the watched file, if it concerns it.
fn file_event(path: &Path, res: notify::Result<Event>) -> Option<CibEvent> {
    let event = match res {
        Ok(event) => event,
        Err(error) => return Some(CibEvent::Disconnected(error.to_string())),
    };
    if !event.paths.iter().any(|changed| changed == path) {
        return None;
    }
    match event.kind {
        EventKind::Remove(_) => Some(CibEvent::Disconnected(format!(
            "{} was removed",
            path.display()
        ))),
        kind if completes_write(&kind) => match std::fs::read_to_string(path) {
            Ok(document) => Some(CibEvent::Updated(document)),
            // Renamed away.
            Err(error) if error.kind() == io::ErrorKind::NotFound => Some(
                CibEvent::Disconnected(format!("{} was removed", path.display())),
            ),
            Err(error) => Some(CibEvent::Disconnected(error.to_string())),
        },
        _ => None,
    }
}

// Whether the file's contents are whole after this kind of event. Truncation and each chunk of
// a write fire their own modification events, so only closing a written file or moving a file
// into place counts.
fn completes_write(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write))
        | EventKind::Modify(ModifyKind::Name(_)) => true,
        // Backends without close notifications only report creation and modification.
        #[cfg(not(target_os = "linux"))]
        EventKind::Create(_) | EventKind::Modify(_) => true,
        _ => false,
    }
}
