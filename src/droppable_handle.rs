use std::future::Future;

use tokio::task::JoinHandle;

#[derive(Debug)]
// Join handle for a background task, which is aborted when the handle is dropped.
pub(crate) struct DroppableHandle<T>(pub(crate) JoinHandle<T>);

impl<T: Send + 'static> DroppableHandle<T> {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        DroppableHandle(tokio::spawn(future))
    }
}

impl<T> Drop for DroppableHandle<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
