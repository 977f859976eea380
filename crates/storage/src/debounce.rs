use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use tokio::{sync::Mutex as WriteLock, task::JoinHandle};
use tracing::{debug, error};

use crate::KeyValueStore;

#[derive(Default)]
struct PendingWrite {
    value: Option<String>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Coalesces writes to one storage key: each `schedule` restarts the delay
/// and only the last value scheduled inside a quiet window is written.
/// Pending work is owned by the writer and released through `flush` or
/// `cancel`.
///
/// Every store write for the key happens under `write_lock`, so a timer write
/// already in progress finishes before `flush` or `clear` touches the key.
pub struct DebouncedWriter {
    store: Arc<dyn KeyValueStore>,
    key: String,
    delay: Duration,
    pending: Arc<Mutex<PendingWrite>>,
    write_lock: Arc<WriteLock<()>>,
}

impl DebouncedWriter {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, delay: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            delay,
            pending: Arc::new(Mutex::new(PendingWrite::default())),
            write_lock: Arc::new(WriteLock::new(())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn has_pending(&self) -> bool {
        self.lock().value.is_some()
    }

    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, value: String) {
        let mut pending = self.lock();
        pending.value = Some(value);
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        let generation = pending.generation;
        let slot = Arc::clone(&self.pending);
        let write_lock = Arc::clone(&self.write_lock);
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let delay = self.delay;
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _writing = write_lock.lock().await;
            let value = {
                let mut pending = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if pending.generation != generation {
                    return;
                }
                pending.timer = None;
                pending.value.take()
            };
            if let Some(value) = value {
                match store.set_item(&key, &value).await {
                    Ok(()) => debug!(key = %key, bytes = value.len(), "debounced write flushed"),
                    Err(err) => error!(key = %key, "debounced write failed: {err:#}"),
                }
            }
        }));
    }

    /// Writes the pending value now, if there is one.
    pub async fn flush(&self) -> Result<()> {
        let value = {
            let mut pending = self.lock();
            if let Some(timer) = pending.timer.take() {
                timer.abort();
            }
            pending.generation += 1;
            pending.value.take()
        };
        let _writing = self.write_lock.lock().await;
        if let Some(value) = value {
            self.store.set_item(&self.key, &value).await?;
        }
        Ok(())
    }

    /// Drops the pending value without writing it.
    pub fn cancel(&self) {
        let mut pending = self.lock();
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.generation += 1;
        pending.value = None;
    }

    /// Cancels anything pending and deletes the stored value once any write
    /// already in progress has landed.
    pub async fn clear(&self) -> Result<()> {
        self.cancel();
        let _writing = self.write_lock.lock().await;
        self.store.remove_item(&self.key).await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PendingWrite> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
