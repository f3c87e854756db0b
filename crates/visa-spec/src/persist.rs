//! Debounced, fire-and-forget persistence of individual answers.
//!
//! Every edit schedules a delayed write for its field. A newer edit of the same field
//! before the delay elapses cancels the pending write and restarts the timer, so only
//! the latest value is sent. Failures are logged and never retried on their own.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;

/// One answer handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistEntry {
    pub field_id: String,
    pub label: String,
    pub value: Value,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("persistence transport failed: {0}")]
    Transport(String),
    #[error("persistence io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode answer: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DebounceError {
    #[error("debounced persistence needs a tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

#[async_trait]
pub trait AnswerPersister: Send + Sync + 'static {
    async fn persist(&self, entry: PersistEntry) -> Result<(), PersistError>;
}

struct Pending {
    generation: u64,
    entry: PersistEntry,
    handle: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<String, Pending>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<String, Pending>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-field debounce timers in front of an [`AnswerPersister`].
///
/// Pending timers are aborted when the debouncer is disposed or dropped, so nothing is
/// written after the owning wizard goes away.
pub struct Debouncer {
    persister: Arc<dyn AnswerPersister>,
    delay: Duration,
    runtime: Handle,
    pending: PendingMap,
    generation: u64,
}

impl Debouncer {
    /// Binds to the tokio runtime the caller is running in.
    pub fn new(persister: Arc<dyn AnswerPersister>, delay: Duration) -> Result<Self, DebounceError> {
        Ok(Self::with_handle(persister, delay, Handle::try_current()?))
    }

    pub fn with_handle(persister: Arc<dyn AnswerPersister>, delay: Duration, runtime: Handle) -> Self {
        Self {
            persister,
            delay,
            runtime,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules `entry`, replacing any write still pending for the same field.
    pub fn schedule(&mut self, entry: PersistEntry) {
        self.generation += 1;
        let generation = self.generation;
        let key = entry.field_id.clone();

        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.remove(&key) {
            previous.handle.abort();
        }

        let delay = self.delay;
        let persister = Arc::clone(&self.persister);
        let shared = Arc::clone(&self.pending);
        let task_key = key.clone();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let due = {
                let mut pending = lock(&shared);
                match pending.get(&task_key) {
                    Some(slot) if slot.generation == generation => {
                        pending.remove(&task_key).map(|slot| slot.entry)
                    }
                    _ => None,
                }
            };
            if let Some(entry) = due {
                write(persister.as_ref(), entry).await;
            }
        });

        pending.insert(
            key,
            Pending {
                generation,
                entry,
                handle,
            },
        );
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Cancels all timers and writes their entries immediately.
    pub async fn flush(&self) {
        let due: Vec<PersistEntry> = {
            let mut pending = lock(&self.pending);
            pending
                .drain()
                .map(|(_, slot)| {
                    slot.handle.abort();
                    slot.entry
                })
                .collect()
        };
        for entry in due {
            write(self.persister.as_ref(), entry).await;
        }
    }

    /// Cancels all timers without writing.
    pub fn dispose(&mut self) {
        let mut pending = lock(&self.pending);
        for (_, slot) in pending.drain() {
            slot.handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.pending_count())
            .finish()
    }
}

async fn write(persister: &dyn AnswerPersister, entry: PersistEntry) {
    let field_id = entry.field_id.clone();
    match persister.persist(entry).await {
        Ok(()) => tracing::debug!(field = %field_id, "answer persisted"),
        Err(err) => tracing::warn!(field = %field_id, %err, "failed to persist answer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        entries: Mutex<Vec<PersistEntry>>,
    }

    impl Recorder {
        fn values(&self) -> Vec<(String, Value)> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .map(|entry| (entry.field_id.clone(), entry.value.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl AnswerPersister for Recorder {
        async fn persist(&self, entry: PersistEntry) -> Result<(), PersistError> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Failing {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl AnswerPersister for Failing {
        async fn persist(&self, _entry: PersistEntry) -> Result<(), PersistError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(PersistError::Transport("offline".into()))
        }
    }

    fn entry(field: &str, value: Value) -> PersistEntry {
        PersistEntry {
            field_id: field.into(),
            label: field.into(),
            value,
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test(start_paused = true)]
    async fn only_latest_value_survives_the_window() {
        let recorder = Arc::new(Recorder::default());
        let mut debouncer = Debouncer::new(recorder.clone(), ms(500)).unwrap();

        debouncer.schedule(entry("surname", json!("Sm")));
        tokio::time::sleep(ms(300)).await;
        debouncer.schedule(entry("surname", json!("Smith")));
        tokio::time::sleep(ms(300)).await;
        assert!(recorder.values().is_empty());

        tokio::time::sleep(ms(300)).await;
        assert_eq!(recorder.values(), vec![("surname".to_string(), json!("Smith"))]);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fields_are_debounced_independently() {
        let recorder = Arc::new(Recorder::default());
        let mut debouncer = Debouncer::new(recorder.clone(), ms(500)).unwrap();

        debouncer.schedule(entry("surname", json!("Smith")));
        debouncer.schedule(entry("city", json!("Lyon")));
        tokio::time::sleep(ms(600)).await;

        let mut values = recorder.values();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            values,
            vec![
                ("city".to_string(), json!("Lyon")),
                ("surname".to_string(), json!("Smith"))
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_pending_writes() {
        let recorder = Arc::new(Recorder::default());
        let mut debouncer = Debouncer::new(recorder.clone(), ms(500)).unwrap();
        debouncer.schedule(entry("surname", json!("Smith")));
        drop(debouncer);

        tokio::time::sleep(ms(1_000)).await;
        assert!(recorder.values().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_immediately() {
        let recorder = Arc::new(Recorder::default());
        let mut debouncer = Debouncer::new(recorder.clone(), ms(500)).unwrap();
        debouncer.schedule(entry("surname", json!("Smith")));
        debouncer.flush().await;
        assert_eq!(recorder.values().len(), 1);

        tokio::time::sleep(ms(1_000)).await;
        assert_eq!(recorder.values().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_not_retried_until_next_edit() {
        let failing = Arc::new(Failing::default());
        let mut debouncer = Debouncer::new(failing.clone(), ms(500)).unwrap();

        debouncer.schedule(entry("surname", json!("Smith")));
        tokio::time::sleep(ms(2_000)).await;
        assert_eq!(failing.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.pending_count(), 0);

        debouncer.schedule(entry("surname", json!("Smyth")));
        tokio::time::sleep(ms(600)).await;
        assert_eq!(failing.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn requires_a_runtime() {
        let recorder: Arc<dyn AnswerPersister> = Arc::new(Recorder::default());
        assert!(matches!(
            Debouncer::new(recorder, ms(10)),
            Err(DebounceError::NoRuntime(_))
        ));
    }
}
