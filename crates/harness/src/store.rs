use std::sync::{Arc, Mutex};

use scimeta_engine::{
    ChangeEvent, ChangeKind, Engine, EngineConfig, EngineError, Notifier, NotifyError,
};
use scimeta_storage::SqliteStorage;
use tempfile::TempDir;

pub const ADMIN: &str = "admin@ssds.example.org";

/// Keeps every delivered notification for later inspection.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<ChangeEvent>>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        let mut events = self.events.lock().map_err(|_| NotifyError::Delivery {
            recipient: event.recipient.clone(),
            reason: "recorder poisoned".into(),
        })?;
        events.push(event.clone());
        Ok(())
    }
}

/// Rejects every notification.
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery {
            recipient: event.recipient.clone(),
            reason: "smtp unavailable".into(),
        })
    }
}

/// An engine over a private store with a recording notifier attached.
pub struct TestStore {
    pub engine: Engine<SqliteStorage>,
    pub notifier: RecordingNotifier,
}

impl TestStore {
    /// In-memory store, admin notifications on.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(EngineConfig {
            admin_address: Some(ADMIN.into()),
            ..EngineConfig::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        let notifier = RecordingNotifier::default();
        let engine = Engine::open_in_memory(config)?.with_notifier(notifier.clone());
        Ok(Self { engine, notifier })
    }

    /// Store backed by the SQLite file `scimeta.db` inside `dir`. Reopening
    /// the same directory sees earlier commits.
    pub fn in_dir(dir: &TempDir) -> Result<Self, EngineError> {
        let path = dir.path().join("scimeta.db");
        let notifier = RecordingNotifier::default();
        let engine = Engine::open(&path.to_string_lossy(), EngineConfig::default())?
            .with_notifier(notifier.clone());
        Ok(Self { engine, notifier })
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.notifier.events()
    }

    /// Delivered events of one change kind.
    pub fn events_of(&self, change: ChangeKind) -> Vec<ChangeEvent> {
        self.events().into_iter().filter(|e| e.change == change).collect()
    }
}
