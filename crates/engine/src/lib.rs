pub mod cascade;
pub mod config;
pub mod error;
pub mod identity;
pub mod merge;
pub mod notify;
pub mod resolve;
pub mod session;
pub mod sync;

pub use config::{AmbiguousKeyPolicy, EngineConfig};
pub use error::EngineError;
pub use notify::{ChangeEvent, ChangeKind, LogNotifier, Notifier, NotifyError};
pub use session::{Session, UpsertOutcome};

use scimeta_core::{Entity, EntityId, FieldValue, Rel};
use scimeta_storage::{SqliteStorage, Storage};
use tracing::warn;

use crate::notify::PendingChange;

/// The reconciliation engine. Owns the store, the configuration and the
/// notification collaborator; every operation runs in its own transaction
/// unless grouped with [`Engine::transaction`].
pub struct Engine<S: Storage = SqliteStorage> {
    storage: S,
    config: EngineConfig,
    notifier: Box<dyn Notifier>,
}

impl Engine<SqliteStorage> {
    pub fn open(path: &str, config: EngineConfig) -> Result<Self, EngineError> {
        let storage = SqliteStorage::open(path).map_err(|source| EngineError::Transaction {
            operation: "open",
            source,
        })?;
        Ok(Self::new(storage, config))
    }

    pub fn open_in_memory(config: EngineConfig) -> Result<Self, EngineError> {
        let storage = SqliteStorage::open_in_memory().map_err(|source| EngineError::Transaction {
            operation: "open",
            source,
        })?;
        Ok(Self::new(storage, config))
    }
}

impl<S: Storage> Engine<S> {
    pub fn new(storage: S, config: EngineConfig) -> Self {
        Self {
            storage,
            config,
            notifier: Box::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Run `work` inside one store transaction and one identity map.
    ///
    /// Commits when `work` returns `Ok`, rolls back otherwise. Change
    /// notifications are delivered only after a successful commit.
    pub fn transaction<T>(
        &mut self,
        work: impl FnOnce(&mut Session<'_, S>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.storage
            .begin()
            .map_err(|source| EngineError::Transaction {
                operation: "begin",
                source,
            })?;

        let mut session = Session::new(&mut self.storage, &self.config);
        let result = work(&mut session);
        let pending = session.into_pending();

        match result {
            Ok(value) => {
                if let Err(source) = self.storage.commit() {
                    self.abandon();
                    return Err(EngineError::Transaction {
                        operation: "commit",
                        source,
                    });
                }
                self.deliver(&pending);
                Ok(value)
            }
            Err(err) => {
                self.abandon();
                Err(err)
            }
        }
    }

    fn abandon(&mut self) {
        if let Err(err) = self.storage.rollback() {
            warn!(error = %err, "rollback failed");
        }
    }

    fn deliver(&self, pending: &[PendingChange]) {
        for change in pending {
            for event in change.events(&self.config) {
                if let Err(err) = self.notifier.notify(&event) {
                    warn!(error = %err, subject = %event.subject(), "notification not delivered");
                }
            }
        }
    }

    // ========================================================================
    // Single-operation conveniences
    // ========================================================================

    pub fn upsert<T: Entity>(&mut self, entity: &T) -> Result<UpsertOutcome, EngineError> {
        self.transaction(|session| session.upsert(entity))
    }

    pub fn resolve<T: Entity>(
        &mut self,
        entity: &T,
        load_graph: bool,
    ) -> Result<Option<T>, EngineError> {
        self.transaction(|session| session.resolve(entity, load_graph))
    }

    pub fn delete<T: Entity>(&mut self, entity: &T) -> Result<bool, EngineError> {
        self.transaction(|session| session.delete(entity))
    }

    /// Detached deep copy; touches no store.
    pub fn deep_copy<T: Entity>(&self, entity: &T) -> T {
        entity.deep_copy()
    }

    pub fn deep_copy_persistent<T: Entity>(
        &mut self,
        entity: &T,
    ) -> Result<Option<T>, EngineError> {
        self.transaction(|session| session.deep_copy_persistent(entity))
    }

    pub fn find_by_id<T: Entity>(
        &mut self,
        id: EntityId,
        load_graph: bool,
    ) -> Result<Option<T>, EngineError> {
        self.transaction(|session| session.find_by_id(id, load_graph))
    }

    pub fn find_by_business_key<T: Entity>(
        &mut self,
        entity: &T,
        load_graph: bool,
    ) -> Result<Option<T>, EngineError> {
        self.transaction(|session| session.find_by_business_key(entity, load_graph))
    }

    pub fn find_all_ids<T: Entity>(&mut self) -> Result<Vec<EntityId>, EngineError> {
        self.transaction(|session| session.find_all_ids::<T>())
    }

    pub fn count<T: Entity>(&mut self) -> Result<u64, EngineError> {
        self.transaction(|session| session.count::<T>())
    }

    pub fn find_by_field<T: Entity>(
        &mut self,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Vec<T>, EngineError> {
        self.transaction(|session| session.find_by_field(field, value))
    }

    pub fn find_referencing<T: Entity, U: Entity>(
        &mut self,
        rel: Rel<T, U>,
        target: EntityId,
    ) -> Result<Vec<T>, EngineError> {
        self.transaction(|session| session.find_referencing(rel, target))
    }

    pub fn related<T: Entity, U: Entity>(
        &mut self,
        owner: EntityId,
        rel: Rel<T, U>,
    ) -> Result<Vec<U>, EngineError> {
        self.transaction(|session| session.related(owner, rel))
    }

    pub fn link<T: Entity, U: Entity>(
        &mut self,
        owner: EntityId,
        rel: Rel<T, U>,
        target: EntityId,
    ) -> Result<bool, EngineError> {
        self.transaction(|session| session.link(owner, rel, target))
    }

    pub fn unlink<T: Entity, U: Entity>(
        &mut self,
        owner: EntityId,
        rel: Rel<T, U>,
        target: EntityId,
    ) -> Result<bool, EngineError> {
        self.transaction(|session| session.unlink(owner, rel, target))
    }
}

impl<S: Storage> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("config", &self.config).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scimeta_core::{Device, Keyword};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<ChangeEvent>>>);

    impl Notifier for Capture {
        fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Refuse;

    impl Notifier for Refuse {
        fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery {
                recipient: event.recipient.clone(),
                reason: "mailbox full".into(),
            })
        }
    }

    fn admin_config() -> EngineConfig {
        EngineConfig {
            admin_address: Some("admin@x.org".into()),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn upsert_then_resolve() {
        let mut engine = Engine::open_in_memory(EngineConfig::default()).unwrap();
        let outcome = engine.upsert(&Keyword::named("ctd")).unwrap();
        assert!(outcome.created);

        let found = engine.resolve(&Keyword::named("ctd"), false).unwrap().unwrap();
        assert_eq!(found.id, Some(outcome.id));
        assert_eq!(found.version, Some(0));
    }

    #[test]
    fn events_follow_commit_only() {
        let capture = Capture::default();
        let mut engine = Engine::open_in_memory(admin_config())
            .unwrap()
            .with_notifier(capture.clone());

        let err = engine
            .transaction(|session| {
                session.upsert(&Keyword::named("ctd"))?;
                Err::<(), _>(EngineError::Config("abort".into()))
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(capture.0.lock().unwrap().is_empty());
        assert_eq!(engine.count::<Keyword>().unwrap(), 0);

        engine.upsert(&Keyword::named("ctd")).unwrap();
        let events = capture.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change, ChangeKind::Created);
        assert_eq!(events[0].recipient, "admin@x.org");
    }

    #[test]
    fn failed_delivery_does_not_fail_the_operation() {
        let mut engine = Engine::open_in_memory(admin_config()).unwrap().with_notifier(Refuse);
        let outcome = engine.upsert(&Device::with_uuid("abc-123")).unwrap();
        assert!(engine.find_by_id::<Device>(outcome.id, false).unwrap().is_some());
    }
}
