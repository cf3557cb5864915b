use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use parley_db::Database;
use parley_types::events::ServerEvent;
use parley_types::models::Presence;

/// Live mapping from user id to the connection that can reach them.
///
/// This is the only in-memory shared mutable structure in the service; the
/// user row mirrors status and connection id so the rest of the system can
/// read presence without touching the map.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    db: Arc<Database>,

    /// user_id -> (conn_id, targeted sender)
    channels: RwLock<HashMap<String, (Uuid, mpsc::UnboundedSender<ServerEvent>)>>,
}

impl Registry {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                db,
                channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a connection for a user and mark them online. The latest
    /// connection wins; an earlier registration is displaced.
    pub async fn register(
        &self,
        user_id: &str,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<Uuid> {
        let conn_id = Uuid::new_v4();
        self.inner
            .channels
            .write()
            .await
            .insert(user_id.to_string(), (conn_id, tx));

        self.inner
            .db
            .set_presence(user_id, Presence::Online, Some(&conn_id.to_string()))?;

        Ok(conn_id)
    }

    /// Resolve the live handle for a user. Absence means "cannot notify
    /// now", not an error.
    pub async fn resolve(&self, user_id: &str) -> Option<mpsc::UnboundedSender<ServerEvent>> {
        self.inner
            .channels
            .read()
            .await
            .get(user_id)
            .map(|(_, tx)| tx.clone())
    }

    /// Best-effort targeted delivery. `false` means the notification was
    /// dropped: no live connection, or one that is already going away.
    /// There is no queue and no retry.
    pub async fn notify(&self, user_id: &str, event: ServerEvent) -> bool {
        match self.resolve(user_id).await {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                debug!("No live connection for {}, dropping notification", user_id);
                false
            }
        }
    }

    /// Release a registration, but only while `conn_id` still owns it; a
    /// stale disconnect must not tear down a newer connection. Returns
    /// whether anything was released.
    pub async fn release(&self, user_id: &str, conn_id: Uuid) -> Result<bool> {
        let removed = {
            let mut channels = self.inner.channels.write().await;
            match channels.get(user_id) {
                Some((stored, _)) if *stored == conn_id => {
                    channels.remove(user_id);
                    true
                }
                _ => false,
            }
        };

        if removed {
            self.inner.db.set_presence(user_id, Presence::Offline, None)?;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Arc<Database>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("test.db")).unwrap());
        db.ensure_user("1", "alice").unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn register_resolve_release_round_trip() {
        let (_dir, db) = test_db();
        let registry = Registry::new(db.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn_id = registry.register("1", tx).await.unwrap();

        assert!(registry.resolve("1").await.is_some());
        assert_eq!(db.get_user("1").unwrap().unwrap().status, Presence::Online);

        assert!(registry.notify("1", ServerEvent::Error { message: "ping".into() }).await);
        assert!(rx.recv().await.is_some());

        assert!(registry.release("1", conn_id).await.unwrap());
        assert!(registry.resolve("1").await.is_none());
        assert_eq!(db.get_user("1").unwrap().unwrap().status, Presence::Offline);
    }

    #[tokio::test]
    async fn notify_without_registration_reports_undelivered() {
        let (_dir, db) = test_db();
        let registry = Registry::new(db);

        let delivered = registry
            .notify("1", ServerEvent::Error { message: "ping".into() })
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn stale_release_leaves_newer_connection_registered() {
        let (_dir, db) = test_db();
        let registry = Registry::new(db.clone());

        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let old_conn = registry.register("1", old_tx).await.unwrap();

        let (new_tx, _new_rx) = mpsc::unbounded_channel();
        let _new_conn = registry.register("1", new_tx).await.unwrap();

        // The old connection's teardown races in after the reconnect.
        assert!(!registry.release("1", old_conn).await.unwrap());
        assert!(registry.resolve("1").await.is_some());
        assert_eq!(db.get_user("1").unwrap().unwrap().status, Presence::Online);
    }
}
