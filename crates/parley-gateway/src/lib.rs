pub mod connection;
pub mod handlers;
pub mod registry;

use std::sync::Arc;

use parley_db::Database;
use parley_storage::{ObjectStore, Spool};

use registry::Registry;

/// Shared state behind every gateway connection: the store handles plus
/// the presence registry.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Arc<Database>,
    pub registry: Registry,
    pub spool: Arc<Spool>,
    pub objects: Arc<dyn ObjectStore>,
}

impl GatewayState {
    pub fn new(db: Arc<Database>, spool: Arc<Spool>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            registry: Registry::new(db.clone()),
            db,
            spool,
            objects,
        }
    }
}
