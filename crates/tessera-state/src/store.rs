//! StateStore — redb-backed status persistence for Tessera.
//!
//! Holds one record per deployment: the spec, the status and a version
//! counter bumped on every write. Compare-and-swap happens inside a single
//! write transaction, so concurrent writers see each other's versions.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::status::{StatusStore, Versioned};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeploymentRecord {
    spec: DeploymentSpec,
    status: DeploymentStatus,
    version: u64,
}

/// Which half of the record a compare-and-swap replaces.
enum Swap<'a> {
    Spec(&'a DeploymentSpec),
    Status(&'a DeploymentStatus),
}

/// Thread-safe status store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Deployments ────────────────────────────────────────────────

    /// Insert or replace a deployment spec, keeping any existing status.
    pub fn put_deployment(&self, name: &str, spec: &DeploymentSpec) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let existing = match table.get(name).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let record = match existing {
                Some(DeploymentRecord {
                    status, version, ..
                }) => DeploymentRecord {
                    spec: spec.clone(),
                    status,
                    version: version + 1,
                },
                None => DeploymentRecord {
                    spec: spec.clone(),
                    status: DeploymentStatus::default(),
                    version: 1,
                },
            };
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(name, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(deployment = %name, "deployment stored");
        Ok(())
    }

    pub fn get_deployment(&self, name: &str) -> StateResult<Option<Versioned>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?.into())),
            None => Ok(None),
        }
    }

    /// Names of all stored deployments.
    pub fn list_deployments(&self) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            results.push(key.value().to_string());
        }
        Ok(results)
    }

    /// Delete a deployment. Returns true if it existed.
    pub fn delete_deployment(&self, name: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            existed = table.remove(name).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(deployment = %name, existed, "deployment deleted");
        Ok(existed)
    }

    fn swap(&self, name: &str, version: &str, swap: Swap<'_>) -> StateResult<String> {
        let expected: u64 = version
            .parse()
            .map_err(|_| StateError::Conflict(format!("{name}: malformed version {version:?}")))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let next;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let mut record = match table.get(name).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(name.to_string())),
            };
            if record.version != expected {
                return Err(StateError::Conflict(name.to_string()));
            }
            match swap {
                Swap::Spec(spec) => record.spec = spec.clone(),
                Swap::Status(status) => record.status = status.clone(),
            }
            record.version += 1;
            next = record.version;
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(name, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(next.to_string())
    }
}

fn decode(bytes: &[u8]) -> StateResult<DeploymentRecord> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

impl From<DeploymentRecord> for Versioned {
    fn from(record: DeploymentRecord) -> Self {
        Versioned {
            spec: record.spec,
            status: record.status,
            version: record.version.to_string(),
        }
    }
}

#[async_trait]
impl StatusStore for StateStore {
    async fn read(&self, name: &str) -> StateResult<Versioned> {
        self.get_deployment(name)?
            .ok_or_else(|| StateError::NotFound(name.to_string()))
    }

    async fn compare_and_swap_status(
        &self,
        name: &str,
        version: &str,
        status: &DeploymentStatus,
    ) -> StateResult<String> {
        self.swap(name, version, Swap::Status(status))
    }

    async fn compare_and_swap_spec(
        &self,
        name: &str,
        version: &str,
        spec: &DeploymentSpec,
    ) -> StateResult<String> {
        self.swap(name, version, Swap::Spec(spec))
    }
}
