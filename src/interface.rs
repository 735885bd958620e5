//! Thread-safe handle for callers that share one database.
//!
//! The engines assume a single writer, so every call here goes through one
//! mutex. Reads pinned to an `as_of` transaction stay repeatable while later
//! transactions are appended.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::construct::{Atom, Database, EntityId};
use crate::edn::Datum;
use crate::error::{GraphiteError, Result};
use crate::query::Rows;
use crate::store::AtomListing;
use crate::transact::TxReport;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub max_transaction_id: Option<EntityId>,
    pub max_entity_id: Option<EntityId>,
    pub atom_count: usize,
}

#[derive(Clone)]
pub struct SharedDatabase {
    database: Arc<Mutex<Database>>,
    next_id: Arc<AtomicU64>,
}

impl SharedDatabase {
    pub fn new(database: Database) -> Self {
        Self {
            database: Arc::new(Mutex::new(database)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
    /// Hands out increasing request ids, starting at 1.
    pub fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.database
            .lock()
            .map_err(|e| GraphiteError::Lock(e.to_string()))
    }
    pub fn transact(&self, request: &str) -> Result<TxReport> {
        self.lock()?.transact_str(request)
    }
    pub fn query(
        &self,
        query: &str,
        as_of: Option<EntityId>,
        params: &[Datum],
    ) -> Result<Option<Rows>> {
        self.lock()?.query_str(query, as_of, params)
    }
    pub fn stats(&self) -> Result<Stats> {
        let database = self.lock()?;
        Ok(Stats {
            max_transaction_id: database.max_transaction_id()?,
            max_entity_id: database.max_entity_id()?,
            atom_count: database.atom_count()?,
        })
    }
    pub fn identities(&self) -> Result<Vec<(EntityId, String)>> {
        self.lock()?.identities()
    }
    pub fn atoms(&self, listing: &AtomListing) -> Result<Vec<Atom>> {
        self.lock()?.atoms(listing)
    }
    /// Copies the current state into a separate, unshared database.
    pub fn snapshot(&self) -> Result<Database> {
        self.lock()?.clone_to_memory()
    }
}
