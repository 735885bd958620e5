// the lookups and identity maps hash with seahash
use core::hash::{BuildHasher, BuildHasherDefault};
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;
use seahash::SeaHasher;

// used to print out readable forms of a construct
use std::fmt;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

// our own stuff that we need
use crate::config::{Backend, DatabaseSettings};
use crate::datatype::Value;
use crate::edn::{self, Datum};
use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::persist::SqliteStore;
use crate::query::{Query, QueryEngine, Rows};
use crate::schema::{self, Namespace, SYSTEM_SCHEMA};
use crate::store::{AtomListing, AtomStore, MemoryStore};
use crate::transact::{TransactionEngine, TxReport};

// ------------- Entity -------------
pub type EntityId = u64;

pub type IdHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

/// The reserved attribute whose value is an entity's symbolic name.
pub const IDENTITY_ATTRIBUTE: EntityId = 0;
/// The highest id a store can hold; SQLite keeps ids as signed 64-bit integers.
pub const MAX_ENTITY_ID: EntityId = i64::MAX as EntityId;

/// An entity reference inside a transaction that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Resolved(EntityId),
    Placeholder(String),
}
impl EntityRef {
    /// Mints a placeholder for an entity that does not exist yet.
    pub fn generate() -> Self {
        EntityRef::Placeholder(Uuid::new_v4().simple().to_string())
    }
}
impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EntityRef::Resolved(e) => write!(f, "{}", e),
            EntityRef::Placeholder(token) => write!(f, "\"{}\"", token),
        }
    }
}

// ------------- Atom -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Atom {
    e: EntityId,
    a: EntityId,
    v: Value,
    t: EntityId,
    o: EntityId,
}
impl Atom {
    pub fn new(e: EntityId, a: EntityId, v: Value, t: EntityId, o: EntityId) -> Self {
        Self { e, a, v, t, o }
    }
    // Fields are only reachable through getters, which keeps an atom
    // immutable once it has been created.
    pub fn e(&self) -> EntityId {
        self.e
    }
    pub fn a(&self) -> EntityId {
        self.a
    }
    pub fn v(&self) -> &Value {
        &self.v
    }
    pub fn t(&self) -> EntityId {
        self.t
    }
    pub fn o(&self) -> EntityId {
        self.o
    }
}
impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{} {} {}::<{}> {} {}]",
            self.e,
            self.a,
            self.v,
            self.v.data_type(),
            self.t,
            self.o
        )
    }
}

// ------------- Pattern -------------
/// A partially bound atom; `None` positions match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pattern {
    pub e: Option<EntityId>,
    pub a: Option<EntityId>,
    pub v: Option<Value>,
    pub t: Option<EntityId>,
    pub o: Option<EntityId>,
}
impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn attribute(mut self, a: EntityId) -> Self {
        self.a = Some(a);
        self
    }
    pub fn value(mut self, v: impl Into<Value>) -> Self {
        self.v = Some(v.into());
        self
    }
    pub fn matches(&self, atom: &Atom) -> bool {
        self.e.is_none_or(|e| e == atom.e)
            && self.a.is_none_or(|a| a == atom.a)
            && self.v.as_ref().is_none_or(|v| *v == atom.v)
            && self.t.is_none_or(|t| t == atom.t)
            && self.o.is_none_or(|o| o == atom.o)
    }
}

// ------------- Lookups -------------
/// Maps a key to the positions (in insertion order) of everything filed under it.
#[derive(Debug)]
pub struct Lookup<K, V, H = RandomState> {
    index: HashMap<K, Vec<V>, H>,
}
impl<K: Eq + Hash, V, H: BuildHasher + Default> Lookup<K, V, H> {
    pub fn new() -> Self {
        Self {
            index: HashMap::<K, Vec<V>, H>::default(),
        }
    }
    pub fn insert(&mut self, key: K, value: V) {
        self.index.entry(key).or_default().push(value);
    }
    pub fn lookup(&self, key: &K) -> &[V] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}
impl<K: Eq + Hash, V, H: BuildHasher + Default> Default for Lookup<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Database -------------
/// An atom store wired together with the engines that read and write it.
pub struct Database {
    store: Box<dyn AtomStore>,
    namespace: Namespace,
}

impl Database {
    pub fn open(store: impl AtomStore + 'static) -> Result<Database> {
        Self::open_with_namespace(store, Namespace::default())
    }
    /// Opens a database over `store`, bootstrapping the system schema when
    /// the store holds no atoms yet.
    pub fn open_with_namespace(
        store: impl AtomStore + 'static,
        namespace: Namespace,
    ) -> Result<Database> {
        let mut database = Database {
            store: Box::new(store),
            namespace,
        };
        if database.store.atom_count()? == 0 {
            database.initialize()?;
        }
        Ok(database)
    }
    pub fn open_file(path: impl AsRef<Path>) -> Result<Database> {
        Self::open(SqliteStore::open(path)?)
    }
    pub fn open_in_memory() -> Result<Database> {
        Self::open(SqliteStore::open_in_memory()?)
    }
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Database> {
        let namespace = Namespace::new(settings.namespace.clone());
        match (settings.backend, &settings.path) {
            (Backend::Sqlite, Some(path)) => {
                Self::open_with_namespace(SqliteStore::open(path)?, namespace)
            }
            (Backend::Sqlite, None) => {
                Self::open_with_namespace(SqliteStore::open_in_memory()?, namespace)
            }
            (Backend::Memory, _) => Self::open_with_namespace(MemoryStore::new(), namespace),
        }
    }
    fn initialize(&mut self) -> Result<()> {
        let atoms = schema::bootstrap_batch(
            &self.namespace,
            SYSTEM_SCHEMA,
            Utc::now().timestamp_millis(),
        )?;
        self.store.insert_batch(&atoms)?;
        self.transact(&schema::metadata_attributes(&self.namespace))?;
        let database_id = Uuid::new_v4().simple().to_string();
        let next_entity_id = self.transaction_engine().next_entity_id()?;
        self.transact(&schema::metadata_entity(
            &self.namespace,
            &database_id,
            next_entity_id,
        ))?;
        info!(
            %database_id,
            kind = %self.store.kind(),
            bootstrap_atoms = atoms.len(),
            "database initialized"
        );
        Ok(())
    }
    fn transaction_engine(&mut self) -> TransactionEngine<'_> {
        TransactionEngine::new(self.store.as_mut(), &self.namespace)
    }
    pub fn transact(&mut self, request: &Datum) -> Result<TxReport> {
        self.transaction_engine().transact(request)
    }
    /// Parses a request written in the textual notation and transacts it.
    pub fn transact_str(&mut self, request: &str) -> Result<TxReport> {
        self.transact(&edn::parse(request)?)
    }
    pub fn query(
        &self,
        query: &Query,
        as_of: Option<EntityId>,
        params: &[Datum],
    ) -> Result<Option<Rows>> {
        QueryEngine::new(self.store.as_ref(), &self.namespace).query(query, as_of, params)
    }
    pub fn query_str(
        &self,
        query: &str,
        as_of: Option<EntityId>,
        params: &[Datum],
    ) -> Result<Option<Rows>> {
        self.query(&Query::parse(query)?, as_of, params)
    }
    /// Copies every atom into a transient store of the same kind.
    pub fn clone_to_memory(&self) -> Result<Database> {
        let mut target = self.store.transient()?;
        self.store.clone_into(target.as_mut())?;
        Ok(Database {
            store: target,
            namespace: self.namespace.clone(),
        })
    }
    pub fn resolver(&self) -> IdentityResolver<'_> {
        IdentityResolver::new(self.store.as_ref(), &self.namespace)
    }
    pub fn store(&self) -> &dyn AtomStore {
        self.store.as_ref()
    }
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }
    pub fn max_transaction_id(&self) -> Result<Option<EntityId>> {
        self.store.max_transaction_id()
    }
    pub fn max_entity_id(&self) -> Result<Option<EntityId>> {
        self.store.max_entity_id()
    }
    pub fn atom_count(&self) -> Result<usize> {
        self.store.atom_count()
    }
    pub fn identities(&self) -> Result<Vec<(EntityId, String)>> {
        self.store.identities()
    }
    pub fn atoms(&self, listing: &AtomListing) -> Result<Vec<Atom>> {
        self.store.atoms(listing)
    }
}
