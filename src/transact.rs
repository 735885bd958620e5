//! Turns a transaction request into atoms and commits them as one batch.
//!
//! A request is a map with up to two sections:
//!
//! ```text
//! {:tx-attribute [{:db/identity :movie/title
//!                  :db/attribute :db.attribute/string
//!                  :db/cardinality :db.cardinality/one}]
//!  :tx-data [{:movie/title "Commando"}
//!            [:db.operation/retract 48 :movie/title "Commando"]]}
//! ```
//!
//! Every atom of a request shares one transaction id. Entities that do not
//! exist yet are written as placeholders and receive ids when the batch is
//! committed.
use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::construct::{Atom, EntityId, EntityRef, MAX_ENTITY_ID};
use crate::datatype::Value;
use crate::edn::Datum;
use crate::error::{GraphiteError, Result};
use crate::identity::IdentityResolver;
use crate::schema::Namespace;
use crate::store::AtomStore;

pub const TX_ATTRIBUTE: &str = ":tx-attribute";
pub const TX_DATA: &str = ":tx-data";

// placeholders starting with this would be unique keyword lookups
const RESERVED_MARKER: char = ':';

#[derive(Debug, Clone, Serialize)]
pub struct TxReport {
    pub tx_id: EntityId,
    /// Entity id given to each placeholder in the request.
    pub tempids: HashMap<String, EntityId>,
    pub atom_count: usize,
}

#[derive(Debug)]
struct Draft {
    e: EntityRef,
    a: EntityId,
    v: Value,
    o: EntityId,
}

pub struct TransactionEngine<'a> {
    store: &'a mut dyn AtomStore,
    namespace: &'a Namespace,
}

impl<'a> TransactionEngine<'a> {
    pub fn new(store: &'a mut dyn AtomStore, namespace: &'a Namespace) -> Self {
        Self { store, namespace }
    }
    pub fn transact(&mut self, request: &Datum) -> Result<TxReport> {
        let drafts = self.decompose(request)?;
        self.commit(drafts)
    }
    /// The id the next transaction will get.
    pub fn next_entity_id(&self) -> Result<EntityId> {
        match self.store.max_entity_id()? {
            None => Ok(1),
            Some(max) => allocatable(max.checked_add(1)),
        }
    }
    fn resolver(&self) -> IdentityResolver<'_> {
        IdentityResolver::new(&*self.store, self.namespace)
    }
    fn resolve(&self, identity: &str) -> Result<EntityId> {
        self.resolver().resolve_or_fail(identity)
    }

    fn decompose(&self, request: &Datum) -> Result<Vec<Draft>> {
        let mut drafts = Vec::new();
        if let Some(section) = request.get(TX_ATTRIBUTE) {
            for declaration in declarations(section) {
                match self.declare_attribute(declaration) {
                    Ok(mut declared) => drafts.append(&mut declared),
                    Err(GraphiteError::MissingRequiredField { field }) => {
                        warn!(%declaration, field, "dropping incomplete attribute declaration");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        if let Some(section) = request.get(TX_DATA) {
            for operation in operations(section) {
                drafts.extend(self.data_operation(operation)?);
            }
        }
        Ok(drafts)
    }

    fn declare_attribute(&self, declaration: &Datum) -> Result<Vec<Draft>> {
        let ns = self.namespace;
        let required = |key: String, field: &'static str| {
            declaration
                .get(&key)
                .map(|value| (key.clone(), value))
                .ok_or(GraphiteError::MissingRequiredField { field })
        };
        let identity = required(ns.identity(), "identity")?;
        let kind = required(ns.attribute(), "attribute")?;
        let cardinality = required(ns.cardinality(), "cardinality")?;

        let o = self.resolve(&ns.assert_operation())?;
        let e = EntityRef::generate();
        let mut drafts = Vec::with_capacity(5);
        let identity_value = identity
            .1
            .as_name()
            .ok_or_else(|| GraphiteError::UnsupportedValue(identity.1.to_string()))?;
        drafts.push(Draft {
            e: e.clone(),
            a: self.resolve(&identity.0)?,
            v: Value::Text(identity_value),
            o,
        });
        for (key, value) in [kind, cardinality] {
            let target = name_of(value)?;
            drafts.push(Draft {
                e: e.clone(),
                a: self.resolve(&key)?,
                v: Value::Ref(self.resolve(&target)?),
                o,
            });
        }
        for key in [ns.documentation(), ns.history()] {
            if let Some(value) = declaration.get(&key) {
                drafts.push(Draft {
                    e: e.clone(),
                    a: self.resolve(&key)?,
                    v: value_of(value)?,
                    o,
                });
            }
        }
        Ok(drafts)
    }

    fn data_operation(&self, operation: &Datum) -> Result<Vec<Draft>> {
        match operation {
            Datum::List(tuple) => self.tuple_operation(tuple),
            Datum::Map(entries) => self.map_operation(entries),
            other => {
                warn!(operation = %other, "dropping data operation that is neither a map nor a tuple");
                Ok(Vec::new())
            }
        }
    }

    fn tuple_operation(&self, tuple: &[Datum]) -> Result<Vec<Draft>> {
        if tuple.len() != 4 {
            warn!(elements = tuple.len(), "dropping data tuple that does not have four elements");
            return Ok(Vec::new());
        }
        let operation = name_of(&tuple[0])?;
        let e = entity_ref(&tuple[1])?;
        if operation == self.namespace.retract_operation() {
            let existing = match &e {
                EntityRef::Resolved(id) => self.store.count_atoms(*id)? > 0,
                EntityRef::Placeholder(_) => false,
            };
            if !existing {
                debug!(entity = %e, "dropping retraction of an entity that has no atoms");
                return Ok(Vec::new());
            }
        }
        Ok(vec![Draft {
            e,
            a: self.resolve(&name_of(&tuple[2])?)?,
            v: value_of(&tuple[3])?,
            o: self.resolve(&operation)?,
        }])
    }

    fn map_operation(&self, entries: &[(Datum, Datum)]) -> Result<Vec<Draft>> {
        let entity_key = self.namespace.entity_key();
        let mut entity = None;
        let mut assertions = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key = name_of(key)?;
            if key == entity_key {
                entity = Some(entity_ref(value)?);
            } else {
                assertions.push((key, value));
            }
        }
        let e = entity.unwrap_or_else(EntityRef::generate);
        let o = self.resolve(&self.namespace.assert_operation())?;
        let mut drafts = Vec::with_capacity(assertions.len());
        for (key, value) in assertions {
            drafts.push(Draft {
                e: e.clone(),
                a: self.resolve(&key)?,
                v: value_of(value)?,
                o,
            });
        }
        Ok(drafts)
    }

    /// Assigns ids to placeholders, appends the timestamp atom and writes
    /// the whole batch at once.
    fn commit(&mut self, drafts: Vec<Draft>) -> Result<TxReport> {
        let tx_id = self.next_entity_id()?;
        if drafts.is_empty() {
            debug!(tx_id, "nothing to commit");
            return Ok(TxReport {
                tx_id,
                tempids: HashMap::new(),
                atom_count: 0,
            });
        }
        let timestamp_attribute = self.resolve(&self.namespace.transaction_timestamp())?;
        let assert = self.resolve(&self.namespace.assert_operation())?;

        let mut next = tx_id;
        let mut tempids = HashMap::new();
        let mut atoms = Vec::with_capacity(drafts.len() + 1);
        for draft in drafts {
            let e = match draft.e {
                // only ids that were handed out before may be named explicitly
                EntityRef::Resolved(id) if id >= tx_id => {
                    return Err(GraphiteError::UnsupportedValue(format!(
                        "entity {id} has not been allocated; the next free id is {tx_id}"
                    )));
                }
                EntityRef::Resolved(id) => id,
                EntityRef::Placeholder(token) => {
                    if token.starts_with(RESERVED_MARKER) {
                        return Err(GraphiteError::UnsupportedReference(token));
                    }
                    match tempids.get(&token) {
                        Some(&id) => id,
                        None => {
                            next = allocatable(next.checked_add(1))?;
                            tempids.insert(token, next);
                            next
                        }
                    }
                }
            };
            atoms.push(Atom::new(e, draft.a, draft.v, tx_id, draft.o));
        }
        atoms.push(Atom::new(
            tx_id,
            timestamp_attribute,
            Value::Integer(Utc::now().timestamp_millis()),
            tx_id,
            assert,
        ));

        self.store.insert_batch(&atoms)?;
        info!(tx_id, atoms = atoms.len(), entities = tempids.len(), "transaction committed");
        Ok(TxReport {
            tx_id,
            tempids,
            atom_count: atoms.len(),
        })
    }
}

fn allocatable(id: Option<EntityId>) -> Result<EntityId> {
    id.filter(|&id| id <= MAX_ENTITY_ID)
        .ok_or_else(|| GraphiteError::UnsupportedValue("entity ids are exhausted".into()))
}

fn declarations(section: &Datum) -> Vec<&Datum> {
    match section {
        Datum::List(items) => items.iter().collect(),
        Datum::Map(_) => vec![section],
        other => {
            warn!(section = %other, "ignoring attribute section that is neither a map nor a list");
            Vec::new()
        }
    }
}

/// A list made only of lists and maps holds several operations; any other
/// list is a single tuple.
fn operations(section: &Datum) -> Vec<&Datum> {
    match section {
        Datum::List(items)
            if items
                .iter()
                .all(|item| matches!(item, Datum::List(_) | Datum::Map(_))) =>
        {
            items.iter().collect()
        }
        Datum::List(_) | Datum::Map(_) => vec![section],
        other => {
            warn!(section = %other, "ignoring data section that is neither a map nor a list");
            Vec::new()
        }
    }
}

fn name_of(datum: &Datum) -> Result<String> {
    datum
        .as_name()
        .ok_or_else(|| GraphiteError::UnsupportedValue(format!("expected a name, found {datum}")))
}

fn value_of(datum: &Datum) -> Result<Value> {
    datum
        .to_value()
        .ok_or_else(|| GraphiteError::UnsupportedValue(datum.to_string()))
}

fn entity_ref(datum: &Datum) -> Result<EntityRef> {
    match datum {
        Datum::Integer(i) => EntityId::try_from(*i)
            .map(EntityRef::Resolved)
            .map_err(|_| GraphiteError::UnsupportedValue(format!("negative entity id {i}"))),
        Datum::Entity(e) => Ok(EntityRef::Resolved(*e)),
        Datum::Text(token) => Ok(EntityRef::Placeholder(token.clone())),
        Datum::Keyword(_) => Ok(EntityRef::Placeholder(datum.to_string())),
        other => Err(GraphiteError::UnsupportedValue(format!(
            "cannot refer to an entity with {other}"
        ))),
    }
}
