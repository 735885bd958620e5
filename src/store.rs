//! The seam between the engines and the place atoms are kept.
//!
//! Two backends implement [`AtomStore`]: [`crate::persist::SqliteStore`] for
//! file-backed or in-memory SQLite, and [`MemoryStore`] which keeps the log in
//! a vector with hashed lookups on the side.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::construct::{
    Atom, EntityId, IDENTITY_ATTRIBUTE, IdHasher, Lookup, OtherHasher, Pattern,
};
use crate::datatype::Value;
use crate::error::{GraphiteError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreKind {
    Sqlite,
    Memory,
}
impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreKind::Sqlite => write!(f, "sqlite"),
            StoreKind::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    E,
    A,
    V,
    T,
    O,
}
impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::E => "e",
            Column::A => "a",
            Column::V => "v",
            Column::T => "t",
            Column::O => "o",
        }
    }
    pub fn compare(&self, left: &Atom, right: &Atom) -> Ordering {
        match self {
            Column::E => left.e().cmp(&right.e()),
            Column::A => left.a().cmp(&right.a()),
            Column::V => left.v().total_cmp(right.v()),
            Column::T => left.t().cmp(&right.t()),
            Column::O => left.o().cmp(&right.o()),
        }
    }
}
impl FromStr for Column {
    type Err = GraphiteError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "e" => Ok(Column::E),
            "a" => Ok(Column::A),
            "v" => Ok(Column::V),
            "t" => Ok(Column::T),
            "o" => Ok(Column::O),
            other => Err(GraphiteError::Parse {
                message: format!("unknown atom column '{other}'"),
                line: None,
                col: None,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}
impl FromStr for Direction {
    type Err = GraphiteError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(GraphiteError::Parse {
                message: format!("unknown sort direction '{other}'"),
                line: None,
                col: None,
            }),
        }
    }
}

/// Paging and ordering for a raw atom listing. Without a sort column atoms
/// come back in insertion order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AtomListing {
    pub sort: Option<Column>,
    pub direction: Option<Direction>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

pub trait AtomStore: Send {
    fn kind(&self) -> StoreKind;
    fn insert(&mut self, atom: &Atom) -> Result<()>;
    /// Inserts all atoms or none of them.
    fn insert_batch(&mut self, atoms: &[Atom]) -> Result<()>;
    /// Atoms matching `pattern` whose transaction is at or before `as_of`, in insertion order.
    fn lookup(&self, pattern: &Pattern, as_of: EntityId) -> Result<Vec<Atom>>;
    fn max_transaction_id(&self) -> Result<Option<EntityId>>;
    fn max_entity_id(&self) -> Result<Option<EntityId>>;
    fn identity_of(&self, entity: EntityId) -> Result<Option<String>>;
    fn entity_of(&self, identity: &str) -> Result<EntityId>;
    fn count_atoms(&self, entity: EntityId) -> Result<usize>;
    fn atom_count(&self) -> Result<usize>;
    fn identities(&self) -> Result<Vec<(EntityId, String)>>;
    fn atoms(&self, listing: &AtomListing) -> Result<Vec<Atom>>;
    fn reset(&mut self) -> Result<()>;
    /// A fresh, empty store of the same kind that lives only in memory.
    fn transient(&self) -> Result<Box<dyn AtomStore>>;
    fn clone_into(&self, target: &mut dyn AtomStore) -> Result<()> {
        if target.kind() != self.kind() {
            return Err(GraphiteError::IncompatibleStoreKind {
                from: self.kind(),
                to: target.kind(),
            });
        }
        target.reset()?;
        target.insert_batch(&self.atoms(&AtomListing::default())?)
    }
}

/// Sorts and pages atoms that are already in insertion order.
pub(crate) fn arrange(mut atoms: Vec<Atom>, listing: &AtomListing) -> Vec<Atom> {
    if let Some(column) = listing.sort {
        match listing.direction.unwrap_or_default() {
            Direction::Asc => atoms.sort_by(|x, y| column.compare(x, y)),
            Direction::Desc => atoms.sort_by(|x, y| column.compare(y, x)),
        }
    }
    atoms
        .into_iter()
        .skip(listing.offset.unwrap_or(0))
        .take(listing.limit.unwrap_or(usize::MAX))
        .collect()
}

// ------------- MemoryStore -------------
#[derive(Debug, Default)]
pub struct MemoryStore {
    log: Vec<Atom>,
    by_entity: Lookup<EntityId, usize, IdHasher>,
    by_attribute: Lookup<EntityId, usize, IdHasher>,
    by_value: Lookup<Value, usize, OtherHasher>,
    by_transaction: Lookup<EntityId, usize, IdHasher>,
    by_entity_attribute: Lookup<(EntityId, EntityId), usize, IdHasher>,
    // the first identity recorded for an entity, and the first entity recorded for a name
    names: HashMap<EntityId, String, IdHasher>,
    entities: HashMap<String, EntityId, OtherHasher>,
    max_e: Option<EntityId>,
    max_t: Option<EntityId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    fn candidates(&self, pattern: &Pattern) -> Option<&[usize]> {
        let mut bound: Vec<&[usize]> = Vec::new();
        if let (Some(e), Some(a)) = (pattern.e, pattern.a) {
            bound.push(self.by_entity_attribute.lookup(&(e, a)));
        }
        if let Some(e) = pattern.e {
            bound.push(self.by_entity.lookup(&e));
        }
        if let Some(a) = pattern.a {
            bound.push(self.by_attribute.lookup(&a));
        }
        if let Some(v) = &pattern.v {
            bound.push(self.by_value.lookup(v));
        }
        if let Some(t) = pattern.t {
            bound.push(self.by_transaction.lookup(&t));
        }
        bound.into_iter().min_by_key(|positions| positions.len())
    }
}

impl AtomStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }
    fn insert(&mut self, atom: &Atom) -> Result<()> {
        let position = self.log.len();
        self.by_entity.insert(atom.e(), position);
        self.by_attribute.insert(atom.a(), position);
        self.by_value.insert(atom.v().clone(), position);
        self.by_transaction.insert(atom.t(), position);
        self.by_entity_attribute.insert((atom.e(), atom.a()), position);
        if atom.a() == IDENTITY_ATTRIBUTE {
            if let Some(name) = atom.v().as_text() {
                self.names.entry(atom.e()).or_insert_with(|| name.to_owned());
                self.entities.entry(name.to_owned()).or_insert(atom.e());
            }
        }
        self.max_e = self.max_e.max(Some(atom.e()));
        self.max_t = self.max_t.max(Some(atom.t()));
        self.log.push(atom.clone());
        Ok(())
    }
    fn insert_batch(&mut self, atoms: &[Atom]) -> Result<()> {
        // nothing in insert can fail, so the batch cannot be left half written
        for atom in atoms {
            self.insert(atom)?;
        }
        Ok(())
    }
    fn lookup(&self, pattern: &Pattern, as_of: EntityId) -> Result<Vec<Atom>> {
        let visible = |atom: &&Atom| atom.t() <= as_of && pattern.matches(atom);
        Ok(match self.candidates(pattern) {
            Some(positions) => positions
                .iter()
                .map(|&position| &self.log[position])
                .filter(visible)
                .cloned()
                .collect(),
            None => self.log.iter().filter(visible).cloned().collect(),
        })
    }
    fn max_transaction_id(&self) -> Result<Option<EntityId>> {
        Ok(self.max_t)
    }
    fn max_entity_id(&self) -> Result<Option<EntityId>> {
        Ok(self.max_e)
    }
    fn identity_of(&self, entity: EntityId) -> Result<Option<String>> {
        Ok(self.names.get(&entity).cloned())
    }
    fn entity_of(&self, identity: &str) -> Result<EntityId> {
        self.entities
            .get(identity)
            .copied()
            .ok_or_else(|| GraphiteError::UnknownIdentity(identity.to_owned()))
    }
    fn count_atoms(&self, entity: EntityId) -> Result<usize> {
        Ok(self.by_entity.lookup(&entity).len())
    }
    fn atom_count(&self) -> Result<usize> {
        Ok(self.log.len())
    }
    fn identities(&self) -> Result<Vec<(EntityId, String)>> {
        Ok(self
            .by_attribute
            .lookup(&IDENTITY_ATTRIBUTE)
            .iter()
            .map(|&position| &self.log[position])
            .filter_map(|atom| atom.v().as_text().map(|name| (atom.e(), name.to_owned())))
            .collect())
    }
    fn atoms(&self, listing: &AtomListing) -> Result<Vec<Atom>> {
        Ok(arrange(self.log.clone(), listing))
    }
    fn reset(&mut self) -> Result<()> {
        *self = MemoryStore::new();
        Ok(())
    }
    fn transient(&self) -> Result<Box<dyn AtomStore>> {
        Ok(Box::new(MemoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .insert_batch(&[
                Atom::new(0, 0, Value::from(":db/identity"), 1, 2),
                Atom::new(2, 0, Value::from(":db.operation/assert"), 1, 2),
                Atom::new(3, 0, Value::from(":movie/title"), 1, 2),
                Atom::new(5, 3, Value::from("Commando"), 4, 2),
                Atom::new(6, 3, Value::from("Repo Man"), 7, 2),
            ])
            .expect("insert");
        store
    }

    #[test]
    fn lookups_respect_as_of_and_insertion_order() {
        let store = sample();
        let titles = store.lookup(&Pattern::new().attribute(3), 7).expect("lookup");
        let names: Vec<_> = titles.iter().map(|atom| atom.v().to_string()).collect();
        assert_eq!(names, vec!["Commando", "Repo Man"]);
        let earlier = store.lookup(&Pattern::new().attribute(3), 4).expect("lookup");
        assert_eq!(earlier.len(), 1);
    }

    #[test]
    fn identities_keep_the_first_name_recorded() {
        let mut store = sample();
        store
            .insert(&Atom::new(3, 0, Value::from(":movie/name"), 8, 2))
            .expect("insert");
        assert_eq!(store.identity_of(3).expect("identity").as_deref(), Some(":movie/title"));
        assert_eq!(store.entity_of(":movie/name").expect("entity"), 3);
        assert!(matches!(
            store.entity_of(":movie/rating"),
            Err(GraphiteError::UnknownIdentity(_))
        ));
    }

    #[test]
    fn listing_sorts_and_pages() {
        let store = sample();
        let listing = AtomListing {
            sort: Some(Column::E),
            direction: Some(Direction::Desc),
            offset: Some(1),
            limit: Some(2),
        };
        let entities: Vec<_> = store.atoms(&listing).expect("atoms").iter().map(Atom::e).collect();
        assert_eq!(entities, vec![5, 3]);
    }
}
