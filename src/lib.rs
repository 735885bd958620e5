//! Graphite – an embedded, append-only fact database.
//!
//! Every fact is an *atom* `(e, a, v, t, o)`:
//! * `e` is the entity the fact is about.
//! * `a` is the attribute, itself an entity with a symbolic identity such as `:movie/title`.
//! * `v` is a [`datatype::Value`].
//! * `t` is the transaction that recorded the fact.
//! * `o` is the operation, either assert or retract.
//!
//! Atoms are never changed or removed. Retracting a fact appends a new atom,
//! and queries hide any fact that was followed by a retraction on the same
//! entity and attribute. Since transactions only ever get higher ids, a query
//! pinned to an earlier transaction keeps returning the same answer.
//!
//! ## Modules
//! * [`construct`] – ids, atoms, patterns, hashed lookups and the [`construct::Database`] facade.
//! * [`datatype`] – the [`datatype::Value`] held in an atom's value position.
//! * [`edn`] – the textual notation requests and queries are written in.
//! * [`schema`] – the system vocabulary and the bootstrap transaction.
//! * [`store`] – the [`store::AtomStore`] trait and the in-memory backend.
//! * [`persist`] – the SQLite backend.
//! * [`identity`] – symbolic name resolution.
//! * [`transact`] – turning requests into committed atoms.
//! * [`query`] – datalog-style pattern queries.
//! * [`config`], [`interface`] and [`server`] – settings, a shared handle and the HTTP surface.
//!
//! ## Quick Start
//! ```
//! use graphite::construct::Database;
//! let mut db = Database::open_in_memory().unwrap();
//! db.transact_str(r#"{:tx-attribute {:db/identity :movie/title
//!                                    :db/attribute :db.attribute/string
//!                                    :db/cardinality :db.cardinality/one}}"#).unwrap();
//! db.transact_str(r#"{:tx-data [{:movie/title "Repo Man"}]}"#).unwrap();
//! let rows = db
//!     .query_str("{:find [?t] :where [[_ :movie/title ?t]]}", None, &[])
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

pub mod config;
pub mod construct;
pub mod datatype;
pub mod edn;
pub mod error;
pub mod identity;
pub mod interface;
pub mod persist;
pub mod query;
pub mod schema;
pub mod server;
pub mod store;
pub mod transact;

pub use construct::{Atom, Database, EntityId, EntityRef, Pattern};
pub use datatype::Value;
pub use edn::Datum;
pub use error::{GraphiteError, Result};
pub use query::{Query, Rows};
pub use store::{AtomListing, AtomStore, MemoryStore, StoreKind};
pub use persist::SqliteStore;
pub use transact::TxReport;
