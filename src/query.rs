//! Datalog-style pattern queries over atoms.
//!
//! ```text
//! {:find [?title]
//!  :in [?year]
//!  :where [[?e :movie/release-year ?year]
//!          [?e :movie/title ?title]]}
//! ```
//!
//! Each clause is a pattern over the five atom positions `[e a v t o]`.
//! A symbol starting with `?` is a variable, `_` is ignored and anything else
//! is a constant. Clauses are evaluated one at a time as of a transaction,
//! retracted facts are masked per clause, and the clause results are joined
//! left to right on shared variables.
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::construct::{Atom, EntityId, MAX_ENTITY_ID, OtherHasher, Pattern};
use crate::datatype::Value;
use crate::edn::{self, Datum};
use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::schema::Namespace;
use crate::store::AtomStore;

pub type Row = Vec<Option<Value>>;
pub type Rows = Vec<Row>;

type Bindings = HashMap<String, Value, OtherHasher>;

const VARIABLE_MARKER: char = '?';
const WILDCARD: &str = "_";
const POSITIONS: [Position; 5] = [
    Position::Entity,
    Position::Attribute,
    Position::Value,
    Position::Transaction,
    Position::Operation,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Entity,
    Attribute,
    Value,
    Transaction,
    Operation,
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Variable(String),
    Ignored,
    Constant(Datum),
}
impl Term {
    fn classify(datum: &Datum) -> Term {
        match datum {
            Datum::Symbol(s) if s.starts_with(VARIABLE_MARKER) => Term::Variable(s.clone()),
            Datum::Symbol(s) if s == WILDCARD => Term::Ignored,
            other => Term::Constant(other.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub find: Vec<String>,
    pub inputs: Vec<String>,
    /// `None` when the where part is missing or malformed.
    pub clauses: Option<Vec<Vec<Datum>>>,
}

impl Query {
    pub fn parse(text: &str) -> Result<Query> {
        Ok(Query::from_datum(&edn::parse(text)?))
    }
    pub fn from_datum(datum: &Datum) -> Query {
        let variables = |key: &str| -> Vec<String> {
            datum
                .get(key)
                .and_then(Datum::as_list)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| match item {
                            Datum::Symbol(s) | Datum::Text(s) => Some(s.clone()),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        let clauses = match datum.get(":where") {
            Some(Datum::List(items)) => items
                .iter()
                .map(|clause| match clause {
                    Datum::List(positions) if positions.len() <= POSITIONS.len() => {
                        Some(positions.clone())
                    }
                    _ => None,
                })
                .collect::<Option<Vec<_>>>(),
            _ => None,
        };
        if clauses.is_none() {
            warn!(query = %datum, "query has no usable where part");
        }
        Query {
            find: variables(":find"),
            inputs: variables(":in"),
            clauses,
        }
    }
}

/// A clause after parameter substitution and attribute resolution.
struct Compiled {
    terms: Vec<(Position, Term)>,
    /// `None` when a constant can never match, so the clause yields no rows.
    pattern: Option<Pattern>,
}

pub struct QueryEngine<'a> {
    store: &'a dyn AtomStore,
    namespace: &'a Namespace,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a dyn AtomStore, namespace: &'a Namespace) -> Self {
        Self { store, namespace }
    }

    /// Evaluates `query` as of transaction `as_of`, or as of the latest
    /// transaction when none is given. Returns `None` for a query without a
    /// usable where part.
    pub fn query(
        &self,
        query: &Query,
        as_of: Option<EntityId>,
        params: &[Datum],
    ) -> Result<Option<Rows>> {
        let Some(clauses) = &query.clauses else {
            return Ok(None);
        };
        // no stored transaction lies beyond MAX_ENTITY_ID
        let as_of = match as_of {
            Some(tx) => tx.min(MAX_ENTITY_ID),
            None => self.store.max_transaction_id()?.unwrap_or(0),
        };
        let resolver = IdentityResolver::new(self.store, self.namespace);
        let retract = resolver.resolve_or_fail(&self.namespace.retract_operation())?;
        let substitute = !query.inputs.is_empty() && query.inputs.len() == params.len();

        // resolve every clause up front so an unknown attribute fails the
        // query even when an earlier clause already came back empty
        let compiled = clauses
            .iter()
            .map(|clause| self.compile(clause, query, params, substitute, &resolver))
            .collect::<Result<Vec<_>>>()?;

        let mut names: HashMap<EntityId, Option<String>, OtherHasher> = HashMap::default();
        let mut joined: Option<Vec<Bindings>> = None;
        for (index, clause) in compiled.iter().enumerate() {
            if joined.as_ref().is_some_and(Vec::is_empty) {
                break;
            }
            let rows = self.evaluate(clause, as_of, retract, &resolver, &mut names)?;
            debug!(clause = index, rows = rows.len(), "clause evaluated");
            joined = Some(match joined {
                None => rows,
                Some(previous) => join(&previous, &rows),
            });
        }

        Ok(joined.map(|rows| {
            rows.iter()
                .map(|row| query.find.iter().map(|var| row.get(var).cloned()).collect())
                .collect()
        }))
    }

    fn compile(
        &self,
        clause: &[Datum],
        query: &Query,
        params: &[Datum],
        substitute: bool,
        resolver: &IdentityResolver,
    ) -> Result<Compiled> {
        let mut terms = Vec::with_capacity(POSITIONS.len());
        for (position, datum) in POSITIONS.iter().zip(clause) {
            let mut term = Term::classify(datum);
            if let Term::Variable(name) = &term {
                if substitute {
                    if let Some(i) = query.inputs.iter().position(|input| input == name) {
                        term = Term::Constant(params[i].clone());
                    }
                }
            }
            terms.push((*position, term));
        }

        let mut pattern = Pattern::default();
        let mut satisfiable = true;
        for (position, term) in &terms {
            let Term::Constant(datum) = term else { continue };
            match position {
                Position::Entity => pattern.e = entity_constant(datum),
                Position::Transaction => pattern.t = entity_constant(datum),
                Position::Operation => pattern.o = entity_constant(datum),
                Position::Value => pattern.v = datum.to_value(),
                Position::Attribute => {
                    let name = match datum {
                        Datum::Symbol(name) => Some(name.clone()),
                        other => other.as_name(),
                    };
                    pattern.a = match name {
                        Some(name) => Some(resolver.resolve_or_fail(&name)?),
                        None => entity_constant(datum),
                    }
                }
            }
            let bound = match position {
                Position::Entity => pattern.e.is_some(),
                Position::Attribute => pattern.a.is_some(),
                Position::Value => pattern.v.is_some(),
                Position::Transaction => pattern.t.is_some(),
                Position::Operation => pattern.o.is_some(),
            };
            satisfiable &= bound;
        }
        Ok(Compiled {
            terms,
            pattern: satisfiable.then_some(pattern),
        })
    }

    fn evaluate(
        &self,
        clause: &Compiled,
        as_of: EntityId,
        retract: EntityId,
        resolver: &IdentityResolver,
        names: &mut HashMap<EntityId, Option<String>, OtherHasher>,
    ) -> Result<Vec<Bindings>> {
        let Some(pattern) = &clause.pattern else {
            return Ok(Vec::new());
        };
        let surviving = mask_retractions(self.store.lookup(pattern, as_of)?, retract);
        let mut rows = Vec::with_capacity(surviving.len());
        'atoms: for atom in &surviving {
            let mut row = Bindings::default();
            for (position, term) in &clause.terms {
                let Term::Variable(variable) = term else { continue };
                let value = match position {
                    Position::Entity => Some(Value::Ref(atom.e())),
                    Position::Attribute => {
                        let name = match names.get(&atom.a()) {
                            Some(name) => name.clone(),
                            None => {
                                let name = resolver.name_of(atom.a())?;
                                names.insert(atom.a(), name.clone());
                                name
                            }
                        };
                        name.map(Value::Text)
                    }
                    Position::Value => Some(atom.v().clone()),
                    Position::Transaction => Some(Value::Ref(atom.t())),
                    Position::Operation => Some(Value::Ref(atom.o())),
                };
                let Some(value) = value else { continue };
                match row.get(variable) {
                    Some(existing) if *existing != value => continue 'atoms,
                    Some(_) => {}
                    None => {
                        row.insert(variable.clone(), value);
                    }
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Drops retractions, and every atom followed by a later retraction on the
/// same entity and attribute whatever value that retraction carries.
pub fn mask_retractions(raw: Vec<Atom>, retract: EntityId) -> Vec<Atom> {
    let mut latest: HashMap<(EntityId, EntityId), EntityId, OtherHasher> = HashMap::default();
    for atom in raw.iter().filter(|atom| atom.o() == retract) {
        let t = latest.entry((atom.e(), atom.a())).or_insert(atom.t());
        if atom.t() > *t {
            *t = atom.t();
        }
    }
    raw.into_iter()
        .filter(|atom| atom.o() != retract)
        .filter(|atom| {
            latest
                .get(&(atom.e(), atom.a()))
                .is_none_or(|retracted| atom.t() >= *retracted)
        })
        .collect()
}

fn entity_constant(datum: &Datum) -> Option<EntityId> {
    match datum {
        Datum::Integer(i) => EntityId::try_from(*i).ok(),
        Datum::Entity(e) => Some(*e),
        _ => None,
    }
}

fn join(left: &[Bindings], right: &[Bindings]) -> Vec<Bindings> {
    let mut joined = Vec::new();
    for l in left {
        for r in right {
            if let Some(merged) = merge(l, r) {
                joined.push(merged);
            }
        }
    }
    joined
}

fn merge(left: &Bindings, right: &Bindings) -> Option<Bindings> {
    let mut merged = left.clone();
    for (variable, value) in right {
        match merged.get(variable) {
            Some(existing) if existing != value => return None,
            Some(_) => {}
            None => {
                merged.insert(variable.clone(), value.clone());
            }
        }
    }
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Value)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn later_retraction_masks_earlier_fact() {
        let raw = vec![
            Atom::new(10, 3, Value::from("a"), 5, 1),
            Atom::new(10, 3, Value::from("b"), 6, 2),
            Atom::new(11, 3, Value::from("c"), 5, 1),
            Atom::new(10, 3, Value::from("d"), 7, 1),
        ];
        let kept: Vec<_> = mask_retractions(raw, 2)
            .iter()
            .map(|atom| atom.v().to_string())
            .collect();
        assert_eq!(kept, vec!["c", "d"]);
    }

    #[test]
    fn retraction_in_the_same_transaction_keeps_the_assertion() {
        let raw = vec![
            Atom::new(10, 3, Value::from("a"), 5, 1),
            Atom::new(10, 3, Value::from("b"), 6, 1),
            Atom::new(10, 3, Value::from("a"), 6, 2),
        ];
        let kept: Vec<_> = mask_retractions(raw, 2)
            .iter()
            .map(|atom| atom.v().to_string())
            .collect();
        assert_eq!(kept, vec!["b"]);
    }

    #[test]
    fn join_discards_conflicting_pairs() {
        let left = vec![
            bindings(&[("?e", Value::Ref(1)), ("?t", Value::from("Commando"))]),
            bindings(&[("?e", Value::Ref(2)), ("?t", Value::from("Repo Man"))]),
        ];
        let right = vec![bindings(&[("?e", Value::Integer(2)), ("?y", Value::Integer(1984))])];
        let joined = join(&left, &right);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].get("?t"), Some(&Value::from("Repo Man")));
        assert_eq!(joined[0].get("?y"), Some(&Value::Integer(1984)));
    }

    #[test]
    fn terms_are_classified_by_their_marker() {
        assert_eq!(Term::classify(&Datum::symbol("?e")), Term::Variable("?e".into()));
        assert_eq!(Term::classify(&Datum::symbol("_")), Term::Ignored);
        assert_eq!(
            Term::classify(&Datum::symbol("_unused")),
            Term::Constant(Datum::symbol("_unused"))
        );
    }

    #[test]
    fn malformed_where_yields_no_clauses() {
        let missing = Query::parse("{:find [?t]}").expect("parse");
        assert!(missing.clauses.is_none());
        let oversized = Query::parse("{:find [?t] :where [[?e ?a ?v ?t ?o ?x]]}").expect("parse");
        assert!(oversized.clauses.is_none());
    }
}
