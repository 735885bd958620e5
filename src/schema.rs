//! The system schema every database starts from, and the naming rules that
//! turn schema keys into symbolic identities.
use std::collections::HashMap;

use crate::construct::{Atom, EntityId, IDENTITY_ATTRIBUTE, OtherHasher};
use crate::datatype::Value;
use crate::edn::Datum;
use crate::error::{GraphiteError, Result};

/// The prefix every system identity is written under, `:db` unless configured otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Default for Namespace {
    fn default() -> Self {
        Namespace(":db".to_owned())
    }
}

impl Namespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Namespace(prefix.into())
    }
    /// `attribute` becomes `:db/attribute`, `class/mode` becomes `:db.class/mode`.
    pub fn attribute_name(&self, key: &str) -> String {
        if key.contains('/') {
            format!("{}.{}", self.0, key)
        } else {
            format!("{}/{}", self.0, key)
        }
    }
    /// `("operation", "assert")` becomes `:db.operation/assert`.
    pub fn enum_name(&self, key: &str, value: &str) -> String {
        format!("{}.{}/{}", self.0, key.replacen('/', ".", 1), value)
    }
    pub fn identity(&self) -> String {
        self.attribute_name("identity")
    }
    pub fn attribute(&self) -> String {
        self.attribute_name("attribute")
    }
    pub fn cardinality(&self) -> String {
        self.attribute_name("cardinality")
    }
    pub fn documentation(&self) -> String {
        self.attribute_name("documentation")
    }
    pub fn history(&self) -> String {
        self.attribute_name("history")
    }
    pub fn enumeration(&self) -> String {
        self.attribute_name("enum")
    }
    /// Map key that names the entity a map-shaped operation is about.
    pub fn entity_key(&self) -> String {
        self.attribute_name("e")
    }
    pub fn assert_operation(&self) -> String {
        self.enum_name("operation", "assert")
    }
    pub fn retract_operation(&self) -> String {
        self.enum_name("operation", "retract")
    }
    pub fn transaction_timestamp(&self) -> String {
        self.attribute_name("transaction/timestamp")
    }
    pub fn database_id(&self) -> String {
        self.attribute_name("database-id")
    }
    pub fn next_entity_id(&self) -> String {
        self.attribute_name("next-entity-id")
    }
    pub fn metadata(&self) -> String {
        self.attribute_name("metadata")
    }
}

pub struct SystemAttribute {
    pub key: &'static str,
    pub kind: &'static str,
    pub cardinality: &'static str,
    pub documentation: Option<&'static str>,
    pub enums: &'static [&'static str],
}

const fn system(
    key: &'static str,
    kind: &'static str,
    cardinality: &'static str,
    documentation: Option<&'static str>,
    enums: &'static [&'static str],
) -> SystemAttribute {
    SystemAttribute {
        key,
        kind,
        cardinality,
        documentation,
        enums,
    }
}

/// Attributes installed by bootstrap, in the order their ids are handed out.
#[rustfmt::skip]
pub const SYSTEM_SCHEMA: &[SystemAttribute] = &[
    system("attribute", "enum", "one", Some("Defines an attribute type"),
        &["nil", "keyword", "string", "bytes", "boolean", "number", "class", "entity", "instant", "enum", "reference"]),
    system("cardinality", "enum", "one", Some("Specifies if an attribute can contain one or many values"),
        &["one", "many"]),
    system("operation", "enum", "one", Some("Specifies the operation for an atom within a transaction"),
        &["assert", "retract"]),
    system("history", "number", "one", Some("Specifies how many histories to maintain for an attribute"), &[]),
    system("enum", "entity", "many", Some("Specifies that an attribute only contains certain entities as values"), &[]),
    system("component", "entity", "one", None, &[]),
    system("unique", "enum", "one", None, &["identity", "value"]),
    system("feature/required", "class", "many", Some("Points to an attribute which must be required for a class"), &[]),
    system("feature/optional", "class", "many", Some("Points to an attribute which is optional for a class"), &[]),
    system("feature/prohibited", "class", "many", Some("Points to an attribute which cannot be allowed for a class"), &[]),
    system("class", "entity", "many", None, &[]),
    system("class/mode", "enum", "one", None, &["restricted", "strict", "relaxed", "exclusive"]),
    system("documentation", "string", "one", None, &[]),
    system("transaction/timestamp", "number", "one", Some("Records the timestamp of the transaction"), &[]),
    system("transaction/semantic-id", "bytes", "one", Some("A value which represents the E,A,V values in this transaction"), &[]),
];

/// Builds the very first transaction: identities for the identity attribute,
/// every schema key and every enum value, their descriptions, and the
/// transaction's own timestamp atom. Ids are handed out densely from zero.
///
/// The assert operation is itself declared inside this batch, so atoms are
/// drafted first and stamped with the operation once it has been found.
pub fn bootstrap_batch(
    namespace: &Namespace,
    schema: &[SystemAttribute],
    timestamp: i64,
) -> Result<Vec<Atom>> {
    let mut drafts: Vec<(EntityId, EntityId, Value)> = Vec::new();
    let mut ids: HashMap<String, EntityId, OtherHasher> = HashMap::default();
    let mut name = |entity: EntityId, identity: String, drafts: &mut Vec<(EntityId, EntityId, Value)>| {
        ids.insert(identity.clone(), entity);
        drafts.push((entity, IDENTITY_ATTRIBUTE, Value::Text(identity)));
    };

    let mut next = IDENTITY_ATTRIBUTE;
    name(IDENTITY_ATTRIBUTE, namespace.identity(), &mut drafts);
    for attribute in schema {
        next += 1;
        name(next, namespace.attribute_name(attribute.key), &mut drafts);
    }
    for attribute in schema {
        for value in attribute.enums {
            next += 1;
            name(next, namespace.enum_name(attribute.key, value), &mut drafts);
        }
    }

    let id = |identity: &str| {
        ids.get(identity)
            .copied()
            .ok_or_else(|| GraphiteError::UnknownIdentity(identity.to_owned()))
    };
    let kind_attribute = id(&namespace.attribute())?;
    let cardinality_attribute = id(&namespace.cardinality())?;
    let enum_attribute = id(&namespace.enumeration())?;
    let documentation_attribute = id(&namespace.documentation())?;

    drafts.push((
        IDENTITY_ATTRIBUTE,
        kind_attribute,
        Value::Ref(id(&namespace.enum_name("attribute", "string"))?),
    ));
    drafts.push((
        IDENTITY_ATTRIBUTE,
        cardinality_attribute,
        Value::Ref(id(&namespace.enum_name("cardinality", "one"))?),
    ));
    for attribute in schema {
        let entity = id(&namespace.attribute_name(attribute.key))?;
        let kind = namespace.enum_name("attribute", attribute.kind);
        drafts.push((entity, kind_attribute, Value::Ref(id(&kind)?)));
        if attribute.kind == "enum" {
            for value in attribute.enums {
                let member = id(&namespace.enum_name(attribute.key, value))?;
                drafts.push((entity, enum_attribute, Value::Ref(member)));
            }
        }
        let cardinality = namespace.enum_name("cardinality", attribute.cardinality);
        drafts.push((entity, cardinality_attribute, Value::Ref(id(&cardinality)?)));
        if let Some(documentation) = attribute.documentation {
            drafts.push((entity, documentation_attribute, Value::from(documentation)));
        }
    }

    let assert_name = namespace.assert_operation();
    let assert = drafts
        .iter()
        .find(|(_, a, v)| *a == IDENTITY_ATTRIBUTE && v.as_text() == Some(assert_name.as_str()))
        .map(|(e, _, _)| *e)
        .ok_or(GraphiteError::MissingBootstrapOperation)?;
    let timestamp_attribute = id(&namespace.transaction_timestamp())?;

    let tx = next + 1;
    let mut atoms: Vec<Atom> = drafts
        .into_iter()
        .map(|(e, a, v)| Atom::new(e, a, v, tx, assert))
        .collect();
    atoms.push(Atom::new(tx, timestamp_attribute, Value::Integer(timestamp), tx, assert));
    Ok(atoms)
}

/// Declares the two attributes that describe the database itself.
pub fn metadata_attributes(namespace: &Namespace) -> Datum {
    let declare = |identity: String, kind: &str, documentation: &str| {
        Datum::map([
            (Datum::keyword(&namespace.identity()), Datum::keyword(&identity)),
            (
                Datum::keyword(&namespace.attribute()),
                Datum::keyword(&namespace.enum_name("attribute", kind)),
            ),
            (
                Datum::keyword(&namespace.cardinality()),
                Datum::keyword(&namespace.enum_name("cardinality", "one")),
            ),
            (Datum::keyword(&namespace.documentation()), Datum::text(documentation)),
        ])
    };
    Datum::map([(
        Datum::keyword(":tx-attribute"),
        Datum::list([
            declare(namespace.database_id(), "string", "A unique identifier for the database"),
            declare(namespace.next_entity_id(), "number", "A unique identifier for the next entity"),
        ]),
    )])
}

/// The entity recording the database's identifier and the next free entity id.
pub fn metadata_entity(namespace: &Namespace, database_id: &str, next_entity_id: EntityId) -> Datum {
    Datum::map([(
        Datum::keyword(":tx-data"),
        Datum::map([
            (Datum::keyword(&namespace.identity()), Datum::text(&namespace.metadata())),
            (Datum::keyword(&namespace.database_id()), Datum::text(database_id)),
            (
                Datum::keyword(&namespace.next_entity_id()),
                Datum::Integer(i64::try_from(next_entity_id).unwrap_or(i64::MAX)),
            ),
        ]),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_namespace() {
        let namespace = Namespace::default();
        assert_eq!(namespace.attribute_name("cardinality"), ":db/cardinality");
        assert_eq!(namespace.attribute_name("class/mode"), ":db.class/mode");
        assert_eq!(namespace.enum_name("class/mode", "strict"), ":db.class.mode/strict");
        assert_eq!(Namespace::new(":app").retract_operation(), ":app.operation/retract");
    }

    #[test]
    fn bootstrap_hands_out_dense_ids() {
        let atoms = bootstrap_batch(&Namespace::default(), SYSTEM_SCHEMA, 0).expect("bootstrap");
        let tx = atoms[0].t();
        assert_eq!(tx, 37);
        assert!(atoms.iter().all(|atom| atom.t() == tx && atom.o() == 29));
        let last = atoms.last().expect("timestamp atom");
        assert_eq!((last.e(), last.a()), (tx, 14));
    }

    #[test]
    fn bootstrap_needs_an_assert_operation() {
        const PARTIAL: &[SystemAttribute] = &[
            system("attribute", "enum", "one", None, &["string", "enum", "number", "entity"]),
            system("cardinality", "enum", "one", None, &["one", "many"]),
            system("operation", "enum", "one", None, &["retract"]),
            system("enum", "entity", "many", None, &[]),
            system("documentation", "string", "one", None, &[]),
            system("transaction/timestamp", "number", "one", None, &[]),
        ];
        assert!(matches!(
            bootstrap_batch(&Namespace::default(), PARTIAL, 0),
            Err(GraphiteError::MissingBootstrapOperation)
        ));
    }
}
