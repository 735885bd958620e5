use crate::construct::{EntityId, IDENTITY_ATTRIBUTE};
use crate::error::Result;
use crate::schema::Namespace;
use crate::store::AtomStore;

/// Translates between symbolic identities and entity ids for one store.
pub struct IdentityResolver<'a> {
    store: &'a dyn AtomStore,
    namespace: &'a Namespace,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(store: &'a dyn AtomStore, namespace: &'a Namespace) -> Self {
        Self { store, namespace }
    }
    /// Fails with `UnknownIdentity` when no entity carries `identity`.
    pub fn resolve_or_fail(&self, identity: &str) -> Result<EntityId> {
        self.store.entity_of(identity)
    }
    pub fn name_of(&self, entity: EntityId) -> Result<Option<String>> {
        if entity == IDENTITY_ATTRIBUTE {
            return Ok(Some(self.namespace.identity()));
        }
        self.store.identity_of(entity)
    }
}
