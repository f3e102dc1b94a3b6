//! The persisted query registry: an append-only map from [`QueryId`] to validated
//! operation documents, with a per-entry allow-list flag.
//!
//! Reads happen on every request and never block each other.
//! Writes (registration, allow-list changes, removal) are rare and serialized.
//! No lock is held across an `.await`, so a cancelled request can never leave
//! the registry half-updated.

use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

/// Identifier of a persisted query.
///
/// Content-derived ids are the lowercase hex SHA-256 digest of the document text,
/// the same value clients send as `sha256Hash` for automatic persisted queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct QueryId(Arc<str>);

/// The text of an operation document together with its validated form.
///
/// Immutable once created.
#[derive(Debug, Clone)]
pub struct OperationDocument {
    source: Arc<str>,
    document: Valid<ExecutableDocument>,
}

#[derive(Debug, Clone)]
pub struct PersistedQueryEntry {
    pub id: QueryId,
    pub document: Arc<OperationDocument>,
    pub allowed: bool,
}

/// Selected at configuration time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryMode {
    /// Any registered document may run, and clients may also send query text
    #[default]
    Open,
    /// Only entries explicitly marked allowed may run. Query text is refused.
    Whitelist,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("persisted query `{0}` is not registered")]
    UnknownQuery(QueryId),
    #[error("persisted query `{0}` is not allowed")]
    QueryNotWhitelisted(QueryId),
    #[error("identifier `{0}` is already registered for a different document")]
    DuplicateIdentifier(QueryId),
    #[error("persisted query identifiers must not be empty")]
    EmptyIdentifier,
}

/// Why a persisted query cannot run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("persisted query `{0}` is not registered")]
    UnknownQuery(QueryId),
    #[error("persisted query `{0}` is not allowed")]
    QueryNotWhitelisted(QueryId),
}

impl From<LookupError> for RegistryError {
    fn from(error: LookupError) -> Self {
        match error {
            LookupError::UnknownQuery(id) => RegistryError::UnknownQuery(id),
            LookupError::QueryNotWhitelisted(id) => RegistryError::QueryNotWhitelisted(id),
        }
    }
}

#[derive(Debug, Default)]
pub struct QueryRegistry {
    mode: RegistryMode,
    entries: RwLock<HashMap<QueryId, Arc<PersistedQueryEntry>>>,
}

impl QueryId {
    /// Wraps an identifier chosen by a client or a manifest
    pub fn new(id: impl AsRef<str>) -> Result<Self, RegistryError> {
        let id = id.as_ref();
        if id.is_empty() {
            return Err(RegistryError::EmptyIdentifier);
        }
        Ok(Self(id.into()))
    }

    /// The content-derived identifier of a document
    pub fn for_document(source: &str) -> Self {
        Self(hex::encode(Sha256::digest(source.as_bytes())).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for QueryId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl OperationDocument {
    pub(crate) fn new(source: impl Into<Arc<str>>, document: Valid<ExecutableDocument>) -> Self {
        Self {
            source: source.into(),
            document,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn document(&self) -> &Valid<ExecutableDocument> {
        &self.document
    }

    /// The content-derived identifier of this document
    pub fn content_id(&self) -> QueryId {
        QueryId::for_document(&self.source)
    }
}

impl QueryRegistry {
    pub fn new(mode: RegistryMode) -> Self {
        Self {
            mode,
            entries: RwLock::default(),
        }
    }

    pub fn mode(&self) -> RegistryMode {
        self.mode
    }

    /// Registers a document under its content-derived identifier.
    ///
    /// Registering the same text again returns the same identifier
    /// and keeps the existing entry (including its allow-list flag).
    pub fn register(&self, document: OperationDocument) -> Result<QueryId, RegistryError> {
        let id = document.content_id();
        self.register_with_id(id, document)
    }

    /// Registers a document under an externally chosen identifier,
    /// as found in a persisted query manifest.
    pub fn register_with_id(
        &self,
        id: QueryId,
        document: OperationDocument,
    ) -> Result<QueryId, RegistryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&id) {
            return if existing.document.source == document.source {
                Ok(id)
            } else {
                Err(RegistryError::DuplicateIdentifier(id))
            };
        }
        tracing::debug!(%id, "registering persisted query");
        entries.insert(
            id.clone(),
            Arc::new(PersistedQueryEntry {
                id: id.clone(),
                document: Arc::new(document),
                allowed: false,
            }),
        );
        Ok(id)
    }

    /// Registers every document of a batch and marks it allowed, or none of them.
    ///
    /// Conflicts within the batch and with existing entries are checked
    /// under the same write lock, before the first insertion.
    pub fn register_allowed(
        &self,
        batch: Vec<(QueryId, OperationDocument)>,
    ) -> Result<Vec<QueryId>, RegistryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut sources: HashMap<&QueryId, &str> = HashMap::new();
        for (id, document) in &batch {
            let existing = entries
                .get(id)
                .map(|entry| entry.document.source())
                .or_else(|| sources.get(id).copied());
            match existing {
                Some(source) if source != document.source() => {
                    return Err(RegistryError::DuplicateIdentifier(id.clone()))
                }
                Some(_) => {}
                None => {
                    sources.insert(id, document.source());
                }
            }
        }
        let mut ids = Vec::with_capacity(batch.len());
        for (id, document) in batch {
            let document = match entries.get(&id) {
                Some(existing) => existing.document.clone(),
                None => Arc::new(document),
            };
            tracing::debug!(%id, "registering allowed persisted query");
            entries.insert(
                id.clone(),
                Arc::new(PersistedQueryEntry {
                    id: id.clone(),
                    document,
                    allowed: true,
                }),
            );
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn resolve(&self, id: &QueryId) -> Result<Arc<OperationDocument>, RegistryError> {
        Ok(self.entry(id)?.document.clone())
    }

    pub fn is_allowed(&self, id: &QueryId) -> bool {
        self.entry(id).is_ok_and(|entry| match self.mode {
            RegistryMode::Open => true,
            RegistryMode::Whitelist => entry.allowed,
        })
    }

    /// [`resolve`][Self::resolve], then check the allow-list according to the registry mode
    pub fn lookup(&self, id: &QueryId) -> Result<Arc<OperationDocument>, LookupError> {
        let entry = self
            .entry(id)
            .map_err(|_| LookupError::UnknownQuery(id.clone()))?;
        match self.mode {
            RegistryMode::Whitelist if !entry.allowed => {
                Err(LookupError::QueryNotWhitelisted(id.clone()))
            }
            RegistryMode::Open | RegistryMode::Whitelist => Ok(entry.document.clone()),
        }
    }

    /// Sets the allow-list flag by replacing the entry
    pub fn set_allowed(&self, id: &QueryId, allowed: bool) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get_mut(id) else {
            return Err(RegistryError::UnknownQuery(id.clone()));
        };
        tracing::debug!(%id, allowed, "updating persisted query allow-list");
        *entry = Arc::new(PersistedQueryEntry {
            id: entry.id.clone(),
            document: entry.document.clone(),
            allowed,
        });
        Ok(())
    }

    /// Administrative eviction
    pub fn remove(&self, id: &QueryId) -> Result<Arc<PersistedQueryEntry>, RegistryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownQuery(id.clone()))?;
        tracing::debug!(%id, "removed persisted query");
        Ok(removed)
    }

    /// A snapshot of all entries, sorted by identifier
    pub fn entries(&self) -> Vec<Arc<PersistedQueryEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot: Vec<_> = entries.values().cloned().collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &QueryId) -> Result<Arc<PersistedQueryEntry>, RegistryError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownQuery(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::Schema;

    fn document(source: &str) -> OperationDocument {
        let schema = Schema::parse_and_validate("type Query { a: Int b: Int }", "schema.graphql")
            .unwrap();
        let document =
            ExecutableDocument::parse_and_validate(&schema, source, "query.graphql").unwrap();
        OperationDocument::new(source, document)
    }

    #[test]
    fn content_ids_are_stable_hex_digests() {
        let id = QueryId::for_document("{ a }");
        assert_eq!(
            id.as_str(),
            "1c7e1e347f726166b5b1c55afd61f278cc9b45e00c108ec33d540a566379811b"
        );
        assert_eq!(id, QueryId::for_document("{ a }"));
        assert_ne!(id, QueryId::for_document("{ b }"));
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        assert_eq!(QueryId::new(""), Err(RegistryError::EmptyIdentifier));
    }

    #[test]
    fn registration_is_idempotent() {
        let registry = QueryRegistry::new(RegistryMode::Whitelist);
        let first = registry.register(document("{ a }")).unwrap();
        registry.set_allowed(&first, true).unwrap();
        let second = registry.register(document("{ a }")).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        // re-registering does not reset the allow-list flag
        assert!(registry.is_allowed(&first));
    }

    #[test]
    fn same_id_different_document_is_a_duplicate() {
        let registry = QueryRegistry::new(RegistryMode::Open);
        let id = QueryId::new("manifest-1").unwrap();
        registry
            .register_with_id(id.clone(), document("{ a }"))
            .unwrap();
        assert_eq!(
            registry.register_with_id(id.clone(), document("{ b }")),
            Err(RegistryError::DuplicateIdentifier(id.clone()))
        );
        assert_eq!(registry.resolve(&id).unwrap().source(), "{ a }");
    }

    #[test]
    fn batches_are_registered_entirely_or_not_at_all() {
        let registry = QueryRegistry::new(RegistryMode::Whitelist);
        let taken = QueryId::new("taken").unwrap();
        registry
            .register_with_id(taken.clone(), document("{ a }"))
            .unwrap();
        let id = |name: &str| QueryId::new(name).unwrap();

        let conflicting_within = vec![
            (id("x"), document("{ a }")),
            (id("y"), document("{ b }")),
            (id("y"), document("{ a }")),
        ];
        assert_eq!(
            registry.register_allowed(conflicting_within),
            Err(RegistryError::DuplicateIdentifier(id("y")))
        );
        let conflicting_existing = vec![
            (id("x"), document("{ a }")),
            (taken.clone(), document("{ b }")),
        ];
        assert_eq!(
            registry.register_allowed(conflicting_existing),
            Err(RegistryError::DuplicateIdentifier(taken.clone()))
        );
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_allowed(&taken));

        let batch = vec![
            (id("x"), document("{ b }")),
            (taken.clone(), document("{ a }")),
        ];
        let ids = registry.register_allowed(batch).unwrap();
        assert_eq!(ids, [id("x"), taken.clone()]);
        assert_eq!(registry.len(), 2);
        assert!(registry.is_allowed(&id("x")));
        assert!(registry.is_allowed(&taken));
    }

    #[test]
    fn lookup_reports_only_unknown_or_not_allowed() {
        let registry = QueryRegistry::new(RegistryMode::Whitelist);
        let missing = QueryId::new("missing").unwrap();
        assert_eq!(
            registry.lookup(&missing).unwrap_err(),
            LookupError::UnknownQuery(missing.clone())
        );
        assert_eq!(
            RegistryError::from(LookupError::UnknownQuery(missing.clone())),
            RegistryError::UnknownQuery(missing)
        );
    }

    #[test]
    fn unknown_queries() {
        let registry = QueryRegistry::new(RegistryMode::Open);
        let id = QueryId::new("abc123").unwrap();
        assert_eq!(
            registry.resolve(&id).unwrap_err(),
            RegistryError::UnknownQuery(id.clone())
        );
        assert!(!registry.is_allowed(&id));
        assert_eq!(
            registry.set_allowed(&id, true),
            Err(RegistryError::UnknownQuery(id.clone()))
        );
        assert!(registry.remove(&id).is_err());
    }

    #[test]
    fn whitelist_mode_requires_the_flag() {
        let registry = QueryRegistry::new(RegistryMode::Whitelist);
        let id = registry.register(document("{ a }")).unwrap();
        assert!(!registry.is_allowed(&id));
        assert_eq!(
            registry.lookup(&id).unwrap_err(),
            LookupError::QueryNotWhitelisted(id.clone())
        );
        registry.set_allowed(&id, true).unwrap();
        assert!(registry.lookup(&id).is_ok());
        registry.set_allowed(&id, false).unwrap();
        assert!(registry.lookup(&id).is_err());
    }

    #[test]
    fn open_mode_accepts_every_registered_document() {
        let registry = QueryRegistry::new(RegistryMode::Open);
        let id = registry.register(document("{ a }")).unwrap();
        assert!(registry.is_allowed(&id));
        assert!(registry.lookup(&id).is_ok());
    }

    #[test]
    fn allow_list_changes_replace_entries() {
        let registry = QueryRegistry::new(RegistryMode::Whitelist);
        let id = registry.register(document("{ a }")).unwrap();
        let before = registry.entries().remove(0);
        registry.set_allowed(&id, true).unwrap();
        let after = registry.entries().remove(0);
        assert!(!before.allowed);
        assert!(after.allowed);
        assert!(Arc::ptr_eq(&before.document, &after.document));
    }

    #[test]
    fn removal_evicts() {
        let registry = QueryRegistry::new(RegistryMode::Open);
        let id = registry.register(document("{ b }")).unwrap();
        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let registry = Arc::new(QueryRegistry::new(RegistryMode::Open));
        let id = registry.register(document("{ a }")).unwrap();
        let readers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(registry.lookup(&id).is_ok());
                    }
                })
            })
            .collect();
        for _ in 0..10 {
            registry.register(document("{ a }")).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(registry.len(), 1);
    }
}
