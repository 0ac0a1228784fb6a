//! Registered views and the relation provider that resolves them

use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;

use super::TransformDef;
use crate::error::IngestError;
use crate::query::{QueryError, Relation, RelationProvider, StoreRelations};
use crate::store::{StoreError, TableStore};

/// Nesting limit for views defined over views
const MAX_VIEW_DEPTH: usize = 32;

/// Views registered by transform runs, keyed by lowercase name
#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: RwLock<BTreeMap<String, TransformDef>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or redefine a view
    pub fn register(&self, def: TransformDef) {
        self.views.write().insert(def.name.to_ascii_lowercase(), def);
    }

    pub fn get(&self, name: &str) -> Option<TransformDef> {
        self.views.read().get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<TransformDef> {
        self.views.write().remove(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        self.views.read().values().map(|d| d.name.clone()).collect()
    }

    pub fn load_from(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let json = std::fs::read_to_string(path)?;
        let defs: Vec<TransformDef> =
            serde_json::from_str(&json).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let registry = Self::new();
        for def in defs {
            registry.register(def);
        }
        Ok(registry)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        let defs: Vec<TransformDef> = self.views.read().values().cloned().collect();
        let json = serde_json::to_string_pretty(&defs)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Tables from a store, then registered views computed on read
pub struct CatalogRelations<'a> {
    tables: StoreRelations<'a>,
    views: &'a ViewRegistry,
    depth: Cell<usize>,
}

impl<'a> CatalogRelations<'a> {
    pub fn new(tables: &'a dyn TableStore, views: &'a ViewRegistry) -> Self {
        Self {
            tables: StoreRelations(tables),
            views,
            depth: Cell::new(0),
        }
    }
}

impl RelationProvider for CatalogRelations<'_> {
    fn relation(&self, name: &str) -> Result<Relation, QueryError> {
        match self.tables.relation(name) {
            Err(QueryError::UnknownRelation(_)) => {}
            found => return found,
        }
        let Some(def) = self.views.get(name) else {
            return Err(QueryError::UnknownRelation(name.to_string()));
        };
        if self.depth.get() >= MAX_VIEW_DEPTH {
            return Err(QueryError::Invalid(format!(
                "view '{}' nests more than {} levels deep",
                name, MAX_VIEW_DEPTH
            )));
        }
        self.depth.set(self.depth.get() + 1);
        let result = def.compute(self);
        self.depth.set(self.depth.get() - 1);
        result.map_err(|e| match e {
            IngestError::Query(q) => q,
            IngestError::Dependency(message) => QueryError::UnknownRelation(message),
            other => QueryError::Invalid(other.to_string()),
        })
    }
}
