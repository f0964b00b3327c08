//! Descriptors binding component values to stored records.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use stepvault_core::{CoreResult, Key, PathWrite, PropertyPath, StoreDef, StoreKey, Stores, Value};

/// Computes a record key from inside the transaction that uses it.
pub type KeyAccessor = Arc<dyn Fn(Stores) -> BoxFuture<'static, CoreResult<Key>> + Send + Sync>;

/// Key of a mapped record.
#[derive(Clone)]
pub enum MapKey {
    /// A fixed key.
    Literal(Key),
    /// A key read from storage. The accessor may only touch `store_names`.
    Computed {
        /// Stores the accessor reads.
        store_names: Vec<String>,
        /// The accessor.
        accessor: KeyAccessor,
    },
}

impl fmt::Debug for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(key) => f.debug_tuple("Literal").field(key).finish(),
            Self::Computed { store_names, .. } => f
                .debug_struct("Computed")
                .field("store_names", store_names)
                .finish_non_exhaustive(),
        }
    }
}

/// A `(store, key, property)` coordinate.
///
/// Reads and writes run inside a transaction that covers
/// [`DatabaseMap::store_names`].
#[derive(Debug, Clone)]
pub struct DatabaseMap {
    store_name: String,
    key: MapKey,
    property: PropertyPath,
}

impl DatabaseMap {
    /// Maps to the whole record at `key` in `store_name`.
    pub fn new(store_name: impl Into<String>, key: impl Into<Key>) -> Self {
        Self {
            store_name: store_name.into(),
            key: MapKey::Literal(key.into()),
            property: PropertyPath::Whole,
        }
    }

    /// Maps to the whole record at `key` in store `D`.
    pub fn typed<D: StoreDef>(key: &D::Key) -> Self {
        Self::new(D::NAME, key.to_key())
    }

    /// Maps to a record whose key is computed by `accessor`, which reads
    /// `key_store_names`.
    pub fn computed<F, Fut>(
        store_name: impl Into<String>,
        key_store_names: &[&str],
        accessor: F,
    ) -> Self
    where
        F: Fn(Stores) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CoreResult<Key>> + Send + 'static,
    {
        Self {
            store_name: store_name.into(),
            key: MapKey::Computed {
                store_names: key_store_names.iter().map(|s| (*s).to_string()).collect(),
                accessor: Arc::new(move |stores| accessor(stores).boxed()),
            },
            property: PropertyPath::Whole,
        }
    }

    /// Addresses a field of the record.
    #[must_use]
    pub fn property(mut self, path: PropertyPath) -> Self {
        self.property = path;
        self
    }

    /// Addresses a top-level field.
    #[must_use]
    pub fn field(self, k0: impl Into<String>) -> Self {
        self.property(PropertyPath::field(k0))
    }

    /// Addresses a nested field.
    #[must_use]
    pub fn nested(self, k0: impl Into<String>, k1: impl Into<String>) -> Self {
        self.property(PropertyPath::nested(k0, k1))
    }

    /// Store holding the record.
    #[must_use]
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Key descriptor.
    #[must_use]
    pub fn key(&self) -> &MapKey {
        &self.key
    }

    /// Property path.
    #[must_use]
    pub fn path(&self) -> &PropertyPath {
        &self.property
    }

    /// Every store a transaction must cover to use this map.
    #[must_use]
    pub fn store_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::from([self.store_name.clone()]);
        if let MapKey::Computed { store_names, .. } = &self.key {
            names.extend(store_names.iter().cloned());
        }
        names
    }

    /// Resolves the record key.
    pub async fn resolve_key(&self, stores: &Stores) -> CoreResult<Key> {
        match &self.key {
            MapKey::Literal(key) => Ok(key.clone()),
            MapKey::Computed { accessor, .. } => accessor(stores.clone()).await,
        }
    }

    /// Reads the mapped value.
    pub async fn read(&self, stores: &Stores) -> CoreResult<Option<Value>> {
        let key = self.resolve_key(stores).await?;
        let record = stores.raw(&self.store_name)?.get(&key).await?;
        Ok(self.property.read(record.as_ref()))
    }

    /// Writes `value` through the property path. A value equal to `empty`
    /// clears the addressed field, or the whole record without a path.
    pub async fn persist(&self, stores: &Stores, value: Value, empty: &Value) -> CoreResult<()> {
        let key = self.resolve_key(stores).await?;
        let store = stores.raw(&self.store_name)?;
        let record = match self.property {
            PropertyPath::Whole => None,
            _ => store.get(&key).await?,
        };
        match self.property.write(record, value, empty) {
            PathWrite::Put(record) => {
                store.put(key, &record).await?;
            }
            PathWrite::Delete => store.delete(&key).await?,
            PathWrite::Unchanged => {}
        }
        Ok(())
    }

    /// Deletes the whole mapped record.
    pub async fn purge(&self, stores: &Stores) -> CoreResult<()> {
        let key = self.resolve_key(stores).await?;
        stores.raw(&self.store_name)?.delete(&key).await
    }
}

/// A [`DatabaseMap`] attached to one component.
#[derive(Debug, Clone)]
pub struct ComponentDatabaseMap {
    component_key: String,
    map: DatabaseMap,
}

impl ComponentDatabaseMap {
    /// Attaches `map` to the component `component_key`.
    pub fn new(component_key: impl Into<String>, map: DatabaseMap) -> Self {
        Self {
            component_key: component_key.into(),
            map,
        }
    }

    /// Key of the component.
    #[must_use]
    pub fn component_key(&self) -> &str {
        &self.component_key
    }

    /// The map itself.
    #[must_use]
    pub fn map(&self) -> &DatabaseMap {
        &self.map
    }
}
