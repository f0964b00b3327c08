//! Test fixtures and database helpers.
//!
//! Provides a small form schema, its stores, and helpers that open a
//! database on a fresh factory with every store created.

use serde::{Deserialize, Serialize};
use stepvault_core::{
    CoreError, CoreResult, Database, Factory, IndexDef, Key, OpenOptions, Schema, StoreDef,
    TransactionMode, Value,
};

/// Schema used throughout the tests.
#[derive(Debug)]
pub struct FormSchema;

impl Schema for FormSchema {
    const DATABASE_NAMES: &'static [&'static str] = &["forms", "db"];
    const STORE_NAMES: &'static [&'static str] = &[Profiles::NAME, Answers::NAME, Sessions::NAME];
}

/// A postal address, nested one level inside [`Profile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// City.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Postal code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

/// A profile record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Age in years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    /// Address.
    #[serde(default)]
    pub address: Address,
}

/// Profiles by user name.
#[derive(Debug)]
pub struct Profiles;

impl StoreDef for Profiles {
    type Schema = FormSchema;
    type Key = String;
    type Value = Profile;
    const NAME: &'static str = "profiles";
    const INDEXES: &'static [IndexDef] = &[IndexDef {
        name: "by_age",
        key_path: "age",
        unique: false,
        multi_entry: false,
    }];
}

/// Free-form answers by question number.
#[derive(Debug)]
pub struct Answers;

impl StoreDef for Answers {
    type Schema = FormSchema;
    type Key = i64;
    type Value = String;
    const NAME: &'static str = "answers";
}

/// The current session: maps `"current"` to the active user name.
#[derive(Debug)]
pub struct Sessions;

impl StoreDef for Sessions {
    type Schema = FormSchema;
    type Key = String;
    type Value = String;
    const NAME: &'static str = "sessions";
}

/// Open options whose upgrade creates every store of [`FormSchema`].
pub fn create_all_stores() -> OpenOptions<FormSchema> {
    OpenOptions::new().upgrade(|upgrade| async move {
        upgrade.create_store::<Profiles>().await?;
        upgrade.create_store::<Answers>().await?;
        upgrade.create_store::<Sessions>().await?;
        Ok(())
    })
}

/// A database on its own factory.
#[derive(Debug)]
pub struct TestDatabase {
    /// The factory the database lives in.
    pub factory: Factory,
    /// The open database.
    pub db: Database<FormSchema>,
}

impl TestDatabase {
    /// Opens `"forms"` at version 1 on a fresh factory with every store.
    pub async fn open() -> CoreResult<Self> {
        let factory = Factory::new();
        let db = Database::open(&factory, "forms", 1, create_all_stores()).await?;
        Ok(Self { factory, db })
    }

    /// Reads a raw record, bypassing the typed layer.
    pub async fn record(&self, store: &str, key: impl Into<Key>) -> CoreResult<Option<Value>> {
        let key = key.into();
        self.db
            .transaction(&[store], TransactionMode::ReadOnly, |stores| async move {
                stores.raw(store)?.get(&key).await
            })
            .await
    }

    /// Writes a raw record, bypassing the typed layer.
    pub async fn seed(&self, store: &str, key: impl Into<Key>, value: Value) -> CoreResult<()> {
        let key = key.into();
        self.db
            .transaction(&[store], TransactionMode::ReadWrite, |stores| async move {
                stores.raw(store)?.put(key, &value).await?;
                Ok::<_, CoreError>(())
            })
            .await
    }

    /// Number of records in `store`.
    pub async fn count(&self, store: &str) -> CoreResult<usize> {
        self.db
            .transaction(&[store], TransactionMode::ReadOnly, |stores| async move {
                stores.raw(store)?.count().await
            })
            .await
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database<FormSchema>;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Builds a record from JSON. Numbers must be integers.
///
/// # Panics
///
/// Panics if the JSON cannot be represented as a record.
pub fn json_record(json: serde_json::Value) -> Value {
    stepvault_codec::to_value(&json).expect("JSON is not a valid record")
}
