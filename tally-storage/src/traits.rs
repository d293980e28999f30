//! Storage traits.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tally_core::Result;

/// Durable mapping from a collection key to a whole JSON document.
///
/// Collections are read and written as a unit; there is no partial update.
pub trait KvStore: Send + Sync {
    /// Get the document stored under `key`.
    fn get_value(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the document stored under `key`.
    fn set_value(&self, key: &str, value: Value) -> Result<()>;

    /// Check if a document exists under `key`.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get_value(key)?.is_some())
    }
}

/// Typed access on top of [`KvStore`].
pub trait KvStoreExt: KvStore {
    /// Load and decode the collection under `key`.
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_value(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Encode and store a collection under `key`.
    fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set_value(key, serde_json::to_value(value)?)
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}
