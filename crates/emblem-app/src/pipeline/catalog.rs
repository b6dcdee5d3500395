use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::constants::{SENTINEL_DESCRIPTION, SENTINEL_KEY, SENTINEL_URL};

/// A named asset in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub key: String,
    /// Where the asset bytes were finally stored: a local path or a public URL.
    pub location_ref: String,
    pub description: String,
}

impl CatalogRecord {
    pub fn new(
        key: impl Into<String>,
        location_ref: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            location_ref: location_ref.into(),
            description: description.into(),
        }
    }

    pub fn sentinel() -> Self {
        Self::new(SENTINEL_KEY, SENTINEL_URL, SENTINEL_DESCRIPTION)
    }
}

/// On-disk shape of a record; the key lives in the enclosing map.
#[derive(Debug, Deserialize)]
struct PersistedRecord {
    url: String,
    description: String,
}

#[derive(Serialize)]
struct PersistedRecordRef<'a> {
    url: &'a str,
    description: &'a str,
}

/// Insertion-ordered mapping from unique key to record.
///
/// Serialized as a JSON object `key -> {"url", "description"}` in insertion
/// order so the persisted file stays readable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    records: IndexMap<String, CatalogRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&CatalogRecord> {
        self.records.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &CatalogRecord> {
        self.records.values()
    }

    /// Insert a record under its own key, returning any record it displaced.
    ///
    /// Callers obtain keys from [`crate::pipeline::reserve_key`], so a displaced
    /// record indicates a bug upstream.
    pub fn insert(&mut self, record: CatalogRecord) -> Option<CatalogRecord> {
        debug_assert!(!record.key.is_empty());
        self.records.insert(record.key.clone(), record)
    }

    /// Append the `default` fallback record unless it is already present.
    pub fn insert_sentinel(&mut self) -> bool {
        if self.records.contains_key(SENTINEL_KEY) {
            return false;
        }
        self.records
            .insert(SENTINEL_KEY.to_string(), CatalogRecord::sentinel());
        true
    }

    /// Pretty-printed JSON document as persisted to disk and object storage.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.records.iter().map(|(key, record)| {
            (
                key,
                PersistedRecordRef {
                    url: &record.location_ref,
                    description: &record.description,
                },
            )
        }))
    }
}

impl<'de> Deserialize<'de> for Catalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: IndexMap<String, PersistedRecord> = IndexMap::deserialize(deserializer)?;
        let records = raw
            .into_iter()
            .map(|(key, persisted)| {
                let record = CatalogRecord::new(key.clone(), persisted.url, persisted.description);
                (key, record)
            })
            .collect();
        Ok(Self { records })
    }
}

impl FromIterator<CatalogRecord> for Catalog {
    fn from_iter<T: IntoIterator<Item = CatalogRecord>>(iter: T) -> Self {
        let mut catalog = Catalog::new();
        for record in iter {
            catalog.insert(record);
        }
        catalog
    }
}
