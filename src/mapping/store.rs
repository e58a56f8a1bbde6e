use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::{Mapping, MappingKey};
use crate::error::{CoreError, CoreResult};
use crate::presence::SignalSource;
use crate::system::KeyValueStore;

const BACKGROUND_ENABLED_KEY: &str = "background_enabled";
const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MappingRecord {
    audio_ref: String,
    audio_label: String,
    display_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingEnvelope {
    version: u32,
    mappings: BTreeMap<MappingKey, MappingRecord>,
}

/// Row shape written before blobs carried a version
#[derive(Debug, Deserialize)]
struct LegacyRecord {
    #[serde(rename = "songUri")]
    song_uri: String,
    #[serde(rename = "songName", default)]
    song_name: String,
    #[serde(rename = "name", alias = "wifiName", default)]
    name: String,
}

impl From<LegacyRecord> for MappingRecord {
    fn from(legacy: LegacyRecord) -> Self {
        Self {
            audio_ref: legacy.song_uri,
            audio_label: legacy.song_name,
            display_name: legacy.name,
        }
    }
}

type Rows = BTreeMap<MappingKey, MappingRecord>;

/// Persists one blob per namespace in a [`KeyValueStore`].
///
/// Every mutation reads the whole namespace, edits it in memory and writes it
/// back as one unit. Two overlapping writers to the same namespace can lose an
/// update (last write wins on the blob).
pub struct MappingStore<K: KeyValueStore> {
    kv: K,
}

impl<K: KeyValueStore> MappingStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// All rows of a namespace, ordered by identity
    pub async fn list(&self, namespace: SignalSource) -> CoreResult<Vec<Mapping>> {
        let rows = self.read_namespace(namespace).await?;
        Ok(rows
            .into_iter()
            .map(|(identity, record)| to_mapping(identity, record))
            .collect())
    }

    pub async fn get(&self, namespace: SignalSource, identity: &str) -> CoreResult<Option<Mapping>> {
        let mut rows = self.read_namespace(namespace).await?;
        Ok(rows
            .remove(identity)
            .map(|record| to_mapping(identity.to_string(), record)))
    }

    /// Insert or overwrite the row for `mapping.identity`
    pub async fn upsert(&self, namespace: SignalSource, mapping: Mapping) -> CoreResult<()> {
        let mut rows = self.read_namespace(namespace).await?;
        debug!(
            "Upserting {} mapping for {} ({} existing rows)",
            namespace,
            mapping.identity,
            rows.len()
        );
        rows.insert(
            mapping.identity,
            MappingRecord {
                audio_ref: mapping.audio_ref,
                audio_label: mapping.audio_label,
                display_name: mapping.display_name,
            },
        );
        self.write_namespace(namespace, &rows).await
    }

    /// Remove a row. Removing an absent identity succeeds without writing.
    pub async fn remove(&self, namespace: SignalSource, identity: &str) -> CoreResult<()> {
        let mut rows = self.read_namespace(namespace).await?;
        if rows.remove(identity).is_none() {
            debug!("No {} mapping for {}, nothing to remove", namespace, identity);
            return Ok(());
        }
        self.write_namespace(namespace, &rows).await
    }

    /// Whether the user enabled background monitoring; missing means disabled
    pub async fn background_enabled(&self) -> CoreResult<bool> {
        Ok(self
            .kv
            .get_item(BACKGROUND_ENABLED_KEY)
            .await?
            .is_some_and(|value| value == "true"))
    }

    pub async fn set_background_enabled(&self, enabled: bool) -> CoreResult<()> {
        info!("Background monitoring {}", if enabled { "enabled" } else { "disabled" });
        self.kv
            .set_item(BACKGROUND_ENABLED_KEY, if enabled { "true" } else { "false" })
            .await
    }

    async fn read_namespace(&self, namespace: SignalSource) -> CoreResult<Rows> {
        match self.kv.get_item(namespace.storage_key()).await? {
            Some(blob) => decode_rows(&blob),
            None => Ok(Rows::new()),
        }
    }

    async fn write_namespace(&self, namespace: SignalSource, rows: &Rows) -> CoreResult<()> {
        let blob = serde_json::to_string(&MappingEnvelope {
            version: CURRENT_VERSION,
            mappings: rows.clone(),
        })?;
        self.kv.set_item(namespace.storage_key(), &blob).await
    }
}

fn to_mapping(identity: MappingKey, record: MappingRecord) -> Mapping {
    Mapping {
        identity,
        display_name: record.display_name,
        audio_ref: record.audio_ref,
        audio_label: record.audio_label,
    }
}

fn decode_rows(blob: &str) -> CoreResult<Rows> {
    let value: serde_json::Value = serde_json::from_str(blob)?;

    match value.get("version").and_then(|v| v.as_u64()) {
        Some(version) if version == u64::from(CURRENT_VERSION) => {
            let envelope: MappingEnvelope = serde_json::from_value(value)?;
            Ok(envelope.mappings)
        }
        Some(version) => Err(CoreError::Storage(format!(
            "unsupported mapping blob version {}",
            version
        ))),
        None => {
            let legacy: BTreeMap<MappingKey, LegacyRecord> = serde_json::from_value(value)?;
            if !legacy.is_empty() {
                warn!(
                    "Read {} mappings in the unversioned format; they will be rewritten on the next save",
                    legacy.len()
                );
            }
            Ok(legacy
                .into_iter()
                .map(|(identity, record)| (identity, record.into()))
                .collect())
        }
    }
}
