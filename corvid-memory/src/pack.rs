//! Memory packs: line-delimited import/export.
//!
//! A pack is one `{"type":"meta", ...}` header followed by one
//! `{"type":"memory", ...}` record per item. Import is idempotent by
//! identifier; export is deterministically ordered by identifier.

use crate::store::{ExportFilter, MemoryStore};
use chrono::{DateTime, Utc};
use corvid_core::{MemoryItem, StoreError};
use serde::{Deserialize, Serialize};

/// The pack header record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackMeta {
    /// Record discriminator, always `"meta"`.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Pack identifier.
    pub pack_id: String,
    /// Pack format version.
    pub version: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl PackMeta {
    /// A fresh header.
    pub fn new(pack_id: impl Into<String>) -> Self {
        Self {
            record_type: "meta".into(),
            pack_id: pack_id.into(),
            version: 1,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MemoryRecord {
    #[serde(rename = "type")]
    record_type: String,
    #[serde(flatten)]
    item: MemoryItem,
}

/// Result of one import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Items newly inserted.
    pub imported: usize,
    /// Items that already existed (counters bumped).
    pub duplicates: usize,
}

/// Export every item passing the filter as a pack string.
pub async fn export_pack(
    store: &dyn MemoryStore,
    pack_id: &str,
    filter: &ExportFilter,
) -> Result<String, StoreError> {
    let items = store.all_items(filter).await?;
    let mut out = serde_json::to_string(&PackMeta::new(pack_id)).map_err(serialization)?;
    out.push('\n');
    for item in items {
        let record = MemoryRecord {
            record_type: "memory".into(),
            item,
        };
        out.push_str(&serde_json::to_string(&record).map_err(serialization)?);
        out.push('\n');
    }
    Ok(out)
}

/// Import a pack. Identifiers are recomputed from content; a record
/// whose stored id disagrees with its content hash is rejected.
pub async fn import_pack(
    store: &dyn MemoryStore,
    pack: &str,
) -> Result<ImportOutcome, StoreError> {
    let mut lines = pack.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| StoreError::BadPack("empty pack".into()))?;
    let meta: PackMeta = serde_json::from_str(header)
        .map_err(|e| StoreError::BadPack(format!("bad meta record: {e}")))?;
    if meta.record_type != "meta" {
        return Err(StoreError::BadPack("first record must have type=meta".into()));
    }

    let mut outcome = ImportOutcome::default();
    for line in lines {
        let record: MemoryRecord = serde_json::from_str(line)
            .map_err(|e| StoreError::BadPack(format!("bad memory record: {e}")))?;
        if record.record_type != "memory" {
            return Err(StoreError::BadPack(format!(
                "unexpected record type `{}`",
                record.record_type
            )));
        }
        let mut item = record.item;
        let expected = MemoryItem::identity(&item.title, &item.content, &item.scope);
        if item.memory_id != expected {
            return Err(StoreError::BadPack(format!(
                "record `{}` does not hash to its identifier",
                item.memory_id
            )));
        }
        if item.provenance.pack_id.is_none() {
            item.provenance.pack_id = Some(meta.pack_id.clone());
        }
        if store.upsert_item(&item).await? {
            outcome.imported += 1;
        } else {
            outcome.duplicates += 1;
        }
    }
    tracing::info!(
        pack = %meta.pack_id,
        imported = outcome.imported,
        duplicates = outcome.duplicates,
        "pack imported"
    );
    Ok(outcome)
}

fn serialization(e: serde_json::Error) -> StoreError {
    StoreError::Serialization(e.to_string())
}
