//! Snapshot writer and reader.
//!
//! File layout, little-endian throughout:
//!
//! ```text
//! [Magic "VNTS": 4 bytes]
//! [Format version: u16]
//! [Created at (unix seconds): u64]
//! [Compression: u8, 0 = none]
//! [Section count: u32]
//! [Directory: (section_id: u32, offset: u64, length: u64, crc32: u32) × N]
//! [Section payloads]
//! ```
//!
//! Sections: storage records (bincode), database manifest (JSON), quantizer
//! state (JSON), HNSW graph image (bincode). Each section is validated
//! against its directory CRC32 before parsing.

use crate::config::{DatabaseOptions, StorageConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::persistence::crc32_hash;
use crate::quantize::AnyQuantizer;
use crate::record::{Metadata, VectorRecord};

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const MAGIC: &[u8; 4] = b"VNTS";
const FORMAT_VERSION: u16 = 1;
const COMPRESSION_NONE: u8 = 0;

const SECTION_STORAGE: u32 = 1;
const SECTION_MANIFEST: u32 = 2;
const SECTION_QUANTIZER: u32 = 3;
const SECTION_HNSW_GRAPH: u32 = 4;

/// Fixed header size: magic + version + created_at + compression + count.
const HEADER_LEN: usize = 4 + 2 + 8 + 1 + 4;
/// Directory entry size: id + offset + length + crc32.
const DIR_ENTRY_LEN: usize = 4 + 8 + 8 + 4;

/// One storage record in snapshot form. Metadata travels as its JSON text,
/// which keeps the section format self-contained.
#[derive(Debug, Serialize, Deserialize)]
struct RecordSnapshot {
    id: String,
    vector: Vec<f32>,
    metadata_json: Option<String>,
}

/// Database-level manifest: the creation options and the discovered
/// dimension at snapshot time.
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    options: DatabaseOptions,
    dimensions: Option<usize>,
}

/// Writes database snapshots.
pub struct SnapshotWriter;

impl SnapshotWriter {
    /// Serializes the database's storage records, manifest, quantizer
    /// state, and (for HNSW) graph image into a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns `Persistence`/`Serialization` errors on encoding failures
    /// and `Io` errors from the file write.
    pub fn write<P: AsRef<Path>>(db: &Database, path: P) -> Result<()> {
        let records = db.export_records()?;
        let record_snapshots = records
            .into_iter()
            .map(|record| {
                let metadata_json = record
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                Ok(RecordSnapshot {
                    id: record.id.ok_or_else(|| {
                        Error::Persistence("exported record is missing its id".to_string())
                    })?,
                    vector: record.vector,
                    metadata_json,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let manifest = Manifest {
            options: db.options().clone(),
            dimensions: db.dimensions(),
        };

        let mut sections: Vec<(u32, Vec<u8>)> = vec![
            (
                SECTION_STORAGE,
                bincode::serialize(&record_snapshots)
                    .map_err(|e| Error::Serialization(e.to_string()))?,
            ),
            (
                SECTION_MANIFEST,
                serde_json::to_vec(&manifest).map_err(|e| Error::Serialization(e.to_string()))?,
            ),
        ];
        if let Some(quantizer) = db.quantizer_state() {
            sections.push((
                SECTION_QUANTIZER,
                serde_json::to_vec(&quantizer)
                    .map_err(|e| Error::Serialization(e.to_string()))?,
            ));
        }
        if let Some(graph) = db.hnsw_snapshot() {
            sections.push((
                SECTION_HNSW_GRAPH,
                bincode::serialize(&graph).map_err(|e| Error::Serialization(e.to_string()))?,
            ));
        }

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());

        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&created_at.to_le_bytes())?;
        writer.write_all(&[COMPRESSION_NONE])?;
        let count = u32::try_from(sections.len())
            .map_err(|_| Error::Persistence("too many sections".to_string()))?;
        writer.write_all(&count.to_le_bytes())?;

        let mut offset = (HEADER_LEN + sections.len() * DIR_ENTRY_LEN) as u64;
        for (section_id, payload) in &sections {
            writer.write_all(&section_id.to_le_bytes())?;
            writer.write_all(&offset.to_le_bytes())?;
            writer.write_all(&(payload.len() as u64).to_le_bytes())?;
            writer.write_all(&crc32_hash(payload).to_le_bytes())?;
            offset += payload.len() as u64;
        }
        for (_, payload) in &sections {
            writer.write_all(payload)?;
        }
        writer.flush()?;
        writer
            .into_inner()
            .map_err(std::io::IntoInnerError::into_error)?
            .sync_all()?;

        debug!(path = %path.as_ref().display(), sections = sections.len(), "snapshot written");
        Ok(())
    }
}

/// Reads database snapshots.
pub struct SnapshotReader;

impl SnapshotReader {
    /// Restores a snapshot into a fresh, initialized coordinator backed by
    /// in-memory storage.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` errors for an incompatible version or a
    /// checksum failure.
    pub fn restore<P: AsRef<Path>>(path: P) -> Result<Database> {
        Self::restore_with(path, StorageConfig::Memory)
    }

    /// Restores a snapshot into a fresh, initialized coordinator with the
    /// given storage backend.
    ///
    /// # Errors
    ///
    /// As [`SnapshotReader::restore`].
    pub fn restore_with<P: AsRef<Path>>(path: P, storage: StorageConfig) -> Result<Database> {
        let mut bytes = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut bytes)?;
        let sections = parse_sections(&bytes)?;

        let manifest_bytes = section(&sections, SECTION_MANIFEST)?;
        let manifest: Manifest = serde_json::from_slice(manifest_bytes)
            .map_err(|e| Error::Persistence(format!("malformed manifest: {e}")))?;

        let record_bytes = section(&sections, SECTION_STORAGE)?;
        let record_snapshots: Vec<RecordSnapshot> = bincode::deserialize(record_bytes)
            .map_err(|e| Error::Persistence(format!("malformed storage section: {e}")))?;
        let records = record_snapshots
            .into_iter()
            .map(|snapshot| {
                let metadata = snapshot
                    .metadata_json
                    .as_deref()
                    .map(serde_json::from_str::<Metadata>)
                    .transpose()
                    .map_err(|e| Error::Persistence(format!("malformed metadata: {e}")))?;
                Ok(VectorRecord::new(snapshot.id, snapshot.vector, metadata))
            })
            .collect::<Result<Vec<_>>>()?;

        let quantizer = sections
            .iter()
            .find(|(id, _)| *id == SECTION_QUANTIZER)
            .map(|(_, payload)| {
                serde_json::from_slice::<AnyQuantizer>(payload)
                    .map_err(|e| Error::Persistence(format!("malformed quantizer section: {e}")))
            })
            .transpose()?;

        let graph = sections
            .iter()
            .find(|(id, _)| *id == SECTION_HNSW_GRAPH)
            .map(|(_, payload)| {
                bincode::deserialize(payload)
                    .map_err(|e| Error::Persistence(format!("malformed graph section: {e}")))
            })
            .transpose()?;

        let options = DatabaseOptions {
            storage,
            dimensions: manifest.dimensions.or(manifest.options.dimensions),
            ..manifest.options
        };

        let db = Database::restore_parts(options, records, quantizer, graph)?;
        db.initialize()?;
        Ok(db)
    }
}

fn parse_sections(bytes: &[u8]) -> Result<Vec<(u32, &[u8])>> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Persistence("snapshot file truncated".to_string()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(Error::Persistence("not a snapshot file".to_string()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(Error::Persistence(format!(
            "incompatible version {version} (supported: {FORMAT_VERSION})"
        )));
    }
    let compression = bytes[14];
    if compression != COMPRESSION_NONE {
        return Err(Error::Persistence(format!(
            "unsupported compression {compression}"
        )));
    }
    let count = u32::from_le_bytes([bytes[15], bytes[16], bytes[17], bytes[18]]) as usize;
    if bytes.len() < HEADER_LEN + count * DIR_ENTRY_LEN {
        return Err(Error::Persistence("snapshot directory truncated".to_string()));
    }

    let mut sections = Vec::with_capacity(count);
    for i in 0..count {
        let base = HEADER_LEN + i * DIR_ENTRY_LEN;
        let entry = &bytes[base..base + DIR_ENTRY_LEN];
        let section_id = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
        let offset = usize::try_from(u64::from_le_bytes(entry[4..12].try_into().map_err(
            |_| Error::Persistence("malformed directory entry".to_string()),
        )?))
        .map_err(|_| Error::Persistence("section offset overflows".to_string()))?;
        let length = usize::try_from(u64::from_le_bytes(entry[12..20].try_into().map_err(
            |_| Error::Persistence("malformed directory entry".to_string()),
        )?))
        .map_err(|_| Error::Persistence("section length overflows".to_string()))?;
        let expected_crc =
            u32::from_le_bytes([entry[20], entry[21], entry[22], entry[23]]);

        let end = offset
            .checked_add(length)
            .ok_or_else(|| Error::Persistence("section range overflows".to_string()))?;
        if end > bytes.len() {
            return Err(Error::Persistence("section out of bounds".to_string()));
        }
        let payload = &bytes[offset..end];
        if crc32_hash(payload) != expected_crc {
            return Err(Error::Persistence("integrity check failed".to_string()));
        }
        sections.push((section_id, payload));
    }
    Ok(sections)
}

fn section<'a>(sections: &[(u32, &'a [u8])], wanted: u32) -> Result<&'a [u8]> {
    sections
        .iter()
        .find(|(id, _)| *id == wanted)
        .map(|(_, payload)| *payload)
        .ok_or_else(|| Error::Persistence(format!("missing section {wanted}")))
}
