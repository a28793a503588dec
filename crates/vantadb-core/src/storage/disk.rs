//! Disk-resident storage backend.
//!
//! Layout inside `data_dir`:
//!
//! - `vectors.dat` — memory-mapped data file of fixed-size f32 slots
//! - `vectors.idx` — persisted id → offset index plus the dimension
//! - `vectors.wal` — append-only op log of writes since the last flush
//! - `payloads.log` — append-only metadata log, length-prefixed entries
//!
//! `flush()` persists the index and truncates the WAL; on open the index is
//! loaded and any WAL entries written after the last flush are replayed, so
//! a crash between flushes loses nothing that reached the WAL. The payload
//! log is replayed in full to rebuild the metadata offset index, and the
//! recovered record count is exposed via `stats()`.

use crate::error::{Error, Result};
use crate::record::Metadata;
use crate::storage::paging::{check_page_size, Cursor, IdPage};
use crate::storage::traits::{StorageStats, VectorStorage};
use crate::storage::vector_bytes::{bytes_to_vector, vector_to_bytes};

use indexmap::IndexMap;
use memmap2::MmapMut;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// WAL op tags.
const OP_STORE: u8 = 1;
const OP_DELETE: u8 = 2;

/// Payload length sentinel marking a deletion.
const PAYLOAD_TOMBSTONE: u32 = u32::MAX;

/// Persisted form of the id → offset index.
#[derive(Serialize, Deserialize)]
struct DiskIndexFile {
    dimension: u64,
    entries: Vec<(String, u64)>,
}

/// Disk-resident storage backend.
#[derive(Debug)]
pub struct DiskStorage {
    path: PathBuf,
    dimension: Option<usize>,
    /// id -> byte offset of the vector slot in `vectors.dat`.
    index: FxHashMap<String, usize>,
    data_file: Option<File>,
    mmap: Option<MmapMut>,
    next_offset: usize,
    wal: io::BufWriter<File>,
    payload_log: io::BufWriter<File>,
    payload_reader: RwLock<File>,
    /// id -> byte offset of the entry start in `payloads.log`.
    payload_index: FxHashMap<String, u64>,
    /// Bounded metadata read cache, insertion-ordered for cheap eviction.
    payload_cache: RwLock<IndexMap<String, Metadata>>,
    cache_budget_bytes: usize,
    cached_bytes: RwLock<usize>,
    recovered_count: usize,
    closed: bool,
}

impl DiskStorage {
    const INITIAL_SIZE: u64 = 16 * 1024 * 1024;
    const MIN_GROWTH: u64 = 64 * 1024 * 1024;
    const GROWTH_FACTOR: u64 = 2;

    /// Opens or creates a disk storage in `data_dir`.
    ///
    /// Existing records are recovered from the persisted index, the WAL,
    /// and the payload log.
    ///
    /// # Errors
    ///
    /// Returns an `Io` or `Storage` error if any file cannot be opened or a
    /// recovery record is malformed.
    pub fn open<P: AsRef<Path>>(data_dir: P, cache_size_mb: usize) -> Result<Self> {
        let path = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        // 1. Load the persisted index, if any.
        let idx_path = path.join("vectors.idx");
        let (dimension, index, next_offset) = if idx_path.exists() {
            let file = File::open(&idx_path)?;
            let parsed: DiskIndexFile = bincode::deserialize_from(BufReader::new(file))
                .map_err(|e| Error::Storage(format!("corrupt index file: {e}")))?;
            let dimension = usize::try_from(parsed.dimension)
                .map_err(|_| Error::Storage("corrupt index file: bad dimension".to_string()))?;
            let slot = dimension * 4;
            let mut index = FxHashMap::default();
            let mut max_end = 0usize;
            for (id, offset) in parsed.entries {
                let offset = usize::try_from(offset)
                    .map_err(|_| Error::Storage("corrupt index file: bad offset".to_string()))?;
                max_end = max_end.max(offset + slot);
                index.insert(id, offset);
            }
            (Some(dimension).filter(|d| *d > 0), index, max_end)
        } else {
            (None, FxHashMap::default(), 0)
        };

        // 2. Map the data file when the dimension is already known.
        let (data_file, mmap) = if dimension.is_some() {
            let (file, map) = Self::open_data_file(&path)?;
            (Some(file), Some(map))
        } else {
            (None, None)
        };

        let mut storage = Self {
            path: path.clone(),
            dimension,
            index,
            data_file,
            mmap,
            next_offset,
            wal: Self::open_append(&path.join("vectors.wal"))?,
            payload_log: Self::open_append(&path.join("payloads.log"))?,
            payload_reader: RwLock::new(Self::open_reader(&path.join("payloads.log"))?),
            payload_index: FxHashMap::default(),
            payload_cache: RwLock::new(IndexMap::new()),
            cache_budget_bytes: cache_size_mb.saturating_mul(1024 * 1024),
            cached_bytes: RwLock::new(0),
            recovered_count: 0,
            closed: false,
        };

        // 3. Replay writes that postdate the last flush.
        storage.replay_wal()?;

        // 4. Rebuild the metadata offset index.
        storage.replay_payload_log()?;

        storage.recovered_count = storage.index.len();
        if storage.recovered_count > 0 {
            debug!(
                count = storage.recovered_count,
                path = %storage.path.display(),
                "recovered records from disk"
            );
        }
        Ok(storage)
    }

    fn open_append(path: &Path) -> Result<io::BufWriter<File>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(io::BufWriter::new(file))
    }

    fn open_reader(path: &Path) -> Result<File> {
        if !path.exists() {
            File::create(path)?;
        }
        Ok(File::open(path)?)
    }

    fn open_data_file(path: &Path) -> Result<(File, MmapMut)> {
        let data_path = path.join("vectors.dat");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&data_path)?;
        if file.metadata()?.len() == 0 {
            file.set_len(Self::INITIAL_SIZE)?;
        }
        // SAFETY: the file is open read/write and set_len() guarantees the
        // mapped range is allocated.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok((file, map))
    }

    fn slot_size(&self) -> usize {
        self.dimension.unwrap_or(0) * 4
    }

    /// Fixes the dimension on the first stored vector and maps the data file.
    fn init_dimension(&mut self, dimension: usize) -> Result<()> {
        let (file, map) = Self::open_data_file(&self.path)?;
        self.data_file = Some(file);
        self.mmap = Some(map);
        self.dimension = Some(dimension);
        Ok(())
    }

    fn ensure_capacity(&mut self, required_len: usize) -> Result<()> {
        let Some(mmap) = self.mmap.as_mut() else {
            return Err(Error::Storage("data file not initialized".to_string()));
        };
        if mmap.len() >= required_len {
            return Ok(());
        }
        mmap.flush()?;

        let current_len = mmap.len() as u64;
        let required = required_len as u64;
        let doubled = current_len.saturating_mul(Self::GROWTH_FACTOR);
        let with_headroom = required.saturating_add(Self::MIN_GROWTH);
        let new_len = doubled.max(with_headroom).max(required);

        let file = self
            .data_file
            .as_ref()
            .ok_or_else(|| Error::Storage("data file not initialized".to_string()))?;
        file.set_len(new_len)?;
        // SAFETY: set_len(new_len) above guarantees the new mapping range is
        // allocated; the old map is dropped on reassignment.
        *mmap = unsafe { MmapMut::map_mut(file)? };
        Ok(())
    }

    fn wal_store(&mut self, id: &str, vector_bytes: &[u8]) -> Result<()> {
        let id_len = u16::try_from(id.len())
            .map_err(|_| Error::InvalidInput(format!("id too long: {} bytes", id.len())))?;
        self.wal.write_all(&[OP_STORE])?;
        self.wal.write_all(&id_len.to_le_bytes())?;
        self.wal.write_all(id.as_bytes())?;
        #[allow(clippy::cast_possible_truncation)]
        let len = vector_bytes.len() as u32;
        self.wal.write_all(&len.to_le_bytes())?;
        self.wal.write_all(vector_bytes)?;
        Ok(())
    }

    fn wal_delete(&mut self, id: &str) -> Result<()> {
        let id_len = u16::try_from(id.len())
            .map_err(|_| Error::InvalidInput(format!("id too long: {} bytes", id.len())))?;
        self.wal.write_all(&[OP_DELETE])?;
        self.wal.write_all(&id_len.to_le_bytes())?;
        self.wal.write_all(id.as_bytes())?;
        Ok(())
    }

    /// Replays `vectors.wal`, re-applying every op written after the last
    /// flush. The WAL is truncated on flush, so the whole file applies.
    fn replay_wal(&mut self) -> Result<()> {
        let wal_path = self.path.join("vectors.wal");
        if !wal_path.exists() {
            return Ok(());
        }
        let mut reader = BufReader::new(File::open(&wal_path)?);
        loop {
            let mut op = [0u8; 1];
            match reader.read_exact(&mut op) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let id = match read_wal_id(&mut reader) {
                Ok(id) => id,
                // A torn tail entry from a crash mid-write ends replay.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            match op[0] {
                OP_STORE => {
                    let mut len_bytes = [0u8; 4];
                    if reader.read_exact(&mut len_bytes).is_err() {
                        break;
                    }
                    let len = u32::from_le_bytes(len_bytes) as usize;
                    let mut vector_bytes = vec![0u8; len];
                    if reader.read_exact(&mut vector_bytes).is_err() {
                        break;
                    }
                    if self.dimension.is_none() {
                        self.init_dimension(len / 4)?;
                    }
                    self.apply_store(&id, &vector_bytes)?;
                }
                OP_DELETE => {
                    self.index.remove(&id);
                }
                other => {
                    return Err(Error::Storage(format!("corrupt WAL: unknown op {other}")));
                }
            }
        }
        Ok(())
    }

    /// Writes vector bytes into the mapped slot for `id`, allocating a new
    /// slot for unseen ids.
    fn apply_store(&mut self, id: &str, vector_bytes: &[u8]) -> Result<()> {
        let slot = self.slot_size();
        if vector_bytes.len() != slot {
            return Err(Error::Storage(format!(
                "vector byte length {} does not match slot size {slot}",
                vector_bytes.len()
            )));
        }
        let (offset, is_new) = match self.index.get(id) {
            Some(&existing) => (existing, false),
            None => {
                let offset = self.next_offset;
                self.next_offset += slot;
                (offset, true)
            }
        };
        self.ensure_capacity(offset + slot)?;
        let mmap = self
            .mmap
            .as_mut()
            .ok_or_else(|| Error::Storage("data file not initialized".to_string()))?;
        mmap[offset..offset + slot].copy_from_slice(vector_bytes);
        if is_new {
            self.index.insert(id.to_string(), offset);
        }
        Ok(())
    }

    fn replay_payload_log(&mut self) -> Result<()> {
        let log_path = self.path.join("payloads.log");
        let len = std::fs::metadata(&log_path)?.len();
        let mut reader = BufReader::new(File::open(&log_path)?);
        let mut pos = 0u64;
        while pos < len {
            let entry_start = pos;
            let id = match read_wal_id(&mut reader) {
                Ok(id) => id,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let mut len_bytes = [0u8; 4];
            if reader.read_exact(&mut len_bytes).is_err() {
                break;
            }
            let payload_len = u32::from_le_bytes(len_bytes);
            pos += 2 + id.len() as u64 + 4;
            if payload_len == PAYLOAD_TOMBSTONE {
                self.payload_index.remove(&id);
            } else {
                if reader.seek(SeekFrom::Current(i64::from(payload_len))).is_err() {
                    break;
                }
                pos += u64::from(payload_len);
                self.payload_index.insert(id, entry_start);
            }
        }
        Ok(())
    }

    fn append_payload(&mut self, id: &str, metadata: Option<&Metadata>) -> Result<()> {
        let entry_start = self.payload_log.get_ref().metadata()?.len()
            + self.payload_log.buffer().len() as u64;
        let id_len = u16::try_from(id.len())
            .map_err(|_| Error::InvalidInput(format!("id too long: {} bytes", id.len())))?;
        self.payload_log.write_all(&id_len.to_le_bytes())?;
        self.payload_log.write_all(id.as_bytes())?;
        match metadata {
            Some(metadata) => {
                let bytes = serde_json::to_vec(metadata)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                let len = u32::try_from(bytes.len())
                    .map_err(|_| Error::Resource("metadata too large".to_string()))?;
                self.payload_log.write_all(&len.to_le_bytes())?;
                self.payload_log.write_all(&bytes)?;
                self.payload_index.insert(id.to_string(), entry_start);
            }
            None => {
                self.payload_log.write_all(&PAYLOAD_TOMBSTONE.to_le_bytes())?;
                self.payload_index.remove(id);
            }
        }
        // Reads go through an independent handle; the entry must reach the
        // file before the offset index points at it.
        self.payload_log.flush()?;
        self.evict_cached(id);
        Ok(())
    }

    fn read_payload(&self, id: &str) -> Result<Option<Metadata>> {
        if let Some(cached) = self.payload_cache.read().get(id) {
            return Ok(Some(cached.clone()));
        }
        let Some(&offset) = self.payload_index.get(id) else {
            return Ok(None);
        };

        let metadata = {
            let mut reader = self.payload_reader.write();
            reader.seek(SeekFrom::Start(offset))?;
            let stored_id = read_wal_id(&mut *reader)?;
            if stored_id != id {
                return Err(Error::Storage(format!(
                    "payload index points at entry for '{stored_id}', expected '{id}'"
                )));
            }
            let mut len_bytes = [0u8; 4];
            reader.read_exact(&mut len_bytes)?;
            let payload_len = u32::from_le_bytes(len_bytes);
            if payload_len == PAYLOAD_TOMBSTONE {
                return Ok(None);
            }
            let mut bytes = vec![0u8; payload_len as usize];
            reader.read_exact(&mut bytes)?;
            serde_json::from_slice::<Metadata>(&bytes)
                .map_err(|e| Error::Serialization(e.to_string()))?
        };

        self.cache_payload(id, &metadata);
        Ok(Some(metadata))
    }

    fn cache_payload(&self, id: &str, metadata: &Metadata) {
        if self.cache_budget_bytes == 0 {
            return;
        }
        let entry_bytes = estimate_metadata_bytes(metadata);
        let mut cache = self.payload_cache.write();
        let mut cached = self.cached_bytes.write();
        while *cached + entry_bytes > self.cache_budget_bytes && !cache.is_empty() {
            if let Some((_, evicted)) = cache.shift_remove_index(0) {
                *cached = cached.saturating_sub(estimate_metadata_bytes(&evicted));
            }
        }
        if *cached + entry_bytes <= self.cache_budget_bytes {
            cache.insert(id.to_string(), metadata.clone());
            *cached += entry_bytes;
        }
    }

    fn evict_cached(&mut self, id: &str) {
        let mut cache = self.payload_cache.write();
        if let Some(evicted) = cache.shift_remove(id) {
            let mut cached = self.cached_bytes.write();
            *cached = cached.saturating_sub(estimate_metadata_bytes(&evicted));
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidState("storage is closed".to_string()));
        }
        Ok(())
    }

    /// Ids sorted by their position in the data file, the on-disk ordering
    /// used for enumeration.
    fn ids_by_offset(&self) -> Vec<(String, usize)> {
        let mut entries: Vec<(String, usize)> = self
            .index
            .iter()
            .map(|(id, &offset)| (id.clone(), offset))
            .collect();
        entries.sort_by_key(|(_, offset)| *offset);
        entries
    }

    /// Number of records recovered from disk at startup.
    #[must_use]
    pub fn recovered_count(&self) -> usize {
        self.recovered_count
    }
}

fn read_wal_id(reader: &mut impl Read) -> io::Result<String> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let len = u16::from_le_bytes(len_bytes) as usize;
    let mut id_bytes = vec![0u8; len];
    reader.read_exact(&mut id_bytes)?;
    String::from_utf8(id_bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-UTF-8 id"))
}

fn estimate_metadata_bytes(metadata: &Metadata) -> usize {
    serde_json::to_vec(metadata).map_or(64, |b| b.len())
}

impl VectorStorage for DiskStorage {
    fn store(&mut self, id: &str, vector: &[f32], metadata: Option<&Metadata>) -> Result<()> {
        self.check_open()?;
        match self.dimension {
            None => self.init_dimension(vector.len())?,
            Some(dimension) if dimension != vector.len() => {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
        }

        let vector_bytes = vector_to_bytes(vector);
        // WAL before data, so a crash mid-write replays cleanly.
        self.wal_store(id, &vector_bytes)?;
        self.apply_store(id, &vector_bytes)?;
        self.append_payload(id, metadata)?;
        Ok(())
    }

    fn retrieve(&self, id: &str) -> Result<Option<(Vec<f32>, Option<Metadata>)>> {
        let Some(&offset) = self.index.get(id) else {
            return Ok(None);
        };
        let slot = self.slot_size();
        let mmap = self
            .mmap
            .as_ref()
            .ok_or_else(|| Error::Storage("data file not initialized".to_string()))?;
        if offset + slot > mmap.len() {
            return Err(Error::Storage("offset out of bounds".to_string()));
        }
        let vector = bytes_to_vector(&mmap[offset..offset + slot], slot / 4);
        let metadata = self.read_payload(id)?;
        Ok(Some((vector, metadata)))
    }

    fn retrieve_metadata(&self, id: &str) -> Result<Option<Metadata>> {
        if !self.index.contains_key(id) {
            return Ok(None);
        }
        self.read_payload(id)
    }

    fn delete(&mut self, ids: &[String]) -> Result<usize> {
        self.check_open()?;
        let mut removed = 0;
        for id in ids {
            if self.index.contains_key(id.as_str()) {
                self.wal_delete(id)?;
                self.index.remove(id.as_str());
                if self.payload_index.contains_key(id.as_str()) {
                    self.append_payload(id, None)?;
                }
                self.evict_cached(id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn update_metadata(&mut self, id: &str, metadata: Metadata) -> Result<()> {
        self.check_open()?;
        if !self.index.contains_key(id) {
            return Err(Error::NotFound(id.to_string()));
        }
        self.append_payload(id, Some(&metadata))
    }

    fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    fn list_ids(&self, limit: Option<usize>) -> Vec<String> {
        let take = limit.unwrap_or(usize::MAX);
        self.ids_by_offset()
            .into_iter()
            .take(take)
            .map(|(id, _)| id)
            .collect()
    }

    fn list_ids_paged(&self, page_size: usize, cursor: Option<&str>) -> Result<IdPage> {
        check_page_size(page_size)?;
        let start = match cursor {
            None => 0u64,
            Some(token) => Cursor::decode(token)?.position,
        };

        let entries = self.ids_by_offset();
        let mut items = Vec::with_capacity(page_size);
        let mut last_offset = 0usize;
        let mut has_more = false;
        for (id, offset) in entries {
            if (offset as u64) < start {
                continue;
            }
            if items.len() == page_size {
                has_more = true;
                break;
            }
            last_offset = offset;
            items.push(id);
        }

        let next_cursor = has_more.then(|| {
            Cursor {
                generation: 0,
                position: last_offset as u64 + 1,
            }
            .encode()
        });
        Ok(IdPage {
            items,
            next_cursor,
            has_more,
        })
    }

    fn stream_ids(&self) -> Box<dyn Iterator<Item = String> + Send> {
        Box::new(self.ids_by_offset().into_iter().map(|(id, _)| id))
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimension
    }

    fn stats(&self) -> StorageStats {
        let data_bytes = self
            .data_file
            .as_ref()
            .and_then(|f| f.metadata().ok())
            .map_or(0, |m| m.len());
        let payload_bytes = std::fs::metadata(self.path.join("payloads.log")).map_or(0, |m| m.len());
        StorageStats {
            backend: "DiskStorage".to_string(),
            vector_count: self.len(),
            dimensions: self.dimension,
            disk_bytes: Some(data_bytes + payload_bytes),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        // 1. WAL reaches disk first.
        self.wal.flush()?;
        self.wal.get_ref().sync_all()?;

        // 2. Vector bytes.
        if let Some(mmap) = self.mmap.as_ref() {
            mmap.flush()?;
        }

        // 3. Persist the index, fsync, then drop the now-covered WAL.
        if let Some(dimension) = self.dimension {
            let idx_path = self.path.join("vectors.idx");
            let file = File::create(&idx_path)?;
            let mut writer = io::BufWriter::new(file);
            let entries = self
                .index
                .iter()
                .map(|(id, &offset)| (id.clone(), offset as u64))
                .collect();
            bincode::serialize_into(
                &mut writer,
                &DiskIndexFile {
                    dimension: dimension as u64,
                    entries,
                },
            )
            .map_err(|e| Error::Serialization(e.to_string()))?;
            writer.flush()?;
            writer
                .into_inner()
                .map_err(io::IntoInnerError::into_error)?
                .sync_all()?;
            self.wal.get_ref().set_len(0)?;
        }

        // 4. Payload log.
        self.payload_log.flush()?;
        self.payload_log.get_ref().sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.mmap = None;
        self.data_file = None;
        self.payload_cache.write().clear();
        self.closed = true;
        Ok(())
    }
}

impl Drop for DiskStorage {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            error!(?e, "failed to flush DiskStorage on drop");
        }
    }
}
