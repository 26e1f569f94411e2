//! File-backed checkpoint slots.
//!
//! Layout inside the store directory:
//! ```text
//! store.meta.json      - schema version
//! quick-0.ckpt         - one file per slot
//! manual-1.ckpt
//! checkpoint.ckpt
//! suspend.ckpt         - written on quit, deleted by `resume`
//! *.tmp                - in-flight writes; never read, removed on open
//! ```
//!
//! Each slot file is a CBOR envelope `{schema_version, sha256, payload}`
//! whose payload is the zstd-compressed CBOR of a [`CheckpointRecord`].

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chronosta_common::EraId;
use chronosta_kernel::World;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::CheckpointError;
use crate::record::{CheckpointRecord, SlotId, SlotSummary};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "store.meta.json";
const SLOT_EXT: &str = "ckpt";
const TMP_EXT: &str = "tmp";
const ZSTD_LEVEL: i32 = 3;

/// Contents of `store.meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub schema_version: u32,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    schema_version: u32,
    sha256: String,
    payload: Vec<u8>,
}

/// Directory of checkpoint slot files.
#[derive(Debug)]
pub struct CheckpointStore {
    root: PathBuf,
    max_slots: u8,
    meta: StoreMeta,
}

impl CheckpointStore {
    /// Open or create a store at `path`. Fails closed when the directory was
    /// written with another schema version.
    pub fn open(path: impl AsRef<Path>, max_slots: u8) -> Result<Self, CheckpointError> {
        let root = path.as_ref().to_path_buf();
        let _span = tracing::debug_span!("store_open", root = %root.display()).entered();
        fs::create_dir_all(&root)?;

        let meta_path = root.join(META_FILE);
        let meta = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(File::open(&meta_path)?)
                .map_err(|e| CheckpointError::Encode(format!("{META_FILE}: {e}")))?;
            if meta.schema_version != SCHEMA_VERSION {
                return Err(CheckpointError::SchemaMismatch {
                    found: meta.schema_version,
                    expected: SCHEMA_VERSION,
                });
            }
            meta
        } else {
            let meta = StoreMeta {
                schema_version: SCHEMA_VERSION,
            };
            let json = serde_json::to_vec_pretty(&meta)
                .map_err(|e| CheckpointError::Encode(e.to_string()))?;
            write_atomic(&root, &meta_path, &json)?;
            meta
        };

        let store = Self {
            root,
            max_slots,
            meta,
        };
        store.remove_stray_temporaries()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    /// Numbered slots available per kind.
    pub fn max_slots(&self) -> u8 {
        self.max_slots
    }

    /// Write `world` to `slot`, replacing what was there.
    pub fn save(
        &self,
        slot: SlotId,
        world: &World,
        era: EraId,
    ) -> Result<SlotSummary, CheckpointError> {
        let slot = slot.validate(self.max_slots)?;
        let _span = tracing::debug_span!("checkpoint_save", %slot, tick = world.tick()).entered();
        let record = CheckpointRecord::new(slot, world.clone(), era);
        let bytes = encode(&record)?;
        write_atomic(&self.root, &self.slot_path(slot), &bytes)?;
        tracing::debug!(bytes = bytes.len(), "checkpoint written");
        Ok(record.summary())
    }

    /// Read and verify the record in `slot`.
    pub fn load(&self, slot: SlotId) -> Result<CheckpointRecord, CheckpointError> {
        let slot = slot.validate(self.max_slots)?;
        let _span = tracing::debug_span!("checkpoint_load", %slot).entered();
        let path = self.slot_path(slot);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(slot));
            }
            Err(e) => return Err(e.into()),
        };
        let record = decode(slot, &bytes)?;
        tracing::debug!(tick = record.world.tick(), era = %record.era, "checkpoint read");
        Ok(record)
    }

    /// Load `slot`; if its file is corrupt, fall back to the level
    /// checkpoint slot. When the fallback fails too, the original
    /// corruption is returned.
    pub fn load_with_fallback(&self, slot: SlotId) -> Result<CheckpointRecord, CheckpointError> {
        match self.load(slot) {
            Err(corrupt @ CheckpointError::Corrupt { .. }) if slot != SlotId::Checkpoint => {
                tracing::warn!(%slot, error = %corrupt, "slot corrupt, falling back to level checkpoint");
                self.load(SlotId::Checkpoint).map_err(|e| {
                    tracing::warn!(error = %e, "level checkpoint unusable as fallback");
                    corrupt
                })
            }
            other => other,
        }
    }

    /// Load the suspend save and delete it. A failed load leaves the file
    /// in place.
    pub fn resume(&self) -> Result<CheckpointRecord, CheckpointError> {
        let record = self.load(SlotId::Suspend)?;
        self.delete(SlotId::Suspend)?;
        tracing::debug!(tick = record.world.tick(), "resumed from suspend save");
        Ok(record)
    }

    /// Summaries of every readable slot, in slot order. Unreadable slot
    /// files are skipped with a warning.
    pub fn list(&self) -> Result<Vec<SlotSummary>, CheckpointError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SLOT_EXT) {
                continue;
            }
            let Some(slot) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<SlotId>().ok())
            else {
                tracing::warn!(path = %path.display(), "unrecognised file in checkpoint store");
                continue;
            };
            match self.load(slot) {
                Ok(record) => out.push(record.summary()),
                Err(e) => tracing::warn!(%slot, error = %e, "skipping unreadable slot"),
            }
        }
        out.sort_by_key(|s| s.slot);
        Ok(out)
    }

    /// Remove the file behind `slot`.
    pub fn delete(&self, slot: SlotId) -> Result<(), CheckpointError> {
        let slot = slot.validate(self.max_slots)?;
        match fs::remove_file(self.slot_path(slot)) {
            Ok(()) => {
                tracing::debug!(%slot, "checkpoint deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CheckpointError::NotFound(slot))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn slot_path(&self, slot: SlotId) -> PathBuf {
        self.root.join(format!("{}.{SLOT_EXT}", slot.stem()))
    }

    fn remove_stray_temporaries(&self) -> Result<(), CheckpointError> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(TMP_EXT) {
                tracing::warn!(path = %path.display(), "removing interrupted write");
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Write to a sibling temporary, fsync it, then rename over `path`.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    let tmp = path.with_extension(TMP_EXT);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    // Persist the rename itself. Directories cannot be opened for sync on
    // every platform, so failure here is not an error.
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
    Ok(())
}

fn encode(record: &CheckpointRecord) -> Result<Vec<u8>, CheckpointError> {
    let cbor = cbor_serialize(record)?;
    let payload = zstd_compress(&cbor)?;
    let envelope = Envelope {
        schema_version: SCHEMA_VERSION,
        sha256: sha256_hex(&payload),
        payload,
    };
    cbor_serialize(&envelope)
}

fn decode(slot: SlotId, bytes: &[u8]) -> Result<CheckpointRecord, CheckpointError> {
    let corrupt = |reason: String| CheckpointError::Corrupt { slot, reason };

    let envelope: Envelope =
        ciborium::from_reader(bytes).map_err(|e| corrupt(format!("envelope: {e}")))?;
    if envelope.schema_version != SCHEMA_VERSION {
        return Err(corrupt(format!(
            "schema v{}, expected v{SCHEMA_VERSION}",
            envelope.schema_version
        )));
    }
    let actual = sha256_hex(&envelope.payload);
    if actual != envelope.sha256 {
        return Err(corrupt(format!(
            "hash mismatch: expected {}, got {actual}",
            envelope.sha256
        )));
    }
    let cbor = zstd_decompress(&envelope.payload).map_err(|e| corrupt(format!("zstd: {e}")))?;
    let record: CheckpointRecord =
        ciborium::from_reader(cbor.as_slice()).map_err(|e| corrupt(format!("record: {e}")))?;
    if record.slot != slot {
        return Err(corrupt(format!("file holds slot {}", record.slot)));
    }
    if record.era != record.world.era() {
        return Err(corrupt(format!(
            "record tagged {} but world is in {}",
            record.era,
            record.world.era()
        )));
    }
    Ok(record)
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CheckpointError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CheckpointError::Encode(e.to_string()))?;
    Ok(buf)
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, CheckpointError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), ZSTD_LEVEL)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SaveKind;
    use crate::test_support::{other_world, sample_world};

    fn open(dir: &tempfile::TempDir) -> CheckpointStore {
        CheckpointStore::open(dir.path().join("saves"), 3).unwrap()
    }

    #[test]
    fn open_writes_meta() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        assert_eq!(store.meta().schema_version, SCHEMA_VERSION);
        assert!(store.root().join(META_FILE).is_file());
    }

    #[test]
    fn save_then_load_is_exact() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        let world = sample_world();
        let summary = store.save(SlotId::Quick(0), &world, world.era()).unwrap();
        assert_eq!(summary.kind, SaveKind::Quick);

        let reopened = open(&tmp);
        let record = reopened.load(SlotId::Quick(0)).unwrap();
        assert_eq!(record.world, world);
        assert_eq!(record.world.state_hash(), world.state_hash());
        assert_eq!(record.era, world.era());
        assert_eq!(record.slot, SlotId::Quick(0));
    }

    #[test]
    fn save_overwrites_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        store.save(SlotId::Manual(1), &sample_world(), EraId::Medieval).unwrap();
        let other = other_world();
        store.save(SlotId::Manual(1), &other, EraId::Futuristic).unwrap();
        let record = store.load(SlotId::Manual(1)).unwrap();
        assert_eq!(record.world, other);
        assert_eq!(record.era, EraId::Futuristic);
    }

    #[test]
    fn missing_slot_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        assert!(matches!(
            store.load(SlotId::Quick(2)),
            Err(CheckpointError::NotFound(SlotId::Quick(2)))
        ));
    }

    #[test]
    fn out_of_range_slot_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        assert!(matches!(
            store.save(SlotId::Quick(3), &sample_world(), EraId::Medieval),
            Err(CheckpointError::InvalidSlot(_))
        ));
    }

    #[test]
    fn flipped_byte_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        store.save(SlotId::Quick(0), &sample_world(), EraId::Medieval).unwrap();

        let path = store.root().join("quick-0.ckpt");
        let mut data = fs::read(&path).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0xff;
        fs::write(&path, &data).unwrap();

        assert!(matches!(
            store.load(SlotId::Quick(0)),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        store.save(SlotId::Quick(0), &sample_world(), EraId::Medieval).unwrap();
        let path = store.root().join("quick-0.ckpt");
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() / 3]).unwrap();
        assert!(matches!(
            store.load(SlotId::Quick(0)),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn file_moved_to_another_slot_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        store.save(SlotId::Quick(0), &sample_world(), EraId::Medieval).unwrap();
        fs::copy(
            store.root().join("quick-0.ckpt"),
            store.root().join("quick-1.ckpt"),
        )
        .unwrap();
        assert!(matches!(
            store.load(SlotId::Quick(1)),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn corrupt_slot_falls_back_to_level_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        let checkpoint = other_world();
        store.save(SlotId::Checkpoint, &checkpoint, EraId::Futuristic).unwrap();
        fs::write(store.root().join("quick-0.ckpt"), b"garbage").unwrap();

        let record = store.load_with_fallback(SlotId::Quick(0)).unwrap();
        assert_eq!(record.slot, SlotId::Checkpoint);
        assert_eq!(record.world, checkpoint);

        // Missing is not corrupt: no fallback.
        assert!(matches!(
            store.load_with_fallback(SlotId::Quick(1)),
            Err(CheckpointError::NotFound(_))
        ));
    }

    #[test]
    fn corrupt_slot_without_checkpoint_stays_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        fs::write(store.root().join("quick-0.ckpt"), b"garbage").unwrap();
        let err = store.load_with_fallback(SlotId::Quick(0)).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::Corrupt {
                slot: SlotId::Quick(0),
                ..
            }
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn era_tag_must_match_world() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        let world = sample_world();
        store.save(SlotId::Manual(0), &world, EraId::Futuristic).unwrap();
        assert!(matches!(
            store.load(SlotId::Manual(0)),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn resume_consumes_suspend_save() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        assert!(matches!(
            store.resume(),
            Err(CheckpointError::NotFound(SlotId::Suspend))
        ));

        let world = sample_world();
        let summary = store.save(SlotId::Suspend, &world, world.era()).unwrap();
        assert_eq!(summary.kind, SaveKind::Suspend);
        let record = store.resume().unwrap();
        assert_eq!(record.world, world);
        assert!(!store.root().join("suspend.ckpt").exists());
        assert!(matches!(
            store.resume(),
            Err(CheckpointError::NotFound(SlotId::Suspend))
        ));
    }

    #[test]
    fn corrupt_suspend_save_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        let path = store.root().join("suspend.ckpt");
        fs::write(&path, b"garbage").unwrap();
        assert!(matches!(
            store.resume(),
            Err(CheckpointError::Corrupt { .. })
        ));
        assert!(path.exists());
    }

    #[test]
    fn stray_temporary_is_ignored_and_cleaned() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        store.save(SlotId::Quick(0), &sample_world(), EraId::Medieval).unwrap();
        let stray = store.root().join("quick-1.tmp");
        fs::write(&stray, b"half a write").unwrap();
        assert!(matches!(
            store.load(SlotId::Quick(1)),
            Err(CheckpointError::NotFound(_))
        ));

        let reopened = open(&tmp);
        assert!(!stray.exists());
        assert!(reopened.load(SlotId::Quick(0)).is_ok());
    }

    #[test]
    fn list_and_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open(&tmp);
        let world = sample_world();
        store.save(SlotId::Manual(0), &world, EraId::Medieval).unwrap();
        store.save(SlotId::Quick(1), &world, EraId::Medieval).unwrap();
        store.save(SlotId::Checkpoint, &world, EraId::Medieval).unwrap();
        fs::write(store.root().join("quick-2.ckpt"), b"junk").unwrap();

        let slots: Vec<SlotId> = store.list().unwrap().iter().map(|s| s.slot).collect();
        assert_eq!(
            slots,
            vec![SlotId::Quick(1), SlotId::Manual(0), SlotId::Checkpoint]
        );

        store.delete(SlotId::Quick(1)).unwrap();
        assert!(matches!(
            store.delete(SlotId::Quick(1)),
            Err(CheckpointError::NotFound(_))
        ));
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn schema_mismatch_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("saves");
        drop(CheckpointStore::open(&path, 3).unwrap());

        let meta = StoreMeta { schema_version: 999 };
        fs::write(path.join(META_FILE), serde_json::to_vec(&meta).unwrap()).unwrap();

        match CheckpointStore::open(&path, 3) {
            Err(CheckpointError::SchemaMismatch { found, expected }) => {
                assert_eq!(found, 999);
                assert_eq!(expected, SCHEMA_VERSION);
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }
}
