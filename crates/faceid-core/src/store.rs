//! On-disk persistence for the index/label pair.
//!
//! Index file (little-endian):
//!
//! ```text
//! "FIDX" | version u16 | policy u8 | generation u64 | dimension u32 | count u64 | count × dim × f32
//! ```
//!
//! Labels file: JSON `{"generation": u64, "labels": [..]}`.
//!
//! Every save stamps both artifacts with the same, incremented generation.
//! Both are written to `<path>.tmp`, synced, then renamed into place (index
//! first, labels second). The previous index sits at `<index>.bak` until both
//! renames succeed; a failed rename puts it back and deletes the `.tmp` files.
//! A crash between the two renames leaves a labels `.tmp` whose generation
//! matches the new index; `load` finishes that rename instead of reporting
//! corruption. A crash before the new index lands leaves only the backup,
//! which `load` restores.

use crate::index::VectorIndex;
use crate::labels::LabelStore;
use crate::types::NormalizationPolicy;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const INDEX_MAGIC: &[u8; 4] = b"FIDX";
const INDEX_VERSION: u16 = 1;
/// magic + version + policy + generation + dimension + count
const INDEX_HEADER_LEN: usize = 4 + 2 + 1 + 8 + 4 + 8;

pub const DEFAULT_INDEX_FILE: &str = "face_db.index";
pub const DEFAULT_LABELS_FILE: &str = "face_labels.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt database: {0}")]
    Corrupt(String),
    #[error("index was built with '{stored}' normalization but the deployment uses '{configured}'")]
    PolicyMismatch {
        stored: NormalizationPolicy,
        configured: NormalizationPolicy,
    },
    #[error("refusing to save {vectors} vectors with {labels} labels")]
    CountMismatch { vectors: usize, labels: usize },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io { path: path.to_path_buf(), source }
    }

    /// Whether this error means the persisted pair cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corrupt(_) | StoreError::PolicyMismatch { .. })
    }
}

/// Locations of the two artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePaths {
    pub index: PathBuf,
    pub labels: PathBuf,
}

impl DatabasePaths {
    pub fn new(index: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        Self { index: index.into(), labels: labels.into() }
    }

    /// Default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DEFAULT_INDEX_FILE), dir.join(DEFAULT_LABELS_FILE))
    }
}

/// Header and vectors read from an index artifact.
#[derive(Debug, Clone)]
pub struct IndexArtifact {
    pub policy: NormalizationPolicy,
    pub generation: u64,
    pub index: VectorIndex,
}

/// Contents of a labels artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelsArtifact {
    pub generation: u64,
    pub labels: LabelStore,
}

/// What `load` hands back: an index (absent until first registration) and its labels.
#[derive(Debug, Clone)]
pub struct LoadedDatabase {
    pub index: Option<VectorIndex>,
    pub labels: LabelStore,
}

/// Loads and saves the index/label pair as one unit.
#[derive(Debug)]
pub struct DatabaseStore {
    paths: DatabasePaths,
    policy: NormalizationPolicy,
    generation: u64,
}

impl DatabaseStore {
    pub fn new(paths: DatabasePaths, policy: NormalizationPolicy) -> Self {
        Self { paths, policy, generation: 0 }
    }

    pub fn paths(&self) -> &DatabasePaths {
        &self.paths
    }

    /// Generation of the last pair loaded or saved.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Load the persisted pair.
    ///
    /// Neither artifact present is a fresh database. Exactly one present, or
    /// two that disagree, is corruption unless an interrupted save can be
    /// rolled forward.
    pub fn load(&mut self) -> Result<LoadedDatabase, StoreError> {
        let index_exists = self.paths.index.exists();
        let labels_exists = self.paths.labels.exists();

        let (artifact, labels) = match (index_exists, labels_exists) {
            (false, false) => {
                tracing::info!(
                    index = %self.paths.index.display(),
                    labels = %self.paths.labels.display(),
                    "no database found; index will be created on first registration"
                );
                self.generation = 0;
                return Ok(LoadedDatabase { index: None, labels: LabelStore::new() });
            }
            (false, true) => {
                let labels = read_labels(&self.paths.labels)?;
                let artifact = self.roll_back(&labels).ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "labels file {} exists but index file {} is missing",
                        self.paths.labels.display(),
                        self.paths.index.display()
                    ))
                })??;
                (artifact, labels)
            }
            (true, false) => {
                let artifact = read_index(&self.paths.index)?;
                let labels = self.roll_forward(&artifact).ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "index file {} exists but labels file {} is missing",
                        self.paths.index.display(),
                        self.paths.labels.display()
                    ))
                })??;
                (artifact, labels)
            }
            (true, true) => {
                let artifact = read_index(&self.paths.index)?;
                let labels = read_labels(&self.paths.labels)?;
                if pair_matches(&artifact, &labels) {
                    (artifact, labels)
                } else {
                    let mismatch = format!(
                        "index holds {} vectors (generation {}) but labels hold {} (generation {})",
                        artifact.index.len(),
                        artifact.generation,
                        labels.labels.len(),
                        labels.generation
                    );
                    let labels = self
                        .roll_forward(&artifact)
                        .ok_or(StoreError::Corrupt(mismatch))??;
                    (artifact, labels)
                }
            }
        };

        if artifact.policy != self.policy {
            return Err(StoreError::PolicyMismatch {
                stored: artifact.policy,
                configured: self.policy,
            });
        }

        self.generation = artifact.generation;
        let backup = backup_path(&self.paths.index);
        if backup.exists() {
            if let Err(e) = fs::remove_file(&backup) {
                tracing::warn!(path = %backup.display(), error = %e, "could not remove stale index backup");
            }
        }
        tracing::info!(
            vectors = artifact.index.len(),
            dimension = artifact.index.dimension(),
            generation = artifact.generation,
            policy = %artifact.policy,
            "loaded face database"
        );

        Ok(LoadedDatabase {
            index: Some(artifact.index),
            labels: labels.labels,
        })
    }

    /// Finish a save interrupted between the index and labels renames.
    ///
    /// `None` when there is nothing matching to roll forward.
    fn roll_forward(&self, artifact: &IndexArtifact) -> Option<Result<LabelsArtifact, StoreError>> {
        let pending_path = tmp_path(&self.paths.labels);
        let pending = read_labels(&pending_path).ok()?;
        if !pair_matches(artifact, &pending) {
            return None;
        }

        tracing::warn!(
            generation = artifact.generation,
            path = %pending_path.display(),
            "completing interrupted save from pending labels file"
        );
        Some(
            fs::rename(&pending_path, &self.paths.labels)
                .map(|()| pending)
                .map_err(|e| StoreError::io(&self.paths.labels, e)),
        )
    }

    /// Restore the index backup left by a save interrupted mid-swap.
    ///
    /// `None` when there is no backup matching `labels`.
    fn roll_back(&self, labels: &LabelsArtifact) -> Option<Result<IndexArtifact, StoreError>> {
        let backup = backup_path(&self.paths.index);
        let artifact = read_index(&backup).ok()?;
        if !pair_matches(&artifact, labels) {
            return None;
        }

        tracing::warn!(
            generation = artifact.generation,
            path = %backup.display(),
            "restoring index backup from interrupted save"
        );
        Some(
            fs::rename(&backup, &self.paths.index)
                .map(|()| artifact)
                .map_err(|e| StoreError::io(&self.paths.index, e)),
        )
    }

    /// Persist the pair. Both artifacts are fully written before either is
    /// swapped into place. On error the previous pair is left on disk.
    pub fn save(&mut self, index: &VectorIndex, labels: &LabelStore) -> Result<(), StoreError> {
        if index.len() != labels.len() {
            return Err(StoreError::CountMismatch {
                vectors: index.len(),
                labels: labels.len(),
            });
        }

        let generation = self.generation + 1;
        let index_tmp = tmp_path(&self.paths.index);
        let labels_tmp = tmp_path(&self.paths.labels);

        for path in [&self.paths.index, &self.paths.labels] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }
        }

        let artifact = LabelsArtifact { generation, labels: labels.clone() };
        let written = write_synced(&index_tmp, |w| write_index(w, index, self.policy, generation)).and_then(|()| {
            write_synced(&labels_tmp, |w| {
                serde_json::to_writer(&mut *w, &artifact).map_err(std::io::Error::from)
            })
        });
        if let Err(e) = written {
            discard(&[&index_tmp, &labels_tmp]);
            return Err(e);
        }

        let backup = backup_path(&self.paths.index);
        let had_previous = self.paths.index.exists();
        if had_previous {
            if let Err(e) = fs::rename(&self.paths.index, &backup) {
                discard(&[&index_tmp, &labels_tmp]);
                return Err(StoreError::io(&self.paths.index, e));
            }
        }

        let swapped = fs::rename(&index_tmp, &self.paths.index)
            .map_err(|e| StoreError::io(&self.paths.index, e))
            .and_then(|()| {
                fs::rename(&labels_tmp, &self.paths.labels).map_err(|e| StoreError::io(&self.paths.labels, e))
            });
        if let Err(e) = swapped {
            self.undo_swap(had_previous);
            discard(&[&index_tmp, &labels_tmp]);
            return Err(e);
        }

        if had_previous {
            if let Err(e) = fs::remove_file(&backup) {
                tracing::warn!(path = %backup.display(), error = %e, "could not remove index backup");
            }
        }

        self.generation = generation;
        tracing::debug!(vectors = index.len(), generation, "saved face database");
        Ok(())
    }

    /// Put the previous index back after a failed swap.
    fn undo_swap(&self, had_previous: bool) {
        let index = &self.paths.index;
        let restored = if had_previous {
            fs::rename(backup_path(index), index)
        } else if index.exists() {
            fs::remove_file(index)
        } else {
            Ok(())
        };
        match restored {
            Ok(()) => tracing::warn!(index = %index.display(), "save failed; previous index restored"),
            Err(e) => tracing::error!(index = %index.display(), error = %e, "save failed and previous index could not be restored"),
        }
    }
}

/// Best-effort removal of leftover temporary files.
fn discard(paths: &[&PathBuf]) {
    for path in paths {
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "could not remove temporary file");
            }
        }
    }
}

fn pair_matches(index: &IndexArtifact, labels: &LabelsArtifact) -> bool {
    index.generation == labels.generation && index.index.len() == labels.labels.len()
}

/// `<path>.tmp`, keeping the original extension.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// `<index>.bak`, where the previous index waits while a save swaps files.
fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

fn write_synced<F>(path: &Path, write: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let result = (|| {
        let mut writer = BufWriter::new(File::create(path)?);
        write(&mut writer)?;
        writer.flush()?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()
    })();
    result.map_err(|e| StoreError::io(path, e))
}

fn write_index<W: Write>(
    w: &mut W,
    index: &VectorIndex,
    policy: NormalizationPolicy,
    generation: u64,
) -> std::io::Result<()> {
    w.write_all(INDEX_MAGIC)?;
    w.write_u16::<LittleEndian>(INDEX_VERSION)?;
    w.write_u8(policy.tag())?;
    w.write_u64::<LittleEndian>(generation)?;
    w.write_u32::<LittleEndian>(index.dimension() as u32)?;
    w.write_u64::<LittleEndian>(index.len() as u64)?;
    for &v in index.as_flat() {
        w.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

/// Read and validate an index artifact.
pub fn read_index(path: &Path) -> Result<IndexArtifact, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    parse_index(&bytes).map_err(|reason| {
        StoreError::Corrupt(format!("index file {}: {reason}", path.display()))
    })
}

fn parse_index(bytes: &[u8]) -> Result<IndexArtifact, String> {
    if bytes.len() < INDEX_HEADER_LEN {
        return Err(format!("truncated header ({} bytes)", bytes.len()));
    }
    if &bytes[..4] != INDEX_MAGIC {
        return Err("bad magic".to_string());
    }

    let mut r = Cursor::new(&bytes[4..]);
    let short = |e: std::io::Error| e.to_string();

    let version = r.read_u16::<LittleEndian>().map_err(short)?;
    if version != INDEX_VERSION {
        return Err(format!("unsupported format version {version}"));
    }
    let tag = r.read_u8().map_err(short)?;
    let policy = NormalizationPolicy::from_tag(tag).ok_or_else(|| format!("unknown policy tag {tag}"))?;
    let generation = r.read_u64::<LittleEndian>().map_err(short)?;
    let dimension = r.read_u32::<LittleEndian>().map_err(short)? as usize;
    let count = r.read_u64::<LittleEndian>().map_err(short)?;

    let payload = bytes.len() - INDEX_HEADER_LEN;
    let expected = (count as u128) * (dimension as u128) * 4;
    if expected != payload as u128 {
        return Err(format!(
            "header declares {count} × {dimension} vectors but payload is {payload} bytes"
        ));
    }

    let mut data = vec![0f32; payload / 4];
    r.read_f32_into::<LittleEndian>(&mut data).map_err(short)?;

    let index = VectorIndex::from_flat(dimension, data).map_err(|e| e.to_string())?;
    Ok(IndexArtifact { policy, generation, index })
}

/// Read a labels artifact.
pub fn read_labels(path: &Path) -> Result<LabelsArtifact, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Corrupt(format!("labels file {}: {e}", path.display())))
}

/// Read-only view of whatever is on disk, with no consistency enforcement.
#[derive(Debug)]
pub struct Inspection {
    pub index: Option<IndexArtifact>,
    pub labels: Option<LabelsArtifact>,
}

impl Inspection {
    pub fn vector_count(&self) -> usize {
        self.index.as_ref().map_or(0, |a| a.index.len())
    }

    pub fn label_count(&self) -> usize {
        self.labels.as_ref().map_or(0, |a| a.labels.len())
    }

    pub fn dimension(&self) -> Option<usize> {
        self.index.as_ref().map(|a| a.index.dimension())
    }

    /// Human-readable problems with the pair. Empty when it is consistent.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        match (&self.index, &self.labels) {
            (Some(_), None) => warnings.push("index file present but labels file missing".to_string()),
            (None, Some(_)) => warnings.push("labels file present but index file missing".to_string()),
            (Some(index), Some(labels)) => {
                if index.index.len() != labels.labels.len() {
                    warnings.push(format!(
                        "number of vectors ({}) and labels ({}) mismatch",
                        index.index.len(),
                        labels.labels.len()
                    ));
                }
                if index.generation != labels.generation {
                    warnings.push(format!(
                        "index generation {} differs from labels generation {}",
                        index.generation, labels.generation
                    ));
                }
            }
            (None, None) => {}
        }
        warnings
    }
}

/// Inspect the artifacts at `paths` without modifying anything.
pub fn inspect(paths: &DatabasePaths) -> Result<Inspection, StoreError> {
    let index = if paths.index.exists() { Some(read_index(&paths.index)?) } else { None };
    let labels = if paths.labels.exists() { Some(read_labels(&paths.labels)?) } else { None };
    Ok(Inspection { index, labels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Descriptor;
    use tempfile::TempDir;

    fn sample(n: usize, dim: usize) -> (VectorIndex, LabelStore) {
        let mut index = VectorIndex::create(dim).unwrap();
        let mut labels = LabelStore::new();
        for i in 0..n {
            let values = (0..dim).map(|j| (i * dim + j) as f32 * 0.37 - 1.5).collect();
            index.add(&Descriptor::new(values)).unwrap();
            labels.push(format!("face_{}_20260101_000000", i + 1));
        }
        (index, labels)
    }

    fn store(dir: &TempDir) -> DatabaseStore {
        DatabaseStore::new(DatabasePaths::in_dir(dir.path()), NormalizationPolicy::Unit)
    }

    #[test]
    fn test_load_fresh_database() {
        let dir = TempDir::new().unwrap();
        let loaded = store(&dir).load().unwrap();
        assert!(loaded.index.is_none());
        assert!(loaded.labels.is_empty());
    }

    #[test]
    fn test_roundtrip_various_sizes() {
        for (n, dim) in [(0, 1), (0, 128), (1, 128), (3, 512), (17, 7)] {
            let dir = TempDir::new().unwrap();
            let (index, labels) = sample(n, dim);

            store(&dir).save(&index, &labels).unwrap();
            let loaded = store(&dir).load().unwrap();

            assert_eq!(loaded.index.as_ref(), Some(&index), "n={n} dim={dim}");
            assert_eq!(loaded.labels, labels);
        }
    }

    #[test]
    fn test_roundtrip_preserves_unicode_labels() {
        let dir = TempDir::new().unwrap();
        let mut index = VectorIndex::create(2).unwrap();
        index.add(&Descriptor::new(vec![0.5, -0.5])).unwrap();
        let labels = LabelStore::from_labels(vec!["Zoë \"quoted\" 名前".to_string()]);
        store(&dir).save(&index, &labels).unwrap();
        assert_eq!(store(&dir).load().unwrap().labels, labels);
    }

    #[test]
    fn test_save_creates_both_files_and_no_tmp() {
        let dir = TempDir::new().unwrap();
        let (index, labels) = sample(1, 4);
        let mut s = store(&dir);
        s.save(&index, &labels).unwrap();
        assert!(s.paths().index.exists());
        assert!(s.paths().labels.exists());
        assert!(!tmp_path(&s.paths().index).exists());
        assert!(!tmp_path(&s.paths().labels).exists());
    }

    #[test]
    fn test_save_increments_generation() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        let (index, labels) = sample(1, 4);
        s.save(&index, &labels).unwrap();
        s.save(&index, &labels).unwrap();
        assert_eq!(s.generation(), 2);

        let mut reopened = store(&dir);
        reopened.load().unwrap();
        assert_eq!(reopened.generation(), 2);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let paths = DatabasePaths::in_dir(&dir.path().join("nested/data"));
        let mut s = DatabaseStore::new(paths, NormalizationPolicy::Raw);
        let (index, labels) = sample(2, 3);
        s.save(&index, &labels).unwrap();
        assert!(s.paths().index.exists());
    }

    #[test]
    fn test_save_refuses_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let (index, _) = sample(2, 3);
        let labels = LabelStore::from_labels(vec!["only-one".into()]);
        let err = store(&dir).save(&index, &labels).unwrap_err();
        assert!(matches!(err, StoreError::CountMismatch { vectors: 2, labels: 1 }));
        assert!(!dir.path().join(DEFAULT_INDEX_FILE).exists());
    }

    #[test]
    fn test_load_index_without_labels_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let (index, labels) = sample(2, 3);
        let mut s = store(&dir);
        s.save(&index, &labels).unwrap();
        fs::remove_file(&s.paths().labels).unwrap();

        let err = store(&dir).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)), "{err}");
        assert!(err.is_corruption());
    }

    #[test]
    fn test_load_labels_without_index_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let (index, labels) = sample(2, 3);
        let mut s = store(&dir);
        s.save(&index, &labels).unwrap();
        fs::remove_file(&s.paths().index).unwrap();

        assert!(matches!(store(&dir).load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_load_count_mismatch_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let (index, labels) = sample(2, 3);
        let mut s = store(&dir);
        s.save(&index, &labels).unwrap();

        let forged = LabelsArtifact {
            generation: s.generation(),
            labels: LabelStore::from_labels(vec!["x".into()]),
        };
        fs::write(&s.paths().labels, serde_json::to_vec(&forged).unwrap()).unwrap();

        assert!(matches!(store(&dir).load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_load_rolls_forward_interrupted_save() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        let (one, one_labels) = sample(1, 3);
        s.save(&one, &one_labels).unwrap();

        // Simulate a crash after the index rename of the next save:
        // new index in place, new labels still pending in `.tmp`.
        let (two, two_labels) = sample(2, 3);
        let old_labels = fs::read(&s.paths().labels).unwrap();
        s.save(&two, &two_labels).unwrap();
        fs::rename(&s.paths().labels, tmp_path(&s.paths().labels)).unwrap();
        fs::write(&s.paths().labels, old_labels).unwrap();

        let loaded = store(&dir).load().unwrap();
        assert_eq!(loaded.index.unwrap().len(), 2);
        assert_eq!(loaded.labels, two_labels);
        assert!(!tmp_path(&s.paths().labels).exists());
    }

    #[test]
    fn test_load_rolls_forward_first_save() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        let (index, labels) = sample(1, 3);
        s.save(&index, &labels).unwrap();
        fs::rename(&s.paths().labels, tmp_path(&s.paths().labels)).unwrap();

        let loaded = store(&dir).load().unwrap();
        assert_eq!(loaded.labels, labels);
        assert!(s.paths().labels.exists());
    }

    #[test]
    fn test_failed_labels_rename_leaves_no_pending_save() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        // A non-empty directory where the labels file belongs makes the second rename fail.
        fs::create_dir_all(s.paths().labels.join("blocker")).unwrap();

        let (index, labels) = sample(1, 3);
        let err = s.save(&index, &labels).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }), "{err}");
        assert_eq!(s.generation(), 0);
        assert!(!s.paths().index.exists());
        assert!(!tmp_path(&s.paths().index).exists());
        assert!(!tmp_path(&s.paths().labels).exists());

        fs::remove_dir_all(&s.paths().labels).unwrap();
        let loaded = store(&dir).load().unwrap();
        assert!(loaded.index.is_none());
        assert!(loaded.labels.is_empty());
    }

    #[test]
    fn test_failed_labels_rename_restores_previous_index() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        let (one, one_labels) = sample(1, 3);
        s.save(&one, &one_labels).unwrap();
        let old_index = fs::read(&s.paths().index).unwrap();

        fs::remove_file(&s.paths().labels).unwrap();
        fs::create_dir_all(s.paths().labels.join("blocker")).unwrap();
        let (two, two_labels) = sample(2, 3);
        assert!(s.save(&two, &two_labels).is_err());

        assert_eq!(fs::read(&s.paths().index).unwrap(), old_index);
        assert!(!backup_path(&s.paths().index).exists());
        assert!(!tmp_path(&s.paths().labels).exists());
        assert_eq!(s.generation(), 1);
    }

    #[test]
    fn test_load_restores_backup_from_interrupted_swap() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        let (index, labels) = sample(2, 3);
        s.save(&index, &labels).unwrap();
        // Crash after the old index moved aside but before the new one landed.
        fs::rename(&s.paths().index, backup_path(&s.paths().index)).unwrap();

        let loaded = store(&dir).load().unwrap();
        assert_eq!(loaded.index.as_ref(), Some(&index));
        assert_eq!(loaded.labels, labels);
        assert!(!backup_path(&s.paths().index).exists());
    }

    #[test]
    fn test_load_removes_stale_backup() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        let (index, labels) = sample(1, 3);
        s.save(&index, &labels).unwrap();
        fs::copy(&s.paths().index, backup_path(&s.paths().index)).unwrap();

        store(&dir).load().unwrap();
        assert!(!backup_path(&s.paths().index).exists());
    }

    #[test]
    fn test_load_rejects_policy_mismatch() {
        let dir = TempDir::new().unwrap();
        let (index, labels) = sample(1, 3);
        store(&dir).save(&index, &labels).unwrap();

        let mut raw = DatabaseStore::new(DatabasePaths::in_dir(dir.path()), NormalizationPolicy::Raw);
        let err = raw.load().unwrap_err();
        assert!(matches!(
            err,
            StoreError::PolicyMismatch {
                stored: NormalizationPolicy::Unit,
                configured: NormalizationPolicy::Raw
            }
        ));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_load_rejects_truncated_index() {
        let dir = TempDir::new().unwrap();
        let (index, labels) = sample(2, 3);
        let mut s = store(&dir);
        s.save(&index, &labels).unwrap();

        let bytes = fs::read(&s.paths().index).unwrap();
        fs::write(&s.paths().index, &bytes[..bytes.len() - 2]).unwrap();
        assert!(matches!(store(&dir).load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let (index, labels) = sample(1, 3);
        let mut s = store(&dir);
        s.save(&index, &labels).unwrap();

        let mut bytes = fs::read(&s.paths().index).unwrap();
        bytes[0] = b'X';
        fs::write(&s.paths().index, bytes).unwrap();
        assert!(matches!(store(&dir).load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_inspect_reports_mismatch_without_modifying() {
        let dir = TempDir::new().unwrap();
        let (index, labels) = sample(3, 4);
        let mut s = store(&dir);
        s.save(&index, &labels).unwrap();

        let forged = LabelsArtifact {
            generation: s.generation(),
            labels: LabelStore::from_labels(vec!["a".into()]),
        };
        let forged_bytes = serde_json::to_vec(&forged).unwrap();
        fs::write(&s.paths().labels, &forged_bytes).unwrap();

        let report = inspect(s.paths()).unwrap();
        assert_eq!(report.vector_count(), 3);
        assert_eq!(report.label_count(), 1);
        assert_eq!(report.dimension(), Some(4));
        assert_eq!(report.warnings().len(), 1);
        assert_eq!(fs::read(&s.paths().labels).unwrap(), forged_bytes);
    }

    #[test]
    fn test_inspect_empty_directory() {
        let dir = TempDir::new().unwrap();
        let report = inspect(&DatabasePaths::in_dir(dir.path())).unwrap();
        assert!(report.index.is_none());
        assert!(report.labels.is_none());
        assert!(report.warnings().is_empty());
    }
}
