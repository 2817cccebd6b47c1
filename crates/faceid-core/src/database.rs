//! The enrolled-face database: vector index, label store and their persistence,
//! kept in lockstep.

use crate::error::PipelineError;
use crate::index::{Neighbor, VectorIndex};
use crate::labels::{LabelGenerator, LabelStore};
use crate::store::DatabaseStore;
use crate::types::Descriptor;
use parking_lot::RwLock;
use std::sync::Arc;

/// Handle shared by every stream's controller.
///
/// Searches take the read lock; registration holds the write lock from the
/// append through the save, so no reader ever sees a half-registered pair.
pub type SharedDatabase = Arc<RwLock<FaceDatabase>>;

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrolled {
    pub label: String,
    pub position: usize,
}

/// Nearest enrolled face for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Nearest {
    pub position: usize,
    pub label: String,
    pub distance: f32,
}

pub struct FaceDatabase {
    index: Option<VectorIndex>,
    labels: LabelStore,
    generator: LabelGenerator,
    store: DatabaseStore,
}

impl FaceDatabase {
    /// Load the persisted pair through `store`.
    pub fn open(mut store: DatabaseStore) -> Result<Self, PipelineError> {
        let loaded = store.load()?;
        let generator = LabelGenerator::resume_from(&loaded.labels);
        Ok(Self {
            index: loaded.index,
            labels: loaded.labels,
            generator,
            store,
        })
    }

    pub fn into_shared(self) -> SharedDatabase {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.index.as_ref().map_or(0, VectorIndex::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptor dimension, once the index has been created.
    pub fn dimension(&self) -> Option<usize> {
        self.index.as_ref().map(VectorIndex::dimension)
    }

    pub fn labels(&self) -> &LabelStore {
        &self.labels
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn store(&self) -> &DatabaseStore {
        &self.store
    }

    /// Append `descriptor` under a fresh label and persist the pair.
    ///
    /// On any failure memory is left exactly as it was before the call, which
    /// is also what is on disk.
    pub fn register(&mut self, descriptor: &Descriptor) -> Result<Enrolled, PipelineError> {
        let created = self.index.is_none();
        let index = match self.index {
            Some(ref mut index) => index,
            None => {
                tracing::info!(dimension = descriptor.len(), "creating vector index");
                self.index.insert(VectorIndex::create(descriptor.len())?)
            }
        };

        let before = index.len();
        let position = match index.add(descriptor) {
            Ok(position) => position,
            Err(e) => {
                if created {
                    self.index = None;
                }
                return Err(e.into());
            }
        };
        let label = self.generator.next_label(&self.labels);
        self.labels.push(label.clone());

        if let Err(e) = self.store.save(index, &self.labels) {
            index.truncate(before);
            self.labels.truncate(before);
            if created {
                self.index = None;
            }
            tracing::warn!(error = %e, label = %label, "save failed; registration rolled back");
            return Err(e.into());
        }

        tracing::info!(label = %label, position, total = self.labels.len(), "registered face");
        Ok(Enrolled { label, position })
    }

    /// Nearest enrolled face by squared Euclidean distance.
    pub fn nearest(&self, query: &Descriptor) -> Result<Nearest, PipelineError> {
        let index = self.index.as_ref().ok_or(PipelineError::EmptyIndex)?;
        let Neighbor { position, distance } = index.search(query)?;
        let label = self
            .labels
            .get(position)
            .ok_or(PipelineError::OutOfRange { position, len: self.labels.len() })?
            .to_string();
        Ok(Nearest { position, label, distance })
    }

    /// Copy of the enrolled descriptor at `position`.
    pub fn reconstruct(&self, position: usize) -> Result<Descriptor, PipelineError> {
        let index = self
            .index
            .as_ref()
            .ok_or(PipelineError::OutOfRange { position, len: 0 })?;
        Ok(index.reconstruct(position)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::DatabasePaths;
    use crate::types::NormalizationPolicy;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> FaceDatabase {
        let store = DatabaseStore::new(DatabasePaths::in_dir(dir.path()), NormalizationPolicy::Raw);
        FaceDatabase::open(store).unwrap()
    }

    #[test]
    fn test_register_creates_index_lazily() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir);
        assert_eq!(db.dimension(), None);

        let enrolled = db.register(&Descriptor::new(vec![0.5; 128])).unwrap();
        assert_eq!(enrolled.position, 0);
        assert!(enrolled.label.starts_with("face_1_"));
        assert_eq!(db.dimension(), Some(128));
        assert_eq!(db.len(), 1);
        assert_eq!(db.labels().len(), 1);
        assert!(db.store().paths().index.exists());
        assert!(db.store().paths().labels.exists());
    }

    #[test]
    fn test_register_dimension_mismatch_no_partial_write() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir);
        db.register(&Descriptor::new(vec![0.5; 4])).unwrap();
        let on_disk = std::fs::read(&db.store().paths().index).unwrap();

        let err = db.register(&Descriptor::new(vec![0.5; 3])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(db.len(), 1);
        assert_eq!(db.labels().len(), 1);
        assert_eq!(std::fs::read(&db.store().paths().index).unwrap(), on_disk);
    }

    #[test]
    fn test_register_rolls_back_when_save_fails() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir);
        // A directory squatting on the temporary index path makes the write fail.
        let mut tmp = db.store().paths().index.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::create_dir_all(std::path::PathBuf::from(tmp).join("inner")).unwrap();

        let err = db.register(&Descriptor::new(vec![1.0, 2.0])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert_eq!(db.len(), 0);
        assert!(db.labels().is_empty());
        assert_eq!(db.dimension(), None);
        assert!(!db.store().paths().index.exists());
        assert!(!db.store().paths().labels.exists());
    }

    #[test]
    fn test_failed_registration_does_not_reappear_after_reopen() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir);
        let labels_path = db.store().paths().labels.clone();
        std::fs::create_dir_all(labels_path.join("inner")).unwrap();

        let err = db.register(&Descriptor::new(vec![1.0, 2.0])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert_eq!(db.len(), 0);
        drop(db);

        std::fs::remove_dir_all(&labels_path).unwrap();
        let reopened = open(&dir);
        assert_eq!(reopened.len(), 0);
        assert!(reopened.labels().is_empty());
    }

    #[test]
    fn test_sizes_stay_equal_after_every_add() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir);
        for i in 0..5 {
            db.register(&Descriptor::new(vec![i as f32, 0.0])).unwrap();
            assert_eq!(db.len(), db.labels().len());
        }
    }

    #[test]
    fn test_reopen_sees_registrations_and_continues_counter() {
        let dir = TempDir::new().unwrap();
        let first = {
            let mut db = open(&dir);
            db.register(&Descriptor::new(vec![1.0, 0.0])).unwrap();
            db.register(&Descriptor::new(vec![0.0, 1.0])).unwrap()
        };

        let mut db = open(&dir);
        assert_eq!(db.len(), 2);
        assert_eq!(db.labels().get(1), Some(first.label.as_str()));
        let third = db.register(&Descriptor::new(vec![1.0, 1.0])).unwrap();
        assert!(third.label.starts_with("face_3_"), "{}", third.label);
    }

    #[test]
    fn test_nearest_and_reconstruct() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir);
        let a = db.register(&Descriptor::new(vec![0.0, 0.0])).unwrap();
        let b = db.register(&Descriptor::new(vec![3.0, 4.0])).unwrap();

        let hit = db.nearest(&Descriptor::new(vec![2.9, 4.0])).unwrap();
        assert_eq!(hit.label, b.label);
        assert_eq!(hit.position, 1);

        let hit = db.nearest(&Descriptor::new(vec![0.1, 0.0])).unwrap();
        assert_eq!(hit.label, a.label);

        assert_eq!(db.reconstruct(1).unwrap(), Descriptor::new(vec![3.0, 4.0]));
        assert_eq!(db.reconstruct(2).unwrap_err().kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn test_nearest_on_uncreated_index() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let err = db.nearest(&Descriptor::new(vec![0.0])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyIndex);
    }

    #[test]
    fn test_concurrent_registrations_stay_aligned() {
        let dir = TempDir::new().unwrap();
        let shared = open(&dir).into_shared();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let db = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for i in 0..5 {
                        let d = Descriptor::new(vec![t as f32, i as f32, 1.0]);
                        db.write().register(&d).unwrap();
                        let guard = db.read();
                        assert_eq!(guard.len(), guard.labels().len());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let guard = shared.read();
        assert_eq!(guard.len(), 20);
        let mut labels: Vec<&str> = guard.labels().iter().collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 20);
        drop(guard);

        let reopened = open(&dir);
        assert_eq!(reopened.len(), 20);
        assert_eq!(reopened.labels().len(), 20);
    }
}
