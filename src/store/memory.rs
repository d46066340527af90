//! In-memory catalog tables with JSON snapshots
//!
//! Samples are kept as numbered rows, like a database table with a surrogate
//! key, so a snapshot that breaks the one-sample-per-key rule still loads and
//! the violation surfaces as `DuplicateRecord` on the next upsert. Finder
//! records are keyed by (exposure, target, tile) and cannot repeat.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::{EphemerisSample, FinderRecord, FinderRepository, RowChange, SampleKey};
use crate::{FinderError, Result};

type FinderKey = (String, String, u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SampleRow {
    id: u64,
    exposure_id: String,
    target: String,
    #[serde(flatten)]
    sample: EphemerisSample,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FinderRow {
    exposure_id: String,
    target: String,
    #[serde(flatten)]
    record: FinderRecord,
}

/// On-disk snapshot layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    samples: Vec<SampleRow>,
    finders: Vec<FinderRow>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    samples: BTreeMap<u64, SampleRow>,
    finders: BTreeMap<FinderKey, FinderRecord>,
}

impl Tables {
    fn sample_ids(&self, key: &SampleKey) -> Vec<u64> {
        self.samples
            .values()
            .filter(|row| row.exposure_id == key.exposure_id && row.target == key.target)
            .map(|row| row.id)
            .collect()
    }

    fn insert_sample(&mut self, key: &SampleKey, sample: EphemerisSample) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.samples.insert(
            id,
            SampleRow {
                id,
                exposure_id: key.exposure_id.clone(),
                target: key.target.clone(),
                sample,
            },
        );
        id
    }
}

fn finder_key(key: &SampleKey, tile_id: u32) -> FinderKey {
    (key.exposure_id.clone(), key.target.clone(), tile_id)
}

/// Thread-safe in-memory repository
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`MemoryRepository::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;

        let mut tables = Tables::default();
        for row in snapshot.samples {
            tables.next_id = tables.next_id.max(row.id);
            if tables.samples.insert(row.id, row.clone()).is_some() {
                return Err(FinderError::Config(format!(
                    "snapshot {} repeats sample row id {}",
                    path.as_ref().display(),
                    row.id
                )));
            }
        }
        for row in snapshot.finders {
            let key = (row.exposure_id, row.target, row.record.tile_id);
            if tables.finders.contains_key(&key) {
                log::warn!(
                    "Snapshot repeats finder {}/{} tile {}; keeping the first",
                    key.0,
                    key.1,
                    key.2
                );
                continue;
            }
            tables.finders.insert(key, row.record);
        }

        log::info!(
            "Loaded {} samples and {} finders from {}",
            tables.samples.len(),
            tables.finders.len(),
            path.as_ref().display()
        );
        Ok(MemoryRepository {
            tables: RwLock::new(tables),
        })
    }

    /// Load a snapshot if the file exists, otherwise start empty
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            log::info!(
                "No catalog at {}, starting empty",
                path.as_ref().display()
            );
            Ok(Self::new())
        }
    }

    /// Write a snapshot of both tables
    ///
    /// The snapshot goes to a temporary file first and is renamed into place,
    /// so an interrupted save leaves the previous snapshot intact.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let snapshot = {
            let tables = self.tables.read();
            Snapshot {
                samples: tables.samples.values().cloned().collect(),
                finders: tables
                    .finders
                    .iter()
                    .map(|((exposure_id, target, _), record)| FinderRow {
                        exposure_id: exposure_id.clone(),
                        target: target.clone(),
                        record: record.clone(),
                    })
                    .collect(),
            }
        };

        let temp_path = path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Append a sample row without the uniqueness check
    ///
    /// Used when importing rows from another system, where uniqueness is
    /// that system's responsibility.
    pub fn import_sample(&self, key: &SampleKey, sample: EphemerisSample) -> u64 {
        self.tables.write().insert_sample(key, sample)
    }

    pub fn sample_count(&self) -> usize {
        self.tables.read().samples.len()
    }

    pub fn finder_count(&self) -> usize {
        self.tables.read().finders.len()
    }
}

impl FinderRepository for MemoryRepository {
    fn samples_for(&self, key: &SampleKey) -> Result<Vec<EphemerisSample>> {
        let tables = self.tables.read();
        Ok(tables
            .sample_ids(key)
            .into_iter()
            .filter_map(|id| tables.samples.get(&id).map(|row| row.sample.clone()))
            .collect())
    }

    fn upsert_sample(
        &self,
        key: &SampleKey,
        sample: &EphemerisSample,
        reproc: bool,
    ) -> Result<(EphemerisSample, RowChange)> {
        let mut tables = self.tables.write();
        let ids = tables.sample_ids(key);
        match ids.as_slice() {
            [] => {
                tables.insert_sample(key, sample.clone());
                Ok((sample.clone(), RowChange::Inserted))
            }
            [id] => {
                let row = tables
                    .samples
                    .get_mut(id)
                    .ok_or_else(|| FinderError::Config(format!("sample row {} vanished", id)))?;
                if !reproc || row.sample == *sample {
                    return Ok((row.sample.clone(), RowChange::Unchanged));
                }
                row.sample = sample.clone();
                Ok((sample.clone(), RowChange::Updated))
            }
            _ => Err(FinderError::DuplicateRecord {
                exposure: key.exposure_id.clone(),
                target: key.target.clone(),
                count: ids.len(),
            }),
        }
    }

    fn finders_for(&self, key: &SampleKey) -> Result<Vec<FinderRecord>> {
        let tables = self.tables.read();
        let start = finder_key(key, 0);
        let end = finder_key(key, u32::MAX);
        Ok(tables
            .finders
            .range(start..=end)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn upsert_finder(
        &self,
        key: &SampleKey,
        record: &FinderRecord,
        reproc: bool,
    ) -> Result<RowChange> {
        let mut tables = self.tables.write();
        match tables.finders.entry(finder_key(key, record.tile_id)) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(RowChange::Inserted)
            }
            Entry::Occupied(mut slot) if reproc && slot.get() != record => {
                slot.insert(record.clone());
                Ok(RowChange::Updated)
            }
            Entry::Occupied(_) => Ok(RowChange::Unchanged),
        }
    }

    fn remove_finders(&self, key: &SampleKey, tile_ids: &[u32]) -> Result<usize> {
        let mut tables = self.tables.write();
        Ok(tile_ids
            .iter()
            .filter(|&&tile_id| tables.finders.remove(&finder_key(key, tile_id)).is_some())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(x: i64, y: i64) -> EphemerisSample {
        EphemerisSample {
            ra: "20:04:28.46".to_string(),
            dec: "-19:56:02.8".to_string(),
            pixel_x: x,
            pixel_y: y,
            magnitude: Some(5.3),
            diameter: None,
        }
    }

    fn finder(tile_id: u32, x: u32, y: u32) -> FinderRecord {
        FinderRecord {
            tile_id,
            local_x: x,
            local_y: y,
            magnitude: Some(5.3),
            diameter: None,
        }
    }

    #[test]
    fn test_upsert_sample_lifecycle() {
        let repo = MemoryRepository::new();
        let key = SampleKey::new("ib4v12abq", "io");

        let (stored, change) = repo.upsert_sample(&key, &sample(10, 20), false).unwrap();
        assert_eq!(change, RowChange::Inserted);
        assert_eq!(stored.pixel_x, 10);

        // Without reproc the stored row wins
        let (stored, change) = repo.upsert_sample(&key, &sample(99, 99), false).unwrap();
        assert_eq!(change, RowChange::Unchanged);
        assert_eq!((stored.pixel_x, stored.pixel_y), (10, 20));

        let (stored, change) = repo.upsert_sample(&key, &sample(99, 99), true).unwrap();
        assert_eq!(change, RowChange::Updated);
        assert_eq!(stored.pixel_x, 99);

        let (_, change) = repo.upsert_sample(&key, &sample(99, 99), true).unwrap();
        assert_eq!(change, RowChange::Unchanged);
        assert_eq!(repo.sample_count(), 1);
    }

    #[test]
    fn test_duplicate_samples_are_reported() {
        let repo = MemoryRepository::new();
        let key = SampleKey::new("ib4v12abq", "io");
        repo.import_sample(&key, sample(1, 1));
        repo.import_sample(&key, sample(2, 2));

        let err = repo.upsert_sample(&key, &sample(3, 3), true).unwrap_err();
        assert!(matches!(
            err,
            FinderError::DuplicateRecord { count: 2, .. }
        ));
        // Nothing was repaired or added
        assert_eq!(repo.samples_for(&key).unwrap().len(), 2);
    }

    #[test]
    fn test_finders_are_scoped_to_their_key() {
        let repo = MemoryRepository::new();
        let io = SampleKey::new("ib4v12abq", "io");
        let europa = SampleKey::new("ib4v12abq", "europa");

        repo.upsert_finder(&io, &finder(2, 5, 10), false).unwrap();
        repo.upsert_finder(&io, &finder(1, 430, 10), false).unwrap();
        repo.upsert_finder(&europa, &finder(7, 1, 1), false).unwrap();

        let tiles: Vec<u32> = repo
            .finders_for(&io)
            .unwrap()
            .iter()
            .map(|f| f.tile_id)
            .collect();
        assert_eq!(tiles, vec![1, 2]);

        assert_eq!(repo.remove_finders(&io, &[2, 9]).unwrap(), 1);
        assert_eq!(repo.finders_for(&io).unwrap().len(), 1);
        assert_eq!(repo.finders_for(&europa).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_finder_respects_reproc() {
        let repo = MemoryRepository::new();
        let key = SampleKey::new("ib4v12abq", "io");

        assert_eq!(
            repo.upsert_finder(&key, &finder(2, 5, 10), false).unwrap(),
            RowChange::Inserted
        );
        assert_eq!(
            repo.upsert_finder(&key, &finder(2, 6, 11), false).unwrap(),
            RowChange::Unchanged
        );
        assert_eq!(repo.finders_for(&key).unwrap()[0].local_x, 5);
        assert_eq!(
            repo.upsert_finder(&key, &finder(2, 6, 11), true).unwrap(),
            RowChange::Updated
        );
        assert_eq!(repo.finders_for(&key).unwrap()[0].local_x, 6);
    }

    #[test]
    fn test_snapshot_save_load_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("catalog").join("finders.json");

        let repo = MemoryRepository::new();
        let key = SampleKey::new("ib4v12abq", "io");
        repo.upsert_sample(&key, &sample(430, 10), false).unwrap();
        repo.upsert_finder(&key, &finder(1, 430, 10), false).unwrap();
        repo.upsert_finder(&key, &finder(2, 5, 10), false).unwrap();
        repo.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = MemoryRepository::load(&path).unwrap();
        assert_eq!(loaded.sample_count(), 1);
        assert_eq!(loaded.finder_count(), 2);
        assert_eq!(loaded.samples_for(&key).unwrap(), vec![sample(430, 10)]);

        // New rows continue after the highest loaded id
        loaded.upsert_sample(&SampleKey::new("ib4v12abq", "europa"), &sample(1, 1), false).unwrap();
        assert_eq!(loaded.sample_count(), 2);
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let temp_dir = tempdir().unwrap();
        let repo = MemoryRepository::open(temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(repo.sample_count(), 0);
        assert!(MemoryRepository::load(temp_dir.path().join("absent.json")).is_err());
    }
}
