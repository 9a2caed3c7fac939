// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame history keyed by frame id.
//!
//! The store is shared between the receiver, which inserts every verified
//! frame, and any number of readers.  All access goes through one mutex so a
//! reader never observes a half-written batch.

use crate::eth::{IsysError, TargetRecord};
use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{BufReader, BufWriter, Write as _},
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, instrument};

/// Exported history: frame id to the ordered target batches received under
/// that id.  Serializes as `{ "<frame_id>": [[target, ...], ...] }`.
pub type Snapshot = BTreeMap<u16, Vec<Vec<TargetRecord>>>;

/// How a batch is stored when its frame id is already present.
///
/// The sensor's 16-bit frame id wraps and recurs across transmission cycles,
/// so the default keeps every batch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum HistoryPolicy {
    /// Append the batch after the batches already stored for the id.
    #[default]
    Append,
    /// Replace all batches stored for the id with the new batch.
    Overwrite,
}

impl fmt::Display for HistoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HistoryPolicy::Append => write!(f, "append"),
            HistoryPolicy::Overwrite => write!(f, "overwrite"),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    policy: HistoryPolicy,
    frames: Snapshot,
}

/// Cloneable handle to a shared frame history.
#[derive(Clone, Debug, Default)]
pub struct FrameStore {
    inner: Arc<Mutex<Inner>>,
}

impl FrameStore {
    /// Creates an empty store using `policy` for recurring frame ids.
    pub fn new(policy: HistoryPolicy) -> FrameStore {
        FrameStore {
            inner: Arc::new(Mutex::new(Inner {
                policy,
                frames: Snapshot::new(),
            })),
        }
    }

    // Every mutation is a single insert or replace, so the map is consistent
    // even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The policy applied to recurring frame ids.
    pub fn policy(&self) -> HistoryPolicy {
        self.lock().policy
    }

    /// Stores a batch of already filtered targets under `frame_id`.
    pub fn put(&self, frame_id: u16, targets: Vec<TargetRecord>) {
        let mut inner = self.lock();
        let policy = inner.policy;
        match policy {
            HistoryPolicy::Append => inner.frames.entry(frame_id).or_default().push(targets),
            HistoryPolicy::Overwrite => {
                inner.frames.insert(frame_id, vec![targets]);
            }
        }
    }

    /// Returns every batch stored for `frame_id`, oldest first, or an empty
    /// list for an unknown id.
    pub fn get(&self, frame_id: u16) -> Vec<Vec<TargetRecord>> {
        self.lock()
            .frames
            .get(&frame_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the stored frame ids in ascending order.
    pub fn frame_ids(&self) -> Vec<u16> {
        self.lock().frames.keys().copied().collect()
    }

    /// Returns the number of distinct frame ids.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Returns true if no frame has been stored.
    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Removes every stored frame.  The policy is kept.
    pub fn clear(&self) {
        self.lock().frames.clear();
    }

    /// Returns a copy of the whole history.
    pub fn export(&self) -> Snapshot {
        self.lock().frames.clone()
    }

    /// Exports the history and clears the store in one step.
    pub fn take(&self) -> Snapshot {
        std::mem::take(&mut self.lock().frames)
    }

    /// Replaces the current history with `snapshot`.
    pub fn import(&self, snapshot: Snapshot) {
        self.lock().frames = snapshot;
    }

    /// Writes the history to `path` as pretty-printed JSON.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), IsysError> {
        let snapshot = self.export();
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.flush()?;
        debug!("saved {} frame ids", snapshot.len());
        Ok(())
    }

    /// Replaces the history with the JSON file at `path`.  The store is left
    /// untouched when the file cannot be read or parsed.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<(), IsysError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        debug!("loaded {} frame ids", snapshot.len());
        self.import(snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn target(range: f32) -> TargetRecord {
        TargetRecord::new(10.0, range, 1.5, 45.0)
    }

    #[test]
    fn test_append_is_default_contract() {
        let store = FrameStore::default();
        assert_eq!(store.policy(), HistoryPolicy::Append);

        let (t1, t2) = (target(1.0), target(2.0));
        store.put(5, vec![t1]);
        store.put(5, vec![t2]);

        // A recurring frame id keeps both batches in arrival order.
        assert_eq!(store.get(5), vec![vec![t1], vec![t2]]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overwrite_policy() {
        let store = FrameStore::new(HistoryPolicy::Overwrite);
        store.put(5, vec![target(1.0)]);
        store.put(5, vec![target(2.0), target(3.0)]);
        assert_eq!(store.get(5), vec![vec![target(2.0), target(3.0)]]);
    }

    #[test]
    fn test_unknown_frame() {
        let store = FrameStore::default();
        assert!(store.get(42).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_export_import() {
        let store = FrameStore::default();
        store.put(3, vec![target(1.0)]);
        store.put(1, vec![target(2.0)]);
        assert_eq!(store.frame_ids(), vec![1, 3]);

        let snapshot = store.export();
        assert_eq!(snapshot.len(), 2);

        let restored = FrameStore::default();
        restored.put(9, vec![target(9.0)]);
        restored.import(snapshot.clone());
        assert_eq!(restored.export(), snapshot);
        assert!(restored.get(9).is_empty());
    }

    #[test]
    fn test_take_clears() {
        let store = FrameStore::default();
        store.put(1, vec![target(1.0)]);
        let snapshot = store.take();
        assert_eq!(snapshot.get(&1), Some(&vec![vec![target(1.0)]]));
        assert!(store.is_empty());

        store.put(2, vec![]);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let store = FrameStore::default();
        store.put(7, vec![TargetRecord::new(12.5, 30.0, -3.0, 90.0)]);

        let json = serde_json::to_value(store.export()).unwrap();
        assert_eq!(json["7"][0][0]["signal_strength"], 12.5);
        assert_eq!(json["7"][0][0]["range"], 30.0);
        assert_eq!(json["7"][0][0]["velocity"], -3.0);
        assert_eq!(json["7"][0][0]["azimuth"], 90.0);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let store = FrameStore::default();
        store.put(1, vec![target(1.0), target(2.0)]);
        store.put(1, vec![target(3.0)]);
        store.put(65535, vec![target(4.0)]);
        store.save(&path).unwrap();

        let loaded = FrameStore::default();
        loaded.load(&path).unwrap();
        assert_eq!(loaded.export(), store.export());

        assert!(matches!(
            loaded.load(dir.path().join("missing.json")),
            Err(IsysError::IoError(_))
        ));

        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(loaded.load(&path), Err(IsysError::JsonError(_))));
        // A failed load leaves the previous history untouched.
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_save_load_non_finite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        // Checksum-valid wire data may carry non-finite measurements.
        let store = FrameStore::default();
        store.put(
            1,
            vec![
                TargetRecord::new(f32::NAN, 30.0, f32::INFINITY, 90.0),
                TargetRecord::new(10.0, f32::NEG_INFINITY, -2.5, 45.0),
            ],
        );
        store.put(2, vec![target(5.0)]);
        store.save(&path).unwrap();

        let loaded = FrameStore::default();
        loaded.load(&path).unwrap();

        let batches = loaded.get(1);
        let first = batches[0][0];
        assert!(first.signal_strength.is_nan());
        assert_eq!(first.range, 30.0);
        assert_eq!(first.velocity, f32::INFINITY);
        assert_eq!(batches[0][1].range, f32::NEG_INFINITY);
        assert_eq!(loaded.get(2), vec![vec![target(5.0)]]);
    }

    #[test]
    fn test_shared_across_threads() {
        let store = FrameStore::default();
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        store.put(n, vec![target(n as f32)]);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 4);
        for n in 0..4 {
            assert_eq!(store.get(n).len(), 100);
        }
    }
}
