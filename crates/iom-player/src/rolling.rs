//! Windowed rolling queue of byte sources.
//!
//! Items are addressed by an absolute index that only grows. Around the cursor a
//! fixed window of `2 * radius + 1` items is kept in memory. Items that fall out of
//! the window go to a small overcache when a slot is free, otherwise they are
//! spilled to `<prefix><index><suffix>` files in the spill directory.
//!
//! ## Window layout
//! The window is a ring: absolute index `i` lives in slot `i mod (2 * radius + 1)`.
//! Moving the cursor never copies slots; the slot vacated on one side is exactly
//! the slot needed on the other side.
//!
//! ## Background loads
//! Refilling the vacated slot from disk runs on a helper thread which reports back
//! over a single-slot channel. At most one load is outstanding. Every navigation
//! call and [`RollingQueue::close`] settles the previous load before touching the
//! window; a failed load stays failed so retries observe the same error.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::source::{ByteSource, MemorySource, read_all};

type Item = Box<dyn ByteSource>;

enum LoadState {
    /// Nothing in flight. `false` records a failed load.
    Settled(bool),
    /// A spill file is being read on a helper thread.
    InFlight {
        index: i64,
        rx: Receiver<io::Result<MemorySource>>,
    },
}

/// Ordered, append-only queue with a fixed in-memory window around the cursor.
pub struct RollingQueue {
    config: QueueConfig,
    /// `-1` until the first `next`.
    current: i64,
    /// Lowest index still retrievable.
    minimum: i64,
    /// One past the last appended index.
    maximum: i64,
    window: Vec<Option<Item>>,
    overcache: Vec<Option<(i64, Item)>>,
    load: LoadState,
}

impl RollingQueue {
    pub fn new(config: QueueConfig) -> Self {
        let config = config.normalized();
        let window = (0..config.window_radius * 2 + 1).map(|_| None).collect();
        let overcache = (0..config.overcache_size).map(|_| None).collect();
        Self {
            config,
            current: -1,
            minimum: 0,
            maximum: 0,
            window,
            overcache,
            load: LoadState::Settled(true),
        }
    }

    /// Absolute index of the current item, `None` before the first `next`.
    pub fn index(&self) -> Option<u64> {
        u64::try_from(self.current).ok()
    }

    /// Number of items ever appended.
    pub fn len(&self) -> u64 {
        self.maximum as u64
    }

    pub fn is_empty(&self) -> bool {
        self.maximum == 0
    }

    pub fn minimum_index(&self) -> u64 {
        self.minimum as u64
    }

    pub fn has_now(&self) -> bool {
        self.current != -1
    }

    pub fn has_next(&self) -> bool {
        self.maximum > self.current + 1
    }

    pub fn has_previous(&self) -> bool {
        (self.in_window(self.current - 1) || self.config.persist_to_disk)
            && self.current > self.minimum
    }

    /// Spill file path for an absolute index.
    pub fn spill_path(&self, index: u64) -> PathBuf {
        self.config.spill_dir.join(format!(
            "{}{}{}",
            self.config.filename_prefix, index, self.config.filename_suffix
        ))
    }

    /// Append an item at the end of the queue and return its absolute index.
    ///
    /// Placement priority: window slot, free overcache slot, spill file.
    pub fn append(&mut self, item: Item) -> QueueResult<u64> {
        let index = self.maximum;
        if self.in_window(index) {
            let slot = self.slot(index);
            self.window[slot] = Some(item);
        } else if let Some(free) = self.free_overcache_slot() {
            self.overcache[free] = Some((index, item));
        } else {
            self.stash(index, item)?;
        }
        self.maximum += 1;
        Ok(index as u64)
    }

    /// Copy a transient reader into memory and append it.
    pub fn append_copy<R: Read + ?Sized>(&mut self, reader: &mut R) -> QueueResult<u64> {
        let source = MemorySource::from_reader(reader)?;
        self.append(Box::new(source))
    }

    /// Append a file from disk, read lazily when played.
    pub fn append_file(&mut self, path: &Path) -> QueueResult<u64> {
        let file = fs::File::open(path)?;
        self.append(Box::new(file))
    }

    /// Current item.
    pub fn now(&mut self) -> QueueResult<&mut dyn ByteSource> {
        if !self.has_now() {
            return Err(QueueError::NoCurrentItem);
        }
        self.wait_for_current()
    }

    /// Move the cursor forward and return the new current item.
    pub fn next(&mut self) -> QueueResult<&mut dyn ByteSource> {
        if !self.has_next() {
            return Err(QueueError::NoNextItem);
        }
        self.settle_load()?;

        let radius = self.radius();
        let outgoing = self.current - radius;
        if outgoing >= 0 {
            let slot = self.slot(outgoing);
            if self.config.persist_to_disk {
                // The item stays in its slot until the spill file is written.
                let path = self.spill_path(outgoing as u64);
                if let Some(item) = self.window[slot].as_deref_mut() {
                    write_spill(&path, outgoing, item)?;
                }
                self.window[slot] = None;
            } else {
                if let Some(mut item) = self.window[slot].take() {
                    if let Err(e) = item.close() {
                        tracing::warn!(index = outgoing, "close dropped item: {e}");
                    }
                }
                self.minimum = self.minimum.max(outgoing + 1);
            }
        }

        self.current += 1;
        let incoming = self.current + radius;
        if incoming < self.maximum {
            self.begin_load(incoming);
        }
        self.wait_for_current()
    }

    /// Move the cursor back and return the new current item.
    pub fn previous(&mut self) -> QueueResult<&mut dyn ByteSource> {
        if !self.has_previous() {
            return Err(QueueError::NoPreviousItem);
        }
        self.settle_load()?;

        let radius = self.radius();
        let outgoing = self.current + radius;
        if outgoing < self.maximum {
            self.evict(outgoing)?;
        }

        self.current -= 1;
        let incoming = self.current - radius;
        if incoming >= 0 && self.config.persist_to_disk {
            self.begin_load(incoming);
        }
        self.wait_for_current()
    }

    /// Close every held item and delete spill files that are no longer reachable.
    ///
    /// Must not race with navigation. Safe to call again afterwards.
    pub fn close(&mut self) -> QueueResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        self.settle_load()?;

        let mut first_err: Option<io::Error> = None;
        for slot in self.window.iter_mut() {
            if let Some(mut item) = slot.take() {
                if let Err(e) = item.close() {
                    first_err.get_or_insert(e);
                }
            }
        }
        for slot in self.overcache.iter_mut() {
            if let Some((_, mut item)) = slot.take() {
                if let Err(e) = item.close() {
                    first_err.get_or_insert(e);
                }
            }
        }

        let radius = self.radius();
        if self.config.persist_to_disk {
            for index in 0..(self.current - radius).max(0) {
                self.remove_spill(index);
            }
        }
        for index in (self.current + radius + 1).max(0)..self.maximum {
            self.remove_spill(index);
        }

        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn radius(&self) -> i64 {
        self.config.window_radius as i64
    }

    fn slot(&self, index: i64) -> usize {
        index.rem_euclid(self.window.len() as i64) as usize
    }

    fn in_window(&self, index: i64) -> bool {
        (index - self.current).abs() <= self.radius()
    }

    fn free_overcache_slot(&self) -> Option<usize> {
        self.overcache.iter().position(Option::is_none)
    }

    fn take_from_overcache(&mut self, index: i64) -> Option<Item> {
        let pos = self
            .overcache
            .iter()
            .position(|entry| matches!(entry, Some((i, _)) if *i == index))?;
        self.overcache[pos].take().map(|(_, item)| item)
    }

    /// Move the window item at `index` to the overcache or to disk.
    ///
    /// On a failed write the item is left in its slot.
    fn evict(&mut self, index: i64) -> QueueResult<()> {
        let slot = self.slot(index);
        if self.window[slot].is_none() {
            return Ok(());
        }
        if let Some(free) = self.free_overcache_slot() {
            self.overcache[free] = self.window[slot].take().map(|item| (index, item));
            return Ok(());
        }
        let path = self.spill_path(index as u64);
        if let Some(item) = self.window[slot].as_deref_mut() {
            write_spill(&path, index, item)?;
        }
        self.window[slot] = None;
        Ok(())
    }

    /// Keep an item that is not in the window reachable: overcache first, then disk.
    fn stash(&mut self, index: i64, mut item: Item) -> QueueResult<()> {
        match self.free_overcache_slot() {
            Some(free) => {
                self.overcache[free] = Some((index, item));
                Ok(())
            }
            None => write_spill(&self.spill_path(index as u64), index, item.as_mut()),
        }
    }

    fn remove_spill(&self, index: i64) {
        let path = self.spill_path(index as u64);
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(index, path = %path.display(), "removed spill file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(index, path = %path.display(), "spill cleanup failed: {e}"),
        }
    }

    /// Start refilling `index` into its window slot.
    ///
    /// Overcache hits complete immediately; misses read the spill file on a helper thread.
    fn begin_load(&mut self, index: i64) {
        if let Some(item) = self.take_from_overcache(index) {
            let slot = self.slot(index);
            self.window[slot] = Some(item);
            self.load = LoadState::Settled(true);
            return;
        }

        let path = self.spill_path(index as u64);
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = tx.send(load_spill_file(&path));
        });
        self.load = LoadState::InFlight { index, rx };
    }

    /// Observe the outstanding load, installing its item.
    fn settle_load(&mut self) -> QueueResult<()> {
        match std::mem::replace(&mut self.load, LoadState::Settled(true)) {
            LoadState::Settled(true) => Ok(()),
            LoadState::Settled(false) => {
                self.load = LoadState::Settled(false);
                Err(QueueError::LoadFailure)
            }
            LoadState::InFlight { index, rx } => {
                let outcome = rx
                    .recv()
                    .unwrap_or_else(|_| Err(io::Error::other("load thread exited")));
                self.finish_load(index, outcome)
            }
        }
    }

    fn finish_load(&mut self, index: i64, outcome: io::Result<MemorySource>) -> QueueResult<()> {
        match outcome {
            Ok(source) => {
                self.load = LoadState::Settled(true);
                self.install(index, Box::new(source))
            }
            Err(e) => {
                tracing::warn!(index, "queue load failed: {e}");
                self.load = LoadState::Settled(false);
                Err(QueueError::LoadFailure)
            }
        }
    }

    fn install(&mut self, index: i64, item: Item) -> QueueResult<()> {
        if self.in_window(index) {
            let slot = self.slot(index);
            self.window[slot] = Some(item);
            Ok(())
        } else {
            // The cursor moved away while the load was in flight.
            self.stash(index, item)
        }
    }

    /// Return the center item, waiting up to the load timeout if it is still being loaded.
    fn wait_for_current(&mut self) -> QueueResult<&mut dyn ByteSource> {
        let slot = self.slot(self.current);
        if self.window[slot].is_none() {
            let waited = match &self.load {
                LoadState::InFlight { index, rx } if *index == self.current => {
                    Some(rx.recv_timeout(self.config.load_timeout))
                }
                _ => None,
            };
            match waited {
                Some(Ok(outcome)) => self.finish_load(self.current, outcome)?,
                Some(Err(RecvTimeoutError::Timeout)) | None => {
                    return Err(QueueError::LoadTimeout);
                }
                Some(Err(RecvTimeoutError::Disconnected)) => {
                    self.load = LoadState::Settled(false);
                    return Err(QueueError::LoadFailure);
                }
            }
        }
        match self.window[slot].as_deref_mut() {
            Some(item) => Ok(item),
            None => Err(QueueError::LoadTimeout),
        }
    }
}

/// Write `item` to `path`, then release it. Nothing is released if the write fails.
fn write_spill(path: &Path, index: i64, item: &mut dyn ByteSource) -> QueueResult<()> {
    let data = read_all(item)?;
    fs::write(path, data)?;
    if let Err(e) = item.close() {
        tracing::warn!(index, "close spilled item: {e}");
    }
    tracing::debug!(index, path = %path.display(), "spilled queue item");
    Ok(())
}

/// Read a spill file into memory and delete it.
fn load_spill_file(path: &Path) -> io::Result<MemorySource> {
    let mut file = fs::File::open(path)?;
    let source = MemorySource::from_reader(&mut file)?;
    drop(file);
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), "remove loaded spill file: {e}");
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn make_queue(dir: &TempDir, persist: bool, radius: usize, overcache: usize) -> RollingQueue {
        RollingQueue::new(QueueConfig {
            persist_to_disk: persist,
            window_radius: radius,
            overcache_enabled: overcache > 0,
            overcache_size: overcache,
            load_timeout: Duration::from_secs(1),
            spill_dir: dir.path().to_path_buf(),
            ..QueueConfig::default()
        })
    }

    fn append_bytes(q: &mut RollingQueue, count: u8) {
        for i in 0..count {
            q.append(Box::new(MemorySource::new(vec![i]))).unwrap();
        }
    }

    fn contents(src: &mut dyn ByteSource) -> Vec<u8> {
        read_all(src).unwrap()
    }

    fn spill_files(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("persisted"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn full_walk_forward_then_back_with_persistence() {
        let dir = TempDir::new().unwrap();
        let mut q = make_queue(&dir, true, 2, 2);
        append_bytes(&mut q, 10);

        let mut count = 0u8;
        while q.has_next() {
            let item = q.next().unwrap();
            assert_eq!(contents(item), vec![count]);
            count += 1;
        }
        assert_eq!(count, 10);
        assert_eq!(contents(q.now().unwrap()), vec![9]);

        let mut back = 0u8;
        while q.has_previous() {
            let item = q.previous().unwrap();
            assert_eq!(contents(item), vec![8 - back]);
            back += 1;
        }
        assert_eq!(back, 9);
        assert_eq!(q.index(), Some(0));
        assert!(!q.has_previous());

        q.close().unwrap();
        assert!(spill_files(&dir).is_empty());
    }

    #[test]
    fn without_persistence_history_is_bounded_by_window() {
        let dir = TempDir::new().unwrap();
        let mut q = make_queue(&dir, false, 2, 2);
        append_bytes(&mut q, 10);

        while q.has_next() {
            q.next().unwrap();
        }
        assert_eq!(q.minimum_index(), 7);

        let mut back = 0u8;
        while q.has_previous() {
            let item = q.previous().unwrap();
            assert_eq!(contents(item), vec![8 - back]);
            back += 1;
        }
        assert_eq!(back, 2);
        assert!(matches!(q.previous(), Err(QueueError::NoPreviousItem)));

        q.close().unwrap();
        assert!(spill_files(&dir).is_empty());
    }

    #[test]
    fn forward_again_after_back_keeps_minimum() {
        let dir = TempDir::new().unwrap();
        let mut q = make_queue(&dir, false, 2, 2);
        append_bytes(&mut q, 10);
        while q.has_next() {
            q.next().unwrap();
        }
        q.previous().unwrap();
        q.previous().unwrap();
        assert_eq!(contents(q.next().unwrap()), vec![8]);
        assert_eq!(q.minimum_index(), 7);
        assert!(q.has_previous());
    }

    #[test]
    fn append_prefers_window_then_overcache_then_disk() {
        let dir = TempDir::new().unwrap();
        let mut q = make_queue(&dir, false, 1, 2);
        append_bytes(&mut q, 4);

        // index 0 is in the window, 1 and 2 fill the overcache, 3 spills.
        assert!(!q.spill_path(1).exists());
        assert!(!q.spill_path(2).exists());
        assert!(q.spill_path(3).exists());
        assert_eq!(spill_files(&dir), vec!["persisted3.file".to_string()]);

        for expected in 0..4u8 {
            assert_eq!(contents(q.next().unwrap()), vec![expected]);
        }
        q.close().unwrap();
        assert!(spill_files(&dir).is_empty());
    }

    #[test]
    fn boundaries_fail_safely() {
        let dir = TempDir::new().unwrap();
        let mut q = make_queue(&dir, true, 1, 0);
        assert!(matches!(q.now(), Err(QueueError::NoCurrentItem)));
        assert!(matches!(q.next(), Err(QueueError::NoNextItem)));
        assert!(matches!(q.previous(), Err(QueueError::NoPreviousItem)));
        assert_eq!(q.index(), None);

        append_bytes(&mut q, 1);
        assert_eq!(contents(q.next().unwrap()), vec![0]);
        assert!(matches!(q.next(), Err(QueueError::NoNextItem)));
        assert!(matches!(q.previous(), Err(QueueError::NoPreviousItem)));
    }

    #[test]
    fn failed_load_is_sticky() {
        let dir = TempDir::new().unwrap();
        let mut q = make_queue(&dir, true, 1, 0);
        append_bytes(&mut q, 4);
        while q.has_next() {
            q.next().unwrap();
        }
        // History 0 and 1 live on disk; losing them breaks the next reload.
        fs::remove_file(q.spill_path(0)).unwrap();
        fs::remove_file(q.spill_path(1)).unwrap();

        assert_eq!(contents(q.previous().unwrap()), vec![2]);
        assert!(matches!(q.previous(), Err(QueueError::LoadFailure)));
        assert!(matches!(q.previous(), Err(QueueError::LoadFailure)));
        assert!(matches!(q.close(), Err(QueueError::LoadFailure)));
    }

    #[test]
    fn close_removes_future_spill_files() {
        let dir = TempDir::new().unwrap();
        let mut q = make_queue(&dir, true, 1, 0);
        append_bytes(&mut q, 6);
        q.next().unwrap();
        q.next().unwrap();
        q.next().unwrap();
        assert!(!spill_files(&dir).is_empty());

        q.close().unwrap();
        assert!(spill_files(&dir).is_empty());
        q.close().unwrap();
    }

    #[test]
    fn late_load_populates_current_after_timeout() {
        let dir = TempDir::new().unwrap();
        let mut q = RollingQueue::new(QueueConfig {
            window_radius: 1,
            load_timeout: Duration::from_millis(20),
            spill_dir: dir.path().to_path_buf(),
            ..QueueConfig::default()
        });
        append_bytes(&mut q, 1);
        q.next().unwrap();

        // Simulate a slow reload of the current slot.
        let slot = q.slot(0);
        q.window[slot] = None;
        let (tx, rx) = crossbeam_channel::bounded(1);
        q.load = LoadState::InFlight { index: 0, rx };

        assert!(matches!(q.now(), Err(QueueError::LoadTimeout)));
        tx.send(Ok(MemorySource::new(vec![42]))).unwrap();
        assert_eq!(contents(q.now().unwrap()), vec![42]);
    }

    #[test]
    fn append_copy_and_append_file() {
        let dir = TempDir::new().unwrap();
        let mut q = make_queue(&dir, true, 2, 0);
        let mut upload: &[u8] = b"upload";
        assert_eq!(q.append_copy(&mut upload).unwrap(), 0);

        let path = dir.path().join("track.bin");
        fs::write(&path, b"from disk").unwrap();
        assert_eq!(q.append_file(&path).unwrap(), 1);
        assert_eq!(q.len(), 2);

        assert_eq!(contents(q.next().unwrap()), b"upload".to_vec());
        assert_eq!(contents(q.next().unwrap()), b"from disk".to_vec());
        q.close().unwrap();
    }

    #[test]
    fn window_radius_is_forced_to_one() {
        let dir = TempDir::new().unwrap();
        let q = make_queue(&dir, true, 0, 0);
        assert_eq!(q.config.window_radius, 1);
        assert_eq!(q.window.len(), 3);
    }

    fn queue_in(spill_dir: &Path, radius: usize, overcache: usize) -> RollingQueue {
        RollingQueue::new(QueueConfig {
            persist_to_disk: true,
            window_radius: radius,
            overcache_enabled: overcache > 0,
            overcache_size: overcache,
            load_timeout: Duration::from_secs(1),
            spill_dir: spill_dir.to_path_buf(),
            ..QueueConfig::default()
        })
    }

    /// Wait for the background reload of `index` to consume its spill file.
    fn wait_until_loaded(q: &RollingQueue, index: u64) {
        for _ in 0..200 {
            if !q.spill_path(index).exists() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("spill file {index} was never loaded");
    }

    #[test]
    fn failed_spill_on_next_keeps_item_and_cursor() {
        let dir = TempDir::new().unwrap();
        let spill = dir.path().join("spill");
        fs::create_dir(&spill).unwrap();
        let mut q = queue_in(&spill, 1, 0);
        append_bytes(&mut q, 3);
        q.next().unwrap();
        q.next().unwrap();
        wait_until_loaded(&q, 2);

        fs::remove_dir_all(&spill).unwrap();
        assert!(matches!(q.next(), Err(QueueError::Storage(_))));
        assert_eq!(q.index(), Some(1));
        assert_eq!(contents(q.now().unwrap()), vec![1]);

        fs::create_dir(&spill).unwrap();
        assert_eq!(contents(q.next().unwrap()), vec![2]);
        assert!(q.spill_path(0).exists());

        assert_eq!(contents(q.previous().unwrap()), vec![1]);
        assert_eq!(contents(q.previous().unwrap()), vec![0]);
        assert_eq!(contents(q.next().unwrap()), vec![1]);
        q.close().unwrap();
        assert_eq!(fs::read_dir(&spill).unwrap().count(), 0);
    }

    #[test]
    fn failed_spill_on_previous_keeps_item_and_cursor() {
        let dir = TempDir::new().unwrap();
        let spill = dir.path().join("spill");
        fs::create_dir(&spill).unwrap();
        let mut q = queue_in(&spill, 1, 0);
        append_bytes(&mut q, 3);
        q.next().unwrap();
        q.next().unwrap();
        wait_until_loaded(&q, 2);

        fs::remove_dir_all(&spill).unwrap();
        assert!(matches!(q.previous(), Err(QueueError::Storage(_))));
        assert_eq!(q.index(), Some(1));

        fs::create_dir(&spill).unwrap();
        assert_eq!(contents(q.previous().unwrap()), vec![0]);
        assert!(q.spill_path(2).exists());
        assert_eq!(contents(q.next().unwrap()), vec![1]);
        assert_eq!(contents(q.next().unwrap()), vec![2]);
        q.close().unwrap();
    }

    #[test]
    fn failed_spill_on_append_does_not_claim_an_index() {
        let dir = TempDir::new().unwrap();
        let spill = dir.path().join("spill");
        fs::create_dir(&spill).unwrap();
        let mut q = queue_in(&spill, 1, 0);
        append_bytes(&mut q, 1);

        fs::remove_dir_all(&spill).unwrap();
        let err = q.append(Box::new(MemorySource::new(vec![1])));
        assert!(matches!(err, Err(QueueError::Storage(_))));
        assert_eq!(q.len(), 1);

        fs::create_dir(&spill).unwrap();
        assert_eq!(q.append(Box::new(MemorySource::new(vec![1]))).unwrap(), 1);
        assert_eq!(contents(q.next().unwrap()), vec![0]);
        assert_eq!(contents(q.next().unwrap()), vec![1]);
        q.close().unwrap();
    }

    /// Byte source whose `close` always fails.
    struct StuckSource(io::Cursor<Vec<u8>>);

    impl Read for StuckSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl io::Seek for StuckSource {
        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            self.0.seek(pos)
        }
    }

    impl ByteSource for StuckSource {
        fn close(&mut self) -> io::Result<()> {
            Err(io::Error::other("stuck"))
        }
    }

    #[test]
    fn close_reports_item_error_and_still_cleans_up() {
        let dir = TempDir::new().unwrap();
        let mut q = make_queue(&dir, true, 1, 0);
        q.append(Box::new(StuckSource(io::Cursor::new(vec![0]))))
            .unwrap();
        append_bytes(&mut q, 4);
        q.next().unwrap();
        assert!(!spill_files(&dir).is_empty());

        assert!(matches!(q.close(), Err(QueueError::Storage(_))));
        assert!(spill_files(&dir).is_empty());
        q.close().unwrap();
    }
}
