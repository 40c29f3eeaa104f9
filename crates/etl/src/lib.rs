//! ETL data collector.
//!
//! This crate is useful for dumping unsorted data into temporary files and
//! loading its sorted representation later on.
//!
//! This has multiple uses, such as optimizing database inserts (append-only
//! loads into a Btree based database require sorted input) and memory
//! management (the buffer is spilled to disk instead of growing unbounded).

#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Arc,
};

use tempfile::{NamedTempFile, TempDir};
use tracing::info;

/// A `(key, value)` pair flowing through the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Sorting key. Loads present entries in ascending key order.
    pub key: Vec<u8>,
    /// Opaque payload.
    pub value: Vec<u8>,
}

impl Entry {
    /// Creates a new entry.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// How [`Collector::load`] writes entries into the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Keys must arrive in non-decreasing order; the sink may use a plain
    /// append. Chosen when the target table is known to be empty.
    AppendDup,
    /// Insert-or-overwrite without ordering requirements.
    Upsert,
}

/// Destination of a [`Collector::load`].
pub trait EtlSink {
    /// Error produced by sink writes. Run-file I/O errors are folded into it.
    type Error: From<io::Error>;

    /// Writes one output entry.
    fn write(&mut self, key: Vec<u8>, value: Vec<u8>, mode: LoadMode) -> Result<(), Self::Error>;
}

/// An ETL (extract, transform, load) data collector.
///
/// Data is pushed (extract) to the collector which internally flushes the
/// data in a sorted (transform) manner to files of some specified capacity.
///
/// The data can later be loaded (load) into a sink in sorted order, with an
/// optional per-entry transform that may emit several output entries.
#[derive(Debug)]
pub struct Collector {
    /// Directory for temporary file storage.
    dir: Arc<TempDir>,
    /// Collection of temporary ETL files.
    files: Vec<EtlFile>,
    /// Current buffer size in bytes.
    buffer_size_bytes: usize,
    /// Maximum buffer capacity in bytes, triggers flush when exceeded.
    flush_size_bytes: usize,
    /// In-memory buffer of entries not yet spilled.
    buffer: Vec<Entry>,
    /// Total number of entries in the collector, including all files.
    len: usize,
}

impl Collector {
    /// Create a new collector in a specific temporary directory with some
    /// flush capacity in bytes.
    pub fn new(dir: Arc<TempDir>, flush_size_bytes: usize) -> Self {
        Self {
            dir,
            files: Vec::new(),
            buffer_size_bytes: 0,
            flush_size_bytes,
            buffer: Vec::new(),
            len: 0,
        }
    }

    /// Returns the number of entries collected so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts an entry, spilling the buffer to a sorted run file once the
    /// flush capacity is exceeded.
    pub fn collect(&mut self, entry: Entry) -> io::Result<()> {
        self.buffer_size_bytes += entry.key.len() + entry.value.len();
        self.buffer.push(entry);
        self.len += 1;
        if self.buffer_size_bytes > self.flush_size_bytes {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buffer_size_bytes = 0;
        // stable sort: entries with equal keys keep their insertion order
        self.buffer.sort_by(|a, b| a.key.cmp(&b.key));
        let buf = std::mem::take(&mut self.buffer);
        self.files.push(EtlFile::new(self.dir.path(), buf)?);
        Ok(())
    }

    /// Merges all run files in ascending key order and feeds every entry
    /// through `transform`, writing each emitted entry to `sink` in the
    /// given mode.
    ///
    /// Equal keys are presented in insertion order. Consuming the collector
    /// deletes all run files once the load finishes.
    pub fn load<S, F>(
        mut self,
        sink: &mut S,
        mode: LoadMode,
        log_every_percent: usize,
        mut transform: F,
    ) -> Result<(), S::Error>
    where
        S: EtlSink,
        F: FnMut(Entry, &mut S) -> Result<Vec<Entry>, S::Error>,
    {
        // spill whatever is still buffered so the merge only sees run files
        if !self.buffer.is_empty() {
            self.flush()?;
        }

        let total = self.len;
        let log_interval = (total * log_every_percent.clamp(1, 100) / 100).max(1);

        let mut heap = BinaryHeap::new();
        for (run, file) in self.files.iter_mut().enumerate() {
            if let Some(entry) = file.read_next()? {
                heap.push(HeapEntry { entry, run });
            }
        }

        let mut processed = 0usize;
        while let Some(HeapEntry { entry, run }) = heap.pop() {
            if let Some(next) = self.files[run].read_next()? {
                heap.push(HeapEntry { entry: next, run });
            }

            for out in transform(entry, sink)? {
                sink.write(out.key, out.value, mode)?;
            }

            processed += 1;
            if processed % log_interval == 0 && total > 10 {
                info!(
                    target: "etl",
                    progress = %format!("{:.2}%", (processed as f64 / total as f64) * 100.0),
                    "Loading entries"
                );
            }
        }

        Ok(())
    }
}

/// Heap item for the k-way merge. Ordered ascending by `(key, run)` so that
/// equal keys drain in run order, which is insertion order.
struct HeapEntry {
    entry: Entry,
    run: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the maximum; reverse for an ascending merge
        (other.entry.key.as_slice(), other.run).cmp(&(self.entry.key.as_slice(), self.run))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

/// A sorted run spilled to a temporary file.
///
/// Entries are stored as `key_len (8 BE) ‖ value_len (8 BE) ‖ key ‖ value`.
/// The file is deleted when the collector is dropped.
#[derive(Debug)]
struct EtlFile {
    file: BufReader<NamedTempFile>,
    len: usize,
}

impl EtlFile {
    /// Create a new run file from a pre-sorted buffer.
    fn new(dir: &Path, buffer: Vec<Entry>) -> io::Result<Self> {
        let file = NamedTempFile::new_in(dir)?;
        let mut w = BufWriter::new(file);
        for entry in &buffer {
            w.write_all(&(entry.key.len() as u64).to_be_bytes())?;
            w.write_all(&(entry.value.len() as u64).to_be_bytes())?;
            w.write_all(&entry.key)?;
            w.write_all(&entry.value)?;
        }

        let mut file = BufReader::new(w.into_inner()?);
        file.seek(SeekFrom::Start(0))?;
        Ok(Self { file, len: buffer.len() })
    }

    /// Read the next entry in the file.
    fn read_next(&mut self) -> io::Result<Option<Entry>> {
        if self.len == 0 {
            return Ok(None)
        }

        let mut key_length = [0u8; 8];
        let mut value_length = [0u8; 8];
        self.file.read_exact(&mut key_length)?;
        self.file.read_exact(&mut value_length)?;

        let mut key = vec![0; u64::from_be_bytes(key_length) as usize];
        let mut value = vec![0; u64::from_be_bytes(value_length) as usize];
        self.file.read_exact(&mut key)?;
        self.file.read_exact(&mut value)?;

        self.len -= 1;

        Ok(Some(Entry { key, value }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct VecSink(Vec<Entry>);

    impl EtlSink for VecSink {
        type Error = io::Error;

        fn write(&mut self, key: Vec<u8>, value: Vec<u8>, _mode: LoadMode) -> io::Result<()> {
            self.0.push(Entry { key, value });
            Ok(())
        }
    }

    fn identity(entry: Entry, _sink: &mut VecSink) -> io::Result<Vec<Entry>> {
        Ok(vec![entry])
    }

    #[test]
    fn loads_sorted_across_runs() {
        let dir = Arc::new(TempDir::new().unwrap());
        // tiny flush size so nearly every insert spills a run
        let mut collector = Collector::new(dir, 32);

        let mut expected: Vec<Vec<u8>> = Vec::new();
        for i in (0..100u64).rev() {
            let key = i.to_be_bytes().to_vec();
            collector.collect(Entry::new(key.clone(), vec![0u8; 8])).unwrap();
            expected.push(key);
        }
        expected.sort();
        assert_eq!(collector.len(), 100);

        let mut sink = VecSink::default();
        collector.load(&mut sink, LoadMode::Upsert, 10, identity).unwrap();

        let keys: Vec<_> = sink.0.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let dir = Arc::new(TempDir::new().unwrap());
        let mut collector = Collector::new(dir, 16);

        for i in 0..20u8 {
            collector.collect(Entry::new(b"dup".to_vec(), vec![i])).unwrap();
        }

        let mut sink = VecSink::default();
        collector.load(&mut sink, LoadMode::Upsert, 10, identity).unwrap();

        let values: Vec<u8> = sink.0.iter().map(|e| e.value[0]).collect();
        assert_eq!(values, (0..20).collect::<Vec<u8>>());
    }

    #[test]
    fn transform_fans_out() {
        let dir = Arc::new(TempDir::new().unwrap());
        let mut collector = Collector::new(dir, 1024);
        collector.collect(Entry::new(b"a".to_vec(), vec![2u8])).unwrap();

        let mut sink = VecSink::default();
        collector
            .load(&mut sink, LoadMode::Upsert, 10, |entry, _sink| {
                let n = entry.value[0] as usize;
                Ok((0..n).map(|i| Entry::new(entry.key.clone(), vec![i as u8])).collect())
            })
            .unwrap();

        assert_eq!(sink.0.len(), 2);
    }

    #[test]
    fn run_files_are_deleted_after_load() {
        let dir = Arc::new(TempDir::new().unwrap());
        let mut collector = Collector::new(Arc::clone(&dir), 8);
        for i in 0..50u64 {
            collector.collect(Entry::new(i.to_be_bytes().to_vec(), vec![])).unwrap();
        }
        assert!(std::fs::read_dir(dir.path()).unwrap().count() > 0);

        let mut sink = VecSink::default();
        collector.load(&mut sink, LoadMode::Upsert, 10, identity).unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
