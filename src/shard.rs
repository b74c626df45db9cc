//! Shard discovery, node splitting, and sequential reading of records out of Parquet shards.
//!
//! A shard is a Parquet file where each row is one record. Every binary column (or a struct
//! column with a `bytes` child, the HuggingFace audio layout) becomes a field of the record;
//! a null cell means the field is absent for that row. An optional `__key__` string column
//! names the record, otherwise it is named after the shard file and row.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{KEY_COLUMN, RECORD_FIELDS};
use crate::error::{ConfigurationError, ShardError};

/// A single corpus entry: raw payloads keyed by field name.
///
/// Records are moved through the pipeline; decoding consumes them.
#[derive(Debug, Default, PartialEq)]
pub struct Record {
    key: String,
    fields: HashMap<String, Vec<u8>>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.fields.insert(name.into(), bytes);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Move a payload out of the record.
    pub fn take(&mut self, name: &str) -> Option<Vec<u8>> {
        self.fields.remove(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Assigns every `world_size`-th shard, starting at `rank`, to one node.
///
/// The same split is reused inside a node to hand disjoint shards to worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSplit {
    pub rank: usize,
    pub world_size: usize,
}

impl Default for NodeSplit {
    fn default() -> Self {
        Self {
            rank: 0,
            world_size: 1,
        }
    }
}

impl NodeSplit {
    pub fn new(rank: usize, world_size: usize) -> Result<Self, ConfigurationError> {
        let split = Self { rank, world_size };
        split.validate()?;
        Ok(split)
    }

    /// Read the split from the `RANK` and `WORLD_SIZE` environment variables (default 0 of 1).
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let rank = std::env::var("RANK").ok();
        let world_size = std::env::var("WORLD_SIZE").ok();
        Self::from_vars(rank.as_deref(), world_size.as_deref())
    }

    pub fn from_vars(rank: Option<&str>, world_size: Option<&str>) -> Result<Self, ConfigurationError> {
        let rank = parse_var("RANK", rank, 0)?;
        let world_size = parse_var("WORLD_SIZE", world_size, 1)?;
        Self::new(rank, world_size)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.world_size == 0 || self.rank >= self.world_size {
            return Err(ConfigurationError::InvalidNodeSplit {
                rank: self.rank,
                world_size: self.world_size,
            });
        }
        Ok(())
    }

    pub fn select<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.rank)
            .step_by(self.world_size.max(1))
            .cloned()
            .collect()
    }
}

fn parse_var(name: &'static str, value: Option<&str>, default: usize) -> Result<usize, ConfigurationError> {
    match value {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigurationError::InvalidEnv {
            name,
            value: value.to_string(),
        }),
    }
}

/// Expand `{a,b}` alternations and `{000..127}` numeric ranges. Zero padding of the range
/// bounds is kept, and ranges may count down.
pub fn expand_braces(pattern: &str) -> Result<Vec<String>, ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let Some(open) = pattern.find('{') else {
        if pattern.contains('}') {
            return Err(invalid("unmatched '}'"));
        }
        return Ok(vec![pattern.to_string()]);
    };
    if pattern[..open].contains('}') {
        return Err(invalid("unmatched '}'"));
    }

    let mut depth = 0usize;
    let mut close = None;
    for (i, c) in pattern[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close.ok_or_else(|| invalid("unmatched '{'"))?;

    let prefix = &pattern[..open];
    let body = &pattern[open + 1..close];
    let suffix = &pattern[close + 1..];

    let mut expanded = Vec::new();
    for alternative in brace_alternatives(body).map_err(invalid)? {
        expanded.extend(expand_braces(&format!("{prefix}{alternative}{suffix}"))?);
    }
    Ok(expanded)
}

fn brace_alternatives(body: &str) -> Result<Vec<String>, &'static str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(body[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    if !parts.is_empty() {
        parts.push(body[start..].to_string());
        return Ok(parts);
    }

    let (lo, hi) = body
        .split_once("..")
        .ok_or("a brace group needs a comma list or a numeric range")?;
    let (Ok(from), Ok(to)) = (lo.parse::<u64>(), hi.parse::<u64>()) else {
        return Err("range bounds must be non-negative integers");
    };
    let padded = |bound: &str| bound.len() > 1 && bound.starts_with('0');
    let width = if padded(lo) || padded(hi) { lo.len().max(hi.len()) } else { 0 };

    let values: Vec<u64> = if from <= to {
        (from..=to).collect()
    } else {
        (to..=from).rev().collect()
    };
    Ok(values.into_iter().map(|v| format!("{v:0width$}")).collect())
}

fn has_glob_meta(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Resolve a shard pattern into a sorted list of readable shard files.
///
/// Literal paths (after brace expansion) must exist; glob patterns contribute whatever files
/// they match. An empty result is an error.
pub fn discover_shards(pattern: &str) -> Result<Vec<PathBuf>, ConfigurationError> {
    let mut shards = Vec::new();
    for expanded in expand_braces(pattern)? {
        if !has_glob_meta(&expanded) {
            let path = PathBuf::from(&expanded);
            if !path.is_file() {
                return Err(ConfigurationError::MissingShard(path));
            }
            shards.push(path);
            continue;
        }

        let entries = glob::glob(&expanded).map_err(|e| ConfigurationError::InvalidPattern {
            pattern: expanded.clone(),
            reason: e.to_string(),
        })?;
        for entry in entries {
            let path = entry.map_err(|e| ConfigurationError::UnreadableShard {
                path: e.path().to_path_buf(),
                source: e.into_error(),
            })?;
            if path.is_file() {
                shards.push(path);
            }
        }
    }

    shards.sort();
    shards.dedup();
    if shards.is_empty() {
        return Err(ConfigurationError::NoShards(pattern.to_string()));
    }
    for path in &shards {
        File::open(path).map_err(|source| ConfigurationError::UnreadableShard {
            path: path.clone(),
            source,
        })?;
    }
    Ok(shards)
}

/// Discover the shards of a pattern and keep the ones assigned to this node.
pub fn resolve_node_shards(pattern: &str, split: NodeSplit) -> Result<Arc<[PathBuf]>, ConfigurationError> {
    split.validate()?;
    let all = discover_shards(pattern)?;
    let mine = split.select(&all);
    if mine.is_empty() {
        return Err(ConfigurationError::EmptyNode {
            rank: split.rank,
            world_size: split.world_size,
            shards: all.len(),
        });
    }
    tracing::info!(
        "Node {}/{} reads {} of {} shards from '{}'",
        split.rank,
        split.world_size,
        mine.len(),
        all.len(),
        pattern
    );
    Ok(mine.into())
}

enum ShardOrder {
    Sequential { next: usize },
    Resampled { rng: StdRng },
}

struct OpenShard {
    index: usize,
    path: PathBuf,
    reader: ParquetRecordBatchReader,
    pending: VecDeque<Record>,
    rows_read: usize,
}

/// Streams records out of a list of shards.
///
/// A sequential reader visits each shard once, in order. A resampled reader draws shards
/// uniformly with replacement and never ends, unless every shard turns out to hold no rows:
/// then it yields a single `ShardError::NoRows` and stops. A shard that fails to open or read
/// yields one error item and the reader moves on to the next shard.
pub struct ShardReader {
    shards: Arc<[PathBuf]>,
    order: ShardOrder,
    current: Option<OpenShard>,
    // Shards seen to hold no rows. Resampled readers stop drawing them.
    empty: Vec<bool>,
    finished: bool,
}

impl ShardReader {
    pub fn sequential(shards: Arc<[PathBuf]>) -> Self {
        Self::with_order(shards, ShardOrder::Sequential { next: 0 })
    }

    pub fn resampled(shards: Arc<[PathBuf]>, seed: u64) -> Self {
        Self::with_order(
            shards,
            ShardOrder::Resampled {
                rng: StdRng::seed_from_u64(seed),
            },
        )
    }

    fn with_order(shards: Arc<[PathBuf]>, order: ShardOrder) -> Self {
        Self {
            empty: vec![false; shards.len()],
            shards,
            order,
            current: None,
            finished: false,
        }
    }

    fn next_shard(&mut self) -> Option<usize> {
        match &mut self.order {
            ShardOrder::Sequential { next } => {
                let idx = *next;
                if idx >= self.shards.len() {
                    return None;
                }
                *next += 1;
                Some(idx)
            }
            ShardOrder::Resampled { rng } => {
                if self.empty.iter().all(|&empty| empty) {
                    return None;
                }
                loop {
                    let idx = rng.random_range(0..self.shards.len());
                    if !self.empty[idx] {
                        return Some(idx);
                    }
                }
            }
        }
    }

    fn all_empty(&self) -> bool {
        matches!(self.order, ShardOrder::Resampled { .. }) && self.empty.iter().all(|&empty| empty)
    }
}

impl Iterator for ShardReader {
    type Item = Result<Record, ShardError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(open) = &mut self.current {
                if let Some(record) = open.pending.pop_front() {
                    return Some(Ok(record));
                }
                match open.reader.next() {
                    Some(Ok(batch)) => match records_from_batch(&open.path, &batch, open.rows_read) {
                        Ok(records) => {
                            open.rows_read += batch.num_rows();
                            open.pending.extend(records);
                        }
                        Err(e) => {
                            self.current = None;
                            return Some(Err(e));
                        }
                    },
                    Some(Err(source)) => {
                        let path = open.path.clone();
                        self.current = None;
                        return Some(Err(ShardError::Arrow { path, source }));
                    }
                    None => {
                        tracing::debug!("Finished shard {} ({} rows)", open.path.display(), open.rows_read);
                        if open.rows_read == 0 {
                            self.empty[open.index] = true;
                        }
                        self.current = None;
                        if self.all_empty() {
                            self.finished = true;
                            return Some(Err(ShardError::NoRows {
                                shards: self.shards.len(),
                            }));
                        }
                    }
                }
                continue;
            }

            let index = self.next_shard()?;
            let path = self.shards[index].clone();
            match open_shard(&path) {
                Ok(reader) => {
                    self.current = Some(OpenShard {
                        index,
                        path,
                        reader,
                        pending: VecDeque::new(),
                        rows_read: 0,
                    });
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn open_shard(path: &Path) -> Result<ParquetRecordBatchReader, ShardError> {
    let file = File::open(path).map_err(|source| ShardError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|builder| builder.build())
        .map_err(|source| ShardError::Parquet {
            path: path.to_path_buf(),
            source,
        })
}

fn records_from_batch(path: &Path, batch: &RecordBatch, first_row: usize) -> Result<Vec<Record>, ShardError> {
    let shard_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut records: Vec<Record> = (0..batch.num_rows())
        .map(|row| Record::new(format!("{shard_name}#{}", first_row + row)))
        .collect();

    let schema = batch.schema();
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let name = field.name();
        if name == KEY_COLUMN {
            if let Some(keys) = string_cells(column) {
                for (record, key) in records.iter_mut().zip(keys) {
                    if let Some(key) = key {
                        record.key = key;
                    }
                }
            }
            continue;
        }

        match binary_cells(column) {
            Some(cells) => {
                for (record, cell) in records.iter_mut().zip(cells) {
                    if let Some(bytes) = cell {
                        record.insert(name.clone(), bytes);
                    }
                }
            }
            None if RECORD_FIELDS.contains_key(name.as_str()) => {
                return Err(ShardError::InvalidColumnType {
                    path: path.to_path_buf(),
                    column: name.clone(),
                });
            }
            None => {}
        }
    }
    Ok(records)
}

fn binary_cells(column: &ArrayRef) -> Option<Vec<Option<Vec<u8>>>> {
    if let Some(array) = column.as_binary_opt::<i32>() {
        return Some(array.iter().map(|v| v.map(<[u8]>::to_vec)).collect());
    }
    if let Some(array) = column.as_binary_opt::<i64>() {
        return Some(array.iter().map(|v| v.map(<[u8]>::to_vec)).collect());
    }
    // HuggingFace stores audio as struct{bytes: binary, path: string, ...}
    if let Some(array) = column.as_struct_opt() {
        let cells = binary_cells(array.column_by_name("bytes")?)?;
        return Some(
            cells
                .into_iter()
                .enumerate()
                .map(|(row, cell)| if array.is_null(row) { None } else { cell })
                .collect(),
        );
    }
    None
}

fn string_cells(column: &ArrayRef) -> Option<Vec<Option<String>>> {
    if let Some(array) = column.as_string_opt::<i32>() {
        return Some(array.iter().map(|v| v.map(str::to_string)).collect());
    }
    if let Some(array) = column.as_string_opt::<i64>() {
        return Some(array.iter().map(|v| v.map(str::to_string)).collect());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_shard;
    use arrow::array::{BinaryArray, Int64Array, StringArray, StructArray};
    use arrow::datatypes::{DataType, Field};
    use parquet::arrow::ArrowWriter;

    #[test]
    fn test_expand_ranges() {
        assert_eq!(
            expand_braces("data/shard-{000..003}.parquet").unwrap(),
            vec![
                "data/shard-000.parquet",
                "data/shard-001.parquet",
                "data/shard-002.parquet",
                "data/shard-003.parquet",
            ]
        );
        assert_eq!(expand_braces("s{3..1}").unwrap(), vec!["s3", "s2", "s1"]);
        assert_eq!(expand_braces("s{8..10}").unwrap(), vec!["s8", "s9", "s10"]);
    }

    #[test]
    fn test_expand_alternatives() {
        assert_eq!(
            expand_braces("{train,extra}/part-{0..1}.parquet").unwrap(),
            vec![
                "train/part-0.parquet",
                "train/part-1.parquet",
                "extra/part-0.parquet",
                "extra/part-1.parquet",
            ]
        );
        assert_eq!(expand_braces("a{b,{c,d}}").unwrap(), vec!["ab", "ac", "ad"]);
        assert_eq!(expand_braces("plain.parquet").unwrap(), vec!["plain.parquet"]);
    }

    #[test]
    fn test_expand_invalid() {
        assert!(matches!(
            expand_braces("shard-{000..003.parquet"),
            Err(ConfigurationError::InvalidPattern { .. })
        ));
        assert!(matches!(
            expand_braces("shard-}.parquet"),
            Err(ConfigurationError::InvalidPattern { .. })
        ));
        assert!(matches!(
            expand_braces("shard-{abc}.parquet"),
            Err(ConfigurationError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_node_split_is_disjoint() {
        let shards: Vec<usize> = (0..10).collect();
        let world = 3;
        let mut seen = Vec::new();
        for rank in 0..world {
            let split = NodeSplit::new(rank, world).unwrap();
            let mine = split.select(&shards);
            assert!(mine.iter().all(|s| s % world == rank));
            seen.extend(mine);
        }
        seen.sort();
        assert_eq!(seen, shards);
    }

    #[test]
    fn test_node_split_from_vars() {
        assert_eq!(NodeSplit::from_vars(None, None).unwrap(), NodeSplit::default());
        assert_eq!(
            NodeSplit::from_vars(Some("2"), Some(" 4 ")).unwrap(),
            NodeSplit { rank: 2, world_size: 4 }
        );
        assert!(matches!(
            NodeSplit::from_vars(Some("two"), Some("4")),
            Err(ConfigurationError::InvalidEnv { name: "RANK", .. })
        ));
        assert!(matches!(
            NodeSplit::from_vars(Some("4"), Some("4")),
            Err(ConfigurationError::InvalidNodeSplit { .. })
        ));
        assert!(NodeSplit::new(0, 0).is_err());
    }

    #[test]
    fn test_discover_shards() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            write_shard(&dir.path().join(format!("shard-{i:03}.parquet")), &[Record::new(format!("r{i}"))]);
        }
        let root = dir.path().display();

        let globbed = discover_shards(&format!("{root}/*.parquet")).unwrap();
        assert_eq!(globbed.len(), 3);
        assert!(globbed.windows(2).all(|w| w[0] < w[1]));

        let braced = discover_shards(&format!("{root}/shard-{{000..002}}.parquet")).unwrap();
        assert_eq!(braced, globbed);

        assert!(matches!(
            discover_shards(&format!("{root}/shard-{{000..003}}.parquet")),
            Err(ConfigurationError::MissingShard(_))
        ));
        assert!(matches!(
            discover_shards(&format!("{root}/*.tar")),
            Err(ConfigurationError::NoShards(_))
        ));
    }

    #[test]
    fn test_resolve_empty_node() {
        let dir = tempfile::tempdir().unwrap();
        write_shard(&dir.path().join("only.parquet"), &[Record::new("r0")]);
        let pattern = format!("{}/*.parquet", dir.path().display());

        assert_eq!(resolve_node_shards(&pattern, NodeSplit::default()).unwrap().len(), 1);
        assert!(matches!(
            resolve_node_shards(&pattern, NodeSplit::new(1, 2).unwrap()),
            Err(ConfigurationError::EmptyNode { shards: 1, .. })
        ));
    }

    #[test]
    fn test_sequential_reader() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.parquet");
        let second = dir.path().join("b.parquet");
        write_shard(
            &first,
            &[
                Record::new("a0").with_field("speech.wav", vec![1, 2]),
                Record::new("a1")
                    .with_field("speech.wav", vec![3])
                    .with_field("phoneme_input_ids.pth", vec![9; 8]),
            ],
        );
        write_shard(&second, &[Record::new("b0").with_field("speech.wav", vec![4])]);

        let reader = ShardReader::sequential(vec![first, second].into());
        let records: Vec<Record> = reader.collect::<Result<_, _>>().unwrap();

        let keys: Vec<&str> = records.iter().map(Record::key).collect();
        assert_eq!(keys, vec!["a0", "a1", "b0"]);
        assert_eq!(records[0].get("speech.wav"), Some(&[1u8, 2][..]));
        // Null cell means the field is absent.
        assert!(!records[0].contains("phoneme_input_ids.pth"));
        assert_eq!(records[1].get("phoneme_input_ids.pth").map(<[u8]>::len), Some(8));
    }

    #[test]
    fn test_resampled_reader_is_endless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.parquet");
        write_shard(&path, &[Record::new("x"), Record::new("y")]);

        let reader = ShardReader::resampled(vec![path].into(), 7);
        let records: Vec<Record> = reader.take(9).collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 9);
    }

    #[test]
    fn test_resampled_reader_skips_empty_shards() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.parquet");
        write_shard(&empty, &[]);
        let full = dir.path().join("full.parquet");
        write_shard(&full, &[Record::new("x")]);

        let reader = ShardReader::resampled(vec![empty.clone(), full].into(), 3);
        let records: Vec<Record> = reader.take(20).collect::<Result<_, _>>().unwrap();
        assert!(records.iter().all(|r| r.key() == "x"));

        // Only empty shards: one error, then the stream ends instead of spinning.
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let items: Vec<_> = ShardReader::resampled(vec![empty.clone(), empty].into(), 1).collect();
            tx.send(items).unwrap();
        });
        let items = rx.recv_timeout(std::time::Duration::from_secs(30)).unwrap();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ShardError::NoRows { shards: 2 })));
    }

    #[test]
    fn test_struct_audio_column_and_default_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hf.parquet");

        let bytes = BinaryArray::from_opt_vec(vec![Some(&[7u8, 7][..]), None]);
        let paths = StringArray::from(vec!["a.wav", "b.wav"]);
        let audio = StructArray::from(vec![
            (
                Arc::new(Field::new("bytes", DataType::Binary, true)),
                Arc::new(bytes) as ArrayRef,
            ),
            (
                Arc::new(Field::new("path", DataType::Utf8, true)),
                Arc::new(paths) as ArrayRef,
            ),
        ]);
        let batch = RecordBatch::try_from_iter(vec![("speech.wav", Arc::new(audio) as ArrayRef)]).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let records: Vec<Record> = ShardReader::sequential(vec![path].into())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records[0].key(), "hf.parquet#0");
        assert_eq!(records[0].get("speech.wav"), Some(&[7u8, 7][..]));
        assert_eq!(records[1].key(), "hf.parquet#1");
        assert!(!records[1].contains("speech.wav"));
    }

    #[test]
    fn test_non_binary_known_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.parquet");
        let ids = Int64Array::from(vec![1, 2, 3]);
        let batch =
            RecordBatch::try_from_iter(vec![("phoneme_input_ids.pth", Arc::new(ids) as ArrayRef)]).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let mut reader = ShardReader::sequential(vec![path].into());
        assert!(matches!(
            reader.next(),
            Some(Err(ShardError::InvalidColumnType { .. }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_unreadable_shard_yields_error_then_continues() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.parquet");
        std::fs::write(&broken, b"not parquet").unwrap();
        let good = dir.path().join("good.parquet");
        write_shard(&good, &[Record::new("ok")]);

        let items: Vec<_> = ShardReader::sequential(vec![broken, good].into()).collect();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Err(ShardError::Parquet { .. })));
        assert_eq!(items[1].as_ref().unwrap().key(), "ok");
    }
}
