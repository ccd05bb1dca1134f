//! Result persistence: batched CSV, binary score stream and the
//! statistics table.
//!
//! Every writer targets `<file>.partial` and renames onto the final name in
//! `finish`. A run that aborts midway leaves only `.partial` files behind.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CouplingError, ErrorCode};
use crate::models::score::{DependencyScore, ScoreLayout};
use crate::models::statistics::ProjectStatistics;

/// Default number of records held in memory per CSV batch.
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

/// Column order of the full score tables.
pub const SCORE_COLUMNS: [&str; 16] = [
    "class_a",
    "class_b",
    "hybrid_score",
    "structural_score",
    "logical_score",
    "is_strong_coupling",
    "cbo_a",
    "cbo_b",
    "rfc_a",
    "rfc_b",
    "dit_a",
    "dit_b",
    "has_direct_dependency",
    "support",
    "confidence",
    "commits",
];

/// Header of a score table in the given layout.
pub fn score_columns(layout: ScoreLayout) -> Vec<&'static str> {
    match layout {
        ScoreLayout::Full => SCORE_COLUMNS.to_vec(),
        ScoreLayout::Strong => SCORE_COLUMNS
            .into_iter()
            .filter(|c| *c != "is_strong_coupling")
            .collect(),
    }
}

pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn prepare(path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let partial = partial_path(path);
    if partial.exists() {
        fs::remove_file(&partial)?;
    }
    Ok(partial)
}

fn commit(partial: &Path, path: &Path) -> Result<()> {
    fs::rename(partial, path).with_context(|| {
        format!(
            "Failed to move {} to {}",
            partial.display(),
            path.display()
        )
    })
}

fn csv_failure(path: &Path, e: csv::Error) -> anyhow::Error {
    CouplingError::new(
        ErrorCode::IoError,
        format!("Failed to write {}: {e}", path.display()),
    )
    .into()
}

// ---------------------------------------------------------------------------
// Batched CSV
// ---------------------------------------------------------------------------

/// Writes score records to CSV holding at most one batch in memory.
///
/// The first batch creates the file with the header; later batches reopen it
/// in append mode without one. A sequence that never fills a batch is written
/// in one shot at `finish`, with the same bytes.
#[derive(Debug)]
pub struct BatchedCsvWriter {
    path: PathBuf,
    partial: PathBuf,
    layout: ScoreLayout,
    batch_size: usize,
    buffer: Vec<DependencyScore>,
    batches_written: usize,
    records_written: u64,
}

impl BatchedCsvWriter {
    pub fn create(path: &Path, batch_size: usize) -> Result<Self> {
        Self::with_layout(path, batch_size, ScoreLayout::Full)
    }

    pub fn with_layout(path: &Path, batch_size: usize, layout: ScoreLayout) -> Result<Self> {
        let batch_size = batch_size.max(1);
        let partial = prepare(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            partial,
            layout,
            batch_size,
            buffer: Vec::with_capacity(batch_size.min(DEFAULT_BATCH_SIZE)),
            batches_written: 0,
            records_written: 0,
        })
    }

    pub fn push(&mut self, score: DependencyScore) -> Result<()> {
        self.buffer.push(score);
        if self.buffer.len() >= self.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn flush_batch(&mut self) -> Result<()> {
        let first = self.batches_written == 0;
        let file = if first {
            File::create(&self.partial)
        } else {
            OpenOptions::new().append(true).open(&self.partial)
        }
        .with_context(|| format!("Failed to open {}", self.partial.display()))?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        if first {
            wtr.write_record(score_columns(self.layout))
                .map_err(|e| csv_failure(&self.partial, e))?;
        }
        for score in &self.buffer {
            wtr.serialize(score.to_row(self.layout))
                .map_err(|e| csv_failure(&self.partial, e))?;
        }
        wtr.flush()?;

        self.records_written += self.buffer.len() as u64;
        self.batches_written += 1;
        debug!(
            path = %self.path.display(),
            batch = self.batches_written,
            records = self.buffer.len(),
            "csv batch written"
        );
        self.buffer.clear();
        Ok(())
    }

    /// Write what is left and move the file into place. Returns the number of
    /// records written.
    pub fn finish(mut self) -> Result<u64> {
        if !self.buffer.is_empty() || self.batches_written == 0 {
            self.flush_batch()?;
        }
        commit(&self.partial, &self.path)?;
        Ok(self.records_written)
    }

    pub fn batches_written(&self) -> usize {
        self.batches_written
    }
}

/// Export a whole score sequence to CSV in batches of `batch_size`.
pub fn export_scores<I>(scores: I, path: &Path, batch_size: usize) -> Result<u64>
where
    I: IntoIterator<Item = DependencyScore>,
{
    export_with_layout(scores, path, batch_size, ScoreLayout::Full)
}

/// Export strong couplings, without the `is_strong_coupling` column.
pub fn export_strong_couplings<I>(scores: I, path: &Path, batch_size: usize) -> Result<u64>
where
    I: IntoIterator<Item = DependencyScore>,
{
    export_with_layout(scores, path, batch_size, ScoreLayout::Strong)
}

fn export_with_layout<I>(
    scores: I,
    path: &Path,
    batch_size: usize,
    layout: ScoreLayout,
) -> Result<u64>
where
    I: IntoIterator<Item = DependencyScore>,
{
    let mut writer = BatchedCsvWriter::with_layout(path, batch_size, layout)?;
    for score in scores {
        writer.push(score)?;
    }
    writer.finish()
}

// ---------------------------------------------------------------------------
// Strong couplings
// ---------------------------------------------------------------------------

/// Collects strongly coupled pairs during a streaming pass.
#[derive(Debug, Default)]
pub struct StrongCouplings {
    scores: Vec<DependencyScore>,
}

impl StrongCouplings {
    pub fn offer(&mut self, score: &DependencyScore) {
        if score.is_strong_coupling {
            self.scores.push(score.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Sorted by descending hybrid score; ties keep enumeration order.
    pub fn into_sorted(self, top_n: Option<usize>) -> Vec<DependencyScore> {
        let mut scores = self.scores;
        sort_by_hybrid_desc(&mut scores);
        if let Some(n) = top_n {
            scores.truncate(n);
        }
        scores
    }
}

/// Upper bound on the buffer reserved up front by [`TopScores`].
const TOP_CAPACITY: usize = 1024;

/// The `limit` highest hybrid scores of a stream, held in a buffer of at
/// most twice that size. Equal scores keep stream order.
#[derive(Debug)]
pub struct TopScores {
    limit: usize,
    keep: usize,
    best: Vec<DependencyScore>,
}

impl TopScores {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            keep: limit.saturating_mul(2).max(1),
            best: Vec::with_capacity(limit.min(TOP_CAPACITY)),
        }
    }

    pub fn offer(&mut self, score: DependencyScore) {
        self.best.push(score);
        if self.best.len() >= self.keep {
            sort_by_hybrid_desc(&mut self.best);
            self.best.truncate(self.limit);
        }
    }

    pub fn into_sorted(self) -> Vec<DependencyScore> {
        let mut best = self.best;
        sort_by_hybrid_desc(&mut best);
        best.truncate(self.limit);
        best
    }
}

pub fn sort_by_hybrid_desc(scores: &mut [DependencyScore]) {
    scores.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

// ---------------------------------------------------------------------------
// Binary score stream
// ---------------------------------------------------------------------------

const STREAM_MAGIC: [u8; 4] = *b"HCSS";
const STREAM_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StreamHeader {
    magic: [u8; 4],
    version: u32,
}

/// Appends bincode-encoded scores to a file, one record at a time.
pub struct ScoreStreamWriter {
    path: PathBuf,
    partial: PathBuf,
    out: BufWriter<File>,
    records: u64,
}

impl ScoreStreamWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let partial = prepare(path)?;
        let file = File::create(&partial)
            .with_context(|| format!("Failed to create {}", partial.display()))?;
        let mut out = BufWriter::new(file);
        let header = StreamHeader {
            magic: STREAM_MAGIC,
            version: STREAM_VERSION,
        };
        bincode::serialize_into(&mut out, &header).map_err(|e| stream_error(&partial, &e))?;
        Ok(Self {
            path: path.to_path_buf(),
            partial,
            out,
            records: 0,
        })
    }

    pub fn write(&mut self, score: &DependencyScore) -> Result<()> {
        bincode::serialize_into(&mut self.out, score)
            .map_err(|e| stream_error(&self.partial, &e))?;
        self.records += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        self.out.flush()?;
        drop(self.out);
        commit(&self.partial, &self.path)?;
        debug!(path = %self.path.display(), records = self.records, "score stream written");
        Ok(self.records)
    }
}

fn stream_error(path: &Path, e: &bincode::Error) -> anyhow::Error {
    CouplingError::new(
        ErrorCode::SerializationError,
        format!("{}: {e}", path.display()),
    )
    .into()
}

/// Streams scores back from a file written by [`ScoreStreamWriter`].
pub struct ScoreReader {
    path: PathBuf,
    input: BufReader<File>,
    failed: bool,
}

impl ScoreReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow::Error::from(CouplingError::file_not_found(&path.display().to_string()))
            } else {
                e.into()
            }
        })?;
        let mut input = BufReader::new(file);
        let header: StreamHeader =
            bincode::deserialize_from(&mut input).map_err(|e| stream_error(path, &e))?;
        if header.magic != STREAM_MAGIC || header.version != STREAM_VERSION {
            bail!(CouplingError::new(
                ErrorCode::SerializationError,
                format!("{}: not a score stream (version {})", path.display(), header.version),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            input,
            failed: false,
        })
    }
}

impl Iterator for ScoreReader {
    type Item = Result<DependencyScore>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.input.fill_buf() {
            Ok([]) => return None,
            Ok(_) => {}
            Err(e) => {
                self.failed = true;
                return Some(Err(e.into()));
            }
        }
        match bincode::deserialize_from(&mut self.input) {
            Ok(score) => Some(Ok(score)),
            Err(e) => {
                self.failed = true;
                Some(Err(stream_error(&self.path, &e)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics table
// ---------------------------------------------------------------------------

pub fn write_statistics(path: &Path, rows: &[ProjectStatistics]) -> Result<()> {
    let partial = prepare(path)?;
    let mut wtr = csv::Writer::from_path(&partial).map_err(|e| csv_failure(&partial, e))?;
    for row in rows {
        wtr.serialize(row).map_err(|e| csv_failure(&partial, e))?;
    }
    wtr.flush()?;
    drop(wtr);
    commit(&partial, path)
}

pub fn read_statistics(path: &Path) -> Result<Vec<ProjectStatistics>> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| {
        CouplingError::new(
            ErrorCode::MalformedInput,
            format!("{}: {e}", path.display()),
        )
    })?;
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        let row: ProjectStatistics = row.map_err(|e| {
            CouplingError::new(
                ErrorCode::MalformedInput,
                format!("{}: {e}", path.display()),
            )
        })?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::score::{LogicalMetrics, PairMetrics, StructuralMetrics};

    fn score(i: usize, hybrid: f64) -> DependencyScore {
        DependencyScore {
            class_a: format!("A{i}"),
            class_b: format!("B{i}"),
            structural_score: hybrid,
            logical_score: 0.0,
            hybrid_score: hybrid,
            is_strong_coupling: hybrid >= 0.7,
            metrics: PairMetrics {
                structural: (i % 2 == 0).then_some(StructuralMetrics {
                    cbo_a: i as f64,
                    cbo_b: 1.0,
                    rfc_a: 2.0,
                    rfc_b: 3.5,
                    dit_a: 0.0,
                    dit_b: 1.0,
                    has_direct_dependency: i % 3 == 0,
                }),
                logical: LogicalMetrics {
                    support: 0.125,
                    confidence: 0.25,
                    commits: i as u64,
                },
            },
        }
    }

    fn scores(n: usize) -> Vec<DependencyScore> {
        (0..n).map(|i| score(i, (i % 10) as f64 / 10.0)).collect()
    }

    #[test]
    fn batched_output_matches_single_shot() {
        let dir = tempfile::TempDir::new().unwrap();
        let batched = dir.path().join("batched.csv");
        let single = dir.path().join("single.csv");

        let mut writer = BatchedCsvWriter::create(&batched, 7).unwrap();
        for s in scores(30) {
            writer.push(s).unwrap();
        }
        assert_eq!(writer.batches_written(), 4);
        assert_eq!(writer.finish().unwrap(), 30);
        assert_eq!(export_scores(scores(30), &single, 1_000).unwrap(), 30);

        let a = fs::read_to_string(&batched).unwrap();
        let b = fs::read_to_string(&single).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.lines().count(), 31);
        assert_eq!(a.matches("class_a,class_b").count(), 1);
        assert!(!partial_path(&batched).exists());
    }

    #[test]
    fn empty_sequence_writes_header_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out").join("empty.csv");
        assert_eq!(export_scores(Vec::new(), &path, 10).unwrap(), 0);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), SCORE_COLUMNS.join(","));
    }

    #[test]
    fn missing_structural_metrics_leave_empty_cells() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("s.csv");
        export_scores(vec![score(1, 0.5)], &path, 10).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert_eq!(row, "A1,B1,0.5,0.5,0.0,false,,,,,,,,0.125,0.25,1");
    }

    #[test]
    fn strong_table_omits_classification_column() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("strong.csv");
        export_strong_couplings(vec![score(2, 0.8)], &path, 10).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        let header = lines.next().unwrap();
        assert!(!header.contains("is_strong_coupling"));
        assert_eq!(header.split(',').count(), 15);
        let row = lines.next().unwrap();
        assert_eq!(row.split(',').count(), 15);
        assert!(!row.contains("true"));
        assert!(row.starts_with("A2,B2,0.8,0.8,0.0,2.0,"));
    }

    #[test]
    fn unfinished_writer_leaves_only_partial() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scores.csv");
        let mut writer = BatchedCsvWriter::create(&path, 2).unwrap();
        for s in scores(5) {
            writer.push(s).unwrap();
        }
        drop(writer);
        assert!(!path.exists());
        assert!(partial_path(&path).exists());
    }

    #[test]
    fn strong_couplings_sorted_descending_with_stable_ties() {
        let mut strong = StrongCouplings::default();
        for (i, h) in [0.75, 0.9, 0.2, 0.75, 1.0].iter().enumerate() {
            strong.offer(&score(i, *h));
        }
        assert_eq!(strong.len(), 4);
        let sorted = strong.into_sorted(None);
        let names: Vec<&str> = sorted.iter().map(|s| s.class_a.as_str()).collect();
        assert_eq!(names, vec!["A4", "A1", "A0", "A3"]);
    }

    #[test]
    fn strong_couplings_top_n() {
        let mut strong = StrongCouplings::default();
        for i in 0..5 {
            strong.offer(&score(i, 0.8 + i as f64 / 100.0));
        }
        assert_eq!(strong.into_sorted(Some(2)).len(), 2);
    }

    #[test]
    fn top_scores_bounded_and_stable() {
        let mut top = TopScores::new(2);
        for (i, h) in [0.2, 0.9, 0.5, 0.9, 0.1, 0.7].into_iter().enumerate() {
            top.offer(score(i, h));
        }
        let best = top.into_sorted();
        assert_eq!(best.len(), 2);
        assert_eq!((best[0].class_a.as_str(), best[1].class_a.as_str()), ("A1", "A3"));

        let mut zero = TopScores::new(0);
        zero.offer(score(0, 0.5));
        assert!(zero.into_sorted().is_empty());

        let mut unbounded = TopScores::new(usize::MAX);
        for i in 0..5 {
            unbounded.offer(score(i, i as f64 / 10.0));
        }
        let all = unbounded.into_sorted();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].class_a, "A4");
    }

    #[test]
    fn score_stream_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("all_scores.bin");
        let original = scores(25);

        let mut writer = ScoreStreamWriter::create(&path).unwrap();
        for s in &original {
            writer.write(s).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 25);

        let restored: Vec<DependencyScore> = ScoreReader::open(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("all_scores.bin");
        let mut writer = ScoreStreamWriter::create(&path).unwrap();
        for s in &scores(3) {
            writer.write(s).unwrap();
        }
        writer.finish().unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        let results: Vec<Result<DependencyScore>> = ScoreReader::open(&path).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        let err = results[2].as_ref().unwrap_err();
        assert_eq!(crate::error::error_code(err), Some(ErrorCode::SerializationError));
    }

    #[test]
    fn non_stream_file_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bogus.bin");
        fs::write(&path, b"class_a,class_b\nA,B\n").unwrap();
        assert!(ScoreReader::open(&path).is_err());
    }
}
