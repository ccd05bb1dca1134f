use anyhow::{Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::engine::analysis::{self, ProjectComparison, ScoreAnalysis};
use crate::engine::enumerate::{
    PairEnumerator, ParallelChunks, ProgressObserver, default_progress_interval, total_pairs,
    universe,
};
use crate::engine::export::{
    self, BatchedCsvWriter, ScoreReader, ScoreStreamWriter, StrongCouplings, TopScores,
};
use crate::engine::hybrid::PairScorer;
use crate::engine::index::CouplingIndices;
use crate::engine::loader::Tables;
use crate::engine::policy::ScoringConfig;
use crate::engine::stats::StatsAccumulator;
use crate::error::{CouplingError, ErrorCode};
use crate::models::metrics::ClassMetrics;
use crate::models::score::DependencyScore;
use crate::models::statistics::ProjectStatistics;

pub const ALL_SCORES_FILE: &str = "all_scores.bin";
pub const RELEVANT_SCORES_FILE: &str = "relevant_scores.csv";
pub const STRONG_COUPLINGS_FILE: &str = "strong_couplings.csv";
pub const STATISTICS_FILE: &str = "statistics.csv";
pub const CONSOLIDATED_FILE: &str = "consolidated_statistics.csv";

// ---------------------------------------------------------------------------
// Inputs, outputs and run options
// ---------------------------------------------------------------------------

/// Input tables of one project.
#[derive(Debug, Clone)]
pub struct ProjectInputs {
    pub metrics: PathBuf,
    pub dependencies: Option<PathBuf>,
    pub co_changes: Option<PathBuf>,
}

impl ProjectInputs {
    pub fn load(&self) -> Result<Tables> {
        Tables::load(
            &self.metrics,
            self.dependencies.as_deref(),
            self.co_changes.as_deref(),
        )
    }
}

/// Output files of one project, all inside a single directory.
#[derive(Debug, Clone)]
pub struct ProjectOutputs {
    dir: PathBuf,
}

impl ProjectOutputs {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn all_scores(&self) -> PathBuf {
        self.dir.join(ALL_SCORES_FILE)
    }

    pub fn relevant_scores(&self) -> PathBuf {
        self.dir.join(RELEVANT_SCORES_FILE)
    }

    pub fn strong_couplings(&self) -> PathBuf {
        self.dir.join(STRONG_COUPLINGS_FILE)
    }

    pub fn statistics(&self) -> PathBuf {
        self.dir.join(STATISTICS_FILE)
    }

    /// A previous run finished: `statistics.csv` is written last.
    pub fn is_complete(&self) -> bool {
        self.statistics().exists() && self.all_scores().exists()
    }
}

/// Conventional directory layout used by batch runs.
///
/// ```text
/// <data_root>/metrics/<project>_metrics.csv
/// <data_root>/dependencies/<project>_dependencies.csv
/// <data_root>/co_changes/<project>_co_changes.csv
/// <output_dir>/<project>/...
/// ```
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    data_root: Utf8PathBuf,
    output_dir: Utf8PathBuf,
}

impl ProjectLayout {
    pub fn new(data_root: &Path, output_dir: &Path) -> Result<Self> {
        Ok(Self {
            data_root: utf8(data_root)?,
            output_dir: utf8(output_dir)?,
        })
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    pub fn inputs(&self, project: &str) -> ProjectInputs {
        let table = |folder: &str, suffix: &str| -> Utf8PathBuf {
            self.data_root
                .join(folder)
                .join(format!("{project}_{suffix}.csv"))
        };
        ProjectInputs {
            metrics: table("metrics", "metrics").into_std_path_buf(),
            dependencies: Some(table("dependencies", "dependencies").into_std_path_buf()),
            co_changes: Some(table("co_changes", "co_changes").into_std_path_buf()),
        }
    }

    pub fn outputs(&self, project: &str) -> ProjectOutputs {
        ProjectOutputs::new(self.output_dir.join(project).into_std_path_buf())
    }

    pub fn consolidated(&self) -> Utf8PathBuf {
        self.output_dir.join(CONSOLIDATED_FILE)
    }
}

fn utf8(path: &Path) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|p| {
        CouplingError::new(
            ErrorCode::InvalidRequest,
            format!("Path is not valid UTF-8: {}", p.display()),
        )
        .into()
    })
}

/// Caller-chosen parameters of a scoring run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Label written to the statistics row
    pub project: String,
    /// Pair only these classes instead of the whole metrics table
    pub classes: Option<Vec<String>>,
    pub max_classes: Option<usize>,
    /// Adaptive when `None`
    pub progress_interval: Option<u64>,
    pub batch_size: usize,
    /// Keep only the N strongest pairs in `strong_couplings.csv`
    pub top_n: Option<usize>,
    /// Recompute even if a finished run exists
    pub force: bool,
    pub parallel: bool,
    /// Report exact medians; costs 24 bytes of memory per pair
    pub track_median: bool,
}

impl RunOptions {
    pub fn from_run_config(project: impl Into<String>, run: &RunConfig) -> Self {
        Self {
            project: project.into(),
            classes: None,
            max_classes: run.max_classes,
            progress_interval: run.progress_interval,
            batch_size: run.batch_size,
            top_n: None,
            force: false,
            parallel: run.parallel,
            track_median: run.median,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of scoring one project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub project: String,
    /// Loaded from a previous run instead of recomputed
    pub skipped: bool,
    pub output_dir: String,
    /// `None` when skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevant_pairs: Option<u64>,
    pub statistics: ProjectStatistics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectFailure {
    pub project: String,
    pub code: String,
    pub message: String,
}

/// Result of a batch run over several projects.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidated: Option<String>,
    pub projects: Vec<ProjectReport>,
    pub failures: Vec<ProjectFailure>,
}

/// Summary of a loaded project, for interactive use.
#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub classes: usize,
    pub total_pairs: u64,
    pub dependency_pairs: usize,
    pub co_change_pairs: usize,
    pub has_dependencies: bool,
    pub has_co_changes: bool,
    pub structural_weight: f64,
    pub logical_weight: f64,
    pub coupling_threshold: f64,
}

// ---------------------------------------------------------------------------
// CouplingService
// ---------------------------------------------------------------------------

/// Per-record fan-out of one streaming pass.
///
/// Everything but the strong couplings and the kept median values is
/// streamed. Strong couplings are held until the pass ends so they can be
/// sorted; medians keep one `f64` per pair and component when
/// `track_median` is on.
struct ScoreSink {
    stream: ScoreStreamWriter,
    relevant: BatchedCsvWriter,
    strong: StrongCouplings,
    stats: StatsAccumulator,
}

impl ScoreSink {
    fn create(
        outputs: &ProjectOutputs,
        options: &RunOptions,
        expected_pairs: u64,
    ) -> Result<Self> {
        let capacity = usize::try_from(expected_pairs).unwrap_or(usize::MAX);
        Ok(Self {
            stream: ScoreStreamWriter::create(&outputs.all_scores())?,
            relevant: BatchedCsvWriter::create(&outputs.relevant_scores(), options.batch_size)?,
            strong: StrongCouplings::default(),
            stats: StatsAccumulator::new(options.track_median, capacity.min(1 << 24)),
        })
    }

    fn accept(&mut self, score: DependencyScore) -> Result<()> {
        self.stream.write(&score)?;
        self.stats.record(&score);
        self.strong.offer(&score);
        if score.hybrid_score > 0.0 {
            self.relevant.push(score)?;
        }
        Ok(())
    }
}

pub struct CouplingService {
    config: ScoringConfig,
}

impl CouplingService {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Load and index the tables of one project.
    pub fn open(&self, inputs: &ProjectInputs) -> Result<CouplingIndices> {
        debug!(metrics = %inputs.metrics.display(), "loading project tables");
        CouplingIndices::build(inputs.load()?)
    }

    /// Score every pair of one project and write all outputs.
    ///
    /// When the output directory already holds a finished run and
    /// `options.force` is unset, the stored statistics are returned instead.
    pub fn score_project<P: ProgressObserver>(
        &self,
        inputs: &ProjectInputs,
        outputs: &ProjectOutputs,
        options: &RunOptions,
        observer: P,
    ) -> Result<ProjectReport> {
        if !options.force && outputs.is_complete() {
            match stored_statistics(outputs) {
                Ok(statistics) => {
                    info!(project = %options.project, "already processed, skipping");
                    return Ok(ProjectReport {
                        project: options.project.clone(),
                        skipped: true,
                        output_dir: outputs.dir().display().to_string(),
                        relevant_pairs: None,
                        statistics,
                    });
                }
                Err(e) => warn!(
                    project = %options.project,
                    error = %e,
                    "stored statistics unreadable, reprocessing"
                ),
            }
        }

        let indices = self.open(inputs)?;
        self.score_indices(&indices, outputs, options, observer)
    }

    /// Score every pair over already built indices and write all outputs.
    pub fn score_indices<P: ProgressObserver>(
        &self,
        indices: &CouplingIndices,
        outputs: &ProjectOutputs,
        options: &RunOptions,
        observer: P,
    ) -> Result<ProjectReport> {
        let classes = universe(
            &indices.metrics,
            options.classes.as_deref(),
            options.max_classes,
        );
        if classes.len() < 2 {
            bail!(CouplingError::new(
                ErrorCode::InvalidRequest,
                format!(
                    "{}: at least 2 classes are needed to form a pair, got {}",
                    options.project,
                    classes.len()
                ),
            ));
        }

        let expected = total_pairs(classes.len());
        let interval = options
            .progress_interval
            .unwrap_or_else(|| default_progress_interval(classes.len()));
        info!(
            project = %options.project,
            classes = classes.len(),
            pairs = expected,
            parallel = options.parallel,
            median = options.track_median,
            "scoring started"
        );

        let scorer = PairScorer::new(indices, &self.config);
        let mut sink = ScoreSink::create(outputs, options, expected)?;

        if options.parallel {
            let chunks = ParallelChunks::new(scorer, &classes, options.batch_size, observer, interval);
            for chunk in chunks {
                for score in chunk {
                    sink.accept(score)?;
                }
            }
        } else {
            for score in PairEnumerator::with_progress(scorer, &classes, observer, interval) {
                sink.accept(score)?;
            }
        }

        let ScoreSink {
            stream,
            relevant,
            strong,
            stats,
        } = sink;
        let statistics = stats.finish(
            &options.project,
            indices.metrics.len(),
            classes.len(),
            indices.has_dependencies,
            indices.has_co_changes,
        );

        stream.finish()?;
        let relevant_pairs = relevant.finish()?;
        export::export_strong_couplings(
            strong.into_sorted(options.top_n),
            &outputs.strong_couplings(),
            options.batch_size,
        )?;
        export::write_statistics(&outputs.statistics(), std::slice::from_ref(&statistics))?;

        info!(
            project = %options.project,
            pairs = statistics.total_pairs,
            relevant = relevant_pairs,
            strong = statistics.strong_couplings,
            "scoring finished"
        );
        Ok(ProjectReport {
            project: options.project.clone(),
            skipped: false,
            output_dir: outputs.dir().display().to_string(),
            relevant_pairs: Some(relevant_pairs),
            statistics,
        })
    }

    /// Score several projects laid out under `layout`.
    ///
    /// A failing project is logged and counted; the remaining projects still
    /// run. `observer_for` builds a progress observer per project.
    pub fn score_projects<P, F>(
        &self,
        layout: &ProjectLayout,
        projects: &[String],
        template: &RunOptions,
        mut observer_for: F,
    ) -> Result<BatchReport>
    where
        P: ProgressObserver,
        F: FnMut(&str) -> P,
    {
        if projects.is_empty() {
            bail!(CouplingError::new(
                ErrorCode::InvalidRequest,
                "No projects to process",
            ));
        }

        let mut reports = Vec::with_capacity(projects.len());
        let mut failures = Vec::new();
        for project in projects {
            let options = RunOptions {
                project: project.clone(),
                ..template.clone()
            };
            let result = self.score_project(
                &layout.inputs(project),
                &layout.outputs(project),
                &options,
                observer_for(project),
            );
            match result {
                Ok(report) => reports.push(report),
                Err(e) => {
                    let (code, message) = classify(&e);
                    warn!(project = %project, code = %code, error = %message, "project failed");
                    failures.push(ProjectFailure {
                        project: project.clone(),
                        code,
                        message,
                    });
                }
            }
        }

        let consolidated = if reports.is_empty() {
            None
        } else {
            let mut rows: Vec<ProjectStatistics> =
                reports.iter().map(|r| r.statistics.clone()).collect();
            rows.sort_by(|a, b| b.strong_couplings.cmp(&a.strong_couplings));
            let path = layout.consolidated();
            export::write_statistics(path.as_std_path(), &rows)?;
            Some(path.to_string())
        };

        let skipped = reports.iter().filter(|r| r.skipped).count();
        info!(
            processed = reports.len() - skipped,
            skipped = skipped,
            failed = failures.len(),
            "batch finished"
        );
        Ok(BatchReport {
            processed: reports.len() - skipped,
            skipped,
            failed: failures.len(),
            consolidated,
            projects: reports,
            failures,
        })
    }

    /// Score one pair of classes.
    pub fn pair(
        &self,
        indices: &CouplingIndices,
        class_a: &str,
        class_b: &str,
    ) -> Result<DependencyScore> {
        if class_a.is_empty() || class_b.is_empty() {
            bail!(CouplingError::new(
                ErrorCode::InvalidRequest,
                "Both class identifiers are required",
            ));
        }
        if class_a == class_b {
            bail!(CouplingError::new(
                ErrorCode::InvalidRequest,
                format!("A pair needs two distinct classes, got {class_a} twice"),
            ));
        }
        Ok(PairScorer::new(indices, &self.config).score(class_a, class_b))
    }

    /// Metrics row of one class.
    pub fn metrics<'a>(&self, indices: &'a CouplingIndices, class: &str) -> Result<&'a ClassMetrics> {
        indices.metrics.get(class).ok_or_else(|| {
            CouplingError::new(
                ErrorCode::InvalidRequest,
                format!("Unknown class: {class}"),
            )
            .into()
        })
    }

    pub fn info(&self, indices: &CouplingIndices) -> IndexInfo {
        IndexInfo {
            classes: indices.metrics.len(),
            total_pairs: total_pairs(indices.metrics.len()),
            dependency_pairs: indices.dependencies.len(),
            co_change_pairs: indices.co_changes.len(),
            has_dependencies: indices.has_dependencies,
            has_co_changes: indices.has_co_changes,
            structural_weight: self.config.structural_weight(),
            logical_weight: self.config.logical_weight(),
            coupling_threshold: self.config.coupling_threshold(),
        }
    }
}

/// The `limit` highest hybrid scores in a saved score stream, strongest
/// first. Equal scores keep stream order.
pub fn top_scores(path: &Path, limit: usize) -> Result<Vec<DependencyScore>> {
    if limit == 0 {
        bail!(CouplingError::new(
            ErrorCode::InvalidRequest,
            "limit must be at least 1",
        ));
    }
    let mut top = TopScores::new(limit);
    for score in ScoreReader::open(path)? {
        top.offer(score?);
    }
    Ok(top.into_sorted())
}

/// Distribution report of a saved score stream with its `top` strongest
/// couplings.
pub fn analyze_scores(path: &Path, top: usize) -> Result<ScoreAnalysis> {
    debug!(path = %path.display(), top, "analyzing scores");
    analysis::analyze_file(path, top)
}

/// Rankings across the projects of a consolidated statistics table.
pub fn compare_projects(path: &Path, limit: usize) -> Result<ProjectComparison> {
    if limit == 0 {
        bail!(CouplingError::new(
            ErrorCode::InvalidRequest,
            "limit must be at least 1",
        ));
    }
    debug!(path = %path.display(), limit, "comparing projects");
    analysis::compare_file(path, limit)
}

/// The single row of a finished run's `statistics.csv`.
fn stored_statistics(outputs: &ProjectOutputs) -> Result<ProjectStatistics> {
    let path = outputs.statistics();
    export::read_statistics(&path)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            CouplingError::new(
                ErrorCode::MalformedInput,
                format!("{}: no statistics row", path.display()),
            )
            .into()
        })
}

/// Error code and message of a failure, for reports and the error envelope.
pub fn classify(e: &anyhow::Error) -> (String, String) {
    match e.downcast_ref::<CouplingError>() {
        Some(ce) => (ce.code.to_string(), ce.message.clone()),
        None => (ErrorCode::IoError.to_string(), format!("{e:#}")),
    }
}
