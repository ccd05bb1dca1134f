use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::WeightOverrides;

#[derive(Parser)]
#[command(
    name = "hybrid-coupling",
    version,
    about = "Pairwise class coupling scores from structural metrics and co-change history"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pretty-print JSON output (default: compact)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Report scoring progress on stderr
    #[arg(long, global = true)]
    pub progress: bool,
}

/// Input tables of one project.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Metrics table (class, cbo, dit, lcom, rfc)
    #[arg(short, long)]
    pub metrics: PathBuf,

    /// Dependency table (source, target); optional
    #[arg(short, long)]
    pub dependencies: Option<PathBuf>,

    /// Co-change table (file1, file2, commits); optional
    #[arg(short = 'c', long)]
    pub co_changes: Option<PathBuf>,
}

/// Overrides for the `[scoring]` config section.
#[derive(Args, Debug, Clone, Default)]
pub struct WeightArgs {
    /// Weight of the structural score
    #[arg(long)]
    pub structural_weight: Option<f64>,

    /// Weight of the logical score
    #[arg(long)]
    pub logical_weight: Option<f64>,

    /// Strong-coupling threshold
    #[arg(long)]
    pub threshold: Option<f64>,
}

impl WeightArgs {
    pub fn overrides(&self) -> WeightOverrides {
        WeightOverrides {
            structural_weight: self.structural_weight,
            logical_weight: self.logical_weight,
            coupling_threshold: self.threshold,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score every class pair of one project and write the result files
    Score {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        weights: WeightArgs,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Project name written to the statistics (default: output directory name)
        #[arg(long)]
        project: Option<String>,

        /// Only pair these classes (comma-separated)
        #[arg(long, value_delimiter = ',')]
        classes: Option<Vec<String>>,

        /// Pair at most the first N classes
        #[arg(long)]
        max_classes: Option<usize>,

        /// Report progress every N pairs
        #[arg(long)]
        progress_interval: Option<u64>,

        /// Records per CSV batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Keep only the N strongest couplings
        #[arg(long)]
        top: Option<usize>,

        /// Recompute even if the output directory holds a finished run
        #[arg(long)]
        force: bool,

        /// Score pairs on all cores
        #[arg(long)]
        parallel: bool,

        /// Leave medians empty instead of keeping every score in memory
        #[arg(long)]
        no_median: bool,
    },

    /// Score several projects from the conventional data layout
    Batch {
        #[command(flatten)]
        weights: WeightArgs,

        /// Root holding metrics/, dependencies/ and co_changes/
        #[arg(long)]
        data_root: Option<PathBuf>,

        /// Per-project output folders are created here
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Projects to process (comma-separated; default: from config)
        #[arg(long, value_delimiter = ',')]
        projects: Option<Vec<String>>,

        /// Pair at most the first N classes per project
        #[arg(long)]
        max_classes: Option<usize>,

        /// Recompute projects that already have results
        #[arg(long)]
        force: bool,

        /// Score pairs on all cores
        #[arg(long)]
        parallel: bool,

        /// Leave medians empty instead of keeping every score in memory
        #[arg(long)]
        no_median: bool,
    },

    /// Score a single class pair
    Pair {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        weights: WeightArgs,

        /// First class
        #[arg(short = 'a', long)]
        class_a: String,

        /// Second class
        #[arg(short = 'b', long)]
        class_b: String,
    },

    /// Strongest couplings from a saved all_scores.bin
    Top {
        /// Binary score file
        #[arg(short, long)]
        scores: PathBuf,

        /// Number of pairs to return
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Distribution summary of a saved all_scores.bin
    Analyze {
        /// Binary score file
        #[arg(short, long)]
        scores: PathBuf,

        /// Number of strongest pairs to list
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Rank projects from a consolidated statistics table
    Compare {
        /// Consolidated statistics CSV (default: <run.output_dir>/consolidated_statistics.csv)
        #[arg(short, long)]
        statistics: Option<PathBuf>,

        /// Projects per ranking
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Start NDJSON session mode (stdin/stdout) over one project
    Session {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        weights: WeightArgs,
    },

    /// Generate default configuration file
    Init {
        /// Output path (default: ~/.config/hybrid-coupling/config.toml)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}
