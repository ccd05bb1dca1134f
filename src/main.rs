use anyhow::Result;
use clap::Parser;
use std::io::{self, Write};
use std::path::Path;

use hybrid_coupling::cli::{Cli, Commands, InputArgs};
use hybrid_coupling::config::ConfigService;
use hybrid_coupling::engine::enumerate::{LogProgress, Progress, ProgressObserver};
use hybrid_coupling::service::{
    CONSOLIDATED_FILE, CouplingService, ProjectInputs, ProjectLayout, ProjectOutputs, RunOptions,
    analyze_scores, classify, compare_projects, top_scores,
};
use hybrid_coupling::session;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        println!("{}", error_line(&e));
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn error_line(e: &anyhow::Error) -> String {
    let (code, message) = classify(e);
    serde_json::json!({ "error": { "code": code, "message": message } }).to_string()
}

fn serialize_output(value: &impl serde::Serialize, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn print_output(value: &impl serde::Serialize, pretty: bool) -> Result<()> {
    let output = serialize_output(value, pretty)?;
    println!("{output}");
    Ok(())
}

fn project_inputs(input: InputArgs) -> ProjectInputs {
    ProjectInputs {
        metrics: input.metrics,
        dependencies: input.dependencies,
        co_changes: input.co_changes,
    }
}

fn project_name(explicit: Option<String>, out: &Path) -> String {
    explicit
        .or_else(|| {
            out.file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "project".to_string())
}

/// Progress on stderr (when `--progress` is set) and in the log file.
struct CliProgress {
    project: String,
    stderr: bool,
}

impl ProgressObserver for CliProgress {
    fn on_progress(&mut self, p: &Progress) {
        LogProgress.on_progress(p);
        if self.stderr {
            let _ = writeln!(
                io::stderr(),
                "[{}] {}/{} pairs ({:.1}%)",
                self.project,
                p.pairs_done,
                p.total_pairs,
                p.percent()
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

fn run(cli: Cli) -> Result<()> {
    let pretty = cli.pretty;
    let show_progress = cli.progress;

    let config = ConfigService::load(cli.config.as_deref())?;

    // Held until exit so buffered log lines are flushed
    let _log_guard = if cli.debug || config.debug {
        Some(hybrid_coupling::logger::init(&config)?)
    } else {
        None
    };

    match cli.command {
        Commands::Init { path } => {
            let config_path = match path {
                Some(p) => {
                    ConfigService::generate_at(&p)?;
                    p
                }
                None => ConfigService::generate_default()?,
            };
            eprintln!("Configuration file created at: {}", config_path.display());
            Ok(())
        }
        Commands::Score {
            input,
            weights,
            out,
            project,
            classes,
            max_classes,
            progress_interval,
            batch_size,
            top,
            force,
            parallel,
            no_median,
        } => {
            let service = CouplingService::new(config.scoring_config(weights.overrides())?);
            let mut options = RunOptions::from_run_config(project_name(project, &out), &config.run);
            options.classes = classes;
            options.max_classes = max_classes.or(options.max_classes);
            options.progress_interval = progress_interval.or(options.progress_interval);
            options.batch_size = batch_size.unwrap_or(options.batch_size);
            options.top_n = top;
            options.force = force;
            options.parallel = parallel || options.parallel;
            options.track_median = options.track_median && !no_median;

            let observer = CliProgress {
                project: options.project.clone(),
                stderr: show_progress,
            };
            let report = service.score_project(
                &project_inputs(input),
                &ProjectOutputs::new(out),
                &options,
                observer,
            )?;
            print_output(&report, pretty)
        }
        Commands::Batch {
            weights,
            data_root,
            output_dir,
            projects,
            max_classes,
            force,
            parallel,
            no_median,
        } => {
            let service = CouplingService::new(config.scoring_config(weights.overrides())?);
            let data_root = data_root.unwrap_or_else(|| config.run.data_root.clone());
            let output_dir = output_dir.unwrap_or_else(|| config.run.output_dir.clone());
            let projects = projects.unwrap_or_else(|| config.run.projects.clone());
            let layout = ProjectLayout::new(&data_root, &output_dir)?;

            let mut template = RunOptions::from_run_config("", &config.run);
            template.max_classes = max_classes.or(template.max_classes);
            template.force = force;
            template.parallel = parallel || template.parallel;
            template.track_median = template.track_median && !no_median;

            let report = service.score_projects(&layout, &projects, &template, |project| {
                CliProgress {
                    project: project.to_string(),
                    stderr: show_progress,
                }
            })?;
            print_output(&report, pretty)
        }
        Commands::Pair {
            input,
            weights,
            class_a,
            class_b,
        } => {
            let service = CouplingService::new(config.scoring_config(weights.overrides())?);
            let indices = service.open(&project_inputs(input))?;
            let score = service.pair(&indices, &class_a, &class_b)?;
            print_output(&score, pretty)
        }
        Commands::Top { scores, limit } => {
            let top = top_scores(&scores, limit)?;
            print_output(&top, pretty)
        }
        Commands::Analyze { scores, top } => {
            let analysis = analyze_scores(&scores, top)?;
            print_output(&analysis, pretty)
        }
        Commands::Compare { statistics, limit } => {
            let statistics =
                statistics.unwrap_or_else(|| config.run.output_dir.join(CONSOLIDATED_FILE));
            let comparison = compare_projects(&statistics, limit)?;
            print_output(&comparison, pretty)
        }
        Commands::Session { input, weights } => {
            let service = CouplingService::new(config.scoring_config(weights.overrides())?);
            let indices = service.open(&project_inputs(input))?;
            let stdin = io::stdin();
            let stdout = io::stdout();
            session::run_session(
                &service,
                &indices,
                stdin.lock(),
                io::BufWriter::new(stdout.lock()),
            )?;
            Ok(())
        }
    }
}
