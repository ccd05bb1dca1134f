//! Tabular input loading.
//!
//! Column names are mapped onto the internal schema once, here, so the
//! scoring code only ever sees `ClassMetrics`, `DependencyEdge` and
//! `CoChangeRecord`.

use anyhow::{Result, bail};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{CouplingError, ErrorCode};
use crate::models::cochange::CoChangeRecord;
use crate::models::dependency::DependencyEdge;
use crate::models::metrics::ClassMetrics;

/// A column of the internal schema and the header names accepted for it.
struct Column {
    name: &'static str,
    aliases: &'static [&'static str],
    required: bool,
}

const fn required(name: &'static str, aliases: &'static [&'static str]) -> Column {
    Column {
        name,
        aliases,
        required: true,
    }
}

const fn optional(name: &'static str, aliases: &'static [&'static str]) -> Column {
    Column {
        name,
        aliases,
        required: false,
    }
}

const METRICS_SCHEMA: &[Column] = &[
    required("class", &["class", "Classe"]),
    required("cbo", &["cbo", "CBO"]),
    required("dit", &["dit", "DIT"]),
    optional("lcom", &["lcom", "LCOM"]),
    required("rfc", &["rfc", "RFC"]),
];

const DEPENDENCY_SCHEMA: &[Column] = &[
    required("source", &["source", "Classe1"]),
    required("target", &["target", "Classe2"]),
];

const CO_CHANGE_SCHEMA: &[Column] = &[
    required("file1", &["file1", "class_a", "Classe1"]),
    required("file2", &["file2", "class_b", "Classe2"]),
    required("commits", &["commits", "FrequenciaCoMudanca"]),
    optional("support", &["support"]),
    optional("confidence", &["confidence"]),
];

/// Header positions resolved against a schema, in schema order.
struct ColumnMap {
    label: String,
    positions: Vec<Option<usize>>,
}

impl ColumnMap {
    fn resolve(label: &str, headers: &StringRecord, schema: &[Column]) -> Result<Self> {
        let mut positions = Vec::with_capacity(schema.len());
        for column in schema {
            let pos = headers
                .iter()
                .position(|h| column.aliases.iter().any(|a| *a == h));
            if pos.is_none() && column.required {
                bail!(CouplingError::new(
                    ErrorCode::MalformedInput,
                    format!(
                        "{label}: missing required column '{}' (accepted: {})",
                        column.name,
                        column.aliases.join(", ")
                    ),
                ));
            }
            positions.push(pos);
        }
        Ok(Self {
            label: label.to_string(),
            positions,
        })
    }

    fn text<'r>(&self, record: &'r StringRecord, col: usize) -> Option<&'r str> {
        self.positions[col].and_then(|i| record.get(i))
    }

    fn required_text<'r>(
        &self,
        record: &'r StringRecord,
        col: usize,
        name: &str,
    ) -> Result<&'r str> {
        match self.text(record, col) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => bail!(CouplingError::malformed(
                &self.label,
                line_of(record),
                format!("column '{name}' is empty"),
            )),
        }
    }

    fn number(&self, record: &StringRecord, col: usize, name: &str) -> Result<f64> {
        let raw = self.required_text(record, col, name)?;
        parse_f64(raw).ok_or_else(|| {
            CouplingError::malformed(
                &self.label,
                line_of(record),
                format!("column '{name}': invalid number '{raw}'"),
            )
            .into()
        })
    }

    /// Optional numeric column; a missing column or an empty cell is `None`.
    fn optional_number(&self, record: &StringRecord, col: usize, name: &str) -> Result<Option<f64>> {
        match self.text(record, col) {
            None | Some("") => Ok(None),
            Some(_) => self.number(record, col, name).map(Some),
        }
    }

    fn count(&self, record: &StringRecord, col: usize, name: &str) -> Result<u64> {
        let raw = self.required_text(record, col, name)?;
        parse_count(raw).ok_or_else(|| {
            CouplingError::malformed(
                &self.label,
                line_of(record),
                format!("column '{name}': invalid count '{raw}'"),
            )
            .into()
        })
    }
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn parse_f64(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Accepts `12` as well as integral float text such as `12.0`.
fn parse_count(raw: &str) -> Option<u64> {
    if let Ok(v) = raw.parse::<u64>() {
        return Some(v);
    }
    let v = parse_f64(raw)?;
    if v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
        Some(v as u64)
    } else {
        None
    }
}

fn csv_error(label: &str, e: csv::Error) -> anyhow::Error {
    let code = if e.is_io_error() {
        ErrorCode::IoError
    } else {
        ErrorCode::MalformedInput
    };
    CouplingError::new(code, format!("{label}: {e}")).into()
}

fn records<R: Read>(
    label: &str,
    reader: R,
    schema: &[Column],
    mut on_row: impl FnMut(&ColumnMap, &StringRecord) -> Result<()>,
) -> Result<()> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(false)
        .from_reader(reader);
    let headers = rdr.headers().map_err(|e| csv_error(label, e))?.clone();
    let map = ColumnMap::resolve(label, &headers, schema)?;
    let mut record = StringRecord::new();
    while rdr
        .read_record(&mut record)
        .map_err(|e| csv_error(label, e))?
    {
        on_row(&map, &record)?;
    }
    Ok(())
}

fn open(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CouplingError::file_not_found(&path.display().to_string()).into()
        } else {
            CouplingError::new(
                ErrorCode::IoError,
                format!("Failed to open {}: {e}", path.display()),
            )
            .into()
        }
    })
}

/// Optional tables degrade to `None` when no path is given or the file is absent.
fn open_optional(path: Option<&Path>, what: &str) -> Result<Option<std::fs::File>> {
    match path {
        Some(p) if p.exists() => open(p).map(Some),
        Some(p) => {
            debug!(path = %p.display(), "{what} table absent");
            Ok(None)
        }
        None => Ok(None),
    }
}

/// The three input tables of one scoring run.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub metrics: Vec<ClassMetrics>,
    pub dependencies: Option<Vec<DependencyEdge>>,
    pub co_changes: Option<Vec<CoChangeRecord>>,
}

impl Tables {
    /// Load all tables. The metrics table is required; the other two may be absent.
    pub fn load(
        metrics: &Path,
        dependencies: Option<&Path>,
        co_changes: Option<&Path>,
    ) -> Result<Self> {
        Ok(Self {
            metrics: load_metrics(metrics)?,
            dependencies: load_dependencies(dependencies)?,
            co_changes: load_co_changes(co_changes)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Load the metrics table from a file.
pub fn load_metrics(path: &Path) -> Result<Vec<ClassMetrics>> {
    let file = open(path)?;
    read_metrics(&path.display().to_string(), file)
}

/// Parse a metrics table. `label` is used in error messages.
pub fn read_metrics<R: Read>(label: &str, reader: R) -> Result<Vec<ClassMetrics>> {
    let mut rows = Vec::new();
    records(label, reader, METRICS_SCHEMA, |map, record| {
        rows.push(ClassMetrics {
            class: map.required_text(record, 0, "class")?.to_string(),
            cbo: map.number(record, 1, "cbo")?,
            dit: map.number(record, 2, "dit")?,
            lcom: map.optional_number(record, 3, "lcom")?.unwrap_or(0.0),
            rfc: map.number(record, 4, "rfc")?,
        });
        Ok(())
    })?;
    debug!(source = label, classes = rows.len(), "metrics loaded");
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Load the dependency table. `None` means structural boosting is disabled.
pub fn load_dependencies(path: Option<&Path>) -> Result<Option<Vec<DependencyEdge>>> {
    let Some(file) = open_optional(path, "dependency")? else {
        return Ok(None);
    };
    let label = path.map(|p| p.display().to_string()).unwrap_or_default();
    read_dependencies(&label, file).map(Some)
}

pub fn read_dependencies<R: Read>(label: &str, reader: R) -> Result<Vec<DependencyEdge>> {
    let mut rows = Vec::new();
    records(label, reader, DEPENDENCY_SCHEMA, |map, record| {
        rows.push(DependencyEdge {
            source: map.required_text(record, 0, "source")?.to_string(),
            target: map.required_text(record, 1, "target")?.to_string(),
        });
        Ok(())
    })?;
    debug!(source = label, edges = rows.len(), "dependencies loaded");
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Co-changes
// ---------------------------------------------------------------------------

/// Load the co-change table. `None` means every logical score is 0.
pub fn load_co_changes(path: Option<&Path>) -> Result<Option<Vec<CoChangeRecord>>> {
    let Some(file) = open_optional(path, "co-change")? else {
        return Ok(None);
    };
    let label = path.map(|p| p.display().to_string()).unwrap_or_default();
    read_co_changes(&label, file).map(Some)
}

pub fn read_co_changes<R: Read>(label: &str, reader: R) -> Result<Vec<CoChangeRecord>> {
    let mut rows = Vec::new();
    records(label, reader, CO_CHANGE_SCHEMA, |map, record| {
        rows.push(CoChangeRecord {
            class_a: map.required_text(record, 0, "file1")?.to_string(),
            class_b: map.required_text(record, 1, "file2")?.to_string(),
            commits: map.count(record, 2, "commits")?,
            support: map.optional_number(record, 3, "support")?,
            confidence: map.optional_number(record, 4, "confidence")?,
        });
        Ok(())
    })?;
    debug!(source = label, pairs = rows.len(), "co-changes loaded");
    Ok(rows)
}
