use anyhow::Result;
use serde::Deserialize;
use std::io::{BufRead, Write};

use crate::engine::index::CouplingIndices;
use crate::error::{CouplingError, ErrorCode};
use crate::service::{CouplingService, classify};

/// Maximum line size for session input: 1 MB.
const MAX_LINE_SIZE: usize = 1024 * 1024;

/// One NDJSON request line.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    /// Score one pair
    Pair { class_a: String, class_b: String },
    /// Metrics row of one class
    Metrics { class: String },
    /// Index sizes and active weights
    Info,
}

/// Answer one request.
pub fn handle(
    service: &CouplingService,
    indices: &CouplingIndices,
    request: Request,
) -> Result<serde_json::Value> {
    match request {
        Request::Pair { class_a, class_b } => {
            let score = service.pair(indices, &class_a, &class_b)?;
            Ok(serde_json::to_value(score)?)
        }
        Request::Metrics { class } => {
            let metrics = service.metrics(indices, &class)?;
            Ok(serde_json::to_value(metrics)?)
        }
        Request::Info => Ok(serde_json::to_value(service.info(indices))?),
    }
}

fn error_value(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({ "error": { "code": code, "message": message } })
}

/// Run an NDJSON session: one request per input line, one response per
/// output line. A failing request yields an error object and the session
/// continues.
pub fn run_session<R: BufRead, W: Write>(
    service: &CouplingService,
    indices: &CouplingIndices,
    input: R,
    mut out: W,
) -> Result<usize> {
    let mut answered = 0;
    for line in input.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = if trimmed.len() > MAX_LINE_SIZE {
            error_value(
                &ErrorCode::InvalidRequest.to_string(),
                &format!(
                    "Input line exceeds maximum size ({} bytes > {} bytes)",
                    trimmed.len(),
                    MAX_LINE_SIZE
                ),
            )
        } else {
            match serde_json::from_str::<Request>(trimmed) {
                Ok(request) => match handle(service, indices, request) {
                    Ok(value) => value,
                    Err(e) => {
                        let (code, message) = classify(&e);
                        error_value(&code, &message)
                    }
                },
                Err(e) => {
                    let err = CouplingError::new(
                        ErrorCode::InvalidRequest,
                        format!("Invalid JSON request: {e}"),
                    );
                    error_value(&err.code.to_string(), &err.message)
                }
            }
        };

        serde_json::to_writer(&mut out, &response)?;
        out.write_all(b"\n")?;
        out.flush()?;
        answered += 1;
    }

    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loader::Tables;
    use crate::engine::policy::ScoringConfig;
    use crate::models::metrics::ClassMetrics;

    fn indices() -> CouplingIndices {
        CouplingIndices::build(Tables {
            metrics: vec![
                ClassMetrics::new("User", 3.0, 8.0, 1.0),
                ClassMetrics::new("UserRepository", 5.0, 12.0, 0.0),
            ],
            ..Tables::default()
        })
        .unwrap()
    }

    fn run(input: &str) -> Vec<serde_json::Value> {
        let service = CouplingService::new(ScoringConfig::default());
        let mut out = Vec::new();
        run_session(&service, &indices(), input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn answers_each_request_in_order() {
        let responses = run(concat!(
            r#"{"command":"pair","class_a":"User","class_b":"UserRepository"}"#,
            "\n\n",
            r#"{"command":"metrics","class":"User"}"#,
            "\n",
            r#"{"command":"info"}"#,
            "\n",
        ));
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["class_b"], "UserRepository");
        assert_eq!(responses[0]["is_strong_coupling"], false);
        assert_eq!(responses[1]["cbo"], 3.0);
        assert_eq!(responses[2]["classes"], 2);
        assert_eq!(responses[2]["total_pairs"], 1);
    }

    #[test]
    fn bad_lines_become_error_objects() {
        let responses = run(concat!(
            "not json\n",
            r#"{"command":"metrics","class":"Nope"}"#,
            "\n",
            r#"{"command":"pair","class_a":"User","class_b":"User"}"#,
            "\n",
        ));
        assert_eq!(responses.len(), 3);
        for r in &responses {
            assert_eq!(r["error"]["code"], "INVALID_REQUEST");
        }
    }
}
