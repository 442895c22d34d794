use crate::models::{FoldResult, PerformanceMetrics, WalkForwardReport};
use anyhow::{Context, Result};
use log::info;
use serde_json::{json, Map, Value};
use std::path::Path;

const CSV_FILE: &str = "walkforward_results.csv";
const JSON_FILE: &str = "walkforward_results.json";

/// Writes per-fold rows as CSV and the full report (folds plus summary) as
/// JSON into `output_dir`, creating the directory if needed.
pub fn export_walkforward_report(report: &WalkForwardReport, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let rows: Vec<Vec<(String, Value)>> = report.folds.iter().map(fold_to_row).collect();

    let csv_path = output_dir.join(CSV_FILE);
    std::fs::write(&csv_path, rows_to_csv(&rows))
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;

    let json_path = output_dir.join(JSON_FILE);
    let fold_objects: Vec<Value> = rows
        .iter()
        .map(|row| Value::Object(row.iter().cloned().collect::<Map<String, Value>>()))
        .collect();
    let payload = json!({
        "folds": fold_objects,
        "summary": report.summary,
    });
    std::fs::write(&json_path, serde_json::to_string_pretty(&payload)?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    info!(
        "Wrote {} fold(s) to {} and {}",
        report.folds.len(),
        csv_path.display(),
        json_path.display()
    );
    Ok(())
}

/// Renders every statistic under its display label, one per line, for log
/// output after a run.
pub fn format_metrics(metrics: &PerformanceMetrics) -> String {
    let Ok(Value::Object(fields)) = serde_json::to_value(metrics) else {
        return String::new();
    };
    fields
        .iter()
        .map(|(label, value)| match value {
            Value::Number(number) => format!("  {}: {:.4}", label, number.as_f64().unwrap_or(0.0)),
            Value::Null => format!("  {}: inf", label),
            other => format!("  {}: {}", label, other),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One flat row per fold: split number, winning parameters, realized capital,
/// then every statistic under its display label.
fn fold_to_row(fold: &FoldResult) -> Vec<(String, Value)> {
    let mut row: Vec<(String, Value)> = Vec::new();
    row.push(("Split".to_string(), json!(fold.split)));

    let mut params: Vec<_> = fold.best_params.iter().collect();
    params.sort_by(|a, b| a.0.cmp(b.0));
    let rendered: Vec<String> = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    row.push(("Best Params".to_string(), json!(rendered.join(", "))));
    row.push(("Final Capital".to_string(), json!(fold.final_capital)));

    if let Value::Object(metrics) = serde_json::to_value(&fold.metrics).expect("serializable") {
        for (label, value) in metrics {
            row.push((label, value));
        }
    }
    row
}

fn rows_to_csv(rows: &[Vec<(String, Value)>]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };

    let mut out = String::new();
    out.push_str(
        &first
            .iter()
            .map(|(header, _)| escape_csv(header))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .map(|(_, value)| match value {
                Value::String(text) => escape_csv(text),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PerformanceMetrics, WalkForwardSummary};

    fn sample_report() -> WalkForwardReport {
        WalkForwardReport {
            folds: vec![FoldResult {
                split: 1,
                best_params: [
                    ("rsi_period".to_string(), 14.0),
                    ("rsi_threshold".to_string(), 50.0),
                ]
                .into_iter()
                .collect(),
                final_capital: 1100.0,
                metrics: PerformanceMetrics {
                    total_return_pct: 10.0,
                    win_rate_pct: 50.0,
                    ..PerformanceMetrics::default()
                },
            }],
            summary: WalkForwardSummary {
                mean_return_pct: 10.0,
                median_return_pct: 10.0,
                top_params: Vec::new(),
            },
        }
    }

    #[test]
    fn export_writes_csv_and_json() {
        let dir = std::env::temp_dir().join(format!("wf-report-{}", uuid::Uuid::new_v4()));
        export_walkforward_report(&sample_report(), &dir).unwrap();

        let csv = std::fs::read_to_string(dir.join(CSV_FILE)).unwrap();
        assert!(csv.starts_with("Split,"));
        assert!(csv.contains("Total Return (%)"));
        assert!(csv.contains("\"rsi_period=14, rsi_threshold=50\""));

        let json: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join(JSON_FILE)).unwrap()).unwrap();
        assert_eq!(json["folds"][0]["Split"], json!(1));
        assert_eq!(json["folds"][0]["Total Return (%)"], json!(10.0));
        assert_eq!(json["summary"]["meanReturnPct"], json!(10.0));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_report_produces_empty_csv() {
        let report = WalkForwardReport {
            folds: Vec::new(),
            summary: WalkForwardSummary {
                mean_return_pct: 0.0,
                median_return_pct: 0.0,
                top_params: Vec::new(),
            },
        };
        let dir = std::env::temp_dir().join(format!("wf-report-{}", uuid::Uuid::new_v4()));
        export_walkforward_report(&report, &dir).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.join(CSV_FILE)).unwrap(),
            ""
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
