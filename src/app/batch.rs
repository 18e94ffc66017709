// PftLens - app/batch.rs
//
// Batch interpretation of many independent measurement records.
//
// Records are interpreted in parallel on a rayon pool. Results are collected
// in input order, so output never depends on completion order.

use crate::core::input::BatchRecord;
use crate::core::model::{InterpretationReport, RuleTables};
use crate::core::pipeline;
use crate::util::constants;
use rayon::prelude::*;
use std::time::Instant;

/// One interpreted batch row.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BatchResult {
    pub id: String,

    /// The values-seem-empty condition: no ratio and no FVC % predicted.
    pub looks_empty: bool,
    pub report: InterpretationReport,
}

/// Summary counts for logging and the CLI footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    pub records: usize,
    pub complete: usize,
    pub with_gaps: usize,
    pub with_warnings: usize,
}

impl BatchStats {
    pub fn from_results(results: &[BatchResult]) -> Self {
        let mut stats = BatchStats {
            records: results.len(),
            ..Default::default()
        };
        for result in results {
            if result.report.is_complete() {
                stats.complete += 1;
            } else {
                stats.with_gaps += 1;
            }
            if !result.report.input_warnings.is_empty() {
                stats.with_warnings += 1;
            }
        }
        stats
    }
}

/// Interpret every record. `worker_threads` of 0 uses one thread per core.
pub fn run(
    records: &[BatchRecord],
    tables: &RuleTables,
    worker_threads: usize,
) -> Vec<BatchResult> {
    let start = Instant::now();
    let threads = worker_threads.min(constants::MAX_WORKER_THREADS);

    let interpret_all = || -> Vec<BatchResult> {
        records
            .par_iter()
            .map(|record| BatchResult {
                id: record.id.clone(),
                looks_empty: record.input.looks_empty(),
                report: pipeline::interpret_input(&record.input, tables),
            })
            .collect()
    };

    // A dedicated pool only when a thread count is configured; otherwise the
    // global pool sized to the machine.
    let results = if threads > 0 {
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(interpret_all),
            Err(e) => {
                tracing::warn!(error = %e, threads, "Could not build worker pool; using default");
                interpret_all()
            }
        }
    } else {
        interpret_all()
    };

    let stats = BatchStats::from_results(&results);
    tracing::info!(
        records = stats.records,
        complete = stats.complete,
        with_gaps = stats.with_gaps,
        with_warnings = stats.with_warnings,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Batch interpretation complete"
    );

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::{parse_csv, RawInput};
    use crate::core::model::{Parameter, PatternLabel};
    use crate::core::tables::load_builtin_tables;

    fn records(n: usize) -> Vec<BatchRecord> {
        (0..n)
            .map(|i| BatchRecord {
                id: format!("case-{i}"),
                input: RawInput::new()
                    .with_ratio(40.0 + (i % 50) as f64)
                    .with_percent(Parameter::Fvc, 60.0 + (i % 40) as f64)
                    .with_percent(Parameter::Fev1, 30.0 + (i % 60) as f64),
            })
            .collect()
    }

    #[test]
    fn test_order_preserved() {
        let tables = load_builtin_tables();
        let input = records(200);
        let results = run(&input, &tables, 4);
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        let expected: Vec<String> = (0..200).map(|i| format!("case-{i}")).collect();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let tables = load_builtin_tables();
        let input = records(64);
        let parallel = run(&input, &tables, 0);
        for (record, result) in input.iter().zip(&parallel) {
            assert_eq!(result.report, pipeline::interpret_input(&record.input, &tables));
        }
    }

    #[test]
    fn test_from_csv() {
        let csv = "id,FEV1,FEV1_pred,FVC,FVC_pred,FEV1_FVC,DLCO_pred\n\
                   a,1.9,58,3.1,70,55,65\n\
                   b,0,0,0,0,0,0\n";
        let records = parse_csv(csv.as_bytes(), 10).unwrap();
        let results = run(&records, &load_builtin_tables(), 1);
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].report.findings.pattern.label(),
            Some(&PatternLabel::Mixed)
        );
        assert!(!results[0].looks_empty);
        assert!(results[1].looks_empty);

        let stats = BatchStats::from_results(&results);
        assert_eq!(stats.records, 2);
        assert_eq!(stats.with_gaps, 2);
    }
}
