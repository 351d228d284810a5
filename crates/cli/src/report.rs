use knowledge_indexer::IndexStats;
use knowledge_search::RetrievedPassage;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write;
use std::path::PathBuf;

/// Summary of a store as printed by `knowledge status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub store: PathBuf,
    pub records: usize,
    pub dimension: Option<usize>,
    pub generation: u64,
    pub embedding_model: Option<String>,
    pub sources: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query: String,
    pub k: usize,
    pub results: Vec<RetrievedPassage>,
}

pub fn render_index_stats(stats: &IndexStats) -> String {
    let mut out = String::new();
    let verb = if stats.rebuilt { "Rebuilt" } else { "Indexed" };
    let _ = writeln!(
        out,
        "{verb}: {} processed, {} skipped, {} failed ({} sources found)",
        stats.processed,
        stats.skipped,
        stats.failures.len(),
        stats.discovered
    );
    let _ = writeln!(
        out,
        "Passages added: {} (store now holds {})",
        stats.chunks_added, stats.total_records
    );
    for failure in &stats.failures {
        let _ = writeln!(out, "  skipped {}: {}", failure.source_id, failure.reason);
    }
    if !stats.persisted {
        out.push_str("Nothing new to commit\n");
    }
    let _ = write!(out, "Time: {}ms", stats.time_ms);
    out
}

pub fn render_query(report: &QueryReport) -> String {
    if report.results.is_empty() {
        return "No results.".to_string();
    }
    let mut out = String::new();
    for (rank, passage) in report.results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. [{}] distance {:.4}",
            rank + 1,
            passage.source,
            passage.distance
        );
        for line in passage.text.lines() {
            let _ = writeln!(out, "   {line}");
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

pub fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Store: {}", report.store.display());
    let _ = writeln!(out, "Records: {}", report.records);
    let _ = writeln!(
        out,
        "Dimension: {}",
        report
            .dimension
            .map_or_else(|| "n/a".to_string(), |d| d.to_string())
    );
    let _ = writeln!(out, "Generation: {}", report.generation);
    let _ = writeln!(
        out,
        "Embedding model: {}",
        report.embedding_model.as_deref().unwrap_or("n/a")
    );
    let _ = write!(out, "Sources ({}):", report.sources.len());
    for source in &report.sources {
        let _ = write!(out, "\n  {source}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_lines_show_rank_source_and_distance() {
        let report = QueryReport {
            query: "vacation".to_string(),
            k: 2,
            results: vec![
                RetrievedPassage {
                    text: "Requests go through HR.".to_string(),
                    source: "policy.txt".to_string(),
                    distance: 0.25,
                },
                RetrievedPassage {
                    text: "Travel via the agency.".to_string(),
                    source: "travel.md".to_string(),
                    distance: 1.5,
                },
            ],
        };
        let text = render_query(&report);
        assert!(text.starts_with("1. [policy.txt] distance 0.2500\n   Requests go through HR."));
        assert!(text.contains("2. [travel.md] distance 1.5000"));
    }

    #[test]
    fn empty_query_result_is_explicit() {
        let report = QueryReport {
            query: "anything".to_string(),
            k: 3,
            results: Vec::new(),
        };
        assert_eq!(render_query(&report), "No results.");
    }

    #[test]
    fn failures_are_listed_in_stats() {
        let mut stats = IndexStats::new();
        stats.discovered = 2;
        stats.add_processed(4);
        stats.add_failure("scan.pdf", "needs extractor");
        stats.total_records = 4;
        stats.persisted = true;
        let text = render_index_stats(&stats);
        assert!(text.contains("Indexed: 1 processed, 0 skipped, 1 failed (2 sources found)"));
        assert!(text.contains("skipped scan.pdf: needs extractor"));
    }
}
