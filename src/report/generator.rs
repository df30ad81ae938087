//! Markdown and JSON report generation.
//!
//! This module renders uniformity results for every rank into a report.

use crate::models::{Report, ReportMetadata, SamplePlan, UniformityTest};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# RankAudit Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));

    if let Some(ref plan) = report.plan {
        output.push_str(&generate_plan_section(plan));
    }

    output.push_str(&generate_summary_section(report));

    output.push_str(&generate_results_section(&report.tests));

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Endpoint:** {}\n", metadata.endpoint));
    section.push_str(&format!("- **Table:** `{}`\n", metadata.table));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Results per Round:** {}\n", metadata.num_results));
    section.push_str(&format!("- **Identifiers Seen:** {}\n", metadata.identifiers));
    section.push_str(&format!("- **Rounds Recorded:** {}\n", metadata.rounds_recorded));
    if metadata.rounds_this_run > 0 {
        section.push_str(&format!("- **Rounds This Run:** {}\n", metadata.rounds_this_run));
    }
    section.push_str(&format!(
        "- **Run Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the sample plan section.
fn generate_plan_section(plan: &SamplePlan) -> String {
    let mut section = String::new();

    section.push_str("## Sample Plan\n\n");
    section.push_str(&format!(
        "- Minimum samples (5 × {}): {}\n",
        plan.num_results, plan.min_samples
    ));
    section.push_str(&format!("- Target: {}\n", plan.target));
    section.push_str(&format!("- Already stored: {}\n", plan.current));
    section.push_str(&format!("- Additional rounds planned: {}\n\n", plan.additional_rounds));

    section
}

/// Generate the summary section.
fn generate_summary_section(report: &Report) -> String {
    let mut section = String::new();
    let biased = report.biased_ranks();

    section.push_str("## Summary\n\n");

    if report.tests.is_empty() {
        section.push_str("No ranks could be tested.\n\n");
    } else if biased.is_empty() {
        section.push_str(&format!(
            "{} All {} ranks are consistent with a uniform assignment.\n\n",
            crate::models::Verdict::Uniform.emoji(),
            report.tests.len()
        ));
    } else {
        let list: Vec<String> = biased.iter().map(|r| r.to_string()).collect();
        section.push_str(&format!(
            "{} Uniformity rejected at {} of {} ranks: {}\n\n",
            crate::models::Verdict::Biased.emoji(),
            biased.len(),
            report.tests.len(),
            list.join(", ")
        ));
    }

    section
}

/// Generate the per-rank results table.
fn generate_results_section(tests: &[UniformityTest]) -> String {
    let mut section = String::new();

    if tests.is_empty() {
        return section;
    }

    section.push_str("## Results by Rank\n\n");
    section.push_str("| Rank | Observations | Categories | χ² | df | p-value | Verdict |\n");
    section.push_str("|------|--------------|------------|----|----|---------|---------|\n");

    for test in tests {
        section.push_str(&generate_result_row(test));
    }
    section.push('\n');

    section
}

/// Generate one table row.
fn generate_result_row(test: &UniformityTest) -> String {
    let verdict = test.verdict();
    format!(
        "| {} | {} | {} | {:.3} | {} | {:.4} | {} {} |\n",
        test.rank,
        test.observations,
        test.categories,
        test.statistic,
        test.degrees_of_freedom,
        test.p_value,
        verdict.emoji(),
        verdict
    )
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by RankAudit*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_test(rank: usize, statistic: f64, p_value: f64) -> UniformityTest {
        UniformityTest {
            rank,
            categories: 4,
            observations: 100,
            statistic,
            degrees_of_freedom: 3,
            p_value,
            alpha: 0.05,
        }
    }

    fn create_test_report() -> Report {
        Report {
            metadata: ReportMetadata {
                endpoint: "https://registry.example.org/find".to_string(),
                table: "ranks".to_string(),
                num_results: 4,
                identifiers: 4,
                rounds_recorded: 100,
                rounds_this_run: 40,
                analysis_date: Utc::now(),
                duration_seconds: 12.5,
            },
            plan: Some(SamplePlan::new(4, 60)),
            tests: vec![make_test(0, 0.0, 1.0), make_test(1, 108.0, 1e-20)],
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# RankAudit Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Sample Plan"));
        assert!(markdown.contains("## Results by Rank"));
        assert!(markdown.contains("Rounds This Run:** 40"));
        assert!(markdown.contains("Uniformity rejected at 1 of 2 ranks: 1"));
        assert!(markdown.contains("108.000"));
    }

    #[test]
    fn test_summary_all_uniform() {
        let mut report = create_test_report();
        report.tests = vec![make_test(0, 0.5, 0.9), make_test(1, 1.0, 0.8)];

        let section = generate_summary_section(&report);
        assert!(section.contains("All 2 ranks are consistent"));
    }

    #[test]
    fn test_generate_result_row() {
        let row = generate_result_row(&make_test(3, 7.8147, 0.05));
        assert!(row.starts_with("| 3 | 100 | 4 | 7.815 | 3 | 0.0500 |"));
        assert!(row.contains("Uniform"));

        let row = generate_result_row(&make_test(2, 20.0, 0.0002));
        assert!(row.contains("Biased"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"endpoint\""));
        assert!(json.contains("\"tests\""));
        assert!(json.contains("\"additional_rounds\": 0"));
        assert!(json.contains("\"p_value\""));
    }
}
