use crate::output::{first_line, print_json, print_table};
use scorebot_core::ProbeStatus;
use scorebot_engine::RoundReport;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let scheduler = super::build_scheduler(root)?;
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(scheduler.run_round())?;

    if json {
        print_json(&serde_json::json!({
            "round": report.summary,
            "placeholders": report.placeholders,
            "records": report.records,
        }))?;
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RoundReport) {
    let rows = report
        .records
        .iter()
        .map(|r| {
            vec![
                r.key.team.clone(),
                r.key.service.clone(),
                r.key.check.clone(),
                r.status().to_string(),
                r.outcome.elapsed_ms.to_string(),
                first_line(&r.outcome.output, 60),
            ]
        })
        .collect();
    print_table(&["TEAM", "SERVICE", "CHECK", "STATUS", "MS", "OUTPUT"], rows);

    let summary = &report.summary;
    let counts: Vec<String> = ProbeStatus::all()
        .iter()
        .filter(|s| summary.count(**s) > 0)
        .map(|s| format!("{} {s}", summary.count(*s)))
        .collect();
    println!(
        "\nround {}: {} jobs ({})",
        summary.id,
        summary.job_count,
        if counts.is_empty() {
            "none".to_string()
        } else {
            counts.join(", ")
        }
    );
    if report.placeholders > 0 {
        println!(
            "{} job(s) hit the round deadline and were recorded as timeout",
            report.placeholders
        );
    }
}
