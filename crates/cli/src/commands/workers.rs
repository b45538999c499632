//! Worker listing and detail commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, StatusResponse, WorkerDetail};
use crate::output::{
    color_score, color_utilization, format_ratio, format_seconds, format_timestamp,
    print_heading, print_json, print_warning, render_table, OutputFormat,
};

/// Row for workers table
#[derive(Tabled)]
struct WorkerRow {
    #[tabled(rename = "Worker")]
    id: String,
    #[tabled(rename = "Load")]
    load: String,
    #[tabled(rename = "Weight")]
    weight: u32,
    #[tabled(rename = "Utilization")]
    utilization: String,
    #[tabled(rename = "Health")]
    health: String,
    #[tabled(rename = "Pred. Time")]
    predicted_time: String,
    #[tabled(rename = "Pred. Quality")]
    predicted_quality: String,
    #[tabled(rename = "Trend")]
    trend: String,
    #[tabled(rename = "Allocations")]
    allocations: u64,
    #[tabled(rename = "Subjects")]
    subjects: String,
}

fn worker_rows(status: &StatusResponse) -> Vec<WorkerRow> {
    status
        .workers
        .iter()
        .map(|(id, w)| WorkerRow {
            id: id.clone(),
            load: format_ratio(w.load_factor),
            weight: w.weight,
            utilization: color_utilization(w.utilization),
            health: color_score(w.health_score),
            predicted_time: format_seconds(w.predicted_completion_time),
            predicted_quality: color_score(w.predicted_quality_score),
            trend: w.workload_trend.clone(),
            allocations: status.recent_allocations.get(id).copied().unwrap_or(0),
            subjects: if w.specializations.is_empty() {
                "-".to_string()
            } else {
                w.specializations.join(", ")
            },
        })
        .collect()
}

/// List every registered worker
pub async fn list_workers(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: StatusResponse = client.get("api/v1/status").await?;

    match format {
        OutputFormat::Json => print_json(&status.workers)?,
        OutputFormat::Table => {
            if status.workers.is_empty() {
                print_warning("No workers registered");
                return Ok(());
            }
            println!("{}", render_table(worker_rows(&status)));
            println!("\nTotal: {} workers ({})", status.worker_count, status.strategy.cyan());
        }
    }

    Ok(())
}

/// Show the tracked state of one worker
pub async fn show_worker(client: &ApiClient, worker_id: &str, format: OutputFormat) -> Result<()> {
    let path = format!("api/v1/workers/{}", worker_id);
    let worker: WorkerDetail = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&worker)?,
        OutputFormat::Table => {
            print_heading("Worker");
            println!("ID:               {}", worker.worker_id.cyan());
            println!("Load Factor:      {}", format_ratio(worker.load_factor));
            println!("Capability Score: {:.2}", worker.capability_score);
            println!(
                "Specializations:  {}",
                if worker.educational_specializations.is_empty() {
                    "-".to_string()
                } else {
                    worker.educational_specializations.join(", ")
                }
            );
            println!("Last Updated:     {}", format_timestamp(worker.last_updated));
            println!();
            println!("{}", "Resources".bold());
            println!("{}", "-".repeat(50));
            let metrics = &worker.current_metrics;
            println!("CPU:              {:.1}%", metrics.cpu_percent);
            println!("Memory:           {:.1}%", metrics.memory_percent);
            println!("Disk:             {:.1}%", metrics.disk_percent);
            println!("Error Rate:       {}", format_ratio(metrics.error_rate));
            println!("Utilization:      {}", color_utilization(metrics.overall_utilization));
            println!("Health Score:     {}", color_score(metrics.health_score));
            if !metrics.bottleneck_indicators.is_empty() {
                print_warning(&format!(
                    "Bottlenecks: {}",
                    metrics.bottleneck_indicators.join(", ")
                ));
            }
            println!();
            println!("{}", "Performance".bold());
            println!("{}", "-".repeat(50));
            println!(
                "Predicted Time:   {}",
                format_seconds(worker.predicted_completion_time)
            );
            println!(
                "Predicted Quality: {}",
                color_score(worker.predicted_quality_score)
            );
            println!("Workload Trend:   {}", worker.workload_trend);
            println!("History Samples:  {}", worker.performance_history.len());
        }
    }

    Ok(())
}
