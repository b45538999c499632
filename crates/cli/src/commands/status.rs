//! Balancer status, alerts and capacity prediction commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{Alert, ApiClient, Prediction, StatusResponse};
use crate::output::{
    color_score, color_status, color_utilization, format_ratio, format_timestamp, print_heading,
    print_info, print_json, print_success, print_warning, render_table, OutputFormat,
};

/// Row for alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Utilization")]
    utilization: String,
    #[tabled(rename = "Health")]
    health: String,
    #[tabled(rename = "Indicators")]
    indicators: String,
}

/// Row for a subject or grade count
#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Tasks")]
    tasks: u64,
}

fn alert_rows(alerts: &[Alert]) -> Vec<AlertRow> {
    alerts
        .iter()
        .rev()
        .map(|a| AlertRow {
            time: format_timestamp(a.timestamp),
            source: a.worker_id.clone().unwrap_or_else(|| a.scope.clone()),
            severity: color_status(&a.severity),
            utilization: color_utilization(a.overall_utilization),
            health: color_score(a.health_score),
            indicators: a.indicators.join(", "),
        })
        .collect()
}

fn count_rows<'a>(counts: impl Iterator<Item = (&'a String, &'a u64)>) -> Vec<CountRow> {
    counts
        .map(|(key, tasks)| CountRow {
            key: key.clone(),
            tasks: *tasks,
        })
        .collect()
}

/// Show the overall balancer status
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: StatusResponse = client.get("api/v1/status").await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            print_heading("Load Balancer Status");
            println!("Lifecycle:        {}", color_status(&status.lifecycle));
            println!("Strategy:         {}", status.strategy.cyan());
            println!("Workers:          {}", status.worker_count);
            println!("Average Quality:  {}", color_score(status.average_quality));
            println!(
                "Batch Mode:       {} ({} pending, batch size {})",
                if status.batch.enabled { "on" } else { "off" },
                status.batch.pending,
                status.batch.batch_size
            );
            println!("Generated:        {}", format_timestamp(status.generated_at));

            if let Some(system) = &status.system {
                println!();
                println!("{}", "System".bold());
                println!("{}", "-".repeat(50));
                println!("Utilization:      {}", color_utilization(system.utilization));
                println!("Health Score:     {}", color_score(system.health_score));
                println!("Error Rate:       {}", format_ratio(system.error_rate));
                println!("Samples:          {}", system.samples);
                if !system.bottlenecks.is_empty() {
                    print_warning(&format!("Bottlenecks: {}", system.bottlenecks.join(", ")));
                }
            }

            if let Some(forecast) = &status.capacity_forecast {
                println!();
                println!("{}", "Forecast".bold());
                println!("{}", "-".repeat(50));
                println!(
                    "{:.0} periods ahead: cpu {:.1}%, memory {:.1}%, {:.1} tasks",
                    forecast.periods_ahead,
                    forecast.forecast.cpu_percent,
                    forecast.forecast.memory_percent,
                    forecast.forecast.tasks
                );
            }

            if !status.subject_distribution.is_empty() {
                println!();
                println!("{}", "Subjects".bold());
                println!(
                    "{}",
                    render_table(count_rows(status.subject_distribution.iter()))
                );
            }
            if !status.grade_level_distribution.is_empty() {
                println!();
                println!("{}", "Grade Levels".bold());
                println!(
                    "{}",
                    render_table(count_rows(status.grade_level_distribution.iter()))
                );
            }
        }
    }

    Ok(())
}

/// Show the most recent bottleneck alerts, newest first
pub async fn show_alerts(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: StatusResponse = client.get("api/v1/status").await?;

    match format {
        OutputFormat::Json => print_json(&status.recent_alerts)?,
        OutputFormat::Table => {
            if status.recent_alerts.is_empty() {
                print_success("No recent bottleneck alerts");
                return Ok(());
            }
            println!("{}", render_table(alert_rows(&status.recent_alerts)));
            println!("\nTotal: {} alerts", status.recent_alerts.len());
        }
    }

    Ok(())
}

/// Show projected resource needs `horizon` minutes ahead
pub async fn show_prediction(client: &ApiClient, horizon: u32, format: OutputFormat) -> Result<()> {
    let path = format!("api/v1/predictions?horizon_minutes={}", horizon);
    let prediction: Prediction = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => {
            print_heading(&format!(
                "Resource Prediction ({} minutes)",
                prediction.time_horizon_minutes
            ));
            println!("{:<10} {:>10} {:>10} {:>10}", "", "Current", "Predicted", "Trend");
            let rows = [
                (
                    "CPU %",
                    prediction.current.cpu_percent,
                    prediction.predicted.cpu_percent,
                    prediction.trends.cpu_percent,
                ),
                (
                    "Memory %",
                    prediction.current.memory_percent,
                    prediction.predicted.memory_percent,
                    prediction.trends.memory_percent,
                ),
                (
                    "Tasks",
                    prediction.current.tasks,
                    prediction.predicted.tasks,
                    prediction.trends.tasks,
                ),
            ];
            for (label, current, predicted, trend) in rows {
                println!("{:<10} {:>10.1} {:>10.1} {:>+10.2}", label, current, predicted, trend);
            }
            println!();
            println!(
                "Recommendation:   {}",
                color_status(&prediction.recommendation)
            );
            println!(
                "Confidence:       {} ({} samples)",
                format_ratio(prediction.confidence),
                prediction.samples_used
            );
            if prediction.recommendation == "maintain" {
                print_info("Current capacity covers the projected load");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(worker_id: Option<&str>, timestamp: i64) -> Alert {
        Alert {
            timestamp,
            scope: if worker_id.is_some() { "worker" } else { "system" }.to_string(),
            worker_id: worker_id.map(str::to_string),
            severity: "warning".to_string(),
            indicators: vec!["high_cpu".to_string(), "high_memory".to_string()],
            overall_utilization: 0.9,
            health_score: 0.6,
        }
    }

    #[test]
    fn test_alert_rows_newest_first() {
        colored::control::set_override(false);
        let rows = alert_rows(&[alert(None, 100), alert(Some("agent-2"), 200)]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source, "agent-2");
        assert_eq!(rows[1].source, "system");
        assert_eq!(rows[0].indicators, "high_cpu, high_memory");
    }
}
