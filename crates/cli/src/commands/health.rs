//! Service health and readiness

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthReport, Readiness};
use crate::output::{
    color_status, format_timestamp, print_heading, print_json, print_success, print_warning,
    render_table, OutputFormat,
};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Failures")]
    failures: u32,
    #[tabled(rename = "Last Check")]
    last_check: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct HealthSummary<'a> {
    health: &'a HealthReport,
    readiness: &'a Readiness,
}

/// Show aggregate health, per-component status and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (bool, HealthReport) = client.probe("healthz").await?;
    let (ready, readiness): (bool, Readiness) = client.probe("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&HealthSummary {
            health: &health,
            readiness: &readiness,
        })?,
        OutputFormat::Table => {
            print_heading("Service Health");
            println!("Status:   {}", color_status(&health.status));
            if ready {
                print_success("Ready");
            } else {
                print_warning(&format!(
                    "Not ready: {}",
                    readiness.reason.as_deref().unwrap_or("unknown")
                ));
            }

            if !health.components.is_empty() {
                println!();
                let rows: Vec<ComponentRow> = health
                    .components
                    .iter()
                    .map(|(name, c)| ComponentRow {
                        name: name.clone(),
                        status: color_status(&c.status),
                        failures: c.consecutive_failures,
                        last_check: format_timestamp(c.last_check_timestamp),
                        message: c.message.clone().unwrap_or_default(),
                    })
                    .collect();
                println!("{}", render_table(rows));
            }
        }
    }

    Ok(())
}
