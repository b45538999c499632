//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render rows as a rounded table
pub fn render_table<T: Tabled>(rows: Vec<T>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a [0, 1] ratio as a percentage
pub fn format_ratio(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Format seconds with a unit that suits the magnitude
pub fn format_seconds(secs: f64) -> String {
    if secs <= 0.0 {
        "-".to_string()
    } else if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else {
        format!("{:.2}s", secs)
    }
}

/// Format a unix timestamp in UTC
pub fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "running" | "maintain" => status.green().to_string(),
        "degraded" | "warning" | "initializing" | "shutting_down" | "scale_down" => {
            status.yellow().to_string()
        }
        "unhealthy" | "critical" | "stopped" | "scale_up" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a [0, 1] score where higher is better
pub fn color_score(score: f64) -> String {
    let formatted = format!("{:.2}", score);
    if score >= 0.8 {
        formatted.green().to_string()
    } else if score >= 0.5 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Color a [0, 1] utilization where lower is better
pub fn color_utilization(value: f64) -> String {
    let formatted = format_ratio(value);
    if value >= 0.9 {
        formatted.red().to_string()
    } else if value >= 0.7 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}
