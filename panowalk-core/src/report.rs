// End-of-session crawl reports

use crate::data::TableCounts;
use panowalk_crawler::CrawlSummary;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub outcome: String,
    pub before: TableCounts,
    pub after: TableCounts,
    pub nodes_added: u64,
    pub candidates_removed: u64,
    pub iterations: u64,
    pub rejected: u64,
    pub reseeds: u64,
    pub stalls: u64,
    pub out_of_bounds: u64,
    pub stepper_faults: u64,
    pub storage_faults: u64,
    pub final_direction: String,
    pub elapsed_secs: f64,
    /// Nodes added per iteration, in percent.
    pub success_rate: f64,
    pub ops_per_sec: f64,
    pub secs_per_iteration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secs_per_node: Option<f64>,
}

impl SessionReport {
    /// Builds a report from the controller's summary and the table counts
    /// taken before and after the run. Totals come from the counts, so nodes
    /// added by concurrent sessions are included.
    pub fn new(
        session_id: Option<String>,
        summary: &CrawlSummary,
        before: TableCounts,
        after: TableCounts,
        elapsed: Duration,
    ) -> Self {
        let nodes_added = after.visited.saturating_sub(before.visited);
        let candidates_removed = before.frontier.saturating_sub(after.frontier);
        let iterations = summary.iterations;
        let elapsed_secs = elapsed.as_secs_f64();

        let per = |n: u64, total: f64| if n == 0 { 0.0 } else { total / n as f64 };

        SessionReport {
            session_id,
            outcome: summary.outcome.as_str().to_string(),
            before,
            after,
            nodes_added,
            candidates_removed,
            iterations,
            rejected: summary.stats.rejected,
            reseeds: summary.stats.reseeds,
            stalls: summary.stats.stalls,
            out_of_bounds: summary.stats.out_of_bounds,
            stepper_faults: summary.stats.stepper_faults,
            storage_faults: summary.stats.storage_faults,
            final_direction: summary.final_direction.as_str().to_string(),
            elapsed_secs,
            success_rate: per(iterations, nodes_added as f64 * 100.0),
            ops_per_sec: if elapsed_secs > 0.0 {
                iterations as f64 / elapsed_secs
            } else {
                0.0
            },
            secs_per_iteration: per(iterations, elapsed_secs),
            secs_per_node: (nodes_added > 0).then(|| elapsed_secs / nodes_added as f64),
        }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, serde_json::Error> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => self.render_json(),
        }
    }

    pub fn render_text(&self) -> String {
        let mut report = String::new();

        report.push_str(RULE);
        report.push_str("                    PANOWALK CRAWL REPORT\n");
        report.push_str(RULE);
        report.push('\n');

        if let Some(ref id) = self.session_id {
            report.push_str(&format!("Session ID:        {}\n", id));
        }
        report.push_str(&format!("Outcome:           {}\n", self.outcome));
        report.push_str(&format!(
            "Duration:          {}\n",
            format_duration(Duration::from_secs_f64(self.elapsed_secs))
        ));
        report.push_str(&format!("Final direction:   {}\n\n", self.final_direction));

        report.push_str(&format!(
            "Visited:           {} -> {}  (+{})\n",
            self.before.visited, self.after.visited, self.nodes_added
        ));
        report.push_str(&format!(
            "Frontier:          {} -> {}  (-{})\n\n",
            self.before.frontier, self.after.frontier, self.candidates_removed
        ));

        report.push_str(&format!("Iterations:        {}\n", self.iterations));
        report.push_str(&format!("Success rate:      {:.1}%\n", self.success_rate));
        report.push_str(&format!("Operations/sec:    {:.2}\n", self.ops_per_sec));
        report.push_str(&format!(
            "Time/iteration:    {:.3}s\n",
            self.secs_per_iteration
        ));
        if let Some(per_node) = self.secs_per_node {
            report.push_str(&format!("Time/node:         {:.3}s\n", per_node));
        }
        report.push('\n');

        report.push_str(&format!("Rejected commits:  {}\n", self.rejected));
        report.push_str(&format!("Reseeds:           {}\n", self.reseeds));
        report.push_str(&format!("Stalls:            {}\n", self.stalls));
        report.push_str(&format!("Left geofence:     {}\n", self.out_of_bounds));
        if self.stepper_faults + self.storage_faults > 0 {
            report.push_str(&format!(
                "Faults:            {} stepper, {} storage\n",
                self.stepper_faults, self.storage_faults
            ));
        }

        report.push('\n');
        report.push_str(RULE);
        report
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        let json_report = serde_json::json!({
            "report": {
                "metadata": {
                    "generator": "panowalk",
                    "version": env!("CARGO_PKG_VERSION"),
                    "generated_at": chrono::Utc::now().to_rfc3339(),
                },
                "session": self,
            }
        });

        serde_json::to_string_pretty(&json_report)
    }
}

/// `12.3s`, `4m 5.0s`, `1h 2m 3.0s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    let hours = (secs / 3600.0).floor() as u64;
    let minutes = ((secs % 3600.0) / 60.0).floor() as u64;
    let seconds = secs % 60.0;

    if hours > 0 {
        format!("{}h {}m {:.1}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:.1}s", minutes, seconds)
    } else {
        format!("{:.1}s", seconds)
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
