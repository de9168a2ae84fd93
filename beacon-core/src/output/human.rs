use colored::Colorize;

use super::OutputFormatter;
use crate::bulk::RunSummary;
use crate::colors::CatppuccinExt;
use crate::probe::{OutcomeRecord, Verdict};
use crate::validation::NormalizedTarget;

const DOMAIN_COL: usize = 30;
const BOOL_COL: usize = 7;
const HTTP_COL: usize = 7;
const STATUS_COL: usize = 15;

/// Fits `name` into the domain column, truncating with `...`.
fn fit_name(name: &str) -> String {
    if name.chars().count() > DOMAIN_COL {
        let head: String = name.chars().take(DOMAIN_COL - 3).collect();
        format!("{}...", head)
    } else {
        format!("{:<width$}", name, width = DOMAIN_COL)
    }
}

pub struct HumanFormatter {
    use_colors: bool,
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self { use_colors: true }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    fn label(&self, text: &str) -> String {
        if self.use_colors {
            text.sky().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn success(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_green().to_string()
        } else {
            text.to_string()
        }
    }

    fn warning(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_yellow().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn error(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_red().to_string()
        } else {
            text.to_string()
        }
    }

    fn muted(&self, text: &str) -> String {
        if self.use_colors {
            text.overlay0().to_string()
        } else {
            text.to_string()
        }
    }

    fn row(&self, name: &str, dns: &str, tls: &str, http: &str, status: &str) -> String {
        format!(
            "{} | {:<b$} | {:<b$} | {:<h$} | {:<s$}",
            fit_name(name),
            dns,
            tls,
            http,
            status,
            b = BOOL_COL,
            h = HTTP_COL,
            s = STATUS_COL
        )
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_header(&self) -> Option<String> {
        let header = self.row("DOMAIN", "DNS", "SSL", "HTTP", "STATUS");
        let rule = "-".repeat(header.len());
        Some(format!("{}\n{}", self.label(&header), self.muted(&rule)))
    }

    fn format_outcome(&self, record: &OutcomeRecord) -> String {
        let http = record
            .http_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "---".to_string());
        let line = self.row(
            &record.raw_input,
            &record.dns_ok.to_string(),
            &record.tls_ok.to_string(),
            &http,
            &record.verdict.to_string(),
        );

        match record.verdict {
            Verdict::Working => self.success(&line),
            Verdict::NotWorking | Verdict::Invalid => self.error(&line),
        }
    }

    fn format_summary(&self, summary: &RunSummary) -> String {
        let counters = &summary.counters;
        let mut output = Vec::new();

        output.push(format!(
            "{} {:.0}% ({}/{})",
            self.label("Progress:"),
            counters.percent(),
            counters.completed,
            counters.total
        ));
        output.push(format!(
            "  {} {}  {} {}  {} {}",
            self.label("Working:"),
            self.success(&counters.working_count.to_string()),
            self.label("Not working:"),
            self.error(&counters.not_working_count.to_string()),
            self.label("Invalid:"),
            self.muted(&counters.invalid_count.to_string()),
        ));
        output.push(format!(
            "  {} {:.1}s",
            self.label("Elapsed:"),
            summary.elapsed_ms as f64 / 1000.0
        ));

        if summary.cancelled {
            output.push(format!(
                "  {} {} targets not checked",
                self.warning("Cancelled:"),
                summary.remaining
            ));
        }

        output.join("\n")
    }

    fn format_normalized(&self, target: &NormalizedTarget) -> String {
        match &target.rejection {
            None => format!(
                "{} {} -> {}",
                self.success("✓"),
                fit_name(&target.raw_input),
                target.canonical_url
            ),
            Some(rejection) => format!(
                "{} {} {}",
                self.error("✗"),
                fit_name(&target.raw_input),
                self.muted(&rejection.to_string())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::RunCounters;
    use crate::probe::ProbeOutcome;
    use crate::validation::Normalizer;

    fn plain() -> HumanFormatter {
        HumanFormatter::new().without_colors()
    }

    #[test]
    fn test_fit_name() {
        assert_eq!(fit_name("example.com").len(), DOMAIN_COL);
        let long = "a-really-long-subdomain.example-company.com";
        let fitted = fit_name(long);
        assert_eq!(fitted.chars().count(), DOMAIN_COL);
        assert!(fitted.ends_with("..."));
    }

    #[test]
    fn test_outcome_row_columns() {
        let target = Normalizer::default().normalize("example.com");
        let record = ProbeOutcome::checked(target, true, false, None, 5).record();
        let line = plain().format_outcome(&record);

        let columns: Vec<&str> = line.split(" | ").map(str::trim).collect();
        assert_eq!(columns, vec!["example.com", "true", "false", "---", "NOT WORKING"]);
    }

    #[test]
    fn test_header_matches_row_width() {
        let header = plain().format_header().unwrap();
        let first = header.lines().next().unwrap();
        let target = Normalizer::default().normalize("example.com");
        let row = plain().format_outcome(&ProbeOutcome::checked(target, true, true, Some(200), 1).record());
        assert_eq!(first.len(), row.len());
    }

    #[test]
    fn test_summary_mentions_cancel() {
        let summary = RunSummary {
            counters: RunCounters {
                total: 4,
                completed: 2,
                working_count: 1,
                not_working_count: 1,
                invalid_count: 0,
            },
            cancelled: true,
            remaining: 2,
            elapsed_ms: 1500,
        };
        let text = plain().format_summary(&summary);
        assert!(text.contains("50%"));
        assert!(text.contains("2 targets not checked"));
    }

    #[test]
    fn test_normalized_shows_rejection() {
        let target = Normalizer::default().normalize("bad.png");
        let text = plain().format_normalized(&target);
        assert!(text.contains("file extension .png"));
    }
}
