use colored::Colorize;
use std::cell::RefCell;
use tracing::{info, warn};

/// Sink for user-facing progress and warnings of a diagnostics run.
pub trait Reporter {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub level: Level,
    pub message: String,
}

/// Collects every message of a run and forwards it to `tracing`.
#[derive(Debug, Default)]
pub struct RunReport {
    issues: RefCell<Vec<Issue>>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: Level, message: &str) {
        self.issues.borrow_mut().push(Issue {
            level,
            message: message.to_string(),
        });
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.issues.borrow().clone()
    }

    pub fn warnings(&self) -> usize {
        self.issues
            .borrow()
            .iter()
            .filter(|i| i.level == Level::Warning)
            .count()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.issues
            .borrow()
            .iter()
            .filter(|i| i.level == Level::Warning)
            .map(|i| i.message.clone())
            .collect()
    }

    /// Print the warnings gathered during the run followed by a one-line
    /// summary.
    pub fn print_summary(&self) {
        let issues = self.issues.borrow();
        let warnings: Vec<&Issue> = issues.iter().filter(|i| i.level == Level::Warning).collect();

        if !warnings.is_empty() {
            println!("{}", "warnings {".bold());
            for issue in &warnings {
                println!("  {}: {}", "WARN".yellow().bold(), issue.message);
            }
            println!("{}", "}".bold());
        }

        let count = format!("{} warnings", warnings.len());
        println!(
            "Summary: {}, {} messages",
            if warnings.is_empty() { count.green() } else { count.yellow() },
            issues.len()
        );
    }
}

impl Reporter for RunReport {
    fn info(&self, msg: &str) {
        info!("{}", msg);
        self.push(Level::Info, msg);
    }

    fn warn(&self, msg: &str) {
        warn!("{}", msg);
        self.push(Level::Warning, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_report_counts_warnings() {
        let report = RunReport::new();
        report.info("Taylor Diagram: completed ANN.");
        report.warn("PSL skipped for case c1");
        report.warn("U300 skipped for case c2");

        assert_eq!(report.warnings(), 2);
        assert_eq!(report.issues().len(), 3);
        assert_eq!(report.warning_messages()[0], "PSL skipped for case c1");
    }
}
