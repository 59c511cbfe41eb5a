//! Collect-all validation of changelogs without touching a database.

use hashbrown::HashSet;

use crate::error::{Error, Result, changelog_error, duplicate_id_error};

use super::Engine;

/// Everything a validation pass found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Number of sources given.
    pub changelogs: usize,
    /// Sources with at least one failure.
    pub failed_changelogs: usize,
    /// Stream elements seen, failed or not.
    pub change_sets: usize,
    /// Change sets that decoded and pre-validated.
    pub valid_change_sets: usize,
    /// Every failure, in stream order.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// No failure and something was actually validated.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.changelogs > 0 && self.valid_change_sets > 0
    }

    /// Summary lines, each flagged `true` when it reports a failure.
    pub fn summary(&self) -> Vec<(bool, String)> {
        let mut lines = Vec::new();
        if self.changelogs == 0 {
            lines.push((true, "No change logs were processed.".to_string()));
        } else if self.failed_changelogs == 0 {
            lines.push((false, format!("{} change log(s) processed successfully.", self.changelogs)));
        } else {
            lines.push((
                true,
                format!(
                    "{} change log(s) failed out of {}.",
                    self.failed_changelogs, self.changelogs
                ),
            ));
        }
        if self.valid_change_sets == 0 {
            lines.push((true, "No change sets were processed.".to_string()));
        } else if self.valid_change_sets < self.change_sets {
            lines.push((
                true,
                format!(
                    "{} change set(s) failed out of {}.",
                    self.change_sets - self.valid_change_sets,
                    self.change_sets
                ),
            ));
        } else {
            lines.push((
                false,
                format!("{} change set(s) processed successfully.", self.valid_change_sets),
            ));
        }
        lines
    }
}

impl Engine {
    /// Parses and pre-validates every change set of `sources`, reporting
    /// all failures instead of stopping at the first.
    ///
    /// Fails with [`Error::ValidationFailed`] unless the report is a success.
    pub fn validate(&self, sources: &[String]) -> Result<ValidationReport> {
        let mut report = ValidationReport {
            changelogs: sources.len(),
            ..ValidationReport::default()
        };
        let mut failed_sources: HashSet<usize> = HashSet::new();
        let mut seen: HashSet<String> = HashSet::new();

        for item in self.processor().process(sources, false) {
            let item = item?;
            report.change_sets += 1;
            let failure = match item.result {
                Err(err) => Some(changelog_error(&item.path, err.message())),
                Ok(change_set) => {
                    let id = &change_set.global_unique_change_id;
                    if !seen.insert(id.clone()) {
                        Some(duplicate_id_error(&item.path, id))
                    } else {
                        match self.processor().pre_validate(&change_set, &item.location) {
                            Ok(_) => None,
                            Err(err) => Some(changelog_error(&item.path, err.message())),
                        }
                    }
                }
            };
            match failure {
                Some(message) => {
                    log::error!("{message}");
                    report.errors.push(message);
                    failed_sources.insert(item.source_index);
                }
                None => report.valid_change_sets += 1,
            }
        }
        report.failed_changelogs = failed_sources.len();

        for (failed, line) in report.summary() {
            if failed {
                log::error!("{line}");
            } else {
                log::info!("{line}");
            }
        }
        if report.is_success() {
            Ok(report)
        } else {
            Err(Error::ValidationFailed(Box::new(report)))
        }
    }
}
