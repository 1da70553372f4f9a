//! Spreadsheet intake: turns form-export rows into submitted applications.

mod directory;
mod normalizer;
mod parser;

pub use directory::ApplicantDirectory;
pub use parser::IntakeRow;

use crate::workflows::review::{
    ApplicationId, IntakeSource, Notifier, ReviewError, ReviewService,
};
use normalizer::normalize_username;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

#[derive(Debug)]
pub enum IntakeImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Review(ReviewError),
}

impl std::fmt::Display for IntakeImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntakeImportError::Io(err) => write!(f, "failed to read spreadsheet export: {}", err),
            IntakeImportError::Csv(err) => write!(f, "invalid spreadsheet CSV data: {}", err),
            IntakeImportError::Review(err) => {
                write!(f, "could not submit spreadsheet row for review: {}", err)
            }
        }
    }
}

impl std::error::Error for IntakeImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IntakeImportError::Io(err) => Some(err),
            IntakeImportError::Csv(err) => Some(err),
            IntakeImportError::Review(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for IntakeImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for IntakeImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<ReviewError> for IntakeImportError {
    fn from(err: ReviewError) -> Self {
        Self::Review(err)
    }
}

/// Tally of one import pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub submitted: Vec<ApplicationId>,
    pub unresolved: usize,
    pub duplicates: usize,
}

/// Stateful importer: a row seen on an earlier pass is not submitted again, so the same export
/// can be re-read as it grows.
pub struct SpreadsheetImporter {
    directory: ApplicantDirectory,
    default_kind: String,
    seen: HashSet<String>,
}

impl SpreadsheetImporter {
    pub fn new(directory: ApplicantDirectory) -> Self {
        Self {
            directory,
            default_kind: "general".to_string(),
            seen: HashSet::new(),
        }
    }

    /// Kind used for rows without an application type column.
    pub fn with_default_kind(mut self, kind: impl Into<String>) -> Self {
        self.default_kind = kind.into();
        self
    }

    pub fn import_path<P, N>(
        &mut self,
        path: P,
        service: &ReviewService<N>,
    ) -> Result<ImportSummary, IntakeImportError>
    where
        P: AsRef<Path>,
        N: Notifier + 'static,
    {
        let file = std::fs::File::open(path)?;
        self.import_reader(file, service)
    }

    pub fn import_reader<R, N>(
        &mut self,
        reader: R,
        service: &ReviewService<N>,
    ) -> Result<ImportSummary, IntakeImportError>
    where
        R: Read,
        N: Notifier + 'static,
    {
        let mut summary = ImportSummary::default();

        for row in parser::parse_rows(reader)? {
            let key = row_key(&row);
            if self.seen.contains(&key) {
                summary.duplicates += 1;
                continue;
            }

            let applicant = row
                .username
                .as_deref()
                .and_then(|username| self.directory.resolve(username));
            if applicant.is_none() {
                summary.unresolved += 1;
                tracing::warn!(
                    username = ?row.username,
                    "spreadsheet applicant could not be resolved; submitting without a reference"
                );
            }

            let kind = row
                .kind
                .clone()
                .unwrap_or_else(|| self.default_kind.clone());
            let application =
                service.submit_from(IntakeSource::Spreadsheet, kind, applicant, row.content)?;
            self.seen.insert(key);
            summary.submitted.push(application.id);
        }

        tracing::info!(
            submitted = summary.submitted.len(),
            unresolved = summary.unresolved,
            duplicates = summary.duplicates,
            "spreadsheet import finished"
        );
        Ok(summary)
    }
}

fn row_key(row: &IntakeRow) -> String {
    format!(
        "{}|{}|{}|{}",
        row.submitted_at.as_deref().unwrap_or(""),
        row.username
            .as_deref()
            .map(normalize_username)
            .unwrap_or_default(),
        row.kind.as_deref().unwrap_or("").to_lowercase(),
        row.content,
    )
}
