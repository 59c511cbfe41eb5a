//! Inline-or-external document sources shared by the document-carrying actions.

use crate::{
    changelog::resolver::{ChangelogLocation, DocumentResolver},
    error::ChangeValidationError,
    types::Document,
};

enum Source<'a, T> {
    Inline(&'a T),
    External { path: &'a str, relative: bool },
}

/// Resolves `document` / `externalDocumentPath`: exactly one must be set,
/// and `relativeToChangelog` only accompanies the external path.
pub(super) fn single_document(
    document: Option<&Document>,
    external_path: Option<&str>,
    relative_to_changelog: Option<bool>,
    resolver: &DocumentResolver,
    location: &ChangelogLocation,
) -> Result<Document, ChangeValidationError> {
    let source = pick(
        document,
        external_path,
        relative_to_changelog,
        "change.document",
        "change.externalDocumentPath",
    )?;
    match source {
        Source::Inline(document) => Ok(document.clone()),
        Source::External { path, relative } => {
            resolver.load_document(&resolver.resolve(relative.then_some(location), path))
        }
    }
}

/// Same as [`single_document`] for `documents` / `externalDocumentsPath`.
pub(super) fn multiple_documents(
    documents: Option<&Vec<Document>>,
    external_path: Option<&str>,
    relative_to_changelog: Option<bool>,
    resolver: &DocumentResolver,
    location: &ChangelogLocation,
) -> Result<Vec<Document>, ChangeValidationError> {
    let source = pick(
        documents,
        external_path,
        relative_to_changelog,
        "change.documents",
        "change.externalDocumentsPath",
    )?;
    match source {
        Source::Inline(documents) => Ok(documents.clone()),
        Source::External { path, relative } => {
            resolver.load_documents(&resolver.resolve(relative.then_some(location), path))
        }
    }
}

fn pick<'a, T>(
    inline: Option<&'a T>,
    external_path: Option<&'a str>,
    relative_to_changelog: Option<bool>,
    inline_name: &str,
    external_name: &str,
) -> Result<Source<'a, T>, ChangeValidationError> {
    match (inline, external_path) {
        (None, None) => Err(ChangeValidationError::new(format!(
            "either {inline_name} or {external_name} must be provided"
        ))),
        (Some(_), Some(_)) => Err(ChangeValidationError::new(format!(
            "only the {inline_name} or the {external_name} can be specified (not both)"
        ))),
        (Some(_), None) if relative_to_changelog.is_some() => Err(ChangeValidationError::new(format!(
            "change.relativeToChangelog is only valid when {external_name} is provided"
        ))),
        (Some(inline), None) => Ok(Source::Inline(inline)),
        (None, Some(path)) => Ok(Source::External {
            path,
            relative: relative_to_changelog == Some(true),
        }),
    }
}
