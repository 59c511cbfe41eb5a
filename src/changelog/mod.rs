//! Streaming changelog parser and per-change-set pre-validation.

pub mod reader;
pub mod resolver;
mod schema;

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::PathBuf,
};

use crate::{
    action::ValidatedChange,
    changeset::ChangeSet,
    error::{ChangeValidationError, changelog_error},
    types::{CHANGELOG_COLLECTION_NAME, STDIN_SOURCE},
};

use reader::ArrayElements;
use resolver::{ChangelogLocation, DocumentResolver};

/// Produces the reader used for the `-` source.
pub type StdinFactory = Box<dyn Fn() -> Box<dyn Read>>;

/// One element of the changelog stream.
#[derive(Debug)]
pub struct ProcessedChangeSet {
    /// Position of the originating source in the argument list.
    pub source_index: usize,
    /// Source path as given (the working directory for standard input).
    pub path: String,
    /// Resolved location of the source.
    pub location: ChangelogLocation,
    /// The decoded change set or why it could not be decoded.
    pub result: Result<ChangeSet, ChangeValidationError>,
}

/// Turns changelog sources into a lazy stream of change sets.
pub struct ChangelogProcessor {
    resolver: DocumentResolver,
    stdin: StdinFactory,
}

impl ChangelogProcessor {
    /// Processor reading `-` from the process's standard input.
    pub fn new(resolver: DocumentResolver) -> Self {
        Self {
            resolver,
            stdin: Box::new(|| Box::new(io::stdin())),
        }
    }

    /// Replaces the standard input source.
    pub fn with_stdin(mut self, stdin: StdinFactory) -> Self {
        self.stdin = stdin;
        self
    }

    /// Resolver used for changelog paths and external documents.
    pub fn resolver(&self) -> &DocumentResolver {
        &self.resolver
    }

    /// Streams the change sets of `paths` in order.
    ///
    /// With `fail_fast`, the first failing element is yielded as `Err`,
    /// wrapped with its source path, and the stream ends. Otherwise every
    /// element is yielded as `Ok` with its own result.
    ///
    /// A `-` combined with other sources is reported before any source is
    /// opened, and the `-` entries are then left out.
    pub fn process<'a>(&'a self, paths: &[String], fail_fast: bool) -> ChangelogStream<'a> {
        let conflict = if paths.len() > 1 {
            paths
                .iter()
                .position(|path| path == STDIN_SOURCE)
                .map(|index| self.stdin_conflict(index))
        } else {
            None
        };
        ChangelogStream {
            processor: self,
            sources: paths.to_vec(),
            next_source: 0,
            current: None,
            skip_stdin: conflict.is_some(),
            pending: conflict,
            fail_fast,
            done: false,
        }
    }

    fn stdin_conflict(&self, index: usize) -> ProcessedChangeSet {
        ProcessedChangeSet {
            source_index: index,
            path: STDIN_SOURCE.to_string(),
            location: ChangelogLocation::stdin(self.resolver.base_dir().to_path_buf()),
            result: Err(ChangeValidationError::new(format!(
                "Standard input ('{STDIN_SOURCE}') cannot be combined with other change logs at index {}.",
                index + 1
            ))),
        }
    }

    /// Rejects change sets targeting the audit collection, then validates
    /// and fingerprints the change action.
    pub fn pre_validate(
        &self,
        change_set: &ChangeSet,
        location: &ChangelogLocation,
    ) -> Result<ValidatedChange, ChangeValidationError> {
        let id = &change_set.global_unique_change_id;
        if change_set.target_collection == CHANGELOG_COLLECTION_NAME {
            return Err(ChangeValidationError::new(format!(
                "changeSet[globalUniqueChangeId={id}].targetCollection must not be '{CHANGELOG_COLLECTION_NAME}'."
            )));
        }
        change_set
            .change
            .validate(&self.resolver, location)
            .map_err(|err| {
                let message = format!(
                    "changeSet[globalUniqueChangeId={id}] validation error: {}.",
                    err.message()
                );
                err.wrap(message)
            })
    }

    fn open(&self, index: usize, path: &str) -> Result<OpenChangelog, ProcessedChangeSet> {
        let failed = |location: ChangelogLocation, err: ChangeValidationError| ProcessedChangeSet {
            source_index: index,
            path: path.to_string(),
            location,
            result: Err(err),
        };

        if path == STDIN_SOURCE {
            let cwd = self.resolver.base_dir().to_path_buf();
            let location = ChangelogLocation::stdin(cwd.clone());
            log::info!("Reading change log from standard input...");
            let reader: Box<dyn BufRead> = Box::new(BufReader::new((self.stdin)()));
            return Ok(OpenChangelog {
                index,
                path: cwd.display().to_string(),
                location,
                elements: ArrayElements::new(reader),
            });
        }

        let resolved = self.resolver.resolve(None, path);
        let location = ChangelogLocation::file(absolute(resolved.clone()));
        if path.trim().is_empty() {
            return Err(failed(
                location,
                ChangeValidationError::new(format!("Path must not be blank at index {}.", index + 1)),
            ));
        }
        let unreadable = || {
            ChangeValidationError::new(format!(
                "file [{}] is not readable. Ensure the resource exists.",
                location.path().display()
            ))
        };
        if !resolved.is_file() {
            return Err(failed(location.clone(), unreadable()));
        }
        let file = match File::open(&resolved) {
            Ok(file) => file,
            Err(err) => {
                let err = ChangeValidationError::with_cause(unreadable().message().to_string(), err);
                return Err(failed(location, err));
            }
        };
        log::info!("Processing change log file {}", location.path().display());
        let reader: Box<dyn BufRead> = Box::new(BufReader::new(file));
        Ok(OpenChangelog {
            index,
            path: path.to_string(),
            location,
            elements: ArrayElements::new(reader),
        })
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

struct OpenChangelog {
    index: usize,
    path: String,
    location: ChangelogLocation,
    elements: ArrayElements<Box<dyn BufRead>>,
}

/// Lazy, single-pass stream over all sources of one call to
/// [`ChangelogProcessor::process`].
pub struct ChangelogStream<'a> {
    processor: &'a ChangelogProcessor,
    sources: Vec<String>,
    next_source: usize,
    current: Option<OpenChangelog>,
    pending: Option<ProcessedChangeSet>,
    skip_stdin: bool,
    fail_fast: bool,
    done: bool,
}

impl ChangelogStream<'_> {
    fn emit(&mut self, item: ProcessedChangeSet) -> Option<Result<ProcessedChangeSet, ChangeValidationError>> {
        match item.result {
            Err(err) if self.fail_fast => {
                self.done = true;
                self.current = None;
                let message = changelog_error(&item.path, err.message());
                Some(Err(err.wrap(message)))
            }
            result => Some(Ok(ProcessedChangeSet { result, ..item })),
        }
    }
}

impl Iterator for ChangelogStream<'_> {
    type Item = Result<ProcessedChangeSet, ChangeValidationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(conflict) = self.pending.take() {
                return self.emit(conflict);
            }
            if let Some(current) = self.current.as_mut() {
                let position = current.elements.position();
                match current.elements.next() {
                    Some(element) => {
                        let item = ProcessedChangeSet {
                            source_index: current.index,
                            path: current.path.clone(),
                            location: current.location.clone(),
                            result: element.and_then(|value| schema::decode_change_set(value, position)),
                        };
                        return self.emit(item);
                    }
                    None => self.current = None,
                }
            }
            let Some(path) = self.sources.get(self.next_source).cloned() else {
                self.done = true;
                return None;
            };
            let index = self.next_source;
            self.next_source += 1;
            if self.skip_stdin && path == STDIN_SOURCE {
                continue;
            }
            match self.processor.open(index, &path) {
                Ok(open) => self.current = Some(open),
                Err(failed) => return self.emit(failed),
            }
        }
    }
}
