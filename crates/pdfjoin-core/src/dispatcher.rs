//! Command Dispatcher
//!
//! Validates a command, drives loader → merge/split → serializer under the
//! configured limits and time budget, and folds every outcome (panics
//! included) into a [`ProcessResult`].

use crate::command::{PdfCommand, ProcessMetrics, ProcessResult};
use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::{LimitKind, PdfJoinError};
use crate::loader;
use crate::merge::merge_with;
use crate::page_tree;
use crate::serializer::serialize;
use crate::signature::{MarkerScan, SignatureDetector};
use crate::split::{resolve_selection, split_with, PageRange};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// A finished document
#[derive(Debug, Clone)]
pub struct Output {
    pub bytes: Vec<u8>,
    pub page_count: u32,
}

pub struct Dispatcher<D = MarkerScan> {
    config: EngineConfig,
    detector: D,
}

impl Dispatcher<MarkerScan> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_detector(config, MarkerScan)
    }
}

impl Default for Dispatcher<MarkerScan> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<D: SignatureDetector> Dispatcher<D> {
    pub fn with_detector(config: EngineConfig, detector: D) -> Self {
        Self { config, detector }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `command` and report the outcome as an envelope. Never panics.
    #[instrument(skip_all, fields(command = command.kind()))]
    pub fn dispatch(&self, command: PdfCommand) -> ProcessResult {
        let start = Instant::now();
        let input_size = command.input_size();
        info!(input_size, "dispatching command");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(command)))
            .unwrap_or_else(|payload| {
                Err(PdfJoinError::SerializationError(format!(
                    "internal error: {}",
                    panic_message(payload.as_ref())
                )))
            });
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                let metrics = ProcessMetrics {
                    input_size_bytes: input_size,
                    output_size_bytes: output.bytes.len(),
                    page_count: output.page_count,
                    processing_time_ms: elapsed_ms,
                };
                info!(
                    input_size,
                    output_size = metrics.output_size_bytes,
                    pages = metrics.page_count,
                    elapsed_ms,
                    "command succeeded"
                );
                ProcessResult::ok(output.bytes, metrics)
            }
            Err(err) => {
                warn!(kind = ?err.kind(), error = %err, elapsed_ms, "command failed");
                ProcessResult::failure(&err)
            }
        }
    }

    /// Parse a JSON command and dispatch it.
    pub fn dispatch_json(&self, json: &str) -> ProcessResult {
        match PdfCommand::from_json(json) {
            Ok(command) => self.dispatch(command),
            Err(err) => {
                warn!(error = %err, "rejected command payload");
                ProcessResult::failure(&err)
            }
        }
    }

    /// Run `command`, returning the output document or the first error.
    pub fn execute(&self, command: PdfCommand) -> Result<Output, PdfJoinError> {
        let deadline = Deadline::new(self.config.time_budget());
        match command {
            PdfCommand::Merge { files } => self.run_merge(files, &deadline),
            PdfCommand::Split { file, ranges } => self.run_split(file, &ranges, &deadline),
        }
    }

    #[instrument(skip_all, fields(sources = files.len()))]
    fn run_merge(&self, files: Vec<Vec<u8>>, deadline: &Deadline) -> Result<Output, PdfJoinError> {
        let limits = &self.config.limits;
        if files.is_empty() {
            return Err(PdfJoinError::NoSources);
        }
        if files.len() > limits.max_sources {
            return Err(PdfJoinError::ResourceLimit {
                index: None,
                limit: LimitKind::Sources,
                actual: files.len() as u64,
                max: limits.max_sources as u64,
            });
        }
        for (index, bytes) in files.iter().enumerate() {
            if self.detector.has_signatures(bytes) {
                return Err(PdfJoinError::SignedDocument { index });
            }
        }

        let mut documents = Vec::with_capacity(files.len());
        let mut total_pages: u64 = 0;
        for (index, bytes) in files.into_iter().enumerate() {
            deadline.check("load")?;
            let doc = loader::load(&bytes, limits).map_err(|e| e.at_source(index))?;
            drop(bytes);

            let pages = page_tree::walk(&doc).map_err(|e| e.at_source(index))?.len() as u64;
            total_pages += pages;
            if total_pages > u64::from(limits.max_pages) {
                return Err(PdfJoinError::ResourceLimit {
                    index: None,
                    limit: LimitKind::Pages,
                    actual: total_pages,
                    max: u64::from(limits.max_pages),
                });
            }
            debug!(index, pages, "source loaded");
            documents.push(doc);
        }

        let merged = merge_with(documents, &self.config.merge, deadline)?;
        deadline.check("serialize")?;
        let bytes = serialize(merged, &self.config.output)?;
        deadline.check("serialize")?;

        Ok(Output {
            bytes,
            page_count: total_pages as u32,
        })
    }

    #[instrument(skip_all, fields(ranges = ranges.len()))]
    fn run_split(
        &self,
        file: Vec<u8>,
        ranges: &[PageRange],
        deadline: &Deadline,
    ) -> Result<Output, PdfJoinError> {
        if self.detector.has_signatures(&file) {
            return Err(PdfJoinError::SignedDocument { index: 0 });
        }

        deadline.check("load")?;
        let doc = loader::load(&file, &self.config.limits)?;
        drop(file);

        let page_count = page_tree::walk(&doc)?.len() as u32;
        let selection = resolve_selection(ranges, page_count)?;
        debug!(source_pages = page_count, selected = selection.len(), "selection resolved");

        let extracted = split_with(doc, ranges, deadline)?;
        deadline.check("serialize")?;
        let bytes = serialize(extracted, &self.config.output)?;
        deadline.check("serialize")?;

        Ok(Output {
            bytes,
            page_count: selection.len() as u32,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
