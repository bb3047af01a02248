use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which admission ceiling was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    InputBytes,
    Objects,
    Pages,
    Sources,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimitKind::InputBytes => "input size in bytes",
            LimitKind::Objects => "object count",
            LimitKind::Pages => "page count",
            LimitKind::Sources => "source count",
        };
        f.write_str(name)
    }
}

/// Error category reported in the result envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    ResourceLimit,
    SignedDocument,
    InvalidRange,
    EmptySelection,
    InvalidCommand,
    SourceUnreadable,
    Serialization,
    Timeout,
}

#[derive(Error, Debug)]
pub enum PdfJoinError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("{}", describe_limit(.index, .limit, .actual, .max))]
    ResourceLimit {
        /// Source that tripped the limit, `None` for aggregate limits
        index: Option<usize>,
        limit: LimitKind,
        actual: u64,
        max: u64,
    },

    #[error("Document {index} carries a digital signature and cannot be modified")]
    SignedDocument { index: usize },

    #[error("Invalid page range {start}-{end}: document has {page_count} pages")]
    InvalidRange {
        start: u32,
        end: u32,
        page_count: u32,
    },

    #[error("Invalid page range: {0}")]
    InvalidRangeSyntax(String),

    #[error("No pages selected")]
    EmptySelection,

    #[error("No documents to merge")]
    NoSources,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Document {index} could not be read: {source}")]
    SourceUnreadable {
        index: usize,
        source: Box<PdfJoinError>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Operation exceeded its {budget_ms} ms budget during {phase}")]
    Timeout { budget_ms: u64, phase: &'static str },
}

fn describe_limit(index: &Option<usize>, limit: &LimitKind, actual: &u64, max: &u64) -> String {
    match index {
        Some(index) => format!(
            "Resource limit exceeded in document {}: {} is {} (max {})",
            index, limit, actual, max
        ),
        None => format!(
            "Resource limit exceeded: {} is {} (max {})",
            limit, actual, max
        ),
    }
}

impl PdfJoinError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PdfJoinError::ParseError(_) => ErrorKind::Parse,
            PdfJoinError::ResourceLimit { .. } => ErrorKind::ResourceLimit,
            PdfJoinError::SignedDocument { .. } => ErrorKind::SignedDocument,
            PdfJoinError::InvalidRange { .. } | PdfJoinError::InvalidRangeSyntax(_) => {
                ErrorKind::InvalidRange
            }
            PdfJoinError::EmptySelection => ErrorKind::EmptySelection,
            PdfJoinError::NoSources | PdfJoinError::InvalidCommand(_) => ErrorKind::InvalidCommand,
            PdfJoinError::SourceUnreadable { .. } => ErrorKind::SourceUnreadable,
            PdfJoinError::SerializationError(_) => ErrorKind::Serialization,
            PdfJoinError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Attribute a loader error to the merge input at `index`.
    ///
    /// Limit violations keep their kind and gain the index; everything else
    /// becomes `SourceUnreadable`.
    pub fn at_source(self, index: usize) -> Self {
        match self {
            PdfJoinError::ResourceLimit {
                limit, actual, max, ..
            } => PdfJoinError::ResourceLimit {
                index: Some(index),
                limit,
                actual,
                max,
            },
            err @ (PdfJoinError::SignedDocument { .. } | PdfJoinError::Timeout { .. }) => err,
            other => PdfJoinError::SourceUnreadable {
                index,
                source: Box::new(other),
            },
        }
    }
}
