//! Command payloads and the result envelope

use crate::error::{ErrorKind, PdfJoinError};
use crate::split::PageRange;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PdfCommand {
    /// Concatenate `files` in the given order
    Merge { files: Vec<Vec<u8>> },
    /// Extract `ranges` (1-indexed, inclusive) from `file`
    Split {
        file: Vec<u8>,
        ranges: Vec<PageRange>,
    },
}

impl PdfCommand {
    pub fn from_json(s: &str) -> Result<Self, PdfJoinError> {
        serde_json::from_str(s).map_err(|e| PdfJoinError::InvalidCommand(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PdfCommand::Merge { .. } => "merge",
            PdfCommand::Split { .. } => "split",
        }
    }

    /// Total size of the input buffers
    pub fn input_size(&self) -> usize {
        match self {
            PdfCommand::Merge { files } => files.iter().map(Vec::len).sum(),
            PdfCommand::Split { file, .. } => file.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    /// Output PDF, base64-encoded when serialized
    #[serde(serialize_with = "as_base64")]
    pub data: Option<Vec<u8>>,
    pub error: Option<ErrorInfo>,
    pub metrics: Option<ProcessMetrics>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: u32,
    pub processing_time_ms: u64,
}

impl ProcessResult {
    pub fn ok(data: Vec<u8>, metrics: ProcessMetrics) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metrics: Some(metrics),
        }
    }

    pub fn failure(error: &PdfJoinError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorInfo::from(error)),
            metrics: None,
        }
    }

    pub fn to_json(&self) -> Result<String, PdfJoinError> {
        serde_json::to_string(self)
            .map_err(|e| PdfJoinError::SerializationError(format!("Result encoding failed: {}", e)))
    }
}

impl From<&PdfJoinError> for ErrorInfo {
    fn from(error: &PdfJoinError) -> Self {
        Self {
            kind: error.kind(),
            detail: error.to_string(),
        }
    }
}

fn as_base64<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match data {
        Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}
