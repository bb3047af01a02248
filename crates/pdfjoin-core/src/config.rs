//! Engine configuration
//!
//! Admission limits, output layout options and the per-invocation time
//! budget. Every section has defaults, so a partial JSON document (or none
//! at all) yields a usable configuration.

use crate::error::PdfJoinError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the [`Dispatcher`](crate::dispatcher::Dispatcher)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Admission ceilings checked before any document graph is built
    pub limits: Limits,
    /// Output layout and compression
    pub output: SerializeOptions,
    /// Merge-specific behavior
    pub merge: MergeOptions,
    /// Wall-clock budget per invocation in milliseconds (`None` = unbounded)
    pub time_budget_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            output: SerializeOptions::default(),
            merge: MergeOptions::default(),
            time_budget_ms: Some(default_time_budget_ms()),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from a JSON string
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use pdfjoin_core::config::EngineConfig;
    ///
    /// let config = EngineConfig::from_json(r#"{ "limits": { "max_pages": 50 } }"#).unwrap();
    /// assert_eq!(config.limits.max_pages, 50);
    /// ```
    pub fn from_json(s: &str) -> Result<Self, PdfJoinError> {
        serde_json::from_str(s)
            .map_err(|e| PdfJoinError::ParseError(format!("Invalid engine configuration: {}", e)))
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }
}

/// Admission-control ceilings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    /// Maximum size of one input buffer
    pub max_input_bytes: usize,
    /// Maximum number of objects in one input document
    pub max_objects: u32,
    /// Maximum number of pages in one input, and in a merged output
    pub max_pages: u32,
    /// Maximum number of merge inputs
    pub max_sources: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_bytes: 256 * 1024 * 1024,
            max_objects: 2_000_000,
            max_pages: 10_000,
            max_sources: 256,
        }
    }
}

/// Output layout options for the serializer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SerializeOptions {
    /// Unfiltered streams larger than this are Flate-compressed
    pub flate_threshold_bytes: usize,
    /// Pack objects into object streams once the document has at least this
    /// many objects (`None` disables object streams)
    pub object_stream_threshold: Option<usize>,
    /// Objects per object stream
    pub object_stream_capacity: usize,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            flate_threshold_bytes: 256,
            object_stream_threshold: Some(64),
            object_stream_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MergeOptions {
    /// Collapse identical non-embedded standard-14 font dictionaries
    pub share_standard_fonts: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            share_standard_fonts: true,
        }
    }
}

fn default_time_budget_ms() -> u64 {
    30_000
}
