//! PDF Split and Merge operations
//!
//! Structural merge and split over `lopdf`'s object model. Documents are
//! rebuilt from scratch: merge remaps every source into one ID space, split
//! copies only what the selected pages reach. Content streams are never
//! interpreted.
//!
//! The [`Dispatcher`] is the entry point for hosts; `merge_documents` and
//! `split_document` are byte-level shortcuts with default configuration.

pub mod command;
pub mod config;
pub mod deadline;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod loader;
pub mod merge;
pub mod outline;
pub mod page_tree;
pub mod resolver;
pub mod serializer;
pub mod signature;
pub mod split;

#[cfg(test)]
mod fixtures;

pub use command::{ErrorInfo, PdfCommand, ProcessMetrics, ProcessResult};
pub use config::{EngineConfig, Limits, MergeOptions, SerializeOptions};
pub use deadline::Deadline;
pub use dispatcher::{Dispatcher, Output};
pub use error::{ErrorKind, LimitKind, PdfJoinError};
pub use merge::merge;
pub use serializer::serialize;
pub use signature::{MarkerScan, SignatureDetector};
pub use split::{split, PageRange};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, PdfJoinError> {
    let doc = loader::load(bytes, &Limits::default())?;
    Ok(page_tree::walk(&doc)?.len() as u32)
}

/// Parse a page range string like "1-3, 5, 8-10" into ranges, in order.
///
/// Overlaps are kept; split resolves them.
pub fn parse_ranges(input: &str) -> Result<Vec<PageRange>, PdfJoinError> {
    let mut ranges = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start = parse_page(start, "start")?;
            let end = parse_page(end, "end")?;
            if start > end {
                return Err(PdfJoinError::InvalidRangeSyntax(format!(
                    "Start {} > end {}",
                    start, end
                )));
            }
            ranges.push(PageRange::new(start, end));
        } else {
            ranges.push(PageRange::single(parse_page(part, "page")?));
        }
    }

    if ranges.is_empty() {
        return Err(PdfJoinError::InvalidRangeSyntax(format!(
            "No pages in {:?}",
            input
        )));
    }
    Ok(ranges)
}

fn parse_page(text: &str, what: &str) -> Result<u32, PdfJoinError> {
    let text = text.trim();
    text.parse()
        .map_err(|_| PdfJoinError::InvalidRangeSyntax(format!("Invalid {}: {}", what, text)))
}

/// Merge whole documents in order with the default configuration.
pub fn merge_documents(documents: Vec<Vec<u8>>) -> Result<Vec<u8>, PdfJoinError> {
    Dispatcher::default()
        .execute(PdfCommand::Merge { files: documents })
        .map(|output| output.bytes)
}

/// Extract `ranges` from one document with the default configuration.
pub fn split_document(bytes: &[u8], ranges: Vec<PageRange>) -> Result<Vec<u8>, PdfJoinError> {
    Dispatcher::default()
        .execute(PdfCommand::Split {
            file: bytes.to_vec(),
            ranges,
        })
        .map(|output| output.bytes)
}
