//! Ingest: API specifications to raw descriptions.
//!
//! Each API family has a dedicated parser producing a [`raw::RawRegistry`]
//! that mirrors its source format:
//!
//! - `registry_xml`: Khronos XML registries (Vulkan, OpenGL)
//! - `header`: C headers through a small preprocessor and declaration parser
//!   (DirectX, Level Zero)
//! - `tables`: hand-authored TOML tables (OpenCL constants, configuration
//!   elements)
//!
//! Responsibility is purely syntactic. Every parser collects all findings
//! before failing so the user sees the complete list, and unknown constructs
//! are reported with their location, never skipped silently.

pub mod header;
pub mod raw;
pub mod registry_xml;
pub mod tables;

use capgen_common::SourceLoc;
use thiserror::Error;

/// A single ingest finding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// Unparseable input.
    #[error("{loc}: syntax error: {message}")]
    Syntax { loc: SourceLoc, message: String },

    /// Unresolved include or import.
    #[error("{loc}: missing dependency: {message}")]
    MissingDependency { loc: SourceLoc, message: String },

    /// Duplicate declaration of incompatible shape.
    #[error("{loc}: ambiguous declaration of `{name}`: {message}")]
    Ambiguous {
        loc: SourceLoc,
        name: String,
        message: String,
    },
}

impl IngestError {
    pub fn loc(&self) -> &SourceLoc {
        match self {
            IngestError::Syntax { loc, .. }
            | IngestError::MissingDependency { loc, .. }
            | IngestError::Ambiguous { loc, .. } => loc,
        }
    }
}

/// Accumulates findings across one parse so the phase can report them all.
#[derive(Debug, Default)]
pub struct Findings {
    errors: Vec<IngestError>,
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: IngestError) {
        self.errors.push(error);
    }

    pub fn syntax(&mut self, loc: SourceLoc, message: impl Into<String>) {
        self.errors.push(IngestError::Syntax {
            loc,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consume the accumulator: `Ok(value)` when clean, otherwise every
    /// finding sorted by location.
    pub fn into_result<T>(mut self, value: T) -> Result<T, Vec<IngestError>> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            self.errors.sort_by(|a, b| a.loc().cmp(b.loc()));
            Err(self.errors)
        }
    }
}
