//! The capgen generator pipeline.
//!
//! This crate implements a four-layer pipeline that turns API specifications
//! into C++ capture/replay source:
//!
//! 1. `ingest`: parse registry XML, C headers and hand-authored tables into
//!    a loss-free raw description
//! 2. `normalize`: lift the raw description into one immutable [`model::Module`]
//!    per API family
//! 3. `emit`: run the emitter plug-ins over the module, each producing a set
//!    of named artifacts
//! 4. `postprocess`: stage, format, hash and publish the artifacts
//!
//! The pipeline is assembled as values at run start (see [`pipeline::Pipeline`]);
//! there is no global registry. All phases report findings through a shared
//! [`capgen_common::DiagnosticSink`].

pub mod config;
pub mod emit;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod postprocess;
pub mod sdk;

pub use pipeline::{Pipeline, PipelineError, RunSummary};
