//! Emit: plug-in emitters over the normalized module.
//!
//! Each emitter implements the small [`Emitter`] contract: a stable concern
//! name, a default-policy rule consulted by normalization, and a pure
//! `emit` that maps a module to named artifacts. Emitters never observe
//! each other; shared rendering lives in [`helpers`] and layout-only text
//! composition in [`template`]. The set is assembled explicitly by
//! [`builtin_emitters`]; there is no global registry.

pub mod helpers;
pub mod template;

mod auxiliary;
mod ccode;
mod configgen;
mod layer;
mod player;
mod recorder;
mod resources;
mod serializer;
mod skipcalls;
mod subcapture;
mod tostring;
mod trace;

use capgen_common::DiagnosticSink;
use thiserror::Error;

use crate::model::{Function, Module, Policy};

pub use auxiliary::{CallbacksEmitter, DmlEmitter, XessEmitter};
pub use ccode::CcodeEmitter;
pub use configgen::ConfigEmitter;
pub use layer::LayerEmitter;
pub use player::PlayerEmitter;
pub use recorder::RecorderEmitter;
pub use resources::ResourceDumpEmitter;
pub use serializer::SerializerEmitter;
pub use skipcalls::SkipCallsEmitter;
pub use subcapture::SubcaptureEmitter;
pub use tostring::ToStringEmitter;
pub use trace::TraceEmitter;

/// One emitted file: logical path (relative to the output root) and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: String,
    pub text: String,
}

/// Emit-phase failure. These indicate a generator bug, not bad user input,
/// and always carry the emitter and declaration context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("emitter `{emitter}`: template error in {context}: {message}")]
    Template {
        emitter: &'static str,
        context: String,
        message: String,
    },

    #[error("emitter `{emitter}`: missing policy for `{function}`")]
    PolicyGap {
        emitter: &'static str,
        function: String,
    },

    #[error("emitter `{emitter}`: invariant violated on `{context}`: {message}")]
    Invariant {
        emitter: &'static str,
        context: String,
        message: String,
    },
}

impl EmitError {
    pub fn template(
        emitter: &'static str,
        context: impl Into<String>,
        error: &template::TemplateError,
    ) -> Self {
        EmitError::Template {
            emitter,
            context: context.into(),
            message: error.to_string(),
        }
    }
}

/// Emitter-facing configuration.
#[derive(Debug, Clone)]
pub struct EmitConfig {
    /// Namespace wrapped around every generated translation unit.
    pub namespace: String,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            namespace: "capture".to_string(),
        }
    }
}

/// The emitter plug-in contract.
pub trait Emitter: std::fmt::Debug + Send + Sync {
    /// Stable concern name; also the policy-map key.
    fn name(&self) -> &'static str;

    /// Default policy for a function without an explicit entry, applied by
    /// normalization with a diagnostic per application.
    fn default_policy(&self, function: &Function) -> Policy;

    /// Produce this concern's artifacts for one module. Must be
    /// deterministic and must not touch the filesystem.
    fn emit(
        &self,
        module: &Module,
        config: &EmitConfig,
        sink: &DiagnosticSink,
    ) -> Result<Vec<Artifact>, EmitError>;
}

/// The full built-in emitter set, in stable order.
pub fn builtin_emitters() -> Vec<Box<dyn Emitter>> {
    vec![
        Box::new(RecorderEmitter),
        Box::new(PlayerEmitter),
        Box::new(SerializerEmitter),
        Box::new(ToStringEmitter),
        Box::new(TraceEmitter),
        Box::new(SkipCallsEmitter),
        Box::new(SubcaptureEmitter),
        Box::new(ResourceDumpEmitter),
        Box::new(LayerEmitter),
        Box::new(DmlEmitter),
        Box::new(XessEmitter),
        Box::new(CallbacksEmitter),
        Box::new(CcodeEmitter),
        Box::new(ConfigEmitter),
    ]
}

/// Look up emitters by name, preserving the built-in order. Unknown names
/// are returned for the caller to report.
pub fn select_emitters(names: &[String]) -> Result<Vec<Box<dyn Emitter>>, Vec<String>> {
    let all = builtin_emitters();
    if names.is_empty() {
        return Ok(all);
    }
    let unknown: Vec<String> = names
        .iter()
        .filter(|n| !all.iter().any(|e| e.name() == n.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(unknown);
    }
    Ok(all
        .into_iter()
        .filter(|e| names.iter().any(|n| n == e.name()))
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_has_unique_stable_names() {
        let emitters = builtin_emitters();
        let names: Vec<_> = emitters.iter().map(|e| e.name()).collect();
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len(), "duplicate emitter names");
        for concern in [
            "recorder",
            "player",
            "serializer",
            "to-string",
            "trace",
            "skip-calls",
            "subcapture",
            "resource-dumping",
            "layer",
            "dml",
            "xess",
            "callbacks",
            "ccode",
            "config",
        ] {
            assert!(names.contains(&concern), "missing emitter `{concern}`");
        }
    }

    #[test]
    fn selection_preserves_builtin_order() {
        let picked =
            select_emitters(&["player".to_string(), "recorder".to_string()]).unwrap();
        let names: Vec<_> = picked.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["recorder", "player"]);
    }

    #[test]
    fn unknown_selection_is_reported() {
        let err = select_emitters(&["recorder".to_string(), "bogus".to_string()]).unwrap_err();
        assert_eq!(err, ["bogus".to_string()]);
    }
}
