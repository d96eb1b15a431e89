//! Resource-dumping emitter.
//!
//! Emits code that captures the contents of resources (buffers, images,
//! descriptor payloads) at configured points: every function carrying a
//! counted pointer parameter gets a `Dump_` helper that writes the pointed
//! data to the dump sink, element by element, driven by the bound length
//! expression.

use capgen_common::DiagnosticSink;

use crate::model::{Category, Function, LengthExpr, Module, Policy, TypeKind};

use super::helpers::{count_expr, render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct ResourceDumpEmitter;

impl Emitter for ResourceDumpEmitter {
    fn name(&self) -> &'static str {
        "resource-dumping"
    }

    /// Dump points default to data-carrying calls; lifecycle functions have
    /// nothing to dump.
    fn default_policy(&self, function: &Function) -> Policy {
        match function.category {
            Category::Constructor | Category::Destructor => Policy::Skip,
            _ => Policy::Auto,
        }
    }

    fn emit(
        &self,
        module: &Module,
        config: &EmitConfig,
        _sink: &DiagnosticSink,
    ) -> Result<Vec<Artifact>, EmitError> {
        let mut body = String::new();

        for f in &module.functions {
            if f.policy(self.name()) != Policy::Auto {
                continue;
            }
            let mut dumps = String::new();
            for p in &f.params {
                let Some(length) = &p.length else { continue };
                if matches!(length, LengthExpr::NullTerminated) {
                    continue;
                }
                if !matches!(module.type_decl(p.ty).kind, TypeKind::Pointer { .. }) {
                    continue;
                }
                let Some(count) = count_expr(f, length) else {
                    continue;
                };
                let count = prefix_args(&count, f);
                dumps.push_str(&format!(
                    "  sink.BeginRegion(\"{0}.{1}\");\n  for (uint32_t i_ = 0; i_ < {count}; ++i_) {{\n    sink.WriteElement(args.{1}[i_]);\n  }}\n  sink.EndRegion();\n",
                    f.name, p.name
                ));
            }
            if dumps.is_empty() {
                continue;
            }
            body.push_str(&format!(
                "inline void Dump_{0}(ResourceDumpSink& sink, const {0}_Args& args) {{\n{dumps}}}\n\n",
                f.name
            ));
        }

        let text = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["\"serialization.h\"", "\"resource_sink.h\""],
            body,
            true,
        )?;
        Ok(vec![Artifact {
            path: unit_path(module, "resource_dump.h"),
            text,
        }])
    }
}

/// Count expressions reference parameters through the decoded bundle.
fn prefix_args(count: &str, f: &Function) -> String {
    let mut out = count.to_string();
    for p in &f.params {
        if out == p.name {
            return format!("args.{out}");
        }
        out = out.replace(&format!("{} ", p.name), &format!("args.{} ", p.name));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::helpers::test_support::test_module;
    use super::*;
    use capgen_common::DiagnosticSink;

    #[test]
    fn counted_buffers_get_dump_helpers() {
        let module = test_module();
        let sink = DiagnosticSink::new();
        let text = ResourceDumpEmitter
            .emit(&module, &EmitConfig::default(), &sink)
            .unwrap()[0]
            .text
            .clone();
        assert!(text.contains("inline void Dump_vkWriteData(ResourceDumpSink& sink, const vkWriteData_Args& args)"));
        assert!(text.contains("for (uint32_t i_ = 0; i_ < args.count; ++i_)"));
        assert!(text.contains("sink.WriteElement(args.pValues[i_]);"));
        // Lifecycle functions produce no dump helper.
        assert!(!text.contains("Dump_vkCreateBuffer"));
        assert!(!text.contains("Dump_vkDestroyBuffer"));
    }
}
