//! Subcapture emitter.
//!
//! Bookkeeping for extracting a sub-range of a capture as a self-contained
//! capture. The recorder marks the requested range in-line; the generated
//! tracker follows handle liveness per handle type so the prologue can
//! re-create every handle that is still alive when the cut begins.

use capgen_common::DiagnosticSink;

use crate::model::{Function, Module, Ownership, Policy, TypeKind};

use super::helpers::{render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct SubcaptureEmitter;

impl Emitter for SubcaptureEmitter {
    fn name(&self) -> &'static str {
        "subcapture"
    }

    fn default_policy(&self, _function: &Function) -> Policy {
        Policy::Auto
    }

    fn emit(
        &self,
        module: &Module,
        config: &EmitConfig,
        _sink: &DiagnosticSink,
    ) -> Result<Vec<Artifact>, EmitError> {
        let handles: Vec<&str> = module
            .handle_types()
            .map(|(_, d)| d.name.as_str())
            .collect();

        let mut body = String::from("class SubcaptureTracker {\n public:\n");
        body.push_str(
            "  void OnRangeBegin(uint64_t call_index) { range_begin_ = call_index; }\n  void OnRangeEnd(uint64_t call_index) { range_end_ = call_index; }\n\n",
        );
        for h in &handles {
            body.push_str(&format!(
                "  void OnCreate({h} handle) {{ live_{h}_.insert(handle); }}\n  void OnDestroy({h} handle) {{ live_{h}_.erase(handle); }}\n  const std::set<{h}>& Live_{h}() const {{ return live_{h}_; }}\n\n"
            ));
        }
        body.push_str(" private:\n  uint64_t range_begin_ = 0;\n  uint64_t range_end_ = 0;\n");
        for h in &handles {
            body.push_str(&format!("  std::set<{h}> live_{h}_;\n"));
        }
        body.push_str("};\n\n");

        // Per-call hooks for functions that create or destroy handles.
        for f in &module.functions {
            if f.policy(self.name()) == Policy::Skip {
                continue;
            }
            let mut hook = String::new();
            for p in &f.params {
                match p.ownership {
                    Ownership::Created => {
                        if matches!(module.type_decl(p.ty).kind, TypeKind::Pointer { .. }) {
                            hook.push_str(&format!("  t.OnCreate(*args.{});\n", p.name));
                        }
                    }
                    Ownership::Destroyed => {
                        hook.push_str(&format!("  t.OnDestroy(args.{});\n", p.name));
                    }
                    _ => {}
                }
            }
            if hook.is_empty() {
                continue;
            }
            body.push_str(&format!(
                "inline void SubcaptureHook_{0}(SubcaptureTracker& t, const {0}_Args& args) {{\n{hook}}}\n\n",
                f.name
            ));
        }

        // The prologue re-creates live handles across the cut boundary.
        body.push_str(
            "inline void EmitSubcapturePrologue(const SubcaptureTracker& t, CaptureWriter& w) {\n",
        );
        for h in &handles {
            body.push_str(&format!(
                "  for ({h} handle : t.Live_{h}()) {{\n    w.WriteStateRestore(handle);\n  }}\n"
            ));
        }
        body.push_str("}\n");

        let text = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["<set>", "\"serialization.h\""],
            body,
            true,
        )?;
        Ok(vec![Artifact {
            path: unit_path(module, "subcapture.h"),
            text,
        }])
    }
}
