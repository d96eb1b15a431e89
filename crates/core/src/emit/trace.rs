//! Trace emitter.
//!
//! A textual log emitter composed over the to-string helpers: one
//! `Trace_<fn>` per call that renders the call and writes it to the trace
//! stream. No rendering tables are duplicated here; everything routes
//! through `CallToString_*`.

use capgen_common::DiagnosticSink;

use crate::model::{Function, Module, Policy};

use super::helpers::{arg_names, cpp_param, render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct TraceEmitter;

impl Emitter for TraceEmitter {
    fn name(&self) -> &'static str {
        "trace"
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
        let mut body = String::new();
        for f in &module.functions {
            match f.policy(self.name()) {
                Policy::Skip => continue,
                Policy::Custom => {
                    let params: Vec<String> =
                        f.params.iter().map(|p| cpp_param(module, p)).collect();
                    body.push_str(&format!(
                        "// Hand-written in trace_custom.cpp.\nvoid Trace_{}(std::ostream& os, {});\n\n",
                        f.name,
                        params.join(", ")
                    ));
                }
                Policy::Auto => {
                    let params: Vec<String> =
                        f.params.iter().map(|p| cpp_param(module, p)).collect();
                    body.push_str(&format!(
                        "inline void Trace_{0}(std::ostream& os, {1}) {{\n  os << \"[{2}] \" << CallToString_{0}({3}) << '\\n';\n}}\n\n",
                        f.name,
                        params.join(", "),
                        module.api.dir_name(),
                        arg_names(f)
                    ));
                }
            }
        }

        let text = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["<ostream>", "\"to_string.h\""],
            body,
            true,
        )?;
        Ok(vec![Artifact {
            path: unit_path(module, "trace.h"),
            text,
        }])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::helpers::test_support::test_module;
    use super::*;
    use capgen_common::DiagnosticSink;

    #[test]
    fn trace_composes_over_to_string() {
        let module = test_module();
        let sink = DiagnosticSink::new();
        let text = TraceEmitter
            .emit(&module, &EmitConfig::default(), &sink)
            .unwrap()[0]
            .text
            .clone();
        assert!(text.contains("inline void Trace_vkWriteData(std::ostream& os,"));
        assert!(text.contains("CallToString_vkWriteData(buffer, count, pValues)"));
        assert!(text.contains("#include \"to_string.h\""));
        // No rendering logic of its own.
        assert!(!text.contains("std::to_string"));
    }
}
