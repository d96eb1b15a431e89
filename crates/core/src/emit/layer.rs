//! Layer emitter.
//!
//! A pass-through API layer stub exposing every entry point: one
//! function-pointer typedef per call, a dispatch table, and an exported
//! trampoline forwarding into the table. Policies do not narrow this
//! surface; a layer that hides entry points breaks loaders.

use capgen_common::DiagnosticSink;

use crate::model::{Function, Module, Policy};

use super::helpers::{arg_names, cpp_param, cpp_type, render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct LayerEmitter;

impl Emitter for LayerEmitter {
    fn name(&self) -> &'static str {
        "layer"
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
            let params: Vec<String> = f
                .params
                .iter()
                .map(|p| cpp_type(module, p.ty))
                .collect();
            body.push_str(&format!(
                "using PFN_{} = {} (*)({});\n",
                f.name,
                cpp_type(module, f.ret),
                params.join(", ")
            ));
        }
        body.push('\n');

        body.push_str("struct DispatchTable {\n");
        for f in &module.functions {
            body.push_str(&format!("  PFN_{0} {0};\n", f.name));
        }
        body.push_str("};\n\nDispatchTable& GetDispatchTable();\n\n");

        for f in &module.functions {
            let params: Vec<String> = f.params.iter().map(|p| cpp_param(module, p)).collect();
            body.push_str(&format!(
                "extern \"C\" {} Layer_{}({}) {{\n  return GetDispatchTable().{}({});\n}}\n\n",
                cpp_type(module, f.ret),
                f.name,
                params.join(", "),
                f.name,
                arg_names(f)
            ));
        }

        let text = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["<cstdint>"],
            body,
            false,
        )?;
        Ok(vec![Artifact {
            path: unit_path(module, "layer.cpp"),
            text,
        }])
    }
}
