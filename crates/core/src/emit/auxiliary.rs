//! Auxiliary emitters for specific subsystems: DirectML, XeSS, and
//! callback dispatch.
//!
//! The first two are thin prefix-scoped forwarding layers over a shared
//! stub generator; callbacks are trampolines that record an application
//! callback invocation before forwarding to the registered real pointer.

use capgen_common::DiagnosticSink;

use crate::model::{Function, Module, Policy, TypeKind};

use super::helpers::{arg_names, cpp_param, cpp_type, render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

/// Forwarding stubs for functions matching a subsystem prefix.
fn subsystem_stubs(
    emitter: &'static str,
    prefixes: &[&str],
    module: &Module,
    config: &EmitConfig,
    file: &str,
) -> Result<Vec<Artifact>, EmitError> {
    let mut body = String::new();
    for f in &module.functions {
        if f.policy(emitter) != Policy::Auto {
            continue;
        }
        if !prefixes.iter().any(|p| f.name.starts_with(p)) {
            continue;
        }
        let params: Vec<String> = f.params.iter().map(|p| cpp_param(module, p)).collect();
        body.push_str(&format!(
            "{} Aux_{}({}) {{\n  return Real_{}({});\n}}\n\n",
            cpp_type(module, f.ret),
            f.name,
            params.join(", "),
            f.name,
            arg_names(f)
        ));
    }
    if body.is_empty() {
        // Subsystem absent from this module; nothing to generate.
        return Ok(Vec::new());
    }
    let text = render_unit(emitter, module, &config.namespace, &["<cstdint>"], body, false)?;
    Ok(vec![Artifact {
        path: unit_path(module, file),
        text,
    }])
}

fn prefix_policy(function: &Function, prefixes: &[&str]) -> Policy {
    if prefixes.iter().any(|p| function.name.starts_with(p)) {
        Policy::Auto
    } else {
        Policy::Skip
    }
}

/// DirectML subsystem stubs.
#[derive(Debug, Clone, Copy)]
pub struct DmlEmitter;

const DML_PREFIXES: &[&str] = &["DML", "IDMLDevice_", "IDMLOperator_"];

impl Emitter for DmlEmitter {
    fn name(&self) -> &'static str {
        "dml"
    }

    fn default_policy(&self, function: &Function) -> Policy {
        prefix_policy(function, DML_PREFIXES)
    }

    fn emit(
        &self,
        module: &Module,
        config: &EmitConfig,
        _sink: &DiagnosticSink,
    ) -> Result<Vec<Artifact>, EmitError> {
        subsystem_stubs(self.name(), DML_PREFIXES, module, config, "dml_aux.cpp")
    }
}

/// XeSS subsystem stubs.
#[derive(Debug, Clone, Copy)]
pub struct XessEmitter;

const XESS_PREFIXES: &[&str] = &["xess"];

impl Emitter for XessEmitter {
    fn name(&self) -> &'static str {
        "xess"
    }

    fn default_policy(&self, function: &Function) -> Policy {
        prefix_policy(function, XESS_PREFIXES)
    }

    fn emit(
        &self,
        module: &Module,
        config: &EmitConfig,
        _sink: &DiagnosticSink,
    ) -> Result<Vec<Artifact>, EmitError> {
        subsystem_stubs(self.name(), XESS_PREFIXES, module, config, "xess_aux.cpp")
    }
}

/// Callback-dispatch trampolines for every function-pointer type.
#[derive(Debug, Clone, Copy)]
pub struct CallbacksEmitter;

impl Emitter for CallbacksEmitter {
    fn name(&self) -> &'static str {
        "callbacks"
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

        for (_, decl) in module.types() {
            let TypeKind::FunctionPointer { ret, params } = &decl.kind else {
                continue;
            };
            let param_list: Vec<String> = params
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{} arg{i}", cpp_type(module, *p)))
                .collect();
            let args: Vec<String> = (0..params.len()).map(|i| format!("arg{i}")).collect();
            let ret_name = cpp_type(module, *ret);
            body.push_str(&format!(
                "static {ret_name} Thunk_{0}({1}) {{\n  CaptureWriter& w = CaptureStream::Instance().Writer();\n  w.BeginCallback(\"{0}\");\n  w.EndCallback();\n  auto real = CallbackRegistry::Instance().Real<{0}>(\"{0}\");\n  return real({2});\n}}\n\n",
                decl.name,
                param_list.join(", "),
                args.join(", ")
            ));
        }

        if body.is_empty() {
            return Ok(Vec::new());
        }
        body.push_str("void RegisterCallbackThunks(CallbackRegistry& registry);\n");

        let text = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["\"capture_stream.h\"", "\"callback_registry.h\""],
            body,
            false,
        )?;
        Ok(vec![Artifact {
            path: unit_path(module, "callbacks.cpp"),
            text,
        }])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::emit::builtin_emitters;
    use crate::ingest::registry_xml::parse_registry;
    use crate::model::ApiFamily;
    use crate::normalize::{normalize, NormalizeOptions};
    use capgen_common::DiagnosticSink;

    #[test]
    fn subsystem_emitters_stay_silent_without_their_prefix() {
        let module = super::super::helpers::test_support::test_module();
        let sink = DiagnosticSink::new();
        assert!(DmlEmitter
            .emit(&module, &EmitConfig::default(), &sink)
            .unwrap()
            .is_empty());
        assert!(XessEmitter
            .emit(&module, &EmitConfig::default(), &sink)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn callback_thunks_cover_function_pointer_types() {
        let xml = r#"<registry>
  <types>
    <type category="funcpointer">typedef void (VKAPI_PTR *<name>PFN_vkFreeCallback</name>)(<type>void</type>* pUserData);</type>
  </types>
</registry>"#;
        let raw = parse_registry(xml.as_bytes(), "cb.xml", ApiFamily::Vulkan).unwrap();
        let sink = DiagnosticSink::new();
        let module = normalize(&raw, &builtin_emitters(), &NormalizeOptions::default(), &sink)
            .unwrap();
        let artifacts = CallbacksEmitter
            .emit(&module, &EmitConfig::default(), &sink)
            .unwrap();
        let text = &artifacts[0].text;
        assert!(text.contains("static void Thunk_PFN_vkFreeCallback(void* arg0)"));
        assert!(text.contains("w.BeginCallback(\"PFN_vkFreeCallback\");"));
        assert!(text.contains("CallbackRegistry::Instance().Real<PFN_vkFreeCallback>"));
    }

    #[test]
    fn xess_prefix_gets_forwarding_stub() {
        let xml = r#"<registry>
  <commands>
    <command>
      <proto><type>void</type> <name>xessSetVelocityScale</name></proto>
      <param><type>float</type> <name>x</name></param>
    </command>
  </commands>
</registry>"#;
        let raw = parse_registry(xml.as_bytes(), "xess.xml", ApiFamily::DirectX).unwrap();
        let sink = DiagnosticSink::new();
        let module = normalize(&raw, &builtin_emitters(), &NormalizeOptions::default(), &sink)
            .unwrap();
        let artifacts = XessEmitter
            .emit(&module, &EmitConfig::default(), &sink)
            .unwrap();
        assert!(artifacts[0].text.contains("void Aux_xessSetVelocityScale(float x)"));
        assert!(artifacts[0].text.contains("return Real_xessSetVelocityScale(x);"));
    }
}
