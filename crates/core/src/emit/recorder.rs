//! Recorder emitter.
//!
//! Per-function prolog that forwards to the real API, then captures the
//! arguments (the serializer's `Encode_` functions deep-copy pointees using
//! the length annotations) and the return value into the capture stream.
//! Forwarding happens first so `created` output parameters already hold
//! their real values when the record is written.

use capgen_common::DiagnosticSink;

use crate::model::{Category, Function, Module, Policy, Primitive, TypeKind};

use super::helpers::{arg_names, cpp_param, cpp_type, render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct RecorderEmitter;

impl Emitter for RecorderEmitter {
    fn name(&self) -> &'static str {
        "recorder"
    }

    /// Constructors default to hand-written recording (resource creation
    /// usually needs extra bookkeeping); everything else is generated.
    fn default_policy(&self, function: &Function) -> Policy {
        match function.category {
            Category::Constructor => Policy::Custom,
            _ => Policy::Auto,
        }
    }

    fn emit(
        &self,
        module: &Module,
        config: &EmitConfig,
        _sink: &DiagnosticSink,
    ) -> Result<Vec<Artifact>, EmitError> {
        let mut decls = String::new();
        let mut bodies = String::new();

        for f in &module.functions {
            let Some(policy) = f.policies.get(self.name()) else {
                return Err(EmitError::PolicyGap {
                    emitter: self.name(),
                    function: f.name.clone(),
                });
            };
            match policy {
                Policy::Skip => {}
                Policy::Custom => {
                    decls.push_str(&format!(
                        "// Hand-written in recorder_custom.cpp.\n{};\n\n",
                        wrapper_signature(module, f)
                    ));
                }
                Policy::Auto => {
                    decls.push_str(&format!("{};\n", wrapper_signature(module, f)));
                    bodies.push_str(&wrapper_body(module, f));
                }
            }
        }

        let header = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["\"serialization.h\""],
            decls,
            true,
        )?;
        let unit = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["\"recorder.h\"", "\"skip_calls.h\""],
            bodies,
            false,
        )?;
        Ok(vec![
            Artifact {
                path: unit_path(module, "recorder.h"),
                text: header,
            },
            Artifact {
                path: unit_path(module, "recorder.cpp"),
                text: unit,
            },
        ])
    }
}

fn wrapper_signature(module: &Module, f: &Function) -> String {
    let params: Vec<String> = f.params.iter().map(|p| cpp_param(module, p)).collect();
    format!(
        "{} Recorded_{}({})",
        cpp_type(module, f.ret),
        f.name,
        params.join(", ")
    )
}

fn returns_void(module: &Module, f: &Function) -> bool {
    matches!(
        module.type_decl(f.ret).kind,
        TypeKind::Primitive(Primitive::Void)
    )
}

fn wrapper_body(module: &Module, f: &Function) -> String {
    let args = arg_names(f);
    let ret = cpp_type(module, f.ret);
    let mut out = format!("{} {{\n", wrapper_signature(module, f));

    if returns_void(module, f) {
        out.push_str(&format!(
            "  Real_{0}({args});\n  if (ShouldSkipAtRecord(kToken_{0})) {{\n    return;\n  }}\n",
            f.name
        ));
        out.push_str(&format!(
            "  CaptureWriter& w = CaptureStream::Instance().Writer();\n  Encode_{}(w, {args});\n",
            f.name
        ));
    } else {
        out.push_str(&format!(
            "  const {ret} result_ = Real_{0}({args});\n  if (ShouldSkipAtRecord(kToken_{0})) {{\n    return result_;\n  }}\n",
            f.name
        ));
        out.push_str(&format!(
            "  CaptureWriter& w = CaptureStream::Instance().Writer();\n  Encode_{}(w, {args});\n  w.WriteResult(result_);\n",
            f.name
        ));
        out.push_str("  return result_;\n");
    }
    out.push_str("}\n\n");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::helpers::test_support::test_module;
    use super::*;
    use capgen_common::DiagnosticSink;

    fn emit_artifacts() -> Vec<Artifact> {
        let module = test_module();
        let sink = DiagnosticSink::new();
        RecorderEmitter
            .emit(&module, &EmitConfig::default(), &sink)
            .unwrap()
    }

    #[test]
    fn auto_functions_get_forward_then_capture_bodies() {
        let artifacts = emit_artifacts();
        let cpp = &artifacts[1].text;
        // vkWriteData is a plain command: generated in full.
        assert!(cpp.contains(
            "void Recorded_vkWriteData(VkBuffer buffer, uint32_t count, const int32_t* pValues)"
        ));
        assert!(cpp.contains("Real_vkWriteData(buffer, count, pValues);"));
        assert!(cpp.contains("Encode_vkWriteData(w, buffer, count, pValues);"));
    }

    #[test]
    fn constructors_default_to_custom_declaration_only() {
        let artifacts = emit_artifacts();
        let header = &artifacts[0].text;
        let cpp = &artifacts[1].text;
        assert!(header.contains("Recorded_vkCreateBuffer"));
        assert!(header.contains("Hand-written in recorder_custom.cpp."));
        assert!(!cpp.contains("Recorded_vkCreateBuffer("), "custom body must not be generated");
    }

    #[test]
    fn non_void_wrappers_record_the_result() {
        let artifacts = emit_artifacts();
        let cpp = &artifacts[1].text;
        // vkGetResult returns VkResult.
        assert!(cpp.contains("const VkResult result_ = Real_vkGetResult(device, pResult);"));
        assert!(cpp.contains("w.WriteResult(result_);"));
        assert!(cpp.contains("return result_;"));
    }

    #[test]
    fn skip_policy_suppresses_generation() {
        use crate::emit::builtin_emitters;
        use crate::ingest::registry_xml::parse_registry;
        use crate::model::ApiFamily;
        use crate::normalize::{normalize, NormalizeOptions, PolicyOverride};

        let raw = parse_registry(
            super::super::helpers::test_support::TEST_XML.as_bytes(),
            "test.xml",
            ApiFamily::Vulkan,
        )
        .unwrap();
        let sink = DiagnosticSink::new();
        let options = NormalizeOptions {
            overrides: vec![PolicyOverride {
                function: Some("vkWriteData".to_string()),
                group: None,
                concern: "recorder".to_string(),
                policy: "skip".to_string(),
            }],
            groups: Vec::new(),
        };
        let module = normalize(&raw, &builtin_emitters(), &options, &sink).unwrap();
        let artifacts = RecorderEmitter
            .emit(&module, &EmitConfig::default(), &sink)
            .unwrap();
        assert!(!artifacts[0].text.contains("Recorded_vkWriteData"));
        assert!(!artifacts[1].text.contains("Recorded_vkWriteData"));
    }
}
