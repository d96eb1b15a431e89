//! Config emitter.
//!
//! Emits the configuration schema binding from the hand-authored element
//! tables: a plain struct with one member per element, defaults applied in
//! the initializer, and a loader that reads each element from the store by
//! its dotted path.

use capgen_common::{DiagnosticSink, Phase};

use crate::model::{Function, Module, Policy};

use super::helpers::{render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct ConfigEmitter;

impl Emitter for ConfigEmitter {
    fn name(&self) -> &'static str {
        "config"
    }

    fn default_policy(&self, _function: &Function) -> Policy {
        Policy::Auto
    }

    fn emit(
        &self,
        module: &Module,
        config: &EmitConfig,
        sink: &DiagnosticSink,
    ) -> Result<Vec<Artifact>, EmitError> {
        if module.config_elements.is_empty() {
            return Ok(Vec::new());
        }

        let mut body = String::from("struct Configuration {\n");
        for e in &module.config_elements {
            if !e.description.is_empty() {
                body.push_str(&format!("  // {}\n", e.description));
            }
            let default = render_default(&e.ty, &e.default);
            body.push_str(&format!(
                "  {} {} = {default};\n",
                cpp_element_type(&e.ty),
                member_name(&e.name)
            ));
        }
        body.push_str("};\n\n");

        body.push_str("inline Configuration LoadConfiguration(const ConfigStore& store) {\n  Configuration c;\n");
        for e in &module.config_elements {
            body.push_str(&format!(
                "  c.{} = store.Get<{}>(\"{}\", c.{});\n",
                member_name(&e.name),
                cpp_element_type(&e.ty),
                e.name,
                member_name(&e.name)
            ));
        }
        body.push_str("  return c;\n}\n");

        sink.info(
            Phase::Emit,
            format!(
                "configuration binding covers {} element(s)",
                module.config_elements.len()
            ),
        );

        let text = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["<cstdint>", "<string>", "\"config_store.h\""],
            body,
            true,
        )?;
        Ok(vec![Artifact {
            path: unit_path(module, "config_bindings.h"),
            text,
        }])
    }
}

/// `Capture.Frames` → `capture_frames`.
fn member_name(element: &str) -> String {
    let mut out = String::with_capacity(element.len());
    for (i, c) in element.chars().enumerate() {
        if c == '.' || c == '-' {
            out.push('_');
        } else if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                // Word boundary only when the previous source char was
                // lowercase (`CaptureFrames` → `capture_frames`).
                if element
                    .chars()
                    .nth(i - 1)
                    .is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
                {
                    out.push('_');
                }
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn cpp_element_type(ty: &str) -> String {
    match ty {
        "string" => "std::string".to_string(),
        other => other.to_string(),
    }
}

fn render_default(ty: &str, default: &str) -> String {
    match ty {
        "string" => format!("\"{default}\""),
        "bool" => {
            if default == "true" {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        _ if default.is_empty() => "{}".to_string(),
        _ => default.to_string(),
    }
}
