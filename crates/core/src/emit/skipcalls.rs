//! Skip-calls emitter.
//!
//! Policy-driven suppression of calls at record or replay time. Functions
//! whose `skip-calls` policy is `skip` are baked into a constexpr table;
//! the generated predicate also consults the runtime configuration so
//! users can suppress further calls without regenerating.

use capgen_common::DiagnosticSink;

use crate::model::{Function, Module, Policy};

use super::helpers::{render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct SkipCallsEmitter;

impl Emitter for SkipCallsEmitter {
    fn name(&self) -> &'static str {
        "skip-calls"
    }

    /// Nothing is suppressed unless explicitly configured.
    fn default_policy(&self, _function: &Function) -> Policy {
        Policy::Auto
    }

    fn emit(
        &self,
        module: &Module,
        config: &EmitConfig,
        _sink: &DiagnosticSink,
    ) -> Result<Vec<Artifact>, EmitError> {
        let total = module.functions.len();
        let mut body = format!("constexpr bool kSkipAtRecord[{total}] = {{\n");
        for f in &module.functions {
            let skipped = f.policy(self.name()) == Policy::Skip;
            body.push_str(&format!("  {skipped}, // {}\n", f.name));
        }
        body.push_str("};\n\n");

        body.push_str(&format!(
            "inline bool ShouldSkipAtRecord(uint32_t token) {{\n  if (token < {total} && kSkipAtRecord[token]) {{\n    return true;\n  }}\n  return RuntimeSkipConfig::Instance().Contains(token);\n}}\n\n"
        ));
        body.push_str(
            "inline bool ShouldSkipAtReplay(uint32_t token) {\n  // Record-time and replay-time suppression share one table.\n  return ShouldSkipAtRecord(token);\n}\n",
        );

        let text = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["<cstdint>", "\"skip_config.h\""],
            body,
            true,
        )?;
        Ok(vec![Artifact {
            path: unit_path(module, "skip_calls.h"),
            text,
        }])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::helpers::test_support::TEST_XML;
    use super::*;
    use crate::emit::builtin_emitters;
    use crate::ingest::registry_xml::parse_registry;
    use crate::model::ApiFamily;
    use crate::normalize::{normalize, NormalizeOptions, PolicyOverride};
    use capgen_common::DiagnosticSink;

    #[test]
    fn skip_policy_lands_in_the_table() {
        let raw = parse_registry(TEST_XML.as_bytes(), "test.xml", ApiFamily::Vulkan).unwrap();
        let sink = DiagnosticSink::new();
        let options = NormalizeOptions {
            overrides: vec![PolicyOverride {
                function: Some("vkWriteData".to_string()),
                group: None,
                concern: "skip-calls".to_string(),
                policy: "skip".to_string(),
            }],
            groups: Vec::new(),
        };
        let module = normalize(&raw, &builtin_emitters(), &options, &sink).unwrap();
        let text = SkipCallsEmitter
            .emit(&module, &EmitConfig::default(), &sink)
            .unwrap()[0]
            .text
            .clone();
        assert!(text.contains("true, // vkWriteData"));
        assert!(text.contains("false, // vkCreateBuffer"));
        assert!(text.contains("RuntimeSkipConfig::Instance().Contains(token)"));
    }
}
