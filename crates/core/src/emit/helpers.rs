//! Read-only rendering helpers shared by the emitters.
//!
//! Signature formatting, parameter iteration with length expansion and
//! chain traversal live here so emitters stay independent of each other.

use crate::model::{Field, Function, LengthExpr, Module, TypeDecl, TypeId, TypeKind};

use super::template::{Context, Template};
use super::EmitError;

/// C++ spelling of a type. Interned declarations already carry their source
/// spelling (`const VkFoo*`), so this is a name lookup.
pub fn cpp_type(module: &Module, id: TypeId) -> String {
    module.type_decl(id).name.clone()
}

/// One parameter/field declaration. Fixed-size arrays put the extent after
/// the name, as C requires.
pub fn cpp_param(module: &Module, field: &Field) -> String {
    let decl = module.type_decl(field.ty);
    if let TypeKind::Array { element, len } = &decl.kind {
        return format!("{} {}[{len}]", cpp_type(module, *element), field.name);
    }
    format!("{} {}", decl.name, field.name)
}

/// `ret name(param, param, …)`.
pub fn signature(module: &Module, function: &Function) -> String {
    let params: Vec<String> = function
        .params
        .iter()
        .map(|p| cpp_param(module, p))
        .collect();
    format!(
        "{} {}({})",
        cpp_type(module, function.ret),
        function.name,
        params.join(", ")
    )
}

/// Comma-separated argument names for a forwarding call.
pub fn arg_names(function: &Function) -> String {
    function
        .params
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// C++ element-count expression for a length annotation, in terms of the
/// surrounding parameter names. `None` for NUL-terminated data, which has
/// no count expression.
pub fn count_expr(function: &Function, length: &LengthExpr) -> Option<String> {
    match length {
        LengthExpr::Literal(n) => Some(n.to_string()),
        LengthExpr::FieldRef(i) => Some(function.params[*i].name.clone()),
        LengthExpr::StrlenOf(i) => Some(format!("strlen({}) + 1", function.params[*i].name)),
        LengthExpr::Product(terms) => {
            let parts: Vec<String> = terms
                .iter()
                .map(|t| count_expr(function, t))
                .collect::<Option<Vec<_>>>()?;
            Some(parts.join(" * "))
        }
        LengthExpr::NullTerminated => None,
    }
}

/// Same, for struct fields (counts reference sibling members through an
/// instance expression such as `v.`).
pub fn field_count_expr(fields: &[Field], instance: &str, length: &LengthExpr) -> Option<String> {
    match length {
        LengthExpr::Literal(n) => Some(n.to_string()),
        LengthExpr::FieldRef(i) => Some(format!("{instance}{}", fields[*i].name)),
        LengthExpr::StrlenOf(i) => {
            Some(format!("strlen({instance}{}) + 1", fields[*i].name))
        }
        LengthExpr::Product(terms) => {
            let parts: Vec<String> = terms
                .iter()
                .map(|t| field_count_expr(fields, instance, t))
                .collect::<Option<Vec<_>>>()?;
            Some(parts.join(" * "))
        }
        LengthExpr::NullTerminated => None,
    }
}

/// Structs worth generating per-struct helpers for (named shapes with
/// fields; synthetic pointer/array declarations are skipped).
pub fn named_structs(module: &Module) -> Vec<(TypeId, &TypeDecl, &Vec<Field>)> {
    module
        .types()
        .filter_map(|(id, decl)| match &decl.kind {
            TypeKind::Struct { fields, .. } if !fields.is_empty() => Some((id, decl, fields)),
            _ => None,
        })
        .collect()
}

const UNIT_TEMPLATE: &str = "\
// Generated by the capgen {{concern}} emitter ({{api}}). Do not edit.
{{#if pragma}}#pragma once

{{/if}}{{#each includes}}#include {{file}}
{{/each}}
namespace {{namespace}} {

{{body}}
} // namespace {{namespace}}
";

/// Render the standard translation-unit skeleton around a body.
pub fn render_unit(
    emitter: &'static str,
    module: &Module,
    namespace: &str,
    includes: &[&str],
    body: String,
    header: bool,
) -> Result<String, EmitError> {
    let template = Template::parse(UNIT_TEMPLATE)
        .map_err(|e| EmitError::template(emitter, "unit skeleton", &e))?;
    let ctx = Context::new()
        .str("concern", emitter)
        .str("api", module.api.dir_name())
        .str("namespace", namespace)
        .str("body", body)
        .flag("pragma", header)
        .list(
            "includes",
            includes
                .iter()
                .map(|i| Context::new().str("file", *i))
                .collect(),
        );
    template
        .render(&ctx)
        .map_err(|e| EmitError::template(emitter, "unit skeleton", &e))
}

/// Logical artifact path for one concern's file.
pub fn unit_path(module: &Module, file: &str) -> String {
    format!("{}/{file}", module.api.dir_name())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_support {
    //! A small Vulkan-flavored module used across emitter tests.

    use capgen_common::DiagnosticSink;

    use crate::emit::builtin_emitters;
    use crate::ingest::registry_xml::parse_registry;
    use crate::model::{ApiFamily, Module};
    use crate::normalize::{normalize, NormalizeOptions};

    pub const TEST_XML: &str = r#"<registry>
  <types>
    <type category="handle">VK_DEFINE_HANDLE(<name>VkDevice</name>)</type>
    <type category="handle">VK_DEFINE_NON_DISPATCHABLE_HANDLE(<name>VkBuffer</name>)</type>
    <type category="struct" name="VkBaseInfo">
      <member values="VK_STRUCTURE_TYPE_BASE"><type>uint32_t</type> <name>sType</name></member>
      <member optional="true"><type>void</type>* <name>pNext</name></member>
      <member><type>uint32_t</type> <name>flags</name></member>
    </type>
    <type category="struct" name="VkExtInfoA" structextends="VkBaseInfo">
      <member values="VK_STRUCTURE_TYPE_EXT_A"><type>uint32_t</type> <name>sType</name></member>
      <member optional="true"><type>void</type>* <name>pNext</name></member>
      <member><type>uint32_t</type> <name>extra</name></member>
    </type>
    <type category="struct" name="VkExtInfoB" structextends="VkBaseInfo">
      <member values="VK_STRUCTURE_TYPE_EXT_B"><type>uint32_t</type> <name>sType</name></member>
      <member optional="true"><type>void</type>* <name>pNext</name></member>
      <member><type>float</type> <name>weight</name></member>
    </type>
  </types>
  <enums name="VkResult" type="enum">
    <enum name="VK_SUCCESS" value="0"/>
    <enum name="VK_NOT_READY" value="1"/>
  </enums>
  <commands>
    <command>
      <proto><type>VkResult</type> <name>vkCreateBuffer</name></proto>
      <param><type>VkDevice</type> <name>device</name></param>
      <param>const <type>VkBaseInfo</type>* <name>pInfo</name></param>
      <param><type>VkBuffer</type>* <name>pBuffer</name></param>
    </command>
    <command>
      <proto><type>void</type> <name>vkDestroyBuffer</name></proto>
      <param><type>VkDevice</type> <name>device</name></param>
      <param><type>VkBuffer</type> <name>buffer</name></param>
    </command>
    <command>
      <proto><type>void</type> <name>vkWriteData</name></proto>
      <param><type>VkBuffer</type> <name>buffer</name></param>
      <param><type>uint32_t</type> <name>count</name></param>
      <param len="count">const <type>int32_t</type>* <name>pValues</name></param>
    </command>
    <command>
      <proto><type>VkResult</type> <name>vkGetResult</name></proto>
      <param><type>VkDevice</type> <name>device</name></param>
      <param><type>VkResult</type>* <name>pResult</name></param>
    </command>
  </commands>
  <feature api="vulkan" name="VK_VERSION_1_0" number="1.0">
    <require>
      <command name="vkCreateBuffer"/>
      <command name="vkDestroyBuffer"/>
    </require>
  </feature>
</registry>"#;

    pub fn test_module() -> Module {
        let raw = parse_registry(TEST_XML.as_bytes(), "test.xml", ApiFamily::Vulkan)
            .unwrap_or_else(|e| unreachable!("test registry must parse: {e:?}"));
        let sink = DiagnosticSink::new();
        normalize(
            &raw,
            &builtin_emitters(),
            &NormalizeOptions::default(),
            &sink,
        )
        .unwrap_or_else(|e| unreachable!("test registry must normalize: {e:?}"))
    }
}
