//! To-string emitter.
//!
//! Human-readable rendering of enums, bitmasks, structs and whole calls.
//! Logs and the trace emitter compose over these helpers. Unknown enum
//! values render as `<unknown TypeName: N>` so a stale capture never hides
//! a value behind a wrong name.

use capgen_common::DiagnosticSink;

use crate::model::{EnumConstant, Field, Function, Module, Policy, Primitive, TypeKind};

use super::helpers::{cpp_param, render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct ToStringEmitter;

impl Emitter for ToStringEmitter {
    fn name(&self) -> &'static str {
        "to-string"
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
            match &decl.kind {
                TypeKind::Enum { constants, .. } => {
                    body.push_str(&enum_to_string(&decl.name, constants));
                }
                TypeKind::Bitmask { constants, .. } if !constants.is_empty() => {
                    body.push_str(&bitmask_to_string(&decl.name, constants));
                }
                TypeKind::Struct { fields, .. } if !fields.is_empty() => {
                    body.push_str(&struct_to_string(module, &decl.name, fields));
                }
                _ => {}
            }
        }

        for f in &module.functions {
            if f.policy(self.name()) == Policy::Skip {
                continue;
            }
            body.push_str(&call_to_string(module, f));
        }

        let text = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["<string>", "\"to_string_support.h\""],
            body,
            true,
        )?;
        Ok(vec![Artifact {
            path: unit_path(module, "to_string.h"),
            text,
        }])
    }
}

fn enum_to_string(name: &str, constants: &[EnumConstant]) -> String {
    let mut out = format!("inline std::string ToString({name} value) {{\n  switch (value) {{\n");
    // Aliased constants share a value; one case label per value.
    let mut seen = Vec::new();
    for c in constants {
        if seen.contains(&c.value) {
            continue;
        }
        seen.push(c.value);
        out.push_str(&format!("    case {0}: return \"{0}\";\n", c.name));
    }
    out.push_str(&format!(
        "    default:\n      return \"<unknown {name}: \" + std::to_string(static_cast<int64_t>(value)) + \">\";\n  }}\n}}\n\n"
    ));
    out
}

fn bitmask_to_string(name: &str, constants: &[EnumConstant]) -> String {
    let mut out = format!(
        "inline std::string ToString({name} value) {{\n  std::string out;\n"
    );
    let mut seen = Vec::new();
    for c in constants {
        if seen.contains(&c.value) || c.value == 0 {
            continue;
        }
        seen.push(c.value);
        out.push_str(&format!(
            "  if (value & {0}) AppendFlag(out, \"{0}\");\n",
            c.name
        ));
    }
    out.push_str("  return out.empty() ? \"0\" : out;\n}\n\n");
    out
}

fn struct_to_string(module: &Module, name: &str, fields: &[Field]) -> String {
    let mut out = format!(
        "inline std::string ToString(const {name}& value) {{\n  std::string out = \"{name}{{\";\n"
    );
    for (i, field) in fields.iter().enumerate() {
        let sep = if i == 0 { "" } else { ", " };
        out.push_str(&format!(
            "  out += \"{sep}{0}=\" + {1};\n",
            field.name,
            value_expr(module, &format!("value.{}", field.name), field)
        ));
    }
    out.push_str("  out += \"}\";\n  return out;\n}\n\n");
    out
}

/// Expression rendering one value as a `std::string`.
fn value_expr(module: &Module, expr: &str, field: &Field) -> String {
    let decl = module.type_decl(field.ty);
    match &decl.kind {
        TypeKind::Primitive(Primitive::Bool) => format!("std::string({expr} ? \"true\" : \"false\")"),
        TypeKind::Primitive(Primitive::Char) => format!("std::string(1, {expr})"),
        TypeKind::Primitive(_) => format!("std::to_string({expr})"),
        TypeKind::Enum { .. } | TypeKind::Bitmask { .. } | TypeKind::Struct { .. } => {
            format!("ToString({expr})")
        }
        TypeKind::Union { .. } => format!("std::string(\"union:{}\")", decl.name),
        TypeKind::Handle { .. } => format!("HandleToString({expr})"),
        TypeKind::Array { element, len } => {
            let elem = module.type_decl(*element);
            if matches!(elem.kind, TypeKind::Primitive(Primitive::Char)) {
                format!("CStrToString({expr})")
            } else {
                format!("ArrayToString({expr}, {len})")
            }
        }
        TypeKind::Pointer { pointee, .. } => {
            let pointee_decl = module.type_decl(*pointee);
            if matches!(pointee_decl.kind, TypeKind::Primitive(Primitive::Char)) {
                format!("CStrToString({expr})")
            } else {
                format!("PointerToString({expr})")
            }
        }
        TypeKind::FunctionPointer { .. } => format!("PointerToString({expr})"),
    }
}

fn call_to_string(module: &Module, f: &Function) -> String {
    let params: Vec<String> = f.params.iter().map(|p| cpp_param(module, p)).collect();
    let mut out = format!(
        "inline std::string CallToString_{}({}) {{\n  std::string out = \"{}(\";\n",
        f.name,
        params.join(", "),
        f.name
    );
    for (i, p) in f.params.iter().enumerate() {
        if i > 0 {
            out.push_str("  out += \", \";\n");
        }
        out.push_str(&format!("  out += {};\n", value_expr(module, &p.name, p)));
    }
    out.push_str("  out += \")\";\n  return out;\n}\n\n");
    out
}
