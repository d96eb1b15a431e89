//! Execution-serialization emitter.
//!
//! Defines the wire format of the tagged call record: one token constant
//! per function, per-struct codecs, per-function argument codecs and the
//! extension-chain walker. Pointer parameters with a length annotation
//! serialize as a count prefix followed by that many elements; NUL-bounded
//! strings use the dedicated string form; nested pointees recurse (the
//! model guarantees the pointee graph is acyclic).

use capgen_common::{DiagnosticSink, Phase};

use crate::model::{Direction, Field, Function, LengthExpr, Module, Policy, TypeKind};

use super::helpers::{self, cpp_type, field_count_expr, named_structs, render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct SerializerEmitter;

impl Emitter for SerializerEmitter {
    fn name(&self) -> &'static str {
        "serializer"
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
        let mut body = String::new();

        // Call tokens, one per function in source order.
        for (token, f) in module.functions.iter().enumerate() {
            body.push_str(&format!(
                "constexpr uint32_t kToken_{} = {token};\n",
                f.name
            ));
        }
        body.push_str("constexpr uint32_t kChainEnd = 0xFFFFFFFFu;\n\n");

        // Argument bundles.
        for f in &module.functions {
            if f.policy(self.name()) == Policy::Skip {
                continue;
            }
            body.push_str(&args_struct(module, f));
        }

        // Struct codecs and the chain walker are mutually recursive
        // (struct fields walk chains, chains decode member structs), so
        // every codec is forward-declared first.
        let structs = named_structs(module);
        let has_chains = module.chain_heads().next().is_some();
        for (_, decl, _) in &structs {
            body.push_str(&format!(
                "inline void EncodeStruct(CaptureWriter& w, const {0}& v);\ninline void DecodeStruct(CaptureReader& r, {0}& v);\n",
                decl.name
            ));
        }
        if has_chains {
            body.push_str(
                "inline void EncodeChain(CaptureWriter& w, const void* chain);\ninline void* DecodeChain(CaptureReader& r);\n",
            );
        }
        body.push('\n');

        for (_, decl, fields) in &structs {
            body.push_str(&struct_codec(module, &decl.name, fields));
        }

        if has_chains {
            body.push_str(&chain_walker(module, sink));
        }

        for f in &module.functions {
            if f.policy(self.name()) == Policy::Skip {
                continue;
            }
            body.push_str(&function_codec(module, f));
        }

        let text = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["<cstdint>", "<cstring>", "\"capture_stream.h\""],
            body,
            true,
        )?;
        Ok(vec![Artifact {
            path: unit_path(module, "serialization.h"),
            text,
        }])
    }
}

/// The decoded-argument bundle for one call.
fn args_struct(module: &Module, f: &Function) -> String {
    let mut out = format!("struct {}_Args {{\n", f.name);
    for p in &f.params {
        out.push_str(&format!("  {};\n", helpers::cpp_param(module, p)));
    }
    out.push_str("};\n\n");
    out
}

/// Encode/decode pair for a named struct.
fn struct_codec(module: &Module, name: &str, fields: &[Field]) -> String {
    let mut out = format!("inline void EncodeStruct(CaptureWriter& w, const {name}& v) {{\n");
    for field in fields {
        if field.name == "pNext" {
            out.push_str("  EncodeChain(w, v.pNext);\n");
            continue;
        }
        out.push_str(&encode_value(
            module,
            &format!("v.{}", field.name),
            field,
            fields,
            "v.",
        ));
    }
    out.push_str("}\n\n");

    out.push_str(&format!(
        "inline void DecodeStruct(CaptureReader& r, {name}& v) {{\n"
    ));
    for field in fields {
        if field.name == "pNext" {
            out.push_str("  v.pNext = DecodeChain(r);\n");
            continue;
        }
        out.push_str(&decode_value(module, &format!("v.{}", field.name), field));
    }
    out.push_str("}\n\n");
    out
}

/// Encode statement(s) for one value. `instance` prefixes sibling-field
/// references in count expressions (`"v."` inside structs, `""` for bare
/// parameters).
fn encode_value(
    module: &Module,
    expr: &str,
    field: &Field,
    siblings: &[Field],
    instance: &str,
) -> String {
    let decl = module.type_decl(field.ty);
    match &decl.kind {
        TypeKind::Handle { .. } => format!("  w.WriteHandle({expr});\n"),
        TypeKind::Enum { underlying, .. } | TypeKind::Bitmask { underlying, .. } => format!(
            "  w.Write(static_cast<{}>({expr}));\n",
            underlying.cpp_name()
        ),
        TypeKind::Struct { .. } => format!("  EncodeStruct(w, {expr});\n"),
        TypeKind::Union { .. } => format!("  w.WriteRaw(&{expr}, sizeof({expr}));\n"),
        TypeKind::Array { element, len } => {
            let elem = module.type_decl(*element);
            if matches!(elem.kind, TypeKind::Struct { .. }) {
                format!("  for (uint32_t i_ = 0; i_ < {len}; ++i_) EncodeStruct(w, {expr}[i_]);\n")
            } else {
                format!("  w.WriteRaw({expr}, sizeof({expr}));\n")
            }
        }
        TypeKind::Pointer { pointee, .. } => {
            let pointee_decl = module.type_decl(*pointee);
            match &field.length {
                Some(LengthExpr::NullTerminated) => format!("  w.WriteCString({expr});\n"),
                Some(length) => {
                    let count = field_count_expr(siblings, instance, length)
                        .unwrap_or_else(|| "1".to_string());
                    let elem_write = if matches!(pointee_decl.kind, TypeKind::Struct { .. }) {
                        format!("EncodeStruct(w, {expr}[i_]);")
                    } else {
                        format!("w.Write({expr}[i_]);")
                    };
                    format!(
                        "  w.WriteCount({count});\n  for (uint32_t i_ = 0; i_ < {count}; ++i_) {elem_write}\n",
                    )
                }
                None => match &pointee_decl.kind {
                    TypeKind::Primitive(p) if p.cpp_name() == "void" => {
                        format!("  w.WriteOpaquePointer({expr});\n")
                    }
                    TypeKind::Handle { .. } => format!("  w.WriteHandle(*{expr});\n"),
                    TypeKind::Struct { .. } => format!(
                        "  w.WriteBool({expr} != nullptr);\n  if ({expr}) EncodeStruct(w, *{expr});\n"
                    ),
                    _ => format!(
                        "  w.WriteBool({expr} != nullptr);\n  if ({expr}) w.Write(*{expr});\n"
                    ),
                },
            }
        }
        TypeKind::Primitive(_) | TypeKind::FunctionPointer { .. } => {
            format!("  w.Write({expr});\n")
        }
    }
}

/// Decode statement(s) for one value. Counts are read back from the
/// stream, so no sibling context is needed.
fn decode_value(module: &Module, expr: &str, field: &Field) -> String {
    let decl = module.type_decl(field.ty);
    match &decl.kind {
        TypeKind::Handle { .. } => format!("  r.ReadHandle({expr});\n"),
        TypeKind::Enum { underlying, .. } | TypeKind::Bitmask { underlying, .. } => format!(
            "  {expr} = static_cast<{}>(r.Read<{}>());\n",
            decl.name,
            underlying.cpp_name()
        ),
        TypeKind::Struct { .. } => format!("  DecodeStruct(r, {expr});\n"),
        TypeKind::Union { .. } => format!("  r.ReadRaw(&{expr}, sizeof({expr}));\n"),
        TypeKind::Array { element, len } => {
            let elem = module.type_decl(*element);
            if matches!(elem.kind, TypeKind::Struct { .. }) {
                format!("  for (uint32_t i_ = 0; i_ < {len}; ++i_) DecodeStruct(r, {expr}[i_]);\n")
            } else {
                format!("  r.ReadRaw({expr}, sizeof({expr}));\n")
            }
        }
        TypeKind::Pointer { pointee, .. } => {
            let pointee_decl = module.type_decl(*pointee);
            let elem_type = cpp_type(module, *pointee);
            match &field.length {
                Some(LengthExpr::NullTerminated) => format!("  {expr} = r.ReadCString();\n"),
                Some(_) => {
                    let elem_read = if matches!(pointee_decl.kind, TypeKind::Struct { .. }) {
                        "DecodeStruct(r, p_[i_]);".to_string()
                    } else {
                        format!("p_[i_] = r.Read<{elem_type}>();")
                    };
                    format!(
                        "  {{\n    const uint32_t n_ = r.ReadCount();\n    auto* p_ = r.Alloc<{elem_type}>(n_);\n    for (uint32_t i_ = 0; i_ < n_; ++i_) {elem_read}\n    {expr} = p_;\n  }}\n",
                    )
                }
                None => match &pointee_decl.kind {
                    TypeKind::Primitive(p) if p.cpp_name() == "void" => {
                        format!("  {expr} = r.ReadOpaquePointer();\n")
                    }
                    TypeKind::Handle { .. } => format!(
                        "  {{\n    auto* p_ = r.Alloc<{elem_type}>(1);\n    r.ReadHandle(*p_);\n    {expr} = p_;\n  }}\n",
                    ),
                    TypeKind::Struct { .. } => format!(
                        "  if (r.ReadBool()) {{\n    auto* p_ = r.Alloc<{elem_type}>(1);\n    DecodeStruct(r, *p_);\n    {expr} = p_;\n  }} else {{\n    {expr} = nullptr;\n  }}\n",
                    ),
                    _ => format!(
                        "  if (r.ReadBool()) {{\n    auto* p_ = r.Alloc<{elem_type}>(1);\n    *p_ = r.Read<{elem_type}>();\n    {expr} = p_;\n  }} else {{\n    {expr} = nullptr;\n  }}\n",
                    ),
                },
            }
        }
        TypeKind::Primitive(_) | TypeKind::FunctionPointer { .. } => {
            format!("  {expr} = r.Read<{}>();\n", decl.name)
        }
    }
}

/// Runtime chain walker: serialize known extension structs by switching on
/// the structure-type discriminator; pass unknown members through opaquely
/// with a warn-once per structure-type.
fn chain_walker(module: &Module, sink: &DiagnosticSink) -> String {
    let members = module.chain_members();
    let mut out = String::from(
        "struct ChainHeader {\n  uint32_t sType;\n  const void* pNext;\n};\n\n\
inline void EncodeChain(CaptureWriter& w, const void* chain) {\n\
  auto* node = static_cast<const ChainHeader*>(chain);\n\
  while (node != nullptr) {\n    switch (node->sType) {\n",
    );
    for (_, decl, discriminant) in &members {
        out.push_str(&format!(
            "      case {discriminant}:\n        w.Write(node->sType);\n        EncodeStruct(w, *reinterpret_cast<const {}*>(node));\n        break;\n",
            decl.name
        ));
    }
    out.push_str(
        "      default:\n\
        // Unknown chain member: passed through opaquely, one warning per\n\
        // structure-type.\n\
        if (WarnUnknownChainMemberOnce(node->sType)) {\n\
          CAPGEN_LOG_WARN(\"unknown chain member sType=%u\", node->sType);\n\
        }\n\
        w.Write(node->sType);\n\
        w.WriteOpaqueChainMember(node);\n\
        break;\n    }\n    node = static_cast<const ChainHeader*>(node->pNext);\n  }\n  w.Write(kChainEnd);\n}\n\n",
    );

    out.push_str(
        "inline void* DecodeChain(CaptureReader& r) {\n\
  void* head = nullptr;\n  void** tail = &head;\n\
  for (uint32_t sType = r.Read<uint32_t>(); sType != kChainEnd; sType = r.Read<uint32_t>()) {\n\
    switch (sType) {\n",
    );
    for (_, decl, discriminant) in &members {
        out.push_str(&format!(
            "      case {discriminant}: {{\n        auto* p_ = r.Alloc<{0}>(1);\n        DecodeStruct(r, *p_);\n        *tail = p_;\n        tail = const_cast<void**>(&reinterpret_cast<ChainHeader*>(p_)->pNext);\n        break;\n      }}\n",
            decl.name
        ));
    }
    out.push_str(
        "      default:\n        *tail = r.ReadOpaqueChainMember(sType);\n        tail = const_cast<void**>(&static_cast<ChainHeader*>(*tail)->pNext);\n        break;\n    }\n  }\n  *tail = nullptr;\n  return head;\n}\n\n",
    );

    sink.info(
        Phase::Emit,
        format!(
            "chain walker covers {} known member struct(s) for {}",
            members.len(),
            module.api
        ),
    );
    out
}

/// Encode/decode pair for one function's arguments.
fn function_codec(module: &Module, f: &Function) -> String {
    let params: Vec<String> = f
        .params
        .iter()
        .map(|p| helpers::cpp_param(module, p))
        .collect();
    let mut out = format!(
        "inline void Encode_{}(CaptureWriter& w, {}) {{\n  w.BeginCall(kToken_{});\n",
        f.name,
        params.join(", "),
        f.name
    );
    for p in &f.params {
        if p.direction == Direction::Out && p.length.is_none() {
            // Outputs are recorded after the real call returned; at this
            // point the pointee already holds the result value.
            out.push_str(&encode_out_value(module, p));
            continue;
        }
        out.push_str(&encode_value(module, &p.name, p, &f.params, ""));
    }
    out.push_str("  w.EndCall();\n}\n\n");

    out.push_str(&format!(
        "inline void Decode_{0}(CaptureReader& r, {0}_Args& args) {{\n",
        f.name
    ));
    for p in &f.params {
        if p.direction == Direction::Out && p.length.is_none() {
            out.push_str(&decode_out_value(module, p));
            continue;
        }
        out.push_str(&decode_value(module, &format!("args.{}", p.name), p));
    }
    out.push_str("}\n\n");
    out
}

/// Mirror of [`encode_out_value`]: outputs are present unconditionally on
/// the wire, so no presence flag is read.
fn decode_out_value(module: &Module, p: &Field) -> String {
    match module.type_decl(p.ty).kind {
        TypeKind::Pointer { pointee, .. } => {
            let elem = cpp_type(module, pointee);
            if matches!(module.type_decl(pointee).kind, TypeKind::Handle { .. }) {
                format!(
                    "  {{\n    auto* p_ = r.Alloc<{elem}>(1);\n    r.ReadHandle(*p_);\n    args.{0} = p_;\n  }}\n",
                    p.name
                )
            } else {
                format!(
                    "  {{\n    auto* p_ = r.Alloc<{elem}>(1);\n    *p_ = r.Read<{elem}>();\n    args.{0} = p_;\n  }}\n",
                    p.name
                )
            }
        }
        _ => format!("  args.{0} = r.Read<{1}>();\n", p.name, cpp_type(module, p.ty)),
    }
}

fn encode_out_value(module: &Module, p: &Field) -> String {
    match module.type_decl(p.ty).kind {
        TypeKind::Pointer { pointee, .. } => {
            if matches!(module.type_decl(pointee).kind, TypeKind::Handle { .. }) {
                format!("  w.WriteHandle(*{});\n", p.name)
            } else {
                format!("  w.Write(*{});\n", p.name)
            }
        }
        _ => format!("  w.Write({});\n", p.name),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::helpers::test_support::test_module;
    use super::*;
    use capgen_common::DiagnosticSink;

    fn emit_text() -> String {
        let module = test_module();
        let sink = DiagnosticSink::new();
        let artifacts = SerializerEmitter
            .emit(&module, &EmitConfig::default(), &sink)
            .unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].path, "vulkan/serialization.h");
        artifacts[0].text.clone()
    }

    #[test]
    fn counted_pointer_serializes_with_length_prefix() {
        let text = emit_text();
        // vkWriteData(buffer, count, pValues len=count): count prefix then
        // `count` elements.
        assert!(text.contains("w.WriteCount(count);"));
        assert!(text.contains("for (uint32_t i_ = 0; i_ < count; ++i_) w.Write(pValues[i_]);"));
        // Decoder reconstructs the same buffer shape.
        assert!(text.contains("const uint32_t n_ = r.ReadCount();"));
        assert!(text.contains("r.Alloc<int32_t>(n_)"));
    }

    #[test]
    fn tokens_are_stable_source_order() {
        let text = emit_text();
        assert!(text.contains("constexpr uint32_t kToken_vkCreateBuffer = 0;"));
        assert!(text.contains("constexpr uint32_t kToken_vkDestroyBuffer = 1;"));
        assert!(text.contains("constexpr uint32_t kToken_vkWriteData = 2;"));
    }

    #[test]
    fn chain_walker_switches_on_discriminator_and_warns_once() {
        let text = emit_text();
        assert!(text.contains("case VK_STRUCTURE_TYPE_EXT_A:"));
        assert!(text.contains("case VK_STRUCTURE_TYPE_EXT_B:"));
        assert!(text.contains("WarnUnknownChainMemberOnce(node->sType)"));
        assert!(text.contains("w.WriteOpaqueChainMember(node);"));
    }

    #[test]
    fn struct_codec_recurses_through_chain_member_field() {
        let text = emit_text();
        assert!(text.contains("inline void EncodeStruct(CaptureWriter& w, const VkBaseInfo& v)"));
        assert!(text.contains("EncodeChain(w, v.pNext);"));
    }

    #[test]
    fn created_handle_output_is_recorded_after_the_call() {
        let text = emit_text();
        assert!(text.contains("w.WriteHandle(*pBuffer);"));
    }

    #[test]
    fn handles_use_handle_forms() {
        let text = emit_text();
        assert!(text.contains("w.WriteHandle(device);"));
        assert!(text.contains("r.ReadHandle(args.device);"));
    }
}
