//! Player emitter.
//!
//! Per-function decoder that reads the tagged record, reconstructs the
//! arguments, remaps capture-time handles to replay-time identity and
//! invokes the real API. Remap tables are per handle type, so values can
//! never alias across types: `created` outputs insert a mapping,
//! `destroyed` inputs remove one, every other handle input is a lookup.

use capgen_common::DiagnosticSink;

use crate::model::{
    Direction, Field, Function, Module, Ownership, Policy, Primitive, TypeKind,
};

use super::helpers::{cpp_type, render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct PlayerEmitter;

impl Emitter for PlayerEmitter {
    fn name(&self) -> &'static str {
        "player"
    }

    /// Replay has no constructor special case: handle registration is fully
    /// mechanical, so everything defaults to generated code.
    fn default_policy(&self, _function: &Function) -> Policy {
        Policy::Auto
    }

    fn emit(
        &self,
        module: &Module,
        config: &EmitConfig,
        _sink: &DiagnosticSink,
    ) -> Result<Vec<Artifact>, EmitError> {
        let mut header = String::new();
        header.push_str("struct ReplayContext {\n");
        for (_, decl) in module.handle_types() {
            header.push_str(&format!(
                "  HandleMap<{0}> remap_{0};\n",
                decl.name
            ));
        }
        header.push_str("};\n\nvoid ReplayCall(uint32_t token, CaptureReader& r, ReplayContext& ctx);\n");

        let mut bodies = String::new();
        let mut dispatch = String::from(
            "void ReplayCall(uint32_t token, CaptureReader& r, ReplayContext& ctx) {\n  switch (token) {\n",
        );

        for f in &module.functions {
            let Some(policy) = f.policies.get(self.name()) else {
                return Err(EmitError::PolicyGap {
                    emitter: self.name(),
                    function: f.name.clone(),
                });
            };
            match policy {
                Policy::Skip => continue,
                Policy::Custom => {
                    bodies.push_str(&format!(
                        "// Hand-written in player_custom.cpp.\nvoid Replay_{}(CaptureReader& r, ReplayContext& ctx);\n\n",
                        f.name
                    ));
                }
                Policy::Auto => bodies.push_str(&replay_body(module, f)),
            }
            dispatch.push_str(&format!(
                "    case kToken_{0}:\n      Replay_{0}(r, ctx);\n      break;\n",
                f.name
            ));
        }
        dispatch.push_str(
            "    default:\n      CAPGEN_LOG_WARN(\"unknown call token %u\", token);\n      break;\n  }\n}\n",
        );
        bodies.push_str(&dispatch);

        Ok(vec![
            Artifact {
                path: unit_path(module, "player.h"),
                text: render_unit(
                    self.name(),
                    module,
                    &config.namespace,
                    &["\"serialization.h\"", "\"handle_map.h\""],
                    header,
                    true,
                )?,
            },
            Artifact {
                path: unit_path(module, "player.cpp"),
                text: render_unit(
                    self.name(),
                    module,
                    &config.namespace,
                    &["\"player.h\""],
                    bodies,
                    false,
                )?,
            },
        ])
    }
}

fn returns_void(module: &Module, f: &Function) -> bool {
    matches!(
        module.type_decl(f.ret).kind,
        TypeKind::Primitive(Primitive::Void)
    )
}

/// The handle type a `created` output parameter points at.
fn created_handle<'m>(module: &'m Module, field: &Field) -> Option<&'m str> {
    if field.ownership != Ownership::Created {
        return None;
    }
    match module.type_decl(field.ty).kind {
        TypeKind::Pointer { pointee, .. } => {
            match module.type_decl(pointee).kind {
                TypeKind::Handle { .. } => Some(module.type_decl(pointee).name.as_str()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn replay_body(module: &Module, f: &Function) -> String {
    let mut out = format!(
        "static void Replay_{0}(CaptureReader& r, ReplayContext& ctx) {{\n  {0}_Args args;\n  Decode_{0}(r, args);\n",
        f.name
    );
    if !returns_void(module, f) {
        out.push_str(&format!(
            "  const {0} recorded_ = r.ReadResult<{0}>();\n",
            cpp_type(module, f.ret)
        ));
    }

    let mut epilogue = String::new();
    for p in &f.params {
        let decl = module.type_decl(p.ty);
        // Direct handle argument.
        if matches!(decl.kind, TypeKind::Handle { .. }) {
            match p.ownership {
                Ownership::Destroyed => {
                    out.push_str(&format!(
                        "  const {0} captured_{1} = args.{1};\n  args.{1} = ctx.remap_{0}.Lookup(args.{1});\n",
                        decl.name, p.name
                    ));
                    epilogue.push_str(&format!(
                        "  ctx.remap_{0}.Remove(captured_{1});\n",
                        decl.name, p.name
                    ));
                }
                _ if p.direction != Direction::Out => {
                    out.push_str(&format!(
                        "  args.{1} = ctx.remap_{0}.Lookup(args.{1});\n",
                        decl.name, p.name
                    ));
                }
                _ => {}
            }
            continue;
        }
        // Created handle behind an output pointer.
        if let Some(handle) = created_handle(module, p) {
            out.push_str(&format!(
                "  const {handle} captured_{0} = *args.{0};\n  {handle} live_{0}{{}};\n  args.{0} = &live_{0};\n",
                p.name
            ));
            epilogue.push_str(&format!(
                "  ctx.remap_{handle}.Insert(captured_{0}, live_{0});\n",
                p.name
            ));
        }
    }

    let args: Vec<String> = f.params.iter().map(|p| format!("args.{}", p.name)).collect();
    if returns_void(module, f) {
        out.push_str(&format!("  {}({});\n", f.name, args.join(", ")));
    } else {
        out.push_str(&format!(
            "  const {0} actual_ = {1}({2});\n  CAPGEN_CHECK_RESULT(recorded_, actual_);\n",
            cpp_type(module, f.ret),
            f.name,
            args.join(", ")
        ));
    }
    out.push_str(&epilogue);
    out.push_str("}\n\n");
    out
}
