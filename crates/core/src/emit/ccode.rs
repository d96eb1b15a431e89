//! Ccode emitter.
//!
//! Emits writers that print a capture back out as standalone C++ replay
//! source: the generated program *is* the capture, so there is no stream
//! and no runtime remap table. Handles become compile-time identifiers
//! managed by `CcodeNames`: creation declares a fresh variable, later uses
//! reference it by name.

use capgen_common::DiagnosticSink;

use crate::model::{Direction, Field, Function, Module, Ownership, Policy, TypeKind};

use super::helpers::{render_unit, unit_path};
use super::{Artifact, EmitConfig, EmitError, Emitter};

#[derive(Debug, Clone, Copy)]
pub struct CcodeEmitter;

impl Emitter for CcodeEmitter {
    fn name(&self) -> &'static str {
        "ccode"
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
            if f.policy(self.name()) != Policy::Auto {
                continue;
            }
            body.push_str(&writer_fn(module, f));
        }

        let text = render_unit(
            self.name(),
            module,
            &config.namespace,
            &["<ostream>", "\"serialization.h\"", "\"ccode_names.h\""],
            body,
            true,
        )?;
        Ok(vec![Artifact {
            path: unit_path(module, "ccode.h"),
            text,
        }])
    }
}

fn writer_fn(module: &Module, f: &Function) -> String {
    let mut out = format!(
        "inline void CCode_{0}(std::ostream& out, const {0}_Args& args, CcodeNames& names) {{\n",
        f.name
    );

    // Created handles get a fresh compile-time identifier, declared before
    // the call that fills them in.
    let mut binds = String::new();
    for p in &f.params {
        if p.ownership != Ownership::Created {
            continue;
        }
        if let TypeKind::Pointer { pointee, .. } = module.type_decl(p.ty).kind {
            let handle = &module.type_decl(pointee).name;
            out.push_str(&format!(
                "  const std::string id_{0} = names.Declare(\"{handle}\");\n  out << \"  {handle} \" << id_{0} << \";\\n\";\n",
                p.name
            ));
            binds.push_str(&format!(
                "  names.Bind(*args.{0}, id_{0});\n",
                p.name
            ));
        }
    }

    out.push_str(&format!("  out << \"  {}(\";\n", f.name));
    for (i, p) in f.params.iter().enumerate() {
        if i > 0 {
            out.push_str("  out << \", \";\n");
        }
        out.push_str(&format!("  out << {};\n", arg_expr(module, p)));
    }
    out.push_str("  out << \");\\n\";\n");
    out.push_str(&binds);
    out.push_str("}\n\n");
    out
}

/// Expression printing one argument into the generated replay source.
fn arg_expr(module: &Module, p: &Field) -> String {
    let decl = module.type_decl(p.ty);
    match &decl.kind {
        TypeKind::Handle { .. } => format!("names.Ref(args.{})", p.name),
        TypeKind::Enum { .. } | TypeKind::Bitmask { .. } => format!(
            "CcodeEnum(\"{}\", static_cast<int64_t>(args.{}))",
            decl.name, p.name
        ),
        TypeKind::Pointer { pointee, .. } => {
            if p.ownership == Ownership::Created {
                format!("\"&\" << id_{}", p.name)
            } else if matches!(module.type_decl(*pointee).kind, TypeKind::Handle { .. }) {
                format!("CcodeHandleSlot(names, args.{})", p.name)
            } else if p.direction == Direction::Out {
                format!("CcodeOutSlot(\"{}\")", p.name)
            } else {
                format!("CcodeLiteral(args.{})", p.name)
            }
        }
        TypeKind::Struct { .. } | TypeKind::Union { .. } => {
            format!("CcodeStruct(args.{})", p.name)
        }
        _ => format!("CcodeValue(args.{})", p.name),
    }
}
