//! Hand-authored table ingestion (OpenCL constants, configuration elements).
//!
//! Tables are TOML documents holding structured declarations keyed by name.
//! They carry explicit annotations (direction, ownership, category) that the
//! machine-readable sources cannot express, so no inference happens here.
//!
//! ```toml
//! version = "3.0"
//!
//! [[constant]]
//! name = "CL_SUCCESS"
//! value = "0"
//!
//! [[type]]
//! name = "cl_context"
//! kind = "handle"
//!
//! [[function]]
//! name = "clReleaseContext"
//! ret = "cl_int"
//! category = "destructor"
//!
//! [[function.param]]
//! name = "context"
//! type = "cl_context"
//! ownership = "destroyed"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use capgen_common::SourceLoc;

use super::raw::{
    RawCommand, RawConfigElement, RawConstant, RawEnumBlock, RawItem, RawMember, RawRegistry,
    RawType, RawTypeKind, RawTypeRef,
};
use super::{Findings, IngestError};
use crate::model::ApiFamily;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TableDoc {
    #[serde(default)]
    version: String,
    #[serde(default, rename = "constant")]
    constants: Vec<TableConstant>,
    #[serde(default, rename = "enum")]
    enums: Vec<TableEnum>,
    #[serde(default, rename = "type")]
    types: Vec<TableType>,
    #[serde(default, rename = "function")]
    functions: Vec<TableFunction>,
    #[serde(default, rename = "element")]
    elements: Vec<TableElement>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableConstant {
    name: String,
    value: String,
    #[serde(default)]
    groups: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableEnum {
    name: String,
    #[serde(default)]
    bitmask: bool,
    #[serde(default)]
    underlying: Option<String>,
    #[serde(default, rename = "constant")]
    constants: Vec<TableConstant>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableType {
    name: String,
    kind: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    dispatchable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableFunction {
    name: String,
    ret: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, rename = "param")]
    params: Vec<TableParam>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableParam {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    len: Option<String>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    ownership: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableElement {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    default: String,
    #[serde(default)]
    description: String,
}

/// Parse a table file.
pub fn parse_table_file(path: &Path, api: ApiFamily) -> Result<RawRegistry, Vec<IngestError>> {
    let file = path.display().to_string();
    match fs::read_to_string(path) {
        Ok(source) => parse_table_source(&source, &file, api),
        Err(err) => Err(vec![IngestError::MissingDependency {
            loc: SourceLoc::new(file.clone(), 0),
            message: format!("cannot read table: {err}"),
        }]),
    }
}

/// Parse table source text.
pub fn parse_table_source(
    source: &str,
    file: &str,
    api: ApiFamily,
) -> Result<RawRegistry, Vec<IngestError>> {
    let mut findings = Findings::new();
    let doc: TableDoc = match toml::from_str(source) {
        Ok(doc) => doc,
        Err(err) => {
            let line = err
                .span()
                .map(|span| source[..span.start.min(source.len())].lines().count() as u32)
                .unwrap_or(0);
            findings.syntax(SourceLoc::new(file, line), err.message().to_string());
            return findings.into_result(RawRegistry::new(api));
        }
    };

    let mut registry = RawRegistry::new(api);
    registry.version = doc.version;
    // TOML spans are not tracked per item; the file-level location is enough
    // for table diagnostics since names are unique.
    let loc = SourceLoc::new(file, 0);

    for c in doc.constants {
        registry.items.push(RawItem::Constant(RawConstant {
            name: c.name,
            value: c.value,
            groups: c.groups,
            loc: loc.clone(),
        }));
    }

    for e in doc.enums {
        registry.items.push(RawItem::Enums(RawEnumBlock {
            name: e.name,
            bitmask: e.bitmask,
            underlying: e.underlying,
            constants: e
                .constants
                .into_iter()
                .map(|c| RawConstant {
                    name: c.name,
                    value: c.value,
                    groups: c.groups,
                    loc: loc.clone(),
                })
                .collect(),
            loc: loc.clone(),
        }));
    }

    for t in doc.types {
        let kind = match t.kind.as_str() {
            "handle" => RawTypeKind::Handle {
                dispatchable: t.dispatchable,
            },
            "alias" => match t.target {
                Some(target) => RawTypeKind::Alias { target },
                None => {
                    findings.syntax(
                        loc.clone(),
                        format!("alias type `{}` without a target", t.name),
                    );
                    continue;
                }
            },
            "opaque" => RawTypeKind::Opaque,
            other => {
                findings.syntax(
                    loc.clone(),
                    format!("unknown table type kind `{other}` on `{}`", t.name),
                );
                continue;
            }
        };
        registry.items.push(RawItem::Type(RawType {
            name: t.name,
            kind,
            loc: loc.clone(),
        }));
    }

    for f in doc.functions {
        let params = f
            .params
            .into_iter()
            .map(|p| {
                let mut member =
                    RawMember::new(p.name, parse_table_type_ref(&p.ty), loc.clone());
                member.len = p.len;
                member.optional = p.optional;
                member.direction = p.direction;
                member.ownership = p.ownership;
                member
            })
            .collect();
        registry.items.push(RawItem::Command(RawCommand {
            name: f.name,
            ret: parse_table_type_ref(&f.ret),
            params,
            category: f.category,
            interface: None,
            loc: loc.clone(),
        }));
    }

    for e in doc.elements {
        registry.items.push(RawItem::ConfigElement(RawConfigElement {
            name: e.name,
            ty: e.ty,
            default: e.default,
            description: e.description,
            loc: loc.clone(),
        }));
    }

    findings.into_result(registry)
}

/// Table type spellings reuse C syntax (`"const char*"`).
fn parse_table_type_ref(text: &str) -> RawTypeRef {
    use super::raw::PointerConst;
    let mut base = String::new();
    let mut pointers = Vec::new();
    let mut pending_const = false;
    let spaced = text.replace('*', " * ");
    for token in spaced.split_whitespace() {
        match token {
            "const" => pending_const = true,
            "*" => {
                pointers.push(if pending_const {
                    PointerConst::Const
                } else {
                    PointerConst::Mut
                });
                pending_const = false;
            }
            ident => {
                if base.is_empty() {
                    base = ident.to_string();
                }
            }
        }
    }
    RawTypeRef {
        base,
        pointers,
        array_len: None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::raw::PointerConst;

    const CL_TABLE: &str = r#"
version = "3.0"

[[constant]]
name = "CL_SUCCESS"
value = "0"

[[constant]]
name = "CL_DEVICE_NOT_FOUND"
value = "-1"

[[type]]
name = "cl_context"
kind = "handle"

[[type]]
name = "cl_mem"
kind = "handle"

[[function]]
name = "clCreateBuffer"
ret = "cl_mem"
category = "constructor"

[[function.param]]
name = "context"
type = "cl_context"

[[function.param]]
name = "size"
type = "size_t"

[[function.param]]
name = "host_ptr"
type = "const void*"
len = "size"
optional = true

[[element]]
name = "Capture.Frames"
type = "uint32_t"
default = "0"
description = "Number of frames to capture."
"#;

    #[test]
    fn parses_opencl_table() {
        let registry =
            parse_table_source(CL_TABLE, "cl_tables.toml", ApiFamily::OpenCl).unwrap();
        assert_eq!(registry.version, "3.0");

        let commands: Vec<_> = registry.commands().collect();
        assert_eq!(commands.len(), 1);
        let f = commands[0];
        assert_eq!(f.name, "clCreateBuffer");
        assert_eq!(f.category.as_deref(), Some("constructor"));
        assert_eq!(f.params[2].len.as_deref(), Some("size"));
        assert!(f.params[2].optional);
        assert_eq!(f.params[2].ty.pointers, vec![PointerConst::Const]);

        let elements = registry
            .items
            .iter()
            .filter(|i| matches!(i, RawItem::ConfigElement(_)))
            .count();
        assert_eq!(elements, 1);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = parse_table_source(
            "[[constant]]\nname = \"X\"\nvalue = \"1\"\nbogus = true\n",
            "t.toml",
            ApiFamily::OpenCl,
        )
        .unwrap_err();
        assert!(matches!(err[0], IngestError::Syntax { .. }));
    }

    #[test]
    fn rejects_unknown_type_kind() {
        let err = parse_table_source(
            "[[type]]\nname = \"X\"\nkind = \"widget\"\n",
            "t.toml",
            ApiFamily::OpenCl,
        )
        .unwrap_err();
        assert!(err[0].to_string().contains("widget"));
    }
}
