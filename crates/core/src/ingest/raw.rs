//! The raw description tree.
//!
//! Ingest output mirrors the source format: names and length expressions
//! stay textual, values stay unevaluated strings, and source order is
//! preserved. Interpretation happens in normalize, never here.

use crate::model::ApiFamily;
use capgen_common::SourceLoc;

/// A textual type reference as spelled in the source.
///
/// `const VkFoo**` becomes `base: "VkFoo", pointers: [Const, Mut]`, outermost
/// pointer last. Fixed-size arrays keep their extent textual (`"4"`,
/// `"VK_UUID_SIZE"`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTypeRef {
    pub base: String,
    pub pointers: Vec<PointerConst>,
    pub array_len: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerConst {
    Const,
    Mut,
}

impl RawTypeRef {
    pub fn plain(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            pointers: Vec::new(),
            array_len: None,
        }
    }

    pub fn pointer(base: impl Into<String>, is_const: bool) -> Self {
        Self {
            base: base.into(),
            pointers: vec![if is_const {
                PointerConst::Const
            } else {
                PointerConst::Mut
            }],
            array_len: None,
        }
    }
}

/// A struct member or command parameter, annotations still textual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMember {
    pub name: String,
    pub ty: RawTypeRef,
    /// Verbatim length expression (`"count"`, `"null-terminated"`,
    /// `"width*height"`).
    pub len: Option<String>,
    pub optional: bool,
    /// Direction annotation where the source carries one (`"in"`, `"out"`,
    /// `"inout"`); absent for XML registries, which leave direction to
    /// normalization.
    pub direction: Option<String>,
    /// Ownership annotation (`"created"`, `"destroyed"`, `"transferred"`).
    pub ownership: Option<String>,
    /// Structure-type discriminator carried by `sType`-style members.
    pub values: Option<String>,
    pub loc: SourceLoc,
}

impl RawMember {
    pub fn new(name: impl Into<String>, ty: RawTypeRef, loc: SourceLoc) -> Self {
        Self {
            name: name.into(),
            ty,
            len: None,
            optional: false,
            direction: None,
            ownership: None,
            values: None,
            loc,
        }
    }
}

/// A type declaration as found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawType {
    pub name: String,
    pub kind: RawTypeKind,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTypeKind {
    /// `typedef uint32_t VkFlags;` or registry alias.
    Alias { target: String },
    /// Flags typedef tied to a bits enum block (`VkAccessFlags` over
    /// `VkAccessFlagBits`).
    Bitmask {
        underlying: String,
        bits: Option<String>,
    },
    Handle {
        dispatchable: bool,
    },
    Struct {
        members: Vec<RawMember>,
        is_union: bool,
        /// `structextends` attribute: the chain heads this struct extends.
        extends: Vec<String>,
    },
    FunctionPointer {
        ret: RawTypeRef,
        params: Vec<RawTypeRef>,
    },
    /// Forward declaration or platform type with no recoverable shape.
    Opaque,
}

/// One constant, value kept textual (`"0"`, `"0x7FFFFFFF"`, `"(~0U)"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConstant {
    pub name: String,
    pub value: String,
    pub groups: Vec<String>,
    pub loc: SourceLoc,
}

/// An `<enums>` block or enum table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEnumBlock {
    pub name: String,
    pub bitmask: bool,
    pub underlying: Option<String>,
    pub constants: Vec<RawConstant>,
    pub loc: SourceLoc,
}

/// A command/function declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub name: String,
    pub ret: RawTypeRef,
    pub params: Vec<RawMember>,
    /// Explicit category annotation where the source carries one.
    pub category: Option<String>,
    /// COM interface the method belongs to, for vtable-derived commands.
    pub interface: Option<String>,
    pub loc: SourceLoc,
}

/// A `<feature>` block: a core version requiring a set of commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeature {
    pub name: String,
    /// Version number as spelled (`"1.1"`).
    pub number: String,
    pub commands: Vec<String>,
    pub loc: SourceLoc,
}

/// An `<extension>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtension {
    pub name: String,
    pub commands: Vec<String>,
    pub loc: SourceLoc,
}

/// A configuration element from the hand-authored tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfigElement {
    pub name: String,
    pub ty: String,
    pub default: String,
    pub description: String,
    pub loc: SourceLoc,
}

/// One item in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawItem {
    Type(RawType),
    Enums(RawEnumBlock),
    Command(RawCommand),
    Feature(RawFeature),
    Extension(RawExtension),
    Constant(RawConstant),
    ConfigElement(RawConfigElement),
}

/// The complete raw description of one API family's inputs.
#[derive(Debug, Clone)]
pub struct RawRegistry {
    pub api: ApiFamily,
    /// Registry version string when the source declares one.
    pub version: String,
    pub items: Vec<RawItem>,
}

impl RawRegistry {
    pub fn new(api: ApiFamily) -> Self {
        Self {
            api,
            version: String::new(),
            items: Vec::new(),
        }
    }

    pub fn commands(&self) -> impl Iterator<Item = &RawCommand> {
        self.items.iter().filter_map(|i| match i {
            RawItem::Command(c) => Some(c),
            _ => None,
        })
    }

    pub fn types(&self) -> impl Iterator<Item = &RawType> {
        self.items.iter().filter_map(|i| match i {
            RawItem::Type(t) => Some(t),
            _ => None,
        })
    }
}
