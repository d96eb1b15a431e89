//! The normalized API model.
//!
//! One [`Module`] per API family, produced by the normalize phase and shared
//! read-only by every emitter. All type references are [`TypeId`] handles
//! into the module's arena; nothing in the model owns another declaration,
//! which keeps cyclic struct references representable while the normalizer
//! separately rejects recursive pointee chains.

mod types;

pub use types::{
    EnumConstant, Primitive, SizeClass, TypeDecl, TypeId, TypeKind,
};

use capgen_common::SourceLoc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One supported graphics/compute API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiFamily {
    DirectX,
    Vulkan,
    OpenGl,
    OpenCl,
    LevelZero,
}

impl ApiFamily {
    pub const ALL: [ApiFamily; 5] = [
        ApiFamily::DirectX,
        ApiFamily::Vulkan,
        ApiFamily::OpenGl,
        ApiFamily::OpenCl,
        ApiFamily::LevelZero,
    ];

    /// Directory name used for emitted artifacts.
    pub fn dir_name(self) -> &'static str {
        match self {
            ApiFamily::DirectX => "directx",
            ApiFamily::Vulkan => "vulkan",
            ApiFamily::OpenGl => "opengl",
            ApiFamily::OpenCl => "opencl",
            ApiFamily::LevelZero => "levelzero",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "directx" | "dx" | "d3d12" => Some(ApiFamily::DirectX),
            "vulkan" | "vk" => Some(ApiFamily::Vulkan),
            "opengl" | "gl" => Some(ApiFamily::OpenGl),
            "opencl" | "cl" => Some(ApiFamily::OpenCl),
            "levelzero" | "level-zero" | "l0" | "ze" => Some(ApiFamily::LevelZero),
            _ => None,
        }
    }
}

impl fmt::Display for ApiFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Parameter/field direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// Ownership hint for a parameter/field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    Borrowed,
    Transferred,
    Created,
    Destroyed,
}

/// Bound length-expression AST.
///
/// Field references are parameter indices into the owning function's
/// parameter list; binding guarantees they point at parameters declared
/// before the annotated one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthExpr {
    /// Fixed element count.
    Literal(u64),
    /// Count read from an earlier sibling parameter/field.
    FieldRef(usize),
    /// Count is `strlen` of an earlier sibling string parameter.
    StrlenOf(usize),
    /// Product of sub-expressions (e.g. `width*height`).
    Product(Vec<LengthExpr>),
    /// Bounded by a NUL terminator rather than a count.
    NullTerminated,
}

/// A named function parameter or struct field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
    pub direction: Direction,
    pub optional: bool,
    pub length: Option<LengthExpr>,
    pub ownership: Ownership,
}

/// Function category, derived from registry metadata or name shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Constructor,
    Destructor,
    Command,
    Query,
}

/// Per-emitter generation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Fully generated.
    Auto,
    /// Declaration generated, body hand-written.
    Custom,
    /// Not generated for this concern.
    Skip,
}

impl Policy {
    pub fn as_str(self) -> &'static str {
        match self {
            Policy::Auto => "auto",
            Policy::Custom => "custom",
            Policy::Skip => "skip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Policy::Auto),
            "custom" => Some(Policy::Custom),
            "skip" => Some(Policy::Skip),
            _ => None,
        }
    }
}

/// An API version (`major.minor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `"1.2"`; also accepts feature-style names such as
    /// `"VK_VERSION_1_2"` or `"GL_VERSION_4_6"`.
    pub fn parse(s: &str) -> Option<Self> {
        let tail = s.rsplit_once("VERSION_").map_or(s, |(_, t)| t);
        let (major, minor) = tail.split_once(['.', '_'])?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A normalized API function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub ret: TypeId,
    pub params: Vec<Field>,
    pub category: Category,
    pub introduced_in: Option<Version>,
    pub extensions: Vec<String>,
    /// Policy per registered emitter concern. Normalize guarantees totality:
    /// every registered concern has an entry here, explicit or defaulted.
    pub policies: BTreeMap<String, Policy>,
    pub provenance: SourceLoc,
}

impl Function {
    /// Policy for a concern. Missing entries indicate a normalize bug, so
    /// the conservative answer is to skip generation for that concern.
    pub fn policy(&self, concern: &str) -> Policy {
        self.policies.get(concern).copied().unwrap_or(Policy::Skip)
    }
}

/// A named collection of functions addressed by bulk policy overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub functions: Vec<String>,
}

/// A configuration element from the hand-authored tables, consumed by the
/// `config` emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigElement {
    pub name: String,
    pub ty: String,
    pub default: String,
    pub description: String,
}

/// The normalized model for one API family.
///
/// Constructed once per run by the normalize phase, immutable afterwards and
/// shared read-only by all emitters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub api: ApiFamily,
    pub registry_version: String,
    types: Vec<TypeDecl>,
    by_name: BTreeMap<String, TypeId>,
    pub functions: Vec<Function>,
    pub groups: Vec<Group>,
    pub config_elements: Vec<ConfigElement>,
}

impl Module {
    pub(crate) fn new(api: ApiFamily, registry_version: String) -> Self {
        Self {
            api,
            registry_version,
            types: Vec::new(),
            by_name: BTreeMap::new(),
            functions: Vec::new(),
            groups: Vec::new(),
            config_elements: Vec::new(),
        }
    }

    /// Intern a type declaration, deduplicating by canonical name.
    ///
    /// Structural identity follows from name identity here: ingest reports
    /// duplicate declarations of incompatible shape before this point, so a
    /// name seen twice is the same declaration.
    pub(crate) fn intern(&mut self, decl: TypeDecl) -> TypeId {
        if let Some(&id) = self.by_name.get(&decl.name) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.by_name.insert(decl.name.clone(), id);
        self.types.push(decl);
        id
    }

    pub(crate) fn replace_kind(&mut self, id: TypeId, kind: TypeKind) {
        self.types[id.0 as usize].kind = kind;
    }

    pub fn type_decl(&self, id: TypeId) -> &TypeDecl {
        &self.types[id.0 as usize]
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDecl)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u32), t))
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// True when the type (after stripping pointers) is a handle.
    pub fn is_handle(&self, id: TypeId) -> bool {
        matches!(self.type_decl(self.strip_pointers(id)).kind, TypeKind::Handle { .. })
    }

    /// Follow `pointer-to` links down to the pointee.
    pub fn strip_pointers(&self, mut id: TypeId) -> TypeId {
        while let TypeKind::Pointer { pointee, .. } = self.type_decl(id).kind {
            id = pointee;
        }
        id
    }

    /// Struct types that start an extension chain.
    pub fn chain_heads(&self) -> impl Iterator<Item = (TypeId, &TypeDecl)> {
        self.types().filter(|(_, t)| {
            matches!(t.kind, TypeKind::Struct { chain_head: true, .. })
        })
    }

    /// Struct types that can appear as chain members, with their
    /// structure-type discriminator value.
    pub fn chain_members(&self) -> Vec<(TypeId, &TypeDecl, &str)> {
        self.types()
            .filter_map(|(id, t)| match &t.kind {
                TypeKind::Struct {
                    discriminant: Some(d),
                    ..
                } => Some((id, t, d.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Handle types in arena order.
    pub fn handle_types(&self) -> impl Iterator<Item = (TypeId, &TypeDecl)> {
        self.types()
            .filter(|(_, t)| matches!(t.kind, TypeKind::Handle { .. }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn decl(name: &str, kind: TypeKind) -> TypeDecl {
        TypeDecl {
            name: name.to_string(),
            kind,
            size_class: SizeClass::Known,
            provenance: SourceLoc::internal(),
        }
    }

    #[test]
    fn intern_deduplicates_by_name() {
        let mut module = Module::new(ApiFamily::Vulkan, "1.3".to_string());
        let a = module.intern(decl("VkDevice", TypeKind::Handle { dispatchable: true }));
        let b = module.intern(decl("VkDevice", TypeKind::Handle { dispatchable: true }));
        assert_eq!(a, b);
        assert_eq!(module.type_count(), 1);
    }

    #[test]
    fn strip_pointers_reaches_pointee() {
        let mut module = Module::new(ApiFamily::Vulkan, "1.3".to_string());
        let base = module.intern(decl("uint32_t", TypeKind::Primitive(Primitive::Uint32)));
        let ptr = module.intern(decl(
            "uint32_t*",
            TypeKind::Pointer {
                pointee: base,
                is_const: false,
            },
        ));
        let ptr_ptr = module.intern(decl(
            "uint32_t**",
            TypeKind::Pointer {
                pointee: ptr,
                is_const: false,
            },
        ));
        assert_eq!(module.strip_pointers(ptr_ptr), base);
    }

    #[test]
    fn version_parsing() {
        assert_eq!(Version::parse("1.2"), Some(Version::new(1, 2)));
        assert_eq!(Version::parse("VK_VERSION_1_3"), Some(Version::new(1, 3)));
        assert_eq!(Version::parse("GL_VERSION_4_6"), Some(Version::new(4, 6)));
        assert_eq!(Version::parse("nonsense"), None);
    }

    #[test]
    fn api_family_round_trip() {
        for api in ApiFamily::ALL {
            assert_eq!(ApiFamily::parse(api.dir_name()), Some(api));
        }
        assert_eq!(ApiFamily::parse("ze"), Some(ApiFamily::LevelZero));
    }
}
