//! Type declarations and the closed type universe.
//!
//! The kind variants form a closed set: an ingest parser that encounters a
//! construct outside this universe reports it as an error instead of leaving
//! a stringly-typed placeholder for emitters to branch on.

use super::Field;
use capgen_common::SourceLoc;
use serde::{Deserialize, Serialize};

/// Handle into a [`super::Module`]'s type arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TypeId(pub(crate) u32);

/// Size/alignment classification of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    /// Size known and identical on all targets.
    Known,
    /// No size information (forward-declared, handle payloads).
    Opaque,
    /// Size depends on the target platform (pointer-sized integers).
    Platform,
}

/// Built-in scalar types with fixed C++ spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Void,
    Bool,
    Char,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
    /// Pointer-sized unsigned integer (`size_t`).
    Size,
}

impl Primitive {
    pub fn cpp_name(self) -> &'static str {
        match self {
            Primitive::Void => "void",
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::Int8 => "int8_t",
            Primitive::Int16 => "int16_t",
            Primitive::Int32 => "int32_t",
            Primitive::Int64 => "int64_t",
            Primitive::Uint8 => "uint8_t",
            Primitive::Uint16 => "uint16_t",
            Primitive::Uint32 => "uint32_t",
            Primitive::Uint64 => "uint64_t",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Size => "size_t",
        }
    }

    /// Map a C spelling to a primitive, if it is one.
    pub fn from_c_name(name: &str) -> Option<Self> {
        let p = match name {
            "void" => Primitive::Void,
            "bool" | "BOOL" | "VkBool32" | "GLboolean" | "cl_bool" => Primitive::Bool,
            "char" | "GLchar" => Primitive::Char,
            "int8_t" => Primitive::Int8,
            "int16_t" | "short" => Primitive::Int16,
            "int32_t" | "int" | "INT" | "GLint" | "cl_int" => Primitive::Int32,
            "int64_t" | "LONGLONG" | "GLint64" | "cl_long" => Primitive::Int64,
            "uint8_t" | "BYTE" | "GLubyte" | "cl_uchar" => Primitive::Uint8,
            "uint16_t" | "WORD" | "GLushort" => Primitive::Uint16,
            "uint32_t" | "UINT" | "DWORD" | "GLuint" | "GLenum" | "GLbitfield" | "cl_uint" => {
                Primitive::Uint32
            }
            "uint64_t" | "UINT64" | "GLuint64" | "cl_ulong" | "VkDeviceSize" => Primitive::Uint64,
            "float" | "FLOAT" | "GLfloat" | "cl_float" => Primitive::Float,
            "double" | "GLdouble" | "cl_double" => Primitive::Double,
            "size_t" | "SIZE_T" | "GLsizeiptr" => Primitive::Size,
            _ => return None,
        };
        Some(p)
    }

    pub fn size_class(self) -> SizeClass {
        match self {
            Primitive::Size => SizeClass::Platform,
            Primitive::Void => SizeClass::Opaque,
            _ => SizeClass::Known,
        }
    }
}

/// An enum constant, possibly belonging to bitmask groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumConstant {
    pub name: String,
    pub value: i64,
    pub groups: Vec<String>,
}

/// The closed type universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Primitive(Primitive),
    Enum {
        underlying: Primitive,
        constants: Vec<EnumConstant>,
    },
    Bitmask {
        underlying: Primitive,
        constants: Vec<EnumConstant>,
    },
    Struct {
        fields: Vec<Field>,
        /// True when the struct carries a discriminated-next pointer and can
        /// start an extension chain.
        chain_head: bool,
        /// Structure-type discriminator value for structs that appear as
        /// chain members.
        discriminant: Option<String>,
    },
    Union {
        fields: Vec<Field>,
    },
    Handle {
        dispatchable: bool,
    },
    FunctionPointer {
        ret: TypeId,
        params: Vec<TypeId>,
    },
    Array {
        element: TypeId,
        len: u64,
    },
    Pointer {
        pointee: TypeId,
        is_const: bool,
    },
}

/// A declaration in the module's type arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    /// Canonical name (the registry spelling).
    pub name: String,
    pub kind: TypeKind,
    pub size_class: SizeClass,
    pub provenance: SourceLoc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_cpp_names() {
        assert_eq!(Primitive::Uint32.cpp_name(), "uint32_t");
        assert_eq!(Primitive::Void.cpp_name(), "void");
        assert_eq!(Primitive::from_c_name("GLenum"), Some(Primitive::Uint32));
        assert_eq!(Primitive::from_c_name("VkDevice"), None);
    }

    #[test]
    fn size_classes() {
        assert_eq!(Primitive::Size.size_class(), SizeClass::Platform);
        assert_eq!(Primitive::Void.size_class(), SizeClass::Opaque);
        assert_eq!(Primitive::Float.size_class(), SizeClass::Known);
    }
}
