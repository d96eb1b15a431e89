//! Normalize: one raw description in, one [`Module`] out.
//!
//! Steps, in order: type interning, reference resolution, length-expression
//! binding, policy defaulting, versioning merge. Failing fast on the first
//! finding is deliberately rejected; every step collects findings and the
//! caller gets the full list. Given identical inputs two runs produce
//! byte-identical modules: items are processed in source order and all maps
//! are ordered.

mod lenexpr;

pub use lenexpr::parse_length_expr;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use capgen_common::{DiagnosticSink, Phase, SourceLoc};

use crate::emit::Emitter;
use crate::ingest::raw::{
    PointerConst, RawCommand, RawItem, RawMember, RawRegistry, RawType, RawTypeKind, RawTypeRef,
};
use crate::model::{
    Category, ConfigElement, Direction, EnumConstant, Field, Function, Group, LengthExpr, Module,
    Ownership, Policy, Primitive, SizeClass, TypeDecl, TypeId, TypeKind, Version,
};

/// A model-level finding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("{loc}: unresolved reference `{name}`")]
    Unresolved { loc: SourceLoc, name: String },

    #[error("{loc}: length expression `{expr}` on `{field}`: {message}")]
    LengthBinding {
        loc: SourceLoc,
        field: String,
        expr: String,
        message: String,
    },

    #[error(
        "conflicting version annotations for `{function}`: `{first_feature}` ({first_loc}) and `{second_feature}` ({second_loc})"
    )]
    VersionConflict {
        function: String,
        first_feature: String,
        first_loc: SourceLoc,
        second_feature: String,
        second_loc: SourceLoc,
    },

    #[error("{loc}: recursive pointee chain through `{name}`")]
    RecursivePointee { loc: SourceLoc, name: String },

    #[error("{loc}: invalid constant value `{value}` for `{name}`")]
    BadConstant {
        loc: SourceLoc,
        name: String,
        value: String,
    },

    #[error("{loc}: `created` ownership on non-handle parameter `{name}`")]
    CreatedNonHandle { loc: SourceLoc, name: String },

    #[error("policy override references unknown {kind} `{name}`")]
    UnknownOverrideTarget { kind: &'static str, name: String },
}

/// A policy override from the run configuration. Exactly one of `function`
/// and `group` addresses the target; function overrides win over group ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyOverride {
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    pub concern: String,
    pub policy: String,
}

/// A group definition from the run configuration. Members are function
/// names; a trailing `*` makes a prefix pattern (`vkCmdDraw*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    pub members: Vec<String>,
}

/// Normalization options assembled by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    pub overrides: Vec<PolicyOverride>,
    pub groups: Vec<GroupSpec>,
}

/// Lift a raw description into a module.
pub fn normalize(
    raw: &RawRegistry,
    emitters: &[Box<dyn Emitter>],
    options: &NormalizeOptions,
    sink: &DiagnosticSink,
) -> Result<Module, Vec<ModelError>> {
    let mut n = Normalizer {
        module: Module::new(raw.api, raw.version.clone()),
        errors: Vec::new(),
        constants: BTreeMap::new(),
        raw_types: BTreeMap::new(),
        sink,
    };

    for ty in raw.types() {
        n.raw_types.entry(ty.name.clone()).or_insert(ty);
    }

    n.intern_placeholders(raw);
    n.collect_constants(raw);
    n.fill_enum_blocks(raw);
    n.fill_types(raw);
    n.fill_aliases(raw);
    n.build_functions(raw);
    n.merge_versions(raw);
    n.build_groups(options);
    n.reject_recursive_pointees();
    n.apply_policies(emitters, options);
    n.collect_config_elements(raw);

    if n.errors.is_empty() {
        Ok(n.module)
    } else {
        Err(n.errors)
    }
}

struct Normalizer<'a> {
    module: Module,
    errors: Vec<ModelError>,
    /// Evaluated standalone constants, for array extents.
    constants: BTreeMap<String, i64>,
    raw_types: BTreeMap<String, &'a RawType>,
    sink: &'a DiagnosticSink,
}

impl Normalizer<'_> {
    // ---- step 1: type interning -------------------------------------------

    /// Give every declared name a stable handle before any reference is
    /// resolved, so forward and cyclic references never dangle.
    fn intern_placeholders(&mut self, raw: &RawRegistry) {
        for item in &raw.items {
            let (name, loc) = match item {
                RawItem::Type(t) => (&t.name, &t.loc),
                RawItem::Enums(e) if !e.name.is_empty() => (&e.name, &e.loc),
                _ => continue,
            };
            self.module.intern(TypeDecl {
                name: name.clone(),
                kind: TypeKind::Primitive(Primitive::Void),
                size_class: SizeClass::Opaque,
                provenance: loc.clone(),
            });
        }
    }

    fn intern_primitive(&mut self, p: Primitive) -> TypeId {
        self.module.intern(TypeDecl {
            name: p.cpp_name().to_string(),
            kind: TypeKind::Primitive(p),
            size_class: p.size_class(),
            provenance: SourceLoc::internal(),
        })
    }

    // ---- step 2: reference resolution -------------------------------------

    /// Resolve a base type name to a handle, recording unresolved names.
    fn resolve_base(&mut self, name: &str, loc: &SourceLoc) -> TypeId {
        if let Some(id) = self.module.lookup_type(name) {
            return id;
        }
        if let Some(p) = Primitive::from_c_name(name) {
            return self.intern_primitive(p);
        }
        self.errors.push(ModelError::Unresolved {
            loc: loc.clone(),
            name: name.to_string(),
        });
        // Placeholder keeps later references to the same name from piling up.
        self.module.intern(TypeDecl {
            name: name.to_string(),
            kind: TypeKind::Primitive(Primitive::Void),
            size_class: SizeClass::Opaque,
            provenance: loc.clone(),
        })
    }

    /// Resolve a full textual type reference (base, pointers, array extent).
    fn resolve_ref(&mut self, ty: &RawTypeRef, loc: &SourceLoc) -> TypeId {
        let mut id = self.resolve_base(&ty.base, loc);

        if let Some(extent) = &ty.array_len {
            match self.eval_extent(extent) {
                Some(len) => {
                    let name = format!("{}[{len}]", self.module.type_decl(id).name);
                    let element = id;
                    id = self.module.intern(TypeDecl {
                        name,
                        kind: TypeKind::Array { element, len },
                        size_class: SizeClass::Known,
                        provenance: loc.clone(),
                    });
                }
                None => self.errors.push(ModelError::Unresolved {
                    loc: loc.clone(),
                    name: extent.clone(),
                }),
            }
        }

        for p in &ty.pointers {
            let is_const = *p == PointerConst::Const;
            let inner = self.module.type_decl(id).name.clone();
            let name = if is_const {
                format!("const {inner}*")
            } else {
                format!("{inner}*")
            };
            let pointee = id;
            id = self.module.intern(TypeDecl {
                name,
                kind: TypeKind::Pointer { pointee, is_const },
                size_class: SizeClass::Platform,
                provenance: loc.clone(),
            });
        }
        id
    }

    /// Evaluate an array extent: a literal or a named API constant.
    fn eval_extent(&self, extent: &str) -> Option<u64> {
        if let Some(v) = eval_constant_text(extent) {
            return u64::try_from(v).ok();
        }
        self.constants
            .get(extent.trim())
            .and_then(|v| u64::try_from(*v).ok())
    }

    fn collect_constants(&mut self, raw: &RawRegistry) {
        for item in &raw.items {
            if let RawItem::Constant(c) = item {
                match eval_constant_text(&c.value) {
                    Some(v) => {
                        self.constants.insert(c.name.clone(), v);
                    }
                    None => self.errors.push(ModelError::BadConstant {
                        loc: c.loc.clone(),
                        name: c.name.clone(),
                        value: c.value.clone(),
                    }),
                }
            }
        }
    }

    // ---- enum blocks -------------------------------------------------------

    fn fill_enum_blocks(&mut self, raw: &RawRegistry) {
        for item in &raw.items {
            let RawItem::Enums(block) = item else {
                continue;
            };
            if block.name.is_empty() {
                continue;
            }
            let underlying = block
                .underlying
                .as_deref()
                .and_then(Primitive::from_c_name)
                .unwrap_or(Primitive::Uint32);

            let mut constants = Vec::new();
            let mut next_value = 0i64;
            for c in &block.constants {
                let value = if c.value.is_empty() {
                    Some(next_value)
                } else {
                    eval_constant_text(&c.value)
                };
                match value {
                    Some(v) => {
                        next_value = v + 1;
                        constants.push(EnumConstant {
                            name: c.name.clone(),
                            value: v,
                            groups: c.groups.clone(),
                        });
                        self.constants.insert(c.name.clone(), v);
                    }
                    None => self.errors.push(ModelError::BadConstant {
                        loc: c.loc.clone(),
                        name: c.name.clone(),
                        value: c.value.clone(),
                    }),
                }
            }

            let kind = if block.bitmask {
                TypeKind::Bitmask {
                    underlying,
                    constants,
                }
            } else {
                TypeKind::Enum {
                    underlying,
                    constants,
                }
            };
            let id = self.module.lookup_type(&block.name).unwrap_or_else(|| {
                self.module.intern(TypeDecl {
                    name: block.name.clone(),
                    kind: TypeKind::Primitive(Primitive::Void),
                    size_class: SizeClass::Opaque,
                    provenance: block.loc.clone(),
                })
            });
            self.module.replace_kind(id, kind);
        }
    }

    // ---- concrete types ----------------------------------------------------

    fn fill_types(&mut self, raw: &RawRegistry) {
        for item in &raw.items {
            let RawItem::Type(ty) = item else { continue };
            // Placeholder exists from intern_placeholders; only the kind is
            // replaced here, so handles stay stable.
            let Some(id) = self.module.lookup_type(&ty.name) else {
                continue;
            };
            match &ty.kind {
                RawTypeKind::Handle { dispatchable } => {
                    self.module.replace_kind(
                        id,
                        TypeKind::Handle {
                            dispatchable: *dispatchable,
                        },
                    );
                }
                RawTypeKind::Struct {
                    members,
                    is_union,
                    extends,
                } => {
                    let fields = self.build_fields(members, Direction::In);
                    let discriminant = members.iter().find_map(|m| m.values.clone());
                    let chain_head = !is_union
                        && extends.is_empty()
                        && members.iter().any(|m| m.name == "pNext");
                    let kind = if *is_union {
                        TypeKind::Union { fields }
                    } else {
                        TypeKind::Struct {
                            fields,
                            chain_head,
                            discriminant,
                        }
                    };
                    self.module.replace_kind(id, kind);
                }
                RawTypeKind::FunctionPointer { ret, params } => {
                    let ret = self.resolve_ref(ret, &ty.loc);
                    let params = params
                        .iter()
                        .map(|p| self.resolve_ref(p, &ty.loc))
                        .collect();
                    self.module
                        .replace_kind(id, TypeKind::FunctionPointer { ret, params });
                }
                RawTypeKind::Bitmask { underlying, bits } => {
                    let underlying = Primitive::from_c_name(underlying)
                        .or_else(|| {
                            // Flags typedefs chain through another typedef
                            // (`VkFlags`); the width is what matters.
                            self.raw_types.get(underlying.as_str()).and_then(|t| {
                                if let RawTypeKind::Alias { target } = &t.kind {
                                    Primitive::from_c_name(target)
                                } else {
                                    None
                                }
                            })
                        })
                        .unwrap_or(Primitive::Uint32);
                    // Constants live in the referenced bits block and are
                    // attached when that block is filled; the typedef itself
                    // carries the width.
                    let constants = bits
                        .as_ref()
                        .and_then(|b| self.module.lookup_type(b))
                        .map(|bid| match &self.module.type_decl(bid).kind {
                            TypeKind::Bitmask { constants, .. } | TypeKind::Enum { constants, .. } => {
                                constants.clone()
                            }
                            _ => Vec::new(),
                        })
                        .unwrap_or_default();
                    self.module.replace_kind(
                        id,
                        TypeKind::Bitmask {
                            underlying,
                            constants,
                        },
                    );
                }
                RawTypeKind::Alias { .. } => {} // second sweep
                RawTypeKind::Opaque => {}
            }
        }
    }

    /// Aliases clone their target's shape under the registry spelling. Runs
    /// after every concrete type is filled so targets are complete.
    fn fill_aliases(&mut self, raw: &RawRegistry) {
        for item in &raw.items {
            let RawItem::Type(ty) = item else { continue };
            let RawTypeKind::Alias { target } = &ty.kind else {
                continue;
            };
            let Some(id) = self.module.lookup_type(&ty.name) else {
                continue;
            };
            let target_id = self.resolve_base(target, &ty.loc);
            let kind = self.module.type_decl(target_id).kind.clone();
            self.module.replace_kind(id, kind);
        }
    }

    // ---- fields ------------------------------------------------------------

    /// Normalize members into fields, then bind their length expressions.
    fn build_fields(&mut self, members: &[RawMember], default_dir: Direction) -> Vec<Field> {
        let mut fields: Vec<Field> = members
            .iter()
            .map(|m| {
                let ty = self.resolve_ref(&m.ty, &m.loc);
                let direction = match m.direction.as_deref() {
                    Some("in") => Direction::In,
                    Some("out") => Direction::Out,
                    Some("inout") => Direction::InOut,
                    _ => self.infer_direction(&m.ty, default_dir),
                };
                let ownership = match m.ownership.as_deref() {
                    Some("transferred") => Ownership::Transferred,
                    Some("created") => Ownership::Created,
                    Some("destroyed") => Ownership::Destroyed,
                    _ => Ownership::Borrowed,
                };
                Field {
                    name: m.name.clone(),
                    ty,
                    direction,
                    optional: m.optional,
                    length: None,
                    ownership,
                }
            })
            .collect();

        for (index, m) in members.iter().enumerate() {
            let Some(text) = &m.len else { continue };
            match lenexpr::bind(text, index, &fields) {
                Ok(expr) => fields[index].length = Some(expr),
                Err(message) => self.errors.push(ModelError::LengthBinding {
                    loc: m.loc.clone(),
                    field: m.name.clone(),
                    expr: text.clone(),
                    message,
                }),
            }
        }
        fields
    }

    /// XML registries carry no direction attribute: a non-const pointer is
    /// an output, everything else an input.
    fn infer_direction(&self, ty: &RawTypeRef, default_dir: Direction) -> Direction {
        match ty.pointers.last() {
            Some(PointerConst::Mut) if ty.base != "void" => Direction::Out,
            _ => default_dir,
        }
    }

    // ---- functions ---------------------------------------------------------

    fn build_functions(&mut self, raw: &RawRegistry) {
        for item in &raw.items {
            let RawItem::Command(cmd) = item else { continue };
            let function = self.build_function(cmd);
            self.module.functions.push(function);
        }
    }

    fn build_function(&mut self, cmd: &RawCommand) -> Function {
        let name = match &cmd.interface {
            Some(iface) => format!("{iface}_{}", cmd.name),
            None => cmd.name.clone(),
        };
        let ret = self.resolve_ref(&cmd.ret, &cmd.loc);
        let mut params = self.build_fields(&cmd.params, Direction::In);

        let category = cmd
            .category
            .as_deref()
            .and_then(parse_category)
            .unwrap_or_else(|| classify_by_name(&cmd.name));

        // Constructor outputs create handles, destructor inputs destroy
        // them, unless the source already annotated ownership.
        for (i, field) in params.iter_mut().enumerate() {
            if cmd.params[i].ownership.is_some() {
                continue;
            }
            let is_handle = self.module.is_handle(field.ty);
            match category {
                Category::Constructor if is_handle && field.direction == Direction::Out => {
                    field.ownership = Ownership::Created;
                }
                Category::Destructor if is_handle && field.direction == Direction::In => {
                    field.ownership = Ownership::Destroyed;
                }
                _ => {}
            }
        }

        // Invariant: `created` requires a handle type.
        for field in &params {
            if field.ownership == Ownership::Created && !self.module.is_handle(field.ty) {
                self.errors.push(ModelError::CreatedNonHandle {
                    loc: cmd.loc.clone(),
                    name: field.name.clone(),
                });
            }
        }

        Function {
            name,
            ret,
            params,
            category,
            introduced_in: None,
            extensions: Vec::new(),
            policies: BTreeMap::new(),
            provenance: cmd.loc.clone(),
        }
    }

    // ---- step 5: versioning merge -----------------------------------------

    fn merge_versions(&mut self, raw: &RawRegistry) {
        // function name -> (feature name, version, loc)
        let mut claimed: BTreeMap<String, (String, Version, SourceLoc)> = BTreeMap::new();

        for item in &raw.items {
            match item {
                RawItem::Feature(feature) => {
                    let Some(version) = Version::parse(&feature.number)
                        .or_else(|| Version::parse(&feature.name))
                    else {
                        continue;
                    };
                    for cmd in &feature.commands {
                        if let Some((first, v, loc)) = claimed.get(cmd) {
                            if *v != version {
                                self.errors.push(ModelError::VersionConflict {
                                    function: cmd.clone(),
                                    first_feature: first.clone(),
                                    first_loc: loc.clone(),
                                    second_feature: feature.name.clone(),
                                    second_loc: feature.loc.clone(),
                                });
                            }
                            continue;
                        }
                        claimed.insert(
                            cmd.clone(),
                            (feature.name.clone(), version, feature.loc.clone()),
                        );
                    }
                }
                RawItem::Extension(ext) => {
                    for cmd in &ext.commands {
                        if let Some(f) =
                            self.module.functions.iter_mut().find(|f| f.name == *cmd)
                        {
                            f.extensions.push(ext.name.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        for f in &mut self.module.functions {
            if let Some((_, version, _)) = claimed.get(&f.name) {
                f.introduced_in = Some(*version);
            }
        }
    }

    // ---- groups ------------------------------------------------------------

    fn build_groups(&mut self, options: &NormalizeOptions) {
        for spec in &options.groups {
            let mut functions = Vec::new();
            for pattern in &spec.members {
                if let Some(prefix) = pattern.strip_suffix('*') {
                    functions.extend(
                        self.module
                            .functions
                            .iter()
                            .filter(|f| f.name.starts_with(prefix))
                            .map(|f| f.name.clone()),
                    );
                } else if self.module.function(pattern).is_some() {
                    functions.push(pattern.clone());
                } else {
                    self.errors.push(ModelError::UnknownOverrideTarget {
                        kind: "function",
                        name: pattern.clone(),
                    });
                }
            }
            self.module.groups.push(Group {
                name: spec.name.clone(),
                functions,
            });
        }
    }

    // ---- recursive pointees ------------------------------------------------

    /// Reject pointee chains that return to an ancestor struct, so emitters
    /// can serialize nested pointees without cycle detection. Chains through
    /// `void*` (opaque pass-through) are fine.
    fn reject_recursive_pointees(&mut self) {
        let count = self.module.type_count();
        for index in 0..count {
            let id = TypeId(index as u32);
            if !matches!(self.module.type_decl(id).kind, TypeKind::Struct { .. }) {
                continue;
            }
            let mut stack = vec![id];
            if self.pointee_cycle(id, &mut stack) {
                let decl = self.module.type_decl(id);
                self.errors.push(ModelError::RecursivePointee {
                    loc: decl.provenance.clone(),
                    name: decl.name.clone(),
                });
            }
        }
        self.errors.dedup();
    }

    fn pointee_cycle(&self, id: TypeId, stack: &mut Vec<TypeId>) -> bool {
        let fields = match &self.module.type_decl(id).kind {
            TypeKind::Struct { fields, .. } | TypeKind::Union { fields } => fields,
            _ => return false,
        };
        for field in fields {
            // Follow pointers and array elements to the terminal type.
            let mut ty = field.ty;
            loop {
                match &self.module.type_decl(ty).kind {
                    TypeKind::Pointer { pointee, .. } => ty = *pointee,
                    TypeKind::Array { element, .. } => ty = *element,
                    _ => break,
                }
            }
            if !matches!(
                self.module.type_decl(ty).kind,
                TypeKind::Struct { .. } | TypeKind::Union { .. }
            ) {
                continue;
            }
            // Any cycle reached from here necessarily crosses a pointer;
            // value-containment cycles cannot exist in the source language.
            if stack.contains(&ty) {
                return true;
            }
            stack.push(ty);
            let cyclic = self.pointee_cycle(ty, stack);
            stack.pop();
            if cyclic {
                return true;
            }
        }
        false
    }

    // ---- step 4: policy defaulting ----------------------------------------

    fn apply_policies(&mut self, emitters: &[Box<dyn Emitter>], options: &NormalizeOptions) {
        // Group overrides first, then function overrides on top.
        for by_function in [false, true] {
            for o in &options.overrides {
                let Some(policy) = Policy::parse(&o.policy) else {
                    if !by_function {
                        self.errors.push(ModelError::UnknownOverrideTarget {
                            kind: "policy",
                            name: o.policy.clone(),
                        });
                    }
                    continue;
                };
                match (by_function, &o.function, &o.group) {
                    (true, Some(name), _) => {
                        let Some(f) =
                            self.module.functions.iter_mut().find(|f| f.name == *name)
                        else {
                            self.errors.push(ModelError::UnknownOverrideTarget {
                                kind: "function",
                                name: name.clone(),
                            });
                            continue;
                        };
                        f.policies.insert(o.concern.clone(), policy);
                    }
                    (false, None, Some(group)) => {
                        let Some(members) = self
                            .module
                            .groups
                            .iter()
                            .find(|g| g.name == *group)
                            .map(|g| g.functions.clone())
                        else {
                            self.errors.push(ModelError::UnknownOverrideTarget {
                                kind: "group",
                                name: group.clone(),
                            });
                            continue;
                        };
                        for member in members {
                            if let Some(f) = self
                                .module
                                .functions
                                .iter_mut()
                                .find(|f| f.name == member)
                            {
                                f.policies.insert(o.concern.clone(), policy);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        // Defaulting is an explicit step with a diagnostic per application;
        // nothing downstream performs implicit lookups.
        for f in &mut self.module.functions {
            for emitter in emitters {
                let concern = emitter.name();
                if !f.policies.contains_key(concern) {
                    let policy = emitter.default_policy(f);
                    f.policies.insert(concern.to_string(), policy);
                    self.sink.info(
                        Phase::Normalize,
                        format!(
                            "defaulted policy `{}` for `{}` in `{concern}`",
                            policy.as_str(),
                            f.name
                        ),
                    );
                }
            }
        }
    }

    fn collect_config_elements(&mut self, raw: &RawRegistry) {
        for item in &raw.items {
            if let RawItem::ConfigElement(e) = item {
                self.module.config_elements.push(ConfigElement {
                    name: e.name.clone(),
                    ty: e.ty.clone(),
                    default: e.default.clone(),
                    description: e.description.clone(),
                });
            }
        }
    }
}

fn parse_category(s: &str) -> Option<Category> {
    match s {
        "constructor" => Some(Category::Constructor),
        "destructor" => Some(Category::Destructor),
        "command" => Some(Category::Command),
        "query" => Some(Category::Query),
        _ => None,
    }
}

/// Name-shape classification for sources without explicit categories.
fn classify_by_name(name: &str) -> Category {
    let bare = name
        .trim_start_matches("vk")
        .trim_start_matches("gl")
        .trim_start_matches("cl")
        .trim_start_matches("ze")
        .trim_start_matches("Ze")
        .trim_start_matches(['_']);
    if bare.starts_with("Create") || bare.starts_with("Allocate") || bare.starts_with("Acquire") {
        Category::Constructor
    } else if bare.starts_with("Destroy")
        || bare.starts_with("Free")
        || bare.starts_with("Release")
    {
        Category::Destructor
    } else if bare.starts_with("Get") || bare.starts_with("Query") || bare.starts_with("Enumerate")
    {
        Category::Query
    } else {
        Category::Command
    }
}

/// Evaluate a textual constant value.
///
/// Handles the registry/header vocabulary: decimal, hex, negative parens,
/// `~0` complements and simple shifts. Anything else is a finding at the
/// call site.
pub fn eval_constant_text(text: &str) -> Option<i64> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    let t = t
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(t)
        .trim();

    // `1 << 4`
    if let Some((lhs, rhs)) = t.split_once("<<") {
        let l = eval_constant_text(lhs)?;
        let r = eval_constant_text(rhs)?;
        return l.checked_shl(u32::try_from(r).ok()?);
    }

    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        let hex = hex.trim_end_matches(['u', 'U', 'l', 'L']);
        return i64::from_str_radix(hex, 16).ok();
    }
    let t = t.trim_end_matches(['u', 'U', 'l', 'L', 'f', 'F']);
    if let Some(inner) = t.strip_prefix("~") {
        let v = eval_constant_text(inner)?;
        return Some(!v);
    }
    t.parse::<i64>().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::emit::builtin_emitters as concerns;
    use crate::ingest::registry_xml::parse_registry;
    use crate::model::ApiFamily;

    fn normalize_xml(xml: &str) -> Result<Module, Vec<ModelError>> {
        let raw = parse_registry(xml.as_bytes(), "test.xml", ApiFamily::Vulkan).unwrap();
        let sink = DiagnosticSink::new();
        normalize(&raw, &concerns(), &NormalizeOptions::default(), &sink)
    }

    const BASE_XML: &str = r#"<registry>
  <types>
    <type category="handle">VK_DEFINE_HANDLE(<name>VkDevice</name>)</type>
    <type category="struct" name="VkExtent2D">
      <member><type>uint32_t</type> <name>width</name></member>
      <member><type>uint32_t</type> <name>height</name></member>
    </type>
  </types>
  <enums name="VkResult" type="enum">
    <enum name="VK_SUCCESS" value="0"/>
    <enum name="VK_NOT_READY" value="1"/>
  </enums>
  <commands>
    <command>
      <proto><type>VkResult</type> <name>vkCreateDevice</name></proto>
      <param><type>VkDevice</type>* <name>pDevice</name></param>
    </command>
    <command>
      <proto><type>void</type> <name>vkDestroyDevice</name></proto>
      <param><type>VkDevice</type> <name>device</name></param>
    </command>
    <command>
      <proto><type>void</type> <name>vkSetExtent</name></proto>
      <param><type>uint32_t</type> <name>count</name></param>
      <param len="count">const <type>VkExtent2D</type>* <name>pExtents</name></param>
    </command>
  </commands>
  <feature api="vulkan" name="VK_VERSION_1_0" number="1.0">
    <require>
      <command name="vkCreateDevice"/>
      <command name="vkDestroyDevice"/>
    </require>
  </feature>
</registry>"#;

    #[test]
    fn builds_module_with_resolved_references() {
        let module = normalize_xml(BASE_XML).unwrap();
        assert_eq!(module.functions.len(), 3);

        let create = module.function("vkCreateDevice").unwrap();
        assert_eq!(create.category, Category::Constructor);
        assert_eq!(create.params[0].ownership, Ownership::Created);
        assert_eq!(create.params[0].direction, Direction::Out);
        assert_eq!(create.introduced_in, Some(Version::new(1, 0)));

        let destroy = module.function("vkDestroyDevice").unwrap();
        assert_eq!(destroy.category, Category::Destructor);
        assert_eq!(destroy.params[0].ownership, Ownership::Destroyed);
    }

    #[test]
    fn binds_length_expressions_to_earlier_fields() {
        let module = normalize_xml(BASE_XML).unwrap();
        let set = module.function("vkSetExtent").unwrap();
        assert_eq!(set.params[1].length, Some(LengthExpr::FieldRef(0)));
    }

    #[test]
    fn length_reference_to_later_field_fails() {
        let xml = r#"<registry>
  <commands>
    <command>
      <proto><type>void</type> <name>f</name></proto>
      <param len="count">const <type>uint32_t</type>* <name>p</name></param>
      <param><type>uint32_t</type> <name>count</name></param>
    </command>
  </commands>
</registry>"#;
        let err = normalize_xml(xml).unwrap_err();
        assert!(
            err.iter().any(|e| matches!(e, ModelError::LengthBinding { .. })),
            "expected a length binding error, got {err:?}"
        );
    }

    #[test]
    fn unresolved_references_are_collected_together() {
        let xml = r#"<registry>
  <commands>
    <command>
      <proto><type>Mystery1</type> <name>f</name></proto>
      <param><type>Mystery2</type> <name>a</name></param>
      <param><type>Mystery3</type> <name>b</name></param>
    </command>
  </commands>
</registry>"#;
        let err = normalize_xml(xml).unwrap_err();
        let unresolved: Vec<_> = err
            .iter()
            .filter_map(|e| match e {
                ModelError::Unresolved { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(unresolved, ["Mystery1", "Mystery2", "Mystery3"]);
    }

    #[test]
    fn version_conflict_names_both_declarations() {
        let xml = r#"<registry>
  <commands>
    <command>
      <proto><type>void</type> <name>f</name></proto>
    </command>
  </commands>
  <feature api="vulkan" name="VK_VERSION_1_0" number="1.0">
    <require><command name="f"/></require>
  </feature>
  <feature api="vulkan" name="VK_VERSION_1_1" number="1.1">
    <require><command name="f"/></require>
  </feature>
</registry>"#;
        let err = normalize_xml(xml).unwrap_err();
        let conflict = err
            .iter()
            .find_map(|e| match e {
                ModelError::VersionConflict {
                    first_feature,
                    second_feature,
                    ..
                } => Some((first_feature.clone(), second_feature.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(conflict.0, "VK_VERSION_1_0");
        assert_eq!(conflict.1, "VK_VERSION_1_1");
    }

    #[test]
    fn recursive_pointee_chain_is_rejected() {
        let xml = r#"<registry>
  <types>
    <type category="struct" name="A">
      <member>const <type>B</type>* <name>b</name></member>
    </type>
    <type category="struct" name="B">
      <member>const <type>A</type>* <name>a</name></member>
    </type>
  </types>
</registry>"#;
        let err = normalize_xml(xml).unwrap_err();
        assert!(err
            .iter()
            .any(|e| matches!(e, ModelError::RecursivePointee { .. })));
    }

    #[test]
    fn chain_membership_is_marked() {
        let xml = r#"<registry>
  <types>
    <type category="struct" name="VkBaseInfo">
      <member values="VK_STRUCTURE_TYPE_BASE"><type>uint32_t</type> <name>sType</name></member>
      <member optional="true"><type>void</type>* <name>pNext</name></member>
    </type>
    <type category="struct" name="VkExtInfo" structextends="VkBaseInfo">
      <member values="VK_STRUCTURE_TYPE_EXT"><type>uint32_t</type> <name>sType</name></member>
      <member optional="true"><type>void</type>* <name>pNext</name></member>
    </type>
  </types>
</registry>"#;
        let module = normalize_xml(xml).unwrap();
        let heads: Vec<_> = module.chain_heads().map(|(_, t)| t.name.as_str()).collect();
        assert_eq!(heads, ["VkBaseInfo"]);
        let members = module.chain_members();
        assert_eq!(members.len(), 2);
        assert!(members.iter().any(|(_, t, d)| t.name == "VkExtInfo" && *d == "VK_STRUCTURE_TYPE_EXT"));
    }

    #[test]
    fn policy_defaulting_is_total_and_diagnosed() {
        let raw = parse_registry(BASE_XML.as_bytes(), "test.xml", ApiFamily::Vulkan).unwrap();
        let sink = DiagnosticSink::new();
        let emitters = concerns();
        let module = normalize(&raw, &emitters, &NormalizeOptions::default(), &sink).unwrap();
        for f in &module.functions {
            for emitter in &emitters {
                assert!(
                    f.policies.contains_key(emitter.name()),
                    "missing policy for {} / {}",
                    f.name,
                    emitter.name()
                );
            }
        }
        assert!(sink.records().iter().any(|d| d.message.contains("defaulted policy")));
    }

    #[test]
    fn overrides_take_precedence_over_defaults() {
        let raw = parse_registry(BASE_XML.as_bytes(), "test.xml", ApiFamily::Vulkan).unwrap();
        let sink = DiagnosticSink::new();
        let options = NormalizeOptions {
            overrides: vec![PolicyOverride {
                function: Some("vkSetExtent".to_string()),
                group: None,
                concern: "recorder".to_string(),
                policy: "skip".to_string(),
            }],
            groups: Vec::new(),
        };
        let module = normalize(&raw, &concerns(), &options, &sink).unwrap();
        assert_eq!(
            module.function("vkSetExtent").unwrap().policy("recorder"),
            Policy::Skip
        );
    }

    #[test]
    fn group_override_applies_to_prefix_members() {
        let raw = parse_registry(BASE_XML.as_bytes(), "test.xml", ApiFamily::Vulkan).unwrap();
        let sink = DiagnosticSink::new();
        let options = NormalizeOptions {
            overrides: vec![PolicyOverride {
                function: None,
                group: Some("lifecycle".to_string()),
                concern: "trace".to_string(),
                policy: "custom".to_string(),
            }],
            groups: vec![GroupSpec {
                name: "lifecycle".to_string(),
                members: vec!["vkCreateDevice".to_string(), "vkDestroy*".to_string()],
            }],
        };
        let module = normalize(&raw, &concerns(), &options, &sink).unwrap();
        assert_eq!(
            module.function("vkCreateDevice").unwrap().policy("trace"),
            Policy::Custom
        );
        assert_eq!(
            module.function("vkDestroyDevice").unwrap().policy("trace"),
            Policy::Custom
        );
        assert_ne!(
            module.function("vkSetExtent").unwrap().policy("trace"),
            Policy::Custom
        );
    }

    #[test]
    fn constant_evaluation_vocabulary() {
        assert_eq!(eval_constant_text("16"), Some(16));
        assert_eq!(eval_constant_text("0x7FFF"), Some(0x7FFF));
        assert_eq!(eval_constant_text("(-1)"), Some(-1));
        assert_eq!(eval_constant_text("(~0U)"), Some(-1));
        assert_eq!(eval_constant_text("1 << 4"), Some(16));
        assert_eq!(eval_constant_text("forty-two"), None);
    }

    #[test]
    fn determinism_two_runs_identical() {
        let a = normalize_xml(BASE_XML).unwrap();
        let b = normalize_xml(BASE_XML).unwrap();
        let ja = serde_json::to_string(&a).unwrap();
        let jb = serde_json::to_string(&b).unwrap();
        assert_eq!(ja, jb);
    }
}
