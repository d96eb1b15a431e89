//! Khronos XML registry parser (Vulkan, OpenGL).
//!
//! Streams the registry with `xml-rs` and collects `<types>`, `<enums>`,
//! `<commands>`, `<feature>` and `<extension>` into tagged records,
//! preserving source order and keeping length expressions and constant
//! values textual. Registry sections that carry no API declarations
//! (platforms, tags, vendor ids, formats, SPIR-V tables) are skipped as
//! known metadata; anything else unexpected is a finding.

use std::io::Read;

use xml::attribute::OwnedAttribute;
use xml::common::Position;
use xml::reader::{EventReader, XmlEvent};
use xml::ParserConfig;

use capgen_common::SourceLoc;

use super::raw::{
    PointerConst, RawCommand, RawConstant, RawEnumBlock, RawExtension, RawFeature, RawItem,
    RawMember, RawRegistry, RawType, RawTypeKind, RawTypeRef,
};
use super::{Findings, IngestError};
use crate::model::ApiFamily;

/// Registry sections that never contain API declarations.
const METADATA_SECTIONS: &[&str] = &[
    "comment",
    "platforms",
    "tags",
    "vendorids",
    "formats",
    "spirvextensions",
    "spirvcapabilities",
    "sync",
    "videocodecs",
];

/// Parse one registry document.
pub fn parse_registry<R: Read>(
    reader: R,
    file: &str,
    api: ApiFamily,
) -> Result<RawRegistry, Vec<IngestError>> {
    let config = ParserConfig::new()
        .trim_whitespace(false)
        .ignore_comments(true);
    let mut parser = Parser {
        reader: EventReader::new_with_config(reader, config),
        file: file.to_string(),
        findings: Findings::new(),
        registry: RawRegistry::new(api),
    };
    parser.run();
    let Parser {
        findings, registry, ..
    } = parser;
    findings.into_result(registry)
}

struct Parser<R: Read> {
    reader: EventReader<R>,
    file: String,
    findings: Findings,
    registry: RawRegistry,
}

impl<R: Read> Parser<R> {
    fn loc(&self) -> SourceLoc {
        // xml-rs rows are zero-based.
        SourceLoc::new(&self.file, (self.reader.position().row + 1) as u32)
    }

    fn next(&mut self) -> Option<XmlEvent> {
        match self.reader.next() {
            Ok(XmlEvent::EndDocument) => None,
            Ok(event) => Some(event),
            Err(err) => {
                self.findings.syntax(self.loc(), err.to_string());
                None
            }
        }
    }

    fn run(&mut self) {
        while let Some(event) = self.next() {
            if let XmlEvent::StartElement {
                name, attributes, ..
            } = event
            {
                match name.local_name.as_str() {
                    "registry" => {}
                    "types" => self.parse_types(),
                    "enums" => self.parse_enums(&attributes),
                    "commands" => self.parse_commands(),
                    "feature" => self.parse_feature(&attributes),
                    "extensions" => {}
                    "extension" => self.parse_extension(&attributes),
                    other if METADATA_SECTIONS.contains(&other) => self.skip_subtree(),
                    other => {
                        self.findings.syntax(
                            self.loc(),
                            format!("unexpected registry element `<{other}>`"),
                        );
                        self.skip_subtree();
                    }
                }
            }
        }
    }

    /// Consume events until the element that just started ends.
    fn skip_subtree(&mut self) {
        let mut depth = 1u32;
        while depth > 0 {
            match self.next() {
                Some(XmlEvent::StartElement { .. }) => depth += 1,
                Some(XmlEvent::EndElement { .. }) => depth -= 1,
                Some(_) => {}
                None => return,
            }
        }
    }

    // ---- <types> -----------------------------------------------------------

    fn parse_types(&mut self) {
        loop {
            match self.next() {
                Some(XmlEvent::StartElement {
                    name, attributes, ..
                }) => match name.local_name.as_str() {
                    "type" => self.parse_type(&attributes),
                    "comment" => self.skip_subtree(),
                    other => {
                        self.findings.syntax(
                            self.loc(),
                            format!("unexpected element `<{other}>` inside <types>"),
                        );
                        self.skip_subtree();
                    }
                },
                Some(XmlEvent::EndElement { name }) if name.local_name == "types" => return,
                Some(_) => {}
                None => return,
            }
        }
    }

    fn parse_type(&mut self, attributes: &[OwnedAttribute]) {
        let loc = self.loc();
        let category = attr(attributes, "category").unwrap_or_default();
        let name_attr = attr(attributes, "name");

        // Registry-level aliases carry both attributes and an empty body.
        if let (Some(name), Some(alias)) = (name_attr.clone(), attr(attributes, "alias")) {
            self.skip_subtree();
            self.push_type(RawType {
                name,
                kind: RawTypeKind::Alias { target: alias },
                loc,
            });
            return;
        }

        match category.as_str() {
            "struct" | "union" => {
                let Some(name) = name_attr else {
                    self.findings
                        .syntax(loc, "struct type without a name attribute");
                    self.skip_subtree();
                    return;
                };
                let extends = attr(attributes, "structextends")
                    .map(|s| s.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
                let members = self.parse_struct_members();
                self.push_type(RawType {
                    name,
                    kind: RawTypeKind::Struct {
                        members,
                        is_union: category == "union",
                        extends,
                    },
                    loc,
                });
            }
            "handle" => {
                let decl = self.collect_text_decl("type");
                let Some(name) = decl.name.clone() else {
                    self.findings.syntax(loc, "handle type without a <name>");
                    return;
                };
                let dispatchable = !decl.full_text().contains("NON_DISPATCHABLE");
                self.push_type(RawType {
                    name,
                    kind: RawTypeKind::Handle { dispatchable },
                    loc,
                });
            }
            "basetype" => {
                let decl = self.collect_text_decl("type");
                let (Some(name), Some(target)) = (decl.name.clone(), decl.type_name.clone())
                else {
                    // Opaque base types (e.g. platform forwards) have a name
                    // but no underlying type.
                    if let Some(name) = decl.name {
                        self.push_type(RawType {
                            name,
                            kind: RawTypeKind::Opaque,
                            loc,
                        });
                    }
                    return;
                };
                self.push_type(RawType {
                    name,
                    kind: RawTypeKind::Alias { target },
                    loc,
                });
            }
            "bitmask" => {
                let bits = attr(attributes, "requires").or_else(|| attr(attributes, "bitvalues"));
                let decl = self.collect_text_decl("type");
                let Some(name) = decl.name.clone() else {
                    self.findings.syntax(loc, "bitmask type without a <name>");
                    return;
                };
                let underlying = decl.type_name.unwrap_or_else(|| "uint32_t".to_string());
                self.push_type(RawType {
                    name,
                    kind: RawTypeKind::Bitmask { underlying, bits },
                    loc,
                });
            }
            "funcpointer" => {
                let decl = self.collect_funcpointer();
                match decl {
                    Some((name, ret, params)) => self.push_type(RawType {
                        name,
                        kind: RawTypeKind::FunctionPointer { ret, params },
                        loc,
                    }),
                    None => self
                        .findings
                        .syntax(loc, "malformed funcpointer declaration"),
                }
            }
            "enum" => {
                // Placeholder; the matching <enums> block carries the shape.
                self.skip_subtree();
                if let Some(name) = name_attr {
                    self.push_type(RawType {
                        name,
                        kind: RawTypeKind::Opaque,
                        loc,
                    });
                }
            }
            "include" | "define" => {
                // C glue, no declaration shape to keep.
                self.skip_subtree();
            }
            "" => {
                // Platform or requires-only types: opaque by construction.
                self.skip_subtree();
                if let Some(name) = name_attr {
                    self.push_type(RawType {
                        name,
                        kind: RawTypeKind::Opaque,
                        loc,
                    });
                }
            }
            other => {
                self.findings
                    .syntax(loc, format!("unknown type category `{other}`"));
                self.skip_subtree();
            }
        }
    }

    fn parse_struct_members(&mut self) -> Vec<RawMember> {
        let mut members = Vec::new();
        loop {
            match self.next() {
                Some(XmlEvent::StartElement {
                    name, attributes, ..
                }) => match name.local_name.as_str() {
                    "member" => {
                        let loc = self.loc();
                        let len = attr(&attributes, "len");
                        let optional =
                            attr(&attributes, "optional").is_some_and(|v| v.starts_with("true"));
                        let values = attr(&attributes, "values");
                        let decl = self.collect_text_decl("member");
                        match decl.into_member(loc.clone()) {
                            Some(mut member) => {
                                member.len = len;
                                member.optional = optional;
                                member.values = values;
                                members.push(member);
                            }
                            None => self.findings.syntax(loc, "member without a <name>"),
                        }
                    }
                    "comment" => self.skip_subtree(),
                    other => {
                        self.findings.syntax(
                            self.loc(),
                            format!("unexpected element `<{other}>` inside struct"),
                        );
                        self.skip_subtree();
                    }
                },
                Some(XmlEvent::EndElement { name }) if name.local_name == "type" => {
                    return members;
                }
                Some(_) => {}
                None => return members,
            }
        }
    }

    // ---- <enums> -----------------------------------------------------------

    fn parse_enums(&mut self, attributes: &[OwnedAttribute]) {
        let loc = self.loc();
        let block_name = attr(attributes, "name").unwrap_or_default();
        let block_type = attr(attributes, "type").unwrap_or_default();
        let mut constants = Vec::new();

        loop {
            match self.next() {
                Some(XmlEvent::StartElement {
                    name, attributes, ..
                }) => match name.local_name.as_str() {
                    "enum" => {
                        let loc = self.loc();
                        self.skip_subtree();
                        let Some(const_name) = attr(&attributes, "name") else {
                            self.findings.syntax(loc, "enum constant without a name");
                            continue;
                        };
                        let value = if let Some(v) = attr(&attributes, "value") {
                            v
                        } else if let Some(bitpos) = attr(&attributes, "bitpos") {
                            match bitpos.parse::<u32>() {
                                Ok(n) if n < 63 => (1u64 << n).to_string(),
                                _ => {
                                    self.findings.syntax(
                                        loc,
                                        format!("invalid bitpos `{bitpos}` on `{const_name}`"),
                                    );
                                    continue;
                                }
                            }
                        } else if attr(&attributes, "alias").is_some() {
                            // Alias constants add no new value.
                            continue;
                        } else {
                            self.findings.syntax(
                                loc,
                                format!("enum constant `{const_name}` without a value"),
                            );
                            continue;
                        };
                        constants.push(RawConstant {
                            name: const_name,
                            value,
                            groups: Vec::new(),
                            loc,
                        });
                    }
                    "unused" | "comment" => self.skip_subtree(),
                    other => {
                        self.findings.syntax(
                            self.loc(),
                            format!("unexpected element `<{other}>` inside <enums>"),
                        );
                        self.skip_subtree();
                    }
                },
                Some(XmlEvent::EndElement { name }) if name.local_name == "enums" => break,
                Some(_) => {}
                None => break,
            }
        }

        if block_type.is_empty() {
            // API constants block: standalone constants, no enum type.
            for constant in constants {
                self.registry.items.push(RawItem::Constant(constant));
            }
        } else {
            self.registry.items.push(RawItem::Enums(RawEnumBlock {
                name: block_name,
                bitmask: block_type == "bitmask",
                underlying: None,
                constants,
                loc,
            }));
        }
    }

    // ---- <commands> --------------------------------------------------------

    fn parse_commands(&mut self) {
        loop {
            match self.next() {
                Some(XmlEvent::StartElement {
                    name, attributes, ..
                }) => match name.local_name.as_str() {
                    "command" => self.parse_command(&attributes),
                    "comment" => self.skip_subtree(),
                    other => {
                        self.findings.syntax(
                            self.loc(),
                            format!("unexpected element `<{other}>` inside <commands>"),
                        );
                        self.skip_subtree();
                    }
                },
                Some(XmlEvent::EndElement { name }) if name.local_name == "commands" => return,
                Some(_) => {}
                None => return,
            }
        }
    }

    fn parse_command(&mut self, attributes: &[OwnedAttribute]) {
        let loc = self.loc();

        // Alias commands re-export an existing signature under a new name;
        // they introduce no new shape, so the alias itself is not recorded.
        if attr(attributes, "alias").is_some() {
            self.skip_subtree();
            return;
        }

        let mut proto: Option<(String, RawTypeRef)> = None;
        let mut params = Vec::new();

        loop {
            match self.next() {
                Some(XmlEvent::StartElement {
                    name, attributes, ..
                }) => match name.local_name.as_str() {
                    "proto" => {
                        let decl = self.collect_text_decl("proto");
                        match (decl.name.clone(), decl.type_ref()) {
                            (Some(n), ty) => proto = Some((n, ty)),
                            (None, _) => {
                                self.findings.syntax(self.loc(), "command proto without <name>");
                            }
                        }
                    }
                    "param" => {
                        let loc = self.loc();
                        let len = attr(&attributes, "len");
                        let optional =
                            attr(&attributes, "optional").is_some_and(|v| v.starts_with("true"));
                        let decl = self.collect_text_decl("param");
                        match decl.into_member(loc.clone()) {
                            Some(mut member) => {
                                member.len = len;
                                member.optional = optional;
                                params.push(member);
                            }
                            None => self.findings.syntax(loc, "param without a <name>"),
                        }
                    }
                    "implicitexternsyncparams" | "comment" => self.skip_subtree(),
                    other => {
                        self.findings.syntax(
                            self.loc(),
                            format!("unexpected element `<{other}>` inside <command>"),
                        );
                        self.skip_subtree();
                    }
                },
                Some(XmlEvent::EndElement { name }) if name.local_name == "command" => break,
                Some(_) => {}
                None => break,
            }
        }

        match proto {
            Some((name, ret)) => self.registry.items.push(RawItem::Command(RawCommand {
                name,
                ret,
                params,
                category: None,
                interface: None,
                loc,
            })),
            None => self.findings.syntax(loc, "command without a <proto>"),
        }
    }

    // ---- <feature> / <extension> -------------------------------------------

    fn parse_feature(&mut self, attributes: &[OwnedAttribute]) {
        let loc = self.loc();
        let name = attr(attributes, "name").unwrap_or_default();
        let number = attr(attributes, "number").unwrap_or_default();
        let commands = self.collect_required_commands("feature");
        if self.registry.version.is_empty() || self.registry.version < number {
            self.registry.version = number.clone();
        }
        self.registry.items.push(RawItem::Feature(RawFeature {
            name,
            number,
            commands,
            loc,
        }));
    }

    fn parse_extension(&mut self, attributes: &[OwnedAttribute]) {
        let loc = self.loc();
        let name = attr(attributes, "name").unwrap_or_default();
        let commands = self.collect_required_commands("extension");
        self.registry.items.push(RawItem::Extension(RawExtension {
            name,
            commands,
            loc,
        }));
    }

    fn collect_required_commands(&mut self, end: &str) -> Vec<String> {
        let mut commands = Vec::new();
        loop {
            match self.next() {
                Some(XmlEvent::StartElement {
                    name, attributes, ..
                }) => match name.local_name.as_str() {
                    "require" | "remove" => {}
                    "command" => {
                        if let Some(n) = attr(&attributes, "name") {
                            commands.push(n);
                        }
                        self.skip_subtree();
                    }
                    // Required enums/types do not affect command grouping.
                    _ => self.skip_subtree(),
                },
                Some(XmlEvent::EndElement { name }) if name.local_name == end => return commands,
                Some(_) => {}
                None => return commands,
            }
        }
    }

    // ---- mixed-content declarations ----------------------------------------

    /// Collect a mixed-content declaration (`<member>`, `<param>`, `<proto>`,
    /// handle/basetype bodies) until the named element ends.
    fn collect_text_decl(&mut self, end: &str) -> TextDecl {
        let mut decl = TextDecl::default();
        let mut capture: Option<Capture> = None;
        let mut depth = 0u32;
        loop {
            match self.next() {
                Some(XmlEvent::StartElement { name, .. }) => {
                    depth += 1;
                    capture = match name.local_name.as_str() {
                        "type" | "ptype" => Some(Capture::Type),
                        "name" => Some(Capture::Name),
                        "enum" => Some(Capture::ArrayLen),
                        _ => None,
                    };
                }
                Some(XmlEvent::EndElement { name }) => {
                    if depth == 0 && name.local_name == end {
                        return decl;
                    }
                    depth = depth.saturating_sub(1);
                    capture = None;
                }
                Some(XmlEvent::Characters(text)) | Some(XmlEvent::Whitespace(text)) => {
                    match capture {
                        Some(Capture::Type) => {
                            decl.type_name.get_or_insert_with(String::new).push_str(&text);
                            decl.push_text(&text);
                        }
                        Some(Capture::Name) => {
                            decl.name.get_or_insert_with(String::new).push_str(&text);
                            decl.saw_name = true;
                        }
                        Some(Capture::ArrayLen) => {
                            decl.enum_len.get_or_insert_with(String::new).push_str(&text);
                            decl.push_text(&text);
                        }
                        None => decl.push_text(&text),
                    }
                }
                Some(_) => {}
                None => return decl,
            }
        }
    }

    /// Parse a funcpointer body into (name, return type, parameter types).
    fn collect_funcpointer(&mut self) -> Option<(String, RawTypeRef, Vec<RawTypeRef>)> {
        let decl = self.collect_text_decl("type");
        let name = decl.name.clone()?;

        let text = decl.full_text();
        let text = text.trim_start();
        // `typedef <ret> (VKAPI_PTR *name)(<params>);`
        let ret_text = text.strip_prefix("typedef")?.split('(').next()?.trim();
        let ret = parse_type_text(ret_text)?;

        let params_text = text.rsplit_once('(').map(|(_, p)| p)?;
        let params_text = params_text.trim_end().trim_end_matches(';').trim_end_matches(')');
        let mut params = Vec::new();
        if params_text.trim() != "void" && !params_text.trim().is_empty() {
            for one in params_text.split(',') {
                // Drop the trailing parameter name.
                let mut tokens: Vec<&str> = one.split_whitespace().collect();
                if tokens.len() > 1 {
                    let last = tokens[tokens.len() - 1];
                    if !last.ends_with('*') {
                        tokens.pop();
                    }
                }
                if let Some(ty) = parse_type_text(&tokens.join(" ")) {
                    params.push(ty);
                }
            }
        }
        Some((name, ret, params))
    }

    fn push_type(&mut self, ty: RawType) {
        // Duplicate declarations of incompatible shape are ambiguity errors;
        // identical redeclarations (common for platform guards) pass.
        if let Some(existing) = self
            .registry
            .types()
            .find(|t| t.name == ty.name && t.kind != ty.kind)
        {
            self.findings.push(IngestError::Ambiguous {
                loc: ty.loc.clone(),
                name: ty.name.clone(),
                message: format!("previously declared at {}", existing.loc),
            });
            return;
        }
        self.registry.items.push(RawItem::Type(ty));
    }
}

/// Attribute lookup by local name.
fn attr(attributes: &[OwnedAttribute], name: &str) -> Option<String> {
    attributes
        .iter()
        .find(|a| a.name.local_name == name)
        .map(|a| a.value.clone())
}

#[derive(Clone, Copy)]
enum Capture {
    Type,
    Name,
    ArrayLen,
}

/// Accumulated mixed-content declaration text.
#[derive(Debug, Default)]
struct TextDecl {
    /// Text before the `<name>` element (qualifiers, type, pointers).
    pre: String,
    /// Text after the `<name>` element (array extents).
    post: String,
    type_name: Option<String>,
    name: Option<String>,
    enum_len: Option<String>,
    saw_name: bool,
}

impl TextDecl {
    fn push_text(&mut self, text: &str) {
        if self.saw_name {
            self.post.push_str(text);
        } else {
            self.pre.push_str(text);
        }
    }

    fn full_text(&self) -> String {
        format!("{}{}", self.pre, self.post)
    }

    /// Build the type reference from the accumulated text.
    fn type_ref(&self) -> RawTypeRef {
        let mut ty = parse_type_text(&self.pre).unwrap_or_default();
        if let Some(name) = &self.type_name {
            ty.base = name.trim().to_string();
        }
        if ty.array_len.is_none() {
            ty.array_len = parse_array_extent(&self.post, self.enum_len.as_deref());
        }
        ty
    }

    fn into_member(self, loc: SourceLoc) -> Option<RawMember> {
        let ty = self.type_ref();
        let name = self.name?;
        Some(RawMember::new(name.trim().to_string(), ty, loc))
    }
}

/// Parse a textual C type spelling (`"const VkFoo* const*"`) into a
/// [`RawTypeRef`]. Returns `None` when no identifier is present.
fn parse_type_text(text: &str) -> Option<RawTypeRef> {
    let mut base = None;
    let mut pointers: Vec<PointerConst> = Vec::new();
    let mut pending_const = false;

    let spaced = text.replace('*', " * ").replace('[', " [ ").replace(']', " ] ");
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
            "struct" | "typedef" | ";" | "[" | "]" => {}
            ident if ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
                if base.is_none() {
                    base = Some(ident.to_string());
                }
            }
            _ => {}
        }
    }

    base.map(|base| RawTypeRef {
        base,
        pointers,
        array_len: None,
    })
}

/// Extract an array extent from post-name text (`"[4]"`), preferring an
/// `<enum>` child reference when present.
fn parse_array_extent(post: &str, enum_len: Option<&str>) -> Option<String> {
    if let Some(e) = enum_len {
        return Some(e.trim().to_string());
    }
    let open = post.find('[')?;
    let close = post.find(']')?;
    let inner = post.get(open + 1..close)?.trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const MINI_REGISTRY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<registry>
  <types>
    <type category="handle">VK_DEFINE_HANDLE(<name>VkDevice</name>)</type>
    <type category="handle">VK_DEFINE_NON_DISPATCHABLE_HANDLE(<name>VkBuffer</name>)</type>
    <type category="basetype">typedef <type>uint32_t</type> <name>VkBool32</name>;</type>
    <type category="struct" name="VkExtent2D">
      <member><type>uint32_t</type> <name>width</name></member>
      <member><type>uint32_t</type> <name>height</name></member>
    </type>
    <type category="struct" name="VkSubmitInfo" structextends="VkBindSparseInfo">
      <member values="VK_STRUCTURE_TYPE_SUBMIT_INFO"><type>VkStructureType</type> <name>sType</name></member>
      <member optional="true">const <type>void</type>* <name>pNext</name></member>
      <member optional="true"><type>uint32_t</type> <name>waitSemaphoreCount</name></member>
      <member len="waitSemaphoreCount">const <type>VkSemaphore</type>* <name>pWaitSemaphores</name></member>
    </type>
  </types>
  <enums name="VkResult" type="enum">
    <enum name="VK_SUCCESS" value="0"/>
    <enum name="VK_NOT_READY" value="1"/>
  </enums>
  <enums name="VkQueueFlagBits" type="bitmask">
    <enum name="VK_QUEUE_GRAPHICS_BIT" bitpos="0"/>
    <enum name="VK_QUEUE_COMPUTE_BIT" bitpos="1"/>
  </enums>
  <commands>
    <command>
      <proto><type>VkResult</type> <name>vkQueueSubmit</name></proto>
      <param><type>VkQueue</type> <name>queue</name></param>
      <param optional="true"><type>uint32_t</type> <name>submitCount</name></param>
      <param len="submitCount">const <type>VkSubmitInfo</type>* <name>pSubmits</name></param>
    </command>
  </commands>
  <feature api="vulkan" name="VK_VERSION_1_0" number="1.0">
    <require>
      <command name="vkQueueSubmit"/>
    </require>
  </feature>
</registry>
"#;

    #[test]
    fn parses_minimal_registry() {
        let registry =
            parse_registry(MINI_REGISTRY.as_bytes(), "vk.xml", ApiFamily::Vulkan).unwrap();

        let types: Vec<_> = registry.types().collect();
        assert_eq!(types.len(), 5);
        assert!(matches!(
            types[0].kind,
            RawTypeKind::Handle { dispatchable: true }
        ));
        assert!(matches!(
            types[1].kind,
            RawTypeKind::Handle {
                dispatchable: false
            }
        ));

        let commands: Vec<_> = registry.commands().collect();
        assert_eq!(commands.len(), 1);
        let cmd = commands[0];
        assert_eq!(cmd.name, "vkQueueSubmit");
        assert_eq!(cmd.ret.base, "VkResult");
        assert_eq!(cmd.params.len(), 3);
        assert_eq!(cmd.params[2].len.as_deref(), Some("submitCount"));
        assert_eq!(cmd.params[2].ty.base, "VkSubmitInfo");
        assert_eq!(cmd.params[2].ty.pointers, vec![PointerConst::Const]);

        assert_eq!(registry.version, "1.0");
    }

    #[test]
    fn struct_members_keep_len_and_values() {
        let registry =
            parse_registry(MINI_REGISTRY.as_bytes(), "vk.xml", ApiFamily::Vulkan).unwrap();
        let submit = registry
            .types()
            .find(|t| t.name == "VkSubmitInfo")
            .unwrap();
        let RawTypeKind::Struct {
            members, extends, ..
        } = &submit.kind
        else {
            unreachable!("VkSubmitInfo should be a struct");
        };
        assert_eq!(extends, &["VkBindSparseInfo".to_string()]);
        assert_eq!(members[0].values.as_deref(), Some("VK_STRUCTURE_TYPE_SUBMIT_INFO"));
        assert!(members[1].optional);
        assert_eq!(members[3].len.as_deref(), Some("waitSemaphoreCount"));
    }

    #[test]
    fn bitpos_becomes_decimal_value() {
        let registry =
            parse_registry(MINI_REGISTRY.as_bytes(), "vk.xml", ApiFamily::Vulkan).unwrap();
        let bits = registry
            .items
            .iter()
            .find_map(|i| match i {
                RawItem::Enums(e) if e.name == "VkQueueFlagBits" => Some(e),
                _ => None,
            })
            .unwrap();
        assert!(bits.bitmask);
        assert_eq!(bits.constants[0].value, "1");
        assert_eq!(bits.constants[1].value, "2");
    }

    #[test]
    fn unknown_top_level_element_is_a_finding() {
        let bad = r#"<registry><nonsense><x/></nonsense></registry>"#;
        let err = parse_registry(bad.as_bytes(), "vk.xml", ApiFamily::Vulkan).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].to_string().contains("nonsense"));
    }

    #[test]
    fn malformed_xml_is_a_syntax_error() {
        let bad = "<registry><types>";
        let err = parse_registry(bad.as_bytes(), "vk.xml", ApiFamily::Vulkan).unwrap_err();
        assert!(matches!(err[0], IngestError::Syntax { .. }));
    }

    #[test]
    fn parse_type_text_pointer_shapes() {
        let ty = parse_type_text("const VkFoo* const*").unwrap();
        assert_eq!(ty.base, "VkFoo");
        assert_eq!(ty.pointers, vec![PointerConst::Const, PointerConst::Const]);

        let ty = parse_type_text("uint32_t").unwrap();
        assert!(ty.pointers.is_empty());

        let ty = parse_type_text("void*").unwrap();
        assert_eq!(ty.pointers, vec![PointerConst::Mut]);
    }
}
