//! C header parser (DirectX, Level Zero).
//!
//! Three small stages: a line preprocessor (`#include`, object-like
//! `#define`, conditional blocks), a tokenizer, and a minimal declaration
//! parser covering typedefs, structs/unions, enums, function-pointer
//! typedefs, COM interface method tables and plain prototypes. SAL-style
//! annotations (`_In_`, `_Out_writes_(n)`, …) are folded into parameter
//! direction/length metadata. Anything else is reported with its location.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use capgen_common::SourceLoc;

use super::raw::{
    PointerConst, RawCommand, RawConstant, RawEnumBlock, RawItem, RawMember, RawRegistry, RawType,
    RawTypeKind, RawTypeRef,
};
use super::{Findings, IngestError};
use crate::model::ApiFamily;

/// Header parse options. Include paths come pre-resolved from the SDK
/// locator collaborator; the parser never probes the environment itself.
#[derive(Debug, Clone, Default)]
pub struct HeaderOptions {
    pub include_dirs: Vec<PathBuf>,
    /// Extra object-like defines applied before parsing.
    pub defines: Vec<(String, String)>,
}

/// Calling-convention and export decorations that expand to nothing unless
/// the configuration overrides them.
const EMPTY_DECORATIONS: &[&str] = &[
    "ZE_APIEXPORT",
    "ZE_APICALL",
    "ZE_DLLEXPORT",
    "APIENTRY",
    "WINAPI",
    "STDMETHODCALLTYPE",
    "STDAPICALLTYPE",
    "VKAPI_PTR",
    "VKAPI_CALL",
    "CL_API_ENTRY",
    "CL_API_CALL",
    "extern",
];

/// Parse a header file, resolving includes against the option paths.
pub fn parse_header_file(
    path: &Path,
    options: &HeaderOptions,
    api: ApiFamily,
) -> Result<RawRegistry, Vec<IngestError>> {
    let file = path.display().to_string();
    match fs::read_to_string(path) {
        Ok(source) => parse_header_source(&source, &file, options, api),
        Err(err) => Err(vec![IngestError::MissingDependency {
            loc: SourceLoc::new(file.clone(), 0),
            message: format!("cannot read header: {err}"),
        }]),
    }
}

/// Parse header source text (entry point used by tests and the pipeline).
pub fn parse_header_source(
    source: &str,
    file: &str,
    options: &HeaderOptions,
    api: ApiFamily,
) -> Result<RawRegistry, Vec<IngestError>> {
    let mut findings = Findings::new();

    let mut pre = Preprocessor::new(options);
    pre.process(source, file, &mut findings);

    let tokens = tokenize(&pre.lines, &pre.defines, &mut findings);

    let mut parser = DeclParser {
        tokens,
        pos: 0,
        registry: RawRegistry::new(api),
        findings,
    };
    for (name, value) in &pre.constants {
        parser.registry.items.push(RawItem::Constant(RawConstant {
            name: name.clone(),
            value: value.0.clone(),
            groups: Vec::new(),
            loc: value.1.clone(),
        }));
    }
    parser.run();

    let DeclParser {
        findings, registry, ..
    } = parser;
    findings.into_result(registry)
}

// ---- preprocessor ----------------------------------------------------------

struct Preprocessor<'a> {
    options: &'a HeaderOptions,
    defines: BTreeMap<String, String>,
    /// Numeric object-like defines, kept as constants.
    constants: Vec<(String, (String, SourceLoc))>,
    lines: Vec<(String, SourceLoc)>,
    depth: u32,
}

impl<'a> Preprocessor<'a> {
    fn new(options: &'a HeaderOptions) -> Self {
        let mut defines = BTreeMap::new();
        for name in EMPTY_DECORATIONS {
            defines.insert((*name).to_string(), String::new());
        }
        for (name, value) in &options.defines {
            defines.insert(name.clone(), value.clone());
        }
        Self {
            options,
            defines,
            constants: Vec::new(),
            lines: Vec::new(),
            depth: 0,
        }
    }

    fn process(&mut self, source: &str, file: &str, findings: &mut Findings) {
        if self.depth > 32 {
            findings.push(IngestError::MissingDependency {
                loc: SourceLoc::new(file, 0),
                message: "include depth limit exceeded".to_string(),
            });
            return;
        }

        let stripped = strip_comments(source);
        // Stack of (branch-taken, currently-active) for conditional blocks.
        let mut conds: Vec<(bool, bool)> = Vec::new();

        let mut lines = stripped.lines().enumerate().peekable();
        while let Some((idx, line)) = lines.next() {
            let loc = SourceLoc::new(file, (idx + 1) as u32);
            let mut logical = line.to_string();
            // Continuation lines.
            while logical.ends_with('\\') {
                logical.pop();
                match lines.next() {
                    Some((_, next)) => logical.push_str(next),
                    None => break,
                }
            }
            let trimmed = logical.trim();

            if let Some(directive) = trimmed.strip_prefix('#') {
                self.directive(directive.trim(), &loc, &mut conds, findings);
                continue;
            }

            let active = conds.iter().all(|(_, a)| *a);
            if active && !trimmed.is_empty() {
                self.lines.push((logical, loc));
            }
        }
    }

    fn directive(
        &mut self,
        directive: &str,
        loc: &SourceLoc,
        conds: &mut Vec<(bool, bool)>,
        findings: &mut Findings,
    ) {
        let active = conds.iter().all(|(_, a)| *a);
        let (word, rest) = directive
            .split_once(char::is_whitespace)
            .unwrap_or((directive, ""));
        let rest = rest.trim();

        match word {
            "include" if active => self.include(rest, loc, findings),
            "define" if active => self.define(rest, loc, findings),
            "undef" if active => {
                self.defines.remove(rest);
            }
            "ifdef" => conds.push((self.defines.contains_key(rest), active && self.defines.contains_key(rest))),
            "ifndef" => {
                let hit = !self.defines.contains_key(rest);
                conds.push((hit, active && hit));
            }
            "if" => {
                // Expression conditionals are approximated: `defined(X)` is
                // evaluated, anything else keeps the block active so no
                // declarations are lost.
                let hit = eval_if_expr(rest, &self.defines);
                conds.push((hit, active && hit));
            }
            "elif" => {
                if let Some((taken, _)) = conds.pop() {
                    let outer = conds.iter().all(|(_, a)| *a);
                    let hit = !taken && eval_if_expr(rest, &self.defines);
                    conds.push((taken || hit, outer && hit));
                }
            }
            "else" => {
                if let Some((taken, _)) = conds.pop() {
                    let outer = conds.iter().all(|(_, a)| *a);
                    conds.push((true, outer && !taken));
                }
            }
            "endif" => {
                if conds.pop().is_none() {
                    findings.syntax(loc.clone(), "#endif without matching #if");
                }
            }
            "pragma" | "error" | "warning" => {}
            "include" | "define" | "undef" => {}
            other => findings.syntax(loc.clone(), format!("unsupported directive `#{other}`")),
        }
    }

    fn include(&mut self, spec: &str, loc: &SourceLoc, findings: &mut Findings) {
        let name = spec
            .trim_start_matches(['<', '"'])
            .trim_end_matches(['>', '"']);
        let mut candidates: Vec<PathBuf> = Vec::new();
        if spec.starts_with('"') {
            if let Some(dir) = Path::new(&loc.file).parent() {
                candidates.push(dir.join(name));
            }
        }
        for dir in &self.options.include_dirs {
            candidates.push(dir.join(name));
        }
        for candidate in candidates {
            if let Ok(source) = fs::read_to_string(&candidate) {
                self.depth += 1;
                let file = candidate.display().to_string();
                self.process(&source, &file, findings);
                self.depth -= 1;
                return;
            }
        }
        findings.push(IngestError::MissingDependency {
            loc: loc.clone(),
            message: format!("cannot resolve include `{name}`"),
        });
    }

    fn define(&mut self, rest: &str, loc: &SourceLoc, findings: &mut Findings) {
        let (name, value) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        if name.contains('(') {
            // Function-like macros are outside the supported subset. Report
            // once at the definition; expansion sites then read as plain
            // identifiers and fail loudly where it matters.
            findings.syntax(
                loc.clone(),
                format!("function-like macro `{}` is not supported", name),
            );
            return;
        }
        let value = value.trim().to_string();
        if looks_numeric(&value) {
            self.constants
                .push((name.to_string(), (value.clone(), loc.clone())));
        }
        self.defines.insert(name.to_string(), value);
    }
}

/// Evaluate the `defined(X)` subset of `#if` expressions; unknown
/// expressions stay active so declarations are never dropped silently.
fn eval_if_expr(expr: &str, defines: &BTreeMap<String, String>) -> bool {
    let expr = expr.trim();
    if let Some(inner) = expr
        .strip_prefix("defined(")
        .and_then(|s| s.strip_suffix(')'))
    {
        return defines.contains_key(inner.trim());
    }
    if let Some(inner) = expr
        .strip_prefix("!defined(")
        .and_then(|s| s.strip_suffix(')'))
    {
        return !defines.contains_key(inner.trim());
    }
    if expr == "0" {
        return false;
    }
    true
}

fn looks_numeric(value: &str) -> bool {
    let v = value.trim().trim_start_matches('(').trim_end_matches(')');
    let v = v
        .trim_end_matches(['u', 'U', 'l', 'L'])
        .trim_start_matches('-');
    !v.is_empty()
        && (v.starts_with("0x")
            || v.starts_with("0X")
            || v.chars().all(|c| c.is_ascii_digit()))
}

/// Remove `//` and `/* */` comments, preserving line structure.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_block = false;
    while let Some(c) = chars.next() {
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
                out.push(' ');
            } else if c == '\n' {
                out.push('\n');
            }
        } else if c == '/' && chars.peek() == Some(&'/') {
            for c in chars.by_ref() {
                if c == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            in_block = true;
        } else {
            out.push(c);
        }
    }
    out
}

// ---- tokenizer -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Ident(String),
    Number(String),
    Punct(char),
    Str(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    loc: SourceLoc,
}

fn tokenize(
    lines: &[(String, SourceLoc)],
    defines: &BTreeMap<String, String>,
    findings: &mut Findings,
) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (line, loc) in lines {
        tokenize_line(line, loc, defines, 0, &mut tokens, findings);
    }
    tokens
}

fn tokenize_line(
    line: &str,
    loc: &SourceLoc,
    defines: &BTreeMap<String, String>,
    depth: u32,
    out: &mut Vec<Token>,
    findings: &mut Findings,
) {
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if c == '"' {
            let mut s = String::new();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                s.push(c);
            }
            out.push(Token {
                kind: TokenKind::Str(s),
                loc: loc.clone(),
            });
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::from(c);
            while let Some(&n) = chars.peek() {
                if n.is_ascii_alphanumeric() || n == '_' {
                    ident.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            match defines.get(&ident) {
                Some(replacement) if depth < 16 => {
                    if !replacement.is_empty() {
                        tokenize_line(replacement, loc, defines, depth + 1, out, findings);
                    }
                }
                _ => out.push(Token {
                    kind: TokenKind::Ident(ident),
                    loc: loc.clone(),
                }),
            }
        } else if c.is_ascii_digit() {
            let mut number = String::from(c);
            while let Some(&n) = chars.peek() {
                if n.is_ascii_alphanumeric() || n == '.' {
                    number.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            out.push(Token {
                kind: TokenKind::Number(number),
                loc: loc.clone(),
            });
        } else {
            out.push(Token {
                kind: TokenKind::Punct(c),
                loc: loc.clone(),
            });
        }
    }
}

// ---- declaration parser ----------------------------------------------------

struct DeclParser {
    tokens: Vec<Token>,
    pos: usize,
    registry: RawRegistry,
    findings: Findings,
}

impl DeclParser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn loc(&self) -> SourceLoc {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.loc.clone())
            .unwrap_or_else(SourceLoc::internal)
    }

    fn bump(&mut self) -> Option<TokenKind> {
        let t = self.tokens.get(self.pos).map(|t| t.kind.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_punct(&mut self, p: char) -> bool {
        if self.peek() == Some(&TokenKind::Punct(p)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(TokenKind::Ident(i)) if i == kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> Option<String> {
        match self.peek() {
            Some(TokenKind::Ident(i)) => {
                let i = i.clone();
                self.pos += 1;
                Some(i)
            }
            _ => None,
        }
    }

    /// Skip to just past the next `;`, balancing braces.
    fn recover(&mut self) {
        let mut depth = 0u32;
        while let Some(kind) = self.bump() {
            match kind {
                TokenKind::Punct('{') => depth += 1,
                TokenKind::Punct('}') => depth = depth.saturating_sub(1),
                TokenKind::Punct(';') if depth == 0 => return,
                _ => {}
            }
        }
    }

    fn run(&mut self) {
        while self.pos < self.tokens.len() {
            let loc = self.loc();
            if self.eat_ident("typedef") {
                self.parse_typedef(loc);
            } else if matches!(self.peek(), Some(TokenKind::Ident(i)) if i == "struct" || i == "union" || i == "enum")
            {
                // Non-typedef tag definition.
                self.parse_tag_definition(loc);
            } else if matches!(self.peek(), Some(TokenKind::Ident(_))) {
                self.parse_prototype(loc);
            } else if self.eat_punct(';') {
                // Stray semicolon.
            } else {
                self.findings
                    .syntax(loc, "unrecognized construct at top level");
                self.recover();
            }
        }
    }

    fn parse_typedef(&mut self, loc: SourceLoc) {
        if self.eat_ident("enum") {
            self.parse_enum_body(loc);
        } else if self.eat_ident("struct") {
            self.parse_struct_body(loc, false);
        } else if self.eat_ident("union") {
            self.parse_struct_body(loc, true);
        } else {
            // `typedef <type> <name>;` or function-pointer typedef.
            let Some(ty) = self.parse_type_ref() else {
                self.findings.syntax(loc, "malformed typedef");
                self.recover();
                return;
            };
            if self.eat_punct('(') {
                self.parse_funcpointer_typedef(loc, ty);
                return;
            }
            let Some(name) = self.expect_ident() else {
                self.findings.syntax(loc, "typedef without a name");
                self.recover();
                return;
            };
            self.recover();
            self.push_type(RawType {
                name,
                kind: RawTypeKind::Alias { target: ty.base },
                loc,
            });
        }
    }

    fn parse_tag_definition(&mut self, loc: SourceLoc) {
        let is_enum = self.eat_ident("enum");
        let is_union = if is_enum { false } else { self.eat_ident("union") };
        if !is_enum && !is_union {
            self.eat_ident("struct");
        }
        if is_enum {
            self.parse_enum_body(loc);
        } else {
            self.parse_struct_body(loc, is_union);
        }
    }

    /// `[tag] { A = 1, B, } [name];`
    fn parse_enum_body(&mut self, loc: SourceLoc) {
        let tag = self.expect_ident();
        if !self.eat_punct('{') {
            // Forward declaration or alias of an enum tag.
            self.recover();
            if let Some(tag) = tag {
                self.push_type(RawType {
                    name: tag,
                    kind: RawTypeKind::Opaque,
                    loc,
                });
            }
            return;
        }

        let mut constants = Vec::new();
        loop {
            if self.eat_punct('}') {
                break;
            }
            let loc = self.loc();
            let Some(name) = self.expect_ident() else {
                self.findings.syntax(loc, "malformed enum constant");
                self.recover();
                return;
            };
            let mut value = String::new();
            if self.eat_punct('=') {
                while let Some(kind) = self.peek() {
                    match kind {
                        TokenKind::Punct(',') | TokenKind::Punct('}') => break,
                        _ => {
                            if let Some(t) = self.bump() {
                                push_token_text(&mut value, &t);
                            }
                        }
                    }
                }
            }
            constants.push(RawConstant {
                name,
                value,
                groups: Vec::new(),
                loc,
            });
            self.eat_punct(',');
        }

        let name = self.expect_ident().or(tag);
        self.recover();
        let Some(name) = name else {
            self.findings.syntax(loc, "enum without a name");
            return;
        };
        self.registry.items.push(RawItem::Enums(RawEnumBlock {
            name,
            bitmask: false,
            underlying: None,
            constants,
            loc,
        }));
    }

    /// `[tag] { members } [name];` — dispatches COM vtables to commands.
    fn parse_struct_body(&mut self, loc: SourceLoc, is_union: bool) {
        let tag = self.expect_ident();
        if !self.eat_punct('{') {
            self.recover();
            if let Some(tag) = tag {
                self.push_type(RawType {
                    name: tag,
                    kind: RawTypeKind::Opaque,
                    loc,
                });
            }
            return;
        }

        let mut members = Vec::new();
        let mut methods = Vec::new();
        loop {
            if self.eat_punct('}') {
                break;
            }
            if self.pos >= self.tokens.len() {
                self.findings.syntax(loc.clone(), "unterminated struct body");
                return;
            }
            self.parse_struct_member(&mut members, &mut methods);
        }

        let name = self.expect_ident().or(tag);
        self.recover();
        let Some(name) = name else {
            self.findings.syntax(loc, "struct without a name");
            return;
        };

        if let Some(interface) = name.strip_suffix("Vtbl") {
            // COM method table: each member is an interface method.
            for mut method in methods {
                method.interface = Some(interface.to_string());
                self.registry.items.push(RawItem::Command(method));
            }
            return;
        }
        // Function pointers inside ordinary structs (callback tables) stay
        // members with an untyped pointer shape.
        for method in methods {
            members.push(RawMember::new(
                method.name,
                RawTypeRef::pointer("void", false),
                method.loc,
            ));
        }
        self.push_type(RawType {
            name,
            kind: RawTypeKind::Struct {
                members,
                is_union,
                extends: Vec::new(),
            },
            loc,
        });
    }

    /// One struct member; method-pointer members are collected separately.
    fn parse_struct_member(&mut self, members: &mut Vec<RawMember>, methods: &mut Vec<RawCommand>) {
        let loc = self.loc();
        let annotations = self.parse_annotations();
        let Some(ty) = self.parse_type_ref() else {
            self.findings.syntax(loc, "malformed struct member");
            self.recover();
            return;
        };

        if self.eat_punct('(') {
            // `ret (*Name)(params);` — method pointer.
            self.eat_punct('*');
            let Some(name) = self.expect_ident() else {
                self.findings.syntax(loc, "malformed method pointer");
                self.recover();
                return;
            };
            if !(self.eat_punct(')') && self.eat_punct('(')) {
                self.findings.syntax(loc, "malformed method pointer");
                self.recover();
                return;
            }
            let params = self.parse_params();
            self.recover();
            methods.push(RawCommand {
                name,
                ret: ty,
                params,
                category: None,
                interface: None,
                loc,
            });
            return;
        }

        let Some(name) = self.expect_ident() else {
            self.findings.syntax(loc, "struct member without a name");
            self.recover();
            return;
        };
        let mut ty = ty;
        if self.eat_punct('[') {
            let mut extent = String::new();
            while let Some(kind) = self.peek() {
                if kind == &TokenKind::Punct(']') {
                    break;
                }
                if let Some(t) = self.bump() {
                    push_token_text(&mut extent, &t);
                }
            }
            self.eat_punct(']');
            ty.array_len = Some(extent);
        }
        self.recover();

        let mut member = RawMember::new(name, ty, loc);
        annotations.apply(&mut member);
        members.push(member);
    }

    /// `ret name(params);`
    fn parse_prototype(&mut self, loc: SourceLoc) {
        let Some(ty) = self.parse_type_ref() else {
            self.findings.syntax(loc, "unrecognized construct");
            self.recover();
            return;
        };
        let Some(name) = self.expect_ident() else {
            self.findings
                .syntax(loc, format!("expected declaration after `{}`", ty.base));
            self.recover();
            return;
        };
        if !self.eat_punct('(') {
            // A global variable or similar; not part of the API surface.
            self.findings
                .syntax(loc, format!("unsupported declaration `{name}`"));
            self.recover();
            return;
        }
        let params = self.parse_params();
        self.recover();
        self.registry.items.push(RawItem::Command(RawCommand {
            name,
            ret: ty,
            params,
            category: None,
            interface: None,
            loc,
        }));
    }

    fn parse_params(&mut self) -> Vec<RawMember> {
        let mut params = Vec::new();
        if self.eat_punct(')') {
            return params;
        }
        loop {
            let loc = self.loc();
            let annotations = self.parse_annotations();
            let Some(ty) = self.parse_type_ref() else {
                self.findings.syntax(loc, "malformed parameter");
                // Skip to ')' conservatively.
                while let Some(kind) = self.peek() {
                    if kind == &TokenKind::Punct(')') {
                        break;
                    }
                    self.pos += 1;
                }
                self.eat_punct(')');
                return params;
            };
            if ty.base == "void" && ty.pointers.is_empty() && self.peek() == Some(&TokenKind::Punct(')'))
            {
                self.eat_punct(')');
                return params;
            }
            let name = self
                .expect_ident()
                .unwrap_or_else(|| format!("arg{}", params.len()));
            let mut member = RawMember::new(name, ty, loc);
            annotations.apply(&mut member);
            params.push(member);
            if self.eat_punct(')') {
                return params;
            }
            if !self.eat_punct(',') {
                self.findings
                    .syntax(self.loc(), "expected `,` or `)` in parameter list");
                self.recover();
                return params;
            }
        }
    }

    /// `typedef ret (*PFN)(params);` — the `(` has been consumed.
    fn parse_funcpointer_typedef(&mut self, loc: SourceLoc, ret: RawTypeRef) {
        self.eat_punct('*');
        let Some(name) = self.expect_ident() else {
            self.findings.syntax(loc, "malformed function-pointer typedef");
            self.recover();
            return;
        };
        if !(self.eat_punct(')') && self.eat_punct('(')) {
            self.findings.syntax(loc, "malformed function-pointer typedef");
            self.recover();
            return;
        }
        let params = self.parse_params();
        self.recover();
        self.push_type(RawType {
            name,
            kind: RawTypeKind::FunctionPointer {
                ret,
                params: params.into_iter().map(|p| p.ty).collect(),
            },
            loc,
        });
    }

    /// `[const] [struct] ident [*]*`
    fn parse_type_ref(&mut self) -> Option<RawTypeRef> {
        let mut leading_const = false;
        loop {
            if self.eat_ident("const") {
                leading_const = true;
            } else if self.eat_ident("struct") || self.eat_ident("enum") || self.eat_ident("union")
            {
                // Tag-qualified reference.
            } else {
                break;
            }
        }
        let mut base = self.expect_ident()?;
        // `unsigned int`, `unsigned long long`, …
        if base == "unsigned" || base == "signed" || base == "long" {
            while matches!(self.peek(), Some(TokenKind::Ident(i)) if i == "int" || i == "long" || i == "char" || i == "short")
            {
                if let Some(TokenKind::Ident(i)) = self.bump() {
                    base = format!("{base} {i}");
                }
            }
        }

        let mut pointers = Vec::new();
        let mut next_const = leading_const;
        loop {
            if self.eat_punct('*') {
                pointers.push(if next_const {
                    PointerConst::Const
                } else {
                    PointerConst::Mut
                });
                next_const = false;
            } else if self.eat_ident("const") {
                next_const = true;
            } else {
                break;
            }
        }
        Some(RawTypeRef {
            base,
            pointers,
            array_len: None,
        })
    }

    /// SAL-style annotations preceding a parameter or member.
    fn parse_annotations(&mut self) -> Annotations {
        let mut out = Annotations::default();
        loop {
            let Some(TokenKind::Ident(ident)) = self.peek() else {
                return out;
            };
            let ident = ident.clone();
            match ident.as_str() {
                "_In_" => out.direction = Some("in"),
                "_Out_" => out.direction = Some("out"),
                "_Inout_" => out.direction = Some("inout"),
                "_In_opt_" => {
                    out.direction = Some("in");
                    out.optional = true;
                }
                "_Out_opt_" => {
                    out.direction = Some("out");
                    out.optional = true;
                }
                "_Inout_opt_" => {
                    out.direction = Some("inout");
                    out.optional = true;
                }
                "_In_reads_" | "_In_reads_opt_" | "_Out_writes_" | "_Out_writes_opt_"
                | "_Field_size_" | "_Field_size_opt_" => {
                    self.pos += 1;
                    out.direction = Some(if ident.starts_with("_In") { "in" } else { "out" });
                    out.optional = ident.contains("_opt_");
                    out.len = self.parse_annotation_arg();
                    continue;
                }
                _ => return out,
            }
            self.pos += 1;
        }
    }

    fn parse_annotation_arg(&mut self) -> Option<String> {
        if !self.eat_punct('(') {
            return None;
        }
        let mut arg = String::new();
        let mut depth = 1u32;
        while let Some(kind) = self.bump() {
            match kind {
                TokenKind::Punct('(') => {
                    depth += 1;
                    arg.push('(');
                }
                TokenKind::Punct(')') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    arg.push(')');
                }
                other => push_token_text(&mut arg, &other),
            }
        }
        Some(arg)
    }

    fn push_type(&mut self, ty: RawType) {
        if let Some(existing) = self
            .registry
            .types()
            .find(|t| t.name == ty.name && t.kind != ty.kind)
        {
            // Opaque forward declarations are compatible with any later shape.
            if !matches!(existing.kind, RawTypeKind::Opaque) {
                self.findings.push(IngestError::Ambiguous {
                    loc: ty.loc.clone(),
                    name: ty.name.clone(),
                    message: format!("previously declared at {}", existing.loc),
                });
                return;
            }
        }
        self.registry.items.push(RawItem::Type(ty));
    }
}

#[derive(Debug, Default)]
struct Annotations {
    direction: Option<&'static str>,
    optional: bool,
    len: Option<String>,
}

impl Annotations {
    fn apply(&self, member: &mut RawMember) {
        member.direction = self.direction.map(str::to_string);
        member.optional = self.optional;
        if member.len.is_none() {
            member.len = self.len.clone();
        }
    }
}

fn push_token_text(out: &mut String, token: &TokenKind) {
    match token {
        TokenKind::Ident(i) => {
            if !out.is_empty() && !out.ends_with(['(', '*', '-', '~']) {
                out.push(' ');
            }
            out.push_str(i);
        }
        TokenKind::Number(n) => {
            if !out.is_empty() && !out.ends_with(['(', '*', '-', '~']) {
                out.push(' ');
            }
            out.push_str(n);
        }
        TokenKind::Punct(p) => out.push(*p),
        TokenKind::Str(s) => out.push_str(s),
    }
}
