//! The emitter template engine.
//!
//! Deliberately minimal: `{{var}}` substitution, `{{#if flag}}…{{/if}}`
//! conditional blocks and `{{#each list}}…{{/each}}` iteration, nothing
//! else. There is no expression language and no escape hatch; branching
//! decisions belong in emitter code, templates only lay out text. Rendering
//! is deterministic and side-effect-free, and an unknown placeholder is a
//! hard error rather than silent empty output.

use std::collections::BTreeMap;
use std::fmt;

/// A value bound into a template context.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Bool(bool),
    /// Iteration source: each entry is the scope for one `{{#each}}` pass.
    List(Vec<Context>),
}

/// Name → value bindings for one render.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn str(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), Value::Str(value.into()));
        self
    }

    pub fn flag(mut self, key: &str, value: bool) -> Self {
        self.values.insert(key.to_string(), Value::Bool(value));
        self
    }

    pub fn list(mut self, key: &str, value: Vec<Context>) -> Self {
        self.values.insert(key.to_string(), Value::List(value));
        self
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Template parse/render failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    pub message: String,
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TemplateError {}

fn err(message: impl Into<String>) -> TemplateError {
    TemplateError {
        message: message.into(),
    }
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Var(String),
    If { key: String, body: Vec<Node> },
    Each { key: String, body: Vec<Node> },
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut tokens = lex(source);
        let nodes = parse_nodes(&mut tokens, None)?;
        Ok(Self { nodes })
    }

    pub fn render(&self, context: &Context) -> Result<String, TemplateError> {
        let mut out = String::new();
        render_nodes(&self.nodes, context, &mut out)?;
        Ok(out)
    }
}

enum Token {
    Text(String),
    /// `{{name}}`, `{{#if name}}`, `{{#each name}}`, `{{/if}}`, `{{/each}}`
    Tag(String),
}

fn lex(source: &str) -> std::vec::IntoIter<Token> {
    let mut tokens = Vec::new();
    let mut rest = source;
    while let Some(open) = rest.find("{{") {
        if open > 0 {
            tokens.push(Token::Text(rest[..open].to_string()));
        }
        match rest[open..].find("}}") {
            Some(close) => {
                tokens.push(Token::Tag(rest[open + 2..open + close].trim().to_string()));
                rest = &rest[open + close + 2..];
            }
            None => {
                // Unterminated tag; surfaced by the parser as an unknown tag.
                tokens.push(Token::Tag(rest[open + 2..].trim().to_string()));
                rest = "";
            }
        }
    }
    if !rest.is_empty() {
        tokens.push(Token::Text(rest.to_string()));
    }
    tokens.into_iter()
}

fn parse_nodes(
    tokens: &mut std::vec::IntoIter<Token>,
    closing: Option<&str>,
) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();
    while let Some(token) = tokens.next() {
        match token {
            Token::Text(text) => nodes.push(Node::Text(text)),
            Token::Tag(tag) => {
                if let Some(key) = tag.strip_prefix("#if ") {
                    let body = parse_nodes(tokens, Some("/if"))?;
                    nodes.push(Node::If {
                        key: key.trim().to_string(),
                        body,
                    });
                } else if let Some(key) = tag.strip_prefix("#each ") {
                    let body = parse_nodes(tokens, Some("/each"))?;
                    nodes.push(Node::Each {
                        key: key.trim().to_string(),
                        body,
                    });
                } else if tag.starts_with('/') {
                    return if closing == Some(tag.as_str()) {
                        Ok(nodes)
                    } else {
                        Err(err(format!("unexpected closing tag `{{{{{tag}}}}}`")))
                    };
                } else if tag.starts_with('#') {
                    return Err(err(format!("unknown block tag `{{{{{tag}}}}}`")));
                } else if tag.is_empty() {
                    return Err(err("empty placeholder"));
                } else if !tag
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    // The engine has no expression language, by contract.
                    return Err(err(format!("invalid placeholder `{{{{{tag}}}}}`")));
                } else {
                    nodes.push(Node::Var(tag));
                }
            }
        }
    }
    match closing {
        Some(tag) => Err(err(format!("missing closing tag `{{{{{tag}}}}}`"))),
        None => Ok(nodes),
    }
}

fn render_nodes(nodes: &[Node], context: &Context, out: &mut String) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(key) => match context.get(key) {
                Some(Value::Str(s)) => out.push_str(s),
                Some(Value::Bool(_)) | Some(Value::List(_)) => {
                    return Err(err(format!("`{key}` is not a string value")));
                }
                None => return Err(err(format!("unknown placeholder `{key}`"))),
            },
            Node::If { key, body } => match context.get(key) {
                Some(Value::Bool(true)) => render_nodes(body, context, out)?,
                Some(Value::Bool(false)) => {}
                Some(_) => return Err(err(format!("`{key}` is not a flag"))),
                None => return Err(err(format!("unknown flag `{key}`"))),
            },
            Node::Each { key, body } => match context.get(key) {
                Some(Value::List(items)) => {
                    for item in items {
                        render_nodes(body, item, out)?;
                    }
                }
                Some(_) => return Err(err(format!("`{key}` is not a list"))),
                None => return Err(err(format!("unknown list `{key}`"))),
            },
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_variables() {
        let t = Template::parse("void {{name}}();").unwrap();
        let out = t.render(&Context::new().str("name", "Replay_vkQueueSubmit")).unwrap();
        assert_eq!(out, "void Replay_vkQueueSubmit();");
    }

    #[test]
    fn conditional_blocks() {
        let t = Template::parse("{{#if guard}}#pragma once\n{{/if}}body").unwrap();
        assert_eq!(
            t.render(&Context::new().flag("guard", true)).unwrap(),
            "#pragma once\nbody"
        );
        assert_eq!(t.render(&Context::new().flag("guard", false)).unwrap(), "body");
    }

    #[test]
    fn iterates_lists_in_order() {
        let t = Template::parse("{{#each fns}}void {{name}}();\n{{/each}}").unwrap();
        let ctx = Context::new().list(
            "fns",
            vec![
                Context::new().str("name", "a"),
                Context::new().str("name", "b"),
            ],
        );
        assert_eq!(t.render(&ctx).unwrap(), "void a();\nvoid b();\n");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let t = Template::parse("{{nope}}").unwrap();
        assert!(t.render(&Context::new()).is_err());
    }

    #[test]
    fn expressions_are_rejected_at_parse_time() {
        assert!(Template::parse("{{a + b}}").is_err());
        assert!(Template::parse("{{call()}}").is_err());
    }

    #[test]
    fn unbalanced_blocks_are_rejected() {
        assert!(Template::parse("{{#if x}}no close").is_err());
        assert!(Template::parse("{{/if}}").is_err());
    }

    #[test]
    fn rendering_is_deterministic() {
        let t = Template::parse("{{#each xs}}{{v}},{{/each}}").unwrap();
        let ctx = Context::new().list(
            "xs",
            vec![Context::new().str("v", "1"), Context::new().str("v", "2")],
        );
        assert_eq!(t.render(&ctx).unwrap(), t.render(&ctx).unwrap());
    }
}
