//! Command templates.
//!
//! Placeholders take the form `{Name}` or `{Name:prefix%fmt}` with `fmt`
//! one of `%d`, `%f`, `%.Nf` or `%s`. A placeholder whose variable is unset
//! disappears together with its prefix; a boolean variable renders only its
//! prefix, and only when true. A `{` that is not followed by a letter is
//! literal text, so JSON payloads can be templated directly.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{ConfigError, Result};

/// Value bound to a template variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// Text.
    Text(String),
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Named template variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables(BTreeMap<String, Value>);

impl Variables {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Bind a variable, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Check if no variable is bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Format {
    Default,
    Integer,
    Fixed(usize),
    Text,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Placeholder {
        name: String,
        prefix: String,
        format: Format,
    },
}

/// Parsed command template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
}

impl Template {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTemplate`] for unterminated
    /// placeholders, bad names and unsupported formats.
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |message: String| ConfigError::InvalidTemplate {
            template: source.to_string(),
            message,
        };

        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            if !after.starts_with(|c: char| c.is_ascii_alphabetic()) {
                literal.push_str(&rest[..=open]);
                rest = after;
                continue;
            }

            literal.push_str(&rest[..open]);
            let close = after
                .find('}')
                .ok_or_else(|| invalid("unterminated placeholder".to_string()))?;
            let body = &after[..close];

            let (name, spec) = match body.split_once(':') {
                Some((name, spec)) => (name, Some(spec)),
                None => (body, None),
            };
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid(format!("invalid variable name '{}'", name)).into());
            }

            let (prefix, format) = match spec {
                None => (String::new(), Format::Default),
                Some(spec) => match spec.find('%') {
                    None => (spec.to_string(), Format::Default),
                    Some(pct) => {
                        let format = parse_format(&spec[pct..])
                            .ok_or_else(|| invalid(format!("unsupported format '{}'", &spec[pct..])))?;
                        (spec[..pct].to_string(), format)
                    }
                },
            };

            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(Token::Placeholder {
                name: name.to_string(),
                prefix,
                format,
            });
            rest = &after[close + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    /// Original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the variables the template references.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Placeholder { name, .. } => Some(name.as_str()),
            Token::Literal(_) => None,
        })
    }

    /// Render into command lines.
    ///
    /// A placeholder that renders nothing takes one adjoining space with it;
    /// other literal text is kept as written. Line ends are trimmed and
    /// empty lines dropped.
    pub fn render(&self, vars: &Variables) -> Vec<String> {
        let mut out = String::new();
        let mut gap = Gap::None;
        for token in &self.tokens {
            match token {
                Token::Literal(text) => {
                    let text = match gap {
                        Gap::Popped if !text.starts_with([' ', '\r', '\n']) => {
                            out.push(' ');
                            text.as_str()
                        }
                        Gap::LineStart => text.trim_start_matches(' '),
                        _ => text.as_str(),
                    };
                    out.push_str(text);
                    gap = Gap::None;
                }
                Token::Placeholder {
                    name,
                    prefix,
                    format,
                } => {
                    let mut rendered = String::new();
                    if let Some(value) = vars.get(name) {
                        render_value(&mut rendered, prefix, *format, value);
                    }
                    if rendered.is_empty() {
                        if out.ends_with(' ') {
                            out.pop();
                            gap = Gap::Popped;
                        } else if gap == Gap::None && (out.is_empty() || out.ends_with('\n')) {
                            gap = Gap::LineStart;
                        }
                    } else {
                        if gap == Gap::Popped {
                            out.push(' ');
                        }
                        out.push_str(&rendered);
                        gap = Gap::None;
                    }
                }
            }
        }

        out.lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Whitespace left behind by a placeholder that rendered nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gap {
    None,
    /// The space before it was removed.
    Popped,
    /// It sat at the start of a line.
    LineStart,
}

fn parse_format(spec: &str) -> Option<Format> {
    match spec {
        "%d" => Some(Format::Integer),
        "%f" => Some(Format::Fixed(6)),
        "%s" => Some(Format::Text),
        _ => {
            let digits = spec.strip_prefix("%.")?.strip_suffix('f')?;
            digits.parse().ok().map(Format::Fixed)
        }
    }
}

fn render_value(out: &mut String, prefix: &str, format: Format, value: &Value) {
    if let Value::Bool(flag) = value {
        if *flag {
            out.push_str(prefix);
        }
        return;
    }

    out.push_str(prefix);
    // Writing to a String cannot fail.
    let _ = match (value, format) {
        (Value::Float(v), Format::Integer) => write!(out, "{}", v.round() as i64),
        (Value::Float(v), Format::Fixed(p)) => write!(out, "{:.*}", p, v),
        (Value::Float(v), _) => write!(out, "{}", v),
        (Value::Int(v), Format::Fixed(p)) => write!(out, "{:.*}", p, *v as f64),
        (Value::Int(v), _) => write!(out, "{}", v),
        (Value::Text(s), _) => write!(out, "{}", s),
        (Value::Bool(_), _) => Ok(()),
    };
}
