//! Parameterized passages: header/call parsing and argument binding.
//!
//! A passage opts into parameterization by registering a header like
//! `Greet(name, greeting="Hello")`. Call sites such as
//! `Greet("Ann", {$formal ? "Good day" : "Hi"})` are parsed with a
//! quote- and bracket-depth-aware splitter, bound positionally to the
//! header, and resolved against the caller's variable scope plus an
//! injected expression evaluator.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::schema::value::{Argument, Value};

#[derive(Debug, Error)]
pub enum PassageError {
    #[error("passage parse error: {0}")]
    Parse(String),
    #[error("passage '{passage}': required parameter '{param}' follows a defaulted one")]
    RequiredAfterOptional { passage: String, param: String },
    #[error("no header registered for passage '{0}'")]
    UnknownPassage(String),
    #[error("passage '{passage}': missing argument for required parameter '{param}'")]
    MissingArgument { passage: String, param: String },
    #[error("passage '{passage}' expects at least {required} argument(s), got {got}")]
    TooFewArgs {
        passage: String,
        required: usize,
        got: usize,
    },
    #[error("passage '{passage}' accepts at most {max} argument(s), got {got}")]
    TooManyArgs {
        passage: String,
        max: usize,
        got: usize,
    },
}

/// One declared passage parameter, with an optional default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageParam {
    pub name: String,
    pub default: Option<Argument>,
}

/// A parsed passage header: `Name` or `Name(param[=default], ...)`.
///
/// Defaulted parameters must trail required ones; a header violating
/// that is rejected at parse time, because purely positional binding
/// would otherwise silently swallow a later required argument into an
/// earlier optional slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageHeader {
    pub name: String,
    pub params: Vec<PassageParam>,
}

/// A parsed call site: `Name` or `Name(arg, ...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageCall {
    pub target: String,
    pub args: Vec<Argument>,
}

/// Parameter names matched to call arguments, in header order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageBinding {
    pub passage: String,
    pub bindings: Vec<(String, Argument)>,
}

impl PassageHeader {
    pub fn parse(input: &str) -> Result<PassageHeader, PassageError> {
        let (name, body) = split_name_and_body(input)?;
        let mut params = Vec::new();
        let mut seen_default = false;
        if let Some(body) = body {
            for raw in split_arguments(&body)? {
                let param = Self::parse_param(&raw)?;
                if param.default.is_some() {
                    seen_default = true;
                } else if seen_default {
                    return Err(PassageError::RequiredAfterOptional {
                        passage: name,
                        param: param.name,
                    });
                }
                if params.iter().any(|p: &PassageParam| p.name == param.name) {
                    return Err(PassageError::Parse(format!(
                        "duplicate parameter '{}' in '{name}'",
                        param.name
                    )));
                }
                params.push(param);
            }
        }
        Ok(PassageHeader { name, params })
    }

    fn parse_param(raw: &str) -> Result<PassageParam, PassageError> {
        let raw = raw.trim();
        let (name, default) = match raw.split_once('=') {
            Some((name, default)) => (name.trim(), Some(parse_argument(default))),
            None => (raw, None),
        };
        if !is_identifier(name) {
            return Err(PassageError::Parse(format!(
                "invalid parameter name '{name}'"
            )));
        }
        Ok(PassageParam {
            name: name.to_string(),
            default,
        })
    }

    /// Number of parameters without defaults.
    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }
}

impl PassageCall {
    pub fn parse(input: &str) -> Result<PassageCall, PassageError> {
        let (target, body) = split_name_and_body(input)?;
        let mut args = Vec::new();
        if let Some(body) = body {
            for raw in split_arguments(&body)? {
                args.push(parse_argument(&raw));
            }
        }
        Ok(PassageCall { target, args })
    }
}

/// Split `Name` / `Name(...)` into the name and the optional
/// parenthesized body.
fn split_name_and_body(input: &str) -> Result<(String, Option<String>), PassageError> {
    let input = input.trim();
    let Some(open) = input.find('(') else {
        if !is_identifier(input) {
            return Err(PassageError::Parse(format!(
                "invalid passage name '{input}'"
            )));
        }
        return Ok((input.to_string(), None));
    };
    if !input.ends_with(')') {
        return Err(PassageError::Parse(format!(
            "expected trailing ')' in '{input}'"
        )));
    }
    let name = input[..open].trim();
    if !is_identifier(name) {
        return Err(PassageError::Parse(format!(
            "invalid passage name '{name}'"
        )));
    }
    let body = input[open + 1..input.len() - 1].to_string();
    Ok((name.to_string(), Some(body)))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split a comma-separated argument body, respecting string quotes
/// and `()`/`[]`/`{}` nesting so literals and nested calls are never
/// mis-split. An empty body yields no arguments.
fn split_arguments(body: &str) -> Result<Vec<String>, PassageError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in body.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' | '}' => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        PassageError::Parse(format!("unbalanced '{c}' in '{body}'"))
                    })?;
                    current.push(c);
                }
                ',' if depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }

    if quote.is_some() {
        return Err(PassageError::Parse(format!(
            "unterminated string in '{body}'"
        )));
    }
    if depth != 0 {
        return Err(PassageError::Parse(format!(
            "unbalanced brackets in '{body}'"
        )));
    }
    let tail = current.trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail.to_string());
    }
    Ok(parts)
}

/// Parse one argument token into its closed variant.
///
/// Quoted text becomes a string literal (quotes stripped); `true` and
/// `false` become booleans; a bare numeric becomes a number only when
/// it round-trips exactly through `f64` formatting; `$name` is a
/// variable reference; `{expr}` is a deferred expression; anything
/// else is kept as a raw string.
pub fn parse_argument(raw: &str) -> Argument {
    let raw = raw.trim();
    for q in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return Argument::Literal(Value::String(raw[1..raw.len() - 1].to_string()));
        }
    }
    match raw {
        "true" => return Argument::Literal(Value::Bool(true)),
        "false" => return Argument::Literal(Value::Bool(false)),
        _ => {}
    }
    if let Ok(n) = raw.parse::<f64>() {
        if n.to_string() == raw {
            return Argument::Literal(Value::Number(n));
        }
    }
    if let Some(name) = raw.strip_prefix('$') {
        if is_identifier(name) {
            return Argument::Variable(name.to_string());
        }
    }
    if raw.len() >= 2 && raw.starts_with('{') && raw.ends_with('}') {
        return Argument::Expression(raw[1..raw.len() - 1].trim().to_string());
    }
    Argument::Literal(Value::String(raw.to_string()))
}

/// Registry of passage headers plus the positional argument binder.
#[derive(Debug, Default)]
pub struct PassageBinder {
    headers: FxHashMap<String, PassageHeader>,
}

impl PassageBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a header. Re-registering a name replaces
    /// the previous header.
    pub fn register(&mut self, header_text: &str) -> Result<(), PassageError> {
        let header = PassageHeader::parse(header_text)?;
        self.register_header(header);
        Ok(())
    }

    pub fn register_header(&mut self, header: PassageHeader) {
        self.headers.insert(header.name.clone(), header);
    }

    pub fn header(&self, passage: &str) -> Option<&PassageHeader> {
        self.headers.get(passage)
    }

    pub fn is_parameterized(&self, passage: &str) -> bool {
        self.headers.contains_key(passage)
    }

    /// Positionally match call arguments to the registered header,
    /// filling gaps from parameter defaults. Arguments beyond the
    /// parameter list are dropped; [`validate_call`](Self::validate_call)
    /// reports them.
    pub fn bind_arguments(
        &self,
        passage: &str,
        args: &[Argument],
    ) -> Result<PassageBinding, PassageError> {
        let Some(header) = self.headers.get(passage) else {
            warn!(passage, "cannot bind arguments: no header registered");
            return Err(PassageError::UnknownPassage(passage.to_string()));
        };
        let mut bindings = Vec::with_capacity(header.params.len());
        for (i, param) in header.params.iter().enumerate() {
            let arg = match args.get(i).or(param.default.as_ref()) {
                Some(arg) => arg.clone(),
                None => {
                    warn!(passage, param = %param.name, "missing required argument");
                    return Err(PassageError::MissingArgument {
                        passage: passage.to_string(),
                        param: param.name.clone(),
                    });
                }
            };
            bindings.push((param.name.clone(), arg));
        }
        Ok(PassageBinding {
            passage: passage.to_string(),
            bindings,
        })
    }

    /// Bind a parsed call site.
    pub fn bind_call(&self, call: &PassageCall) -> Result<PassageBinding, PassageError> {
        self.bind_arguments(&call.target, &call.args)
    }

    /// Resolve a binding to concrete values, in header order.
    ///
    /// Variable references look up the caller's scope and expression
    /// references go through the injected evaluator; either failing
    /// resolves to `Null` with a warning rather than aborting the
    /// passage entry.
    pub fn resolve_arguments<F>(
        &self,
        binding: &PassageBinding,
        variables: &FxHashMap<String, Value>,
        mut evaluator: F,
    ) -> Vec<(String, Value)>
    where
        F: FnMut(&str) -> Result<Value, String>,
    {
        binding
            .bindings
            .iter()
            .map(|(name, arg)| {
                let value = match arg {
                    Argument::Literal(value) => value.clone(),
                    Argument::Variable(var) => match variables.get(var) {
                        Some(value) => value.clone(),
                        None => {
                            warn!(
                                passage = %binding.passage,
                                variable = %var,
                                "unknown variable in argument; using null"
                            );
                            Value::Null
                        }
                    },
                    Argument::Expression(expr) => match evaluator(expr) {
                        Ok(value) => value,
                        Err(message) => {
                            warn!(
                                passage = %binding.passage,
                                expr = %expr,
                                %message,
                                "expression evaluation failed; using null"
                            );
                            Value::Null
                        }
                    },
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// Build the fresh variable scope for re-entering a passage with
    /// this binding.
    pub fn create_variable_scope<F>(
        &self,
        binding: &PassageBinding,
        variables: &FxHashMap<String, Value>,
        evaluator: F,
    ) -> FxHashMap<String, Value>
    where
        F: FnMut(&str) -> Result<Value, String>,
    {
        self.resolve_arguments(binding, variables, evaluator)
            .into_iter()
            .collect()
    }

    /// Arity check for a prospective call. Passages without a
    /// registered header always validate: parameterization is opt-in.
    pub fn validate_call(&self, passage: &str, arg_count: usize) -> Result<(), PassageError> {
        let Some(header) = self.headers.get(passage) else {
            return Ok(());
        };
        let required = header.required_count();
        if arg_count < required {
            return Err(PassageError::TooFewArgs {
                passage: passage.to_string(),
                required,
                got: arg_count,
            });
        }
        if arg_count > header.params.len() {
            return Err(PassageError::TooManyArgs {
                passage: passage.to_string(),
                max: header.params.len(),
                got: arg_count,
            });
        }
        Ok(())
    }
}
