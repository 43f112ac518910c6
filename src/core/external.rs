//! Host function boundary: declarations, validation, and dispatch.
//!
//! Scripts call host-application functions by name. A function may be
//! registered (callable, any args accepted), declared (typed signature
//! only; calling it raises an error), or both; the validator checks
//! arity always and runtime types when strict checking is on.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::schema::value::{ParamType, Value};

#[derive(Debug, Error)]
pub enum ExternalFnError {
    #[error("declaration parse error: {0}")]
    Parse(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{0}' is declared but has no registered callable")]
    NotRegistered(String),
    #[error("'{name}' expects at least {required} argument(s), got {got}")]
    TooFewArgs {
        name: String,
        required: usize,
        got: usize,
    },
    #[error("'{name}' accepts at most {max} argument(s), got {got}")]
    TooManyArgs { name: String, max: usize, got: usize },
    #[error("'{name}' argument '{param}' expects {expected}, got {got}")]
    TypeMismatch {
        name: String,
        param: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("host error in '{name}': {message}")]
    Host { name: String, message: String },
}

/// A callable supplied by the host application.
pub type HostFn = Box<dyn Fn(&[Value]) -> Result<Value, String>>;

/// One declared parameter in a function signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: ParamType,
    pub optional: bool,
}

/// A parsed function signature.
///
/// Grammar: `name(param[, param]*)[: returnType]` where each param is
/// `ident["?"][":" type]` and types are case-insensitive members of
/// {string, number, boolean, any} (anything else degrades to any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub return_type: ParamType,
}

impl FunctionDecl {
    /// Parse a declaration header string.
    pub fn parse(input: &str) -> Result<FunctionDecl, ExternalFnError> {
        let input = input.trim();
        let open = input
            .find('(')
            .ok_or_else(|| ExternalFnError::Parse(format!("missing '(' in '{input}'")))?;
        let close = input
            .rfind(')')
            .ok_or_else(|| ExternalFnError::Parse(format!("missing ')' in '{input}'")))?;
        if close < open {
            return Err(ExternalFnError::Parse(format!(
                "')' before '(' in '{input}'"
            )));
        }

        let name = input[..open].trim();
        if !is_identifier(name) {
            return Err(ExternalFnError::Parse(format!(
                "invalid function name '{name}'"
            )));
        }

        let return_type = match input[close + 1..].trim() {
            "" => ParamType::Any,
            rest => {
                let token = rest.strip_prefix(':').ok_or_else(|| {
                    ExternalFnError::Parse(format!("unexpected trailing '{rest}'"))
                })?;
                ParamType::parse(token)
            }
        };

        let mut params = Vec::new();
        let body = input[open + 1..close].trim();
        if !body.is_empty() {
            for raw in body.split(',') {
                params.push(Self::parse_param(raw)?);
            }
        }

        Ok(FunctionDecl {
            name: name.to_string(),
            params,
            return_type,
        })
    }

    fn parse_param(raw: &str) -> Result<ParamDecl, ExternalFnError> {
        let raw = raw.trim();
        let (ident_part, ty) = match raw.split_once(':') {
            Some((ident, ty)) => (ident.trim(), ParamType::parse(ty)),
            None => (raw, ParamType::Any),
        };
        let (name, optional) = match ident_part.strip_suffix('?') {
            Some(name) => (name.trim(), true),
            None => (ident_part, false),
        };
        if !is_identifier(name) {
            return Err(ExternalFnError::Parse(format!(
                "invalid parameter name '{name}'"
            )));
        }
        Ok(ParamDecl {
            name: name.to_string(),
            ty,
            optional,
        })
    }

    /// Number of non-optional parameters.
    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Default)]
struct FunctionEntry {
    callable: Option<HostFn>,
    decl: Option<FunctionDecl>,
}

/// Registry of host functions callable from scripts.
pub struct ExternalFunctions {
    entries: FxHashMap<String, FunctionEntry>,
    strict_types: bool,
}

impl fmt::Debug for ExternalFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalFunctions")
            .field("functions", &self.entries.keys().collect::<Vec<_>>())
            .field("strict_types", &self.strict_types)
            .finish()
    }
}

impl Default for ExternalFunctions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalFunctions {
    /// Strict type checking is on by default.
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            strict_types: true,
        }
    }

    pub fn set_strict_types(&mut self, strict: bool) {
        self.strict_types = strict;
    }

    /// Bind a callable under `name`, keeping any existing declaration.
    pub fn register<F>(&mut self, name: &str, callable: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + 'static,
    {
        debug!(name, "registered host function");
        self.entries
            .entry(name.to_string())
            .or_default()
            .callable = Some(Box::new(callable));
    }

    /// Attach or update a typed signature from a header string,
    /// keeping any existing callable. A declared-but-unregistered
    /// function validates calls but cannot be invoked.
    pub fn declare(&mut self, header: &str) -> Result<(), ExternalFnError> {
        let decl = FunctionDecl::parse(header)?;
        self.declare_parsed(decl);
        Ok(())
    }

    /// Attach a prebuilt signature.
    pub fn declare_parsed(&mut self, decl: FunctionDecl) {
        debug!(name = %decl.name, params = decl.params.len(), "declared host function");
        let name = decl.name.clone();
        self.entries.entry(name).or_default().decl = Some(decl);
    }

    pub fn unregister(&mut self, name: &str) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.callable = None;
        }
        self.prune(name);
    }

    pub fn undeclare(&mut self, name: &str) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.decl = None;
        }
        self.prune(name);
    }

    fn prune(&mut self, name: &str) {
        if self
            .entries
            .get(name)
            .is_some_and(|e| e.callable.is_none() && e.decl.is_none())
        {
            self.entries.remove(name);
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| e.callable.is_some())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.decl.is_some())
    }

    pub fn declaration(&self, name: &str) -> Option<&FunctionDecl> {
        self.entries.get(name).and_then(|e| e.decl.as_ref())
    }

    /// Registered or declared names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check a prospective call against the function's declaration.
    ///
    /// An undeclared (but registered) function accepts any arguments.
    /// With strict typing, each positional argument must match its
    /// declared type; `Null` is tolerated only for optional
    /// parameters.
    pub fn validate_args(&self, name: &str, args: &[Value]) -> Result<(), ExternalFnError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ExternalFnError::UnknownFunction(name.to_string()))?;
        let Some(decl) = &entry.decl else {
            return Ok(());
        };

        let required = decl.required_count();
        if args.len() < required {
            return Err(ExternalFnError::TooFewArgs {
                name: name.to_string(),
                required,
                got: args.len(),
            });
        }
        if args.len() > decl.params.len() {
            return Err(ExternalFnError::TooManyArgs {
                name: name.to_string(),
                max: decl.params.len(),
                got: args.len(),
            });
        }

        if self.strict_types {
            for (param, arg) in decl.params.iter().zip(args) {
                if arg.is_null() && param.optional {
                    continue;
                }
                if !param.ty.matches(arg) {
                    return Err(ExternalFnError::TypeMismatch {
                        name: name.to_string(),
                        param: param.name.clone(),
                        expected: param.ty.name(),
                        got: arg.type_name(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate and invoke. Validation failures and host failures are
    /// both surfaced as errors; nothing panics.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, ExternalFnError> {
        self.validate_args(name, args)?;
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ExternalFnError::UnknownFunction(name.to_string()))?;
        let callable = entry
            .callable
            .as_ref()
            .ok_or_else(|| ExternalFnError::NotRegistered(name.to_string()))?;
        callable(args).map_err(|message| ExternalFnError::Host {
            name: name.to_string(),
            message,
        })
    }
}
