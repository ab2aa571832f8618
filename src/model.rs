use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lexer::squash_whitespace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    pub fn is_python(self) -> bool {
        matches!(self, Language::Python)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One formal parameter of a function header.
///
/// `name` keeps `*`/`**`/`...` prefixes as written. `annotation` holds the raw
/// type annotation text and never takes part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl Parameter {
    /// Syntactic equality on name, position and default text, ignoring
    /// whitespace outside string literals.
    pub fn same_binding(&self, other: &Parameter) -> bool {
        self.name == other.name
            && self.position == other.position
            && self.default.as_deref().map(squash_whitespace)
                == other.default.as_deref().map(squash_whitespace)
    }

    /// Python `*args` / `**kwargs` and JS `...rest`.
    pub fn is_variadic(&self) -> bool {
        let n = self.name.as_str();
        (n.starts_with('*') && n.len() > 1 && !n.starts_with("**")) || n.starts_with("...")
    }

    /// Python `**kwargs`.
    pub fn is_keyword_variadic(&self) -> bool {
        self.name.starts_with("**")
    }

    /// Python bare `*` and `/` markers; they never bind an argument.
    pub fn is_separator(&self) -> bool {
        self.name == "*" || self.name == "/"
    }

    fn render(&self) -> String {
        let mut out = self.name.clone();
        match (&self.annotation, &self.default) {
            (Some(ann), Some(def)) => {
                out.push_str(": ");
                out.push_str(ann);
                out.push_str(" = ");
                out.push_str(def);
            }
            (Some(ann), None) => {
                out.push_str(": ");
                out.push_str(ann);
            }
            (None, Some(def)) => {
                out.push('=');
                out.push_str(def);
            }
            (None, None) => {}
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub function_name: String,
    pub parameters: Vec<Parameter>,
    pub language: Language,
}

impl Signature {
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Structural equality of the parameter lists (names, positions, defaults, count).
    pub fn same_parameters(&self, other: &Signature) -> bool {
        self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| a.same_binding(b))
    }

    /// `name(a, b=1)`.
    pub fn render(&self) -> String {
        let params: Vec<String> = self.parameters.iter().map(Parameter::render).collect();
        format!("{}({})", self.function_name, params.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub signature: Signature,
    /// Repo-relative path with `/` separators.
    pub file: String,
    /// 1-based line of the header.
    pub line: usize,
}

impl FunctionDefinition {
    pub fn name(&self) -> &str {
        &self.signature.function_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSite {
    pub function_name: String,
    pub file: String,
    pub line: usize,
    /// 1-based column of the first character of the function name.
    pub column: usize,
    /// From the function name through the matching `)`, verbatim.
    pub call_text: String,
    /// Raw argument expressions in call order.
    pub arguments: Vec<String>,
    /// `obj.name(...)` rather than a bare `name(...)`.
    pub member_call: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    #[serde(rename = "function")]
    pub function_name: String,
    pub file: String,
    pub line: usize,
    pub old_code: String,
    pub new_code: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_arguments: Vec<String>,
}
