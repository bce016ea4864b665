//! Analysis prompt templates, keyed by the kind of content being snipped.
//!
//! A plain lookup: the prompt is cosmetic and has no bearing on how the
//! pipeline succeeds or fails.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptKind {
    #[default]
    General,
    JavaScript,
    Python,
    Debug,
}

const GENERAL: &str = "Analyze the image (it contains code or a problem description) and \
explain the solution or fix the code. Be concise and direct.";

const JAVASCRIPT: &str = "The image shows JavaScript code. Analyze it and explain the \
solution. Be concise and direct.";

const PYTHON: &str = "The image shows Python code. Analyze it and explain the solution. \
Be concise and direct.";

const DEBUG: &str = "The image shows code with an error. Identify and fix the errors. \
Give a concise solution.";

impl PromptKind {
    pub fn template(self) -> &'static str {
        match self {
            PromptKind::General => GENERAL,
            PromptKind::JavaScript => JAVASCRIPT,
            PromptKind::Python => PYTHON,
            PromptKind::Debug => DEBUG,
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PromptKind::General => "general",
            PromptKind::JavaScript => "javascript",
            PromptKind::Python => "python",
            PromptKind::Debug => "debug",
        };
        f.write_str(name)
    }
}

impl FromStr for PromptKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" | "" => Ok(PromptKind::General),
            "javascript" | "js" => Ok(PromptKind::JavaScript),
            "python" | "py" => Ok(PromptKind::Python),
            "debug" => Ok(PromptKind::Debug),
            other => Err(format!("unknown prompt kind '{}'", other)),
        }
    }
}
