use serde::{Deserialize, Serialize};

use crate::error::FormatError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormatOptions {
    /// Lines whose reformatted form would exceed this width keep their original text.
    pub print_width: usize,
    /// Spaces per nesting level when a tree is emitted without captured source.
    pub tab_width: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            print_width: 80,
            tab_width: 2,
        }
    }
}

impl FormatOptions {
    pub fn with_print_width(print_width: usize) -> Self {
        Self {
            print_width,
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, FormatError> {
        let options: FormatOptions = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        if self.print_width == 0 {
            return Err(FormatError::InvalidPrintWidth);
        }
        if self.tab_width == 0 {
            return Err(FormatError::InvalidTabWidth);
        }
        Ok(())
    }
}

/// Something the parser recovered from. Line numbers are one-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("line {line}: `{keyword}` has no open `if` at the same indentation")]
    OrphanElse { line: usize, keyword: String },
    #[error("line {line}: unbalanced `{open}` runs to the end of the input")]
    UnterminatedContinuation { line: usize, open: char },
    #[error("line {line}: `param` block is never closed with `}}`")]
    UnclosedParam { line: usize },
    #[error("line {line}: `}}` does not close any `param` block")]
    StrayClosingBrace { line: usize },
}

impl Diagnostic {
    pub fn line(&self) -> usize {
        match self {
            Diagnostic::OrphanElse { line, .. }
            | Diagnostic::UnterminatedContinuation { line, .. }
            | Diagnostic::UnclosedParam { line }
            | Diagnostic::StrayClosingBrace { line } => *line,
        }
    }
}
