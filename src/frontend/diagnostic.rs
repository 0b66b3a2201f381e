use thiserror::Error;

use super::ast::{Pool, Token};

pub const E_PARSE: &str = "E0001";
pub const E_UNKNOWN_TYPE: &str = "E1001";
pub const E_UNDEFINED_NAME: &str = "E1002";
pub const E_UNRESOLVED_CALL: &str = "E1003";
pub const E_VOID_EXPRESSION: &str = "E1004";
pub const E_COULDNT_ADD_BEFORE: &str = "E1100";
pub const E_COULDNT_REPLACE: &str = "E1101";
pub const E_INTERNAL: &str = "E1900";

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub message: String,
    pub token: Option<Token>,
    pub code: Option<&'static str>,
    /// Additional lines rendered after the message, in order.
    pub precisions: Vec<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, token: Option<Token>) -> Diagnostic {
        Diagnostic {
            message: message.into(),
            token,
            code: None,
            precisions: Vec::new(),
        }
    }

    pub fn code(mut self, code: &'static str) -> Diagnostic {
        self.code = Some(code);
        self
    }

    pub fn note(mut self, text: impl Into<String>) -> Diagnostic {
        self.precisions.push(text.into());
        self
    }

    pub fn help(mut self, text: impl Into<String>) -> Diagnostic {
        self.precisions.push(format!("help: {}", text.into()));
        self
    }
}

#[derive(Default)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, message: impl Into<String>, token: Option<Token>) {
        self.items.push(Diagnostic::new(message, token));
    }

    pub fn push_diag(&mut self, diag: Diagnostic) {
        self.items.push(diag);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Renders `<file>:<line>:<col>: ERROR: <message>` plus precisions and a
/// caret snippet of the offending line.
pub fn format_diagnostic(diag: &Diagnostic, pool: &Pool) -> String {
    let mut out = String::new();
    match diag.token {
        Some(token) => {
            out.push_str(&format!(
                "{}:{}:{}: ERROR: {}",
                pool.file_name(token.file),
                token.line,
                token.col,
                diag.message
            ));
            if let Some(code) = diag.code {
                out.push_str(&format!(" [{}]", code));
            }
            let source = pool
                .files
                .get(token.file.0 as usize)
                .map(|f| f.text.as_str())
                .unwrap_or("");
            let line_text = source
                .lines()
                .nth((token.line as usize).saturating_sub(1))
                .unwrap_or("");
            if !line_text.is_empty() {
                out.push('\n');
                out.push_str(&format!("  {}", line_text));
                out.push('\n');
                out.push_str(&format!(
                    "  {}{}",
                    " ".repeat((token.col as usize).saturating_sub(1)),
                    "^".repeat((token.len as usize).max(1))
                ));
            }
        }
        None => {
            out.push_str(&format!("ERROR: {}", diag.message));
            if let Some(code) = diag.code {
                out.push_str(&format!(" [{}]", code));
            }
        }
    }
    for p in &diag.precisions {
        out.push('\n');
        out.push_str(&format!("  {}", p));
    }
    out
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0:#}")]
    Read(anyhow::Error),

    #[error("{rendered}")]
    Parse { rendered: String, count: usize },

    #[error("{rendered}")]
    Resolve { rendered: String, count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_file_line_col_and_precisions() {
        let mut pool = Pool::new();
        let file = pool.add_file("demo.opal", "greet(42)\n");
        let token = Token {
            file,
            line: 1,
            col: 1,
            len: 5,
        };
        let d = Diagnostic::new("unresolved call to greet", Some(token))
            .code(E_UNRESOLVED_CALL)
            .note("no candidate in scope");
        let text = format_diagnostic(&d, &pool);
        assert!(text.starts_with("demo.opal:1:1: ERROR: unresolved call to greet"));
        assert!(text.contains("^^^^^"));
        assert!(text.contains("no candidate in scope"));
    }
}
