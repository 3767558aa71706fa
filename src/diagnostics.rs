//! Diagnostic rendering for compilation errors.
//!
//! The codegen core reports errors against resolved-IR tokens rather than
//! source text (the parser and resolver are external), so rendering here is
//! limited to headers, locations, and the message body:
//! - ANSI color support with explicit enablement
//! - Elm-style header lines per error kind
//! - A summary line for multi-error compilations

use crate::codegen::LowerError;
use crate::rir::Tok;

/// ANSI color codes for terminal output
#[derive(Debug, Clone)]
pub struct Colors {
    pub enabled: bool,
}

impl Colors {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn red(&self) -> &'static str {
        if self.enabled { "\x1b[31m" } else { "" }
    }

    pub fn cyan(&self) -> &'static str {
        if self.enabled { "\x1b[36m" } else { "" }
    }

    pub fn yellow(&self) -> &'static str {
        if self.enabled { "\x1b[33m" } else { "" }
    }

    pub fn bold(&self) -> &'static str {
        if self.enabled { "\x1b[1m" } else { "" }
    }

    pub fn reset(&self) -> &'static str {
        if self.enabled { "\x1b[0m" } else { "" }
    }
}

impl Default for Colors {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Format the error header line.
///
/// Example: `-- UNSUPPORTED CONSTRUCT ----------------------------------------`
pub fn format_header(error_kind: &str, colors: &Colors) -> String {
    let dashes = "-".repeat(60usize.saturating_sub(error_kind.len() + 4));
    format!(
        "{}-- {} {}{}",
        colors.cyan(),
        error_kind,
        dashes,
        colors.reset()
    )
}

/// Format a token location line.
///
/// Example: `program.slt:12:15`
pub fn format_location(filename: Option<&str>, tok: &Tok, colors: &Colors) -> String {
    let file = filename.unwrap_or("<program>");
    format!(
        "{}{}:{}:{}{}",
        colors.bold(),
        file,
        tok.line,
        tok.col,
        colors.reset()
    )
}

fn header_for(err: &LowerError) -> &'static str {
    match err {
        LowerError::Unsupported { .. } => "UNSUPPORTED CONSTRUCT",
        LowerError::Internal { .. } => "INTERNAL ERROR",
        LowerError::Io { .. } => "OUTPUT ERROR",
        LowerError::Tool { .. } => "NATIVE TOOL FAILURE",
    }
}

/// Render one error as a multi-line report.
pub fn render(err: &LowerError, filename: Option<&str>, colors: &Colors) -> String {
    let mut out = String::new();
    out.push_str(&format_header(header_for(err), colors));
    out.push('\n');
    if let LowerError::Unsupported { tok, .. } = err {
        out.push_str(&format_location(filename, tok, colors));
        out.push('\n');
    }
    out.push_str(&format!("{}{}{}", colors.red(), err, colors.reset()));
    out.push('\n');
    out
}

/// Render a batch of errors followed by a count summary.
pub fn render_all(errors: &[LowerError], filename: Option<&str>, colors: &Colors) -> String {
    let mut out = String::new();
    for err in errors {
        out.push_str(&render(err, filename, colors));
        out.push('\n');
    }
    let noun = if errors.len() == 1 { "error" } else { "errors" };
    out.push_str(&format!(
        "{}{} {} reported{}",
        colors.bold(),
        errors.len(),
        noun,
        colors.reset()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TargetTag;

    #[test]
    fn test_format_header() {
        let colors = Colors::new(false);
        let header = format_header("UNSUPPORTED CONSTRUCT", &colors);
        assert!(header.starts_with("-- UNSUPPORTED CONSTRUCT"));
        assert!(header.ends_with('-'));
    }

    #[test]
    fn test_format_location_default_filename() {
        let colors = Colors::new(false);
        let loc = format_location(None, &Tok::new(3, 14), &colors);
        assert_eq!(loc, "<program>:3:14");
    }

    #[test]
    fn test_render_unsupported_includes_location() {
        let colors = Colors::new(false);
        let err = LowerError::Unsupported {
            construct: "trait-typed collection element".to_string(),
            tok: Tok::new(7, 2),
            target: TargetTag::Cpp,
        };
        let report = render(&err, Some("stack.slt"), &colors);
        assert!(report.contains("UNSUPPORTED CONSTRUCT"));
        assert!(report.contains("stack.slt:7:2"));
        assert!(report.contains("trait-typed collection element"));
    }

    #[test]
    fn test_render_all_counts() {
        let colors = Colors::new(false);
        let errs = vec![
            LowerError::Unsupported {
                construct: "a".into(),
                tok: Tok::new(1, 1),
                target: TargetTag::Go,
            },
            LowerError::Unsupported {
                construct: "b".into(),
                tok: Tok::new(2, 2),
                target: TargetTag::Go,
            },
        ];
        assert!(render_all(&errs, None, &colors).contains("2 errors reported"));
    }
}
