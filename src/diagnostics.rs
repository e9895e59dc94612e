//! The diagnostic sink shared by every phase.
//!
//! Semantic errors are recorded here instead of aborting, so one compilation
//! can surface several independent problems. [`Diagnostics::has_error`] is the
//! single flag that gates IR emission in the semantic analyzer.

use colored::Colorize;

use crate::frontend::{SourceFile, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub span: Option<Span>,
    /// Where in the compiler the error was raised
    #[cfg(feature = "error-backtrace")]
    pub reported_at: &'static std::panic::Location<'static>,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<Diagnostic>,
    messages: Vec<String>,
    echo: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Informational messages are also printed to stdout as they arrive
    pub fn with_echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    #[track_caller]
    pub fn error(&mut self, message: impl Into<String>, span: Span) {
        let message = message.into();
        tracing::debug!(%message, start = span.start, "semantic error");
        self.errors.push(Diagnostic {
            message,
            span: Some(span),
            #[cfg(feature = "error-backtrace")]
            reported_at: std::panic::Location::caller(),
        });
    }

    #[track_caller]
    pub fn error_unpositioned(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "semantic error");
        self.errors.push(Diagnostic {
            message,
            span: None,
            #[cfg(feature = "error-backtrace")]
            reported_at: std::panic::Location::caller(),
        });
    }

    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Records an informational message, used for IR and flow graph dumps.
    /// Color codes are stripped before the text is stored.
    pub fn message(&mut self, text: impl AsRef<str>) {
        if self.echo {
            println!("{}", text.as_ref());
        }

        self.messages
            .push(strip_ansi_escapes::strip_str(text.as_ref()));
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Prints every recorded error to stderr with its position in `source`
    pub fn report(&self, source: &SourceFile) {
        for error in &self.errors {
            #[cfg(feature = "error-backtrace")]
            eprintln!(
                "{}: {}",
                "backtrace".blue(),
                format!("(at {})", error.reported_at).white()
            );

            match error.span {
                Some(span) => eprintln!(
                    "{}: {} {}",
                    "error".red(),
                    error.message,
                    format!("(at {})", source.format_span_position(span)).white()
                ),
                None => eprintln!(
                    "{}: {} {}",
                    "error".red(),
                    error.message,
                    format!("(in {})", source.origin).white()
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_set_the_flag() {
        let mut diagnostics = Diagnostics::new();
        assert!(!diagnostics.has_error());

        diagnostics.message("not an error");
        assert!(!diagnostics.has_error());

        diagnostics.error("Undefined variable x", Span::new(4, 5));
        diagnostics.error_unpositioned("int undefined");

        assert!(diagnostics.has_error());
        assert_eq!(diagnostics.errors().len(), 2);
        assert_eq!(diagnostics.errors()[0].span, Some(Span::new(4, 5)));
        assert_eq!(diagnostics.errors()[1].span, None);
    }

    #[test]
    fn messages_are_stored_without_color() {
        colored::control::set_override(true);

        let mut diagnostics = Diagnostics::new();
        diagnostics.message(format!("{}", "jal".cyan()));

        assert_eq!(diagnostics.messages(), ["jal"]);
    }

    #[test]
    fn echoed_messages_are_still_recorded() {
        let mut diagnostics = Diagnostics::with_echo();
        diagnostics.message("block B0");

        assert_eq!(diagnostics.messages(), ["block B0"]);
        assert!(!diagnostics.has_error());
    }

    #[cfg(feature = "error-backtrace")]
    #[test]
    fn errors_remember_where_they_were_raised() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error("Invalid break", Span::new(0, 5));

        let location = diagnostics.errors()[0].reported_at;
        assert!(location.file().ends_with("diagnostics.rs"));
    }
}
