//! The parts of the front end the middle of the compiler depends on: source
//! files and spans for diagnostics, interned symbols, and the abstract syntax
//! tree. Lexing and parsing happen outside of this crate; trees can be built
//! programmatically with [`ast::build`].

use std::path::PathBuf;

pub mod ast;
pub mod intern;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// 1-based line of the byte at `position`
    pub fn row_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());

        self.contents[..position]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
            + 1
    }

    /// 1-based column of the byte at `position`
    pub fn column_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());
        let line_start = self.contents[..position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);

        position - line_start + 1
    }

    pub fn format_span_position(&self, span: Span) -> String {
        format!(
            "{}:{}:{}",
            self.origin,
            self.row_for_position(span.start),
            self.column_for_position(span.start)
        )
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

/// Byte range of a node within its source file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let file = SourceFile {
            contents: "let\n  var x := 1\nin x end".to_string(),
            origin: SourceFileOrigin::Memory,
        };

        assert_eq!(file.row_for_position(0), 1);
        assert_eq!(file.column_for_position(0), 1);
        assert_eq!(file.row_for_position(6), 2);
        assert_eq!(file.column_for_position(6), 3);
        assert_eq!(file.format_span_position(Span::new(17, 19)), "<memory>:3:1");
        assert_eq!(file.value_of_span(Span::new(6, 9)), "var");
    }
}
