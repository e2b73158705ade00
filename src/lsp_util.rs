use std::path::{Path, PathBuf};

use lsp_types::{Position, Range, Uri};

use crate::diagnostics::{Diagnostic, Severity};
use crate::span::Span;

/// Maps byte offsets ↔ LSP line:column positions for a single source file.
pub struct LineIndex {
    /// Byte offset of the start of each line. line_starts[0] == 0 always.
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self { line_starts }
    }

    /// Convert a byte offset to an LSP Position (0-based line and column).
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let offset = offset as u32;
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(ins) => ins.saturating_sub(1),
        };
        let col = offset.saturating_sub(self.line_starts[line]);
        Position { line: line as u32, character: col }
    }

    /// Convert an LSP Position to a byte offset.
    pub fn position_to_offset(&self, pos: Position) -> usize {
        let line = pos.line as usize;
        if line < self.line_starts.len() {
            (self.line_starts[line] + pos.character) as usize
        } else {
            self.line_starts.last().copied().unwrap_or(0) as usize
        }
    }

    pub fn span_to_range(&self, span: Span) -> Range {
        Range {
            start: self.offset_to_position(span.start),
            end: self.offset_to_position(span.end),
        }
    }
}

/// Convert a file path to an LSP Uri.
pub fn path_to_uri(path: &Path) -> Uri {
    let abs = if path.is_absolute() {
        path.to_string_lossy().to_string()
    } else {
        path.canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .to_string()
    };
    let s = format!("file://{abs}");
    s.parse().unwrap_or_else(|_| "file:///unknown".parse().expect("static uri"))
}

/// Convert an LSP Uri to a file path. Returns None for any non-file
/// scheme, including untitled buffers.
pub fn uri_to_path(uri: &Uri) -> Option<PathBuf> {
    uri.as_str().strip_prefix("file://").map(PathBuf::from)
}

/// Unsaved editor buffers use the `untitled:` scheme and never reach the
/// checking pipeline.
pub fn is_untitled(uri: &Uri) -> bool {
    uri.as_str().starts_with("untitled:")
}

/// Render one of our diagnostics as an LSP diagnostic.
pub fn to_lsp_diagnostic(diag: &Diagnostic, index: &LineIndex) -> lsp_types::Diagnostic {
    lsp_types::Diagnostic {
        range: index.span_to_range(diag.span),
        severity: Some(match diag.severity {
            Severity::Error => lsp_types::DiagnosticSeverity::ERROR,
            Severity::Warning => lsp_types::DiagnosticSeverity::WARNING,
        }),
        code: Some(lsp_types::NumberOrString::String(diag.code.as_str().to_string())),
        source: Some("sigil".to_string()),
        message: diag.message.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line() {
        let idx = LineIndex::new("hello");
        assert_eq!(idx.offset_to_position(0), Position { line: 0, character: 0 });
        assert_eq!(idx.offset_to_position(3), Position { line: 0, character: 3 });
    }

    #[test]
    fn multi_line() {
        let idx = LineIndex::new("ab\ncd\nef");
        assert_eq!(idx.offset_to_position(3), Position { line: 1, character: 0 });
        assert_eq!(idx.offset_to_position(7), Position { line: 2, character: 1 });
    }

    #[test]
    fn position_to_offset_roundtrip() {
        let src = "class Foo < Object\n  def go: () -> Nil\nend\n";
        let idx = LineIndex::new(src);
        for offset in 0..src.len() {
            let pos = idx.offset_to_position(offset);
            assert_eq!(idx.position_to_offset(pos), offset, "offset {offset}");
        }
    }

    #[test]
    fn untitled_uris_are_detected() {
        let uri: Uri = "untitled:Untitled-1".parse().unwrap();
        assert!(is_untitled(&uri));
        assert!(uri_to_path(&uri).is_none());

        let file: Uri = "file:///tmp/a.sig".parse().unwrap();
        assert!(!is_untitled(&file));
        assert_eq!(uri_to_path(&file), Some(PathBuf::from("/tmp/a.sig")));
    }
}
