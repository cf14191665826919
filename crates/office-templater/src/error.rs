//! Error taxonomy for template rendering and context extraction.
//!
//! A handful of kinds abort the render immediately (realised as
//! [`RenderError`] variants), while the rest are recoverable and simply
//! accumulate in a `Vec<String>` that is returned alongside a `None` output
//! when non-empty.

use thiserror::Error;

/// Errors that abort a render or extraction immediately.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The input bytes could not be dispatched to a known format.
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// I/O failure reading or writing the package.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The ZIP container itself is malformed.
    #[error("package error: {0}")]
    Package(String),

    /// A slide/table/chart XML part could not be parsed.
    #[error("XML error: {0}")]
    Xml(String),

    /// `{{` with no matching `}}` in the same paragraph.
    #[error("unterminated tag: {0}")]
    UnterminatedTag(String),

    /// Malformed expression: unmatched brackets, bad format string, stray
    /// braces left after sub-expression substitution, etc.
    #[error("bad tag '{0}': {1}")]
    BadTag(String, String),

    /// A segment was called with `()` but the resolved value isn't callable,
    /// or the call itself failed.
    #[error("tag '{0}' is not callable: {1}")]
    TagCallable(String, String),

    /// Column-fill would have overwritten a non-empty cell.
    #[error("cell overwrite: {0}")]
    CellOverwrite(String),

    /// A row/table element expected during table expansion could not be
    /// located (the cell's parent row/table is missing from the XML tree).
    #[error("table structure error: {0}")]
    TableStructure(String),

    /// Chart category/series rewriting failed.
    #[error("chart error: {0}")]
    Chart(String),

    /// One or more tags failed to resolve (`MissingData`, `PermissionDenied`,
    /// or any other accumulated recoverable error).
    #[error("unresolved tags: {0:?}")]
    UnresolvedTag(Vec<String>),

    /// `umya-spreadsheet` failed to read or write the workbook.
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),
}

/// A recoverable resolution error recorded during a render.
///
/// These never abort the walk; they are collected and, if non-empty at the
/// end, turned into [`RenderError::UnresolvedTag`] instead of the output
/// being saved.
#[derive(Debug, Default, Clone)]
pub struct ErrorAccumulator {
    errors: Vec<String>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a missing-attribute occurrence: the raw tag expression itself.
    pub fn missing_data(&mut self, expr: &str) {
        self.push(format!("Missing data for tag: {expr}"));
    }

    /// Record a permission denial.
    pub fn permission_denied(&mut self, detail: &str) {
        self.push(format!("Permission denied: {detail}"));
    }

    fn push(&mut self, message: String) {
        tracing::warn!(%message, "render: accumulated recoverable error");
        self.errors.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.errors
    }

    pub fn as_slice(&self) -> &[String] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_starts_empty() {
        let acc = ErrorAccumulator::new();
        assert!(acc.is_empty());
        assert_eq!(acc.len(), 0);
    }

    #[test]
    fn accumulator_records_missing_data() {
        let mut acc = ErrorAccumulator::new();
        acc.missing_data("user.name");
        assert_eq!(acc.len(), 1);
        assert!(acc.as_slice()[0].contains("user.name"));
    }

    #[test]
    fn accumulator_records_permission_denied() {
        let mut acc = ErrorAccumulator::new();
        acc.permission_denied("program.users.email");
        assert_eq!(acc.len(), 1);
        assert!(acc.as_slice()[0].contains("Permission denied"));
    }

    #[test]
    fn into_vec_preserves_order() {
        let mut acc = ErrorAccumulator::new();
        acc.missing_data("a");
        acc.permission_denied("b");
        let v = acc.into_vec();
        assert_eq!(v.len(), 2);
        assert!(v[0].contains('a'));
        assert!(v[1].contains('b'));
    }
}
