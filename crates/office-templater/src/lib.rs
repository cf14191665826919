//! A document templating engine for PowerPoint (`.pptx`) and Excel (`.xlsx`)
//! Office Open XML files: substitute `{{ ... }}` placeholder expressions
//! embedded in a template with values drawn from a context, expand `%loop%`
//! slide spans, grow table columns and spreadsheet columns from list results,
//! and rewrite chart category/series-name text — without ever touching the
//! document's styling, media, or unrelated parts.
//!
//! # Quick start
//!
//! ```no_run
//! use office_templater::config::RenderOptions;
//! use office_templater::value::{Context, Value};
//!
//! let template_bytes = std::fs::read("report.pptx").unwrap();
//! let mut context = Context::new();
//! context.insert("name", Value::str("Alice"));
//!
//! let now = chrono::Utc::now().naive_utc();
//! let (output, errors) = office_templater::render_pptx(
//!     &template_bytes,
//!     &context.to_value(),
//!     None,
//!     now,
//!     &RenderOptions::default(),
//! )
//! .unwrap();
//! if let Some(bytes) = output {
//!     std::fs::write("report.rendered.pptx", &bytes).unwrap();
//! }
//! assert!(errors.is_none());
//! ```

pub mod config;
pub mod error;
pub mod expr;
pub mod format;
pub mod literal;
pub mod permission;
pub mod placeholder;
pub mod pptx;
pub mod resolve;
pub mod runs;
pub mod value;
#[cfg(feature = "wasm")]
pub mod wasm;
pub mod xlsx;
pub mod xml;

use chrono::NaiveDateTime;

use config::{Format, RenderOptions};
use error::RenderError;
use permission::Principal;
use pptx::context_extractor::ExtractedFields;
use value::Value;

/// Render a `.pptx` template against `context`.
///
/// Returns `(Some(bytes), None)` on a clean render, or `(None, Some(errors))`
/// once any recoverable error (missing data, permission denial) has been
/// accumulated — unless `opts.fail_on_missing` is set, in which case the
/// first such occurrence aborts the render with [`RenderError::UnresolvedTag`].
pub fn render_pptx(
    template: &[u8],
    context: &Value,
    principal: Option<&dyn Principal>,
    now: NaiveDateTime,
    opts: &RenderOptions,
) -> Result<(Option<Vec<u8>>, Option<Vec<String>>), RenderError> {
    pptx::renderer::render_pptx(template, context, principal, now, opts)
}

/// Render a `.xlsx` template against `context`. Same disposition rules as
/// [`render_pptx`]; operates column-by-column over each worksheet and
/// attempts numeric coercion of each rendered cell.
pub fn render_xlsx(
    template: &[u8],
    context: &Value,
    principal: Option<&dyn Principal>,
    now: NaiveDateTime,
    opts: &RenderOptions,
) -> Result<(Option<Vec<u8>>, Option<Vec<String>>), RenderError> {
    xlsx::renderer::render_xlsx(template, context, principal, now, opts)
}

/// Dispatch to [`render_pptx`] or [`render_xlsx`] by `format`.
pub fn render(
    template: &[u8],
    format: Format,
    context: &Value,
    principal: Option<&dyn Principal>,
    now: NaiveDateTime,
    opts: &RenderOptions,
) -> Result<(Option<Vec<u8>>, Option<Vec<String>>), RenderError> {
    match format {
        Format::Pptx => render_pptx(template, context, principal, now, opts),
        Format::Xlsx => render_xlsx(template, context, principal, now, opts),
    }
}

/// Statically scan a `.pptx` template (C11) and report the top-level context
/// identifiers it references, without evaluating any expression.
pub fn extract_context_keys(
    template: &[u8],
    opts: &RenderOptions,
) -> Result<ExtractedFields, RenderError> {
    pptx::renderer::extract_pptx_context_keys(template, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_dispatches_by_format_and_rejects_nothing_unexpected() {
        // A malformed package for either format is a Package/Io error, not a
        // panic — dispatch itself doesn't need its own fixture.
        let opts = RenderOptions::default();
        let ctx = value::Context::new().to_value();
        let now = chrono::NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(render(b"not a zip", Format::Pptx, &ctx, None, now, &opts).is_err());
        assert!(render(b"not a zip", Format::Xlsx, &ctx, None, now, &opts).is_err());
    }
}
