//! C12: the renderer driver.
//!
//! Open the package, drive every processing stage over its parts, and
//! produce either a rewritten output or an error list: the same
//! open/process/serialize shape as a document-conversion entry point, with
//! PDF rendering swapped out for in-place OOXML substitution.

use chrono::NaiveDateTime;

use crate::config::RenderOptions;
use crate::error::{ErrorAccumulator, RenderError};
use crate::expr::Evaluator;
use crate::permission::Principal;
use crate::pptx::charts::process_chart;
use crate::pptx::context_extractor::{extract_context_keys, ExtractedFields};
use crate::pptx::loops::{effective_context, expand_loops, PlannedSlide};
use crate::pptx::package::PptxPackage;
use crate::pptx::tables::process_table_element;
use crate::pptx::text::process_text_body_normal;
use crate::value::Value;

/// Render a `.pptx` template against `context`. Returns `(Some(bytes), None)`
/// on a clean render, or `(None, Some(errors))` if any recoverable error was
/// accumulated (§4.12 step 5) — unless `opts.fail_on_missing` is set, in
/// which case the first accumulated error aborts the render immediately.
pub fn render_pptx(
    bytes: &[u8],
    context: &Value,
    principal: Option<&dyn Principal>,
    now: NaiveDateTime,
    opts: &RenderOptions,
) -> Result<(Option<Vec<u8>>, Option<Vec<String>>), RenderError> {
    let span = tracing::info_span!("render_pptx");
    let _enter = span.enter();

    let mut pkg = PptxPackage::open(bytes)?;
    let mut errors = ErrorAccumulator::new();

    let slides_before = pkg.slide_paths()?.len();
    {
        let mut eval = Evaluator::new(now, &mut errors);
        if opts.check_permissions {
            if let Some(p) = principal {
                eval = eval.with_principal(p);
            }
        }

        let plan = expand_loops(&mut pkg, context, &mut eval)?;
        tracing::info!(
            slides_before,
            slides_after = plan.len(),
            "loop expansion complete"
        );

        for planned in &plan {
            render_slide(&mut pkg, planned, context, &mut eval)?;
            if opts.fail_on_missing && !eval.errors.is_empty() {
                return Err(RenderError::UnresolvedTag(eval.errors.as_slice().to_vec()));
            }
        }

        if let Some(range) = opts.slide_range {
            let ordered = pkg.slide_paths()?;
            let kept: Vec<String> = ordered
                .into_iter()
                .enumerate()
                .filter(|(i, _)| range.contains(*i as u32 + 1))
                .map(|(_, p)| p)
                .collect();
            pkg.set_slide_order(&kept)?;
        }
    }

    if !errors.is_empty() {
        return Ok((None, Some(errors.into_vec())));
    }
    Ok((Some(pkg.save()?), None))
}

fn render_slide(
    pkg: &mut PptxPackage,
    planned: &PlannedSlide,
    base_context: &Value,
    eval: &mut Evaluator,
) -> Result<(), RenderError> {
    let effective = effective_context(base_context, planned);
    let mut slide = pkg.parse_part(&planned.path)?;

    for tx_body in slide.find_all_mut("p:txBody") {
        process_text_body_normal(tx_body, &effective, eval)?;
    }
    for tbl in slide.find_all_mut("a:tbl") {
        process_table_element(tbl, &effective, eval)?;
    }

    let chart_rids: Vec<String> = slide
        .find_all("c:chart")
        .into_iter()
        .filter_map(|c| c.attr("r:id").map(|s| s.to_string()))
        .collect();

    pkg.write_part(&planned.path, &slide)?;

    for rid in chart_rids {
        if let Some(chart_path) = pkg.resolve_relationship_target(&planned.path, &rid)? {
            let mut chart = pkg.parse_part(&chart_path)?;
            process_chart(&mut chart, &effective, eval)?;
            pkg.write_part(&chart_path, &chart)?;
        }
    }
    Ok(())
}

/// Run C11 over a `.pptx` template.
pub fn extract_pptx_context_keys(
    bytes: &[u8],
    opts: &RenderOptions,
) -> Result<ExtractedFields, RenderError> {
    let pkg = PptxPackage::open(bytes)?;
    extract_context_keys(&pkg, opts.slide_range)
}
