//! C10: the chart rewriter.
//!
//! Grounded on `src/parser/chart.rs`'s `c:ser`/`c:cat`/`c:val` walk (the
//! teacher already parses this shape to read categories/series for PDF
//! rendering); this rewrites category labels and series names through C6 in
//! normal mode and leaves every numeric `c:val` untouched.

use crate::error::RenderError;
use crate::expr::Evaluator;
use crate::placeholder::process_normal;
use crate::value::Value;
use crate::xml::XmlElement;

/// Rewrite every series' name and category labels on a `<c:chartSpace>` (or
/// any ancestor containing `<c:ser>` elements) in place.
pub fn process_chart(
    chart: &mut XmlElement,
    context: &Value,
    eval: &mut Evaluator,
) -> Result<(), RenderError> {
    for ser in chart.find_all_mut("c:ser") {
        if let Some(tx) = ser.child_mut("c:tx") {
            rewrite_values(tx, context, eval)?;
        }
        if let Some(cat) = ser.child_mut("c:cat") {
            rewrite_values(cat, context, eval)?;
        }
    }
    Ok(())
}

fn rewrite_values(
    container: &mut XmlElement,
    context: &Value,
    eval: &mut Evaluator,
) -> Result<(), RenderError> {
    for v in container.find_all_mut("c:v") {
        let text = v.text_content();
        let rendered = process_normal(&text, context, eval)?;
        v.set_text_content(rendered);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorAccumulator;
    use crate::value::Context;
    use crate::xml::parse;

    fn eval_of(errors: &mut ErrorAccumulator) -> Evaluator {
        let now = chrono::NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Evaluator::new(now, errors)
    }

    fn fixture() -> XmlElement {
        parse(
            b"<c:chartSpace>\
                <c:chart><c:plotArea><c:barChart><c:ser>\
                    <c:tx><c:strRef><c:strCache><c:pt idx=\"0\"><c:v>{{ product.name }}</c:v></c:pt></c:strCache></c:strRef></c:tx>\
                    <c:cat><c:strRef><c:strCache>\
                        <c:pt idx=\"0\"><c:v>{{ label1 }}</c:v></c:pt>\
                        <c:pt idx=\"1\"><c:v>{{ label2 }}</c:v></c:pt>\
                    </c:strCache></c:strRef></c:cat>\
                    <c:val><c:numRef><c:numCache>\
                        <c:pt idx=\"0\"><c:v>10</c:v></c:pt>\
                        <c:pt idx=\"1\"><c:v>20</c:v></c:pt>\
                    </c:numCache></c:numRef></c:val>\
                </c:ser></c:barChart></c:plotArea></c:chart>\
            </c:chartSpace>",
        )
        .unwrap()
    }

    #[test]
    fn rewrites_series_name_and_category_labels_leaves_numbers_untouched() {
        let mut chart = fixture();
        let mut ctx = Context::new();
        ctx.insert("product", {
            let mut p = Context::new();
            p.insert("name", Value::str("Widgets"));
            p.to_value()
        });
        ctx.insert("label1", Value::str("Q1"));
        ctx.insert("label2", Value::str("Q2"));
        let mut errors = ErrorAccumulator::new();
        let mut ev = eval_of(&mut errors);
        process_chart(&mut chart, &ctx.to_value(), &mut ev).unwrap();

        let texts: Vec<String> = chart
            .find_all("c:v")
            .into_iter()
            .map(|v| v.text_content())
            .collect();
        assert_eq!(texts, vec!["Widgets", "Q1", "Q2", "10", "20"]);
    }
}
