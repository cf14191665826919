//! C7: the run reassembler.
//!
//! Grounded on `pptx_renderer/merger.py::merge_runs_in_paragraph`: a
//! placeholder split across sibling styled-text runs is merged into the
//! first run (keeping its formatting) before C6 ever sees the text. Made
//! generic over a small [`TextRun`] trait so it isn't tied to one XML
//! shape — the PPTX paragraph model implements it directly.

use crate::error::RenderError;

/// A single styled-text run within a paragraph.
pub trait TextRun {
    fn text(&self) -> String;
    fn set_text(&mut self, text: String);
}

/// Merge every split `{{ ... }}` placeholder in `runs` into its opening
/// run, deleting the runs it absorbed. Runs with no open tag, or with tags
/// fully closed within themselves, are left untouched.
pub fn merge_split_placeholders<R: TextRun>(runs: &mut Vec<R>) -> Result<(), RenderError> {
    let mut i = 0;
    while i < runs.len() {
        let mut merged = runs[i].text().to_string();
        let mut depth = trailing_open_count(&merged);
        if depth > 0 {
            let mut j = i + 1;
            while depth > 0 && j < runs.len() {
                merged.push_str(&runs[j].text());
                depth = trailing_open_count(&merged);
                j += 1;
            }
            if depth > 0 {
                return Err(RenderError::UnterminatedTag(merged));
            }
            runs[i].set_text(merged);
            runs.drain(i + 1..j);
        }
        i += 1;
    }
    Ok(())
}

/// Number of `{{` openings in `text` left without a matching `}}`.
fn trailing_open_count(text: &str) -> i32 {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut i = 0usize;
    while i < bytes.len() {
        if text[i..].starts_with("{{") {
            depth += 1;
            i += 2;
        } else if text[i..].starts_with("}}") {
            if depth > 0 {
                depth -= 1;
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct FakeRun(String);

    impl TextRun for FakeRun {
        fn text(&self) -> String {
            self.0.clone()
        }
        fn set_text(&mut self, text: String) {
            self.0 = text;
        }
    }

    fn runs(texts: &[&str]) -> Vec<FakeRun> {
        texts.iter().map(|t| FakeRun(t.to_string())).collect()
    }

    #[test]
    fn untouched_when_every_run_is_self_contained() {
        let mut rs = runs(&["Hello, ", "{{ name }}", "!"]);
        merge_split_placeholders(&mut rs).unwrap();
        assert_eq!(rs, runs(&["Hello, ", "{{ name }}", "!"]));
    }

    #[test]
    fn merges_a_tag_split_across_two_runs() {
        let mut rs = runs(&["Hello, {{ na", "me }}!"]);
        merge_split_placeholders(&mut rs).unwrap();
        assert_eq!(rs, runs(&["Hello, {{ name }}!"]));
    }

    #[test]
    fn merges_a_tag_split_across_three_runs_preserving_first_runs_style() {
        let mut rs = runs(&["{{ u", "ser.na", "me }}"]);
        merge_split_placeholders(&mut rs).unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].text(), "{{ user.name }}");
    }

    #[test]
    fn unterminated_tag_at_paragraph_end_is_an_error() {
        let mut rs = runs(&["Hello, {{ name"]);
        assert!(matches!(
            merge_split_placeholders(&mut rs),
            Err(RenderError::UnterminatedTag(_))
        ));
    }

    #[test]
    fn a_run_reopening_a_tag_while_merging_absorbs_through_its_own_close() {
        // The second run both closes the first split tag and opens a new
        // one of its own, so the merge continues through to the third run.
        let mut rs = runs(&["{{ a", " }} middle {{ b", " }}"]);
        merge_split_placeholders(&mut rs).unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].text(), "{{ a }} middle {{ b }}");
    }

    #[test]
    fn independent_tags_in_separate_runs_are_left_alone() {
        let mut rs = runs(&["{{ a }}", " middle ", "{{ b }}"]);
        merge_split_placeholders(&mut rs).unwrap();
        assert_eq!(rs, runs(&["{{ a }}", " middle ", "{{ b }}"]));
    }
}
