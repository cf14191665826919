//! C1: translate the template date-format mini-language into `chrono`
//! `strftime` directives.
//!
//! The mini-language is the same token set `templating.py`'s format pipe
//! accepts (`YYYY`, `MM`, `DD`, `HH`, `mm`, `ss`, ...); tokens are matched
//! longest-first so `MMMM` is consumed before `MMM`/`MM` and `YYYY` before
//! `YY`. Anything that doesn't match a known token (including literal
//! punctuation like `-` and `/`) passes through unchanged.

/// Longest tokens first, so the scanner's greedy match is unambiguous.
const TOKENS: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("MMMM", "%B"),
    ("MMM", "%b"),
    ("YY", "%y"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("dd", "%d"),
    ("HH", "%H"),
    ("hh", "%I"),
    ("mm", "%M"),
    ("ss", "%S"),
    ("A", "%p"),
];

/// Translate a format string like `"YYYY-MM-DD HH:mm"` into `"%Y-%m-%d %H:%M"`.
pub fn translate(fmt: &str) -> String {
    let mut out = String::with_capacity(fmt.len() * 2);
    let mut rest = fmt;
    'outer: while !rest.is_empty() {
        for (token, replacement) in TOKENS {
            if rest.starts_with(token) {
                out.push_str(replacement);
                rest = &rest[token.len()..];
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        let c = chars.next().unwrap();
        out.push(c);
        rest = chars.as_str();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn translates_common_date_format() {
        assert_eq!(translate("YYYY-MM-DD"), "%Y-%m-%d");
    }

    #[test]
    fn translates_time_components() {
        assert_eq!(translate("HH:mm:ss"), "%H:%M:%S");
    }

    /// One token-to-directive test per `TOKENS` entry, named after the
    /// token itself.
    macro_rules! token_translation_tests {
        ($($name:ident => ($token:expr, $directive:expr)),+ $(,)?) => {
            paste::paste! {
                $(
                    #[test]
                    fn [<translates_token_ $name>]() {
                        assert_eq!(translate($token), $directive);
                    }
                )+
            }
        };
    }

    token_translation_tests! {
        yyyy => ("YYYY", "%Y"),
        yy => ("YY", "%y"),
        mmmm => ("MMMM", "%B"),
        mmm => ("MMM", "%b"),
        mm => ("MM", "%m"),
        dd_upper => ("DD", "%d"),
        dd_lower => ("dd", "%d"),
        hh_upper => ("HH", "%H"),
        hh_lower => ("hh", "%I"),
        minute => ("mm", "%M"),
        second => ("ss", "%S"),
        meridiem => ("A", "%p"),
    }

    #[test]
    fn month_name_tokens_are_longest_match_first() {
        assert_eq!(translate("MMMM"), "%B");
        assert_eq!(translate("MMM"), "%b");
        assert_eq!(translate("MM"), "%m");
    }

    #[test]
    fn year_tokens_are_longest_match_first() {
        assert_eq!(translate("YYYY"), "%Y");
        assert_eq!(translate("YY"), "%y");
    }

    #[test]
    fn twelve_hour_clock_with_meridiem() {
        assert_eq!(translate("hh:mm A"), "%I:%M %p");
    }

    #[test]
    fn unknown_tokens_pass_through() {
        assert_eq!(translate("YYYY/Q1"), "%Y/Q1");
    }

    #[test]
    fn translated_format_actually_formats_with_chrono() {
        let dt = NaiveDate::from_ymd_opt(2020, 1, 15)
            .unwrap()
            .and_hms_opt(13, 5, 0)
            .unwrap();
        let fmt = translate("YYYY-MM-DD hh:mm A");
        assert_eq!(dt.format(&fmt).to_string(), "2020-01-15 01:05 PM");
    }
}
