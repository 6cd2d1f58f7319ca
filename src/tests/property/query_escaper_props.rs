//! Property-based tests for the query escaper
//!
//! Tests invariants:
//! - No generated text can close the MATCH string literal
//! - Control bytes never reach the engine
//! - Plain words pass through unchanged
//! - Engine keywords are lowercased into plain words
//! - Filter parameters are either allow-listed or rejected

use std::collections::HashMap;

use proptest::prelude::*;

use crate::core::search::query::{
    escape_match_text, sql_string_literal, QueryError, SearchFilters, WorkType, ALLOWED_LANGUAGES,
    MAX_QUERY_CHARS,
};

// ============================================================================
// Strategies
// ============================================================================

/// Text mixing words, operators, quotes, backslashes and control bytes
fn arb_adversarial_text() -> impl Strategy<Value = String> {
    let fragment = prop_oneof![
        "[a-zA-Z0-9]{1,8}",
        Just("'".to_string()),
        Just("\"".to_string()),
        Just("\\".to_string()),
        Just("\\'".to_string()),
        Just("OR".to_string()),
        Just("AND".to_string()),
        Just("NOT".to_string()),
        Just("MAYBE".to_string()),
        Just("SENTENCE".to_string()),
        Just("PARAGRAPH".to_string()),
        Just("ZONE:h1".to_string()),
        Just("NEAR/3".to_string()),
        Just("-".to_string()),
        Just("|".to_string()),
        Just("@title".to_string()),
        Just("(".to_string()),
        Just(")".to_string()),
        Just("; DROP TABLE works; --".to_string()),
        Just("\u{0}".to_string()),
        Just("\r\n".to_string()),
        Just("\u{1b}[0m".to_string()),
        Just(" ".to_string()),
    ];
    prop::collection::vec(fragment, 0..24).prop_map(|parts| parts.concat())
}

/// Lowercase words; `or`/`and`/`not` in lowercase are plain words
fn arb_plain_words() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9]{1,12}", 1..8)
}

/// Quote characters inside the literal must be escaped by an odd run of backslashes.
fn literal_is_closed_only_by_escape(body: &str) -> bool {
    let mut backslashes = 0usize;
    for c in body.chars() {
        if c == '\'' && backslashes % 2 == 0 {
            return false;
        }
        backslashes = if c == '\\' { backslashes + 1 } else { 0 };
    }
    // A trailing odd run would escape the closing quote
    backslashes % 2 == 0
}

proptest! {
    /// Property: escaped text never terminates the string literal early
    #[test]
    fn prop_escaped_text_stays_inside_literal(text in arb_adversarial_text()) {
        match escape_match_text(&text) {
            Ok(Some(body)) => prop_assert!(
                literal_is_closed_only_by_escape(&body),
                "'{}' escaped to '{}'",
                text.escape_debug(),
                body
            ),
            Ok(None) => {}
            Err(e) => prop_assert!(
                matches!(e, QueryError::NegationOnly | QueryError::TooLong { .. }),
                "unexpected error {:?}",
                e
            ),
        }
    }

    /// Property: proximity and zone keywords never reach the engine in operator form
    #[test]
    fn prop_engine_keywords_neutralized(text in arb_adversarial_text()) {
        if let Ok(Some(body)) = escape_match_text(&text) {
            for run in body.split(|c: char| !c.is_ascii_alphanumeric()) {
                prop_assert!(
                    !["MAYBE", "SENTENCE", "PARAGRAPH", "NEAR", "NOTNEAR", "ZONE", "ZONESPAN"]
                        .contains(&run),
                    "'{}' escaped to '{}'",
                    text.escape_debug(),
                    body
                );
            }
        }
    }

    /// Property: no control character survives escaping
    #[test]
    fn prop_no_control_characters(text in arb_adversarial_text()) {
        if let Ok(Some(body)) = escape_match_text(&text) {
            prop_assert!(!body.chars().any(|c| c.is_control()));
        }
    }

    /// Property: arbitrary unicode never panics and respects the length cap
    #[test]
    fn prop_arbitrary_unicode_is_handled(text in any::<String>()) {
        let result = escape_match_text(&text);
        if text.chars().count() > MAX_QUERY_CHARS {
            prop_assert!(
                matches!(result, Err(QueryError::TooLong { .. })),
                "over-long text gave {:?}",
                result
            );
        }
        if let Ok(Some(body)) = result {
            prop_assert!(literal_is_closed_only_by_escape(&body));
        }
    }

    /// Property: plain words are passed through unchanged
    #[test]
    fn prop_plain_words_unchanged(words in arb_plain_words()) {
        let text = words.join("  ");
        let escaped = escape_match_text(&text).unwrap();
        prop_assert_eq!(escaped, Some(words.join(" ")));
    }

    /// Property: escaping is deterministic
    #[test]
    fn prop_escaping_is_deterministic(text in arb_adversarial_text()) {
        prop_assert_eq!(escape_match_text(&text), escape_match_text(&text));
    }

    /// Property: SQL string literals cannot be broken out of
    #[test]
    fn prop_sql_literal_is_closed(value in any::<String>()) {
        let literal = sql_string_literal(&value);
        prop_assert!(literal.starts_with('\'') && literal.ends_with('\''));
        let body = &literal[1..literal.len() - 1];
        prop_assert!(literal_is_closed_only_by_escape(body));
    }

    /// Property: type and language filters are allow-listed or rejected
    #[test]
    fn prop_enum_filters_allow_listed(work_type in "[a-zA-Z_' -]{1,24}", language in "[a-zA-Z' ]{1,6}") {
        let params: HashMap<String, String> = [
            ("type".to_string(), work_type),
            ("language".to_string(), language),
        ]
        .into_iter()
        .collect();

        match SearchFilters::from_params(&params) {
            Ok(filters) => {
                if let Some(t) = filters.work_type {
                    prop_assert!(WorkType::ALL.contains(&t));
                }
                if let Some(l) = &filters.language {
                    prop_assert!(ALLOWED_LANGUAGES.contains(&l.as_str()));
                }
            }
            Err(e) => prop_assert!(
                matches!(e, QueryError::DisallowedValue { .. }),
                "unexpected error {:?}",
                e
            ),
        }
    }

    /// Property: numeric year filters are range-checked before use
    #[test]
    fn prop_years_range_checked(year in any::<i64>()) {
        let params: HashMap<String, String> =
            [("year".to_string(), year.to_string())].into_iter().collect();
        match SearchFilters::from_params(&params) {
            Ok(filters) => {
                let year = filters.year.unwrap();
                prop_assert!(year >= 1000 && year <= crate::core::search::query::max_year());
            }
            Err(e) => prop_assert!(
                matches!(e, QueryError::InvalidNumber { .. } | QueryError::YearOutOfRange { .. }),
                "unexpected error {:?}",
                e
            ),
        }
    }
}
