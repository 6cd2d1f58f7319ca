//! Query Builder / Escaper
//!
//! Turns free text and typed filters into the search engine's match expression
//! and filter clauses.
//!
//! # Trust Boundary
//!
//! The engine's wire protocol has no bind parameters for full-text match
//! syntax, so the primary client interpolates strings into statements. Every
//! interpolated value goes through this module:
//!
//! - [`escape_match_text`] for user text inside `MATCH('...')`,
//! - [`sql_string_literal`] for string values on the write path,
//! - allow-listed enums ([`WorkType`], [`Language`], [`ReadingType`]) and
//!   range-checked integers for filter clauses.
//!
//! Free text is parsed into clauses first. Boolean operators callers may use
//! (`OR`, `AND`, `NOT`, `-term`, `"phrases"`) survive as engine operators;
//! everything else that the engine would read as syntax is escaped.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::Datelike;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Smallest page size accepted.
pub const MIN_LIMIT: u32 = 1;
/// Largest page size accepted.
pub const MAX_LIMIT: u32 = 100;
/// Deepest offset accepted; the engine keeps at most this many matches per query.
pub const MAX_OFFSET: u32 = 10_000;
/// Default page size.
pub const DEFAULT_LIMIT: u32 = 20;
/// Longest free-text query accepted, in characters.
pub const MAX_QUERY_CHARS: usize = 512;
/// Earliest publication year accepted in filters.
pub const MIN_YEAR: i32 = 1000;

/// Characters the engine's extended query syntax treats as operators.
const ENGINE_SPECIAL_CHARS: &[char] = &[
    '\\', '(', ')', '|', '-', '!', '@', '~', '"', '&', '/', '^', '$', '=', '<', '\'', '*',
];

/// Upper-case words the engine reads as operators, also with a `:` or `/`
/// suffix (`ZONE:h1`, `NEAR/3`). Neutralized by lower-casing the word.
const ENGINE_KEYWORDS: &[&str] = &[
    "MAYBE", "SENTENCE", "PARAGRAPH", "NEAR", "NOTNEAR", "ZONE", "ZONESPAN",
];

/// ISO 639-1 codes present in the corpus.
pub const ALLOWED_LANGUAGES: &[&str] = &[
    "ar", "cs", "da", "de", "el", "en", "es", "fa", "fi", "fr", "he", "hi", "hu", "id", "it",
    "ja", "ko", "nl", "no", "pl", "pt", "ro", "ru", "sv", "tr", "uk", "vi", "zh",
];

// ============================================================================
// Errors
// ============================================================================

/// Validation failures. Raised before any backend is contacted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query exceeds {max} characters")]
    TooLong { max: usize },

    #[error("Query contains only negated terms")]
    NegationOnly,

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Unsupported value '{value}' for filter '{filter}'")]
    DisallowedValue { filter: &'static str, value: String },

    #[error("Invalid number '{value}' for filter '{filter}'")]
    InvalidNumber { filter: &'static str, value: String },

    #[error("Year {year} outside [{min}, {max}]")]
    YearOutOfRange { year: i32, min: i32, max: i32 },

    #[error("Invalid year range: {0}")]
    InvalidYearRange(String),

    #[error("Unknown filter '{0}'")]
    UnknownFilter(String),

    #[error("Update contains no fields")]
    EmptyPatch,
}

pub type Result<T> = std::result::Result<T, QueryError>;

// ============================================================================
// Allow-listed Enums
// ============================================================================

/// Publication type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkType {
    Article,
    Book,
    BookChapter,
    ProceedingsArticle,
    Dissertation,
    Preprint,
    Report,
    Dataset,
    Review,
    Editorial,
    Other,
}

impl WorkType {
    pub const ALL: [WorkType; 11] = [
        WorkType::Article,
        WorkType::Book,
        WorkType::BookChapter,
        WorkType::ProceedingsArticle,
        WorkType::Dissertation,
        WorkType::Preprint,
        WorkType::Report,
        WorkType::Dataset,
        WorkType::Review,
        WorkType::Editorial,
        WorkType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Article => "article",
            WorkType::Book => "book",
            WorkType::BookChapter => "book-chapter",
            WorkType::ProceedingsArticle => "proceedings-article",
            WorkType::Dissertation => "dissertation",
            WorkType::Preprint => "preprint",
            WorkType::Report => "report",
            WorkType::Dataset => "dataset",
            WorkType::Review => "review",
            WorkType::Editorial => "editorial",
            WorkType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| QueryError::DisallowedValue {
                filter: "type",
                value: value.to_string(),
            })
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access level of the full text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingType {
    Open,
    Restricted,
    Embargoed,
}

impl ReadingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingType::Open => "open",
            ReadingType::Restricted => "restricted",
            ReadingType::Embargoed => "embargoed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(ReadingType::Open),
            "restricted" => Ok(ReadingType::Restricted),
            "embargoed" => Ok(ReadingType::Embargoed),
            _ => Err(QueryError::DisallowedValue {
                filter: "readingType",
                value: value.to_string(),
            }),
        }
    }
}

/// Language code checked against [`ALLOWED_LANGUAGES`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct Language(&'static str);

impl Language {
    pub fn parse(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        ALLOWED_LANGUAGES
            .iter()
            .copied()
            .find(|code| *code == normalized)
            .map(Language)
            .ok_or_else(|| QueryError::DisallowedValue {
                filter: "language",
                value: value.to_string(),
            })
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl TryFrom<String> for Language {
    type Error = QueryError;

    fn try_from(value: String) -> Result<Self> {
        Language::parse(&value)
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Language::parse(&raw).map_err(de::Error::custom)
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.0.to_string()
    }
}

// ============================================================================
// Filters and Pagination
// ============================================================================

/// Typed search filters. Field order is part of the cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub year: Option<i32>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    #[serde(rename = "type")]
    pub work_type: Option<WorkType>,
    pub language: Option<Language>,
    pub reading_type: Option<ReadingType>,
    pub peer_reviewed: Option<bool>,
}

/// Latest publication year accepted (next year, for forthcoming works).
pub fn max_year() -> i32 {
    chrono::Utc::now().year() + 1
}

fn check_year(year: i32) -> Result<i32> {
    let max = max_year();
    if (MIN_YEAR..=max).contains(&year) {
        Ok(year)
    } else {
        Err(QueryError::YearOutOfRange {
            year,
            min: MIN_YEAR,
            max,
        })
    }
}

fn parse_year(filter: &'static str, value: &str) -> Result<i32> {
    let year = value
        .trim()
        .parse::<i32>()
        .map_err(|_| QueryError::InvalidNumber {
            filter,
            value: value.to_string(),
        })?;
    check_year(year)
}

fn parse_bool(filter: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(QueryError::DisallowedValue {
            filter,
            value: value.to_string(),
        }),
    }
}

impl SearchFilters {
    /// Parse raw string parameters as received from the request layer.
    ///
    /// Accepts camelCase and snake_case keys. Unknown keys are rejected.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let mut filters = SearchFilters::default();
        for (key, value) in params {
            if value.trim().is_empty() {
                continue;
            }
            match key.as_str() {
                "year" => filters.year = Some(parse_year("year", value)?),
                "yearFrom" | "year_from" => filters.year_from = Some(parse_year("yearFrom", value)?),
                "yearTo" | "year_to" => filters.year_to = Some(parse_year("yearTo", value)?),
                "type" | "workType" | "work_type" => filters.work_type = Some(WorkType::parse(value)?),
                "language" => filters.language = Some(Language::parse(value)?),
                "readingType" | "reading_type" => {
                    filters.reading_type = Some(ReadingType::parse(value)?)
                }
                "peerReviewed" | "peer_reviewed" => {
                    filters.peer_reviewed = Some(parse_bool("peerReviewed", value)?)
                }
                other => return Err(QueryError::UnknownFilter(other.to_string())),
            }
        }
        filters.validate()?;
        Ok(filters)
    }

    /// Range-check years and their mutual consistency.
    pub fn validate(&self) -> Result<()> {
        for year in [self.year, self.year_from, self.year_to].into_iter().flatten() {
            check_year(year)?;
        }
        if let (Some(from), Some(to)) = (self.year_from, self.year_to) {
            if from > to {
                return Err(QueryError::InvalidYearRange(format!(
                    "yearFrom {} is after yearTo {}",
                    from, to
                )));
            }
        }
        if let Some(year) = self.year {
            let below = self.year_from.is_some_and(|from| year < from);
            let above = self.year_to.is_some_and(|to| year > to);
            if below || above {
                return Err(QueryError::InvalidYearRange(format!(
                    "year {} is outside the requested range",
                    year
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == SearchFilters::default()
    }

    /// Engine filter clauses, each safe to join with `AND`.
    pub fn engine_clauses(&self) -> Vec<String> {
        let mut clauses = Vec::new();
        if let Some(year) = self.year {
            clauses.push(format!("publication_year = {}", year));
        }
        if let Some(from) = self.year_from {
            clauses.push(format!("publication_year >= {}", from));
        }
        if let Some(to) = self.year_to {
            clauses.push(format!("publication_year <= {}", to));
        }
        if let Some(work_type) = self.work_type {
            clauses.push(format!("work_type = {}", sql_string_literal(work_type.as_str())));
        }
        if let Some(language) = &self.language {
            clauses.push(format!("language = {}", sql_string_literal(language.as_str())));
        }
        if let Some(reading_type) = self.reading_type {
            clauses.push(format!("reading_type = {}", sql_string_literal(reading_type.as_str())));
        }
        if let Some(peer_reviewed) = self.peer_reviewed {
            clauses.push(format!("peer_reviewed = {}", u8::from(peer_reviewed)));
        }
        clauses
    }
}

/// Page window. `limit` ∈ [1, 100], `offset` ≥ 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: u32, offset: u32) -> Result<Self> {
        let page = Self { limit, offset };
        page.validate()?;
        Ok(page)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_LIMIT..=MAX_LIMIT).contains(&self.limit) {
            return Err(QueryError::InvalidPagination(format!(
                "limit {} outside [{}, {}]",
                self.limit, MIN_LIMIT, MAX_LIMIT
            )));
        }
        if self.offset > MAX_OFFSET {
            return Err(QueryError::InvalidPagination(format!(
                "offset {} exceeds {}",
                self.offset, MAX_OFFSET
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Search Query
// ============================================================================

/// A complete search request: text, filters and page window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub filters: SearchFilters,
    pub pagination: Pagination,
}

/// Normalized request used as cache key material.
#[derive(Debug, Serialize)]
pub struct QueryFingerprint<'a> {
    /// Canonical match expression, see [`canonical_text`].
    pub text: String,
    pub filters: &'a SearchFilters,
    pub limit: u32,
    pub offset: u32,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, filters: SearchFilters, pagination: Pagination) -> Self {
        Self {
            text: text.into(),
            filters,
            pagination,
        }
    }

    /// Query over text alone with the default page.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text, SearchFilters::default(), Pagination::default())
    }

    /// Validate everything and parse the text. Called before any dispatch.
    pub fn validate(&self) -> Result<ParsedText> {
        self.pagination.validate()?;
        self.filters.validate()?;
        parse_text(&self.text)
    }

    /// Canonical parsed text plus filters and page. `parsed` is the result
    /// of [`SearchQuery::validate`].
    pub fn fingerprint(&self, parsed: &ParsedText) -> QueryFingerprint<'_> {
        QueryFingerprint {
            text: canonical_text(parsed),
            filters: &self.filters,
            limit: self.pagination.limit,
            offset: self.pagination.offset,
        }
    }
}

/// Cache key form of parsed text: terms lower-cased, operator structure kept.
///
/// `neural OR symbolic` and `neural or symbolic` parse differently and so
/// produce different keys; spacing and letter case of terms do not matter.
pub fn canonical_text(parsed: &ParsedText) -> String {
    let lowered = ParsedText {
        clauses: parsed
            .clauses
            .iter()
            .map(|clause| Clause {
                alternatives: clause
                    .alternatives
                    .iter()
                    .map(|term| Term {
                        text: term.text.to_lowercase(),
                        phrase: term.phrase,
                    })
                    .collect(),
                negated: clause.negated,
            })
            .collect(),
    };
    render_match_expression(&lowered).unwrap_or_default()
}

// ============================================================================
// Text Parsing
// ============================================================================

/// A search term: a single word or a quoted phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    /// Unescaped text. Phrases hold their words separated by single spaces.
    pub text: String,
    pub phrase: bool,
}

/// Alternatives joined by OR; negated clauses hold a single term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub alternatives: Vec<Term>,
    pub negated: bool,
}

/// Free text after operator recognition. Clauses are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedText {
    pub clauses: Vec<Clause>,
}

impl ParsedText {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Clauses that must match.
    pub fn positive(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| !c.negated)
    }

    /// Clauses that must not match.
    pub fn negative(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| c.negated)
    }
}

#[derive(Debug)]
enum Token {
    Word(String),
    Phrase(String),
    Or,
    And,
    Not,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""[^"]*"|\S+"#).expect("static token pattern"))
}

fn tokenize(text: &str) -> Vec<Token> {
    token_pattern()
        .find_iter(text)
        .filter_map(|m| {
            let raw = m.as_str();
            if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
                let inner = raw[1..raw.len() - 1].split_whitespace().collect::<Vec<_>>().join(" ");
                if inner.is_empty() {
                    None
                } else {
                    Some(Token::Phrase(inner))
                }
            } else {
                Some(match raw {
                    "OR" | "|" | "||" => Token::Or,
                    "AND" | "&" | "&&" => Token::And,
                    "NOT" => Token::Not,
                    word => Token::Word(word.to_string()),
                })
            }
        })
        .collect()
}

/// Parse free text into clauses.
///
/// Control characters become whitespace. Dangling or doubled operators are
/// dropped. A query made only of negations is rejected because the engine
/// cannot evaluate it.
pub fn parse_text(raw: &str) -> Result<ParsedText> {
    if raw.chars().count() > MAX_QUERY_CHARS {
        return Err(QueryError::TooLong {
            max: MAX_QUERY_CHARS,
        });
    }
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    let mut clauses: Vec<Clause> = Vec::new();
    let mut pending_or = false;
    let mut pending_not = false;

    for token in tokenize(&cleaned) {
        let (term, mut negated) = match token {
            Token::Or => {
                pending_or = true;
                continue;
            }
            Token::And => {
                pending_or = false;
                continue;
            }
            Token::Not => {
                pending_not = true;
                continue;
            }
            Token::Phrase(text) => (Term { text, phrase: true }, false),
            Token::Word(word) => {
                let negated_rest = word
                    .strip_prefix('-')
                    .filter(|rest| !rest.is_empty() && !rest.starts_with('-'))
                    .map(str::to_string);
                match negated_rest {
                    Some(text) => (Term { text, phrase: false }, true),
                    None => (Term { text: word, phrase: false }, false),
                }
            }
        };
        negated |= pending_not;
        pending_not = false;

        let joins_previous = pending_or
            && !negated
            && clauses.last().is_some_and(|clause| !clause.negated);
        pending_or = false;

        match clauses.last_mut() {
            Some(previous) if joins_previous => previous.alternatives.push(term),
            _ => clauses.push(Clause {
                alternatives: vec![term],
                negated,
            }),
        }
    }

    let parsed = ParsedText { clauses };
    if !parsed.is_empty() && parsed.positive().next().is_none() {
        return Err(QueryError::NegationOnly);
    }
    Ok(parsed)
}

// ============================================================================
// Escaping
// ============================================================================

/// Whether any alphanumeric run of `word` is an operator keyword.
fn contains_engine_keyword(word: &str) -> bool {
    word.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|run| ENGINE_KEYWORDS.contains(&run))
}

/// Escape one word for the engine's full-text syntax.
fn escape_word(word: &str) -> String {
    let word = if contains_engine_keyword(word) {
        word.to_lowercase()
    } else {
        word.to_string()
    };
    let mut escaped = String::with_capacity(word.len() + 4);
    for c in word.chars() {
        if ENGINE_SPECIAL_CHARS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn render_term(term: &Term) -> String {
    if term.phrase {
        let words: Vec<String> = term.text.split(' ').map(escape_word).collect();
        format!("\"{}\"", words.join(" "))
    } else {
        escape_word(&term.text)
    }
}

/// Render parsed text as an engine match expression (full-text level,
/// before SQL string escaping).
pub fn render_match_expression(parsed: &ParsedText) -> Option<String> {
    if parsed.is_empty() {
        return None;
    }
    let parts: Vec<String> = parsed
        .clauses
        .iter()
        .map(|clause| {
            let rendered: Vec<String> = clause.alternatives.iter().map(render_term).collect();
            if clause.negated {
                format!("-{}", rendered.join(" "))
            } else if rendered.len() > 1 {
                format!("({})", rendered.join(" | "))
            } else {
                rendered.join("")
            }
        })
        .collect();
    Some(parts.join(" "))
}

/// Escape a value for a single-quoted SQL string literal (without quotes).
fn escape_sql_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            c if c.is_control() => escaped.push(' '),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Quote a value as an SQL string literal for the engine protocol.
pub fn sql_string_literal(value: &str) -> String {
    format!("'{}'", escape_sql_string(value))
}

/// Build the body of `MATCH('...')` from user text.
///
/// This is the single escaping path for user text sent to the engine. The
/// result is safe to place between single quotes: quote and backslash
/// characters are escaped for both the SQL and the full-text layer, control
/// bytes are removed, and only recognized operators keep their meaning.
/// Returns `Ok(None)` when the text holds no terms.
pub fn escape_match_text(raw: &str) -> Result<Option<String>> {
    let parsed = parse_text(raw)?;
    Ok(render_match_expression(&parsed).map(|expr| escape_sql_string(&expr)))
}

/// Operator-free terms for substring matching on the relational store.
pub fn plain_terms(parsed: &ParsedText) -> Vec<String> {
    parsed
        .positive()
        .flat_map(|clause| clause.alternatives.iter().map(|t| t.text.clone()))
        .collect()
}

/// Full WHERE clause for an engine statement (leading space included), or an
/// empty string when there is nothing to filter on.
pub fn engine_where_clause(parsed: &ParsedText, filters: &SearchFilters) -> String {
    let mut conditions = Vec::new();
    if let Some(expr) = render_match_expression(parsed) {
        conditions.push(format!("MATCH('{}')", escape_sql_string(&expr)));
    }
    conditions.extend(filters.engine_clauses());
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_plain_words_pass_through() {
        assert_eq!(
            escape_match_text("machine learning").unwrap().as_deref(),
            Some("machine learning")
        );
    }

    #[test]
    fn test_empty_text_has_no_expression() {
        assert_eq!(escape_match_text("").unwrap(), None);
        assert_eq!(escape_match_text("   \t\n ").unwrap(), None);
    }

    #[rstest]
    #[case("neural OR symbolic", "(neural | symbolic)")]
    #[case("neural AND symbolic", "neural symbolic")]
    #[case("graphs NOT trees", "graphs -trees")]
    #[case("graphs -trees", "graphs -trees")]
    #[case("\"deep learning\" survey", "\"deep learning\" survey")]
    #[case("OR leading", "leading")]
    #[case("trailing OR", "trailing")]
    #[case("a OR OR b", "(a | b)")]
    #[case("a | b | c d", "(a | b | c) d")]
    #[case("or lowercase", "or lowercase")]
    fn test_operators_are_preserved(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_match_text(input).unwrap().as_deref(), Some(expected));
    }

    #[test]
    fn test_single_quote_cannot_close_literal() {
        let escaped = escape_match_text("x') OR 1=1 --").unwrap().unwrap();
        // Every quote is preceded by an escaping backslash
        let bytes = escaped.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if *b == b'\'' {
                assert!(i > 0 && bytes[i - 1] == b'\\', "unescaped quote in {}", escaped);
            }
        }
        assert!(!escaped.contains("1=1 "));
    }

    #[test]
    fn test_control_bytes_are_removed() {
        let escaped = escape_match_text("abc\u{0}def\u{1b}[31m\r\nghi").unwrap().unwrap();
        assert!(!escaped.chars().any(|c| c.is_control()));
        assert!(escaped.starts_with("abc def"));
    }

    #[test]
    fn test_field_selector_and_grouping_are_escaped() {
        let escaped = escape_match_text("@title (secret)").unwrap().unwrap();
        // Full-text escape `\@` doubled for the SQL literal layer
        assert_eq!(escaped, "\\\\@title \\\\(secret\\\\)");
    }

    #[test]
    fn test_unbalanced_quote_is_escaped() {
        let escaped = escape_match_text("\"unterminated phrase").unwrap().unwrap();
        assert_eq!(escaped, "\\\\\"unterminated phrase");
    }

    #[test]
    fn test_backslash_is_neutralized() {
        let escaped = escape_match_text("a\\'b").unwrap().unwrap();
        // `\` and `'` escaped at full-text level, then doubled for SQL
        assert_eq!(escaped, "a\\\\\\\\\\\\\\'b");
    }

    #[test]
    fn test_negation_only_is_rejected() {
        assert_eq!(escape_match_text("-spam"), Err(QueryError::NegationOnly));
        assert_eq!(escape_match_text("NOT spam"), Err(QueryError::NegationOnly));
    }

    #[test]
    fn test_too_long_is_rejected() {
        let long = "a".repeat(MAX_QUERY_CHARS + 1);
        assert!(matches!(escape_match_text(&long), Err(QueryError::TooLong { .. })));
    }

    #[test]
    fn test_plain_terms_skip_operators_and_negations() {
        let parsed = parse_text("\"graph theory\" OR networks -biology AND x").unwrap();
        assert_eq!(plain_terms(&parsed), vec!["graph theory", "networks", "x"]);
        assert_eq!(parsed.negative().count(), 1);
    }

    #[test]
    fn test_filters_from_params() {
        let filters = SearchFilters::from_params(&params(&[
            ("yearFrom", "2015"),
            ("yearTo", "2020"),
            ("type", "Book_Chapter"),
            ("language", "EN"),
            ("peerReviewed", "true"),
            ("readingType", "open"),
        ]))
        .unwrap();

        assert_eq!(filters.year_from, Some(2015));
        assert_eq!(filters.work_type, Some(WorkType::BookChapter));
        assert_eq!(filters.language.as_ref().map(|l| l.as_str()), Some("en"));
        assert_eq!(filters.peer_reviewed, Some(true));
        assert_eq!(filters.reading_type, Some(ReadingType::Open));
    }

    #[rstest]
    #[case("type", "article' OR '1'='1")]
    #[case("language", "en'; DROP TABLE works")]
    #[case("readingType", "free")]
    #[case("peerReviewed", "maybe")]
    fn test_disallowed_enum_values(#[case] key: &str, #[case] value: &str) {
        let err = SearchFilters::from_params(&params(&[(key, value)])).unwrap_err();
        assert!(matches!(err, QueryError::DisallowedValue { .. }));
    }

    #[rstest]
    #[case("year", "2020 OR 1=1")]
    #[case("yearFrom", "-5")]
    #[case("yearTo", "99999")]
    fn test_numeric_filters_are_checked(#[case] key: &str, #[case] value: &str) {
        let err = SearchFilters::from_params(&params(&[(key, value)])).unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidNumber { .. } | QueryError::YearOutOfRange { .. }
        ));
    }

    #[test]
    fn test_inverted_year_range_is_rejected() {
        let err =
            SearchFilters::from_params(&params(&[("yearFrom", "2020"), ("yearTo", "2010")]))
                .unwrap_err();
        assert!(matches!(err, QueryError::InvalidYearRange(_)));
    }

    #[test]
    fn test_unknown_filter_is_rejected() {
        let err = SearchFilters::from_params(&params(&[("venue", "Nature")])).unwrap_err();
        assert_eq!(err, QueryError::UnknownFilter("venue".to_string()));
    }

    #[test]
    fn test_language_deserialization_is_allow_listed() {
        let ok: std::result::Result<Language, _> = serde_json::from_str("\"de\"");
        assert!(ok.is_ok());
        let bad: std::result::Result<Language, _> = serde_json::from_str("\"xx' OR 1\"");
        assert!(bad.is_err());

        let filters = SearchFilters {
            language: Some(Language::parse("FR").unwrap()),
            ..Default::default()
        };
        let json = serde_json::to_string(&filters).unwrap();
        assert!(json.contains("\"language\":\"fr\""));
        let back: SearchFilters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filters);
    }

    #[rstest]
    #[case(0, 0, false)]
    #[case(1, 0, true)]
    #[case(100, 0, true)]
    #[case(101, 0, false)]
    #[case(20, MAX_OFFSET, true)]
    #[case(20, MAX_OFFSET + 1, false)]
    fn test_pagination_bounds(#[case] limit: u32, #[case] offset: u32, #[case] ok: bool) {
        assert_eq!(Pagination::new(limit, offset).is_ok(), ok);
    }

    #[test]
    fn test_engine_where_clause() {
        let parsed = parse_text("machine learning").unwrap();
        let filters = SearchFilters {
            year_from: Some(2018),
            work_type: Some(WorkType::Article),
            peer_reviewed: Some(true),
            ..Default::default()
        };
        assert_eq!(
            engine_where_clause(&parsed, &filters),
            " WHERE MATCH('machine learning') AND publication_year >= 2018 AND work_type = 'article' AND peer_reviewed = 1"
        );
        assert_eq!(engine_where_clause(&ParsedText::default(), &SearchFilters::default()), "");
    }

    fn fingerprint_json(text: &str) -> String {
        let query = SearchQuery::text(text);
        let parsed = query.validate().unwrap();
        serde_json::to_string(&query.fingerprint(&parsed)).unwrap()
    }

    #[test]
    fn test_fingerprint_normalizes_text() {
        assert_eq!(
            fingerprint_json("  Machine   LEARNING "),
            fingerprint_json("machine learning")
        );
        assert_eq!(
            fingerprint_json("Neural  OR symbolic"),
            fingerprint_json("neural | SYMBOLIC")
        );
    }

    #[rstest]
    #[case("neural OR symbolic", "neural or symbolic")]
    #[case("graphs NOT trees", "graphs not trees")]
    #[case("graphs AND trees", "graphs and trees")]
    #[case("\"deep learning\"", "deep learning")]
    #[case("graphs -trees", "graphs trees")]
    fn test_fingerprint_keeps_operator_structure(#[case] a: &str, #[case] b: &str) {
        assert_ne!(fingerprint_json(a), fingerprint_json(b));
    }

    #[rstest]
    #[case("a MAYBE b", "a maybe b")]
    #[case("a SENTENCE b", "a sentence b")]
    #[case("a PARAGRAPH b", "a paragraph b")]
    #[case("ZONE:h1 x", "zone:h1 x")]
    #[case("ZONESPAN:title x", "zonespan:title x")]
    #[case("a NEAR/3 b", "a near\\\\/3 b")]
    #[case("a NOTNEAR/2 b", "a notnear\\\\/2 b")]
    #[case("Maybe Sentence", "Maybe Sentence")]
    fn test_engine_keywords_are_neutralized(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_match_text(input).unwrap().as_deref(), Some(expected));
    }

    #[test]
    fn test_sql_string_literal() {
        assert_eq!(sql_string_literal("O'Brien"), "'O\\'Brien'");
        assert_eq!(sql_string_literal("a\\b"), "'a\\\\b'");
        assert_eq!(sql_string_literal("line\nbreak"), "'line break'");
    }
}
