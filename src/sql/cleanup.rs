//! Candidate cleanup
//!
//! Turns raw model output into the SQL text that is validated and, if
//! accepted, executed verbatim. Pure text transformation: same input, same
//! output, no side effects.

use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

lazy_static! {
    /// Opening or closing fence on its own line, with an optional language tag.
    static ref FENCE_LINE: Regex = Regex::new(r"```[\w+-]*[ \t]*\r?\n").unwrap();
    /// Inline fence, optionally tagged `sql`.
    static ref FENCE_INLINE: Regex = Regex::new(r"(?i)```(?:sql)?").unwrap();
    /// First SELECT up to a terminating semicolon or the end of the text.
    static ref FIRST_SELECT: Regex = Regex::new(r"(?is)\b(SELECT\s+.+?)(?:;|$)").unwrap();
    static ref LIMIT_WORD: Regex = Regex::new(r"(?i)\bLIMIT\b").unwrap();
}

/// Full cleanup: strip fences, isolate the first SELECT, enforce a row limit.
/// Returns an empty string when no SELECT could be found.
pub fn clean(raw_model_output: &str, row_limit: u64) -> String {
    let unfenced = strip_code_fences(raw_model_output);
    match extract_first_select(&unfenced) {
        Some(sql) => enforce_row_limit(&sql, row_limit),
        None => String::new(),
    }
}

pub fn strip_code_fences(raw: &str) -> String {
    let text = FENCE_LINE.replace_all(raw.trim(), "");
    let text = FENCE_INLINE.replace_all(&text, "");
    text.replace("```", "").trim().to_string()
}

pub fn extract_first_select(text: &str) -> Option<String> {
    FIRST_SELECT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|sql| !sql.is_empty())
}

/// Whether the outermost query already bounds its result size. A LIMIT inside
/// a subquery does not count.
pub fn has_row_limit(sql: &str) -> bool {
    let dialect = MySqlDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => match statements.first() {
            Some(Statement::Query(query)) => query.limit.is_some() || query.fetch.is_some(),
            _ => false,
        },
        // Unparseable text is rejected by the validator anyway; a word check
        // keeps us from stacking a second LIMIT onto it.
        Err(_) => LIMIT_WORD.is_match(sql),
    }
}

pub fn enforce_row_limit(sql: &str, row_limit: u64) -> String {
    if has_row_limit(sql) {
        return sql.to_string();
    }
    let inline = format!("{} LIMIT {}", sql, row_limit);
    if has_row_limit(&inline) {
        return inline;
    }
    // A trailing line comment swallowed the clause.
    format!("{}\nLIMIT {}", sql, row_limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_output_gets_default_limit() {
        assert_eq!(clean("```sql\nSELECT * FROM t```", 100), "SELECT * FROM t LIMIT 100");
    }

    #[test]
    fn test_existing_limit_is_kept() {
        assert_eq!(clean("SELECT id FROM t LIMIT 5", 100), "SELECT id FROM t LIMIT 5");
        assert_eq!(clean("SELECT id FROM t LIMIT 5;", 100), "SELECT id FROM t LIMIT 5");
    }

    #[test]
    fn test_only_first_statement_survives() {
        assert_eq!(
            clean("SELECT * FROM orders; DROP TABLE orders;", 100),
            "SELECT * FROM orders LIMIT 100"
        );
    }

    #[test]
    fn test_prose_around_fenced_block() {
        let raw = "Here is the query:\n```sql\nSELECT name FROM customers WHERE vip = 1;\n```\nThis lists VIP customers.";
        assert_eq!(clean(raw, 100), "SELECT name FROM customers WHERE vip = 1 LIMIT 100");
    }

    #[test]
    fn test_no_select_yields_empty_candidate() {
        assert_eq!(clean("", 100), "");
        assert_eq!(clean("I cannot answer that question.", 100), "");
        assert_eq!(clean("```sql\nDROP TABLE orders;\n```", 100), "");
        assert_eq!(clean("PRESELECTED rows only", 100), "");
    }

    #[test]
    fn test_case_is_preserved() {
        assert_eq!(clean("select id from t", 100), "select id from t LIMIT 100");
    }

    #[test]
    fn test_limit_detection_uses_top_level_query() {
        assert_eq!(
            clean("SELECT limit_value FROM quotas", 100),
            "SELECT limit_value FROM quotas LIMIT 100"
        );
        assert_eq!(
            clean("SELECT * FROM (SELECT * FROM t LIMIT 5) AS x", 100),
            "SELECT * FROM (SELECT * FROM t LIMIT 5) AS x LIMIT 100"
        );
    }

    #[test]
    fn test_trailing_comment_does_not_hide_limit() {
        assert_eq!(
            clean("SELECT id FROM t -- newest first", 100),
            "SELECT id FROM t -- newest first\nLIMIT 100"
        );
    }

    #[test]
    fn test_custom_limit() {
        assert_eq!(clean("SELECT 1", 25), "SELECT 1 LIMIT 25");
    }

    #[test]
    fn test_cleanup_is_deterministic() {
        let raw = "```\nSELECT a, b FROM t WHERE a > 1\n```";
        assert_eq!(clean(raw, 100), clean(raw, 100));
        assert_eq!(clean(raw, 100), "SELECT a, b FROM t WHERE a > 1 LIMIT 100");
    }
}
