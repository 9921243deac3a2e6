//! Shared, dependency-free SQL text scanning helpers used by both config
//! validation (C5) and the parameter binder (C3). Kept deliberately simple:
//! a conservative character scan that tracks single-quoted string literals
//! and `--`/`/* */` comments so placeholders or keywords inside them are
//! never mistaken for real tokens.

/// One lexical element of interest while scanning a SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlToken {
    /// A `:name` named placeholder.
    Named(String),
    /// A bare `?` positional placeholder.
    Positional,
    /// Any other identifier/keyword-shaped run of characters, upper-cased.
    Word(String),
}

/// Scan `sql`, yielding [`SqlToken`]s in order, skipping over string
/// literals and comments entirely (their contents never produce tokens).
pub fn scan(sql: &str) -> Vec<SqlToken> {
    scan_spanned(sql).into_iter().map(|(tok, _)| tok).collect()
}

/// Like [`scan`], but also returns each token's `[start, end)` range in
/// `sql`'s `char` indices, so a caller (the parameter binder, C3) can
/// reconstruct the statement text with placeholders substituted in place.
pub fn scan_spanned(sql: &str) -> Vec<(SqlToken, std::ops::Range<usize>)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' => {
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\'' {
                        if chars.get(i + 1) == Some(&'\'') {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            ':' if chars
                .get(i + 1)
                .is_some_and(|c| c.is_alphabetic() || *c == '_') =>
            {
                let token_start = i;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                tokens.push((SqlToken::Named(chars[start..j].iter().collect()), token_start..j));
                i = j;
            }
            '?' => {
                tokens.push((SqlToken::Positional, i..i + 1));
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let word: String = chars[start..j].iter().collect();
                tokens.push((SqlToken::Word(word.to_uppercase()), start..j));
                i = j;
            }
            _ => i += 1,
        }
    }
    tokens
}

/// The `sql` string as a `Vec<char>`, for callers that need to slice
/// literal text between token spans returned by [`scan_spanned`].
pub fn chars_of(sql: &str) -> Vec<char> {
    sql.chars().collect()
}

/// The set of distinct `:name` placeholders referenced in `sql`, in first
/// occurrence order (duplicates collapsed — binding is positional and a
/// named placeholder may repeat).
pub fn named_placeholders(sql: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tok in scan(sql) {
        if let SqlToken::Named(name) = tok {
            if seen.insert(name.clone()) {
                out.push(name);
            }
        }
    }
    out
}

/// The first non-comment keyword-shaped word in the statement, upper-cased,
/// or `None` if the statement has no word tokens at all.
pub fn first_keyword(sql: &str) -> Option<String> {
    scan(sql).into_iter().find_map(|t| match t {
        SqlToken::Word(w) => Some(w),
        _ => None,
    })
}

/// Default destructive keywords forbidden regardless of policy
/// configuration. A tool's `forbiddenKeywords` only ever adds to this
/// set, never replaces it.
pub const DEFAULT_FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "INSERT", "UPDATE", "GRANT", "REVOKE", "ALTER", "CREATE", "EXEC",
    "CALL",
];

/// Keywords a read-only statement is allowed to start with.
pub const READ_ONLY_LEADING_KEYWORDS: &[&str] = &["SELECT", "WITH"];

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    pub read_only: bool,
    pub max_query_length: usize,
    pub forbidden_keywords: Vec<String>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            read_only: true,
            max_query_length: 10_000,
            forbidden_keywords: Vec::new(),
        }
    }
}

impl SecurityPolicy {
    fn effective_forbidden(&self) -> std::collections::HashSet<String> {
        let mut set: std::collections::HashSet<String> = DEFAULT_FORBIDDEN_KEYWORDS
            .iter()
            .map(|s| s.to_string())
            .collect();
        for extra in &self.forbidden_keywords {
            set.insert(extra.to_uppercase());
        }
        set
    }
}

/// C2: reasons a statement was rejected by policy.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SqlPolicyError {
    #[error("statement length {len} exceeds the maximum of {max}")]
    TooLong { len: usize, max: usize },

    #[error("statement contains restricted keyword '{0}'")]
    ForbiddenKeyword(String),

    #[error("read-only policy requires the statement to begin with SELECT or WITH")]
    NotReadOnly,
}

/// C2: validate `sql` against `policy`. Order matters: length check,
/// then forbidden-keyword scan, then (if `read_only`) the leading-keyword
/// check.
pub fn check_policy(sql: &str, policy: &SecurityPolicy) -> Result<(), SqlPolicyError> {
    if sql.len() > policy.max_query_length {
        return Err(SqlPolicyError::TooLong {
            len: sql.len(),
            max: policy.max_query_length,
        });
    }

    let forbidden = policy.effective_forbidden();
    let tokens = scan(sql);
    for token in &tokens {
        if let SqlToken::Word(word) = token {
            if forbidden.contains(word) {
                return Err(SqlPolicyError::ForbiddenKeyword(word.clone()));
            }
        }
    }

    if policy.read_only {
        let leading = tokens.iter().find_map(|t| match t {
            SqlToken::Word(w) => Some(w.clone()),
            _ => None,
        });
        let ok = leading
            .map(|w| READ_ONLY_LEADING_KEYWORDS.contains(&w.as_str()))
            .unwrap_or(false);
        if !ok {
            return Err(SqlPolicyError::NotReadOnly);
        }
    }

    Ok(())
}
