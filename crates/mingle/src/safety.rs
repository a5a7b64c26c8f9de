#![forbid(unsafe_code)]

//! Static screening of generated traversal statements.
//!
//! A case-insensitive substring denylist: anything that could write, call a
//! procedure, or touch administration is refused before it reaches the
//! store. It errs toward refusal (a `SET` inside `OFFSET` or a name like
//! "Seth" also trips it) and it is not a parser. Keyword obfuscation such as
//! Unicode look-alikes or comment splicing is not detected.

/// Keywords and namespace prefixes that disqualify a statement.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "CREATE", "DELETE", "SET", "REMOVE", "MERGE", "DROP", "DETACH", "CALL", "FOREACH", "LOAD CSV",
    "APOC", "DB.", "DBMS.", "SYSTEM",
];

/// The first forbidden keyword found in `statement`, if any.
pub fn forbidden_keyword(statement: &str) -> Option<&'static str> {
    let upper = statement.to_uppercase();
    FORBIDDEN_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| upper.contains(keyword))
}

/// True when `statement` contains no forbidden keyword.
pub fn is_safe_query(statement: &str) -> bool {
    forbidden_keyword(statement).is_none()
}
