//! Schema text parsing.
//!
//! One left-to-right pass over a Postgres-flavored DDL string produces
//! [`TableDescriptor`]s that every other component consumes - the CRUD
//! factory, the session cache and the CLI all share the same parse, so no
//! part of the crate re-scans the schema text with its own pattern.
//!
//! The parser is deliberately lenient: statements it does not understand
//! (`CREATE EXTENSION`, `CREATE INDEX`, `INSERT`, ...) are skipped, and a
//! table that is absent from the text simply has no columns. Malformed
//! schema text degrades to empty results rather than errors, so table
//! discovery never crashes on partial input.

mod typemap;
mod types;

pub use typemap::value_type;
pub use types::{ColumnDescriptor, SqlType, TableDescriptor, ValueType};

/// Parse every `CREATE TABLE` statement in the schema text.
///
/// When the same table name appears more than once, the first definition
/// wins, matching `IF NOT EXISTS` semantics.
#[must_use]
pub fn parse_tables(schema_text: &str) -> Vec<TableDescriptor> {
    let cleaned = strip_comments(schema_text);
    let mut tables: Vec<TableDescriptor> = Vec::new();

    for stmt in split_statements(&cleaned) {
        let Some((name, body)) = parse_create_table(stmt) else {
            continue;
        };
        if tables.iter().any(|t| t.name.eq_ignore_ascii_case(&name)) {
            continue;
        }
        let columns = split_top_level(body)
            .into_iter()
            .filter_map(parse_column)
            .collect();
        tables.push(TableDescriptor { name, columns });
    }

    tables
}

/// Extract the column descriptors of a single table.
///
/// A table absent from the schema text yields an empty list, not an error.
#[must_use]
pub fn extract_columns(schema_text: &str, table_name: &str) -> Vec<ColumnDescriptor> {
    parse_tables(schema_text)
        .into_iter()
        .find(|t| t.name.eq_ignore_ascii_case(table_name))
        .map(|t| t.columns)
        .unwrap_or_default()
}

// =============================================================================
// Statement and column scanning
// =============================================================================

/// Blank out `--` line comments and `/* */` block comments, leaving quoted
/// literals untouched. Lengths are preserved so later scans stay aligned.
fn strip_comments(text: &str) -> String {
    let mut bytes = text.as_bytes().to_vec();
    let mut in_squote = false;
    let mut in_dquote = false;
    let mut escaped = false;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if escaped {
            escaped = false;
            i += 1;
            continue;
        }
        match b {
            b'\\' if in_squote || in_dquote => escaped = true,
            b'\'' if !in_dquote => in_squote = !in_squote,
            b'"' if !in_squote => in_dquote = !in_dquote,
            b'-' if !in_squote && !in_dquote && bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    bytes[i] = b' ';
                    i += 1;
                }
                continue;
            }
            b'/' if !in_squote && !in_dquote && bytes.get(i + 1) == Some(&b'*') => {
                while i < bytes.len() {
                    if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        bytes[i] = b' ';
                        bytes[i + 1] = b' ';
                        i += 2;
                        break;
                    }
                    bytes[i] = b' ';
                    i += 1;
                }
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    String::from_utf8(bytes).expect("comment stripping preserves UTF-8")
}

/// Split schema text into statements on top-level `;`, respecting single- and
/// double-quoted literals with backslash escapes.
fn split_statements(text: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0usize;
    let mut in_squote = false;
    let mut in_dquote = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_squote || in_dquote => escaped = true,
            b'\'' if !in_dquote => in_squote = !in_squote,
            b'"' if !in_squote => in_dquote = !in_dquote,
            b';' if !in_squote && !in_dquote => {
                statements.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        statements.push(&text[start..]);
    }
    statements
}

/// Match a `CREATE TABLE [IF NOT EXISTS] name ( ... )` statement, returning
/// the table name and the parenthesized column-list body.
fn parse_create_table(stmt: &str) -> Option<(String, &str)> {
    let rest = eat_keyword(stmt, "CREATE")?;
    let rest = eat_keyword(rest, "TABLE")?;
    let rest = match eat_keyword(rest, "IF") {
        Some(r) => eat_keyword(eat_keyword(r, "NOT")?, "EXISTS")?,
        None => rest,
    };
    let (name, rest, _) = parse_identifier(rest)?;
    let body = extract_parens(rest)?;
    Some((name, body))
}

/// Consume a keyword (case-insensitive, word-boundary checked) and return the
/// remainder.
fn eat_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let trimmed = input.trim_start();
    if trimmed.len() < keyword.len() {
        return None;
    }
    let (head, tail) = trimmed.split_at(keyword.len());
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    match tail.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => None,
        _ => Some(tail),
    }
}

/// Parse a (possibly double-quoted, possibly schema-qualified) identifier.
/// Returns `(name, remainder, was_quoted)`.
fn parse_identifier(input: &str) -> Option<(String, &str, bool)> {
    let trimmed = input.trim_start();

    if let Some(rest) = trimmed.strip_prefix('"') {
        let mut name = String::new();
        let mut iter = rest.char_indices().peekable();
        while let Some((i, c)) = iter.next() {
            if c == '"' {
                if matches!(iter.peek(), Some((_, '"'))) {
                    iter.next();
                    name.push('"');
                } else if name.is_empty() {
                    return None;
                } else {
                    return Some((name, &rest[i + 1..], true));
                }
            } else {
                name.push(c);
            }
        }
        return None;
    }

    let end = trimmed
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '.' || *c == '$'))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    if end == 0 {
        return None;
    }
    let token = &trimmed[..end];
    // Strip a schema qualifier if one was written
    let name = token.rsplit('.').next().unwrap_or(token);
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), &trimmed[end..], false))
}

/// Extract the contents of the first balanced parenthesis group, tracking
/// nesting depth and quote state.
fn extract_parens(input: &str) -> Option<&str> {
    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_squote = false;
    let mut in_dquote = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_squote || in_dquote => escaped = true,
            b'\'' if !in_dquote => in_squote = !in_squote,
            b'"' if !in_squote => in_dquote = !in_dquote,
            b'(' if !in_squote && !in_dquote => {
                if depth == 0 {
                    start = i + 1;
                }
                depth += 1;
            }
            b')' if !in_squote && !in_dquote => match depth {
                0 => return None,
                1 => return Some(&input[start..i]),
                _ => depth -= 1,
            },
            _ => {}
        }
    }
    None
}

/// Split a column-list body on top-level commas only: commas nested inside
/// parentheses or quoted literals do not split.
fn split_top_level(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut depth = 0usize;
    let mut in_squote = false;
    let mut in_dquote = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_squote || in_dquote => escaped = true,
            b'\'' if !in_dquote => in_squote = !in_squote,
            b'"' if !in_squote => in_dquote = !in_dquote,
            b'(' if !in_squote && !in_dquote => depth += 1,
            b')' if !in_squote && !in_dquote => depth = depth.saturating_sub(1),
            b',' if depth == 0 && !in_squote && !in_dquote => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < body.len() {
        parts.push(&body[start..]);
    }
    parts
}

// =============================================================================
// Column definitions
// =============================================================================

/// Keywords that open a table-level constraint entry rather than a column.
const TABLE_CONSTRAINTS: [&str; 6] = [
    "CONSTRAINT",
    "PRIMARY",
    "FOREIGN",
    "UNIQUE",
    "CHECK",
    "EXCLUDE",
];

/// Parse one column definition: the name is the first whitespace-delimited
/// token, the remainder is scanned for a type keyword and constraint facts.
fn parse_column(def: &str) -> Option<ColumnDescriptor> {
    let trimmed = def.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (name, rest, quoted) = parse_identifier(trimmed)?;
    if !quoted
        && TABLE_CONSTRAINTS
            .iter()
            .any(|kw| name.eq_ignore_ascii_case(kw))
    {
        return None;
    }

    let sql_type = detect_type(rest);
    let value_type = value_type(&sql_type);

    let masked = mask_literals(rest);
    let words: Vec<String> = masked
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_uppercase())
        .collect();
    let has_word = |w: &str| words.iter().any(|x| x == w);
    let has_pair = |a: &str, b: &str| words.windows(2).any(|w| w[0] == a && w[1] == b);

    let primary_key = has_pair("PRIMARY", "KEY");
    let not_null = primary_key || has_pair("NOT", "NULL");
    let has_default = has_word("DEFAULT")
        || (has_word("GENERATED") && has_word("IDENTITY"))
        || has_word("SERIAL")
        || has_word("BIGSERIAL");

    Some(ColumnDescriptor {
        name,
        sql_type,
        value_type,
        not_null,
        has_default,
        primary_key,
    })
}

/// Scan a column definition's remainder for a type keyword.
///
/// Keywords match case-insensitively on word boundaries, against a copy of
/// the text with quoted literals blanked out so a `DEFAULT 'TEXT'` clause
/// cannot shadow the real type. The check order matters: BIGINT before
/// INTEGER/INT, VECTOR with its dimension before anything that could follow,
/// JSONB before JSON, and ENUM captures its literal set from the original
/// (unmasked) text.
fn detect_type(rest: &str) -> SqlType {
    let masked = mask_literals(rest);

    if find_word(&masked, "BIGINT").is_some() {
        return SqlType::BigInt;
    }
    if find_word(&masked, "INTEGER").is_some() || find_word(&masked, "INT").is_some() {
        return SqlType::Integer;
    }
    if find_word(&masked, "TEXT").is_some() {
        return SqlType::Text;
    }
    if find_word(&masked, "VARCHAR").is_some() {
        return SqlType::Varchar;
    }
    if let Some(pos) = find_word(&masked, "VECTOR") {
        return SqlType::Vector(parse_vector_dim(&masked, pos + "VECTOR".len()));
    }
    if find_word(&masked, "BOOLEAN").is_some() {
        return SqlType::Boolean;
    }
    if find_word(&masked, "TIMESTAMP").is_some() {
        return SqlType::Timestamp;
    }
    if find_word(&masked, "JSONB").is_some() {
        return SqlType::Jsonb;
    }
    if find_word(&masked, "JSON").is_some() {
        return SqlType::Json;
    }
    if let Some(pos) = find_word(&masked, "ENUM") {
        return SqlType::Enum(parse_enum_literals(rest, &masked, pos + "ENUM".len()));
    }

    SqlType::Unknown(
        rest.split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string(),
    )
}

/// Blank out quoted string literals byte-for-byte, so keyword scans and
/// position lookups operate on text free of literal content while indices
/// stay aligned with the original.
fn mask_literals(input: &str) -> String {
    let mut bytes = input.as_bytes().to_vec();
    let mut in_squote = false;
    let mut in_dquote = false;
    let mut escaped = false;

    for b in bytes.iter_mut() {
        if escaped {
            escaped = false;
            *b = b' ';
            continue;
        }
        match *b {
            b'\\' if in_squote || in_dquote => {
                escaped = true;
                *b = b' ';
            }
            b'\'' if !in_dquote => {
                in_squote = !in_squote;
                *b = b' ';
            }
            b'"' if !in_squote => {
                in_dquote = !in_dquote;
                *b = b' ';
            }
            _ if in_squote || in_dquote => *b = b' ',
            _ => {}
        }
    }

    // Literal bytes were replaced with ASCII spaces, never split mid-char
    String::from_utf8(bytes).expect("masking preserves UTF-8")
}

/// Case-insensitive word-boundary search. Returns the byte offset of the
/// match.
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let ndl = needle.as_bytes();
    if ndl.is_empty() || hay.len() < ndl.len() {
        return None;
    }

    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    for i in 0..=hay.len() - ndl.len() {
        if !hay[i..i + ndl.len()].eq_ignore_ascii_case(ndl) {
            continue;
        }
        let before_ok = i == 0 || !is_word(hay[i - 1]);
        let after_ok = i + ndl.len() >= hay.len() || !is_word(hay[i + ndl.len()]);
        if before_ok && after_ok {
            return Some(i);
        }
    }
    None
}

/// Parse the `(n)` dimension following a VECTOR keyword, if present.
fn parse_vector_dim(masked: &str, after: usize) -> Option<usize> {
    let rest = masked[after..].trim_start();
    let inner = rest.strip_prefix('(')?;
    let close = inner.find(')')?;
    inner[..close].trim().parse().ok()
}

/// Parse the quoted literal list inside `ENUM(...)` into its ordered value
/// set. Positions come from the masked text; content comes from the original.
fn parse_enum_literals(rest: &str, masked: &str, after: usize) -> Vec<String> {
    let offset = match masked[after..].find('(') {
        Some(i) => after + i,
        None => return Vec::new(),
    };
    let Some(inner) = extract_parens(&rest[offset..]) else {
        return Vec::new();
    };
    split_top_level(inner)
        .into_iter()
        .map(unquote_literal)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Strip surrounding single quotes from a literal and resolve `\'`, `\\` and
/// doubled `''` escapes.
fn unquote_literal(item: &str) -> String {
    let trimmed = item.trim();
    let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
    else {
        return trimmed.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '\'' if matches!(chars.peek(), Some('\'')) => {
                chars.next();
                out.push('\'');
            }
            _ => out.push(c),
        }
    }
    out
}
