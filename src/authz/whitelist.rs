//! Static schema whitelist.
//!
//! Built once at startup and shared immutably. Any schema outside this set
//! is rejected before a single collaborator call is made, so untrusted
//! input never reaches a query as a raw identifier.

use std::collections::HashSet;

/// Longest identifier Postgres accepts without truncation.
const MAX_SCHEMA_LEN: usize = 63;

/// True if `name` is a plain lower-case identifier (`[a-z_][a-z0-9_]*`).
pub fn is_valid_schema_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_SCHEMA_LEN
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Immutable set of tenant schemas that may ever be queried.
#[derive(Debug, Clone)]
pub struct SchemaWhitelist {
    schemas: HashSet<String>,
}

impl SchemaWhitelist {
    pub fn new<I, S>(schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schemas: schemas.into_iter().map(Into::into).collect(),
        }
    }

    /// Pure in-memory membership check.
    pub fn contains(&self, schema: &str) -> bool {
        self.schemas.contains(schema)
    }
}
