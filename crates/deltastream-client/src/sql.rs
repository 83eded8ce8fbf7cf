//! Statement text helpers: identifier and literal quoting, `WITH ( ... )`
//! option lists.

/// Double-quote an identifier, doubling embedded double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling embedded single quotes.
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn bool_to_sql(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

/// `"db"."schema"."name"`
pub fn quote_fqn(database: &str, schema: &str, name: &str) -> String {
    format!(
        "{}.{}.{}",
        quote_ident(database),
        quote_ident(schema),
        quote_ident(name)
    )
}

/// Ordered `'key' = value` pairs for `WITH ( ... )` clauses.
///
/// Keys keep insertion order; setting a key twice replaces the earlier value
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithOptions {
    pairs: Vec<(String, String)>,
}

impl WithOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value rendered verbatim (keywords, booleans, `NULL`).
    pub fn raw(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key.to_string(), value)),
        }
        self
    }

    pub fn string(&mut self, key: &str, value: &str) -> &mut Self {
        self.raw(key, quote_string(value))
    }

    pub fn boolean(&mut self, key: &str, value: bool) -> &mut Self {
        self.raw(key, bool_to_sql(value))
    }

    pub fn null(&mut self, key: &str) -> &mut Self {
        self.raw(key, "NULL")
    }

    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.pairs.retain(|(k, _)| k != key);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// `'k1' = v1, 'k2' = v2`
    pub fn render(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{} = {}", quote_string(k), v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
