//! Session context and statement payloads

use crate::config::OrganizationRef;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Name resolution and authorization scope applied to every statement on a
/// session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub organization: Option<OrganizationRef>,
    pub role: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub store: Option<String>,
}

impl SessionContext {
    pub fn with_role(mut self, role: Option<String>) -> Self {
        self.role = role;
        self
    }

    /// Scope unqualified names to `database`.`schema` and the given store.
    pub fn scoped(mut self, database: &str, schema: &str, store: &str) -> Self {
        self.database = Some(database.to_string());
        self.schema = Some(schema.to_string());
        self.store = Some(store.to_string());
        self
    }
}

/// Out-of-band binary payload referenced from statement text as `'@name'`.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A single statement plus its attachments.
#[derive(Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub attachments: Vec<Attachment>,
    /// Statement text embeds credentials and must not be logged verbatim
    pub sensitive: bool,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            attachments: Vec::new(),
            sensitive: false,
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Text safe for logs: sensitive statements are cut before their
    /// `WITH` clause.
    pub fn log_text(&self) -> Cow<'_, str> {
        if !self.sensitive {
            return Cow::Borrowed(&self.sql);
        }
        let head = match self.sql.find(" WITH") {
            Some(idx) => &self.sql[..idx],
            None => self.sql.split_whitespace().next().unwrap_or_default(),
        };
        Cow::Owned(format!("{head} WITH ( <redacted> )"))
    }

    pub fn attach(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.attachments.push(Attachment {
            name: name.into(),
            data,
        });
        self
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.log_text())
            .field("attachments", &self.attachments)
            .finish()
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}
