use crc32fast::Hasher;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ClosureTableError;

/// Environment variable overriding the suffix appended to the entity table name.
pub const SUFFIX_ENV: &str = "CLOSURE_TABLE_SUFFIX";

const DEFAULT_SUFFIX: &str = "tree";
const MAX_IDENTIFIER_LEN: usize = 63;

static SUFFIX: Lazy<String> = Lazy::new(|| {
    std::env::var(SUFFIX_ENV)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_SUFFIX.to_string())
});

/// Suffix used to derive `<table><suffix>` closure table names.
pub fn closure_table_suffix() -> &'static str {
    SUFFIX.as_str()
}

/// Immutable coordinates of the closure table backing a hierarchy.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClosureTableConfig {
    entity_name: String,
    table: String,
    closure_table: String,
    ancestor_column: String,
    descendant_column: String,
    depth_column: String,
    root_column: String,
    advisory_lock_strategy: AdvisoryLockStrategy,
}

impl ClosureTableConfig {
    /// Create a configuration for `table`, using the conventional column names.
    pub fn new(entity_name: impl Into<String>, table: impl Into<String>) -> Self {
        let entity_name = entity_name.into();
        let table = table.into();
        let closure_table = format!("{table}{}", closure_table_suffix());

        let default_lock =
            AdvisoryLockStrategy::Namespaced(AdvisoryLockKey::derived_from(&table, &closure_table));

        Self {
            entity_name,
            table,
            closure_table,
            ancestor_column: "ancestor_id".to_string(),
            descendant_column: "descendant_id".to_string(),
            depth_column: "depth".to_string(),
            root_column: "root".to_string(),
            advisory_lock_strategy: default_lock,
        }
    }

    /// Merge options produced by [`ClosureTableOptions`].
    pub(crate) fn apply_options(mut self, options: ClosureTableOptions) -> Self {
        let mut rekey = false;
        if let Some(closure_table) = options.closure_table {
            self.closure_table = closure_table;
            rekey = true;
        }
        if let Some(ancestor_column) = options.ancestor_column {
            self.ancestor_column = ancestor_column;
        }
        if let Some(descendant_column) = options.descendant_column {
            self.descendant_column = descendant_column;
        }
        if let Some(depth_column) = options.depth_column {
            self.depth_column = depth_column;
        }
        if let Some(root_column) = options.root_column {
            self.root_column = root_column;
        }
        if let Some(strategy) = options.advisory_lock_strategy {
            self.advisory_lock_strategy = strategy;
        } else if rekey && self.advisory_lock_strategy.key().is_some() {
            self.advisory_lock_strategy = AdvisoryLockStrategy::Namespaced(
                AdvisoryLockKey::derived_from(&self.table, &self.closure_table),
            );
        }
        self
    }

    /// Check every identifier before it is spliced into SQL.
    pub fn validate(&self) -> Result<(), ClosureTableError> {
        validate_identifier("table", &self.table)?;
        validate_identifier("closure table", &self.closure_table)?;
        validate_identifier("ancestor column", &self.ancestor_column)?;
        validate_identifier("descendant column", &self.descendant_column)?;
        validate_identifier("depth column", &self.depth_column)?;
        validate_identifier("root column", &self.root_column)?;

        let columns = [
            &self.ancestor_column,
            &self.descendant_column,
            &self.depth_column,
            &self.root_column,
        ];
        for (index, column) in columns.iter().enumerate() {
            if columns[index + 1..].contains(column) {
                return Err(ClosureTableError::configuration(format!(
                    "closure column `{column}` is configured more than once"
                )));
            }
        }
        if self.closure_table == self.table {
            return Err(ClosureTableError::configuration(format!(
                "closure table `{}` must differ from the entity table",
                self.closure_table
            )));
        }
        Ok(())
    }

    /// Human-readable Rust struct name for the entity.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Table storing the entity records.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Table storing the closure rows.
    pub fn closure_table(&self) -> &str {
        &self.closure_table
    }

    pub fn ancestor_column(&self) -> &str {
        &self.ancestor_column
    }

    pub fn descendant_column(&self) -> &str {
        &self.descendant_column
    }

    pub fn depth_column(&self) -> &str {
        &self.depth_column
    }

    pub fn root_column(&self) -> &str {
        &self.root_column
    }

    /// Advisory lock strategy (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }
}

/// Builder-style overrides consumed by the derive macro or loaded from host configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClosureTableOptions {
    closure_table: Option<String>,
    ancestor_column: Option<String>,
    descendant_column: Option<String>,
    depth_column: Option<String>,
    root_column: Option<String>,
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
}

impl ClosureTableOptions {
    /// Parse options from a JSON object such as
    /// `{"closure_table": "comments_closure", "depth_column": "level"}`.
    pub fn from_json_str(raw: &str) -> Result<Self, ClosureTableError> {
        serde_json::from_str(raw).map_err(|err| {
            ClosureTableError::configuration(format!("invalid closure-table options: {err}"))
        })
    }

    pub fn closure_table(mut self, value: impl Into<String>) -> Self {
        self.closure_table = Some(value.into());
        self
    }

    pub fn ancestor_column(mut self, value: impl Into<String>) -> Self {
        self.ancestor_column = Some(value.into());
        self
    }

    pub fn descendant_column(mut self, value: impl Into<String>) -> Self {
        self.descendant_column = Some(value.into());
        self
    }

    pub fn depth_column(mut self, value: impl Into<String>) -> Self {
        self.depth_column = Some(value.into());
        self
    }

    pub fn root_column(mut self, value: impl Into<String>) -> Self {
        self.root_column = Some(value.into());
        self
    }

    pub fn advisory_lock_strategy(mut self, strategy: AdvisoryLockStrategy) -> Self {
        self.advisory_lock_strategy = Some(strategy);
        self
    }

    pub fn apply(self, base: ClosureTableConfig) -> ClosureTableConfig {
        base.apply_options(self)
    }
}

/// Key used for PostgreSQL advisory locks.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdvisoryLockKey(String);

impl AdvisoryLockKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn derived_from(table: &str, closure_table: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(table.as_bytes());
        hasher.update(b"/");
        hasher.update(closure_table.as_bytes());
        let crc = hasher.finalize();
        Self(format!("closure-table::{table}::{closure_table}::{crc:x}"))
    }
}

/// Configuration describing how to serialize concurrent mutations.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryLockStrategy {
    Disabled,
    Namespaced(AdvisoryLockKey),
}

impl AdvisoryLockStrategy {
    pub fn key(&self) -> Option<&AdvisoryLockKey> {
        match self {
            AdvisoryLockStrategy::Disabled => None,
            AdvisoryLockStrategy::Namespaced(key) => Some(key),
        }
    }
}

pub(crate) fn validate_identifier(role: &str, value: &str) -> Result<(), ClosureTableError> {
    if value.is_empty() {
        return Err(ClosureTableError::configuration(format!(
            "{role} name cannot be empty"
        )));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ClosureTableError::configuration(format!(
            "{role} name `{value}` exceeds {MAX_IDENTIFIER_LEN} bytes"
        )));
    }

    let mut chars = value.chars();
    let leading_ok = chars
        .next()
        .map(|first| first.is_ascii_alphabetic() || first == '_')
        .unwrap_or(false);
    if !leading_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ClosureTableError::configuration(format!(
            "{role} name `{value}` must match [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(())
}
