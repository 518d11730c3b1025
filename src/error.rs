use thiserror::Error;

/// Errors returned by the closure-table APIs.
#[derive(Debug, Error)]
pub enum ClosureTableError {
    #[error("invalid closure-table configuration: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("{operation} failed for node {key}: {source}")]
    Mutation {
        operation: &'static str,
        key: String,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("node {key} is already attached to the hierarchy; move it instead")]
    AlreadyAttached { key: String },

    #[error("node {key} is not attached to the hierarchy")]
    NotAttached { key: String },

    #[error("moving node {node} under {parent} would create a cycle")]
    Cycle { node: String, parent: String },

    #[error("closure-table invariant violation: {0}")]
    Invariant(String),
}

impl ClosureTableError {
    pub fn configuration(detail: impl Into<String>) -> Self {
        Self::Configuration(detail.into())
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }

    pub(crate) fn mutation(
        operation: &'static str,
        key: &impl std::fmt::Debug,
    ) -> impl FnOnce(sea_orm::DbErr) -> Self {
        let key = format!("{key:?}");
        move |source| Self::Mutation {
            operation,
            key,
            source,
        }
    }
}
