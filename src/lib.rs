//! Closure-table hierarchies for SeaORM entities.
//!
//! A closure table stores one `(ancestor, descendant, depth)` row for every pair of related
//! nodes, plus a depth-0 self-loop per node whose `root` flag marks top-level nodes. Ancestor,
//! descendant, sibling and neighbour reads are plain joins against it; attach, move and detach
//! keep it exact with set-based statements, each inside its own transaction.
//!
//! PostgreSQL and SQLite are supported through SeaORM's sqlx drivers; on PostgreSQL mutations
//! additionally serialize on an advisory lock per hierarchy.

pub mod config;
pub mod error;
pub mod facet;
pub mod lock;
pub mod relation;
pub mod row;
pub mod store;
pub mod traits;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::config::{AdvisoryLockStrategy, ClosureTableConfig, ClosureTableOptions};
    pub use crate::facet::Hierarchy;
    pub use crate::relation::TreeRelation;
    pub use crate::row::{ClosureRow, Membership};
    pub use crate::traits::ClosureTableModel;
}

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

pub use closure_table_macros::ClosureTableModel as ClosureTableModelDerive;
#[doc(hidden)]
pub use closure_table_macros::ClosureTableModel;
pub use config::{
    closure_table_suffix, AdvisoryLockKey, AdvisoryLockStrategy, ClosureTableConfig,
    ClosureTableOptions,
};
pub use error::ClosureTableError;
pub use facet::Hierarchy;
pub use relation::{roots, TreeRelation};
pub use row::{ClosureRow, Membership};
pub use store::ClosureStore;
pub use traits::ClosureTableModel;
