use sea_orm::{DbErr, QueryResult, TryGetable};
use serde::{Deserialize, Serialize};

/// Column aliases used by every closure-row select, independent of the configured names.
pub(crate) const ANCESTOR_ALIAS: &str = "ancestor";
pub(crate) const DESCENDANT_ALIAS: &str = "descendant";
pub(crate) const DEPTH_ALIAS: &str = "depth";
pub(crate) const ROOT_ALIAS: &str = "root";

/// One `(ancestor, descendant, depth, root)` row of a closure table.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClosureRow<Id> {
    pub ancestor: Id,
    pub descendant: Id,
    pub depth: i32,
    pub root: bool,
}

impl<Id: TryGetable> ClosureRow<Id> {
    pub(crate) fn from_query_result(row: &QueryResult) -> Result<Self, DbErr> {
        Ok(Self {
            ancestor: row.try_get("", ANCESTOR_ALIAS)?,
            descendant: row.try_get("", DESCENDANT_ALIAS)?,
            depth: row.try_get("", DEPTH_ALIAS)?,
            root: row.try_get("", ROOT_ALIAS)?,
        })
    }
}

impl<Id: PartialEq> ClosureRow<Id> {
    pub fn is_self_loop(&self) -> bool {
        self.depth == 0 && self.ancestor == self.descendant
    }
}

/// Where a node currently sits, as observed from its closure rows.
///
/// A detached node leaves no rows behind and therefore reads as `Unattached`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Unattached,
    Root,
    Child,
}

impl Membership {
    pub fn is_attached(self) -> bool {
        !matches!(self, Membership::Unattached)
    }
}
