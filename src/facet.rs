use async_trait::async_trait;
use sea_orm::{ConnectionTrait, TransactionTrait};

use crate::config::ClosureTableConfig;
use crate::error::ClosureTableError;
use crate::relation::{self, TreeRelation};
use crate::row::Membership;
use crate::traits::ClosureTableModel;

/// Hierarchy capability available on every [`ClosureTableModel`].
///
/// Each method resolves the model's configured closure table, binds a [`TreeRelation`] to the
/// model and forwards. The `has_*` predicates are emptiness checks over the matching read.
#[async_trait]
pub trait Hierarchy: ClosureTableModel {
    /// Relation over the model's own configured closure table.
    fn closure_relation(&self) -> Result<TreeRelation<'_, Self>, ClosureTableError> {
        TreeRelation::new(self, Self::closure_table_config())
    }

    /// Relation over an explicitly supplied closure table.
    fn closure_relation_with<'a>(
        &'a self,
        config: &'a ClosureTableConfig,
    ) -> Result<TreeRelation<'a, Self>, ClosureTableError> {
        TreeRelation::new(self, config)
    }

    async fn roots<C>(conn: &C) -> Result<Vec<Self>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        relation::roots::<Self, C>(conn, Self::closure_table_config()).await
    }

    async fn membership<C>(&self, conn: &C) -> Result<Membership, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.closure_relation()?.membership(conn).await
    }

    async fn is_root<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.closure_relation()?.is_root(conn).await
    }

    async fn ancestors<C>(&self, conn: &C) -> Result<Vec<Self>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.closure_relation()?.ancestors(conn).await
    }

    async fn descendants<C>(&self, conn: &C) -> Result<Vec<Self>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.closure_relation()?.descendants(conn).await
    }

    async fn children<C>(&self, conn: &C) -> Result<Vec<Self>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.closure_relation()?.children(conn).await
    }

    async fn parent<C>(&self, conn: &C) -> Result<Option<Self>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.closure_relation()?.parent(conn).await
    }

    async fn siblings<C>(&self, conn: &C) -> Result<Vec<Self>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.closure_relation()?.siblings(conn).await
    }

    async fn next<C>(&self, conn: &C) -> Result<Option<Self>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.closure_relation()?.next(conn).await
    }

    async fn previous<C>(&self, conn: &C) -> Result<Option<Self>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.closure_relation()?.previous(conn).await
    }

    async fn has_children<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        Ok(!self.children(conn).await?.is_empty())
    }

    async fn has_descendants<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        Ok(!self.descendants(conn).await?.is_empty())
    }

    async fn has_ancestors<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        Ok(!self.ancestors(conn).await?.is_empty())
    }

    async fn has_parent<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        Ok(self.parent(conn).await?.is_some())
    }

    async fn has_siblings<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        Ok(!self.siblings(conn).await?.is_empty())
    }

    async fn has_next<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        Ok(self.next(conn).await?.is_some())
    }

    async fn has_previous<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        Ok(self.previous(conn).await?.is_some())
    }

    /// Root this model in its own tree; `false` when it was already attached.
    async fn attach_to_self<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.closure_relation()?.attach_to_self(conn).await
    }

    async fn attach<C>(&self, conn: &C, child: &Self) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.closure_relation()?.attach(conn, child).await
    }

    async fn move_to<C>(&self, conn: &C, new_parent: &Self) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.closure_relation()?.move_to(conn, new_parent).await
    }

    async fn detach<C>(&self, conn: &C) -> Result<u64, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.closure_relation()?.detach(conn).await
    }
}

impl<M> Hierarchy for M where M: ClosureTableModel {}
