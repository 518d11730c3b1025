use sea_orm::{ConnectionTrait, IdenStatic, Statement, TransactionTrait, Value};
use tracing::{debug, trace, warn};

use crate::config::{validate_identifier, ClosureTableConfig};
use crate::error::ClosureTableError;
use crate::lock::LockedTransaction;
use crate::row::{ClosureRow, Membership};
use crate::store::{ClosureStore, Direction, Neighbor, Reach};
use crate::traits::ClosureTableModel;

/// Closure-table operations bound to one entity.
///
/// Reads run as joins against the closure table and return empty results for nodes that were
/// never attached. Mutations run inside a [`LockedTransaction`] and either fully apply or roll
/// back.
#[derive(Debug)]
pub struct TreeRelation<'a, M>
where
    M: ClosureTableModel,
{
    model: &'a M,
    config: &'a ClosureTableConfig,
    store: ClosureStore,
}

impl<'a, M> TreeRelation<'a, M>
where
    M: ClosureTableModel,
{
    /// Bind `model` to the closure table described by `config`.
    ///
    /// Fails with [`ClosureTableError::Configuration`] before any statement is issued when a
    /// table or column name is unusable.
    pub fn new(model: &'a M, config: &'a ClosureTableConfig) -> Result<Self, ClosureTableError> {
        let store = store_for::<M>(config)?;
        Ok(Self {
            model,
            config,
            store,
        })
    }

    fn key(&self) -> Value {
        M::id_to_value(&self.model.id())
    }

    fn related<'b>(&'b self, other: &'b M) -> TreeRelation<'b, M> {
        TreeRelation {
            model: other,
            config: self.config,
            store: self.store.clone(),
        }
    }

    /// Every closure row naming this node as descendant, its self-loop first.
    pub async fn closure_rows<C>(&self, conn: &C) -> Result<Vec<ClosureRow<M::Id>>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let statement = self
            .store
            .select_rows(conn.get_database_backend(), self.key());
        fetch_rows::<M, C>(conn, statement).await
    }

    pub async fn membership<C>(&self, conn: &C) -> Result<Membership, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let key = self.key();
        let statement = self
            .store
            .select_link(conn.get_database_backend(), key.clone(), key);
        let rows = fetch_rows::<M, C>(conn, statement).await?;

        match rows.as_slice() {
            [] => Ok(Membership::Unattached),
            [own] if own.root => Ok(Membership::Root),
            [_] => Ok(Membership::Child),
            _ => Err(ClosureTableError::invariant(format!(
                "node {:?} has {} self-loop rows",
                self.model.id(),
                rows.len()
            ))),
        }
    }

    pub async fn is_root<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        Ok(self.membership(conn).await? == Membership::Root)
    }

    /// Number of edges between this node and the top of its tree.
    pub async fn depth<C>(&self, conn: &C) -> Result<Option<i32>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let rows = self.closure_rows(conn).await?;
        Ok(rows.iter().map(|row| row.depth).max())
    }

    /// Ancestors of this node, root first.
    pub async fn ancestors<C>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.ancestors_within(conn, Reach::Proper).await
    }

    pub async fn self_and_ancestors<C>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.ancestors_within(conn, Reach::SelfAnd).await
    }

    /// Descendants of this node, shallowest first.
    pub async fn descendants<C>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.descendants_within(conn, Reach::Proper).await
    }

    pub async fn self_and_descendants<C>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.descendants_within(conn, Reach::SelfAnd).await
    }

    pub async fn children<C>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.descendants_within(conn, Reach::Immediate).await
    }

    pub async fn parent<C>(&self, conn: &C) -> Result<Option<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let mut parents = self.ancestors_within(conn, Reach::Immediate).await?;
        if parents.len() > 1 {
            return Err(ClosureTableError::invariant(format!(
                "node {:?} has {} immediate parents",
                self.model.id(),
                parents.len()
            )));
        }
        Ok(parents.pop())
    }

    /// Nodes sharing this node's parent, by sort order. Roots have no siblings.
    pub async fn siblings<C>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let statement = self
            .store
            .select_siblings(conn.get_database_backend(), self.key(), None);
        fetch_all::<M, C>(conn, statement).await
    }

    /// The sibling right after this node in `(sort, key)` order.
    ///
    /// A root has no parent to share, so its level is the set of roots.
    pub async fn next<C>(&self, conn: &C) -> Result<Option<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.neighbor(conn, Direction::Next).await
    }

    /// The sibling right before this node in `(sort, key)` order.
    pub async fn previous<C>(&self, conn: &C) -> Result<Option<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        self.neighbor(conn, Direction::Previous).await
    }

    pub async fn roots<C>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let statement = self.store.select_roots(conn.get_database_backend(), None);
        fetch_all::<M, C>(conn, statement).await
    }

    async fn ancestors_within<C>(&self, conn: &C, reach: Reach) -> Result<Vec<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let statement = self
            .store
            .select_ancestors(conn.get_database_backend(), self.key(), reach);
        fetch_all::<M, C>(conn, statement).await
    }

    async fn descendants_within<C>(
        &self,
        conn: &C,
        reach: Reach,
    ) -> Result<Vec<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let statement = self
            .store
            .select_descendants(conn.get_database_backend(), self.key(), reach);
        fetch_all::<M, C>(conn, statement).await
    }

    async fn neighbor<C>(&self, conn: &C, direction: Direction) -> Result<Option<M>, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let backend = conn.get_database_backend();
        let neighbor = Neighbor {
            direction,
            key: self.key(),
            sort: self.model.sort_value(),
        };

        let statement = match self.membership(conn).await? {
            Membership::Unattached => return Ok(None),
            Membership::Root => self.store.select_roots(backend, Some(neighbor)),
            Membership::Child => self.store.select_siblings(backend, self.key(), Some(neighbor)),
        };
        trace!(sql = %statement.sql, "closure-table neighbour read");
        Ok(M::find_by_statement(statement).one(conn).await?)
    }

    /// Make this node a root of its own tree. Returns `false` when it was already attached,
    /// either as a root or as somebody's child.
    pub async fn attach_to_self<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let id = self.model.id();
        let guard = LockedTransaction::acquire(self.config.advisory_lock_strategy(), conn)
            .await
            .map_err(ClosureTableError::mutation("attach_to_self", &id))?;
        let result = self.attach_to_self_on(guard.connection()).await;
        finish(guard, "attach_to_self", &id, result).await
    }

    /// Attach `child` as an immediate child of this node, rooting this node first when it is not
    /// in any tree yet. `child` must not be attached anywhere; use [`Self::move_to`] for that.
    pub async fn attach<C>(&self, conn: &C, child: &M) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let id = self.model.id();
        let child_id = child.id();
        if child_id == id {
            return Err(ClosureTableError::Cycle {
                node: format!("{child_id:?}"),
                parent: format!("{id:?}"),
            });
        }

        let guard = LockedTransaction::acquire(self.config.advisory_lock_strategy(), conn)
            .await
            .map_err(ClosureTableError::mutation("attach", &child_id))?;
        let result = self.attach_on(guard.connection(), child).await;
        finish(guard, "attach", &child_id, result).await
    }

    /// Re-hang this node, with its whole subtree, under `new_parent`.
    ///
    /// Depths inside the subtree are preserved; every row to the old ancestors is replaced by
    /// rows to the new ancestor chain. `new_parent` becomes a root first when it is unattached.
    pub async fn move_to<C>(&self, conn: &C, new_parent: &M) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let id = self.model.id();
        let guard = LockedTransaction::acquire(self.config.advisory_lock_strategy(), conn)
            .await
            .map_err(ClosureTableError::mutation("move", &id))?;
        let result = self.move_on(guard.connection(), new_parent).await;
        finish(guard, "move", &id, result).await
    }

    /// Remove this node and its whole subtree from the closure table. Returns the number of
    /// closure rows deleted; zero when the node was not attached.
    pub async fn detach<C>(&self, conn: &C) -> Result<u64, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let id = self.model.id();
        let guard = LockedTransaction::acquire(self.config.advisory_lock_strategy(), conn)
            .await
            .map_err(ClosureTableError::mutation("detach", &id))?;
        let result = self.detach_on(guard.connection()).await;
        finish(guard, "detach", &id, result).await
    }

    async fn attach_to_self_on<C>(&self, conn: &C) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let id = self.model.id();
        if self.membership(conn).await?.is_attached() {
            trace!(node = ?id, "node already attached, skipping root insert");
            return Ok(false);
        }

        let key = self.key();
        let statement = self
            .store
            .insert_subtree(conn.get_database_backend(), key.clone(), key, true);
        let inserted = conn
            .execute(statement)
            .await
            .map_err(ClosureTableError::mutation("attach_to_self", &id))?
            .rows_affected();

        debug!(node = ?id, rows = inserted, "attached node as root");
        Ok(true)
    }

    async fn attach_on<C>(&self, conn: &C, child: &M) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let child_id = child.id();
        if self.related(child).membership(conn).await?.is_attached() {
            return Err(ClosureTableError::AlreadyAttached {
                key: format!("{child_id:?}"),
            });
        }

        self.attach_to_self_on(conn).await?;

        let statement = self.store.insert_subtree(
            conn.get_database_backend(),
            self.key(),
            M::id_to_value(&child_id),
            false,
        );
        let inserted = conn
            .execute(statement)
            .await
            .map_err(ClosureTableError::mutation("attach", &child_id))?
            .rows_affected();

        debug!(parent = ?self.model.id(), child = ?child_id, rows = inserted, "attached child");
        Ok(())
    }

    async fn move_on<C>(&self, conn: &C, new_parent: &M) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let backend = conn.get_database_backend();
        let id = self.model.id();
        let parent_id = new_parent.id();

        if !self.membership(conn).await?.is_attached() {
            return Err(ClosureTableError::NotAttached {
                key: format!("{id:?}"),
            });
        }

        let link = self
            .store
            .select_link(backend, self.key(), M::id_to_value(&parent_id));
        if !fetch_rows::<M, C>(conn, link).await?.is_empty() {
            return Err(ClosureTableError::Cycle {
                node: format!("{id:?}"),
                parent: format!("{parent_id:?}"),
            });
        }

        self.related(new_parent).attach_to_self_on(conn).await?;

        let removed = conn
            .execute(self.store.detach_from_ancestors(backend, self.key()))
            .await
            .map_err(ClosureTableError::mutation("move", &id))?
            .rows_affected();
        let inserted = conn
            .execute(self.store.graft_subtree(
                backend,
                M::id_to_value(&parent_id),
                self.key(),
            ))
            .await
            .map_err(ClosureTableError::mutation("move", &id))?
            .rows_affected();
        conn.execute(self.store.clear_root_flag(backend, self.key()))
            .await
            .map_err(ClosureTableError::mutation("move", &id))?;

        debug!(
            node = ?id,
            parent = ?parent_id,
            removed,
            inserted,
            "moved subtree"
        );
        Ok(())
    }

    async fn detach_on<C>(&self, conn: &C) -> Result<u64, ClosureTableError>
    where
        C: ConnectionTrait,
    {
        let id = self.model.id();
        let statement = self
            .store
            .delete_subtree(conn.get_database_backend(), self.key());
        let removed = conn
            .execute(statement)
            .await
            .map_err(ClosureTableError::mutation("detach", &id))?
            .rows_affected();

        debug!(node = ?id, rows = removed, "detached subtree");
        Ok(removed)
    }
}

/// Roots of the hierarchy configured for `M`, by sort order.
pub async fn roots<M, C>(conn: &C, config: &ClosureTableConfig) -> Result<Vec<M>, ClosureTableError>
where
    M: ClosureTableModel,
    C: ConnectionTrait,
{
    let store = store_for::<M>(config)?;
    let statement = store.select_roots(conn.get_database_backend(), None);
    fetch_all::<M, C>(conn, statement).await
}

fn store_for<M>(config: &ClosureTableConfig) -> Result<ClosureStore, ClosureTableError>
where
    M: ClosureTableModel,
{
    config.validate()?;

    let id_column = M::id_column();
    let sort_column = M::sort_column();
    validate_identifier("primary key", id_column.as_str())?;
    validate_identifier("sort column", sort_column.as_str())?;

    Ok(ClosureStore::new(
        config,
        id_column.as_str(),
        sort_column.as_str(),
    ))
}

async fn fetch_all<M, C>(conn: &C, statement: Statement) -> Result<Vec<M>, ClosureTableError>
where
    M: ClosureTableModel,
    C: ConnectionTrait,
{
    trace!(sql = %statement.sql, "closure-table read");
    Ok(M::find_by_statement(statement).all(conn).await?)
}

async fn fetch_rows<M, C>(
    conn: &C,
    statement: Statement,
) -> Result<Vec<ClosureRow<M::Id>>, ClosureTableError>
where
    M: ClosureTableModel,
    C: ConnectionTrait,
{
    trace!(sql = %statement.sql, "closure-table row read");
    let rows = conn.query_all(statement).await?;
    let rows = rows
        .iter()
        .map(ClosureRow::from_query_result)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

async fn finish<T>(
    guard: LockedTransaction,
    operation: &'static str,
    key: &impl std::fmt::Debug,
    result: Result<T, ClosureTableError>,
) -> Result<T, ClosureTableError> {
    match result {
        Ok(value) => {
            guard
                .commit()
                .await
                .map_err(ClosureTableError::mutation(operation, key))?;
            Ok(value)
        }
        Err(err) => {
            warn!(operation, node = ?key, error = %err, "rolling back closure-table mutation");
            if let Err(rollback_err) = guard.rollback().await {
                warn!(
                    operation,
                    node = ?key,
                    error = %rollback_err,
                    "closure-table rollback failed"
                );
            }
            Err(err)
        }
    }
}
