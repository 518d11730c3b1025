//! Statement builders for the closure table.
//!
//! Every dynamic value is bound as a placeholder. Table and column names cannot be bound, so
//! they come from a validated [`ClosureTableConfig`] and are quoted for the target backend.

use sea_orm::{DbBackend, Statement, Value};

use crate::config::ClosureTableConfig;
use crate::row::{ANCESTOR_ALIAS, DEPTH_ALIAS, DESCENDANT_ALIAS, ROOT_ALIAS};

/// How far from the anchor node a read reaches.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Reach {
    /// The anchor itself plus every related node.
    SelfAnd,
    /// Every related node, excluding the anchor.
    Proper,
    /// Only nodes one edge away.
    Immediate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Next,
    Previous,
}

/// Restricts a sibling-level read to the single neighbour of `key` in sort order.
#[derive(Clone, Debug, PartialEq)]
pub struct Neighbor {
    pub direction: Direction,
    pub key: Value,
    pub sort: Value,
}

/// Builds the closure-table statements for one entity table. Holds names only.
#[derive(Clone, Debug)]
pub struct ClosureStore {
    table: String,
    primary_key: String,
    sort_column: String,
    closure_table: String,
    ancestor: String,
    descendant: String,
    depth: String,
    root: String,
}

impl ClosureStore {
    pub fn new(
        config: &ClosureTableConfig,
        primary_key: impl Into<String>,
        sort_column: impl Into<String>,
    ) -> Self {
        Self {
            table: config.table().to_owned(),
            primary_key: primary_key.into(),
            sort_column: sort_column.into(),
            closure_table: config.closure_table().to_owned(),
            ancestor: config.ancestor_column().to_owned(),
            descendant: config.descendant_column().to_owned(),
            depth: config.depth_column().to_owned(),
            root: config.root_column().to_owned(),
        }
    }

    /// Makes `descendant` reachable from every ancestor of `ancestor` one level deeper, and adds
    /// its self-loop row. With `ancestor == descendant` on an unattached node only the self-loop
    /// is inserted.
    pub fn insert_subtree(
        &self,
        backend: DbBackend,
        ancestor: Value,
        descendant: Value,
        is_root: bool,
    ) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);

        let chain_descendant = params.bind(descendant.clone());
        let chain_root = params.bind(is_root);
        let chain_anchor = params.bind(ancestor);
        let own_ancestor = params.bind(descendant.clone());
        let own_descendant = params.bind(descendant);
        let own_root = params.bind(is_root);

        let sql = format!(
            "INSERT INTO {ct} ({a}, {d}, {dp}, {r}) \
             SELECT c.{a}, {chain_descendant}, c.{dp} + 1, {chain_root} FROM {ct} AS c \
             WHERE c.{d} = {chain_anchor} \
             UNION ALL SELECT {own_ancestor}, {own_descendant}, 0, {own_root}",
            ct = q.closure_table,
            a = q.ancestor,
            d = q.descendant,
            dp = q.depth,
            r = q.root,
        );
        params.finish(sql)
    }

    /// Deletes every row whose descendant lies in the subtree rooted at `key`, `key` included.
    pub fn delete_subtree(&self, backend: DbBackend, key: Value) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);
        let root_key = params.bind(key);

        let sql = format!(
            "DELETE FROM {ct} WHERE {d} IN (\
             SELECT s.{d} FROM (SELECT * FROM {ct}) AS s WHERE s.{a} = {root_key})",
            ct = q.closure_table,
            a = q.ancestor,
            d = q.descendant,
        );
        params.finish(sql)
    }

    /// Cuts the subtree rooted at `key` loose from the ancestors above it while keeping the rows
    /// internal to the subtree.
    pub fn detach_from_ancestors(&self, backend: DbBackend, key: Value) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);
        let inner = params.bind(key.clone());
        let outer = params.bind(key);

        let sql = format!(
            "DELETE FROM {ct} WHERE {d} IN (\
             SELECT s.{d} FROM (SELECT * FROM {ct}) AS s WHERE s.{a} = {inner}) \
             AND {a} NOT IN (\
             SELECT x.{d} FROM (SELECT * FROM {ct}) AS x WHERE x.{a} = {outer})",
            ct = q.closure_table,
            a = q.ancestor,
            d = q.descendant,
        );
        params.finish(sql)
    }

    /// Hangs the subtree rooted at `key` under `parent`: every ancestor of `parent` (itself
    /// included) gains a row to every node of the subtree at the summed depth plus one.
    pub fn graft_subtree(&self, backend: DbBackend, parent: Value, key: Value) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);
        let root_flag = params.bind(false);
        let parent_key = params.bind(parent);
        let subtree_key = params.bind(key);

        let sql = format!(
            "INSERT INTO {ct} ({a}, {d}, {dp}, {r}) \
             SELECT p.{a}, s.{d}, p.{dp} + s.{dp} + 1, {root_flag} \
             FROM {ct} AS p CROSS JOIN {ct} AS s \
             WHERE p.{d} = {parent_key} AND s.{a} = {subtree_key}",
            ct = q.closure_table,
            a = q.ancestor,
            d = q.descendant,
            dp = q.depth,
            r = q.root,
        );
        params.finish(sql)
    }

    pub fn clear_root_flag(&self, backend: DbBackend, key: Value) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);
        let flag = params.bind(false);
        let ancestor = params.bind(key.clone());
        let descendant = params.bind(key);

        let sql = format!(
            "UPDATE {ct} SET {r} = {flag} WHERE {a} = {ancestor} AND {d} = {descendant} AND {dp} = 0",
            ct = q.closure_table,
            a = q.ancestor,
            d = q.descendant,
            dp = q.depth,
            r = q.root,
        );
        params.finish(sql)
    }

    /// Raw closure rows naming `key` as descendant, nearest first.
    pub fn select_rows(&self, backend: DbBackend, key: Value) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);
        let descendant = params.bind(key);

        let sql = format!(
            "{select} WHERE c.{d} = {descendant} ORDER BY c.{dp}",
            select = q.row_select(),
            d = q.descendant,
            dp = q.depth,
        );
        params.finish(sql)
    }

    /// The single closure row linking `ancestor` to `descendant`, if any.
    pub fn select_link(&self, backend: DbBackend, ancestor: Value, descendant: Value) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);
        let ancestor = params.bind(ancestor);
        let descendant = params.bind(descendant);

        let sql = format!(
            "{select} WHERE c.{a} = {ancestor} AND c.{d} = {descendant}",
            select = q.row_select(),
            a = q.ancestor,
            d = q.descendant,
        );
        params.finish(sql)
    }

    /// Entities above `key`, root first.
    pub fn select_ancestors(&self, backend: DbBackend, key: Value, reach: Reach) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);
        let descendant = params.bind(key);

        let sql = format!(
            "SELECT m.* FROM {t} AS m INNER JOIN {ct} AS c ON c.{a} = m.{pk} \
             WHERE c.{d} = {descendant} AND {depth} ORDER BY c.{dp} DESC",
            t = q.table,
            ct = q.closure_table,
            pk = q.primary_key,
            a = q.ancestor,
            d = q.descendant,
            dp = q.depth,
            depth = q.depth_condition("c", reach),
        );
        params.finish(sql)
    }

    /// Entities below `key`, nearest level first and by sort order within a level.
    pub fn select_descendants(&self, backend: DbBackend, key: Value, reach: Reach) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);
        let ancestor = params.bind(key);

        let sql = format!(
            "SELECT m.* FROM {t} AS m INNER JOIN {ct} AS c ON c.{d} = m.{pk} \
             WHERE c.{a} = {ancestor} AND {depth} ORDER BY c.{dp}, m.{sort}, m.{pk}",
            t = q.table,
            ct = q.closure_table,
            pk = q.primary_key,
            sort = q.sort_column,
            a = q.ancestor,
            d = q.descendant,
            dp = q.depth,
            depth = q.depth_condition("c", reach),
        );
        params.finish(sql)
    }

    /// Entities sharing the immediate parent of `key`, `key` excluded.
    ///
    /// `a` is the parent link of `key`; `s` every row from the same ancestor at the same depth;
    /// `m` the entity at the far end of `s`.
    pub fn select_siblings(
        &self,
        backend: DbBackend,
        key: Value,
        neighbor: Option<Neighbor>,
    ) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);
        let anchor = params.bind(key.clone());
        let excluded = params.bind(key);
        let (condition, order) = q.neighbor_clause(&mut params, neighbor.as_ref());

        let sql = format!(
            "SELECT m.* FROM {ct} AS a \
             INNER JOIN {ct} AS s ON s.{a} = a.{a} AND s.{dp} = a.{dp} \
             INNER JOIN {t} AS m ON m.{pk} = s.{d} \
             WHERE a.{d} = {anchor} AND a.{dp} = 1 AND m.{pk} <> {excluded}{condition} {order}",
            t = q.table,
            ct = q.closure_table,
            pk = q.primary_key,
            a = q.ancestor,
            d = q.descendant,
            dp = q.depth,
        );
        params.finish(sql)
    }

    /// Entities whose self-loop row carries the root flag, by sort order.
    ///
    /// With a neighbour, only the root adjacent to `neighbor.key` is returned.
    pub fn select_roots(&self, backend: DbBackend, neighbor: Option<Neighbor>) -> Statement {
        let q = Quoted::new(self, backend);
        let mut params = Params::new(backend);
        let flag = params.bind(true);
        let excluded = match neighbor.as_ref() {
            Some(neighbor) => format!(
                " AND m.{pk} <> {key}",
                pk = q.primary_key,
                key = params.bind(neighbor.key.clone())
            ),
            None => String::new(),
        };
        let (condition, order) = q.neighbor_clause(&mut params, neighbor.as_ref());

        let sql = format!(
            "SELECT m.* FROM {t} AS m INNER JOIN {ct} AS c ON c.{d} = m.{pk} \
             WHERE c.{a} = c.{d} AND c.{dp} = 0 AND c.{r} = {flag}{excluded}{condition} {order}",
            t = q.table,
            ct = q.closure_table,
            pk = q.primary_key,
            a = q.ancestor,
            d = q.descendant,
            dp = q.depth,
            r = q.root,
        );
        params.finish(sql)
    }
}

struct Quoted {
    table: String,
    primary_key: String,
    sort_column: String,
    closure_table: String,
    ancestor: String,
    descendant: String,
    depth: String,
    root: String,
}

impl Quoted {
    fn new(store: &ClosureStore, backend: DbBackend) -> Self {
        Self {
            table: quote_ident(backend, &store.table),
            primary_key: quote_ident(backend, &store.primary_key),
            sort_column: quote_ident(backend, &store.sort_column),
            closure_table: quote_ident(backend, &store.closure_table),
            ancestor: quote_ident(backend, &store.ancestor),
            descendant: quote_ident(backend, &store.descendant),
            depth: quote_ident(backend, &store.depth),
            root: quote_ident(backend, &store.root),
        }
    }

    fn row_select(&self) -> String {
        format!(
            "SELECT c.{a} AS {ancestor}, c.{d} AS {descendant}, c.{dp} AS {depth}, c.{r} AS {root} \
             FROM {ct} AS c",
            a = self.ancestor,
            d = self.descendant,
            dp = self.depth,
            r = self.root,
            ct = self.closure_table,
            ancestor = ANCESTOR_ALIAS,
            descendant = DESCENDANT_ALIAS,
            depth = DEPTH_ALIAS,
            root = ROOT_ALIAS,
        )
    }

    fn depth_condition(&self, alias: &str, reach: Reach) -> String {
        let op = match reach {
            Reach::SelfAnd => ">= 0",
            Reach::Proper => "> 0",
            Reach::Immediate => "= 1",
        };
        format!("{alias}.{dp} {op}", dp = self.depth)
    }

    /// Extra `WHERE` conjunct and the `ORDER BY` (plus `LIMIT`) clause for a sibling-level read.
    fn neighbor_clause(&self, params: &mut Params, neighbor: Option<&Neighbor>) -> (String, String) {
        let Some(neighbor) = neighbor else {
            return (
                String::new(),
                format!("ORDER BY m.{s}, m.{pk}", s = self.sort_column, pk = self.primary_key),
            );
        };

        let (cmp, dir) = match neighbor.direction {
            Direction::Next => (">", "ASC"),
            Direction::Previous => ("<", "DESC"),
        };
        let strict = params.bind(neighbor.sort.clone());
        let tie = params.bind(neighbor.sort.clone());
        let key = params.bind(neighbor.key.clone());

        let condition = format!(
            " AND (m.{s} {cmp} {strict} OR (m.{s} = {tie} AND m.{pk} {cmp} {key}))",
            s = self.sort_column,
            pk = self.primary_key,
        );
        let order = format!(
            "ORDER BY m.{s} {dir}, m.{pk} {dir} LIMIT 1",
            s = self.sort_column,
            pk = self.primary_key,
        );
        (condition, order)
    }
}

/// Collects bound values in textual order and hands out matching placeholders.
struct Params {
    backend: DbBackend,
    values: Vec<Value>,
}

impl Params {
    fn new(backend: DbBackend) -> Self {
        Self {
            backend,
            values: Vec::new(),
        }
    }

    fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        match self.backend {
            DbBackend::Postgres => format!("${}", self.values.len()),
            DbBackend::MySql | DbBackend::Sqlite => "?".to_string(),
        }
    }

    fn finish(self, sql: String) -> Statement {
        Statement::from_sql_and_values(self.backend, sql, self.values)
    }
}

fn quote_ident(backend: DbBackend, name: &str) -> String {
    let quote = match backend {
        DbBackend::MySql => '`',
        DbBackend::Postgres | DbBackend::Sqlite => '"',
    };
    let escaped = name.replace(quote, &format!("{quote}{quote}"));
    format!("{quote}{escaped}{quote}")
}
