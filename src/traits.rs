use std::fmt::Debug;

use sea_orm::{EntityTrait, FromQueryResult, TryGetable, Value};

use crate::config::ClosureTableConfig;

/// Trait implemented by SeaORM `Model` types that participate in a closure-table hierarchy.
///
/// Implementations are normally provided by the `#[derive(ClosureTableModel)]` macro, which
/// fills the associated config from `#[sea_orm(table_name)]` and `#[closure_table(...)]`.
pub trait ClosureTableModel: Clone + Send + Sync + 'static + FromQueryResult {
    type Entity: EntityTrait<Model = Self>;
    type Id: Clone + Debug + PartialEq + Send + Sync + TryGetable + 'static;

    fn closure_table_config() -> &'static ClosureTableConfig;

    fn id(&self) -> Self::Id;
    fn id_to_value(id: &Self::Id) -> Value;
    fn id_column() -> <Self::Entity as EntityTrait>::Column;

    /// Value ordering siblings; the primary key unless a sort field is configured.
    fn sort_value(&self) -> Value;
    fn sort_column() -> <Self::Entity as EntityTrait>::Column;
}
