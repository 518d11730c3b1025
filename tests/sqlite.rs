use closure_table::prelude::*;
use closure_table::ClosureTableError;
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbBackend, Set, Statement};

mod entity {
    pub mod node {
        use closure_table::ClosureTableModelDerive as ClosureTableModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, ClosureTableModel)]
        #[sea_orm(table_name = "nodes")]
        #[closure_table(closure_table = "node_closure", sort_field = "position")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: i32,
            pub name: String,
            pub position: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::node;

type TestResult = Result<(), Box<dyn std::error::Error>>;

async fn setup_database() -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    db.execute_unprepared(
        r#"
        CREATE TABLE nodes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            position INTEGER NOT NULL
        );
        "#,
    )
    .await?;

    db.execute_unprepared(
        r#"
        CREATE TABLE node_closure (
            ancestor_id INTEGER NOT NULL REFERENCES nodes(id),
            descendant_id INTEGER NOT NULL REFERENCES nodes(id),
            depth INTEGER NOT NULL,
            root BOOLEAN NOT NULL DEFAULT 0,
            UNIQUE (ancestor_id, descendant_id)
        );
        "#,
    )
    .await?;

    Ok(db)
}

async fn create_node(
    db: &DatabaseConnection,
    id: i32,
    name: &str,
    position: i32,
) -> Result<node::Model, DbErr> {
    node::ActiveModel {
        id: Set(id),
        name: Set(name.to_owned()),
        position: Set(position),
    }
    .insert(db)
    .await
}

async fn closure_row_count(db: &DatabaseConnection) -> Result<i64, DbErr> {
    let row = db
        .query_one(Statement::from_string(
            DbBackend::Sqlite,
            "SELECT COUNT(*) AS n FROM node_closure",
        ))
        .await?
        .expect("count query returns a row");
    row.try_get("", "n")
}

fn ids(nodes: &[node::Model]) -> Vec<i32> {
    nodes.iter().map(|node| node.id).collect()
}

fn sorted_ids(nodes: &[node::Model]) -> Vec<i32> {
    let mut ids = ids(nodes);
    ids.sort_unstable();
    ids
}

struct Sample {
    root: node::Model,
    c1: node::Model,
    c2: node::Model,
    grandchild: node::Model,
}

/// R -> {C1 -> {G}, C2}
async fn sample_tree(db: &DatabaseConnection) -> Result<Sample, Box<dyn std::error::Error>> {
    let root = create_node(db, 1, "R", 10).await?;
    let c1 = create_node(db, 2, "C1", 20).await?;
    let c2 = create_node(db, 3, "C2", 30).await?;
    let grandchild = create_node(db, 4, "G", 40).await?;

    root.attach(db, &c1).await?;
    root.attach(db, &c2).await?;
    c1.attach(db, &grandchild).await?;

    Ok(Sample {
        root,
        c1,
        c2,
        grandchild,
    })
}

#[tokio::test]
async fn attach_builds_complete_closure() -> TestResult {
    let db = setup_database().await?;
    let Sample {
        root,
        c1,
        c2,
        grandchild,
    } = sample_tree(&db).await?;

    assert_eq!(sorted_ids(&root.descendants(&db).await?), vec![2, 3, 4]);
    assert_eq!(ids(&root.children(&db).await?), vec![2, 3]);
    assert_eq!(ids(&grandchild.ancestors(&db).await?), vec![1, 2]);
    assert_eq!(grandchild.parent(&db).await?.map(|node| node.id), Some(c1.id));
    assert_eq!(ids(&c1.siblings(&db).await?), vec![c2.id]);

    assert!(root.is_root(&db).await?);
    assert!(!c1.is_root(&db).await?);
    assert_eq!(ids(&node::Model::roots(&db).await?), vec![root.id]);

    assert_eq!(root.membership(&db).await?, Membership::Root);
    assert_eq!(grandchild.membership(&db).await?, Membership::Child);

    // 4 self-loops, R->C1, R->C2, R->G, C1->G
    assert_eq!(closure_row_count(&db).await?, 8);

    Ok(())
}

#[tokio::test]
async fn closure_rows_carry_true_depths() -> TestResult {
    let db = setup_database().await?;
    let sample = sample_tree(&db).await?;

    let rows = sample.grandchild.closure_relation()?.closure_rows(&db).await?;
    let triples: Vec<(i32, i32, i32)> = rows
        .iter()
        .map(|row| (row.ancestor, row.descendant, row.depth))
        .collect();
    assert_eq!(triples, vec![(4, 4, 0), (2, 4, 1), (1, 4, 2)]);
    assert!(rows[0].is_self_loop());
    assert!(rows.iter().all(|row| !row.root));

    let root_rows = sample.root.closure_relation()?.closure_rows(&db).await?;
    assert_eq!(root_rows.len(), 1);
    assert!(root_rows[0].is_self_loop() && root_rows[0].root);

    let relation = sample.grandchild.closure_relation()?;
    assert_eq!(relation.depth(&db).await?, Some(2));
    assert_eq!(ids(&relation.self_and_ancestors(&db).await?), vec![1, 2, 4]);
    assert_eq!(
        ids(&sample.root.closure_relation()?.self_and_descendants(&db).await?),
        vec![1, 2, 3, 4]
    );

    Ok(())
}

#[tokio::test]
async fn move_rehangs_node_under_new_parent() -> TestResult {
    let db = setup_database().await?;
    let Sample {
        root,
        c1,
        c2,
        grandchild,
    } = sample_tree(&db).await?;

    c2.move_to(&db, &c1).await?;

    assert_eq!(ids(&root.children(&db).await?), vec![c1.id]);
    assert_eq!(sorted_ids(&c1.children(&db).await?), vec![c2.id, grandchild.id]);
    assert_eq!(ids(&c2.ancestors(&db).await?), vec![root.id, c1.id]);
    assert_eq!(c2.parent(&db).await?.map(|node| node.id), Some(c1.id));
    assert_eq!(sorted_ids(&c2.siblings(&db).await?), vec![grandchild.id]);
    assert_eq!(closure_row_count(&db).await?, 9);

    Ok(())
}

#[tokio::test]
async fn move_carries_subtree_and_keeps_inner_depths() -> TestResult {
    let db = setup_database().await?;
    let top = create_node(&db, 1, "top", 1).await?;
    let a = create_node(&db, 2, "a", 2).await?;
    let b = create_node(&db, 3, "b", 3).await?;
    let c = create_node(&db, 4, "c", 4).await?;
    let other = create_node(&db, 5, "other", 5).await?;
    let anchor = create_node(&db, 6, "anchor", 6).await?;

    top.attach(&db, &a).await?;
    a.attach(&db, &b).await?;
    b.attach(&db, &c).await?;
    other.attach(&db, &anchor).await?;

    a.move_to(&db, &anchor).await?;

    assert!(top.descendants(&db).await?.is_empty());
    assert_eq!(ids(&c.ancestors(&db).await?), vec![other.id, anchor.id, a.id, b.id]);

    let rows = c.closure_relation()?.closure_rows(&db).await?;
    let depths: Vec<(i32, i32)> = rows.iter().map(|row| (row.ancestor, row.depth)).collect();
    assert_eq!(depths, vec![(4, 0), (3, 1), (2, 2), (6, 3), (5, 4)]);

    assert_eq!(ids(&a.descendants(&db).await?), vec![b.id, c.id]);

    Ok(())
}

#[tokio::test]
async fn moving_a_root_clears_its_root_flag() -> TestResult {
    let db = setup_database().await?;
    let first = create_node(&db, 1, "first", 1).await?;
    let second = create_node(&db, 2, "second", 2).await?;
    let leaf = create_node(&db, 3, "leaf", 3).await?;

    second.attach(&db, &leaf).await?;
    assert!(first.attach_to_self(&db).await?);

    second.move_to(&db, &first).await?;

    assert!(!second.is_root(&db).await?);
    assert_eq!(ids(&node::Model::roots(&db).await?), vec![first.id]);
    assert_eq!(ids(&leaf.ancestors(&db).await?), vec![first.id, second.id]);

    Ok(())
}

#[tokio::test]
async fn move_into_unattached_parent_roots_it() -> TestResult {
    let db = setup_database().await?;
    let Sample { root, c2, .. } = sample_tree(&db).await?;
    let fresh = create_node(&db, 9, "fresh", 90).await?;

    c2.move_to(&db, &fresh).await?;

    assert!(fresh.is_root(&db).await?);
    assert_eq!(ids(&fresh.children(&db).await?), vec![c2.id]);
    assert_eq!(ids(&node::Model::roots(&db).await?), vec![root.id, fresh.id]);

    Ok(())
}

#[tokio::test]
async fn detach_evicts_whole_subtree() -> TestResult {
    let db = setup_database().await?;
    let Sample {
        root,
        c1,
        c2,
        grandchild,
    } = sample_tree(&db).await?;

    let removed = c1.detach(&db).await?;
    assert_eq!(removed, 5);

    assert_eq!(ids(&root.descendants(&db).await?), vec![c2.id]);
    assert!(grandchild.ancestors(&db).await?.is_empty());
    assert!(grandchild.descendants(&db).await?.is_empty());
    assert!(grandchild.parent(&db).await?.is_none());
    assert!(grandchild.closure_relation()?.closure_rows(&db).await?.is_empty());
    assert_eq!(c1.membership(&db).await?, Membership::Unattached);
    assert_eq!(closure_row_count(&db).await?, 3);

    Ok(())
}

#[tokio::test]
async fn detached_node_can_be_attached_again() -> TestResult {
    let db = setup_database().await?;
    let Sample { root, c1, c2, .. } = sample_tree(&db).await?;

    c1.detach(&db).await?;
    assert_eq!(c1.detach(&db).await?, 0);

    c2.attach(&db, &c1).await?;
    assert_eq!(ids(&c1.ancestors(&db).await?), vec![root.id, c2.id]);

    Ok(())
}

#[tokio::test]
async fn attach_to_self_is_idempotent() -> TestResult {
    let db = setup_database().await?;
    let lone = create_node(&db, 1, "lone", 1).await?;

    assert!(lone.attach_to_self(&db).await?);
    assert!(!lone.attach_to_self(&db).await?);

    let rows = lone.closure_relation()?.closure_rows(&db).await?;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].root);

    Ok(())
}

#[tokio::test]
async fn attach_to_self_leaves_children_alone() -> TestResult {
    let db = setup_database().await?;
    let Sample { c1, .. } = sample_tree(&db).await?;
    let before = closure_row_count(&db).await?;

    assert!(!c1.attach_to_self(&db).await?);
    assert_eq!(c1.membership(&db).await?, Membership::Child);
    assert_eq!(closure_row_count(&db).await?, before);

    Ok(())
}

#[tokio::test]
async fn siblings_are_symmetric() -> TestResult {
    let db = setup_database().await?;
    let root = create_node(&db, 1, "root", 0).await?;
    let a = create_node(&db, 2, "a", 10).await?;
    let b = create_node(&db, 3, "b", 20).await?;
    let c = create_node(&db, 4, "c", 30).await?;
    let nested = create_node(&db, 5, "nested", 5).await?;

    root.attach(&db, &a).await?;
    root.attach(&db, &b).await?;
    root.attach(&db, &c).await?;
    a.attach(&db, &nested).await?;

    assert_eq!(ids(&a.siblings(&db).await?), vec![b.id, c.id]);
    assert_eq!(ids(&b.siblings(&db).await?), vec![a.id, c.id]);
    assert_eq!(ids(&c.siblings(&db).await?), vec![a.id, b.id]);

    assert!(nested.siblings(&db).await?.is_empty());
    assert!(!nested.has_siblings(&db).await?);
    assert!(root.siblings(&db).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn next_and_previous_walk_siblings_by_sort() -> TestResult {
    let db = setup_database().await?;
    let root = create_node(&db, 1, "root", 0).await?;
    let a = create_node(&db, 2, "a", 30).await?;
    let b = create_node(&db, 3, "b", 10).await?;
    let c = create_node(&db, 4, "c", 20).await?;

    root.attach(&db, &a).await?;
    root.attach(&db, &b).await?;
    root.attach(&db, &c).await?;

    assert_eq!(ids(&root.children(&db).await?), vec![b.id, c.id, a.id]);

    assert_eq!(b.next(&db).await?.map(|node| node.id), Some(c.id));
    assert_eq!(c.next(&db).await?.map(|node| node.id), Some(a.id));
    assert!(a.next(&db).await?.is_none());

    assert_eq!(a.previous(&db).await?.map(|node| node.id), Some(c.id));
    assert_eq!(c.previous(&db).await?.map(|node| node.id), Some(b.id));
    assert!(b.previous(&db).await?.is_none());

    assert!(b.has_next(&db).await?);
    assert!(!b.has_previous(&db).await?);
    assert!(!a.has_next(&db).await?);

    Ok(())
}

#[tokio::test]
async fn equal_sort_values_break_ties_by_key() -> TestResult {
    let db = setup_database().await?;
    let root = create_node(&db, 1, "root", 0).await?;
    let first = create_node(&db, 2, "first", 7).await?;
    let second = create_node(&db, 3, "second", 7).await?;

    root.attach(&db, &first).await?;
    root.attach(&db, &second).await?;

    assert_eq!(first.next(&db).await?.map(|node| node.id), Some(second.id));
    assert!(second.next(&db).await?.is_none());
    assert_eq!(second.previous(&db).await?.map(|node| node.id), Some(first.id));
    assert!(first.previous(&db).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn roots_step_between_each_other() -> TestResult {
    let db = setup_database().await?;
    let early = create_node(&db, 1, "early", 5).await?;
    let late = create_node(&db, 2, "late", 7).await?;

    early.attach_to_self(&db).await?;
    late.attach_to_self(&db).await?;

    assert_eq!(early.next(&db).await?.map(|node| node.id), Some(late.id));
    assert_eq!(late.previous(&db).await?.map(|node| node.id), Some(early.id));
    assert!(late.next(&db).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn predicates_reflect_reads() -> TestResult {
    let db = setup_database().await?;
    let Sample {
        root,
        c1,
        c2,
        grandchild,
    } = sample_tree(&db).await?;

    assert!(root.has_children(&db).await?);
    assert!(root.has_descendants(&db).await?);
    assert!(!root.has_parent(&db).await?);
    assert!(!root.has_ancestors(&db).await?);

    assert!(c1.has_siblings(&db).await?);
    assert!(c1.has_next(&db).await?);
    assert!(c2.has_previous(&db).await?);

    assert!(!grandchild.has_children(&db).await?);
    assert!(grandchild.has_parent(&db).await?);
    assert!(grandchild.has_ancestors(&db).await?);

    Ok(())
}

#[tokio::test]
async fn unattached_node_reads_empty() -> TestResult {
    let db = setup_database().await?;
    let stray = create_node(&db, 1, "stray", 1).await?;

    assert_eq!(stray.membership(&db).await?, Membership::Unattached);
    assert!(stray.ancestors(&db).await?.is_empty());
    assert!(stray.descendants(&db).await?.is_empty());
    assert!(stray.children(&db).await?.is_empty());
    assert!(stray.siblings(&db).await?.is_empty());
    assert!(stray.parent(&db).await?.is_none());
    assert!(stray.next(&db).await?.is_none());
    assert!(stray.previous(&db).await?.is_none());
    assert!(!stray.is_root(&db).await?);
    assert_eq!(stray.closure_relation()?.depth(&db).await?, None);
    assert!(node::Model::roots(&db).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn attaching_an_attached_child_is_rejected() -> TestResult {
    let db = setup_database().await?;
    let Sample { root, c1, c2, .. } = sample_tree(&db).await?;
    let before = closure_row_count(&db).await?;

    let err = c1.attach(&db, &c2).await.unwrap_err();
    assert!(matches!(err, ClosureTableError::AlreadyAttached { .. }));

    let err = c1.attach(&db, &root).await.unwrap_err();
    assert!(matches!(err, ClosureTableError::AlreadyAttached { .. }));

    let err = c1.attach(&db, &c1).await.unwrap_err();
    assert!(matches!(err, ClosureTableError::Cycle { .. }));

    assert_eq!(closure_row_count(&db).await?, before);

    Ok(())
}

#[tokio::test]
async fn move_rejects_cycles_and_unattached_nodes() -> TestResult {
    let db = setup_database().await?;
    let Sample {
        root,
        c1,
        grandchild,
        ..
    } = sample_tree(&db).await?;
    let before = closure_row_count(&db).await?;

    let err = c1.move_to(&db, &grandchild).await.unwrap_err();
    assert!(matches!(err, ClosureTableError::Cycle { .. }));

    let err = root.move_to(&db, &root).await.unwrap_err();
    assert!(matches!(err, ClosureTableError::Cycle { .. }));

    let stray = create_node(&db, 8, "stray", 80).await?;
    let err = stray.move_to(&db, &root).await.unwrap_err();
    assert!(matches!(err, ClosureTableError::NotAttached { .. }));

    assert_eq!(closure_row_count(&db).await?, before);
    assert_eq!(ids(&grandchild.ancestors(&db).await?), vec![root.id, c1.id]);

    Ok(())
}

#[tokio::test]
async fn failed_move_rolls_back_every_statement() -> TestResult {
    let db = setup_database().await?;
    let Sample { root, c1, c2, .. } = sample_tree(&db).await?;
    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"
        CREATE TRIGGER reject_deep_links
        BEFORE INSERT ON node_closure
        WHEN NEW.depth > 1
        BEGIN
            SELECT RAISE(ABORT, 'deep link rejected');
        END;
        "#,
    ))
    .await?;
    let before = closure_row_count(&db).await?;

    // The old parent link is deleted before the graft trips the trigger.
    let err = c2.move_to(&db, &c1).await.unwrap_err();
    match &err {
        ClosureTableError::Mutation { operation, key, .. } => {
            assert_eq!(*operation, "move");
            assert_eq!(key, "3");
        }
        other => panic!("expected a mutation error, got {other:?}"),
    }
    assert!(err.to_string().starts_with("move failed for node 3"));

    assert_eq!(closure_row_count(&db).await?, before);
    assert_eq!(ids(&c2.ancestors(&db).await?), vec![root.id]);
    assert_eq!(ids(&root.children(&db).await?), vec![c1.id, c2.id]);
    assert!(c1.children(&db).await?.iter().all(|child| child.id != c2.id));

    Ok(())
}

#[tokio::test]
async fn invalid_configuration_fails_before_querying() -> TestResult {
    let db = setup_database().await?;
    let lone = create_node(&db, 1, "lone", 1).await?;

    let config = ClosureTableOptions::default()
        .closure_table("node closure")
        .apply(ClosureTableConfig::new("Node", "nodes"));

    let err = lone.closure_relation_with(&config).unwrap_err();
    assert!(matches!(err, ClosureTableError::Configuration(_)));

    Ok(())
}

#[tokio::test]
async fn explicit_config_targets_another_closure_table() -> TestResult {
    let db = setup_database().await?;
    db.execute_unprepared(
        r#"
        CREATE TABLE node_paths (
            parent_key INTEGER NOT NULL,
            child_key INTEGER NOT NULL,
            hops INTEGER NOT NULL,
            is_top BOOLEAN NOT NULL DEFAULT 0,
            UNIQUE (parent_key, child_key)
        );
        "#,
    )
    .await?;

    let config = ClosureTableOptions::default()
        .closure_table("node_paths")
        .ancestor_column("parent_key")
        .descendant_column("child_key")
        .depth_column("hops")
        .root_column("is_top")
        .apply(ClosureTableConfig::new("Node", "nodes"));

    let root = create_node(&db, 1, "root", 1).await?;
    let child = create_node(&db, 2, "child", 2).await?;

    let relation = root.closure_relation_with(&config)?;
    relation.attach(&db, &child).await?;

    assert_eq!(ids(&relation.children(&db).await?), vec![child.id]);
    assert!(relation.is_root(&db).await?);
    // the default closure table is untouched
    assert_eq!(closure_row_count(&db).await?, 0);

    Ok(())
}
