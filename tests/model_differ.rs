//! Model differ behaviour checked against the in-memory operation applier.

use relmig::migration::{MigrationOperation, MigrationsSqlGenerator, ModelDiffer};
use relmig::schema::{Column, ForeignKey, Index, ReferentialAction, SchemaSnapshot, Table};
use relmig::Value;

fn kinds(operations: &[MigrationOperation]) -> Vec<&'static str> {
    operations.iter().map(MigrationOperation::kind).collect()
}

fn orders() -> Table {
    Table::new("Orders")
        .column(Column::new("Id", "int"))
        .column(Column::new("Total", "int"))
        .primary_key("PK_Orders", ["Id"])
}

fn blogging_v1() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .with_table(
            Table::new("Blogs")
                .column(Column::new("Id", "int"))
                .column(Column::new("Url", "string").max_length(200))
                .column(Column::new("Rating", "int"))
                .primary_key("PK_Blogs", ["Id"])
                .index(Index::new("IX_Blogs_Url", ["Url"]).unique())
                .seed([("Id", Value::from(1)), ("Url", Value::from("https://a.example")), ("Rating", Value::from(1))])
                .seed([("Id", Value::from(2)), ("Url", Value::from("https://b.example")), ("Rating", Value::from(2))]),
        )
        .with_table(
            Table::new("Posts")
                .column(Column::new("Id", "int"))
                .column(Column::new("BlogId", "int"))
                .column(Column::new("Title", "string"))
                .primary_key("PK_Posts", ["Id"])
                .foreign_key(
                    ForeignKey::new("FK_Posts_Blogs_BlogId", ["BlogId"], "Blogs", ["Id"])
                        .on_delete(ReferentialAction::Cascade),
                ),
        )
        .with_table(
            Table::new("Tags")
                .column(Column::new("Id", "int"))
                .column(Column::new("Name", "string"))
                .primary_key("PK_Tags", ["Id"]),
        )
}

fn blogging_v2() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .with_table(
            Table::new("Blogs")
                .column(Column::new("Id", "int"))
                .column(Column::new("Url", "string").max_length(500))
                .column(Column::new("Rating", "int").nullable())
                .column(Column::new("CreatedOn", "datetime").nullable())
                .primary_key("PK_Blogs", ["Id"])
                .index(Index::new("IX_Blogs_Url", ["Url"]).unique())
                .seed([("Id", Value::from(1)), ("Url", Value::from("https://a.example/new")), ("Rating", Value::from(1))])
                .seed([("Id", Value::from(3)), ("Url", Value::from("https://c.example")), ("Rating", Value::from(5))]),
        )
        .with_table(
            Table::new("Authors")
                .column(Column::new("Id", "int"))
                .column(Column::new("Name", "string").max_length(100))
                .primary_key("PK_Authors", ["Id"]),
        )
        .with_table(
            Table::new("Articles")
                .renamed_from("Posts")
                .column(Column::new("Id", "int"))
                .column(Column::new("BlogId", "int"))
                .column(Column::new("Headline", "string").renamed_from("Title"))
                .column(Column::new("AuthorId", "int").nullable())
                .primary_key("PK_Posts", ["Id"])
                .foreign_key(
                    ForeignKey::new("FK_Posts_Blogs_BlogId", ["BlogId"], "Blogs", ["Id"])
                        .on_delete(ReferentialAction::Cascade),
                )
                .foreign_key(ForeignKey::new("FK_Articles_Authors_AuthorId", ["AuthorId"], "Authors", ["Id"]))
                .index(Index::new("IX_Articles_AuthorId", ["AuthorId"])),
        )
}

fn applied(start: Option<&SchemaSnapshot>, operations: &[MigrationOperation]) -> SchemaSnapshot {
    let mut snapshot = start.cloned().unwrap_or_default();
    snapshot.apply(operations).unwrap();
    snapshot
}

#[test]
fn test_orders_total2_scenario() {
    let source = SchemaSnapshot::new().with_table(orders());
    let target = SchemaSnapshot::new().with_table(orders().column(Column::new("Total2", "int")));
    let differ = ModelDiffer::default();

    let up = differ.get_differences(Some(&source), Some(&target)).unwrap();
    assert_eq!(up.len(), 1);
    assert!(matches!(&up[0], MigrationOperation::AddColumn(op) if op.column.name == "Total2"));

    let down = differ.get_differences(Some(&target), Some(&source)).unwrap();
    assert_eq!(down.len(), 1);
    assert!(matches!(&down[0], MigrationOperation::DropColumn(op) if op.name == "Total2"));

    let generator = MigrationsSqlGenerator::default();
    assert_eq!(
        generator.generate_script(&up).unwrap(),
        "ALTER TABLE \"Orders\" ADD \"Total2\" integer NOT NULL;\n\n"
    );
    assert_eq!(
        generator.generate_script(&down).unwrap(),
        "ALTER TABLE \"Orders\" DROP COLUMN \"Total2\";\n\n"
    );
}

#[test]
fn test_create_from_nothing_reconstructs_the_model() {
    let differ = ModelDiffer::default();
    for model in [blogging_v1(), blogging_v2()] {
        let up = differ.get_differences(None, Some(&model)).unwrap();
        assert!(applied(None, &up).structurally_equals(&model));

        let down = differ.get_differences(Some(&model), None).unwrap();
        assert!(applied(Some(&model), &down).is_empty());
    }
}

#[test]
fn test_round_trip_between_versions() {
    let (v1, v2) = (blogging_v1(), blogging_v2());
    let differ = ModelDiffer::default();

    let up = differ.get_differences(Some(&v1), Some(&v2)).unwrap();
    let upgraded = applied(Some(&v1), &up);
    assert!(upgraded.structurally_equals(&v2));

    let down = differ.get_differences(Some(&v2), Some(&v1)).unwrap();
    let downgraded = applied(Some(&upgraded), &down);
    assert!(downgraded.structurally_equals(&v1));
}

#[test]
fn test_upgrade_uses_renames_and_orders_phases() {
    let up = ModelDiffer::default()
        .get_differences(Some(&blogging_v1()), Some(&blogging_v2()))
        .unwrap();
    let kinds = kinds(&up);
    let position = |kind: &str| kinds.iter().position(|k| *k == kind).unwrap();

    assert!(kinds.contains(&"RenameTable"));
    assert!(kinds.contains(&"RenameColumn"));
    assert!(!up
        .iter()
        .any(|op| matches!(op, MigrationOperation::DropTable(t) if t.table.name == "Posts")));

    // Url widened: its unique index comes off before the alter and back after.
    assert!(position("DropIndex") < position("AlterColumn"));
    assert!(position("AlterColumn") < position("CreateIndex"));
    // The new principal exists before the foreign key that points at it.
    let authors = up
        .iter()
        .position(|op| matches!(op, MigrationOperation::CreateTable(t) if t.table.name == "Authors"))
        .unwrap();
    let fk = up
        .iter()
        .position(|op| matches!(op, MigrationOperation::AddForeignKey(f) if f.foreign_key.principal.name == "Authors"))
        .unwrap();
    assert!(authors < fk);
    // Seed deletes run against the old tables, the other writes once the new
    // columns exist and before the recreated unique index checks them.
    let last = |kind: &str| kinds.iter().rposition(|k| *k == kind).unwrap();
    assert!(position("DropIndex") < position("Delete"));
    assert!(position("Delete") < position("DropTable"));
    assert!(position("Delete") < position("RenameTable"));
    assert!(last("AddColumn") < position("Update"));
    assert!(last("AddColumn") < position("Insert"));
    assert!(last("Update").max(last("Insert")) < position("CreateIndex"));
    assert!(last("Insert") < position("AddForeignKey"));
}

#[test]
fn test_seed_rows_satisfy_constraints_added_with_them() {
    let child = || {
        Table::new("Child")
            .column(Column::new("Id", "int"))
            .column(Column::new("ParentId", "int"))
            .primary_key("PK_Child", ["Id"])
            .seed([("Id", 1), ("ParentId", 5)])
    };
    let parent = || {
        Table::new("Parent")
            .column(Column::new("Id", "int"))
            .primary_key("PK_Parent", ["Id"])
    };
    let pairs = [
        (
            SchemaSnapshot::new().with_table(child()).with_table(parent()),
            SchemaSnapshot::new()
                .with_table(child().foreign_key(ForeignKey::new("FK_Child_Parent", ["ParentId"], "Parent", ["Id"])))
                .with_table(parent().seed([("Id", 5)])),
        ),
        (
            SchemaSnapshot::new().with_table(orders().seed([("Id", 1), ("Total", 10)]).seed([("Id", 2), ("Total", 10)])),
            SchemaSnapshot::new().with_table(
                orders()
                    .index(Index::new("IX_Orders_Total", ["Total"]).unique())
                    .seed([("Id", 1), ("Total", 10)])
                    .seed([("Id", 2), ("Total", 20)]),
            ),
        ),
    ];

    let differ = ModelDiffer::default();
    for (source, target) in &pairs {
        let up = differ.get_differences(Some(source), Some(target)).unwrap();
        let upgraded = applied(Some(source), &up);
        assert!(upgraded.structurally_equals(target));

        let down = differ.get_differences(Some(target), Some(source)).unwrap();
        assert!(applied(Some(&upgraded), &down).structurally_equals(source));
    }
}

#[test]
fn test_diff_output_is_deterministic() {
    let differ = ModelDiffer::default();
    let first = differ
        .get_differences(Some(&blogging_v1()), Some(&blogging_v2()))
        .unwrap();
    for _ in 0..5 {
        let again = differ
            .get_differences(Some(&blogging_v1()), Some(&blogging_v2()))
            .unwrap();
        assert_eq!(again, first);
        assert_eq!(
            serde_json::to_string(&again).unwrap(),
            serde_json::to_string(&first).unwrap()
        );
    }
}

#[test]
fn test_empty_models_are_not_an_error() {
    let differ = ModelDiffer::default();
    assert!(differ.get_differences(None, None).unwrap().is_empty());
    assert!(differ
        .get_differences(Some(&SchemaSnapshot::new()), Some(&SchemaSnapshot::new()))
        .unwrap()
        .is_empty());
}
