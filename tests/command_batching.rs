//! Command ordering, batching and DML rendering end to end.

use std::sync::Arc;

use relmig::schema::{Column, ForeignKey, SchemaSnapshot, Table};
use relmig::sql::{GenericDialect, PostgresDialect, SqlDialect};
use relmig::update::{
    BatchLimits, ColumnModification, CommandBatchPreparer, EntityState, ModificationCommand, ModificationCommandBatch,
    ResultSetMapping, UpdateError, UpdateSqlGenerator,
};

fn blogging() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .with_table(
            Table::new("Blogs")
                .column(Column::new("Id", "int"))
                .column(Column::new("Url", "string"))
                .primary_key("PK_Blogs", ["Id"]),
        )
        .with_table(
            Table::new("Posts")
                .column(Column::new("Id", "int"))
                .column(Column::new("BlogId", "int"))
                .column(Column::new("Title", "string"))
                .primary_key("PK_Posts", ["Id"])
                .foreign_key(ForeignKey::new("FK_Posts_Blogs_BlogId", ["BlogId"], "Blogs", ["Id"])),
        )
        .with_table(
            Table::new("Comments")
                .column(Column::new("Id", "int"))
                .column(Column::new("PostId", "int"))
                .primary_key("PK_Comments", ["Id"])
                .foreign_key(ForeignKey::new("FK_Comments_Posts_PostId", ["PostId"], "Posts", ["Id"])),
        )
}

fn insert_blog(id: i64) -> ModificationCommand {
    ModificationCommand::new(
        "Blogs",
        EntityState::Added,
        vec![
            ColumnModification::new("Id").key().write(id),
            ColumnModification::new("Url").write(format!("https://{id}.example")),
        ],
    )
    .unwrap()
}

fn insert_post(id: i64, blog: i64) -> ModificationCommand {
    ModificationCommand::new(
        "Posts",
        EntityState::Added,
        vec![
            ColumnModification::new("Id").key().write(id),
            ColumnModification::new("BlogId").write(blog),
            ColumnModification::new("Title").write("hello"),
        ],
    )
    .unwrap()
}

fn insert_comment(id: i64, post: i64) -> ModificationCommand {
    ModificationCommand::new(
        "Comments",
        EntityState::Added,
        vec![
            ColumnModification::new("Id").key().write(id),
            ColumnModification::new("PostId").write(post),
        ],
    )
    .unwrap()
}

fn delete_row(table: &str, id: i64, original: Option<(&str, i64)>) -> ModificationCommand {
    let command = ModificationCommand::new(
        table,
        EntityState::Deleted,
        vec![ColumnModification::new("Id").key().condition(id)],
    )
    .unwrap();
    match original {
        Some((column, value)) => command.with_original_values([(column, value)]),
        None => command,
    }
}

fn postgres(limits: BatchLimits) -> CommandBatchPreparer {
    CommandBatchPreparer::new(Arc::new(PostgresDialect::new()), limits)
}

fn flatten(batches: &[ModificationCommandBatch]) -> Vec<String> {
    batches
        .iter()
        .flat_map(|b| b.commands().iter().map(ToString::to_string))
        .collect()
}

fn position(order: &[String], command: &ModificationCommand) -> usize {
    let text = command.to_string();
    order.iter().position(|c| *c == text).unwrap()
}

#[test]
fn test_principals_come_first_whatever_the_input_order() {
    let commands = vec![
        insert_comment(1, 10),
        insert_post(10, 100),
        insert_blog(100),
        insert_comment(2, 11),
        insert_post(11, 100),
    ];

    for rotation in 0..commands.len() {
        let mut input = commands.clone();
        input.rotate_left(rotation);

        let batches = postgres(BatchLimits::default()).prepare(&blogging(), input).unwrap();
        let order = flatten(&batches);
        assert_eq!(order.len(), commands.len());

        assert!(position(&order, &insert_blog(100)) < position(&order, &insert_post(10, 100)));
        assert!(position(&order, &insert_blog(100)) < position(&order, &insert_post(11, 100)));
        assert!(position(&order, &insert_post(10, 100)) < position(&order, &insert_comment(1, 10)));
        assert!(position(&order, &insert_post(11, 100)) < position(&order, &insert_comment(2, 11)));
    }
}

#[test]
fn test_unrelated_commands_keep_presentation_order() {
    let commands = vec![insert_blog(3), insert_blog(1), insert_blog(2)];
    let batches = postgres(BatchLimits::default()).prepare(&blogging(), commands.clone()).unwrap();
    let expected: Vec<String> = commands.iter().map(ToString::to_string).collect();
    assert_eq!(flatten(&batches), expected);
}

#[test]
fn test_dependents_are_deleted_before_principals() {
    let commands = vec![
        delete_row("Blogs", 100, None),
        delete_row("Posts", 10, Some(("BlogId", 100))),
        delete_row("Comments", 1, Some(("PostId", 10))),
    ];
    let batches = postgres(BatchLimits::default()).prepare(&blogging(), commands).unwrap();
    let tables: Vec<&str> = batches
        .iter()
        .flat_map(|b| b.commands().iter().map(ModificationCommand::table_name))
        .collect();
    assert_eq!(tables, ["Comments", "Posts", "Blogs"]);
}

#[test]
fn test_batches_stay_under_the_parameter_ceiling() {
    let limits = BatchLimits {
        max_parameters: 7,
        ..BatchLimits::default()
    };
    let commands: Vec<_> = (1..=6).map(|id| insert_post(id, 100)).chain([insert_blog(100)]).collect();
    let batches = postgres(limits).prepare(&blogging(), commands).unwrap();

    assert!(batches.len() > 1);
    assert!(batches.iter().all(|b| b.parameter_count() <= 7));
    assert_eq!(batches.iter().map(ModificationCommandBatch::len).sum::<usize>(), 7);
    assert_eq!(batches[0].commands()[0].table_name(), "Blogs");
}

#[test]
fn test_command_wider_than_the_ceiling_is_rejected() {
    let limits = BatchLimits {
        max_parameters: 2,
        ..BatchLimits::default()
    };
    let err = postgres(limits).prepare(&blogging(), vec![insert_post(1, 1)]).unwrap_err();
    assert!(matches!(err, UpdateError::ParameterLimitExceeded { parameters: 3, limit: 2, .. }));
}

#[test]
fn test_mutual_foreign_keys_are_a_cycle() {
    let model = SchemaSnapshot::new()
        .with_table(
            Table::new("A")
                .column(Column::new("Id", "int"))
                .column(Column::new("BId", "int"))
                .primary_key("PK_A", ["Id"])
                .foreign_key(ForeignKey::new("FK_A_B", ["BId"], "B", ["Id"])),
        )
        .with_table(
            Table::new("B")
                .column(Column::new("Id", "int"))
                .column(Column::new("AId", "int"))
                .primary_key("PK_B", ["Id"])
                .foreign_key(ForeignKey::new("FK_B_A", ["AId"], "A", ["Id"])),
        );
    let insert = |table: &str, other: &str| {
        ModificationCommand::new(
            table,
            EntityState::Added,
            vec![
                ColumnModification::new("Id").key().write(1),
                ColumnModification::new(other).write(1),
            ],
        )
        .unwrap()
    };

    let err = postgres(BatchLimits::default())
        .prepare(&model, vec![insert("A", "BId"), insert("B", "AId")])
        .unwrap_err();
    let UpdateError::CyclicDependency { cycle } = err else {
        panic!("expected a cycle, got {err:?}");
    };
    assert!(cycle.iter().any(|c| c.contains('A')));
    assert!(cycle.iter().any(|c| c.contains('B')));
}

#[test]
fn test_identity_insert_is_read_back_in_the_batch_sql() {
    let dialect: Arc<dyn SqlDialect> = Arc::new(
        GenericDialect::new().with_functions("provider_specific_rowcount()", "provider_specific_identity()"),
    );
    let identity_blog = ModificationCommand::new(
        "Blogs",
        EntityState::Added,
        vec![
            ColumnModification::new("Id").key().read(),
            ColumnModification::new("Url").write("https://new.example"),
        ],
    )
    .unwrap();

    let batches = CommandBatchPreparer::new(Arc::clone(&dialect), BatchLimits::default())
        .prepare(&blogging(), vec![identity_blog])
        .unwrap();
    assert_eq!(batches.len(), 1);

    let text = UpdateSqlGenerator::new(dialect).generate_batch(&batches[0]).unwrap();
    assert!(text.sql.starts_with("INSERT INTO \"Blogs\" (\"Url\")\nVALUES (@p0);\n"));
    assert!(text.sql.contains("SELECT \"Id\"\nFROM \"Blogs\"\n"));
    assert_eq!(text.result_set_mappings, vec![ResultSetMapping::LastInResultSet]);
    assert_eq!(text.parameters.len(), 1);
}

#[test]
fn test_rendered_batch_has_one_mapping_per_command() {
    let commands = vec![insert_post(10, 100), insert_blog(100), delete_row("Comments", 5, Some(("PostId", 9)))];
    let batches = postgres(BatchLimits::default()).prepare(&blogging(), commands).unwrap();
    let generator = UpdateSqlGenerator::new(Arc::new(PostgresDialect::new()));

    for batch in &batches {
        let text = generator.generate_batch(batch).unwrap();
        assert_eq!(text.result_set_mappings.len(), batch.len());
        assert_eq!(text.commands.len(), batch.len());
        assert_eq!(text.parameters.len(), batch.parameter_count());
        assert!(text.sql.ends_with(";\n"));
    }
}
