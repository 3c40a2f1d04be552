//! History repository queries and migration scripts against an in-memory
//! stand-in for the database.

use std::sync::{Arc, Mutex};

use relmig::migration::{
    HistoryError, HistoryRepository, HistoryRow, MigrationId, MigrationScripter, MigrationsSqlGenerator,
    ModelDiffer, ScriptOptions, ScriptTarget,
};
use relmig::schema::{Column, SchemaSnapshot, Table};
use relmig::{CancellationToken, ExecutorError, MigrationsConfig, PostgresDialect, SqlExecutor, Value};

/// Answers the history queries from a table held in memory.
#[derive(Default)]
struct InMemoryHistory {
    table: Mutex<Option<Vec<(String, String)>>>,
    statements: Mutex<Vec<String>>,
}

impl InMemoryHistory {
    fn create_table(&self) {
        *self.table.lock().unwrap() = Some(Vec::new());
    }

    fn record(&self, id: &str, version: &str) {
        if let Some(rows) = self.table.lock().unwrap().as_mut() {
            rows.push((id.to_string(), version.to_string()));
        }
    }

    fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

impl SqlExecutor for InMemoryHistory {
    fn execute_non_query(&self, sql: &str, _params: &[Value]) -> Result<u64, ExecutorError> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(0)
    }

    fn execute_scalar(&self, sql: &str, _params: &[Value]) -> Result<Option<Value>, ExecutorError> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(Some(Value::Bool(self.table.lock().unwrap().is_some())))
    }

    fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Vec<Value>>, ExecutorError> {
        self.statements.lock().unwrap().push(sql.to_string());
        let table = self.table.lock().unwrap();
        let Some(rows) = table.as_ref() else {
            return Err(ExecutorError::Connection("relation does not exist".to_string()));
        };
        Ok(rows
            .iter()
            .map(|(id, version)| vec![Value::from(id.as_str()), Value::from(version.as_str())])
            .collect())
    }
}

fn repository(executor: Arc<InMemoryHistory>) -> HistoryRepository {
    HistoryRepository::new(Arc::new(PostgresDialect::new()), &MigrationsConfig::default()).with_executor(executor)
}

fn blogs(url_length: u32) -> SchemaSnapshot {
    SchemaSnapshot::new().with_table(
        Table::new("Blogs")
            .column(Column::new("Id", "int").identity())
            .column(Column::new("Url", "string").max_length(url_length))
            .primary_key("PK_Blogs", ["Id"]),
    )
}

fn id(text: &str) -> MigrationId {
    text.parse().unwrap()
}

#[test]
fn test_fresh_database_has_no_history() {
    let database = Arc::new(InMemoryHistory::default());
    let history = repository(database.clone());

    assert!(!history.exists().unwrap());
    assert!(history.applied_migrations().unwrap().is_empty());
    // Only the existence probe ran; the table was never selected from.
    assert_eq!(database.statements().len(), 2);
    assert!(database.statements().iter().all(|s| s.starts_with("SELECT EXISTS")));
}

#[test]
fn test_applied_migrations_follow_the_table() {
    let database = Arc::new(InMemoryHistory::default());
    database.create_table();
    database.record("20240301000000_AddRating", "0.1.0");
    database.record("20240101000000_Init", "0.1.0");
    let history = repository(database);

    assert!(history.exists().unwrap());
    let applied: Vec<String> = history
        .applied_migrations()
        .unwrap()
        .into_iter()
        .map(|row| row.migration_id)
        .collect();
    assert_eq!(applied, ["20240101000000_Init", "20240301000000_AddRating"]);
}

#[test]
fn test_coroutine_forms_agree_with_blocking_forms() {
    let database = Arc::new(InMemoryHistory::default());
    database.create_table();
    database.record("20240101000000_Init", "0.1.0");
    let history = repository(database);

    assert_eq!(history.spawn_exists().join().unwrap(), history.exists().unwrap());
    assert_eq!(
        history.spawn_applied_migrations().join().unwrap(),
        history.applied_migrations().unwrap()
    );
}

#[test]
fn test_cancelled_token_stops_queries() {
    let database = Arc::new(InMemoryHistory::default());
    let token = CancellationToken::new();
    let history = repository(database.clone()).with_cancellation(token.clone());
    token.cancel();

    let err = history.spawn_applied_migrations().join().unwrap_err();
    assert!(matches!(err, HistoryError::Executor(ExecutorError::Cancelled)));
    assert!(database.statements().is_empty());
}

#[test]
fn test_scripts_work_without_a_connection() {
    let history = HistoryRepository::default();
    let row = HistoryRow {
        migration_id: "20240101000000_Init".to_string(),
        product_version: "0.1.0".to_string(),
    };

    assert!(history
        .create_script()
        .unwrap()
        .contains("\"MigrationId\" character varying(150) NOT NULL"));
    assert!(history
        .create_script()
        .unwrap()
        .contains("\"ProductVersion\" character varying(32) NOT NULL"));
    assert!(history.insert_script(&row).starts_with("INSERT INTO \"__EFMigrationsHistory\""));
    assert!(history
        .delete_script(&row.migration_id)
        .ends_with("WHERE \"MigrationId\" = '20240101000000_Init';\n"));

    let guarded = format!(
        "{}{}",
        history.begin_if_not_exists(&row.migration_id),
        history.end_if()
    );
    assert!(guarded.starts_with("DO $EF$\nBEGIN\n    IF NOT EXISTS(SELECT 1 FROM \"__EFMigrationsHistory\""));
    assert!(guarded.ends_with("    END IF;\nEND $EF$;\n"));
}

#[test]
fn test_history_model_diffs_to_its_create_script() {
    let history = HistoryRepository::default();
    let model = history.model();
    let table = &model.tables[0];
    assert_eq!(table.name, "__EFMigrationsHistory");
    assert_eq!(table.key_columns(), ["MigrationId".to_string()]);

    let operations = ModelDiffer::default().get_differences(None, Some(&model)).unwrap();
    let script = MigrationsSqlGenerator::default().generate_script(&operations).unwrap();
    assert_eq!(script, history.create_script().unwrap());
}

#[test]
fn test_migration_script_lifecycle() {
    let differ = ModelDiffer::default();
    let init = differ
        .create_migration(id("20240101000000_Init"), None, Some(&blogs(200)))
        .unwrap();
    let widen = differ
        .create_migration(id("20240201000000_WidenUrl"), Some(&blogs(200)), Some(&blogs(500)))
        .unwrap();
    let migrations = vec![widen, init];
    let scripter = MigrationScripter::new(MigrationsSqlGenerator::default(), HistoryRepository::default());

    let up = scripter
        .generate_script(&migrations, None, &ScriptTarget::Latest, ScriptOptions::default())
        .unwrap();
    let create_history = up.find("CREATE TABLE \"__EFMigrationsHistory\"").unwrap();
    let create_blogs = up.find("CREATE TABLE \"Blogs\"").unwrap();
    let widen_url = up.find("ALTER COLUMN \"Url\" TYPE character varying(500)").unwrap();
    let record_widen = up.find("VALUES ('20240201000000_WidenUrl'").unwrap();
    assert!(create_history < create_blogs);
    assert!(create_blogs < widen_url);
    assert!(widen_url < record_widen);

    let idempotent = scripter
        .generate_script(
            &migrations,
            None,
            &ScriptTarget::Latest,
            ScriptOptions {
                idempotent: true,
                create_history_table: true,
            },
        )
        .unwrap();
    assert!(idempotent.starts_with("CREATE TABLE IF NOT EXISTS \"__EFMigrationsHistory\""));
    assert_eq!(
        idempotent.matches("END $EF$;").count(),
        idempotent.matches("DO $EF$").count()
    );

    let down = scripter
        .generate_script(
            &migrations,
            Some(&id("20240201000000_WidenUrl")),
            &ScriptTarget::Migration(id("20240101000000_Init")),
            ScriptOptions::default(),
        )
        .unwrap();
    assert!(!down.contains("DROP TABLE \"Blogs\""));
    assert!(down.contains("TYPE character varying(200)"));
    assert!(down.contains("WHERE \"MigrationId\" = '20240201000000_WidenUrl';"));

    let empty = scripter
        .generate_script(
            &migrations,
            Some(&id("20240201000000_WidenUrl")),
            &ScriptTarget::Initial,
            ScriptOptions::default(),
        )
        .unwrap();
    let narrow = empty.find("TYPE character varying(200)").unwrap();
    let drop_blogs = empty.find("DROP TABLE \"Blogs\"").unwrap();
    assert!(narrow < drop_blogs);
    assert!(empty.ends_with("WHERE \"MigrationId\" = '20240101000000_Init';\n\n"));
}
