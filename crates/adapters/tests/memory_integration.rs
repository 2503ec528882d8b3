use doclens_adapters::memory::MemoryBackend;
use doclens_core::connection_manager::{ConnectionManager, ConnectionOptions};
use doclens_core::console_templates::ConsoleTemplate;
use doclens_core::grid_view::ERROR_COLUMN;
use doclens_core::projection::project;
use doclens_core::query_runner::{QueryRunner, TransactionCommand};
use doclens_core::query_task::{QueryTask, TaskOutcome};
use doclens_core::text_view::LIMIT_EXCEEDED_MARKER;
use tempfile::TempDir;

async fn open(options: ConnectionOptions) -> ConnectionManager<MemoryBackend> {
    let mut manager = ConnectionManager::new(MemoryBackend);
    manager
        .connect(options)
        .await
        .expect("database should open");
    manager
}

async fn run(
    manager: &ConnectionManager<MemoryBackend>,
    runner: &QueryRunner,
    sql: &str,
) -> QueryTask {
    let engine = manager.engine();
    let mut task = QueryTask::new();
    runner
        .execute(engine.as_deref(), &mut task, sql)
        .await
        .expect("database is open");
    task
}

#[tokio::test(flavor = "current_thread")]
async fn batch_reports_last_statement_and_keeps_earlier_inserts() {
    let manager = open(ConnectionOptions::in_memory()).await;
    let runner = QueryRunner::default();

    let task = run(
        &manager,
        &runner,
        r#"INSERT INTO a VALUES {"x": 1}; SELECT * FROM a;"#,
    )
    .await;
    let projection = project(&task);
    assert_eq!(projection.grid.column_names(), vec!["_id", "x"]);
    assert_eq!(projection.grid.row_count(), 1);
    assert_eq!(projection.summary.count_text, "1 document");

    let again = run(&manager, &runner, "SELECT * FROM a").await;
    let TaskOutcome::Success { values, truncated } = again.outcome() else {
        panic!("expected success, got {:?}", again.outcome());
    };
    assert_eq!(values.len(), 1);
    assert!(!truncated);
}

#[tokio::test(flavor = "current_thread")]
async fn syntax_error_projects_excerpt_and_grid_message() {
    let manager = open(ConnectionOptions::in_memory()).await;
    let task = run(&manager, &QueryRunner::default(), "SELECT $ FORM users").await;

    let projection = project(&task);
    let context = projection.error.expect("syntax error has context");
    assert_eq!(context.message, "Unexpected token `FORM` in position 10.");
    assert_eq!(context.caret_line.as_deref(), Some("---------^"));
    assert_eq!(projection.grid.cell_text(0, ERROR_COLUMN), context.message);
}

#[tokio::test(flavor = "current_thread")]
async fn row_limit_truncates_and_marks_text() {
    let manager = open(ConnectionOptions::in_memory()).await;
    let runner = QueryRunner::new(2);

    let task = run(
        &manager,
        &runner,
        "INSERT INTO n VALUES {}, {}, {}; SELECT $ FROM n",
    )
    .await;
    let projection = project(&task);
    assert_eq!(projection.summary.count_text, "2+ documents");
    assert!(projection.text.contains(LIMIT_EXCEEDED_MARKER));
}

#[tokio::test(flavor = "current_thread")]
async fn read_only_database_rejects_writes() {
    let mut options = ConnectionOptions::in_memory();
    options.read_only = true;
    let manager = open(options).await;

    let task = run(
        &manager,
        &QueryRunner::default(),
        r#"INSERT INTO a VALUES {"x": 1}"#,
    )
    .await;
    let error = task.error().expect("write should fail");
    assert!(!error.is_syntax_error());
    assert_eq!(error.message(), "This database is opened in read-only mode");
}

#[tokio::test(flavor = "current_thread")]
async fn transaction_commands_run_through_the_coordinator() {
    let manager = open(ConnectionOptions::in_memory()).await;
    let runner = QueryRunner::default();

    run(&manager, &runner, TransactionCommand::Begin.sql()).await;
    run(&manager, &runner, r#"INSERT INTO a VALUES {"x": 1}"#).await;
    run(&manager, &runner, TransactionCommand::Rollback.sql()).await;

    let task = run(&manager, &runner, "SELECT COUNT(*) FROM a").await;
    assert_eq!(project(&task).grid.cell_text(0, "count"), "0");
}

#[tokio::test(flavor = "current_thread")]
async fn file_database_persists_on_checkpoint_and_close() {
    let temp_dir = TempDir::new().expect("failed to create temp directory");
    let path = temp_dir.path().join("studio.db");
    let options = ConnectionOptions::new(path.display().to_string());

    let mut manager = open(options.clone()).await;
    let runner = QueryRunner::default();
    run(
        &manager,
        &runner,
        r#"INSERT INTO people VALUES {"name": "ana", "born": {"$date": "1990-01-02T00:00:00.000Z"}}; CHECKPOINT"#,
    )
    .await;
    assert!(path.exists());
    run(&manager, &runner, r#"INSERT INTO people VALUES {"name": "bo"}"#).await;
    manager.disconnect().await.expect("close should flush");

    let manager = open(options).await;
    let task = run(&manager, &runner, "SELECT $ FROM people").await;
    let projection = project(&task);
    assert_eq!(projection.grid.column_names(), vec!["_id", "name", "born"]);
    assert_eq!(projection.grid.row_count(), 2);
    assert_eq!(
        projection.grid.cell_text(0, "born"),
        r#"{"$date":"1990-01-02T00:00:00.000Z"}"#
    );
    assert_eq!(projection.grid.cell_text(1, "born"), "");
}

#[tokio::test(flavor = "current_thread")]
async fn closed_manager_reports_not_connected() {
    let mut manager = open(ConnectionOptions::in_memory()).await;
    manager.disconnect().await.expect("close should succeed");

    let mut task = QueryTask::new();
    let result = QueryRunner::default()
        .execute(manager.engine().as_deref(), &mut task, "SELECT $ FROM a")
        .await;
    assert!(result.is_err());
    assert_eq!(task.outcome(), &TaskOutcome::NotRun);
}

#[tokio::test(flavor = "current_thread")]
async fn every_console_template_runs_on_the_engine() {
    let temp_dir = TempDir::new().expect("failed to create temp directory");
    std::fs::write(
        temp_dir.path().join("import.json"),
        r#"[{"name": "imported"}]"#,
    )
    .expect("failed to write import file");

    let manager = open(ConnectionOptions::in_memory()).await;
    let runner = QueryRunner::default();
    run(
        &manager,
        &runner,
        r#"INSERT INTO users VALUES {"name": "ana"}, {"name": "bo"}"#,
    )
    .await;

    for template in ConsoleTemplate::ALL {
        let sql = template
            .render(Some("users"), temp_dir.path())
            .expect("template renders");
        let task = run(&manager, &runner, &sql).await;
        assert_eq!(
            task.error(),
            None,
            "{} failed with {sql}",
            template.title()
        );
    }

    assert!(temp_dir.path().join("users.json").exists());
    let imported = run(&manager, &runner, "SELECT COUNT(*) FROM new_col").await;
    assert_eq!(project(&imported).grid.cell_text(0, "count"), "1");
    let renamed = run(&manager, &runner, "SELECT COUNT(*) FROM new_name").await;
    assert_eq!(project(&renamed).grid.cell_text(0, "count"), "2");
}
