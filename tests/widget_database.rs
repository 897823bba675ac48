use anyhow::Result;
use rusqlite::{params, Connection};
use rust_sqlite_dbunit::assertion::{assert_equals, assert_table_equals};
use rust_sqlite_dbunit::logging::init_test_logging;
use rust_sqlite_dbunit::resources::{load_data_set, parse_json_data_set};
use rust_sqlite_dbunit::{
    DataSet, DatabaseFixture, Environment, Error, FnFixture, IsolatedContext, Mismatch,
    SessionConfig, SessionState, TestSession, Value,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CREATION_SQL: &str = r#"
    DROP TABLE IF EXISTS widget;
    CREATE TABLE widget(_id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);
"#;

fn resources_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("resources")
}

// The fixture a widget test would write: schema in on_create_database, rows
// from a packaged data set.
struct WidgetFixture {
    data_set: &'static str,
}

impl DatabaseFixture for WidgetFixture {
    fn on_create_database(&self, context: &IsolatedContext, database_name: &str) -> Result<()> {
        context.create_database(database_name, 1, CREATION_SQL)?;
        Ok(())
    }

    fn data_set(&self) -> Result<DataSet> {
        Ok(load_data_set(resources_dir().join(self.data_set))?)
    }
}

// Application code under test: upgrades the widget schema in place.
fn upgrade_database(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS some_new_table(_id INTEGER NOT NULL);
        ALTER TABLE widget ADD COLUMN description TEXT;
        "#,
    )
}

fn widget_session(data_set: &'static str) -> TestSession<WidgetFixture> {
    init_test_logging();
    TestSession::new(WidgetFixture { data_set }, SessionConfig::new("widget.sqlite"))
}

#[test]
fn test_table_creation() {
    test_table_creation_impl().unwrap();
}

fn test_table_creation_impl() -> Result<()> {
    let mut session = widget_session("initial_dataset.yaml");
    session.run(|session| {
        let expected = session.fixture().data_set()?;

        // The raw snapshot still carries sqlite_sequence; the filtered one does not.
        let raw = session.connection()?.create_data_set()?;
        assert!(raw.get_table("sqlite_sequence").is_some());

        let actual = session.current_data_set()?;
        assert_equals(&expected.sorted(), &actual)?;
        assert_table_equals(
            expected.sorted().table("widget")?,
            actual.table("widget")?,
        )?;
        Ok::<_, anyhow::Error>(())
    })
}

#[test]
fn test_json_and_yaml_resources_agree() {
    let json = load_data_set(resources_dir().join("initial_dataset.json")).unwrap();
    let yaml = load_data_set(resources_dir().join("initial_dataset.yaml")).unwrap();
    assert_equals(&json.sorted(), &yaml.sorted()).unwrap();
}

#[test]
fn test_upgrade() {
    test_upgrade_impl().unwrap();
}

fn test_upgrade_impl() -> Result<()> {
    let mut session = widget_session("initial_dataset.json");
    session.set_up()?;

    let conn = session
        .context()
        .expect("context exists after set_up")
        .open_database(session.database_name())?;
    upgrade_database(&conn)?;
    drop(conn);

    let actual = session.snapshot(false)?;
    assert!(actual.get_table("some_new_table").is_some());
    actual.table("widget")?.metadata().column_index("description")?;

    session.end()?;
    Ok(())
}

#[test]
fn test_setup_then_snapshot_matches_expected() {
    test_setup_then_snapshot_matches_expected_impl().unwrap();
}

fn test_setup_then_snapshot_matches_expected_impl() -> Result<()> {
    let mut session = widget_session("initial_dataset.yaml");
    session.begin()?;
    assert_eq!(session.state(), SessionState::DatabaseInitialized);

    let expected = session.fixture().data_set()?;
    session.apply_setup(&expected)?;
    // Full-replace setup can be applied again without duplicating rows.
    session.apply_setup(&expected)?;

    let snapshot = session.snapshot(true)?;
    assert_equals(&expected.sorted(), &snapshot)?;
    assert_eq!(
        snapshot.table("widget")?.rows(),
        [
            vec![Value::Integer(1), Value::from("a")],
            vec![Value::Integer(2), Value::from("b")],
        ]
    );

    session.end()?;
    Ok(())
}

#[test]
fn test_snapshot_matches_expected_written_in_other_types() {
    test_snapshot_matches_expected_written_in_other_types_impl().unwrap();
}

fn test_snapshot_matches_expected_written_in_other_types_impl() -> Result<()> {
    init_test_logging();
    // Ids written as strings, names as numbers; SQLite stores them by column affinity.
    let fixture = FnFixture::new(
        |ctx: &IsolatedContext, name: &str| {
            ctx.create_database(name, 1, CREATION_SQL)?;
            Ok(())
        },
        || {
            Ok(parse_json_data_set(
                r#"{"widget": [{"_id": "10", "name": 7}, {"_id": "9", "name": 8.5}, {"_id": "1", "name": "a"}]}"#,
            )?)
        },
    );
    let mut session = TestSession::new(fixture, SessionConfig::new("widget.sqlite"));
    session.run(|session| {
        let expected = session.fixture().data_set()?;
        let actual = session.current_data_set()?;
        assert_eq!(
            actual.table("widget")?.rows(),
            [
                vec![Value::Integer(1), Value::from("a")],
                vec![Value::Integer(9), Value::from("8.5")],
                vec![Value::Integer(10), Value::from("7")],
            ]
        );
        assert_equals(&expected.sorted(), &actual)?;
        Ok::<_, anyhow::Error>(())
    })
}

#[test]
fn test_mismatch_passes_through_unchanged() {
    let mut session = widget_session("initial_dataset.yaml");
    let result = session.run(|session| {
        session
            .connection()?
            .raw()
            .execute("UPDATE widget SET name = ?1 WHERE _id = ?2", params!["z", 2])?;
        let expected = session.fixture().data_set().map_err(Error::DataSetLoad)?;
        assert_equals(&expected.sorted(), &session.current_data_set()?)
    });
    match result {
        Err(Error::ComparisonMismatch(Mismatch::Value { row, column, .. })) => {
            assert_eq!(row, 1);
            assert_eq!(column, "name");
        }
        other => panic!("expected a value mismatch, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::TornDown);
}

#[test]
fn test_sessions_do_not_touch_application_database() {
    test_sessions_do_not_touch_application_database_impl().unwrap();
}

fn test_sessions_do_not_touch_application_database_impl() -> Result<()> {
    let data_dir = TempDir::new()?;
    let environment = Environment::new(data_dir.path(), resources_dir());

    // The application's own database, with the same file name.
    let app_path = environment.database_path("widget.sqlite");
    std::fs::create_dir_all(app_path.parent().expect("database path has a parent"))?;
    let app = Connection::open(&app_path)?;
    app.execute_batch(CREATION_SQL)?;
    app.execute("INSERT INTO widget(name) VALUES (?1)", ["production"])?;
    drop(app);

    let mut session = widget_session("initial_dataset.yaml").with_environment(environment);
    session.set_up()?;
    assert_ne!(session.database_path(), Some(app_path.clone()));
    session.end()?;

    let app = Connection::open(&app_path)?;
    let name: String = app.query_row("SELECT name FROM widget", [], |row| row.get(0))?;
    assert_eq!(name, "production");
    Ok(())
}

#[test]
fn test_unavailable_environment_aborts_before_database_work() {
    let mut session = widget_session("initial_dataset.yaml")
        .with_environment(Environment::new("/nonexistent/widget-tests", resources_dir()));
    assert!(matches!(
        session.begin(),
        Err(Error::EnvironmentUnavailable { .. })
    ));
    assert_eq!(session.state(), SessionState::Created);
    assert!(matches!(session.connection(), Err(Error::Connection(_))));
    session.end().unwrap();
}

#[test]
fn test_missing_database_file_is_a_connection_error() {
    struct NoSchema;

    impl DatabaseFixture for NoSchema {
        fn on_create_database(&self, _: &IsolatedContext, _: &str) -> Result<()> {
            Ok(())
        }

        fn data_set(&self) -> Result<DataSet> {
            Ok(DataSet::empty())
        }
    }

    let mut session = TestSession::new(NoSchema, SessionConfig::new("missing.sqlite"));
    session.begin().unwrap();
    assert!(matches!(session.connection(), Err(Error::Connection(_))));
    session.end().unwrap();
}
