mod common;

use std::io::Write;
use std::sync::Arc;

use common::{Call, RecordingDriver, expect_err, run, unwrap_outcome};
use sqlmapper::{
    MapperErrorKind, Params, PlaceholderStyle, RegistryConfig, RenderErrorKind, Row, ScanFn,
    SqlRegistry, SqlSession, TransactionErrorKind, TransactionState, Value,
};

const USER_MAPPER: &[u8] = br#"<mapper namespace="user">
    <select id="find">
        SELECT id, name FROM users
        <where>
            <if test="name != null">AND name = #{name}</if>
        </where>
    </select>
    <update id="rename">
        UPDATE users <set><if test="name != null">name = #{name},</if></set> WHERE id = #{id}
    </update>
</mapper>"#;

const ORDER_TEMPLATES: &str = r#"{{define "order.list"}}
SELECT * FROM orders {{where}}{{if status}}AND status = {{status}}{{end}}{{end}}
{{end}}
{{define "order.close"}}UPDATE orders SET status = 'closed' WHERE id = {{id}}{{end}}
"#;

fn registry() -> SqlRegistry {
    let registry = SqlRegistry::new();
    registry.register_mapper_data(USER_MAPPER).unwrap();
    registry
        .register_template_data(ORDER_TEMPLATES.as_bytes())
        .unwrap();
    registry
}

fn user_rows(names: &[&str]) -> Vec<Row> {
    names
        .iter()
        .zip(1_i64..)
        .map(|(name, id)| {
            Row::new(
                vec!["id".into(), "name".into()],
                vec![Value::BigInt(id), Value::from(*name)],
            )
        })
        .collect()
}

#[test]
fn select_renders_registered_sql_and_scans_rows() {
    let registry = registry();
    let driver = Arc::new(RecordingDriver::returning(user_rows(&["ann", "bob"])));
    let session = SqlSession::new(&registry, Arc::clone(&driver));

    let names = run(|cx| async move {
        let mut names = Vec::new();
        let mut sink = ScanFn(|row: &Row| -> sqlmapper::Result<()> {
            names.push(row.get_named::<String>("name")?);
            Ok(())
        });
        unwrap_outcome(
            session
                .select(&cx, "user.find", &Params::new().with("name", "ann"), &mut sink)
                .await,
        );
        drop(sink);
        names
    });

    assert_eq!(names, vec!["ann", "bob"]);
    let recorded = driver.recorded();
    assert_eq!(
        recorded.calls,
        vec![Call {
            origin: "db",
            sql: "SELECT id, name FROM users WHERE name = ?".into(),
            params: vec![Value::Text("ann".into())],
        }]
    );
    assert_eq!(recorded.open_cursors, 0);
}

#[test]
fn statements_between_begin_and_commit_share_the_transaction() {
    let registry = registry();
    let driver = Arc::new(RecordingDriver::returning(user_rows(&["ann"])));
    let mut session = SqlSession::new(&registry, Arc::clone(&driver));

    run(|cx| async move {
        unwrap_outcome(session.begin(&cx).await);
        assert_eq!(session.state(), TransactionState::Active);
        unwrap_outcome(
            session
                .exec(&cx, "user.rename", &Params::new().with("name", "zed").with("id", 1))
                .await,
        );
        let mut rows: Vec<Row> = Vec::new();
        unwrap_outcome(
            session
                .select_template(&cx, "order.list", &Params::new().with("status", "open"), &mut rows)
                .await,
        );
        assert_eq!(rows.len(), 1);
        unwrap_outcome(session.commit(&cx).await);

        unwrap_outcome(
            session
                .exec_template(&cx, "order.close", &Params::new().with("id", 9))
                .await,
        );
        session.close();
    });

    let recorded = driver.recorded();
    let trail: Vec<(&str, &str)> = recorded
        .calls
        .iter()
        .map(|call| (call.origin, call.sql.as_str()))
        .collect();
    assert_eq!(
        trail,
        vec![
            ("tx", "UPDATE users SET name = ? WHERE id = ?"),
            ("tx", "SELECT * FROM orders WHERE status = ?"),
            ("db", "UPDATE orders SET status = 'closed' WHERE id = ?"),
        ]
    );
    assert_eq!(recorded.commits, 1);
    assert_eq!(recorded.rollbacks, 0);
}

#[test]
fn unknown_id_fails_before_reaching_the_driver() {
    let registry = registry();
    let driver = Arc::new(RecordingDriver::default());
    let session = SqlSession::new(&registry, Arc::clone(&driver));

    run(|cx| async move {
        let err = expect_err(session.exec(&cx, "user.missing", &Params::new()).await);
        assert_eq!(err.mapper_kind(), Some(MapperErrorKind::NotFound));
        assert!(err.to_string().contains("user.missing"));

        // Dynamic ids are not visible to the template registry.
        let mut rows: Vec<Row> = Vec::new();
        let err = expect_err(
            session
                .select_template(&cx, "user.find", &Params::new(), &mut rows)
                .await,
        );
        assert_eq!(err.mapper_kind(), Some(MapperErrorKind::NotFound));
    });

    assert!(driver.recorded().calls.is_empty());
}

#[test]
fn render_failure_is_returned_as_error() {
    let registry = registry();
    let driver = Arc::new(RecordingDriver::default());
    let session = SqlSession::new(&registry, Arc::clone(&driver));

    run(|cx| async move {
        let err = expect_err(
            session
                .exec(&cx, "user.rename", &Params::new().with("name", "zed"))
                .await,
        );
        assert_eq!(err.render_kind(), Some(RenderErrorKind::MissingParameter));
    });

    assert!(driver.recorded().calls.is_empty());
}

#[test]
fn rollback_ends_the_unit_of_work() {
    let registry = registry();
    let driver = Arc::new(RecordingDriver::default());
    let mut session = SqlSession::new(&registry, Arc::clone(&driver));

    run(|cx| async move {
        let err = expect_err(session.rollback(&cx).await);
        assert_eq!(err.transaction_kind(), Some(TransactionErrorKind::WithoutBegin));

        unwrap_outcome(session.begin(&cx).await);
        unwrap_outcome(
            session
                .exec(&cx, "user.rename", &Params::new().with("name", "x").with("id", 2))
                .await,
        );
        unwrap_outcome(session.rollback(&cx).await);
        assert_eq!(session.state(), TransactionState::RolledBack);
        assert!(!session.connection().is_transactional());

        let err = expect_err(session.begin(&cx).await);
        assert_eq!(
            err.transaction_kind(),
            Some(TransactionErrorKind::AlreadyRolledBack)
        );
    });

    let recorded = driver.recorded();
    assert_eq!(recorded.rollbacks, 1);
    assert_eq!(recorded.commits, 0);
}

#[test]
fn mapper_file_with_serialized_params_and_dollar_placeholders() {
    #[derive(serde::Serialize)]
    struct Search {
        name: String,
        tags: Vec<String>,
    }

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"<mapper namespace="post">
    <select id="search">
        SELECT * FROM posts WHERE author = #{name} AND tag IN
        <foreach collection="tags" item="tag" open="(" separator="," close=")">#{tag}</foreach>
    </select>
</mapper>"#,
    )
    .unwrap();

    let registry =
        SqlRegistry::with_config(RegistryConfig::new().placeholder(PlaceholderStyle::Dollar));
    registry.register_mapper_file(file.path()).unwrap();

    let params = Params::from_serialize(&Search {
        name: "kim".into(),
        tags: vec!["rust".into(), "sql".into()],
    })
    .unwrap();
    let driver = Arc::new(RecordingDriver::default());
    let session = SqlSession::new(&registry, Arc::clone(&driver));

    run(|cx| async move {
        let mut rows: Vec<Row> = Vec::new();
        unwrap_outcome(session.select(&cx, "post.search", &params, &mut rows).await);
        assert!(rows.is_empty());
    });

    let recorded = driver.recorded();
    assert_eq!(
        recorded.calls[0].sql,
        "SELECT * FROM posts WHERE author = $1 AND tag IN ($2,$3)"
    );
    assert_eq!(
        recorded.calls[0].params,
        vec![
            Value::Text("kim".into()),
            Value::Text("rust".into()),
            Value::Text("sql".into()),
        ]
    );
}

#[test]
fn missing_mapper_file_is_file_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SqlRegistry::new()
        .register_mapper_file(dir.path().join("absent.xml"))
        .unwrap_err();
    assert_eq!(err.mapper_kind(), Some(MapperErrorKind::File));
}
