use sqlx::PgPool;

/// Connect, migrate, and confirm the pool answers.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_bootstrap(pool: PgPool) {
    costkeeper_db::health_check(&pool).await.unwrap();
    assert_eq!(
        costkeeper_db::schema_version(&pool).await.unwrap(),
        Some(20260301000005)
    );

    for table in [
        "organizations",
        "employees",
        "pools",
        "resources",
        "assignment_rules",
        "assignment_conditions",
    ] {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, 0, "{table} should start empty");
    }
}

/// All `id` columns must be bigint.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_all_pks_are_bigint(pool: PgPool) {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT table_name, data_type
         FROM information_schema.columns
         WHERE column_name = 'id'
           AND table_schema = 'public'
           AND table_name != '_sqlx_migrations'
         ORDER BY table_name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for (table, data_type) in &rows {
        assert_eq!(data_type, "bigint", "Table {table}.id should be bigint");
    }
}

/// Every table must carry timestamptz `created_at` / `updated_at`.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_all_tables_have_timestamps(pool: PgPool) {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT t.table_name, c.column_name, c.data_type
         FROM information_schema.tables t
         JOIN information_schema.columns c
             ON c.table_schema = t.table_schema AND c.table_name = t.table_name
         WHERE t.table_schema = 'public'
           AND t.table_type = 'BASE TABLE'
           AND t.table_name != '_sqlx_migrations'
           AND c.column_name IN ('created_at', 'updated_at')
         ORDER BY t.table_name, c.column_name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), 12, "six tables with two timestamp columns each");
    for (table, column, data_type) in &rows {
        assert_eq!(
            data_type, "timestamp with time zone",
            "Table {table}.{column} should be timestamptz"
        );
    }
}

/// No character varying columns should exist -- TEXT is preferred.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_no_varchar_columns(pool: PgPool) {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT table_name, column_name
         FROM information_schema.columns
         WHERE table_schema = 'public'
           AND data_type = 'character varying'
           AND table_name != '_sqlx_migrations'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(rows.is_empty(), "Found VARCHAR columns: {rows:?}");
}

/// Every foreign key column must have a corresponding index.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_all_fks_have_indexes(pool: PgPool) {
    let fk_columns: Vec<(String, String)> = sqlx::query_as(
        "SELECT DISTINCT tc.table_name, kcu.column_name
         FROM information_schema.table_constraints tc
         JOIN information_schema.key_column_usage kcu
             ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
         WHERE tc.constraint_type = 'FOREIGN KEY'
           AND tc.table_schema = 'public'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for (table, column) in &fk_columns {
        let has_index: (bool,) = sqlx::query_as(&format!(
            "SELECT EXISTS (
                SELECT 1 FROM pg_indexes
                WHERE schemaname = 'public'
                  AND tablename = '{table}'
                  AND indexdef LIKE '%({column})%'
            )"
        ))
        .fetch_one(&pool)
        .await
        .unwrap();

        assert!(has_index.0, "FK column {table}.{column} has no index");
    }
}

/// The rule uniqueness indexes are partial so soft-deleted rows free their
/// name and priority.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_rule_unique_indexes_are_partial(pool: PgPool) {
    for index in [
        "uq_assignment_rules_org_priority",
        "uq_assignment_rules_org_name",
    ] {
        let (def,): (String,) =
            sqlx::query_as("SELECT indexdef FROM pg_indexes WHERE indexname = $1")
                .bind(index)
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|e| panic!("{index} missing: {e}"));
        assert!(def.contains("UNIQUE"), "{index} should be unique: {def}");
        assert!(
            def.contains("deleted_at IS NULL"),
            "{index} should ignore soft-deleted rows: {def}"
        );
    }
}

/// A rule row cannot target both a pool and an owner.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_single_target_check(pool: PgPool) {
    let (org,): (i64,) =
        sqlx::query_as("INSERT INTO organizations (name) VALUES ('acme') RETURNING id")
            .fetch_one(&pool)
            .await
            .unwrap();

    let result = sqlx::query(
        "INSERT INTO assignment_rules (organization_id, name, priority, creator_id)
         VALUES ($1, 'orphan', 1, 1)",
    )
    .bind(org)
    .execute(&pool)
    .await;
    assert!(result.is_err(), "rule without a target must be rejected");
}
