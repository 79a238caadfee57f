use sqlx::Row;

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();

    std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
}

#[tokio::test]
async fn migrations_create_versioned_exam_table() -> anyhow::Result<()> {
    // Runs only against a provisioned database.
    let Some(database_url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping migration smoke test");
        return Ok(());
    };

    let pool =
        sqlx::postgres::PgPoolOptions::new().max_connections(1).connect(&database_url).await?;

    let migrations_dir =
        std::env::var("GRADEGATE_MIGRATIONS_DIR").unwrap_or_else(|_| "migrations".to_string());
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(&migrations_dir)).await?;
    migrator.run(&pool).await?;

    let row = sqlx::query("SELECT to_regclass('exam_aggregates')::text").fetch_one(&pool).await?;
    let regclass: Option<String> = row.try_get(0)?;
    assert!(regclass.is_some(), "expected exam_aggregates to exist after migrations");

    let exam_id = format!("smoke-{}", uuid::Uuid::new_v4());
    sqlx::query("INSERT INTO exam_aggregates (id, document) VALUES ($1, $2)")
        .bind(&exam_id)
        .bind(serde_json::json!({ "id": exam_id, "class_id": "class-1" }))
        .execute(&pool)
        .await?;

    let stale = sqlx::query(
        "UPDATE exam_aggregates SET version = version + 1 WHERE id = $1 AND version = $2",
    )
    .bind(&exam_id)
    .bind(7_i64)
    .execute(&pool)
    .await?;
    assert_eq!(stale.rows_affected(), 0, "stale version must not update");

    let fresh = sqlx::query(
        "UPDATE exam_aggregates SET version = version + 1 WHERE id = $1 AND version = $2",
    )
    .bind(&exam_id)
    .bind(1_i64)
    .execute(&pool)
    .await?;
    assert_eq!(fresh.rows_affected(), 1);

    sqlx::query("DELETE FROM exam_aggregates WHERE id = $1").bind(&exam_id).execute(&pool).await?;

    Ok(())
}
