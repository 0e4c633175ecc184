use sqlx::SqlitePool;

/// Creates the chunk staging table and its indexes. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // An embedding must exist before a row may be marked as stored in the
    // vector index.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id INTEGER PRIMARY KEY AUTOINCREMENT,
            fullpath TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            embeddings BLOB,
            stored_in_vdb INTEGER NOT NULL DEFAULT 0,
            UNIQUE(fullpath, chunk_index),
            CHECK (stored_in_vdb = 0 OR embeddings IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_fullpath ON chunks(fullpath)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_pending_embed ON chunks(chunk_id) WHERE embeddings IS NULL",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_pending_vdb ON chunks(chunk_id) \
         WHERE embeddings IS NOT NULL AND stored_in_vdb = 0",
    )
    .execute(pool)
    .await?;

    Ok(())
}
