use sqlx::{postgres::PgPoolOptions, PgPool};

/// Connection-pool handle shared by the read services and the pipeline.
/// Each call checks a connection out of the pool and returns it on every
/// exit path, including failure.
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        // Verify the store answers before handing the pool out
        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }
}
