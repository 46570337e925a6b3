use anyhow::{Context, Result};

/// Connects via `AITR_DATABASE_URL` and runs pending migrations.
pub async fn migrate() -> Result<()> {
    let pool = aitr_store::pg::connect_from_env()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))
        .with_context(|| format!("connect via {}", aitr_store::pg::ENV_DATABASE_URL))?;
    aitr_store::pg::migrate(&pool).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    println!("migrations_applied=true");
    Ok(())
}
