//! Postgres persistence for the ChannelSync engine.
//!
//! Whole-row reads and writes only — there is no partial-field API. All
//! queries are runtime-bound (`sqlx::query` + `try_get`) so the crate
//! compiles without a live database; integration tests gate themselves on
//! `CSX_DATABASE_URL`.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod listings;
pub mod orders;
pub mod outbox;

pub use listings::{fetch_candidates, upsert_stock_item, MaterializedPass};
pub use orders::{
    append_order_log, delete_order, insert_order, load_order, load_order_items, save_order,
    save_order_item,
};
pub use outbox::{
    outbox_claim_batch, outbox_count_unprocessed, outbox_enqueue, outbox_find_unprocessed,
    outbox_release_claim,
};

pub const ENV_DB_URL: &str = "CSX_DATABASE_URL";

/// Connect to Postgres using CSX_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='listing_products'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_schema: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_schema: bool,
}
