//! Listing candidates, stock, and policy reads.
//!
//! `fetch_candidates` is the aggregate query behind a sync pass: it joins
//! the listing rows against the busy-flag tables and filters out anything
//! holding a lock, a scheduled action, or a pending instruction, plus the
//! product kinds that are never auto-eligible. The remaining gates
//! (duplicate flag, error cooldown) are cheap row-level checks re-applied
//! by the engine from the same materialized read.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

use csx_policy::{QtyMode, SellingPolicy, SyncPolicy};
use csx_schemas::{
    Channel, ChannelDetails, ListingCandidate, ListingExtras, ListingStatus, ProductEnabled,
    ProductId, ProductKind, StockSnapshot,
};

fn parse_product_kind(s: &str) -> Result<ProductKind> {
    match s {
        "Simple" => Ok(ProductKind::Simple),
        "Configurable" => Ok(ProductKind::Configurable),
        "Virtual" => Ok(ProductKind::Virtual),
        "Downloadable" => Ok(ProductKind::Downloadable),
        "Grouped" => Ok(ProductKind::Grouped),
        "Bundle" => Ok(ProductKind::Bundle),
        other => Err(anyhow!("invalid product kind: {other}")),
    }
}

fn parse_qty_mode(s: &str) -> Result<QtyMode> {
    match s {
        "FIXED_VALUE" => Ok(QtyMode::FixedValue),
        "PERCENTAGE_OF_STOCK" => Ok(QtyMode::PercentageOfStock),
        "PERCENTAGE_OF_CUSTOM_ATTRIBUTE" => Ok(QtyMode::PercentageOfCustomAttribute),
        other => Err(anyhow!("invalid qty mode: {other}")),
    }
}

/// Fetch every eligible candidate row for one channel in a single read.
///
/// Exclusions applied here, in SQL: busy flags (locks, scheduled actions,
/// instructions) and grouped/bundle product kinds.
pub async fn fetch_candidates(pool: &PgPool, channel: Channel) -> Result<Vec<ListingCandidate>> {
    let rows = sqlx::query(
        r#"
        select
          lp.id,
          lp.product_id,
          lp.store_id,
          lp.status,
          lp.is_variation,
          lp.product_kind,
          lp.online_qty,
          lp.selling_policy_id,
          lp.sync_policy_id,
          lp.details,
          lp.extras,
          lp.last_blocking_error_at
        from listing_products lp
        where lp.channel = $1
          and lp.product_kind not in ('Grouped', 'Bundle')
          and not exists (
            select 1 from processing_locks pl
            where pl.listing_product_id = lp.id
          )
          and not exists (
            select 1 from scheduled_actions sa
            where sa.listing_product_id = lp.id
          )
          and not exists (
            select 1 from instructions i
            where i.listing_product_id = lp.id
          )
        order by lp.id
        "#,
    )
    .bind(channel.as_str())
    .fetch_all(pool)
    .await
    .context("fetch_candidates failed")?;

    let mut candidates = Vec::with_capacity(rows.len());
    for row in rows {
        let status: String = row.try_get("status")?;
        let product_kind: String = row.try_get("product_kind")?;
        let details: Value = row.try_get("details")?;
        let extras: Value = row.try_get("extras")?;
        let last_blocking_error_at: Option<DateTime<Utc>> =
            row.try_get("last_blocking_error_at")?;

        candidates.push(ListingCandidate {
            listing_product_id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            store_id: row.try_get("store_id")?,
            status: ListingStatus::parse(&status)
                .ok_or_else(|| anyhow!("invalid listing status: {status}"))?,
            is_variation: row.try_get("is_variation")?,
            product_kind: parse_product_kind(&product_kind)?,
            online_qty: row.try_get("online_qty")?,
            selling_policy_id: row.try_get("selling_policy_id")?,
            sync_policy_id: row.try_get("sync_policy_id")?,
            details: serde_json::from_value::<ChannelDetails>(details)
                .context("invalid channel details json")?,
            extras: serde_json::from_value::<ListingExtras>(extras)
                .context("invalid listing extras json")?,
            last_blocking_error_at,
        });
    }

    Ok(candidates)
}

/// Fetch the stock snapshot for one product, if a row exists.
pub async fn fetch_stock_snapshot(
    pool: &PgPool,
    product_id: ProductId,
) -> Result<Option<StockSnapshot>> {
    let row = sqlx::query(
        r#"
        select qty_milli, is_in_stock, product_enabled
        from stock_items
        where product_id = $1
        "#,
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await
    .context("fetch_stock_snapshot failed")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let enabled: String = row.try_get("product_enabled")?;
    Ok(Some(StockSnapshot {
        qty_milli: row.try_get("qty_milli")?,
        is_in_stock: row.try_get("is_in_stock")?,
        product_enabled: match enabled.as_str() {
            "ENABLED" => ProductEnabled::Enabled,
            "DISABLED" => ProductEnabled::Disabled,
            _ => ProductEnabled::Unknown,
        },
    }))
}

/// Insert or replace one stock row (test/demo seeding; production stock is
/// written by the catalog subsystem).
pub async fn upsert_stock_item(
    pool: &PgPool,
    product_id: ProductId,
    snapshot: &StockSnapshot,
) -> Result<()> {
    let enabled = match snapshot.product_enabled {
        ProductEnabled::Enabled => "ENABLED",
        ProductEnabled::Disabled => "DISABLED",
        ProductEnabled::Unknown => "UNKNOWN",
    };
    sqlx::query(
        r#"
        insert into stock_items (product_id, qty_milli, is_in_stock, product_enabled)
        values ($1, $2, $3, $4)
        on conflict (product_id) do update
          set qty_milli = excluded.qty_milli,
              is_in_stock = excluded.is_in_stock,
              product_enabled = excluded.product_enabled
        "#,
    )
    .bind(product_id)
    .bind(snapshot.qty_milli)
    .bind(snapshot.is_in_stock)
    .bind(enabled)
    .execute(pool)
    .await
    .context("upsert_stock_item failed")?;
    Ok(())
}

/// Fetch one selling-format policy row.
pub async fn fetch_selling_policy(pool: &PgPool, id: i64) -> Result<Option<SellingPolicy>> {
    let row = sqlx::query(
        r#"
        select id, qty_mode, percentage, custom_value_milli, custom_attribute,
               custom_attribute_default_milli, conditional_quantity,
               min_qty_milli, max_qty_milli
        from selling_policies
        where id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetch_selling_policy failed")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let qty_mode: String = row.try_get("qty_mode")?;
    Ok(Some(SellingPolicy {
        id: row.try_get("id")?,
        qty_mode: parse_qty_mode(&qty_mode)?,
        percentage: row.try_get("percentage")?,
        custom_value_milli: row.try_get("custom_value_milli")?,
        custom_attribute: row.try_get("custom_attribute")?,
        custom_attribute_default_milli: row.try_get("custom_attribute_default_milli")?,
        conditional_quantity: row.try_get("conditional_quantity")?,
        min_qty_milli: row.try_get("min_qty_milli")?,
        max_qty_milli: row.try_get("max_qty_milli")?,
    }))
}

/// Fetch one synchronization policy row.
pub async fn fetch_sync_policy(pool: &PgPool, id: i64) -> Result<Option<SyncPolicy>> {
    let row = sqlx::query(
        r#"
        select id, list_qty_gte, list_only_enabled_products,
               list_only_in_stock_products, revise_threshold,
               relist_qty_gte_milli, relist_when_in_stock, relist_when_enabled,
               stop_qty_lte_milli, stop_when_out_of_stock, stop_when_disabled
        from sync_policies
        where id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetch_sync_policy failed")?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(SyncPolicy {
        id: row.try_get("id")?,
        list_qty_gte: row.try_get("list_qty_gte")?,
        list_only_enabled_products: row.try_get("list_only_enabled_products")?,
        list_only_in_stock_products: row.try_get("list_only_in_stock_products")?,
        revise_threshold: row.try_get("revise_threshold")?,
        relist_qty_gte_milli: row.try_get("relist_qty_gte_milli")?,
        relist_when_in_stock: row.try_get("relist_when_in_stock")?,
        relist_when_enabled: row.try_get("relist_when_enabled")?,
        stop_qty_lte_milli: row.try_get("stop_qty_lte_milli")?,
        stop_when_out_of_stock: row.try_get("stop_when_out_of_stock")?,
        stop_when_disabled: row.try_get("stop_when_disabled")?,
    }))
}

/// Fetch one raw product attribute value.
pub async fn fetch_product_attribute(
    pool: &PgPool,
    product_id: ProductId,
    code: &str,
) -> Result<Option<String>> {
    let row = sqlx::query(
        r#"
        select value from product_attributes
        where product_id = $1 and code = $2
        "#,
    )
    .bind(product_id)
    .bind(code)
    .fetch_optional(pool)
    .await
    .context("fetch_product_attribute failed")?;

    Ok(match row {
        Some(row) => Some(row.try_get("value")?),
        None => None,
    })
}

/// Materialized pass inputs: everything one evaluation pass needs, read
/// once so the engine sees a single consistent snapshot.
///
/// The engine's source traits are synchronous; this bridge pre-loads the
/// async reads and serves them from memory. Busy-flag gates were already
/// applied in SQL, so the [`csx_candidates::GateSource`] view reports
/// everything as free.
pub struct MaterializedPass {
    pub channel: Channel,
    pub candidates: Vec<ListingCandidate>,
    pub selling: HashMap<i64, SellingPolicy>,
    pub sync: HashMap<i64, SyncPolicy>,
    pub attributes: HashMap<(ProductId, String), String>,
    pub stock: HashMap<ProductId, StockSnapshot>,
}

impl MaterializedPass {
    /// Load every input for one channel's evaluation pass.
    pub async fn load(pool: &PgPool, channel: Channel) -> Result<Self> {
        let candidates = fetch_candidates(pool, channel).await?;

        let mut selling = HashMap::new();
        let mut sync = HashMap::new();
        let mut attributes = HashMap::new();
        let mut stock = HashMap::new();

        for candidate in &candidates {
            if !selling.contains_key(&candidate.selling_policy_id) {
                if let Some(p) = fetch_selling_policy(pool, candidate.selling_policy_id).await? {
                    selling.insert(p.id, p);
                }
            }
            if !sync.contains_key(&candidate.sync_policy_id) {
                if let Some(p) = fetch_sync_policy(pool, candidate.sync_policy_id).await? {
                    sync.insert(p.id, p);
                }
            }
            if let Some(code) = selling
                .get(&candidate.selling_policy_id)
                .and_then(|p| p.custom_attribute.clone())
            {
                let key = (candidate.product_id, code.clone());
                if !attributes.contains_key(&key) {
                    if let Some(value) =
                        fetch_product_attribute(pool, candidate.product_id, &code).await?
                    {
                        attributes.insert(key, value);
                    }
                }
            }
            if !stock.contains_key(&candidate.product_id) {
                if let Some(s) = fetch_stock_snapshot(pool, candidate.product_id).await? {
                    stock.insert(candidate.product_id, s);
                }
            }
        }

        Ok(Self {
            channel,
            candidates,
            selling,
            sync,
            attributes,
            stock,
        })
    }
}

impl csx_candidates::CandidateSource for MaterializedPass {
    fn candidates(&self, channel: Channel) -> Vec<ListingCandidate> {
        if channel == self.channel {
            self.candidates.clone()
        } else {
            Vec::new()
        }
    }
}

impl csx_candidates::StockSource for MaterializedPass {
    fn stock_snapshot(&self, product_id: ProductId) -> Option<StockSnapshot> {
        self.stock.get(&product_id).copied()
    }
}

impl csx_candidates::GateSource for MaterializedPass {
    fn is_locked(&self, _id: i64) -> bool {
        false
    }
    fn has_pending_scheduled_action(&self, _id: i64) -> bool {
        false
    }
    fn has_pending_instruction(&self, _id: i64) -> bool {
        false
    }
}

impl csx_policy::PolicySource for MaterializedPass {
    fn selling_policy(&self, id: i64) -> Option<SellingPolicy> {
        self.selling.get(&id).cloned()
    }
    fn sync_policy(&self, id: i64) -> Option<SyncPolicy> {
        self.sync.get(&id).cloned()
    }
}

impl csx_policy::AttributeSource for MaterializedPass {
    fn raw_attribute(&self, product_id: ProductId, code: &str) -> Option<String> {
        self.attributes.get(&(product_id, code.to_string())).cloned()
    }
}
