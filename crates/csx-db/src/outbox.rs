//! Durable fulfillment-change outbox.
//!
//! Enqueue upholds the coalescing invariant transactionally: the existing
//! unprocessed row for (order, action) is locked with `FOR UPDATE`, merged
//! via [`coalesce_params`], and written back; only when no such row exists
//! is a new one inserted. Claiming uses `FOR UPDATE SKIP LOCKED` so
//! concurrent dispatchers never double-claim a row.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use sqlx::{PgPool, Row};

use csx_fulfillment::{
    coalesce_params, ChangeParams, EnqueueResult, FulfillmentAction, FulfillmentChange, Initiator,
    NewFulfillmentChange,
};
use csx_schemas::{Channel, OrderId};

fn initiator_as_str(i: Initiator) -> &'static str {
    match i {
        Initiator::Automatic => "AUTOMATIC",
        Initiator::Operator => "OPERATOR",
    }
}

fn parse_initiator(s: &str) -> Result<Initiator> {
    match s {
        "AUTOMATIC" => Ok(Initiator::Automatic),
        "OPERATOR" => Ok(Initiator::Operator),
        other => Err(anyhow!("invalid initiator: {other}")),
    }
}

fn row_to_change(row: &sqlx::postgres::PgRow) -> Result<FulfillmentChange> {
    let channel: String = row.try_get("channel")?;
    let action: String = row.try_get("action")?;
    let initiator: String = row.try_get("initiator")?;
    let params: Value = row.try_get("params")?;

    Ok(FulfillmentChange {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        channel: Channel::parse(&channel).ok_or_else(|| anyhow!("invalid channel: {channel}"))?,
        action: FulfillmentAction::parse(&action)
            .ok_or_else(|| anyhow!("invalid action: {action}"))?,
        initiator: parse_initiator(&initiator)?,
        params: serde_json::from_value(params).context("invalid change params json")?,
        processing_attempt_count: row.try_get("processing_attempt_count")?,
    })
}

/// Enqueue a change with coalescing semantics.
pub async fn outbox_enqueue(
    pool: &PgPool,
    change: &NewFulfillmentChange,
) -> Result<EnqueueResult> {
    let action = change.params.action();
    let mut tx = pool.begin().await.context("outbox_enqueue begin failed")?;

    let existing = sqlx::query(
        r#"
        select id, order_id, channel, action, initiator, params,
               processing_attempt_count
        from fulfillment_changes
        where order_id = $1 and action = $2 and processing_attempt_count = 0
        for update
        "#,
    )
    .bind(change.order_id)
    .bind(action.as_str())
    .fetch_optional(&mut *tx)
    .await
    .context("outbox_enqueue lookup failed")?;

    let result = if let Some(row) = existing {
        let mut stored = row_to_change(&row)?;
        coalesce_params(&mut stored.params, &change.params);
        let params =
            serde_json::to_value(&stored.params).context("failed to encode change params")?;
        sqlx::query(
            r#"
            update fulfillment_changes
            set params = $2, updated_at = now()
            where id = $1
            "#,
        )
        .bind(stored.id)
        .bind(params)
        .execute(&mut *tx)
        .await
        .context("outbox_enqueue coalesce-update failed")?;
        EnqueueResult::Coalesced { id: stored.id }
    } else {
        let params =
            serde_json::to_value(&change.params).context("failed to encode change params")?;
        let row = sqlx::query(
            r#"
            insert into fulfillment_changes (
              order_id, channel, action, initiator, params
            ) values ($1, $2, $3, $4, $5)
            returning id
            "#,
        )
        .bind(change.order_id)
        .bind(change.channel.as_str())
        .bind(action.as_str())
        .bind(initiator_as_str(change.initiator))
        .bind(params)
        .fetch_one(&mut *tx)
        .await
        .context("outbox_enqueue insert failed")?;
        EnqueueResult::Inserted {
            id: row.try_get("id")?,
        }
    };

    tx.commit().await.context("outbox_enqueue commit failed")?;
    Ok(result)
}

/// Find the unprocessed change for (order, action), if any.
pub async fn outbox_find_unprocessed(
    pool: &PgPool,
    order_id: OrderId,
    action: FulfillmentAction,
) -> Result<Option<FulfillmentChange>> {
    let row = sqlx::query(
        r#"
        select id, order_id, channel, action, initiator, params,
               processing_attempt_count
        from fulfillment_changes
        where order_id = $1 and action = $2 and processing_attempt_count = 0
        "#,
    )
    .bind(order_id)
    .bind(action.as_str())
    .fetch_optional(pool)
    .await
    .context("outbox_find_unprocessed failed")?;

    row.as_ref().map(row_to_change).transpose()
}

/// Atomically claim up to `limit` unprocessed changes for dispatch.
///
/// Claimed rows get their attempt count bumped inside the same statement,
/// so a concurrent claimer skips them (`SKIP LOCKED` covers the window
/// before commit).
pub async fn outbox_claim_batch(pool: &PgPool, limit: i64) -> Result<Vec<FulfillmentChange>> {
    let rows = sqlx::query(
        r#"
        update fulfillment_changes
        set processing_attempt_count = processing_attempt_count + 1,
            updated_at = now()
        where id in (
          select id from fulfillment_changes
          where processing_attempt_count = 0
          order by id
          limit $1
          for update skip locked
        )
        returning id, order_id, channel, action, initiator, params,
                  processing_attempt_count
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("outbox_claim_batch failed")?;

    rows.iter().map(row_to_change).collect()
}

/// Return a claimed change to the unprocessed pool after a dispatch
/// failure, so the next cron pass retries it.
pub async fn outbox_release_claim(pool: &PgPool, id: i64) -> Result<bool> {
    let done = sqlx::query(
        r#"
        update fulfillment_changes
        set processing_attempt_count = 0, updated_at = now()
        where id = $1 and processing_attempt_count > 0
        "#,
    )
    .bind(id)
    .execute(pool)
    .await
    .context("outbox_release_claim failed")?;
    Ok(done.rows_affected() == 1)
}

/// Count unprocessed changes; the CLI migrate guardrail refuses to run
/// while this is non-zero unless forced.
pub async fn outbox_count_unprocessed(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from fulfillment_changes
        where processing_attempt_count = 0
        "#,
    )
    .fetch_one(pool)
    .await
    .context("outbox_count_unprocessed failed")?;
    Ok(n)
}
