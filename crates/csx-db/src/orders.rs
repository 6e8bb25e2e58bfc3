//! Order and order-item persistence: whole-row load/save plus the
//! append-only per-order log stream.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;

use csx_fulfillment::LogLevel;
use csx_orders::{BuyerInfo, ExternalOrder, ExternalOrderItem, ReservationState};
use csx_schemas::{Channel, Money, OrderId, OrderStatus, Tracking};

fn reservation_as_str(r: ReservationState) -> &'static str {
    match r {
        ReservationState::NotReserved => "NOT_RESERVED",
        ReservationState::Placed => "PLACED",
        ReservationState::Released => "RELEASED",
    }
}

fn parse_reservation(s: &str) -> Result<ReservationState> {
    match s {
        "NOT_RESERVED" => Ok(ReservationState::NotReserved),
        "PLACED" => Ok(ReservationState::Placed),
        "RELEASED" => Ok(ReservationState::Released),
        other => Err(anyhow!("invalid reservation state: {other}")),
    }
}

fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<ExternalOrder> {
    let channel: String = row.try_get("channel")?;
    let status: String = row.try_get("status")?;
    let reservation: String = row.try_get("reservation")?;
    let currency: String = row.try_get("currency")?;
    let purchased_at: DateTime<Utc> = row.try_get("purchased_at")?;

    Ok(ExternalOrder {
        id: row.try_get("id")?,
        channel: Channel::parse(&channel).ok_or_else(|| anyhow!("invalid channel: {channel}"))?,
        channel_order_id: row.try_get("channel_order_id")?,
        store_id: row.try_get("store_id")?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| anyhow!("invalid order status: {status}"))?,
        purchased_at,
        subtotal: Money::new(row.try_get("subtotal_micros")?, currency.clone()),
        shipping_price: Money::new(row.try_get("shipping_micros")?, currency.clone()),
        product_tax: Money::new(row.try_get("product_tax_micros")?, currency.clone()),
        shipping_tax: Money::new(row.try_get("shipping_tax_micros")?, currency.clone()),
        discount: Money::new(row.try_get("discount_micros")?, currency),
        buyer: BuyerInfo {
            name: row.try_get("buyer_name")?,
            email: row.try_get("buyer_email")?,
        },
        is_channel_fulfilled: row.try_get("is_channel_fulfilled")?,
        magento_order_id: row.try_get("magento_order_id")?,
        invoice_id: row.try_get("invoice_id")?,
        shipment_id: row.try_get("shipment_id")?,
        reservation: parse_reservation(&reservation)?,
    })
}

/// Insert a new order row, returning its id.
pub async fn insert_order(pool: &PgPool, order: &ExternalOrder) -> Result<OrderId> {
    let row = sqlx::query(
        r#"
        insert into orders (
          channel, channel_order_id, store_id, status, purchased_at, currency,
          subtotal_micros, shipping_micros, product_tax_micros,
          shipping_tax_micros, discount_micros, buyer_name, buyer_email,
          is_channel_fulfilled, magento_order_id, invoice_id, shipment_id,
          reservation
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
          $16, $17, $18
        )
        returning id
        "#,
    )
    .bind(order.channel.as_str())
    .bind(&order.channel_order_id)
    .bind(order.store_id)
    .bind(order.status.as_str())
    .bind(order.purchased_at)
    .bind(&order.subtotal.currency)
    .bind(order.subtotal.amount_micros)
    .bind(order.shipping_price.amount_micros)
    .bind(order.product_tax.amount_micros)
    .bind(order.shipping_tax.amount_micros)
    .bind(order.discount.amount_micros)
    .bind(&order.buyer.name)
    .bind(&order.buyer.email)
    .bind(order.is_channel_fulfilled)
    .bind(order.magento_order_id)
    .bind(order.invoice_id)
    .bind(order.shipment_id)
    .bind(reservation_as_str(order.reservation))
    .fetch_one(pool)
    .await
    .context("insert_order failed")?;

    Ok(row.try_get("id")?)
}

/// Load one order by id.
pub async fn load_order(pool: &PgPool, id: OrderId) -> Result<Option<ExternalOrder>> {
    let row = sqlx::query("select * from orders where id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("load_order failed")?;

    row.as_ref().map(row_to_order).transpose()
}

/// Save (whole-row update) an existing order.
pub async fn save_order(pool: &PgPool, order: &ExternalOrder) -> Result<()> {
    sqlx::query(
        r#"
        update orders set
          status = $2,
          subtotal_micros = $3,
          shipping_micros = $4,
          product_tax_micros = $5,
          shipping_tax_micros = $6,
          discount_micros = $7,
          buyer_name = $8,
          buyer_email = $9,
          is_channel_fulfilled = $10,
          magento_order_id = $11,
          invoice_id = $12,
          shipment_id = $13,
          reservation = $14
        where id = $1
        "#,
    )
    .bind(order.id)
    .bind(order.status.as_str())
    .bind(order.subtotal.amount_micros)
    .bind(order.shipping_price.amount_micros)
    .bind(order.product_tax.amount_micros)
    .bind(order.shipping_tax.amount_micros)
    .bind(order.discount.amount_micros)
    .bind(&order.buyer.name)
    .bind(&order.buyer.email)
    .bind(order.is_channel_fulfilled)
    .bind(order.magento_order_id)
    .bind(order.invoice_id)
    .bind(order.shipment_id)
    .bind(reservation_as_str(order.reservation))
    .execute(pool)
    .await
    .context("save_order failed")?;
    Ok(())
}

/// Remove an order on explicit request. Items, logs, and fulfillment
/// changes cascade at the schema level.
pub async fn delete_order(pool: &PgPool, id: OrderId) -> Result<()> {
    sqlx::query("delete from orders where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete_order failed")?;
    Ok(())
}

/// Load all canonical item rows for one order+sku.
pub async fn load_order_items(
    pool: &PgPool,
    order_id: OrderId,
    sku: &str,
) -> Result<Vec<ExternalOrderItem>> {
    let rows = sqlx::query(
        r#"
        select order_id, channel_item_id, merged_channel_item_ids, sku,
               qty_purchased, price_micros, currency,
               buyer_cancellation_requested, tracking_carrier, tracking_number
        from order_items
        where order_id = $1 and sku = $2
        order by channel_item_id
        "#,
    )
    .bind(order_id)
    .bind(sku)
    .fetch_all(pool)
    .await
    .context("load_order_items failed")?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let merged: Value = row.try_get("merged_channel_item_ids")?;
        let merged: BTreeSet<String> =
            serde_json::from_value(merged).context("invalid merged id set json")?;
        let currency: String = row.try_get("currency")?;
        let carrier: Option<String> = row.try_get("tracking_carrier")?;
        let number: Option<String> = row.try_get("tracking_number")?;

        items.push(ExternalOrderItem {
            order_id: row.try_get("order_id")?,
            channel_item_id: row.try_get("channel_item_id")?,
            merged_channel_item_ids: merged,
            sku: row.try_get("sku")?,
            qty_purchased: row.try_get("qty_purchased")?,
            price: Money::new(row.try_get("price_micros")?, currency),
            buyer_cancellation_requested: row.try_get("buyer_cancellation_requested")?,
            tracking: match (carrier, number) {
                (Some(carrier), Some(number)) => Some(Tracking { carrier, number }),
                _ => None,
            },
        });
    }

    Ok(items)
}

/// Save one item row, whole-record. Rows claimed through an id in the
/// merged set are replaced so a canonical-id rotation lands in place.
pub async fn save_order_item(pool: &PgPool, item: &ExternalOrderItem) -> Result<()> {
    let merged = serde_json::to_value(&item.merged_channel_item_ids)
        .context("failed to encode merged id set")?;
    let (carrier, number) = match &item.tracking {
        Some(t) => (Some(t.carrier.clone()), Some(t.number.clone())),
        None => (None, None),
    };

    let mut tx = pool.begin().await.context("save_order_item begin failed")?;

    // A rotation changes the primary key; clear any row whose id now lives
    // in this record's merged set before upserting.
    sqlx::query(
        r#"
        delete from order_items
        where order_id = $1
          and sku = $2
          and channel_item_id = any(
            select jsonb_array_elements_text($3::jsonb)
          )
        "#,
    )
    .bind(item.order_id)
    .bind(&item.sku)
    .bind(&merged)
    .execute(&mut *tx)
    .await
    .context("save_order_item merge-clear failed")?;

    sqlx::query(
        r#"
        insert into order_items (
          order_id, channel_item_id, merged_channel_item_ids, sku,
          qty_purchased, price_micros, currency,
          buyer_cancellation_requested, tracking_carrier, tracking_number
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        on conflict (order_id, channel_item_id) do update set
          merged_channel_item_ids = excluded.merged_channel_item_ids,
          sku = excluded.sku,
          qty_purchased = excluded.qty_purchased,
          price_micros = excluded.price_micros,
          currency = excluded.currency,
          buyer_cancellation_requested = excluded.buyer_cancellation_requested,
          tracking_carrier = excluded.tracking_carrier,
          tracking_number = excluded.tracking_number
        "#,
    )
    .bind(item.order_id)
    .bind(&item.channel_item_id)
    .bind(&merged)
    .bind(&item.sku)
    .bind(item.qty_purchased)
    .bind(item.price.amount_micros)
    .bind(&item.price.currency)
    .bind(item.buyer_cancellation_requested)
    .bind(carrier)
    .bind(number)
    .execute(&mut *tx)
    .await
    .context("save_order_item upsert failed")?;

    tx.commit().await.context("save_order_item commit failed")?;
    Ok(())
}

/// Append one message to an order's log stream.
pub async fn append_order_log(
    pool: &PgPool,
    order_id: OrderId,
    level: LogLevel,
    message: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into order_logs (order_id, level, message)
        values ($1, $2, $3)
        "#,
    )
    .bind(order_id)
    .bind(level.as_str())
    .bind(message)
    .execute(pool)
    .await
    .context("append_order_log failed")?;
    Ok(())
}
