use std::sync::Arc;

use chrono::{DateTime, Utc};
use mintour_core::repository::OrderRepository;
use mintour_core::{
    OrderCursor, OrderLineRecord, OrderListQuery, OrderRecord, OrderStatus, StoreError, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<OrderStatus>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: Uuid,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub recipient: String,
    pub headline: Option<String>,
    pub line_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<OrderSummary>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderRecord,
    pub lines: Vec<OrderLineRecord>,
}

/// Cursor text is `<created_at micros>_<order id>`
pub fn encode_cursor(cursor: &OrderCursor) -> String {
    format!("{}_{}", cursor.created_at.timestamp_micros(), cursor.id)
}

pub fn decode_cursor(raw: &str) -> Result<OrderCursor, HistoryError> {
    let invalid = || HistoryError::InvalidCursor(raw.to_string());

    let (micros, id) = raw.split_once('_').ok_or_else(invalid)?;
    let created_at = micros
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_micros)
        .ok_or_else(invalid)?;
    let id = Uuid::parse_str(id).map_err(|_| invalid())?;

    Ok(OrderCursor { created_at, id })
}

/// Read side of the caller's orders
pub struct OrderHistory {
    orders: Arc<dyn OrderRepository>,
}

impl OrderHistory {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    /// Newest first. One extra row is fetched to tell whether another page exists.
    pub async fn list(&self, user: &UserId, query: &HistoryQuery) -> Result<OrderPage, HistoryError> {
        let limit = query
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        let before = query.cursor.as_deref().map(decode_cursor).transpose()?;

        let mut records = self
            .orders
            .list_orders(
                user.as_str(),
                &OrderListQuery {
                    status: query.status,
                    limit: limit + 1,
                    before,
                },
            )
            .await?;

        let has_more = records.len() > limit;
        records.truncate(limit);

        let next_cursor = if has_more {
            records.last().map(|order| {
                encode_cursor(&OrderCursor {
                    created_at: order.created_at,
                    id: order.id,
                })
            })
        } else {
            None
        };

        let mut orders = Vec::with_capacity(records.len());
        for record in records {
            let lines = self.orders.order_lines(record.id).await?;
            orders.push(OrderSummary {
                id: record.id,
                status: record.status,
                total_amount: record.total_amount,
                created_at: record.created_at,
                recipient: record.shipping_address.recipient.expose().clone(),
                headline: lines.first().map(|line| line.product_name.clone()),
                line_count: lines.len(),
            });
        }

        Ok(OrderPage {
            orders,
            has_more,
            next_cursor,
        })
    }

    pub async fn detail(&self, user: &UserId, order_id: Uuid) -> Result<OrderDetail, HistoryError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .filter(|order| order.is_owned_by(user.as_str()))
            .ok_or(HistoryError::NotFound(order_id))?;
        let lines = self.orders.order_lines(order_id).await?;

        Ok(OrderDetail { order, lines })
    }
}
