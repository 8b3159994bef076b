use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{utils::reference_id, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::PendingPayment,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == raw)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::PendingPayment | Self::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: u32,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub customer_info: CustomerInfo,
    pub shipping_address: ShippingAddress,
    pub payment_method: Option<String>,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub item_count: u32,
    pub customer_info: CustomerInfo,
    pub shipping_address: ShippingAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct OrderRepository {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl OrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, new_order: NewOrder, now: DateTime<Utc>) -> Order {
        let order = Order {
            order_id: reference_id("SROY", now),
            user_id: new_order.user_id,
            item_count: new_order
                .items
                .iter()
                .fold(0u32, |count, item| count.saturating_add(item.quantity)),
            items: new_order.items,
            customer_info: new_order.customer_info,
            shipping_address: new_order.shipping_address,
            payment_method: new_order.payment_method,
            total_amount: new_order.total_amount,
            status: OrderStatus::PendingPayment,
            notes: None,
            cancel_reason: None,
            refund_status: None,
            created_at: now,
            updated_at: now,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        };
        self.orders
            .write()
            .await
            .insert(order.order_id.clone(), order.clone());
        order
    }

    pub async fn get(&self, order_id: &str) -> Option<Order> {
        self.orders.read().await.get(order_id).cloned()
    }

    /// Sets the status as given; only cancellation has guarded transitions.
    pub async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| RepositoryError::NotFound("Order".to_string()))?;

        order.status = status;
        if notes.is_some() {
            order.notes = notes;
        }
        order.updated_at = now;
        match status {
            OrderStatus::Shipped => order.shipped_at = Some(now),
            OrderStatus::Delivered => order.delivered_at = Some(now),
            OrderStatus::Cancelled => order.cancelled_at = Some(now),
            OrderStatus::PendingPayment | OrderStatus::Processing => {}
        }
        Ok(order.clone())
    }

    /// Moves an order awaiting payment to `processing` when `amount` covers
    /// its total. Returns whether it moved.
    pub async fn mark_paid(&self, order_id: &str, amount: Decimal, now: DateTime<Utc>) -> bool {
        let mut orders = self.orders.write().await;
        match orders.get_mut(order_id) {
            Some(order) if order.status == OrderStatus::PendingPayment => {
                if amount < order.total_amount {
                    tracing::warn!(
                        "Payment of {amount} does not cover order {order_id} totalling {}",
                        order.total_amount
                    );
                    return false;
                }
                order.status = OrderStatus::Processing;
                order.updated_at = now;
                true
            }
            _ => false,
        }
    }

    pub async fn cancel(
        &self,
        order_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| RepositoryError::NotFound("Order".to_string()))?;

        if !order.status.is_cancellable() {
            return Err(RepositoryError::InvalidState(
                "Order cannot be cancelled at this stage".to_string(),
            ));
        }

        // Orders past payment need their money back
        if order.status == OrderStatus::Processing {
            order.refund_status = Some("processing".to_string());
        }
        order.status = OrderStatus::Cancelled;
        order.cancel_reason = Some(reason.to_string());
        order.cancelled_at = Some(now);
        order.updated_at = now;
        Ok(order.clone())
    }

    /// Newest first, optionally narrowed to one status.
    pub async fn list_for_user(&self, user_id: &str, status: Option<OrderStatus>) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|order| order.user_id.as_deref() == Some(user_id))
            .filter(|order| status.map_or(true, |status| order.status == status))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn new_order(user_id: &str) -> NewOrder {
        NewOrder {
            user_id: Some(user_id.to_string()),
            items: vec![
                OrderItem {
                    id: 1,
                    name: "PPG Deltron DG Performance Clear Coat".to_string(),
                    price: Decimal::from(850_000),
                    quantity: 2,
                    size: Some("1L".to_string()),
                    image: None,
                },
                OrderItem {
                    id: 2,
                    name: "Sikkens Autocryl 2K Base Coat - Pearl White".to_string(),
                    price: Decimal::from(650_000),
                    quantity: 1,
                    size: None,
                    image: None,
                },
            ],
            customer_info: CustomerInfo {
                name: "John Doe".to_string(),
                email: "john@example.com".to_string(),
                phone: "+62812345678".to_string(),
            },
            shipping_address: ShippingAddress {
                street: "Jl. Sudirman No. 123".to_string(),
                city: "Jakarta".to_string(),
                postal_code: Some("12345".to_string()),
                country: Some("Indonesia".to_string()),
            },
            payment_method: Some("bca_va".to_string()),
            total_amount: Decimal::from(2_350_000),
        }
    }

    #[test]
    fn status_parses_only_the_fixed_set() {
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }

    #[tokio::test]
    async fn new_orders_await_payment() {
        let repo = OrderRepository::new();
        let order = repo.create(new_order("u1"), Utc::now()).await;
        assert!(order.order_id.starts_with("SROY-"));
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.item_count, 3);
        assert_eq!(repo.get(&order.order_id).await, Some(order));
    }

    #[tokio::test]
    async fn shipped_orders_cannot_be_cancelled() {
        let repo = OrderRepository::new();
        let now = Utc::now();
        let order = repo.create(new_order("u1"), now).await;
        let shipped = repo
            .update_status(&order.order_id, OrderStatus::Shipped, None, now)
            .await
            .unwrap();
        assert_eq!(shipped.shipped_at, Some(now));

        assert!(matches!(
            repo.cancel(&order.order_id, "changed my mind", now).await,
            Err(RepositoryError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn cancelling_a_paid_order_starts_a_refund() {
        let repo = OrderRepository::new();
        let now = Utc::now();
        let unpaid = repo.create(new_order("u1"), now).await;
        let paid = repo.create(new_order("u1"), now).await;
        let total = paid.total_amount;
        assert!(repo.mark_paid(&paid.order_id, total, now).await);
        assert!(!repo.mark_paid(&paid.order_id, total, now).await);

        let cancelled = repo.cancel(&unpaid.order_id, "duplicate", now).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.refund_status.is_none());

        let refunded = repo.cancel(&paid.order_id, "duplicate", now).await.unwrap();
        assert_eq!(refunded.refund_status.as_deref(), Some("processing"));
        assert_eq!(refunded.cancel_reason.as_deref(), Some("duplicate"));
    }

    #[tokio::test]
    async fn underpayment_leaves_order_pending() {
        let repo = OrderRepository::new();
        let now = Utc::now();
        let order = repo.create(new_order("u1"), now).await;

        assert!(!repo.mark_paid(&order.order_id, Decimal::ONE, now).await);
        let stored = repo.get(&order.order_id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::PendingPayment);

        assert!(repo.mark_paid(&order.order_id, Decimal::from(2_350_000), now).await);
    }

    #[tokio::test]
    async fn user_listing_filters_by_status() {
        let repo = OrderRepository::new();
        let now = Utc::now();
        let older = repo.create(new_order("u1"), now).await;
        let newer = repo.create(new_order("u1"), now + Duration::seconds(1)).await;
        repo.create(new_order("u2"), now).await;
        repo.update_status(&older.order_id, OrderStatus::Delivered, None, now)
            .await
            .unwrap();

        let all = repo.list_for_user("u1", None).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].order_id, newer.order_id);

        let delivered = repo
            .list_for_user("u1", Some(OrderStatus::Delivered))
            .await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].order_id, older.order_id);
    }
}
