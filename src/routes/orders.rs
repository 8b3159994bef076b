use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{
    cart::MAX_LINE_QUANTITY,
    order::{CustomerInfo, NewOrder, Order, OrderItem, OrderRepository, OrderStatus, ShippingAddress},
    utils::{paginate, PageQuery, Pagination},
};
use crate::error::{AppError, FieldError, Result};

use super::{
    auth::AuthService,
    utils::{ok, ok_with, optional_auth_token, ValidJson, ValidQuery, Validator},
};

#[derive(Debug, Default, Deserialize)]
pub struct CustomerInput {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInput {
    street: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    user_id: Option<String>,
    items: Option<Vec<OrderItem>>,
    #[serde(default)]
    customer_info: CustomerInput,
    #[serde(default)]
    shipping_address: ShippingInput,
    payment_method: Option<String>,
    total_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatus {
    status: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrder {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserOrdersQuery {
    status: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct OrderPage {
    orders: Vec<Order>,
    pagination: Pagination,
}

fn text(value: Option<String>) -> String {
    value.unwrap_or_default().trim().to_string()
}

async fn create_order(
    headers: HeaderMap,
    State((service, orders)): State<(Arc<AuthService>, OrderRepository)>,
    ValidJson(req): ValidJson<CreateOrder>,
) -> Result<impl IntoResponse> {
    // Guests may order; a token that is sent must still be valid
    let claims = optional_auth_token(&headers, &service)?;

    Validator::new()
        .check(
            "items",
            req.items.as_ref().is_some_and(|items| !items.is_empty()),
            "Items must be an array",
        )
        .check(
            "items",
            req.items.iter().flatten().all(|item| {
                (1..=MAX_LINE_QUANTITY).contains(&item.quantity)
            }),
            "Item quantity must be between 1 and 999",
        )
        .required(
            "customerInfo.name",
            req.customer_info.name.as_deref(),
            "Customer name is required",
        )
        .email(
            "customerInfo.email",
            req.customer_info.email.as_deref(),
            "Valid email is required",
        )
        .required(
            "customerInfo.phone",
            req.customer_info.phone.as_deref(),
            "Phone number is required",
        )
        .required(
            "shippingAddress.street",
            req.shipping_address.street.as_deref(),
            "Street address is required",
        )
        .required(
            "shippingAddress.city",
            req.shipping_address.city.as_deref(),
            "City is required",
        )
        .check(
            "totalAmount",
            req.total_amount.is_some(),
            "Total amount must be a number",
        )
        .finish()?;

    let user_id = claims.map(|claims| claims.user_id).or(req.user_id);
    let new_order = NewOrder {
        user_id,
        items: req.items.unwrap_or_default(),
        customer_info: CustomerInfo {
            name: text(req.customer_info.name),
            email: text(req.customer_info.email),
            phone: text(req.customer_info.phone),
        },
        shipping_address: ShippingAddress {
            street: text(req.shipping_address.street),
            city: text(req.shipping_address.city),
            postal_code: req.shipping_address.postal_code,
            country: req.shipping_address.country,
        },
        payment_method: req.payment_method,
        total_amount: req.total_amount.unwrap_or_default(),
    };

    let order = orders.create(new_order, Utc::now()).await;
    tracing::info!(
        "Order {} created for {} totalling {}",
        order.order_id,
        order.customer_info.email,
        order.total_amount
    );
    Ok(ok_with(order, "Order created successfully"))
}

async fn get_order(
    State((_, orders)): State<(Arc<AuthService>, OrderRepository)>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse> {
    let order = orders
        .get(&order_id)
        .await
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
    Ok(ok(order))
}

async fn update_order_status(
    State((_, orders)): State<(Arc<AuthService>, OrderRepository)>,
    Path(order_id): Path<String>,
    ValidJson(req): ValidJson<UpdateStatus>,
) -> Result<impl IntoResponse> {
    let Some(status) = req.status.as_deref().and_then(OrderStatus::parse) else {
        return Err(AppError::Validation(vec![FieldError::new(
            "status",
            "Invalid status",
        )]));
    };

    let order = orders
        .update_status(&order_id, status, req.notes, Utc::now())
        .await?;
    tracing::info!("Order {order_id} moved to {}", status.as_str());
    Ok(ok_with(order, "Order status updated successfully"))
}

async fn user_orders(
    State((_, orders)): State<(Arc<AuthService>, OrderRepository)>,
    Path(user_id): Path<String>,
    ValidQuery(query): ValidQuery<UserOrdersQuery>,
) -> Result<impl IntoResponse> {
    let status = match query.status.as_deref().filter(|status| !status.is_empty()) {
        Some(raw) => Some(OrderStatus::parse(raw).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown order status: {raw}"))
        })?),
        None => None,
    };

    let matched = orders.list_for_user(&user_id, status).await;
    let (orders, pagination) = paginate(
        &matched,
        PageQuery {
            page: query.page,
            limit: query.limit,
        },
    );
    Ok(ok(OrderPage { orders, pagination }))
}

async fn cancel_order(
    State((_, orders)): State<(Arc<AuthService>, OrderRepository)>,
    Path(order_id): Path<String>,
    ValidJson(req): ValidJson<CancelOrder>,
) -> Result<impl IntoResponse> {
    Validator::new()
        .required("reason", req.reason.as_deref(), "Cancellation reason is required")
        .finish()?;

    let order = orders
        .cancel(&order_id, req.reason.as_deref().unwrap_or_default().trim(), Utc::now())
        .await?;
    tracing::info!("Order {order_id} cancelled");
    Ok(ok_with(order, "Order cancelled successfully"))
}

pub fn order_routes(service: Arc<AuthService>, orders: OrderRepository) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:order_id", get(get_order))
        .route("/orders/:order_id/status", patch(update_order_status))
        .route("/orders/:order_id/cancel", post(cancel_order))
        .route("/orders/user/:user_id", get(user_orders))
        .with_state((service, orders))
}
