use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::{
    order::OrderRepository,
    payment::{payment_methods, Bank, PaymentRepository, PaymentStatus},
};
use crate::error::{AppError, Result};

use super::utils::{ok, ok_with, ValidJson, Validator};

/// Probability that a status poll finds a pending payment settled.
#[derive(Debug, Clone, Copy)]
pub struct SettleChance(f64);

impl SettleChance {
    pub fn new(probability: f64) -> Self {
        if probability.is_nan() {
            return Self(0.0);
        }
        Self(probability.clamp(0.0, 1.0))
    }

    pub fn roll(self) -> bool {
        rand::thread_rng().gen_bool(self.0)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PayerInput {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualAccountRequest {
    amount: Option<Decimal>,
    bank: Option<String>,
    order_id: Option<String>,
    #[serde(default)]
    customer_info: PayerInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrisRequest {
    amount: Option<Decimal>,
    order_id: Option<String>,
    #[serde(default)]
    customer_info: PayerInput,
}

type PaymentState = (PaymentRepository, OrderRepository, SettleChance);

fn check_payer(validator: &mut Validator, payer: &PayerInput) {
    validator
        .required("customerInfo.name", payer.name.as_deref(), "Customer name is required")
        .email("customerInfo.email", payer.email.as_deref(), "Valid email is required");
}

async fn list_methods() -> impl IntoResponse {
    ok(payment_methods())
}

async fn create_virtual_account(
    State((payments, _, _)): State<PaymentState>,
    ValidJson(req): ValidJson<VirtualAccountRequest>,
) -> Result<impl IntoResponse> {
    let bank = req.bank.as_deref().and_then(Bank::parse);
    let mut validator = Validator::new();
    validator
        .positive("amount", req.amount, "Amount must be a number")
        .check("bank", bank.is_some(), "Invalid bank")
        .required("orderId", req.order_id.as_deref(), "Order ID is required");
    check_payer(&mut validator, &req.customer_info);
    validator.finish()?;

    let (Some(amount), Some(bank), Some(order_id)) = (req.amount, bank, req.order_id) else {
        return Err(AppError::BadRequest("Invalid payment request".to_string()));
    };

    let payment = payments
        .create_virtual_account(order_id.trim(), amount, bank, Utc::now())
        .await;
    tracing::info!(
        "Virtual account {} issued for order {}",
        payment.payment_id,
        payment.order_id
    );
    Ok(ok_with(payment, "Virtual Account created successfully"))
}

async fn create_qris(
    State((payments, _, _)): State<PaymentState>,
    ValidJson(req): ValidJson<QrisRequest>,
) -> Result<impl IntoResponse> {
    let mut validator = Validator::new();
    validator
        .positive("amount", req.amount, "Amount must be a number")
        .required("orderId", req.order_id.as_deref(), "Order ID is required");
    check_payer(&mut validator, &req.customer_info);
    validator.finish()?;

    let (Some(amount), Some(order_id)) = (req.amount, req.order_id) else {
        return Err(AppError::BadRequest("Invalid payment request".to_string()));
    };

    let payment = payments.create_qris(order_id.trim(), amount, Utc::now()).await;
    tracing::info!(
        "QRIS payment {} issued for order {}",
        payment.payment_id,
        payment.order_id
    );
    Ok(ok_with(payment, "QRIS payment created successfully"))
}

async fn payment_status(
    State((payments, orders, chance)): State<PaymentState>,
    Path(payment_id): Path<String>,
) -> Result<impl IntoResponse> {
    let now = Utc::now();
    let payment = payments.poll(&payment_id, now, || chance.roll()).await?;

    if payment.status == PaymentStatus::Paid
        && orders
            .mark_paid(&payment.order_id, payment.amount, now)
            .await
    {
        tracing::info!("Order {} paid by {}", payment.order_id, payment.payment_id);
    }
    Ok(ok(payment))
}

pub fn payment_routes(
    payments: PaymentRepository,
    orders: OrderRepository,
    chance: SettleChance,
) -> Router {
    Router::new()
        .route("/payments/methods", get(list_methods))
        .route("/payments/virtual-account", post(create_virtual_account))
        .route("/payments/qris", post(create_qris))
        .route("/payments/status/:payment_id", get(payment_status))
        .with_state((payments, orders, chance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certain_and_impossible_chances() {
        assert!(SettleChance::new(1.0).roll());
        assert!(!SettleChance::new(0.0).roll());
        assert!(SettleChance::new(7.0).roll());
        assert!(!SettleChance::new(f64::NAN).roll());
    }
}
