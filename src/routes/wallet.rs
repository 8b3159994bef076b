use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{
    order::{OrderRepository, OrderStatus},
    payment::{Bank, Payment, PaymentRepository, PaymentStatus},
    utils::{paginate, reference_id, PageQuery, Pagination},
    wallet::{TransactionStatus, WalletRepository, WalletTransaction},
};
use crate::error::{AppError, Result};

use super::{
    payments::SettleChance,
    utils::{ok, ok_with, ValidJson, ValidQuery, Validator},
};

pub const MIN_TOP_UP: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopUpMethod {
    VirtualAccount,
    Qris,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentMethodInput {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bank: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    user_id: Option<String>,
    amount: Option<Decimal>,
    #[serde(default)]
    payment_method: PaymentMethodInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPaymentRequest {
    user_id: Option<String>,
    amount: Option<Decimal>,
    order_id: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpReceipt {
    top_up_id: String,
    user_id: String,
    amount: Decimal,
    payment_method: PaymentMethodInput,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
    expiry_time: DateTime<Utc>,
    payment_details: Payment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPaymentReceipt {
    transaction: WalletTransaction,
    new_balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TransactionPage {
    transactions: Vec<WalletTransaction>,
    pagination: Pagination,
}

type WalletState = (WalletRepository, PaymentRepository, OrderRepository, SettleChance);

async fn get_balance(
    State((wallets, ..)): State<WalletState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(ok(wallets.balance(&user_id, Utc::now()).await))
}

async fn create_top_up(
    State((wallets, payments, ..)): State<WalletState>,
    ValidJson(req): ValidJson<TopUpRequest>,
) -> Result<impl IntoResponse> {
    let method = match req.payment_method.kind.as_deref() {
        Some("virtual_account") => Some(TopUpMethod::VirtualAccount),
        Some("qris") => Some(TopUpMethod::Qris),
        _ => None,
    };
    let bank = req.payment_method.bank.as_deref().and_then(Bank::parse);

    Validator::new()
        .required("userId", req.user_id.as_deref(), "User ID is required")
        .check(
            "amount",
            req.amount.is_some_and(|amount| amount >= Decimal::from(MIN_TOP_UP)),
            "Minimum top-up amount is Rp 10.000",
        )
        .check("paymentMethod.type", method.is_some(), "Invalid payment method")
        .check(
            "paymentMethod.bank",
            method != Some(TopUpMethod::VirtualAccount) || bank.is_some(),
            "Invalid bank",
        )
        .finish()?;

    let (Some(user_id), Some(amount), Some(method)) = (req.user_id, req.amount, method) else {
        return Err(AppError::BadRequest("Invalid top-up request".to_string()));
    };
    let user_id = user_id.trim().to_string();

    let now = Utc::now();
    let top_up_id = reference_id("TOPUP", now);
    let (payment, description) = match (method, bank) {
        (TopUpMethod::VirtualAccount, Some(bank)) => (
            payments
                .create_virtual_account(&top_up_id, amount, bank, now)
                .await,
            format!("Top-up via {} Virtual Account", bank.display_name()),
        ),
        _ => (
            payments.create_qris(&top_up_id, amount, now).await,
            "Top-up via QRIS".to_string(),
        ),
    };

    let transaction = wallets
        .record_top_up(&top_up_id, &user_id, amount, &payment.payment_id, description, now)
        .await;
    tracing::info!(
        "Top-up {} of {} created for user: {}",
        top_up_id,
        amount,
        user_id
    );

    Ok(ok_with(
        TopUpReceipt {
            top_up_id,
            user_id,
            amount,
            payment_method: req.payment_method,
            status: transaction.status,
            created_at: now,
            expiry_time: payment.expiry_time,
            payment_details: payment,
        },
        "Top-up transaction created successfully",
    ))
}

async fn process_top_up(
    State((wallets, payments, _, chance)): State<WalletState>,
    Path(top_up_id): Path<String>,
) -> Result<impl IntoResponse> {
    let settlement = wallets
        .settle_top_up(&top_up_id, &payments, Utc::now(), || chance.roll())
        .await?;

    if settlement.credited {
        tracing::info!(
            "Top-up {} credited {} to user: {}",
            top_up_id,
            settlement.transaction.amount,
            settlement.transaction.user_id
        );
    }

    let message = match (settlement.transaction.status, settlement.payment_status) {
        (TransactionStatus::Completed, _) => "Top-up completed successfully",
        (TransactionStatus::Failed, PaymentStatus::Expired) => "Top-up payment expired",
        (TransactionStatus::Failed, _) => "Top-up payment failed",
        (TransactionStatus::Pending, _) => "Payment is still pending",
    };
    Ok(ok_with(settlement, message))
}

async fn process_payment(
    State((wallets, _, orders, _)): State<WalletState>,
    ValidJson(req): ValidJson<WalletPaymentRequest>,
) -> Result<impl IntoResponse> {
    Validator::new()
        .required("userId", req.user_id.as_deref(), "User ID is required")
        .positive("amount", req.amount, "Amount must be a number")
        .required("orderId", req.order_id.as_deref(), "Order ID is required")
        .finish()?;

    let (Some(user_id), Some(amount), Some(order_id)) = (req.user_id, req.amount, req.order_id) else {
        return Err(AppError::BadRequest("Invalid wallet payment".to_string()));
    };
    let (user_id, order_id) = (user_id.trim(), order_id.trim());
    let description = req
        .description
        .unwrap_or_else(|| format!("Payment for Order #{order_id}"));

    if let Some(order) = orders.get(order_id).await {
        if order.status != OrderStatus::PendingPayment {
            return Err(AppError::BadRequest(
                "Order is not awaiting payment".to_string(),
            ));
        }
        if amount < order.total_amount {
            tracing::warn!(
                "Wallet payment of {amount} for order {order_id} is below its total {}",
                order.total_amount
            );
            return Err(AppError::BadRequest(
                "Payment amount does not cover the order total".to_string(),
            ));
        }
    }

    let now = Utc::now();
    let (transaction, new_balance) = match wallets
        .pay(user_id, order_id, amount, description, now)
        .await
    {
        Ok(paid) => paid,
        Err(err) => {
            tracing::warn!("Wallet payment for order {order_id} rejected: {err}");
            return Err(err.into());
        }
    };

    if orders.mark_paid(order_id, amount, now).await {
        tracing::info!("Order {order_id} paid from wallet of user: {user_id}");
    }
    Ok(ok_with(
        WalletPaymentReceipt {
            transaction,
            new_balance,
        },
        "Payment processed successfully",
    ))
}

async fn transaction_history(
    State((wallets, ..)): State<WalletState>,
    Path(user_id): Path<String>,
    ValidQuery(query): ValidQuery<PageQuery>,
) -> Result<impl IntoResponse> {
    let history = wallets.transactions(&user_id).await;
    let (transactions, pagination) = paginate(&history, query);
    Ok(ok(TransactionPage {
        transactions,
        pagination,
    }))
}

pub fn wallet_routes(
    wallets: WalletRepository,
    payments: PaymentRepository,
    orders: OrderRepository,
    chance: SettleChance,
) -> Router {
    Router::new()
        .route("/wallet/balance/:user_id", get(get_balance))
        .route("/wallet/top-up", post(create_top_up))
        .route("/wallet/top-up/:top_up_id/process", post(process_top_up))
        .route("/wallet/payment", post(process_payment))
        .route("/wallet/transactions/:user_id", get(transaction_history))
        .with_state((wallets, payments, orders, chance))
}
