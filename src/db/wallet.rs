//! Wallet balances and the append-only transaction ledger.
//!
//! All mutations run under a single ledger lock: a top-up is credited in the
//! same critical section that moves its transaction out of `pending`, and a
//! spend checks and debits the balance without releasing the lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{
    payment::{PaymentRepository, PaymentStatus},
    utils::reference_id,
    RepositoryError,
};

pub const CURRENCY: &str = "IDR";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub user_id: String,
    pub balance: Decimal,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
}

impl WalletBalance {
    fn empty(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            balance: Decimal::ZERO,
            currency: CURRENCY.to_string(),
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    TopUp,
    Payment,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Signed: top-ups are positive, payments negative.
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpSettlement {
    pub transaction: WalletTransaction,
    pub payment_status: PaymentStatus,
    /// True only for the poll that credited the balance.
    pub credited: bool,
    pub balance: Decimal,
}

#[derive(Default)]
struct Ledger {
    wallets: HashMap<String, WalletBalance>,
    transactions: Vec<WalletTransaction>,
}

impl Ledger {
    fn wallet(&mut self, user_id: &str, now: DateTime<Utc>) -> &mut WalletBalance {
        self.wallets
            .entry(user_id.to_string())
            .or_insert_with(|| WalletBalance::empty(user_id, now))
    }
}

#[derive(Clone, Default)]
pub struct WalletRepository {
    ledger: Arc<Mutex<Ledger>>,
}

impl WalletRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wallet, opening an empty one on first access.
    pub async fn balance(&self, user_id: &str, now: DateTime<Utc>) -> WalletBalance {
        self.ledger.lock().await.wallet(user_id, now).clone()
    }

    pub async fn record_top_up(
        &self,
        top_up_id: &str,
        user_id: &str,
        amount: Decimal,
        payment_id: &str,
        description: String,
        now: DateTime<Utc>,
    ) -> WalletTransaction {
        let transaction = WalletTransaction {
            id: top_up_id.to_string(),
            user_id: user_id.to_string(),
            transaction_type: TransactionType::TopUp,
            amount,
            status: TransactionStatus::Pending,
            description,
            created_at: now,
            completed_at: None,
            payment_id: Some(payment_id.to_string()),
            order_id: None,
        };

        let mut ledger = self.ledger.lock().await;
        ledger.wallet(user_id, now);
        ledger.transactions.push(transaction.clone());
        transaction
    }

    /// Polls the payment behind a pending top-up and settles it.
    ///
    /// A `paid` payment credits the wallet and completes the transaction; an
    /// expired or failed payment fails it. A transaction that already left
    /// `pending` is reported as-is and never credited twice.
    pub async fn settle_top_up(
        &self,
        top_up_id: &str,
        payments: &PaymentRepository,
        now: DateTime<Utc>,
        settle: impl FnOnce() -> bool,
    ) -> Result<TopUpSettlement, RepositoryError> {
        let mut ledger = self.ledger.lock().await;

        let index = ledger
            .transactions
            .iter()
            .position(|t| t.id == top_up_id && t.transaction_type == TransactionType::TopUp)
            .ok_or_else(|| RepositoryError::NotFound("Top-up transaction".to_string()))?;

        let transaction = ledger.transactions[index].clone();
        let payment_id = transaction
            .payment_id
            .clone()
            .ok_or_else(|| RepositoryError::NotFound("Payment".to_string()))?;

        if transaction.status != TransactionStatus::Pending {
            let payment_status = match payments.get(&payment_id).await {
                Some(payment) => payment.status,
                None => PaymentStatus::Failed,
            };
            let balance = ledger.wallet(&transaction.user_id, now).balance;
            return Ok(TopUpSettlement {
                transaction,
                payment_status,
                credited: false,
                balance,
            });
        }

        let payment = payments.poll(&payment_id, now, settle).await?;

        let credited = match payment.status {
            PaymentStatus::Paid => {
                let wallet = ledger.wallet(&transaction.user_id, now);
                wallet.balance += transaction.amount;
                wallet.last_updated = now;

                let entry = &mut ledger.transactions[index];
                entry.status = TransactionStatus::Completed;
                entry.completed_at = Some(now);
                true
            }
            PaymentStatus::Expired | PaymentStatus::Failed => {
                let entry = &mut ledger.transactions[index];
                entry.status = TransactionStatus::Failed;
                entry.completed_at = Some(now);
                false
            }
            PaymentStatus::Pending => false,
        };

        let balance = ledger.wallet(&transaction.user_id, now).balance;
        Ok(TopUpSettlement {
            transaction: ledger.transactions[index].clone(),
            payment_status: payment.status,
            credited,
            balance,
        })
    }

    /// Debits `amount` for an order. Returns the ledger entry and the new balance.
    pub async fn pay(
        &self,
        user_id: &str,
        order_id: &str,
        amount: Decimal,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<(WalletTransaction, Decimal), RepositoryError> {
        let mut ledger = self.ledger.lock().await;

        let wallet = ledger.wallet(user_id, now);
        if wallet.balance < amount {
            return Err(RepositoryError::InsufficientBalance {
                current: wallet.balance,
                required: amount,
            });
        }
        wallet.balance -= amount;
        wallet.last_updated = now;
        let new_balance = wallet.balance;

        let transaction = WalletTransaction {
            id: reference_id("WALLET", now),
            user_id: user_id.to_string(),
            transaction_type: TransactionType::Payment,
            amount: -amount,
            status: TransactionStatus::Completed,
            description,
            created_at: now,
            completed_at: Some(now),
            payment_id: None,
            order_id: Some(order_id.to_string()),
        };
        ledger.transactions.push(transaction.clone());
        Ok((transaction, new_balance))
    }

    /// Newest first.
    pub async fn transactions(&self, user_id: &str) -> Vec<WalletTransaction> {
        let ledger = self.ledger.lock().await;
        let mut transactions: Vec<WalletTransaction> = ledger
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        transactions
    }
}
