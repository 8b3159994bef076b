//! Applies verified gateway notifications to stored payments, orders and
//! wallet top-ups.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::{
    order::OrderRepository, payment::PaymentRepository, payment::PaymentStatus,
    wallet::WalletRepository, RepositoryError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Bca,
    Mandiri,
    Bni,
    Qris,
}

impl Gateway {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bca => "bca",
            Self::Mandiri => "mandiri",
            Self::Bni => "bni",
            Self::Qris => "qris",
        }
    }
}

/// A gateway callback normalised across providers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotification {
    pub gateway: Gateway,
    pub transaction_id: String,
    /// Identifiers that may name the stored payment: VA number, QR id, payment id.
    pub references: Vec<String>,
    pub amount: Option<Decimal>,
    /// Raw status as sent by the gateway.
    pub status: String,
    pub timestamp: Option<String>,
}

impl PaymentNotification {
    /// `paid`/`success` settle, `failed`/`expired` close, anything else is informational.
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        match self.status.to_ascii_lowercase().as_str() {
            "paid" | "success" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "expired" => Some(PaymentStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    pub order_updated: bool,
    pub wallet_credited: bool,
}

#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn notify(&self, notification: PaymentNotification) -> ReconcileOutcome;
}

#[derive(Clone)]
pub struct Reconciler {
    payments: PaymentRepository,
    orders: OrderRepository,
    wallets: WalletRepository,
}

impl Reconciler {
    pub fn new(payments: PaymentRepository, orders: OrderRepository, wallets: WalletRepository) -> Self {
        Self {
            payments,
            orders,
            wallets,
        }
    }
}

#[async_trait]
impl PaymentNotifier for Reconciler {
    async fn notify(&self, notification: PaymentNotification) -> ReconcileOutcome {
        let gateway = notification.gateway.as_str();
        tracing::info!(
            "Processing {gateway} payment notification {} with status {}",
            notification.transaction_id,
            notification.status
        );

        let Some(status) = notification.payment_status() else {
            tracing::info!(
                "Notification {} carries no settlement, nothing to apply",
                notification.transaction_id
            );
            return ReconcileOutcome::default();
        };

        let now = Utc::now();
        let references: Vec<&str> = notification.references.iter().map(String::as_str).collect();
        let Some(stored) = self.payments.find_by_reference(&references).await else {
            tracing::warn!(
                "No stored payment matches {gateway} notification {}",
                notification.transaction_id
            );
            return ReconcileOutcome::default();
        };

        // A notice for a different amount settles nothing
        if let Some(amount) = notification.amount.filter(|amount| *amount != stored.amount) {
            tracing::warn!(
                "Amount mismatch for payment {}: notified {amount}, expected {}",
                stored.payment_id,
                stored.amount
            );
            return ReconcileOutcome {
                payment_id: Some(stored.payment_id),
                payment_status: Some(stored.status),
                ..ReconcileOutcome::default()
            };
        }

        let Some(payment) = self
            .payments
            .apply_notification(&[stored.payment_id.as_str()], status, now)
            .await
        else {
            return ReconcileOutcome::default();
        };

        let mut outcome = ReconcileOutcome {
            payment_id: Some(payment.payment_id.clone()),
            payment_status: Some(payment.status),
            ..ReconcileOutcome::default()
        };

        if payment.status == PaymentStatus::Paid {
            outcome.order_updated = self
                .orders
                .mark_paid(&payment.order_id, payment.amount, now)
                .await;
        }

        // Top-up payments carry the top-up id as their order id
        if payment.status != PaymentStatus::Pending {
            match self
                .wallets
                .settle_top_up(&payment.order_id, &self.payments, now, || false)
                .await
            {
                Ok(settlement) => outcome.wallet_credited = settlement.credited,
                Err(RepositoryError::NotFound(_)) => {}
                Err(err) => {
                    tracing::error!("Failed to settle top-up {}: {err}", payment.order_id)
                }
            }
        }

        tracing::info!(
            "Payment notification processed: {} - {}",
            notification.transaction_id,
            notification.status
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::payment::{Bank, PaymentDetails};
    use crate::db::wallet::TransactionStatus;

    fn notification(gateway: Gateway, reference: &str, status: &str) -> PaymentNotification {
        PaymentNotification {
            gateway,
            transaction_id: "TRX-1".to_string(),
            references: vec![reference.to_string()],
            amount: None,
            status: status.to_string(),
            timestamp: None,
        }
    }

    #[test]
    fn gateway_statuses_normalise() {
        let paid = notification(Gateway::Bca, "x", "SUCCESS");
        assert_eq!(paid.payment_status(), Some(PaymentStatus::Paid));
        let expired = notification(Gateway::Bca, "x", "expired");
        assert_eq!(expired.payment_status(), Some(PaymentStatus::Expired));
        let pending = notification(Gateway::Bca, "x", "pending");
        assert_eq!(pending.payment_status(), None);
    }

    #[tokio::test]
    async fn paid_notification_credits_a_top_up_once() {
        let payments = PaymentRepository::new();
        let wallets = WalletRepository::new();
        let reconciler = Reconciler::new(payments.clone(), OrderRepository::new(), wallets.clone());
        let now = Utc::now();

        let payment = payments
            .create_virtual_account("TOPUP-1", Decimal::from(50_000), Bank::Bca, now)
            .await;
        wallets
            .record_top_up(
                "TOPUP-1",
                "u1",
                Decimal::from(50_000),
                &payment.payment_id,
                "Top-up via BCA Virtual Account".to_string(),
                now,
            )
            .await;
        let PaymentDetails::VirtualAccount {
            virtual_account, ..
        } = &payment.details
        else {
            panic!("expected a virtual account");
        };

        let first = reconciler
            .notify(notification(Gateway::Bca, virtual_account, "paid"))
            .await;
        assert!(first.wallet_credited);
        assert_eq!(first.payment_status, Some(PaymentStatus::Paid));

        let second = reconciler
            .notify(notification(Gateway::Bca, virtual_account, "paid"))
            .await;
        assert!(!second.wallet_credited);

        assert_eq!(wallets.balance("u1", now).await.balance, Decimal::from(50_000));
        let history = wallets.transactions("u1").await;
        assert_eq!(history[0].status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn mismatched_amount_settles_nothing() {
        let payments = PaymentRepository::new();
        let orders = OrderRepository::new();
        let reconciler = Reconciler::new(payments.clone(), orders.clone(), WalletRepository::new());
        let now = Utc::now();

        let payment = payments.create_qris("SROY-1", Decimal::from(90_000), now).await;
        let mut underpaid = notification(Gateway::Qris, &payment.payment_id, "paid");
        underpaid.amount = Some(Decimal::ONE);

        let outcome = reconciler.notify(underpaid).await;
        assert_eq!(outcome.payment_status, Some(PaymentStatus::Pending));
        assert!(!outcome.order_updated);
        assert_eq!(
            payments.get(&payment.payment_id).await.unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn unknown_references_are_ignored() {
        let reconciler = Reconciler::new(
            PaymentRepository::new(),
            OrderRepository::new(),
            WalletRepository::new(),
        );
        let outcome = reconciler
            .notify(notification(Gateway::Qris, "QRIS-unknown", "paid"))
            .await;
        assert_eq!(outcome, ReconcileOutcome::default());
    }
}
