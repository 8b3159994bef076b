//! Fabricated payments: bank virtual accounts and QRIS codes.
//!
//! No gateway is called. A virtual account is the bank's code followed by
//! nine random digits, a QRIS payment carries a placeholder image plus a
//! base64 JSON payload. Settlement happens either through a verified webhook
//! or through the status poll, which flips a pending payment to `paid` with a
//! configurable probability.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{utils::reference_id, RepositoryError};

pub const MERCHANT_NAME: &str = "SIROY_PAINT_SHOP";

/// 1x1 PNG standing in for a rendered QR image.
pub const QR_PLACEHOLDER: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub fn virtual_account_ttl() -> Duration {
    Duration::hours(24)
}

pub fn qris_ttl() -> Duration {
    Duration::minutes(15)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bank {
    Bca,
    Mandiri,
    Bni,
}

impl Bank {
    pub const ALL: [Bank; 3] = [Bank::Bca, Bank::Mandiri, Bank::Bni];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bca" => Some(Self::Bca),
            "mandiri" => Some(Self::Mandiri),
            "bni" => Some(Self::Bni),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Bca => "014",
            Self::Mandiri => "008",
            Self::Bni => "009",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Bca => "BCA",
            Self::Mandiri => "Mandiri",
            Self::Bni => "BNI",
        }
    }

    pub fn instructions(self) -> Vec<String> {
        let (app, menu) = match self {
            Self::Bca => (
                "Buka aplikasi BCA Mobile atau kunjungi ATM BCA",
                "Pilih menu Transfer > Virtual Account",
            ),
            Self::Mandiri => (
                "Buka aplikasi Livin by Mandiri atau kunjungi ATM Mandiri",
                "Pilih menu Bayar > Virtual Account",
            ),
            Self::Bni => (
                "Buka aplikasi BNI Mobile Banking atau kunjungi ATM BNI",
                "Pilih menu Transfer > Virtual Account Billing",
            ),
        };
        [
            app,
            menu,
            "Masukkan nomor Virtual Account",
            "Masukkan jumlah yang harus dibayar",
            "Ikuti instruksi untuk menyelesaikan pembayaran",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Expired,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentDetails {
    #[serde(rename_all = "camelCase")]
    VirtualAccount {
        bank: Bank,
        virtual_account: String,
        instructions: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Qris {
        qr_id: String,
        qr_code: String,
        qr_string: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub payment_id: String,
    pub order_id: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    #[serde(flatten)]
    pub details: PaymentDetails,
    pub expiry_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Gateways name a payment by its id, its VA number or its QR id.
    fn matches_reference(&self, reference: &str) -> bool {
        if self.payment_id == reference {
            return true;
        }
        match &self.details {
            PaymentDetails::VirtualAccount {
                virtual_account, ..
            } => virtual_account == reference,
            PaymentDetails::Qris { qr_id, .. } => qr_id == reference,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<Bank>,
    pub description: &'static str,
    pub processing_time: &'static str,
    pub fee: Decimal,
}

pub fn payment_methods() -> Vec<PaymentMethod> {
    let va = |id: &'static str, name: &'static str, bank: Bank, description: &'static str| PaymentMethod {
        id,
        name,
        kind: "virtual_account",
        bank: Some(bank),
        description,
        processing_time: "Instan",
        fee: Decimal::ZERO,
    };
    vec![
        va(
            "bca_va",
            "BCA Virtual Account",
            Bank::Bca,
            "Transfer melalui ATM, Mobile Banking, atau Internet Banking BCA",
        ),
        va(
            "mandiri_va",
            "Mandiri Virtual Account",
            Bank::Mandiri,
            "Transfer melalui ATM, Livin by Mandiri, atau Internet Banking",
        ),
        va(
            "bni_va",
            "BNI Virtual Account",
            Bank::Bni,
            "Transfer melalui ATM, BNI Mobile Banking, atau Internet Banking",
        ),
        PaymentMethod {
            id: "qris",
            name: "QRIS",
            kind: "qris",
            bank: None,
            description: "Bayar dengan scan QR Code menggunakan aplikasi e-wallet atau mobile banking",
            processing_time: "Instan",
            fee: Decimal::ZERO,
        },
    ]
}

pub fn generate_virtual_account(bank: Bank) -> String {
    let number: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}{number:09}", bank.code())
}

pub fn qris_payload(qr_id: &str, order_id: &str, amount: Decimal, now: DateTime<Utc>) -> String {
    let payload = serde_json::json!({
        "merchant": MERCHANT_NAME,
        "qrId": qr_id,
        "orderId": order_id,
        "amount": amount,
        "timestamp": now.timestamp_millis(),
    });
    STANDARD.encode(payload.to_string())
}

#[derive(Clone, Default)]
pub struct PaymentRepository {
    payments: Arc<RwLock<HashMap<String, Payment>>>,
}

impl PaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_virtual_account(
        &self,
        order_id: &str,
        amount: Decimal,
        bank: Bank,
        now: DateTime<Utc>,
    ) -> Payment {
        let payment = Payment {
            payment_id: reference_id("VA", now),
            order_id: order_id.to_string(),
            amount,
            status: PaymentStatus::Pending,
            details: PaymentDetails::VirtualAccount {
                bank,
                virtual_account: generate_virtual_account(bank),
                instructions: bank.instructions(),
            },
            expiry_time: now + virtual_account_ttl(),
            created_at: now,
            paid_at: None,
        };
        self.insert(payment).await
    }

    pub async fn create_qris(&self, order_id: &str, amount: Decimal, now: DateTime<Utc>) -> Payment {
        let qr_id = reference_id("QR", now);
        let payment = Payment {
            payment_id: reference_id("QRIS", now),
            order_id: order_id.to_string(),
            amount,
            status: PaymentStatus::Pending,
            details: PaymentDetails::Qris {
                qr_code: QR_PLACEHOLDER.to_string(),
                qr_string: qris_payload(&qr_id, order_id, amount, now),
                qr_id,
            },
            expiry_time: now + qris_ttl(),
            created_at: now,
            paid_at: None,
        };
        self.insert(payment).await
    }

    async fn insert(&self, payment: Payment) -> Payment {
        self.payments
            .write()
            .await
            .insert(payment.payment_id.clone(), payment.clone());
        payment
    }

    pub async fn get(&self, payment_id: &str) -> Option<Payment> {
        self.payments.read().await.get(payment_id).cloned()
    }

    /// Resolves the status of a payment.
    ///
    /// A pending payment past its expiry becomes `expired`; otherwise
    /// `settle` decides whether it is `paid` now. Payments that already left
    /// `pending` are returned unchanged.
    pub async fn poll(
        &self,
        payment_id: &str,
        now: DateTime<Utc>,
        settle: impl FnOnce() -> bool,
    ) -> Result<Payment, RepositoryError> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(payment_id)
            .ok_or_else(|| RepositoryError::NotFound("Payment".to_string()))?;

        if payment.status == PaymentStatus::Pending {
            if now > payment.expiry_time {
                payment.status = PaymentStatus::Expired;
            } else if settle() {
                payment.status = PaymentStatus::Paid;
                payment.paid_at = Some(now);
            }
        }
        Ok(payment.clone())
    }

    pub async fn find_by_reference(&self, references: &[&str]) -> Option<Payment> {
        self.payments
            .read()
            .await
            .values()
            .find(|payment| {
                references
                    .iter()
                    .any(|reference| payment.matches_reference(reference))
            })
            .cloned()
    }

    /// Applies a gateway notification to the payment matching `references`.
    /// Only pending payments move.
    pub async fn apply_notification(
        &self,
        references: &[&str],
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Option<Payment> {
        let mut payments = self.payments.write().await;
        let payment = payments.values_mut().find(|payment| {
            references
                .iter()
                .any(|reference| payment.matches_reference(reference))
        })?;

        if payment.status == PaymentStatus::Pending && status != PaymentStatus::Pending {
            payment.status = status;
            if status == PaymentStatus::Paid {
                payment.paid_at = Some(now);
            }
        }
        Some(payment.clone())
    }
}
