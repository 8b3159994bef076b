use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use sha2::Sha256;

use crate::config::WebhookSecrets;
use crate::error::{AppError, Result};
use crate::reconcile::{Gateway, PaymentNotification, PaymentNotifier};

use super::utils::ok_with;

type HmacSha256 = Hmac<Sha256>;
type WebhookState = (Arc<WebhookSecrets>, Arc<dyn PaymentNotifier>);

/// Checks a hex HMAC-SHA256 of the raw body. A missing header or an
/// unconfigured secret never verifies.
pub fn verify_signature(payload: &[u8], signature: Option<&str>, secret: Option<&str>) -> bool {
    let (Some(signature), Some(secret)) = (signature, secret) else {
        return false;
    };
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&provided).is_ok()
}

#[derive(Debug, Deserialize)]
struct BcaPayload {
    virtual_account: Option<String>,
    amount: Option<Decimal>,
    transaction_id: Option<String>,
    status: Option<String>,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MandiriPayload {
    bill_no: Option<String>,
    amount: Option<Decimal>,
    transaction_id: Option<String>,
    payment_status: Option<String>,
    payment_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BniPayload {
    virtual_account: Option<String>,
    amount: Option<Decimal>,
    trx_id: Option<String>,
    payment_flag: Option<String>,
    datetime_payment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QrisPayload {
    merchant_id: Option<String>,
    qr_id: Option<String>,
    amount: Option<Decimal>,
    transaction_id: Option<String>,
    status: Option<String>,
    payment_time: Option<String>,
}

fn references(candidates: [Option<&String>; 2]) -> Vec<String> {
    candidates.into_iter().flatten().cloned().collect()
}

impl From<BcaPayload> for PaymentNotification {
    fn from(body: BcaPayload) -> Self {
        Self {
            gateway: Gateway::Bca,
            references: references([body.virtual_account.as_ref(), body.transaction_id.as_ref()]),
            transaction_id: body.transaction_id.unwrap_or_default(),
            amount: body.amount,
            status: body.status.unwrap_or_default(),
            timestamp: body.timestamp,
        }
    }
}

impl From<MandiriPayload> for PaymentNotification {
    fn from(body: MandiriPayload) -> Self {
        Self {
            gateway: Gateway::Mandiri,
            references: references([body.bill_no.as_ref(), body.transaction_id.as_ref()]),
            transaction_id: body.transaction_id.unwrap_or_default(),
            amount: body.amount,
            status: body.payment_status.unwrap_or_default(),
            timestamp: body.payment_time,
        }
    }
}

impl From<BniPayload> for PaymentNotification {
    fn from(body: BniPayload) -> Self {
        let status = if body.payment_flag.as_deref() == Some("Y") {
            "paid"
        } else {
            "failed"
        };
        Self {
            gateway: Gateway::Bni,
            references: references([body.virtual_account.as_ref(), body.trx_id.as_ref()]),
            transaction_id: body.trx_id.unwrap_or_default(),
            amount: body.amount,
            status: status.to_string(),
            timestamp: body.datetime_payment,
        }
    }
}

impl From<QrisPayload> for PaymentNotification {
    fn from(body: QrisPayload) -> Self {
        tracing::debug!("QRIS notification for merchant {:?}", body.merchant_id);
        Self {
            gateway: Gateway::Qris,
            references: references([body.qr_id.as_ref(), body.transaction_id.as_ref()]),
            transaction_id: body.transaction_id.unwrap_or_default(),
            amount: body.amount,
            status: body.status.unwrap_or_default(),
            timestamp: body.payment_time,
        }
    }
}

/// Verifies, decodes and forwards one provider callback.
async fn receive<P>(
    gateway: Gateway,
    secret: Option<&str>,
    notifier: &dyn PaymentNotifier,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<impl IntoResponse>
where
    P: DeserializeOwned + Into<PaymentNotification>,
{
    let header = format!("x-{}-signature", gateway.as_str());
    let signature = headers.get(&header).and_then(|value| value.to_str().ok());

    if !verify_signature(body, signature, secret) {
        tracing::warn!("Rejected {} webhook with invalid signature", gateway.as_str());
        return Err(AppError::InvalidSignature);
    }

    let payload: P = serde_json::from_slice(body).map_err(|err| {
        tracing::warn!("Malformed {} webhook payload: {err}", gateway.as_str());
        AppError::BadRequest("Invalid webhook payload".to_string())
    })?;
    let notification: PaymentNotification = payload.into();
    tracing::info!(
        "{} webhook received for transaction {}",
        gateway.as_str(),
        notification.transaction_id
    );

    let outcome = notifier.notify(notification).await;
    Ok(ok_with(outcome, "Webhook processed"))
}

async fn bca_webhook(
    headers: HeaderMap,
    State((secrets, notifier)): State<WebhookState>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    receive::<BcaPayload>(Gateway::Bca, secrets.bca.as_deref(), notifier.as_ref(), &headers, &body).await
}

async fn mandiri_webhook(
    headers: HeaderMap,
    State((secrets, notifier)): State<WebhookState>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    receive::<MandiriPayload>(
        Gateway::Mandiri,
        secrets.mandiri.as_deref(),
        notifier.as_ref(),
        &headers,
        &body,
    )
    .await
}

async fn bni_webhook(
    headers: HeaderMap,
    State((secrets, notifier)): State<WebhookState>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    receive::<BniPayload>(Gateway::Bni, secrets.bni.as_deref(), notifier.as_ref(), &headers, &body).await
}

async fn qris_webhook(
    headers: HeaderMap,
    State((secrets, notifier)): State<WebhookState>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    receive::<QrisPayload>(Gateway::Qris, secrets.qris.as_deref(), notifier.as_ref(), &headers, &body).await
}

async fn test_webhook(body: Bytes) -> impl IntoResponse {
    tracing::info!("Test webhook received: {}", String::from_utf8_lossy(&body));
    Json(json!({ "success": true, "message": "Test webhook received" }))
}

pub fn webhook_routes(secrets: Arc<WebhookSecrets>, notifier: Arc<dyn PaymentNotifier>) -> Router {
    Router::new()
        .route("/webhooks/bca", post(bca_webhook))
        .route("/webhooks/mandiri", post(mandiri_webhook))
        .route("/webhooks/bni", post(bni_webhook))
        .route("/webhooks/qris", post(qris_webhook))
        .route("/webhooks/test", post(test_webhook))
        .with_state((secrets, notifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("any key length");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn signature_must_match_secret_and_body() {
        let body = br#"{"virtual_account":"014123456789","status":"paid"}"#;
        let signature = sign("bca-secret", body);

        assert!(verify_signature(body, Some(&signature), Some("bca-secret")));
        assert!(!verify_signature(body, Some(&signature), Some("other-secret")));
        assert!(!verify_signature(b"{}", Some(&signature), Some("bca-secret")));
    }

    #[test]
    fn missing_parts_never_verify() {
        let body = b"{}";
        let signature = sign("s", body);
        assert!(!verify_signature(body, None, Some("s")));
        assert!(!verify_signature(body, Some(&signature), None));
        assert!(!verify_signature(body, Some("not-hex"), Some("s")));
        assert!(!verify_signature(body, Some(&signature[..10]), Some("s")));
    }

    #[test]
    fn bni_flag_maps_to_paid_or_failed() {
        let paid: PaymentNotification = BniPayload {
            virtual_account: Some("009123456789".to_string()),
            amount: None,
            trx_id: Some("T1".to_string()),
            payment_flag: Some("Y".to_string()),
            datetime_payment: None,
        }
        .into();
        assert_eq!(paid.status, "paid");
        assert_eq!(paid.references, vec!["009123456789", "T1"]);

        let failed: PaymentNotification = BniPayload {
            virtual_account: None,
            amount: None,
            trx_id: Some("T2".to_string()),
            payment_flag: Some("N".to_string()),
            datetime_payment: None,
        }
        .into();
        assert_eq!(failed.status, "failed");
    }
}
