use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::db::address::{AddressInput, AddressRepository};
use crate::error::Result;

use super::{
    auth::AuthService,
    utils::{ok, ok_with, validate_auth_token, ValidJson, Validator},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    province: Option<String>,
    postal_code: Option<String>,
    label: Option<String>,
    #[serde(default)]
    is_default: bool,
}

impl AddressRequest {
    fn validate(self) -> Result<AddressInput> {
        Validator::new()
            .required("name", self.name.as_deref(), "Name is required")
            .required("phone", self.phone.as_deref(), "Phone number is required")
            .required("address", self.address.as_deref(), "Address is required")
            .required("city", self.city.as_deref(), "City is required")
            .required("province", self.province.as_deref(), "Province is required")
            .exact_len(
                "postalCode",
                self.postal_code.as_deref(),
                5,
                "Postal code must be 5 digits",
            )
            .required("label", self.label.as_deref(), "Address label is required")
            .finish()?;

        let field = |value: Option<String>| value.unwrap_or_default().trim().to_string();
        Ok(AddressInput {
            name: field(self.name),
            phone: field(self.phone),
            address: field(self.address),
            city: field(self.city),
            province: field(self.province),
            postal_code: field(self.postal_code),
            label: field(self.label),
            is_default: self.is_default,
        })
    }
}

async fn list_addresses(
    headers: HeaderMap,
    State((service, addresses)): State<(Arc<AuthService>, AddressRepository)>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;
    Ok(ok(addresses.list(&claims.user_id).await))
}

async fn create_address(
    headers: HeaderMap,
    State((service, addresses)): State<(Arc<AuthService>, AddressRepository)>,
    ValidJson(req): ValidJson<AddressRequest>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;
    let input = req.validate()?;

    let address = addresses.create(&claims.user_id, input, Utc::now()).await;
    tracing::info!("Address {} created for user: {}", address.id, claims.user_id);
    Ok((
        StatusCode::CREATED,
        ok_with(address, "Address created successfully"),
    ))
}

async fn update_address(
    headers: HeaderMap,
    State((service, addresses)): State<(Arc<AuthService>, AddressRepository)>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<AddressRequest>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;
    let input = req.validate()?;

    let address = addresses
        .update(&claims.user_id, &id, input, Utc::now())
        .await?;
    tracing::info!("Address {id} updated for user: {}", claims.user_id);
    Ok(ok_with(address, "Address updated successfully"))
}

async fn delete_address(
    headers: HeaderMap,
    State((service, addresses)): State<(Arc<AuthService>, AddressRepository)>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;

    addresses.delete(&claims.user_id, &id).await?;
    tracing::info!("Address {id} deleted for user: {}", claims.user_id);
    Ok(ok_with(serde_json::Value::Null, "Address deleted successfully"))
}

async fn set_default_address(
    headers: HeaderMap,
    State((service, addresses)): State<(Arc<AuthService>, AddressRepository)>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;

    let address = addresses
        .set_default(&claims.user_id, &id, Utc::now())
        .await?;
    Ok(ok_with(address, "Default address updated successfully"))
}

pub fn address_routes(service: Arc<AuthService>, addresses: AddressRepository) -> Router {
    Router::new()
        .route("/addresses", get(list_addresses).post(create_address))
        .route(
            "/addresses/:id",
            put(update_address).delete(delete_address),
        )
        .route("/addresses/:id/set-default", put(set_default_address))
        .with_state((service, addresses))
}
