use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::db::{
    cart::{CartItem, CartRepository, MAX_LINE_QUANTITY},
    catalog,
};
use crate::error::{AppError, Result};

use super::{
    auth::AuthService,
    utils::{ok, ok_with, validate_auth_token, ValidJson, ValidQuery, Validator},
};

#[derive(Debug, Deserialize)]
pub struct AddItem {
    id: Option<u32>,
    size: Option<String>,
    quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItem {
    id: Option<u32>,
    size: Option<String>,
    quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveItem {
    id: Option<u32>,
    size: Option<String>,
}

async fn get_cart(
    headers: HeaderMap,
    State((service, carts)): State<(Arc<AuthService>, CartRepository)>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;
    Ok(ok(carts.get(&claims.user_id).await))
}

// Name, price and image come from the catalog, never from the client
async fn add_item(
    headers: HeaderMap,
    State((service, carts)): State<(Arc<AuthService>, CartRepository)>,
    ValidJson(req): ValidJson<AddItem>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;
    Validator::new()
        .check("id", req.id.is_some(), "Product ID is required")
        .required("size", req.size.as_deref(), "Size is required")
        .check(
            "quantity",
            req.quantity
                .map_or(true, |quantity| (1..=MAX_LINE_QUANTITY).contains(&quantity)),
            "Quantity must be between 1 and 999",
        )
        .finish()?;

    let id = req.id.unwrap_or_default();
    let size = req.size.unwrap_or_default();
    let product = catalog::find(id).ok_or_else(|| AppError::NotFound("Product".to_string()))?;
    let variant = product
        .sizes
        .iter()
        .find(|variant| variant.size == size)
        .ok_or_else(|| AppError::BadRequest(format!("Size {size} is not available")))?;
    if !variant.in_stock {
        return Err(AppError::BadRequest("Product is out of stock".to_string()));
    }

    let cart = carts
        .add(
            &claims.user_id,
            CartItem {
                id,
                name: product.name.clone(),
                price: variant.price,
                quantity: req.quantity.unwrap_or(1),
                image: product.image.clone(),
                size,
            },
        )
        .await;
    Ok(ok_with(cart, "Item added to cart"))
}

async fn update_item(
    headers: HeaderMap,
    State((service, carts)): State<(Arc<AuthService>, CartRepository)>,
    ValidJson(req): ValidJson<UpdateItem>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;
    Validator::new()
        .check("id", req.id.is_some(), "Product ID is required")
        .required("size", req.size.as_deref(), "Size is required")
        .check("quantity", req.quantity.is_some(), "Quantity is required")
        .check(
            "quantity",
            req.quantity
                .map_or(true, |quantity| quantity <= i64::from(MAX_LINE_QUANTITY)),
            "Quantity must be at most 999",
        )
        .finish()?;

    let cart = carts
        .update_quantity(
            &claims.user_id,
            req.id.unwrap_or_default(),
            req.size.as_deref().unwrap_or_default(),
            req.quantity.unwrap_or_default(),
        )
        .await;
    Ok(ok_with(cart, "Cart updated"))
}

/// With `id` and `size` removes one line, without them empties the cart.
async fn remove_items(
    headers: HeaderMap,
    State((service, carts)): State<(Arc<AuthService>, CartRepository)>,
    ValidQuery(req): ValidQuery<RemoveItem>,
) -> Result<impl IntoResponse> {
    let claims = validate_auth_token(&headers, &service)?;

    let cart = match (req.id, req.size) {
        (Some(id), Some(size)) => carts.remove(&claims.user_id, id, &size).await,
        (None, None) => {
            tracing::info!("Clearing cart for user: {}", claims.user_id);
            carts.clear(&claims.user_id).await
        }
        _ => {
            return Err(AppError::BadRequest(
                "Both id and size are required to remove an item".to_string(),
            ))
        }
    };
    Ok(ok_with(cart, "Cart updated"))
}

pub fn cart_routes(service: Arc<AuthService>, carts: CartRepository) -> Router {
    Router::new()
        .route(
            "/cart",
            get(get_cart)
                .post(add_item)
                .put(update_item)
                .delete(remove_items),
        )
        .with_state((service, carts))
}
