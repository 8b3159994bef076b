use axum::{
    extract::Path,
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::db::catalog::{self, ProductQuery};
use crate::error::{AppError, Result};

use super::utils::{ok, ValidQuery};

async fn list_products(ValidQuery(query): ValidQuery<ProductQuery>) -> Result<impl IntoResponse> {
    let page = catalog::search(catalog::products(), &query);
    tracing::info!(
        "Catalog query matched {} products",
        page.pagination.total
    );
    Ok(ok(page))
}

async fn get_product(Path(id): Path<String>) -> Result<impl IntoResponse> {
    let product = id
        .parse::<u32>()
        .ok()
        .and_then(catalog::find)
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
    Ok(ok(product))
}

async fn list_categories() -> impl IntoResponse {
    ok(catalog::categories(catalog::products()))
}

async fn list_brands() -> impl IntoResponse {
    ok(catalog::brands(catalog::products()))
}

pub fn product_routes() -> Router {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/categories", get(list_categories))
        .route("/products/brands", get(list_brands))
        .route("/products/:id", get(get_product))
}
