use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Upper bound for the quantity of one cart or order line.
pub const MAX_LINE_QUANTITY: u32 = 999;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: u32,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image: String,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartItem>,
    pub item_count: u32,
    pub total: Decimal,
}

impl Cart {
    fn from_items(items: Vec<CartItem>) -> Self {
        let item_count = items
            .iter()
            .fold(0u32, |count, item| count.saturating_add(item.quantity));
        let total = items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum();
        Self {
            items,
            item_count,
            total,
        }
    }
}

// A line is identified by product id and size
#[derive(Clone, Default)]
pub struct CartRepository {
    carts: Arc<RwLock<HashMap<String, Vec<CartItem>>>>,
}

impl CartRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: &str) -> Cart {
        let items = self
            .carts
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        Cart::from_items(items)
    }

    /// Adds `item.quantity` units, merging into an existing line with the same id and size.
    pub async fn add(&self, user_id: &str, item: CartItem) -> Cart {
        let mut carts = self.carts.write().await;
        let items = carts.entry(user_id.to_string()).or_default();

        match items
            .iter_mut()
            .find(|line| line.id == item.id && line.size == item.size)
        {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .saturating_add(item.quantity)
                    .min(MAX_LINE_QUANTITY)
            }
            None => items.push(CartItem {
                quantity: item.quantity.min(MAX_LINE_QUANTITY),
                ..item
            }),
        }
        Cart::from_items(items.clone())
    }

    /// Sets the quantity of a line, capped at [`MAX_LINE_QUANTITY`]; zero or negative removes it.
    pub async fn update_quantity(&self, user_id: &str, id: u32, size: &str, quantity: i64) -> Cart {
        if quantity <= 0 {
            return self.remove(user_id, id, size).await;
        }

        let mut carts = self.carts.write().await;
        let items = carts.entry(user_id.to_string()).or_default();
        if let Some(line) = items
            .iter_mut()
            .find(|line| line.id == id && line.size == size)
        {
            line.quantity = u32::try_from(quantity)
                .unwrap_or(u32::MAX)
                .min(MAX_LINE_QUANTITY);
        }
        Cart::from_items(items.clone())
    }

    pub async fn remove(&self, user_id: &str, id: u32, size: &str) -> Cart {
        let mut carts = self.carts.write().await;
        let items = carts.entry(user_id.to_string()).or_default();
        items.retain(|line| !(line.id == id && line.size == size));
        Cart::from_items(items.clone())
    }

    pub async fn clear(&self, user_id: &str) -> Cart {
        self.carts.write().await.remove(user_id);
        Cart::from_items(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_coat(size: &str, quantity: u32) -> CartItem {
        CartItem {
            id: 1,
            name: "PPG Deltron DG Performance Clear Coat".to_string(),
            price: Decimal::from(850_000),
            quantity,
            image: String::new(),
            size: size.to_string(),
        }
    }

    #[tokio::test]
    async fn same_product_and_size_merge() {
        let repo = CartRepository::new();
        repo.add("u1", clear_coat("1L", 1)).await;
        let cart = repo.add("u1", clear_coat("1L", 2)).await;
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.item_count, 3);
        assert_eq!(cart.total, Decimal::from(2_550_000));
    }

    #[tokio::test]
    async fn different_sizes_are_separate_lines() {
        let repo = CartRepository::new();
        repo.add("u1", clear_coat("1L", 1)).await;
        let cart = repo.add("u1", clear_coat("4L", 1)).await;
        assert_eq!(cart.items.len(), 2);
    }

    #[tokio::test]
    async fn non_positive_quantity_removes_the_line() {
        let repo = CartRepository::new();
        repo.add("u1", clear_coat("1L", 1)).await;
        repo.add("u1", clear_coat("4L", 1)).await;

        let cart = repo.update_quantity("u1", 1, "1L", 5).await;
        assert_eq!(cart.item_count, 6);

        let cart = repo.update_quantity("u1", 1, "1L", 0).await;
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].size, "4L");
    }

    #[tokio::test]
    async fn line_quantities_are_capped() {
        let repo = CartRepository::new();
        repo.add("u1", clear_coat("1L", u32::MAX)).await;
        let cart = repo.add("u1", clear_coat("1L", u32::MAX)).await;
        assert_eq!(cart.items[0].quantity, MAX_LINE_QUANTITY);

        let cart = repo.add("u1", clear_coat("4L", u32::MAX)).await;
        assert_eq!(cart.item_count, 2 * MAX_LINE_QUANTITY);

        let cart = repo.update_quantity("u1", 1, "4L", i64::MAX).await;
        assert_eq!(cart.items[1].quantity, MAX_LINE_QUANTITY);
        assert_eq!(cart.total, Decimal::from(850_000 * 2 * MAX_LINE_QUANTITY));
    }

    #[tokio::test]
    async fn clear_empties_the_cart() {
        let repo = CartRepository::new();
        repo.add("u1", clear_coat("1L", 1)).await;
        let cart = repo.clear("u1").await;
        assert_eq!(cart.item_count, 0);
        assert_eq!(cart.total, Decimal::ZERO);
        assert!(repo.get("u1").await.items.is_empty());
    }
}
