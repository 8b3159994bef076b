use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::RepositoryError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub label: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub label: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Per-user address books.
///
/// Every non-empty book has exactly one default address: the first address
/// becomes the default, promoting another address demotes the previous one,
/// and the default cannot be removed while other addresses remain.
#[derive(Clone, Default)]
pub struct AddressRepository {
    books: Arc<RwLock<HashMap<String, Vec<Address>>>>,
}

impl AddressRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default address first, then newest first.
    pub async fn list(&self, user_id: &str) -> Vec<Address> {
        let mut addresses = self
            .books
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        addresses.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        addresses
    }

    pub async fn create(&self, user_id: &str, input: AddressInput, now: DateTime<Utc>) -> Address {
        let mut books = self.books.write().await;
        let book = books.entry(user_id.to_string()).or_default();

        let is_default = input.is_default || book.is_empty();
        if is_default {
            clear_default(book, now);
        }

        let address = Address {
            id: format!("addr_{}", Uuid::new_v4().simple()),
            user_id: user_id.to_string(),
            name: input.name,
            phone: input.phone,
            address: input.address,
            city: input.city,
            province: input.province,
            postal_code: input.postal_code,
            label: input.label,
            is_default,
            created_at: now,
            updated_at: now,
        };
        book.push(address.clone());
        address
    }

    /// Replaces the editable fields. An update can promote an address to
    /// default but cannot demote the current default.
    pub async fn update(
        &self,
        user_id: &str,
        id: &str,
        input: AddressInput,
        now: DateTime<Utc>,
    ) -> Result<Address, RepositoryError> {
        let mut books = self.books.write().await;
        let book = books
            .get_mut(user_id)
            .ok_or_else(|| RepositoryError::NotFound("Address".to_string()))?;
        let index = position(book, id)?;

        if input.is_default {
            clear_default(book, now);
        }

        let address = &mut book[index];
        address.name = input.name;
        address.phone = input.phone;
        address.address = input.address;
        address.city = input.city;
        address.province = input.province;
        address.postal_code = input.postal_code;
        address.label = input.label;
        address.is_default = address.is_default || input.is_default;
        address.updated_at = now;
        Ok(address.clone())
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> Result<(), RepositoryError> {
        let mut books = self.books.write().await;
        let book = books
            .get_mut(user_id)
            .ok_or_else(|| RepositoryError::NotFound("Address".to_string()))?;
        let index = position(book, id)?;

        if book[index].is_default && book.len() > 1 {
            return Err(RepositoryError::InvalidState(
                "Cannot delete default address".to_string(),
            ));
        }
        book.remove(index);
        Ok(())
    }

    pub async fn set_default(
        &self,
        user_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Address, RepositoryError> {
        let mut books = self.books.write().await;
        let book = books
            .get_mut(user_id)
            .ok_or_else(|| RepositoryError::NotFound("Address".to_string()))?;
        let index = position(book, id)?;

        if !book[index].is_default {
            clear_default(book, now);
            book[index].is_default = true;
            book[index].updated_at = now;
        }
        Ok(book[index].clone())
    }
}

fn position(book: &[Address], id: &str) -> Result<usize, RepositoryError> {
    book.iter()
        .position(|address| address.id == id)
        .ok_or_else(|| RepositoryError::NotFound("Address".to_string()))
}

fn clear_default(book: &mut [Address], now: DateTime<Utc>) {
    for address in book.iter_mut().filter(|address| address.is_default) {
        address.is_default = false;
        address.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn input(label: &str, is_default: bool) -> AddressInput {
        AddressInput {
            name: "Diatmiko Darajad".to_string(),
            phone: "(+62) 878 8505 0919".to_string(),
            address: "Gg. Menur II, Kadisoko".to_string(),
            city: "KALASAN".to_string(),
            province: "DI YOGYAKARTA".to_string(),
            postal_code: "55571".to_string(),
            label: label.to_string(),
            is_default,
        }
    }

    async fn defaults(repo: &AddressRepository, user: &str) -> Vec<String> {
        repo.list(user)
            .await
            .into_iter()
            .filter(|address| address.is_default)
            .map(|address| address.label)
            .collect()
    }

    #[tokio::test]
    async fn first_address_becomes_default() {
        let repo = AddressRepository::new();
        let first = repo.create("u1", input("Utama", false), Utc::now()).await;
        assert!(first.is_default);
        assert!(first.id.starts_with("addr_"));
    }

    #[tokio::test]
    async fn set_default_keeps_exactly_one_default() {
        let repo = AddressRepository::new();
        let now = Utc::now();
        repo.create("u1", input("Utama", true), now).await;
        let shop = repo.create("u1", input("Toko", false), now + Duration::seconds(1)).await;
        repo.create("u1", input("Kantor", false), now + Duration::seconds(2)).await;

        repo.set_default("u1", &shop.id, now + Duration::seconds(3)).await.unwrap();

        assert_eq!(defaults(&repo, "u1").await, vec!["Toko".to_string()]);
        assert_eq!(repo.list("u1").await[0].id, shop.id);
    }

    #[tokio::test]
    async fn creating_a_default_demotes_the_previous_one() {
        let repo = AddressRepository::new();
        let now = Utc::now();
        repo.create("u1", input("Utama", true), now).await;
        repo.create("u1", input("Toko", true), now).await;
        assert_eq!(defaults(&repo, "u1").await, vec!["Toko".to_string()]);
    }

    #[tokio::test]
    async fn update_cannot_demote_the_default() {
        let repo = AddressRepository::new();
        let home = repo.create("u1", input("Utama", true), Utc::now()).await;
        let updated = repo
            .update("u1", &home.id, input("Rumah", false), Utc::now())
            .await
            .unwrap();
        assert!(updated.is_default);
        assert_eq!(updated.label, "Rumah");
    }

    #[tokio::test]
    async fn default_cannot_be_deleted_while_others_exist() {
        let repo = AddressRepository::new();
        let home = repo.create("u1", input("Utama", true), Utc::now()).await;
        let shop = repo.create("u1", input("Toko", false), Utc::now()).await;

        assert!(matches!(
            repo.delete("u1", &home.id).await,
            Err(RepositoryError::InvalidState(_))
        ));
        repo.delete("u1", &shop.id).await.unwrap();
        repo.delete("u1", &home.id).await.unwrap();
        assert!(repo.list("u1").await.is_empty());
    }

    #[tokio::test]
    async fn books_are_isolated_per_user() {
        let repo = AddressRepository::new();
        let home = repo.create("u1", input("Utama", true), Utc::now()).await;
        assert_eq!(
            repo.set_default("u2", &home.id, Utc::now()).await,
            Err(RepositoryError::NotFound("Address".to_string()))
        );
        assert!(repo.list("u2").await.is_empty());
    }
}
