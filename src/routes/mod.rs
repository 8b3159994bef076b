pub mod address;
pub mod auth;
pub mod cart;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;
pub mod utils;
pub mod wallet;
pub mod webhooks;
