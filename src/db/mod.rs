//! In-process repositories.
//!
//! Nothing here touches disk: every repository is an `Arc`-shared map behind a
//! `tokio` lock, so clones handed to different routers observe the same data
//! for the lifetime of the process.

use rust_decimal::Decimal;
use thiserror::Error;

pub mod address;
pub mod cart;
pub mod catalog;
pub mod order;
pub mod payment;
pub mod user;
pub mod utils;
pub mod wallet;

use address::AddressRepository;
use cart::CartRepository;
use order::OrderRepository;
use payment::PaymentRepository;
use user::UserRepository;
use wallet::WalletRepository;

#[derive(Debug, Error, PartialEq)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Insufficient wallet balance")]
    InsufficientBalance { current: Decimal, required: Decimal },
}

/// Every repository the service owns.
#[derive(Clone, Default)]
pub struct Store {
    pub users: UserRepository,
    pub addresses: AddressRepository,
    pub carts: CartRepository,
    pub orders: OrderRepository,
    pub payments: PaymentRepository,
    pub wallets: WalletRepository,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }
}
