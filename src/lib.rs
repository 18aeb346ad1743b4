//! Cart, catalog moderation and farmer verification for the Farm2Kitchen storefront.
//!
//! The domain aggregates live in [`cart`], [`product`] and [`account`]. Both
//! [`service::StoreService`] (embedded, sled-backed) and
//! [`client::RemoteStore`] (HTTP) implement [`storefront::Storefront`].

pub mod account;
pub mod cart;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod inflight;
pub mod moderation;
pub mod product;
pub mod service;
pub mod session;
pub mod storefront;
pub mod types;
pub mod utils;

pub use error::{RemoteError, ValidationError};
pub use storefront::Storefront;
