//! Domain and wire types shared by every crate of the storefront backend.
//!
//! Money is always an integer amount of paise (`i64`); the store is INR-only.

mod api;
mod catalog;
mod order;

pub use api::*;
pub use catalog::{CartLine, Product};
pub use order::{
    Channel, Customer, Order, OrderItem, OrderStatus, ParseStatusError, PaymentMeta, PaymentMethod,
};

/// Единственная валюта магазина.
pub const CURRENCY: &str = "INR";
