//! Core types for the cart upsell widget.
//!
//! This module provides type-safe wrappers for the catalog and cart data the
//! widget exchanges with the storefront.

pub mod cart;
pub mod id;
pub mod price;
pub mod product;

pub use cart::{AddedItem, CartSummary};
pub use id::*;
pub use price::Cents;
pub use product::{CandidateProduct, ProductList, Variant};
