//! Cart upsell widget.
//!
//! Watches a storefront page for add-to-cart actions and follows each one
//! with a modal offering a handful of related products, each addable with a
//! single click.
//!
//! # Architecture
//!
//! - [`interceptor`] - turns form submissions and observed cart-add responses
//!   into "item added" notifications
//! - [`widget`] - the per-page controller: modal lifecycle, event dispatch,
//!   upsell adds and teardown
//! - [`source`] - candidate products per recommendation strategy
//! - [`render`] - askama-rendered cards and add-control states
//! - [`cart_sync`] - cart summary refresh and `cart:updated` broadcast
//! - [`storefront`] - storefront AJAX API client with request hooks
//! - [`page`] - the page surface the widget renders into
//!
//! Selection and the widget configuration live in `cart-upsell-core`.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart_sync;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod modal;
pub mod page;
pub mod render;
pub mod source;
pub mod storefront;
pub mod widget;

pub use widget::{EventLoop, OpenOutcome, UpsellWidget};
