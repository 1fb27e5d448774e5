//! Catalog products offered as upsells.
//!
//! Products are deserialized straight from the storefront AJAX JSON. The
//! per-product endpoint (`/products/{handle}.js`) and the listing endpoints
//! (`/collections/{handle}/products.json`, `/recommendations/products.json`)
//! disagree on image and price encoding, so deserialization goes through a
//! permissive payload type first.

use serde::{Deserialize, Serialize};

use super::id::{ProductId, VariantId};
use super::price::Cents;

/// A purchasable variant of a candidate product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Variant ID (the value posted to the cart-add endpoint).
    pub id: VariantId,
    /// Current price.
    #[serde(rename = "price")]
    pub price_cents: Cents,
    /// Original price before discount, if any.
    #[serde(rename = "compare_at_price", default)]
    pub compare_at_price_cents: Option<Cents>,
}

impl Variant {
    /// The compare-at price, only when it is strictly greater than the
    /// current price.
    #[must_use]
    pub fn discounted_from(&self) -> Option<Cents> {
        self.compare_at_price_cents
            .filter(|compare_at| *compare_at > self.price_cents)
    }
}

/// A product fetched from the catalog that may be offered as an upsell.
///
/// Read-only: fetched fresh for every upsell cycle and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ProductPayload")]
pub struct CandidateProduct {
    /// Product ID.
    pub id: ProductId,
    /// Display title.
    pub title: String,
    /// URL handle.
    pub handle: Option<String>,
    /// Featured image URL.
    pub featured_image_url: Option<String>,
    /// Variants in catalog order.
    pub variants: Vec<Variant>,
}

impl CandidateProduct {
    /// The variant an upsell card binds its add control to.
    #[must_use]
    pub fn primary_variant(&self) -> Option<&Variant> {
        self.variants.first()
    }
}

/// Image reference as found in the different product JSON shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImagePayload {
    Url(String),
    Object {
        src: Option<String>,
        url: Option<String>,
    },
}

impl ImagePayload {
    fn into_url(self) -> Option<String> {
        match self {
            Self::Url(url) => Some(url),
            Self::Object { src, url } => src.or(url),
        }
        .filter(|url| !url.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct ProductPayload {
    id: ProductId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    featured_image: Option<ImagePayload>,
    #[serde(default)]
    images: Vec<ImagePayload>,
    #[serde(default)]
    variants: Vec<Variant>,
}

impl From<ProductPayload> for CandidateProduct {
    fn from(payload: ProductPayload) -> Self {
        let featured_image_url = payload
            .featured_image
            .and_then(ImagePayload::into_url)
            .or_else(|| payload.images.into_iter().find_map(ImagePayload::into_url));

        Self {
            id: payload.id,
            title: payload.title,
            handle: payload.handle,
            featured_image_url,
            variants: payload.variants,
        }
    }
}

/// Listing envelope returned by the collection and recommendation endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductList {
    /// Products in source order.
    #[serde(default)]
    pub products: Vec<CandidateProduct>,
}
