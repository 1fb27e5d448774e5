//! Candidate product sourcing.
//!
//! Turns the configured strategy into an ordered list of candidates. Every
//! failure degrades to fewer (or zero) candidates; nothing here returns an
//! error.

use tracing::{debug, instrument, warn};

use cart_upsell_core::{AddedItem, CandidateProduct, RecommendationStrategy, UpsellConfig};

use crate::error;
use crate::storefront::StorefrontClient;

/// Load the candidates for one upsell cycle, in source order.
///
/// - `Manual`: each reference fetched in order; failed fetches are skipped.
/// - `Collection`: one listing fetch.
/// - `Related`: one recommendations fetch for the added product.
///
/// Strategies with nothing to ask for (no references, blank collection
/// handle, no product ID, zero cap) return an empty list without touching
/// the network.
#[instrument(skip_all, fields(strategy = ?config.recommendation_strategy))]
pub async fn load_candidates(
    storefront: &StorefrontClient,
    item: Option<&AddedItem>,
    config: &UpsellConfig,
) -> Vec<CandidateProduct> {
    let candidates = match config.recommendation_strategy {
        RecommendationStrategy::Manual => load_manual(storefront, config.refs_for(item)).await,
        RecommendationStrategy::Collection => {
            load_collection(storefront, config.collection_handle.trim()).await
        }
        RecommendationStrategy::Related => load_related(storefront, item, config).await,
    };
    debug!(count = candidates.len(), "Loaded upsell candidates");
    candidates
}

async fn load_manual(storefront: &StorefrontClient, refs: &[String]) -> Vec<CandidateProduct> {
    let mut products = Vec::with_capacity(refs.len());
    for handle in refs.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
        match storefront.product_by_handle(handle).await {
            Ok(product) => products.push(product),
            Err(e) => error::report(&e, "Skipping upsell product"),
        }
    }
    products
}

async fn load_collection(storefront: &StorefrontClient, handle: &str) -> Vec<CandidateProduct> {
    if handle.is_empty() {
        warn!("Collection strategy without a collection handle");
        return Vec::new();
    }
    storefront
        .collection_products(handle)
        .await
        .unwrap_or_else(|e| {
            error::report(&e, "Failed to load upsell collection");
            Vec::new()
        })
}

async fn load_related(
    storefront: &StorefrontClient,
    item: Option<&AddedItem>,
    config: &UpsellConfig,
) -> Vec<CandidateProduct> {
    let Some(product_id) = item.and_then(|item| item.product_id) else {
        debug!("No product ID on the added item; no related products");
        return Vec::new();
    };
    if config.max_upsell_products == 0 {
        return Vec::new();
    }
    storefront
        .recommendations(product_id, config.max_upsell_products)
        .await
        .unwrap_or_else(|e| {
            error::report(&e, "Failed to load related products");
            Vec::new()
        })
}
