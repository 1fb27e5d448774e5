//! Upsell selection policy.
//!
//! Pure and deterministic: given the same candidates, item and configuration
//! the output is always the same.

use crate::config::UpsellConfig;
use crate::types::{AddedItem, CandidateProduct};

/// Filter and bound the candidate list for display.
///
/// In order:
/// 1. Candidates without a variant are dropped (nothing to bind an add
///    control to).
/// 2. If `exclude_current_product` is set and the item carries a product ID,
///    candidates with that ID are dropped.
/// 3. The rest is truncated to `max_upsell_products`.
///
/// Source order is preserved throughout.
#[must_use]
pub fn select_upsells(
    candidates: Vec<CandidateProduct>,
    item: Option<&AddedItem>,
    config: &UpsellConfig,
) -> Vec<CandidateProduct> {
    let excluded = if config.exclude_current_product {
        item.and_then(|item| item.product_id)
    } else {
        None
    };

    candidates
        .into_iter()
        .filter(|product| product.primary_variant().is_some())
        .filter(|product| excluded != Some(product.id))
        .take(config.max_upsell_products)
        .collect()
}
