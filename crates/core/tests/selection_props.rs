//! Property tests for the upsell selection policy.

use cart_upsell_core::{
    AddedItem, CandidateProduct, Cents, ProductId, UpsellConfig, Variant, VariantId,
    select_upsells,
};
use proptest::prelude::*;
use serde_json::json;

fn product(id: u64) -> CandidateProduct {
    CandidateProduct {
        id: ProductId::new(id),
        title: format!("Product {id}"),
        handle: None,
        featured_image_url: None,
        variants: vec![Variant {
            id: VariantId::new(id + 10_000),
            price_cents: Cents::new(500),
            compare_at_price_cents: None,
        }],
    }
}

fn added(product_id: u64) -> Option<AddedItem> {
    AddedItem::from_response(json!({"id": 99_999, "product_id": product_id}))
}

/// True if `needle` appears in `haystack` in the same relative order.
fn is_subsequence(needle: &[u64], haystack: &[u64]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|n| rest.any(|h| h == n))
}

proptest! {
    #[test]
    fn prop_never_contains_added_product(
        ids in proptest::collection::vec(1..20u64, 0..30),
        current in 1..20u64,
        max in 0..10usize,
    ) {
        let config = UpsellConfig { max_upsell_products: max, ..UpsellConfig::default() };
        let candidates = ids.iter().copied().map(product).collect();
        let selected = select_upsells(candidates, added(current).as_ref(), &config);

        prop_assert!(selected.iter().all(|p| p.id != ProductId::new(current)));
    }

    #[test]
    fn prop_long_sequences_truncate_to_exact_cap_in_order(
        ids in proptest::collection::vec(1..1000u64, 0..40),
        max in 0..10usize,
    ) {
        prop_assume!(ids.len() > max);

        let config = UpsellConfig {
            max_upsell_products: max,
            exclude_current_product: false,
            ..UpsellConfig::default()
        };
        let candidates = ids.iter().copied().map(product).collect();
        let selected: Vec<u64> = select_upsells(candidates, None, &config)
            .iter()
            .map(|p| p.id.as_u64())
            .collect();

        prop_assert_eq!(selected.len(), max);
        prop_assert!(is_subsequence(&selected, &ids));
    }

    #[test]
    fn prop_output_is_ordered_subsequence(
        ids in proptest::collection::vec(1..50u64, 0..30),
        current in 1..50u64,
        max in 0..10usize,
    ) {
        let config = UpsellConfig { max_upsell_products: max, ..UpsellConfig::default() };
        let candidates = ids.iter().copied().map(product).collect();
        let selected: Vec<u64> = select_upsells(candidates, added(current).as_ref(), &config)
            .iter()
            .map(|p| p.id.as_u64())
            .collect();

        prop_assert!(selected.len() <= max);
        prop_assert!(is_subsequence(&selected, &ids));
    }
}
