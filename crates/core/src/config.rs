//! Widget configuration supplied by the host page.
//!
//! The host page provides a JSON object before startup. Keys use camelCase;
//! the short names from the first widget release (`modalDelay`,
//! `upsellProducts`, `recommendations`, ...) are accepted as aliases. Unknown
//! keys are ignored and every key has a default, so `{}` is a valid
//! configuration.
//!
//! # Example
//!
//! ```json
//! {
//!   "modalDelayMs": 300,
//!   "maxUpsellProducts": 4,
//!   "recommendationStrategy": "collection",
//!   "collectionHandle": "best-sellers"
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AddedItem, Cents};

/// Errors that can occur when parsing a widget configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration is not valid JSON, or a key holds the wrong type.
    #[error("invalid widget configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration is valid JSON but not an object.
    #[error("invalid widget configuration: expected a JSON object")]
    NotAnObject,
}

/// How candidate products are sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStrategy {
    /// Fetch an explicit, ordered list of product handles.
    #[default]
    #[serde(alias = "Manual")]
    Manual,
    /// Ask the catalog for products related to the one just added.
    #[serde(alias = "Related")]
    Related,
    /// List the products of one collection.
    #[serde(alias = "Collection")]
    Collection,
}

/// Inconsistent option combinations that make a strategy yield nothing.
///
/// These never fail construction; they are reported so the host can log
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    /// `Manual` strategy with neither global nor per-product references.
    #[error("manual strategy has no upsell product references")]
    ManualWithoutRefs,
    /// `Collection` strategy with an empty collection handle.
    #[error("collection strategy has an empty collection handle")]
    CollectionWithoutHandle,
    /// `maxUpsellProducts` is zero, so no upsell can ever be shown.
    #[error("maxUpsellProducts is 0")]
    ZeroProductCap,
}

/// Upsell widget configuration.
///
/// Immutable after construction and shared for the widget's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpsellConfig {
    /// Master switch. A disabled widget installs nothing.
    pub enabled: bool,
    /// Delay between a form-initiated add and opening the modal.
    #[serde(alias = "modalDelay")]
    pub modal_delay_ms: u64,
    /// Auto-close delay after opening; 0 disables auto-close.
    #[serde(alias = "autoCloseDelay")]
    pub auto_close_delay_ms: u64,
    /// When `false` and `product_upsells` is non-empty, only products with a
    /// per-product entry start an upsell cycle.
    pub show_on_all_products: bool,
    /// Maximum number of products shown.
    pub max_upsell_products: usize,
    /// Product handles for the `Manual` strategy, in display order.
    #[serde(alias = "upsellProducts")]
    pub upsell_product_refs: Vec<String>,
    /// Candidate sourcing strategy.
    #[serde(alias = "recommendations")]
    pub recommendation_strategy: RecommendationStrategy,
    /// Collection handle for the `Collection` strategy.
    pub collection_handle: String,
    /// Drop candidates that are the product just added.
    pub exclude_current_product: bool,
    /// Animate modal transitions.
    #[serde(alias = "animations")]
    pub animations_enabled: bool,
    /// Per-product reference lists keyed by the added product's handle.
    /// Under `Manual`, a matching entry replaces `upsell_product_refs`.
    pub product_upsells: BTreeMap<String, Vec<String>>,
    /// Skip the upsell when the refreshed cart total exceeds this amount.
    pub max_cart_total_cents: Option<Cents>,
    /// Cart page the checkout control and the empty-upsell path navigate to.
    pub cart_url: String,
}

impl Default for UpsellConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            modal_delay_ms: 300,
            auto_close_delay_ms: 0,
            show_on_all_products: false,
            max_upsell_products: 4,
            upsell_product_refs: Vec::new(),
            recommendation_strategy: RecommendationStrategy::Manual,
            collection_handle: String::new(),
            exclude_current_product: true,
            animations_enabled: true,
            product_upsells: BTreeMap::new(),
            max_cart_total_cents: None,
            cart_url: "/cart".to_string(),
        }
    }
}

impl UpsellConfig {
    /// Parse a configuration object supplied by the host page.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotAnObject` for arrays and scalars, and
    /// `ConfigError::Json` for malformed input or a recognized key holding a
    /// value of the wrong type.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        if !value.is_object() {
            return Err(ConfigError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Delay before opening the modal after a form-initiated add.
    #[must_use]
    pub const fn modal_delay(&self) -> Duration {
        Duration::from_millis(self.modal_delay_ms)
    }

    /// Auto-close delay, or `None` when auto-close is disabled.
    #[must_use]
    pub const fn auto_close_delay(&self) -> Option<Duration> {
        if self.auto_close_delay_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.auto_close_delay_ms))
        }
    }

    /// Product references the `Manual` strategy fetches for this item.
    #[must_use]
    pub fn refs_for(&self, item: Option<&AddedItem>) -> &[String] {
        item.and_then(|item| item.handle.as_deref())
            .and_then(|handle| self.product_upsells.get(handle))
            .map_or(self.upsell_product_refs.as_slice(), Vec::as_slice)
    }

    /// Whether an add of this item starts an upsell cycle.
    #[must_use]
    pub fn applies_to(&self, item: &AddedItem) -> bool {
        if self.show_on_all_products || self.product_upsells.is_empty() {
            return true;
        }
        item.handle
            .as_deref()
            .is_some_and(|handle| self.product_upsells.contains_key(handle))
    }

    /// Whether a cart total is within the configured ceiling.
    #[must_use]
    pub fn allows_cart_total(&self, total: Cents) -> bool {
        self.max_cart_total_cents.is_none_or(|max| total <= max)
    }

    /// Inconsistent option combinations in this configuration.
    #[must_use]
    pub fn issues(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        match self.recommendation_strategy {
            RecommendationStrategy::Manual
                if self.upsell_product_refs.is_empty() && self.product_upsells.is_empty() =>
            {
                issues.push(ConfigIssue::ManualWithoutRefs);
            }
            RecommendationStrategy::Collection if self.collection_handle.trim().is_empty() => {
                issues.push(ConfigIssue::CollectionWithoutHandle);
            }
            _ => {}
        }
        if self.max_upsell_products == 0 {
            issues.push(ConfigIssue::ZeroProductCap);
        }
        issues
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item_with_handle(handle: &str) -> AddedItem {
        AddedItem::from_response(json!({"id": 1, "product_id": 2, "handle": handle})).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = UpsellConfig::from_json("{}").unwrap();
        assert_eq!(config, UpsellConfig::default());
        assert!(config.enabled);
        assert_eq!(config.modal_delay(), Duration::from_millis(300));
        assert_eq!(config.auto_close_delay(), None);
        assert_eq!(config.max_upsell_products, 4);
        assert!(config.exclude_current_product);
        assert_eq!(config.cart_url, "/cart");
    }

    #[test]
    fn test_canonical_names() {
        let config = UpsellConfig::from_json(
            r#"{
                "modalDelayMs": 500,
                "autoCloseDelayMs": 8000,
                "maxUpsellProducts": 2,
                "upsellProductRefs": ["belt", "wallet"],
                "recommendationStrategy": "collection",
                "collectionHandle": "best-sellers",
                "excludeCurrentProduct": false,
                "animationsEnabled": false
            }"#,
        )
        .unwrap();

        assert_eq!(config.modal_delay_ms, 500);
        assert_eq!(config.auto_close_delay(), Some(Duration::from_secs(8)));
        assert_eq!(config.max_upsell_products, 2);
        assert_eq!(config.upsell_product_refs, vec!["belt", "wallet"]);
        assert_eq!(
            config.recommendation_strategy,
            RecommendationStrategy::Collection
        );
        assert_eq!(config.collection_handle, "best-sellers");
        assert!(!config.exclude_current_product);
        assert!(!config.animations_enabled);
    }

    #[test]
    fn test_short_names() {
        let config = UpsellConfig::from_json(
            r#"{
                "enabled": true,
                "modalDelay": 400,
                "autoCloseDelay": 0,
                "recommendations": "related",
                "upsellProducts": ["a"],
                "animations": false,
                "someThemeOption": 12
            }"#,
        )
        .unwrap();

        assert_eq!(config.modal_delay_ms, 400);
        assert_eq!(config.recommendation_strategy, RecommendationStrategy::Related);
        assert_eq!(config.upsell_product_refs, vec!["a"]);
        assert!(!config.animations_enabled);
    }

    #[test]
    fn test_invalid_config() {
        for input in ["[]", "[false]", "null", r#""manual""#, "4"] {
            assert!(
                matches!(UpsellConfig::from_json(input), Err(ConfigError::NotAnObject)),
                "{input} accepted"
            );
        }
        assert!(matches!(
            UpsellConfig::from_json("{"),
            Err(ConfigError::Json(_))
        ));
        assert!(UpsellConfig::from_json(r#"{"recommendations": "ai"}"#).is_err());
        assert!(UpsellConfig::from_json(r#"{"modalDelay": "soon"}"#).is_err());
    }

    #[test]
    fn test_issues() {
        let config = UpsellConfig::default();
        assert_eq!(config.issues(), vec![ConfigIssue::ManualWithoutRefs]);

        let config = UpsellConfig {
            recommendation_strategy: RecommendationStrategy::Collection,
            max_upsell_products: 0,
            ..UpsellConfig::default()
        };
        assert_eq!(
            config.issues(),
            vec![
                ConfigIssue::CollectionWithoutHandle,
                ConfigIssue::ZeroProductCap
            ]
        );

        let config = UpsellConfig {
            recommendation_strategy: RecommendationStrategy::Related,
            ..UpsellConfig::default()
        };
        assert!(config.issues().is_empty());
    }

    #[test]
    fn test_per_product_refs() {
        let config = UpsellConfig::from_json(
            r#"{
                "upsellProducts": ["gift-card"],
                "productUpsells": {"leather-jacket": ["belt", "wallet", "boots"]}
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.refs_for(Some(&item_with_handle("leather-jacket"))),
            ["belt", "wallet", "boots"]
        );
        assert_eq!(
            config.refs_for(Some(&item_with_handle("camera"))),
            ["gift-card"]
        );
        assert_eq!(config.refs_for(None), ["gift-card"]);
    }

    #[test]
    fn test_applies_to() {
        let everything = UpsellConfig::default();
        assert!(everything.applies_to(&item_with_handle("anything")));

        let mut mapped = UpsellConfig::default();
        mapped
            .product_upsells
            .insert("camera".to_string(), vec!["tripod".to_string()]);
        assert!(mapped.applies_to(&item_with_handle("camera")));
        assert!(!mapped.applies_to(&item_with_handle("socks")));

        mapped.show_on_all_products = true;
        assert!(mapped.applies_to(&item_with_handle("socks")));
    }

    #[test]
    fn test_cart_total_ceiling() {
        let config = UpsellConfig::from_json(r#"{"maxCartTotalCents": 10000}"#).unwrap();
        assert!(config.allows_cart_total(Cents::new(10_000)));
        assert!(!config.allows_cart_total(Cents::new(10_001)));
        assert!(UpsellConfig::default().allows_cart_total(Cents::new(u64::MAX)));
    }
}
