//! Cart mutation results and the cart summary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::{ProductId, VariantId, id_from_value};
use super::price::Cents;

/// The line item reported by a successful cart-add call.
///
/// Owned by the upsell controller for one cycle and replaced, not merged, on
/// the next add.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddedItem {
    /// Variant that was added.
    pub variant_id: VariantId,
    /// Product the variant belongs to, when the payload carries one.
    pub product_id: Option<ProductId>,
    /// Quantity added.
    pub quantity: u64,
    /// Product handle, when the payload carries one.
    pub handle: Option<String>,
    /// Raw response payload.
    pub raw: Value,
}

impl AddedItem {
    /// Normalize a cart-add response body.
    ///
    /// Accepts a single line item (`{"id": ..., "product_id": ...}`) or the
    /// multi-item envelope (`{"items": [...]}`), in which case the first item
    /// is used. Returns `None` when no line item with an identifier is
    /// present, which is how error payloads (`{"status": 422, ...}`) look.
    #[must_use]
    pub fn from_response(raw: Value) -> Option<Self> {
        let line = match raw.get("items").and_then(Value::as_array) {
            Some(items) => items.first()?,
            None => &raw,
        };

        let id = id_from_value(line.get("id"))?;
        let variant_id = id_from_value(line.get("variant_id")).unwrap_or(id);
        let product_id = id_from_value(line.get("product_id")).map(ProductId::new);
        let quantity = line.get("quantity").and_then(Value::as_u64).unwrap_or(1);
        let handle = line
            .get("handle")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .map(String::from);

        Some(Self {
            variant_id: VariantId::new(variant_id),
            product_id,
            quantity,
            handle,
            raw,
        })
    }
}

/// Cart totals as reported by the cart-summary endpoint.
///
/// Broadcast to external listeners after every successful mutation and not
/// retained afterwards. Fields beyond the count and total are carried
/// verbatim so listeners receive the full payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartSummary {
    /// Total quantity of items in the cart.
    pub item_count: u64,
    /// Cart total.
    #[serde(rename = "total_price")]
    pub total_price_cents: Cents,
    /// Remaining payload fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
