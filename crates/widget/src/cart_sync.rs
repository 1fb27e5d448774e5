//! Cart summary refresh after a mutation.

use tracing::{debug, instrument};

use cart_upsell_core::CartSummary;

use crate::error;
use crate::page::{CartUpdated, Page};
use crate::storefront::StorefrontClient;

/// Refresh the cart summary, broadcast it and update the cart-count display.
///
/// Returns the summary, or `None` if it could not be fetched (logged, not
/// broadcast).
#[instrument(skip_all)]
pub async fn sync_cart(storefront: &StorefrontClient, page: &dyn Page) -> Option<CartSummary> {
    match storefront.cart_summary().await {
        Ok(summary) => {
            debug!(
                item_count = summary.item_count,
                total = %summary.total_price_cents.display(),
                "Cart summary refreshed"
            );
            page.broadcast(&CartUpdated {
                detail: summary.clone(),
            });
            page.set_cart_count(summary.item_count);
            Some(summary)
        }
        Err(e) => {
            error::report(&e, "Failed to refresh cart summary");
            None
        }
    }
}
