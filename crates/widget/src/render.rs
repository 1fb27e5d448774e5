//! Upsell card rendering and add-control states.
//!
//! Markup is produced with Askama templates (`templates/upsell/`), so product
//! titles and URLs from the catalog are HTML-escaped.

use std::time::Duration;

use askama::Template;
use thiserror::Error;

use cart_upsell_core::{CandidateProduct, ProductId, VariantId};

/// How long a "done" or "error" label stays before the control reverts.
pub const CONTROL_REVERT_DELAY: Duration = Duration::from_millis(2000);

const ADD_LABEL: &str = "Add to Cart";
const WORKING_LABEL: &str = "Adding...";
const DONE_LABEL: &str = "✓ Added";
const ERROR_LABEL: &str = "Error";

/// Template rendering failed.
#[derive(Debug, Error)]
#[error("Template error: {0}")]
pub struct RenderError(#[from] askama::Error);

/// Phase of a card's add control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPhase {
    /// Ready to add.
    Idle,
    /// Add request in flight.
    Working,
    /// Added; reverts after [`CONTROL_REVERT_DELAY`].
    Done,
    /// Add failed; reverts after [`CONTROL_REVERT_DELAY`].
    Failed,
}

/// Visible state of a card's add control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddControl {
    /// Current phase.
    pub phase: AddPhase,
    /// Button label.
    pub label: &'static str,
    /// Whether the control ignores activation.
    pub disabled: bool,
}

impl AddControl {
    /// Ready to add.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            phase: AddPhase::Idle,
            label: ADD_LABEL,
            disabled: false,
        }
    }

    /// Request in flight.
    #[must_use]
    pub const fn working() -> Self {
        Self {
            phase: AddPhase::Working,
            label: WORKING_LABEL,
            disabled: true,
        }
    }

    /// Added successfully.
    #[must_use]
    pub const fn done() -> Self {
        Self {
            phase: AddPhase::Done,
            label: DONE_LABEL,
            disabled: true,
        }
    }

    /// Add failed.
    #[must_use]
    pub const fn failed() -> Self {
        Self {
            phase: AddPhase::Failed,
            label: ERROR_LABEL,
            disabled: true,
        }
    }
}

/// Display data for one upsell card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCard {
    /// Product the card shows.
    pub product_id: ProductId,
    /// Variant the add control is bound to.
    pub variant_id: VariantId,
    /// Product title, escaped when rendered.
    pub title: String,
    /// Featured image; the card renders a placeholder when absent.
    pub image_url: Option<String>,
    /// Current price, formatted.
    pub price: String,
    /// Original price, formatted; only present when discounted.
    pub compare_at_price: Option<String>,
}

impl ProductCard {
    /// Build the card for a product, bound to its first variant.
    ///
    /// Returns `None` for a product without variants.
    #[must_use]
    pub fn from_product(product: &CandidateProduct) -> Option<Self> {
        let variant = product.primary_variant()?;
        Some(Self {
            product_id: product.id,
            variant_id: variant.id,
            title: product.title.clone(),
            image_url: product.featured_image_url.clone(),
            price: variant.price_cents.display(),
            compare_at_price: variant.discounted_from().map(|cents| cents.display()),
        })
    }
}

/// Rendered product grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsellGrid {
    /// Cards in display order.
    pub cards: Vec<ProductCard>,
    /// Grid markup.
    pub html: String,
}

/// Rendered modal chrome (everything except the grid contents).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalChrome {
    /// Modal markup with an empty grid container.
    pub html: String,
}

#[derive(Template)]
#[template(path = "upsell/grid.html")]
struct GridTemplate {
    cards: Vec<ProductCard>,
    add_label: &'static str,
}

#[derive(Template)]
#[template(path = "upsell/modal.html")]
struct ModalTemplate {
    heading: &'static str,
    subheading: &'static str,
    continue_label: &'static str,
    checkout_label: &'static str,
}

/// Render the grid for the selected products.
///
/// # Errors
///
/// Returns `RenderError` if the template fails to render.
pub fn render_grid(products: &[CandidateProduct]) -> Result<UpsellGrid, RenderError> {
    let cards: Vec<ProductCard> = products.iter().filter_map(ProductCard::from_product).collect();
    let html = GridTemplate {
        cards: cards.clone(),
        add_label: ADD_LABEL,
    }
    .render()?;
    Ok(UpsellGrid { cards, html })
}

/// Render the modal chrome.
///
/// # Errors
///
/// Returns `RenderError` if the template fails to render.
pub fn render_modal() -> Result<ModalChrome, RenderError> {
    let html = ModalTemplate {
        heading: "You might also like...",
        subheading: "Complete your purchase with these recommendations",
        continue_label: "Continue Shopping",
        checkout_label: "View Cart & Checkout",
    }
    .render()?;
    Ok(ModalChrome { html })
}
