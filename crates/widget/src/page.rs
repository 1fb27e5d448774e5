//! The page surface the widget renders into, and the events it emits.
//!
//! The widget never touches markup directly. Everything visible goes through
//! the [`Page`] trait: the modal surface with its product grid and add
//! controls, the cart-count display, navigation, and the `cart:updated`
//! broadcast. User actions come back as [`PageEvent`]s.
//!
//! [`HeadlessPage`] keeps the surface in memory. The binary drives it from
//! stdin and the tests inspect it through [`HeadlessPage::snapshot`].

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use cart_upsell_core::{AddedItem, CartSummary, VariantId};

use crate::interceptor::FormSubmission;
use crate::render::{AddControl, ModalChrome, UpsellGrid};

/// Broadcast fired after every successful cart mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartUpdated {
    /// The refreshed cart summary.
    pub detail: CartSummary,
}

impl CartUpdated {
    /// Event name listeners subscribe to.
    pub const NAME: &'static str = "cart:updated";
}

/// Fixed controls of the modal chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalControl {
    /// The close (×) button.
    Close,
    /// The dimmed background behind the modal.
    Overlay,
    /// "Continue Shopping".
    Continue,
    /// "View Cart & Checkout".
    Checkout,
}

/// User-originated and intercepted events delivered to the widget.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEvent {
    /// A form was submitted.
    FormSubmit(FormSubmission),
    /// A modal control was activated.
    Click {
        /// Which control.
        control: ModalControl,
    },
    /// An upsell card's add control was activated.
    UpsellAdd {
        /// Variant bound to the control.
        variant_id: VariantId,
    },
    /// A key was pressed.
    KeyDown {
        /// Key name, e.g. `Escape`.
        key: String,
    },
    /// A cart-add call made by page code was observed on the network.
    #[serde(skip_deserializing)]
    NetworkItemAdded(AddedItem),
}

/// The surface the widget renders into.
///
/// Implementations must tolerate calls while the modal is not mounted by
/// ignoring them.
pub trait Page: Send + Sync {
    /// Insert the modal surface (hidden).
    fn mount_modal(&self, chrome: &ModalChrome);

    /// Remove the modal surface.
    fn remove_modal(&self);

    /// Whether the modal surface is present.
    fn has_modal(&self) -> bool;

    /// Replace the product grid contents.
    fn populate_grid(&self, grid: &UpsellGrid);

    /// Show or hide the modal.
    fn set_modal_visible(&self, visible: bool, animated: bool);

    /// Update one card's add control.
    fn set_add_control(&self, variant_id: VariantId, control: &AddControl);

    /// Update the cart-count display, if the page has one.
    fn set_cart_count(&self, count: u64);

    /// Navigate to another page.
    fn navigate(&self, url: &str);

    /// Publish a cart broadcast to external listeners.
    fn broadcast(&self, event: &CartUpdated);
}

// =============================================================================
// HeadlessPage
// =============================================================================

/// State of a [`HeadlessPage`] at a point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSnapshot {
    /// Modal markup, when mounted.
    pub modal_html: Option<String>,
    /// Whether the modal is showing.
    pub modal_visible: bool,
    /// Whether the last show/hide was animated.
    pub animated: bool,
    /// Current grid contents.
    pub grid: Option<UpsellGrid>,
    /// Add control state per bound variant.
    pub controls: BTreeMap<VariantId, AddControl>,
    /// Cart-count display value.
    pub cart_count: Option<u64>,
    /// Every navigation, in order.
    pub navigations: Vec<String>,
    /// Every broadcast, in order.
    pub broadcasts: Vec<CartUpdated>,
    /// Number of hidden → visible transitions.
    pub open_transitions: usize,
    /// Number of times the grid was populated.
    pub populate_passes: usize,
}

impl PageSnapshot {
    /// Whether the modal surface is mounted.
    #[must_use]
    pub const fn modal_mounted(&self) -> bool {
        self.modal_html.is_some()
    }
}

/// In-memory page surface.
#[derive(Debug, Default)]
pub struct HeadlessPage {
    state: Mutex<PageSnapshot>,
}

impl HeadlessPage {
    /// Create an empty page with no modal mounted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current page state.
    #[must_use]
    pub fn snapshot(&self) -> PageSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, PageSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Page for HeadlessPage {
    fn mount_modal(&self, chrome: &ModalChrome) {
        debug!("Mounting upsell modal");
        self.lock().modal_html = Some(chrome.html.clone());
    }

    fn remove_modal(&self) {
        debug!("Removing upsell modal");
        let mut state = self.lock();
        state.modal_html = None;
        state.modal_visible = false;
        state.grid = None;
        state.controls.clear();
    }

    fn has_modal(&self) -> bool {
        self.lock().modal_mounted()
    }

    fn populate_grid(&self, grid: &UpsellGrid) {
        let mut state = self.lock();
        if !state.modal_mounted() {
            return;
        }
        debug!(cards = grid.cards.len(), "Populating upsell grid");
        state.controls = grid
            .cards
            .iter()
            .map(|card| (card.variant_id, AddControl::idle()))
            .collect();
        state.grid = Some(grid.clone());
        state.populate_passes += 1;
    }

    fn set_modal_visible(&self, visible: bool, animated: bool) {
        let mut state = self.lock();
        if !state.modal_mounted() {
            return;
        }
        if visible && !state.modal_visible {
            state.open_transitions += 1;
        }
        debug!(visible, animated, "Setting upsell modal visibility");
        state.modal_visible = visible;
        state.animated = animated;
    }

    fn set_add_control(&self, variant_id: VariantId, control: &AddControl) {
        let mut state = self.lock();
        if let Some(existing) = state.controls.get_mut(&variant_id) {
            *existing = control.clone();
        }
    }

    fn set_cart_count(&self, count: u64) {
        self.lock().cart_count = Some(count);
    }

    fn navigate(&self, url: &str) {
        debug!(url, "Navigating");
        self.lock().navigations.push(url.to_string());
    }

    fn broadcast(&self, event: &CartUpdated) {
        debug!(
            event = CartUpdated::NAME,
            item_count = event.detail.item_count,
            "Broadcasting cart update"
        );
        self.lock().broadcasts.push(event.clone());
    }
}
