//! The upsell widget: wires interception, sourcing, selection, rendering and
//! cart sync to one page surface.
//!
//! # Lifecycle
//!
//! [`UpsellWidget::install`] mounts the hidden modal and registers the
//! cart-add hook on the storefront client. The returned [`EventLoop`] turns
//! [`PageEvent`]s into handler tasks until [`UpsellWidget::teardown`], or
//! until [`UpsellWidget::finish_events`] once the queue and running handlers
//! have drained.
//!
//! # Concurrency
//!
//! Handlers run as separate tasks and interleave at network and timer
//! awaits. All shared state sits behind one `std::sync::Mutex` that is never
//! held across an await; the modal controller's in-flight guard and cycle
//! generation decide which of several overlapping handlers gets to open the
//! modal.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, info, info_span, instrument, warn};
use uuid::Uuid;

use cart_upsell_core::{AddedItem, UpsellConfig, VariantId, select_upsells};

use crate::cart_sync::sync_cart;
use crate::error::{self, add_breadcrumb};
use crate::interceptor::{CartAddHook, FormSubmission, SubmitOutcome};
use crate::modal::{ModalController, ModalState};
use crate::page::{ModalControl, Page, PageEvent};
use crate::render::{AddControl, CONTROL_REVERT_DELAY, render_grid, render_modal};
use crate::source::load_candidates;
use crate::storefront::{HookId, StorefrontClient};

/// Key that closes an open modal.
const ESCAPE_KEY: &str = "Escape";

/// Result of an [`UpsellWidget::open`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The modal is now showing.
    Opened,
    /// Already open, or another open is loading products.
    Skipped,
    /// No eligible products; navigated to the cart page instead.
    NavigatedToCart,
    /// The widget is torn down or the modal surface is missing.
    Unavailable,
    /// A close happened while products were loading.
    Discarded,
    /// The grid could not be rendered.
    Failed,
}

/// Handle to an installed upsell widget.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct UpsellWidget {
    inner: Arc<WidgetInner>,
}

struct WidgetInner {
    config: UpsellConfig,
    storefront: StorefrontClient,
    page: Arc<dyn Page>,
    events: mpsc::UnboundedSender<PageEvent>,
    state: Mutex<WidgetState>,
    shutdown: Notify,
    drain: Notify,
}

#[derive(Default)]
struct WidgetState {
    modal: ModalController,
    /// Item from the most recent add; replaced on every add.
    current_item: Option<AddedItem>,
    /// Add controls with a request in flight or a label still showing.
    busy_controls: HashSet<VariantId>,
    hook: Option<HookId>,
    active: bool,
}

/// Dispatches page events to the widget until teardown.
pub struct EventLoop {
    widget: UpsellWidget,
    events: mpsc::UnboundedReceiver<PageEvent>,
}

impl UpsellWidget {
    /// Install the widget on a page.
    ///
    /// A disabled configuration installs nothing: no modal, no hook, and the
    /// widget ignores every event. Inconsistent configurations are logged and
    /// installed as-is.
    #[must_use]
    pub fn install(
        config: UpsellConfig,
        storefront: StorefrontClient,
        page: Arc<dyn Page>,
    ) -> (Self, EventLoop) {
        let (tx, rx) = mpsc::unbounded_channel();

        for issue in config.issues() {
            warn!(issue = %issue, "Upsell configuration issue");
        }

        let mut state = WidgetState::default();
        if config.enabled {
            match render_modal() {
                Ok(chrome) => page.mount_modal(&chrome),
                Err(e) => error::report(&e, "Failed to render upsell modal"),
            }
            let hook = storefront
                .hooks()
                .register(Arc::new(CartAddHook::new(tx.clone())));
            state.hook = Some(hook);
            state.active = true;
            info!(
                strategy = ?config.recommendation_strategy,
                max_products = config.max_upsell_products,
                "Upsell widget installed"
            );
        } else {
            info!("Upsell widget disabled");
        }

        let widget = Self {
            inner: Arc::new(WidgetInner {
                config,
                storefront,
                page,
                events: tx,
                state: Mutex::new(state),
                shutdown: Notify::new(),
                drain: Notify::new(),
            }),
        };
        let event_loop = EventLoop {
            widget: widget.clone(),
            events: rx,
        };
        (widget, event_loop)
    }

    fn lock(&self) -> MutexGuard<'_, WidgetState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The configuration the widget was installed with.
    #[must_use]
    pub fn config(&self) -> &UpsellConfig {
        &self.inner.config
    }

    /// Sender for page events; events are handled by the [`EventLoop`].
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<PageEvent> {
        self.inner.events.clone()
    }

    /// Whether the widget is installed and not torn down.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Current modal state.
    #[must_use]
    pub fn modal_state(&self) -> ModalState {
        self.lock().modal.state()
    }

    /// Item from the most recent add.
    #[must_use]
    pub fn current_item(&self) -> Option<AddedItem> {
        self.lock().current_item.clone()
    }

    /// Whether the page must suppress this form's default submission.
    #[must_use]
    pub fn intercepts(&self, form: &FormSubmission) -> bool {
        self.is_active() && form.is_cart_add()
    }

    /// Handle one page event.
    pub async fn handle_event(&self, event: PageEvent) {
        if !self.is_active() {
            debug!(?event, "Ignoring event after teardown");
            return;
        }
        match event {
            PageEvent::FormSubmit(form) => {
                self.submit_form(form).await;
            }
            PageEvent::Click { control } => match control {
                ModalControl::Close | ModalControl::Overlay | ModalControl::Continue => {
                    self.close();
                }
                ModalControl::Checkout => self.go_to_cart(),
            },
            PageEvent::UpsellAdd { variant_id } => self.add_upsell(variant_id).await,
            PageEvent::KeyDown { key } => {
                if key == ESCAPE_KEY && self.modal_state() == ModalState::Open {
                    self.close();
                }
            }
            PageEvent::NetworkItemAdded(item) => self.item_added(item, Duration::ZERO).await,
        }
    }

    /// Handle a form submission.
    ///
    /// Cart-add forms are posted by the widget itself; a successful add
    /// starts an upsell cycle after the configured modal delay.
    #[instrument(skip_all, fields(action = ?form.action))]
    pub async fn submit_form(&self, form: FormSubmission) -> SubmitOutcome {
        if !self.intercepts(&form) {
            return SubmitOutcome::PassThrough;
        }

        add_breadcrumb("cart", "Intercepted add-to-cart form", None);
        match self.inner.storefront.add_to_cart_form(form.fields).await {
            Ok(item) => self.item_added(item, self.inner.config.modal_delay()).await,
            Err(e) => error::report(&e, "Add-to-cart submission failed"),
        }
        SubmitOutcome::Intercepted
    }

    /// Record an added item, refresh the cart and open the modal after
    /// `delay`.
    #[instrument(skip_all, fields(variant_id = %item.variant_id))]
    pub async fn item_added(&self, item: AddedItem, delay: Duration) {
        let applies = self.inner.config.applies_to(&item);
        {
            let mut state = self.lock();
            if !state.active {
                return;
            }
            state.current_item = Some(item);
        }

        let summary = sync_cart(&self.inner.storefront, self.inner.page.as_ref()).await;

        if !applies {
            debug!("Added product has no upsell mapping");
            return;
        }
        if let Some(summary) = summary
            && !self.inner.config.allows_cart_total(summary.total_price_cents)
        {
            info!(
                total = %summary.total_price_cents.display(),
                "Cart total above upsell ceiling"
            );
            return;
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.open().await;
    }

    /// Load, select and show upsell products for the current item.
    ///
    /// No-op while the modal is open or another open is loading. With zero
    /// eligible products the modal stays closed and the page navigates to
    /// the cart instead.
    pub async fn open(&self) -> OpenOutcome {
        let cycle_id = Uuid::new_v4();
        self.open_cycle()
            .instrument(info_span!("upsell_cycle", %cycle_id))
            .await
    }

    async fn open_cycle(&self) -> OpenOutcome {
        let (ticket, item) = {
            let mut state = self.lock();
            if !state.active || !self.inner.page.has_modal() {
                return OpenOutcome::Unavailable;
            }
            let Some(ticket) = state.modal.begin_open() else {
                debug!("Upsell modal already open or loading");
                return OpenOutcome::Skipped;
            };
            (ticket, state.current_item.clone())
        };

        let config = &self.inner.config;
        let candidates = load_candidates(&self.inner.storefront, item.as_ref(), config).await;
        let selected = select_upsells(candidates, item.as_ref(), config);

        let grid = if selected.is_empty() {
            None
        } else {
            match render_grid(&selected) {
                Ok(grid) => Some(grid),
                Err(e) => {
                    error::report(&e, "Failed to render upsell grid");
                    self.lock().modal.abandon(ticket);
                    return OpenOutcome::Failed;
                }
            }
        };

        let mut state = self.lock();
        if !state.active || !state.modal.is_current(ticket) {
            state.modal.abandon(ticket);
            debug!("Modal closed while loading; discarding products");
            return OpenOutcome::Discarded;
        }

        let Some(grid) = grid else {
            state.modal.abandon(ticket);
            drop(state);
            info!("No eligible upsell products; going to cart");
            self.inner.page.navigate(&config.cart_url);
            return OpenOutcome::NavigatedToCart;
        };

        let page = &self.inner.page;
        page.populate_grid(&grid);
        page.set_modal_visible(true, config.animations_enabled);
        state.modal.finish_open(ticket);

        if let Some(delay) = config.auto_close_delay() {
            let widget = self.clone();
            let generation = state.modal.generation();
            let timer = tokio::time::sleep(delay);
            state.modal.arm_auto_close(tokio::spawn(async move {
                timer.await;
                debug!("Auto-closing upsell modal");
                widget.close_generation(generation);
            }));
        }
        drop(state);

        let count = grid.cards.len().to_string();
        add_breadcrumb("upsell", "Opened upsell modal", Some(&[("products", &count)]));
        info!(products = grid.cards.len(), "Upsell modal opened");
        OpenOutcome::Opened
    }

    /// Close the modal. Returns whether it was open.
    ///
    /// Also invalidates any open that is still loading products.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        self.close_locked(&mut state)
    }

    fn close_generation(&self, generation: u64) {
        let mut state = self.lock();
        if state.modal.generation() == generation {
            self.close_locked(&mut state);
        }
    }

    fn close_locked(&self, state: &mut WidgetState) -> bool {
        let was_open = state.modal.close();
        if was_open {
            self.inner
                .page
                .set_modal_visible(false, self.inner.config.animations_enabled);
            debug!("Upsell modal closed");
        }
        was_open
    }

    /// Close the modal and navigate to the cart page.
    pub fn go_to_cart(&self) {
        self.close();
        self.inner.page.navigate(&self.inner.config.cart_url);
    }

    /// Add one unit of an upsell variant from its card's control.
    ///
    /// Activations of a control that is still busy are ignored.
    #[instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn add_upsell(&self, variant_id: VariantId) {
        {
            let mut state = self.lock();
            if !state.active || !state.busy_controls.insert(variant_id) {
                debug!("Add control busy; ignoring activation");
                return;
            }
        }

        let page = &self.inner.page;
        page.set_add_control(variant_id, &AddControl::working());
        let variant = variant_id.to_string();
        add_breadcrumb("upsell", "Adding upsell product", Some(&[("variant_id", &variant)]));

        match self.inner.storefront.add_variant(variant_id, 1).await {
            Ok(_) => {
                page.set_add_control(variant_id, &AddControl::done());
                info!("Upsell product added");
                sync_cart(&self.inner.storefront, page.as_ref()).await;
            }
            Err(e) => {
                page.set_add_control(variant_id, &AddControl::failed());
                error::report(&e, "Failed to add upsell product");
            }
        }

        let widget = self.clone();
        let revert = tokio::time::sleep(CONTROL_REVERT_DELAY);
        tokio::spawn(async move {
            revert.await;
            widget.lock().busy_controls.remove(&variant_id);
            widget
                .inner
                .page
                .set_add_control(variant_id, &AddControl::idle());
        });
    }

    /// Remove the modal, stop intercepting and stop the event loop.
    ///
    /// Idempotent.
    pub fn teardown(&self) {
        let hook = {
            let mut state = self.lock();
            state.active = false;
            state.modal.close();
            state.busy_controls.clear();
            state.hook.take()
        };

        if let Some(hook) = hook {
            self.inner.storefront.hooks().unregister(hook);
        }
        self.inner.page.remove_modal();
        self.inner.shutdown.notify_one();
        info!("Upsell widget torn down");
    }

    /// Stop the event loop once every queued event has been handled.
    ///
    /// Events already in the channel are dispatched and running handlers are
    /// awaited before [`EventLoop::run`] returns. Events sent afterwards are
    /// dropped. The widget stays installed; call [`Self::teardown`] after the
    /// loop has finished.
    pub fn finish_events(&self) {
        self.inner.drain.notify_one();
    }
}

impl EventLoop {
    /// Dispatch events until teardown or until [`UpsellWidget::finish_events`].
    ///
    /// Each event is handled on its own task so a slow handler never blocks
    /// the next event. Teardown stops the loop immediately and aborts running
    /// handlers.
    pub async fn run(mut self) {
        let inner = Arc::clone(&self.widget.inner);
        let mut handlers = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                () = inner.shutdown.notified() => break,
                () = inner.drain.notified() => {
                    self.drain(&mut handlers).await;
                    break;
                }
                Some(result) = handlers.join_next() => log_handler_exit(result),
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    self.dispatch(&mut handlers, event);
                }
            }
        }
        debug!(aborted = handlers.len(), "Upsell event loop stopped");
    }

    fn dispatch(&self, handlers: &mut JoinSet<()>, event: PageEvent) {
        let widget = self.widget.clone();
        handlers.spawn(async move { widget.handle_event(event).await });
    }

    /// Handle what is already queued, then wait for every handler.
    async fn drain(&mut self, handlers: &mut JoinSet<()>) {
        self.events.close();
        let inner = Arc::clone(&self.widget.inner);
        loop {
            while let Ok(event) = self.events.try_recv() {
                self.dispatch(handlers, event);
            }
            tokio::select! {
                biased;
                () = inner.shutdown.notified() => return,
                next = handlers.join_next() => {
                    let Some(result) = next else { break };
                    log_handler_exit(result);
                }
            }
        }
        debug!("Upsell event queue drained");
    }
}

fn log_handler_exit(result: Result<(), JoinError>) {
    if let Err(e) = result
        && e.is_panic()
    {
        tracing::error!(error = %e, "Page event handler panicked");
    }
}
