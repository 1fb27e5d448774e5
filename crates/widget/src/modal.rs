//! Modal lifecycle state.
//!
//! The controller owns the open/closed state, the in-flight load guard, the
//! cycle generation and the auto-close timer. It never awaits; the widget
//! holds it behind a mutex and consults it before and after each network
//! step.

use tokio::task::JoinHandle;

/// Visual state of the modal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModalState {
    /// Hidden (initial).
    #[default]
    Closed,
    /// Showing the upsell grid.
    Open,
}

/// Permission to load products for one `open()` attempt.
///
/// Issued by [`ModalController::begin_open`] and handed back once the load
/// finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct OpenTicket {
    generation: u64,
}

/// Open/close state machine for one modal surface.
#[derive(Debug, Default)]
pub struct ModalController {
    state: ModalState,
    /// Generation of the load in flight, if any.
    loading: Option<u64>,
    /// Bumped on every close; loads from an older generation are stale.
    generation: u64,
    auto_close: Option<JoinHandle<()>>,
}

impl ModalController {
    /// Create a closed controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current visual state.
    #[must_use]
    pub const fn state(&self) -> ModalState {
        self.state
    }

    /// Whether the modal is showing.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, ModalState::Open)
    }

    /// Whether a product load is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    /// Current cycle generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Start an open attempt.
    ///
    /// Returns `None` if the modal is already open or another attempt is
    /// loading products.
    pub fn begin_open(&mut self) -> Option<OpenTicket> {
        if self.is_open() || self.loading.is_some() {
            return None;
        }
        self.loading = Some(self.generation);
        Some(OpenTicket {
            generation: self.generation,
        })
    }

    /// Whether no close happened since the ticket was issued.
    #[must_use]
    pub const fn is_current(&self, ticket: OpenTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Finish an open attempt by transitioning to `Open`.
    ///
    /// Returns `false` (and stays closed) if the ticket went stale.
    pub fn finish_open(&mut self, ticket: OpenTicket) -> bool {
        self.release(ticket);
        if !self.is_current(ticket) {
            return false;
        }
        self.state = ModalState::Open;
        true
    }

    /// Finish an open attempt without opening.
    pub fn abandon(&mut self, ticket: OpenTicket) {
        self.release(ticket);
    }

    fn release(&mut self, ticket: OpenTicket) {
        if self.loading == Some(ticket.generation) {
            self.loading = None;
        }
    }

    /// Close the modal and invalidate pending work.
    ///
    /// Bumps the generation and aborts the auto-close timer. Returns whether
    /// the modal was open.
    pub fn close(&mut self) -> bool {
        self.generation += 1;
        if let Some(timer) = self.auto_close.take() {
            timer.abort();
        }
        let was_open = self.is_open();
        self.state = ModalState::Closed;
        was_open
    }

    /// Store the auto-close timer for the current cycle, aborting any
    /// previous one.
    pub fn arm_auto_close(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.auto_close.replace(timer) {
            previous.abort();
        }
    }

    /// Whether an auto-close timer is pending.
    #[must_use]
    pub fn has_auto_close(&self) -> bool {
        self.auto_close.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close_cycle() {
        let mut modal = ModalController::new();
        assert_eq!(modal.state(), ModalState::Closed);

        let ticket = modal.begin_open().unwrap();
        assert!(modal.is_loading());
        assert!(modal.finish_open(ticket));
        assert!(modal.is_open());
        assert!(!modal.is_loading());

        assert!(modal.close());
        assert!(!modal.is_open());
        assert!(!modal.close());
    }

    #[test]
    fn test_open_is_guarded() {
        let mut modal = ModalController::new();
        let ticket = modal.begin_open().unwrap();
        assert!(modal.begin_open().is_none());

        assert!(modal.finish_open(ticket));
        assert!(modal.begin_open().is_none());
    }

    #[test]
    fn test_close_during_load_makes_ticket_stale() {
        let mut modal = ModalController::new();
        let ticket = modal.begin_open().unwrap();
        let generation = modal.generation();

        modal.close();
        assert!(modal.generation() > generation);
        assert!(!modal.is_current(ticket));

        // The in-flight load still blocks new attempts until it returns.
        assert!(modal.begin_open().is_none());
        assert!(!modal.finish_open(ticket));
        assert!(!modal.is_open());

        assert!(modal.begin_open().is_some());
    }

    #[test]
    fn test_abandon_releases_guard() {
        let mut modal = ModalController::new();
        let ticket = modal.begin_open().unwrap();
        modal.abandon(ticket);
        assert!(!modal.is_loading());
        assert!(!modal.is_open());
        assert!(modal.begin_open().is_some());
    }

    #[tokio::test]
    async fn test_close_aborts_auto_close() {
        let mut modal = ModalController::new();
        let ticket = modal.begin_open().unwrap();
        assert!(modal.finish_open(ticket));

        modal.arm_auto_close(tokio::spawn(std::future::pending()));
        assert!(modal.has_auto_close());

        modal.close();
        assert!(!modal.has_auto_close());
    }

    #[tokio::test]
    async fn test_rearming_replaces_timer() {
        let mut modal = ModalController::new();
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        modal.arm_auto_close(tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        }));
        modal.arm_auto_close(tokio::spawn(std::future::pending()));

        // The first timer's task is dropped, closing the channel.
        assert!(alive_rx.await.is_err());
        assert!(modal.has_auto_close());
    }
}
