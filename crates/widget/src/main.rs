//! Cart upsell host binary.
//!
//! Runs the upsell widget against a headless page surface. Page events are
//! read from stdin as JSON lines:
//!
//! ```text
//! {"type": "form_submit", "action": "/cart/add", "fields": [["id", "39001"]]}
//! {"type": "click", "control": "overlay"}
//! {"type": "upsell_add", "variant_id": 41002}
//! {"type": "key_down", "key": "Escape"}
//! ```
//!
//! A line of the form `{"fetch": {"method": "POST", "path": "/cart/add.js",
//! "json": {...}}}` stands in for page code calling the storefront directly;
//! it goes through the same hook chain the widget watches.
//!
//! On end of input the widget finishes queued events and running handlers
//! before it is torn down. Ctrl+C or SIGTERM tears it down immediately.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use cart_upsell::config::AppConfig;
use cart_upsell::error;
use cart_upsell::page::{HeadlessPage, PageEvent};
use cart_upsell::storefront::{OutgoingRequest, RequestBody, RequestOrigin, StorefrontClient};
use cart_upsell::UpsellWidget;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One line of host input.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostInput {
    Fetch { fetch: HostFetch },
    Event(PageEvent),
}

/// A storefront request issued by page code.
#[derive(Debug, Deserialize)]
struct HostFetch {
    #[serde(default = "default_method")]
    method: String,
    path: String,
    #[serde(default)]
    json: Option<Value>,
    #[serde(default)]
    form: Option<Vec<(String, String)>>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &AppConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cart_upsell=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let storefront =
        StorefrontClient::new(&config.storefront).expect("Failed to create storefront client");
    tracing::info!(base_url = %storefront.base_url(), "Storefront client ready");

    let page = Arc::new(HeadlessPage::new());
    let (widget, events) = UpsellWidget::install(config.widget, storefront.clone(), page.clone());
    let mut event_loop = tokio::spawn(events.run());

    let input_finished = tokio::select! {
        () = read_page_events(&widget, &storefront) => true,
        () = shutdown_signal() => false,
    };

    let mut loop_finished = false;
    if input_finished {
        tracing::info!("Page event stream closed, finishing pending events");
        widget.finish_events();
        tokio::select! {
            result = &mut event_loop => {
                loop_finished = true;
                if let Err(e) = result {
                    tracing::error!(error = %e, "Event loop task failed");
                }
            }
            () = shutdown_signal() => {}
        }
    }

    let snapshot = page.snapshot();
    tracing::info!(
        modal_visible = snapshot.modal_visible,
        cart_count = ?snapshot.cart_count,
        broadcasts = snapshot.broadcasts.len(),
        navigations = ?snapshot.navigations,
        "Session finished"
    );

    widget.teardown();
    if !loop_finished && let Err(e) = event_loop.await {
        tracing::error!(error = %e, "Event loop task failed");
    }
}

/// Forward stdin lines to the widget until end of input.
///
/// Returns once every page fetch started from input has completed, so any
/// cart add they trigger is already queued.
async fn read_page_events(widget: &UpsellWidget, storefront: &StorefrontClient) {
    let mut fetches = JoinSet::new();
    forward_lines(widget, storefront, &mut fetches).await;
    while fetches.join_next().await.is_some() {}
}

async fn forward_lines(
    widget: &UpsellWidget,
    storefront: &StorefrontClient,
    fetches: &mut JoinSet<()>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let events = widget.sender();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read page events");
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<HostInput>(line) {
            Ok(HostInput::Fetch { fetch }) => {
                let storefront = storefront.clone();
                fetches.spawn(async move { host_fetch(&storefront, fetch).await });
            }
            Ok(HostInput::Event(event)) => {
                if let PageEvent::FormSubmit(form) = &event {
                    tracing::info!(
                        intercepted = widget.intercepts(form),
                        action = ?form.action,
                        "Form submitted"
                    );
                }
                if events.send(event).is_err() {
                    return;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed page event"),
        }
    }
}

/// Send a page-originated storefront request.
async fn host_fetch(storefront: &StorefrontClient, fetch: HostFetch) {
    let Ok(method) = Method::from_bytes(fetch.method.to_uppercase().as_bytes()) else {
        tracing::warn!(method = %fetch.method, "Ignoring fetch with invalid method");
        return;
    };
    let url = match storefront.endpoint(&fetch.path) {
        Ok(url) => url,
        Err(e) => {
            error::report(&e, "Ignoring fetch with invalid path");
            return;
        }
    };
    let body = match (fetch.json, fetch.form) {
        (Some(json), _) => Some(RequestBody::Json(json)),
        (None, Some(form)) => Some(RequestBody::Form(form)),
        (None, None) => None,
    };

    let request = OutgoingRequest {
        method,
        url,
        body,
        origin: RequestOrigin::Page,
    };
    match storefront.fetch(request).await {
        Ok(response) => {
            tracing::info!(status = %response.status, path = %fetch.path, "Page fetch completed");
        }
        Err(e) => error::report(&e, "Page fetch failed"),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, tearing down widget");
}
