//! End-to-end test harness for the cart upsell widget.
//!
//! Each [`TestShop`] pairs a `wiremock` storefront with a widget installed on
//! a [`HeadlessPage`]. Scenarios live in `tests/`.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cart-upsell-integration-tests
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cart_upsell::config::StorefrontConfig;
use cart_upsell::page::HeadlessPage;
use cart_upsell::storefront::{CART_ADD_PATH, OutgoingRequest, StorefrontClient};
use cart_upsell::{EventLoop, UpsellWidget};
use cart_upsell_core::UpsellConfig;

/// How often [`wait_until`] re-checks its condition.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long [`wait_until`] waits before giving up.
const POLL_TIMEOUT: Duration = Duration::from_secs(3);

/// A mock storefront with a widget installed on a headless page.
pub struct TestShop {
    pub server: MockServer,
    pub storefront: StorefrontClient,
    pub page: Arc<HeadlessPage>,
    pub widget: UpsellWidget,
    events: Option<EventLoop>,
}

impl TestShop {
    /// Start a mock storefront and install a widget with `config`.
    ///
    /// # Panics
    ///
    /// Panics if the storefront client cannot be built.
    #[allow(clippy::unwrap_used)]
    pub async fn start(config: UpsellConfig) -> Self {
        let server = MockServer::start().await;
        let storefront = StorefrontClient::new(&StorefrontConfig {
            base_url: Url::parse(&server.uri()).unwrap(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let page = Arc::new(HeadlessPage::new());
        let (widget, events) = UpsellWidget::install(config, storefront.clone(), page.clone());

        Self {
            server,
            storefront,
            page,
            widget,
            events: Some(events),
        }
    }

    /// Start dispatching page events in the background.
    pub fn run_events(&mut self) {
        if let Some(events) = self.events.take() {
            tokio::spawn(events.run());
        }
    }

    /// Serve `/products/{handle}.js`.
    pub async fn product(&self, id: u64, handle: &str, price: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/products/{handle}.js")))
            .respond_with(ResponseTemplate::new(200).set_body_json(product_json(id, handle, price)))
            .mount(&self.server)
            .await;
    }

    /// Serve `/collections/{handle}/products.json`.
    pub async fn collection(&self, handle: &str, products: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(format!("/collections/{handle}/products.json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "products": products })))
            .mount(&self.server)
            .await;
    }

    /// Serve `/cart.js`.
    pub async fn cart(&self, item_count: u64, total_price: u64) {
        Mock::given(method("GET"))
            .and(path("/cart.js"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "item_count": item_count,
                "total_price": total_price,
                "currency": "USD"
            })))
            .mount(&self.server)
            .await;
    }

    /// Accept cart adds, answering with `line_item`.
    pub async fn cart_add(&self, line_item: Value) {
        Mock::given(method("POST"))
            .and(path(CART_ADD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(line_item))
            .mount(&self.server)
            .await;
    }

    /// Add to the cart the way page code would, through the storefront
    /// client's generic fetch.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    #[allow(clippy::unwrap_used)]
    pub async fn page_cart_add(&self, body: Value) {
        let url = self.storefront.endpoint(CART_ADD_PATH).unwrap();
        self.storefront
            .fetch(OutgoingRequest::post_json(url, body))
            .await
            .unwrap();
    }

    /// Number of requests the storefront received for `request_path`.
    pub async fn requests_to(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == request_path)
            .count()
    }
}

/// A storefront product payload with one variant (`id * 10`).
#[must_use]
pub fn product_json(id: u64, handle: &str, price: u64) -> Value {
    json!({
        "id": id,
        "title": format!("Product {handle}"),
        "handle": handle,
        "featured_image": format!("https://cdn.example.com/{handle}.jpg"),
        "variants": [{"id": id * 10, "price": price, "compare_at_price": null}]
    })
}

/// Poll `condition` until it holds or the timeout passes.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    condition()
}

/// Let spawned tasks woken by a paused-clock advance run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
