//! Storefront AJAX API client.
//!
//! # Architecture
//!
//! - Plain HTTP + JSON against the storefront's AJAX endpoints via `reqwest`
//! - No caching: every upsell cycle sees fresh catalog data
//! - Every request, whether issued by the widget or by host page code through
//!   [`StorefrontClient::fetch`], passes through a [`HookChain`]
//!
//! # Endpoints
//!
//! - `POST /cart/add.js` - add a variant (form data or JSON)
//! - `GET /products/{handle}.js` - single product
//! - `GET /collections/{handle}/products.json` - collection listing
//! - `GET /recommendations/products.json` - related products
//! - `GET /cart.js` - cart summary
//!
//! # Example
//!
//! ```rust,ignore
//! use cart_upsell::storefront::StorefrontClient;
//!
//! let client = StorefrontClient::new(&config.storefront)?;
//!
//! let belt = client.product_by_handle("belt").await?;
//! let item = client.add_variant(belt.variants[0].id, 1).await?;
//! let cart = client.cart_summary().await?;
//! ```

mod hooks;

pub use hooks::{HookChain, HookId, RequestHook};

use std::sync::Arc;

use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use cart_upsell_core::{
    AddedItem, CandidateProduct, CartSummary, ProductId, ProductList, VariantId,
};

use crate::config::StorefrontConfig;

/// Path of the cart-add endpoint.
pub const CART_ADD_PATH: &str = "/cart/add.js";

/// Maximum number of response body characters kept in errors and logs.
const ERROR_BODY_LIMIT: usize = 200;

/// Errors that can occur when talking to the storefront.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The storefront answered with a non-success status.
    #[error("Storefront returned {status}: {body}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Truncated response body.
        body: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the storefront.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// An endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The cart-add response did not describe a line item.
    #[error("Cart add response did not contain a line item")]
    MissingItem,
}

impl StorefrontError {
    /// Whether the failure is on the storefront or transport side, as
    /// opposed to a rejected request (sold out, unknown handle).
    #[must_use]
    pub fn is_server_side(&self) -> bool {
        match self {
            Self::Http(_) | Self::Parse(_) => true,
            Self::Status { status, .. } => status.is_server_error(),
            Self::NotFound(_) | Self::RateLimited(_) | Self::InvalidUrl(_) | Self::MissingItem => {
                false
            }
        }
    }
}

/// Who issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    /// Host page code calling [`StorefrontClient::fetch`].
    Page,
    /// The upsell widget itself.
    Widget,
}

/// Request body encodings accepted by the storefront.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded`, fields in order.
    Form(Vec<(String, String)>),
    /// `application/json`.
    Json(Value),
}

/// A request about to be sent through the storefront client.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Request body, if any.
    pub body: Option<RequestBody>,
    /// Who issued the request.
    pub origin: RequestOrigin,
}

impl OutgoingRequest {
    /// A page-originated `GET`.
    #[must_use]
    pub const fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
            origin: RequestOrigin::Page,
        }
    }

    /// A page-originated form `POST`.
    #[must_use]
    pub const fn post_form(url: Url, fields: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            url,
            body: Some(RequestBody::Form(fields)),
            origin: RequestOrigin::Page,
        }
    }

    /// A page-originated JSON `POST`.
    #[must_use]
    pub const fn post_json(url: Url, body: Value) -> Self {
        Self {
            method: Method::POST,
            url,
            body: Some(RequestBody::Json(body)),
            origin: RequestOrigin::Page,
        }
    }

    /// Mark the request as issued by the widget.
    #[must_use]
    pub const fn by_widget(mut self) -> Self {
        self.origin = RequestOrigin::Widget;
        self
    }
}

/// A response whose body has been read into memory.
///
/// Hooks and the original caller share the same buffered body, so observing
/// a response never consumes it.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body as text.
    pub body: String,
}

impl BufferedResponse {
    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Seconds from a `Retry-After` header, defaulting to 1.
    fn retry_after(&self) -> u64 {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1)
    }

    fn truncated_body(&self) -> String {
        self.body.chars().take(ERROR_BODY_LIMIT).collect()
    }
}

// =============================================================================
// StorefrontClient
// =============================================================================

/// Client for the storefront AJAX API.
///
/// Cheap to clone; clones share the HTTP connection pool and hook chain.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    client: reqwest::Client,
    base_url: Url,
    hooks: HookChain,
}

impl StorefrontClient {
    /// Create a new storefront client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StorefrontConfig) -> Result<Self, StorefrontError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        // Endpoint paths are joined relative to the base, so a base with a
        // path prefix (e.g. a locale) must end in a slash to keep it.
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(StorefrontClientInner {
                client,
                base_url,
                hooks: HookChain::default(),
            }),
        })
    }

    /// The storefront base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The hook chain every request passes through.
    #[must_use]
    pub fn hooks(&self) -> &HookChain {
        &self.inner.hooks
    }

    /// Resolve a storefront path (`/cart.js`) against the base URL.
    ///
    /// # Errors
    ///
    /// Returns `StorefrontError::InvalidUrl` if the path cannot be joined.
    pub fn endpoint(&self, path: &str) -> Result<Url, StorefrontError> {
        Ok(self.inner.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Send a request through the hook chain and buffer the response.
    ///
    /// This is the generic network primitive offered to host page code. The
    /// response is returned whatever its status; only transport failures are
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns `StorefrontError::Http` if the request cannot be sent or the
    /// body cannot be read.
    #[instrument(
        skip(self, request),
        fields(method = %request.method, url = %request.url, origin = ?request.origin)
    )]
    pub async fn fetch(
        &self,
        request: OutgoingRequest,
    ) -> Result<BufferedResponse, StorefrontError> {
        self.inner.hooks.before_send(&request);

        let mut builder = self
            .inner
            .client
            .request(request.method.clone(), request.url.clone())
            .header(ACCEPT, "application/json");
        builder = match &request.body {
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Json(body)) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        debug!(status = %status, "Storefront response received");

        let response = BufferedResponse {
            status,
            headers,
            body,
        };
        self.inner.hooks.after_response(&request, &response);
        Ok(response)
    }

    /// Send a widget request and decode a successful JSON response.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: OutgoingRequest,
    ) -> Result<T, StorefrontError> {
        let url = request.url.clone();
        let response = self.fetch(request.by_widget()).await?;
        let status = response.status;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(StorefrontError::RateLimited(response.retry_after()));
        }

        if status == StatusCode::NOT_FOUND {
            return Err(StorefrontError::NotFound(url.path().to_string()));
        }

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                url = %url,
                body = %response.truncated_body(),
                "Storefront returned non-success status"
            );
            return Err(StorefrontError::Status {
                status,
                body: response.truncated_body(),
            });
        }

        response.json().map_err(|e| {
            tracing::error!(
                error = %e,
                url = %url,
                body = %response.truncated_body(),
                "Failed to parse storefront response"
            );
            StorefrontError::Parse(e)
        })
    }

    // =========================================================================
    // Cart Methods
    // =========================================================================

    /// Post a submitted add-to-cart form's fields to the cart-add endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the storefront rejects the add,
    /// or the response does not describe a line item.
    #[instrument(skip(self, fields), fields(field_count = fields.len()))]
    pub async fn add_to_cart_form(
        &self,
        fields: Vec<(String, String)>,
    ) -> Result<AddedItem, StorefrontError> {
        let url = self.endpoint(CART_ADD_PATH)?;
        let body: Value = self.send_json(OutgoingRequest::post_form(url, fields)).await?;
        AddedItem::from_response(body).ok_or(StorefrontError::MissingItem)
    }

    /// Add a quantity of one variant to the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the storefront rejects the add,
    /// or the response does not describe a line item.
    #[instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn add_variant(
        &self,
        variant_id: VariantId,
        quantity: u64,
    ) -> Result<AddedItem, StorefrontError> {
        let url = self.endpoint(CART_ADD_PATH)?;
        let body = serde_json::json!({ "id": variant_id, "quantity": quantity });
        let body: Value = self.send_json(OutgoingRequest::post_json(url, body)).await?;
        AddedItem::from_response(body).ok_or(StorefrontError::MissingItem)
    }

    /// Get the current cart summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    #[instrument(skip(self))]
    pub async fn cart_summary(&self) -> Result<CartSummary, StorefrontError> {
        let url = self.endpoint("/cart.js")?;
        self.send_json(OutgoingRequest::get(url)).await
    }

    // =========================================================================
    // Catalog Methods
    // =========================================================================

    /// Get a product by its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the request fails.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn product_by_handle(
        &self,
        handle: &str,
    ) -> Result<CandidateProduct, StorefrontError> {
        let url = self.endpoint(&format!("/products/{}.js", urlencoding::encode(handle)))?;
        self.send_json(OutgoingRequest::get(url)).await
    }

    /// List the products of a collection, in collection order.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection is not found or the request fails.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn collection_products(
        &self,
        handle: &str,
    ) -> Result<Vec<CandidateProduct>, StorefrontError> {
        let url = self.endpoint(&format!(
            "/collections/{}/products.json",
            urlencoding::encode(handle)
        ))?;
        let list: ProductList = self.send_json(OutgoingRequest::get(url)).await?;
        Ok(list.products)
    }

    /// Get products related to a product, in recommendation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn recommendations(
        &self,
        product_id: ProductId,
        limit: usize,
    ) -> Result<Vec<CandidateProduct>, StorefrontError> {
        let mut url = self.endpoint("/recommendations/products.json")?;
        url.query_pairs_mut()
            .append_pair("product_id", &product_id.to_string())
            .append_pair("limit", &limit.to_string());
        let list: ProductList = self.send_json(OutgoingRequest::get(url)).await?;
        Ok(list.products)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> StorefrontClient {
        StorefrontClient::new(&StorefrontConfig {
            base_url: Url::parse(&server.uri()).unwrap(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[derive(Default)]
    struct OriginRecorder(Mutex<Vec<(RequestOrigin, u16)>>);

    impl RequestHook for OriginRecorder {
        fn after_response(&self, request: &OutgoingRequest, response: &BufferedResponse) {
            self.0
                .lock()
                .unwrap()
                .push((request.origin, response.status.as_u16()));
        }
    }

    #[test]
    fn test_storefront_error_display() {
        let err = StorefrontError::NotFound("/products/belt.js".to_string());
        assert_eq!(err.to_string(), "Not found: /products/belt.js");

        let err = StorefrontError::RateLimited(30);
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
    }

    #[test]
    fn test_server_side_classification() {
        let err = StorefrontError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        assert!(err.is_server_side());

        let err = StorefrontError::Status {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: String::new(),
        };
        assert!(!err.is_server_side());
        assert!(!StorefrontError::MissingItem.is_server_side());
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = StorefrontClient::new(&StorefrontConfig {
            base_url: Url::parse("https://shop.example.com/fr").unwrap(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        assert_eq!(
            client.endpoint("/cart.js").unwrap().as_str(),
            "https://shop.example.com/fr/cart.js"
        );
    }

    #[tokio::test]
    async fn test_product_by_handle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/belt.js"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 11,
                "title": "Belt",
                "handle": "belt",
                "variants": [{"id": 111, "price": 2500, "compare_at_price": null}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let product = client_for(&server).product_by_handle("belt").await.unwrap();
        assert_eq!(product.id, ProductId::new(11));
        assert_eq!(product.title, "Belt");
    }

    #[tokio::test]
    async fn test_product_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/missing.js"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .product_by_handle("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, StorefrontError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cart.js"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .mount(&server)
            .await;

        let err = client_for(&server).cart_summary().await.unwrap_err();
        assert!(matches!(err, StorefrontError::RateLimited(12)));
    }

    #[tokio::test]
    async fn test_non_json_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cart.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).cart_summary().await.unwrap_err();
        assert!(matches!(err, StorefrontError::Parse(_)));
    }

    #[tokio::test]
    async fn test_add_variant_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cart/add.js"))
            .and(body_json(json!({"id": 222, "quantity": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 222,
                "product_id": 22,
                "quantity": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let item = client_for(&server)
            .add_variant(VariantId::new(222), 1)
            .await
            .unwrap();
        assert_eq!(item.product_id, Some(ProductId::new(22)));
    }

    #[tokio::test]
    async fn test_add_to_cart_form_posts_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cart/add.js"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("id=333"))
            .and(body_string_contains("quantity=2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 333,
                "product_id": 33,
                "quantity": 2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let item = client_for(&server)
            .add_to_cart_form(vec![
                ("id".to_string(), "333".to_string()),
                ("quantity".to_string(), "2".to_string()),
            ])
            .await
            .unwrap();
        assert_eq!(item.quantity, 2);
    }

    #[tokio::test]
    async fn test_add_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cart/add.js"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "status": 422,
                "message": "Cart Error",
                "description": "Sold out"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .add_variant(VariantId::new(1), 1)
            .await
            .unwrap_err();
        match err {
            StorefrontError::Status { status, body } => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert!(body.contains("Sold out"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recommendations_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recommendations/products.json"))
            .and(query_param("product_id", "42"))
            .and(query_param("limit", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"products": [
                {"id": 1, "title": "A", "variants": [{"id": 10, "price": "5.00"}]}
            ]})))
            .expect(1)
            .mount(&server)
            .await;

        let products = client_for(&server)
            .recommendations(ProductId::new(42), 4)
            .await
            .unwrap();
        assert_eq!(products.len(), 1);
    }

    #[tokio::test]
    async fn test_hooks_see_page_and_widget_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cart.js"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"item_count": 0, "total_price": 0})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let recorder = Arc::new(OriginRecorder::default());
        client.hooks().register(recorder.clone());

        let response = client
            .fetch(OutgoingRequest::get(client.endpoint("/cart.js").unwrap()))
            .await
            .unwrap();
        assert!(response.status.is_success());
        // The caller still gets the full body after the hooks ran.
        let value: Value = response.json().unwrap();
        assert_eq!(value["item_count"], 0);

        client.cart_summary().await.unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![(RequestOrigin::Page, 200), (RequestOrigin::Widget, 200)]
        );
    }
}
