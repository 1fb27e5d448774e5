//! Add-to-cart detection.
//!
//! Two independent signals mean "an item was just added":
//! - a submitted form that targets the cart-add endpoint or carries a
//!   variant-id field (the widget performs the add itself), and
//! - a successful cart-add response observed on the network, whoever sent
//!   the request.
//!
//! Both end up as an [`AddedItem`] handed to the widget.

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use cart_upsell_core::AddedItem;

use crate::page::PageEvent;
use crate::storefront::{BufferedResponse, OutgoingRequest, RequestHook, RequestOrigin};

/// Name of the form field carrying the variant ID.
const VARIANT_FIELD: &str = "id";

/// A form submission reported by the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FormSubmission {
    /// The form's `action` attribute.
    #[serde(default)]
    pub action: Option<String>,
    /// Field name/value pairs in document order.
    #[serde(default)]
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    /// Whether this submission is an add-to-cart attempt.
    #[must_use]
    pub fn is_cart_add(&self) -> bool {
        self.action.as_deref().is_some_and(is_cart_add_target)
            || self.fields.iter().any(|(name, _)| name == VARIANT_FIELD)
    }
}

/// Whether the page should let a submission through or suppress it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Not an add-to-cart form; the page submits it normally.
    PassThrough,
    /// The widget performed the add; the page must suppress the submission.
    Intercepted,
}

/// Whether a form action or URL string targets the cart-add endpoint.
///
/// Accepts relative and absolute forms, with or without the `.js` suffix,
/// and with a locale prefix (`/fr/cart/add`).
#[must_use]
pub fn is_cart_add_target(target: &str) -> bool {
    let path = Url::parse(target).map_or_else(
        |_| {
            target
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string()
        },
        |url| url.path().to_string(),
    );
    is_cart_add_path(&path)
}

fn is_cart_add_path(path: &str) -> bool {
    let path = path.trim().trim_end_matches('/');
    let path = path.strip_prefix('/').unwrap_or(path);
    path == "cart/add"
        || path == "cart/add.js"
        || path.ends_with("/cart/add")
        || path.ends_with("/cart/add.js")
}

/// Request hook that turns page-originated cart adds into
/// [`PageEvent::NetworkItemAdded`].
///
/// Widget-originated requests are skipped; the widget handles its own adds
/// on their direct code path.
pub struct CartAddHook {
    events: mpsc::UnboundedSender<PageEvent>,
}

impl CartAddHook {
    /// Create a hook posting to the widget's event channel.
    #[must_use]
    pub const fn new(events: mpsc::UnboundedSender<PageEvent>) -> Self {
        Self { events }
    }
}

impl RequestHook for CartAddHook {
    fn after_response(&self, request: &OutgoingRequest, response: &BufferedResponse) {
        if request.origin != RequestOrigin::Page || !is_cart_add_path(request.url.path()) {
            return;
        }
        if !response.status.is_success() {
            debug!(status = %response.status, "Observed failed cart add");
            return;
        }

        let item = match response.json::<serde_json::Value>() {
            Ok(body) => AddedItem::from_response(body),
            Err(e) => {
                debug!(error = %e, "Observed cart add with non-JSON body");
                None
            }
        };

        if let Some(item) = item {
            debug!(variant_id = %item.variant_id, "Observed cart add on the network");
            if self.events.send(PageEvent::NetworkItemAdded(item)).is_err() {
                debug!("Upsell event loop is gone; dropping observed cart add");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use serde_json::json;

    fn form(action: Option<&str>, fields: &[(&str, &str)]) -> FormSubmission {
        FormSubmission {
            action: action.map(String::from),
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    fn url(path: &str) -> Url {
        Url::parse("https://shop.example.com").unwrap().join(path).unwrap()
    }

    fn response(status: u16, body: &str) -> BufferedResponse {
        BufferedResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_cart_add_targets() {
        assert!(is_cart_add_target("/cart/add"));
        assert!(is_cart_add_target("/cart/add.js"));
        assert!(is_cart_add_target("/cart/add/"));
        assert!(is_cart_add_target("/fr/cart/add"));
        assert!(is_cart_add_target("/cart/add?return_to=/checkout"));
        assert!(is_cart_add_target("https://shop.example.com/cart/add.js"));

        assert!(!is_cart_add_target("/cart"));
        assert!(!is_cart_add_target("/cart/change.js"));
        assert!(!is_cart_add_target("/contact"));
        assert!(!is_cart_add_target("/cart/address"));
    }

    #[test]
    fn test_form_detection() {
        assert!(form(Some("/cart/add"), &[]).is_cart_add());
        assert!(form(None, &[("id", "123"), ("quantity", "1")]).is_cart_add());
        assert!(form(Some("/products/belt"), &[("id", "123")]).is_cart_add());

        assert!(!form(Some("/contact"), &[("email", "a@b.c")]).is_cart_add());
        assert!(!form(None, &[]).is_cart_add());
    }

    #[test]
    fn test_hook_reports_page_cart_adds() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hook = CartAddHook::new(tx);

        let request = OutgoingRequest::post_json(url("/cart/add.js"), json!({"id": 5}));
        hook.after_response(&request, &response(200, r#"{"id": 5, "product_id": 50}"#));

        match rx.try_recv().unwrap() {
            PageEvent::NetworkItemAdded(item) => {
                assert_eq!(item.product_id, Some(cart_upsell_core::ProductId::new(50)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_hook_ignores_other_traffic() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hook = CartAddHook::new(tx);

        // Widget-originated add.
        let request =
            OutgoingRequest::post_json(url("/cart/add.js"), json!({"id": 5})).by_widget();
        hook.after_response(&request, &response(200, r#"{"id": 5}"#));

        // Other endpoint.
        let request = OutgoingRequest::get(url("/cart.js"));
        hook.after_response(&request, &response(200, r#"{"id": 5}"#));

        // Rejected add.
        let request = OutgoingRequest::post_json(url("/cart/add.js"), json!({"id": 5}));
        hook.after_response(
            &request,
            &response(422, r#"{"status": 422, "description": "Sold out"}"#),
        );

        // Non-JSON and id-less bodies.
        hook.after_response(&request, &response(200, "<html></html>"));
        hook.after_response(&request, &response(200, r#"{"ok": true}"#));

        assert!(rx.try_recv().is_err());
    }
}
