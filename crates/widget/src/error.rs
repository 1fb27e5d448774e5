//! Error reporting with Sentry integration.
//!
//! Nothing on the upsell pipeline is fatal to the host page. Failures are
//! swallowed at the pipeline boundary through [`report`], which logs them and
//! captures the ones worth investigating (storefront outages, malformed
//! payloads, template failures) to Sentry. Rejected requests (sold out,
//! unknown handle, rate limiting) are logged as warnings only.

use crate::render::RenderError;
use crate::storefront::StorefrontError;

/// A pipeline failure that can be reported.
pub trait Reportable: std::error::Error + 'static {
    /// Whether the failure should be captured to Sentry.
    fn is_capturable(&self) -> bool;
}

impl Reportable for StorefrontError {
    fn is_capturable(&self) -> bool {
        self.is_server_side()
    }
}

impl Reportable for RenderError {
    fn is_capturable(&self) -> bool {
        true
    }
}

/// Log a recovered failure and capture it to Sentry if capturable.
pub fn report<E: Reportable>(err: &E, context: &str) {
    if err.is_capturable() {
        let event_id = sentry::capture_error(err);
        tracing::error!(
            error = %err,
            sentry_event_id = %event_id,
            "{context}"
        );
    } else {
        tracing::warn!(error = %err, "{context}");
    }
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("upsell", "Added upsell product", Some(&[("variant_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
