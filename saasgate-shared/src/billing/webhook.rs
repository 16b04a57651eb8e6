/// Webhook reconciler
///
/// Verifies the processor's signature over the raw request body, parses the
/// event and applies it to the entitlement ledger.
///
/// # Signature
///
/// `Stripe-Signature: t=<unix seconds>,v1=<hex>[,v1=<hex>...]` where each
/// `v1` is HMAC-SHA256 over `"{t}." || body` keyed with the endpoint secret.
/// A timestamp further than [`SIGNATURE_TOLERANCE_SECS`] from now is rejected.
///
/// # Events
///
/// | Type                          | Handling                                          |
/// |-------------------------------|---------------------------------------------------|
/// | `checkout.session.completed`  | link ids to the user's row, fetch and apply subscription |
/// | `customer.subscription.*`     | find row by subscription id, then customer id; apply |
/// | anything else                 | acknowledged, ignored                             |
///
/// A missing local record is never an error: the event is acknowledged so the
/// processor stops retrying.

use super::ledger::EntitlementLedger;
use super::processor::{ExpandableId, ProcessorSubscription};
use super::BillingError;
use crate::models::subscription::Subscription;
use crate::models::user::User;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Maximum clock distance between the signature timestamp and now
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_EVENT_PREFIX: &str = "customer.subscription.";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Billing(#[from] BillingError),
}

impl From<sqlx::Error> for WebhookError {
    fn from(err: sqlx::Error) -> Self {
        WebhookError::Billing(BillingError::Database(err))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletedCheckout {
    customer: Option<ExpandableId>,
    subscription: Option<ExpandableId>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// What handling an event did
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Subscription state was applied
    Applied(Subscription),
    /// Processor ids were linked but there was no subscription to fetch
    Linked,
    /// No local record matches; acknowledged
    Unmatched,
    /// Event type is not handled; acknowledged
    Ignored,
}

/// Checks a signature header against the raw body
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    if secret.trim().is_empty() {
        return Err(WebhookError::InvalidSignature("no endpoint secret configured".into()));
    }

    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| WebhookError::InvalidSignature("missing timestamp".into()))?;
    let issued_at: i64 = timestamp
        .parse()
        .map_err(|_| WebhookError::InvalidSignature("malformed timestamp".into()))?;

    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature("no v1 signature".into()));
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if !matched {
        return Err(WebhookError::InvalidSignature("no matching signature".into()));
    }

    if (now - issued_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(WebhookError::InvalidSignature("timestamp outside tolerance".into()));
    }

    Ok(())
}

/// Computes a `Stripe-Signature` header value for `payload`
///
/// Used to sign test fixtures.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

#[derive(Clone)]
pub struct WebhookReconciler {
    ledger: EntitlementLedger,
    secret: String,
}

impl WebhookReconciler {
    pub fn new(ledger: EntitlementLedger, secret: impl Into<String>) -> Self {
        Self {
            ledger,
            secret: secret.into(),
        }
    }

    /// Verifies, parses and applies one webhook delivery
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let signature = signature
            .ok_or_else(|| WebhookError::InvalidSignature("missing signature header".into()))?;
        verify_signature(payload, signature, &self.secret, Utc::now().timestamp())?;

        let event = parse_event(payload)?;
        tracing::info!(event_id = ?event.id, event_type = %event.event_type, "Webhook received");

        self.dispatch(&event).await
    }

    /// Applies an already verified event
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
        if event.event_type == CHECKOUT_SESSION_COMPLETED {
            let checkout: CompletedCheckout = serde_json::from_value(event.data.object.clone())
                .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
            self.checkout_completed(checkout).await
        } else if event.event_type.starts_with(SUBSCRIPTION_EVENT_PREFIX) {
            let data: ProcessorSubscription = serde_json::from_value(event.data.object.clone())
                .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
            self.subscription_changed(data).await
        } else {
            tracing::debug!(event_type = %event.event_type, "Webhook event ignored");
            Ok(WebhookOutcome::Ignored)
        }
    }

    async fn checkout_completed(
        &self,
        checkout: CompletedCheckout,
    ) -> Result<WebhookOutcome, WebhookError> {
        let user_id = checkout
            .metadata
            .get("user_id")
            .and_then(|raw| Uuid::parse_str(raw).ok());

        let user = match user_id {
            Some(id) => User::find_by_id(self.ledger.db(), id).await?,
            None => None,
        };
        let Some(user) = user else {
            tracing::warn!(user_id = ?checkout.metadata.get("user_id"), "Checkout completed for unknown user");
            return Ok(WebhookOutcome::Unmatched);
        };

        let subscription = Subscription::get_or_create(self.ledger.db(), user.id).await?;
        let subscription = Subscription::link_processor_ids(
            self.ledger.db(),
            subscription.id,
            checkout.customer.as_ref().map(ExpandableId::id),
            checkout.subscription.as_ref().map(ExpandableId::id),
        )
        .await?;

        let Some(subscription_id) = subscription.stripe_subscription_id.clone() else {
            return Ok(WebhookOutcome::Linked);
        };

        let data = self
            .ledger
            .processor()
            .retrieve_subscription(&subscription_id)
            .await?;
        let applied = self.ledger.apply_subscription_data(&subscription, &data).await?;

        Ok(WebhookOutcome::Applied(applied))
    }

    async fn subscription_changed(
        &self,
        data: ProcessorSubscription,
    ) -> Result<WebhookOutcome, WebhookError> {
        let mut found = None;

        if let Some(id) = data.id.as_deref().filter(|id| !id.is_empty()) {
            found = Subscription::find_by_stripe_subscription_id(self.ledger.db(), id).await?;
        }
        if found.is_none() {
            if let Some(customer) = data.customer.as_ref() {
                found =
                    Subscription::find_by_stripe_customer_id(self.ledger.db(), customer.id())
                        .await?;
            }
        }

        let Some(subscription) = found else {
            tracing::info!(subscription_id = ?data.id, "Subscription event without local record");
            return Ok(WebhookOutcome::Unmatched);
        };

        let applied = self.ledger.apply_subscription_data(&subscription, &data).await?;
        Ok(WebhookOutcome::Applied(applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn test_signed_payload_verifies() {
        let payload = br#"{"type":"ping","data":{"object":{}}}"#;
        let now = 1_700_000_000;
        let header = sign_payload(payload, SECRET, now);

        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
        assert!(verify_signature(payload, &header, SECRET, now + 299).is_ok());
    }

    #[test]
    fn test_modified_body_rejected() {
        let now = 1_700_000_000;
        let header = sign_payload(b"{\"a\":1}", SECRET, now);

        assert!(matches!(
            verify_signature(b"{\"a\":2}", &header, SECRET, now),
            Err(WebhookError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let now = 1_700_000_000;
        let header = sign_payload(b"{}", "whsec_other", now);
        assert!(verify_signature(b"{}", &header, SECRET, now).is_err());
    }

    #[test]
    fn test_empty_secret_rejects_everything() {
        let now = 1_700_000_000;
        let payload = br#"{"type":"customer.subscription.updated","data":{"object":{}}}"#;

        for secret in ["", "  "] {
            let header = sign_payload(payload, secret, now);
            assert!(matches!(
                verify_signature(payload, &header, secret, now),
                Err(WebhookError::InvalidSignature(_))
            ));
        }
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let signed_at = 1_700_000_000;
        let header = sign_payload(b"{}", SECRET, signed_at);
        assert!(verify_signature(b"{}", &header, SECRET, signed_at + 301).is_err());
    }

    #[test]
    fn test_any_v1_candidate_may_match() {
        let now = 1_700_000_000;
        let good = sign_payload(b"{}", SECRET, now);
        let good_sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t={},v1={},v1={}", now, "00".repeat(32), good_sig);

        assert!(verify_signature(b"{}", &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        for header in ["", "t=abc,v1=00", "v1=00", "t=1700000000", "t=1700000000,v1=zz"] {
            assert!(
                matches!(
                    verify_signature(b"{}", header, SECRET, 1_700_000_000),
                    Err(WebhookError::InvalidSignature(_))
                ),
                "{header}"
            );
        }
    }

    #[test]
    fn test_parse_event() {
        let event = parse_event(
            br#"{"id":"evt_1","type":"customer.subscription.updated","data":{"object":{"id":"sub_1"}}}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, "customer.subscription.updated");
        assert_eq!(event.data.object["id"], "sub_1");

        assert!(matches!(parse_event(b"not json"), Err(WebhookError::InvalidPayload(_))));
        assert!(matches!(parse_event(b"{\"id\":\"evt\"}"), Err(WebhookError::InvalidPayload(_))));
    }
}
