/// Stripe REST client
///
/// Form-encoded requests with the secret key as basic-auth user, JSON
/// responses. Only the four calls the ledger needs are implemented.

use super::processor::{
    BillingProcessor, CheckoutRequest, CheckoutSession, NewCustomer, PortalSession,
    ProcessorCustomer, ProcessorSubscription,
};
use super::BillingError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, BillingError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BillingError::ExternalService(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            let message = serde_json::from_str::<StripeErrorResponse>(&body)
                .map(|e| e.error.message.unwrap_or(e.error.error_type))
                .unwrap_or_else(|_| status.to_string());
            return Err(BillingError::ExternalService(message));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Stripe response");
            BillingError::UnexpectedResponse(e.to_string())
        })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, BillingError> {
        let mut request = self
            .client
            .post(self.url(path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(params);

        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BillingError::ExternalService(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }
}

fn param(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

pub(crate) fn customer_params(customer: &NewCustomer<'_>) -> Vec<(String, String)> {
    let mut params = vec![
        param("email", customer.email),
        param("metadata[user_id]", customer.user_id.clone()),
    ];
    if let Some(name) = &customer.name {
        params.push(param("name", name.clone()));
    }
    params
}

pub(crate) fn checkout_params(request: &CheckoutRequest<'_>) -> Vec<(String, String)> {
    vec![
        param("customer", request.customer_id),
        param("mode", "subscription"),
        param("line_items[0][price]", request.price_id),
        param("line_items[0][quantity]", "1"),
        param("success_url", request.success_url),
        param("cancel_url", request.cancel_url),
        param("subscription_data[metadata][plan_id]", request.plan_id),
        param("metadata[user_id]", request.user_id.clone()),
        param("metadata[plan_id]", request.plan_id),
    ]
}

#[async_trait]
impl BillingProcessor for StripeClient {
    #[tracing::instrument(skip(self, customer), fields(user_id = %customer.user_id))]
    async fn create_customer(
        &self,
        customer: &NewCustomer<'_>,
    ) -> Result<ProcessorCustomer, BillingError> {
        self.post_form(
            "customers",
            &customer_params(customer),
            Some(&customer.idempotency_key),
        )
        .await
    }

    #[tracing::instrument(skip(self, request), fields(plan_id = %request.plan_id))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, BillingError> {
        self.post_form("checkout/sessions", &checkout_params(request), None)
            .await
    }

    #[tracing::instrument(skip(self, return_url))]
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        let params = vec![param("customer", customer_id), param("return_url", return_url)];
        self.post_form("billing_portal/sessions", &params, None).await
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProcessorSubscription, BillingError> {
        let response = self
            .client
            .get(self.url(&format!("subscriptions/{}", subscription_id)))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| BillingError::ExternalService(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }
}
