use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Config;

use super::error::{PaymentError, PaymentResult};

/// One purchased course inside a checkout.
#[derive(Debug, Clone)]
pub struct CheckoutItem {
    pub course_id: Uuid,
    pub name: String,
    pub unit_amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub customer_email: String,
    pub items: Vec<CheckoutItem>,
}

impl CheckoutRequest {
    /// `courseIds` metadata value read back by the webhook.
    pub fn course_ids_metadata(&self) -> String {
        self.items
            .iter()
            .map(|item| item.course_id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CheckoutSession {
    #[serde(rename = "session_id", alias = "id")]
    pub id: String,
    pub url: Option<String>,
}

/// Hosted checkout provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync + std::fmt::Debug {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> PaymentResult<CheckoutSession>;
}

/// Stripe Checkout over the REST API.
#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: Option<String>,
    public_url: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
}

impl StripeClient {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: Option<String>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key,
            public_url: public_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.stripe().api_base(),
            config.stripe().secret_key().map(str::to_string),
            config.app().public_url(),
        )
    }

    fn session_form(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let mut form = vec![
            (String::from("mode"), String::from("payment")),
            (
                String::from("success_url"),
                format!("{}/dashboard?checkout=success&session_id={{CHECKOUT_SESSION_ID}}", self.public_url),
            ),
            (
                String::from("cancel_url"),
                format!("{}/courses?checkout=cancelled", self.public_url),
            ),
            (String::from("customer_email"), request.customer_email.clone()),
            (String::from("metadata[userId]"), request.user_id.to_string()),
            (String::from("metadata[courseIds]"), request.course_ids_metadata()),
        ];

        for (i, item) in request.items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            form.push((format!("{prefix}[quantity]"), String::from("1")));
            form.push((format!("{prefix}[price_data][currency]"), item.currency.clone()));
            form.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount_cents.to_string(),
            ));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
        }

        form
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[tracing::instrument(skip_all, fields(user_id = %request.user_id, items = request.items.len()))]
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> PaymentResult<CheckoutSession> {
        let secret = self.secret_key.as_deref().ok_or(PaymentError::MissingSecret)?;

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(secret)
            .form(&self.session_form(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| String::from("unknown error"));
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: StripeSession = response.json().await?;
        tracing::debug!("checkout session {} created", session.id);
        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn session_form_test() {
        let client = StripeClient::new("https://api.stripe.com/", None, "http://localhost:3000");
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let request = CheckoutRequest {
            user_id: Uuid::nil(),
            customer_email: String::from("learner@example.com"),
            items: vec![
                CheckoutItem {
                    course_id: a,
                    name: String::from("Rust 101"),
                    unit_amount_cents: 4900,
                    currency: String::from("usd"),
                },
                CheckoutItem {
                    course_id: b,
                    name: String::from("Async Rust"),
                    unit_amount_cents: 9900,
                    currency: String::from("usd"),
                },
            ],
        };

        let form = client.session_form(&request);
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("metadata[courseIds]"), Some(format!("{a},{b}").as_str()));
        assert_eq!(get("line_items[1][price_data][unit_amount]"), Some("9900"));
        assert_eq!(get("line_items[0][price_data][product_data][name]"), Some("Rust 101"));
        assert_eq!(client.api_base, "https://api.stripe.com");
    }

    #[tokio::test]
    async fn missing_secret_test() {
        let client = StripeClient::new("https://api.stripe.com", None, "http://localhost:3000");
        let request = CheckoutRequest {
            user_id: Uuid::nil(),
            customer_email: String::new(),
            items: vec![],
        };
        let result = client.create_checkout_session(&request).await;
        assert!(matches!(result, Err(PaymentError::MissingSecret)));
    }
}
