//! HTTP routes of the service.
//!
//! - `GET /health`: liveness plus the advertised price. Never gated.
//! - `POST /process`: forwards one message to the completion provider. Gated
//!   by the b402 layer, so the handler only runs with a settled
//!   [`PaymentRecord`] in its request extensions.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use b402::{PaymentRecord, Verifier};
use b402_http::server::B402Middleware;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::provider::CompletionProvider;

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<AppConfig>,
    /// Completion backend.
    pub provider: Arc<dyn CompletionProvider>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds the service router with `/process` behind `middleware`.
pub fn router<V>(state: AppState, middleware: &B402Middleware<V>) -> Router
where
    V: Verifier + Clone + 'static,
{
    let paywall = middleware
        .with_requirement(state.config.requirement())
        .with_request_validator(|body| {
            ProcessRequest::parse(body)
                .map(|_| ())
                .map_err(|e| e.to_string())
        });

    Router::new()
        .route("/process", post(process).layer(paywall))
        .route("/health", get(health))
        .with_state(state)
}

/// One part of an incoming message.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePart {
    /// Part kind; only `"text"` parts are used.
    pub kind: String,
    /// Text content of a `"text"` part.
    #[serde(default)]
    pub text: Option<String>,
}

/// An incoming message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Message parts.
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

/// Body of `POST /process`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRequest {
    /// The message to process.
    #[serde(default)]
    pub message: Option<Message>,
}

impl ProcessRequest {
    /// Parses a body and extracts the text to process.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRequest`] if the body is not JSON, has no
    /// message, or the message has no non-empty text part.
    pub fn parse(body: &[u8]) -> Result<String, AppError> {
        let request: Self = serde_json::from_slice(body)
            .map_err(|e| AppError::invalid_request(format!("Invalid request body: {e}")))?;
        request.context()
    }

    /// Joins the message's text parts.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRequest`] if there is no message or no text.
    pub fn context(&self) -> Result<String, AppError> {
        let message = self
            .message
            .as_ref()
            .ok_or_else(|| AppError::invalid_request("Invalid request: message is required"))?;
        let texts: Vec<&str> = message
            .parts
            .iter()
            .filter(|part| part.kind == "text")
            .filter_map(|part| part.text.as_deref())
            .filter(|text| !text.trim().is_empty())
            .collect();
        if texts.is_empty() {
            return Err(AppError::invalid_request(
                "Invalid request: message must contain a text part",
            ));
        }
        Ok(texts.join("\n"))
    }
}

/// A text part of an outgoing message.
#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    /// Always `"text"`.
    pub kind: &'static str,
    /// The text.
    pub text: String,
}

/// The agent's reply.
#[derive(Debug, Clone, Serialize)]
pub struct AgentMessage {
    /// Always `"message"`.
    pub kind: &'static str,
    /// Always `"agent"`.
    pub role: &'static str,
    /// Reply parts.
    pub parts: Vec<TextPart>,
}

/// Body of a successful `POST /process`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    /// The reply.
    pub result: AgentMessage,
    /// The payment that bought it.
    pub payment: PaymentRecord,
}

/// Result of running the protected operation once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The provider answered.
    Completed(String),
    /// The provider failed; the payment has already settled.
    Failed(String),
}

impl OperationOutcome {
    /// Runs the completion for `context`.
    pub async fn run(provider: &dyn CompletionProvider, context: &str) -> Self {
        match provider.execute(context).await {
            Ok(text) => Self::Completed(text),
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    /// Turns the outcome into the route's answer, attaching `payment` either way.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::OperationFailed`] for a failed operation.
    pub fn into_reply(self, payment: PaymentRecord) -> Result<ProcessResponse, AppError> {
        match self {
            Self::Completed(text) => Ok(ProcessResponse {
                result: AgentMessage {
                    kind: "message",
                    role: "agent",
                    parts: vec![TextPart { kind: "text", text }],
                },
                payment,
            }),
            Self::Failed(details) => Err(AppError::OperationFailed { details, payment }),
        }
    }
}

async fn process(
    State(state): State<AppState>,
    Extension(payment): Extension<PaymentRecord>,
    body: Bytes,
) -> Result<Json<ProcessResponse>, AppError> {
    let context = ProcessRequest::parse(&body)?;
    let outcome = OperationOutcome::run(state.provider.as_ref(), &context).await;
    match &outcome {
        OperationOutcome::Completed(_) => {
            tracing::info!(payer = %payment.payer, tx = %payment.tx_hash, "Processed paid request");
        }
        OperationOutcome::Failed(details) => {
            tracing::warn!(
                payer = %payment.payer,
                tx = %payment.tx_hash,
                %details,
                "Operation failed after settlement"
            );
        }
    }
    outcome.into_reply(payment).map(Json)
}

/// Payment terms advertised by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthPayment {
    /// Recipient of payments.
    pub address: String,
    /// Settlement network.
    pub network: String,
    /// Price per call in whole tokens.
    pub price: String,
    /// Payment token contract.
    pub token: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Payment terms.
    pub payment: HealthPayment,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let payment = &state.config.payment;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        payment: HealthPayment {
            address: payment.pay_to.to_checksum(None),
            network: payment.network.to_string(),
            price: payment.price.clone(),
            token: payment.token.to_checksum(None),
        },
    })
}
