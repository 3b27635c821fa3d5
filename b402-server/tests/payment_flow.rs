//! End-to-end behaviour of the service router behind the b402 paywall.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, B256};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode};
use b402::{
    PaymentPayload, PaymentRecord, PaymentRequirement, TokenAmount, VerificationError, Verifier,
};
use b402_evm::{B402EvmClient, verify_payer};
use b402_http::constants::{X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER};
use b402_http::headers::{
    decode_payment_payload, decode_payment_response, encode_payment_payload,
};
use b402_http::server::B402Middleware;
use b402_server::config::{AppConfig, Cli};
use b402_server::provider::{CompletionProvider, ProviderError};
use b402_server::routes::{AppState, router};
use clap::Parser;
use serde_json::{Value, json};
use tower::ServiceExt;

const PAY_TO: &str = "0x1111111111111111111111111111111111111111";
const RELAYER: &str = "0x2222222222222222222222222222222222222222";

/// Settles every correctly signed payload once per `(from, nonce)`.
#[derive(Clone, Default)]
struct LedgerVerifier {
    calls: Arc<AtomicUsize>,
    used: Arc<Mutex<HashSet<(Address, B256)>>>,
}

impl Verifier for LedgerVerifier {
    async fn verify_and_settle(
        &self,
        requirement: &PaymentRequirement,
        payload: &PaymentPayload,
    ) -> Result<PaymentRecord, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let payer = verify_payer(requirement, payload)?;
        let nonce = payload.payload.authorization.nonce;
        if !self.used.lock().unwrap().insert((payer, nonce)) {
            return Err(VerificationError::NonceReplay);
        }
        Ok(PaymentRecord {
            payer,
            tx_hash: B256::repeat_byte(0x7f),
            amount: payload.payload.authorization.value,
            token: payload.token,
        })
    }
}

#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl CompletionProvider for CountingProvider {
    async fn execute(&self, context: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::EmptyCompletion);
        }
        Ok(format!("processed: {context}"))
    }
}

struct Harness {
    app: Router,
    config: Arc<AppConfig>,
    verifier: LedgerVerifier,
    provider: Arc<CountingProvider>,
}

impl Harness {
    fn new(fail: bool) -> Self {
        let cli = Cli::try_parse_from([
            "b402-server",
            "--payment-address",
            PAY_TO,
            "--relayer-contract",
            RELAYER,
            "--facilitator-url",
            "http://127.0.0.1:9/",
            "--openai-api-key",
            "sk-test",
            "--network",
            "bsc-testnet",
            "--price",
            "0.01",
            "--ai-provider",
            "openai",
        ])
        .unwrap();
        let config = Arc::new(AppConfig::try_from(cli).unwrap());
        let verifier = LedgerVerifier::default();
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail,
        });
        let state = AppState {
            config: Arc::clone(&config),
            provider: provider.clone(),
        };
        let app = router(state, &B402Middleware::new(verifier.clone()));
        Self {
            app,
            config,
            verifier,
            provider,
        }
    }

    async fn send(&self, header: Option<&str>, body: &Value) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri("/process")
            .header("content-type", "application/json");
        if let Some(header) = header {
            request = request.header(X_PAYMENT_HEADER, header);
        }
        self.app
            .clone()
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }

    fn verifier_calls(&self) -> usize {
        self.verifier.calls.load(Ordering::SeqCst)
    }

    fn provider_calls(&self) -> usize {
        self.provider.calls.load(Ordering::SeqCst)
    }
}

fn message(text: &str) -> Value {
    json!({ "message": { "parts": [{ "kind": "text", "text": text }] } })
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn header_for(signer: &PrivateKeySigner, requirement: &PaymentRequirement) -> String {
    B402EvmClient::new(signer.clone())
        .payment_header(requirement)
        .await
        .unwrap()
}

#[tokio::test]
async fn unpaid_request_is_challenged_without_running_the_operation() {
    let harness = Harness::new(false);
    let response = harness.send(None, &message("hello")).await;

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = json_body(response).await;
    let requirement = &body["x402"];
    assert_eq!(
        requirement["asset"].as_str().unwrap().parse::<Address>().unwrap(),
        harness.config.payment.token
    );
    assert_eq!(
        requirement["payTo"].as_str().unwrap().parse::<Address>().unwrap(),
        PAY_TO.parse::<Address>().unwrap()
    );
    assert_eq!(requirement["maxAmountRequired"], "10000000000000000");
    assert_eq!(requirement["network"], "bsc-testnet");
    assert_eq!(harness.verifier_calls(), 0);
    assert_eq!(harness.provider_calls(), 0);
}

#[tokio::test]
async fn paid_request_runs_once_and_reports_the_payer() {
    let harness = Harness::new(false);
    let signer = PrivateKeySigner::random();
    let header = header_for(&signer, &harness.config.requirement()).await;

    let response = harness.send(Some(&header), &message("hello")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let record = decode_payment_response(
        response
            .headers()
            .get(X_PAYMENT_RESPONSE_HEADER)
            .unwrap()
            .as_bytes(),
    )
    .unwrap();
    assert_eq!(record.payer, signer.address());

    let body = json_body(response).await;
    assert_eq!(body["result"]["role"], "agent");
    assert_eq!(body["result"]["parts"][0]["text"], "processed: hello");
    assert_eq!(
        body["payment"]["payer"].as_str().unwrap().parse::<Address>().unwrap(),
        signer.address()
    );
    assert_eq!(harness.provider_calls(), 1);
}

#[tokio::test]
async fn replayed_payment_is_rejected() {
    let harness = Harness::new(false);
    let signer = PrivateKeySigner::random();
    let header = header_for(&signer, &harness.config.requirement()).await;

    let first = harness.send(Some(&header), &message("one")).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = harness.send(Some(&header), &message("two")).await;
    assert_eq!(second.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json_body(second).await["reason"], "nonce_replay");
    assert_eq!(harness.provider_calls(), 1);
}

#[tokio::test]
async fn wrong_amount_is_rejected_before_settlement() {
    let harness = Harness::new(false);
    let signer = PrivateKeySigner::random();
    let mut cheaper = harness.config.requirement();
    cheaper.max_amount_required = TokenAmount::from(1u128);
    let header = header_for(&signer, &cheaper).await;

    let response = harness.send(Some(&header), &message("hello")).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json_body(response).await["reason"], "amount_mismatch");
    assert_eq!(harness.verifier_calls(), 0);
    assert_eq!(harness.provider_calls(), 0);
}

#[tokio::test]
async fn expired_authorization_is_rejected() {
    let harness = Harness::new(false);
    let signer = PrivateKeySigner::random();
    let expired = harness.config.requirement().with_timeout(0);
    let header = header_for(&signer, &expired).await;

    let response = harness.send(Some(&header), &message("hello")).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json_body(response).await["reason"], "authorization_expired");
    assert_eq!(harness.provider_calls(), 0);
}

#[tokio::test]
async fn payload_altered_after_signing_is_rejected() {
    let harness = Harness::new(false);
    let signer = PrivateKeySigner::random();
    let header = header_for(&signer, &harness.config.requirement()).await;

    let mut payload = decode_payment_payload(header.as_bytes()).unwrap();
    payload.payload.authorization.from = Address::repeat_byte(0x42);
    let altered = encode_payment_payload(&payload).unwrap();

    let response = harness.send(Some(&altered), &message("hello")).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert!(!response.headers().contains_key(X_PAYMENT_RESPONSE_HEADER));
    assert_eq!(json_body(response).await["reason"], "invalid_signature");
    assert_eq!(harness.verifier_calls(), 1);
    assert_eq!(harness.provider_calls(), 0);
}

#[tokio::test]
async fn malformed_body_is_rejected_before_settlement() {
    let harness = Harness::new(false);
    let signer = PrivateKeySigner::random();
    let header = header_for(&signer, &harness.config.requirement()).await;

    let response = harness.send(Some(&header), &json!({ "message": {} })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("text part")
    );
    assert_eq!(harness.verifier_calls(), 0);
}

#[tokio::test]
async fn operation_failure_returns_the_payment() {
    let harness = Harness::new(true);
    let signer = PrivateKeySigner::random();
    let header = header_for(&signer, &harness.config.requirement()).await;

    let response = harness.send(Some(&header), &message("hello")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.headers().contains_key(X_PAYMENT_RESPONSE_HEADER));
    let body = json_body(response).await;
    assert_eq!(body["error"], "Operation failed");
    assert_eq!(
        body["payment"]["payer"].as_str().unwrap().parse::<Address>().unwrap(),
        signer.address()
    );
}

#[tokio::test]
async fn health_reports_payment_terms() {
    let harness = Harness::new(false);
    let response = harness
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["payment"]["network"], "bsc-testnet");
    assert_eq!(body["payment"]["price"], "0.01");
    assert_eq!(
        body["payment"]["address"].as_str().unwrap().parse::<Address>().unwrap(),
        PAY_TO.parse::<Address>().unwrap()
    );
    assert_eq!(harness.verifier_calls(), 0);
}
