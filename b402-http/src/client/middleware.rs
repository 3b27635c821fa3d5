//! Reqwest middleware that pays b402 challenges.

use b402::{PaymentRecord, PaymentRequiredBody, PaymentRequirement, TokenAmount};
use b402_evm::{B402EvmClient, SignError, SignerLike};
use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, trace};

use crate::constants::{X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER};
use crate::headers::decode_payment_response;

/// Errors raised while answering a 402 challenge.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The 402 response body is not a b402 challenge.
    #[error("Failed to parse 402 response: {0}")]
    ParseError(String),
    /// The challenge asks for more than the configured ceiling.
    #[error("Requested amount {requested} exceeds the allowed maximum {max}")]
    AmountTooHigh {
        /// Amount demanded by the server.
        requested: TokenAmount,
        /// Ceiling configured on the client.
        max: TokenAmount,
    },
    /// Signing the authorization failed.
    #[error(transparent)]
    Signing(#[from] SignError),
    /// The signed payload is not a valid header value.
    #[error("Signed payload is not a valid header value")]
    InvalidHeader,
    /// The request body is a stream and cannot be replayed.
    #[error("Request body cannot be cloned for a paid retry")]
    RequestNotCloneable,
}

/// Reqwest middleware that answers `402 Payment Required` with a signed payment.
///
/// On a 402 the middleware reads the [`PaymentRequirement`] from the body,
/// signs a fresh authorization and retries the request once with the
/// `X-PAYMENT` header. Any other status passes through untouched, and a
/// second 402 is returned to the caller as-is.
#[derive(Debug, Clone)]
pub struct B402Client<S> {
    payer: B402EvmClient<S>,
    max_amount: Option<TokenAmount>,
}

impl<S> B402Client<S> {
    /// Creates a client paying with `signer`.
    pub const fn new(signer: S) -> Self {
        Self {
            payer: B402EvmClient::new(signer),
            max_amount: None,
        }
    }

    /// Refuses challenges asking for more than `max` base units.
    #[must_use]
    pub const fn with_max_amount(mut self, max: TokenAmount) -> Self {
        self.max_amount = Some(max);
        self
    }
}

impl<S: SignerLike> B402Client<S> {
    /// Builds the `X-PAYMENT` header value for a requirement.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AmountTooHigh`] if the requirement exceeds the
    /// configured ceiling, or a signing error.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "b402.reqwest.make_payment_header", skip_all, err)
    )]
    pub async fn make_payment_header(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<HeaderValue, ClientError> {
        if let Some(max) = self.max_amount
            && requirement.max_amount_required > max
        {
            return Err(ClientError::AmountTooHigh {
                requested: requirement.max_amount_required,
                max,
            });
        }

        #[cfg(feature = "telemetry")]
        debug!(
            network = %requirement.network,
            pay_to = %requirement.pay_to,
            amount = %requirement.max_amount_required,
            "Signing payment"
        );

        let header = self.payer.payment_header(requirement).await?;
        HeaderValue::from_str(&header).map_err(|_| ClientError::InvalidHeader)
    }
}

/// Runs the next middleware or HTTP client with optional telemetry instrumentation.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "b402.reqwest.next", skip_all)
)]
async fn run_next(
    next: rqm::Next<'_>,
    req: Request,
    extensions: &mut Extensions,
) -> rqm::Result<Response> {
    next.run(req, extensions).await
}

#[async_trait::async_trait]
impl<S> rqm::Middleware for B402Client<S>
where
    S: SignerLike + 'static,
{
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "b402.reqwest.handle", skip_all, err)
    )]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let res = run_next(next.clone(), req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            #[cfg(feature = "telemetry")]
            trace!(status = ?res.status(), "No payment required, returning response");
            return Ok(res);
        }

        #[cfg(feature = "telemetry")]
        info!(url = %res.url(), "Received 402 Payment Required, processing payment");

        let requirement = parse_payment_required(res)
            .await
            .map_err(|e| rqm::Error::Middleware(e.into()))?;
        let header = self
            .make_payment_header(&requirement)
            .await
            .map_err(|e| rqm::Error::Middleware(e.into()))?;

        let mut retry = retry_req.ok_or_else(|| {
            rqm::Error::Middleware(ClientError::RequestNotCloneable.into())
        })?;
        retry.headers_mut().insert(X_PAYMENT_HEADER, header);

        #[cfg(feature = "telemetry")]
        trace!(url = %retry.url(), "Retrying request with payment header");

        run_next(next, retry, extensions).await
    }
}

/// Reads the [`PaymentRequirement`] out of a 402 response body.
///
/// # Errors
///
/// Returns [`ClientError::ParseError`] if the body is not a b402 challenge.
pub async fn parse_payment_required(response: Response) -> Result<PaymentRequirement, ClientError> {
    let body: PaymentRequiredBody = response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(e.to_string()))?;
    Ok(body.x402)
}

/// Reads the settlement record a paid response carries, if any.
#[must_use]
pub fn payment_record(response: &Response) -> Option<PaymentRecord> {
    let header = response.headers().get(X_PAYMENT_RESPONSE_HEADER)?;
    decode_payment_response(header.as_bytes()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};
    use alloy_signer_local::PrivateKeySigner;
    use b402::{Network, PaymentPayload};
    use b402_evm::verify_payer;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::client::{ReqwestWithPayments, ReqwestWithPaymentsBuild};
    use crate::headers::{decode_payment_payload, encode_payment_response};

    fn requirement() -> PaymentRequirement {
        PaymentRequirement::new(
            Network::BscTestnet,
            Network::BscTestnet.default_token(),
            Address::repeat_byte(0x01),
            TokenAmount::from(10_000_000_000_000_000u128),
            Address::repeat_byte(0x02),
        )
    }

    async fn paywalled_server() -> MockServer {
        let server = MockServer::start().await;
        let record = PaymentRecord {
            payer: Address::repeat_byte(0x03),
            tx_hash: B256::repeat_byte(0x04),
            amount: requirement().max_amount_required,
            token: requirement().asset,
        };
        Mock::given(method("POST"))
            .and(path("/process"))
            .and(header_exists(X_PAYMENT_HEADER))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        X_PAYMENT_RESPONSE_HEADER,
                        encode_payment_response(&record).unwrap().as_str(),
                    )
                    .set_body_json(json!({ "ok": true })),
            )
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(
                ResponseTemplate::new(402)
                    .set_body_json(PaymentRequiredBody::challenge(requirement())),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_pays_and_retries_once() {
        let server = paywalled_server().await;
        let signer = PrivateKeySigner::random();
        let payer = signer.address();
        let client = reqwest::Client::new()
            .with_payments(B402Client::new(signer))
            .build();

        let response = client
            .post(format!("{}/process", server.uri()))
            .json(&json!({ "message": "hi" }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let record = payment_record(&response).unwrap();
        assert_eq!(record.tx_hash, B256::repeat_byte(0x04));

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 2);
        assert!(received[0].headers.get(X_PAYMENT_HEADER).is_none());
        let header = received[1].headers.get(X_PAYMENT_HEADER).unwrap();
        let payload: PaymentPayload = decode_payment_payload(header.as_bytes()).unwrap();
        assert_eq!(verify_payer(&requirement(), &payload), Ok(payer));
        assert_eq!(received[1].body, received[0].body);
    }

    #[tokio::test]
    async fn test_refuses_overpriced_challenge() {
        let server = paywalled_server().await;
        let client = reqwest::Client::new()
            .with_payments(
                B402Client::new(PrivateKeySigner::random())
                    .with_max_amount(TokenAmount::from(1_000u128)),
            )
            .build();

        let result = client
            .post(format!("{}/process", server.uri()))
            .send()
            .await;

        assert!(result.is_err());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_passes_through_other_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .mount(&server)
            .await;
        let client = reqwest::Client::new()
            .with_payments(B402Client::new(PrivateKeySigner::random()))
            .build();

        let response = client
            .get(format!("{}/health", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(payment_record(&response).is_none());
    }
}
