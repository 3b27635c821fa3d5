//! Service configuration.
//!
//! Settings are read from command-line flags with environment fallbacks
//! (a `.env` file is loaded first by the binary) and validated once into an
//! immutable [`AppConfig`]. Any invalid or missing value is a startup error;
//! the server never binds with a half-valid configuration.
//!
//! # Environment Variables
//!
//! - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
//! - `PAYMENT_ADDRESS`: recipient of payments (required)
//! - `NETWORK`: `bsc` or `bsc-testnet` (default `bsc-testnet`)
//! - `PRICE`: human-readable price per call (default `0.01`)
//! - `TOKEN_ADDRESS`, `TOKEN_DECIMALS`: payment token (default: the network's USDT, 18 decimals)
//! - `RELAYER_CONTRACT`: EIP-712 verifying contract (required)
//! - `FACILITATOR_URL`: remote verifier base URL (required)
//! - `MAX_TIMEOUT_SECONDS`: authorization lifetime offered to payers (default `600`)
//! - `VERIFIER_TIMEOUT_SECS`: bound on one verify-and-settle call (default `30`)
//! - `AI_PROVIDER`: completion backend, only `openai` is supported
//! - `OPENAI_API_KEY` (required), `OPENAI_MODEL`, `OPENAI_BASE_URL`

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use b402::amount::AmountError;
use b402::networks::UnknownNetwork;
use b402::{Network, PaymentRequirement, TokenAmount};
use clap::Parser;
use url::Url;

/// Raw settings as given on the command line or in the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "b402-server", version, about)]
pub struct Cli {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Address that receives payments.
    #[arg(long, env = "PAYMENT_ADDRESS")]
    pub payment_address: Option<String>,

    /// Network payments settle on.
    #[arg(long, env = "NETWORK", default_value = "bsc-testnet")]
    pub network: String,

    /// Price per call in whole tokens, e.g. `0.01`.
    #[arg(long, env = "PRICE", default_value = "0.01")]
    pub price: String,

    /// Payment token contract. Defaults to the network's USDT.
    #[arg(long, env = "TOKEN_ADDRESS")]
    pub token_address: Option<String>,

    /// Decimals of the payment token.
    #[arg(long, env = "TOKEN_DECIMALS", default_value_t = b402::networks::DEFAULT_TOKEN_DECIMALS)]
    pub token_decimals: u8,

    /// Relayer contract used as the EIP-712 verifying contract.
    #[arg(long, env = "RELAYER_CONTRACT")]
    pub relayer_contract: Option<String>,

    /// Base URL of the verifying and settling facilitator.
    #[arg(long, env = "FACILITATOR_URL")]
    pub facilitator_url: Option<String>,

    /// Lifetime of an authorization, in seconds.
    #[arg(
        long,
        env = "MAX_TIMEOUT_SECONDS",
        default_value_t = b402::proto::DEFAULT_MAX_TIMEOUT_SECONDS
    )]
    pub max_timeout_seconds: u64,

    /// Bound on one verify-and-settle call, in seconds.
    #[arg(long, env = "VERIFIER_TIMEOUT_SECS", default_value_t = 30)]
    pub verifier_timeout_secs: u64,

    /// Completion backend.
    #[arg(long, env = "AI_PROVIDER", default_value = "openai")]
    pub ai_provider: String,

    /// API key of the completion backend.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Completion model.
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// Base URL of the completion API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1/")]
    pub openai_base_url: String,
}

/// Errors raised while validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is absent or empty.
    #[error("{0} is required")]
    Missing(&'static str),
    /// A setting is not a valid EVM address.
    #[error("{var} is not a valid address: {value:?}")]
    InvalidAddress {
        /// Setting name.
        var: &'static str,
        /// Rejected value.
        value: String,
    },
    /// `NETWORK` names an unsupported network.
    #[error("NETWORK: {0}")]
    Network(#[from] UnknownNetwork),
    /// `PRICE` cannot be represented in the token's base units.
    #[error("PRICE: {0}")]
    Price(#[from] AmountError),
    /// A setting is not a valid URL.
    #[error("{var} is not a valid URL: {source}")]
    InvalidUrl {
        /// Setting name.
        var: &'static str,
        /// Parse failure.
        source: url::ParseError,
    },
    /// A numeric setting is out of range.
    #[error("{var} must be greater than zero")]
    Zero {
        /// Setting name.
        var: &'static str,
    },
    /// `AI_PROVIDER` names an unsupported backend.
    #[error("unsupported AI_PROVIDER {0:?}, expected \"openai\"")]
    UnsupportedProvider(String),
}

/// Supported completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions API.
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            _ => Err(ConfigError::UnsupportedProvider(s.to_owned())),
        }
    }
}

/// What the service charges per call and where the money goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    /// Recipient of payments.
    pub pay_to: Address,
    /// Settlement network.
    pub network: Network,
    /// Price as configured, in whole tokens.
    pub price: String,
    /// Price in the token's base units.
    pub amount: TokenAmount,
    /// Payment token contract.
    pub token: Address,
    /// Decimals of the payment token.
    pub token_decimals: u8,
    /// EIP-712 verifying contract.
    pub relayer_contract: Address,
    /// Authorization lifetime offered to payers.
    pub max_timeout_seconds: u64,
}

/// Completion backend settings.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Selected backend.
    pub kind: ProviderKind,
    /// Bearer token for the backend.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// API base URL.
    pub base_url: Url,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

/// Validated, immutable service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address.
    pub host: IpAddr,
    /// Bind port.
    pub port: u16,
    /// Pricing and settlement settings.
    pub payment: PaymentConfig,
    /// Verifier base URL.
    pub facilitator_url: Url,
    /// Bound on one verify-and-settle call.
    pub verifier_timeout: Duration,
    /// Completion backend settings.
    pub provider: ProviderConfig,
}

impl AppConfig {
    /// Parses flags and environment, then validates them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any setting is missing or invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::try_from(Cli::parse())
    }

    /// Socket address to bind.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// The requirement issued for the protected operation.
    #[must_use]
    pub fn requirement(&self) -> PaymentRequirement {
        let payment = &self.payment;
        PaymentRequirement::new(
            payment.network,
            payment.token,
            payment.pay_to,
            payment.amount,
            payment.relayer_contract,
        )
        .with_timeout(payment.max_timeout_seconds)
        .with_description("AI processing of one message")
        .with_mime_type("application/json")
    }
}

impl TryFrom<Cli> for AppConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let network: Network = cli.network.parse()?;
        let pay_to = parse_address(
            "PAYMENT_ADDRESS",
            required("PAYMENT_ADDRESS", cli.payment_address)?,
        )?;
        let relayer_contract = parse_address(
            "RELAYER_CONTRACT",
            required("RELAYER_CONTRACT", cli.relayer_contract)?,
        )?;
        let token = match non_empty(cli.token_address) {
            Some(value) => parse_address("TOKEN_ADDRESS", value)?,
            None => network.default_token(),
        };
        let amount = TokenAmount::from_decimal_str(&cli.price, cli.token_decimals)?;
        if cli.max_timeout_seconds == 0 {
            return Err(ConfigError::Zero { var: "MAX_TIMEOUT_SECONDS" });
        }
        if cli.verifier_timeout_secs == 0 {
            return Err(ConfigError::Zero { var: "VERIFIER_TIMEOUT_SECS" });
        }
        let facilitator_url = parse_url(
            "FACILITATOR_URL",
            &required("FACILITATOR_URL", cli.facilitator_url)?,
        )?;

        let kind: ProviderKind = cli.ai_provider.parse()?;
        let provider = ProviderConfig {
            kind,
            api_key: required("OPENAI_API_KEY", cli.openai_api_key)?,
            model: cli.openai_model,
            base_url: parse_url("OPENAI_BASE_URL", &cli.openai_base_url)?,
        };

        Ok(Self {
            host: cli.host,
            port: cli.port,
            payment: PaymentConfig {
                pay_to,
                network,
                price: cli.price.trim().to_owned(),
                amount,
                token,
                token_decimals: cli.token_decimals,
                relayer_contract,
                max_timeout_seconds: cli.max_timeout_seconds,
            },
            facilitator_url,
            verifier_timeout: Duration::from_secs(cli.verifier_timeout_secs),
            provider,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(var: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::Missing(var))
}

fn parse_address(var: &'static str, value: String) -> Result<Address, ConfigError> {
    Address::from_str(value.trim()).map_err(|_| ConfigError::InvalidAddress { var, value })
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl { var, source })
}
