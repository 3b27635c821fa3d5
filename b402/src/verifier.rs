//! The verify-and-settle collaborator contract.
//!
//! Signature checking, nonce bookkeeping and the on-chain transfer are owned
//! by an external facilitator. The payment gate only sees this narrow trait:
//! one fallible call that either settles the payment or explains, with a
//! specific [`VerificationError`], why it did not.
//!
//! Implementations must not retry on their own and must report a replayed
//! nonce as [`VerificationError::NonceReplay`]. The verifier's ledger is the
//! only replay protection in the system.

use std::future::Future;
use std::sync::Arc;

use crate::proto::{PaymentPayload, PaymentRecord, PaymentRequirement, VerificationError};

/// Verifies a signed payload against the requirement it was issued for and
/// settles the transfer.
pub trait Verifier: Send + Sync {
    /// Verifies and settles a payment.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError`] describing the first failed check or the
    /// settlement failure.
    fn verify_and_settle(
        &self,
        requirement: &PaymentRequirement,
        payload: &PaymentPayload,
    ) -> impl Future<Output = Result<PaymentRecord, VerificationError>> + Send;
}

impl<T: Verifier> Verifier for Arc<T> {
    fn verify_and_settle(
        &self,
        requirement: &PaymentRequirement,
        payload: &PaymentPayload,
    ) -> impl Future<Output = Result<PaymentRecord, VerificationError>> + Send {
        (**self).verify_and_settle(requirement, payload)
    }
}
