//! Access gate: proves wallet ownership of a gating NFT and issues a session token.
//!
//! The caller's wallet signs a fixed challenge with `personal_sign`. The gate
//! recovers the signer, asks the [`OwnershipRegistry`] for the signer's
//! balance, and grants a fresh session token when the balance is non-zero.
//! Exactly one registry call is made per attempt that gets past parsing.

pub mod registry;
pub mod signature;

pub use registry::{JsonRpcRegistry, OwnershipRegistry, TokenBalance};
pub use signature::{recover_personal_signer, WalletAddress};

use crate::error::GateError;
use crate::security::generate_session_token;
use std::sync::Arc;

/// Text returned to callers whose wallet holds no gating token.
pub const DENIAL_MESSAGE: &str = "You don't have the required NFT!";

/// Result of a well-formed authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted {
        token: String,
        address: WalletAddress,
    },
    Denied {
        address: WalletAddress,
    },
}

pub struct AccessGate {
    challenge: String,
    registry: Arc<dyn OwnershipRegistry>,
}

impl AccessGate {
    pub fn new(challenge: impl Into<String>, registry: Arc<dyn OwnershipRegistry>) -> Self {
        Self {
            challenge: challenge.into(),
            registry,
        }
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub async fn authenticate(&self, signature: Option<&str>) -> Result<AuthOutcome, GateError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GateError::invalid_input("missing 'signature' query parameter"))?;

        let address = recover_personal_signer(&self.challenge, signature)
            .map_err(|e| GateError::invalid_input(format!("{e:#}")))?;

        let balance = self.registry.balance_of(&address).await.map_err(|e| {
            let err = GateError::upstream(&e);
            tracing::warn!(registry = self.registry.name(), %address, "Ownership lookup failed: {err}");
            err
        })?;

        if balance.is_zero() {
            tracing::info!(%address, "Access denied: no gating token held");
            return Ok(AuthOutcome::Denied { address });
        }

        tracing::info!(%address, %balance, "Access granted");
        Ok(AuthOutcome::Granted {
            token: generate_session_token(),
            address,
        })
    }
}
