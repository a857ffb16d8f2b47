//! L1 action signing.
//!
//! An action is msgpack-encoded, suffixed with the nonce and vault marker and
//! hashed into a `connectionId`, which is then signed as the EIP-712 `Agent`
//! struct in the fixed `Exchange` domain.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{keccak256, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::{eip712_domain, Eip712Domain, SolStruct};
use chrono::Utc;
use thiserror::Error;

use super::types::{Action, SignatureWire};
use crate::errors::GatewayError;

sol! {
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

const L1_DOMAIN: Eip712Domain = eip712_domain! {
    name: "Exchange",
    version: "1",
    chain_id: 1337,
    verifying_contract: Address::ZERO,
};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("invalid vault address: {0}")]
    InvalidVault(String),

    #[error("msgpack encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("signer failed: {0}")]
    Signer(#[from] alloy::signers::Error),
}

impl From<SigningError> for GatewayError {
    fn from(e: SigningError) -> Self {
        GatewayError::Signing(e.to_string())
    }
}

/// Hash identifying an action on L1: `keccak256(msgpack ‖ nonce ‖ vault)`.
pub fn action_hash(action: &Action, nonce: u64, vault: Option<Address>) -> Result<B256, SigningError> {
    let mut bytes = rmp_serde::to_vec_named(action)?;
    bytes.extend_from_slice(&nonce.to_be_bytes());
    match vault {
        None => bytes.push(0),
        Some(addr) => {
            bytes.push(1);
            bytes.extend_from_slice(addr.as_slice());
        }
    }
    Ok(keccak256(&bytes))
}

/// EIP-712 digest the wallet signs for an action hash.
pub fn agent_signing_hash(connection_id: B256, is_mainnet: bool) -> B256 {
    let agent = Agent {
        source: if is_mainnet { "a" } else { "b" }.to_string(),
        connectionId: connection_id,
    };
    agent.eip712_signing_hash(&L1_DOMAIN)
}

/// Local key that signs exchange actions, optionally on behalf of a vault.
pub struct ActionSigner {
    signer: PrivateKeySigner,
    is_mainnet: bool,
    vault: Option<Address>,
}

impl ActionSigner {
    /// Accepts a hex key with or without the `0x` prefix.
    pub fn new(private_key: &str, is_mainnet: bool, vault: Option<&str>) -> Result<Self, SigningError> {
        let signer = PrivateKeySigner::from_str(private_key.trim())
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        let vault = vault
            .map(|v| Address::from_str(v.trim()).map_err(|e| SigningError::InvalidVault(e.to_string())))
            .transpose()?;
        Ok(Self {
            signer,
            is_mainnet,
            vault,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn vault(&self) -> Option<Address> {
        self.vault
    }

    pub fn sign_action(&self, action: &Action, nonce: u64) -> Result<SignatureWire, SigningError> {
        let connection_id = action_hash(action, nonce, self.vault)?;
        let digest = agent_signing_hash(connection_id, self.is_mainnet);
        let sig = self.signer.sign_hash_sync(&digest)?;
        Ok(SignatureWire {
            r: format!("0x{:x}", sig.r()),
            s: format!("0x{:x}", sig.s()),
            v: 27 + u64::from(sig.v()),
        })
    }
}

/// Strictly increasing millisecond nonces.
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicU64,
}

impl NonceSource {
    pub fn next(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self
                .last
                .compare_exchange_weak(current, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }
}
