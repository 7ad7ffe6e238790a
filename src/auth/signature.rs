//! EIP-191 `personal_sign` signature recovery.
//!
//! A wallet signs `"\x19Ethereum Signed Message:\n" + len(msg) + msg`; the
//! signer's address is the last 20 bytes of the keccak-256 hash of the
//! recovered uncompressed public key (without its `0x04` marker).

use anyhow::{bail, Context, Result};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use std::fmt;
use std::str::FromStr;

/// Byte length of an `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

/// Keccak-256 hash (Ethereum's hash function)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use tiny_keccak::{Hasher, Keccak};
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// Hash of `message` as wrapped by `personal_sign`.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let bytes = message.as_bytes();
    let mut prefixed = format!("\x19Ethereum Signed Message:\n{}", bytes.len()).into_bytes();
    prefixed.extend_from_slice(bytes);
    keccak256(&prefixed)
}

/// A 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalletAddress([u8; 20]);

impl WalletAddress {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let encoded = key.to_encoded_point(false);
        // Uncompressed SEC1 points are always 65 bytes starting with 0x04.
        let hash = keccak256(&encoded.as_bytes()[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash[12..]);
        Self(addr)
    }

    /// EIP-55 mixed-case checksum rendering.
    pub fn to_checksum(&self) -> String {
        let hex_addr = hex::encode(self.0);
        let hash = keccak256(hex_addr.as_bytes());
        let mut checksummed = String::with_capacity(42);
        checksummed.push_str("0x");
        for (i, c) in hex_addr.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if nibble >= 8 {
                checksummed.push(c.to_ascii_uppercase());
            } else {
                checksummed.push(c);
            }
        }
        checksummed
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl FromStr for WalletAddress {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(raw).with_context(|| format!("invalid address hex: '{trimmed}'"))?;
        let addr: [u8; 20] = bytes.try_into().map_err(|b: Vec<u8>| {
            anyhow::anyhow!("invalid address length: {} bytes (expected 20)", b.len())
        })?;
        Ok(Self(addr))
    }
}

/// A parsed recoverable signature.
#[derive(Debug, Clone)]
pub struct RecoverableSignature {
    signature: Signature,
    recovery_id: RecoveryId,
}

impl RecoverableSignature {
    /// Parse a hex `r || s || v` signature, with or without `0x` prefix.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            bail!("signature is empty");
        }
        let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(raw).context("signature is not valid hex")?;
        if bytes.len() != SIGNATURE_LEN {
            bail!(
                "signature must be {SIGNATURE_LEN} bytes, got {}",
                bytes.len()
            );
        }

        let signature =
            Signature::from_slice(&bytes[..64]).context("invalid ECDSA signature bytes")?;
        let recovery_id = normalize_recovery_id(bytes[64])?;
        Ok(Self {
            signature,
            recovery_id,
        })
    }

    /// Recover the address that produced this signature over `prehash`.
    pub fn recover(&self, prehash: &[u8; 32]) -> Result<WalletAddress> {
        let (signature, recovery_id) = match self.signature.normalize_s() {
            // Flipping s to the low half mirrors the point, so the y parity flips too.
            Some(low) => (
                low,
                RecoveryId::new(!self.recovery_id.is_y_odd(), self.recovery_id.is_x_reduced()),
            ),
            None => (self.signature, self.recovery_id),
        };
        let key = VerifyingKey::recover_from_prehash(prehash, &signature, recovery_id)
            .context("failed recovering signer from signature")?;
        Ok(WalletAddress::from_verifying_key(&key))
    }
}

fn normalize_recovery_id(raw: u8) -> Result<RecoveryId> {
    let id = match raw {
        27 | 28 => raw - 27,
        0 | 1 => raw,
        _ => bail!("signature recovery id must be 0/1 or 27/28, got {raw}"),
    };
    RecoveryId::try_from(id).map_err(|_| anyhow::anyhow!("signature recovery id is invalid"))
}

/// Recover the signer of a `personal_sign` signature over `message`.
pub fn recover_personal_signer(message: &str, signature_hex: &str) -> Result<WalletAddress> {
    let signature = RecoverableSignature::parse(signature_hex)?;
    signature.recover(&personal_message_hash(message))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use k256::ecdsa::SigningKey;

    /// Well-known development key (first Hardhat/Anvil account).
    pub const DEV_KEY_HEX: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    pub fn dev_signing_key() -> SigningKey {
        SigningKey::from_slice(&hex::decode(DEV_KEY_HEX).unwrap()).unwrap()
    }

    /// Produce a `0x`-prefixed `personal_sign` signature with v in {27, 28}.
    pub fn sign_personal(key: &SigningKey, message: &str) -> String {
        let prehash = personal_message_hash(message);
        let (sig, recid) = key.sign_prehash_recoverable(&prehash).unwrap();
        let mut bytes = sig.to_bytes().to_vec();
        bytes.push(recid.to_byte() + 27);
        format!("0x{}", hex::encode(bytes))
    }
}
