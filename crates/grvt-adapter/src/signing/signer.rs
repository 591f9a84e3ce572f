/*
[INPUT]:  Hex private key, chain id, validated Order
[OUTPUT]: Order signatures and signer recovery
[POS]:    Signing layer - secp256k1 signing over the EIP-712 order digest
[UPDATE]: When key handling or signature encoding changes
*/

use std::fmt;

use alloy::primitives::{Address, B256, Signature as EcdsaSignature, U256};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;

use super::eip712::{SigningDomain, order_signing_hash};
use crate::error::{GrvtError, Result};
use crate::types::{Order, Signature};

fn parse_private_key(private_key: &str) -> Result<PrivateKeySigner> {
    let trimmed = private_key.trim();
    if trimmed.is_empty() {
        return Err(GrvtError::Signing("private key is empty".to_string()));
    }
    // Never echo the key material in the error
    trimmed
        .parse::<PrivateKeySigner>()
        .map_err(|_| GrvtError::Signing("private key is not a valid 32-byte hex secp256k1 key".to_string()))
}

impl From<EcdsaSignature> for Signature {
    fn from(signature: EcdsaSignature) -> Self {
        let v = if signature.v() { 28 } else { 27 };
        Signature::from_parts(
            B256::from(signature.r().to_be_bytes::<32>()),
            B256::from(signature.s().to_be_bytes::<32>()),
            v,
        )
    }
}

fn to_ecdsa(signature: &Signature) -> EcdsaSignature {
    EcdsaSignature::new(
        U256::from_be_bytes(signature.r().0),
        U256::from_be_bytes(signature.s().0),
        signature.recovery_id() == 1,
    )
}

/// Holds a parsed key so repeated signing skips key decoding
#[derive(Clone)]
pub struct OrderSigner {
    signer: PrivateKeySigner,
    chain_id: u64,
    domain: SigningDomain,
}

impl fmt::Debug for OrderSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderSigner")
            .field("address", &self.signer.address())
            .field("chain_id", &self.chain_id)
            .field("domain", &self.domain)
            .finish()
    }
}

impl OrderSigner {
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self> {
        Ok(Self {
            signer: parse_private_key(private_key)?,
            chain_id,
            domain: SigningDomain::default(),
        })
    }

    pub fn with_domain(mut self, domain: SigningDomain) -> Self {
        self.domain = domain;
        self
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn domain(&self) -> &SigningDomain {
        &self.domain
    }

    pub fn sign(&self, order: &Order) -> Result<Signature> {
        let digest = order_signing_hash(order, self.chain_id, &self.domain);
        let signature = self
            .signer
            .sign_hash_sync(&digest)
            .map_err(|e| GrvtError::Signing(format!("failed to sign order digest: {e}")))?;
        Ok(signature.into())
    }

    /// Sign and attach the signature to the order
    pub fn sign_in_place(&self, order: &mut Order) -> Result<Signature> {
        let signature = self.sign(order)?;
        order.attach_signature(signature);
        tracing::debug!(
            client_order_id = order.metadata().client_order_id(),
            signer = %self.address(),
            "order signed"
        );
        Ok(signature)
    }

    pub fn recover(&self, order: &Order, signature: &Signature) -> Result<Address> {
        recover_signer_with_domain(order, signature, self.chain_id, &self.domain)
    }
}

impl Order {
    /// Sign with `signer` and store the signature; any later mutation clears it
    pub fn sign(&mut self, signer: &OrderSigner) -> Result<Signature> {
        signer.sign_in_place(self)
    }
}

/// Sign under the default GRVT domain
pub fn sign_order(order: &Order, private_key: &str, chain_id: u64) -> Result<Signature> {
    OrderSigner::new(private_key, chain_id)?.sign(order)
}

/// Recover the address that produced `signature` under the default GRVT domain
pub fn recover_signer(order: &Order, signature: &Signature, chain_id: u64) -> Result<Address> {
    recover_signer_with_domain(order, signature, chain_id, &SigningDomain::default())
}

pub fn recover_signer_with_domain(
    order: &Order,
    signature: &Signature,
    chain_id: u64,
    domain: &SigningDomain,
) -> Result<Address> {
    let digest = order_signing_hash(order, chain_id, domain);
    to_ecdsa(signature)
        .recover_address_from_prehash(&digest)
        .map_err(|e| GrvtError::Signing(format!("signature recovery failed: {e}")))
}
