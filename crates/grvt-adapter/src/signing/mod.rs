/*
[INPUT]:  Validated orders, private keys, chain ids
[OUTPUT]: EIP-712 order digests, signatures, recovered signer addresses
[POS]:    Signing layer - pure and synchronous, no network or filesystem access
[UPDATE]: When the signed order schema or domain changes
*/

pub mod eip712;
pub mod signer;

pub use eip712::{DOMAIN_NAME, DOMAIN_VERSION, SigningDomain, order_signing_hash};
pub use signer::{OrderSigner, recover_signer, recover_signer_with_domain, sign_order};
