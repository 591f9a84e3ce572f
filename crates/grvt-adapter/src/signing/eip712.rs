/*
[INPUT]:  Validated Order, chain id, domain parameters
[OUTPUT]: EIP-712 signing digest for an order
[POS]:    Signing layer - the one place the order digest is constructed
[UPDATE]: When the on-chain Order/OrderLeg type strings or domain change
*/

use std::borrow::Cow;

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};

use crate::types::Order;

pub const DOMAIN_NAME: &str = "GRVT Exchange";
pub const DOMAIN_VERSION: &str = "1";

mod typed {
    alloy::sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct OrderLeg {
            uint256 instrumentID;
            uint64 size;
            uint64 limitPrice;
            bool isBuyingAsset;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct Order {
            uint64 subAccountID;
            uint8 timeInForce;
            bool postOnly;
            bool reduceOnly;
            OrderLeg[] legs;
            uint32 nonce;
            int64 expiration;
        }
    }
}

/// Domain parameters other than the chain id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningDomain {
    pub name: String,
    pub version: String,
    pub verifying_contract: Address,
}

impl Default for SigningDomain {
    fn default() -> Self {
        Self {
            name: DOMAIN_NAME.to_string(),
            version: DOMAIN_VERSION.to_string(),
            verifying_contract: Address::ZERO,
        }
    }
}

impl SigningDomain {
    pub fn with_verifying_contract(mut self, verifying_contract: Address) -> Self {
        self.verifying_contract = verifying_contract;
        self
    }

    pub fn to_eip712(&self, chain_id: u64) -> Eip712Domain {
        Eip712Domain {
            name: Some(Cow::Owned(self.name.clone())),
            version: Some(Cow::Owned(self.version.clone())),
            chain_id: Some(U256::from(chain_id)),
            verifying_contract: Some(self.verifying_contract),
            ..Eip712Domain::default()
        }
    }
}

fn typed_order(order: &Order) -> typed::Order {
    let legs = order
        .legs()
        .iter()
        .map(|leg| typed::OrderLeg {
            instrumentID: leg.instrument_id(),
            size: leg.size_scaled(),
            limitPrice: leg.limit_price_scaled(),
            isBuyingAsset: leg.is_buying_asset(),
        })
        .collect();

    typed::Order {
        subAccountID: order.sub_account_id(),
        timeInForce: u8::from(order.time_in_force()),
        postOnly: order.post_only(),
        reduceOnly: order.reduce_only(),
        legs,
        nonce: order.metadata().client_order_id(),
        expiration: order.expiration(),
    }
}

/// `keccak256(0x1901 || domainSeparator || hashStruct(order))`.
///
/// Signing and recovery both go through here. Scaled leg values were fixed
/// when the legs were built, so this cannot fail for a constructed order.
pub fn order_signing_hash(order: &Order, chain_id: u64, domain: &SigningDomain) -> B256 {
    typed_order(order).eip712_signing_hash(&domain.to_eip712(chain_id))
}
