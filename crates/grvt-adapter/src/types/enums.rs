/*
[INPUT]:  API schema definitions and serde requirements
[OUTPUT]: Typed Rust enums with integer wire encoding
[POS]:    Data layer - type definitions for API communication and signing
[UPDATE]: When API schema changes or new variants are added
*/

use serde::{Deserialize, Serialize};

use crate::error::GrvtError;

/// Implements `u8` wire conversion for an integer-coded enum
macro_rules! int_enum {
    ($name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                match value {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl TryFrom<u8> for $name {
            type Error = GrvtError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(GrvtError::validation(format!(
                        "{} has no variant for {other}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Side {
    Buy,
    Sell,
}

int_enum!(Side { Buy = 1, Sell = 2 });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TimeInForce {
    GoodTillTime,
    AllOrNone,
    ImmediateOrCancel,
    FillOrKill,
}

int_enum!(TimeInForce {
    GoodTillTime = 1,
    AllOrNone = 2,
    ImmediateOrCancel = 3,
    FillOrKill = 4,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Cancelled,
    Rejected,
}

int_enum!(OrderStatus {
    Pending = 1,
    Open = 2,
    Filled = 3,
    Cancelled = 4,
    Rejected = 5,
});

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Kind {
    Perpetual,
    Future,
    Call,
    Put,
}

int_enum!(Kind {
    Perpetual = 1,
    Future = 2,
    Call = 3,
    Put = 4,
});
