//! Status enums for ledger entities.
//!
//! Statuses are stored as TEXT columns; each enum carries an `as_str` /
//! `from_str` pair so repositories can bind and decode them explicitly and
//! surface unknown stored values as data corruption rather than panicking.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when decoding an unknown status string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    /// Which status family failed to parse.
    pub kind: &'static str,
    /// The offending value.
    pub value: String,
}

/// Lifecycle status of a credit purchase.
///
/// `Active` is the only creation state; every other state is terminal or
/// payment-driven. Transitions:
///
/// - `Active -> Expired` via the usage sweep (credits fully consumed)
/// - `Active -> Cancelled | Frozen | PastDue` via payment webhook mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    #[default]
    Active,
    Expired,
    Cancelled,
    Frozen,
    PastDue,
}

impl PurchaseStatus {
    /// The stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
            Self::Frozen => "FROZEN",
            Self::PastDue => "PAST_DUE",
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PurchaseStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "EXPIRED" => Ok(Self::Expired),
            "CANCELLED" => Ok(Self::Cancelled),
            "FROZEN" => Ok(Self::Frozen),
            "PAST_DUE" => Ok(Self::PastDue),
            other => Err(UnknownStatus {
                kind: "purchase",
                value: other.to_owned(),
            }),
        }
    }
}

/// Payment status as recorded on our side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// The stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(UnknownStatus {
                kind: "payment",
                value: other.to_owned(),
            }),
        }
    }
}

/// Payment status as reported by the Shopify billing gateway webhook.
///
/// Unrecognized gateway values are preserved in `Other` rather than rejected;
/// the purchase-status mapping treats them as past due.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayPaymentStatus {
    Succeeded,
    Cancelled,
    Failed,
    #[serde(untagged)]
    Other(String),
}

impl GatewayPaymentStatus {
    /// Parse a gateway status string. Never fails; unknown values become
    /// [`Self::Other`].
    #[must_use]
    pub fn from_gateway(value: &str) -> Self {
        match value {
            "SUCCEEDED" => Self::Succeeded,
            "CANCELLED" => Self::Cancelled,
            "FAILED" => Self::Failed,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The purchase status a gateway report drives the linked purchase to.
    ///
    /// SUCCEEDED -> ACTIVE, CANCELLED -> CANCELLED, FAILED -> FROZEN,
    /// anything else -> `PAST_DUE`.
    #[must_use]
    pub const fn purchase_status(&self) -> PurchaseStatus {
        match self {
            Self::Succeeded => PurchaseStatus::Active,
            Self::Cancelled => PurchaseStatus::Cancelled,
            Self::Failed => PurchaseStatus::Frozen,
            Self::Other(_) => PurchaseStatus::PastDue,
        }
    }

    /// The payment status we record for this gateway report.
    #[must_use]
    pub const fn payment_status(&self) -> PaymentStatus {
        match self {
            Self::Succeeded => PaymentStatus::Succeeded,
            Self::Cancelled => PaymentStatus::Cancelled,
            Self::Failed | Self::Other(_) => PaymentStatus::Failed,
        }
    }
}

/// How a payment was billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingType {
    #[default]
    OneTime,
    Subscription,
}

impl BillingType {
    /// The stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneTime => "ONE_TIME",
            Self::Subscription => "SUBSCRIPTION",
        }
    }
}

impl std::str::FromStr for BillingType {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONE_TIME" => Ok(Self::OneTime),
            "SUBSCRIPTION" => Ok(Self::Subscription),
            other => Err(UnknownStatus {
                kind: "billing type",
                value: other.to_owned(),
            }),
        }
    }
}

/// Kind of billing adjustment recorded in the append-only event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingEventKind {
    Promotion,
    Discount,
}

impl BillingEventKind {
    /// The stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Promotion => "PROMOTION",
            Self::Discount => "DISCOUNT",
        }
    }
}

impl std::str::FromStr for BillingEventKind {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROMOTION" => Ok(Self::Promotion),
            "DISCOUNT" => Ok(Self::Discount),
            other => Err(UnknownStatus {
                kind: "billing event",
                value: other.to_owned(),
            }),
        }
    }
}

/// How a promotion or discount adjusts a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentKind {
    /// Value is a percentage of the running price (0-100).
    Percentage,
    /// Value is a fixed amount in the package currency.
    Fixed,
}

impl AdjustmentKind {
    /// The stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "PERCENTAGE",
            Self::Fixed => "FIXED",
        }
    }
}

impl std::str::FromStr for AdjustmentKind {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENTAGE" => Ok(Self::Percentage),
            "FIXED" => Ok(Self::Fixed),
            other => Err(UnknownStatus {
                kind: "adjustment",
                value: other.to_owned(),
            }),
        }
    }
}

/// Delivery state of a notification outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    /// The stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownStatus {
                kind: "notification",
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_status_roundtrip() {
        for status in [
            PurchaseStatus::Active,
            PurchaseStatus::Expired,
            PurchaseStatus::Cancelled,
            PurchaseStatus::Frozen,
            PurchaseStatus::PastDue,
        ] {
            let parsed: PurchaseStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("ACTIVE-ish".parse::<PurchaseStatus>().is_err());
    }

    #[test]
    fn test_gateway_mapping_to_purchase_status() {
        assert_eq!(
            GatewayPaymentStatus::Succeeded.purchase_status(),
            PurchaseStatus::Active
        );
        assert_eq!(
            GatewayPaymentStatus::Cancelled.purchase_status(),
            PurchaseStatus::Cancelled
        );
        assert_eq!(
            GatewayPaymentStatus::Failed.purchase_status(),
            PurchaseStatus::Frozen
        );
        assert_eq!(
            GatewayPaymentStatus::Other("DECLINED".to_owned()).purchase_status(),
            PurchaseStatus::PastDue
        );
    }

    #[test]
    fn test_gateway_parse_never_fails() {
        assert_eq!(
            GatewayPaymentStatus::from_gateway("SUCCEEDED"),
            GatewayPaymentStatus::Succeeded
        );
        assert_eq!(
            GatewayPaymentStatus::from_gateway("SOMETHING_NEW"),
            GatewayPaymentStatus::Other("SOMETHING_NEW".to_owned())
        );
    }

    #[test]
    fn test_serde_screaming_snake_case() {
        let json = serde_json::to_string(&PurchaseStatus::PastDue).unwrap();
        assert_eq!(json, "\"PAST_DUE\"");

        let kind: BillingEventKind = serde_json::from_str("\"DISCOUNT\"").unwrap();
        assert_eq!(kind, BillingEventKind::Discount);
    }
}
