//! Wallet balance and wallet transaction sync.
//!
//! Partner and guide wallets live in separate ledger tables; both adapters
//! pick the table from [`WalletType`]. The balance carried by a ledger row
//! is read as `balance_after`, then `balance_before`, then `0`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::{DomainAdapter, decode_row};
use crate::domain::{ChangeEvent, ChannelConfig, ChannelName, RowChange, RowFilter};
use crate::error::RealtimeError;

/// Wallet owner kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    /// Partner (mitra) wallet.
    Partner,
    /// Guide wallet.
    Guide,
}

impl WalletType {
    /// Ledger table for this wallet kind.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Partner => "mitra_wallet_transactions",
            Self::Guide => "guide_wallet_transactions",
        }
    }

    /// Lowercase name used in channel names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Partner => "partner",
            Self::Guide => "guide",
        }
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletType {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partner" => Ok(Self::Partner),
            "guide" => Ok(Self::Guide),
            other => Err(RealtimeError::InvalidRequest(format!(
                "unknown wallet type `{other}`"
            ))),
        }
    }
}

/// A wallet ledger row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Ledger row id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Wallet owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Signed amount of the movement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Balance before the movement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_before: Option<f64>,
    /// Balance after the movement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<f64>,
    /// Remaining columns.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WalletTransaction {
    /// Balance carried by this row: `balance_after`, else
    /// `balance_before`, else `0`.
    #[must_use]
    pub fn balance(&self) -> f64 {
        self.balance_after.or(self.balance_before).unwrap_or(0.0)
    }
}

/// Balance event emitted by [`WalletBalanceSync`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletBalance {
    /// Wallet owner.
    pub user_id: String,
    /// Wallet kind.
    pub wallet_type: WalletType,
    /// Current balance.
    pub balance: f64,
    /// The ledger row the balance was read from.
    pub transaction: WalletTransaction,
}

/// Follows the balance of one wallet: `wallet-<type>-<userId>`, every
/// event on the wallet's ledger table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletBalanceSync {
    wallet_type: WalletType,
    user_id: String,
}

impl WalletBalanceSync {
    /// Adapter for `user_id`'s wallet of kind `wallet_type`.
    #[must_use]
    pub fn new(wallet_type: WalletType, user_id: impl Into<String>) -> Self {
        Self {
            wallet_type,
            user_id: user_id.into(),
        }
    }
}

impl DomainAdapter for WalletBalanceSync {
    type Event = WalletBalance;

    fn channel_name(&self) -> Result<ChannelName, RealtimeError> {
        ChannelName::scoped(&format!("wallet-{}", self.wallet_type), &self.user_id)
    }

    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new(self.wallet_type.table(), ChangeEvent::All)
            .with_row_filter(RowFilter::eq("user_id", self.user_id.as_str()))
    }

    fn transform(&self, change: &RowChange<Value>) -> Result<Option<WalletBalance>, RealtimeError> {
        let Some(row) = change.record() else {
            return Ok(None);
        };
        let channel = format!("wallet-{}-{}", self.wallet_type, self.user_id);
        let transaction: WalletTransaction = decode_row(&channel, change, row)?;
        Ok(Some(WalletBalance {
            user_id: self.user_id.clone(),
            wallet_type: self.wallet_type,
            balance: transaction.balance(),
            transaction,
        }))
    }
}

/// Follows new ledger rows of one wallet:
/// `wallet-transactions-<type>-<userId>`, INSERT only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletTransactionSync {
    wallet_type: WalletType,
    user_id: String,
}

impl WalletTransactionSync {
    /// Adapter for `user_id`'s wallet of kind `wallet_type`.
    #[must_use]
    pub fn new(wallet_type: WalletType, user_id: impl Into<String>) -> Self {
        Self {
            wallet_type,
            user_id: user_id.into(),
        }
    }
}

impl DomainAdapter for WalletTransactionSync {
    type Event = WalletTransaction;

    fn channel_name(&self) -> Result<ChannelName, RealtimeError> {
        ChannelName::scoped(
            &format!("wallet-transactions-{}", self.wallet_type),
            &self.user_id,
        )
    }

    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new(self.wallet_type.table(), ChangeEvent::Insert)
            .with_row_filter(RowFilter::eq("user_id", self.user_id.as_str()))
    }

    fn transform(
        &self,
        change: &RowChange<Value>,
    ) -> Result<Option<WalletTransaction>, RealtimeError> {
        let Some(row) = change.new_row() else {
            return Ok(None);
        };
        let channel = format!("wallet-transactions-{}-{}", self.wallet_type, self.user_id);
        decode_row(&channel, change, row).map(Some)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn balance_of(row: Value) -> f64 {
        let adapter = WalletBalanceSync::new(WalletType::Partner, "U1");
        let change = RowChange::insert("mitra_wallet_transactions", row);
        let Ok(Some(event)) = adapter.transform(&change) else {
            panic!("expected balance");
        };
        event.balance
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn balance_precedence() {
        assert_eq!(
            balance_of(json!({"balance_after": 500, "balance_before": 300})),
            500.0
        );
        assert_eq!(balance_of(json!({"balance_before": 300})), 300.0);
        assert_eq!(balance_of(json!({})), 0.0);
        assert_eq!(
            balance_of(json!({"balance_after": null, "balance_before": 120.5})),
            120.5
        );
    }

    #[test]
    fn wallet_type_selects_table_and_channel() {
        let partner = WalletBalanceSync::new(WalletType::Partner, "U1");
        let guide = WalletBalanceSync::new(WalletType::Guide, "U1");
        assert!(partner.channel_name().is_ok_and(|n| n.as_str() == "wallet-partner-U1"));
        assert!(guide.channel_name().is_ok_and(|n| n.as_str() == "wallet-guide-U1"));
        assert_eq!(partner.channel_config().table(), "mitra_wallet_transactions");
        assert_eq!(guide.channel_config().table(), "guide_wallet_transactions");
        assert_eq!(guide.channel_config().event(), ChangeEvent::All);
    }

    #[test]
    fn transaction_sync_listens_to_inserts() {
        let adapter = WalletTransactionSync::new(WalletType::Guide, "U7");
        assert!(
            adapter
                .channel_name()
                .is_ok_and(|n| n.as_str() == "wallet-transactions-guide-U7")
        );
        assert_eq!(
            adapter.channel_config().to_string(),
            "public.guide_wallet_transactions:INSERT?user_id=eq.U7"
        );
        let change = RowChange::insert(
            "guide_wallet_transactions",
            json!({"id": 3, "user_id": "U7", "amount": -25.0, "type": "withdrawal"}),
        );
        let Ok(Some(tx)) = adapter.transform(&change) else {
            panic!("expected transaction");
        };
        assert_eq!(tx.amount, Some(-25.0));
        assert_eq!(tx.extra.get("type"), Some(&json!("withdrawal")));
    }

    #[test]
    fn wallet_type_parses() {
        assert!(matches!("guide".parse::<WalletType>(), Ok(WalletType::Guide)));
        assert!("admin".parse::<WalletType>().is_err());
    }
}
