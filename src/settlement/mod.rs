use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::HolderId;

pub type Amount = u64;

#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("payout of {amount} to {account} was rejected by the settlement channel")]
    Rejected { account: HolderId, amount: Amount },
}

/// Outbound value channel for custody withdrawals. A real channel may refuse
/// a transfer; callers must treat a refusal as if nothing moved.
pub trait Payouts {
    fn pay(&mut self, to: &HolderId, amount: Amount) -> Result<(), PayoutError>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CashAccounts {
    accounts: BTreeMap<HolderId, Amount>,
}

impl CashAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn available(&self, account: &HolderId) -> Amount {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    pub fn accounts(&self) -> &BTreeMap<HolderId, Amount> {
        &self.accounts
    }
}

impl Payouts for CashAccounts {
    fn pay(&mut self, to: &HolderId, amount: Amount) -> Result<(), PayoutError> {
        let balance = self.accounts.entry(to.clone()).or_default();
        *balance += amount;
        Ok(())
    }
}
