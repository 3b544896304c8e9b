use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::registry::{AssetId, AssetLedger, HolderId, RegistryError};
use crate::settlement::{Amount, PayoutError, Payouts};

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("caller {caller} is not the gallery operator")]
    Unauthorized { caller: HolderId },
    #[error("payment of {paid} does not match the listed price {expected} for asset {id}")]
    IncorrectPayment {
        id: AssetId,
        expected: Amount,
        paid: Amount,
    },
    #[error("asset {id} is not listed for sale")]
    AssetAlreadySold { id: AssetId },
    #[error("call rejected: another gallery operation is in flight")]
    Reentrancy,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Payout(#[from] PayoutError),
}

/// Listing prices keyed by asset id. An absent or zero entry means the asset
/// is not for sale; a successful purchase consumes the entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PriceTable {
    entries: BTreeMap<AssetId, Amount>,
}

impl PriceTable {
    pub fn get(&self, id: AssetId) -> Amount {
        self.entries.get(&id).copied().unwrap_or(0)
    }

    pub fn set(&mut self, id: AssetId, price: Amount) {
        if price == 0 {
            self.entries.remove(&id);
        } else {
            self.entries.insert(id, price);
        }
    }

    fn take(&mut self, id: AssetId) -> Option<Amount> {
        self.entries.remove(&id)
    }

    pub fn entries(&self) -> &BTreeMap<AssetId, Amount> {
        &self.entries
    }
}

/// Sale proceeds held by the gallery until the operator withdraws them.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CustodyAccount {
    collected: Amount,
}

impl CustodyAccount {
    pub fn balance(&self) -> Amount {
        self.collected
    }

    fn credit(&mut self, amount: Amount) {
        self.collected += amount;
    }

    fn drain(&mut self) -> Amount {
        std::mem::take(&mut self.collected)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GalleryEvent {
    Minted {
        id: AssetId,
        holder: HolderId,
        uri: String,
        price: Amount,
    },
    PriceSet {
        id: AssetId,
        price: Amount,
    },
    Purchased {
        id: AssetId,
        seller: HolderId,
        buyer: HolderId,
        price: Amount,
    },
    Withdrawn {
        to: HolderId,
        amount: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GallerySnapshot {
    pub operator: HolderId,
    pub holdings: BTreeMap<AssetId, HolderId>,
    pub prices: BTreeMap<AssetId, Amount>,
    pub custody: Amount,
    pub events: usize,
    pub digest: [u8; 32],
}

/// The marketplace core: one operator, a price table, and an escrow counter.
///
/// The asset-ownership ledger and the outbound payment channel are injected
/// per call, so the gallery can run against the in-memory implementations or
/// against test doubles. Every mutating operation either completes fully or
/// leaves no observable change: all validation runs first, the single
/// fallible collaborator call comes next, and local commits happen last.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gallery {
    operator: HolderId,
    prices: PriceTable,
    custody: CustodyAccount,
    uris: BTreeMap<AssetId, String>,
    events: Vec<GalleryEvent>,
    #[serde(skip)]
    in_flight: bool,
}

impl Gallery {
    pub fn new(operator: HolderId) -> Self {
        Self {
            operator,
            prices: PriceTable::default(),
            custody: CustodyAccount::default(),
            uris: BTreeMap::new(),
            events: Vec::new(),
            in_flight: false,
        }
    }

    pub fn operator(&self) -> &HolderId {
        &self.operator
    }

    /// Current listed price, 0 when the asset is not for sale.
    pub fn price_of(&self, id: AssetId) -> Amount {
        self.prices.get(id)
    }

    pub fn uri_of(&self, id: AssetId) -> Option<&str> {
        self.uris.get(&id).map(String::as_str)
    }

    pub fn events(&self) -> &[GalleryEvent] {
        &self.events
    }

    /// Mint an asset held by the gallery operator and list it at `price`.
    /// One asset per call; the id is caller-chosen and must be fresh.
    pub fn mint_to_self(
        &mut self,
        caller: &HolderId,
        ledger: &mut impl AssetLedger,
        uri: &str,
        id: AssetId,
        price: Amount,
    ) -> Result<(), GalleryError> {
        self.authorize(caller)?;
        self.begin()?;
        let holder = self.operator.clone();
        let result = self.mint_in(ledger, uri, id, &holder, price);
        self.in_flight = false;
        result
    }

    /// Mint an asset held by `holder`. The price entry is recorded even
    /// though the gallery is not the holder.
    pub fn mint_to_holder(
        &mut self,
        caller: &HolderId,
        ledger: &mut impl AssetLedger,
        uri: &str,
        id: AssetId,
        holder: &HolderId,
        price: Amount,
    ) -> Result<(), GalleryError> {
        self.authorize(caller)?;
        self.begin()?;
        let result = self.mint_in(ledger, uri, id, holder, price);
        self.in_flight = false;
        result
    }

    /// Overwrite the listing price. Unknown ids are rejected; a zero price
    /// clears the listing.
    pub fn set_price(
        &mut self,
        caller: &HolderId,
        ledger: &impl AssetLedger,
        id: AssetId,
        price: Amount,
    ) -> Result<(), GalleryError> {
        self.authorize(caller)?;
        self.begin()?;
        let result = self.set_price_in(ledger, id, price);
        self.in_flight = false;
        result
    }

    /// Purchase `id` for exactly its listed price. On success ownership
    /// moves from the current holder to `caller`, the listing is consumed,
    /// and custody is credited by `paid`; on failure nothing changes.
    pub fn buy(
        &mut self,
        caller: &HolderId,
        ledger: &mut impl AssetLedger,
        id: AssetId,
        paid: Amount,
    ) -> Result<(), GalleryError> {
        self.begin()?;
        let result = self.buy_in(caller, ledger, id, paid);
        self.in_flight = false;
        result
    }

    /// Escrowed balance; equals the sum of sale payments not yet withdrawn.
    pub fn contract_balance(&self, caller: &HolderId) -> Result<Amount, GalleryError> {
        self.authorize(caller)?;
        Ok(self.custody.balance())
    }

    /// Move the entire custody balance to the operator's account through the
    /// given channel. A refused payout leaves custody untouched. Returns the
    /// amount moved.
    pub fn withdraw(
        &mut self,
        caller: &HolderId,
        payouts: &mut impl Payouts,
    ) -> Result<Amount, GalleryError> {
        self.authorize(caller)?;
        self.begin()?;
        let result = self.withdraw_in(payouts);
        self.in_flight = false;
        result
    }

    pub fn snapshot(&self, holdings: &BTreeMap<AssetId, HolderId>) -> GallerySnapshot {
        GallerySnapshot {
            operator: self.operator.clone(),
            holdings: holdings.clone(),
            prices: self.prices.entries().clone(),
            custody: self.custody.balance(),
            events: self.events.len(),
            digest: snapshot_digest(holdings, self.prices.entries(), self.custody.balance()),
        }
    }

    fn authorize(&self, caller: &HolderId) -> Result<(), GalleryError> {
        if *caller != self.operator {
            return Err(GalleryError::Unauthorized {
                caller: caller.clone(),
            });
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<(), GalleryError> {
        if self.in_flight {
            return Err(GalleryError::Reentrancy);
        }
        self.in_flight = true;
        Ok(())
    }

    fn mint_in(
        &mut self,
        ledger: &mut impl AssetLedger,
        uri: &str,
        id: AssetId,
        holder: &HolderId,
        price: Amount,
    ) -> Result<(), GalleryError> {
        ledger.mint(holder, id)?;
        self.uris.insert(id, uri.to_string());
        self.prices.set(id, price);
        self.events.push(GalleryEvent::Minted {
            id,
            holder: holder.clone(),
            uri: uri.to_string(),
            price,
        });
        Ok(())
    }

    fn set_price_in(
        &mut self,
        ledger: &impl AssetLedger,
        id: AssetId,
        price: Amount,
    ) -> Result<(), GalleryError> {
        ledger.owner_of(id)?;
        self.prices.set(id, price);
        self.events.push(GalleryEvent::PriceSet { id, price });
        Ok(())
    }

    fn buy_in(
        &mut self,
        buyer: &HolderId,
        ledger: &mut impl AssetLedger,
        id: AssetId,
        paid: Amount,
    ) -> Result<(), GalleryError> {
        let seller = ledger.owner_of(id)?;
        let price = self.prices.get(id);
        if price == 0 {
            return Err(GalleryError::AssetAlreadySold { id });
        }
        if paid != price {
            return Err(GalleryError::IncorrectPayment {
                id,
                expected: price,
                paid,
            });
        }
        // The ledger transfer is the only fallible step; no local state is
        // touched until it has succeeded.
        ledger.transfer(&seller, buyer, id)?;
        self.prices.take(id);
        self.custody.credit(paid);
        self.events.push(GalleryEvent::Purchased {
            id,
            seller,
            buyer: buyer.clone(),
            price,
        });
        Ok(())
    }

    fn withdraw_in(&mut self, payouts: &mut impl Payouts) -> Result<Amount, GalleryError> {
        let amount = self.custody.balance();
        payouts.pay(&self.operator, amount)?;
        self.custody.drain();
        self.events.push(GalleryEvent::Withdrawn {
            to: self.operator.clone(),
            amount,
        });
        Ok(amount)
    }
}

fn snapshot_digest(
    holdings: &BTreeMap<AssetId, HolderId>,
    prices: &BTreeMap<AssetId, Amount>,
    custody: Amount,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for (id, holder) in holdings {
        let mut hasher = Sha256::new();
        hasher.update(b"asset");
        hasher.update(id.to_le_bytes());
        hasher.update(holder.as_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (id, price) in prices {
        let mut hasher = Sha256::new();
        hasher.update(b"price");
        hasher.update(id.to_le_bytes());
        hasher.update(price.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    let mut hasher = Sha256::new();
    hasher.update(b"custody");
    hasher.update(custody.to_le_bytes());
    leaves.push(hasher.finalize().into());
    fold_digest(leaves)
}

fn fold_digest(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for pair in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(pair[0]);
            if pair.len() == 2 {
                hasher.update(pair[1]);
            } else {
                hasher.update(pair[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    // The custody leaf is always present, so the fold never starts empty.
    leaves.pop().unwrap_or_else(|| Sha256::digest(b"gallery-empty").into())
}
