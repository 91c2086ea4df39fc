//! In-memory account ledger
//!
//! Accounts are shared across every action; each sits behind its own lock so
//! actions on different accounts never contend. Mutations bump the account
//! version, which plans use to detect that another action landed first.

use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use types::{AccountId, AccountVault, AssetId, RiskBudget, VaultError};

pub struct VaultLedger {
    accounts: DashMap<AccountId, Arc<RwLock<AccountVault>>>,
    default_budget: RiskBudget,
}

impl VaultLedger {
    pub fn new(default_budget: RiskBudget) -> Self {
        Self {
            accounts: DashMap::new(),
            default_budget,
        }
    }

    pub fn open_account(&self, account: AccountId, base_asset: AssetId) -> Result<(), VaultError> {
        self.insert(AccountVault::new(account, base_asset, self.default_budget))
    }

    /// Adds a fully formed account, e.g. one restored from a bootstrap file
    pub fn insert(&self, vault: AccountVault) -> Result<(), VaultError> {
        if vault.account_id.is_null() || vault.base_asset.is_null() {
            return Err(VaultError::invalid_request("account and base asset must be set"));
        }
        if vault.active_allocation() > Decimal::ONE {
            return Err(VaultError::invalid_request(format!(
                "{} allocates {} of its value",
                vault.account_id,
                vault.active_allocation()
            )));
        }
        match self.accounts.entry(vault.account_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(VaultError::invalid_request(
                format!("{} already exists", vault.account_id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!("Opened {} with base asset {}", vault.account_id, vault.base_asset);
                slot.insert(Arc::new(RwLock::new(vault)));
                Ok(())
            }
        }
    }

    /// Credits `value` as idle base-asset capital
    ///
    /// Allocation fractions shrink so every position keeps its absolute value.
    pub fn deposit(&self, account: AccountId, value: Decimal) -> Result<AccountVault, VaultError> {
        if value <= Decimal::ZERO {
            return Err(VaultError::invalid_request(format!(
                "deposit {value} must be positive"
            )));
        }
        self.update(account, |vault| {
            vault.ensure_actionable()?;
            let previous = vault.total_value;
            let total = previous + value;
            if previous > Decimal::ZERO {
                let scale = previous / total;
                for position in vault.positions.values_mut().filter(|p| p.active) {
                    position.allocation *= scale;
                }
            }
            vault.total_value = total;
            vault.version += 1;
            Ok(vault.clone())
        })
    }

    pub fn get(&self, account: AccountId) -> Result<AccountVault, VaultError> {
        let handle = self.handle(account)?;
        let vault = handle.read().clone();
        Ok(vault)
    }

    pub fn accounts(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.accounts.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Runs `f` against the account under its write lock
    pub fn update<T, F>(&self, account: AccountId, f: F) -> Result<T, VaultError>
    where
        F: FnOnce(&mut AccountVault) -> Result<T, VaultError>,
    {
        let handle = self.handle(account)?;
        let mut vault = handle.write();
        f(&mut *vault)
    }

    pub fn flag_reconciliation(&self, account: AccountId, reason: &str, now_ns: u64) {
        let flagged = self.update(account, |vault| {
            vault.flag_reconciliation(reason, now_ns);
            Ok(())
        });
        match flagged {
            Ok(()) => warn!("{} flagged for reconciliation: {}", account, reason),
            Err(e) => warn!("Could not flag {} for reconciliation: {}", account, e),
        }
    }

    /// Accepts the externally observed value and clears the reconciliation notice
    ///
    /// Allocation fractions are rescaled so position values stay as recorded,
    /// capped at the observed total.
    pub fn reconcile(
        &self,
        account: AccountId,
        observed_value: Decimal,
    ) -> Result<AccountVault, VaultError> {
        if observed_value < Decimal::ZERO {
            return Err(VaultError::invalid_request(format!(
                "observed value {observed_value} is negative"
            )));
        }
        self.update(account, |vault| {
            let recorded = vault.total_value;
            if observed_value.is_zero() {
                for position in vault.positions.values_mut() {
                    position.allocation = Decimal::ZERO;
                }
            } else if recorded > Decimal::ZERO && recorded != observed_value {
                let scale = recorded / observed_value;
                for position in vault.positions.values_mut().filter(|p| p.active) {
                    position.allocation *= scale;
                }
                let total = vault.active_allocation();
                if total > Decimal::ONE {
                    for position in vault.positions.values_mut().filter(|p| p.active) {
                        position.allocation /= total;
                    }
                }
            }

            if let Some(notice) = vault.reconciliation.take() {
                info!(
                    "{} reconciled: ledger {} -> observed {} (flagged: {})",
                    vault.account_id, notice.last_known_value, observed_value, notice.reason
                );
            }
            vault.total_value = observed_value;
            vault.version += 1;
            Ok(vault.clone())
        })
    }

    fn handle(&self, account: AccountId) -> Result<Arc<RwLock<AccountVault>>, VaultError> {
        self.accounts
            .get(&account)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(VaultError::AccountNotFound { account })
    }
}
