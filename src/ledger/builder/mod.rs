//! Transfer construction: input selection, fee, change, assembly.
//!
//! Building has no side effects. Cells are never reserved or marked spent
//! here; spentness only comes from chain data during reconciliation.

pub mod fee;

#[cfg(test)]
mod tests;

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult, ValidationError};
use crate::ledger::address::Address;
use crate::ledger::domain::{
    Cell, CellInput, CellOutput, Network, Transaction, MIN_CELL_CAPACITY,
};

pub use fee::FeePolicy;

/// External signer. Receives the unsigned transaction and the cells it
/// spends, returns the witnesses in input order.
pub trait Signer: Send + Sync {
    fn sign(&self, tx: &Transaction, inputs: &[Cell]) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransfer {
    pub transaction: Transaction,
    pub inputs: Vec<Cell>,
    pub amount: u64,
    pub fee: u64,
    pub change: Option<u64>,
}

impl UnsignedTransfer {
    pub fn input_capacity(&self) -> u64 {
        self.inputs
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.capacity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub fee: u64,
    pub input_capacity: u64,
}

struct Selection {
    cells: Vec<Cell>,
    total: u64,
    fee: u64,
    change: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    network: Network,
    fee_policy: FeePolicy,
}

impl TransactionBuilder {
    pub fn new(network: Network, fee_policy: FeePolicy) -> Self {
        Self {
            network,
            fee_policy,
        }
    }

    pub fn fee_policy(&self) -> &FeePolicy {
        &self.fee_policy
    }

    pub fn build_unsigned(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
        available: &[Cell],
    ) -> LedgerResult<UnsignedTransfer> {
        self.validate(from, to, amount)?;

        if available.is_empty() {
            return Err(LedgerError::ResourceUnavailable(
                "no cells available yet, wait for sync".to_string(),
            ));
        }

        let selection = self.select(from, amount, available)?;
        let tx = self.assemble(from, to, amount, &selection);

        log::info!(
            "[BUILDER] {} inputs ({}), amount {}, fee {}, change {:?}",
            selection.cells.len(),
            selection.total,
            amount,
            selection.fee,
            selection.change
        );

        Ok(UnsignedTransfer {
            transaction: tx,
            inputs: selection.cells,
            amount,
            fee: selection.fee,
            change: selection.change,
        })
    }

    pub fn sign(
        &self,
        unsigned: UnsignedTransfer,
        signer: &dyn Signer,
    ) -> LedgerResult<SignedTransaction> {
        let witnesses = signer
            .sign(&unsigned.transaction, &unsigned.inputs)
            .map_err(|e| LedgerError::Signing(format!("{:#}", e)))?;

        let inputs = unsigned.transaction.inputs.len();
        if witnesses.is_empty() || witnesses.len() > inputs {
            return Err(LedgerError::Signing(format!(
                "signer returned {} witnesses for {} inputs",
                witnesses.len(),
                inputs
            )));
        }

        let input_capacity = unsigned.input_capacity();
        let mut transaction = unsigned.transaction;
        transaction.witnesses = witnesses;

        Ok(SignedTransaction {
            transaction,
            fee: unsigned.fee,
            input_capacity,
        })
    }

    pub fn build_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
        available: &[Cell],
        signer: &dyn Signer,
    ) -> LedgerResult<SignedTransaction> {
        let unsigned = self.build_unsigned(from, to, amount, available)?;
        self.sign(unsigned, signer)
    }

    fn validate(&self, from: &Address, to: &Address, amount: u64) -> Result<(), ValidationError> {
        if amount < MIN_CELL_CAPACITY {
            return Err(ValidationError::AmountBelowMinimum {
                amount,
                minimum: MIN_CELL_CAPACITY,
            });
        }
        for addr in [from, to] {
            if addr.network() != self.network {
                return Err(ValidationError::NetworkMismatch {
                    expected: self.network,
                    found: addr.network(),
                });
            }
        }
        if !from.script().is_secp256k1_blake160() {
            return Err(ValidationError::UnsupportedLock(from.script().code_hash.clone()));
        }
        Ok(())
    }

    /// Greedy accumulation over plain cells, largest first.
    fn select(&self, from: &Address, amount: u64, available: &[Cell]) -> LedgerResult<Selection> {
        let mut candidates: Vec<&Cell> = available
            .iter()
            .filter(|c| c.is_plain() && &c.lock == from.script())
            .collect();
        candidates.sort_by_key(|c| (Reverse(c.capacity), c.out_point.normalized()));

        let mut cells = Vec::new();
        let mut total = 0u64;
        for cell in candidates {
            cells.push(cell.clone());
            total = total.saturating_add(cell.capacity);

            let fee = self.fee_policy.estimate(cells.len(), 2);
            if total >= amount.saturating_add(fee) {
                let change = total - amount - fee;
                return Ok(if change >= MIN_CELL_CAPACITY {
                    Selection { cells, total, fee, change: Some(change) }
                } else {
                    // A sub-minimum change cell cannot exist; it goes to the fee.
                    Selection { cells, total, fee: total - amount, change: None }
                });
            }
        }

        // Everything is in; without a change output the transaction is smaller.
        let fee = self.fee_policy.estimate(cells.len().max(1), 1);
        let required = amount.saturating_add(fee);
        if !cells.is_empty() && total >= required {
            return Ok(Selection {
                cells,
                total,
                fee: total - amount,
                change: None,
            });
        }

        Err(LedgerError::InsufficientFunds {
            required,
            available: total,
        })
    }

    fn assemble(&self, from: &Address, to: &Address, amount: u64, selection: &Selection) -> Transaction {
        let inputs = selection
            .cells
            .iter()
            .map(|c| CellInput {
                since: 0,
                previous_output: c.out_point.normalized(),
            })
            .collect();

        let mut outputs = vec![CellOutput {
            capacity: amount,
            lock: to.script().clone(),
            type_script: None,
        }];
        if let Some(change) = selection.change {
            outputs.push(CellOutput {
                capacity: change,
                lock: from.script().clone(),
                type_script: None,
            });
        }

        let outputs_data = vec!["0x".to_string(); outputs.len()];

        Transaction {
            version: 0,
            cell_deps: vec![self.network.secp256k1_dep()],
            header_deps: vec![],
            inputs,
            outputs,
            outputs_data,
            witnesses: vec![],
        }
    }
}
