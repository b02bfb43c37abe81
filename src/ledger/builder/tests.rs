use crate::error::{LedgerError, ValidationError};
use crate::ledger::address::Address;
use crate::ledger::builder::fee::FeePolicy;
use crate::ledger::builder::{Signer, TransactionBuilder};
use crate::ledger::domain::script::SECP256K1_MULTISIG_CODE_HASH;
use crate::ledger::domain::{
    Cell, DepType, Network, OutPoint, Script, ScriptHashType, Transaction, MIN_CELL_CAPACITY,
};

// =========================================================================
// Helpers
// =========================================================================

const CKB: u64 = 100_000_000;

struct FixedSigner;

impl Signer for FixedSigner {
    fn sign(&self, tx: &Transaction, inputs: &[Cell]) -> anyhow::Result<Vec<String>> {
        assert_eq!(tx.inputs.len(), inputs.len());
        Ok(vec![format!("0x{}", "00".repeat(85))])
    }
}

struct BrokenSigner;

impl Signer for BrokenSigner {
    fn sign(&self, _tx: &Transaction, _inputs: &[Cell]) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("key locked")
    }
}

struct SilentSigner;

impl Signer for SilentSigner {
    fn sign(&self, _tx: &Transaction, _inputs: &[Cell]) -> anyhow::Result<Vec<String>> {
        Ok(vec![])
    }
}

fn sender() -> Address {
    Address::new(
        Network::Testnet,
        Script::secp256k1_blake160("0x0fae74b7377476606e196ec17498d315ec12abf9"),
    )
}

fn recipient() -> Address {
    Address::new(
        Network::Testnet,
        Script::secp256k1_blake160("0xc8328aabcd9b9e8e64fbc566c4385c3bdeb219d7"),
    )
}

fn builder() -> TransactionBuilder {
    TransactionBuilder::new(Network::Testnet, FeePolicy::default())
}

fn cell(n: u8, capacity: u64) -> Cell {
    Cell {
        out_point: OutPoint::new(format!("0x{}", format!("{:02x}", n).repeat(32)), 0),
        capacity,
        lock: sender().script().clone(),
        type_script: None,
        data: "0x".to_string(),
        block_number: u64::from(n),
    }
}

fn assert_balanced(tx: &Transaction, inputs: &[Cell], fee: u64) {
    let input_sum: u64 = inputs.iter().map(|c| c.capacity).sum();
    assert_eq!(tx.output_capacity() + fee, input_sum);
    for output in &tx.outputs {
        assert!(output.capacity >= MIN_CELL_CAPACITY);
    }
    assert_eq!(tx.outputs.len(), tx.outputs_data.len());
}

// =========================================================================
// Tests
// =========================================================================

#[test]
fn capacity_is_conserved_across_amounts() {
    let cells = vec![
        cell(1, 70 * CKB),
        cell(2, 150 * CKB),
        cell(3, 1_000 * CKB),
        cell(4, 61 * CKB + 5),
    ];
    let b = builder();
    for amount in [
        61 * CKB,
        99 * CKB,
        900 * CKB,
        1_000 * CKB,
        1_100 * CKB,
        1_200 * CKB,
        1_280 * CKB,
    ] {
        let unsigned = b
            .build_unsigned(&sender(), &recipient(), amount, &cells)
            .unwrap_or_else(|e| panic!("amount {}: {}", amount, e));
        assert_balanced(&unsigned.transaction, &unsigned.inputs, unsigned.fee);
        assert_eq!(unsigned.transaction.outputs[0].capacity, amount);
        assert!(unsigned.fee >= b.fee_policy().min_fee);
    }
}

#[test]
fn change_output_returns_to_sender() {
    let b = builder();
    let unsigned = b
        .build_unsigned(&sender(), &recipient(), 100 * CKB, &[cell(1, 300 * CKB)])
        .unwrap();

    let fee = b.fee_policy().estimate(1, 2);
    assert_eq!(unsigned.fee, fee);
    assert_eq!(unsigned.change, Some(200 * CKB - fee));
    let tx = &unsigned.transaction;
    assert_eq!(tx.outputs.len(), 2);
    assert_eq!(&tx.outputs[0].lock, recipient().script());
    assert_eq!(&tx.outputs[1].lock, sender().script());
    assert_eq!(tx.outputs_data, vec!["0x".to_string(), "0x".to_string()]);
}

#[test]
fn small_change_is_folded_into_fee() {
    let unsigned = builder()
        .build_unsigned(&sender(), &recipient(), 61 * CKB, &[cell(1, 100 * CKB)])
        .unwrap();
    assert_eq!(unsigned.change, None);
    assert_eq!(unsigned.transaction.outputs.len(), 1);
    assert_eq!(unsigned.fee, 39 * CKB);
}

#[test]
fn exact_single_output_fit() {
    let b = builder();
    let fee_one = b.fee_policy().estimate(1, 1);
    let unsigned = b
        .build_unsigned(&sender(), &recipient(), 100 * CKB, &[cell(1, 100 * CKB + fee_one)])
        .unwrap();
    assert_eq!(unsigned.fee, fee_one);
    assert_eq!(unsigned.transaction.outputs.len(), 1);
}

#[test]
fn largest_cells_are_spent_first() {
    let cells = vec![cell(1, 80 * CKB), cell(2, 500 * CKB), cell(3, 90 * CKB)];
    let unsigned = builder()
        .build_unsigned(&sender(), &recipient(), 100 * CKB, &cells)
        .unwrap();
    assert_eq!(unsigned.inputs.len(), 1);
    assert_eq!(unsigned.inputs[0].capacity, 500 * CKB);
}

#[test]
fn insufficient_funds() {
    let err = builder()
        .build_unsigned(&sender(), &recipient(), 500 * CKB, &[cell(1, 100 * CKB), cell(2, 200 * CKB)])
        .unwrap_err();
    match err {
        LedgerError::InsufficientFunds { required, available } => {
            assert_eq!(available, 300 * CKB);
            assert!(required > 500 * CKB);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn no_cells_is_resource_unavailable() {
    let err = builder()
        .build_unsigned(&sender(), &recipient(), 100 * CKB, &[])
        .unwrap_err();
    assert!(matches!(err, LedgerError::ResourceUnavailable(_)));
    assert!(err.is_retryable());
}

#[test]
fn amount_below_minimum_checked_before_cells() {
    let err = builder()
        .build_unsigned(&sender(), &recipient(), 60 * CKB, &[])
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::AmountBelowMinimum { .. })
    ));
}

#[test]
fn cells_with_type_or_data_are_not_spent() {
    let mut typed = cell(1, 1_000 * CKB);
    typed.type_script = Some(Script::new("0x01", ScriptHashType::Type, "0x"));
    let mut with_data = cell(2, 1_000 * CKB);
    with_data.data = "0x1234".to_string();

    let err = builder()
        .build_unsigned(&sender(), &recipient(), 100 * CKB, &[typed, with_data])
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { available: 0, .. }));
}

#[test]
fn rejects_cross_network_recipient() {
    let mainnet = Address::new(Network::Mainnet, recipient().script().clone());
    let err = builder()
        .build_unsigned(&sender(), &mainnet, 100 * CKB, &[cell(1, 300 * CKB)])
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::NetworkMismatch { .. })
    ));
}

#[test]
fn rejects_non_secp_sender() {
    let multisig = Address::new(
        Network::Testnet,
        Script::new(SECP256K1_MULTISIG_CODE_HASH, ScriptHashType::Type, "0x00"),
    );
    let err = builder()
        .build_unsigned(&multisig, &recipient(), 100 * CKB, &[cell(1, 300 * CKB)])
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::UnsupportedLock(_))
    ));
}

#[test]
fn emits_secp_dep_group() {
    let unsigned = builder()
        .build_unsigned(&sender(), &recipient(), 100 * CKB, &[cell(1, 300 * CKB)])
        .unwrap();
    let tx = &unsigned.transaction;
    assert_eq!(tx.version, 0);
    assert_eq!(tx.cell_deps.len(), 1);
    assert_eq!(tx.cell_deps[0].dep_type, DepType::DepGroup);
    assert_eq!(tx.cell_deps[0], Network::Testnet.secp256k1_dep());
    assert!(tx.inputs.iter().all(|i| i.since == 0));
    assert!(tx.witnesses.is_empty());
}

#[test]
fn build_transfer_attaches_witnesses() {
    let signed = builder()
        .build_transfer(&sender(), &recipient(), 100 * CKB, &[cell(1, 300 * CKB)], &FixedSigner)
        .unwrap();
    assert_eq!(signed.transaction.witnesses.len(), 1);
    assert_eq!(
        signed.transaction.output_capacity() + signed.fee,
        signed.input_capacity
    );
}

#[test]
fn signer_failures_are_signing_errors() {
    let b = builder();
    let cells = [cell(1, 300 * CKB)];

    let err = b
        .build_transfer(&sender(), &recipient(), 100 * CKB, &cells, &BrokenSigner)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Signing(ref m) if m.contains("key locked")));

    let err = b
        .build_transfer(&sender(), &recipient(), 100 * CKB, &cells, &SilentSigner)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Signing(_)));
}
