use super::*;
use crate::{
    config::{COINSTAKE_TX_VERSION, COIN_VALUE},
    crypto::KeyPair,
    script::ScriptTemplate,
};

fn cold_stake_output(staker: &KeyPair, owner: &KeyPair, amount: u64) -> TxOutput {
    let script = ScriptTemplate::ColdStake {
        staker: staker.key_id(),
        owner: owner.key_id(),
    }
    .to_script();
    TxOutput::new(amount, script)
}

fn coinstake(kernel: &TxOutput, outputs: Vec<TxOutput>) -> Transaction {
    let mut all = vec![TxOutput::marker()];
    all.extend(outputs);
    Transaction::new(
        COINSTAKE_TX_VERSION,
        vec![TxInput::unsigned(OutPoint::new(
            crate::crypto::hash(kernel.script.as_bytes()),
            0,
        ))],
        all,
        0,
    )
}

#[test]
fn test_staker_claim_paying_back_verifies() {
    let staker = KeyPair::new();
    let owner = KeyPair::new();
    let kernel = cold_stake_output(&staker, &owner, 10 * COIN_VALUE);

    let mut tx = coinstake(
        &kernel,
        vec![
            TxOutput::new(6 * COIN_VALUE, kernel.script.clone()),
            TxOutput::new(6 * COIN_VALUE, kernel.script.clone()),
        ],
    );
    tx.sign_input(0, &staker, SpendPath::Staker).unwrap();

    assert!(tx.is_coinstake());
    assert_eq!(verify_coinstake(&tx, &kernel), Ok(()));
}

#[test]
fn test_staker_cannot_redirect_outputs() {
    let staker = KeyPair::new();
    let owner = KeyPair::new();
    let kernel = cold_stake_output(&staker, &owner, 10 * COIN_VALUE);
    let thief = ScriptTemplate::PayToPubKeyHash(staker.key_id()).to_script();

    let mut tx = coinstake(
        &kernel,
        vec![
            TxOutput::new(11 * COIN_VALUE, kernel.script.clone()),
            TxOutput::new(COIN_VALUE, thief),
        ],
    );
    tx.sign_input(0, &staker, SpendPath::Staker).unwrap();

    assert_eq!(
        verify_coinstake(&tx, &kernel),
        Err(TransactionError::OutputScriptMismatch(2))
    );
}

#[test]
fn test_owner_path_with_staker_key_rejected() {
    let staker = KeyPair::new();
    let owner = KeyPair::new();
    let kernel = cold_stake_output(&staker, &owner, 10 * COIN_VALUE);

    let mut tx = coinstake(&kernel, vec![TxOutput::new(12 * COIN_VALUE, kernel.script.clone())]);
    tx.sign_input(0, &staker, SpendPath::Owner).unwrap();

    assert_eq!(
        verify_coinstake(&tx, &kernel),
        Err(TransactionError::KeyMismatch)
    );
}

#[test]
fn test_value_decrease_rejected() {
    let staker = KeyPair::new();
    let owner = KeyPair::new();
    let kernel = cold_stake_output(&staker, &owner, 10 * COIN_VALUE);

    let mut tx = coinstake(&kernel, vec![TxOutput::new(9 * COIN_VALUE, kernel.script.clone())]);
    tx.sign_input(0, &staker, SpendPath::Staker).unwrap();

    assert!(matches!(
        verify_coinstake(&tx, &kernel),
        Err(TransactionError::ValueDecrease { .. })
    ));
}

#[test]
fn test_tampered_after_signing_rejected() {
    let staker = KeyPair::new();
    let owner = KeyPair::new();
    let kernel = cold_stake_output(&staker, &owner, 10 * COIN_VALUE);

    let mut tx = coinstake(&kernel, vec![TxOutput::new(12 * COIN_VALUE, kernel.script.clone())]);
    tx.sign_input(0, &staker, SpendPath::Staker).unwrap();

    // bump the amount after the signature was produced
    let mut outputs = tx.get_outputs().to_vec();
    outputs[1].amount += 1;
    let tampered = Transaction::new(
        tx.get_version(),
        tx.get_inputs().to_vec(),
        outputs,
        tx.get_lock_time(),
    );

    assert!(matches!(
        verify_coinstake(&tampered, &kernel),
        Err(TransactionError::Signature(_))
    ));
}

#[test]
fn test_p2pkh_owner_coinstake() {
    let keypair = KeyPair::new();
    let kernel = TxOutput::new(
        5 * COIN_VALUE,
        ScriptTemplate::PayToPubKeyHash(keypair.key_id()).to_script(),
    );

    let mut tx = coinstake(&kernel, vec![TxOutput::new(7 * COIN_VALUE, kernel.script.clone())]);
    tx.sign_input(0, &keypair, SpendPath::Staker).unwrap();
    assert_eq!(
        verify_coinstake(&tx, &kernel),
        Err(TransactionError::WrongSpendPath)
    );

    tx.sign_input(0, &keypair, SpendPath::Owner).unwrap();
    assert_eq!(verify_coinstake(&tx, &kernel), Ok(()));
}

#[test]
fn test_not_a_coinstake() {
    let keypair = KeyPair::new();
    let kernel = TxOutput::new(
        COIN_VALUE,
        ScriptTemplate::PayToPubKeyHash(keypair.key_id()).to_script(),
    );
    let tx = Transaction::new(
        COINSTAKE_TX_VERSION,
        vec![TxInput::unsigned(OutPoint::new(Hash::zero(), 0))],
        vec![kernel.clone()],
        0,
    );
    assert!(!tx.is_coinstake());
    assert_eq!(
        verify_coinstake(&tx, &kernel),
        Err(TransactionError::NotCoinstake)
    );
}

#[test]
fn test_txid_changes_with_witness_but_sighash_does_not() {
    let keypair = KeyPair::new();
    let kernel = TxOutput::new(
        COIN_VALUE,
        ScriptTemplate::PayToPubKeyHash(keypair.key_id()).to_script(),
    );
    let mut tx = coinstake(&kernel, vec![TxOutput::new(COIN_VALUE, kernel.script.clone())]);
    let sighash = tx.get_signature_hash();
    let unsigned_id = tx.hash();

    tx.sign_input(0, &keypair, SpendPath::Owner).unwrap();
    assert_eq!(tx.get_signature_hash(), sighash);
    assert_ne!(tx.hash(), unsigned_id);

    let decoded = Transaction::from_bytes(&tx.to_bytes()).unwrap();
    assert_eq!(decoded, tx);
}
