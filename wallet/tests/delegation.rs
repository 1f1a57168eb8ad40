use std::sync::Arc;

use pos_common::{
    config::{COIN_VALUE, MIN_COLD_STAKING_AMOUNT},
    crypto::{hash, Address, Hashable, KeyId, KeyPair},
    network::Network,
    script::ScriptTemplate,
    transaction::{verify_coinstake, OutPoint, Transaction, TransactionError, TxOutput},
};
use pos_wallet::{
    chain::ChainSource,
    classifier::ScriptClass,
    config::StakingConfig,
    delegation::{DelegationManager, DelegationState},
    error::StakingError,
    keystore::Keystore,
    ledger::{LedgerView, UnspentOutput},
    simulator::DevnetChain,
    staking::{
        CycleOutcome, KernelCandidate, KernelSolution, NotStakingReason, StakeSplitThreshold,
        Staker, StakingSettings,
    },
};
use proptest::prelude::*;

const EASY_BITS: u32 = 0x2100_ffff;

struct ColdSetup {
    chain: Arc<DevnetChain>,
    staker_keystore: Arc<Keystore>,
    staker_delegations: Arc<DelegationManager>,
    owner_keystore: Arc<Keystore>,
    kernel: OutPoint,
}

// External owner delegating one output to our staker wallet
async fn cold_setup(amount: u64) -> ColdSetup {
    let chain = Arc::new(DevnetChain::new(Network::Devnet, EASY_BITS));
    let staker_keystore = Arc::new(Keystore::create(Network::Devnet, "staker").unwrap());
    let owner_keystore = Arc::new(Keystore::create(Network::Devnet, "owner").unwrap());
    let staker_delegations = Arc::new(DelegationManager::new(staker_keystore.clone(), false));
    let owner_delegations = DelegationManager::new(owner_keystore.clone(), false);

    let staker_address = staker_keystore.new_address().await.unwrap();
    let output = owner_delegations
        .create_delegation(None, &staker_address.to_string(), amount, None)
        .await
        .unwrap();

    chain.watch(staker_keystore.key_set().await).await;
    chain.watch(owner_keystore.key_set().await).await;
    let kernel = chain.fund(vec![output]).await[0];

    ColdSetup {
        chain,
        staker_keystore,
        staker_delegations,
        owner_keystore,
        kernel,
    }
}

fn staker_for(setup: &ColdSetup) -> Arc<Staker> {
    Staker::new(
        StakingSettings::from_config(&StakingConfig::default()).unwrap(),
        setup.chain.clone(),
        setup.chain.clone(),
        setup.staker_keystore.clone(),
        Arc::new(LedgerView::new()),
        setup.staker_delegations.clone(),
    )
}

#[tokio::test]
async fn test_self_delegation_rejected() {
    let keystore = Arc::new(Keystore::create(Network::Devnet, "pass").unwrap());
    let manager = DelegationManager::new(keystore.clone(), false);
    let own = keystore.new_address().await.unwrap();

    assert!(matches!(
        manager
            .create_delegation(None, &own.to_string(), 10 * COIN_VALUE, None)
            .await,
        Err(StakingError::InvalidStakerAddress(_))
    ));

    manager.set_allow_self_delegation(true);
    let output = manager
        .create_delegation(None, &own.to_string(), 10 * COIN_VALUE, None)
        .await
        .unwrap();
    assert!(output.script.template().unwrap().is_cold_stake());

    // staker and owner can never be the same key
    assert!(matches!(
        manager
            .create_delegation(Some(own), &own.to_string(), 10 * COIN_VALUE, None)
            .await,
        Err(StakingError::InvalidStakerAddress(_))
    ));
}

#[tokio::test]
async fn test_invalid_delegation_requests() {
    let keystore = Arc::new(Keystore::create(Network::Devnet, "pass").unwrap());
    let manager = DelegationManager::new(keystore.clone(), false);
    let external = KeyPair::new().key_id();

    assert!(matches!(
        manager
            .create_delegation(None, "not an address", 10 * COIN_VALUE, None)
            .await,
        Err(StakingError::InvalidStakerAddress(_))
    ));

    let testnet = Address::new(Network::Testnet, external);
    assert!(matches!(
        manager
            .create_delegation(None, &testnet.to_string(), 10 * COIN_VALUE, None)
            .await,
        Err(StakingError::InvalidStakerAddress(_))
    ));

    let staker = Address::new(Network::Devnet, external).to_string();
    assert!(matches!(
        manager
            .create_delegation(None, &staker, MIN_COLD_STAKING_AMOUNT - 1, None)
            .await,
        Err(StakingError::AmountTooLow { .. })
    ));

    keystore.lock().await;
    assert!(matches!(
        manager.create_delegation(None, &staker, 10 * COIN_VALUE, None).await,
        Err(StakingError::WalletLocked)
    ));
}

#[tokio::test]
async fn test_sync_discovers_with_pending_label() {
    let keystore = Arc::new(Keystore::create(Network::Devnet, "pass").unwrap());
    let manager = DelegationManager::new(keystore.clone(), false);
    let chain = DevnetChain::new(Network::Devnet, EASY_BITS);
    let staker = Address::new(Network::Devnet, KeyPair::new().key_id());

    let output = manager
        .create_delegation(None, &staker.to_string(), 10 * COIN_VALUE, Some("savings".into()))
        .await
        .unwrap();
    chain.watch(keystore.key_set().await).await;
    let outpoint = chain.fund(vec![output]).await[0];

    let tip = chain.best_tip().await.unwrap();
    let report = manager.sync(&chain.snapshot(&tip).await.unwrap()).await.unwrap();
    assert_eq!(report.discovered, 1);

    let record = manager.delegation_for(&outpoint).await.unwrap();
    assert_eq!(record.staker, staker);
    assert_eq!(record.label.as_deref(), Some("savings"));
    assert_eq!(record.amount, 10 * COIN_VALUE);
    assert!(keystore.is_mine(&record.owner).await);
}

#[tokio::test]
async fn test_void_then_claim_fails() {
    let setup = cold_setup(100 * COIN_VALUE).await;
    let staker = staker_for(&setup);

    // first cycle discovers the delegation and stakes it
    assert!(matches!(
        staker.run_cycle().await.unwrap(),
        CycleOutcome::Staked { .. }
    ));

    let tip = setup.chain.best_tip().await.unwrap();
    let snapshot = setup.chain.snapshot(&tip).await.unwrap();
    let report = setup.staker_delegations.sync(&snapshot).await.unwrap();
    assert_eq!(report.migrated, 1);
    assert!(setup.staker_delegations.delegation_for(&setup.kernel).await.is_none());

    let migrated = snapshot.outputs[0].clone();
    let record = setup
        .staker_delegations
        .delegation_for(&migrated.outpoint)
        .await
        .unwrap();
    assert!(record.is_active());
    assert_eq!(record.amount, migrated.amount);

    let voided = setup
        .staker_delegations
        .void_delegation(&migrated.outpoint)
        .await
        .unwrap();
    assert_eq!(voided.state, DelegationState::Voided);
    assert!(matches!(
        setup.staker_delegations.void_delegation(&migrated.outpoint).await,
        Err(StakingError::DelegationAlreadyVoided)
    ));

    let ScriptTemplate::ColdStake { staker: staker_id, owner } = migrated.script.template().unwrap() else {
        panic!("migrated output is not a cold stake");
    };
    let solution = KernelSolution {
        candidate: KernelCandidate {
            output: migrated,
            class: ScriptClass::ColdStakeable {
                owner,
                staker: staker_id,
            },
            modifier: 0,
        },
        timestamp: tip.time + 1,
        kernel_hash: hash(b"kernel"),
    };
    assert!(matches!(
        setup
            .staker_delegations
            .sign_kernel_claim(&solution, 0, StakeSplitThreshold::disabled())
            .await,
        Err(StakingError::DelegationAlreadyVoided)
    ));

    // and the voided output is never selected again
    assert_eq!(
        staker.run_cycle().await.unwrap(),
        CycleOutcome::Inactive(NotStakingReason::NoEligibleOutputs)
    );
}

#[tokio::test]
async fn test_owner_spend_voids_delegation() {
    let setup = cold_setup(100 * COIN_VALUE).await;
    let tip = setup.chain.best_tip().await.unwrap();
    setup
        .staker_delegations
        .sync(&setup.chain.snapshot(&tip).await.unwrap())
        .await
        .unwrap();
    assert!(setup
        .staker_delegations
        .delegation_for(&setup.kernel)
        .await
        .unwrap()
        .is_active());

    let owner_id = *setup.owner_keystore.key_set().await.iter().next().unwrap();
    let owner_key = setup.owner_keystore.spending_keypair(&owner_id).await.unwrap();
    let back_home = ScriptTemplate::PayToPubKeyHash(owner_id).to_script();
    setup
        .chain
        .spend(
            setup.kernel,
            vec![TxOutput::new(100 * COIN_VALUE, back_home)],
            &owner_key,
        )
        .await
        .unwrap();

    let tip = setup.chain.best_tip().await.unwrap();
    let report = setup
        .staker_delegations
        .sync(&setup.chain.snapshot(&tip).await.unwrap())
        .await
        .unwrap();
    assert_eq!(report.voided, 1);
    assert_eq!(
        setup
            .staker_delegations
            .delegation_for(&setup.kernel)
            .await
            .unwrap()
            .state,
        DelegationState::Voided
    );
}

#[tokio::test]
async fn test_spent_void_is_forgotten_after_history() {
    let setup = cold_setup(100 * COIN_VALUE).await;
    let tip = setup.chain.best_tip().await.unwrap();
    setup
        .staker_delegations
        .sync(&setup.chain.snapshot(&tip).await.unwrap())
        .await
        .unwrap();

    let owner_id = *setup.owner_keystore.key_set().await.iter().next().unwrap();
    let owner_key = setup.owner_keystore.spending_keypair(&owner_id).await.unwrap();
    setup
        .chain
        .spend(
            setup.kernel,
            vec![TxOutput::new(
                100 * COIN_VALUE,
                ScriptTemplate::PayToPubKeyHash(owner_id).to_script(),
            )],
            &owner_key,
        )
        .await
        .unwrap();

    let tip = setup.chain.best_tip().await.unwrap();
    let report = setup
        .staker_delegations
        .sync(&setup.chain.snapshot(&tip).await.unwrap())
        .await
        .unwrap();
    assert_eq!(report.voided, 1);
    assert_eq!(report.pruned, 0);
    assert!(setup.staker_delegations.voided_outputs().await.contains(&setup.kernel));

    // still reported while the spend is recent
    let mut tip = setup.chain.mine_empty_block().await;
    let report = setup
        .staker_delegations
        .sync(&setup.chain.snapshot(&tip).await.unwrap())
        .await
        .unwrap();
    assert_eq!(report.pruned, 0);
    assert!(setup.staker_delegations.delegation_for(&setup.kernel).await.is_some());

    for _ in 0..100 {
        tip = setup.chain.mine_empty_block().await;
    }
    let snapshot = setup.chain.snapshot(&tip).await.unwrap();
    assert!(snapshot.spent.is_empty());
    let report = setup.staker_delegations.sync(&snapshot).await.unwrap();
    assert_eq!(report.pruned, 1);
    assert!(setup.staker_delegations.delegation_for(&setup.kernel).await.is_none());
    assert!(setup.staker_delegations.voided_outputs().await.is_empty());
    assert!(setup.staker_delegations.list_delegations().await.is_empty());
}

#[tokio::test]
async fn test_unspent_void_is_kept() {
    let setup = cold_setup(100 * COIN_VALUE).await;
    let mut tip = setup.chain.best_tip().await.unwrap();
    let snapshot = setup.chain.snapshot(&tip).await.unwrap();
    setup.staker_delegations.sync(&snapshot).await.unwrap();
    setup
        .staker_delegations
        .void_delegation(&setup.kernel)
        .await
        .unwrap();

    for _ in 0..101 {
        tip = setup.chain.mine_empty_block().await;
    }
    let report = setup
        .staker_delegations
        .sync(&setup.chain.snapshot(&tip).await.unwrap())
        .await
        .unwrap();
    assert_eq!(report.pruned, 0);
    assert!(setup.staker_delegations.voided_outputs().await.contains(&setup.kernel));
}

#[tokio::test]
async fn test_staker_cannot_claim_without_staking_unlock() {
    let setup = cold_setup(100 * COIN_VALUE).await;
    let staker = staker_for(&setup);
    setup.staker_keystore.lock().await;

    assert_eq!(
        staker.run_cycle().await.unwrap(),
        CycleOutcome::Inactive(NotStakingReason::WalletLocked)
    );

    setup.staker_keystore.unlock_for_staking("staker", 0).await.unwrap();
    staker.invalidate().await;
    assert!(matches!(
        staker.run_cycle().await.unwrap(),
        CycleOutcome::Staked { .. }
    ));
}

fn cold_solution(staker: KeyId, owner: KeyId, amount: u64) -> KernelSolution {
    let script = ScriptTemplate::ColdStake { staker, owner }.to_script();
    KernelSolution {
        candidate: KernelCandidate {
            output: UnspentOutput {
                outpoint: OutPoint::new(hash(b"prop"), 0),
                amount,
                script,
                confirmations: 100,
                creation_height: 1,
                creation_time: 0,
                from_me: false,
            },
            class: ScriptClass::ColdStakeable { owner, staker },
            modifier: 0,
        },
        timestamp: 100,
        kernel_hash: hash(b"prop kernel"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn cold_stake_claims_only_pay_back_to_the_delegation(
        amount in MIN_COLD_STAKING_AMOUNT..1_000_000 * COIN_VALUE,
        reward in 0u64..10 * COIN_VALUE,
        threshold_coins in prop_oneof![Just(0u64), 1u64..500],
        redirect in any::<prop::sample::Index>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let keystore = Arc::new(Keystore::create(Network::Devnet, "pass").unwrap());
            let staker_key = keystore.generate_key().await.unwrap().key_id();
            keystore.lock().await;
            keystore.unlock_for_staking("pass", 0).await.unwrap();

            let manager = DelegationManager::new(keystore.clone(), false);
            let owner = KeyPair::new().key_id();
            let solution = cold_solution(staker_key, owner, amount);
            let kernel_output = solution.candidate.output.to_tx_output();
            let threshold = StakeSplitThreshold::new(threshold_coins * COIN_VALUE).unwrap();

            let tx = manager.sign_kernel_claim(&solution, reward, threshold).await.unwrap();
            prop_assert!(verify_coinstake(&tx, &kernel_output).is_ok());
            prop_assert!(tx.get_outputs()[1..].iter().all(|o| o.script == kernel_output.script));
            prop_assert_eq!(tx.get_output_total(), Some(amount + reward));

            // a redirected claim is refused by the keystore and by verification
            let mut outputs = tx.get_outputs().to_vec();
            let index = 1 + redirect.index(outputs.len() - 1);
            outputs[index].script = ScriptTemplate::PayToPubKeyHash(staker_key).to_script();
            let mut redirected = Transaction::new(
                tx.get_version(),
                tx.get_inputs().to_vec(),
                outputs,
                tx.get_lock_time(),
            );
            let refused = keystore
                .sign_claim(&mut redirected, &kernel_output, &solution.candidate.class)
                .await;
            prop_assert!(matches!(
                refused,
                Err(StakingError::Transaction(TransactionError::OutputScriptMismatch(i))) if i == index
            ));

            keystore.unlock_full("pass").await.unwrap();
            let staker = keystore.spending_keypair(&staker_key).await.unwrap();
            redirected.sign_input(0, &staker, pos_common::transaction::SpendPath::Staker).unwrap();
            prop_assert_eq!(
                verify_coinstake(&redirected, &kernel_output),
                Err(TransactionError::OutputScriptMismatch(index))
            );

            // tampering without re-signing breaks the signature
            let mut outputs = tx.get_outputs().to_vec();
            outputs[index].amount += 1;
            let tampered = Transaction::new(
                tx.get_version(),
                tx.get_inputs().to_vec(),
                outputs,
                tx.get_lock_time(),
            );
            prop_assert!(verify_coinstake(&tampered, &kernel_output).is_err());

            prop_assert_ne!(tx.hash(), tampered.hash());
            Ok::<(), TestCaseError>(())
        })?;
    }
}
