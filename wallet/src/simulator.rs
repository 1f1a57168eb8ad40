//! In-memory devnet used to exercise the staking engine end to end.
//!
//! The devnet chain only knows about outputs and stake proofs: blocks carry
//! a single funding transaction or a coinstake, and every submitted
//! coinstake is validated the way a node would before extending the chain.

use std::{
    collections::{HashMap, HashSet},
    fmt::{Display, Formatter},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use indexmap::IndexMap;
use log::{debug, info, warn};
use pos_common::{
    config::STAKE_REWARD,
    crypto::{hash, Address, Hash, Hashable, KeyId, KeyPair},
    difficulty::CompactBits,
    kernel::{check_stake_kernel, compute_stake_modifier, StakeModifier, StakeProof, GENESIS_STAKE_MODIFIER},
    network::Network,
    script::ScriptTemplate,
    serializer::{Serializer, Writer},
    time::{get_current_time_in_seconds, TimestampSeconds},
    tokio::{sync::RwLock, time::sleep},
    transaction::{verify_coinstake, OutPoint, SpendPath, Transaction, TxInput, TxOutput},
};
use serde::{Deserialize, Serialize};

use crate::{
    chain::{BlockHeader, ChainSource, CoinstakeSink, SubmitOutcome},
    config::{SimulatorConfig, StakingConfig},
    delegation::DelegationManager,
    error::StakingError,
    keystore::Keystore,
    ledger::{ChainTip, LedgerSnapshot, LedgerView, SpentOutput, UnspentOutput},
    staking::{Staker, StakingSettings, StakingStatsSnapshot},
};

// Blocks during which spent outputs are still reported in snapshots
const SPENT_HISTORY: u64 = 100;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Scenario {
    // Plain outputs staked by their own keys
    Solo,
    // Outputs delegated to this wallet by an external owner
    Cold,
    // Half of each
    #[default]
    Mixed,
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "solo" | "0" => Self::Solo,
            "cold" | "1" => Self::Cold,
            "mixed" | "2" => Self::Mixed,
            _ => return Err("Invalid scenario".into()),
        })
    }
}

impl Serialize for Scenario {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'a> Deserialize<'a> for Scenario {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let s = String::deserialize(deserializer)?;
        Scenario::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match &self {
            Self::Solo => "solo",
            Self::Cold => "cold",
            Self::Mixed => "mixed",
        };
        write!(f, "{}", str)
    }
}

struct DevnetBlock {
    header: BlockHeader,
    modifier: StakeModifier,
}

struct DevnetUtxo {
    output: TxOutput,
    height: u64,
    time: TimestampSeconds,
}

struct DevnetState {
    blocks: Vec<DevnetBlock>,
    by_hash: HashMap<Hash, usize>,
    utxos: IndexMap<OutPoint, DevnetUtxo>,
    // (height, spent output)
    spent: Vec<(u64, SpentOutput)>,
    watched: HashSet<KeyId>,
    synced: bool,
    bits: CompactBits,
}

impl DevnetState {
    fn tip(&self) -> ChainTip {
        let block = &self.blocks[self.blocks.len() - 1];
        ChainTip {
            height: block.header.height,
            hash: block.header.hash,
            time: block.header.time,
            bits: self.bits,
        }
    }

    fn push_block(&mut self, time: TimestampSeconds, entropy: Hash) -> &BlockHeader {
        let parent = &self.blocks[self.blocks.len() - 1];
        let height = parent.header.height + 1;
        let parent_hash = parent.header.hash;
        let modifier = compute_stake_modifier(parent.modifier, &entropy);

        let mut writer = Writer::new();
        writer.write_hash(&parent_hash);
        writer.write_u64(height);
        writer.write_u64(time);
        writer.write_hash(&entropy);

        let header = BlockHeader {
            hash: hash(writer.as_bytes()),
            parent: Some(parent_hash),
            height,
            time,
            entropy,
        };
        self.by_hash.insert(header.hash, self.blocks.len());
        self.blocks.push(DevnetBlock { header, modifier });
        self.spent
            .retain(|(spent_height, _)| *spent_height + SPENT_HISTORY > height);
        &self.blocks[self.blocks.len() - 1].header
    }

    // Time of a block mined now, always after the tip
    fn next_time(&self) -> TimestampSeconds {
        get_current_time_in_seconds().max(self.tip().time + 1)
    }

    fn is_watched(&self, output: &TxOutput) -> bool {
        match output.script.template() {
            Ok(ScriptTemplate::PayToPubKey(key)) => self.watched.contains(&key.key_id()),
            Ok(ScriptTemplate::PayToPubKeyHash(key_id)) => self.watched.contains(&key_id),
            Ok(ScriptTemplate::ColdStake { staker, owner }) => {
                self.watched.contains(&staker) || self.watched.contains(&owner)
            }
            Ok(ScriptTemplate::Multisig { keys, .. }) => {
                keys.iter().any(|key| self.watched.contains(&key.key_id()))
            }
            Err(_) => false,
        }
    }

    fn apply(&mut self, tx: &Transaction, time: TimestampSeconds, entropy: Hash) -> Hash {
        let txid = tx.hash();
        let height = self.push_block(time, entropy).height;

        for input in tx.get_inputs() {
            self.utxos.shift_remove(&input.outpoint);
            self.spent.push((
                height,
                SpentOutput {
                    outpoint: input.outpoint,
                    spending_tx: tx.clone(),
                },
            ));
        }
        for (index, output) in tx.get_outputs().iter().enumerate() {
            if output.is_marker() {
                continue;
            }
            self.utxos.insert(
                OutPoint::new(txid, index as u32),
                DevnetUtxo {
                    output: output.clone(),
                    height,
                    time,
                },
            );
        }
        txid
    }
}

/// In-memory chain serving a single wallet.
pub struct DevnetChain {
    network: Network,
    state: RwLock<DevnetState>,
}

impl DevnetChain {
    pub fn new(network: Network, bits: CompactBits) -> Self {
        let time = get_current_time_in_seconds();
        let genesis = BlockHeader {
            hash: hash(b"devnet genesis"),
            parent: None,
            height: 0,
            time,
            entropy: Hash::zero(),
        };

        let mut by_hash = HashMap::new();
        by_hash.insert(genesis.hash, 0);

        Self {
            network,
            state: RwLock::new(DevnetState {
                blocks: vec![DevnetBlock {
                    header: genesis,
                    modifier: GENESIS_STAKE_MODIFIER,
                }],
                by_hash,
                utxos: IndexMap::new(),
                spent: Vec::new(),
                watched: HashSet::new(),
                synced: true,
                bits,
            }),
        }
    }

    pub fn get_network(&self) -> Network {
        self.network
    }

    // Report outputs paying to these keys in snapshots
    pub async fn watch<I: IntoIterator<Item = KeyId>>(&self, keys: I) {
        self.state.write().await.watched.extend(keys);
    }

    pub async fn set_synced(&self, synced: bool) {
        self.state.write().await.synced = synced;
    }

    pub async fn set_bits(&self, bits: CompactBits) {
        self.state.write().await.bits = bits;
    }

    pub async fn get_height(&self) -> u64 {
        self.state.read().await.tip().height
    }

    pub async fn get_modifier(&self, hash: &Hash) -> Option<StakeModifier> {
        let state = self.state.read().await;
        state.by_hash.get(hash).map(|index| state.blocks[*index].modifier)
    }

    // Mine a block creating the given outputs out of thin air
    pub async fn fund(&self, outputs: Vec<TxOutput>) -> Vec<OutPoint> {
        let mut state = self.state.write().await;
        let tx = Transaction::new(1, Vec::new(), outputs, state.tip().height);
        let time = state.next_time();
        let entropy = hash(tx.to_bytes().as_slice());
        let txid = state.apply(&tx, time, entropy);

        if log::log_enabled!(log::Level::Debug) {
            debug!("Funded {} outputs in {}", tx.get_outputs().len(), txid);
        }

        (0..tx.get_outputs().len() as u32)
            .map(|index| OutPoint::new(txid, index))
            .collect()
    }

    pub async fn mine_empty_block(&self) -> ChainTip {
        let mut state = self.state.write().await;
        let time = state.next_time();
        let height = state.tip().height + 1;
        state.push_block(time, hash(&height.to_be_bytes()));
        state.tip()
    }

    /// Spend an output with its owner key into a regular transaction.
    pub async fn spend(
        &self,
        outpoint: OutPoint,
        outputs: Vec<TxOutput>,
        owner: &KeyPair,
    ) -> Result<Hash, anyhow::Error> {
        let mut state = self.state.write().await;
        let utxo = state
            .utxos
            .get(&outpoint)
            .ok_or_else(|| anyhow!("Unknown output {}", outpoint))?;

        let owner_id = match utxo.output.script.template()? {
            ScriptTemplate::PayToPubKey(key) => key.key_id(),
            ScriptTemplate::PayToPubKeyHash(key_id) => key_id,
            ScriptTemplate::ColdStake { owner, .. } => owner,
            ScriptTemplate::Multisig { .. } => bail!("Multisig spending is not supported"),
        };
        if owner.key_id() != owner_id {
            bail!("Key {} cannot spend {}", owner.key_id(), outpoint);
        }

        let mut tx = Transaction::new(1, vec![TxInput::unsigned(outpoint)], outputs, 0);
        tx.sign_input(0, owner, SpendPath::Owner)?;

        let time = state.next_time();
        let entropy = hash(tx.to_bytes().as_slice());
        Ok(state.apply(&tx, time, entropy))
    }

    // Node side validation of a coinstake on top of the current tip
    fn validate(
        &self,
        state: &DevnetState,
        tx: &Transaction,
        proof: &StakeProof,
        tip: &ChainTip,
    ) -> Result<(), String> {
        let utxo = state
            .utxos
            .get(&proof.outpoint)
            .ok_or_else(|| format!("kernel output {} is not unspent", proof.outpoint))?;

        if utxo.output.amount != proof.amount || utxo.time != proof.creation_time {
            return Err("proof does not match the kernel output".into());
        }

        let confirmations = tip.height.saturating_sub(utxo.height) + 1;
        if confirmations < self.network.stake_min_depth() {
            return Err(format!("kernel output has {} confirmations", confirmations));
        }

        let modifier = state.blocks[state.blocks.len() - 1].modifier;
        if proof.modifier != modifier {
            return Err("wrong stake modifier".into());
        }

        check_stake_kernel(
            proof,
            tip.time,
            state.bits,
            self.network.stake_min_age(),
            get_current_time_in_seconds(),
        )
        .map_err(|e| e.to_string())?;

        if !tx.spends(&proof.outpoint) {
            return Err("coinstake does not spend the kernel".into());
        }
        verify_coinstake(tx, &utxo.output).map_err(|e| e.to_string())?;

        let total = tx.get_output_total().ok_or("output overflow")?;
        if total > proof.amount.saturating_add(STAKE_REWARD) {
            return Err(format!("coinstake creates {} out of {}", total, proof.amount));
        }

        Ok(())
    }
}

#[async_trait]
impl ChainSource for DevnetChain {
    async fn best_tip(&self) -> anyhow::Result<ChainTip> {
        Ok(self.state.read().await.tip())
    }

    async fn is_synced(&self) -> anyhow::Result<bool> {
        Ok(self.state.read().await.synced)
    }

    async fn snapshot(&self, tip: &ChainTip) -> anyhow::Result<LedgerSnapshot> {
        let state = self.state.read().await;
        if !state.by_hash.contains_key(&tip.hash) {
            bail!("Unknown tip {}", tip.hash);
        }

        let outputs = state
            .utxos
            .iter()
            .filter(|(_, utxo)| utxo.height <= tip.height && state.is_watched(&utxo.output))
            .map(|(outpoint, utxo)| UnspentOutput {
                outpoint: *outpoint,
                amount: utxo.output.amount,
                script: utxo.output.script.clone(),
                confirmations: tip.height - utxo.height + 1,
                creation_height: utxo.height,
                creation_time: utxo.time,
                from_me: false,
            })
            .collect();

        let spent = state
            .spent
            .iter()
            .filter(|(height, _)| *height <= tip.height && *height + SPENT_HISTORY > tip.height)
            .map(|(_, spent)| spent.clone())
            .collect();

        Ok(LedgerSnapshot {
            tip: *tip,
            outputs,
            locked: HashSet::new(),
            spent,
        })
    }

    async fn block_header(&self, hash: &Hash) -> anyhow::Result<Option<BlockHeader>> {
        let state = self.state.read().await;
        Ok(state
            .by_hash
            .get(hash)
            .map(|index| state.blocks[*index].header.clone()))
    }

    async fn stake_reward(&self, _: u64) -> anyhow::Result<u64> {
        Ok(STAKE_REWARD)
    }
}

#[async_trait]
impl CoinstakeSink for DevnetChain {
    async fn submit_coinstake(
        &self,
        tx: Transaction,
        proof: StakeProof,
        tip: &ChainTip,
    ) -> anyhow::Result<SubmitOutcome> {
        let mut state = self.state.write().await;
        if state.tip().hash != tip.hash {
            return Ok(SubmitOutcome::Orphaned);
        }

        if let Err(reason) = self.validate(&state, &tx, &proof, tip) {
            if log::log_enabled!(log::Level::Warn) {
                warn!("Devnet rejected coinstake: {}", reason);
            }
            return Ok(SubmitOutcome::Rejected(reason));
        }

        let entropy = proof.kernel_hash();
        let txid = state.apply(&tx, proof.timestamp, entropy);
        if log::log_enabled!(log::Level::Debug) {
            debug!("Devnet block {} staked by {}", state.tip().height, txid);
        }
        Ok(SubmitOutcome::Accepted)
    }
}

/// A wallet staking on its own devnet.
pub struct Simulation {
    chain: Arc<DevnetChain>,
    keystore: Arc<Keystore>,
    delegations: Arc<DelegationManager>,
    staker: Arc<Staker>,
    // Keystore of the external owner delegating to us
    owner: Arc<Keystore>,
}

impl Simulation {
    pub async fn new(
        network: Network,
        password: &str,
        staking: &StakingConfig,
        simulator: &SimulatorConfig,
    ) -> Result<Self, anyhow::Error> {
        if network != Network::Devnet {
            bail!("The simulator only runs on devnet, got {}", network);
        }

        let chain = Arc::new(DevnetChain::new(network, simulator.devnet_bits));
        let keystore = Arc::new(Keystore::create(network, password)?);
        let owner = Arc::new(Keystore::create(network, password)?);
        let delegations = Arc::new(DelegationManager::new(
            keystore.clone(),
            staking.allow_self_delegation,
        ));

        let (solo, cold) = match simulator.scenario {
            Scenario::Solo => (simulator.funding_outputs, 0),
            Scenario::Cold => (0, simulator.funding_outputs),
            Scenario::Mixed => {
                let solo = simulator.funding_outputs / 2;
                (solo, simulator.funding_outputs - solo)
            }
        };

        let mut outputs = Vec::with_capacity(simulator.funding_outputs);
        for _ in 0..solo {
            let key_id = keystore.generate_key().await?.key_id();
            outputs.push(TxOutput::new(
                simulator.funding_amount,
                ScriptTemplate::PayToPubKeyHash(key_id).to_script(),
            ));
        }

        if cold > 0 {
            let staker = keystore.new_address().await?;
            let owner_delegations = DelegationManager::new(owner.clone(), false);
            for i in 0..cold {
                let output = owner_delegations
                    .create_delegation(
                        None,
                        &staker.to_string(),
                        simulator.funding_amount,
                        Some(format!("devnet delegation #{}", i)),
                    )
                    .await?;
                outputs.push(output);
            }
        }

        chain.watch(keystore.key_set().await).await;
        chain.fund(outputs).await;

        // Stake with a staking-only unlock, spending stays locked
        keystore.lock().await;
        keystore
            .unlock_for_staking(password, staking.staking_unlock_duration)
            .await?;

        let staker = Staker::new(
            StakingSettings::from_config(staking)?,
            chain.clone(),
            chain.clone(),
            keystore.clone(),
            Arc::new(LedgerView::new()),
            delegations.clone(),
        );

        if log::log_enabled!(log::Level::Info) {
            info!(
                "Devnet ready with scenario {}: {} solo and {} delegated outputs",
                simulator.scenario, solo, cold
            );
        }

        Ok(Self {
            chain,
            keystore,
            delegations,
            staker,
            owner,
        })
    }

    pub fn get_chain(&self) -> &Arc<DevnetChain> {
        &self.chain
    }

    pub fn get_keystore(&self) -> &Arc<Keystore> {
        &self.keystore
    }

    pub fn get_delegations(&self) -> &Arc<DelegationManager> {
        &self.delegations
    }

    pub fn get_staker(&self) -> &Arc<Staker> {
        &self.staker
    }

    pub fn get_owner_keystore(&self) -> &Arc<Keystore> {
        &self.owner
    }

    // Owner addresses holding the delegated outputs
    pub async fn get_owner_addresses(&self) -> Vec<Address> {
        self.owner.addresses().await
    }

    /// Run the staker until `blocks` new blocks are staked, forever when 0.
    pub async fn run(&self, blocks: u64) -> Result<StakingStatsSnapshot, StakingError> {
        let start = self.chain.get_height().await;
        self.staker.start().await?;

        loop {
            sleep(Duration::from_millis(200)).await;
            let height = self.chain.get_height().await;
            if blocks > 0 && height >= start + blocks {
                break;
            }
        }

        self.staker.stop().await?;
        Ok(self.staker.get_stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_parsing() {
        assert_eq!("cold".parse::<Scenario>(), Ok(Scenario::Cold));
        assert_eq!("0".parse::<Scenario>(), Ok(Scenario::Solo));
        assert!("other".parse::<Scenario>().is_err());
        assert_eq!(Scenario::default().to_string(), "mixed");
        assert_eq!(serde_json::to_string(&Scenario::Solo).unwrap(), "\"solo\"");
    }

    #[tokio::test]
    async fn test_modifier_chain() {
        let chain = DevnetChain::new(Network::Devnet, 0x1d00ffff);
        let first = chain.mine_empty_block().await;
        let second = chain.mine_empty_block().await;

        let first_modifier = chain.get_modifier(&first.hash).await.unwrap();
        let second_header = chain.block_header(&second.hash).await.unwrap().unwrap();
        assert_eq!(second_header.parent, Some(first.hash));
        assert_eq!(
            chain.get_modifier(&second.hash).await,
            Some(compute_stake_modifier(first_modifier, &second_header.entropy))
        );
    }
}
