//! Encrypted key storage with a dual purpose lock.
//!
//! The wallet can be unlocked fully (spending and staking) or for staking
//! only. In staking-only mode secrets are decrypted so kernels can be
//! signed inside the keystore, but no key is ever handed out.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::{debug, info, trace};
use pos_common::{
    crypto::{Address, KeyId, KeyPair, PublicKey, SecretKey},
    network::Network,
    script::ScriptTemplate,
    time::{get_current_time_in_seconds, TimestampSeconds},
    tokio::sync::RwLock,
    transaction::{SpendPath, Transaction, TransactionError, TxOutput},
};
use serde::{Deserialize, Serialize};

use crate::{
    cipher::{generate_salt, Cipher},
    classifier::ScriptClass,
    config::{password_algorithm, SALT_SIZE},
    error::StakingError,
};

const PASSWORD_CHECK_VALUE: &[u8] = b"pos-wallet-keystore";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum LockState {
    Locked,
    // `until` is None when the unlock does not expire
    UnlockedForStaking { until: Option<TimestampSeconds> },
    UnlockedFull,
}

impl LockState {
    pub fn can_stake(&self) -> bool {
        !matches!(self, LockState::Locked)
    }

    pub fn can_spend(&self) -> bool {
        matches!(self, LockState::UnlockedFull)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredKey {
    pub public_key: PublicKey,
    #[serde(with = "hex")]
    pub encrypted_secret: Vec<u8>,
}

/// Serializable form of a keystore, secrets stay encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKeystore {
    pub network: Network,
    #[serde(with = "hex")]
    pub salt: Vec<u8>,
    #[serde(with = "hex")]
    pub password_check: Vec<u8>,
    pub keys: Vec<StoredKey>,
}

struct KeystoreInner {
    state: LockState,
    // only kept while fully unlocked, to encrypt new keys
    cipher: Option<Cipher>,
    stored: IndexMap<KeyId, StoredKey>,
    unlocked: HashMap<KeyId, KeyPair>,
}

impl KeystoreInner {
    fn lock(&mut self) {
        self.state = LockState::Locked;
        self.cipher = None;
        self.unlocked.clear();
    }

    fn refresh(&mut self, now: TimestampSeconds) {
        if let LockState::UnlockedForStaking { until: Some(until) } = self.state {
            if now >= until {
                if log::log_enabled!(log::Level::Info) {
                    info!("Staking unlock expired, locking wallet");
                }
                self.lock();
            }
        }
    }
}

pub struct Keystore {
    network: Network,
    salt: [u8; SALT_SIZE],
    password_check: Vec<u8>,
    inner: RwLock<KeystoreInner>,
}

impl Keystore {
    /// Create an empty keystore protected by `password`.
    ///
    /// A new keystore starts fully unlocked.
    pub fn create(network: Network, password: &str) -> Result<Self, StakingError> {
        let salt = generate_salt();
        let cipher = Cipher::new(password, &salt, password_algorithm(network))?;
        let password_check = cipher.encrypt_value(PASSWORD_CHECK_VALUE)?;

        Ok(Self {
            network,
            salt,
            password_check,
            inner: RwLock::new(KeystoreInner {
                state: LockState::UnlockedFull,
                cipher: Some(cipher),
                stored: IndexMap::new(),
                unlocked: HashMap::new(),
            }),
        })
    }

    // Load an exported keystore, it starts locked
    pub fn restore(encrypted: EncryptedKeystore) -> Result<Self, StakingError> {
        let salt: [u8; SALT_SIZE] = encrypted
            .salt
            .as_slice()
            .try_into()
            .map_err(|_| StakingError::Keystore(crate::cipher::CipherError::InvalidData))?;

        let stored = encrypted
            .keys
            .into_iter()
            .map(|key| (key.public_key.key_id(), key))
            .collect();

        Ok(Self {
            network: encrypted.network,
            salt,
            password_check: encrypted.password_check,
            inner: RwLock::new(KeystoreInner {
                state: LockState::Locked,
                cipher: None,
                stored,
                unlocked: HashMap::new(),
            }),
        })
    }

    pub async fn export(&self) -> EncryptedKeystore {
        let inner = self.inner.read().await;
        EncryptedKeystore {
            network: self.network,
            salt: self.salt.to_vec(),
            password_check: self.password_check.clone(),
            keys: inner.stored.values().cloned().collect(),
        }
    }

    pub fn get_network(&self) -> Network {
        self.network
    }

    fn open_cipher(&self, password: &str) -> Result<Cipher, StakingError> {
        let cipher = Cipher::new(password, &self.salt, password_algorithm(self.network))?;
        let check = cipher.decrypt_value(&self.password_check)?;
        if check.as_slice() != PASSWORD_CHECK_VALUE {
            return Err(StakingError::InvalidPassword);
        }
        Ok(cipher)
    }

    fn decrypt_all(
        cipher: &Cipher,
        stored: &IndexMap<KeyId, StoredKey>,
    ) -> Result<HashMap<KeyId, KeyPair>, StakingError> {
        let mut unlocked = HashMap::with_capacity(stored.len());
        for (key_id, key) in stored {
            let secret = cipher.decrypt_value(&key.encrypted_secret)?;
            let keypair = KeyPair::from_secret(&SecretKey::from_slice(&secret)?);
            unlocked.insert(*key_id, keypair);
        }
        Ok(unlocked)
    }

    pub async fn unlock_full(&self, password: &str) -> Result<(), StakingError> {
        let cipher = self.open_cipher(password)?;
        let mut inner = self.inner.write().await;
        inner.unlocked = Self::decrypt_all(&cipher, &inner.stored)?;
        inner.cipher = Some(cipher);
        inner.state = LockState::UnlockedFull;

        debug!("Wallet fully unlocked");
        Ok(())
    }

    /// Unlock for staking only, for `duration` seconds (0 = until locked).
    pub async fn unlock_for_staking(&self, password: &str, duration: u64) -> Result<(), StakingError> {
        let cipher = self.open_cipher(password)?;
        let mut inner = self.inner.write().await;
        inner.unlocked = Self::decrypt_all(&cipher, &inner.stored)?;
        inner.cipher = None;

        let until = (duration > 0).then(|| get_current_time_in_seconds() + duration);
        inner.state = LockState::UnlockedForStaking { until };

        if log::log_enabled!(log::Level::Debug) {
            debug!("Wallet unlocked for staking until {:?}", until);
        }
        Ok(())
    }

    pub async fn lock(&self) {
        self.inner.write().await.lock();
        debug!("Wallet locked");
    }

    pub async fn lock_state(&self) -> LockState {
        let mut inner = self.inner.write().await;
        inner.refresh(get_current_time_in_seconds());
        inner.state
    }

    /// Generate and store a new key, requires a full unlock.
    pub async fn generate_key(&self) -> Result<PublicKey, StakingError> {
        let mut inner = self.inner.write().await;
        inner.refresh(get_current_time_in_seconds());
        let cipher = match (&inner.state, &inner.cipher) {
            (LockState::UnlockedFull, Some(cipher)) => cipher,
            _ => return Err(StakingError::WalletLocked),
        };

        let keypair = KeyPair::new();
        let encrypted_secret = cipher.encrypt_value(keypair.secret_key().as_bytes())?;
        let public_key = keypair.public_key();
        let key_id = public_key.key_id();

        inner.stored.insert(
            key_id,
            StoredKey {
                public_key,
                encrypted_secret,
            },
        );
        inner.unlocked.insert(key_id, keypair);

        if log::log_enabled!(log::Level::Debug) {
            debug!("Generated key {}", key_id);
        }
        Ok(public_key)
    }

    pub async fn new_address(&self) -> Result<Address, StakingError> {
        let public_key = self.generate_key().await?;
        Ok(Address::new(self.network, public_key.key_id()))
    }

    pub async fn has_key(&self, key_id: &KeyId) -> bool {
        self.inner.read().await.stored.contains_key(key_id)
    }

    pub async fn is_mine(&self, address: &Address) -> bool {
        address.get_network() == self.network && self.has_key(address.get_key_id()).await
    }

    pub async fn public_key(&self, key_id: &KeyId) -> Option<PublicKey> {
        self.inner
            .read()
            .await
            .stored
            .get(key_id)
            .map(|key| key.public_key)
    }

    // Key ids are public and readable while locked
    pub async fn key_set(&self) -> HashSet<KeyId> {
        self.inner.read().await.stored.keys().copied().collect()
    }

    pub async fn addresses(&self) -> Vec<Address> {
        self.inner
            .read()
            .await
            .stored
            .keys()
            .map(|key_id| Address::new(self.network, *key_id))
            .collect()
    }

    /// Sign the kernel input of a coinstake claim, in both unlocked modes.
    ///
    /// Staking keys never leave the keystore. The key is chosen from the
    /// kernel script itself: the staker key for a cold stake output, the
    /// output key for a plain key output. The owner key of a cold stake
    /// output is never used here. Every output after the marker must pay
    /// back to the kernel script, so a staking unlock can only ever sign a
    /// claim of the output to itself.
    pub async fn sign_claim(
        &self,
        tx: &mut Transaction,
        kernel: &TxOutput,
        class: &ScriptClass,
    ) -> Result<(), StakingError> {
        let (key_id, path) = match (kernel.script.template()?, class) {
            (ScriptTemplate::ColdStake { staker, .. }, ScriptClass::ColdStakeable { staker: key, .. })
                if staker == *key =>
            {
                (staker, SpendPath::Staker)
            }
            (ScriptTemplate::ColdStake { .. }, ScriptClass::DelegatedExternal { .. }) => {
                return Err(StakingError::MissingStakerKey)
            }
            (ScriptTemplate::PayToPubKeyHash(owner), ScriptClass::Spendable { owner: key })
                if owner == *key =>
            {
                (owner, SpendPath::Owner)
            }
            (ScriptTemplate::PayToPubKey(public_key), ScriptClass::Spendable { owner: key })
                if public_key.key_id() == *key =>
            {
                (*key, SpendPath::Owner)
            }
            (_, ScriptClass::Multisig { .. }) => return Err(StakingError::UnrecognizedScript),
            _ => return Err(StakingError::ScriptClassMismatch),
        };

        if !tx.is_coinstake() {
            return Err(TransactionError::NotCoinstake.into());
        }
        if let Some((index, _)) = tx
            .get_outputs()
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, output)| output.script != kernel.script)
        {
            return Err(TransactionError::OutputScriptMismatch(index).into());
        }

        let mut inner = self.inner.write().await;
        inner.refresh(get_current_time_in_seconds());
        if !inner.state.can_stake() {
            return Err(StakingError::WalletLocked);
        }

        let keypair = inner
            .unlocked
            .get(&key_id)
            .ok_or(StakingError::MissingStakerKey)?;
        tx.sign_input(0, keypair, path)?;

        if log::log_enabled!(log::Level::Trace) {
            trace!("signed claim with key {} ({:?} path)", key_id, path);
        }
        Ok(())
    }

    /// Key with full spending rights, only available when fully unlocked.
    pub async fn spending_keypair(&self, key_id: &KeyId) -> Result<KeyPair, StakingError> {
        let mut inner = self.inner.write().await;
        inner.refresh(get_current_time_in_seconds());
        if !inner.state.can_spend() {
            return Err(StakingError::WalletLocked);
        }

        inner
            .unlocked
            .get(key_id)
            .cloned()
            .ok_or(StakingError::UnknownKey(*key_id))
    }
}
