use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    crypto::{hash_with_domain, Hash, Hashable, KeyPair, PublicKey, Signature},
    script::Script,
    serializer::*,
};

mod error;
mod verify;

pub use error::TransactionError;
pub use verify::*;

#[cfg(test)]
mod tests;

const SIGHASH_DOMAIN: &[u8] = b"POS-SIGHASH-v1";

// Reference to an output of a previous transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Hash, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

impl Serializer for OutPoint {
    fn write(&self, writer: &mut Writer) {
        self.txid.write(writer);
        self.index.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            txid: Hash::read(reader)?,
            index: u32::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.txid.size() + self.index.size()
    }
}

// Which branch of the locking script a witness satisfies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendPath {
    // Full spending rights
    Owner,
    // Cold staking branch, restricted to coinstakes paying back to the same script
    Staker,
}

impl Serializer for SpendPath {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(match self {
            Self::Owner => 0,
            Self::Staker => 1,
        });
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            0 => Ok(Self::Owner),
            1 => Ok(Self::Staker),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    fn size(&self) -> usize {
        1
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub public_key: PublicKey,
    pub signature: Signature,
    pub path: SpendPath,
}

impl Serializer for Witness {
    fn write(&self, writer: &mut Writer) {
        self.public_key.write(writer);
        self.signature.write(writer);
        self.path.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            public_key: PublicKey::read(reader)?,
            signature: Signature::read(reader)?,
            path: SpendPath::read(reader)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub outpoint: OutPoint,
    pub witness: Option<Witness>,
}

impl TxInput {
    pub fn unsigned(outpoint: OutPoint) -> Self {
        Self {
            outpoint,
            witness: None,
        }
    }
}

impl Serializer for TxInput {
    fn write(&self, writer: &mut Writer) {
        self.outpoint.write(writer);
        self.witness.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            outpoint: OutPoint::read(reader)?,
            witness: Option::read(reader)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub script: Script,
}

impl TxOutput {
    pub fn new(amount: u64, script: Script) -> Self {
        Self { amount, script }
    }

    // Empty first output identifying a coinstake
    pub fn marker() -> Self {
        Self {
            amount: 0,
            script: Script::empty(),
        }
    }

    pub fn is_marker(&self) -> bool {
        self.amount == 0 && self.script.is_empty()
    }
}

impl Serializer for TxOutput {
    fn write(&self, writer: &mut Writer) {
        self.amount.write(writer);
        self.script.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            amount: u64::read(reader)?,
            script: Script::read(reader)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    version: u16,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u64,
}

impl Transaction {
    pub fn new(version: u16, inputs: Vec<TxInput>, outputs: Vec<TxOutput>, lock_time: u64) -> Self {
        Self {
            version,
            inputs,
            outputs,
            lock_time,
        }
    }

    pub fn get_version(&self) -> u16 {
        self.version
    }

    pub fn get_inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn get_outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn get_lock_time(&self) -> u64 {
        self.lock_time
    }

    // Sum of all outputs, None on overflow
    pub fn get_output_total(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }

    // A coinstake spends at least one input and starts with the marker output
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty()
            && self.outputs.len() >= 2
            && self.outputs.first().is_some_and(TxOutput::is_marker)
    }

    // Does this transaction spend the given outpoint
    pub fn spends(&self, outpoint: &OutPoint) -> bool {
        self.inputs.iter().any(|input| input.outpoint == *outpoint)
    }

    /// Hash signed by every input witness.
    ///
    /// Witnesses are stripped so that each input can be signed independently.
    pub fn get_signature_hash(&self) -> Hash {
        let mut writer = Writer::new();
        writer.write_u16(self.version);
        writer.write_u16(self.inputs.len() as u16);
        for input in &self.inputs {
            input.outpoint.write(&mut writer);
        }
        self.outputs.write(&mut writer);
        writer.write_u64(self.lock_time);

        hash_with_domain(SIGHASH_DOMAIN, &[writer.as_bytes()])
    }

    // Sign the input at `index` with the given key and spend path
    pub fn sign_input(
        &mut self,
        index: usize,
        keypair: &KeyPair,
        path: SpendPath,
    ) -> Result<(), TransactionError> {
        let sighash = self.get_signature_hash();
        let input = self
            .inputs
            .get_mut(index)
            .ok_or(TransactionError::InvalidInputIndex(index))?;

        input.witness = Some(Witness {
            public_key: keypair.public_key(),
            signature: keypair.sign(sighash.as_bytes()),
            path,
        });
        Ok(())
    }
}

impl Serializer for Transaction {
    fn write(&self, writer: &mut Writer) {
        writer.write_u16(self.version);
        self.inputs.write(writer);
        self.outputs.write(writer);
        writer.write_u64(self.lock_time);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            version: reader.read_u16()?,
            inputs: Vec::read(reader)?,
            outputs: Vec::read(reader)?,
            lock_time: reader.read_u64()?,
        })
    }
}

impl Hashable for Transaction {}
