mod opcodes;
mod template;

pub use opcodes::*;
pub use template::*;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serializer::{Reader, ReaderError, Serializer, Writer};

// Largest locking script accepted in an output
pub const MAX_SCRIPT_SIZE: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Script matches no standard template")]
    UnrecognizedScript,
    #[error("Invalid multisig parameters: {required} of {total}")]
    InvalidMultisig { required: usize, total: usize },
    #[error("Script too large: {0} bytes")]
    TooLarge(usize),
}

/// Raw locking script of an output.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Script(#[serde(with = "hex")] Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    // Empty script, used by the coinstake marker output
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    // Structural template of this script, if any
    pub fn template(&self) -> Result<ScriptTemplate, ScriptError> {
        ScriptTemplate::parse(self)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", hex::encode(&self.0))
    }
}

impl From<ScriptTemplate> for Script {
    fn from(template: ScriptTemplate) -> Self {
        template.to_script()
    }
}

impl Serializer for Script {
    fn write(&self, writer: &mut Writer) {
        writer.write_var_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let bytes = reader.read_var_bytes()?;
        if bytes.len() > MAX_SCRIPT_SIZE {
            return Err(ReaderError::InvalidSize);
        }
        Ok(Self(bytes))
    }

    fn size(&self) -> usize {
        2 + self.0.len()
    }
}
