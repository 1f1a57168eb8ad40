// Opcodes used by the standard output templates
// Values follow the Bitcoin/PIVX numbering so scripts stay familiar to tooling

// Pushes of 1 to 75 bytes are encoded as the length itself
pub const OP_PUSHBYTES_20: u8 = 0x14;
pub const OP_PUSHBYTES_32: u8 = 0x20;
// OP_1 .. OP_16 push the small integer n
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;

pub const OP_IF: u8 = 0x63;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_ROT: u8 = 0x7b;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

// Cold staking: verifies the spending transaction is a coinstake paying
// back to the same script when the staker branch is taken
pub const OP_CHECKCOLDSTAKEVERIFY: u8 = 0xd2;

// Decode OP_1..OP_16 into its small integer value
pub fn decode_small_int(op: u8) -> Option<u8> {
    if (OP_1..=OP_16).contains(&op) {
        Some(op - OP_1 + 1)
    } else {
        None
    }
}

// Encode a small integer as OP_n, clamped to 1..=16
pub fn small_int_op(value: u8) -> u8 {
    OP_1 + value.clamp(1, 16) - 1
}
