//! Farm state machine, stake accounting, instruction processor, and report sinks.

pub mod farm_operations;
pub mod instruction;
pub mod processor;
pub mod reporter;
pub mod sink;
pub mod stake_operations;
pub mod state;
pub mod token;
pub mod withdrawal_penalty;

pub use instruction::{FarmsInstruction, Instruction, TokenInstruction, Transaction};
pub use processor::{Account, CrankReport, Ledger};
pub use reporter::{Report, TxOutcome};
