//! Scenario files replayed by `kfarms simulate`.
//!
//! A scenario is a JSON list of steps run against a fresh local cluster.
//! Keys may be written as aliases instead of raw hex:
//!
//! - `"@admin"`: stable key derived from the name
//! - `"@user:farm:owner"`: user state of `@owner` in `@farm`
//! - `"@fvault:farm:mint"`, `"@rvault:farm:mint"`: farm and reward vaults
//! - `"@tvault:config:mint"`: treasury vault

use kfarms_client::{Cluster, LocalCluster};
use kfarms_core::{derive_address, Clock, Pubkey};
use kfarms_program::instruction as ix;
use kfarms_program::state::OraclePrices;
use kfarms_program::{Instruction, Transaction, TxOutcome};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("unknown alias {0:?}")]
    UnknownAlias(String),
    #[error("unterminated alias starting at byte {0}")]
    Unterminated(usize),
    #[error("invalid scenario: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub start: Option<Clock>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[serde(alias = "instruction")]
    Transaction(TransactionStep),
    Advance {
        #[serde(default)]
        seconds: u64,
        #[serde(default)]
        slots: u64,
    },
    Crank,
    OraclePrice {
        feed: Pubkey,
        prices: OraclePrices,
    },
}

#[derive(Debug, Deserialize)]
pub struct TransactionStep {
    #[serde(default)]
    pub label: Option<String>,
    pub fee_payer: Pubkey,
    #[serde(default)]
    pub signers: Vec<Pubkey>,
    pub instructions: Vec<Instruction>,
}

impl TransactionStep {
    fn to_transaction(&self) -> Transaction {
        let tx = self
            .signers
            .iter()
            .fold(Transaction::new(self.fee_payer), |tx, s| tx.with_signer(*s));
        self.instructions
            .iter()
            .cloned()
            .fold(tx, |tx, i| tx.with_instruction(i))
    }

    fn label(&self) -> String {
        match &self.label {
            Some(l) => l.clone(),
            None => self
                .instructions
                .iter()
                .map(|i| i.name())
                .collect::<Vec<_>>()
                .join("+"),
        }
    }
}

pub fn alias_key(name: &str) -> Pubkey {
    derive_address(&[b"scenario", name.as_bytes()])
}

fn resolve_alias(alias: &str) -> Result<Pubkey, ScenarioError> {
    let parts: Vec<&str> = alias.split(':').collect();
    let key = match parts.as_slice() {
        [name] if !name.is_empty() => alias_key(name),
        ["user", farm, owner] => ix::user_state(&alias_key(farm), &alias_key(owner)),
        ["fvault", farm, mint] => ix::farm_vault(&alias_key(farm), &alias_key(mint)),
        ["rvault", farm, mint] => ix::reward_vault(&alias_key(farm), &alias_key(mint)),
        ["tvault", config, mint] => ix::treasury_vault(&alias_key(config), &alias_key(mint)),
        _ => return Err(ScenarioError::UnknownAlias(alias.to_string())),
    };
    Ok(key)
}

/// Replaces every `"@..."` string literal with the hex key it names.
///
/// Runs on the raw text so that large integers (stake shares are `u128`)
/// reach the deserializer untouched.
pub fn resolve_aliases(text: &str) -> Result<String, ScenarioError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut offset = 0;
    while let Some(pos) = rest.find("\"@") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let end = after
            .find('"')
            .ok_or(ScenarioError::Unterminated(offset + pos))?;
        let key = resolve_alias(&after[..end])?;
        out.push('"');
        out.push_str(&key.to_string());
        out.push('"');
        let consumed = pos + 2 + end + 1;
        rest = &rest[consumed..];
        offset += consumed;
    }
    out.push_str(rest);
    Ok(out)
}

pub fn parse(text: &str) -> Result<Scenario, ScenarioError> {
    Ok(serde_json::from_str(&resolve_aliases(text)?)?)
}

/// Runs every step. Failed transactions are recorded, not fatal.
pub async fn run(
    scenario: &Scenario,
) -> Result<(LocalCluster, Vec<TxOutcome>), Box<dyn std::error::Error>> {
    let cluster = match scenario.start {
        Some(clock) => LocalCluster::with_ledger(Default::default(), clock),
        None => LocalCluster::new(),
    };
    let mut outcomes = Vec::new();

    for (i, step) in scenario.steps.iter().enumerate() {
        match step {
            Step::Transaction(t) => {
                let tx = t.to_transaction();
                let result = cluster.send_transaction(&tx).await;
                let slot = cluster.get_clock().await?.slot;
                let label = t.label();
                let result = match result {
                    Ok(sig) => {
                        tracing::info!(step = i, %label, signature = %sig, "step committed");
                        Ok(sig)
                    }
                    Err(e) => match e.program_error() {
                        Some(err) => {
                            tracing::warn!(step = i, %label, error = %err, "step failed");
                            Err(err)
                        }
                        None => return Err(e.into()),
                    },
                };
                outcomes.push(TxOutcome {
                    slot,
                    label,
                    instructions: tx.instructions.len(),
                    result,
                });
            }
            Step::Advance { seconds, slots } => {
                let slot = cluster.get_clock().await?.slot;
                cluster.warp_to(slot.saturating_add(*slots)).await?;
                cluster.advance_time(*seconds).await;
            }
            Step::Crank => {
                let report = cluster.crank().await;
                tracing::info!(
                    step = i,
                    refreshed = report.refreshed,
                    failed = report.failed.len(),
                    "crank"
                );
            }
            Step::OraclePrice { feed, prices } => {
                cluster.set_oracle_price(*feed, prices.clone()).await;
            }
        }
    }

    Ok((cluster, outcomes))
}
