//! Scenario replay.
//!
//! A scenario is a JSON document `{"steps": [...]}` where every step carries
//! an `op` tag. Accounts and tokens are named by label. Each step produces
//! one JSON report line; a failed step is rolled back and reported, and the
//! run continues unless `fail_fast` is set.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use vela_core::error::VelaError;
use vela_core::types::{Address, PositionId, Timestamp};
use vela_protocol::Protocol;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing scenario")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    AdvanceTo { t: Timestamp },
    AdvanceBy { seconds: u64 },
    AdvanceWeeks { weeks: u64 },
    Mint { token: String, to: String, #[serde(deserialize_with = "de_amount")] amount: u128 },

    CreateLock { caller: String, #[serde(deserialize_with = "de_amount")] amount: u128, duration: u64, recipient: Option<String> },
    CreatePermanentLock { caller: String, #[serde(deserialize_with = "de_amount")] amount: u128, duration: u64, recipient: Option<String> },
    IncreaseAmount { caller: String, id: PositionId, #[serde(deserialize_with = "de_amount")] amount: u128 },
    DepositFor { caller: String, id: PositionId, #[serde(deserialize_with = "de_amount")] amount: u128 },
    IncreaseUnlockTime { caller: String, id: PositionId, duration: u64 },
    Withdraw { caller: String, id: PositionId },
    WithdrawEarly { caller: String, id: PositionId },
    Merge { caller: String, from: PositionId, to: PositionId },
    Split { caller: String, id: PositionId, #[serde(deserialize_with = "de_amount")] amount: u128 },
    LockPermanent { caller: String, id: PositionId },
    UnlockPermanent { caller: String, id: PositionId },
    Transfer { caller: String, id: PositionId, to: String },
    Approve { caller: String, spender: String, id: PositionId },
    SetApprovalForAll { caller: String, operator: String, approved: bool },
    Checkpoint,

    RegisterRewardToken { caller: String, token: String },
    SetDistributor { caller: String, distributor: String },
    ProposeTeam { caller: String, next: String },
    AcceptTeam { caller: String },
    CancelTeamProposal { caller: String },
    Notify { caller: String, token: String, #[serde(deserialize_with = "de_amount")] amount: u128 },
    /// Claims every registered token when `tokens` is empty.
    Claim {
        caller: String,
        id: PositionId,
        #[serde(default)]
        tokens: Vec<String>,
        until: Option<Timestamp>,
    },
    Sweep { caller: String, token: String },
    SetSelfRepay { caller: String, id: PositionId, receiver: String },
    ClearSelfRepay { caller: String, id: PositionId },

    VotingPower { id: PositionId, at: Option<Timestamp> },
    TotalSupply { at: Option<Timestamp> },
    Earned { token: String, id: PositionId },
    Penalty { id: PositionId },
    Balance { token: String, account: String },
    SaveSnapshot { path: PathBuf },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::AdvanceTo { .. } => "advance_to",
            Step::AdvanceBy { .. } => "advance_by",
            Step::AdvanceWeeks { .. } => "advance_weeks",
            Step::Mint { .. } => "mint",
            Step::CreateLock { .. } => "create_lock",
            Step::CreatePermanentLock { .. } => "create_permanent_lock",
            Step::IncreaseAmount { .. } => "increase_amount",
            Step::DepositFor { .. } => "deposit_for",
            Step::IncreaseUnlockTime { .. } => "increase_unlock_time",
            Step::Withdraw { .. } => "withdraw",
            Step::WithdrawEarly { .. } => "withdraw_early",
            Step::Merge { .. } => "merge",
            Step::Split { .. } => "split",
            Step::LockPermanent { .. } => "lock_permanent",
            Step::UnlockPermanent { .. } => "unlock_permanent",
            Step::Transfer { .. } => "transfer",
            Step::Approve { .. } => "approve",
            Step::SetApprovalForAll { .. } => "set_approval_for_all",
            Step::Checkpoint => "checkpoint",
            Step::RegisterRewardToken { .. } => "register_reward_token",
            Step::SetDistributor { .. } => "set_distributor",
            Step::ProposeTeam { .. } => "propose_team",
            Step::AcceptTeam { .. } => "accept_team",
            Step::CancelTeamProposal { .. } => "cancel_team_proposal",
            Step::Notify { .. } => "notify",
            Step::Claim { .. } => "claim",
            Step::Sweep { .. } => "sweep",
            Step::SetSelfRepay { .. } => "set_self_repay",
            Step::ClearSelfRepay { .. } => "clear_self_repay",
            Step::VotingPower { .. } => "voting_power",
            Step::TotalSupply { .. } => "total_supply",
            Step::Earned { .. } => "earned",
            Step::Penalty { .. } => "penalty",
            Step::Balance { .. } => "balance",
            Step::SaveSnapshot { .. } => "save_snapshot",
        }
    }
}

/// Amounts are a JSON number or a decimal string. Values above `u64::MAX`
/// only survive the tagged-enum buffering as strings.
fn de_amount<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    match Raw::deserialize(d)? {
        Raw::Number(n) => Ok(u128::from(n)),
        Raw::Text(s) => s.replace('_', "").parse().map_err(de::Error::custom),
    }
}

/// Label ↔ address book so reports show names instead of hashes.
#[derive(Debug, Default)]
pub struct Labels {
    names: HashMap<Address, String>,
}

impl Labels {
    pub fn resolve(&mut self, label: &str) -> Address {
        let addr = Address::from_label(label);
        self.names.entry(addr).or_insert_with(|| label.to_string());
        addr
    }

    pub fn name(&self, addr: Address) -> String {
        self.names.get(&addr).cloned().unwrap_or_else(|| addr.to_string())
    }
}

/// Counts of a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Replay `scenario` against `protocol`, writing one JSON line per step to `out`.
pub fn run(
    protocol: &mut Protocol,
    scenario: &Scenario,
    labels: &mut Labels,
    out: &mut impl Write,
    fail_fast: bool,
) -> Result<Summary> {
    let mut summary = Summary::default();
    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = execute(protocol, step, labels);
        let report = match &outcome {
            Ok(result) => {
                summary.succeeded += 1;
                debug!(step = index, op = step.name(), "step succeeded");
                json!({ "step": index, "op": step.name(), "now": protocol.now(), "ok": true, "result": result })
            }
            Err(e) => {
                summary.failed += 1;
                warn!(step = index, op = step.name(), error = %e, "step failed");
                json!({ "step": index, "op": step.name(), "now": protocol.now(), "ok": false, "error": e.to_string() })
            }
        };
        writeln!(out, "{report}").context("writing report")?;
        if fail_fast && outcome.is_err() {
            bail!("step {index} ({}) failed", step.name());
        }
    }
    Ok(summary)
}

fn execute(p: &mut Protocol, step: &Step, labels: &mut Labels) -> Result<Value, VelaError> {
    let value = match step {
        Step::AdvanceTo { t } => {
            p.advance_to(*t)?;
            json!({ "now": p.now() })
        }
        Step::AdvanceBy { seconds } => {
            p.advance_by(*seconds)?;
            json!({ "now": p.now() })
        }
        Step::AdvanceWeeks { weeks } => {
            let seconds = weeks
                .checked_mul(vela_core::constants::WEEK)
                .ok_or(vela_core::error::MathError::ArithmeticOverflow)?;
            p.advance_by(seconds)?;
            json!({ "now": p.now() })
        }
        Step::Mint { token, to, amount } => {
            let (token, to) = (labels.resolve(token), labels.resolve(to));
            p.mint_tokens(token, to, *amount)?;
            json!({ "balance": p.balance_of(token, to).to_string() })
        }

        Step::CreateLock { caller, amount, duration, recipient } => {
            let caller = labels.resolve(caller);
            let recipient = recipient.as_deref().map_or(caller, |r| labels.resolve(r));
            let id = p.create_lock(caller, *amount, *duration, recipient)?;
            lock_report(p, id)
        }
        Step::CreatePermanentLock { caller, amount, duration, recipient } => {
            let caller = labels.resolve(caller);
            let recipient = recipient.as_deref().map_or(caller, |r| labels.resolve(r));
            let id = p.create_permanent_lock(caller, *amount, *duration, recipient)?;
            lock_report(p, id)
        }
        Step::IncreaseAmount { caller, id, amount } => {
            p.increase_amount(labels.resolve(caller), *id, *amount)?;
            lock_report(p, *id)
        }
        Step::DepositFor { caller, id, amount } => {
            p.deposit_for(labels.resolve(caller), *id, *amount)?;
            lock_report(p, *id)
        }
        Step::IncreaseUnlockTime { caller, id, duration } => {
            p.increase_unlock_time(labels.resolve(caller), *id, *duration)?;
            lock_report(p, *id)
        }
        Step::Withdraw { caller, id } => {
            let w = p.withdraw(labels.resolve(caller), *id)?;
            json!({ "owner": labels.name(w.owner), "amount": w.amount.to_string(), "penalty": w.penalty.to_string() })
        }
        Step::WithdrawEarly { caller, id } => {
            let w = p.withdraw_early(labels.resolve(caller), *id)?;
            json!({ "owner": labels.name(w.owner), "amount": w.amount.to_string(), "penalty": w.penalty.to_string() })
        }
        Step::Merge { caller, from, to } => {
            p.merge(labels.resolve(caller), *from, *to)?;
            lock_report(p, *to)
        }
        Step::Split { caller, id, amount } => {
            let (first, second) = p.split(labels.resolve(caller), *id, *amount)?;
            json!({ "first": lock_report(p, first), "second": lock_report(p, second) })
        }
        Step::LockPermanent { caller, id } => {
            p.lock_permanent(labels.resolve(caller), *id)?;
            lock_report(p, *id)
        }
        Step::UnlockPermanent { caller, id } => {
            p.unlock_permanent(labels.resolve(caller), *id)?;
            lock_report(p, *id)
        }
        Step::Transfer { caller, id, to } => {
            let to = labels.resolve(to);
            p.transfer(labels.resolve(caller), *id, to)?;
            json!({ "id": id, "owner": labels.name(to) })
        }
        Step::Approve { caller, spender, id } => {
            p.approve(labels.resolve(caller), labels.resolve(spender), *id)?;
            Value::Null
        }
        Step::SetApprovalForAll { caller, operator, approved } => {
            p.set_approval_for_all(labels.resolve(caller), labels.resolve(operator), *approved)?;
            Value::Null
        }
        Step::Checkpoint => {
            p.checkpoint()?;
            json!({ "total_supply": p.total_voting_power()?.to_string() })
        }

        Step::RegisterRewardToken { caller, token } => {
            p.register_reward_token(labels.resolve(caller), labels.resolve(token))?;
            Value::Null
        }
        Step::SetDistributor { caller, distributor } => {
            p.set_distributor(labels.resolve(caller), labels.resolve(distributor))?;
            Value::Null
        }
        Step::ProposeTeam { caller, next } => {
            p.propose_team(labels.resolve(caller), labels.resolve(next))?;
            Value::Null
        }
        Step::AcceptTeam { caller } => {
            p.accept_team(labels.resolve(caller))?;
            Value::Null
        }
        Step::CancelTeamProposal { caller } => {
            p.cancel_team_proposal(labels.resolve(caller))?;
            Value::Null
        }
        Step::Notify { caller, token, amount } => {
            let epoch = p.notify_reward_amount(labels.resolve(caller), labels.resolve(token), *amount)?;
            json!({ "epoch": epoch })
        }
        Step::Claim { caller, id, tokens, until } => {
            let caller = labels.resolve(caller);
            let tokens: Vec<Address> = if tokens.is_empty() {
                p.rewards().reward_tokens().to_vec()
            } else {
                tokens.iter().map(|t| labels.resolve(t)).collect()
            };
            let payouts = match until {
                Some(end) => p.claim_until(caller, *id, &tokens, *end)?,
                None => p.claim(caller, *id, &tokens)?,
            };
            let payouts: Vec<Value> = payouts
                .iter()
                .map(|x| {
                    json!({
                        "token": labels.name(x.token),
                        "receiver": labels.name(x.receiver),
                        "amount": x.amount.to_string(),
                    })
                })
                .collect();
            json!({ "payouts": payouts })
        }
        Step::Sweep { caller, token } => {
            let swept = p.sweep(labels.resolve(caller), labels.resolve(token))?;
            json!({ "swept": swept.to_string() })
        }
        Step::SetSelfRepay { caller, id, receiver } => {
            p.set_self_repay_receiver(labels.resolve(caller), *id, labels.resolve(receiver))?;
            Value::Null
        }
        Step::ClearSelfRepay { caller, id } => {
            p.clear_self_repay_receiver(labels.resolve(caller), *id)?;
            Value::Null
        }

        Step::VotingPower { id, at } => {
            let power = p.balance_of_at(*id, at.unwrap_or(p.now()))?;
            json!({ "voting_power": power.to_string() })
        }
        Step::TotalSupply { at } => {
            let supply = p.total_supply_at(at.unwrap_or(p.now()))?;
            json!({ "total_supply": supply.to_string() })
        }
        Step::Earned { token, id } => {
            let earned = p.earned(labels.resolve(token), *id)?;
            json!({ "earned": earned.to_string() })
        }
        Step::Penalty { id } => {
            json!({ "penalty": p.early_exit_penalty(*id)?.to_string() })
        }
        Step::Balance { token, account } => {
            let balance = p.balance_of(labels.resolve(token), labels.resolve(account));
            json!({ "balance": balance.to_string() })
        }
        Step::SaveSnapshot { path } => {
            p.save_snapshot(path)?;
            json!({ "path": path.display().to_string() })
        }
    };
    Ok(value)
}

/// Amounts are strings: u128 values overflow JSON number precision.
fn lock_report(p: &Protocol, id: PositionId) -> Value {
    match p.locked(id) {
        Some(lock) => json!({
            "id": id,
            "amount": lock.amount.to_string(),
            "end": lock.end,
            "permanent": lock.is_permanent,
            "effective_start": lock.effective_start,
            "voting_power": p.voting_power(id).map(|v| v.to_string()).unwrap_or_default(),
        }),
        None => json!({ "id": id }),
    }
}
