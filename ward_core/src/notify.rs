use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bevy::prelude::Resource;
use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;
use tracing::info;
use ward_schema::{
    Action, ActionOutcomeLine, CreditLine, CycleId, Headline, PlayerCycleNotice, PlayerId,
};

use crate::error::EngineError;
use crate::ledger::holdings_of;
use crate::store::GameStore;
use crate::wallet::load_wallet;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification channel is disconnected")]
    Disconnected,
    #[error("notice for player {player} rejected: {reason}")]
    Rejected { player: PlayerId, reason: String },
}

/// Delivers per-player cycle summaries. Failures are counted, never retried.
pub trait Notifier: Send + Sync {
    fn deliver(&self, notice: &PlayerCycleNotice) -> Result<(), NotifyError>;
}

/// Forwards notices into a crossbeam channel for another thread to drain.
#[derive(Clone)]
pub struct ChannelNotifier {
    sender: Sender<PlayerCycleNotice>,
}

impl ChannelNotifier {
    pub fn unbounded() -> (Self, Receiver<PlayerCycleNotice>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn deliver(&self, notice: &PlayerCycleNotice) -> Result<(), NotifyError> {
        self.sender
            .send(notice.clone())
            .map_err(|_| NotifyError::Disconnected)
    }
}

/// Writes each notice to the log as structured fields.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn deliver(&self, notice: &PlayerCycleNotice) -> Result<(), NotifyError> {
        info!(
            target: "ward::notify",
            cycle = %notice.cycle,
            player = %notice.player,
            outcomes = notice.outcomes.len(),
            credited = %notice.total_credited(),
            wallet = %notice.wallet,
            "notice.delivered"
        );
        Ok(())
    }
}

#[derive(Resource, Clone)]
pub struct NotifierHandle(pub Arc<dyn Notifier>);

impl NotifierHandle {
    pub fn new(notifier: impl Notifier + 'static) -> Self {
        Self(Arc::new(notifier))
    }
}

/// One notice per affected player, ordered by player id.
///
/// A player is affected when they own a resolved action of the cycle, took
/// part in one of its joint actions, or were credited at distribution.
pub fn build_notices(
    store: &dyn GameStore,
    cycle: CycleId,
    actions: &[Action],
    credits: &[CreditLine],
    headlines: &[Headline],
) -> Result<Vec<PlayerCycleNotice>, EngineError> {
    let mut outcomes: BTreeMap<PlayerId, Vec<ActionOutcomeLine>> = BTreeMap::new();
    for action in actions {
        let Some(result) = &action.result else {
            continue;
        };
        let line = ActionOutcomeLine {
            action: action.id,
            kind: action.kind,
            target: action.target.clone(),
            tier: result.tier,
            control_delta: result.control_delta,
            refunded: result.refunded,
        };
        let mut owners = BTreeSet::from([action.player]);
        if let Some(joint_id) = action.joint {
            if let Some(joint) = store.joint_action(joint_id)? {
                owners.extend(joint.value.participants.iter().map(|p| p.player));
            }
        }
        for owner in owners {
            outcomes.entry(owner).or_default().push(line.clone());
        }
    }

    let mut affected: BTreeSet<PlayerId> = outcomes.keys().copied().collect();
    affected.extend(credits.iter().map(|line| line.player));

    let records = store.control_records()?;
    affected
        .into_iter()
        .map(|player| {
            let wallet = load_wallet(store, player)?;
            Ok(PlayerCycleNotice {
                cycle,
                player,
                outcomes: outcomes.remove(&player).unwrap_or_default(),
                wallet: wallet.value.balances,
                control: holdings_of(
                    records
                        .iter()
                        .map(|r| &r.value)
                        .filter(|r| r.player == player),
                ),
                credits: credits
                    .iter()
                    .filter(|line| line.player == player)
                    .cloned()
                    .collect(),
                headlines: headlines.to_vec(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ward_schema::{CycleSlot, ResourceBundle};

    fn notice(player: u64) -> PlayerCycleNotice {
        PlayerCycleNotice {
            cycle: CycleId {
                date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                slot: CycleSlot::First,
            },
            player: PlayerId(player),
            outcomes: Vec::new(),
            wallet: ResourceBundle::uniform(5),
            control: Vec::new(),
            credits: Vec::new(),
            headlines: Vec::new(),
        }
    }

    #[test]
    fn channel_notifier_forwards_until_dropped() {
        let (notifier, receiver) = ChannelNotifier::unbounded();
        notifier.deliver(&notice(1)).expect("deliver");
        assert_eq!(receiver.try_recv().expect("queued").player, PlayerId(1));
        drop(receiver);
        assert_eq!(
            notifier.deliver(&notice(2)),
            Err(NotifyError::Disconnected)
        );
    }
}
