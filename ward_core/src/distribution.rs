use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::info;
use ward_runtime::PayoutTuning;
use ward_schema::{
    ControlRecord, CreditLine, District, DistrictId, Headline, HeadlineKind, Player, PlayerId,
    ResourceBundle,
};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::ledger::rank;
use crate::store::{GameStore, WriteBatch, WriteOp};
use crate::wallet::load_wallet;

/// Credits owed for a control snapshot, ordered by (player, district).
///
/// Pure: the same districts and records always produce the same lines.
pub fn plan_distribution(
    payout: &PayoutTuning,
    districts: &[District],
    records: &[ControlRecord],
) -> Vec<CreditLine> {
    let yields: HashMap<&DistrictId, &ResourceBundle> =
        districts.iter().map(|d| (&d.id, &d.yields)).collect();
    let mut lines: Vec<CreditLine> = records
        .iter()
        .filter_map(|record| {
            let base = yields.get(&record.district)?;
            let (tier, credited) = payout.payout(base, record.points)?;
            (!credited.is_empty()).then(|| CreditLine {
                player: record.player,
                district: record.district.clone(),
                points: record.points,
                tier,
                credited,
            })
        })
        .collect();
    lines.sort_by(|a, b| (a.player, &a.district).cmp(&(b.player, &b.district)));
    lines
}

/// Leaders at or above the majority threshold, one per district.
pub fn plan_headlines(
    payout: &PayoutTuning,
    districts: &[District],
    players: &[Player],
    records: &[ControlRecord],
) -> Vec<Headline> {
    let names: HashMap<PlayerId, &str> = players.iter().map(|p| (p.id, p.name.as_str())).collect();
    let mut by_district: BTreeMap<&DistrictId, Vec<&ControlRecord>> = BTreeMap::new();
    for record in records {
        by_district.entry(&record.district).or_default().push(record);
    }
    districts
        .iter()
        .filter_map(|district| {
            let held = by_district.get(&district.id)?;
            let leader = rank(held.iter().copied()).into_iter().next()?;
            let kind = if leader.points >= payout.stronghold_headline {
                HeadlineKind::Stronghold
            } else if leader.points >= payout.majority_headline {
                HeadlineKind::Majority
            } else {
                return None;
            };
            Some(Headline {
                kind,
                district: district.id.clone(),
                district_name: district.name.clone(),
                player: leader.player,
                player_name: names
                    .get(&leader.player)
                    .map_or_else(|| leader.player.to_string(), |name| name.to_string()),
                points: leader.points,
            })
        })
        .collect()
}

/// Wallet writes for a set of credit lines, one per player.
pub(crate) fn credit_ops(
    store: &dyn GameStore,
    lines: &[CreditLine],
) -> Result<Vec<WriteOp>, EngineError> {
    let mut totals: BTreeMap<PlayerId, ResourceBundle> = BTreeMap::new();
    for line in lines {
        let entry = totals.entry(line.player).or_default();
        *entry = entry.saturating_add(&line.credited);
    }
    totals
        .into_iter()
        .map(|(player, amount)| {
            let current = load_wallet(store, player)?;
            let mut wallet = current.value;
            wallet.credit(&amount);
            Ok(WriteOp::PutWallet {
                wallet,
                expected: current.version,
            })
        })
        .collect()
}

pub struct DistributionEngine<'a> {
    engine: &'a Engine,
}

impl<'a> DistributionEngine<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Credits the current control snapshot would pay, without paying them.
    pub fn preview(&self) -> Result<Vec<CreditLine>, EngineError> {
        let store = self.engine.store();
        let records: Vec<ControlRecord> = store
            .control_records()?
            .into_iter()
            .map(|r| r.value)
            .collect();
        Ok(plan_distribution(
            self.engine.config().payout(),
            &store.districts()?,
            &records,
        ))
    }

    /// Pays out the current control snapshot in one atomic commit.
    ///
    /// The cycle scheduler folds the same credits into its settle step; this
    /// entry point is for running a distribution outside a cycle.
    pub fn distribute(&self, now: DateTime<Utc>) -> Result<Vec<CreditLine>, EngineError> {
        let store = self.engine.store();
        let lines = self
            .engine
            .config()
            .retry()
            .run_on_conflict("distribution.distribute", |_| {
                let lines = self.preview()?;
                let mut batch = WriteBatch::new();
                batch.extend(credit_ops(store.as_ref(), &lines)?);
                if !batch.is_empty() {
                    store.commit(batch)?;
                }
                Ok(lines)
            })?;
        info!(
            target: "ward::distribution",
            lines = lines.len(),
            at = %now,
            "distribution.credited"
        );
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ward_schema::{Allowances, ControlTier};

    fn district(id: &str, yields: ResourceBundle) -> District {
        District {
            id: DistrictId::new(id),
            name: id.to_uppercase(),
            yields,
            adjacent: Vec::new(),
            affinity: None,
        }
    }

    fn record(district: &str, player: u64, points: u8) -> ControlRecord {
        ControlRecord {
            district: DistrictId::new(district),
            player: PlayerId(player),
            points,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap(),
        }
    }

    fn player(id: u64, name: &str) -> Player {
        Player {
            id: PlayerId(id),
            name: name.into(),
            ideology: 0,
            allowances: Allowances {
                main_left: 1,
                quick_left: 2,
                last_refresh: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            },
        }
    }

    #[test]
    fn plan_is_sorted_and_tiered() {
        let payout = PayoutTuning::default();
        let districts = vec![
            district("zemun", ResourceBundle::new(0, 2, 2, 0)),
            district("cukarica", ResourceBundle::new(0, 3, 0, 0)),
        ];
        let records = vec![
            record("zemun", 2, 80),
            record("cukarica", 2, 30),
            record("cukarica", 1, 55),
            record("zemun", 1, 5),
        ];
        let lines = plan_distribution(&payout, &districts, &records);
        let keys: Vec<(u64, &str)> = lines
            .iter()
            .map(|l| (l.player.0, l.district.as_str()))
            .collect();
        assert_eq!(keys, vec![(1, "cukarica"), (2, "cukarica"), (2, "zemun")]);
        assert_eq!(lines[0].credited.economy, 3);
        assert_eq!(lines[1].credited.economy, 2);
        assert_eq!(lines[2].tier, ControlTier::Absolute);
        assert_eq!(lines[2].credited, ResourceBundle::new(0, 3, 3, 0));

        let mut shuffled = records.clone();
        shuffled.reverse();
        assert_eq!(plan_distribution(&payout, &districts, &shuffled), lines);
    }

    #[test]
    fn headlines_name_the_leader() {
        let payout = PayoutTuning::default();
        let districts = vec![
            district("vracar", ResourceBundle::new(2, 0, 2, 0)),
            district("zemun", ResourceBundle::new(0, 2, 2, 0)),
            district("palilula", ResourceBundle::new(0, 0, 3, 1)),
        ];
        let players = vec![player(1, "Ana"), player(2, "Bojan")];
        let records = vec![
            record("vracar", 1, 85),
            record("vracar", 2, 10),
            record("zemun", 2, 50),
            record("palilula", 1, 49),
        ];
        let headlines = plan_headlines(&payout, &districts, &players, &records);
        assert_eq!(headlines.len(), 2);
        insta::assert_snapshot!(
            headlines.iter().map(Headline::text).collect::<Vec<_>>().join("\n"),
            @r###"
        Ana holds VRACAR firmly with 85 control
        Bojan leads in ZEMUN with 50 control
        "###
        );
    }
}
