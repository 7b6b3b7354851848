use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use ward_schema::{ControlLine, ControlRecord, ControlStanding, DistrictId, PlayerId};

use crate::engine::Engine;
use crate::error::{EngineError, NotFoundError};
use crate::store::{Versioned, WriteBatch, WriteOp};

/// Per-district, per-player control points.
pub struct ControlLedger<'a> {
    engine: &'a Engine,
}

impl<'a> ControlLedger<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    pub fn points(&self, district: &DistrictId, player: PlayerId) -> Result<u8, EngineError> {
        Ok(self
            .engine
            .store()
            .control(district, player)?
            .map_or(0, |record| record.value.points))
    }

    /// Non-zero holders of a district, strongest first, ties by player id.
    pub fn standings(&self, district: &DistrictId) -> Result<Vec<ControlStanding>, EngineError> {
        let records = self.engine.store().district_control(district)?;
        Ok(rank(records.iter().map(|record| &record.value)))
    }

    pub fn top_controller(
        &self,
        district: &DistrictId,
        excluding: Option<PlayerId>,
    ) -> Result<Option<ControlStanding>, EngineError> {
        Ok(self
            .standings(district)?
            .into_iter()
            .find(|standing| Some(standing.player) != excluding))
    }

    pub fn holdings(&self, player: PlayerId) -> Result<Vec<ControlLine>, EngineError> {
        Ok(holdings_of(
            self.engine.store().player_control(player)?.iter(),
        ))
    }

    /// Moves a record by `delta`, clamped to `0..=100`, and returns the new value.
    pub fn adjust(
        &self,
        player: PlayerId,
        district: &DistrictId,
        delta: i32,
        now: DateTime<Utc>,
    ) -> Result<u8, EngineError> {
        let store = self.engine.store();
        if store.district(district)?.is_none() {
            return Err(NotFoundError::District(district.clone()).into());
        }
        self.engine.config().retry().run("ledger.adjust", |_| {
            let (op, record) = shift_op(store.control(district, player)?, district, player, delta, now);
            let mut batch = WriteBatch::new();
            batch.push(op);
            store.commit(batch)?;
            Ok(record.points)
        })
    }
}

/// Write that moves a (possibly absent) record by `delta`.
pub(crate) fn shift_op(
    current: Option<Versioned<ControlRecord>>,
    district: &DistrictId,
    player: PlayerId,
    delta: i32,
    now: DateTime<Utc>,
) -> (WriteOp, ControlRecord) {
    let (base, expected) = match current {
        Some(record) => (record.value, record.version),
        None => (ControlRecord::new(district.clone(), player, now), 0),
    };
    let record = base.shifted(delta, now);
    (
        WriteOp::PutControl {
            record: record.clone(),
            expected,
        },
        record,
    )
}

pub(crate) fn rank<'r>(records: impl Iterator<Item = &'r ControlRecord>) -> Vec<ControlStanding> {
    let mut standings: Vec<ControlStanding> = records
        .filter(|record| record.points > 0)
        .map(|record| ControlStanding {
            player: record.player,
            points: record.points,
        })
        .collect();
    standings.sort_by(|a, b| b.points.cmp(&a.points).then(a.player.cmp(&b.player)));
    standings
}

pub(crate) fn holdings_of<'r>(records: impl Iterator<Item = &'r ControlRecord>) -> Vec<ControlLine> {
    let mut lines: Vec<ControlLine> = records
        .filter(|record| record.points > 0)
        .map(|record| ControlLine {
            district: record.district.clone(),
            points: record.points,
        })
        .collect();
    lines.sort_by(|a, b| a.district.cmp(&b.district));
    lines
}

/// Decay writes for one cycle: every held record loses `amount`, except
/// records whose holder acted in that district this cycle.
pub fn decay_ops(
    records: &[Versioned<ControlRecord>],
    active: &BTreeSet<(DistrictId, PlayerId)>,
    amount: u8,
    now: DateTime<Utc>,
) -> Vec<WriteOp> {
    records
        .iter()
        .filter(|record| record.value.points > 0)
        .filter(|record| !active.contains(&(record.value.district.clone(), record.value.player)))
        .map(|record| WriteOp::PutControl {
            record: record.value.shifted(-(amount as i32), now),
            expected: record.version,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 19, 0, 0).unwrap()
    }

    fn record(district: &str, player: u64, points: u8, version: u64) -> Versioned<ControlRecord> {
        Versioned::new(
            ControlRecord {
                district: DistrictId::new(district),
                player: PlayerId(player),
                points,
                updated_at: now(),
            },
            version,
        )
    }

    #[test]
    fn ranking_breaks_ties_by_player() {
        let records = [
            record("zemun", 3, 20, 1),
            record("zemun", 1, 20, 1),
            record("zemun", 2, 40, 1),
            record("zemun", 4, 0, 1),
        ];
        let standings = rank(records.iter().map(|r| &r.value));
        let order: Vec<u64> = standings.iter().map(|s| s.player.0).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn decay_floors_and_spares_active_holders() {
        let records = [
            record("zemun", 1, 3, 2),
            record("zemun", 2, 40, 5),
            record("vracar", 1, 0, 1),
            record("vracar", 2, 12, 1),
        ];
        let mut active = BTreeSet::new();
        active.insert((DistrictId::new("vracar"), PlayerId(2)));
        let ops = decay_ops(&records, &active, 5, now());
        assert_eq!(ops.len(), 2);
        match &ops[0] {
            WriteOp::PutControl { record, expected } => {
                assert_eq!(record.points, 0);
                assert_eq!(*expected, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &ops[1] {
            WriteOp::PutControl { record, .. } => assert_eq!(record.points, 35),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shifting_an_absent_record_inserts_it() {
        let district = DistrictId::new("zemun");
        let (op, record) = shift_op(None, &district, PlayerId(9), 10, now());
        assert_eq!(record.points, 10);
        assert_eq!(op.expected(), Some(0));
    }
}
