use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ward_schema::{
    content_hash, Action, ActionId, ControlRecord, CycleId, CycleMark, District, DistrictId,
    JointAction, JointActionId, Player, PlayerId, Politician, PoliticianId,
    PoliticianRelationship, Wallet,
};

use super::{GameStore, Guard, IdKind, RecordKey, StoreError, Versioned, WriteBatch, WriteOp};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Tables {
    players: BTreeMap<PlayerId, Versioned<Player>>,
    wallets: BTreeMap<PlayerId, Versioned<Wallet>>,
    districts: BTreeMap<DistrictId, Versioned<District>>,
    politicians: BTreeMap<PoliticianId, Versioned<Politician>>,
    control: BTreeMap<(DistrictId, PlayerId), Versioned<ControlRecord>>,
    relationships: BTreeMap<(PoliticianId, PlayerId), Versioned<PoliticianRelationship>>,
    actions: BTreeMap<ActionId, Versioned<Action>>,
    joints: BTreeMap<JointActionId, Versioned<JointAction>>,
    marks: BTreeMap<CycleId, Versioned<CycleMark>>,
    next_player: u64,
    next_action: u64,
    next_joint: u64,
}

impl Tables {
    fn version_of(&self, key: &RecordKey) -> u64 {
        match key {
            RecordKey::Player(id) => self.players.get(id).map_or(0, |r| r.version),
            RecordKey::Wallet(id) => self.wallets.get(id).map_or(0, |r| r.version),
            RecordKey::District(id) => self.districts.get(id).map_or(0, |r| r.version),
            RecordKey::Politician(id) => self.politicians.get(id).map_or(0, |r| r.version),
            RecordKey::Control(district, player) => self
                .control
                .get(&(district.clone(), *player))
                .map_or(0, |r| r.version),
            RecordKey::Relationship(politician, player) => self
                .relationships
                .get(&(politician.clone(), *player))
                .map_or(0, |r| r.version),
            RecordKey::Action(id) => self.actions.get(id).map_or(0, |r| r.version),
            RecordKey::Joint(id) => self.joints.get(id).map_or(0, |r| r.version),
            RecordKey::Cycle(id) => self.marks.get(id).map_or(0, |r| r.version),
        }
    }

    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::PutPlayer { player, expected } => {
                self.players
                    .insert(player.id, Versioned::new(player, expected + 1));
            }
            WriteOp::PutWallet { wallet, expected } => {
                self.wallets
                    .insert(wallet.player, Versioned::new(wallet, expected + 1));
            }
            WriteOp::PutControl { record, expected } => {
                let key = (record.district.clone(), record.player);
                self.control.insert(key, Versioned::new(record, expected + 1));
            }
            WriteOp::PutRelationship {
                relationship,
                expected,
            } => {
                let key = (relationship.politician.clone(), relationship.player);
                self.relationships
                    .insert(key, Versioned::new(relationship, expected + 1));
            }
            WriteOp::PutAction { action, expected } => {
                self.actions
                    .insert(action.id, Versioned::new(action, expected + 1));
            }
            WriteOp::DeleteAction { id, .. } => {
                self.actions.remove(&id);
            }
            WriteOp::PutJoint { joint, expected } => {
                self.joints.insert(joint.id, Versioned::new(joint, expected + 1));
            }
            WriteOp::DeleteJoint { id, .. } => {
                self.joints.remove(&id);
            }
            WriteOp::PutCycleMark { mark, expected } => {
                self.marks.insert(mark.cycle, Versioned::new(mark, expected + 1));
            }
            WriteOp::PutDistrict(district) => {
                let version = self.districts.get(&district.id).map_or(0, |r| r.version);
                self.districts
                    .insert(district.id.clone(), Versioned::new(district, version + 1));
            }
            WriteOp::PutPolitician(politician) => {
                let version = self
                    .politicians
                    .get(&politician.id)
                    .map_or(0, |r| r.version);
                self.politicians
                    .insert(politician.id.clone(), Versioned::new(politician, version + 1));
            }
        }
    }
}

/// Injected commit failure, for exercising retry and idempotency paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultMode {
    /// Reject the batch without applying it.
    BeforeApply,
    /// Apply the batch, then report the commit as failed.
    AfterApply,
}

#[derive(Debug, Default)]
struct FaultPlan {
    remaining: u32,
    mode: Option<FaultMode>,
}

/// Serialized form of a [`MemoryStore`], checksummed over its tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    hash: u64,
    tables: Tables,
}

impl MemorySnapshot {
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(self).map_err(|err| StoreError::Codec(err.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Self, StoreError> {
        let snapshot: MemorySnapshot =
            bincode::deserialize(data).map_err(|err| StoreError::Codec(err.to_string()))?;
        let actual = content_hash(&snapshot.tables).map_err(|err| StoreError::Codec(err.to_string()))?;
        if actual != snapshot.hash {
            return Err(StoreError::Codec(format!(
                "snapshot checksum mismatch: expected {:#x}, found {:#x}",
                snapshot.hash, actual
            )));
        }
        Ok(snapshot)
    }
}

/// In-process [`GameStore`] backed by ordered maps under a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    leases: Mutex<HashSet<CycleId>>,
    faults: Mutex<FaultPlan>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: MemorySnapshot) -> Self {
        Self {
            tables: RwLock::new(snapshot.tables),
            leases: Mutex::new(HashSet::new()),
            faults: Mutex::new(FaultPlan::default()),
        }
    }

    pub fn snapshot(&self) -> Result<MemorySnapshot, StoreError> {
        let tables = self.tables.read().clone();
        let hash = content_hash(&tables).map_err(|err| StoreError::Codec(err.to_string()))?;
        Ok(MemorySnapshot { hash, tables })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = self.snapshot()?.encode()?;
        fs::write(path, &bytes).map_err(|err| StoreError::Io(format!("{}: {err}", path.display())))?;
        info!(
            target: "ward::store",
            path = %path.display(),
            bytes = bytes.len(),
            "snapshot.saved"
        );
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self, StoreError> {
        let bytes =
            fs::read(path).map_err(|err| StoreError::Io(format!("{}: {err}", path.display())))?;
        let snapshot = MemorySnapshot::decode(&bytes)?;
        info!(
            target: "ward::store",
            path = %path.display(),
            hash = snapshot.hash,
            "snapshot.loaded"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Fail the next `count` commits in the given way.
    pub fn inject_faults(&self, count: u32, mode: FaultMode) {
        let mut plan = self.faults.lock();
        plan.remaining = count;
        plan.mode = Some(mode);
    }

    fn take_fault(&self) -> Option<FaultMode> {
        let mut plan = self.faults.lock();
        if plan.remaining == 0 {
            return None;
        }
        plan.remaining -= 1;
        plan.mode
    }
}

impl GameStore for MemoryStore {
    fn player(&self, id: PlayerId) -> Result<Option<Versioned<Player>>, StoreError> {
        Ok(self.tables.read().players.get(&id).cloned())
    }

    fn players(&self) -> Result<Vec<Player>, StoreError> {
        Ok(self
            .tables
            .read()
            .players
            .values()
            .map(|r| r.value.clone())
            .collect())
    }

    fn wallet(&self, player: PlayerId) -> Result<Option<Versioned<Wallet>>, StoreError> {
        Ok(self.tables.read().wallets.get(&player).cloned())
    }

    fn district(&self, id: &DistrictId) -> Result<Option<District>, StoreError> {
        Ok(self
            .tables
            .read()
            .districts
            .get(id)
            .map(|r| r.value.clone()))
    }

    fn districts(&self) -> Result<Vec<District>, StoreError> {
        Ok(self
            .tables
            .read()
            .districts
            .values()
            .map(|r| r.value.clone())
            .collect())
    }

    fn politician(&self, id: &PoliticianId) -> Result<Option<Politician>, StoreError> {
        Ok(self
            .tables
            .read()
            .politicians
            .get(id)
            .map(|r| r.value.clone()))
    }

    fn politicians(&self) -> Result<Vec<Politician>, StoreError> {
        Ok(self
            .tables
            .read()
            .politicians
            .values()
            .map(|r| r.value.clone())
            .collect())
    }

    fn control(
        &self,
        district: &DistrictId,
        player: PlayerId,
    ) -> Result<Option<Versioned<ControlRecord>>, StoreError> {
        Ok(self
            .tables
            .read()
            .control
            .get(&(district.clone(), player))
            .cloned())
    }

    fn control_records(&self) -> Result<Vec<Versioned<ControlRecord>>, StoreError> {
        Ok(self.tables.read().control.values().cloned().collect())
    }

    fn relationship(
        &self,
        politician: &PoliticianId,
        player: PlayerId,
    ) -> Result<Option<Versioned<PoliticianRelationship>>, StoreError> {
        Ok(self
            .tables
            .read()
            .relationships
            .get(&(politician.clone(), player))
            .cloned())
    }

    fn action(&self, id: ActionId) -> Result<Option<Versioned<Action>>, StoreError> {
        Ok(self.tables.read().actions.get(&id).cloned())
    }

    fn cycle_actions(&self, cycle: CycleId) -> Result<Vec<Versioned<Action>>, StoreError> {
        Ok(self
            .tables
            .read()
            .actions
            .values()
            .filter(|r| r.value.cycle == cycle)
            .cloned()
            .collect())
    }

    fn player_actions(&self, player: PlayerId) -> Result<Vec<Versioned<Action>>, StoreError> {
        Ok(self
            .tables
            .read()
            .actions
            .values()
            .filter(|r| r.value.player == player)
            .cloned()
            .collect())
    }

    fn pending_cycles(&self) -> Result<Vec<CycleId>, StoreError> {
        let cycles: BTreeSet<CycleId> = self
            .tables
            .read()
            .actions
            .values()
            .filter(|r| r.value.is_pending())
            .map(|r| r.value.cycle)
            .collect();
        Ok(cycles.into_iter().collect())
    }

    fn joint_action(
        &self,
        id: JointActionId,
    ) -> Result<Option<Versioned<JointAction>>, StoreError> {
        Ok(self.tables.read().joints.get(&id).cloned())
    }

    fn joint_actions(&self) -> Result<Vec<Versioned<JointAction>>, StoreError> {
        Ok(self.tables.read().joints.values().cloned().collect())
    }

    fn cycle_mark(&self, cycle: CycleId) -> Result<Option<Versioned<CycleMark>>, StoreError> {
        Ok(self.tables.read().marks.get(&cycle).cloned())
    }

    fn allocate_id(&self, kind: IdKind) -> Result<u64, StoreError> {
        let mut tables = self.tables.write();
        let counter = match kind {
            IdKind::Player => &mut tables.next_player,
            IdKind::Action => &mut tables.next_action,
            IdKind::Joint => &mut tables.next_joint,
        };
        *counter += 1;
        Ok(*counter)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let fault = self.take_fault();
        if fault == Some(FaultMode::BeforeApply) {
            return Err(StoreError::Unavailable("injected fault before apply".into()));
        }

        let mut tables = self.tables.write();
        for guard in batch.guards() {
            match guard {
                Guard::CycleOpen(cycle) => {
                    let open = tables
                        .marks
                        .get(cycle)
                        .map_or(true, |mark| mark.value.phase.accepts_submissions());
                    if !open {
                        return Err(StoreError::CycleClosed(*cycle));
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        for op in batch.ops() {
            let key = op.key();
            if let Some(expected) = op.expected() {
                if tables.version_of(&key) != expected {
                    debug!(target: "ward::store", record = %key, expected, "commit.conflict");
                    return Err(StoreError::Conflict(key));
                }
            }
            if !seen.insert(key.clone()) {
                return Err(StoreError::Rejected(format!("duplicate write to {key}")));
            }
        }

        let WriteBatch { ops, .. } = batch;
        for op in ops {
            tables.apply(op);
        }
        drop(tables);

        if fault == Some(FaultMode::AfterApply) {
            return Err(StoreError::Unavailable("injected fault after apply".into()));
        }
        Ok(())
    }

    fn try_acquire_cycle(&self, cycle: CycleId) -> Result<bool, StoreError> {
        Ok(self.leases.lock().insert(cycle))
    }

    fn release_cycle(&self, cycle: CycleId) {
        self.leases.lock().remove(&cycle);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone, Utc};
    use ward_schema::{CycleSlot, ResourceBundle};

    use super::*;
    use crate::store::CycleLease;

    fn wallet(player: u64, amount: u32) -> Wallet {
        Wallet::new(PlayerId(player), ResourceBundle::uniform(amount))
    }

    fn cycle() -> CycleId {
        CycleId::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), CycleSlot::First)
    }

    #[test]
    fn stale_versions_are_rejected_atomically() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutWallet {
            wallet: wallet(1, 5),
            expected: 0,
        });
        store.commit(batch).unwrap();
        assert_eq!(store.wallet(PlayerId(1)).unwrap().unwrap().version, 1);

        let mut stale = WriteBatch::new();
        stale
            .push(WriteOp::PutWallet {
                wallet: wallet(2, 1),
                expected: 0,
            })
            .push(WriteOp::PutWallet {
                wallet: wallet(1, 9),
                expected: 0,
            });
        let err = store.commit(stale).unwrap_err();
        assert_eq!(err, StoreError::Conflict(RecordKey::Wallet(PlayerId(1))));
        assert!(store.wallet(PlayerId(2)).unwrap().is_none());
        assert_eq!(
            store.wallet(PlayerId(1)).unwrap().unwrap().value.balances,
            ResourceBundle::uniform(5)
        );
    }

    #[test]
    fn duplicate_keys_in_one_batch_are_rejected() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::PutWallet {
                wallet: wallet(1, 5),
                expected: 0,
            })
            .push(WriteOp::PutWallet {
                wallet: wallet(1, 6),
                expected: 0,
            });
        assert!(matches!(store.commit(batch), Err(StoreError::Rejected(_))));
    }

    #[test]
    fn cycle_guard_blocks_closed_cycles() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut mark = CycleMark::new(cycle(), now);
        mark.phase = ward_schema::CyclePhase::Resolving;
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutCycleMark { mark, expected: 0 });
        store.commit(batch).unwrap();

        let mut guarded = WriteBatch::new();
        guarded.require(Guard::CycleOpen(cycle())).push(WriteOp::PutWallet {
            wallet: wallet(1, 5),
            expected: 0,
        });
        assert_eq!(
            store.commit(guarded).unwrap_err(),
            StoreError::CycleClosed(cycle())
        );
    }

    #[test]
    fn lease_is_exclusive_until_dropped() {
        let store: Arc<dyn GameStore> = Arc::new(MemoryStore::new());
        let lease = CycleLease::acquire(&store, cycle()).unwrap();
        assert!(lease.is_some());
        assert!(CycleLease::acquire(&store, cycle()).unwrap().is_none());
        drop(lease);
        assert!(CycleLease::acquire(&store, cycle()).unwrap().is_some());
    }

    #[test]
    fn after_apply_faults_still_apply() {
        let store = MemoryStore::new();
        store.inject_faults(1, FaultMode::AfterApply);
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutWallet {
            wallet: wallet(3, 2),
            expected: 0,
        });
        assert!(matches!(store.commit(batch), Err(StoreError::Unavailable(_))));
        assert!(store.wallet(PlayerId(3)).unwrap().is_some());
    }

    #[test]
    fn snapshot_roundtrip_detects_tampering() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutWallet {
            wallet: wallet(4, 7),
            expected: 0,
        });
        store.commit(batch).unwrap();
        store.allocate_id(IdKind::Action).unwrap();

        let bytes = store.snapshot().unwrap().encode().unwrap();
        let restored = MemoryStore::from_snapshot(MemorySnapshot::decode(&bytes).unwrap());
        assert_eq!(restored.wallet(PlayerId(4)).unwrap().unwrap().version, 1);
        assert_eq!(restored.allocate_id(IdKind::Action).unwrap(), 2);

        let mut snapshot = store.snapshot().unwrap();
        snapshot.hash ^= 1;
        let tampered = snapshot.encode().unwrap();
        assert!(matches!(
            MemorySnapshot::decode(&tampered),
            Err(StoreError::Codec(_))
        ));
    }
}
