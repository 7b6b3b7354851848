use std::fmt;
use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for control points held by a single player in a district.
pub const MAX_CONTROL: u8 = 100;

/// Friendliness a politician starts with toward a player they have never met.
pub const DEFAULT_FRIENDLINESS: u8 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DistrictId(pub String);

impl DistrictId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DistrictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DistrictId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoliticianId(pub String);

impl PoliticianId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoliticianId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PoliticianId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JointActionId(pub u64);

impl fmt::Display for JointActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "j{}", self.0)
    }
}

/// The four wallet categories. Districts yield them, actions spend them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Influence,
    Economy,
    Information,
    Force,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Influence,
        ResourceKind::Economy,
        ResourceKind::Information,
        ResourceKind::Force,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Influence => "influence",
            ResourceKind::Economy => "economy",
            ResourceKind::Information => "information",
            ResourceKind::Force => "force",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "influence" | "inf" => Some(ResourceKind::Influence),
            "economy" | "eco" => Some(ResourceKind::Economy),
            "information" | "info" => Some(ResourceKind::Information),
            "force" => Some(ResourceKind::Force),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amounts for each resource category. Used for balances, commitments and yields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceBundle {
    pub influence: u32,
    pub economy: u32,
    pub information: u32,
    pub force: u32,
}

impl ResourceBundle {
    pub const fn new(influence: u32, economy: u32, information: u32, force: u32) -> Self {
        Self {
            influence,
            economy,
            information,
            force,
        }
    }

    pub const fn uniform(amount: u32) -> Self {
        Self::new(amount, amount, amount, amount)
    }

    pub fn single(kind: ResourceKind, amount: u32) -> Self {
        let mut bundle = Self::default();
        *bundle.get_mut(kind) = amount;
        bundle
    }

    pub fn get(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Influence => self.influence,
            ResourceKind::Economy => self.economy,
            ResourceKind::Information => self.information,
            ResourceKind::Force => self.force,
        }
    }

    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut u32 {
        match kind {
            ResourceKind::Influence => &mut self.influence,
            ResourceKind::Economy => &mut self.economy,
            ResourceKind::Information => &mut self.information,
            ResourceKind::Force => &mut self.force,
        }
    }

    pub fn total_units(&self) -> u32 {
        ResourceKind::ALL
            .iter()
            .fold(0u32, |acc, kind| acc.saturating_add(self.get(*kind)))
    }

    pub fn is_empty(&self) -> bool {
        self.total_units() == 0
    }

    pub fn iter_nonzero(&self) -> impl Iterator<Item = (ResourceKind, u32)> + '_ {
        ResourceKind::ALL
            .into_iter()
            .map(|kind| (kind, self.get(kind)))
            .filter(|(_, amount)| *amount > 0)
    }

    pub fn saturating_add(&self, other: &ResourceBundle) -> ResourceBundle {
        let mut sum = *self;
        for kind in ResourceKind::ALL {
            let slot = sum.get_mut(kind);
            *slot = slot.saturating_add(other.get(kind));
        }
        sum
    }

    /// First category in which `self` cannot cover `request`.
    pub fn shortfall(&self, request: &ResourceBundle) -> Option<(ResourceKind, u32, u32)> {
        ResourceKind::ALL.into_iter().find_map(|kind| {
            let needed = request.get(kind);
            let available = self.get(kind);
            (needed > available).then_some((kind, needed, available))
        })
    }

    pub fn checked_sub(&self, request: &ResourceBundle) -> Option<ResourceBundle> {
        if self.shortfall(request).is_some() {
            return None;
        }
        let mut rest = *self;
        for kind in ResourceKind::ALL {
            *rest.get_mut(kind) -= request.get(kind);
        }
        Some(rest)
    }
}

impl fmt::Display for ResourceBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "influence={} economy={} information={} force={}",
            self.influence, self.economy, self.information, self.force
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("insufficient {resource}: needed {needed}, available {available}")]
    Insufficient {
        resource: ResourceKind,
        needed: u32,
        available: u32,
    },
}

/// Resource balances owned by one player. Balances never go negative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub player: PlayerId,
    pub balances: ResourceBundle,
}

impl Wallet {
    pub fn new(player: PlayerId, balances: ResourceBundle) -> Self {
        Self { player, balances }
    }

    /// All-or-nothing debit. Nothing changes if any category falls short.
    pub fn debit(&mut self, amount: &ResourceBundle) -> Result<(), WalletError> {
        match self.balances.checked_sub(amount) {
            Some(rest) => {
                self.balances = rest;
                Ok(())
            }
            None => {
                let (resource, needed, available) = self
                    .balances
                    .shortfall(amount)
                    .unwrap_or((ResourceKind::Influence, 0, 0));
                Err(WalletError::Insufficient {
                    resource,
                    needed,
                    available,
                })
            }
        }
    }

    pub fn credit(&mut self, amount: &ResourceBundle) {
        self.balances = self.balances.saturating_add(amount);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowances {
    pub main_left: u8,
    pub quick_left: u8,
    pub last_refresh: DateTime<Utc>,
}

impl Allowances {
    pub fn remaining(&self, class: ActionClass) -> u8 {
        match class {
            ActionClass::Main => self.main_left,
            ActionClass::Quick => self.quick_left,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Political leaning in -5..=5.
    pub ideology: i8,
    pub allowances: Allowances,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    pub id: DistrictId,
    pub name: String,
    /// Base yield per cycle before the control tier multiplier.
    pub yields: ResourceBundle,
    pub adjacent: Vec<DistrictId>,
    /// Ideology of the district's primary politician, if it has one.
    pub affinity: Option<i8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Politician {
    pub id: PoliticianId,
    pub name: String,
    pub role: String,
    pub ideology: i8,
    pub district: Option<DistrictId>,
    pub influence: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub district: DistrictId,
    pub player: PlayerId,
    pub points: u8,
    pub updated_at: DateTime<Utc>,
}

impl ControlRecord {
    pub fn new(district: DistrictId, player: PlayerId, now: DateTime<Utc>) -> Self {
        Self {
            district,
            player,
            points: 0,
            updated_at: now,
        }
    }

    /// Copy of the record moved by `delta`, clamped to `0..=MAX_CONTROL`.
    pub fn shifted(&self, delta: i32, now: DateTime<Utc>) -> Self {
        Self {
            district: self.district.clone(),
            player: self.player,
            points: clamp_points(self.points as i32 + delta),
            updated_at: now,
        }
    }
}

pub fn clamp_points(value: i32) -> u8 {
    value.clamp(0, MAX_CONTROL as i32) as u8
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoliticianRelationship {
    pub politician: PoliticianId,
    pub player: PlayerId,
    pub friendliness: u8,
    pub interactions: u32,
    pub last_interaction: Option<DateTime<Utc>>,
}

impl PoliticianRelationship {
    pub fn new(politician: PoliticianId, player: PlayerId) -> Self {
        Self {
            politician,
            player,
            friendliness: DEFAULT_FRIENDLINESS,
            interactions: 0,
            last_interaction: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionClass {
    Main,
    Quick,
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionClass::Main => f.write_str("main"),
            ActionClass::Quick => f.write_str("quick"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    District,
    Politician,
}

/// Closed set of actions a player can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    Influence,
    Attack,
    Defense,
    PoliticianInfluence,
    PoliticianUndermine,
    Reconnaissance,
    Support,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Influence,
        ActionKind::Attack,
        ActionKind::Defense,
        ActionKind::PoliticianInfluence,
        ActionKind::PoliticianUndermine,
        ActionKind::Reconnaissance,
        ActionKind::Support,
    ];

    pub fn class(self) -> ActionClass {
        match self {
            ActionKind::Reconnaissance | ActionKind::Support => ActionClass::Quick,
            _ => ActionClass::Main,
        }
    }

    pub fn target_kind(self) -> TargetKind {
        match self {
            ActionKind::PoliticianInfluence | ActionKind::PoliticianUndermine => {
                TargetKind::Politician
            }
            _ => TargetKind::District,
        }
    }

    /// Kinds resolved with a dice roll. Quick actions never fail.
    pub fn is_rolled(self) -> bool {
        self.class() == ActionClass::Main
    }

    pub fn supports_joint(self) -> bool {
        matches!(
            self,
            ActionKind::Influence | ActionKind::Attack | ActionKind::Defense
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Influence => "influence",
            ActionKind::Attack => "attack",
            ActionKind::Defense => "defense",
            ActionKind::PoliticianInfluence => "politician_influence",
            ActionKind::PoliticianUndermine => "politician_undermine",
            ActionKind::Reconnaissance => "reconnaissance",
            ActionKind::Support => "support",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "influence" => Some(ActionKind::Influence),
            "attack" => Some(ActionKind::Attack),
            "defense" | "defence" => Some(ActionKind::Defense),
            "politician_influence" | "court" => Some(ActionKind::PoliticianInfluence),
            "politician_undermine" | "undermine" => Some(ActionKind::PoliticianUndermine),
            "reconnaissance" | "recon" => Some(ActionKind::Reconnaissance),
            "support" => Some(ActionKind::Support),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    District(DistrictId),
    Politician(PoliticianId),
}

impl Target {
    pub fn kind(&self) -> TargetKind {
        match self {
            Target::District(_) => TargetKind::District,
            Target::Politician(_) => TargetKind::Politician,
        }
    }

    pub fn district(&self) -> Option<&DistrictId> {
        match self {
            Target::District(id) => Some(id),
            Target::Politician(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::District(id) => write!(f, "district:{id}"),
            Target::Politician(id) => write!(f, "politician:{id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Pending,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeTier {
    Success,
    Partial,
    Failure,
}

impl OutcomeTier {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeTier::Success => "success",
            OutcomeTier::Partial => "partial",
            OutcomeTier::Failure => "failure",
        }
    }
}

impl fmt::Display for OutcomeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlStanding {
    pub player: PlayerId,
    pub points: u8,
}

/// Kind-specific payload attached to a resolved action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionDetail {
    NoEffect,
    ControlShift {
        district: DistrictId,
        before: u8,
        after: u8,
    },
    Transfer {
        district: DistrictId,
        defender: Option<PlayerId>,
        taken: u8,
        blocked: u8,
        claimed: bool,
    },
    Fortified {
        district: DistrictId,
        reduction_pct: u8,
    },
    Friendliness {
        politician: PoliticianId,
        player: PlayerId,
        before: u8,
        after: u8,
    },
    Intel {
        district: DistrictId,
        standings: Vec<ControlStanding>,
    },
    Expired {
        participants: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub tier: OutcomeTier,
    pub control_delta: i32,
    pub roll: Option<u8>,
    pub probability: Option<f32>,
    pub multiplier: f32,
    pub refunded: bool,
    pub detail: ActionDetail,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub player: PlayerId,
    pub kind: ActionKind,
    pub target: Target,
    pub committed: ResourceBundle,
    pub cycle: CycleId,
    pub status: ActionStatus,
    pub submitted_at: DateTime<Utc>,
    pub joint: Option<JointActionId>,
    pub result: Option<ActionResult>,
}

impl Action {
    pub fn class(&self) -> ActionClass {
        self.kind.class()
    }

    pub fn is_pending(&self) -> bool {
        self.status == ActionStatus::Pending
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointParticipant {
    pub player: PlayerId,
    pub committed: ResourceBundle,
    pub joined_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointStatus {
    Open,
    Resolved,
    Expired,
}

/// A main action several players pool resources into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointAction {
    pub id: JointActionId,
    pub initiator: PlayerId,
    pub action: ActionId,
    pub kind: ActionKind,
    pub district: DistrictId,
    pub cycle: CycleId,
    pub participants: Vec<JointParticipant>,
    pub min_participants: u8,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: JointStatus,
    pub multiplier: Option<f32>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JointAction {
    pub fn participant_count(&self) -> u32 {
        self.participants.len() as u32
    }

    pub fn total_units(&self) -> u32 {
        self.participants
            .iter()
            .fold(0u32, |acc, p| acc.saturating_add(p.committed.total_units()))
    }

    pub fn has_participant(&self, player: PlayerId) -> bool {
        self.participants.iter().any(|p| p.player == player)
    }

    pub fn has_quorum(&self) -> bool {
        self.participants.len() >= self.min_participants as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CycleSlot {
    First,
    Second,
}

impl CycleSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleSlot::First => "first",
            CycleSlot::Second => "second",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "first" | "1" | "morning" => Some(CycleSlot::First),
            "second" | "2" | "evening" => Some(CycleSlot::Second),
            _ => None,
        }
    }
}

/// One resolution window: a calendar date plus which of the two daily cycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CycleId {
    pub date: NaiveDate,
    pub slot: CycleSlot,
}

impl CycleId {
    pub fn new(date: NaiveDate, slot: CycleSlot) -> Self {
        Self { date, slot }
    }

    pub fn next(self) -> Self {
        match self.slot {
            CycleSlot::First => Self::new(self.date, CycleSlot::Second),
            CycleSlot::Second => Self::new(
                self.date.succ_opt().unwrap_or(NaiveDate::MAX),
                CycleSlot::First,
            ),
        }
    }

    pub fn previous(self) -> Self {
        match self.slot {
            CycleSlot::Second => Self::new(self.date, CycleSlot::First),
            CycleSlot::First => Self::new(
                self.date.pred_opt().unwrap_or(NaiveDate::MIN),
                CycleSlot::Second,
            ),
        }
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.date, self.slot.as_str())
    }
}

/// Pipeline checkpoint for a cycle, in the order the scheduler walks them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CyclePhase {
    Open,
    Resolving,
    Distributing,
    Notifying,
    Closed,
}

impl CyclePhase {
    pub fn accepts_submissions(self) -> bool {
        self == CyclePhase::Open
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ControlTier {
    Absolute,
    Strong,
    Firm,
    Contested,
    Weak,
}

impl ControlTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlTier::Absolute => "absolute",
            ControlTier::Strong => "strong",
            ControlTier::Firm => "firm",
            ControlTier::Contested => "contested",
            ControlTier::Weak => "weak",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLine {
    pub player: PlayerId,
    pub district: DistrictId,
    pub points: u8,
    pub tier: ControlTier,
    pub credited: ResourceBundle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadlineKind {
    Stronghold,
    Majority,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headline {
    pub kind: HeadlineKind,
    pub district: DistrictId,
    pub district_name: String,
    pub player: PlayerId,
    pub player_name: String,
    pub points: u8,
}

impl Headline {
    pub fn text(&self) -> String {
        match self.kind {
            HeadlineKind::Stronghold => format!(
                "{} holds {} firmly with {} control",
                self.player_name, self.district_name, self.points
            ),
            HeadlineKind::Majority => format!(
                "{} leads in {} with {} control",
                self.player_name, self.district_name, self.points
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleMark {
    pub cycle: CycleId,
    pub phase: CyclePhase,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub resolved: u32,
    pub skipped: u32,
    pub decayed: u32,
    pub credits: Vec<CreditLine>,
    pub headlines: Vec<Headline>,
    pub notices_sent: u32,
    pub notices_failed: u32,
}

impl CycleMark {
    pub fn new(cycle: CycleId, now: DateTime<Utc>) -> Self {
        Self {
            cycle,
            phase: CyclePhase::Open,
            opened_at: now,
            closed_at: None,
            resolved: 0,
            skipped: 0,
            decayed: 0,
            credits: Vec::new(),
            headlines: Vec::new(),
            notices_sent: 0,
            notices_failed: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcomeLine {
    pub action: ActionId,
    pub kind: ActionKind,
    pub target: Target,
    pub tier: OutcomeTier,
    pub control_delta: i32,
    pub refunded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlLine {
    pub district: DistrictId,
    pub points: u8,
}

/// Per-player cycle summary handed to the notification collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerCycleNotice {
    pub cycle: CycleId,
    pub player: PlayerId,
    pub outcomes: Vec<ActionOutcomeLine>,
    pub wallet: ResourceBundle,
    pub control: Vec<ControlLine>,
    pub credits: Vec<CreditLine>,
    pub headlines: Vec<Headline>,
}

impl PlayerCycleNotice {
    pub fn total_credited(&self) -> ResourceBundle {
        self.credits
            .iter()
            .fold(ResourceBundle::default(), |acc, line| {
                acc.saturating_add(&line.credited)
            })
    }
}

pub fn encode_notice(notice: &PlayerCycleNotice) -> bincode::Result<Vec<u8>> {
    bincode::serialize(notice)
}

pub fn decode_notice(data: &[u8]) -> bincode::Result<PlayerCycleNotice> {
    bincode::deserialize(data)
}

pub fn encode_notice_json(notice: &PlayerCycleNotice) -> serde_json::Result<String> {
    serde_json::to_string(notice)
}

/// Stable hash of any serializable value, used to checksum store snapshots.
pub fn content_hash<T: Serialize>(value: &T) -> bincode::Result<u64> {
    let encoded = bincode::serialize(value)?;
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    Ok(hasher.finish())
}
