use thiserror::Error;
use ward_schema::{
    ActionClass, ActionId, ActionKind, CycleId, DistrictId, JointActionId, PlayerId, PoliticianId,
    ResourceKind, Target, WalletError,
};

use crate::config::EngineConfigError;
use crate::store::StoreError;

/// Top-level error surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] EngineConfigError),
}

impl EngineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }

    /// Failures that skip a single action during resolution instead of halting the cycle.
    pub fn skips_action(&self) -> bool {
        matches!(
            self,
            EngineError::Resolution(_) | EngineError::NotFound(_) | EngineError::Validation(_)
        )
    }
}

/// Rejected before any state changes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("insufficient {resource}: needed {needed}, available {available}")]
    InsufficientResources {
        resource: ResourceKind,
        needed: u32,
        available: u32,
    },
    #[error("no {class} actions remaining")]
    NoActionsRemaining { class: ActionClass },
    #[error("{units} resource units committed, at least {minimum} required")]
    InvalidComposition { units: u32, minimum: u32 },
    #[error("{kind} cannot target {target}")]
    InvalidTarget { kind: ActionKind, target: Target },
    #[error("{kind} cannot be run as a joint action")]
    JointUnsupported { kind: ActionKind },
    #[error("submissions for cycle {cycle} are closed")]
    SubmissionsClosed { cycle: CycleId },
    #[error("invalid exchange: {reason}")]
    InvalidExchange { reason: &'static str },
    #[error("ideology {0} outside -5..=5")]
    IdeologyOutOfRange(i32),
}

impl From<WalletError> for ValidationError {
    fn from(value: WalletError) -> Self {
        match value {
            WalletError::Insufficient {
                resource,
                needed,
                available,
            } => ValidationError::InsufficientResources {
                resource,
                needed,
                available,
            },
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("contention on {record} persisted after {attempts} attempts")]
    Contention { record: String, attempts: u32 },
    #[error("joint action {0} is no longer open")]
    JointNotOpen(JointActionId),
    #[error("joint action {0} has expired")]
    JointExpired(JointActionId),
    #[error("player {player} already joined {joint}")]
    AlreadyJoined {
        joint: JointActionId,
        player: PlayerId,
    },
    #[error("resolution of cycle {cycle} has started")]
    ResolutionStarted { cycle: CycleId },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("player {0} not found")]
    Player(PlayerId),
    #[error("wallet for player {0} not found")]
    Wallet(PlayerId),
    #[error("district {0} not found")]
    District(DistrictId),
    #[error("politician {0} not found")]
    Politician(PoliticianId),
    #[error("action {0} not found")]
    Action(ActionId),
    #[error("joint action {0} not found")]
    JointAction(JointActionId),
    #[error("player {0} has no pending action")]
    PendingAction(PlayerId),
}

/// A stored action that cannot be resolved. The action stays pending for review.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("action {action} is orphaned: {reason}")]
    Orphaned { action: ActionId, reason: String },
    #[error("action {action} targets missing {target}")]
    MissingTarget { action: ActionId, target: Target },
    #[error("action {action} is malformed: {reason}")]
    Malformed { action: ActionId, reason: String },
}
