use std::num::ParseIntError;

use chrono::NaiveDate;
use thiserror::Error;
use ward_schema::{
    ActionKind, CycleId, CycleSlot, DistrictId, JointActionId, PlayerId, PoliticianId,
    ResourceBundle, ResourceKind, Target, TargetKind,
};

/// Operator and player commands accepted by the service's line protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum WardCommand {
    Register {
        name: String,
        ideology: i8,
    },
    Submit {
        player: PlayerId,
        kind: ActionKind,
        target: Target,
        committed: ResourceBundle,
    },
    OpenJoint {
        player: PlayerId,
        kind: ActionKind,
        district: DistrictId,
        committed: ResourceBundle,
    },
    Attach {
        player: PlayerId,
        joint: JointActionId,
        committed: ResourceBundle,
    },
    Cancel {
        player: PlayerId,
    },
    Exchange {
        player: PlayerId,
        from: ResourceKind,
        to: ResourceKind,
        amount: u32,
    },
    Close {
        cycle: Option<CycleId>,
    },
    Status {
        player: PlayerId,
    },
}

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("invalid action kind '{0}'")]
    InvalidActionKind(String),
    #[error("invalid resource '{0}'")]
    InvalidResource(String),
    #[error("invalid commitment '{0}', expected resource=amount")]
    InvalidCommitment(String),
    #[error("invalid cycle slot '{0}'")]
    InvalidSlot(String),
    #[error("invalid date '{0}'")]
    InvalidDate(String),
}

pub fn parse_command_line(input: &str) -> Result<WardCommand, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "register" => {
            let name = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("name"))?
                .to_string();
            let ideology_str = parts.next().unwrap_or("0");
            let ideology = parse_i8(ideology_str, "register ideology")?;
            Ok(WardCommand::Register { name, ideology })
        }
        "submit" => {
            let player = parse_player(parts.next(), "submit player")?;
            let kind = parse_kind(parts.next())?;
            let target_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("target"))?;
            let target = match kind.target_kind() {
                TargetKind::District => Target::District(DistrictId::new(target_str)),
                TargetKind::Politician => Target::Politician(PoliticianId::new(target_str)),
            };
            let committed = parse_commitments(parts)?;
            Ok(WardCommand::Submit {
                player,
                kind,
                target,
                committed,
            })
        }
        "joint" => {
            let player = parse_player(parts.next(), "joint player")?;
            let kind = parse_kind(parts.next())?;
            let district = parts
                .next()
                .map(DistrictId::new)
                .ok_or(CommandParseError::MissingArgument("district"))?;
            let committed = parse_commitments(parts)?;
            Ok(WardCommand::OpenJoint {
                player,
                kind,
                district,
                committed,
            })
        }
        "attach" => {
            let player = parse_player(parts.next(), "attach player")?;
            let joint_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("joint"))?;
            let joint = JointActionId(parse_u64(
                joint_str.trim_start_matches('j'),
                "attach joint",
            )?);
            let committed = parse_commitments(parts)?;
            Ok(WardCommand::Attach {
                player,
                joint,
                committed,
            })
        }
        "cancel" => {
            let player = parse_player(parts.next(), "cancel player")?;
            Ok(WardCommand::Cancel { player })
        }
        "exchange" => {
            let player = parse_player(parts.next(), "exchange player")?;
            let from = parse_resource(parts.next(), "from")?;
            let to = parse_resource(parts.next(), "to")?;
            let amount_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("amount"))?;
            let amount = parse_u32(amount_str, "exchange amount")?;
            Ok(WardCommand::Exchange {
                player,
                from,
                to,
                amount,
            })
        }
        "close" => {
            let cycle = match parts.next() {
                None => None,
                Some(date_str) => {
                    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                        .map_err(|_| CommandParseError::InvalidDate(date_str.to_string()))?;
                    let slot_str = parts
                        .next()
                        .ok_or(CommandParseError::MissingArgument("slot"))?;
                    let slot = CycleSlot::parse(slot_str)
                        .ok_or_else(|| CommandParseError::InvalidSlot(slot_str.to_string()))?;
                    Some(CycleId::new(date, slot))
                }
            };
            Ok(WardCommand::Close { cycle })
        }
        "status" => {
            let player = parse_player(parts.next(), "status player")?;
            Ok(WardCommand::Status { player })
        }
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

fn parse_player(
    value: Option<&str>,
    context: &'static str,
) -> Result<PlayerId, CommandParseError> {
    let value = value.ok_or(CommandParseError::MissingArgument("player"))?;
    parse_u64(value, context).map(PlayerId)
}

fn parse_kind(value: Option<&str>) -> Result<ActionKind, CommandParseError> {
    let value = value.ok_or(CommandParseError::MissingArgument("kind"))?;
    ActionKind::parse(value).ok_or_else(|| CommandParseError::InvalidActionKind(value.to_string()))
}

fn parse_resource(
    value: Option<&str>,
    name: &'static str,
) -> Result<ResourceKind, CommandParseError> {
    let value = value.ok_or(CommandParseError::MissingArgument(name))?;
    ResourceKind::parse(value).ok_or_else(|| CommandParseError::InvalidResource(value.to_string()))
}

fn parse_commitments<'a, I>(parts: I) -> Result<ResourceBundle, CommandParseError>
where
    I: Iterator<Item = &'a str>,
{
    let mut bundle = ResourceBundle::default();
    for token in parts {
        let (name, amount_str) = token
            .split_once('=')
            .ok_or_else(|| CommandParseError::InvalidCommitment(token.to_string()))?;
        let kind = ResourceKind::parse(name)
            .ok_or_else(|| CommandParseError::InvalidResource(name.to_string()))?;
        let amount = parse_u32(amount_str, "commitment amount")?;
        let slot = bundle.get_mut(kind);
        *slot = slot.saturating_add(amount);
    }
    Ok(bundle)
}

fn parse_u32(value: &str, context: &'static str) -> Result<u32, CommandParseError> {
    value
        .parse::<u32>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_u64(value: &str, context: &'static str) -> Result<u64, CommandParseError> {
    value
        .parse::<u64>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_i8(value: &str, context: &'static str) -> Result<i8, CommandParseError> {
    value
        .parse::<i8>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}
