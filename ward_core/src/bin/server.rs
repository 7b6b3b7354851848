use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded, Sender};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{error, info, warn};

use ward_core::{
    load_engine_config_from_env, CycleOutcome, CycleScheduler, Engine, EngineError, GameStore,
    MemoryStore, SeededRolls, TracingNotifier, WorldCatalog,
};
use ward_runtime::{parse_command_line, WardCommand};
use ward_schema::{CycleId, PlayerId};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, metadata) = load_engine_config_from_env();
    let server = config.server().clone();

    let memory = match open_store(server.snapshot_path.as_ref()) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(target: "ward::server", error = %err, "store.open_failed");
            return;
        }
    };
    let store: Arc<dyn GameStore> = memory.clone();
    let engine = match Engine::new(store, config) {
        Ok(engine) => engine,
        Err(err) => {
            error!(target: "ward::server", error = %err, "engine.config_invalid");
            return;
        }
    };
    let pool = match ThreadPoolBuilder::new()
        .num_threads(server.submission_workers.max(1))
        .thread_name(|index| format!("ward-submit-{index}"))
        .build()
    {
        Ok(pool) => Arc::new(pool),
        Err(err) => {
            error!(target: "ward::server", error = %err, "worker_pool.build_failed");
            return;
        }
    };

    let (events_tx, events_rx) = unbounded::<ServerEvent>();
    if let Err(err) = spawn_command_listener(
        server.command_bind,
        engine.clone(),
        Arc::clone(&pool),
        events_tx.clone(),
    ) {
        error!(
            target: "ward::server",
            bind = %server.command_bind,
            error = %err,
            "command_listener.bind_failed"
        );
        return;
    }
    spawn_timer(engine.clone(), server.timer_poll_ms, events_tx);

    info!(
        target: "ward::server",
        command_bind = %server.command_bind,
        workers = server.submission_workers,
        config_path = ?metadata.path(),
        "Ward engine server ready"
    );

    let mut scheduler =
        CycleScheduler::new(engine, SeededRolls::new(server.seed), TracingNotifier);
    while let Ok(event) = events_rx.recv() {
        let reply = match event {
            ServerEvent::Tick(now) => {
                match scheduler.on_timer(now) {
                    Ok(outcomes) => outcomes.iter().for_each(log_outcome),
                    Err(err) => warn!(target: "ward::server", error = %err, "timer.failed"),
                }
                None
            }
            ServerEvent::Close { cycle, reply } => {
                let now = Utc::now();
                let cycle =
                    cycle.unwrap_or_else(|| scheduler.engine().calendar().due_cycle(now));
                let text = match scheduler.close_cycle(cycle, now) {
                    Ok(outcome) => {
                        log_outcome(&outcome);
                        describe_outcome(&outcome)
                    }
                    Err(err) => format!("error: {err}"),
                };
                Some((reply, text))
            }
            ServerEvent::Persist => None,
        };
        if let Some(path) = server.snapshot_path.as_ref() {
            if let Err(err) = memory.save_to(path) {
                warn!(target: "ward::server", error = %err, "snapshot.save_failed");
            }
        }
        if let Some((reply, text)) = reply {
            let _ = reply.send(text);
        }
    }
}

#[derive(Debug)]
enum ServerEvent {
    Tick(DateTime<Utc>),
    /// A player command changed state; the loop writes the snapshot.
    Persist,
    Close {
        cycle: Option<CycleId>,
        reply: Sender<String>,
    },
}

fn open_store(snapshot_path: Option<&PathBuf>) -> Result<MemoryStore, EngineError> {
    let store = match snapshot_path {
        Some(path) if path.exists() => MemoryStore::load_from(path)?,
        _ => MemoryStore::new(),
    };
    WorldCatalog::builtin().seed(&store)?;
    Ok(store)
}

fn spawn_command_listener(
    bind_addr: SocketAddr,
    engine: Engine,
    pool: Arc<ThreadPool>,
    events: Sender<ServerEvent>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr)?;
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let engine = engine.clone();
                    let pool = Arc::clone(&pool);
                    let events = events.clone();
                    thread::spawn(move || handle_client(stream, engine, pool, events));
                }
                Err(err) => {
                    warn!(target: "ward::server", error = %err, "command_client.accept_failed");
                    thread::sleep(Duration::from_millis(200));
                }
            }
        }
    });
    Ok(())
}

fn handle_client(
    stream: TcpStream,
    engine: Engine,
    pool: Arc<ThreadPool>,
    events: Sender<ServerEvent>,
) {
    let peer = stream.peer_addr().ok();
    info!(target: "ward::server", ?peer, "command_client.connected");
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(err) => {
            warn!(target: "ward::server", error = %err, "command_client.clone_failed");
            return;
        }
    };
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let response = match parse_command_line(trimmed) {
                    Ok(WardCommand::Close { cycle }) => request_close(&events, cycle),
                    Ok(command) => {
                        let mutating = changes_state(&command);
                        let reply = pool.install(|| execute(&engine, command, Utc::now()));
                        if mutating
                            && reply.starts_with("ok")
                            && events.send(ServerEvent::Persist).is_err()
                        {
                            break;
                        }
                        reply
                    }
                    Err(err) => {
                        warn!(
                            target: "ward::server",
                            input = trimmed,
                            error = %err,
                            "command.invalid"
                        );
                        format!("error: {err}")
                    }
                };
                if writeln!(writer, "{response}").is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(target: "ward::server", error = %err, "command_client.read_failed");
                break;
            }
        }
    }
}

fn request_close(events: &Sender<ServerEvent>, cycle: Option<CycleId>) -> String {
    let (reply, response) = bounded(1);
    if events.send(ServerEvent::Close { cycle, reply }).is_err() {
        return "error: scheduler stopped".to_string();
    }
    response
        .recv()
        .unwrap_or_else(|_| "error: scheduler stopped".to_string())
}

fn changes_state(command: &WardCommand) -> bool {
    !matches!(command, WardCommand::Status { .. } | WardCommand::Close { .. })
}

/// Runs one player command and renders the reply line.
fn execute(engine: &Engine, command: WardCommand, now: DateTime<Utc>) -> String {
    let result: Result<String, EngineError> = match command {
        WardCommand::Register { name, ideology } => engine
            .register_player(&name, ideology, now)
            .map(|player| format!("ok player={}", player.id)),
        WardCommand::Submit {
            player,
            kind,
            target,
            committed,
        } => engine
            .actions()
            .submit(player, kind, target, committed, now)
            .map(|action| format!("ok action={} cycle={}", action.id, action.cycle)),
        WardCommand::OpenJoint {
            player,
            kind,
            district,
            committed,
        } => engine
            .joints()
            .open(player, kind, district, committed, now)
            .map(|joint| format!("ok joint={} expires={}", joint.id, joint.expires_at)),
        WardCommand::Attach {
            player,
            joint,
            committed,
        } => engine
            .joints()
            .attach(joint, player, committed, now)
            .map(|joint| {
                format!(
                    "ok joint={} participants={}",
                    joint.id,
                    joint.participant_count()
                )
            }),
        WardCommand::Cancel { player } => engine
            .actions()
            .cancel_latest(player, now)
            .map(|action| format!("ok cancelled={} refunded={}", action.id, action.committed)),
        WardCommand::Exchange {
            player,
            from,
            to,
            amount,
        } => engine
            .wallets()
            .exchange(player, from, to, amount)
            .map(|balances| format!("ok wallet={balances}")),
        WardCommand::Status { player } => status(engine, player, now),
        WardCommand::Close { .. } => Ok("error: close is handled by the scheduler".to_string()),
    };
    result.unwrap_or_else(|err| format!("error: {err}"))
}

fn status(
    engine: &Engine,
    player: PlayerId,
    now: DateTime<Utc>,
) -> Result<String, EngineError> {
    let wallet = engine.wallets().balance(player)?;
    let allowances = engine.actions().allowances(player, now)?;
    let pending = engine.actions().pending_for(player)?;
    let holdings = engine
        .ledger()
        .holdings(player)?
        .iter()
        .map(|line| format!("{}:{}", line.district, line.points))
        .collect::<Vec<_>>()
        .join(",");
    Ok(format!(
        "ok wallet={wallet} main={} quick={} pending={} control=[{holdings}]",
        allowances.main_left,
        allowances.quick_left,
        pending.len()
    ))
}

fn spawn_timer(engine: Engine, poll_ms: u64, events: Sender<ServerEvent>) {
    let poll = Duration::from_millis(poll_ms.max(10));
    thread::spawn(move || loop {
        let (cycle, due_at) = engine.calendar().next_results_after(Utc::now());
        info!(target: "ward::server", %cycle, %due_at, "timer.armed");
        while Utc::now() < due_at {
            thread::sleep(poll);
        }
        if events.send(ServerEvent::Tick(Utc::now())).is_err() {
            break;
        }
    });
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Closed(report) => info!(
            target: "ward::server",
            cycle = %report.cycle,
            resolved = report.resolved,
            credits = report.credits.len(),
            "cycle.completed"
        ),
        CycleOutcome::Halted { cycle, phase, error } => error!(
            target: "ward::server",
            %cycle,
            phase = ?phase,
            error = %error,
            "cycle.halted"
        ),
        CycleOutcome::Skipped { cycle, reason } => info!(
            target: "ward::server",
            %cycle,
            reason = ?reason,
            "cycle.skipped"
        ),
    }
}

fn describe_outcome(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Closed(report) => format!(
            "ok cycle={} resolved={} skipped={} credits={} notices={}",
            report.cycle,
            report.resolved,
            report.skipped,
            report.credits.len(),
            report.notices_sent
        ),
        CycleOutcome::Halted { cycle, error, .. } => {
            format!("error: cycle {cycle} halted: {error}")
        }
        CycleOutcome::Skipped { cycle, .. } => format!("skipped cycle={cycle} lease held"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_mutating_commands_request_a_snapshot() {
        for line in [
            "register Ana 0",
            "submit 1 attack vracar force=2",
            "cancel 1",
            "exchange 1 economy force 1",
            "attach 2 j1 force=1",
        ] {
            assert!(changes_state(&parse_command_line(line).unwrap()), "{line}");
        }
        assert!(!changes_state(&parse_command_line("status 1").unwrap()));
        assert!(!changes_state(&parse_command_line("close").unwrap()));
    }
}
