//! peerlobby demo binary.
//!
//! Runs a host and any number of joiners in one process over the in-memory
//! broker, then plays a short script: everyone joins, the scripted chat lines
//! go out, joiners mark themselves ready, and the host starts the room.
//!
//! # Usage
//!
//! ```bash
//! # Default cast: Alice hosts, Bob and Carol join
//! peerlobby
//!
//! # Custom cast and chat
//! peerlobby --host Dana --join Eve --chat "Eve:hi" --chat "Dana:welcome"
//!
//! # Reproducible room codes
//! peerlobby --seed 7
//! ```

use std::{collections::HashSet, time::Duration};

use clap::Parser;
use peerlobby_app::{
    LocalBroker, RoomView, Runtime, RuntimeConfig, RuntimeError, RuntimeHandle, SystemEnv,
    ValidationError, validate_nickname, validate_room_code,
};
use peerlobby_core::{Environment, SessionConfig};
use peerlobby_harness::SimEnv;
use thiserror::Error;
use tokio::{task::JoinHandle, time::timeout};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Scripted lobby demo
#[derive(Parser, Debug)]
#[command(name = "peerlobby")]
#[command(about = "Run a scripted peer-to-peer lobby in one process")]
#[command(version)]
struct Args {
    /// Host nickname
    #[arg(long, default_value = "Alice")]
    host: String,

    /// Joiner nickname (repeatable)
    #[arg(long = "join", default_values = ["Bob", "Carol"])]
    joiners: Vec<String>,

    /// Chat line as NAME:TEXT (repeatable)
    #[arg(long = "chat", value_parser = parse_chat)]
    chat: Vec<ScriptedChat>,

    /// Stop after chatting; skip ready and start
    #[arg(long)]
    no_start: bool,

    /// Seed for room code generation (OS randomness if absent)
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds to wait for each step
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScriptedChat {
    speaker: String,
    text: String,
}

fn parse_chat(input: &str) -> Result<ScriptedChat, String> {
    let (speaker, text) =
        input.split_once(':').ok_or_else(|| format!("expected NAME:TEXT, got {input:?}"))?;
    let speaker = speaker.trim();
    if speaker.is_empty() {
        return Err("chat line has no speaker".to_string());
    }
    Ok(ScriptedChat { speaker: speaker.to_string(), text: text.to_string() })
}

#[derive(Error, Debug)]
enum DemoError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("nickname {0} is used twice")]
    DuplicateNickname(String),

    #[error("no participant named {0}")]
    UnknownSpeaker(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("runtime task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One participant's runtime task and handle.
struct Peer {
    name: String,
    task: JoinHandle<Result<RoomView, RuntimeError>>,
    handle: RuntimeHandle,
}

impl Peer {
    fn spawn<E: Environment>(broker: &LocalBroker, env: &E, config: SessionConfig) -> Self {
        let name = config.nickname.clone();
        let (runtime, handle) =
            Runtime::new(broker.transport(), env, config, RuntimeConfig::default());
        Self { name, task: tokio::spawn(runtime.run()), handle }
    }

    async fn wait(
        &self,
        within: Duration,
        what: &'static str,
        predicate: impl FnMut(&RoomView) -> bool,
    ) -> Result<RoomView, DemoError> {
        let view = timeout(within, self.handle.wait_for(predicate))
            .await
            .map_err(|_| DemoError::Timeout(what))??;
        Ok(view)
    }

    async fn finish(self) -> Result<RoomView, DemoError> {
        if self.handle.quit().await.is_err() {
            tracing::debug!(name = %self.name, "runtime already stopped");
        }
        Ok(self.task.await??)
    }
}

fn check_cast(args: &Args) -> Result<(), DemoError> {
    let mut seen = HashSet::new();
    for name in std::iter::once(&args.host).chain(&args.joiners) {
        validate_nickname(name)?;
        if !seen.insert(name.as_str()) {
            return Err(DemoError::DuplicateNickname(name.clone()));
        }
    }
    for line in &args.chat {
        if !seen.contains(line.speaker.as_str()) {
            return Err(DemoError::UnknownSpeaker(line.speaker.clone()));
        }
    }
    Ok(())
}

fn log_view(name: &str, view: &RoomView) {
    for participant in &view.roster {
        tracing::info!(
            seen_by = name,
            id = %participant.id,
            ready = participant.ready,
            "roster: {}",
            participant.name
        );
    }
    for line in &view.chat {
        tracing::info!(seen_by = name, "chat: {}: {}", line.label, line.text);
    }
}

async fn run_demo(args: Args) -> Result<Vec<RoomView>, DemoError> {
    match args.seed {
        Some(seed) => run_script(&args, &SimEnv::with_seed(seed)).await,
        None => run_script(&args, &SystemEnv::new()).await,
    }
}

async fn run_script<E: Environment>(args: &Args, env: &E) -> Result<Vec<RoomView>, DemoError> {
    check_cast(args)?;
    let within = Duration::from_secs(args.timeout_secs);
    let broker = LocalBroker::new();

    let host = Peer::spawn(&broker, env, SessionConfig::host(args.host.clone()));
    let created = host.wait(within, "room code", |v| v.room_code.is_some()).await?;
    let code = created.room_code.ok_or(DemoError::Timeout("room code"))?;
    tracing::info!(%code, host = %host.name, "room created");

    // Joiners type the code in; run it through the same check a front end would.
    let typed = validate_room_code(&code.to_string().to_lowercase())?;

    let mut peers = vec![host];
    for name in &args.joiners {
        let joiner = Peer::spawn(&broker, env, SessionConfig::join(name.clone(), typed.clone()));
        let expected = peers.len() + 1;
        peers[0].wait(within, "join", |v| v.roster.len() == expected).await?;
        tracing::info!(name = %joiner.name, "joined");
        peers.push(joiner);
    }

    let total = peers.len();
    for peer in &peers {
        peer.wait(within, "roster sync", |v| v.roster.len() == total).await?;
    }

    for line in &args.chat {
        let speaker = peers
            .iter()
            .find(|p| p.name == line.speaker)
            .ok_or_else(|| DemoError::UnknownSpeaker(line.speaker.clone()))?;
        speaker.handle.send_chat(line.text.clone()).await?;
    }
    let lines = args.chat.iter().filter(|l| !l.text.trim().is_empty()).count();
    for peer in &peers {
        peer.wait(within, "chat delivery", |v| v.chat.len() == lines).await?;
    }

    if !args.no_start {
        for joiner in &peers[1..] {
            joiner.handle.mark_ready().await?;
        }
        peers[0].wait(within, "everyone ready", |v| v.can_start).await?;
        peers[0].handle.request_start().await?;
        for peer in &peers {
            peer.wait(within, "start", RoomView::is_started).await?;
        }
        tracing::info!(participants = total, "room started");
    }

    let mut finals = Vec::with_capacity(peers.len());
    for peer in peers {
        let name = peer.name.clone();
        let view = peer.finish().await?;
        log_view(&name, &view);
        finals.push(view);
    }
    Ok(finals)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("peerlobby demo starting");
    let finals = run_demo(args).await?;
    tracing::info!(participants = finals.len(), "demo finished");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("peerlobby").chain(extra.iter().copied()))
    }

    #[test]
    fn chat_lines_split_on_first_colon() {
        assert_eq!(
            parse_chat("Bob: see you at 10:30"),
            Ok(ScriptedChat { speaker: "Bob".to_string(), text: " see you at 10:30".to_string() })
        );
        assert!(parse_chat("no separator").is_err());
        assert!(parse_chat(" :text").is_err());
    }

    #[test]
    fn cast_is_validated() {
        assert!(matches!(check_cast(&args(&["--join", "Alice"])), Err(DemoError::DuplicateNickname(_))));
        assert!(matches!(check_cast(&args(&["--host", "x"])), Err(DemoError::Validation(_))));
        assert!(matches!(
            check_cast(&args(&["--chat", "Zed:hi"])),
            Err(DemoError::UnknownSpeaker(_))
        ));
        assert!(check_cast(&args(&["--chat", "Bob:hi"])).is_ok());
    }

    #[tokio::test]
    async fn default_script_starts_room() {
        let finals = run_demo(args(&["--chat", "Bob:hi", "--chat", "Alice:welcome"])).await.unwrap();

        assert_eq!(finals.len(), 3);
        for view in &finals {
            assert!(view.is_started());
            assert_eq!(view.roster.len(), 3);
            assert_eq!(view.chat.len(), 2);
        }
    }

    #[tokio::test]
    async fn seed_fixes_room_code() {
        let first = run_demo(args(&["--seed", "7", "--no-start"])).await.unwrap();
        let second = run_demo(args(&["--seed", "7", "--no-start"])).await.unwrap();

        assert!(first[0].room_code.is_some());
        assert_eq!(first[0].room_code, second[0].room_code);
    }

    #[tokio::test]
    async fn no_start_leaves_lobby_open() {
        let finals = run_demo(args(&["--join", "Bob", "--no-start"])).await.unwrap();

        assert_eq!(finals.len(), 2);
        assert!(finals.iter().all(|v| !v.is_started()));
    }
}
