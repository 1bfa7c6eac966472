use std::{
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use adaptive_coach::{
    CancelToken, CoachConfig, EngineAdapter, EngineTurn, Error, GameSession, Result, ShakmatyRules,
    SqliteStore, STARTING_FEN,
};
use clap::Parser;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// UCI engine binary
    #[arg(short, long)]
    pub engine: Option<PathBuf>,
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// SQLite database for the level and annotations
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Starting position; the player moves first
    #[arg(long, default_value = STARTING_FEN)]
    pub fen: String,
    /// Play at this level instead of the stored one
    #[arg(short, long)]
    pub level: Option<u8>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Depth of the searches that score your moves
    #[arg(long)]
    pub eval_depth: Option<u32>,
    #[arg(long)]
    pub probe_depth: Option<u32>,
    /// Engine hash table size in MB
    #[arg(long)]
    pub hash: Option<u32>,
    #[arg(long)]
    pub init_timeout_ms: Option<u64>,
    #[arg(long)]
    pub ready_timeout_ms: Option<u64>,
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn setup_logger(level: &str) {
    env_logger::Builder::new()
        .filter_level(level.parse().unwrap_or(log::LevelFilter::Info))
        .init();
}

fn load_config(args: &Args) -> Result<CoachConfig> {
    let mut config = match &args.config {
        Some(path) => CoachConfig::load(path)?,
        None => CoachConfig::default(),
    };

    if args.engine.is_some() {
        config.engine_path = args.engine.clone();
    }
    if args.db.is_some() {
        config.database_path = args.db.clone();
    }
    if args.level.is_some() {
        config.level_override = args.level;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.hash.is_some() {
        config.hash_mb = args.hash;
    }
    config.eval_depth = args.eval_depth.unwrap_or(config.eval_depth);
    config.probe_depth = args.probe_depth.unwrap_or(config.probe_depth);
    config.init_timeout_ms = args.init_timeout_ms.unwrap_or(config.init_timeout_ms);
    config.ready_timeout_ms = args.ready_timeout_ms.unwrap_or(config.ready_timeout_ms);
    config.validate()?;
    Ok(config)
}

fn open_store(config: &CoachConfig) -> Result<SqliteStore> {
    match &config.database_path {
        Some(path) => SqliteStore::open(path),
        None => {
            warn!("No database configured; the level will not be kept");
            SqliteStore::open_in_memory()
        }
    }
}

const HELP: &str = "moves: e2e4 or Nf3 | undo | explain <ply> | fen | resign | quit";

type Session = GameSession<EngineAdapter, SqliteStore, ShakmatyRules>;

/// Run the engine's turn, cancelling the search on Ctrl-C
async fn engine_turn(session: &mut Session) -> Result<Option<EngineTurn>> {
    let token = CancelToken::new();
    let watcher = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        })
    };

    let turn = session.play_engine_move(Some(&token)).await;
    watcher.abort();

    match turn {
        Ok(turn) => Ok(Some(turn)),
        Err(e) if e.is_aborted() => {
            println!("no move chosen");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn handle_command(session: &mut Session, line: &str) -> Result<bool> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(true);
    };

    match command {
        "quit" | "exit" => return Ok(false),
        "help" => println!("{}", HELP),
        "fen" => println!("{}", session.fen()),
        "resign" => session.resign()?,
        "undo" => {
            // back to the player's previous turn
            let undone = session.undo()?;
            if !undone.is_player_ply() {
                session.undo()?;
            }
            println!("position: {}", session.fen());
        }
        "explain" => {
            let ply = parts.next().and_then(|p| p.parse::<u32>().ok());
            let latest = session.annotations().iter().rev().find(|a| a.is_player_ply()).map(|a| a.ply);
            match ply.or(latest).and_then(|ply| session.coaching_context(ply)) {
                Some(context) => println!("{}", context.to_json()?),
                None => println!("no such move"),
            }
        }
        mv => {
            let annotation = session.play_player_move(mv).await?;
            println!(
                "{} {}: {} ({} -> {})",
                annotation.ply, annotation.san, annotation.classification, annotation.eval_before, annotation.eval_after
            );
        }
    }
    Ok(true)
}

async fn play(session: &mut Session) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    println!("{}", HELP);

    while session.result().is_none() {
        if !session.is_player_turn() {
            match engine_turn(session).await? {
                Some(EngineTurn::Moved { annotation, level }) => {
                    println!("{} {} (level {})", annotation.ply, annotation.san, level)
                }
                Some(EngineTurn::Resigned) => println!("engine resigns"),
                None => break,
            }
            continue;
        }

        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = stdin.next_line().await? else {
            break;
        };
        match handle_command(session, line.trim()).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e @ (Error::Rules(_) | Error::NothingToUndo | Error::Json(_))) => println!("{}", e),
            Err(e) => return Err(e),
        }
    }

    match session.result() {
        Some(_) => {
            let report = session.finish(None)?;
            println!(
                "result {} | gps {:.2} | level {} -> {}",
                report.stats.result, report.gps, report.level.old_level, report.level.new_level
            );
        }
        None => info!("Game abandoned; level unchanged"),
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let engine_path = config
        .engine_path
        .clone()
        .ok_or_else(|| Error::Config("no engine path given".to_string()))?;

    let store = open_store(&config)?;
    let adapter = EngineAdapter::from_path(engine_path, config.adapter_settings());
    if let Err(e) = adapter.initialize().await {
        error!("engine unavailable: {}", e);
        return Err(e.into());
    }

    let mut session = GameSession::new(adapter.clone(), store, ShakmatyRules, &config);
    let started = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let game_id = format!("game-{}", started.as_millis());
    session.start(game_id, &args.fen)?;

    let outcome = play(&mut session).await;
    adapter.shutdown().await;
    outcome
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logger(&args.log_level);

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
