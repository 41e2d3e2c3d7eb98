use anyhow::Context;
use clap::{Parser, ValueEnum};
use maze_chase_server::advisor::HeuristicAdvisor;
use maze_chase_server::advisory::{AdvisoryOptions, AdvisoryReply};
use maze_chase_server::engine::{GameEngine, GameEngineOptions};
use maze_chase_server::grid::Grid;
use maze_chase_server::level::Level;
use maze_chase_server::types::{Direction, GameState, GhostState, RuntimeEvent, Snapshot, Vec2};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays headless games with a pellet-seeking autopilot")]
struct Cli {
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 3)]
    games: u32,
    #[arg(long, default_value_t = 5_000)]
    max_ticks: u64,
    #[arg(long, value_enum, default_value_t = AdvisorChoice::Off)]
    advisor: AdvisorChoice,
    /// ASCII board to play instead of the classic layout.
    #[arg(long)]
    level: Option<PathBuf>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
enum AdvisorChoice {
    Off,
    Heuristic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum GameOutcome {
    GameOver,
    TickLimit,
}

impl GameOutcome {
    fn key(self) -> &'static str {
        match self {
            Self::GameOver => "game_over",
            Self::TickLimit => "tick_limit",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct GameResultLine {
    game: u32,
    seed: u32,
    advisor: AdvisorChoice,
    outcome: GameOutcome,
    ticks: u64,
    score: u32,
    level: u32,
    #[serde(rename = "levelsCleared")]
    levels_cleared: u32,
    #[serde(rename = "pelletsEaten")]
    pellets_eaten: u32,
    #[serde(rename = "powerPellets")]
    power_pellets: u32,
    #[serde(rename = "ghostsEaten")]
    ghosts_eaten: u32,
    #[serde(rename = "livesLost")]
    lives_lost: u32,
    #[serde(rename = "modeChanges")]
    mode_changes: u32,
    #[serde(rename = "advisoryTicks")]
    advisory_ticks: u64,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug)]
struct GameRunResult {
    result: GameResultLine,
    anomaly_records: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "gameCount")]
    game_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageScore")]
    average_score: u32,
    #[serde(rename = "outcomeCounts")]
    outcome_counts: BTreeMap<String, usize>,
    games: Vec<GameResultLine>,
}

struct GameSetup<'a> {
    index: u32,
    seed: u32,
    advisor: AdvisorChoice,
    max_ticks: u64,
    level: &'a Level,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let level = match cli.level.as_deref() {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read level file {}", path.display()))?;
            Level::parse_text(&text).with_context(|| format!("invalid level {}", path.display()))?
        }
        None => Level::classic()?,
    };

    let run_started_at_ms = now_ms();
    let base_seed = normalize_seed(cli.seed.unwrap_or(run_started_at_ms));
    let run_id = default_run_id(base_seed, run_started_at_ms);
    let mut results = Vec::new();
    let mut anomaly_count = 0usize;

    for index in 0..cli.games.max(1) {
        let setup = GameSetup {
            index,
            seed: base_seed.wrapping_add(index),
            advisor: cli.advisor,
            max_ticks: cli.max_ticks.max(1),
            level: &level,
        };
        info!(run_id = %run_id, game = index, seed = setup.seed, "game started");
        let run = run_game(&setup)?;

        for anomaly in &run.anomaly_records {
            warn!(
                run_id = %run_id,
                game = index,
                tick = anomaly.tick,
                message = %anomaly.message,
                "anomaly detected"
            );
        }
        anomaly_count += run.anomaly_records.len();
        info!(
            run_id = %run_id,
            game = index,
            outcome = run.result.outcome.key(),
            score = run.result.score,
            ticks = run.result.ticks,
            "game finished"
        );

        println!("{}", serde_json::to_string(&run.result)?);
        results.push(run.result);
    }

    let has_anomaly = results.iter().any(|result| !result.anomalies.is_empty());
    let summary = build_run_summary(run_id, run_started_at_ms, now_ms(), results, anomaly_count);

    if let Some(path) = cli.summary_out.as_deref() {
        write_summary(path, &summary)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
    }

    info!(
        run_id = %summary.run_id,
        games = summary.game_count,
        anomalies = summary.anomaly_count,
        average_score = summary.average_score,
        "run finished"
    );

    if has_anomaly {
        std::process::exit(1);
    }
    Ok(())
}

fn run_game(setup: &GameSetup<'_>) -> anyhow::Result<GameRunResult> {
    let options = GameEngineOptions {
        seed: Some(setup.seed),
        advisory: (setup.advisor == AdvisorChoice::Heuristic).then(AdvisoryOptions::default),
        ..GameEngineOptions::default()
    };
    let mut engine = GameEngine::new(setup.level.clone(), options)?;
    let heuristic = (setup.advisor == AdvisorChoice::Heuristic).then_some(HeuristicAdvisor);
    let tick = Duration::from_millis(engine.config.tick_ms);

    // virtual clock: the life-loss pause and advisory windows follow tick time
    let mut now = Instant::now();
    engine.request_start(now);
    let mut previous = engine.build_snapshot(true);

    let mut result = GameResultLine {
        game: setup.index,
        seed: setup.seed,
        advisor: setup.advisor,
        outcome: GameOutcome::TickLimit,
        ticks: 0,
        score: 0,
        level: 1,
        levels_cleared: 0,
        pellets_eaten: 0,
        power_pellets: 0,
        ghosts_eaten: 0,
        lives_lost: 0,
        mode_changes: 0,
        advisory_ticks: 0,
        anomalies: Vec::new(),
    };
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();

    while result.ticks < setup.max_ticks {
        let hazards = hazard_cells(engine.grid(), &previous);
        let dir = autopilot_direction(engine.grid(), engine.player_position(), &hazards);
        engine.set_desired_direction(dir);

        now += tick;
        engine.advance(now);
        if let Some(advisor) = heuristic.as_ref() {
            if let Some(request) = engine.poll_advisory_request(now) {
                let reply = AdvisoryReply {
                    generation: request.generation,
                    result: Ok(advisor.compute(&request)),
                };
                engine.offer_advisory(reply, now);
            }
        }

        let snapshot = engine.build_snapshot(true);
        result.ticks += 1;
        if snapshot.advisory_active {
            result.advisory_ticks += 1;
        }

        for message in collect_snapshot_anomalies(engine.grid(), &previous, &snapshot) {
            push_anomaly(
                &mut result.anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                message,
            );
        }

        for event in &snapshot.events {
            match event {
                RuntimeEvent::PelletEaten { .. } => result.pellets_eaten += 1,
                RuntimeEvent::PowerPelletEaten { .. } => {
                    result.pellets_eaten += 1;
                    result.power_pellets += 1;
                }
                RuntimeEvent::GhostEaten { .. } => result.ghosts_eaten += 1,
                RuntimeEvent::LifeLost { .. } => result.lives_lost += 1,
                RuntimeEvent::ModeChanged { .. } => result.mode_changes += 1,
                RuntimeEvent::LevelWon { .. } => result.levels_cleared += 1,
                _ => {}
            }
        }

        result.score = snapshot.score;
        result.level = snapshot.level;
        match snapshot.state {
            GameState::GameOver => {
                result.outcome = GameOutcome::GameOver;
                break;
            }
            GameState::LevelWon => {
                engine.request_start(now);
                previous = engine.build_snapshot(true);
                continue;
            }
            _ => {}
        }
        previous = snapshot;
    }

    Ok(GameRunResult {
        result,
        anomaly_records,
    })
}

/// Cells a normal ghost occupies or can reach next tick.
fn hazard_cells(grid: &Grid, snapshot: &Snapshot) -> HashSet<Vec2> {
    let mut hazards = HashSet::new();
    for ghost in &snapshot.ghosts {
        if ghost.state != GhostState::Normal {
            continue;
        }
        let pos = Vec2 {
            x: ghost.x,
            y: ghost.y,
        };
        hazards.insert(pos);
        for dir in Direction::ALL {
            hazards.insert(grid.step(pos, dir));
        }
    }
    hazards
}

/// First step toward the nearest pellet, routing around hazards when any
/// route exists.
fn autopilot_direction(grid: &Grid, start: Vec2, hazards: &HashSet<Vec2>) -> Direction {
    nearest_pellet_step(grid, start, hazards)
        .or_else(|| nearest_pellet_step(grid, start, &HashSet::new()))
        .unwrap_or(Direction::None)
}

fn nearest_pellet_step(grid: &Grid, start: Vec2, blocked: &HashSet<Vec2>) -> Option<Direction> {
    let mut visited = vec![false; grid.cell_count()];
    let mut queue = VecDeque::new();
    visited[grid.index_of(start)?] = true;

    for dir in Direction::ALL {
        let next = grid.step(start, dir);
        if !grid.is_walkable_for_player(next) || blocked.contains(&next) {
            continue;
        }
        let Some(idx) = grid.index_of(next) else {
            continue;
        };
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        queue.push_back((next, dir));
    }

    while let Some((pos, first)) = queue.pop_front() {
        if grid.classify(pos).is_pellet() {
            return Some(first);
        }
        for dir in Direction::ALL {
            let next = grid.step(pos, dir);
            if !grid.is_walkable_for_player(next) || blocked.contains(&next) {
                continue;
            }
            let Some(idx) = grid.index_of(next) else {
                continue;
            };
            if !visited[idx] {
                visited[idx] = true;
                queue.push_back((next, first));
            }
        }
    }
    None
}

fn collect_snapshot_anomalies(
    grid: &Grid,
    previous: &Snapshot,
    snapshot: &Snapshot,
) -> Vec<String> {
    let mut anomalies = Vec::new();
    let remaining = grid.count_pellets();
    if snapshot.pellets_eaten + remaining != snapshot.total_pellets {
        anomalies.push(format!(
            "pellet accounting mismatch: eaten {} + remaining {remaining} != total {}",
            snapshot.pellets_eaten, snapshot.total_pellets
        ));
    }
    if snapshot.state == GameState::LevelWon && snapshot.pellets_eaten != snapshot.total_pellets {
        anomalies.push("level won with pellets left".to_string());
    }
    if snapshot.score < previous.score {
        anomalies.push(format!(
            "score decreased: {} -> {}",
            previous.score, snapshot.score
        ));
    }
    if snapshot.lives > previous.lives {
        anomalies.push(format!(
            "lives increased: {} -> {}",
            previous.lives, snapshot.lives
        ));
    }
    if snapshot.state == GameState::GameOver && snapshot.lives != 0 {
        anomalies.push(format!("game over with {} lives left", snapshot.lives));
    }
    for ghost in &snapshot.ghosts {
        if grid.index_of(Vec2 { x: ghost.x, y: ghost.y }).is_none() {
            anomalies.push(format!("ghost {} off the board", ghost.id));
        }
    }
    anomalies
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_run_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    games: Vec<GameResultLine>,
    anomaly_count: usize,
) -> RunSummary {
    let game_count = games.len();
    let average_score = if game_count == 0 {
        0
    } else {
        (games.iter().map(|game| u64::from(game.score)).sum::<u64>() / game_count as u64) as u32
    };
    let mut outcome_counts = BTreeMap::new();
    for game in &games {
        *outcome_counts
            .entry(game.outcome.key().to_string())
            .or_insert(0) += 1;
    }
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        game_count,
        anomaly_count,
        average_score,
        outcome_counts,
        games,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, summary_text)?;
    Ok(())
}
