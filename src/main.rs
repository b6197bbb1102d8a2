use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use snake_ga::{Cell, Game, Network, Player, TrainConfig, Trainer, evaluate_model};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const FRAME_DELAY: Duration = Duration::from_millis(80);

/// Snake controller trained by a genetic algorithm.
#[derive(Parser)]
#[command(name = "snake-ga", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evolve a controller and keep the best network in `model`
    Train {
        /// JSON training configuration
        config: PathBuf,
        /// Output model file, rewritten whenever the best fitness improves
        model: PathBuf,
    },
    /// Play a saved model over many seeded games and print the stats as JSON
    Evaluate {
        model: PathBuf,
        #[arg(default_value_t = 1000)]
        episodes: usize,
        /// Board size, seed and step cap; defaults when omitted
        config: Option<PathBuf>,
    },
    /// Watch a saved model play in the terminal
    Play {
        model: PathBuf,
        #[arg(default_value_t = 500)]
        ticks: usize,
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.command {
        Command::Train { config, model } => train(&config, &model),
        Command::Evaluate { model, episodes, config } => evaluate(&model, episodes, config.as_deref()),
        Command::Play { model, ticks, config } => play(&model, ticks, config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<TrainConfig> {
    match path {
        Some(p) => TrainConfig::from_json_file(p)
            .with_context(|| format!("loading config {}", p.display())),
        None => Ok(TrainConfig::default()),
    }
}

fn load_model(path: &Path) -> Result<Network> {
    Network::load(path).with_context(|| format!("loading model {}", path.display()))
}

fn train(config_path: &Path, model_path: &Path) -> Result<()> {
    let config = load_config(Some(config_path))?;
    let mut trainer = Trainer::new(config).context("setting up trainer")?;
    let summary = trainer
        .run(model_path, |s| {
            info!(generation = s.generation, best = s.best, mean = s.mean, worst = s.worst, "generation");
        })
        .context("training")?;

    if let Some(stats) = trainer.best_stats()? {
        info!(
            highest_score = stats.highest_score,
            avg_score = stats.avg_score,
            win_rate = stats.win_rate(),
            "best individual"
        );
    }
    info!(
        generations = summary.generations,
        best_fitness = summary.best_fitness,
        solved = summary.solved,
        model = %model_path.display(),
        "training finished"
    );
    Ok(())
}

fn evaluate(model_path: &Path, episodes: usize, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let net = load_model(model_path)?;
    let base_seed = config.seed.unwrap_or_else(rand::random);
    let stats = evaluate_model(
        &net,
        config.board_width,
        config.board_height,
        episodes,
        base_seed,
        config.episode_step_cap,
    )?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn play(model_path: &Path, ticks: usize, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let net = load_model(model_path)?;
    let seed = config.seed.unwrap_or_else(rand::random);
    let mut player = Player::new(net, config.board_width, config.board_height, seed)?;
    for _ in 0..ticks {
        let state = player.tick()?;
        if state.is_terminal() {
            info!(?state, episodes = player.episodes(), best = player.best_score(), "episode over");
        }
        print!("\x1b[2J\x1b[H{}", render(player.game()));
        println!("score {}  best {}", player.game().score(), player.best_score());
        thread::sleep(FRAME_DELAY);
    }
    Ok(())
}

fn render(game: &Game) -> String {
    let width = game.width() as usize;
    let mut out = String::with_capacity((width + 3) * (game.height() as usize + 2));
    let border = format!("+{}+\n", "-".repeat(width));
    out.push_str(&border);
    for row in game.board().chunks(width) {
        out.push('|');
        out.extend(row.iter().map(|c| match c {
            Cell::Empty => ' ',
            Cell::SnakeHead => '@',
            Cell::SnakeBody => 'o',
            Cell::Apple => '*',
        }));
        out.push_str("|\n");
    }
    out.push_str(&border);
    out
}
