use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use redraft::config::{DEFAULT_DRAFTER_URL, DEFAULT_REVIEWER_URL, DEFAULT_TASK};
use redraft::{Config, run};
use tokio::io::stdout;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "redraft", version)]
struct Cli {
    /// Drafter chat-completion endpoint
    #[arg(long, default_value = DEFAULT_DRAFTER_URL)]
    drafter_url: String,

    /// Reviewer completion endpoint
    #[arg(long, default_value = DEFAULT_REVIEWER_URL)]
    reviewer_url: String,

    /// Whole-request timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    /// Task prompt handed to the drafter
    #[arg(long, default_value = DEFAULT_TASK)]
    task: String,

    /// Drafter token budget
    #[arg(long, default_value_t = 1000)]
    max_tokens: u32,

    /// Drafter sampling temperature
    #[arg(long, default_value_t = 0.1)]
    drafter_temperature: f32,

    /// Reviewer token budget
    #[arg(long, default_value_t = 500)]
    n_predict: u32,

    /// Reviewer sampling temperature
    #[arg(long, default_value_t = 0.0)]
    reviewer_temperature: f32,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = Config {
        drafter_url: cli.drafter_url,
        reviewer_url: cli.reviewer_url,
        timeout: Duration::from_secs(cli.timeout),
        task: cli.task,
        drafter_max_tokens: cli.max_tokens,
        drafter_temperature: cli.drafter_temperature,
        reviewer_n_predict: cli.n_predict,
        reviewer_temperature: cli.reviewer_temperature,
    };

    let mut out = stdout();
    let outcome = run(&cfg, &mut out).await?;
    Ok(ExitCode::from(outcome.exit_code()))
}
