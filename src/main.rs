use std::path::PathBuf;

use argh::FromArgs;
use miette::{IntoDiagnostic, WrapErr};
use tracing::info;

use leetbot::{Bot, Config, bot, console};

/// IRC bot that keeps score of leet announcements
#[derive(Debug, FromArgs)]
struct Opts {
    /// path to config file
    #[argh(option, default = "PathBuf::from(\"config.toml\")")]
    config: PathBuf,
    /// don't read commands from standard input
    #[argh(switch)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let opts: Opts = argh::from_env();

    let config = Config::load(&opts.config)
        .into_diagnostic()
        .wrap_err_with(|| format!("Loading config file {}", opts.config.display()))?;

    leetbot::tracing::try_init(&config.tracing)?;

    info!(
        "{} v{} running",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let services = bot::default_services(&config.bot)?;
    let console_input = (config.bot.console && !opts.no_console).then(console::stdin_lines);

    Bot::new(config, services).run(console_input).await;

    Ok(())
}
