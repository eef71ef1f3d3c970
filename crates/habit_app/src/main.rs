use clap::Parser;
use habit_app::app::{run, AppConfig, Cli};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    let config = AppConfig::from_env().unwrap_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_filter()))
        .with_writer(std::io::stderr)
        .init();
    config.report_ignored();
    if let Err(err) = run(config, cli.command) {
        eprintln!("habitmate: {err:#}");
        std::process::exit(1);
    }
}
