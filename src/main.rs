use clap::Parser;
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use sbench::{Config, Monitor, SbenchError, Scontrol, Srun};

/// Logs go to stderr so that stdout carries only the report.
fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), SbenchError> {
    let cli = Config::parse();
    init_logging(cli.debug);
    debug!("{:?}", cli);

    let directory = Scontrol::new(&cli.scontrol);
    let launcher = Srun::new(
        &cli.srun,
        cli.launch_options(),
        &cli.executable,
        cli.executable_args.clone(),
    );
    let monitor = Monitor::from_config(&cli);

    // The report is informational; bucket contents never change the exit code.
    let report = sbench::run(&cli, &directory, &launcher, &monitor).await?;
    print!("{}", report);

    Ok(())
}
