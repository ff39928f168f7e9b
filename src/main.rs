use anyhow::Result;
use clap::Parser;
use tracing::info;

use rmpl::config::Cli;
use rmpl::scenario::Scenario;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let cli = Cli::parse();
    let scenario = Scenario::from_yaml(&cli.scenario)?;
    match scenario.run()? {
        Some(path) => {
            for (i, state) in path.iter().enumerate() {
                info!("{:4}: {:?}", i, state.values);
            }
        }
        None => std::process::exit(1),
    }
    Ok(())
}
