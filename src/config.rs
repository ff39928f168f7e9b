use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "rmpl",
    about = "Sampling-based motion planners for kinematic systems.",
    version = "0.1"
)]
pub struct Cli {
    #[arg(long, short, help = "Path to the YAML scenario file")]
    pub scenario: String,
}
