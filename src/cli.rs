use clap::Parser;

/// Offline caching proxy for the marketing site.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", default_value = "./config.toml")]
    pub config: String,
}
