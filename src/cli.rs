use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "lgw", version, about = "LLM API gateway")]
pub struct Args {
    /// Listen host (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level filter when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}
