use anyhow::Context;
use bites::{config::Config, state::Backend};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Listen port, overrides PORT
    #[arg(long)]
    port: Option<u16>,

    /// Redis URL, overrides REDIS_URL
    #[arg(long)]
    redis_url: Option<String>,

    /// Keep everything in process instead of Redis
    #[arg(long)]
    memory: bool,

    /// Recompute the average when a review is deleted, overrides RECOMPUTE_ON_DELETE
    #[arg(long)]
    recompute_on_delete: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let mut config = Config::load().context("Environment misconfigured!")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(redis_url) = args.redis_url {
        config.redis_url = redis_url;
    }
    config.recompute_on_delete |= args.recompute_on_delete;

    let backend = if args.memory {
        Backend::Memory
    } else {
        Backend::Redis
    };

    bites::start_server(config, backend)
        .await
        .context("Server stopped with an error")
}
