use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;
use futures_util::future::join_all;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use remote_image::ImageUrl;
use remote_image::infrastructure::{
    AppConfig, CliArgs, ConfigStore, ImageLoader, LoadedConfig,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let default_level = LevelFilter::from_level(config.log_level.to_tracing_level());
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<LoadedConfig> {
    let store = ConfigStore::new()?;
    let mut loaded = store.load_config(args.config.as_deref())?;
    loaded.config.merge_with_args(args);
    Ok(loaded)
}

/// Fetches every URL concurrently and prints one line each. Returns the failure count.
async fn fetch_all(loader: &ImageLoader, urls: &[ImageUrl]) -> usize {
    let results = join_all(urls.iter().map(|url| loader.fetch_with_source(url))).await;

    let mut failures = 0;
    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok((image, source)) => {
                println!("{url}  {}x{}  {source}", image.width(), image.height());
            }
            Err(e) => {
                failures += 1;
                warn!(url = %url, error = %e, "Fetch failed");
                println!("{url}  error: {e}");
            }
        }
    }
    failures
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let LoadedConfig { config, source } = load_config(&args)?;
    init_logging(&config)?;

    info!(version = remote_image::VERSION, config = %source, "Starting remote-image");

    let loader = ImageLoader::from_config(config.loader.clone()).await?;
    let urls: Vec<ImageUrl> = args.urls.iter().map(|u| ImageUrl::new(u.as_str())).collect();

    let failures = fetch_all(&loader, &urls).await;

    // Second pass shows what the tiers now hold.
    fetch_all(&loader, &urls).await;
    println!("{}", loader.memory_cache_stats().await);

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
