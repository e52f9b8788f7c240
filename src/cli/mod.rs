//! CLI mode for offline-proxy.

mod args;
mod report;

use std::sync::Arc;

pub use args::{Cli, Command, ServeArgs, UpstreamArgs};

use crate::{
    AppConfig, CacheStorage, DiskCacheStorage, HttpNetwork, MemoryCacheStorage, OfflineProxy,
    Result,
};

/// Applies command-line overrides on top of the loaded configuration.
fn apply_upstream(config: &mut AppConfig, args: &UpstreamArgs) {
    if let Some(ref origin) = args.upstream {
        config.upstream.origin.clone_from(origin);
    }
}

/// Runs the parsed command line.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, the cache directory
/// cannot be opened, or the selected command fails.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => {
            apply_upstream(&mut config, &args.upstream);
            if let Some(host) = args.host {
                config.server.host = host;
            }
            if let Some(port) = args.port {
                config.server.port = port;
            }
            serve(config, args.no_persist).await
        }
        Command::Install(args) => {
            apply_upstream(&mut config, &args);
            install(config).await
        }
        Command::Caches => caches(config).await,
    }
}

async fn serve(config: AppConfig, no_persist: bool) -> Result<()> {
    let network = HttpNetwork::new(&config.upstream.origin)?;
    log::info!(
        "Proxying {} with cache {}",
        network.origin(),
        config.cache.version
    );

    if no_persist {
        let proxy = OfflineProxy::new(config.cache, MemoryCacheStorage::new(), network);
        crate::server::serve(Arc::new(proxy), &config.server.host, config.server.port).await
    } else {
        let storage = DiskCacheStorage::open_dir(&config.cache.dir).await?;
        let proxy = OfflineProxy::new(config.cache, storage, network);
        crate::server::serve(Arc::new(proxy), &config.server.host, config.server.port).await
    }
}

async fn install(config: AppConfig) -> Result<()> {
    let network = HttpNetwork::new(&config.upstream.origin)?;
    let storage = DiskCacheStorage::open_dir(&config.cache.dir).await?;
    let proxy = OfflineProxy::new(config.cache, storage, network);

    let installed = proxy.install().await?;
    let deleted = proxy.activate().await?;
    report::print_install(&installed, &deleted);
    Ok(())
}

async fn caches(config: AppConfig) -> Result<()> {
    let storage = DiskCacheStorage::open_dir(&config.cache.dir).await?;
    let mut listing = Vec::new();
    for name in storage.keys().await? {
        let entries = storage.entries(&name).await?.len();
        listing.push((name, entries));
    }
    println!("Cache directory: {}", storage.dir().display());
    report::print_caches(&config.cache.version, &listing);
    Ok(())
}
