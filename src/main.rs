use anyhow::Context;
use bitshare::constants::DEFAULT_PORT;
use bitshare::{FileStore, Metainfo, Session, SessionConfig, ShareId};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Peer-to-peer file sharing client.
#[derive(Debug, Parser)]
#[command(name = "bitshare", version, about)]
struct Args {
    /// Torrent file path, http(s) URL, or magnet URI.
    torrent: String,

    /// TCP/UDP port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory for persistent state (current marker, saved descriptors).
    #[arg(long, default_value = ".bitshare")]
    dir: PathBuf,

    /// Hex share identity; defaults to the torrent's info-hash.
    #[arg(long)]
    share: Option<String>,

    /// Directory the shared files are stored under.
    #[arg(long, default_value = ".")]
    store: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let metainfo = Metainfo::load(&args.torrent)
        .await
        .with_context(|| format!("loading torrent {:?}", args.torrent))?;
    info!(info_hash = %metainfo.info_hash, "torrent loaded");

    tokio::fs::create_dir_all(&args.dir)
        .await
        .with_context(|| format!("creating {:?}", args.dir))?;

    let store = match &metainfo.info {
        Some(info) => {
            metainfo
                .save_to_disk(&args.dir)
                .await
                .context("saving torrent descriptor")?;
            let store = FileStore::new(info, &args.store)
                .await
                .context("building file store")?;
            info!(
                name = %info.name,
                files = info.files.len(),
                bytes = store.total_size(),
                "file store ready"
            );
            Some(store)
        }
        None => {
            info!("magnet source: metadata must arrive from the swarm");
            None
        }
    };

    let share = match &args.share {
        Some(hex) => ShareId::from_hex(hex).context("parsing --share")?,
        None => ShareId::from_info_hash(metainfo.info_hash),
    };

    let mut session = Session::start(SessionConfig {
        share,
        port: args.port,
        dir: args.dir,
        trackers: metainfo.trackers(),
    })
    .await
    .context("starting control session")?;
    session.set_current(metainfo.info_hash).await;

    let mut torrents = session.take_torrents().context("torrents channel taken")?;
    loop {
        tokio::select! {
            announce = torrents.recv() => match announce {
                Some(announce) => {
                    info!(
                        info_hash = %announce.info_hash,
                        peer = %announce.peer,
                        "peer announced a newer share head"
                    );
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(%err, "signal handler failed");
                }
                break;
            }
        }
    }

    info!("shutting down");
    session.quit().await;
    drop(store);
    Ok(())
}
