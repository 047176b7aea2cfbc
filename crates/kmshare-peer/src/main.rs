//! KM-Share peer entry point.
//!
//! Headless binary wiring the services together:
//!
//! ```text
//! main()
//!  └─ load settings (TOML, CLI overrides)
//!  └─ DiscoveryService      -- UDP listener + 1 Hz announcer threads
//!  └─ Peer
//!       ├─ SessionTransport -- TCP listener + dialer threads
//!       ├─ SessionEngine    -- control-token state machine
//!       └─ capture pump     -- rdev events into the engine
//!  └─ block on Ctrl-C, then stop everything
//! ```
//!
//! A GUI shell embeds [`kmshare_peer::application::peer::Peer`] directly and
//! supplies its own [`PeerEventSink`]; this binary logs the callbacks
//! instead.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kmshare_core::Beacon;
use kmshare_peer::application::peer::Peer;
use kmshare_peer::application::session::PeerEventSink;
use kmshare_peer::infrastructure::input::native::{EnigoInjector, RdevInputSource};
use kmshare_peer::infrastructure::input::{InputInjector, InputSource};
use kmshare_peer::infrastructure::network::discovery::DiscoveryService;
use kmshare_peer::infrastructure::storage::config;

#[derive(Debug, Parser)]
#[command(name = "kmshare", about = "Share one keyboard and mouse between two hosts")]
struct Cli {
    /// Path to a config file (defaults to the platform config location).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the remote peer's IP address for this run.
    #[arg(long)]
    remote_ip: Option<String>,

    /// Disable presence broadcasts (still listens for peers).
    #[arg(long)]
    no_announce: bool,
}

/// Logs session callbacks; a GUI adapter would post these to its UI thread.
struct LogSink;

impl PeerEventSink for LogSink {
    fn connection_changed(&self, connected: bool) {
        if connected {
            info!("peer connected");
        } else {
            info!("peer disconnected");
        }
    }

    fn control_changed(&self, has_control: bool) {
        if has_control {
            info!("this side now has control");
        } else {
            info!("control handed to peer");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging; level overridden by RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => config::load_settings_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => config::load_settings().context("loading config")?,
    };
    if let Some(remote_ip) = cli.remote_ip {
        settings.remote.ip = remote_ip;
    }

    info!(
        name = %settings.local.name,
        screen = %format!("{}x{}", settings.local.screen_width, settings.local.screen_height),
        "KM-Share starting"
    );

    // ── Discovery ─────────────────────────────────────────────────────────────
    let discovery = DiscoveryService::new(settings.network.discovery_port);
    if settings.network.discovery_enabled {
        discovery.add_callback(Arc::new(|ip, peer| {
            info!(%ip, name = %peer.name, os = %peer.os,
                screen = %format!("{}x{}", peer.screen_width, peer.screen_height),
                "discovered peer");
        }));
        if let Err(e) = discovery.start_listening() {
            warn!("discovery unavailable: {e}");
        } else if !cli.no_announce {
            let beacon = Beacon::new(
                settings.local.name.clone(),
                settings.local.os.clone(),
                settings.local.screen_width,
                settings.local.screen_height,
            );
            if let Err(e) = discovery.start_announcing(beacon) {
                warn!("presence announcer unavailable: {e}");
            }
        }
    }

    // ── Peer session ──────────────────────────────────────────────────────────
    let session_settings = settings
        .session_settings()
        .context("settings cannot start a session")?;
    if session_settings.remote_addr.is_none() {
        info!("no remote.ip configured; waiting for an inbound connection");
    }

    let injector: Arc<dyn InputInjector> = Arc::new(
        EnigoInjector::new(session_settings.local_geometry)
            .context("initialising the input injection backend")?,
    );
    let source: Arc<dyn InputSource> = Arc::new(RdevInputSource::new());
    let sink: Arc<dyn PeerEventSink> = Arc::new(LogSink);

    let peer = Peer::new(session_settings, source, injector, sink);
    peer.start().context("starting the peer session")?;

    info!("ready; press Ctrl-C to exit");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutdown signal received");

    peer.stop();
    discovery.stop();
    Ok(())
}
