//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run UI.
//! No business logic here.

use dotenv::dotenv;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use workout_sync::adapters::clock::SystemClock;
use workout_sync::adapters::friends::StoreFriendDirectory;
use workout_sync::adapters::notifications::{
    EXPO_PUSH_URL, ExpoPushDispatcher, LogDispatcher, StaticPermission,
};
use workout_sync::adapters::pedometer::{ChannelStepSource, SimulatedPedometer};
use workout_sync::adapters::persistence::{MemoryRecordStore, SqliteRecordStore};
use workout_sync::adapters::ui::tui::TuiInputPort;
use workout_sync::domain::ParticipantId;
use workout_sync::ports::{Clock, InputPort, NotificationDispatcher, RecordStore};
use workout_sync::shared::config::AppConfig;
use workout_sync::usecases::{HistoryService, SessionManager, SessionPorts};

/// Tick of the simulated pedometer.
const PEDOMETER_TICK: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (check CWD)"),
    }

    let cfg = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "config not loaded; using defaults");
        AppConfig::default()
    });
    let owner_id = ParticipantId::new(cfg.owner_id_or_default());
    info!(owner = %owner_id, "signed in");
    workout_sync::adapters::ui::init_ui(&owner_id);

    // --- Record store: SQLite when a data directory is configured ---
    let (store, export_dir): (Arc<dyn RecordStore>, PathBuf) = match cfg.data_dir.as_deref() {
        Some(dir) => {
            let data_path = PathBuf::from(dir);
            let sqlite = SqliteRecordStore::connect(&data_path)
                .await
                .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?;
            info!(path = %sqlite.path().display(), "record store: sqlite");
            (Arc::new(sqlite) as Arc<dyn RecordStore>, data_path.join("exports"))
        }
        None => {
            warn!("WORKOUT_DATA_DIR not set; records are kept in memory for this run");
            (
                Arc::new(MemoryRecordStore::new()) as Arc<dyn RecordStore>,
                cwd.join("exports"),
            )
        }
    };
    let friends = Arc::new(StoreFriendDirectory::new(Arc::clone(&store)));

    // --- Notifications ---
    let dispatcher: Arc<dyn NotificationDispatcher> = if cfg.is_push_configured() {
        let tokens: HashMap<ParticipantId, String> = cfg
            .push_tokens
            .iter()
            .map(|(id, token)| (ParticipantId::new(id.as_str()), token.clone()))
            .collect();
        info!(devices = tokens.len(), "push delivery via Expo");
        Arc::new(ExpoPushDispatcher::new(
            cfg.expo_push_url
                .clone()
                .unwrap_or_else(|| EXPO_PUSH_URL.to_string()),
            cfg.expo_access_token.clone(),
            tokens,
        ))
    } else {
        info!("no push tokens configured; notifications are logged only");
        Arc::new(LogDispatcher::new())
    };
    let permission = Arc::new(StaticPermission::new(
        cfg.notifications_authorized_or_default(),
    ));

    // --- Step source: simulated walker feeding the channel source ---
    let steps = Arc::new(if cfg.pedometer_available_or_default() {
        ChannelStepSource::new(0)
    } else {
        ChannelStepSource::unavailable()
    });
    SimulatedPedometer::new(
        Arc::clone(&steps),
        cfg.simulated_cadence_spm_or_default(),
        PEDOMETER_TICK,
    )
    .spawn();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // --- Services ---
    let manager = Arc::new(SessionManager::new(
        owner_id,
        SessionPorts {
            store: Arc::clone(&store),
            friends: friends.clone(),
            dispatcher,
            permission,
            steps,
            clock: Arc::clone(&clock),
        },
        cfg.fanout_concurrency_or_default(),
    ));
    let history = Arc::new(HistoryService::new(store, Arc::clone(&clock)));

    let tick = Duration::from_millis(cfg.tick_ms_or_default());
    let engine = Arc::clone(&manager);
    tokio::spawn(async move {
        engine.run(tick).await;
    });

    let input_port: Arc<dyn InputPort> = Arc::new(TuiInputPort::new(
        manager,
        friends,
        history,
        clock,
        export_dir,
    ));

    input_port
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
