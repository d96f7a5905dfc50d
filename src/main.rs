use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use lesson_tally::menu::MenuBar;
use lesson_tally::source::HttpDataSource;
use lesson_tally::{
    Collaborators, CoordinatorConfig, DataSource, FrameId, InitializationCoordinator,
    LifecycleEvent, LocalEventBus, Page, SqliteSettingsStore, StaticDataSource,
};
use tokio::task::LocalSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // A subscriber installed by an embedding host wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let mut args = std::env::args().skip(1);
    let Some(dashboard_path) = args.next().map(PathBuf::from) else {
        bail!("usage: lesson-tally <dashboard.html> [summary.json]");
    };
    let summary_path = args.next().map(PathBuf::from);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    let local = LocalSet::new();
    let html = local.block_on(&rt, run(dashboard_path, summary_path))?;
    println!("{html}");
    Ok(())
}

async fn run(dashboard_path: PathBuf, summary_path: Option<PathBuf>) -> Result<String> {
    let config_path = std::env::var("LESSON_TALLY_CONFIG").ok().map(PathBuf::from);
    let config = CoordinatorConfig::load(config_path).unwrap_or_else(|err| {
        warn!(target = "main", error = %err, "failed to load configuration, using defaults");
        CoordinatorConfig::default()
    });

    let markup = std::fs::read_to_string(&dashboard_path)
        .with_context(|| format!("failed to read {}", dashboard_path.display()))?;
    let page = Page::parse(&markup);

    let source: Rc<dyn DataSource> = match (std::env::var("WANIKANI_API_TOKEN").ok(), summary_path)
    {
        (Some(token), _) => Rc::new(HttpDataSource::new(token)?),
        (None, Some(path)) => Rc::new(
            StaticDataSource::from_file(&path)
                .with_context(|| format!("failed to load summary from {}", path.display()))?,
        ),
        (None, None) => bail!("set WANIKANI_API_TOKEN or pass a summary JSON file"),
    };
    let store = Rc::new(SqliteSettingsStore::new().context("failed to open settings store")?);
    let menu = Rc::new(MenuBar::new());

    let coordinator = InitializationCoordinator::new(
        config,
        page.clone(),
        Collaborators {
            source,
            store,
            menu: menu.clone(),
            dialog: None,
        },
    );

    let bus = LocalEventBus::new();
    coordinator.register(&bus);

    let page_url = coordinator.config().locations.first().cloned();
    for event in [
        LifecycleEvent::navigate_load(),
        LifecycleEvent::frame_load(FrameId::TODAYS_LESSONS),
    ] {
        let event = match &page_url {
            Some(url) => event.with_url(url.clone()),
            None => event,
        };
        bus.dispatch(event);
        // Let the spawned handlers run to their next suspension before the
        // following event lands.
        tokio::task::yield_now().await;
    }

    settle(&coordinator).await;
    info!(
        target = "main",
        mutations = coordinator.mutation_count(),
        menu_links = menu.links().len(),
        "dashboard processed"
    );
    if let Some(log) = coordinator.flush_debug_log() {
        eprintln!("{log}");
    }
    Ok(page.to_html())
}

/// Wait until the coordinator has either finished a window or given up.
async fn settle(coordinator: &InitializationCoordinator) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(15);
    while tokio::time::Instant::now() < deadline {
        let state = coordinator.state();
        if !state.starting && !state.event_stream_busy {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    warn!(target = "main", "coordinator did not settle before the deadline");
}

