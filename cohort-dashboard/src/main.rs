//! Cohort dashboard entry point.

use cohort_cache::{CacheConfig, CoalescingLoader};
use cohort_core::RouteRequirement;
use cohort_dashboard::realtime::RealtimeEvent;
use cohort_dashboard::{
    init_tracing, spawn_ws_feed, ContextResolver, DashboardConfig, DashboardData, DashboardError,
    GuardDecision, Navigator, PageController, PageOutcome, PageServices, RealtimeHub,
    RedirectMarker, RestClient, RouteGuard, RouteTable, SessionCheck, Surface, TerminalSurface,
    Visit, WsFeed,
};
use cohort_session::{CredentialStore, FileCredentialStore, SessionStore};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{info, warn};

const MAX_REDIRECTS: usize = 3;

#[derive(Debug, Default)]
struct CliArgs {
    page: Option<String>,
    watch: bool,
}

fn parse_args() -> CliArgs {
    let mut parsed = CliArgs::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--page" => parsed.page = args.next(),
            "--watch" => parsed.watch = true,
            "--config" => {
                args.next();
            }
            _ => {}
        }
    }
    parsed
}

/// Records where the terminal "is" and the last redirect requested.
#[derive(Debug, Default)]
struct TerminalNavigator {
    current: Mutex<String>,
    pending: Mutex<Option<String>>,
}

impl TerminalNavigator {
    fn visit(&self, path: &str) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = path.to_string();
    }

    fn take_pending(&self) -> Option<String> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}

impl Navigator for TerminalNavigator {
    fn current_path(&self) -> String {
        self.current.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn redirect(&self, target: &str) {
        *self.pending.lock().unwrap_or_else(|p| p.into_inner()) = Some(target.to_string());
    }
}

#[tokio::main]
async fn main() -> Result<(), DashboardError> {
    let args = parse_args();
    let config = DashboardConfig::load()?;
    init_tracing(config.telemetry.format)?;
    let orchestration = config.orchestration();

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(config.credentials_path.clone()));
    let client = Arc::new(RestClient::new(&config, credentials.clone())?);
    let session = Arc::new(SessionStore::new(client.clone(), credentials.clone()));
    let loader = CoalescingLoader::new(CacheConfig::new().with_ttl(orchestration.cache_ttl()));
    let data = DashboardData::new(loader, client);
    let resolver = Arc::new(ContextResolver::new(
        session.clone(),
        data.clone(),
        orchestration.context_wait,
    ));
    let navigator = Arc::new(TerminalNavigator::default());
    let surface: Arc<dyn Surface> = Arc::new(TerminalSurface::stdout());
    let realtime = RealtimeHub::default();

    let services = PageServices {
        session: session.clone(),
        resolver: resolver.clone(),
        data,
        navigator: navigator.clone(),
        surface: surface.clone(),
        realtime: realtime.clone(),
        dependency_wait: orchestration.dependency_wait,
    };
    let guard = RouteGuard::new(
        session.clone(),
        navigator.clone(),
        Arc::new(RedirectMarker::new()),
        orchestration.login_path.clone(),
        orchestration.unauthorized_path.clone(),
    );

    let identity = session.bootstrap().await;
    resolver.initialize().await;

    let mut path = args.page.unwrap_or_else(|| match &identity {
        Some(identity) => identity.role.home_path().to_string(),
        None => orchestration.login_path.clone(),
    });
    let table = RouteTable::standard();
    let mut active: Option<(String, PageController)> = None;

    for _ in 0..=MAX_REDIRECTS {
        navigator.visit(&path);
        match table.open(&path, &guard, &services).await {
            Some(Visit::Opened {
                mut controller,
                outcome,
            }) => {
                if matches!(outcome, PageOutcome::Redirected { .. }) {
                    controller.destroy();
                } else {
                    active = Some((path.clone(), controller));
                }
            }
            Some(Visit::Denied(decision)) => {
                info!(path = %path, ?decision, "navigation denied");
            }
            None if path == orchestration.login_path => {
                surface.show_login_prompt("login");
            }
            None if path == orchestration.unauthorized_path => {
                warn!(path = %path, "signed-in role may not open the requested page");
            }
            None => return Err(DashboardError::UnknownRoute { path }),
        }

        match navigator.take_pending() {
            Some(next) => path = next,
            None => break,
        }
    }

    let Some((active_path, mut controller)) = active else {
        return Ok(());
    };
    let requirement = table
        .resolve(&active_path)
        .map(|route| route.requirement.clone())
        .unwrap_or_else(RouteRequirement::authenticated);

    if args.watch && controller.outcome().is_some_and(PageOutcome::is_ready) {
        let bearer_token = credentials
            .load()
            .ok()
            .flatten()
            .map(|stored| stored.access_token);
        let feed = spawn_ws_feed(
            WsFeed {
                endpoint: config.ws_endpoint.clone(),
                bearer_token,
                reconnect: config.reconnect.clone(),
            },
            realtime.clone(),
        );
        let mut events = realtime.receiver();
        let mut session_changes = guard.watch(requirement);
        info!("watching for realtime updates, Ctrl-C to exit");

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    break;
                }
                decision = session_changes.next() => {
                    let ended = controller.revalidate() == SessionCheck::Ended;
                    match decision {
                        Some(GuardDecision::Allowed) if !ended => {}
                        other => {
                            info!(decision = ?other, "session no longer admits this page");
                            break;
                        }
                    }
                }
                event = events.recv() => match event {
                    Ok(event) if event.community_id().is_some() => {
                        if let Err(err) = controller.refresh().await {
                            warn!(error = %err, "refresh after realtime event failed");
                        }
                    }
                    Ok(RealtimeEvent::FeedDisconnected { reason }) => {
                        warn!(%reason, "realtime feed dropped, reconnecting");
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "realtime events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        feed.abort();
    }

    controller.destroy();
    Ok(())
}
