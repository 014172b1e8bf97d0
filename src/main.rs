use clap::Parser;
use fraudlens::cli::Args;
use fraudlens::config::Config;
use fraudlens::context::SyncContext;
use fraudlens::logging::setup_logging;
use fraudlens::session::{SessionFeed, SessionState};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::load()?;
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        api = %config.api_base_url,
        push = %config.websocket_url,
        "starting fraudlens"
    );

    // The demo stands in for the host application's session provisioning:
    // a token in the environment means an authenticated session.
    let (session, session_rx) = SessionFeed::new();
    match std::env::var("ACCESS_TOKEN") {
        Ok(token) if !token.is_empty() => {
            info!("session resolved with credential");
            session.set(SessionState::resolved(Some(token)));
        }
        _ => {
            info!("no credential, gated feeds stay idle");
            session.set(SessionState::absent());
        }
    }

    let ctx = SyncContext::new(&config, session_rx)?;
    let mut analytics = ctx.watch_analytics();
    let mut alerts = args.alerts.then(|| ctx.watch_alerts());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            _ = analytics.changed() => {
                let state = analytics.state();
                if let Some(snapshot) = &state.value {
                    info!(
                        total_transactions = snapshot.total_transactions,
                        total_alerts = snapshot.total_alerts,
                        high_risk = snapshot.high_risk_alerts,
                        "analytics updated"
                    );
                }
                if let Some(error) = &state.error {
                    warn!(error = %error, stale = state.value.is_some(), "analytics fetch failed");
                }
            }
            _ = wait_alerts(&mut alerts) => {
                if let Some(feed) = &alerts
                    && let Some(list) = feed.state().value
                {
                    info!(alerts = list.len(), "alert list updated");
                }
            }
        }
    }

    Ok(())
}

/// Await the alerts feed when enabled; park forever otherwise.
async fn wait_alerts(
    alerts: &mut Option<fraudlens::context::FeedHandle<Vec<fraudlens::model::FraudAlert>>>,
) {
    match alerts {
        Some(feed) => feed.changed().await,
        None => std::future::pending().await,
    }
}
