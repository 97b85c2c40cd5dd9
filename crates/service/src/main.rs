mod config;
mod supervisor;

use anyhow::Result;
use clap::Parser;
use config::Config;
use feedgrep_datastore::PostgresDatastore;
use feedgrep_egress_pool::EgressPool;
use feedgrep_notifier::{Notifier, SmtpMailer};
use feedgrep_sources::{ArcticShiftPoller, RedditPoller, SubscriptionCache};
use std::sync::Arc;
use std::time::Duration;
use supervisor::Supervisor;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SUBSCRIPTION_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.tracing_level().to_string())
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        post_poll_interval_ms = config.post_poll_interval_ms,
        comment_poll_interval_ms = config.comment_poll_interval_ms,
        reddit_polling = config.enable_reddit_polling,
        arcticshift_polling = config.enable_arcticshift_polling,
        "starting feedgrep"
    );

    let datastore = Arc::new(PostgresDatastore::connect(&config.postgres_url).await?);
    datastore.run_migrations().await?;

    let subscriptions = Arc::new(SubscriptionCache::new(datastore.clone()));
    subscriptions.refresh().await;

    let mailer = Arc::new(SmtpMailer::new(
        &config.smtp_host,
        config.smtp_port,
        &config.smtp_from,
        &config.smtp_password,
        &config.app_base_url,
    )?);

    let mut supervisor = Supervisor::new();

    supervisor.spawn(
        "subscription-refresher",
        subscriptions
            .clone()
            .run(SUBSCRIPTION_REFRESH_INTERVAL, supervisor.shutdown_signal()),
    );

    if config.enable_reddit_polling {
        let mut proxy_urls = config.proxy_url_list();
        if proxy_urls.is_empty() {
            // Direct-only egress when no proxies are configured.
            proxy_urls.push(String::new());
        }
        let egress = Arc::new(EgressPool::new(&proxy_urls)?);

        let poller = Arc::new(RedditPoller::new(
            egress,
            datastore.clone(),
            subscriptions.clone(),
            Duration::from_millis(config.post_poll_interval_ms),
            Duration::from_millis(config.comment_poll_interval_ms),
        ));
        supervisor.spawn("reddit-poller", poller.run(supervisor.shutdown_signal()));
    }

    if config.enable_arcticshift_polling {
        let poller = ArcticShiftPoller::new(
            datastore.clone(),
            subscriptions.clone(),
            Duration::from_millis(config.post_poll_interval_ms),
        )?;
        supervisor.spawn(
            "arcticshift-poller",
            poller.run(supervisor.shutdown_signal()),
        );
    }

    let notifier = Notifier::new(datastore.clone(), datastore.clone(), mailer);
    supervisor.spawn("notifier", notifier.run(supervisor.shutdown_signal()));

    wait_for_shutdown().await?;
    info!("shutting down");
    supervisor.shutdown();
    supervisor.wait().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }

    Ok(())
}
