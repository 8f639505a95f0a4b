#[macro_use]
extern crate tracing;

use crate::configs::GlobalConfig;
use anyhow::{Context, Result as AnyResult};
use broker::TrustBroker;
use components::{SessionConnector, TrustPrompt};
use futures::{stream::FuturesUnordered, StreamExt};
use std::{num::NonZeroUsize, sync::Arc};
use store::{JsonFileBackend, LegacyCertificateFile, TrustStore};

mod broker;
mod certificate_interceptor;
mod components;
mod configs;
mod error;
mod store;
mod types;

fn main() -> AnyResult<()> {
    // Load environment variables from the `.env` file
    dotenvy::dotenv().ok();
    // Initialize the logger after loading the environment variables
    tracing_subscriber::fmt::init();

    let app_config = GlobalConfig::load_config().context("Failed to parse configuration files")?;

    // Setup async runtime
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(worker) = app_config.workers.and_then(NonZeroUsize::new) {
        runtime_builder.worker_threads(worker.into());
    }
    runtime_builder
        .enable_all()
        .build()
        .context("Failed to bootstrap the Tokio runtime")?
        .block_on(server_loop(app_config))
}

async fn server_loop(app_config: GlobalConfig) -> AnyResult<()> {
    let store = TrustStore::load(
        Arc::new(JsonFileBackend::new(app_config.trust_store_path())),
        Some(LegacyCertificateFile::new(
            app_config.legacy_certificate_path(),
        )),
    )
    .await;
    let (handle, events, broker_task) = TrustBroker::spawn(store);

    if app_config.clear_trusted_certificates {
        handle.clear_trusted_certificates().await?;
    }

    let listener = handle.listener();
    let roots = Arc::new(configs::load_root_store(&app_config).await?);
    let connector = Arc::new(SessionConnector::new(
        roots,
        listener.clone(),
        app_config.connect_timeout,
    ));
    let prompt_task = tokio::spawn(TrustPrompt::new(handle.clone(), events).run());

    let mut tasks = FuturesUnordered::from_iter(app_config.servers.iter().map(|server| {
        let connector = connector.clone();
        let url = server.url.clone();
        async move {
            let conn_result = connector.connect(&url).await;
            trace!("connector.connect() = {:?}", conn_result.as_ref().map(|_| ()));
            (url, conn_result)
        }
    }));

    let mut sessions = Vec::new();
    while let Some((url, conn_result)) = tasks.next().await {
        match conn_result {
            Ok(stream) => {
                info!("Session to {} established", url);
                sessions.push(stream);
            }
            Err(e) => {
                error!("Failed to open the session to {}: {}", url, e);
            }
        };
    }
    drop(tasks);

    info!(
        "{} of {} session(s) open, press Ctrl-C to quit",
        sessions.len(),
        app_config.servers.len()
    );
    tokio::signal::ctrl_c().await?;

    listener.unsubscribe();
    handle.shutdown();
    broker_task.await?;
    drop(sessions);

    // The prompt may be blocked on stdin; it has nothing left to answer.
    prompt_task.abort();
    Ok(())
}
