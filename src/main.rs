use mq_replay::{
    admin::{start_admin_subscriptions, AdminTopics, ServiceInfo},
    catalog::key_value_source,
    config::Config,
    context::ProcessContext,
    messaging::{get_client, init_messaging_metrics},
    replay::start_local_storage,
    telemetry::init_tracing,
    AppError,
};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[{}] {}", e.error_code(), e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    init_tracing(&config.observability);

    tracing::info!("Starting mq-replay v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        if e.is_configuration() {
            tracing::error!(code = e.error_code(), error = %e, "Invalid configuration");
        } else {
            tracing::error!(code = e.error_code(), error = %e, "mq-replay failed");
        }
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    if config.observability.prometheus_enabled {
        init_messaging_metrics();
    }

    let ctx = ProcessContext::from_config(&config.service)?;
    tracing::info!(
        service = %ctx.service_name(),
        instance_id = %ctx.instance_id(),
        provider = %config.messaging.provider,
        "Process context ready"
    );
    let interrupt = ctx.spawn_interrupt_listener();

    let kv = key_value_source(&config.consul)?;
    let storage = start_local_storage(
        &config.storage.catalog_path,
        config.storage.providers,
        &config.messaging,
        kv.as_ref(),
        ctx.clone(),
        config.storage.root.clone(),
    )
    .await?;

    for state in storage.topic_states() {
        tracing::info!(
            provider = %state.provider,
            topic = %state.topic,
            state = %state.state,
            "Recording topic"
        );
    }

    // Admin subscriptions (halo, logflush)
    let admin = get_client(config.messaging.options(), ctx.clone()).await?;
    let admin_topics = AdminTopics::resolve(kv.as_ref()).await;
    start_admin_subscriptions(
        &admin,
        ctx.clone(),
        &admin_topics,
        ServiceInfo::from_config(&config.service),
    )
    .await?;

    // Wait for Ctrl-C
    let mut shutdown = ctx.shutdown_signal();
    if shutdown.wait_for(|down| *down).await.is_err() {
        tracing::warn!("Shutdown signal dropped");
    }
    interrupt.abort();

    if let Err(e) = admin.close().await {
        tracing::warn!(error = %e, "Failed to close admin client");
    }
    storage.stop().await?;
    tracing::info!("mq-replay stopped");
    Ok(())
}
