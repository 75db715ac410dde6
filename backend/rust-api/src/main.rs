use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use sabuho_api::{config::Config, create_router, services::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let telemetry = init_telemetry();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sabuho_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_opentelemetry::layer())
        .init();

    if let Err(e) = &telemetry {
        tracing::warn!("OpenTelemetry disabled: {:#}", e);
    }

    tracing::info!("Starting Sabuho quiz API");

    let config = Config::load()?;
    tracing::info!(
        "Configuration loaded: environment={}, attempt_backend={}, local_store={:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string()),
        config.attempt_backend.as_str(),
        config.local_store
    );

    let bind_addr = config.bind_addr.clone();
    let app_state = Arc::new(AppState::new(config).await?);
    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    if let Ok(provider) = telemetry {
        if let Err(e) = provider.shutdown() {
            tracing::warn!("OpenTelemetry shutdown failed: {}", e);
        }
    }

    Ok(())
}

fn init_telemetry() -> anyhow::Result<opentelemetry_sdk::trace::SdkTracerProvider> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;

    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4318".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp_endpoint)
        .build()?;

    let resource = Resource::builder_empty()
        .with_service_name("sabuho-api")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(provider)
}
