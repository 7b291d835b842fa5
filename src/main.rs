use axum::routing::{get, patch, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dialcode_service::{
    app_state::AppState,
    config::AppConfig,
    db, routes,
    services::{
        content::ContentClient,
        queue::JobQueue,
        registry::RegistryClient,
        renderer::RemoteImageRenderer,
        scheduler::TaskScheduler,
        storage::R2Client,
        tracker::{BatchJobTracker, PgJobStore},
        workflow::{WorkflowCoordinator, WorkflowSettings},
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing dialcode-service");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "dialcode_batch_jobs_submitted",
        "Total image batch jobs submitted"
    );
    metrics::describe_counter!(
        "dialcode_workflow_partial_success_total",
        "Workflows answered with partial success"
    );
    metrics::describe_counter!(
        "dialcode_image_tasks_total",
        "Image render tasks by outcome"
    );
    metrics::describe_histogram!(
        "dialcode_image_batch_seconds",
        "Wall time to render one image batch"
    );

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url, config.database_max_connections)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Initializing R2 storage client");
    let storage = Arc::new(
        R2Client::new(
            &config.r2_bucket,
            &config.r2_endpoint,
            &config.r2_access_key,
            &config.r2_secret_key,
        )
        .expect("Failed to initialize R2 client"),
    );

    tracing::info!("Connecting to Redis job queue");
    let queue = Arc::new(JobQueue::new(&config.redis_url).expect("Failed to initialize job queue"));

    let upstream_timeout = config.upstream_timeout();
    let registry = RegistryClient::new(&config.registry_base_url, upstream_timeout)
        .expect("Failed to initialize registry client");
    let content = ContentClient::new(&config.content_base_url, upstream_timeout)
        .expect("Failed to initialize content client");
    let renderer = RemoteImageRenderer::new(
        &config.renderer_base_url,
        upstream_timeout,
        storage,
        &config.dial_registry_url,
    )
    .expect("Failed to initialize image renderer");

    let tracker = BatchJobTracker::new(Arc::new(PgJobStore::new(db_pool.clone())), queue.clone());
    let coordinator = WorkflowCoordinator::new(
        Arc::new(registry),
        Arc::new(content),
        Arc::new(renderer),
        TaskScheduler::new(config.image_concurrency, config.image_task_timeout()),
        tracker,
        WorkflowSettings::from_config(&config),
    );

    let state = AppState::new(db_pool, queue, coordinator);

    let api = Router::new()
        .route("/generate", post(routes::dialcode::generate))
        .route("/list", post(routes::dialcode::list))
        .route("/search", post(routes::dialcode::search))
        .route("/read", post(routes::dialcode::read))
        .route("/update/{id}", patch(routes::dialcode::update))
        .route("/publish/{id}", post(routes::dialcode::publish))
        .route("/content/link", post(routes::dialcode::link))
        .route(
            "/process/status/{process_id}",
            get(routes::dialcode::process_status),
        )
        .route("/reserve/{content_id}", post(routes::dialcode::reserve))
        .route("/release/{content_id}", post(routes::dialcode::release))
        .route("/publisher/create", post(routes::dialcode::create_publisher))
        .route("/publisher/read/{id}", get(routes::dialcode::read_publisher))
        .route(
            "/publisher/update/{id}",
            patch(routes::dialcode::update_publisher),
        );

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/dialcode/v3", api)
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024)); // 2 MB limit

    tracing::info!(
        request_timeout_secs = config.request_timeout().as_secs(),
        "Starting dialcode-service on {}",
        config.bind_addr
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
