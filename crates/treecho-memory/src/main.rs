//! Treecho Service Binary
//!
//! Interaction tree and sequence pattern memory for action agents

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use treecho_memory::{
    config::TreechoConfig, infra::session_store::FileSessionStore, EchoService, TREECHO_VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Treecho Service v{}", TREECHO_VERSION);

    // Load configuration
    let config = TreechoConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let store = FileSessionStore::new(config.storage.data_dir.clone());
    let service = Arc::new(EchoService::new(Arc::new(store), config.session_settings()));

    info!(
        "Echo config: enabled={}, threshold={}, max_tree_depth={}",
        config.echo.enabled, config.echo.threshold, config.echo.max_tree_depth
    );
    info!(
        "Storage config: data_dir={}, autosave_every={}",
        config.storage.data_dir.display(),
        config.storage.autosave_every
    );

    // Parse address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    let app = rest::create_rest_api(service.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("REST API server started on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    let saved = service.save_all().await;
    info!("Saved {} sessions", saved);
    info!("Shutting down Treecho service");
    Ok(())
}

mod rest {
    use std::sync::Arc;

    use axum::{
        extract::{Path, State},
        http::{header, Method, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{delete, get, post, put},
        Router,
    };
    use serde::Deserialize;
    use serde_json::json;
    use tower_http::cors::{Any, CorsLayer};
    use uuid::Uuid;

    use treecho_common::{ActionItem, TreechoError};
    use treecho_memory::{ActionKey, EchoService, TREECHO_VERSION};

    type Svc = State<Arc<EchoService>>;

    /// Error body for REST responses
    struct ApiError(StatusCode, String);

    impl From<TreechoError> for ApiError {
        fn from(e: TreechoError) -> Self {
            let status = match e {
                TreechoError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                TreechoError::Config(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            ApiError(status, e.to_string())
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            (self.0, Json(json!({"error": self.1}))).into_response()
        }
    }

    fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
        Uuid::parse_str(raw)
            .map_err(|_| ApiError(StatusCode::BAD_REQUEST, "Invalid session_id".to_string()))
    }

    #[derive(Deserialize, Default)]
    struct OpenRequest {
        session_id: Option<Uuid>,
    }

    #[derive(Deserialize)]
    struct TurnRequest {
        user_input: String,
    }

    #[derive(Deserialize)]
    struct ActionRequest {
        item: ActionItem,
        success: bool,
    }

    #[derive(Deserialize)]
    struct PredictRequest {
        sequence: Vec<ActionKey>,
    }

    #[derive(Deserialize)]
    struct EchoRequest {
        enabled: Option<bool>,
        threshold: Option<f64>,
    }

    /// Create REST API routes for the Treecho service
    pub fn create_rest_api(service: Arc<EchoService>) -> Router {
        // CORS layer to allow frontend connections from any origin
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

        Router::new()
            // Health check
            .route("/health", get(|| async { Json(json!({"status": "healthy"})) }))
            // Version info
            .route(
                "/api/v1/version",
                get(|| async {
                    Json(json!({
                        "service": "treecho-memory",
                        "version": TREECHO_VERSION,
                        "description": "Interaction tree and sequence pattern memory for action agents",
                    }))
                }),
            )
            .route("/api/v1/sessions", post(open_session))
            .route("/api/v1/sessions/:id", delete(close_session))
            .route("/api/v1/sessions/:id/summary", get(summary))
            .route("/api/v1/sessions/:id/turns", post(begin_turn))
            .route("/api/v1/sessions/:id/turns/end", post(end_turn))
            .route("/api/v1/sessions/:id/actions", post(record_action))
            .route("/api/v1/sessions/:id/predict", post(predict))
            .route("/api/v1/sessions/:id/echo", put(configure_echo))
            .route("/api/v1/sessions/:id/save", post(save))
            .with_state(service)
            // Apply CORS middleware
            .layer(cors)
    }

    async fn open_session(
        State(svc): Svc,
        body: Option<Json<OpenRequest>>,
    ) -> Result<impl IntoResponse, ApiError> {
        let request = body.map(|Json(r)| r).unwrap_or_default();
        let id = svc.open_session(request.session_id).await;
        let summary = svc.summary(&id)?;
        Ok((StatusCode::CREATED, Json(summary)))
    }

    async fn summary(State(svc): Svc, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
        let id = parse_id(&id)?;
        let summary = svc.summary(&id)?;
        Ok(Json(json!({
            "summary": summary,
            "text": summary.to_string(),
        })))
    }

    async fn begin_turn(
        State(svc): Svc,
        Path(id): Path<String>,
        Json(request): Json<TurnRequest>,
    ) -> Result<impl IntoResponse, ApiError> {
        let id = parse_id(&id)?;
        let path = svc.begin_turn(&id, &request.user_input)?;
        Ok(Json(json!({"current_path": path})))
    }

    async fn end_turn(State(svc): Svc, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
        let id = parse_id(&id)?;
        let report = svc.end_turn(&id).await?;
        Ok(Json(report))
    }

    async fn record_action(
        State(svc): Svc,
        Path(id): Path<String>,
        Json(request): Json<ActionRequest>,
    ) -> Result<impl IntoResponse, ApiError> {
        let id = parse_id(&id)?;
        let recorded = svc.record_action(&id, &request.item, request.success)?;
        Ok(Json(recorded))
    }

    async fn predict(
        State(svc): Svc,
        Path(id): Path<String>,
        Json(request): Json<PredictRequest>,
    ) -> Result<impl IntoResponse, ApiError> {
        let id = parse_id(&id)?;
        let probability = svc.predict(&id, &request.sequence)?;
        Ok(Json(json!({
            "sequence": request.sequence,
            "probability": probability,
        })))
    }

    async fn configure_echo(
        State(svc): Svc,
        Path(id): Path<String>,
        Json(request): Json<EchoRequest>,
    ) -> Result<impl IntoResponse, ApiError> {
        let id = parse_id(&id)?;
        let summary = svc.configure_echo(&id, request.enabled, request.threshold)?;
        Ok(Json(summary))
    }

    async fn save(State(svc): Svc, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
        let id = parse_id(&id)?;
        svc.save(&id).await?;
        Ok(Json(json!({"saved": id})))
    }

    async fn close_session(State(svc): Svc, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
        let id = parse_id(&id)?;
        svc.close_session(&id).await?;
        Ok(StatusCode::NO_CONTENT)
    }
}
