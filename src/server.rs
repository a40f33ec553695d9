use std::{convert::Infallible, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    controller::SessionController,
    error::EngineError,
    inputs,
    types::{ProbeInput, ProbeKind, SessionId, TargetDescriptor},
};

#[derive(Clone)]
pub struct AppState {
    controller: Arc<SessionController>,
}

impl AppState {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self { controller }
    }
}

/// Module-specific input list; omitted means the configured defaults.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RequestInputs {
    Ports(Vec<u16>),
    Paths(Vec<String>),
    Credentials {
        usernames: Vec<String>,
        passwords: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub module: ProbeKind,
    pub target: String,
    #[serde(default)]
    pub inputs: Option<RequestInputs>,
}

#[derive(Debug, Serialize)]
pub struct Started {
    pub id: SessionId,
}

/// Engine errors rendered as HTTP status + message.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::UnknownSession(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict { .. } | EngineError::InvalidState { .. } => StatusCode::CONFLICT,
        };
        (status, self.0.to_string()).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/scan", post(post_scan))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(get_snapshot))
        .route("/sessions/{id}/summary", get(get_summary))
        .route("/sessions/{id}/progress", get(get_progress))
        .route("/sessions/{id}/cancel", post(post_cancel))
        .route("/sessions/{id}/events", get(get_events))
        .with_state(state);

    Router::new().nest("/api", api).layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, controller: Arc<SessionController>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("serving control API on http://{bind}/api");
    serve(listener, controller).await
}

/// Serve until the controller is shut down, then drain open connections.
pub async fn serve(listener: tokio::net::TcpListener, controller: Arc<SessionController>) -> Result<()> {
    let stopped = controller.clone();
    axum::serve(listener, router(AppState::new(controller)))
        .with_graceful_shutdown(async move { stopped.stopped().await })
        .await?;
    info!("control API stopped");
    Ok(())
}

/// Resolve the request's inputs for `module`, falling back to config defaults.
fn resolve_inputs(
    controller: &SessionController,
    module: ProbeKind,
    given: Option<RequestInputs>,
) -> Result<Vec<ProbeInput>, EngineError> {
    let Some(given) = given else {
        return Ok(controller.config().default_inputs(module));
    };
    match (module, given) {
        // `[]` parses as the first untagged variant; let the session reject it as empty.
        (_, RequestInputs::Ports(ports)) if ports.is_empty() => Ok(Vec::new()),
        (ProbeKind::Port | ProbeKind::Banner, RequestInputs::Ports(ports)) => {
            let ports = inputs::dedup_ports(&ports)
                .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
            Ok(inputs::port_inputs(&ports))
        }
        (ProbeKind::Directory, RequestInputs::Paths(paths)) => {
            Ok(inputs::path_inputs(&inputs::non_blank(paths)))
        }
        (ProbeKind::Credential, RequestInputs::Credentials { usernames, passwords }) => Ok(
            inputs::credential_inputs(&inputs::non_blank(usernames), &inputs::non_blank(passwords)),
        ),
        (module, _) => Err(EngineError::InvalidInput(format!(
            "inputs do not match the {module} module"
        ))),
    }
}

async fn post_scan(
    State(app): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let inputs = resolve_inputs(&app.controller, req.module, req.inputs)?;
    let strategy = app.controller.config().strategy(req.module);
    let id = app
        .controller
        .start_scan(TargetDescriptor::new(req.target), inputs, strategy)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(Started { id })))
}

async fn list_sessions(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.controller.list().await)
}

async fn get_snapshot(
    State(app): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(app.controller.get_snapshot(id).await?))
}

async fn get_summary(
    State(app): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(app.controller.get_summary(id).await?))
}

async fn get_progress(
    State(app): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(app.controller.progress(id).await?))
}

async fn post_cancel(
    State(app): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    app.controller.cancel(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_events(
    State(app): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = app.controller.subscribe(id).await?;
    let events = entries.map(|entry| {
        let event = Event::default()
            .event(entry.severity.as_str())
            .id(entry.sequence.to_string());
        Ok::<_, Infallible>(event.json_data(&entry).unwrap_or_else(|_| Event::default().data(entry.text.clone())))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn request_inputs_shapes() {
        let req: ScanRequest =
            serde_json::from_str(r#"{"module":"banner","target":"10.0.0.1","inputs":[22,80]}"#).unwrap();
        assert!(matches!(req.inputs, Some(RequestInputs::Ports(ref p)) if p == &vec![22, 80]));

        let req: ScanRequest = serde_json::from_str(
            r#"{"module":"credential","target":"http://t","inputs":{"usernames":["a"],"passwords":["b","c"]}}"#,
        )
        .unwrap();
        let ctl = SessionController::new(EngineConfig::default());
        let inputs = resolve_inputs(&ctl, req.module, req.inputs).unwrap();
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn mismatched_inputs_rejected() {
        let ctl = SessionController::new(EngineConfig::default());
        let err = resolve_inputs(&ctl, ProbeKind::Directory, Some(RequestInputs::Ports(vec![80])));
        assert!(matches!(err, Err(EngineError::InvalidInput(_))));
        let defaults = resolve_inputs(&ctl, ProbeKind::Directory, None).unwrap();
        assert_eq!(defaults.len(), 19);
    }

    #[test]
    fn posted_ports_are_checked_and_deduplicated() {
        let ctl = SessionController::new(EngineConfig::default());
        let err = resolve_inputs(&ctl, ProbeKind::Port, Some(RequestInputs::Ports(vec![0, 0])));
        assert!(matches!(err, Err(EngineError::InvalidInput(_))));

        let inputs = resolve_inputs(&ctl, ProbeKind::Banner, Some(RequestInputs::Ports(vec![80, 22, 80])));
        assert_eq!(inputs.unwrap(), vec![ProbeInput::port(80), ProbeInput::port(22)]);
    }

    #[test]
    fn posted_blank_words_are_dropped() {
        let ctl = SessionController::new(EngineConfig::default());
        let paths = RequestInputs::Paths(vec!["admin".into(), "  ".into(), " login ".into()]);
        let inputs = resolve_inputs(&ctl, ProbeKind::Directory, Some(paths)).unwrap();
        assert_eq!(inputs, vec![ProbeInput::path("admin"), ProbeInput::path("login")]);

        let creds = RequestInputs::Credentials {
            usernames: vec!["root".into(), "".into()],
            passwords: vec!["toor".into()],
        };
        let inputs = resolve_inputs(&ctl, ProbeKind::Credential, Some(creds)).unwrap();
        assert_eq!(inputs, vec![ProbeInput::credential("root", "toor")]);
    }

    #[tokio::test]
    async fn serve_returns_after_controller_shutdown() {
        let ctl = Arc::new(SessionController::new(EngineConfig::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = tokio::spawn(serve(listener, ctl.clone()));
        ctl.shutdown();
        let joined = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("server did not stop");
        assert!(joined.unwrap().is_ok());
    }
}
