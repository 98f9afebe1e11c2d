//! Route definitions for web server.

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};

/// Upper bound for any request body, message batches included.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Create the API router.
///
/// Every route answers a wrong method with 405; unknown paths fall through
/// to the app-level 404.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route(
            "/agency",
            get(api::get_agency).fallback(api::method_not_allowed),
        )
        // Agents
        .route(
            "/agency/agents",
            post(api::post_agent).fallback(api::method_not_allowed),
        )
        .route(
            "/agency/agents/:agentid",
            delete(api::delete_agent).fallback(api::method_not_allowed),
        )
        .route(
            "/agency/agents/:agentid/status",
            get(api::get_agent_status).fallback(api::method_not_allowed),
        )
        .route(
            "/agency/agents/:agentid/custom",
            put(api::put_agent_custom).fallback(api::method_not_allowed),
        )
        // Messages
        .route(
            "/agency/msgs",
            post(api::post_messages).fallback(api::method_not_allowed),
        )
        .route(
            "/agency/msgundeliv",
            post(api::post_undeliverable).fallback(api::method_not_allowed),
        )
}

/// Create the full app router.
pub fn create_app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", create_api_router())
        .route("/health", get(health_check))
        .fallback(api::resource_not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::config::AgencyConfig;
    use crate::core::{Agency, Intake};
    use crate::error::Error;
    use crate::protocol::{ACLMessage, AgencyInfo, AgentInfo, Inbox, Status, StatusCode};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode as HttpStatus};
    use axum::response::Response;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<Agency>, mpsc::UnboundedReceiver<ACLMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = move |_agent: Arc<Agent>, mut inbox: Inbox| {
            let tx = tx.clone();
            async move {
                while let Some(msg) = inbox.recv().await {
                    let _ = tx.send(msg);
                }
                Ok::<(), Error>(())
            }
        };
        let config = AgencyConfig {
            node_id: 3,
            address: Some("http://127.0.0.1:9".to_string()),
            forward_timeout_ms: 200,
            ..Default::default()
        };
        let agency = Agency::new(&config, Arc::new(task)).unwrap();
        let (intake, _worker) = Intake::start(Arc::clone(&agency), 16);
        let app = create_app_router(AppState {
            agency: Arc::clone(&agency),
            intake,
        });
        (app, agency, rx)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: impl Into<Body>) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body.into())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn wait_running(agency: &Agency, id: u64) {
        for _ in 0..100 {
            if let Ok(status) = agency.get_agent_status(id).await {
                if status.code == StatusCode::Running {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("agent {} never started", id);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _agency, _rx) = test_app();
        let response = call(&app, Method::GET, "/health", Body::empty()).await;
        assert_eq!(response.status(), HttpStatus::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn test_create_agent_then_describe_agency() {
        let (app, agency, _rx) = test_app();

        let body = serde_json::to_vec(&AgentInfo::new(1, "pump", "device").with_node(3)).unwrap();
        let response = call(&app, Method::POST, "/api/agency/agents", body).await;
        assert_eq!(response.status(), HttpStatus::CREATED);
        assert_eq!(body_text(response).await, "Resource Created");

        wait_running(&agency, 1).await;

        let response = call(&app, Method::GET, "/api/agency", Body::empty()).await;
        assert_eq!(response.status(), HttpStatus::OK);
        let info: AgencyInfo = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(info.id, 3);
        assert_eq!(info.address, "http://127.0.0.1:9");
        assert_eq!(info.agents.len(), 1);
        assert_eq!(info.agents[0].spec.name, "pump");

        let response = call(&app, Method::GET, "/api/agency/agents/1/status", Body::empty()).await;
        assert_eq!(response.status(), HttpStatus::OK);
        let status: Status = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(status.code, StatusCode::Running);
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_rejected() {
        let (app, agency, _rx) = test_app();

        for uri in ["/api/agency/agents", "/api/agency/msgs", "/api/agency/msgundeliv"] {
            let response = call(&app, Method::POST, uri, "{not json").await;
            assert_eq!(response.status(), HttpStatus::BAD_REQUEST, "{}", uri);
        }
        assert!(agency.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_agent_is_accepted_but_not_created() {
        let (app, agency, _rx) = test_app();

        let body = serde_json::to_vec(&AgentInfo::new(1, "", "device")).unwrap();
        let response = call(&app, Method::POST, "/api/agency/agents", body).await;
        assert_eq!(response.status(), HttpStatus::CREATED);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(agency.is_empty().await);
    }

    #[tokio::test]
    async fn test_post_messages_delivers_locally() {
        let (app, agency, mut rx) = test_app();
        agency
            .create_agent(AgentInfo::new(1, "pump", "device"))
            .await
            .unwrap();

        let body = serde_json::to_vec(&vec![
            ACLMessage::new(2, 1, "first"),
            ACLMessage::new(2, 1, "second"),
        ])
        .unwrap();
        let response = call(&app, Method::POST, "/api/agency/msgs", body).await;
        assert_eq!(response.status(), HttpStatus::CREATED);

        for expected in ["first", "second"] {
            let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(msg.content, expected);
        }
    }

    #[tokio::test]
    async fn test_undeliverable_report_is_retried() {
        let (app, agency, mut rx) = test_app();
        agency
            .create_agent(AgentInfo::new(1, "pump", "device"))
            .await
            .unwrap();

        let body = serde_json::to_vec(&ACLMessage::new(2, 1, "again")).unwrap();
        let response = call(&app, Method::POST, "/api/agency/msgundeliv", body).await;
        assert_eq!(response.status(), HttpStatus::CREATED);

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(msg.redelivery);
        assert_eq!(agency.router().stats().retried, 1);
    }

    #[tokio::test]
    async fn test_delete_agent() {
        let (app, agency, _rx) = test_app();
        agency
            .create_agent(AgentInfo::new(1, "pump", "device"))
            .await
            .unwrap();

        let response = call(&app, Method::DELETE, "/api/agency/agents/1", Body::empty()).await;
        assert_eq!(response.status(), HttpStatus::OK);
        assert!(agency.is_empty().await);

        let response = call(&app, Method::DELETE, "/api/agency/agents/1", Body::empty()).await;
        assert_eq!(response.status(), HttpStatus::NOT_FOUND);

        let response = call(&app, Method::DELETE, "/api/agency/agents/abc", Body::empty()).await;
        assert_eq!(response.status(), HttpStatus::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_of_unknown_agent() {
        let (app, _agency, _rx) = test_app();
        let response = call(&app, Method::GET, "/api/agency/agents/42/status", Body::empty()).await;
        assert_eq!(response.status(), HttpStatus::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_custom_data() {
        let (app, agency, _rx) = test_app();
        let agent = agency
            .create_agent(AgentInfo::new(1, "pump", "device"))
            .await
            .unwrap();

        let response = call(
            &app,
            Method::PUT,
            "/api/agency/agents/1/custom",
            r#"{"setpoint": 42}"#,
        )
        .await;
        assert_eq!(response.status(), HttpStatus::OK);
        assert_eq!(agent.custom_data(), r#"{"setpoint": 42}"#);

        let response = call(&app, Method::PUT, "/api/agency/agents/9/custom", "x").await;
        assert_eq!(response.status(), HttpStatus::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_full_intake_answers_service_unavailable() {
        let (_app, agency, _rx) = test_app();
        let (intake, _jobs) = Intake::detached(1);
        let app = create_app_router(AppState { agency, intake });

        let body = serde_json::to_vec(&vec![ACLMessage::new(2, 1, "a")]).unwrap();
        let response = call(&app, Method::POST, "/api/agency/msgs", body.clone()).await;
        assert_eq!(response.status(), HttpStatus::CREATED);

        let response = call(&app, Method::POST, "/api/agency/msgs", body).await;
        assert_eq!(response.status(), HttpStatus::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let (app, _agency, _rx) = test_app();
        let body = vec![b' '; MAX_BODY_BYTES + 1];
        let response = call(&app, Method::POST, "/api/agency/msgs", body).await;
        assert_eq!(response.status(), HttpStatus::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_wrong_method_and_unknown_path() {
        let (app, _agency, _rx) = test_app();

        let response = call(&app, Method::GET, "/api/agency/agents", Body::empty()).await;
        assert_eq!(response.status(), HttpStatus::METHOD_NOT_ALLOWED);

        let response = call(&app, Method::POST, "/api/agency", Body::empty()).await;
        assert_eq!(response.status(), HttpStatus::METHOD_NOT_ALLOWED);

        let response = call(&app, Method::GET, "/api/nothing/here", Body::empty()).await;
        assert_eq!(response.status(), HttpStatus::NOT_FOUND);
        assert_eq!(body_text(response).await, "Resource not found");
    }
}
