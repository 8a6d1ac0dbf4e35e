use super::*;
use std::{collections::HashMap, convert::Infallible};

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header::COOKIE, HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{stream, Stream, StreamExt};
use serde_json::{json, Value};
use shared::{
    domain::{CompetitionId, ContainerId, PowerAction, TeamId},
    protocol::{ContainerTeam, PowerRequest, ScoreRequest},
};
use tokio::{net::TcpListener, sync::oneshot};

type Captured = Arc<Mutex<Vec<String>>>;

async fn serve(app: Router) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn containers_are_requested_per_competition() -> Result<()> {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route(
            "/api/containers",
            get(
                |State(captured): State<Captured>,
                 Query(query): Query<HashMap<String, String>>| async move {
                    captured
                        .lock()
                        .await
                        .push(query.get("competition").cloned().unwrap_or_default());
                    Json(json!({
                        "containers": [
                            { "id": 301, "name": "web", "ipAddress": "10.0.0.5", "status": "running",
                              "team": { "id": 4, "name": "Blue" } },
                            { "id": "not-a-number", "status": "stopped" },
                            { "id": "302", "status": null, "team": { "name": "Red" } }
                        ]
                    }))
                },
            ),
        )
        .with_state(captured.clone());
    let api = HttpConsoleApi::new(&serve(app).await?)?;

    let containers = api.list_containers(&CompetitionId::from("koth 2024")).await?;
    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].id, ContainerId(301));
    assert_eq!(containers[0].ip_address.as_deref(), Some("10.0.0.5"));
    assert_eq!(
        containers[0].team.as_ref().and_then(|team| team.id),
        Some(TeamId(4))
    );
    assert_eq!(containers[1].id, ContainerId(302));
    assert!(containers[1].status.is_empty());
    assert_eq!(
        containers[1].team.as_ref().map(ContainerTeam::label).as_deref(),
        Some("Red")
    );
    assert_eq!(*captured.lock().await, vec!["koth 2024".to_string()]);
    Ok(())
}

#[tokio::test]
async fn error_bodies_prefer_error_then_message_then_fallback() -> Result<()> {
    let app = Router::new()
        .route(
            "/api/containers/power",
            post(|Json(request): Json<PowerRequest>| async move {
                match request.action {
                    PowerAction::Start => (
                        StatusCode::CONFLICT,
                        Json(json!({ "error": "Container busy", "message": "ignored" })),
                    ),
                    PowerAction::Stop => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
                }
            }),
        )
        .route(
            "/api/competitions",
            get(|| async { (StatusCode::FORBIDDEN, Json(json!({ "message": "Managers only" }))) }),
        );
    let api = HttpConsoleApi::new(&serve(app).await?)?;

    let start = PowerRequest {
        ids: vec![ContainerId(1)],
        action: PowerAction::Start,
    };
    match api.power_containers(&start).await {
        Err(ConsoleError::Status { status, message, .. }) => {
            assert_eq!(status, 409);
            assert_eq!(message, "Container busy");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let stop = PowerRequest {
        action: PowerAction::Stop,
        ..start
    };
    let err = api.power_containers(&stop).await.expect_err("500");
    assert_eq!(err.to_string(), "Failed to stop containers");

    let err = api.list_competitions().await.expect_err("403");
    assert_eq!(err.to_string(), "Managers only");
    Ok(())
}

#[tokio::test]
async fn score_update_posts_action_and_amount() -> Result<()> {
    let (tx, rx) = oneshot::channel::<(String, i64, Value)>();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let app = Router::new().route(
        "/api/competitions/:competition/teams/:team/score",
        post(
            |State(tx): State<Arc<Mutex<Option<oneshot::Sender<(String, i64, Value)>>>>>,
             Path((competition, team)): Path<(String, i64)>,
             Json(body): Json<Value>| async move {
                if let Some(tx) = tx.lock().await.take() {
                    let _ = tx.send((competition, team, body));
                }
                Json(json!({ "score": 15, "lastUpdated": "2024-05-01T12:00:00Z" }))
            },
        )
        .with_state(tx),
    );
    let api = HttpConsoleApi::new(&serve(app).await?)?;

    let response = api
        .update_team_score(&CompetitionId::from("koth"), TeamId(7), &ScoreRequest::adjust(5))
        .await?;
    assert_eq!(response.score, Some(15));
    assert_eq!(response.last_updated.as_deref(), Some("2024-05-01T12:00:00Z"));

    let (competition, team, body) = rx.await?;
    assert_eq!(competition, "koth");
    assert_eq!(team, 7);
    assert_eq!(body, json!({ "action": "adjust", "amount": 5 }));
    Ok(())
}

#[tokio::test]
async fn session_cookie_is_sent_with_every_request() -> Result<()> {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route(
            "/api/competitions/:competition/teams",
            get(|State(captured): State<Captured>, headers: HeaderMap| async move {
                let cookie = headers
                    .get(COOKIE)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                captured.lock().await.push(cookie);
                Json(json!({ "teams": [{ "id": 1, "name": "Red", "score": "40" }, { "name": "nameless" }] }))
            }),
        )
        .with_state(captured.clone());
    let mut settings = ApiSettings::new(serve(app).await?);
    settings.session_cookie = Some("session=abc123".into());
    let api = HttpConsoleApi::with_settings(&settings)?;

    let teams = api.list_teams(&CompetitionId::from("koth")).await?;
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].score, 40);
    assert_eq!(*captured.lock().await, vec!["session=abc123".to_string()]);
    Ok(())
}

#[tokio::test]
async fn upload_sends_multipart_package() -> Result<()> {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route(
            "/api/competitions/upload",
            post(|State(captured): State<Captured>, mut multipart: Multipart| async move {
                while let Ok(Some(field)) = multipart.next_field().await {
                    let name = field.name().unwrap_or_default().to_string();
                    let file_name = field.file_name().map(str::to_string);
                    let Ok(bytes) = field.bytes().await else {
                        break;
                    };
                    let entry = match file_name {
                        Some(file_name) => format!("{name}={file_name}:{}", bytes.len()),
                        None => format!("{name}={}", String::from_utf8_lossy(&bytes)),
                    };
                    captured.lock().await.push(entry);
                }
                Json(json!({
                    "message": "Package stored",
                    "jobID": "up-1",
                    "competitionID": "koth",
                    "competitionName": "King of the Hill",
                    "packageID": 12
                }))
            }),
        )
        .with_state(captured.clone());
    let api = HttpConsoleApi::new(&serve(app).await?)?;

    let package = CompetitionPackage::new("koth.zip", b"PK\x03\x04data".to_vec());
    let response = api.upload_package(&package, true).await?;
    assert_eq!(response.job_id.as_deref(), Some("up-1"));
    assert_eq!(response.competition_name.as_deref(), Some("King of the Hill"));
    assert_eq!(response.package_id, Some(json!(12)));
    assert_eq!(
        *captured.lock().await,
        vec!["file=koth.zip:8".to_string(), "enableAdvancedLogging=true".to_string()]
    );
    Ok(())
}

fn job_events() -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    stream::iter([
        Event::default().data("Destroying competition koth"),
        Event::default().data("line one\nline two"),
        Event::default().data("Competition torn down successfully"),
    ])
    .map(Ok)
}

#[tokio::test]
async fn job_stream_yields_event_payloads_in_order() -> Result<()> {
    let app = Router::new().route(
        "/api/competitions/teardown/:job/stream",
        get(|Path(job): Path<String>| async move {
            assert_eq!(job, "td-1");
            Sse::new(job_events()).keep_alive(KeepAlive::default())
        }),
    );
    let api = HttpConsoleApi::new(&serve(app).await?)?;

    let lines: Vec<String> = api
        .open_job_stream(JobClass::Teardown, "td-1")
        .await?
        .take(3)
        .map(|item| item.map_err(anyhow::Error::from))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_>>()?;
    assert_eq!(
        lines,
        vec![
            "Destroying competition koth".to_string(),
            "line one\nline two".to_string(),
            "Competition torn down successfully".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn unknown_job_stream_is_an_error() -> Result<()> {
    let app = Router::new().route(
        "/api/containers/redeploy/:job/stream",
        get(|| async { (StatusCode::NOT_FOUND, Json(json!({ "error": "job not found" }))) }),
    );
    let api = HttpConsoleApi::new(&serve(app).await?)?;

    match api.open_job_stream(JobClass::Redeploy, "missing").await {
        Err(ConsoleError::Status { status, message, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "job not found");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("stream should not open"),
    }
    Ok(())
}
