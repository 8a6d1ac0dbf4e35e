//! HTTP collaborator: the backend's REST endpoints and job log streams.

use std::{collections::VecDeque, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use futures::{stream, stream::BoxStream, StreamExt};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, COOKIE},
    multipart::{Form, Part},
    Client, Response,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::{CompetitionId, TeamId},
    error::ApiErrorBody,
    protocol::{
        CompetitionSummary, CompetitionsResponse, ContainerRecord, ContainersResponse,
        JobResponse, MessageResponse, PowerRequest, RedeployRequest, ScoreRequest,
        ScoreResponse, ScoringRequest, TeamRecord, TeamsResponse, UploadResponse,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{error::ConsoleError, jobs::JobClass};

pub mod sse;

use sse::SseDecoder;

/// Ordered text payloads of one job's log stream. The stream ends when the
/// server closes the connection; an `Err` item means the transport failed.
pub type LogStream = BoxStream<'static, Result<String, ConsoleError>>;

/// A competition package selected by the operator for upload.
#[derive(Debug, Clone)]
pub struct CompetitionPackage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl CompetitionPackage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub async fn read(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read package {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { file_name, bytes })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn list_competitions(&self) -> Result<Vec<CompetitionSummary>, ConsoleError>;
    async fn list_containers(
        &self,
        competition: &CompetitionId,
    ) -> Result<Vec<ContainerRecord>, ConsoleError>;
    async fn power_containers(
        &self,
        request: &PowerRequest,
    ) -> Result<MessageResponse, ConsoleError>;
    async fn redeploy_containers(
        &self,
        request: &RedeployRequest,
    ) -> Result<JobResponse, ConsoleError>;
    async fn list_teams(&self, competition: &CompetitionId)
        -> Result<Vec<TeamRecord>, ConsoleError>;
    async fn update_team_score(
        &self,
        competition: &CompetitionId,
        team_id: TeamId,
        request: &ScoreRequest,
    ) -> Result<ScoreResponse, ConsoleError>;
    async fn set_scoring(&self, competition: &CompetitionId, active: bool)
        -> Result<(), ConsoleError>;
    async fn teardown_competition(
        &self,
        competition: &CompetitionId,
    ) -> Result<JobResponse, ConsoleError>;
    async fn upload_package(
        &self,
        package: &CompetitionPackage,
        enable_advanced_logging: bool,
    ) -> Result<UploadResponse, ConsoleError>;
    async fn open_job_stream(&self, class: JobClass, job_id: &str)
        -> Result<LogStream, ConsoleError>;
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub server_url: String,
    pub session_cookie: Option<String>,
    pub request_timeout: Duration,
}

impl ApiSettings {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            session_cookie: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpConsoleApi {
    http: Client,
    base: Url,
    request_timeout: Duration,
}

impl HttpConsoleApi {
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        Self::with_settings(&ApiSettings::new(server_url))
    }

    pub fn with_settings(settings: &ApiSettings) -> anyhow::Result<Self> {
        let base = Url::parse(&settings.server_url)
            .with_context(|| format!("invalid server url: {}", settings.server_url))?;
        let mut headers = HeaderMap::new();
        if let Some(cookie) = settings.session_cookie.as_deref() {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(cookie).context("session cookie is not a valid header")?,
            );
        }
        // No client-wide timeout: it would also cut long-lived log streams.
        let http = Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.request_timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base,
            request_timeout: settings.request_timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ConsoleError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ConsoleError::Transport(format!("server url {} has no path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned + Default>(
        &self,
        url: Url,
        fallback: &str,
    ) -> Result<T, ConsoleError> {
        debug!(%url, "http: GET");
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        read_json(response, fallback).await
    }

    async fn post_json<B: serde::Serialize + ?Sized, T: DeserializeOwned + Default>(
        &self,
        url: Url,
        body: Option<&B>,
        fallback: &str,
    ) -> Result<T, ConsoleError> {
        debug!(%url, "http: POST");
        let mut request = self.http.post(url).timeout(self.request_timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        read_json(response, fallback).await
    }
}

/// Non-2xx bodies become `ConsoleError::Status`. Successful bodies that do
/// not parse are treated as empty, matching how the dashboard always
/// tolerated missing fields.
async fn read_json<T: DeserializeOwned + Default>(
    response: Response,
    fallback: &str,
) -> Result<T, ConsoleError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        let body = ApiErrorBody::from_slice(&bytes);
        return Err(ConsoleError::Status {
            status: status.as_u16(),
            message: body.message_or(fallback),
            detail: body.detail,
            logs: body.logs,
        });
    }
    if bytes.is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(&bytes).unwrap_or_else(|err| {
        warn!(%status, "http: response body did not parse: {err}");
        T::default()
    }))
}

#[async_trait]
impl ConsoleApi for HttpConsoleApi {
    async fn list_competitions(&self) -> Result<Vec<CompetitionSummary>, ConsoleError> {
        let url = self.endpoint(&["api", "competitions"])?;
        let body: CompetitionsResponse = self.get_json(url, "Failed to load competitions").await?;
        Ok(body.competitions)
    }

    async fn list_containers(
        &self,
        competition: &CompetitionId,
    ) -> Result<Vec<ContainerRecord>, ConsoleError> {
        let mut url = self.endpoint(&["api", "containers"])?;
        url.query_pairs_mut()
            .append_pair("competition", competition.as_str());
        let body: ContainersResponse = self.get_json(url, "Failed to load containers").await?;
        let total = body.containers.len();
        let containers: Vec<ContainerRecord> = body
            .containers
            .iter()
            .filter_map(ContainerRecord::from_wire)
            .collect();
        if containers.len() != total {
            warn!(
                competition_id = %competition,
                skipped = total - containers.len(),
                "http: dropped container entries without an integral id"
            );
        }
        Ok(containers)
    }

    async fn power_containers(
        &self,
        request: &PowerRequest,
    ) -> Result<MessageResponse, ConsoleError> {
        let url = self.endpoint(&["api", "containers", "power"])?;
        let fallback = format!("Failed to {} containers", request.action);
        self.post_json(url, Some(request), &fallback).await
    }

    async fn redeploy_containers(
        &self,
        request: &RedeployRequest,
    ) -> Result<JobResponse, ConsoleError> {
        let url = self.endpoint(&["api", "containers", "redeploy"])?;
        self.post_json(url, Some(request), "Failed to redeploy container")
            .await
    }

    async fn list_teams(
        &self,
        competition: &CompetitionId,
    ) -> Result<Vec<TeamRecord>, ConsoleError> {
        let url = self.endpoint(&["api", "competitions", competition.as_str(), "teams"])?;
        let body: TeamsResponse = self.get_json(url, "Failed to load teams").await?;
        Ok(body.teams.iter().filter_map(TeamRecord::from_wire).collect())
    }

    async fn update_team_score(
        &self,
        competition: &CompetitionId,
        team_id: TeamId,
        request: &ScoreRequest,
    ) -> Result<ScoreResponse, ConsoleError> {
        let team = team_id.to_string();
        let url = self.endpoint(&[
            "api",
            "competitions",
            competition.as_str(),
            "teams",
            &team,
            "score",
        ])?;
        self.post_json(url, Some(request), "Failed to update team score")
            .await
    }

    async fn set_scoring(
        &self,
        competition: &CompetitionId,
        active: bool,
    ) -> Result<(), ConsoleError> {
        let url = self.endpoint(&["api", "competitions", competition.as_str(), "scoring"])?;
        let _: MessageResponse = self
            .post_json(
                url,
                Some(&ScoringRequest { active }),
                "Failed to update scoring",
            )
            .await?;
        Ok(())
    }

    async fn teardown_competition(
        &self,
        competition: &CompetitionId,
    ) -> Result<JobResponse, ConsoleError> {
        let url = self.endpoint(&["api", "competitions", competition.as_str(), "teardown"])?;
        self.post_json::<(), _>(url, None, "Failed to destroy competition")
            .await
    }

    async fn upload_package(
        &self,
        package: &CompetitionPackage,
        enable_advanced_logging: bool,
    ) -> Result<UploadResponse, ConsoleError> {
        let url = self.endpoint(&["api", "competitions", "upload"])?;
        let file = Part::bytes(package.bytes.clone())
            .file_name(package.file_name.clone())
            .mime_str("application/zip")?;
        let form = Form::new().part("file", file).text(
            "enableAdvancedLogging",
            if enable_advanced_logging { "true" } else { "false" },
        );
        debug!(%url, file = %package.file_name, "http: POST multipart");
        let response = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        read_json(response, "Upload failed").await
    }

    async fn open_job_stream(
        &self,
        class: JobClass,
        job_id: &str,
    ) -> Result<LogStream, ConsoleError> {
        let mut segments = class.stream_prefix().to_vec();
        segments.push(job_id);
        segments.push("stream");
        let url = self.endpoint(&segments)?;
        debug!(%url, job_class = %class, "http: opening log stream");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let bytes = response.bytes().await.unwrap_or_default();
            let body = ApiErrorBody::from_slice(&bytes);
            return Err(ConsoleError::Status {
                status: status.as_u16(),
                message: body.message_or("Failed to open log stream"),
                detail: body.detail,
                logs: body.logs,
            });
        }
        Ok(event_stream(response))
    }
}

struct SseBody {
    response: Response,
    decoder: SseDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

fn event_stream(response: Response) -> LogStream {
    let body = SseBody {
        response,
        decoder: SseDecoder::default(),
        ready: VecDeque::new(),
        finished: false,
    };
    stream::unfold(body, |mut body| async move {
        loop {
            if let Some(event) = body.ready.pop_front() {
                return Some((Ok(event), body));
            }
            if body.finished {
                return None;
            }
            match body.response.chunk().await {
                Ok(Some(chunk)) => {
                    let events = body.decoder.push(&chunk);
                    body.ready.extend(events);
                }
                Ok(None) => {
                    body.finished = true;
                    if body.decoder.finish() {
                        debug!("http: dropped unterminated event at end of log stream");
                    }
                }
                Err(err) => {
                    body.finished = true;
                    return Some((Err(ConsoleError::from(err)), body));
                }
            }
        }
    })
    .boxed()
}
