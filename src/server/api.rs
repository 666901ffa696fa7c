use std::io::Read as _;

use rouille::{Request, Response, ResponseBody};
use serde::Serialize;

use crate::config::MAX_BODY_BYTES;
use crate::foundation::error::{ReelError, ReelResult};
use crate::jobs::options::JobRequest;
use crate::jobs::record::{JobId, JobStatus};
use crate::jobs::scheduler::{JobArtifact, JobScheduler};

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    ok: bool,
    running: usize,
    queued: usize,
    concurrency: usize,
}

#[derive(Serialize)]
struct Submitted {
    id: JobId,
    status: JobStatus,
}

/// HTTP status for a scheduler or pipeline error.
pub fn status_for(err: &ReelError) -> u16 {
    match err {
        ReelError::NotFound(_) => 404,
        ReelError::NotReady(_) => 409,
        ReelError::Validation(_) | ReelError::InvalidAnimation(_) => 400,
        _ => 500,
    }
}

/// Request router over a shared [`JobScheduler`].
#[derive(Clone)]
pub struct ApiServer {
    scheduler: JobScheduler,
}

impl ApiServer {
    /// Serve `scheduler`.
    pub fn new(scheduler: JobScheduler) -> Self {
        Self { scheduler }
    }

    /// Bind `addr` and serve until the process exits.
    pub fn run(self, addr: &str) -> ReelResult<()> {
        let server = rouille::Server::new(addr, move |request| self.handle(request))
            .map_err(|e| anyhow::anyhow!("failed to bind '{addr}': {e}"))?;
        tracing::info!(addr = %server.server_addr(), "listening");
        server.run();
        Ok(())
    }

    /// Route one request.
    pub fn handle(&self, request: &Request) -> Response {
        if request.method() == "OPTIONS" {
            return with_cors(Response::empty_204());
        }

        let path = request.url();
        let response = if let Some(rest) = path.strip_prefix("/api/jobs/") {
            self.handle_job_path(request, rest)
        } else {
            rouille::router!(request,
                (GET) ["/health"] => {
                    Response::json(&Health {
                        ok: true,
                        running: self.scheduler.running_count(),
                        queued: self.scheduler.queued_count(),
                        concurrency: self.scheduler.concurrency(),
                    })
                },
                (GET) ["/api/jobs"] => {
                    Response::json(&self.scheduler.list())
                },
                (POST) ["/api/jobs"] => {
                    self.submit(request)
                },
                (POST) ["/render"] => {
                    self.render_sync(request)
                },
                _ => {
                    Response::json(&ErrorBody { error: "not found" }).with_status_code(404)
                }
            )
        };
        tracing::debug!(
            method = %request.method(),
            url = %path,
            status = response.status_code,
            "request"
        );
        with_cors(response)
    }

    fn handle_job_path(&self, request: &Request, rest: &str) -> Response {
        let (raw_id, tail) = match rest.split_once('/') {
            Some((id, tail)) => (id, Some(tail)),
            None => (rest, None),
        };
        let Some(id) = JobId::parse(raw_id) else {
            return error_response(&ReelError::not_found(raw_id.to_string()));
        };

        match (request.method(), tail) {
            ("GET", None) => match self.scheduler.status(id) {
                Ok(snapshot) => Response::json(&snapshot),
                Err(e) => error_response(&e),
            },
            ("DELETE", None) => match self.scheduler.cleanup(id) {
                Ok(()) => Response::empty_204(),
                Err(e) => error_response(&e),
            },
            ("GET", Some("result")) => match self.scheduler.take_result(id) {
                Ok(artifact) => video_response(id, artifact),
                Err(e) => error_response(&e),
            },
            _ => Response::json(&ErrorBody { error: "not found" }).with_status_code(404),
        }
    }

    fn submit(&self, request: &Request) -> Response {
        match read_job_request(request).and_then(|req| self.scheduler.submit(req)) {
            Ok(id) => {
                let status = self
                    .scheduler
                    .status(id)
                    .map(|s| s.status)
                    .unwrap_or(JobStatus::Queued);
                Response::json(&Submitted { id, status }).with_status_code(202)
            }
            Err(e) => error_response(&e),
        }
    }

    fn render_sync(&self, request: &Request) -> Response {
        let id = match read_job_request(request).and_then(|req| self.scheduler.submit(req)) {
            Ok(id) => id,
            Err(e) => return error_response(&e),
        };
        let outcome = self.scheduler.wait(id, None).and_then(|snapshot| {
            if snapshot.status == JobStatus::Done {
                self.scheduler.take_result(id)
            } else {
                let detail = snapshot.error.unwrap_or_else(|| "render failed".to_string());
                if let Err(e) = self.scheduler.cleanup(id) {
                    tracing::warn!(%id, error = %e, "cleanup after failed render");
                }
                Err(anyhow::anyhow!(detail).into())
            }
        });
        match outcome {
            Ok(artifact) => video_response(id, artifact),
            Err(e) => error_response(&e),
        }
    }
}

fn read_job_request(request: &Request) -> ReelResult<JobRequest> {
    let Some(body) = request.data() else {
        return Err(ReelError::validation("request body already consumed"));
    };
    let mut buf = Vec::new();
    body.take(MAX_BODY_BYTES as u64 + 1)
        .read_to_end(&mut buf)
        .map_err(|e| ReelError::validation(format!("failed to read body: {e}")))?;
    if buf.len() > MAX_BODY_BYTES {
        return Err(ReelError::validation(format!(
            "request body exceeds {MAX_BODY_BYTES} bytes"
        )));
    }
    if buf.iter().all(u8::is_ascii_whitespace) {
        return Err(ReelError::validation("missing input"));
    }
    let value: serde_json::Value = serde_json::from_slice(&buf)
        .map_err(|e| ReelError::validation(format!("invalid JSON body: {e}")))?;
    JobRequest::from_json(&value)
}

fn video_response(id: JobId, artifact: JobArtifact) -> Response {
    let len = usize::try_from(artifact.len()).unwrap_or(usize::MAX);
    let mut response = Response::from_data("video/mp4", Vec::new())
        .with_unique_header("Content-Disposition", "inline; filename=\"out.mp4\"")
        .with_unique_header("Cache-Control", "no-store")
        .with_unique_header("X-Job-Id", id.to_string());
    response.data = ResponseBody::from_reader_and_size(artifact, len);
    response
}

fn error_response(err: &ReelError) -> Response {
    let status = status_for(err);
    if !err.is_client_error() {
        tracing::error!(error = %err, "request failed");
    }
    Response::json(&ErrorBody {
        error: &err.to_string(),
    })
    .with_status_code(status)
}

fn with_cors(response: Response) -> Response {
    response
        .with_additional_header("Access-Control-Allow-Origin", "*")
        .with_additional_header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
        .with_additional_header("Access-Control-Allow-Headers", "Content-Type")
}

#[cfg(test)]
#[path = "../../tests/unit/server/api.rs"]
mod tests;
