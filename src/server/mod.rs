//! A thin synchronous adapter built on `rouille`: every request is decoded, handed to the
//! [`JobScheduler`](crate::jobs::scheduler::JobScheduler), and the outcome mapped back to a status
//! code. Rendering never happens on a request thread except for `POST /render`, which blocks
//! until its job is terminal.
//!
//! # Endpoints
//!
//! | Method | Path                     | Description                              |
//! |--------|--------------------------|------------------------------------------|
//! | GET    | `/health`                | Liveness plus scheduler counters         |
//! | POST   | `/api/jobs`              | Submit a job (202 + id)                  |
//! | GET    | `/api/jobs`              | All known jobs                           |
//! | GET    | `/api/jobs/{id}`         | Job status                               |
//! | GET    | `/api/jobs/{id}/result`  | Stream the MP4 of a `done` job, once     |
//! | DELETE | `/api/jobs/{id}`         | Forget a queued or finished job          |
//! | POST   | `/render`                | Submit, wait, and stream the MP4         |
//!
//! Errors are JSON `{ "error": "..." }`: unknown job 404, job not ready 409, bad input 400,
//! anything else 500.

mod api;

pub use api::{ApiServer, status_for};
