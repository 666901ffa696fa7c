/// Lenient request/option decoding.
pub mod options;
/// Job identity, status and snapshots.
pub mod record;
/// FIFO admission under a concurrency ceiling.
pub mod scheduler;
