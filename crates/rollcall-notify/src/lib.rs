//! rollcall-notify — Attendance API client.
//!
//! Forwards matched names to the remote attendance service (session lookup,
//! then record) from a worker thread fed by a bounded queue.

pub mod notifier;
pub mod transport;
pub mod worker;

pub use notifier::{ApiSettings, AttendanceNotifier, AttendanceStatus, TIMESTAMP_FORMAT};
pub use transport::{HttpReply, Transport, TransportError, UreqTransport};
pub use worker::{spawn_notifier, NotifierHandle, Outcome, Submission, WorkerError};
