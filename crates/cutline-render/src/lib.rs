//! Render job orchestration.
//!
//! Submission validation, one-shot dispatch (local task or remote runner),
//! serialized status application with a single regression guard,
//! cancellation, remote polling, and callback ingestion/delivery.

pub mod config;
pub mod error;
pub mod local;
pub mod notify;
pub mod orchestrator;
pub mod remote;
pub mod store;
pub mod webhook;

pub use config::OrchestratorConfig;
pub use error::{RenderJobError, RenderResult};
pub use notify::{CallbackNotifier, SECRET_HEADER};
pub use orchestrator::Orchestrator;
pub use remote::{RemoteJobStatus, RemoteRunner};
pub use store::{JobFilter, JobStore, Page};
pub use webhook::{router, verify_shared_secret, WebhookState};
