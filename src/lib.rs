//! Storefront payment confirmation
//!
//! After a customer is redirected to the payment gateway and back, this crate
//! works out whether the payment succeeded and applies the consequences
//! exactly once. Two channels feed it:
//!
//! - the return URL, verified once when the application mounts, and
//! - a background poller that resumes from durable storage after a reload,
//!   a closed tab or a crash.
//!
//! Both settle through a shared [`coordinator::Reconciler`] so only one of them
//! ever notifies the user, refreshes state and reloads or redirects.

pub mod config;
pub mod coordinator;
pub mod effects;
pub mod engine;
pub mod error;
pub mod models;
pub mod oracle;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod verifier;

pub use config::{Config, EngineTimings};
pub use coordinator::{Channel, Claim, Reconciler};
pub use effects::{EffectDispatcher, HostEffects, Notice, NoticeKind, SetupPrompt};
pub use engine::{MountReport, PaymentConfirmation};
pub use error::{AppError, Result};
pub use oracle::{HttpStatusOracle, StatusOracle};
pub use scheduler::{PollScheduler, PollSnapshot};
pub use session::{SessionRepository, StoredSessionRepository};
pub use storage::{FileStorage, MemoryStorage, StorageAdapter};
pub use verifier::{ReturnUrlVerifier, VerificationReport};
