use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::model::LanguageVersion;

/// Platform primitive that injects the debug bootstrap into an already
/// running interpreter process.
///
/// Injection is inherently platform- and interpreter-specific, so it sits
/// behind a trait seam: production supplies the real injector, tests a
/// fake. The implementation must arrange for the bootstrap inside the
/// target to dial back to `listener_port` and present `debug_id`, and must
/// resolve `completed` once the target-side attach has finished.
pub trait Attacher: Send + Sync {
    fn attach(
        &self,
        pid: u32,
        listener_port: u16,
        debug_id: Uuid,
    ) -> std::result::Result<AttachStart, AttachError>;
}

/// A successfully started attach: the discovered interpreter version plus
/// the completion signal the controller awaits under its attach timeout.
pub struct AttachStart {
    pub language_version: LanguageVersion,
    pub completed: oneshot::Receiver<()>,
}

/// Attach failures are split by cause: an explicit error code from the
/// injection primitive is a different condition from the completion signal
/// never arriving, and callers report them differently.
#[derive(Error, Debug)]
pub enum AttachError {
    #[error("attach failed with error code {code}")]
    Failed { code: i32 },
    #[error("timed out waiting for the target to complete the attach")]
    Timeout,
    #[error("no process with pid {pid}")]
    NoSuchProcess { pid: u32 },
}
