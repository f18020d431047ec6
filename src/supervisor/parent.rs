//! Parent-process liveness probing.
//!
//! The broker self-terminates when its owning parent (the editor that
//! spawned it) dies. Liveness is an injected capability so the supervisor
//! stays platform-neutral: the unix implementation probes the parent pid
//! with a null signal; platforms without an equivalent assume the parent
//! is alive until the input stream closes.

use std::sync::Arc;

/// Capability for checking whether the owning parent process still lives.
pub trait ParentWatch: Send + Sync {
    /// Best-effort liveness check. Must not block.
    fn alive(&self) -> bool;
}

/// Fallback watch that always reports the parent as alive; end-of-input
/// then becomes the only termination signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAlive;

impl ParentWatch for AlwaysAlive {
    fn alive(&self) -> bool {
        true
    }
}

/// Watch over the process that spawned us, captured at startup.
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub struct UnixParent {
    pid: nix::unistd::Pid,
}

#[cfg(unix)]
impl UnixParent {
    /// Capture the current parent pid.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            pid: nix::unistd::getppid(),
        }
    }
}

#[cfg(unix)]
impl ParentWatch for UnixParent {
    fn alive(&self) -> bool {
        // Signal 0 performs permission and existence checks only.
        nix::sys::signal::kill(self.pid, None).is_ok()
    }
}

/// The platform's best available parent watch.
#[must_use]
pub fn os_parent() -> Arc<dyn ParentWatch> {
    #[cfg(unix)]
    {
        Arc::new(UnixParent::capture())
    }
    #[cfg(not(unix))]
    {
        Arc::new(AlwaysAlive)
    }
}
