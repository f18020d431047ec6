//! Built-in methods shipped with the broker.
//!
//! Handler plugins proper (formatting, completion, lint, …) live outside
//! this crate; the broker itself ships only the methods its own protocol
//! needs: a liveness `echo` and the `kill` cancellation endpoint.

pub mod echo;
pub mod kill;

use crate::dispatch::MethodRegistry;

/// Register the broker's built-in methods.
pub fn register_builtins(registry: &mut MethodRegistry) {
    registry.register::<echo::Echo>("echo");
    registry.register::<kill::Kill>("kill");
}
