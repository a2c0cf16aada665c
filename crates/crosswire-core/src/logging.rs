//! Logging conventions for crosswire.
//!
//! All diagnostics go through [`tracing`]. Each subsystem logs under its own
//! target so consumers can filter precisely, for example:
//!
//! ```text
//! RUST_LOG=crosswire_core::signal=trace,crosswire_core::event_loop=debug
//! ```
//!
//! Level usage:
//!
//! - `trace`: per-emission and per-connection events
//! - `debug`: loop start/stop, dropped deliveries, thread bootstrap
//! - `warn`/`error`: misuse that is rejected at runtime (e.g. a blocking send
//!   to the caller's own loop)

/// Tracing targets used by crosswire subsystems.
pub mod targets {
    /// Signal emission and handler table changes.
    pub const SIGNAL: &str = "crosswire_core::signal";
    /// Connect/disconnect bookkeeping.
    pub const CONNECT: &str = "crosswire_core::connect";
    /// Object lifetime, affinity and teardown.
    pub const OBJECT: &str = "crosswire_core::object";
    /// Event loop execution and registry.
    pub const EVENT_LOOP: &str = "crosswire_core::event_loop";
    /// Timer scheduling and firing.
    pub const TIMER: &str = "crosswire_core::timer";
    /// Worker thread bootstrap.
    pub const THREAD: &str = "crosswire_core::thread";
}

#[cfg(test)]
mod tests {
    use super::targets;

    #[test]
    fn test_targets_share_crate_prefix() {
        for target in [
            targets::SIGNAL,
            targets::CONNECT,
            targets::OBJECT,
            targets::EVENT_LOOP,
            targets::TIMER,
            targets::THREAD,
        ] {
            assert!(target.starts_with("crosswire_core::"), "{target}");
        }
    }
}
