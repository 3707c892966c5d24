//! Container Gateway
//!
//! The only sanctioned way to find a container by name and operate on it:
//! status queries, exec with split stdout/stderr, restart, start, stop and logs.

pub mod engine;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod frame;
pub mod gateway;
pub mod status;

#[cfg(any(test, feature = "test-util"))]
pub use fake::FakeEngine;
pub use engine::{BollardEngine, ContainerEngine, EngineContainer, EngineStats};
pub use frame::{interleaved_lossy, Demuxed, Frame, FrameDecoder, StreamKind};
pub use gateway::{ContainerGateway, RestartOutcome, DEFAULT_STATS_TIMEOUT};
pub use status::{cpu_percent, derive_health, is_unhealthy, parse_uptime};
