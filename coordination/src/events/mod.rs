//! Event stream for team runs
//!
//! The orchestrator publishes a [`TeamEvent`] at each decision point so
//! operators and tests can observe runs without parsing logs.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use chorus_coordination::events::{EventBus, EventBusExt, EventFilter};
//!
//! let bus = EventBus::new().shared();
//! let mut failures = bus.subscribe_filtered(EventFilter::new().types(vec!["worker_failed"]));
//! let event = failures.recv().await?;
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusExt, EventBusResult, EventFilter, FilteredReceiver,
    SharedEventBus,
};
pub use types::{preview, RunId, TeamEvent};
