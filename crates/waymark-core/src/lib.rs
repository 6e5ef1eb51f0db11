//! Core execution primitives shared by every workflow family: the Event
//! Bus, Token Accountant, Control State Store, the shared `Checkpoint`
//! suspension-point helper, and the Agent Executor (ReAct loop).

pub mod accountant;
pub mod agent;
pub mod checkpoint;
pub mod control;
pub mod event_bus;

pub use accountant::TokenAccountant;
pub use agent::{AgentExecutor, AgentExecutorError, AgentInput, AgentOutput};
pub use checkpoint::{Checkpoint, CheckpointOutcome};
pub use control::ControlStateStore;
pub use event_bus::EventBus;
