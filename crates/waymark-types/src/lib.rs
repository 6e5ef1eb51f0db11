pub mod budget;
pub mod control;
pub mod event;
pub mod memory;
pub mod provider;
pub mod routing;
pub mod task;

pub use budget::Budget;
pub use control::ControlState;
pub use event::{Event, EventType};
pub use memory::{
    DecompositionPattern, FailurePattern, FailureSeverity, ScheduledTask, ScheduledTaskStats,
    ScheduledTaskStatus, StrategyPerformance, StrategyTotals, TaskTemplate,
};
pub use provider::{ModelInfo, ModelSpec, ProviderInfo};
pub use routing::{ModelTier, RoutingDecision, Strategy, TaskMode};
pub use task::{
    AgentExecution, AgentState, Session, Task, TaskError, TaskStatus, TaskTrigger, ToolExecution, Usage,
};
