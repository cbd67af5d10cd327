//! tmux session orchestration on the active backend

pub mod commands;
mod orchestrator;
mod plan;

pub use orchestrator::{
    CommandRunner, LaunchOutcome, LaunchReport, SessionOrchestrator, StopOutcome,
    DEFAULT_SESSION_NAME,
};
pub use plan::{
    pane_commands_from_nodes, plan_windows, NodeEntry, PaneCommand, WindowCommands, WindowPlan,
};
