//! Pane commands and how they are grouped into windows

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One command to run in its own pane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneCommand {
    pub command: String,
    /// Window the pane belongs to, by name
    pub window: String,
    /// Pause after launching, before the next pane
    #[serde(default)]
    pub delay_ms: u64,
}

impl PaneCommand {
    pub fn new(command: impl Into<String>, window: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            window: window.into(),
            delay_ms: 0,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// A window of the session as it will be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowPlan {
    pub name: String,
    pub index: u32,
    pub panes: usize,
}

/// Distinct windows in order of first appearance, numbered from `base_index`.
pub fn plan_windows(commands: &[PaneCommand], base_index: u32) -> Vec<WindowPlan> {
    let mut windows: Vec<WindowPlan> = Vec::new();
    for command in commands {
        match windows.iter_mut().find(|w| w.name == command.window) {
            Some(window) => window.panes += 1,
            None => windows.push(WindowPlan {
                name: command.window.clone(),
                index: base_index + windows.len() as u32,
                panes: 1,
            }),
        }
    }
    windows
}

/// Commands of one window for [`launch_grouped`](super::SessionOrchestrator::launch_grouped)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCommands {
    pub name: String,
    pub commands: Vec<String>,
}

impl WindowCommands {
    pub fn new(name: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            name: name.into(),
            commands,
        }
    }
}

/// A launchable process as described in a node manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub command: String,
    #[serde(default = "default_window")]
    pub window: String,
    #[serde(default)]
    pub delay_ms: u64,
    /// Launch position; entries without one go last
    #[serde(default)]
    pub order: Option<i64>,
    /// `false` keeps the entry in the manifest without launching it
    #[serde(default = "default_run")]
    pub run: bool,
}

fn default_window() -> String {
    "main".to_string()
}

fn default_run() -> bool {
    true
}

/// Turn named manifest entries into pane commands.
///
/// Entries are stably sorted by `order`, skipped when `run` is false, and
/// prefixed with `source <file> && ` when `source` is given.
pub fn pane_commands_from_nodes(
    nodes: Vec<(String, NodeEntry)>,
    source: Option<&str>,
) -> Vec<PaneCommand> {
    let mut nodes: Vec<NodeEntry> = nodes
        .into_iter()
        .filter(|(name, node)| {
            if !node.run {
                tracing::debug!("Skipping node {}", name);
            }
            node.run
        })
        .map(|(_, node)| node)
        .collect();
    nodes.sort_by_key(|node| node.order.unwrap_or(i64::MAX));

    nodes
        .into_iter()
        .map(|node| PaneCommand {
            command: match source {
                Some(file) => format!("source {} && {}", file, node.command),
                None => node.command,
            },
            window: node.window,
            delay_ms: node.delay_ms,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_in_first_seen_order() {
        let commands = vec![
            PaneCommand::new("a", "w1"),
            PaneCommand::new("b", "w2"),
            PaneCommand::new("c", "w1"),
        ];
        let plan = plan_windows(&commands, 1);
        assert_eq!(
            plan,
            vec![
                WindowPlan { name: "w1".into(), index: 1, panes: 2 },
                WindowPlan { name: "w2".into(), index: 2, panes: 1 },
            ]
        );
        assert_eq!(plan_windows(&commands, 0)[1].index, 1);
        assert!(plan_windows(&[], 1).is_empty());
    }

    #[test]
    fn test_nodes_sorted_filtered_and_sourced() {
        let json = r#"[
            ["camera", {"command": "ros2 run cam node", "order": 2}],
            ["lidar", {"command": "ros2 run lidar node", "window": "sensors", "order": 1, "delay_ms": 500}],
            ["logger", {"command": "ros2 bag record -a"}],
            ["debug", {"command": "rqt", "run": false, "order": 0}]
        ]"#;
        let nodes: Vec<(String, NodeEntry)> = serde_json::from_str(json).unwrap();
        let commands = pane_commands_from_nodes(nodes, Some("~/ws/install/setup.bash"));

        assert_eq!(commands.len(), 3);
        assert_eq!(
            commands[0].command,
            "source ~/ws/install/setup.bash && ros2 run lidar node"
        );
        assert_eq!(commands[0].window, "sensors");
        assert_eq!(commands[0].delay(), Duration::from_millis(500));
        assert_eq!(commands[1].window, "main");
        assert!(commands[2].command.ends_with("ros2 bag record -a"));
    }
}
