//! Idempotent build-up and teardown of a named tmux session

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::commands;
use super::plan::{plan_windows, PaneCommand, WindowCommands, WindowPlan};
use crate::error::{LinkError, Result};
use crate::exec::CommandExecutor;

pub const DEFAULT_SESSION_NAME: &str = "companion";

/// Where tmux commands run and where the attaching terminal opens
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command on the target and return its stdout.
    async fn run(&self, command: &str) -> Result<String>;

    /// Open a terminal on the operator machine running `command` against
    /// the target.
    fn open_terminal(&self, command: &str) -> Result<()>;
}

#[async_trait]
impl CommandRunner for CommandExecutor {
    async fn run(&self, command: &str) -> Result<String> {
        self.execute(command).await
    }

    fn open_terminal(&self, command: &str) -> Result<()> {
        CommandExecutor::open_terminal(self, Some(command), false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    NotExists,
    Creating,
    PopulatingWindows,
    PopulatingPanes,
    Ready,
    Attach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchOutcome {
    /// The session was built by this call
    Created,
    /// The session already existed and was left untouched
    AlreadyRunning,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub session: String,
    pub outcome: LaunchOutcome,
    /// Windows created by this call; empty when the session already existed
    pub windows: Vec<WindowPlan>,
    pub attached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Killed,
    NotRunning,
}

pub struct SessionOrchestrator<R = CommandExecutor> {
    runner: R,
    window_base: u32,
    pane_base: u32,
}

impl<R: CommandRunner> SessionOrchestrator<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            window_base: 1,
            pane_base: 1,
        }
    }

    /// Match the target's `base-index` and `pane-base-index`.
    pub fn with_base_index(mut self, base_index: u32) -> Self {
        self.window_base = base_index;
        self.pane_base = base_index;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Whether tmux on the target knows `session`.
    ///
    /// A failing `has-session` means no; failures to reach the target are
    /// passed on.
    pub async fn session_exists(&self, session: &str) -> Result<bool> {
        match self.runner.run(&commands::has_session(session)).await {
            Ok(_) => Ok(true),
            Err(LinkError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Build `session` from `pane_commands` and attach a terminal to it.
    ///
    /// Each distinct window name becomes one window, in order of first
    /// appearance, holding one pane per command. Windows with more than two
    /// panes are tiled. When the session already exists nothing is changed
    /// and the terminal just attaches.
    pub async fn launch(
        &self,
        pane_commands: &[PaneCommand],
        session: &str,
        pre_launch: Option<&str>,
    ) -> Result<LaunchReport> {
        let mut state = SessionState::NotExists;

        if self.session_exists(session).await? {
            transition(session, &mut state, SessionState::Attach);
            info!("tmux session {} already running, attaching", session);
            self.attach(session)?;
            return Ok(LaunchReport {
                session: session.to_string(),
                outcome: LaunchOutcome::AlreadyRunning,
                windows: Vec::new(),
                attached: true,
            });
        }

        transition(session, &mut state, SessionState::Creating);
        self.create(session).await?;

        transition(session, &mut state, SessionState::PopulatingWindows);
        let windows = plan_windows(pane_commands, self.window_base);
        for (position, window) in windows.iter().enumerate() {
            self.add_window(session, position, window.index, &window.name)
                .await?;
        }

        transition(session, &mut state, SessionState::PopulatingPanes);
        let mut pane_counts = vec![0u32; windows.len()];
        for pane in pane_commands {
            let Some(slot) = windows.iter().position(|w| w.name == pane.window) else {
                continue;
            };
            let window_index = windows[slot].index;
            pane_counts[slot] += 1;
            let count = pane_counts[slot];

            if count > 1 {
                self.runner
                    .run(&commands::split_window(session, window_index))
                    .await?;
            }
            if count > 2 {
                self.runner
                    .run(&commands::select_tiled(session, window_index))
                    .await?;
            }

            let pane_index = self.pane_base + count - 1;
            if let Some(pre) = pre_launch {
                self.runner
                    .run(&commands::send_keys(session, window_index, pane_index, pre))
                    .await?;
            }
            self.runner
                .run(&commands::send_keys(
                    session,
                    window_index,
                    pane_index,
                    &pane.command,
                ))
                .await?;
            debug!(
                "Started `{}` in {}:{}.{}",
                pane.command, session, window_index, pane_index
            );

            if pane.delay_ms > 0 {
                tokio::time::sleep(pane.delay()).await;
            }
        }

        transition(session, &mut state, SessionState::Ready);
        info!(
            "tmux session {} ready with {} window(s), {} pane(s)",
            session,
            windows.len(),
            pane_commands.len()
        );
        self.attach(session)?;

        Ok(LaunchReport {
            session: session.to_string(),
            outcome: LaunchOutcome::Created,
            windows,
            attached: true,
        })
    }

    /// Build `session` from commands already grouped by window.
    ///
    /// Without `auto_attach` the session is only created, and an existing
    /// session is left alone.
    pub async fn launch_grouped(
        &self,
        windows: &[WindowCommands],
        session: &str,
        auto_attach: bool,
    ) -> Result<LaunchReport> {
        if self.session_exists(session).await? {
            if auto_attach {
                self.attach(session)?;
            }
            return Ok(LaunchReport {
                session: session.to_string(),
                outcome: LaunchOutcome::AlreadyRunning,
                windows: Vec::new(),
                attached: auto_attach,
            });
        }

        self.create(session).await?;

        let mut plans = Vec::with_capacity(windows.len());
        for (position, window) in windows.iter().enumerate() {
            let window_index = self.window_base + position as u32;
            self.add_window(session, position, window_index, &window.name)
                .await?;

            let last = window.commands.len().saturating_sub(1);
            for (offset, command) in window.commands.iter().enumerate() {
                let pane_index = self.pane_base + offset as u32;
                self.runner
                    .run(&commands::send_keys(session, window_index, pane_index, command))
                    .await?;
                if offset != last {
                    self.runner
                        .run(&commands::split_window(session, window_index))
                        .await?;
                }
            }
            if window.commands.len() > 2 {
                self.runner
                    .run(&commands::select_tiled(session, window_index))
                    .await?;
            }

            plans.push(WindowPlan {
                name: window.name.clone(),
                index: window_index,
                panes: window.commands.len(),
            });
        }

        info!("tmux session {} created with {} window(s)", session, plans.len());
        if auto_attach {
            self.attach(session)?;
        }

        Ok(LaunchReport {
            session: session.to_string(),
            outcome: LaunchOutcome::Created,
            windows: plans,
            attached: auto_attach,
        })
    }

    /// Kill `session` if it is running.
    pub async fn stop(&self, session: &str) -> Result<StopOutcome> {
        if !self.session_exists(session).await? {
            info!("tmux session {} is not running", session);
            return Ok(StopOutcome::NotRunning);
        }
        self.runner.run(&commands::kill_session(session)).await?;
        info!("tmux session {} killed", session);
        Ok(StopOutcome::Killed)
    }

    async fn create(&self, session: &str) -> Result<()> {
        self.runner.run(&commands::new_session(session)).await?;
        self.runner.run(&commands::enable_mouse()).await?;
        Ok(())
    }

    /// The first window exists with the session and is renamed instead.
    async fn add_window(
        &self,
        session: &str,
        position: usize,
        window_index: u32,
        name: &str,
    ) -> Result<()> {
        let command = if position == 0 {
            commands::rename_window(session, window_index, name)
        } else {
            commands::new_window(session, name)
        };
        self.runner.run(&command).await?;
        Ok(())
    }

    fn attach(&self, session: &str) -> Result<()> {
        self.runner.open_terminal(&commands::attach(session))
    }
}

fn transition(session: &str, state: &mut SessionState, next: SessionState) {
    debug!("tmux session {}: {:?} -> {:?}", session, state, next);
    *state = next;
}
