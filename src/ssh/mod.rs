//! SSH transport
//!
//! Connection setup, host key checks, authentication and the single-owner
//! handle task that exec and SFTP channels are opened through.

mod agent;
mod client;
mod config;
mod error;
mod exec;
mod handle_owner;
mod known_hosts;

pub use agent::{is_agent_available, SshAgentClient};
pub use client::{ClientHandler, SshClient};
pub use config::{AuthMethod, HostKeyPolicy, SshConfig, DEFAULT_CONNECT_TIMEOUT_SECS};
pub use error::SshError;
pub use exec::{exec_collect, ExecOutput};
pub use handle_owner::{spawn_handle_owner_task, HandleCommand, HandleController, PingResult};
pub use known_hosts::{HostKeyVerification, KnownHostsStore};
