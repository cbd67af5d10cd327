//! Opening a visible terminal window on the operator machine

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LinkError, Result};
use crate::ssh::SshConfig;

/// Terminal emulator used for interactive windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalLauncher {
    #[serde(default = "default_program")]
    pub program: String,
    /// Shell kept open after the command exits
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_program() -> String {
    "gnome-terminal".to_string()
}

fn default_shell() -> String {
    "bash".to_string()
}

impl Default for TerminalLauncher {
    fn default() -> Self {
        Self {
            program: default_program(),
            shell: default_shell(),
        }
    }
}

impl TerminalLauncher {
    /// Argument vector for a terminal running `command`, over SSH when
    /// `remote` is given. The window drops to an interactive shell once the
    /// command ends.
    pub fn argv(&self, command: Option<&str>, remote: Option<&SshConfig>) -> Vec<String> {
        let Some(command) = command else {
            return vec![self.program.clone()];
        };

        let script = match remote {
            Some(config) => {
                let port = if config.port == 22 {
                    String::new()
                } else {
                    format!(" -p {}", config.port)
                };
                format!(
                    "ssh -t{} {}@{} {}; exec {}",
                    port,
                    config.username,
                    config.host,
                    single_quote(command),
                    self.shell
                )
            }
            None => format!("{}; exec {}", command, self.shell),
        };

        vec![
            self.program.clone(),
            "--".to_string(),
            self.shell.clone(),
            "-c".to_string(),
            script,
        ]
    }

    /// Spawn the terminal and return without waiting for it.
    pub fn spawn(&self, command: Option<&str>, remote: Option<&SshConfig>) -> Result<()> {
        let argv = self.argv(command, remote);
        info!("Opening terminal: {}", argv.join(" "));

        let mut cmd = std::process::Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(home) = dirs::home_dir() {
            cmd.current_dir(home);
        }
        cmd.spawn().map_err(|e| LinkError::io(&self.program, e))?;
        Ok(())
    }
}

/// POSIX single-quoting
fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_terminal() {
        let t = TerminalLauncher::default();
        assert_eq!(t.argv(None, None), vec!["gnome-terminal"]);
    }

    #[test]
    fn test_local_command_keeps_shell_open() {
        let t = TerminalLauncher::default();
        assert_eq!(
            t.argv(Some("htop"), None),
            vec!["gnome-terminal", "--", "bash", "-c", "htop; exec bash"]
        );
    }

    #[test]
    fn test_remote_command_goes_through_ssh() {
        let t = TerminalLauncher::default();
        let config = SshConfig::new("10.0.0.2", "pi");
        let argv = t.argv(Some("tmux attach -t \"companion\""), Some(&config));
        assert_eq!(
            argv[4],
            "ssh -t pi@10.0.0.2 'tmux attach -t \"companion\"'; exec bash"
        );

        let mut config = config;
        config.port = 2222;
        let argv = t.argv(Some("echo 'hi'"), Some(&config));
        assert_eq!(argv[4], r"ssh -t -p 2222 pi@10.0.0.2 'echo '\''hi'\'''; exec bash");
    }
}
