//! tmux command lines
//!
//! Every string built here is run through a shell on the target backend,
//! so names and keystrokes are double-quoted with shell metacharacters
//! escaped.

/// Double-quote `s` for a POSIX shell.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub fn has_session(session: &str) -> String {
    format!("tmux has-session -t {}", quote(session))
}

pub fn new_session(session: &str) -> String {
    format!("tmux new-session -d -s {}", quote(session))
}

pub fn enable_mouse() -> String {
    "tmux set -g mouse on".to_string()
}

pub fn rename_window(session: &str, window_index: u32, name: &str) -> String {
    format!(
        "tmux rename-window -t {} {}",
        quote(&format!("{}:{}", session, window_index)),
        quote(name)
    )
}

pub fn new_window(session: &str, name: &str) -> String {
    format!("tmux new-window -t {} -n {}", quote(session), quote(name))
}

/// Horizontal split of a window
pub fn split_window(session: &str, window_index: u32) -> String {
    format!(
        "tmux split-window -t {} -h",
        quote(&format!("{}:{}", session, window_index))
    )
}

pub fn select_tiled(session: &str, window_index: u32) -> String {
    format!("tmux select-layout -t {}:{} tiled", session, window_index)
}

/// Type `keys` into a pane and press Enter.
pub fn send_keys(session: &str, window_index: u32, pane_index: u32, keys: &str) -> String {
    format!(
        "tmux send-keys -t {} {} C-m",
        quote(&format!("{}:{}.{}", session, window_index, pane_index)),
        quote(keys)
    )
}

pub fn attach(session: &str) -> String {
    format!("tmux attach -t {}", quote(session))
}

pub fn kill_session(session: &str) -> String {
    format!("tmux kill-session -t {}", quote(session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_text() {
        assert_eq!(has_session("companion"), r#"tmux has-session -t "companion""#);
        assert_eq!(new_session("companion"), r#"tmux new-session -d -s "companion""#);
        assert_eq!(
            rename_window("companion", 1, "sensors"),
            r#"tmux rename-window -t "companion:1" "sensors""#
        );
        assert_eq!(
            new_window("companion", "nav"),
            r#"tmux new-window -t "companion" -n "nav""#
        );
        assert_eq!(
            split_window("companion", 2),
            r#"tmux split-window -t "companion:2" -h"#
        );
        assert_eq!(select_tiled("companion", 2), "tmux select-layout -t companion:2 tiled");
        assert_eq!(
            send_keys("companion", 1, 3, "ros2 run demo talker"),
            r#"tmux send-keys -t "companion:1.3" "ros2 run demo talker" C-m"#
        );
        assert_eq!(attach("companion"), r#"tmux attach -t "companion""#);
        assert_eq!(kill_session("companion"), r#"tmux kill-session -t "companion""#);
    }

    #[test]
    fn test_quote_escapes_shell_metacharacters() {
        assert_eq!(quote(r#"echo "$HOME" `id` \n"#), r#""echo \"\$HOME\" \`id\` \\n""#);
        assert_eq!(quote("plain"), "\"plain\"");
    }
}
