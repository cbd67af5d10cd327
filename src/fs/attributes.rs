//! File metadata and its human-readable rendering

use std::fmt;

use chrono::{Local, TimeZone};
use serde::Serialize;

/// Raw metadata of a file or directory, the same shape on both backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAttributes {
    /// Full `st_mode`, type bits included
    pub mode: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    /// Seconds since the epoch
    pub accessed: i64,
    pub modified: i64,
}

/// Attribute view for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HumanAttributes {
    /// `ls -l` style, e.g. `-rw-r--r--`
    pub mode: String,
    pub size: String,
    pub uid: u32,
    pub gid: u32,
    pub accessed: String,
    pub modified: String,
}

impl FileAttributes {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn human_readable(&self) -> HumanAttributes {
        HumanAttributes {
            mode: mode_string(self.mode),
            size: HumanSize(self.size).to_string(),
            uid: self.uid,
            gid: self.gid,
            accessed: format_time(self.accessed),
            modified: format_time(self.modified),
        }
    }
}

/// Byte count rendered in B, KB, MB or GB (powers of 1024, two decimals
/// above bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanSize(pub u64);

impl fmt::Display for HumanSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KB: f64 = 1024.0;
        const MB: f64 = KB * 1024.0;
        const GB: f64 = MB * 1024.0;

        let bytes = self.0 as f64;
        if bytes < KB {
            write!(f, "{} B", self.0)
        } else if bytes < MB {
            write!(f, "{:.2} KB", bytes / KB)
        } else if bytes < GB {
            write!(f, "{:.2} MB", bytes / MB)
        } else {
            write!(f, "{:.2} GB", bytes / GB)
        }
    }
}

const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

/// Ten-character permission string including setuid/setgid/sticky bits.
pub fn mode_string(mode: u32) -> String {
    let kind = match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFLNK => 'l',
        S_IFREG => '-',
        S_IFCHR => 'c',
        S_IFBLK => 'b',
        S_IFIFO => 'p',
        S_IFSOCK => 's',
        _ => '?',
    };

    let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };
    let exec = |x: u32, special: u32, set: char, unset: char| match (mode & x != 0, mode & special != 0) {
        (true, true) => set,
        (false, true) => unset,
        (true, false) => 'x',
        (false, false) => '-',
    };

    [
        kind,
        bit(0o400, 'r'),
        bit(0o200, 'w'),
        exec(0o100, 0o4000, 's', 'S'),
        bit(0o040, 'r'),
        bit(0o020, 'w'),
        exec(0o010, 0o2000, 's', 'S'),
        bit(0o004, 'r'),
        bit(0o002, 'w'),
        exec(0o001, 0o1000, 't', 'T'),
    ]
    .iter()
    .collect()
}

/// Local time in `ctime` layout, e.g. `Mon Jan  5 14:03:09 2026`.
pub fn format_time(epoch_secs: i64) -> String {
    match Local.timestamp_opt(epoch_secs, 0).single() {
        Some(t) => t.format("%a %b %e %H:%M:%S %Y").to_string(),
        None => epoch_secs.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size_units() {
        assert_eq!(HumanSize(0).to_string(), "0 B");
        assert_eq!(HumanSize(500).to_string(), "500 B");
        assert_eq!(HumanSize(1023).to_string(), "1023 B");
        assert_eq!(HumanSize(2048).to_string(), "2.00 KB");
        assert_eq!(HumanSize(600 + 1500).to_string(), "2.05 KB");
        assert_eq!(HumanSize(5 * 1024 * 1024).to_string(), "5.00 MB");
        assert_eq!(HumanSize(3 * 1024 * 1024 * 1024).to_string(), "3.00 GB");
    }

    #[test]
    fn test_mode_string() {
        assert_eq!(mode_string(0o100644), "-rw-r--r--");
        assert_eq!(mode_string(0o040755), "drwxr-xr-x");
        assert_eq!(mode_string(0o120777), "lrwxrwxrwx");
        assert_eq!(mode_string(0o104755), "-rwsr-xr-x");
        assert_eq!(mode_string(0o041777), "drwxrwxrwt");
        assert_eq!(mode_string(0o100600 | 0o2000), "-rw---S---");
    }

    #[test]
    fn test_human_readable_view() {
        let attrs = FileAttributes {
            mode: 0o040700,
            size: 4096,
            uid: 1000,
            gid: 1000,
            accessed: 0,
            modified: 0,
        };
        assert!(attrs.is_dir());
        let human = attrs.human_readable();
        assert_eq!(human.mode, "drwx------");
        assert_eq!(human.size, "4.00 KB");
        assert_eq!(human.uid, 1000);
        assert!(human.modified.contains("1970") || human.modified.contains("1969"));
    }
}
