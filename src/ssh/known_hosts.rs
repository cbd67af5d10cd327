//! known_hosts lookups for host key verification
//!
//! Only plain (unhashed) host patterns are understood. Hashed `|1|` entries
//! are skipped, so such hosts are reported as unknown.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::RwLock;
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::error::SshError;

/// Result of host key verification
#[derive(Debug, Clone, PartialEq)]
pub enum HostKeyVerification {
    Verified,
    /// Host (or this key type for the host) not recorded yet
    Unknown { fingerprint: String },
    /// Recorded key differs
    Changed {
        expected_fingerprint: String,
        actual_fingerprint: String,
    },
}

#[derive(Clone, Debug)]
struct KnownKey {
    key_type: String,
    key_data: String,
}

/// In-memory view of one known_hosts file
pub struct KnownHostsStore {
    hosts: RwLock<HashMap<String, Vec<KnownKey>>>,
    path: PathBuf,
}

impl KnownHostsStore {
    /// `~/.ssh/known_hosts`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".ssh").join("known_hosts"))
            .unwrap_or_else(|| PathBuf::from(".ssh/known_hosts"))
    }

    /// Load the store from `path`. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self {
            hosts: RwLock::new(HashMap::new()),
            path: path.into(),
        };

        if let Err(e) = store.load() {
            warn!("Failed to load known_hosts {:?}: {}", store.path, e);
        }

        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<(), SshError> {
        if !self.path.exists() {
            debug!("No known_hosts file at {:?}", self.path);
            return Ok(());
        }

        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut hosts = self.hosts.write();
        let mut count = 0usize;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('@') {
                continue;
            }

            // hostname[,alias] keytype base64key [comment]
            let mut parts = line.split_whitespace();
            let (Some(patterns), Some(key_type), Some(key_data)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };

            for pattern in patterns.split(',') {
                if pattern.starts_with('|') {
                    continue;
                }
                hosts
                    .entry(Self::normalize_pattern(pattern))
                    .or_default()
                    .push(KnownKey {
                        key_type: key_type.to_string(),
                        key_data: key_data.to_string(),
                    });
                count += 1;
            }
        }

        debug!("Loaded {} known host entries from {:?}", count, self.path);
        Ok(())
    }

    /// `[host]:22` and `host` are the same entry; other ports keep brackets.
    fn normalize_pattern(pattern: &str) -> String {
        let pattern = pattern.to_lowercase();
        match pattern.strip_prefix('[').and_then(|p| p.split_once("]:")) {
            Some((host, "22")) => host.to_string(),
            _ => pattern,
        }
    }

    fn make_key(host: &str, port: u16) -> String {
        let host = host.to_lowercase();
        if port == 22 {
            host
        } else {
            format!("[{}]:{}", host, port)
        }
    }

    /// SHA256 fingerprint in OpenSSH notation
    pub fn fingerprint(key: &PublicKey) -> String {
        Self::fingerprint_bytes(&key.public_key_bytes())
    }

    fn fingerprint_bytes(bytes: &[u8]) -> String {
        let hash = Sha256::digest(bytes);
        format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
    }

    fn fingerprint_b64(key_data: &str) -> String {
        BASE64
            .decode(key_data)
            .map(|bytes| Self::fingerprint_bytes(&bytes))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyVerification {
        let key_data = BASE64.encode(key.public_key_bytes());
        self.verify_encoded(host, port, key.algorithm().as_str(), &key_data)
    }

    /// Verification against an already encoded key (`ssh-ed25519`, base64 blob).
    pub fn verify_encoded(
        &self,
        host: &str,
        port: u16,
        key_type: &str,
        key_data: &str,
    ) -> HostKeyVerification {
        let lookup = Self::make_key(host, port);
        let fingerprint = Self::fingerprint_b64(key_data);
        let hosts = self.hosts.read();

        let Some(entries) = hosts.get(&lookup) else {
            debug!("Unknown host: {}", lookup);
            return HostKeyVerification::Unknown { fingerprint };
        };

        match entries.iter().find(|e| e.key_type == key_type) {
            Some(entry) if entry.key_data == key_data => {
                debug!("Host key verified for {} ({})", lookup, key_type);
                HostKeyVerification::Verified
            }
            Some(entry) => {
                let expected_fingerprint = Self::fingerprint_b64(&entry.key_data);
                warn!(
                    "HOST KEY CHANGED for {} ({})! Expected {}, got {}",
                    lookup, key_type, expected_fingerprint, fingerprint
                );
                HostKeyVerification::Changed {
                    expected_fingerprint,
                    actual_fingerprint: fingerprint,
                }
            }
            None => {
                debug!("Host {} known but no {} key stored", lookup, key_type);
                HostKeyVerification::Unknown { fingerprint }
            }
        }
    }

    pub fn add_host(&self, host: &str, port: u16, key: &PublicKey) -> Result<(), SshError> {
        let key_data = BASE64.encode(key.public_key_bytes());
        self.add_encoded(host, port, key.algorithm().as_str(), &key_data)
    }

    /// Record a key in memory and append it to the file.
    pub fn add_encoded(
        &self,
        host: &str,
        port: u16,
        key_type: &str,
        key_data: &str,
    ) -> Result<(), SshError> {
        let lookup = Self::make_key(host, port);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{} {} {}", lookup, key_type, key_data)?;

        self.hosts.write().entry(lookup.clone()).or_default().push(KnownKey {
            key_type: key_type.to_string(),
            key_data: key_data.to_string(),
        });

        info!("Added {} host key for {} to {:?}", key_type, lookup, self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const KEY_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIGVkMjU1MTlrZXlhYWFhYWFhYWFhYWFhYWFhYWFhYQ==";
    const KEY_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIGVkMjU1MTlrZXliYmJiYmJiYmJiYmJiYmJiYmJiYg==";

    #[test]
    fn test_normalize_pattern() {
        assert_eq!(KnownHostsStore::normalize_pattern("Pi.local"), "pi.local");
        assert_eq!(KnownHostsStore::normalize_pattern("[pi.local]:22"), "pi.local");
        assert_eq!(
            KnownHostsStore::normalize_pattern("[pi.local]:2222"),
            "[pi.local]:2222"
        );
    }

    #[test]
    fn test_make_key() {
        assert_eq!(KnownHostsStore::make_key("10.0.0.2", 22), "10.0.0.2");
        assert_eq!(KnownHostsStore::make_key("10.0.0.2", 2222), "[10.0.0.2]:2222");
    }

    #[test]
    fn test_unknown_then_verified_after_add() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ssh").join("known_hosts");
        let store = KnownHostsStore::open(&path);

        assert!(matches!(
            store.verify_encoded("10.0.0.2", 22, "ssh-ed25519", KEY_A),
            HostKeyVerification::Unknown { .. }
        ));

        store.add_encoded("10.0.0.2", 22, "ssh-ed25519", KEY_A).unwrap();
        assert_eq!(
            store.verify_encoded("10.0.0.2", 22, "ssh-ed25519", KEY_A),
            HostKeyVerification::Verified
        );

        // Reloading from disk sees the appended line
        let reloaded = KnownHostsStore::open(&path);
        assert_eq!(
            reloaded.verify_encoded("10.0.0.2", 22, "ssh-ed25519", KEY_A),
            HostKeyVerification::Verified
        );
    }

    #[test]
    fn test_changed_key_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        fs::write(
            &path,
            format!("# comment\n[pi.local]:2222,10.0.0.9 ssh-ed25519 {} pi\n", KEY_A),
        )
        .unwrap();
        let store = KnownHostsStore::open(&path);

        assert_eq!(
            store.verify_encoded("10.0.0.9", 22, "ssh-ed25519", KEY_A),
            HostKeyVerification::Verified
        );
        match store.verify_encoded("pi.local", 2222, "ssh-ed25519", KEY_B) {
            HostKeyVerification::Changed {
                expected_fingerprint,
                actual_fingerprint,
            } => assert_ne!(expected_fingerprint, actual_fingerprint),
            other => panic!("expected Changed, got {:?}", other),
        }
        // Same host on the default port was never recorded
        assert!(matches!(
            store.verify_encoded("pi.local", 22, "ssh-ed25519", KEY_A),
            HostKeyVerification::Unknown { .. }
        ));
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = KnownHostsStore::fingerprint_b64(KEY_A);
        assert!(fp.starts_with("SHA256:"));
        assert!(!fp.ends_with('='));
        assert_eq!(KnownHostsStore::fingerprint_b64("not base64!"), "unknown");
    }
}
