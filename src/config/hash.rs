//! Configuration hashing for change detection.
//!
//! A record is hashed over its canonical JSON form: object keys sorted,
//! no insignificant whitespace. The resulting SHA-256 hex digest is the only
//! identity used to decide whether an egg changed since its last deployment.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::trace;

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Serializes a record to canonical JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    pub fn canonical_json<T: Serialize>(&self, record: &T) -> serde_json::Result<Vec<u8>> {
        // Map keys come out sorted because serde_json::Map is a BTreeMap.
        let value = serde_json::to_value(record)?;
        serde_json::to_vec(&value)
    }

    /// Computes the hex SHA-256 of a record's canonical JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    pub fn hash<T: Serialize>(&self, record: &T) -> serde_json::Result<String> {
        let bytes = self.canonical_json(record)?;
        let digest = hex::encode(Sha256::digest(&bytes));
        trace!("Hashed {} canonical bytes to {}", bytes.len(), self.short_hash(&digest));
        Ok(digest)
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CloudConfig, CloudProvider, EggConfig, GitLabConfig, ResourceConfig, RunnerConfig,
        RunnerKind,
    };
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn create_test_egg(name: &str) -> EggConfig {
        EggConfig {
            name: name.to_string(),
            runner_type: RunnerKind::Vm,
            cloud: CloudConfig {
                provider: CloudProvider::Yandex,
                region: String::from("ru-central1-a"),
            },
            resources: ResourceConfig {
                cpu: 2,
                memory: 4096,
                disk: 20,
            },
            runner: RunnerConfig {
                tags: vec![String::from("docker")],
                concurrent: 3,
                idle_timeout: None,
            },
            gitlab: GitLabConfig {
                project_id: 12345,
                server_name: String::from("gitlab.com"),
                token_secret: String::from("yc-lockbox://gitlab/runner-token"),
            },
            environment: BTreeMap::new(),
        }
    }

    #[test]
    fn test_egg_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let egg = create_test_egg("my-app");

        let hash1 = hasher.hash(&egg).unwrap();
        let hash2 = hasher.hash(&egg.clone()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_eggs_different_hash() {
        let hasher = ConfigHasher::new();
        let mut changed = create_test_egg("my-app");
        changed.resources.cpu = 4;

        assert_ne!(
            hasher.hash(&create_test_egg("my-app")).unwrap(),
            hasher.hash(&changed).unwrap()
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let hasher = ConfigHasher::new();
        let json = String::from_utf8(hasher.canonical_json(&create_test_egg("a")).unwrap()).unwrap();

        assert!(json.starts_with("{\"cloud\":"));
        assert!(!json.contains(' '));
        assert!(json.find("\"gitlab\"") < json.find("\"name\""));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let full_hash = "abcdef1234567890abcdef1234567890";
        let short = hasher.short_hash(full_hash);

        assert_eq!(short, "abcdef12");
        assert_eq!(short.len(), 8);
    }

    fn arb_egg() -> impl Strategy<Value = EggConfig> {
        (
            "[a-z][a-z0-9-]{0,10}",
            1u32..=128,
            512u32..=65_536,
            prop::collection::vec("[a-z]{1,8}", 0..4),
            prop::collection::vec(("[A-Z_]{1,8}", "[ -~]{0,12}"), 0..4),
        )
            .prop_map(|(name, cpu, memory, tags, env)| {
                let mut egg = create_test_egg(&name);
                egg.resources.cpu = cpu;
                egg.resources.memory = memory;
                egg.runner.tags = tags;
                egg.environment = env.into_iter().collect();
                egg
            })
    }

    proptest! {
        #[test]
        fn prop_hash_is_stable_over_canonical_form(egg in arb_egg()) {
            let hasher = ConfigHasher::new();
            let digest = hasher.hash(&egg).unwrap();

            prop_assert_eq!(digest.len(), 64);
            prop_assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

            let canonical: serde_json::Value =
                serde_json::from_slice(&hasher.canonical_json(&egg).unwrap()).unwrap();
            prop_assert_eq!(hasher.hash(&canonical).unwrap(), digest.clone());
            prop_assert_eq!(hasher.hash(&egg.clone()).unwrap(), digest);
        }

        #[test]
        fn prop_hash_changes_with_resources(egg in arb_egg(), delta in 1u32..64) {
            let hasher = ConfigHasher::new();
            let mut changed = egg.clone();
            changed.resources.cpu += delta;

            prop_assert_ne!(hasher.hash(&egg).unwrap(), hasher.hash(&changed).unwrap());
        }
    }
}
