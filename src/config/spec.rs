//! Domain records produced from validated Fly blocks.
//!
//! These are the only shapes the hasher and the API client see. They are
//! plain values: conversion builds them once and nothing mutates them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::duration::{nanos, option_nanos};

/// How runners for an egg are hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// Long-lived virtual machines.
    Vm,
    /// Functions started on demand.
    Serverless,
}

impl RunnerKind {
    /// Every accepted spelling, in display order.
    pub const ALL: &'static [&'static str] = &["vm", "serverless"];

    /// Returns the configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vm => "vm",
            Self::Serverless => "serverless",
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vm" => Ok(Self::Vm),
            "serverless" => Ok(Self::Serverless),
            other => Err(format!("runner type must be vm or serverless, got \"{other}\"")),
        }
    }
}

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// Yandex Cloud.
    Yandex,
    /// Amazon Web Services.
    Aws,
}

impl CloudProvider {
    /// Every accepted spelling, in display order.
    pub const ALL: &'static [&'static str] = &["yandex", "aws"];

    /// Returns the configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yandex => "yandex",
            Self::Aws => "aws",
        }
    }

    /// Region used by templates when none is given.
    #[must_use]
    pub const fn default_region(self) -> &'static str {
        match self {
            Self::Yandex => "ru-central1-a",
            Self::Aws => "us-east-1",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yandex" => Ok(Self::Yandex),
            "aws" => Ok(Self::Aws),
            other => Err(format!("cloud provider must be yandex or aws, got \"{other}\"")),
        }
    }
}

/// Where runners are placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Cloud provider.
    pub provider: CloudProvider,
    /// Region or zone identifier.
    pub region: String,
}

/// Compute resources per runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Virtual CPU count.
    pub cpu: u32,
    /// Memory in MiB.
    pub memory: u32,
    /// Disk in GiB.
    pub disk: u32,
}

/// GitLab runner registration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Job tags the runner accepts.
    pub tags: Vec<String>,
    /// Maximum concurrent jobs.
    pub concurrent: u32,
    /// How long an idle runner is kept.
    #[serde(default, with = "option_nanos", skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<Duration>,
}

/// GitLab project binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// Numeric project ID.
    pub project_id: u64,
    /// GitLab server host name.
    pub server_name: String,
    /// URI of the secret holding the registration token.
    pub token_secret: String,
}

/// A single managed runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EggConfig {
    /// Egg name.
    pub name: String,
    /// Runner hosting kind.
    #[serde(rename = "type")]
    pub runner_type: RunnerKind,
    /// Placement.
    pub cloud: CloudConfig,
    /// Compute resources.
    pub resources: ResourceConfig,
    /// Runner settings.
    pub runner: RunnerConfig,
    /// GitLab binding.
    pub gitlab: GitLabConfig,
    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

/// A repository served by an eggs bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Repository name, unique within the bucket.
    pub name: String,
    /// GitLab binding for this repository.
    pub gitlab: GitLabConfig,
}

/// A group of repositories sharing one runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EggsBucketConfig {
    /// Bucket name.
    pub name: String,
    /// Runner hosting kind.
    #[serde(rename = "type")]
    pub runner_type: RunnerKind,
    /// Placement.
    pub cloud: CloudConfig,
    /// Compute resources.
    pub resources: ResourceConfig,
    /// Runner settings.
    pub runner: RunnerConfig,
    /// Served repositories.
    pub repositories: Vec<Repository>,
    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl EggsBucketConfig {
    /// Name of the egg generated for one repository.
    #[must_use]
    pub fn egg_name_for(&self, repository: &Repository) -> String {
        format!("{}-{}", self.name, repository.name)
    }

    /// Splits the bucket into one egg per repository.
    #[must_use]
    pub fn expand(&self) -> Vec<EggConfig> {
        self.repositories
            .iter()
            .map(|repo| EggConfig {
                name: self.egg_name_for(repo),
                runner_type: self.runner_type,
                cloud: self.cloud.clone(),
                resources: self.resources,
                runner: self.runner.clone(),
                gitlab: repo.gitlab.clone(),
                environment: self.environment.clone(),
            })
            .collect()
    }
}

/// Deployment-ready virtual machine runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Owning egg.
    pub egg_name: String,
    /// Placement.
    pub cloud: CloudConfig,
    /// Compute resources.
    pub resources: ResourceConfig,
    /// Runner settings.
    pub runner: RunnerConfig,
    /// GitLab binding.
    pub gitlab: GitLabConfig,
    /// Extra environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Deployment-ready serverless runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerlessConfig {
    /// Owning egg.
    pub egg_name: String,
    /// Placement.
    pub cloud: CloudConfig,
    /// Compute resources.
    pub resources: ResourceConfig,
    /// Runner settings.
    pub runner: RunnerConfig,
    /// GitLab binding.
    pub gitlab: GitLabConfig,
    /// Extra environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Maximum execution time per invocation.
    #[serde(with = "nanos")]
    pub timeout: Duration,
}

/// Either projection of an egg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentTarget {
    /// Virtual machine runner.
    Vm(VmConfig),
    /// Serverless runner.
    Serverless(ServerlessConfig),
}

impl DeploymentTarget {
    /// Name of the owning egg.
    #[must_use]
    pub fn egg_name(&self) -> &str {
        match self {
            Self::Vm(vm) => &vm.egg_name,
            Self::Serverless(f) => &f.egg_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_gitlab(project_id: u64) -> GitLabConfig {
        GitLabConfig {
            project_id,
            server_name: String::from("gitlab.com"),
            token_secret: format!("yc-lockbox://gitlab/{project_id}"),
        }
    }

    #[test]
    fn test_enum_spellings() {
        assert_eq!("vm".parse::<RunnerKind>().unwrap(), RunnerKind::Vm);
        assert!("container".parse::<RunnerKind>().is_err());
        assert_eq!("aws".parse::<CloudProvider>().unwrap(), CloudProvider::Aws);
        assert_eq!(CloudProvider::Aws.default_region(), "us-east-1");
        assert_eq!(
            serde_json::to_string(&RunnerKind::Serverless).unwrap(),
            "\"serverless\""
        );
    }

    #[test]
    fn test_bucket_expansion() {
        let bucket = EggsBucketConfig {
            name: String::from("frontend"),
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
                tags: vec![String::from("node")],
                concurrent: 2,
                idle_timeout: None,
            },
            repositories: vec![
                Repository {
                    name: String::from("web"),
                    gitlab: sample_gitlab(1),
                },
                Repository {
                    name: String::from("admin"),
                    gitlab: sample_gitlab(2),
                },
            ],
            environment: BTreeMap::new(),
        };

        let eggs = bucket.expand();
        assert_eq!(eggs.len(), 2);
        assert_eq!(eggs[0].name, "frontend-web");
        assert_eq!(eggs[1].gitlab.project_id, 2);
        assert_eq!(eggs[1].resources, bucket.resources);
    }

    #[test]
    fn test_idle_timeout_wire_format() {
        let runner = RunnerConfig {
            tags: vec![],
            concurrent: 1,
            idle_timeout: Some(Duration::from_secs(600)),
        };
        let json = serde_json::to_value(&runner).unwrap();
        assert_eq!(json["idle_timeout"], serde_json::json!(600_000_000_000_u64));
        let back: RunnerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, runner);
    }
}
