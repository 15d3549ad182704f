//! Projection of validated Fly blocks into domain records.
//!
//! Conversion is a set of pure functions. Each one either returns a fully
//! built record or a [`ConvertError`] naming the offending field. Cloud
//! provider rules that need typed values (CPU parity, memory per core,
//! allowed zones) are enforced here rather than in the validator.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use tracing::debug;

use crate::error::ConvertError;
use crate::fly::{Block, Config, Value};

use super::duration::{format_duration, parse_duration};
use super::spec::{
    CloudConfig, CloudProvider, DeploymentTarget, EggConfig, EggsBucketConfig, GitLabConfig,
    Repository, ResourceConfig, RunnerConfig, RunnerKind, ServerlessConfig, VmConfig,
};

/// Availability zones accepted for Yandex Cloud virtual machines.
pub const YANDEX_ZONES: &[&str] = &["ru-central1-a", "ru-central1-b", "ru-central1-c"];

/// Regions accepted for AWS virtual machines.
pub const AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-central-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
];

/// Memory sizes (MiB) accepted by Yandex Cloud Functions.
pub const YANDEX_SERVERLESS_MEMORY: &[u32] = &[128, 256, 512, 1024, 2048, 4096];

/// Memory range (MiB) accepted by AWS Lambda.
pub const AWS_LAMBDA_MEMORY: std::ops::RangeInclusive<u32> = 128..=10_240;

/// Execution ceiling applied to every serverless runner.
pub const SERVERLESS_TIMEOUT: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// Blocks to records
// ============================================================================

/// Converts an `egg` block into an [`EggConfig`].
///
/// The egg name is the block label.
///
/// # Errors
///
/// Returns an error if the block is not an `egg`, if a required attribute or
/// nested block is missing, or if a value has the wrong kind or is unusable.
pub fn egg_from_block(block: &Block) -> Result<EggConfig, ConvertError> {
    expect_block_type(block, "egg")?;

    let egg = EggConfig {
        name: block_name(block)?,
        runner_type: runner_kind(block)?,
        cloud: cloud(required_block(block, "cloud")?)?,
        resources: resources(required_block(block, "resources")?)?,
        runner: runner(required_block(block, "runner")?)?,
        gitlab: gitlab(required_block(block, "gitlab")?)?,
        environment: environment(block)?,
    };

    debug!("Converted egg {} ({})", egg.name, egg.runner_type);
    Ok(egg)
}

/// Converts an `eggsbucket` block into an [`EggsBucketConfig`].
///
/// # Errors
///
/// Returns an error under the same conditions as [`egg_from_block`], and
/// when two repositories share a name.
pub fn bucket_from_block(block: &Block) -> Result<EggsBucketConfig, ConvertError> {
    expect_block_type(block, "eggsbucket")?;

    let name = block_name(block)?;
    let repositories_block = required_block(block, "repositories")?;

    let mut seen = HashSet::new();
    let mut repositories = Vec::new();
    for repo in repositories_block.blocks_of("repo") {
        let repo_name = block_name(repo)?;
        if !seen.insert(repo_name.clone()) {
            return Err(ConvertError::DuplicateRepository {
                bucket: name,
                name: repo_name,
            });
        }
        repositories.push(Repository {
            name: repo_name,
            gitlab: gitlab(required_block(repo, "gitlab")?)?,
        });
    }

    let bucket = EggsBucketConfig {
        name,
        runner_type: runner_kind(block)?,
        cloud: cloud(required_block(block, "cloud")?)?,
        resources: resources(required_block(block, "resources")?)?,
        runner: runner(required_block(block, "runner")?)?,
        repositories,
        environment: environment(block)?,
    };

    debug!(
        "Converted eggsbucket {} with {} repositories",
        bucket.name,
        bucket.repositories.len()
    );
    Ok(bucket)
}

/// Collects every egg a document defines.
///
/// `egg` blocks convert directly; `eggsbucket` blocks expand into one egg per
/// repository. Other block types are ignored.
///
/// # Errors
///
/// Returns the first conversion error.
pub fn eggs_from_config(config: &Config) -> Result<Vec<EggConfig>, ConvertError> {
    let mut eggs = Vec::new();
    for block in &config.blocks {
        match block.block_type.as_str() {
            "egg" => eggs.push(egg_from_block(block)?),
            "eggsbucket" => eggs.extend(bucket_from_block(block)?.expand()),
            _ => {}
        }
    }
    Ok(eggs)
}

// ============================================================================
// Records to deployment targets
// ============================================================================

/// Projects a `vm` egg into a [`VmConfig`].
///
/// # Errors
///
/// Returns an error if the egg is not a VM egg or breaks a cloud rule.
pub fn egg_to_vm(egg: &EggConfig) -> Result<VmConfig, ConvertError> {
    expect_kind(egg.runner_type, RunnerKind::Vm)?;
    check_vm_rules(&egg.cloud, &egg.resources)?;

    Ok(VmConfig {
        egg_name: egg.name.clone(),
        cloud: egg.cloud.clone(),
        resources: egg.resources,
        runner: egg.runner.clone(),
        gitlab: egg.gitlab.clone(),
        environment: egg.environment.clone(),
    })
}

/// Projects a `serverless` egg into a [`ServerlessConfig`].
///
/// The timeout is always [`SERVERLESS_TIMEOUT`].
///
/// # Errors
///
/// Returns an error if the egg is not a serverless egg or breaks a cloud rule.
pub fn egg_to_serverless(egg: &EggConfig) -> Result<ServerlessConfig, ConvertError> {
    expect_kind(egg.runner_type, RunnerKind::Serverless)?;
    check_serverless_rules(&egg.cloud, &egg.resources, SERVERLESS_TIMEOUT)?;

    Ok(ServerlessConfig {
        egg_name: egg.name.clone(),
        cloud: egg.cloud.clone(),
        resources: egg.resources,
        runner: egg.runner.clone(),
        gitlab: egg.gitlab.clone(),
        environment: egg.environment.clone(),
        timeout: SERVERLESS_TIMEOUT,
    })
}

/// Projects an egg according to its declared runner kind.
///
/// # Errors
///
/// Returns an error if the egg breaks a cloud rule for its kind.
pub fn egg_to_target(egg: &EggConfig) -> Result<DeploymentTarget, ConvertError> {
    match egg.runner_type {
        RunnerKind::Vm => egg_to_vm(egg).map(DeploymentTarget::Vm),
        RunnerKind::Serverless => egg_to_serverless(egg).map(DeploymentTarget::Serverless),
    }
}

// ============================================================================
// Cloud rules
// ============================================================================

/// Checks provider constraints for virtual machine runners.
///
/// # Errors
///
/// Returns [`ConvertError::CloudRule`] naming the first field that breaks a
/// constraint.
pub fn check_vm_rules(cloud: &CloudConfig, resources: &ResourceConfig) -> Result<(), ConvertError> {
    let provider = cloud.provider;
    match provider {
        CloudProvider::Yandex => {
            if !YANDEX_ZONES.contains(&cloud.region.as_str()) {
                return Err(cloud_rule(provider, "region", format!("invalid Yandex Cloud zone: {}", cloud.region)));
            }
            if resources.cpu != 1 && resources.cpu % 2 != 0 {
                return Err(cloud_rule(
                    provider,
                    "cpu",
                    format!("Yandex Cloud CPU must be 1 or an even number, got {}", resources.cpu),
                ));
            }
            let min_memory = u64::from(resources.cpu) * 1024;
            if u64::from(resources.memory) < min_memory {
                return Err(cloud_rule(
                    provider,
                    "memory",
                    format!(
                        "Yandex Cloud requires at least 1GB memory per CPU core (min {min_memory} MB for {} CPUs)",
                        resources.cpu
                    ),
                ));
            }
        }
        CloudProvider::Aws => {
            if !AWS_REGIONS.contains(&cloud.region.as_str()) {
                return Err(cloud_rule(provider, "region", format!("invalid AWS region: {}", cloud.region)));
            }
            if resources.memory < 512 {
                return Err(cloud_rule(
                    provider,
                    "memory",
                    format!("AWS requires at least 512MB memory, got {} MB", resources.memory),
                ));
            }
            if resources.disk < 8 {
                return Err(cloud_rule(
                    provider,
                    "disk",
                    format!("AWS requires at least 8GB disk, got {} GB", resources.disk),
                ));
            }
        }
    }
    Ok(())
}

/// Checks provider constraints for serverless runners.
///
/// # Errors
///
/// Returns [`ConvertError::CloudRule`] for unsupported memory sizes or a
/// timeout above 60 minutes.
pub fn check_serverless_rules(
    cloud: &CloudConfig,
    resources: &ResourceConfig,
    timeout: Duration,
) -> Result<(), ConvertError> {
    let provider = cloud.provider;
    let (memory_ok, memory_message, label) = match provider {
        CloudProvider::Yandex => (
            YANDEX_SERVERLESS_MEMORY.contains(&resources.memory),
            format!(
                "Yandex Cloud Functions memory must be one of {YANDEX_SERVERLESS_MEMORY:?} MB, got {} MB",
                resources.memory
            ),
            "Yandex Cloud Functions",
        ),
        CloudProvider::Aws => (
            AWS_LAMBDA_MEMORY.contains(&resources.memory),
            format!(
                "AWS Lambda memory must be between {}MB and {}MB, got {} MB",
                AWS_LAMBDA_MEMORY.start(),
                AWS_LAMBDA_MEMORY.end(),
                resources.memory
            ),
            "AWS Lambda",
        ),
    };

    if !memory_ok {
        return Err(cloud_rule(provider, "memory", memory_message));
    }
    if timeout > SERVERLESS_TIMEOUT {
        return Err(cloud_rule(
            provider,
            "timeout",
            format!("{label} timeout must not exceed 60 minutes, got {}", format_duration(timeout)),
        ));
    }
    Ok(())
}

fn cloud_rule(provider: CloudProvider, field: &str, message: String) -> ConvertError {
    ConvertError::CloudRule {
        provider,
        field: field.to_string(),
        message,
    }
}

// ============================================================================
// Section helpers
// ============================================================================

fn expect_block_type(block: &Block, expected: &str) -> Result<(), ConvertError> {
    if block.block_type == expected {
        Ok(())
    } else {
        Err(ConvertError::WrongBlock {
            expected: expected.to_string(),
            found: block.block_type.clone(),
            position: block.position.clone(),
        })
    }
}

fn expect_kind(found: RunnerKind, expected: RunnerKind) -> Result<(), ConvertError> {
    if found == expected {
        Ok(())
    } else {
        Err(ConvertError::RunnerKindMismatch { expected, found })
    }
}

fn block_name(block: &Block) -> Result<String, ConvertError> {
    match block.labels.as_slice() {
        [name] => Ok(name.clone()),
        _ => Err(ConvertError::InvalidValue {
            field: String::from("name"),
            position: block.position.clone(),
            message: format!("{} block must have exactly one label", block.block_type),
        }),
    }
}

fn runner_kind(block: &Block) -> Result<RunnerKind, ConvertError> {
    let value = required_attr(block, "type")?;
    parse_enum(value, "type")
}

fn cloud(block: &Block) -> Result<CloudConfig, ConvertError> {
    Ok(CloudConfig {
        provider: parse_enum(required_attr(block, "provider")?, "provider")?,
        region: string_attr(block, "region")?,
    })
}

fn resources(block: &Block) -> Result<ResourceConfig, ConvertError> {
    Ok(ResourceConfig {
        cpu: u32_attr(block, "cpu")?,
        memory: u32_attr(block, "memory")?,
        disk: u32_attr(block, "disk")?,
    })
}

fn runner(block: &Block) -> Result<RunnerConfig, ConvertError> {
    let tags = required_attr(block, "tags")?
        .as_list()
        .map_err(|source| type_error("tags", source))?
        .iter()
        .enumerate()
        .map(|(i, tag)| {
            tag.as_str()
                .map(str::to_string)
                .map_err(|source| type_error(&format!("tags[{i}]"), source))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let idle_timeout = match block.attribute("idle_timeout") {
        Some(value) => {
            let text = value.as_str().map_err(|source| type_error("idle_timeout", source))?;
            let duration = parse_duration(text).map_err(|e| ConvertError::InvalidValue {
                field: String::from("idle_timeout"),
                position: value.position.clone(),
                message: e.to_string(),
            })?;
            Some(duration)
        }
        None => None,
    };

    Ok(RunnerConfig {
        tags,
        concurrent: u32_attr(block, "concurrent")?,
        idle_timeout,
    })
}

fn gitlab(block: &Block) -> Result<GitLabConfig, ConvertError> {
    let value = required_attr(block, "project_id")?;
    let number = value.as_number().map_err(|source| type_error("project_id", source))?;
    if number < 1.0 || number.fract() != 0.0 || number > 999_999_999.0 {
        return Err(ConvertError::InvalidValue {
            field: String::from("project_id"),
            position: value.position.clone(),
            message: String::from("must be a positive whole number"),
        });
    }

    Ok(GitLabConfig {
        project_id: value.as_int().map_err(|source| type_error("project_id", source))?.unsigned_abs(),
        server_name: string_attr(block, "server_name")?,
        token_secret: string_attr(block, "token_secret")?,
    })
}

fn environment(block: &Block) -> Result<BTreeMap<String, String>, ConvertError> {
    let Some(environment) = block.block("environment") else {
        return Ok(BTreeMap::new());
    };

    environment
        .attributes
        .iter()
        .map(|(name, value)| {
            value
                .as_str()
                .map(|v| (name.clone(), v.to_string()))
                .map_err(|source| type_error(name, source))
        })
        .collect()
}

// ============================================================================
// Attribute helpers
// ============================================================================

fn required_block<'a>(block: &'a Block, name: &str) -> Result<&'a Block, ConvertError> {
    block.block(name).ok_or_else(|| ConvertError::MissingBlock {
        block: block.block_type.clone(),
        field: name.to_string(),
        position: block.position.clone(),
    })
}

fn required_attr<'a>(block: &'a Block, name: &str) -> Result<&'a Value, ConvertError> {
    block.attribute(name).ok_or_else(|| ConvertError::MissingAttribute {
        block: block.block_type.clone(),
        field: name.to_string(),
        position: block.position.clone(),
    })
}

fn string_attr(block: &Block, name: &str) -> Result<String, ConvertError> {
    required_attr(block, name)?
        .as_str()
        .map(str::to_string)
        .map_err(|source| type_error(name, source))
}

fn u32_attr(block: &Block, name: &str) -> Result<u32, ConvertError> {
    let value = required_attr(block, name)?;
    let n = value.as_int().map_err(|source| type_error(name, source))?;
    u32::try_from(n).map_err(|_| ConvertError::InvalidValue {
        field: name.to_string(),
        position: value.position.clone(),
        message: format!("{n} is out of range"),
    })
}

fn parse_enum<T>(value: &Value, field: &str) -> Result<T, ConvertError>
where
    T: std::str::FromStr<Err = String>,
{
    let text = value.as_str().map_err(|source| type_error(field, source))?;
    text.parse().map_err(|message| ConvertError::InvalidValue {
        field: field.to_string(),
        position: value.position.clone(),
        message,
    })
}

fn type_error(field: &str, source: crate::error::TypeMismatch) -> ConvertError {
    ConvertError::Type {
        field: field.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fly::fixtures::{CANONICAL_EGG, EGGS_BUCKET};
    use crate::fly::{FlyParser, FlyValidator};

    fn egg(src: &str) -> EggConfig {
        let config = FlyParser::parse_str(src, "Eggs/my-app/config.fly").unwrap();
        egg_from_block(&config.blocks[0]).unwrap()
    }

    fn convert_err(src: &str) -> ConvertError {
        let config = FlyParser::parse_str(src, "Eggs/my-app/config.fly").unwrap();
        egg_from_block(&config.blocks[0]).unwrap_err()
    }

    #[test]
    fn test_canonical_egg_to_vm() {
        let vm = egg_to_vm(&egg(CANONICAL_EGG)).unwrap();

        assert_eq!(vm.egg_name, "my-app");
        assert_eq!(vm.cloud.provider, CloudProvider::Yandex);
        assert_eq!(vm.cloud.region, "ru-central1-a");
        assert_eq!(
            vm.resources,
            ResourceConfig {
                cpu: 2,
                memory: 4096,
                disk: 20
            }
        );
        assert_eq!(vm.runner.tags, vec!["docker", "linux"]);
        assert_eq!(vm.runner.concurrent, 3);
        assert_eq!(vm.runner.idle_timeout, None);
        assert_eq!(vm.gitlab.project_id, 12345);
        assert_eq!(vm.gitlab.server_name, "gitlab.com");
        assert_eq!(vm.gitlab.token_secret, "yc-lockbox://gitlab/runner-token");
        assert!(vm.environment.is_empty());
    }

    #[test]
    fn test_vm_egg_rejected_as_serverless() {
        let err = egg_to_serverless(&egg(CANONICAL_EGG)).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::RunnerKindMismatch {
                expected: RunnerKind::Serverless,
                found: RunnerKind::Vm
            }
        ));
        assert_eq!(err.field(), "type");
    }

    #[test]
    fn test_yandex_cpu_parity() {
        let src = CANONICAL_EGG.replace("cpu    = 2", "cpu    = 3").replace("4096", "8192");
        let config = FlyParser::parse_str(&src, "t.fly").unwrap();
        assert!(FlyValidator::new().validate(&config).is_ok());

        let err = egg_to_vm(&egg(&src)).unwrap_err();
        assert_eq!(err.field(), "cpu");
        assert!(err.to_string().contains("1 or an even number"));
    }

    #[test]
    fn test_yandex_memory_per_core_and_zone() {
        let err = egg_to_vm(&egg(&CANONICAL_EGG.replace("4096", "1024"))).unwrap_err();
        assert_eq!(err.field(), "memory");
        assert!(err.to_string().contains("min 2048 MB for 2 CPUs"));

        let err = egg_to_vm(&egg(&CANONICAL_EGG.replace("ru-central1-a", "ru-central1-d"))).unwrap_err();
        assert_eq!(err.to_string(), "region: invalid Yandex Cloud zone: ru-central1-d");
    }

    #[test]
    fn test_aws_vm_rules() {
        let mut aws = egg(CANONICAL_EGG);
        aws.cloud = CloudConfig {
            provider: CloudProvider::Aws,
            region: String::from("eu-west-1"),
        };
        assert!(egg_to_vm(&aws).is_ok());

        aws.resources.disk = 5;
        let err = egg_to_vm(&aws).unwrap_err();
        assert_eq!(err.field(), "disk");
        assert!(err.to_string().contains("at least 8GB disk"));

        aws.resources.disk = 20;
        aws.cloud.region = String::from("mars-north-1");
        assert_eq!(egg_to_vm(&aws).unwrap_err().field(), "region");
    }

    #[test]
    fn test_serverless_bucket_projection() {
        let config = FlyParser::parse_str(EGGS_BUCKET, "Eggs/frontend/config.fly").unwrap();
        let bucket = bucket_from_block(&config.blocks[0]).unwrap();
        assert_eq!(bucket.runner.idle_timeout, Some(Duration::from_secs(15 * 60)));
        assert_eq!(bucket.environment["NODE_ENV"], "production");

        let eggs = bucket.expand();
        let functions: Vec<ServerlessConfig> = eggs
            .iter()
            .map(|egg| match egg_to_target(egg).unwrap() {
                DeploymentTarget::Serverless(function) => function,
                other => panic!("unexpected target: {other:?}"),
            })
            .collect();
        let names: Vec<_> = functions.iter().map(|f| f.egg_name.as_str()).collect();
        assert_eq!(names, vec!["frontend-web", "frontend-admin"]);
        assert_eq!(functions[1].gitlab.project_id, 102);
        assert!(functions.iter().all(|f| f.timeout <= SERVERLESS_TIMEOUT));

        assert!(eggs.iter().all(|egg| egg_to_vm(egg).is_err()));
    }

    #[test]
    fn test_serverless_rules() {
        let yandex = CloudConfig {
            provider: CloudProvider::Yandex,
            region: String::from("ru-central1-a"),
        };
        let mut resources = ResourceConfig {
            cpu: 1,
            memory: 3000,
            disk: 10,
        };
        let err = check_serverless_rules(&yandex, &resources, SERVERLESS_TIMEOUT).unwrap_err();
        assert_eq!(err.field(), "memory");

        resources.memory = 2048;
        assert!(check_serverless_rules(&yandex, &resources, SERVERLESS_TIMEOUT).is_ok());

        let err = check_serverless_rules(&yandex, &resources, Duration::from_secs(61 * 60)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "timeout: Yandex Cloud Functions timeout must not exceed 60 minutes, got 1h1m0s"
        );

        let aws = CloudConfig {
            provider: CloudProvider::Aws,
            region: String::from("us-east-1"),
        };
        resources.memory = 20_000;
        assert!(check_serverless_rules(&aws, &resources, SERVERLESS_TIMEOUT).is_err());
    }

    #[test]
    fn test_bad_idle_timeout_reports_position() {
        let src = CANONICAL_EGG.replace(
            "concurrent = 3",
            "concurrent = 3\n    idle_timeout = \"soon\"",
        );
        let err = convert_err(&src);
        match err {
            ConvertError::InvalidValue { field, position, .. } => {
                assert_eq!(field, "idle_timeout");
                assert_eq!(position.line, 19);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_type_and_missing_errors() {
        let err = convert_err(&CANONICAL_EGG.replace("cpu    = 2", "cpu    = \"two\""));
        assert!(matches!(err, ConvertError::Type { ref field, .. } if field == "cpu"));

        let err = convert_err(&CANONICAL_EGG.replace("    disk   = 20\n", ""));
        assert!(matches!(err, ConvertError::MissingAttribute { ref field, .. } if field == "disk"));
    }

    #[test]
    fn test_eggs_from_config_expands_buckets() {
        let src = format!("{CANONICAL_EGG}\n{EGGS_BUCKET}\njob \"x\" {{\n}}\n");
        let config = FlyParser::parse_str(&src, "t.fly").unwrap();
        let eggs = eggs_from_config(&config).unwrap();
        let names: Vec<_> = eggs.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["my-app", "frontend-web", "frontend-admin"]);
    }

    #[test]
    fn test_duplicate_repository() {
        let src = EGGS_BUCKET.replace("repo \"admin\"", "repo \"web\"");
        let config = FlyParser::parse_str(&src, "t.fly").unwrap();
        let err = bucket_from_block(&config.blocks[0]).unwrap_err();
        assert_eq!(err.field(), "repositories");
    }
}
