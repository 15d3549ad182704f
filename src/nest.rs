//! Nest repository layout.
//!
//! A Nest is the Git repository holding Fly configuration. It is recognized
//! by three sibling directories: `Eggs/`, `Jobs/` and `UF/`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{CloudProvider, RunnerKind};
use crate::error::{NestError, Result};
use crate::fly::{Placement, is_identifier};

/// Directory holding egg and eggsbucket configurations.
pub const EGGS_DIR: &str = "Eggs";
/// Directory holding job definitions.
pub const JOBS_DIR: &str = "Jobs";
/// Directory holding the `UglyFox` configuration.
pub const UF_DIR: &str = "UF";

/// File name of an egg configuration inside its directory.
pub const EGG_CONFIG_FILE: &str = "config.fly";

/// Schedule used by `add job` when none is given.
pub const DEFAULT_JOB_SCHEDULE: &str = "0 2 * * *";

const README_TEMPLATE: &str = include_str!("../templates/README.md");
const GITIGNORE_TEMPLATE: &str = include_str!("../templates/gitignore");

/// Returns `true` if `dir` holds `Eggs/`, `Jobs/` and `UF/`.
#[must_use]
pub fn is_repository_root(dir: &Path) -> bool {
    [EGGS_DIR, JOBS_DIR, UF_DIR]
        .iter()
        .all(|child| dir.join(child).is_dir())
}

/// Walks upward from `start` to the nearest repository root.
///
/// # Errors
///
/// Returns [`NestError::NotFound`] if no ancestor is a repository root.
pub fn find_root(start: &Path) -> std::result::Result<PathBuf, NestError> {
    start
        .ancestors()
        .find(|dir| is_repository_root(dir))
        .map(Path::to_path_buf)
        .ok_or_else(|| NestError::NotFound {
            start: start.to_path_buf(),
        })
}

/// Lists every `.fly` file under `Eggs/`, `Jobs/` and `UF/`, sorted.
///
/// # Errors
///
/// Returns an error if a directory cannot be read.
pub fn find_fly_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dir in [EGGS_DIR, JOBS_DIR, UF_DIR] {
        let dir = root.join(dir);
        if dir.is_dir() {
            collect_fly_files(&dir, &mut files)?;
        }
    }
    files.sort();
    debug!("Found {} .fly file(s) under {}", files.len(), root.display());
    Ok(files)
}

fn collect_fly_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_fly_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "fly") {
            files.push(path);
        }
    }
    Ok(())
}

/// Lists `Eggs/<name>/config.fly` files, sorted by egg directory.
///
/// # Errors
///
/// Returns an error if `Eggs/` cannot be read.
pub fn egg_config_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(root.join(EGGS_DIR))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let config = entry.path().join(EGG_CONFIG_FILE);
            if config.is_file() {
                files.push(config);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Classifies a file by its location inside the repository.
#[must_use]
pub fn placement(root: &Path, path: &Path) -> Placement {
    let Ok(relative) = path.strip_prefix(root) else {
        return Placement::Unconstrained;
    };
    let mut parts = relative.components().map(|c| c.as_os_str());

    match (parts.next(), parts.next(), parts.next()) {
        (Some(dir), Some(_), Some(file)) if dir == EGGS_DIR && file == EGG_CONFIG_FILE => {
            Placement::Egg
        }
        (Some(dir), Some(_), None) if dir == JOBS_DIR => Placement::Job,
        (Some(dir), Some(file), None) if dir == UF_DIR && file == EGG_CONFIG_FILE => {
            Placement::UglyFox
        }
        _ => Placement::Unconstrained,
    }
}

/// Creates the repository skeleton at `path`.
///
/// Existing directories are kept; `README.md` and `.gitignore` are only
/// written when absent. Returns the paths that were created.
///
/// # Errors
///
/// Returns an error if a directory or file cannot be created.
pub fn init_repository(path: &Path) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();

    for dir in [EGGS_DIR, JOBS_DIR, UF_DIR] {
        let dir = path.join(dir);
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            created.push(dir);
        }
    }

    for (name, contents) in [("README.md", README_TEMPLATE), (".gitignore", GITIGNORE_TEMPLATE)] {
        let file = path.join(name);
        if !file.exists() {
            fs::write(&file, contents)?;
            created.push(file);
        }
    }

    info!("Initialized Nest repository at {}", path.display());
    Ok(created)
}

/// Writes `Eggs/<name>/config.fly` from the egg template.
///
/// # Errors
///
/// Returns an error if the name is not an identifier, the file already
/// exists, or it cannot be written.
pub fn add_egg(
    root: &Path,
    name: &str,
    kind: RunnerKind,
    provider: CloudProvider,
    region: Option<&str>,
) -> Result<PathBuf> {
    check_name("egg", name)?;

    let dir = root.join(EGGS_DIR).join(name);
    let path = dir.join(EGG_CONFIG_FILE);
    refuse_existing(&path)?;

    let region = region.unwrap_or_else(|| provider.default_region());
    fs::create_dir_all(&dir)?;
    fs::write(&path, egg_template(name, kind, provider, region))?;

    info!("Created egg configuration {}", path.display());
    Ok(path)
}

/// Writes `Jobs/<name>.fly` from the job template.
///
/// # Errors
///
/// Returns an error if the name is not an identifier, the file already
/// exists, or it cannot be written.
pub fn add_job(root: &Path, name: &str, schedule: Option<&str>) -> Result<PathBuf> {
    check_name("job", name)?;

    let path = root.join(JOBS_DIR).join(format!("{name}.fly"));
    refuse_existing(&path)?;

    fs::create_dir_all(root.join(JOBS_DIR))?;
    fs::write(&path, job_template(name, schedule.unwrap_or(DEFAULT_JOB_SCHEDULE)))?;

    info!("Created job definition {}", path.display());
    Ok(path)
}

fn check_name(kind: &'static str, name: &str) -> std::result::Result<(), NestError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(NestError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

fn refuse_existing(path: &Path) -> std::result::Result<(), NestError> {
    if path.exists() {
        Err(NestError::AlreadyExists {
            path: path.to_path_buf(),
        })
    } else {
        Ok(())
    }
}

/// Renders the egg template.
#[must_use]
pub fn egg_template(name: &str, kind: RunnerKind, provider: CloudProvider, region: &str) -> String {
    let (cpu, memory, disk, concurrent) = match kind {
        RunnerKind::Vm => (2, 4096, 20, 3),
        RunnerKind::Serverless => (1, 2048, 10, 1),
    };
    let secret_scheme = match provider {
        CloudProvider::Yandex => "yc-lockbox",
        CloudProvider::Aws => "aws-sm",
    };

    format!(
        r#"# Egg: {name} ({kind} on {provider})

egg "{name}" {{
  type = "{kind}"

  cloud {{
    provider = "{provider}"
    region   = "{region}"
  }}

  resources {{
    cpu    = {cpu}
    memory = {memory} # MiB
    disk   = {disk} # GiB
  }}

  runner {{
    tags         = ["docker", "linux"]
    concurrent   = {concurrent}
    idle_timeout = "10m"
  }}

  gitlab {{
    # Replace with the numeric ID of the GitLab project.
    project_id   = 0
    server_name  = "gitlab.com"
    token_secret = "{secret_scheme}://gitlab-tokens/{name}-runner-token"
  }}

  environment {{
    DOCKER_DRIVER = "overlay2"
  }}
}}
"#
    )
}

/// Renders the job template.
#[must_use]
pub fn job_template(name: &str, schedule: &str) -> String {
    format!(
        r#"# Job: {name}

job "{name}" {{
  schedule = "{schedule}"

  runner {{
    type = "vm"
    tags = ["privileged"]
  }}

  script = <<-EOT
    #!/bin/bash
    set -e
    echo "Running job: {name}"
  EOT

  on_failure {{
    notify = ["ops@example.com"]
  }}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GoslingError;
    use crate::fly::{FlyParser, FlyValidator};
    use tempfile::TempDir;

    fn nest() -> TempDir {
        let dir = TempDir::new().unwrap();
        init_repository(dir.path()).unwrap();
        dir
    }

    #[test]
    fn test_init_creates_layout() {
        let dir = TempDir::new().unwrap();
        let created = init_repository(dir.path()).unwrap();

        assert_eq!(created.len(), 5);
        assert!(is_repository_root(dir.path()));
        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains(".env"));
        assert!(dir.path().join("README.md").is_file());

        assert!(init_repository(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_find_root_from_nested_dir() {
        let dir = nest();
        let nested = dir.path().join("Eggs").join("my-app");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_root(&nested).unwrap(), dir.path());
        assert_eq!(find_root(dir.path()).unwrap(), dir.path());
    }

    #[test]
    fn test_find_root_outside_repository() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Eggs")).unwrap();

        let err = find_root(dir.path()).unwrap_err();
        assert!(err.to_string().contains("repository not found"));
    }

    #[test]
    fn test_fly_file_discovery() {
        let dir = nest();
        add_egg(dir.path(), "b-app", RunnerKind::Vm, CloudProvider::Yandex, None).unwrap();
        add_egg(dir.path(), "a-app", RunnerKind::Vm, CloudProvider::Yandex, None).unwrap();
        add_job(dir.path(), "cleanup", None).unwrap();
        fs::write(dir.path().join("UF").join("config.fly"), "uglyfox {}\n").unwrap();
        fs::write(dir.path().join("Eggs").join("notes.txt"), "x").unwrap();

        let files = find_fly_files(dir.path()).unwrap();
        let relative: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("Eggs/a-app/config.fly"),
                PathBuf::from("Eggs/b-app/config.fly"),
                PathBuf::from("Jobs/cleanup.fly"),
                PathBuf::from("UF/config.fly"),
            ]
        );

        assert_eq!(egg_config_files(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_placement() {
        let root = Path::new("/nest");
        assert_eq!(placement(root, Path::new("/nest/Eggs/a/config.fly")), Placement::Egg);
        assert_eq!(placement(root, Path::new("/nest/Jobs/x.fly")), Placement::Job);
        assert_eq!(placement(root, Path::new("/nest/UF/config.fly")), Placement::UglyFox);
        assert_eq!(placement(root, Path::new("/nest/UF/other.fly")), Placement::Unconstrained);
        assert_eq!(placement(root, Path::new("/elsewhere/x.fly")), Placement::Unconstrained);
    }

    #[test]
    fn test_egg_template_needs_only_project_id() {
        for (kind, provider) in [
            (RunnerKind::Vm, CloudProvider::Yandex),
            (RunnerKind::Serverless, CloudProvider::Aws),
        ] {
            let source = egg_template("my-app", kind, provider, provider.default_region());
            let config = FlyParser::parse_str(&source, "Eggs/my-app/config.fly").unwrap();
            let report = FlyValidator::new().validate(&config);
            let fields: Vec<_> = report.diagnostics().iter().map(|d| d.field.as_str()).collect();
            assert_eq!(fields, vec!["project_id"], "{kind} on {provider}");
        }
    }

    #[test]
    fn test_job_template_is_valid() {
        let source = job_template("rotate-secrets", "*/5 * * * *");
        let config = FlyParser::parse_str(&source, "Jobs/rotate-secrets.fly").unwrap();
        assert!(FlyValidator::new().validate(&config).is_ok());
    }

    #[test]
    fn test_add_refuses_overwrite_and_bad_names() {
        let dir = nest();
        add_job(dir.path(), "cleanup", None).unwrap();

        let err = add_job(dir.path(), "cleanup", None).unwrap_err();
        assert!(matches!(err, GoslingError::Nest(NestError::AlreadyExists { .. })));

        let err = add_egg(dir.path(), "1st", RunnerKind::Vm, CloudProvider::Aws, None).unwrap_err();
        assert!(matches!(err, GoslingError::Nest(NestError::InvalidName { kind: "egg", .. })));
    }

    #[test]
    fn test_add_egg_uses_provider_default_region() {
        let dir = nest();
        let path = add_egg(dir.path(), "api", RunnerKind::Vm, CloudProvider::Aws, None).unwrap();
        let source = fs::read_to_string(path).unwrap();
        assert!(source.contains("region   = \"us-east-1\""));
        assert!(source.contains("aws-sm://gitlab-tokens/api-runner-token"));
    }
}
