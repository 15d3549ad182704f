//! Gosling CLI entrypoint.
//!
//! This is the main entrypoint for the gosling command-line tool.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use gosling::cli::{AddCommands, ApiArgs, Cli, Commands, FileValidation, LogFormat, OutputFormatter};
use gosling::deploy::{DeployOptions, DeployWorkflow, collect_statuses, resolve_rollback};
use gosling::error::{GoslingError, Result};
use gosling::fly::{FlyParser, FlyValidator, to_json_pretty};
use gosling::mothergoose::{MotherGooseApi, OperationContext};
use gosling::nest;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    load_dotenv();

    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Loads `.env` from the working directory and from the repository root.
///
/// Variables already set in the environment win.
fn load_dotenv() {
    let _ = dotenvy::dotenv();

    if let Ok(cwd) = std::env::current_dir()
        && let Ok(root) = nest::find_root(&cwd)
    {
        let _ = dotenvy::from_path(root.join(".env"));
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    // Ctrl-C cancels every in-flight API call and pending backoff.
    let ctx = OperationContext::new();
    let token = ctx.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });

    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Add { command } => cmd_add(command),
        Commands::Validate { file, all: _ } => cmd_validate(file.as_deref(), &formatter),
        Commands::Deploy {
            cloud,
            region,
            dry_run,
            continue_on_error,
            api,
        } => {
            let options = DeployOptions {
                cloud,
                region,
                dry_run,
                continue_on_error,
            };
            cmd_deploy(&ctx, options, &api, &formatter).await
        }
        Commands::Rollback { egg, to, yes, api } => {
            cmd_rollback(&ctx, &egg, to.as_deref(), yes, &api, &formatter).await
        }
        Commands::Status { egg, all: _, api } => {
            cmd_status(&ctx, egg.as_deref(), &api, &formatter).await
        }
        Commands::Parse { file, block_type } => cmd_parse(&file, block_type.as_deref()),
    }
}

/// Initialize a new repository.
fn cmd_init(path: &Path) -> Result<()> {
    info!("Initializing new Gosling repository in: {}", path.display());

    let created = nest::init_repository(path)?;
    for entry in &created {
        eprintln!("Created: {}", entry.display());
    }
    if created.is_empty() {
        eprintln!("Repository already initialized: {}", path.display());
        return Ok(());
    }

    eprintln!("\nRepository initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Run 'gosling add egg <name>' to describe a runner group");
    eprintln!("  2. Run 'gosling validate' to check your configuration");
    eprintln!("  3. Run 'gosling deploy --dry-run ...' to see what will be deployed");

    Ok(())
}

/// Add an egg or a job from a template.
fn cmd_add(command: AddCommands) -> Result<()> {
    let root = nest::find_root(&std::env::current_dir()?)?;

    let path = match command {
        AddCommands::Egg {
            name,
            runner_type,
            provider,
            region,
        } => nest::add_egg(&root, &name, runner_type, provider, region.as_deref())?,
        AddCommands::Job { name, schedule } => nest::add_job(&root, &name, schedule.as_deref())?,
    };

    eprintln!("Created: {}", path.display());
    Ok(())
}

/// Validate one file or the whole repository.
fn cmd_validate(file: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let root = nest::find_root(&cwd).ok();

    // Without a file, every .fly file of the repository is checked.
    let files = match file {
        Some(file) => vec![std::path::absolute(file)?],
        None => nest::find_fly_files(&nest::find_root(&cwd)?)?,
    };

    if files.is_empty() {
        eprintln!("{}", formatter.warning("No .fly files found in the repository"));
        return Ok(());
    }
    info!("Validating {} file(s)", files.len());

    let results: Vec<FileValidation> = files
        .iter()
        .map(|path| {
            let shown = root
                .as_deref()
                .and_then(|r| path.strip_prefix(r).ok())
                .unwrap_or(path.as_path())
                .display()
                .to_string();
            FileValidation {
                path: shown,
                error: check_file(root.as_deref(), path).err().map(|e| e.to_string()),
            }
        })
        .collect();

    println!("{}", formatter.format_validation(&results));

    let failed = results.iter().filter(|r| !r.is_valid()).count();
    if failed > 0 {
        return Err(GoslingError::FilesFailed { failed });
    }

    eprintln!("{}", formatter.success("All files validated successfully!"));
    Ok(())
}

/// Parses and validates one file, with the rules of its repository location.
fn check_file(root: Option<&Path>, path: &Path) -> Result<()> {
    let config = FlyParser::parse_file(path)?;

    let validator = FlyValidator::new();
    let mut report = validator.validate(&config);
    if let Some(root) = root {
        report.merge(validator.validate_placement(&config, nest::placement(root, path)));
    }

    report.into_result()?;
    Ok(())
}

/// Deploy every egg of the repository.
async fn cmd_deploy(
    ctx: &OperationContext,
    options: DeployOptions,
    api: &ApiArgs,
    formatter: &OutputFormatter,
) -> Result<()> {
    let root = nest::find_root(&std::env::current_dir()?)?;
    eprintln!("Found Nest repository at: {}", root.display());

    let client = api.client()?;
    let dry_run = options.dry_run;
    let workflow = DeployWorkflow::new(&client, options);

    let report = workflow.run(ctx, &root).await?;
    println!("{}", formatter.format_deploy(&report));

    report.into_result()?;

    let message = if dry_run {
        "Dry-run completed successfully."
    } else {
        "Deployment completed successfully."
    };
    eprintln!("{}", formatter.success(message));
    Ok(())
}

/// Roll an egg back to an earlier plan.
async fn cmd_rollback(
    ctx: &OperationContext,
    egg: &str,
    to: Option<&str>,
    auto_approve: bool,
    api: &ApiArgs,
    formatter: &OutputFormatter,
) -> Result<()> {
    let client = api.client()?;
    let rollback = resolve_rollback(&client, ctx, egg, to).await?;

    println!("{}", formatter.format_rollback(&rollback));

    // Confirm
    if !auto_approve {
        eprint!("Continue? (yes/no): ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        let answer = input.trim();
        if !answer.eq_ignore_ascii_case("yes") && !answer.eq_ignore_ascii_case("y") {
            eprintln!("Rollback cancelled");
            return Ok(());
        }
    }

    // MotherGoose applies the rollback and reports its progress through status.
    info!("Rollback of {egg} to plan {} requested", rollback.target.id);
    eprintln!("{}", formatter.success("Rollback initiated successfully"));
    eprintln!("Use 'gosling status --egg {egg}' to check rollback status");
    Ok(())
}

/// Show the status of one egg or of every egg.
async fn cmd_status(
    ctx: &OperationContext,
    egg: Option<&str>,
    api: &ApiArgs,
    formatter: &OutputFormatter,
) -> Result<()> {
    let client = api.client()?;

    match egg {
        Some(egg) => {
            let status = client.get_egg_status(ctx, egg).await?;
            println!("{}", formatter.format_egg_status(&status));
        }
        None => {
            let summaries = collect_statuses(&client, ctx).await?;
            println!("{}", formatter.format_status_all(&summaries));
        }
    }

    Ok(())
}

/// Print the AST of a file as JSON.
fn cmd_parse(file: &Path, block_type: Option<&str>) -> Result<()> {
    let config = FlyParser::parse_file(file)?;

    if let Some(expected) = block_type
        && let Some(block) = config.blocks.iter().find(|b| b.block_type != expected)
    {
        return Err(GoslingError::BlockType {
            expected: expected.to_string(),
            found: block.block_type.clone(),
        });
    }

    println!("{}", to_json_pretty(&config)?);
    Ok(())
}
