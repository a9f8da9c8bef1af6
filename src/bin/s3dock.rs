//! s3dock CLI entry point.
//!
//! Thin argument-parsing and wiring layer over the library services: every
//! subcommand resolves configuration, constructs the adapters it needs, and
//! delegates. Exit code 0 on success, 1 on failure; `--output json` wraps
//! results and errors in a `{success, command, data?, error?}` envelope on
//! stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use s3dock::config::{self, ResolvedConfig};
use s3dock::output::{self, OutputFormat};
use s3dock::{
    CurrentService, DockerCli, Error, GitRepo, ImageBuilder, ImagePromoter, ImagePuller,
    ImagePusher, ImageTagger, ListService, ObjectStore, Reporter, Result, S3Store, TargetType,
};

/// s3dock: ship container images through S3 instead of a registry.
#[derive(Parser)]
#[command(name = "s3dock", version, about)]
struct Cli {
    /// Explicit config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Profile to use from config
    #[arg(long, short = 'p', global = true)]
    profile: Option<String>,

    /// Override bucket name
    #[arg(long, short = 'b', global = true)]
    bucket: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    output: OutputMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    Text,
    Json,
}

impl From<OutputMode> for OutputFormat {
    fn from(mode: OutputMode) -> Self {
        match mode {
            OutputMode::Text => OutputFormat::Text,
            OutputMode::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Build an image tagged {app}:{gitTime}-{gitHash} from the current commit
    Build(BuildArgs),
    /// Push an image to the object store
    Push {
        /// Image reference (e.g. myapp:20250721-2118-f7a5a27)
        image_ref: String,
    },
    /// Create a semantic version tag for a pushed image
    Tag {
        /// Image reference (e.g. myapp:20250721-2118-f7a5a27)
        image_ref: String,
        /// Version (e.g. v1.2.0)
        version: String,
    },
    /// Promote an image or tag to an environment
    ///
    /// Two forms: `promote <image:tag> <env>` or `promote <app> <version> <env>`
    Promote {
        source: String,
        target: String,
        environment: Option<String>,
    },
    /// Pull the image an environment or version tag points at
    Pull {
        app: String,
        /// Environment name, or version (v-prefixed, e.g. v1.2.0)
        target: String,
    },
    /// Show the image reference an environment resolves to
    Current {
        app: String,
        environment: String,
    },
    /// List apps, images, tags, or environments
    List {
        #[command(subcommand)]
        what: ListCommand,
    },
    /// Config file management
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Application name
    app: String,
    /// Git repository path
    #[arg(long, default_value = ".")]
    path: PathBuf,
    /// Dockerfile to use
    #[arg(long, default_value = "Dockerfile")]
    dockerfile: String,
    /// Build context path
    #[arg(long)]
    context: Option<PathBuf>,
    /// Target platform (e.g. linux/amd64)
    #[arg(long)]
    platform: Option<String>,
}

#[derive(Subcommand)]
enum ListCommand {
    /// List all apps
    Apps,
    /// List images for an app
    Images {
        app: String,
        /// Filter by year-month (e.g. 202507)
        #[arg(long)]
        month: Option<String>,
    },
    /// List semantic version tags for an app
    Tags { app: String },
    /// List environment pointers for an app
    #[command(alias = "environments")]
    Envs { app: String },
    /// Show the version tag behind an environment
    TagFor { app: String, environment: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the resolved config or one profile
    Show,
    /// List all profiles
    List,
    /// Create a default config file
    Init { path: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let format: OutputFormat = cli.output.into();
    let command = command_name(&cli.command);

    match dispatch(&cli, format).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::emit_error(format, command, &e);
            ExitCode::FAILURE
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Build(_) => "build",
        Command::Push { .. } => "push",
        Command::Tag { .. } => "tag",
        Command::Promote { .. } => "promote",
        Command::Pull { .. } => "pull",
        Command::Current { .. } => "current",
        Command::List { .. } => "list",
        Command::Config { .. } => "config",
    }
}

async fn dispatch(cli: &Cli, format: OutputFormat) -> Result<()> {
    let reporter = Reporter::new(!format.is_json());

    match &cli.command {
        Command::Build(args) => build(args, format).await,
        Command::Push { image_ref } => {
            let (store, cfg) = connect(cli, reporter).await?;
            let pusher = ImagePusher::new(
                Arc::new(DockerCli::new()),
                store,
                Arc::new(GitRepo::new()),
                cfg.bucket,
                reporter,
            );
            let outcome = pusher.push(image_ref).await?;
            if !format.is_json() && outcome.skipped {
                println!("Image already stored, nothing to upload");
            }
            output::emit_result(format, "push", outcome);
            Ok(())
        }
        Command::Tag { image_ref, version } => {
            let (store, cfg) = connect(cli, reporter).await?;
            let outcome = ImageTagger::new(store, cfg.bucket).tag(image_ref, version).await?;
            if !format.is_json() {
                println!("Successfully tagged {image_ref} as {version}");
            }
            output::emit_result(format, "tag", outcome);
            Ok(())
        }
        Command::Promote {
            source,
            target,
            environment,
        } => {
            let (store, cfg) = connect(cli, reporter).await?;
            let promoter = ImagePromoter::new(store, cfg.bucket);
            let outcome = match environment {
                // promote <app> <version> <env>
                Some(environment) => promoter.promote_from_tag(source, target, environment).await?,
                // promote <image:tag> <env>
                None => promoter.promote(source, target).await?,
            };
            if !format.is_json() {
                if outcome.skipped {
                    println!(
                        "Environment {} already points at {}, nothing to do",
                        outcome.environment, outcome.source
                    );
                } else {
                    println!(
                        "Successfully promoted {} to {} environment",
                        outcome.source, outcome.environment
                    );
                }
            }
            output::emit_result(format, "promote", outcome);
            Ok(())
        }
        Command::Pull { app, target } => {
            let (store, cfg) = connect(cli, reporter).await?;
            let puller = ImagePuller::new(Arc::new(DockerCli::new()), store, cfg.bucket, reporter);
            let outcome = if is_version_tag(target) {
                puller.pull_from_tag(app, target).await?
            } else {
                puller.pull(app, target).await?
            };
            output::emit_result(format, "pull", outcome);
            Ok(())
        }
        Command::Current { app, environment } => {
            let (store, cfg) = connect(cli, reporter).await?;
            let outcome = CurrentService::new(store, cfg.bucket)
                .current_image(app, environment)
                .await?;
            if !format.is_json() {
                println!("{}", outcome.image_ref);
            }
            output::emit_result(format, "current", outcome);
            Ok(())
        }
        Command::List { what } => list(cli, what, format, reporter).await,
        Command::Config { action } => config_command(cli, action, format),
    }
}

async fn build(args: &BuildArgs, format: OutputFormat) -> Result<()> {
    let vcs = Arc::new(GitRepo::new());
    let builder = ImageBuilder::new(Arc::new(DockerCli::new()), vcs);

    // --path without --context means both come from the same directory.
    let context = match (&args.context, args.path.as_os_str() != ".") {
        (Some(context), _) => context.clone(),
        (None, true) => args.path.clone(),
        (None, false) => PathBuf::from("."),
    };

    let repo_root = builder.discover_repo_root(&args.path, &context)?;
    let outcome = builder
        .build(
            &args.app,
            &context,
            &args.dockerfile,
            &repo_root,
            args.platform.as_deref(),
        )
        .await?;

    if !format.is_json() {
        println!("{}", outcome.image_tag);
    }
    output::emit_result(format, "build", outcome);
    Ok(())
}

async fn list(
    cli: &Cli,
    what: &ListCommand,
    format: OutputFormat,
    reporter: Reporter,
) -> Result<()> {
    let (store, cfg) = connect(cli, reporter).await?;
    let service = ListService::new(store, cfg.bucket);

    match what {
        ListCommand::Apps => {
            let apps = service.list_apps().await?;
            if !format.is_json() {
                if apps.is_empty() {
                    println!("No apps found");
                }
                for app in &apps {
                    println!("{app}");
                }
            }
            output::emit_result(format, "list", ListData::Apps { apps });
        }
        ListCommand::Images { app, month } => {
            let images = service.list_images(app, month.as_deref()).await?;
            if !format.is_json() {
                if images.is_empty() {
                    println!("No images found for {app}");
                }
                for image in &images {
                    println!("{}:{}", image.app_name, image.tag);
                }
            }
            output::emit_result(format, "list", ListData::Images { images });
        }
        ListCommand::Tags { app } => {
            let tags = service.list_tags(app).await?;
            if !format.is_json() {
                if tags.is_empty() {
                    println!("No tags found for {app}");
                }
                for tag in &tags {
                    println!("{} -> {}", tag.version, tag.target_image);
                }
            }
            output::emit_result(format, "list", ListData::Tags { tags });
        }
        ListCommand::Envs { app } => {
            let environments = service.list_environments(app).await?;
            if !format.is_json() {
                if environments.is_empty() {
                    println!("No environments found for {app}");
                }
                for env in &environments {
                    if env.target_type == TargetType::Tag && !env.source_tag.is_empty() {
                        println!(
                            "{} -> {} (via {})",
                            env.environment, env.source_image, env.source_tag
                        );
                    } else {
                        println!("{} -> {}", env.environment, env.source_image);
                    }
                }
            }
            output::emit_result(format, "list", ListData::Environments { environments });
        }
        ListCommand::TagFor { app, environment } => {
            let tag = service.tag_for_environment(app, environment).await?;
            if !format.is_json() {
                if tag.is_empty() {
                    println!("No tag found for {app}/{environment} (promoted directly from image)");
                } else {
                    println!("{tag}");
                }
            }
            let direct = tag.is_empty();
            output::emit_result(format, "list", ListData::TagFor { tag, direct });
        }
    }
    Ok(())
}

fn config_command(cli: &Cli, action: &ConfigCommand, format: OutputFormat) -> Result<()> {
    match action {
        ConfigCommand::Show => {
            let resolved = config::resolve(
                cli.config.as_deref(),
                cli.profile.as_deref(),
                cli.bucket.as_deref(),
            )?;
            if !format.is_json() {
                println!("Bucket: {}", resolved.bucket);
                println!("Region: {}", resolved.region);
                if let Some(endpoint) = &resolved.endpoint {
                    println!("Endpoint: {endpoint}");
                }
                if let Some(access_key) = &resolved.access_key {
                    println!("Access Key: {access_key}");
                }
            }
            output::emit_result(format, "config", ConfigShowData::from(&resolved));
            Ok(())
        }
        ConfigCommand::List => {
            let loaded = config::Config::load(cli.config.as_deref())?;
            let profiles = loaded.profile_names();
            if !format.is_json() {
                println!("Available profiles:");
                for name in &profiles {
                    let marker = if *name == loaded.default_profile { "*" } else { " " };
                    println!("{marker} {name}");
                }
            }
            output::emit_result(
                format,
                "config",
                ConfigListData {
                    profiles,
                    default_profile: loaded.default_profile,
                },
            );
            Ok(())
        }
        ConfigCommand::Init { path } => {
            let target = path.clone().unwrap_or_else(|| PathBuf::from("s3dock.json5"));
            if target.exists() {
                return Err(Error::Config(format!(
                    "config file {} already exists",
                    target.display()
                )));
            }
            std::fs::write(&target, config::INIT_TEMPLATE)?;
            if !format.is_json() {
                println!("Created config file: {}", target.display());
            }
            output::emit_result(
                format,
                "config",
                serde_json::json!({ "created": target.display().to_string() }),
            );
            Ok(())
        }
    }
}

/// Connects to the object store using the resolved profile.
async fn connect(cli: &Cli, reporter: Reporter) -> Result<(Arc<dyn ObjectStore>, ResolvedConfig)> {
    let cfg = config::resolve(
        cli.config.as_deref(),
        cli.profile.as_deref(),
        cli.bucket.as_deref(),
    )?;
    let store = S3Store::connect(&cfg, reporter).await?;
    Ok((Arc::new(store), cfg))
}

/// A pull target is a version tag when it is v-prefixed and dotted
/// (`v1.2.0`); anything else names an environment.
fn is_version_tag(target: &str) -> bool {
    target.starts_with('v') && target.split('.').count() >= 2
}

#[derive(Serialize)]
#[serde(untagged)]
enum ListData {
    Apps { apps: Vec<String> },
    Images { images: Vec<s3dock::ImageEntry> },
    Tags { tags: Vec<s3dock::TagEntry> },
    Environments { environments: Vec<s3dock::EnvEntry> },
    TagFor { tag: String, direct: bool },
}

#[derive(Serialize)]
struct ConfigShowData {
    bucket: String,
    region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_key: Option<String>,
}

impl From<&ResolvedConfig> for ConfigShowData {
    fn from(resolved: &ResolvedConfig) -> Self {
        Self {
            bucket: resolved.bucket.clone(),
            region: resolved.region.clone(),
            endpoint: resolved.endpoint.clone(),
            access_key: resolved.access_key.clone(),
        }
    }
}

#[derive(Serialize)]
struct ConfigListData {
    profiles: Vec<String>,
    default_profile: String,
}
