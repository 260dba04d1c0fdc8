use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use appvisor_launcher::supervisor::{InstanceState, ShutdownHandle, Supervisor};
use appvisor_shared::logging::{set_log_file, set_log_level};
use appvisor_shared::{log_config, log_signal, log_system, Config, ConfigFormat, Ecosystem};

#[derive(Parser)]
#[command(name = "appvisor")]
#[command(version, about = "Check and run the apps declared in an ecosystem file")]
struct Cli {
    /// Ecosystem file (.toml or .json)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write log lines to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the ecosystem file
    Check,

    /// Print the normalized ecosystem
    Show {
        #[arg(long, value_enum, default_value_t = OutputFormat::Toml)]
        format: OutputFormat,
    },

    /// Write a sample ecosystem file
    Init {
        /// Destination (.toml or .json)
        #[arg(default_value = "ecosystem.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Launch the apps and supervise them until they stop or a signal arrives
    Start {
        /// Only start the app with this name
        #[arg(long, value_name = "NAME")]
        only: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Toml,
    Json,
}

impl From<OutputFormat> for ConfigFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Toml => ConfigFormat::Toml,
            OutputFormat::Json => ConfigFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(&cli)?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Check => run_check(cli.config.as_deref(), &settings),
        Commands::Show { format } => run_show(cli.config.as_deref(), &settings, format.into()),
        Commands::Init { ref path, force } => run_init(path, force),
        Commands::Start { ref only } => {
            run_start(cli.config.as_deref(), &settings, only.as_deref()).await
        }
    }
}

/// 設定ファイル → 環境変数 → コマンドライン引数の順に上書き
fn load_settings(cli: &Cli) -> Result<Config> {
    let mut settings = match Config::load_auto()? {
        Some((config, path)) => {
            log_config!(debug, "Using settings from {}", path.display());
            config
        }
        None => Config::default(),
    };

    settings.apply_env_overrides();

    if cli.verbose {
        settings.logging.verbose = true;
    }
    if let Some(log_file) = &cli.log_file {
        settings.logging.log_file = Some(log_file.clone());
    }

    Ok(settings)
}

fn init_logging(settings: &Config) -> Result<()> {
    set_log_level(settings.logging.effective_level());

    if let Some(log_file) = &settings.logging.log_file {
        set_log_file(log_file)
            .with_context(|| format!("Failed to open log file: {}", log_file.display()))?;
    }

    Ok(())
}

/// ecosystem ファイルを決めて読み込む
fn load_ecosystem(cli_path: Option<&Path>, settings: &Config) -> Result<(Ecosystem, PathBuf)> {
    let explicit = cli_path
        .map(Path::to_path_buf)
        .or_else(|| settings.launcher.ecosystem_file.clone());

    if let Some(path) = explicit {
        let ecosystem = Ecosystem::from_file(&path)?;
        return Ok((ecosystem, path));
    }

    match Ecosystem::load_auto()? {
        Some(found) => Ok(found),
        None => {
            let candidates: Vec<String> = Ecosystem::path_candidates()
                .iter()
                .map(|path| path.display().to_string())
                .collect();
            bail!(
                "No ecosystem file found (looked in: {}). Use --config or `appvisor init`.",
                candidates.join(", ")
            )
        }
    }
}

fn run_check(cli_path: Option<&Path>, settings: &Config) -> Result<()> {
    let (ecosystem, path) = load_ecosystem(cli_path, settings)?;

    println!("✅ {}: {} app(s)", path.display(), ecosystem.len());
    for app in ecosystem.apps() {
        let memory = app
            .max_memory_restart()
            .map_or_else(|| "-".to_string(), |size| size.to_string());
        println!(
            "   {} → `{}` in {} (instances: {}, autorestart: {}, watch: {}, max_memory_restart: {}, env: {})",
            app.name(),
            app.command_line(),
            app.cwd().display(),
            app.instances(),
            app.autorestart(),
            app.watch(),
            memory,
            app.env().len()
        );
    }

    Ok(())
}

fn run_show(cli_path: Option<&Path>, settings: &Config, format: ConfigFormat) -> Result<()> {
    let (ecosystem, _) = load_ecosystem(cli_path, settings)?;
    let rendered = ecosystem
        .render(format)
        .context("Failed to render ecosystem")?;
    print!("{rendered}");
    if !rendered.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Ecosystem::sample().save_to_file(path)?;
    println!("📝 Wrote sample ecosystem to {}", path.display());
    Ok(())
}

async fn run_start(
    cli_path: Option<&Path>,
    settings: &Config,
    only: Option<&str>,
) -> Result<()> {
    let (ecosystem, path) = load_ecosystem(cli_path, settings)?;
    log_system!(info, "Loaded {} app(s) from {}", ecosystem.len(), path.display());

    let apps = match only {
        Some(name) => match ecosystem.get(name) {
            Some(app) => vec![app.clone()],
            None => bail!("No app named `{}` in {}", name, path.display()),
        },
        None => ecosystem.into_apps(),
    };

    let supervisor = Supervisor::new(settings.launcher.clone());
    tokio::spawn(forward_signals(supervisor.shutdown_handle()));

    let reports = supervisor.run(apps).await;

    let mut errored = 0;
    for report in &reports {
        if report.final_state == InstanceState::Errored {
            errored += 1;
        }
        println!(
            "{} {}#{}: {:?} after {} launch(es), last exit {:?}",
            if report.final_state == InstanceState::Errored { "❌" } else { "✅" },
            report.app,
            report.instance,
            report.final_state,
            report.launches,
            report.last_exit
        );
    }

    if errored > 0 {
        bail!("{errored} instance(s) ended in the errored state");
    }
    Ok(())
}

/// SIGINT/SIGTERM を受けたら全インスタンスに停止を要求する
async fn forward_signals(handle: ShutdownHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    log_signal!(warn, "Signal handlers unavailable: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigint.recv() => {
                log_signal!(info, "Received SIGINT, stopping apps");
            }
            _ = sigterm.recv() => {
                log_signal!(info, "Received SIGTERM, stopping apps");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        log_signal!(info, "Received Ctrl-C, stopping apps");
    }

    handle.shutdown();
}
