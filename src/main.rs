// ABOUTME: Command-line entry point for the connector front-end
// ABOUTME: Wires settings, host context, backend client and notifications into subcommands

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use ds_grist_connector::connections::{ConnectionTester, RealtimeOutcome};
use ds_grist_connector::context::{resolve_context, EmbeddingContext, StaticHost};
use ds_grist_connector::filters::{FilterManager, FilterSelection};
use ds_grist_connector::form::{self, ConfigCheck, ConfigForm};
use ds_grist_connector::notifications::{Notifier, Severity, TerminalNotifier};
use ds_grist_connector::remote::RemoteClient;
use ds_grist_connector::settings::Settings;
use ds_grist_connector::sync::{ProgressRenderer, SyncController, SyncState};
use ds_grist_connector::{logging, schedule};

#[derive(Parser)]
#[command(name = "ds-grist")]
#[command(
    about = "Configure and run Démarches Simplifiées to Grist synchronizations",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Settings file (TOML). Missing file means defaults.
    #[arg(long, global = true, env = "DS_GRIST_SETTINGS", default_value = "ds-grist.toml")]
    settings: PathBuf,

    /// Connector backend URL, overrides the settings file
    #[arg(long, global = true, env = "DS_GRIST_BACKEND_URL")]
    backend_url: Option<String>,

    /// Access token issued by the Grist document
    #[arg(long, global = true, env = "GRIST_ACCESS_TOKEN", hide_env_values = true)]
    grist_token: Option<String>,

    /// Base URL of the Grist document the token was issued for
    #[arg(long, global = true, env = "GRIST_DOC_BASE_URL")]
    grist_doc_url: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or edit the stored connector configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// List the instructor groups of the configured démarche
    Groups,
    /// Inspect or edit the dossier filters
    #[command(subcommand)]
    Filters(FilterCommand),
    /// Test connectivity
    Test {
        #[arg(value_enum)]
        target: TestTarget,
    },
    /// Manage the automatic synchronization
    #[command(subcommand)]
    Schedule(ScheduleCommand),
    /// Start a synchronization and follow it until it ends
    Sync {
        /// Only submit the job and print its id
        #[arg(long)]
        no_watch: bool,
        #[command(flatten)]
        display: DisplayArgs,
    },
    /// Follow an already running synchronization
    Watch {
        task_id: String,
        #[command(flatten)]
        display: DisplayArgs,
    },
}

#[derive(Args)]
struct DisplayArgs {
    /// Hide task log lines
    #[arg(long)]
    quiet_logs: bool,
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
    /// Check that every field required for a sync is present
    Check,
    Save(SaveArgs),
    Delete {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args)]
struct SaveArgs {
    #[arg(long, env = "DS_API_TOKEN", hide_env_values = true)]
    ds_token: Option<String>,
    #[arg(long)]
    ds_api_url: Option<String>,
    #[arg(long)]
    demarche: Option<String>,
    #[arg(long)]
    grist_base_url: Option<String>,
    #[arg(long, env = "GRIST_API_KEY", hide_env_values = true)]
    grist_key: Option<String>,
    #[arg(long)]
    batch_size: Option<u32>,
    #[arg(long)]
    max_workers: Option<u32>,
    #[arg(long)]
    parallel: Option<bool>,
    /// Save without testing both connections first
    #[arg(long)]
    skip_tests: bool,
    #[command(flatten)]
    filters: FilterArgs,
}

#[derive(Args)]
struct FilterArgs {
    /// Earliest deposit date, YYYY-MM-DD (empty clears)
    #[arg(long)]
    date_start: Option<String>,
    /// Latest deposit date, YYYY-MM-DD (empty clears)
    #[arg(long)]
    date_end: Option<String>,
    /// Dossier status to include (repeatable)
    #[arg(long = "status")]
    statuses: Vec<String>,
    /// Instructor group id to include (repeatable)
    #[arg(long = "group")]
    groups: Vec<String>,
}

impl FilterArgs {
    fn is_empty(&self) -> bool {
        self.date_start.is_none()
            && self.date_end.is_none()
            && self.statuses.is_empty()
            && self.groups.is_empty()
    }

    /// Replace the parts of the selection given on the command line.
    fn apply_to(&self, manager: &mut FilterManager) -> Result<()> {
        let current = manager.selection();
        let keep =
            |date: Option<chrono::NaiveDate>| date.map(|d| d.format("%Y-%m-%d").to_string());
        let start = self.date_start.clone().or_else(|| keep(current.date_start));
        let end = self.date_end.clone().or_else(|| keep(current.date_end));
        manager.set_dates(start.as_deref(), end.as_deref())?;

        if !self.statuses.is_empty() {
            manager.statuses_mut().clear();
            for status in &self.statuses {
                manager.statuses_mut().set(status, true);
            }
        }
        if !self.groups.is_empty() {
            manager.groups_mut().clear();
            for group in &self.groups {
                manager.groups_mut().set(group, true);
            }
        }
        Ok(())
    }
}

#[derive(Subcommand)]
enum FilterCommand {
    Show,
    Set(FilterArgs),
    Reset,
}

#[derive(Clone, Copy, ValueEnum)]
enum TestTarget {
    Demarches,
    Grist,
    All,
    Realtime,
}

#[derive(Subcommand)]
enum ScheduleCommand {
    Status,
    Enable,
    Disable,
}

struct App {
    settings: Settings,
    client: RemoteClient,
    host: StaticHost,
    notifier: Arc<TerminalNotifier>,
}

impl App {
    async fn context(&self) -> Result<EmbeddingContext> {
        resolve_context(&self.host).await.map_err(|e| {
            self.notifier.notify(e.user_message(), Severity::Error);
            anyhow!(e)
        })
    }

    async fn load(&self) -> Result<(EmbeddingContext, ConfigForm)> {
        let ctx = self.context().await?;
        let form = form::load_configuration(&self.client, &ctx, self.notifier.as_ref()).await?;
        Ok((ctx, form))
    }

    async fn filter_manager(&self, ctx: &EmbeddingContext, form: &ConfigForm) -> FilterManager {
        let mut manager = stored_filters(form);
        if form.stored.ds_token_configured() {
            // Labels are cosmetic; the selection survives a failed lookup.
            let _ = manager
                .load_groups(&self.client, Some(ctx), self.notifier.as_ref())
                .await;
        }
        manager
    }
}

fn stored_filters(form: &ConfigForm) -> FilterManager {
    FilterManager::from_selection(&FilterSelection::from_configuration(&form.stored))
}

fn print_summary(summary: &[String]) {
    if summary.is_empty() {
        println!("Aucun filtre actif (tous les dossiers)");
    }
    for line in summary {
        println!("  • {}", line);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let notifier = Arc::new(TerminalNotifier::new());

    match run(cli, notifier.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // A failure the user was just notified about is not printed twice.
            if notifier.center().showing(Severity::Error, Instant::now()) {
                tracing::debug!("Command failed: {:#}", e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, notifier: Arc<TerminalNotifier>) -> Result<()> {
    let mut settings = Settings::load(&cli.settings)?;
    if let Some(url) = cli.backend_url.clone() {
        settings.backend_url = url;
    }
    let client = RemoteClient::new(settings.backend_url.clone(), settings.http_timeout())?;
    let app = App {
        settings,
        client,
        host: StaticHost::new(cli.grist_token.clone(), cli.grist_doc_url.clone()),
        notifier,
    };

    match cli.command {
        Commands::Config(command) => run_config(&app, command).await,
        Commands::Groups => {
            let (ctx, _) = app.load().await?;
            let mut manager = FilterManager::new();
            manager
                .load_groups(&app.client, Some(&ctx), app.notifier.as_ref())
                .await?;
            for option in manager.groups().options() {
                println!("{:>8}  {}", option.value, option.label.as_deref().unwrap_or(""));
            }
            Ok(())
        }
        Commands::Filters(command) => run_filters(&app, command).await,
        Commands::Test { target } => run_test(&app, target).await,
        Commands::Schedule(command) => {
            let (_, form) = app.load().await?;
            let id = form.otp_config_id;
            let notifier = app.notifier.as_ref();
            match command {
                ScheduleCommand::Status => {
                    let status = schedule::schedule_status(&app.client, id, notifier).await?;
                    println!(
                        "Synchronisation automatique: {}",
                        if status.enabled { "activée" } else { "désactivée" }
                    );
                    if let Some(last_run) = status.last_run {
                        println!(
                            "Dernière exécution: {} ({})",
                            last_run,
                            status.last_status.as_deref().unwrap_or("inconnu")
                        );
                    }
                }
                ScheduleCommand::Enable => {
                    schedule::set_auto_sync(&app.client, id, true, notifier).await?
                }
                ScheduleCommand::Disable => {
                    schedule::set_auto_sync(&app.client, id, false, notifier).await?
                }
            }
            Ok(())
        }
        Commands::Sync { no_watch, display } => run_sync(&app, no_watch, display).await,
        Commands::Watch { task_id, display } => {
            let mut controller =
                SyncController::new(app.settings.progress, app.notifier.clone());
            controller.attach(task_id.clone());
            watch(&app, &mut controller, &task_id, &display).await
        }
    }
}

async fn run_config(app: &App, command: ConfigCommand) -> Result<()> {
    let (ctx, mut form) = app.load().await?;

    match command {
        ConfigCommand::Show => {
            let ds = form.ds_token_status();
            let grist = form.grist_key_status();
            let id = form
                .otp_config_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".into());
            println!("Configuration #{}", id);
            println!("  Token Démarches Simplifiées : {}", ds.label);
            println!("  URL API DS                  : {}", form.ds_api_url);
            println!("  Numéro de démarche          : {}", form.demarche_number);
            println!("  URL de base Grist           : {}", form.grist_base_url);
            println!("  Clé API Grist               : {}", grist.label);
            println!("  Document Grist              : {}", form.grist_doc_id);
            println!("  Utilisateur Grist           : {}", form.grist_user_id);
            println!("  Taille des lots             : {}", form.batch_size);
            println!("  Workers                     : {}", form.max_workers);
            println!("  Traitement parallèle        : {}", form.parallel);
            println!("Filtres:");
            print_summary(&stored_filters(&form).summary());
            Ok(())
        }
        ConfigCommand::Check => match form::check_configuration(&form.stored) {
            ConfigCheck::Complete {
                demarche_number,
                grist_doc_id,
            } => {
                println!("Configuration complète");
                println!("Démarche {} → Document Grist {}", demarche_number, grist_doc_id);
                Ok(())
            }
            ConfigCheck::Incomplete { missing } => {
                println!("Configuration incomplète");
                println!("Champs manquants: {}", missing.join(", "));
                anyhow::bail!("configuration incomplete")
            }
        },
        ConfigCommand::Save(args) => {
            if let Some(v) = args.ds_token {
                form.ds_api_token = v;
            }
            if let Some(v) = args.ds_api_url {
                form.ds_api_url = v;
            }
            if let Some(v) = args.demarche {
                form.demarche_number = v;
            }
            if let Some(v) = args.grist_base_url {
                form.grist_base_url = v;
            }
            if let Some(v) = args.grist_key {
                form.grist_api_key = v;
            }
            if let Some(v) = args.batch_size {
                form.batch_size = v;
            }
            if let Some(v) = args.max_workers {
                form.max_workers = v;
            }
            if let Some(v) = args.parallel {
                form.parallel = v;
            }

            let mut manager = stored_filters(&form);
            if !args.filters.is_empty() {
                args.filters.apply_to(&mut manager)?;
            }

            if !args.skip_tests {
                let tester = ConnectionTester::new(&app.client, Some(&ctx), app.notifier.as_ref());
                let grist = tester.test_grist(&form).await;
                if !grist.success {
                    anyhow::bail!("Grist connection test failed: {}", grist.message);
                }
                let ds = tester.test_demarches(&form).await;
                if !ds.success {
                    anyhow::bail!("Démarches Simplifiées connection test failed: {}", ds.message);
                }
            }

            let selection = manager.selection();
            form::save_configuration(&app.client, &mut form, &selection, app.notifier.as_ref())
                .await?;
            Ok(())
        }
        ConfigCommand::Delete { yes } => {
            let confirm = |question: &str| {
                yes || dialoguer::Confirm::new()
                    .with_prompt(question)
                    .default(false)
                    .interact()
                    .unwrap_or(false)
            };
            let notifier = app.notifier.as_ref();
            form::delete_configuration(&app.client, form.otp_config_id, confirm, notifier).await?;
            Ok(())
        }
    }
}

async fn run_filters(app: &App, command: FilterCommand) -> Result<()> {
    let (ctx, mut form) = app.load().await?;
    let mut manager = app.filter_manager(&ctx, &form).await;

    match command {
        FilterCommand::Show => {
            print_summary(&manager.summary());
            return Ok(());
        }
        FilterCommand::Set(args) => {
            args.apply_to(&mut manager)?;
            print_summary(&manager.apply(app.notifier.as_ref()));
        }
        FilterCommand::Reset => manager.reset(app.notifier.as_ref()),
    }

    form::save_configuration(&app.client, &mut form, &manager.selection(), app.notifier.as_ref())
        .await
        .context("Erreur lors de la sauvegarde des filtres")?;
    Ok(())
}

async fn run_test(app: &App, target: TestTarget) -> Result<()> {
    if let TestTarget::Realtime = target {
        let tester = ConnectionTester::new(&app.client, None, app.notifier.as_ref());
        return match tester.test_realtime(app.settings.realtime_timeout()).await {
            RealtimeOutcome::Connected { .. } => Ok(()),
            other => Err(anyhow!(other.message())),
        };
    }

    let (ctx, form) = app.load().await?;
    let tester = ConnectionTester::new(&app.client, Some(&ctx), app.notifier.as_ref());

    let outcomes = match target {
        TestTarget::Demarches => vec![tester.test_demarches(&form).await],
        TestTarget::Grist => vec![tester.test_grist(&form).await],
        TestTarget::All => {
            let report = tester
                .test_external()
                .await
                .context("Erreur lors des tests de connexion")?;
            for (label, outcome) in &report.results {
                println!("{}: {}", label, outcome.message);
            }
            report.results.into_iter().map(|(_, o)| o).collect()
        }
        TestTarget::Realtime => unreachable!("handled above"),
    };

    for outcome in &outcomes {
        if !outcome.success {
            anyhow::bail!("{}", outcome.message);
        }
    }
    Ok(())
}

async fn run_sync(app: &App, no_watch: bool, display: DisplayArgs) -> Result<()> {
    let (ctx, form) = app.load().await?;

    if let ConfigCheck::Incomplete { missing } = form::check_configuration(&form.stored) {
        app.notifier.notify(
            &format!("Configuration incomplète. Champs manquants: {}", missing.join(", ")),
            Severity::Error,
        );
        anyhow::bail!("configuration incomplete");
    }

    let selection = FilterSelection::from_configuration(&form.stored);
    let mut controller = SyncController::new(app.settings.progress, app.notifier.clone());
    let task_id = controller
        .start(&app.client, Some(&form.stored), &selection, &ctx)
        .await?;

    if no_watch {
        println!("{}", task_id);
        return Ok(());
    }
    watch(app, &mut controller, &task_id, &display).await
}

async fn watch(
    app: &App,
    controller: &mut SyncController,
    task_id: &str,
    display: &DisplayArgs,
) -> Result<()> {
    let renderer = ProgressRenderer::new(!display.quiet_logs);

    let polled = app
        .client
        .poll_until_complete(task_id, app.settings.poll_interval(), |snapshot| {
            if let Some(view) = controller.apply_snapshot(snapshot) {
                renderer.render(&view);
            }
        })
        .await;

    if let Err(e) = polled {
        renderer.abandon();
        return Err(e.context(format!("Lost track of task {}", task_id)));
    }

    match controller.state() {
        SyncState::Completed => Ok(()),
        _ => anyhow::bail!("Synchronization {} did not complete", task_id),
    }
}
