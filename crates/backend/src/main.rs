#![allow(clippy::too_many_arguments, clippy::type_complexity)]

pub mod domain;
pub mod shared;
pub mod system;
pub mod usecases;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use contracts::domain::a101_store::aggregate::{StoreCredentials, StoreId};
use contracts::enums::marketplace_type::MarketplaceType;
use contracts::usecases::common::{ReportKind, ReportRequest};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use domain::a101_store::StoreRegistry;
use shared::config::{load_config, resolve_path, Config};
use shared::marketplaces::{test_credentials, test_store_connection};
use shared::sheets::client::GoogleSheetsClient;
use shared::sheets::{GoogleSheetOpener, SheetStore};
use shared::telegram::TelegramNotifier;
use system::tasks::logger::TaskLogger;
use system::tasks::progress_tracker::ProgressTracker;
use system::tasks::queue::ReportQueue;
use system::tasks::runner::{ReportJob, ReportRunner};
use system::tasks::store_worker::StoreWorkers;
use usecases::common::{CancelFlag, ReportRegistry};

/// Период сверки исполнителей со списком магазинов
const STORE_SYNC_PERIOD: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "mp-reports", about = "Отчёты Ozon / Wildberries в Google Sheets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Пул исполнителей и автоцикл для всех магазинов
    Serve,
    /// Построить один отчёт и дождаться результата
    Run {
        store_id: String,
        /// unit_day | ad_spend | balance | fin_week
        report: ReportKind,
        /// Чат Telegram для сообщений о ходе
        #[arg(long)]
        chat: Option<i64>,
    },
    /// Реестр магазинов в тех-таблице
    Stores {
        #[command(subcommand)]
        command: StoresCommand,
    },
    /// Проверить ключи магазина
    Ping { store_id: String },
}

#[derive(Subcommand)]
enum StoresCommand {
    List {
        /// Только магазины пользователя
        #[arg(long)]
        owner: Option<i64>,
    },
    Add {
        #[arg(long)]
        owner: i64,
        /// ozon | wb
        #[arg(long, value_parser = parse_marketplace)]
        marketplace: MarketplaceType,
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long, env = "MP_API_KEY")]
        api_key: String,
        #[arg(long)]
        perf_client_id: Option<String>,
        #[arg(long)]
        perf_client_secret: Option<String>,
        /// ID таблицы магазина
        #[arg(long)]
        sheet_id: String,
        /// Не проверять ключи перед сохранением
        #[arg(long)]
        skip_check: bool,
    },
    Rename { store_id: String, name: String },
    Delete { store_id: String },
}

fn parse_marketplace(raw: &str) -> Result<MarketplaceType, String> {
    MarketplaceType::from_code(raw).ok_or_else(|| format!("Unknown marketplace: {}", raw))
}

async fn open_tech_sheet(config: &Config) -> Result<Arc<dyn SheetStore>> {
    if config.tech_sheet.id.trim().is_empty() {
        anyhow::bail!("tech_sheet.id is not configured (TECH_SHEET_ID)");
    }
    let sa_path = resolve_path(&config.tech_sheet.admin_sa_json);
    let client = GoogleSheetsClient::open(&sa_path, &config.tech_sheet.id)
        .await
        .with_context(|| format!("Cannot open tech sheet with {}", sa_path.display()))?;
    tracing::info!("Tech sheet opened as {}", client.service_account_email());
    Ok(Arc::new(client))
}

fn build_runner(config: &Config, log_dir: PathBuf) -> Result<Arc<ReportRunner>> {
    Ok(Arc::new(ReportRunner::new(
        ReportRegistry::with_defaults(),
        Arc::new(GoogleSheetOpener),
        Arc::new(TelegramNotifier::new(config.telegram.bot_token.clone())?),
        Arc::new(ProgressTracker::new()),
        Arc::new(TaskLogger::new(log_dir)),
        config.reports.clone(),
    )))
}

/// Запустить исполнителей новых магазинов и остановить удалённые
async fn sync_workers(registry: &StoreRegistry, workers: &StoreWorkers) -> Result<()> {
    let stores = registry.list_all().await?;
    let active: HashSet<String> = stores.iter().map(|s| s.store_id.to_string()).collect();
    for store in &stores {
        workers.get_or_start(store)?;
    }
    for store_id in workers.store_ids() {
        if !active.contains(&store_id) && workers.remove(&store_id) {
            tracing::info!("[{}] store removed, worker stopped", store_id);
        }
    }
    Ok(())
}

async fn serve(config: Config, log_dir: PathBuf) -> Result<()> {
    let registry = StoreRegistry::new(open_tech_sheet(&config).await?);
    let runner = build_runner(&config, log_dir)?;
    let queue = ReportQueue::start(runner.clone(), config.workers.count);
    let autoloop = Duration::from_secs(config.workers.autoloop_minutes.max(1) * 60);
    let workers = Arc::new(StoreWorkers::new(
        queue,
        runner.notifier().clone(),
        Some(autoloop),
    ));

    let sync = {
        let workers = workers.clone();
        tokio::spawn(async move {
            let mut ticker = interval(STORE_SYNC_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match sync_workers(&registry, &workers).await {
                    Ok(()) => tracing::debug!("{} store workers active", workers.len()),
                    Err(e) => tracing::error!("Store list sync failed: {:#}", e),
                }
            }
        })
    };

    tracing::info!(
        "Serving: {} workers, auto chain every {} min",
        config.workers.count,
        config.workers.autoloop_minutes
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    sync.abort();
    for store_id in workers.store_ids() {
        workers.remove(&store_id);
    }
    Ok(())
}

async fn run_once(
    config: Config,
    log_dir: PathBuf,
    store_id: String,
    report: ReportKind,
    chat: Option<i64>,
) -> Result<()> {
    let registry = StoreRegistry::new(open_tech_sheet(&config).await?);
    let store_id = StoreId::new(store_id);
    let store = registry
        .get(&store_id)
        .await?
        .with_context(|| format!("Store {} not found", store_id))?;
    let runner = build_runner(&config, log_dir)?;
    let job = ReportJob {
        store,
        request: ReportRequest::new(store_id, report, chat),
        cancel: CancelFlag::new(),
    };
    let outcome = runner.run(job).await?;
    println!(
        "{}: {} rows, {} cells{}",
        report.display_name(),
        outcome.rows_written,
        outcome.cells_updated,
        outcome.note.map(|n| format!(" ({})", n)).unwrap_or_default()
    );
    Ok(())
}

async fn stores(config: Config, command: StoresCommand) -> Result<()> {
    let registry = StoreRegistry::new(open_tech_sheet(&config).await?);
    match command {
        StoresCommand::List { owner } => {
            let rows: Vec<(String, String, String)> = match owner {
                Some(owner) => registry
                    .list_by_owner(owner)
                    .await?
                    .into_iter()
                    .map(|s| (s.store_id.to_string(), s.marketplace.code().to_string(), s.name))
                    .collect(),
                None => registry
                    .list_all()
                    .await?
                    .into_iter()
                    .map(|s| (s.store_id.to_string(), s.marketplace.code().to_string(), s.name))
                    .collect(),
            };
            for (id, mp, name) in &rows {
                println!("{:<40} {:<5} {}", id, mp, name);
            }
            println!("Total: {}", rows.len());
        }
        StoresCommand::Add {
            owner,
            marketplace,
            client_id,
            api_key,
            perf_client_id,
            perf_client_secret,
            sheet_id,
            skip_check,
        } => {
            let credentials = StoreCredentials {
                client_id,
                api_key,
                perf_client_id,
                perf_client_secret,
            };
            if !skip_check {
                let check = test_credentials(marketplace, &credentials).await;
                if !check.success {
                    anyhow::bail!(
                        "{}{}",
                        check.message,
                        check.details.map(|d| format!(": {}", d)).unwrap_or_default()
                    );
                }
                println!("✅ {}", check.message);
            }
            let store = registry
                .add_store(owner, marketplace, credentials, sheet_id)
                .await?;
            println!("Store {} ({}) added, SA {}", store.store_id, store.name, store.sa_path);
        }
        StoresCommand::Rename { store_id, name } => {
            if !registry.rename_store(&StoreId::new(store_id.clone()), &name).await? {
                anyhow::bail!("Store {} not found", store_id);
            }
            println!("Store {} renamed to {}", store_id, name.trim());
        }
        StoresCommand::Delete { store_id } => {
            if !registry.delete_store(&StoreId::new(store_id.clone())).await? {
                anyhow::bail!("Store {} not found", store_id);
            }
            println!("Store {} deleted", store_id);
        }
    }
    Ok(())
}

async fn ping(config: Config, store_id: String) -> Result<()> {
    let registry = StoreRegistry::new(open_tech_sheet(&config).await?);
    let store = registry
        .get(&StoreId::new(store_id.clone()))
        .await?
        .with_context(|| format!("Store {} not found", store_id))?;
    let result = test_store_connection(&store).await;
    if result.success {
        println!("✅ {}", result.message);
        Ok(())
    } else {
        anyhow::bail!(
            "{}{}",
            result.message,
            result.details.map(|d| format!(": {}", d)).unwrap_or_default()
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_dir = system::tracing::initialize()?;
    let config = load_config()?;

    match cli.command {
        Command::Serve => serve(config, log_dir).await,
        Command::Run {
            store_id,
            report,
            chat,
        } => run_once(config, log_dir, store_id, report, chat).await,
        Command::Stores { command } => stores(config, command).await,
        Command::Ping { store_id } => ping(config, store_id).await,
    }
}
