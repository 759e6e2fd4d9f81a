// Rust guideline compliant 2026-10-18

//! Loyalty bot entry point.
//!
//! Wires the visit updater to its adapters and runs update cycles until
//! CTRL+C. Receipts come from a synthetic point-of-sale feed over the
//! configured members; rewards land in an in-memory ledger and reward
//! messages are written to the log.
//!
//! # Usage
//!
//! ```text
//! # Defaults, or ./loyalty_bot.yaml when present
//! RUST_LOG=info cargo run --bin loyalty_bot
//!
//! # Explicit configuration file
//! LOYALTY_BOT_CONFIG=demo.yaml RUST_LOG=debug cargo run --bin loyalty_bot
//! ```

mod adapters;
mod config;

use adapters::demo_receipt_pages::DemoReceiptPages;
use adapters::in_memory_directory::InMemoryDirectory;
use adapters::in_memory_ledger::InMemoryLedger;
use adapters::log_messenger::LogMessenger;
use adapters::sqlite_directory::SqliteDirectory;
use anyhow::Context as _;
use config::{BotConfig, DirectoryBackend};
use domain::{
    Clock, Ledger, Messenger, ReceiptSource, SystemClock, Timestamp, User, UserDirectory,
};
use receipts::{GeneratorConfig, PagedReceiptSource, PagingConfig, ReceiptGenerator};
use scheduler::{VisitUpdater, VisitUpdaterConfig};
use tracing::Instrument as _;
use visits::VisitCalculator;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = BotConfig::load().context("failed to load configuration")?;
    let offset = config.offset()?;
    let visit_time = config.visit_time()?;
    let calculator = config.calculator().context("invalid checkpoint configuration")?;
    let clock = SystemClock::new(offset);
    let members = config.members();

    // -- Receipt feed: synthetic sales for the configured members --
    let mut generator_config = GeneratorConfig::builder(config.demo.max_receipts_per_cycle)
        .walk_in_percent(config.demo.walk_in_percent);
    if let Some(seed) = config.seed {
        generator_config = generator_config.seed(seed);
    }
    let customers = members.iter().filter_map(User::loyalty_id).map(str::to_owned).collect();
    let generator = ReceiptGenerator::new(
        generator_config.build().context("failed to build receipt generator config")?,
        customers,
    );
    let paging = PagingConfig::builder()
        .page_size(config.demo.page_size)
        .max_pages(config.demo.max_pages)
        .build()
        .context("failed to build paging config")?;
    let source = PagedReceiptSource::new(DemoReceiptPages::new(generator, clock), paging);

    // -- Ledger and messenger --
    let ledger = InMemoryLedger::with_accounts(members.iter().filter_map(User::loyalty_id));
    let messenger = LogMessenger::new();

    // -- Visit updater --
    let mut updater_config = VisitUpdaterConfig::builder().interval(config.interval());
    if let Some(n) = config.iterations {
        updater_config = updater_config.iterations(n);
    }
    if let Some(seed) = config.seed {
        updater_config = updater_config.seed(seed);
    }
    let updater = VisitUpdater::new(
        updater_config.build().context("failed to build visit updater config")?,
        calculator,
        clock,
    );

    match &config.directory {
        DirectoryBackend::Memory => {
            let directory = InMemoryDirectory::new(members.clone());
            serve(&updater, &source, &directory, &ledger, &messenger).await;
            report(updater.calculator(), clock.now(), &members, &directory, &ledger).await
        }
        DirectoryBackend::Sqlite { url } => {
            let directory = SqliteDirectory::new(url, offset, visit_time)
                .await
                .with_context(|| format!("failed to open SQLite directory {url}"))?;
            directory.seed(&members).await.context("failed to seed members")?;
            serve(&updater, &source, &directory, &ledger, &messenger).await;
            report(updater.calculator(), clock.now(), &members, &directory, &ledger).await
        }
    }
}

/// Run update cycles until CTRL+C or the configured iteration limit.
async fn serve<C, S, D, L, M>(
    updater: &VisitUpdater<C>,
    source: &S,
    directory: &D,
    ledger: &L,
    messenger: &M,
) where
    C: Clock,
    S: ReceiptSource,
    D: UserDirectory,
    L: Ledger,
    M: Messenger,
{
    let cycles = updater
        .run(source, directory, ledger, messenger)
        .instrument(tracing::info_span!("visit_updater"));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("main.shutdown: ctrl_c received");
        }
        () = cycles => {
            tracing::info!("main.shutdown: updater finished");
        }
    }
}

/// Log each member's visit status and balance, as they would be told in chat.
async fn report<D: UserDirectory, L: Ledger>(
    calculator: &VisitCalculator,
    now: Timestamp,
    members: &[User],
    directory: &D,
    ledger: &L,
) -> anyhow::Result<()> {
    for member in members {
        let Some(loyalty_id) = member.loyalty_id() else {
            continue;
        };
        let Some(user) = directory.get_by_loyalty_id(loyalty_id).await? else {
            continue;
        };
        let status = notifier::visit_status(&user, &now, calculator);
        let balance = match ledger.balance(&user).await {
            Ok(points) => notifier::balance_reply(points),
            Err(error) => error.to_string(),
        };
        let greeting = user.main_alias().unwrap_or_else(|| user.first_name());
        tracing::info!(user = user.full_name(), greeting, %status, %balance, "main.member.summary");
    }
    Ok(())
}
