//! costbook - usage-accounting ledger for metered AI usage

use chrono::Utc;
use clap::Parser;
use costbook::{
    cli::{
        Cli, Command, LedgerArgs, RecordArgs, SettingsCommand, UserCommand, parse_date_range,
        parse_day, parse_timestamp,
    },
    import::Importer,
    ledger::Ledger,
    output::get_formatter,
    payments::PaymentBook,
    settings::SettingsBook,
};
use costbook_core::error::{LedgerError, Result};
use costbook_core::store::LedgerStore;
use costbook_core::types::UsageEvent;
use costbook_pricing::{CostCalculator, PricingTable};
use costbook_store::{JsonFileStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Open the configured store
async fn open_store(args: &LedgerArgs) -> Result<Arc<dyn LedgerStore>> {
    if args.in_memory {
        info!("Using in-memory ledger");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let path = args.data_path()?;
    info!("Using ledger file {}", path.display());
    Ok(Arc::new(JsonFileStore::open(path).await?))
}

/// Load the configured pricing table
fn load_pricing(args: &LedgerArgs) -> Result<Arc<CostCalculator>> {
    let table = match &args.pricing {
        Some(path) => PricingTable::from_file(path)?,
        None => PricingTable::builtin(),
    };
    Ok(Arc::new(CostCalculator::new(Arc::new(table))))
}

fn usage_event(args: RecordArgs) -> Result<UsageEvent> {
    let timestamp = match &args.at {
        Some(ts) => parse_timestamp(ts)?,
        None => Utc::now(),
    };
    let mut event = UsageEvent::new(args.user, args.category, args.quantity, timestamp);
    if let Some(id) = args.event_id {
        event = event.with_event_id(id);
    }
    if let Some(model) = args.model {
        event = event.with_model(model);
    }
    if let Some(name) = args.name {
        event = event.with_user_name(name);
    }
    Ok(event)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first to check for quiet flag
    let cli = Cli::parse();

    // Initialize logging. The --quiet flag should override RUST_LOG.
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("warn")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("costbook=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.ledger.to_config()?;
    info!("Using timezone: {}", config.timezone.display_name());
    let retry = config.retry;

    let store = open_store(&cli.ledger).await?;
    let pricing = load_pricing(&cli.ledger)?;
    let ledger = Arc::new(Ledger::new(Arc::clone(&store), pricing, config));
    let formatter = get_formatter(cli.json);

    match cli.command {
        Command::Record(args) => {
            let outcome = ledger.record_usage(usage_event(args)?).await?;
            println!("{}", formatter.format_record(&outcome));
        }
        Command::Import { file, concurrency } => {
            let show_progress = !cli.json && is_terminal::is_terminal(std::io::stderr());
            let report = Importer::new(Arc::clone(&ledger))
                .with_concurrency(concurrency)
                .with_progress(show_progress)
                .import_file(&file)
                .await?;
            println!("{}", formatter.format_import(&report));
        }
        Command::Costs { user } => {
            let costs = ledger.get_current_costs(user).await?;
            println!("{}", formatter.format_costs(&costs));
        }
        Command::Budget { user } => {
            let budget = ledger.remaining_budget(user).await?;
            println!("{}", formatter.format_budget(&budget));
        }
        Command::History { user, since, until } => {
            let range = parse_date_range(since.as_deref(), until.as_deref())?;
            let entries = ledger.get_history(user, &range).await?;
            println!("{}", formatter.format_history(&entries));
        }
        Command::Summary { user, date } => {
            let as_of = date.as_deref().map(parse_day).transpose()?;
            let summary = ledger.usage_summary(user, as_of).await?;
            println!("{}", formatter.format_summary(&summary));
        }
        Command::Reconcile { user, repair } => {
            let users = match user {
                Some(user) => vec![user],
                None => store
                    .list_users()
                    .await?
                    .into_iter()
                    .map(|u| u.user_id)
                    .collect(),
            };
            for user in users {
                let mut reconciliation = ledger.reconcile(user).await?;
                if repair && !reconciliation.is_consistent() {
                    reconciliation = ledger.repair_all_time(user).await?;
                }
                println!("{}", formatter.format_reconciliation(&reconciliation));
            }
        }
        Command::Sweep { date, every } => {
            let as_of = date.as_deref().map(parse_day).transpose()?;
            let report = ledger.sweep(as_of).await?;
            println!("{}", formatter.format_sweep(&report));
            if let Some(seconds) = every {
                info!("Sweeping every {} seconds; press Ctrl-C to stop", seconds);
                let handle = Arc::clone(&ledger).spawn_periodic_sweep(Duration::from_secs(seconds));
                tokio::signal::ctrl_c().await?;
                handle.abort();
            }
        }
        Command::User { command } => match command {
            UserCommand::Add { user, name } => {
                let user = ledger.ensure_user(user, Some(name.as_str())).await?;
                println!("{}", formatter.format_user(&user));
            }
            UserCommand::List => {
                for user in store.list_users().await? {
                    println!("{}", formatter.format_user(&user));
                }
            }
        },
        Command::Pay {
            user,
            amount,
            method,
        } => {
            let book = PaymentBook::new(Arc::clone(&store), retry);
            let payment_id = book.record_payment(user, amount, &method).await?;
            let payment = book.get_payment(payment_id).await?;
            println!("{}", formatter.format_payments(&[payment]));
        }
        Command::PaymentStatus { payment_id, status } => {
            let book = PaymentBook::new(Arc::clone(&store), retry);
            let payment = match status {
                Some(status) => book.update_payment_status(payment_id, status).await?,
                None => book.get_payment(payment_id).await?,
            };
            println!("{}", formatter.format_payments(&[payment]));
        }
        Command::Payments { user } => {
            let book = PaymentBook::new(Arc::clone(&store), retry);
            let payments = book.list_payments(user).await?;
            println!("{}", formatter.format_payments(&payments));
        }
        Command::Settings { command } => {
            let book = SettingsBook::new(Arc::clone(&store));
            match command {
                SettingsCommand::Get { user } => {
                    let settings = book.get_settings(user).await?;
                    println!("{}", formatter.format_settings(settings.as_ref()));
                }
                SettingsCommand::Set { user, model, brain } => {
                    let settings = match (model, brain) {
                        (Some(model), Some(brain)) => book.set_settings(user, &model, &brain).await?,
                        (Some(model), None) => book.update_model(user, &model).await?,
                        (None, Some(brain)) => book.update_brain(user, &brain).await?,
                        (None, None) => {
                            return Err(LedgerError::InvalidArgument(
                                "pass --model, --brain or both".to_string(),
                            ));
                        }
                    };
                    println!("{}", formatter.format_settings(Some(&settings)));
                }
            }
        }
    }

    Ok(())
}
