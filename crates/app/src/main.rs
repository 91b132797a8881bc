use std::error::Error;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use engine::{
    Bank, Category, CreateTransactionCmd, Currency, Engine, EngineError, InstrumentKind,
    InstrumentRef, Money, NewInstrument, PaymentMethod, StaticPrincipal, TransactionKind,
    TransactionListFilter, TransactionState, WalletProvider,
};
use migration::{Migrator, MigratorTrait};
use serde::Serialize;
use settings::Database;
use uuid::Uuid;

mod settings;

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "fintrack")]
#[command(about = "Operator tool for the fintrack transaction engine")]
struct Cli {
    /// Principal the command acts for (also read from `FINTRACK_USER`).
    #[arg(long, global = true, env = "FINTRACK_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations and exit.
    Migrate,
    Instrument(Instrument),
    Tx(Tx),
}

#[derive(Args, Debug)]
struct Instrument {
    #[command(subcommand)]
    command: InstrumentCommand,
}

#[derive(Subcommand, Debug)]
enum InstrumentCommand {
    Open(OpenArgs),
    Show {
        /// `<kind>:<uuid>`, e.g. `account:6f1c...`.
        reference: InstrumentRef,
    },
    /// Overwrite a balance with the externally reported value.
    Sync {
        reference: InstrumentRef,
        balance: Money,
    },
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(long, value_parser = parse_with::<InstrumentKind>)]
    kind: InstrumentKind,
    #[arg(long)]
    name: String,
    #[arg(long, value_parser = parse_with::<Currency>)]
    currency: Currency,
    #[arg(long, default_value = "0")]
    balance: Money,
    #[arg(long, value_parser = parse_with::<Bank>)]
    bank: Option<Bank>,
    #[arg(long, value_parser = parse_with::<WalletProvider>)]
    provider: Option<WalletProvider>,
}

#[derive(Args, Debug)]
struct Tx {
    #[command(subcommand)]
    command: TxCommand,
}

#[derive(Subcommand, Debug)]
enum TxCommand {
    Create(CreateArgs),
    Show {
        id: Uuid,
    },
    List(ListArgs),
    Submit(EventArgs),
    Confirm(EventArgs),
    Reject(EventArgs),
    Cancel(EventArgs),
    Reconcile(EventArgs),
    /// Delete a never-confirmed transaction and reverse its balances.
    Delete {
        id: Uuid,
    },
    Flag {
        id: Uuid,
        #[arg(long)]
        reason: String,
    },
    /// Mark a flagged transaction as reviewed.
    Unflag {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    amount: Money,
    #[arg(long, value_parser = parse_with::<Currency>)]
    currency: Currency,
    #[arg(long, value_parser = parse_with::<TransactionKind>)]
    kind: Option<TransactionKind>,
    #[arg(long, value_parser = parse_with::<Category>)]
    category: Option<Category>,
    #[arg(long)]
    from: Option<InstrumentRef>,
    #[arg(long)]
    to: Option<InstrumentRef>,
    #[arg(long)]
    contact: Option<String>,
    #[arg(long, value_parser = parse_with::<PaymentMethod>)]
    method: Option<PaymentMethod>,
    #[arg(long)]
    description: Option<String>,
    /// RFC 3339; defaults to now.
    #[arg(long)]
    occurred_at: Option<DateTime<Utc>>,
    #[arg(long)]
    idempotency_key: Option<String>,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long = "state", value_parser = parse_with::<TransactionState>)]
    states: Vec<TransactionState>,
    #[arg(long = "kind", value_parser = parse_with::<TransactionKind>)]
    kinds: Vec<TransactionKind>,
    #[arg(long)]
    flagged: bool,
    #[arg(long, default_value_t = 20)]
    limit: u64,
    #[arg(long)]
    cursor: Option<String>,
}

#[derive(Args, Debug)]
struct EventArgs {
    id: Uuid,
    #[arg(long)]
    note: Option<String>,
}

fn parse_with<T>(raw: &str) -> Result<T, String>
where
    T: for<'a> TryFrom<&'a str, Error = EngineError>,
{
    T::try_from(raw).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "fintrack={level},engine={level}",
            level = settings.app.level
        ))
        .with_writer(std::io::stderr)
        .init();

    let db = parse_database(&settings.database).await?;
    if matches!(cli.command, Command::Migrate) {
        tracing::info!("migrations applied");
        return Ok(());
    }

    let engine = Engine::builder()
        .database(db)
        .config(settings.engine)
        .build()
        .await
        .map_err(public)?;
    let session = match cli.user {
        Some(user) => StaticPrincipal::new(user),
        None => StaticPrincipal::anonymous(),
    };

    match cli.command {
        Command::Migrate => Ok(()),
        Command::Instrument(instrument) => run_instrument(&engine, &session, instrument.command).await,
        Command::Tx(tx) => run_tx(&engine, &session, tx.command).await,
    }
}

async fn run_instrument(
    engine: &Engine,
    session: &StaticPrincipal,
    command: InstrumentCommand,
) -> Result<(), BoxError> {
    match command {
        InstrumentCommand::Open(args) => {
            let new = match args.kind {
                InstrumentKind::Account => {
                    NewInstrument::account(args.name, args.currency, args.balance)
                }
                InstrumentKind::BankAccount => {
                    let bank = args.bank.ok_or("--bank is required for bank accounts")?;
                    NewInstrument::bank_account(args.name, bank, args.currency, args.balance)
                }
                InstrumentKind::Wallet => {
                    let provider = args.provider.ok_or("--provider is required for wallets")?;
                    NewInstrument::wallet(args.name, provider, args.currency, args.balance)
                }
            };
            print_json(&engine.open_instrument(session, new).await.map_err(public)?)
        }
        InstrumentCommand::Show { reference } => {
            print_json(&engine.instrument(session, reference).await.map_err(public)?)
        }
        InstrumentCommand::Sync { reference, balance } => print_json(
            &engine
                .sync_balance(session, reference, balance)
                .await
                .map_err(public)?,
        ),
    }
}

async fn run_tx(engine: &Engine, session: &StaticPrincipal, command: TxCommand) -> Result<(), BoxError> {
    match command {
        TxCommand::Create(args) => {
            let mut cmd = CreateTransactionCmd::new(
                args.amount,
                args.currency,
                args.occurred_at.unwrap_or_else(Utc::now),
            );
            cmd.kind = args.kind;
            cmd.category = args.category;
            cmd.source = args.from;
            cmd.target = args.to;
            cmd.contact_id = args.contact;
            cmd.payment_method = args.method;
            cmd.description = args.description;
            cmd.idempotency_key = args.idempotency_key;
            print_json(&engine.create_transaction(session, cmd).await.map_err(public)?)
        }
        TxCommand::Show { id } => {
            let (group, metadata) = tokio::try_join!(
                engine.transaction_group(session, id),
                engine.transaction_metadata(session, id),
            )
            .map_err(public)?;
            print_json(&serde_json::json!({ "transactions": group, "metadata": metadata }))
        }
        TxCommand::List(args) => {
            let filter = TransactionListFilter {
                states: (!args.states.is_empty()).then_some(args.states),
                kinds: (!args.kinds.is_empty()).then_some(args.kinds),
                flagged_only: args.flagged,
                ..TransactionListFilter::default()
            };
            let (items, next_cursor) = engine
                .list_transactions(session, &filter, args.limit, args.cursor.as_deref())
                .await
                .map_err(public)?;
            print_json(&serde_json::json!({ "items": items, "next_cursor": next_cursor }))
        }
        TxCommand::Submit(args) => print_json(
            &engine
                .submit(session, args.id, args.note.as_deref())
                .await
                .map_err(public)?,
        ),
        TxCommand::Confirm(args) => print_json(
            &engine
                .confirm(session, args.id, args.note.as_deref())
                .await
                .map_err(public)?,
        ),
        TxCommand::Reject(args) => print_json(
            &engine
                .reject(session, args.id, args.note.as_deref())
                .await
                .map_err(public)?,
        ),
        TxCommand::Cancel(args) => print_json(
            &engine
                .cancel(session, args.id, args.note.as_deref())
                .await
                .map_err(public)?,
        ),
        TxCommand::Reconcile(args) => print_json(
            &engine
                .reconcile(session, args.id, args.note.as_deref())
                .await
                .map_err(public)?,
        ),
        TxCommand::Delete { id } => {
            engine.delete_transaction(session, id).await.map_err(public)?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        TxCommand::Flag { id, reason } => print_json(
            &engine
                .flag_transaction(session, id, &reason)
                .await
                .map_err(public)?,
        ),
        TxCommand::Unflag { id } => {
            print_json(&engine.clear_flag(session, id).await.map_err(public)?)
        }
    }
}

/// Engine errors reach the operator through their public message only.
fn public(err: EngineError) -> BoxError {
    tracing::debug!(kind = err.kind().as_str(), "engine error: {err}");
    err.public_message().into()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn parse_database(config: &Database) -> Result<sea_orm::DatabaseConnection, BoxError> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
