use chrono::Utc;
use sea_orm::{Database, DatabaseConnection};

use engine::{
    Bank, BreakerState, Category, CreateTransactionCmd, Currency, Engine, EngineConfig,
    EngineError, ErrorKind, Instrument, Money, NewInstrument, PaymentMethod, StaticPrincipal,
    SuspicionConfig, TransactionEvent, TransactionKind, TransactionListFilter, TransactionState,
    TransferLeg, WalletProvider,
};
use migration::MigratorTrait;
use uuid::Uuid;

async fn memory_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

async fn engine_with_db() -> Engine {
    Engine::builder()
        .database(memory_db().await)
        .build()
        .await
        .unwrap()
}

async fn engine_with_file_db() -> (Engine, DatabaseConnection, String, std::path::PathBuf) {
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();

    let path = root.join(format!("engine_{}.db", Uuid::new_v4()));
    let url = format!("sqlite:{}?mode=rwc", path.display());

    let db = Database::connect(&url).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();

    (engine, db, url, path)
}

fn alice() -> StaticPrincipal {
    StaticPrincipal::new("alice")
}

fn money(raw: &str) -> Money {
    raw.parse().unwrap()
}

async fn open_account(
    engine: &Engine,
    session: &StaticPrincipal,
    name: &str,
    currency: Currency,
    balance: &str,
) -> Instrument {
    engine
        .open_instrument(session, NewInstrument::account(name, currency, money(balance)))
        .await
        .unwrap()
}

async fn balance_of(engine: &Engine, session: &StaticPrincipal, instrument: &Instrument) -> Money {
    engine
        .instrument(session, instrument.reference)
        .await
        .unwrap()
        .balance
}

#[tokio::test]
async fn own_account_transfer_writes_two_legs_and_moves_both_balances() {
    let engine = engine_with_db().await;
    let session = alice();
    let checking = open_account(&engine, &session, "Checking", Currency::Ars, "1000").await;
    let savings = open_account(&engine, &session, "Savings", Currency::Ars, "200").await;

    let outflow = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("500"), Currency::Ars, Utc::now())
                .from(checking.reference)
                .to(savings.reference),
        )
        .await
        .unwrap();

    assert_eq!(outflow.kind, TransactionKind::TransferOwnAccounts);
    assert!(outflow.is_transfer_between_own_accounts);
    assert_eq!(outflow.transfer_leg, Some(TransferLeg::Outflow));
    assert_eq!(outflow.state, TransactionState::Draft);
    assert!(outflow.idempotency_key.ends_with(":outflow"));

    let group = engine.transaction_group(&session, outflow.id).await.unwrap();
    assert_eq!(group.len(), 2);
    let inflow = &group[1];
    assert_eq!(inflow.transfer_leg, Some(TransferLeg::Inflow));
    assert_eq!(inflow.transfer_group_id, outflow.transfer_group_id);
    assert!(outflow.transfer_group_id.is_some());
    assert_eq!(inflow.state, TransactionState::Draft);
    assert!(inflow.idempotency_key.ends_with(":inflow"));

    assert_eq!(balance_of(&engine, &session, &checking).await, money("500"));
    assert_eq!(balance_of(&engine, &session, &savings).await, money("700"));

    // Both legs carry their own moderation row.
    for tx in &group {
        let metadata = engine.transaction_metadata(&session, tx.id).await.unwrap();
        assert!(!metadata.is_flagged);
    }
}

#[tokio::test]
async fn repeated_create_returns_the_stored_transaction() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;

    let cmd = CreateTransactionCmd::new(money("250"), Currency::Ars, Utc::now())
        .from(cash.reference)
        .description("Supermercado");
    let first = engine.create_transaction(&session, cmd.clone()).await.unwrap();
    let second = engine.create_transaction(&session, cmd).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(balance_of(&engine, &session, &cash).await, money("750"));

    let (items, next) = engine
        .list_transactions(&session, &TransactionListFilter::default(), 10, None)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert!(next.is_none());
}

#[tokio::test]
async fn repeated_own_account_transfer_writes_nothing_new() {
    let engine = engine_with_db().await;
    let session = alice();
    let checking = open_account(&engine, &session, "Checking", Currency::Ars, "1000").await;
    let savings = open_account(&engine, &session, "Savings", Currency::Ars, "200").await;

    let cmd = CreateTransactionCmd::new(money("500"), Currency::Ars, Utc::now())
        .from(checking.reference)
        .to(savings.reference);
    let first = engine.create_transaction(&session, cmd.clone()).await.unwrap();
    let second = engine.create_transaction(&session, cmd).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.transfer_leg, Some(TransferLeg::Outflow));

    let (items, _) = engine
        .list_transactions(&session, &TransactionListFilter::default(), 10, None)
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(balance_of(&engine, &session, &checking).await, money("500"));
    assert_eq!(balance_of(&engine, &session, &savings).await, money("700"));
}

#[tokio::test]
async fn explicit_idempotency_key_wins_over_field_changes() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;

    let first = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("100"), Currency::Ars, Utc::now())
                .from(cash.reference)
                .idempotency_key("order-77"),
        )
        .await
        .unwrap();
    let replay = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("100"), Currency::Ars, Utc::now())
                .from(cash.reference)
                .description("retried from another device")
                .idempotency_key("order-77"),
        )
        .await
        .unwrap();

    assert_eq!(first.id, replay.id);
    assert_eq!(first.idempotency_key, "order-77");
    assert_eq!(balance_of(&engine, &session, &cash).await, money("900"));
}

#[tokio::test]
async fn confirm_on_draft_is_rejected_and_state_is_kept() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;
    let tx = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("10"), Currency::Ars, Utc::now()).from(cash.reference),
        )
        .await
        .unwrap();

    let err = engine.confirm(&session, tx.id, None).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidTransition {
            event: TransactionEvent::Confirm,
            state: TransactionState::Draft,
        }
    );
    assert_eq!(err.kind(), ErrorKind::Validation);

    let stored = engine.transaction(&session, tx.id).await.unwrap();
    assert_eq!(stored.state, TransactionState::Draft);
    assert_eq!(stored.state_context, tx.state_context);
}

#[tokio::test]
async fn currency_mismatch_writes_nothing() {
    let engine = engine_with_db().await;
    let session = alice();
    let dollars = open_account(&engine, &session, "Dollars", Currency::Usd, "100").await;

    let err = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("50"), Currency::Ars, Utc::now())
                .from(dollars.reference),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CurrencyMismatch(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(balance_of(&engine, &session, &dollars).await, money("100"));
    let (items, _) = engine
        .list_transactions(&session, &TransactionListFilter::default(), 10, None)
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn rejected_transactions_keep_the_booked_amount() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;
    let tx = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("100"), Currency::Ars, Utc::now()).from(cash.reference),
        )
        .await
        .unwrap();

    engine.submit(&session, tx.id, None).await.unwrap();
    let rejected = engine
        .reject(&session, tx.id, Some("card declined"))
        .await
        .unwrap();

    assert_eq!(rejected.state, TransactionState::Failed);
    assert_eq!(balance_of(&engine, &session, &cash).await, money("900"));

    // Deleting is what gives the money back.
    engine.delete_transaction(&session, tx.id).await.unwrap();
    assert_eq!(balance_of(&engine, &session, &cash).await, money("1000"));
}

#[tokio::test]
async fn lifecycle_records_timestamps_and_notes() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;
    let tx = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("10"), Currency::Ars, Utc::now()).from(cash.reference),
        )
        .await
        .unwrap();
    assert!(tx.state_context.contains_key("created_at"));

    engine.submit(&session, tx.id, None).await.unwrap();
    engine
        .confirm(&session, tx.id, Some("matched bank statement"))
        .await
        .unwrap();
    let reconciled = engine.reconcile(&session, tx.id, None).await.unwrap();

    assert_eq!(reconciled.state, TransactionState::Reconciled);
    for key in ["created_at", "pending_at", "confirmed_at", "reconciled_at"] {
        assert!(reconciled.state_context.contains_key(key), "missing {key}");
    }
    assert_eq!(
        reconciled.state_context["confirm_note"],
        serde_json::json!("matched bank statement")
    );
    assert_eq!(
        reconciled.state_context["last_event"],
        serde_json::json!("RECONCILE")
    );

    let stored = engine.transaction(&session, tx.id).await.unwrap();
    assert_eq!(stored.state, TransactionState::Reconciled);
    assert_eq!(stored.state_context, reconciled.state_context);
}

#[tokio::test]
async fn transfer_events_move_both_legs() {
    let engine = engine_with_db().await;
    let session = alice();
    let checking = open_account(&engine, &session, "Checking", Currency::Ars, "1000").await;
    let savings = open_account(&engine, &session, "Savings", Currency::Ars, "0").await;
    let outflow = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("300"), Currency::Ars, Utc::now())
                .from(checking.reference)
                .to(savings.reference),
        )
        .await
        .unwrap();
    let inflow_id = engine.transaction_group(&session, outflow.id).await.unwrap()[1].id;

    // Acting on the inflow leg moves the outflow leg too.
    engine.submit(&session, inflow_id, None).await.unwrap();
    engine.cancel(&session, outflow.id, None).await.unwrap();

    let group = engine.transaction_group(&session, outflow.id).await.unwrap();
    assert!(group.iter().all(|tx| tx.state == TransactionState::Cancelled));

    // Cancelling keeps the booked amounts.
    assert_eq!(balance_of(&engine, &session, &checking).await, money("700"));
    assert_eq!(balance_of(&engine, &session, &savings).await, money("300"));
}

#[tokio::test]
async fn delete_reverses_balances_of_every_leg() {
    let engine = engine_with_db().await;
    let session = alice();
    let checking = open_account(&engine, &session, "Checking", Currency::Ars, "1000").await;
    let savings = open_account(&engine, &session, "Savings", Currency::Ars, "200").await;
    let outflow = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("500"), Currency::Ars, Utc::now())
                .from(checking.reference)
                .to(savings.reference),
        )
        .await
        .unwrap();
    let inflow_id = engine.transaction_group(&session, outflow.id).await.unwrap()[1].id;

    engine.delete_transaction(&session, outflow.id).await.unwrap();

    assert_eq!(balance_of(&engine, &session, &checking).await, money("1000"));
    assert_eq!(balance_of(&engine, &session, &savings).await, money("200"));
    for id in [outflow.id, inflow_id] {
        assert!(matches!(
            engine.transaction(&session, id).await,
            Err(EngineError::KeyNotFound(_))
        ));
        assert!(matches!(
            engine.transaction_metadata(&session, id).await,
            Err(EngineError::KeyNotFound(_))
        ));
    }
}

#[tokio::test]
async fn confirmed_transactions_cannot_be_deleted() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;
    let tx = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("100"), Currency::Ars, Utc::now()).from(cash.reference),
        )
        .await
        .unwrap();
    engine.submit(&session, tx.id, None).await.unwrap();
    engine.confirm(&session, tx.id, None).await.unwrap();

    let err = engine.delete_transaction(&session, tx.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert_eq!(balance_of(&engine, &session, &cash).await, money("900"));
    assert_eq!(
        engine.transaction(&session, tx.id).await.unwrap().state,
        TransactionState::Confirmed
    );
}

#[tokio::test]
async fn missing_principal_is_unauthorized() {
    let engine = engine_with_db().await;
    let anonymous = StaticPrincipal::anonymous();

    let err = engine
        .create_transaction(
            &anonymous,
            CreateTransactionCmd::new(money("1"), Currency::Ars, Utc::now()),
        )
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Unauthorized);
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let err = engine
        .list_transactions(&StaticPrincipal::new("  "), &TransactionListFilter::default(), 10, None)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Unauthorized);
}

#[tokio::test]
async fn principals_never_see_each_other() {
    let engine = engine_with_db().await;
    let session = alice();
    let bob = StaticPrincipal::new("bob");
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;
    let tx = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("100"), Currency::Ars, Utc::now()).from(cash.reference),
        )
        .await
        .unwrap();

    assert!(matches!(
        engine.submit(&bob, tx.id, None).await,
        Err(EngineError::KeyNotFound(_))
    ));
    assert!(matches!(
        engine.instrument(&bob, cash.reference).await,
        Err(EngineError::KeyNotFound(_))
    ));
    // Bob cannot spend from Alice's account either.
    assert!(matches!(
        engine
            .create_transaction(
                &bob,
                CreateTransactionCmd::new(money("5"), Currency::Ars, Utc::now())
                    .kind(TransactionKind::Expense)
                    .from(cash.reference),
            )
            .await,
        Err(EngineError::KeyNotFound(_))
    ));
    let (items, _) = engine
        .list_transactions(&bob, &TransactionListFilter::default(), 10, None)
        .await
        .unwrap();
    assert!(items.is_empty());
    assert_eq!(balance_of(&engine, &session, &cash).await, money("900"));
}

#[tokio::test]
async fn third_party_transfer_only_debits_the_sender() {
    let engine = engine_with_db().await;
    let session = alice();
    let bob = StaticPrincipal::new("bob");
    let bank = engine
        .open_instrument(
            &session,
            NewInstrument::bank_account("Sueldo", Bank::Galicia, Currency::Ars, money("1000")),
        )
        .await
        .unwrap();
    let bobs_wallet = engine
        .open_instrument(
            &bob,
            NewInstrument::wallet("MP", WalletProvider::MercadoPago, Currency::Ars, money("0")),
        )
        .await
        .unwrap();

    let tx = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("400"), Currency::Ars, Utc::now())
                .from(bank.reference)
                .to(bobs_wallet.reference)
                .payment_method(PaymentMethod::BankTransfer),
        )
        .await
        .unwrap();

    assert_eq!(tx.kind, TransactionKind::TransferThirdParty);
    assert!(tx.is_transfer_to_third_party);
    assert_eq!(tx.transfer_leg, Some(TransferLeg::Outflow));
    assert!(tx.transfer_group_id.is_none());
    assert_eq!(balance_of(&engine, &session, &bank).await, money("600"));
    assert_eq!(balance_of(&engine, &bob, &bobs_wallet).await, money("0"));
}

#[tokio::test]
async fn third_party_transfer_to_a_contact() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;

    let tx = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("150"), Currency::Ars, Utc::now())
                .kind(TransactionKind::TransferThirdParty)
                .from(cash.reference)
                .contact("contact-42"),
        )
        .await
        .unwrap();
    assert_eq!(tx.contact_id.as_deref(), Some("contact-42"));
    assert!(tx.target.is_none());
    assert_eq!(balance_of(&engine, &session, &cash).await, money("850"));

    let err = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("150"), Currency::Ars, Utc::now())
                .kind(TransactionKind::TransferThirdParty)
                .from(cash.reference),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn salary_on_an_account_is_booked_as_income() {
    let engine = engine_with_db().await;
    let session = alice();
    let bank = open_account(&engine, &session, "Bank", Currency::Ars, "0").await;

    let tx = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("850000"), Currency::Ars, Utc::now())
                .from(bank.reference)
                .description("Sueldo marzo"),
        )
        .await
        .unwrap();

    assert_eq!(tx.kind, TransactionKind::Income);
    assert_eq!(tx.category, Category::Salary);
    assert_eq!(tx.source, None);
    assert_eq!(tx.target, Some(bank.reference));
    assert_eq!(balance_of(&engine, &session, &bank).await, money("850000"));
}

#[tokio::test]
async fn cash_withdrawal_is_detected() {
    let engine = engine_with_db().await;
    let session = alice();
    let bank = open_account(&engine, &session, "Bank", Currency::Ars, "1000").await;

    let tx = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("200"), Currency::Ars, Utc::now())
                .from(bank.reference)
                .payment_method(PaymentMethod::Cash),
        )
        .await
        .unwrap();
    assert_eq!(tx.kind, TransactionKind::Withdrawal);
    assert!(tx.is_cash_withdrawal);
    assert_eq!(balance_of(&engine, &session, &bank).await, money("800"));
}

#[tokio::test]
async fn invalid_amounts_are_rejected_before_any_write() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;

    for raw in ["0", "-5", "1.001"] {
        let err = engine
            .create_transaction(
                &session,
                CreateTransactionCmd::new(money(raw), Currency::Ars, Utc::now())
                    .from(cash.reference),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)), "{raw}: {err}");
    }
    assert_eq!(balance_of(&engine, &session, &cash).await, money("1000"));
}

#[tokio::test]
async fn list_pages_newest_first_and_filters() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;

    let mut created = Vec::new();
    for amount in ["10", "20", "30"] {
        created.push(
            engine
                .create_transaction(
                    &session,
                    CreateTransactionCmd::new(money(amount), Currency::Ars, Utc::now())
                        .from(cash.reference),
                )
                .await
                .unwrap(),
        );
    }
    engine.submit(&session, created[0].id, None).await.unwrap();

    let filter = TransactionListFilter::default();
    let (page, cursor) = engine
        .list_transactions(&session, &filter, 2, None)
        .await
        .unwrap();
    assert_eq!(
        page.iter().map(|tx| tx.id).collect::<Vec<_>>(),
        vec![created[2].id, created[1].id]
    );
    let cursor = cursor.unwrap();

    let (page, cursor) = engine
        .list_transactions(&session, &filter, 2, Some(&cursor))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, created[0].id);
    assert!(cursor.is_none());

    let pending = TransactionListFilter {
        states: Some(vec![TransactionState::Pending]),
        ..TransactionListFilter::default()
    };
    let (page, _) = engine
        .list_transactions(&session, &pending, 10, None)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, created[0].id);

    assert!(matches!(
        engine
            .list_transactions(&session, &filter, 2, Some("garbage"))
            .await,
        Err(EngineError::InvalidCursor(_))
    ));
}

#[tokio::test]
async fn unusually_large_amounts_are_flagged_at_creation() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "100000").await;

    let usual = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("100"), Currency::Ars, Utc::now())
                .from(cash.reference),
        )
        .await
        .unwrap();
    let unusual = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("1000"), Currency::Ars, Utc::now())
                .from(cash.reference),
        )
        .await
        .unwrap();

    let metadata = engine.transaction_metadata(&session, usual.id).await.unwrap();
    assert!(!metadata.is_flagged);
    let metadata = engine
        .transaction_metadata(&session, unusual.id)
        .await
        .unwrap();
    assert!(metadata.is_flagged);
    assert!(metadata.flagged_at.is_some());
    assert!(metadata.flag_reason.unwrap().contains("exceeds"));

    let flagged = TransactionListFilter {
        flagged_only: true,
        ..TransactionListFilter::default()
    };
    let (page, _) = engine
        .list_transactions(&session, &flagged, 10, None)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, unusual.id);
}

#[tokio::test]
async fn bursts_above_the_daily_limit_are_flagged() {
    let config = EngineConfig {
        suspicion: SuspicionConfig {
            max_daily_transactions: 2,
            ..SuspicionConfig::default()
        },
        ..EngineConfig::default()
    };
    let engine = Engine::builder()
        .database(memory_db().await)
        .config(config)
        .build()
        .await
        .unwrap();
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;

    let mut flags = Vec::new();
    for amount in ["10", "11", "12", "13"] {
        let tx = engine
            .create_transaction(
                &session,
                CreateTransactionCmd::new(money(amount), Currency::Ars, Utc::now())
                    .from(cash.reference),
            )
            .await
            .unwrap();
        flags.push(
            engine
                .transaction_metadata(&session, tx.id)
                .await
                .unwrap()
                .is_flagged,
        );
    }
    assert_eq!(flags, vec![false, false, false, true]);
}

#[tokio::test]
async fn manual_flag_and_review() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;
    let tx = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("100"), Currency::Ars, Utc::now())
                .from(cash.reference),
        )
        .await
        .unwrap();

    assert!(matches!(
        engine.flag_transaction(&session, tx.id, "   ").await,
        Err(EngineError::InvalidInput(_))
    ));

    let flagged = engine
        .flag_transaction(&session, tx.id, "unknown merchant")
        .await
        .unwrap();
    assert!(flagged.is_flagged);
    assert_eq!(flagged.flag_reason.as_deref(), Some("unknown merchant"));

    let reviewed = engine.clear_flag(&session, tx.id).await.unwrap();
    assert!(!reviewed.is_flagged);
    assert!(reviewed.flag_reason.is_none());
    assert!(reviewed.reviewed_at.is_some());
    assert_eq!(reviewed.flagged_at, flagged.flagged_at);
}

#[tokio::test]
async fn sync_balance_overwrites_the_stored_balance() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;

    let synced = engine
        .sync_balance(&session, cash.reference, money("1234.56"))
        .await
        .unwrap();
    assert_eq!(synced.balance, money("1234.56"));
    assert!(matches!(
        engine
            .sync_balance(&session, cash.reference, money("1.234"))
            .await,
        Err(EngineError::InvalidAmount(_))
    ));
}

#[tokio::test]
async fn open_database_breaker_rejects_without_touching_storage() {
    let engine = engine_with_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;

    let breaker = engine.breakers().get("database").unwrap();
    breaker.open();
    assert_eq!(breaker.state(), BreakerState::Open);

    let err = engine
        .create_transaction(
            &session,
            CreateTransactionCmd::new(money("10"), Currency::Ars, Utc::now())
                .from(cash.reference),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircuitOpen);

    breaker.reset();
    assert_eq!(balance_of(&engine, &session, &cash).await, money("1000"));
}

#[tokio::test]
async fn validation_errors_do_not_trip_the_database_breaker() {
    let engine = engine_with_db().await;
    let session = alice();
    let dollars = open_account(&engine, &session, "Dollars", Currency::Usd, "100").await;

    let breaker = engine.breakers().get("database").unwrap();
    let threshold = engine.config().database_breaker.failure_threshold;
    for _ in 0..=threshold {
        let err = engine
            .create_transaction(
                &session,
                CreateTransactionCmd::new(money("50"), Currency::Ars, Utc::now())
                    .from(dollars.reference),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CurrencyMismatch(_)));
    }

    let stats = breaker.stats();
    assert_eq!(stats.state, BreakerState::Closed);
    assert_eq!(stats.failed_calls, 0);
    assert_eq!(balance_of(&engine, &session, &dollars).await, money("100"));
}

#[tokio::test]
async fn replay_survives_a_restart() {
    let (engine, db, url, path) = engine_with_file_db().await;
    let session = alice();
    let cash = open_account(&engine, &session, "Cash", Currency::Ars, "1000").await;
    let cmd = CreateTransactionCmd::new(money("100"), Currency::Ars, Utc::now())
        .from(cash.reference)
        .description("Netflix");
    let first = engine.create_transaction(&session, cmd.clone()).await.unwrap();
    assert_eq!(first.category, Category::Subscriptions);

    drop(engine);
    drop(db);

    let db2 = Database::connect(&url).await.unwrap();
    let engine2 = Engine::builder().database(db2.clone()).build().await.unwrap();

    let replay = engine2.create_transaction(&session, cmd).await.unwrap();
    assert_eq!(replay.id, first.id);
    assert_eq!(balance_of(&engine2, &session, &cash).await, money("900"));

    drop(engine2);
    drop(db2);
    let _ = std::fs::remove_file(path);
}
