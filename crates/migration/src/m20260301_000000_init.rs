//! Initial schema.
//!
//! - `accounts`, `bank_accounts`, `digital_wallets`: money-holding instruments
//!   owned by a principal, balances stored as exact decimal strings
//! - `transactions`: ledger rows with lifecycle state and routing
//! - `transaction_metadata`: moderation sidecar, one row per transaction

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    UserId,
    Name,
    Balance,
    Currency,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum BankAccounts {
    Table,
    Id,
    UserId,
    Name,
    Bank,
    Balance,
    Currency,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum DigitalWallets {
    Table,
    Id,
    UserId,
    Name,
    Provider,
    Balance,
    Currency,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    UserId,
    Kind,
    Category,
    Amount,
    Currency,
    Description,
    PaymentMethod,
    FromAccountId,
    FromBankAccountId,
    FromWalletId,
    ToAccountId,
    ToBankAccountId,
    ToWalletId,
    ContactId,
    TransferLeg,
    TransferGroupId,
    State,
    StateMachine,
    IdempotencyKey,
    IsTransferBetweenOwnAccounts,
    IsTransferToThirdParty,
    IsCashWithdrawal,
    IsCashDeposit,
    OccurredAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum TransactionMetadata {
    Table,
    TransactionId,
    UserId,
    IsFlagged,
    FlagReason,
    FlaggedAt,
    ReviewedAt,
    CreatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Instruments
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Accounts::UserId).string().not_null())
                    .col(ColumnDef::new(Accounts::Name).string().not_null())
                    .col(ColumnDef::new(Accounts::Balance).string().not_null())
                    .col(ColumnDef::new(Accounts::Currency).string().not_null())
                    .col(
                        ColumnDef::new(Accounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Accounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-user_id")
                    .table(Accounts::Table)
                    .col(Accounts::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BankAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BankAccounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BankAccounts::UserId).string().not_null())
                    .col(ColumnDef::new(BankAccounts::Name).string().not_null())
                    .col(ColumnDef::new(BankAccounts::Bank).string().not_null())
                    .col(ColumnDef::new(BankAccounts::Balance).string().not_null())
                    .col(ColumnDef::new(BankAccounts::Currency).string().not_null())
                    .col(
                        ColumnDef::new(BankAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BankAccounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-bank_accounts-user_id")
                    .table(BankAccounts::Table)
                    .col(BankAccounts::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DigitalWallets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DigitalWallets::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DigitalWallets::UserId).string().not_null())
                    .col(ColumnDef::new(DigitalWallets::Name).string().not_null())
                    .col(ColumnDef::new(DigitalWallets::Provider).string().not_null())
                    .col(ColumnDef::new(DigitalWallets::Balance).string().not_null())
                    .col(ColumnDef::new(DigitalWallets::Currency).string().not_null())
                    .col(
                        ColumnDef::new(DigitalWallets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DigitalWallets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-digital_wallets-user_id")
                    .table(DigitalWallets::Table)
                    .col(DigitalWallets::UserId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::UserId).string().not_null())
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::Category)
                            .string()
                            .not_null()
                            .default("other"),
                    )
                    .col(ColumnDef::new(Transactions::Amount).string().not_null())
                    .col(ColumnDef::new(Transactions::Currency).string().not_null())
                    .col(ColumnDef::new(Transactions::Description).string())
                    .col(ColumnDef::new(Transactions::PaymentMethod).string())
                    .col(ColumnDef::new(Transactions::FromAccountId).string())
                    .col(ColumnDef::new(Transactions::FromBankAccountId).string())
                    .col(ColumnDef::new(Transactions::FromWalletId).string())
                    .col(ColumnDef::new(Transactions::ToAccountId).string())
                    .col(ColumnDef::new(Transactions::ToBankAccountId).string())
                    .col(ColumnDef::new(Transactions::ToWalletId).string())
                    .col(ColumnDef::new(Transactions::ContactId).string())
                    .col(ColumnDef::new(Transactions::TransferLeg).string())
                    .col(ColumnDef::new(Transactions::TransferGroupId).string())
                    .col(
                        ColumnDef::new(Transactions::State)
                            .string()
                            .not_null()
                            .default("DRAFT"),
                    )
                    .col(
                        ColumnDef::new(Transactions::StateMachine)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(Transactions::IdempotencyKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::IsTransferBetweenOwnAccounts)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Transactions::IsTransferToThirdParty)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Transactions::IsCashWithdrawal)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Transactions::IsCashDeposit)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Transactions::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Retried creates collapse onto the first row.
        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-user_id-idempotency_key-unique")
                    .table(Transactions::Table)
                    .col(Transactions::UserId)
                    .col(Transactions::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-user_id-created_at-id")
                    .table(Transactions::Table)
                    .col(Transactions::UserId)
                    .col(Transactions::CreatedAt)
                    .col(Transactions::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-transfer_group_id")
                    .table(Transactions::Table)
                    .col(Transactions::TransferGroupId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Transaction metadata
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(TransactionMetadata::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransactionMetadata::TransactionId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TransactionMetadata::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionMetadata::IsFlagged)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(TransactionMetadata::FlagReason).string())
                    .col(ColumnDef::new(TransactionMetadata::FlaggedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(TransactionMetadata::ReviewedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(TransactionMetadata::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transaction_metadata-transaction_id")
                            .from(TransactionMetadata::Table, TransactionMetadata::TransactionId)
                            .to(Transactions::Table, Transactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transaction_metadata-user_id-is_flagged")
                    .table(TransactionMetadata::Table)
                    .col(TransactionMetadata::UserId)
                    .col(TransactionMetadata::IsFlagged)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(TransactionMetadata::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DigitalWallets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BankAccounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        Ok(())
    }
}
