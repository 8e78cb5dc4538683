use std::time::Duration;

use chrono::Utc;
use pipeline_domain::{Account, AccountStatus, Store};
use pipeline_scheduler::{AccountScheduler, SchedulerError};
use pipeline_test_support::skip_without_postgres;
use uuid::Uuid;

fn sample_account() -> Account {
    Account {
        id: Uuid::new_v4(),
        email: format!("{}@example.test", Uuid::new_v4()),
        status: AccountStatus::Active,
        last_used_at: None,
        cooldown_until: None,
        lease_expires_at: None,
        daily_uploaded_bytes: 0,
        daily_quota_bytes: 1000,
        quota_reset_at: Utc::now() + chrono::Duration::days(1),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn next_account_leases_the_least_recently_used_eligible_row() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("next_account_leases_the_least_recently_used_eligible_row");
    let store = Store::connect(postgres.connection_string()).await?;
    let scheduler = AccountScheduler::new(store.pool().clone());

    let mut older = sample_account();
    older.last_used_at = Some(Utc::now() - chrono::Duration::hours(2));
    store.accounts().insert(&older).await?;

    let mut newer = sample_account();
    newer.last_used_at = Some(Utc::now() - chrono::Duration::minutes(1));
    store.accounts().insert(&newer).await?;

    let claimed = scheduler.next_account(Duration::from_secs(60)).await?;
    assert_eq!(claimed, older.id);

    let second = scheduler.next_account(Duration::from_secs(60)).await?;
    assert_eq!(second, newer.id);

    Ok(())
}

#[tokio::test]
async fn next_account_fails_when_every_account_is_leased() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("next_account_fails_when_every_account_is_leased");
    let store = Store::connect(postgres.connection_string()).await?;
    let scheduler = AccountScheduler::new(store.pool().clone());

    let account = sample_account();
    store.accounts().insert(&account).await?;

    scheduler.next_account(Duration::from_secs(60)).await?;

    let err = scheduler
        .next_account(Duration::from_secs(60))
        .await
        .expect_err("no account should be eligible while the lease is held");
    assert!(matches!(err, SchedulerError::NoActiveAccounts));

    Ok(())
}

#[tokio::test]
async fn next_account_reactivates_lapsed_cooldowns() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("next_account_reactivates_lapsed_cooldowns");
    let store = Store::connect(postgres.connection_string()).await?;
    let scheduler = AccountScheduler::new(store.pool().clone());

    let mut account = sample_account();
    account.status = AccountStatus::Cooldown;
    account.cooldown_until = Some(Utc::now() - chrono::Duration::minutes(1));
    store.accounts().insert(&account).await?;

    let claimed = scheduler.next_account(Duration::from_secs(60)).await?;
    assert_eq!(claimed, account.id);

    Ok(())
}

#[tokio::test]
async fn apply_upload_usage_enters_cooldown_at_quota() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("apply_upload_usage_enters_cooldown_at_quota");
    let store = Store::connect(postgres.connection_string()).await?;
    let scheduler = AccountScheduler::new(store.pool().clone());

    let account = sample_account();
    store.accounts().insert(&account).await?;

    scheduler.apply_upload_usage(account.id, 400).await?;
    let mid = store.accounts().find_by_id(account.id).await?.expect("account must exist");
    assert_eq!(mid.daily_uploaded_bytes, 400);
    assert_eq!(mid.status, AccountStatus::Active);

    scheduler.apply_upload_usage(account.id, 700).await?;
    let persisted = store.accounts().find_by_id(account.id).await?.expect("account must exist");
    assert_eq!(persisted.daily_uploaded_bytes, 1100);
    assert_eq!(persisted.status, AccountStatus::Cooldown);

    Ok(())
}

#[tokio::test]
async fn mark_used_clears_the_lease_and_stamps_last_used() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("mark_used_clears_the_lease_and_stamps_last_used");
    let store = Store::connect(postgres.connection_string()).await?;
    let scheduler = AccountScheduler::new(store.pool().clone());

    let account = sample_account();
    store.accounts().insert(&account).await?;
    scheduler.next_account(Duration::from_secs(60)).await?;

    scheduler.mark_used(account.id).await?;

    let claimed_again = scheduler.next_account(Duration::from_secs(60)).await?;
    assert_eq!(claimed_again, account.id);

    Ok(())
}
