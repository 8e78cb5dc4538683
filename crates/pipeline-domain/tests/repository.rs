use chrono::Utc;
use pipeline_domain::{Account, AccountStatus, Store, Task, TaskState, Video, VideoStatus};
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
        daily_quota_bytes: 10 * 1024 * 1024 * 1024,
        quota_reset_at: Utc::now(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn video_insert_rejects_duplicate_info_hash() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("video_insert_rejects_duplicate_info_hash");
    let store = Store::connect(postgres.connection_string()).await?;

    let magnet = "magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01";
    let first = Video::new("first copy", magnet);
    store.videos().insert(&first).await?;

    let second = Video::new("second copy", magnet);
    let err = store
        .videos()
        .insert(&second)
        .await
        .expect_err("duplicate info-hash must be rejected");
    assert!(matches!(err, pipeline_domain::DomainError::DuplicateInfoHash { .. }));

    Ok(())
}

#[tokio::test]
async fn video_lifecycle_transitions_persist() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("video_lifecycle_transitions_persist");
    let store = Store::connect(postgres.connection_string()).await?;

    let video = Video::new("lifecycle", "magnet:?xt=urn:btih:1111111111111111111111111111111111111111");
    let video = store.videos().insert(&video).await?;
    assert_eq!(video.status, VideoStatus::Discovered);

    store.videos().set_local_path(video.id, "/media/lifecycle.payload").await?;
    store.videos().update_status(video.id, VideoStatus::Downloaded).await?;
    store.videos().set_share_url(video.id, "https://photos.google.com/share/stub").await?;

    let persisted = store.videos().find_by_id(video.id).await?.expect("video must exist");
    assert_eq!(persisted.local_path.as_deref(), Some("/media/lifecycle.payload"));
    assert_eq!(persisted.share_url.as_deref(), Some("https://photos.google.com/share/stub"));
    assert_eq!(persisted.status, VideoStatus::Available);

    let by_hash = store
        .videos()
        .find_by_info_hash(persisted.info_hash.as_deref().unwrap())
        .await?
        .expect("info hash lookup must find the row");
    assert_eq!(by_hash.id, video.id);

    Ok(())
}

#[tokio::test]
async fn video_expire_stale_only_touches_aged_available_rows() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("video_expire_stale_only_touches_aged_available_rows");
    let store = Store::connect(postgres.connection_string()).await?;

    let fresh = Video::new("fresh", "magnet:?xt=urn:btih:2222222222222222222222222222222222222222");
    let fresh = store.videos().insert(&fresh).await?;
    store.videos().set_cdn_url(fresh.id, "https://lh3.googleusercontent.com/stub=dv").await?;

    let untouched = store.videos().expire_stale(86_400).await?;
    assert_eq!(untouched, 0);

    let expired_rows = store.videos().expire_stale(0).await?;
    assert_eq!(expired_rows, 1);

    let persisted = store.videos().find_by_id(fresh.id).await?.expect("video must exist");
    assert_eq!(persisted.status, VideoStatus::Expired);

    Ok(())
}

#[tokio::test]
async fn task_retry_and_orphan_gc_transitions_persist() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("task_retry_and_orphan_gc_transitions_persist");
    let store = Store::connect(postgres.connection_string()).await?;

    let video = Video::new("task lifecycle", "magnet:?xt=urn:btih:3333333333333333333333333333333333333333");
    let video = store.videos().insert(&video).await?;

    assert!(!store.tasks().has_open_task(video.id).await?);

    let task = Task::new(video.id, "pipeline:download", 3);
    let task = store.tasks().insert(&task).await?;
    assert!(store.tasks().has_open_task(video.id).await?);

    let pending = store.tasks().list_pending(10).await?;
    assert!(pending.iter().any(|t| t.id == task.id));

    store.tasks().record_retry(task.id, "connection timed out").await?;
    let persisted = store.tasks().find_by_id(task.id).await?.expect("task must exist");
    assert_eq!(persisted.retries, 1);
    assert_eq!(persisted.state, TaskState::Pending);
    assert!(persisted.can_retry());

    store.tasks().update_state(task.id, TaskState::Uploading, None).await?;
    let orphaned = store.tasks().fail_orphans(0).await?;
    assert_eq!(orphaned, 1);

    let persisted = store.tasks().find_by_id(task.id).await?.expect("task must exist");
    assert_eq!(persisted.state, TaskState::Failed);

    let failed_count = store.tasks().count_by_state(TaskState::Failed).await?;
    assert_eq!(failed_count, 1);
    assert!(!store.tasks().has_open_task(video.id).await?);

    Ok(())
}

#[tokio::test]
async fn task_route_to_queue_resets_to_pending() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("task_route_to_queue_resets_to_pending");
    let store = Store::connect(postgres.connection_string()).await?;

    let video = Video::new("routing", "magnet:?xt=urn:btih:4444444444444444444444444444444444444444");
    let video = store.videos().insert(&video).await?;
    let task = Task::new(video.id, "pipeline:download", 3);
    let task = store.tasks().insert(&task).await?;

    store.tasks().update_state(task.id, TaskState::Downloading, None).await?;
    store.tasks().route_to_queue(task.id, "pipeline:upload").await?;

    let persisted = store.tasks().find_by_id(task.id).await?.expect("task must exist");
    assert_eq!(persisted.queue_name, "pipeline:upload");
    assert_eq!(persisted.state, TaskState::Pending);

    Ok(())
}

#[tokio::test]
async fn account_insert_and_active_count() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("account_insert_and_active_count");
    let store = Store::connect(postgres.connection_string()).await?;

    let active = sample_account();
    store.accounts().insert(&active).await?;

    let mut cooling = sample_account();
    cooling.status = AccountStatus::Cooldown;
    store.accounts().insert(&cooling).await?;

    let persisted = store.accounts().find_by_id(active.id).await?.expect("account must exist");
    assert_eq!(persisted.email, active.email);
    assert_eq!(persisted.status, AccountStatus::Active);

    assert!(store.accounts().active_count().await? >= 1);

    Ok(())
}
