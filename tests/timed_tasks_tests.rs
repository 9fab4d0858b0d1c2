// tests/timed_tasks_tests.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tempfile::TempDir;
use wte::db;
use wte::models::part::{PartStatus, PartType};
use wte::models::timed_task::{TaskOptions, TaskStatus, TimedTask};
use wte::repositories::{PartRepo, TimedTaskRepo};
use wte::timed_tasks::{
    ActionRegistry, ChangeStatusAction, RunSummary, RunnerOptions, TaskAction, TaskError,
    TimedTaskRunner, runner::UNFINISHED_REASON,
};

/// Opens a fresh, migrated database in a temporary directory.
/// Keep the returned `TempDir` alive for as long as the pool is used.
async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("wte.db").display());
    let pool = db::connect(&url).await.expect("Failed to open database");
    db::migrate(&pool).await.expect("Failed to migrate database");
    (dir, pool)
}

fn options(value: serde_json::Value) -> TaskOptions {
    value.as_object().cloned().unwrap_or_default()
}

async fn module(pool: &SqlitePool) -> i64 {
    PartRepo::create(pool, None, PartType::Module, "Module", "", None)
        .await
        .unwrap()
        .id
}

/// Creates a task for `part_id` and schedules it `offset_secs` from now.
async fn scheduled_task(
    pool: &SqlitePool,
    part_id: i64,
    name: &str,
    offset_secs: i64,
    opts: TaskOptions,
) -> i64 {
    let task = TimedTaskRepo::create(pool, part_id, name, "Task").await.unwrap();
    TimedTaskRepo::schedule(
        pool,
        task.id,
        Utc::now() + chrono::Duration::seconds(offset_secs),
        &opts,
    )
    .await
    .unwrap()
    .expect("task not running");
    task.id
}

async fn task(pool: &SqlitePool, part_id: i64, id: i64) -> TimedTask {
    TimedTaskRepo::find_for_part(pool, part_id, id)
        .await
        .unwrap()
        .expect("task exists")
}

async fn part_status(pool: &SqlitePool, id: i64) -> PartStatus {
    PartRepo::find_by_id(pool, id).await.unwrap().unwrap().status
}

fn runner(pool: &SqlitePool, registry: ActionRegistry) -> TimedTaskRunner {
    TimedTaskRunner::new(
        pool.clone(),
        Arc::new(registry),
        RunnerOptions {
            workers: 2,
            task_timeout: Duration::from_millis(300),
        },
    )
}

struct SlowAction;

#[async_trait]
impl TaskAction for SlowAction {
    fn title(&self) -> &str {
        "Slow"
    }

    fn validate_options(&self, _: &wte::models::part::Part, _: &TaskOptions) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, _: &mut SqliteConnection, _: &TimedTask) -> Result<(), TaskError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(())
    }
}

struct PanickingAction;

#[async_trait]
impl TaskAction for PanickingAction {
    fn title(&self) -> &str {
        "Panic"
    }

    fn validate_options(&self, _: &wte::models::part::Part, _: &TaskOptions) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, _: &mut SqliteConnection, _: &TimedTask) -> Result<(), TaskError> {
        panic!("action blew up");
    }
}

struct FailingAction;

#[async_trait]
impl TaskAction for FailingAction {
    fn title(&self) -> &str {
        "Fail"
    }

    fn validate_options(&self, _: &wte::models::part::Part, _: &TaskOptions) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, conn: &mut SqliteConnection, task: &TimedTask) -> Result<(), TaskError> {
        // Written, then rolled back together with the completion mark.
        PartRepo::set_status(&mut *conn, task.part_id, PartStatus::Available).await?;
        Err(TaskError::PartNotFound(task.part_id))
    }
}

/// Tracks how many executions overlap.
#[derive(Default)]
struct CountingAction {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskAction for CountingAction {
    fn title(&self) -> &str {
        "Count"
    }

    fn validate_options(&self, _: &wte::models::part::Part, _: &TaskOptions) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, _: &mut SqliteConnection, _: &TimedTask) -> Result<(), TaskError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn due_change_status_task_completes() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    let id = scheduled_task(
        &pool,
        part_id,
        ChangeStatusAction::NAME,
        -60,
        options(json!({ "target_status": "available" })),
    )
    .await;

    let summary = runner(&pool, ActionRegistry::with_defaults()).run_once().await.unwrap();

    assert_eq!(
        summary,
        RunSummary { claimed: 1, dispatched: 1, completed: 1, failed: 0 }
    );
    assert_eq!(part_status(&pool, part_id).await, PartStatus::Available);
    let task = task(&pool, part_id, id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.claim_token.is_some());
    assert!(task.claimed_at.is_some());
    assert!(task.message.is_none());
}

#[tokio::test]
async fn missing_target_status_fails_and_leaves_part_unchanged() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    let id = scheduled_task(&pool, part_id, ChangeStatusAction::NAME, -60, TaskOptions::new()).await;

    let summary = runner(&pool, ActionRegistry::with_defaults()).run_once().await.unwrap();

    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(part_status(&pool, part_id).await, PartStatus::Unavailable);
    let task = task(&pool, part_id, id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.message.as_deref(), Some("missing option 'target_status'"));
}

#[tokio::test]
async fn archiving_a_non_module_fails() {
    let (_dir, pool) = test_pool().await;
    let module_id = module(&pool).await;
    let tutorial = PartRepo::create(&pool, Some(module_id), PartType::Tutorial, "T", "", None)
        .await
        .unwrap();
    let id = scheduled_task(
        &pool,
        tutorial.id,
        ChangeStatusAction::NAME,
        -1,
        options(json!({ "target_status": "archived" })),
    )
    .await;

    runner(&pool, ActionRegistry::with_defaults()).run_once().await.unwrap();

    assert_eq!(task(&pool, tutorial.id, id).await.status, TaskStatus::Failed);
    assert_eq!(part_status(&pool, tutorial.id).await, PartStatus::Unavailable);
}

#[tokio::test]
async fn unknown_action_is_failed_with_reason() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    let id = scheduled_task(&pool, part_id, "launch_rockets", -60, TaskOptions::new()).await;

    let summary = runner(&pool, ActionRegistry::with_defaults()).run_once().await.unwrap();

    assert_eq!(
        summary,
        RunSummary { claimed: 1, dispatched: 0, completed: 0, failed: 1 }
    );
    let task = task(&pool, part_id, id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.message.as_deref(), Some("unknown action 'launch_rockets'"));
}

#[tokio::test]
async fn future_and_unscheduled_tasks_are_left_alone() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    let future = scheduled_task(
        &pool,
        part_id,
        ChangeStatusAction::NAME,
        3600,
        options(json!({ "target_status": "available" })),
    )
    .await;
    let unscheduled = TimedTaskRepo::create(&pool, part_id, ChangeStatusAction::NAME, "New")
        .await
        .unwrap();

    let summary = runner(&pool, ActionRegistry::with_defaults()).run_once().await.unwrap();

    assert_eq!(summary, RunSummary::default());
    let future = task(&pool, part_id, future).await;
    assert_eq!(future.status, TaskStatus::Ready);
    assert!(future.claim_token.is_none());
    assert_eq!(task(&pool, part_id, unscheduled.id).await.status, TaskStatus::New);
    assert_eq!(part_status(&pool, part_id).await, PartStatus::Unavailable);
}

#[tokio::test]
async fn timed_out_task_is_failed() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    let id = scheduled_task(&pool, part_id, "slow", -1, TaskOptions::new()).await;

    let mut registry = ActionRegistry::new();
    registry.register("slow", SlowAction);
    let summary = runner(&pool, registry).run_once().await.unwrap();

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 1);
    let task = task(&pool, part_id, id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.message.unwrap().starts_with("timed out"));
}

#[tokio::test]
async fn panicking_task_is_swept() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    let id = scheduled_task(&pool, part_id, "panic", -1, TaskOptions::new()).await;

    let mut registry = ActionRegistry::new();
    registry.register("panic", PanickingAction);
    let summary = runner(&pool, registry).run_once().await.unwrap();

    assert_eq!(summary.failed, 1);
    let task = task(&pool, part_id, id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.message.as_deref(), Some(UNFINISHED_REASON));
}

#[tokio::test]
async fn failing_action_rolls_back_its_effects() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    let id = scheduled_task(&pool, part_id, "fail", -1, TaskOptions::new()).await;

    let mut registry = ActionRegistry::new();
    registry.register("fail", FailingAction);
    runner(&pool, registry).run_once().await.unwrap();

    assert_eq!(task(&pool, part_id, id).await.status, TaskStatus::Failed);
    assert_eq!(part_status(&pool, part_id).await, PartStatus::Unavailable);
}

#[tokio::test]
async fn mixed_batch_reconciles_every_claimed_task() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    let good = scheduled_task(
        &pool,
        part_id,
        ChangeStatusAction::NAME,
        -5,
        options(json!({ "target_status": "available" })),
    )
    .await;
    let bad = scheduled_task(&pool, part_id, ChangeStatusAction::NAME, -5, TaskOptions::new()).await;
    let unknown = scheduled_task(&pool, part_id, "nope", -5, TaskOptions::new()).await;

    let summary = runner(&pool, ActionRegistry::with_defaults()).run_once().await.unwrap();

    assert_eq!(summary.claimed, 3);
    assert_eq!(summary.completed + summary.failed, summary.claimed);
    assert_eq!(task(&pool, part_id, good).await.status, TaskStatus::Completed);
    assert_eq!(task(&pool, part_id, bad).await.status, TaskStatus::Failed);
    assert_eq!(task(&pool, part_id, unknown).await.status, TaskStatus::Failed);

    let running: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM timed_tasks WHERE status = 'running'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(running, 0);
}

#[tokio::test]
async fn workers_bound_concurrent_executions() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    for _ in 0..6 {
        scheduled_task(&pool, part_id, "count", -1, TaskOptions::new()).await;
    }

    let action = CountingAction::default();
    let in_flight = action.in_flight.clone();
    let peak = action.peak.clone();
    let mut registry = ActionRegistry::new();
    registry.register("count", action);
    let runner = TimedTaskRunner::new(
        pool.clone(),
        Arc::new(registry),
        RunnerOptions {
            workers: 2,
            task_timeout: Duration::from_secs(5),
        },
    );

    let summary = runner.run_once().await.unwrap();

    assert_eq!(summary.claimed, 6);
    assert_eq!(summary.completed, 6);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(peak <= 2, "{peak} executions overlapped with 2 workers");
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_run_does_not_touch_finished_tasks() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    let done = scheduled_task(
        &pool,
        part_id,
        ChangeStatusAction::NAME,
        -5,
        options(json!({ "target_status": "available" })),
    )
    .await;
    let failed = scheduled_task(&pool, part_id, "nope", -5, TaskOptions::new()).await;

    let runner = runner(&pool, ActionRegistry::with_defaults());
    runner.run_once().await.unwrap();
    let before = (task(&pool, part_id, done).await, task(&pool, part_id, failed).await);

    // Someone changes the part by hand; a completed task must not be re-applied.
    PartRepo::set_status(&pool, part_id, PartStatus::Unavailable).await.unwrap();
    let summary = runner.run_once().await.unwrap();

    assert_eq!(summary, RunSummary::default());
    let after = (task(&pool, part_id, done).await, task(&pool, part_id, failed).await);
    assert_eq!(after.0.status, TaskStatus::Completed);
    assert_eq!(after.0.claim_token, before.0.claim_token);
    assert_eq!(after.1.status, TaskStatus::Failed);
    assert_eq!(after.1.message, before.1.message);
    assert_eq!(part_status(&pool, part_id).await, PartStatus::Unavailable);
}

#[tokio::test]
async fn rescheduling_a_failed_task_makes_it_claimable_again() {
    let (_dir, pool) = test_pool().await;
    let part_id = module(&pool).await;
    let id = scheduled_task(&pool, part_id, ChangeStatusAction::NAME, -5, TaskOptions::new()).await;
    let runner = runner(&pool, ActionRegistry::with_defaults());
    runner.run_once().await.unwrap();
    assert_eq!(task(&pool, part_id, id).await.status, TaskStatus::Failed);

    let fixed = TimedTaskRepo::schedule(
        &pool,
        id,
        Utc::now() - chrono::Duration::seconds(1),
        &options(json!({ "target_status": "archived" })),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(fixed.status, TaskStatus::Ready);
    assert!(fixed.message.is_none());

    let summary = runner.run_once().await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(part_status(&pool, part_id).await, PartStatus::Archived);
}
