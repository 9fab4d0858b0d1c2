// tests/progress_tests.rs

use sqlx::SqlitePool;
use tempfile::TempDir;
use wte::db;
use wte::models::part::{Part, PartType};
use wte::progress::{
    get_user_part_progress, record_duration, reset_files, update_workspace_file, workspace_file,
};
use wte::repositories::PartRepo;

async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("wte.db").display());
    let pool = db::connect(&url).await.expect("Failed to open database");
    db::migrate(&pool).await.expect("Failed to migrate database");
    (dir, pool)
}

async fn user(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO users (username, password) VALUES (?, 'x') RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn part(pool: &SqlitePool, parent: Option<i64>, part_type: PartType) -> Part {
    PartRepo::create(pool, parent, part_type, "Part", "", None)
        .await
        .unwrap()
}

async fn template(pool: &SqlitePool, part_id: i64, filename: &str, position: i64, data: &str) {
    sqlx::query(
        "INSERT INTO template_files (part_id, filename, mimetype, position, data) \
         VALUES (?, ?, 'text/plain', ?, ?)",
    )
    .bind(part_id)
    .bind(filename)
    .bind(position)
    .bind(data.as_bytes())
    .execute(pool)
    .await
    .unwrap();
}

/// A module with a tutorial holding two templates and one page.
struct Course {
    module: Part,
    tutorial: Part,
    page: Part,
}

async fn course(pool: &SqlitePool) -> Course {
    let module = part(pool, None, PartType::Module).await;
    let tutorial = part(pool, Some(module.id), PartType::Tutorial).await;
    let page = part(pool, Some(tutorial.id), PartType::Page).await;
    template(pool, tutorial.id, "index.html", 0, "<p>start</p>").await;
    template(pool, tutorial.id, "style.css", 1, "body {}").await;
    Course { module, tutorial, page }
}

#[tokio::test]
async fn modules_have_no_progress() {
    let (_dir, pool) = test_pool().await;
    let c = course(&pool).await;
    let uid = user(&pool, "alice").await;

    assert!(get_user_part_progress(&pool, uid, &c.module).await.unwrap().is_none());
}

#[tokio::test]
async fn first_access_copies_templates() {
    let (_dir, pool) = test_pool().await;
    let c = course(&pool).await;
    let uid = user(&pool, "alice").await;

    let progress = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();

    assert_eq!(progress.progress.part_id, c.tutorial.id);
    assert_eq!(progress.files.len(), 2);
    assert_eq!(progress.files[0].filename, "index.html");
    assert_eq!(progress.files[0].data, b"<p>start</p>");
    assert_eq!(progress.files[1].filename, "style.css");
    assert_eq!(progress.files[1].position, 1);
}

#[tokio::test]
async fn materialisation_is_idempotent() {
    let (_dir, pool) = test_pool().await;
    let c = course(&pool).await;
    let uid = user(&pool, "alice").await;

    let first = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();
    let second = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();

    assert_eq!(first.progress.id, second.progress.id);
    let ids = |p: &wte::models::progress::PartProgress| p.files.iter().map(|f| f.id).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_part_progress")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn learners_get_separate_copies() {
    let (_dir, pool) = test_pool().await;
    let c = course(&pool).await;
    let alice = user(&pool, "alice").await;
    let bob = user(&pool, "bob").await;

    let a = get_user_part_progress(&pool, alice, &c.tutorial).await.unwrap().unwrap();
    let b = get_user_part_progress(&pool, bob, &c.tutorial).await.unwrap().unwrap();
    update_workspace_file(&pool, a.progress.id, a.files[0].id, b"mine").await.unwrap();

    let b = get_user_part_progress(&pool, bob, &c.tutorial).await.unwrap().unwrap();
    assert_ne!(a.progress.id, b.progress.id);
    assert_eq!(b.files[0].data, b"<p>start</p>");

    // A file id of someone else's workspace is not reachable.
    assert!(workspace_file(&pool, b.progress.id, a.files[0].id).await.unwrap().is_none());
    assert!(!update_workspace_file(&pool, b.progress.id, a.files[0].id, b"x").await.unwrap());
}

#[tokio::test]
async fn edits_survive_and_new_templates_are_added() {
    let (_dir, pool) = test_pool().await;
    let c = course(&pool).await;
    let uid = user(&pool, "alice").await;

    let progress = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();
    let index = progress.file("index.html", "text/plain").unwrap().id;
    assert!(update_workspace_file(&pool, progress.progress.id, index, b"edited").await.unwrap());

    template(&pool, c.tutorial.id, "app.js", 2, "let x;").await;
    // Moving a template only moves the copy.
    sqlx::query("UPDATE template_files SET position = 5 WHERE filename = 'index.html'")
        .execute(&pool)
        .await
        .unwrap();

    let progress = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();
    assert_eq!(progress.files.len(), 3);
    let index = progress.file("index.html", "text/plain").unwrap();
    assert_eq!(index.data, b"edited");
    assert_eq!(index.position, 5);
    assert_eq!(progress.files.last().unwrap().filename, "index.html");
    assert_eq!(progress.file("app.js", "text/plain").unwrap().data, b"let x;");
}

#[tokio::test]
async fn extra_user_files_are_kept() {
    let (_dir, pool) = test_pool().await;
    let c = course(&pool).await;
    let uid = user(&pool, "alice").await;

    let progress = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();
    sqlx::query(
        "INSERT INTO workspace_files (progress_id, filename, mimetype, position, data) \
         VALUES (?, 'notes.txt', 'text/plain', 9, ?)",
    )
    .bind(progress.progress.id)
    .bind(b"mine".as_slice())
    .execute(&pool)
    .await
    .unwrap();

    let progress = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();
    assert_eq!(progress.files.len(), 3);
    assert!(progress.file("notes.txt", "text/plain").is_some());
}

#[tokio::test]
async fn reset_recreates_files_from_templates() {
    let (_dir, pool) = test_pool().await;
    let c = course(&pool).await;
    let uid = user(&pool, "alice").await;

    let progress = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();
    for file in &progress.files {
        update_workspace_file(&pool, progress.progress.id, file.id, b"changed").await.unwrap();
    }

    // Only one file.
    let removed = reset_files(&pool, progress.progress.id, Some("style.css")).await.unwrap();
    assert_eq!(removed, 1);
    let progress = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();
    assert_eq!(progress.file("style.css", "text/plain").unwrap().data, b"body {}");
    assert_eq!(progress.file("index.html", "text/plain").unwrap().data, b"changed");

    // Everything.
    let removed = reset_files(&pool, progress.progress.id, None).await.unwrap();
    assert_eq!(removed, 2);
    let progress = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();
    assert_eq!(progress.file("index.html", "text/plain").unwrap().data, b"<p>start</p>");
}

#[tokio::test]
async fn pages_use_their_tutorials_progress() {
    let (_dir, pool) = test_pool().await;
    let c = course(&pool).await;
    let uid = user(&pool, "alice").await;

    let via_tutorial = get_user_part_progress(&pool, uid, &c.tutorial).await.unwrap().unwrap();
    assert!(via_tutorial.progress.current_id.is_none());

    let via_page = get_user_part_progress(&pool, uid, &c.page).await.unwrap().unwrap();
    assert_eq!(via_page.progress.id, via_tutorial.progress.id);
    assert_eq!(via_page.progress.current_id, Some(c.page.id));
    assert_eq!(via_page.files.len(), 2);

    let key = c.page.id.to_string();
    assert_eq!(via_page.progress.visited.0.get(&key).unwrap().duration, 0);
}

#[tokio::test]
async fn durations_accumulate_in_seconds() {
    let (_dir, pool) = test_pool().await;
    let c = course(&pool).await;
    let uid = user(&pool, "alice").await;

    let progress = get_user_part_progress(&pool, uid, &c.page).await.unwrap().unwrap();
    record_duration(&pool, progress.progress.id, c.page.id, 2_500).await.unwrap();
    record_duration(&pool, progress.progress.id, c.page.id, 4_000).await.unwrap();

    let progress = get_user_part_progress(&pool, uid, &c.page).await.unwrap().unwrap();
    let key = c.page.id.to_string();
    assert_eq!(progress.progress.visited.0.get(&key).unwrap().duration, 6);
}

#[tokio::test]
async fn tasks_and_exercises_track_their_own_files() {
    let (_dir, pool) = test_pool().await;
    let module = part(&pool, None, PartType::Module).await;
    let exercise = part(&pool, Some(module.id), PartType::Exercise).await;
    let task = part(&pool, Some(exercise.id), PartType::Task).await;
    template(&pool, task.id, "solution.py", 0, "pass").await;
    let uid = user(&pool, "alice").await;

    let on_task = get_user_part_progress(&pool, uid, &task).await.unwrap().unwrap();
    let on_exercise = get_user_part_progress(&pool, uid, &exercise).await.unwrap().unwrap();

    assert_ne!(on_task.progress.id, on_exercise.progress.id);
    assert_eq!(on_task.files.len(), 1);
    assert!(on_exercise.files.is_empty());
}
