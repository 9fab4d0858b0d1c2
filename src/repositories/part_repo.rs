// src/repositories/part_repo.rs

//! Repository for the `parts` and `user_part_roles` tables.

use sqlx::{SqliteExecutor, SqlitePool};

use crate::models::part::{Ancestor, Part, PartStatus, PartSummary, PartType};
use crate::models::user::PartRole;

/// Column list for `parts` queries.
const COLUMNS: &str = "id, parent_id, part_type, status, title, position, content, created_at";

pub struct PartRepo;

impl PartRepo {
    pub async fn find_by_id<'c>(
        conn: impl SqliteExecutor<'c>,
        id: i64,
    ) -> Result<Option<Part>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM parts WHERE id = ?");
        sqlx::query_as::<_, Part>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Direct children, in display order.
    pub async fn children(pool: &SqlitePool, id: i64) -> Result<Vec<PartSummary>, sqlx::Error> {
        sqlx::query_as::<_, PartSummary>(
            "SELECT id, part_type, status, title, position FROM parts \
             WHERE parent_id = ? ORDER BY position, id",
        )
        .bind(id)
        .fetch_all(pool)
        .await
    }

    pub async fn modules_with_status(
        pool: &SqlitePool,
        status: PartStatus,
    ) -> Result<Vec<PartSummary>, sqlx::Error> {
        sqlx::query_as::<_, PartSummary>(
            "SELECT id, part_type, status, title, position FROM parts \
             WHERE part_type = ? AND status = ? ORDER BY title",
        )
        .bind(PartType::Module)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Returns the part's ancestors, nearest first; the last one is its module.
    pub async fn ancestors(pool: &SqlitePool, id: i64) -> Result<Vec<Ancestor>, sqlx::Error> {
        sqlx::query_as::<_, Ancestor>(
            "WITH RECURSIVE ancestors(id, parent_id, part_type, status, depth) AS ( \
                 SELECT p.id, p.parent_id, p.part_type, p.status, 1 \
                 FROM parts p JOIN parts c ON p.id = c.parent_id WHERE c.id = ? \
                 UNION ALL \
                 SELECT p.id, p.parent_id, p.part_type, p.status, a.depth + 1 \
                 FROM parts p JOIN ancestors a ON p.id = a.parent_id \
             ) \
             SELECT id, part_type, status FROM ancestors ORDER BY depth",
        )
        .bind(id)
        .fetch_all(pool)
        .await
    }

    pub async fn role_for(
        pool: &SqlitePool,
        user_id: i64,
        module_id: i64,
    ) -> Result<Option<PartRole>, sqlx::Error> {
        sqlx::query_scalar::<_, PartRole>(
            "SELECT role FROM user_part_roles WHERE user_id = ? AND part_id = ?",
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_optional(pool)
        .await
    }

    /// Grants a role, keeping an existing owner role intact.
    pub async fn grant_role<'c>(
        conn: impl SqliteExecutor<'c>,
        user_id: i64,
        module_id: i64,
        role: PartRole,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO user_part_roles (user_id, part_id, role) VALUES (?, ?, ?) \
             ON CONFLICT (user_id, part_id) DO UPDATE SET role = \
                 CASE WHEN user_part_roles.role = 'owner' THEN 'owner' ELSE excluded.role END",
        )
        .bind(user_id)
        .bind(module_id)
        .bind(role)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn revoke_role(
        pool: &SqlitePool,
        user_id: i64,
        module_id: i64,
        role: PartRole,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM user_part_roles WHERE user_id = ? AND part_id = ? AND role = ?")
                .bind(user_id)
                .bind(module_id)
                .bind(role)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Inserts a part. Without a position it goes after its last sibling.
    pub async fn create<'c>(
        conn: impl SqliteExecutor<'c>,
        parent_id: Option<i64>,
        part_type: PartType,
        title: &str,
        content: &str,
        position: Option<i64>,
    ) -> Result<Part, sqlx::Error> {
        let query = format!(
            "INSERT INTO parts (parent_id, part_type, title, content, position) \
             VALUES (?, ?, ?, ?, COALESCE(?, \
                 (SELECT COALESCE(MAX(position), -1) + 1 FROM parts WHERE parent_id IS ?))) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Part>(&query)
            .bind(parent_id)
            .bind(part_type)
            .bind(title)
            .bind(content)
            .bind(position)
            .bind(parent_id)
            .fetch_one(conn)
            .await
    }

    /// Updates the given fields; `None` keeps the stored value.
    pub async fn update<'c>(
        conn: impl SqliteExecutor<'c>,
        id: i64,
        title: Option<&str>,
        content: Option<&str>,
        position: Option<i64>,
    ) -> Result<Option<Part>, sqlx::Error> {
        let query = format!(
            "UPDATE parts SET title = COALESCE(?, title), content = COALESCE(?, content), \
                 position = COALESCE(?, position) \
             WHERE id = ? RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Part>(&query)
            .bind(title)
            .bind(content)
            .bind(position)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Deletes the part and, through the foreign keys, everything below it.
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM parts WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns the number of rows changed (0 if the part no longer exists).
    pub async fn set_status<'c>(
        conn: impl SqliteExecutor<'c>,
        id: i64,
        status: PartStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE parts SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}
