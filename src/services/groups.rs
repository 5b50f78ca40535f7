use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        group::{CreateGroupRequest, Group, GroupWithCount, UpdateGroupRequest},
        user::UserRole,
    },
    services::users::UserService,
};

pub struct GroupService;

impl GroupService {
    pub async fn list(pool: &PgPool, teacher_id: Option<Uuid>) -> ApiResult<Vec<GroupWithCount>> {
        let groups = sqlx::query_as::<_, GroupWithCount>(
            "SELECT g.id, g.name, g.description, g.color, g.teacher_id,
                    t.first_name || ' ' || t.last_name AS teacher_name,
                    (SELECT COUNT(*) FROM children c WHERE c.group_id = g.id AND c.is_active) AS children_count,
                    g.created_at, g.updated_at
             FROM groups g
             LEFT JOIN users t ON t.id = g.teacher_id
             WHERE ($1::uuid IS NULL OR g.teacher_id = $1)
             ORDER BY g.name",
        )
        .bind(teacher_id)
        .fetch_all(pool)
        .await?;
        Ok(groups)
    }

    pub async fn create(pool: &PgPool, req: &CreateGroupRequest) -> ApiResult<Group> {
        if req.name.trim().is_empty() {
            return Err(ApiError::bad_request("Group name is required"));
        }
        if let Some(teacher_id) = req.teacher_id {
            UserService::ensure_role(pool, teacher_id, UserRole::Teacher).await?;
        }
        let group = sqlx::query_as::<_, Group>(
            "INSERT INTO groups (name, description, color, teacher_id)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(&req.color)
        .bind(req.teacher_id)
        .fetch_one(pool)
        .await?;
        Ok(group)
    }

    pub async fn update(pool: &PgPool, id: Uuid, req: &UpdateGroupRequest) -> ApiResult<Group> {
        if let Some(Some(teacher_id)) = req.teacher_id {
            UserService::ensure_role(pool, teacher_id, UserRole::Teacher).await?;
        }
        sqlx::query_as::<_, Group>(
            "UPDATE groups
             SET name = COALESCE($1, name),
                 description = COALESCE($2, description),
                 color = COALESCE($3, color),
                 teacher_id = CASE WHEN $4 THEN $5 ELSE teacher_id END,
                 updated_at = NOW()
             WHERE id = $6
             RETURNING *",
        )
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.color)
        .bind(req.teacher_id.is_some())
        .bind(req.teacher_id.flatten())
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Group"))
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> ApiResult<()> {
        let res = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::NotFound("Group"));
        }
        Ok(())
    }

    /// Replace the children list for a group: detach all current children,
    /// then attach the provided ones. Unknown child ids reject the whole
    /// request. Returns the number of children now in the group.
    pub async fn set_children(pool: &PgPool, id: Uuid, child_ids: &[Uuid]) -> ApiResult<u64> {
        let mut ids = child_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut tx = pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM groups WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(ApiError::NotFound("Group"));
        }

        sqlx::query("UPDATE children SET group_id = NULL, updated_at = NOW() WHERE group_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if ids.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        let attached = sqlx::query("UPDATE children SET group_id = $1, updated_at = NOW() WHERE id = ANY($2)")
            .bind(id)
            .bind(&ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if attached != ids.len() as u64 {
            return Err(ApiError::bad_request(format!(
                "{} of the given child ids do not exist",
                ids.len() as u64 - attached
            )));
        }
        tx.commit().await?;
        Ok(attached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use axum::http::StatusCode;

    async fn group_of(pool: &PgPool, child_id: Uuid) -> Option<Uuid> {
        sqlx::query_scalar("SELECT group_id FROM children WHERE id = $1")
            .bind(child_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_set_children_replaces_membership(pool: PgPool) {
        let parent = fixtures::user(&pool, UserRole::Parent).await;
        let group = fixtures::group(&pool, None).await;
        let stays = fixtures::child(&pool, parent.user_id, None, Some(group)).await;
        let leaves = fixtures::child(&pool, parent.user_id, None, Some(group)).await;
        let joins = fixtures::child(&pool, parent.user_id, None, None).await;

        let count = GroupService::set_children(&pool, group, &[stays, joins, joins]).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(group_of(&pool, stays).await, Some(group));
        assert_eq!(group_of(&pool, joins).await, Some(group));
        assert_eq!(group_of(&pool, leaves).await, None);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_set_children_rejects_unknown_ids(pool: PgPool) {
        let parent = fixtures::user(&pool, UserRole::Parent).await;
        let group = fixtures::group(&pool, None).await;
        let member = fixtures::child(&pool, parent.user_id, None, Some(group)).await;

        let err = GroupService::set_children(&pool, group, &[Uuid::new_v4()]).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(group_of(&pool, member).await, Some(group));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_group_teacher_can_be_cleared(pool: PgPool) {
        let teacher = fixtures::user(&pool, UserRole::Teacher).await;
        let group = fixtures::group(&pool, Some(teacher.user_id)).await;

        let renamed = UpdateGroupRequest { name: Some("Tulips".into()), ..Default::default() };
        let g = GroupService::update(&pool, group, &renamed).await.unwrap();
        assert_eq!(g.teacher_id, Some(teacher.user_id));

        let cleared = UpdateGroupRequest { teacher_id: Some(None), ..Default::default() };
        let g = GroupService::update(&pool, group, &cleared).await.unwrap();
        assert_eq!(g.teacher_id, None);
        assert_eq!(g.name, "Tulips");
    }
}
