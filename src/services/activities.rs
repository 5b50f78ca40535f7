use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        activity::{Activity, CreateActivityRequest},
        auth::AuthenticatedUser,
        DateRangeQuery,
    },
    services::children::ChildService,
};

pub struct ActivityService;

impl ActivityService {
    pub async fn create(
        pool: &PgPool,
        teacher: &AuthenticatedUser,
        req: &CreateActivityRequest,
    ) -> ApiResult<Activity> {
        if req.title.trim().is_empty() {
            return Err(ApiError::bad_request("Activity title is required"));
        }
        if !ChildService::is_teacher_of(pool, req.child_id, teacher.user_id).await? {
            return Err(ApiError::Forbidden);
        }

        let activity = sqlx::query_as::<_, Activity>(
            "INSERT INTO activities (child_id, title, description, activity_date, created_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(req.child_id)
        .bind(req.title.trim())
        .bind(&req.description)
        .bind(req.activity_date)
        .bind(teacher.user_id)
        .fetch_one(pool)
        .await?;
        Ok(activity)
    }

    /// Activities for one child, newest first. Access is checked by the caller.
    pub async fn list_for_child(
        pool: &PgPool,
        child_id: Uuid,
        range: &DateRangeQuery,
    ) -> ApiResult<Vec<Activity>> {
        range.validate().map_err(ApiError::bad_request)?;
        let activities = sqlx::query_as::<_, Activity>(
            "SELECT * FROM activities
             WHERE child_id = $1
               AND ($2::date IS NULL OR activity_date >= $2)
               AND ($3::date IS NULL OR activity_date <= $3)
             ORDER BY activity_date DESC, created_at DESC",
        )
        .bind(child_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(pool)
        .await?;
        Ok(activities)
    }

    pub async fn delete(pool: &PgPool, teacher_id: Uuid, id: Uuid) -> ApiResult<()> {
        let res = sqlx::query("DELETE FROM activities WHERE id = $1 AND created_by = $2")
            .bind(id)
            .bind(teacher_id)
            .execute(pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::NotFound("Activity"));
        }
        Ok(())
    }
}
