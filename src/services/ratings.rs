use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        rating::{RateTeacherRequest, RatingWithParent, TeacherRating, TeacherRatingSummary},
        user::UserRole,
    },
    services::{children::ChildService, users::UserService},
};

pub struct RatingService;

impl RatingService {
    /// A parent may rate only a teacher who teaches one of their children.
    /// Rating the same teacher again replaces the previous score.
    pub async fn rate(pool: &PgPool, parent_id: Uuid, req: &RateTeacherRequest) -> ApiResult<TeacherRating> {
        req.validate().map_err(ApiError::bad_request)?;
        UserService::ensure_role(pool, req.teacher_id, UserRole::Teacher).await?;
        if !ChildService::teacher_teaches_parent(pool, req.teacher_id, parent_id).await? {
            return Err(ApiError::Forbidden);
        }

        let comment = req
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let rating = sqlx::query_as::<_, TeacherRating>(
            "INSERT INTO teacher_ratings (teacher_id, parent_id, rating, comment)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (teacher_id, parent_id) DO UPDATE
               SET rating = EXCLUDED.rating,
                   comment = EXCLUDED.comment,
                   updated_at = NOW()
             RETURNING *",
        )
        .bind(req.teacher_id)
        .bind(parent_id)
        .bind(req.rating)
        .bind(comment)
        .fetch_one(pool)
        .await?;

        tracing::info!(teacher = %req.teacher_id, parent = %parent_id, rating = req.rating, "teacher rated");
        Ok(rating)
    }

    pub async fn list_by_parent(pool: &PgPool, parent_id: Uuid) -> ApiResult<Vec<TeacherRating>> {
        let ratings = sqlx::query_as::<_, TeacherRating>(
            "SELECT * FROM teacher_ratings WHERE parent_id = $1 ORDER BY updated_at DESC",
        )
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
        Ok(ratings)
    }

    pub async fn list_for_teacher(pool: &PgPool, teacher_id: Uuid) -> ApiResult<Vec<RatingWithParent>> {
        let ratings = sqlx::query_as::<_, RatingWithParent>(
            "SELECT r.id, r.teacher_id, r.parent_id,
                    p.first_name || ' ' || p.last_name AS parent_name,
                    r.rating, r.comment, r.updated_at
             FROM teacher_ratings r
             JOIN users p ON p.id = r.parent_id
             WHERE r.teacher_id = $1
             ORDER BY r.updated_at DESC",
        )
        .bind(teacher_id)
        .fetch_all(pool)
        .await?;
        Ok(ratings)
    }

    /// Per-teacher count and average. `teacher_id` narrows to one teacher.
    pub async fn summaries(pool: &PgPool, teacher_id: Option<Uuid>) -> ApiResult<Vec<TeacherRatingSummary>> {
        let rows = sqlx::query_as::<_, TeacherRatingSummary>(
            "SELECT t.id AS teacher_id,
                    t.first_name || ' ' || t.last_name AS teacher_name,
                    COUNT(r.id) AS ratings_count,
                    AVG(r.rating)::float8 AS average_rating
             FROM users t
             LEFT JOIN teacher_ratings r ON r.teacher_id = t.id
             WHERE t.role = 'teacher' AND ($1::uuid IS NULL OR t.id = $1)
             GROUP BY t.id
             ORDER BY average_rating DESC NULLS LAST, t.last_name",
        )
        .bind(teacher_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use axum::http::StatusCode;

    fn stars(teacher_id: Uuid, rating: i16) -> RateTeacherRequest {
        RateTeacherRequest { teacher_id, rating, comment: Some("  Patient and kind ".into()) }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_rerating_replaces_previous_score(pool: PgPool) {
        let parent = fixtures::user(&pool, UserRole::Parent).await;
        let teacher = fixtures::user(&pool, UserRole::Teacher).await;
        fixtures::child(&pool, parent.user_id, Some(teacher.user_id), None).await;

        let first = RatingService::rate(&pool, parent.user_id, &stars(teacher.user_id, 4)).await.unwrap();
        assert_eq!(first.comment.as_deref(), Some("Patient and kind"));
        let second = RatingService::rate(&pool, parent.user_id, &stars(teacher.user_id, 2)).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.rating, 2);

        assert_eq!(RatingService::list_by_parent(&pool, parent.user_id).await.unwrap().len(), 1);
        let summary = RatingService::summaries(&pool, Some(teacher.user_id)).await.unwrap();
        assert_eq!(summary[0].ratings_count, 1);
        assert_eq!(summary[0].average_rating, Some(2.0));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_only_teachers_of_own_children_can_be_rated(pool: PgPool) {
        let parent = fixtures::user(&pool, UserRole::Parent).await;
        let teacher = fixtures::user(&pool, UserRole::Teacher).await;
        let group_teacher = fixtures::user(&pool, UserRole::Teacher).await;
        let group = fixtures::group(&pool, Some(group_teacher.user_id)).await;
        fixtures::child(&pool, parent.user_id, None, Some(group)).await;

        let err = RatingService::rate(&pool, parent.user_id, &stars(teacher.user_id, 5)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        RatingService::rate(&pool, parent.user_id, &stars(group_teacher.user_id, 5)).await.unwrap();

        let err = RatingService::rate(&pool, parent.user_id, &stars(group_teacher.user_id, 6)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
