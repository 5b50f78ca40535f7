use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::AuthenticatedUser,
        meal::{CreateMealRequest, Meal},
        DateRangeQuery,
    },
    services::children::ChildService,
};

pub struct MealService;

impl MealService {
    pub async fn create(
        pool: &PgPool,
        teacher: &AuthenticatedUser,
        req: &CreateMealRequest,
    ) -> ApiResult<Meal> {
        if req.description.trim().is_empty() {
            return Err(ApiError::bad_request("Meal description is required"));
        }
        if !ChildService::is_teacher_of(pool, req.child_id, teacher.user_id).await? {
            return Err(ApiError::Forbidden);
        }

        let meal = sqlx::query_as::<_, Meal>(
            "INSERT INTO meals (child_id, meal_type, description, meal_date, created_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(req.child_id)
        .bind(req.meal_type)
        .bind(req.description.trim())
        .bind(req.meal_date)
        .bind(teacher.user_id)
        .fetch_one(pool)
        .await?;
        Ok(meal)
    }

    pub async fn list_for_child(
        pool: &PgPool,
        child_id: Uuid,
        range: &DateRangeQuery,
    ) -> ApiResult<Vec<Meal>> {
        range.validate().map_err(ApiError::bad_request)?;
        let meals = sqlx::query_as::<_, Meal>(
            "SELECT * FROM meals
             WHERE child_id = $1
               AND ($2::date IS NULL OR meal_date >= $2)
               AND ($3::date IS NULL OR meal_date <= $3)
             ORDER BY meal_date DESC, meal_type",
        )
        .bind(child_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(pool)
        .await?;
        Ok(meals)
    }

    pub async fn delete(pool: &PgPool, teacher_id: Uuid, id: Uuid) -> ApiResult<()> {
        let res = sqlx::query("DELETE FROM meals WHERE id = $1 AND created_by = $2")
            .bind(id)
            .bind(teacher_id)
            .execute(pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::NotFound("Meal"));
        }
        Ok(())
    }
}
