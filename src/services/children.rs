use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::AuthenticatedUser,
        child::{Child, ChildQuery, CreateChildRequest, UpdateChildRequest, UpdateEmergencyContactRequest},
        user::UserRole,
    },
    services::users::UserService,
};

/// Children a teacher is responsible for: directly assigned, or in a group they lead.
const TEACHES_CHILD: &str = "(c.teacher_id = $1 OR c.group_id IN (SELECT g.id FROM groups g WHERE g.teacher_id = $1))";

pub struct ChildService;

impl ChildService {
    pub async fn list(pool: &PgPool, query: &ChildQuery) -> ApiResult<Vec<Child>> {
        let pattern = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{q}%"));
        let children = sqlx::query_as::<_, Child>(
            "SELECT c.* FROM children c
             WHERE ($1::text IS NULL OR c.first_name ILIKE $1 OR c.last_name ILIKE $1
                    OR (c.first_name || ' ' || c.last_name) ILIKE $1)
               AND ($2::uuid IS NULL OR c.group_id = $2)
               AND ($3::uuid IS NULL OR c.parent_id = $3)
             ORDER BY c.last_name, c.first_name",
        )
        .bind(pattern)
        .bind(query.group_id)
        .bind(query.parent_id)
        .fetch_all(pool)
        .await?;
        Ok(children)
    }

    pub async fn list_for_parent(pool: &PgPool, parent_id: Uuid) -> ApiResult<Vec<Child>> {
        let children = sqlx::query_as::<_, Child>(
            "SELECT c.* FROM children c
             WHERE c.parent_id = $1 AND c.is_active = TRUE
             ORDER BY c.last_name, c.first_name",
        )
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
        Ok(children)
    }

    pub async fn list_for_teacher(pool: &PgPool, teacher_id: Uuid) -> ApiResult<Vec<Child>> {
        let children = sqlx::query_as::<_, Child>(&format!(
            "SELECT c.* FROM children c
             WHERE {TEACHES_CHILD} AND c.is_active = TRUE
             ORDER BY c.last_name, c.first_name"
        ))
        .bind(teacher_id)
        .fetch_all(pool)
        .await?;
        Ok(children)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> ApiResult<Child> {
        sqlx::query_as::<_, Child>("SELECT * FROM children WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(ApiError::NotFound("Child"))
    }

    pub async fn create(pool: &PgPool, req: &CreateChildRequest) -> ApiResult<Child> {
        req.validate(chrono::Utc::now().date_naive())
            .map_err(ApiError::bad_request)?;
        UserService::ensure_role(pool, req.parent_id, UserRole::Parent).await?;
        if let Some(teacher_id) = req.teacher_id {
            UserService::ensure_role(pool, teacher_id, UserRole::Teacher).await?;
        }

        let child = sqlx::query_as::<_, Child>(
            "INSERT INTO children
               (parent_id, first_name, last_name, birth_date, gender, disability_type, school,
                class_name, group_id, teacher_id, emergency_contact_name, emergency_contact_phone, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING *",
        )
        .bind(req.parent_id)
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(req.birth_date)
        .bind(req.gender)
        .bind(&req.disability_type)
        .bind(&req.school)
        .bind(&req.class_name)
        .bind(req.group_id)
        .bind(req.teacher_id)
        .bind(&req.emergency_contact_name)
        .bind(&req.emergency_contact_phone)
        .bind(&req.notes)
        .fetch_one(pool)
        .await?;
        Ok(child)
    }

    pub async fn update(pool: &PgPool, id: Uuid, req: &UpdateChildRequest) -> ApiResult<Child> {
        if let Some(parent_id) = req.parent_id {
            UserService::ensure_role(pool, parent_id, UserRole::Parent).await?;
        }
        if let Some(Some(teacher_id)) = req.teacher_id {
            UserService::ensure_role(pool, teacher_id, UserRole::Teacher).await?;
        }

        // $9/$11 say whether group_id/teacher_id were sent at all; a sent null unassigns.
        sqlx::query_as::<_, Child>(
            "UPDATE children
             SET parent_id               = COALESCE($1, parent_id),
                 first_name              = COALESCE($2, first_name),
                 last_name               = COALESCE($3, last_name),
                 birth_date              = COALESCE($4, birth_date),
                 gender                  = COALESCE($5, gender),
                 disability_type         = COALESCE($6, disability_type),
                 school                  = COALESCE($7, school),
                 class_name              = COALESCE($8, class_name),
                 group_id                = CASE WHEN $9 THEN $10 ELSE group_id END,
                 teacher_id              = CASE WHEN $11 THEN $12 ELSE teacher_id END,
                 emergency_contact_name  = COALESCE($13, emergency_contact_name),
                 emergency_contact_phone = COALESCE($14, emergency_contact_phone),
                 notes                   = COALESCE($15, notes),
                 is_active               = COALESCE($16, is_active),
                 updated_at              = NOW()
             WHERE id = $17
             RETURNING *",
        )
        .bind(req.parent_id)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(req.birth_date)
        .bind(req.gender)
        .bind(&req.disability_type)
        .bind(&req.school)
        .bind(&req.class_name)
        .bind(req.group_id.is_some())
        .bind(req.group_id.flatten())
        .bind(req.teacher_id.is_some())
        .bind(req.teacher_id.flatten())
        .bind(&req.emergency_contact_name)
        .bind(&req.emergency_contact_phone)
        .bind(&req.notes)
        .bind(req.is_active)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Child"))
    }

    pub async fn update_emergency_contact(
        pool: &PgPool,
        parent_id: Uuid,
        child_id: Uuid,
        req: &UpdateEmergencyContactRequest,
    ) -> ApiResult<Child> {
        if req.emergency_contact_name.trim().is_empty() || req.emergency_contact_phone.trim().is_empty() {
            return Err(ApiError::bad_request("Emergency contact name and phone are required"));
        }
        sqlx::query_as::<_, Child>(
            "UPDATE children
             SET emergency_contact_name = $1, emergency_contact_phone = $2, updated_at = NOW()
             WHERE id = $3 AND parent_id = $4
             RETURNING *",
        )
        .bind(req.emergency_contact_name.trim())
        .bind(req.emergency_contact_phone.trim())
        .bind(child_id)
        .bind(parent_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Child"))
    }

    /// Hard delete; activities, meals and media rows cascade. Stored media
    /// files are returned so the caller can remove them.
    pub async fn delete(pool: &PgPool, id: Uuid) -> ApiResult<Vec<String>> {
        let mut tx = pool.begin().await?;
        let paths: Vec<String> = sqlx::query_scalar("SELECT storage_path FROM media WHERE child_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
        let res = sqlx::query("DELETE FROM children WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::NotFound("Child"));
        }
        tx.commit().await?;
        Ok(paths)
    }

    pub async fn is_parent_of(pool: &PgPool, child_id: Uuid, user_id: Uuid) -> ApiResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM children WHERE id = $1 AND parent_id = $2)",
        )
        .bind(child_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    pub async fn is_teacher_of(pool: &PgPool, child_id: Uuid, teacher_id: Uuid) -> ApiResult<bool> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM children c WHERE c.id = $2 AND {TEACHES_CHILD})"
        ))
        .bind(teacher_id)
        .bind(child_id)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    /// True when the teacher teaches at least one of the parent's children.
    pub async fn teacher_teaches_parent(
        pool: &PgPool,
        teacher_id: Uuid,
        parent_id: Uuid,
    ) -> ApiResult<bool> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM children c WHERE c.parent_id = $2 AND {TEACHES_CHILD})"
        ))
        .bind(teacher_id)
        .bind(parent_id)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    /// Read access to a child's records: its parent, its teachers, and the front office.
    pub async fn ensure_can_view(pool: &PgPool, user: &AuthenticatedUser, child_id: Uuid) -> ApiResult<()> {
        let allowed = match user.role {
            UserRole::Admin | UserRole::Reception => true,
            UserRole::Parent => Self::is_parent_of(pool, child_id, user.user_id).await?,
            UserRole::Teacher => Self::is_teacher_of(pool, child_id, user.user_id).await?,
        };
        if allowed {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_unassigning_teacher_revokes_access(pool: PgPool) {
        let parent = fixtures::user(&pool, UserRole::Parent).await;
        let teacher = fixtures::user(&pool, UserRole::Teacher).await;
        let child_id = fixtures::child(&pool, parent.user_id, Some(teacher.user_id), None).await;
        assert!(ChildService::is_teacher_of(&pool, child_id, teacher.user_id).await.unwrap());

        let untouched = UpdateChildRequest { notes: Some("Allergic to peanuts".into()), ..Default::default() };
        let child = ChildService::update(&pool, child_id, &untouched).await.unwrap();
        assert_eq!(child.teacher_id, Some(teacher.user_id));

        let unassign = UpdateChildRequest { teacher_id: Some(None), ..Default::default() };
        let child = ChildService::update(&pool, child_id, &unassign).await.unwrap();
        assert_eq!(child.teacher_id, None);
        assert_eq!(child.notes.as_deref(), Some("Allergic to peanuts"));
        assert!(!ChildService::is_teacher_of(&pool, child_id, teacher.user_id).await.unwrap());
        assert!(ChildService::ensure_can_view(&pool, &teacher, child_id).await.is_err());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn test_removing_child_from_group(pool: PgPool) {
        let parent = fixtures::user(&pool, UserRole::Parent).await;
        let teacher = fixtures::user(&pool, UserRole::Teacher).await;
        let group = fixtures::group(&pool, Some(teacher.user_id)).await;
        let child_id = fixtures::child(&pool, parent.user_id, None, Some(group)).await;
        assert!(ChildService::teacher_teaches_parent(&pool, teacher.user_id, parent.user_id).await.unwrap());

        let unassign = UpdateChildRequest { group_id: Some(None), ..Default::default() };
        let child = ChildService::update(&pool, child_id, &unassign).await.unwrap();
        assert_eq!(child.group_id, None);
        assert!(!ChildService::teacher_teaches_parent(&pool, teacher.user_id, parent.user_id).await.unwrap());
    }
}
