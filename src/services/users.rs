use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::USER_COLS,
    error::{ApiError, ApiResult},
    models::{
        user::{
            normalize_email, validate_password, CreateUserRequest, CreatedUserResponse,
            ReceptionSummary, UpdateUserRequest, User, UserQuery, UserRole,
        },
        PaginationQuery,
    },
    services::auth::{generate_temp_password, hash_password, AuthService},
};

pub struct UserService;

impl UserService {
    /// Search users by name/email and role. `allowed_roles` narrows the result
    /// to what the caller's portal may see.
    pub async fn search(
        pool: &PgPool,
        query: &UserQuery,
        allowed_roles: &[UserRole],
    ) -> ApiResult<Vec<User>> {
        if let Some(role) = query.role {
            if !allowed_roles.contains(&role) {
                return Err(ApiError::Forbidden);
            }
        }
        let page = PaginationQuery::new(query.page, query.per_page);
        let pattern = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users
             WHERE role = ANY($1)
               AND ($2::user_role IS NULL OR role = $2)
               AND ($3::text IS NULL
                    OR first_name ILIKE $3 OR last_name ILIKE $3 OR email ILIKE $3
                    OR (first_name || ' ' || last_name) ILIKE $3)
             ORDER BY last_name, first_name
             LIMIT $4 OFFSET $5"
        ))
        .bind(allowed_roles)
        .bind(query.role)
        .bind(pattern)
        .bind(page.per_page())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;
        Ok(users)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(ApiError::NotFound("User"))
    }

    /// Staff-side account creation. Accounts created by staff are verified up
    /// front; a generated password must be changed at first login.
    pub async fn create(pool: &PgPool, req: &CreateUserRequest) -> ApiResult<CreatedUserResponse> {
        let email = normalize_email(&req.email).map_err(ApiError::bad_request)?;
        if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
            return Err(ApiError::bad_request("First and last name are required"));
        }

        let (password, temp_password) = match &req.password {
            Some(p) => {
                validate_password(p).map_err(ApiError::bad_request)?;
                (p.clone(), None)
            }
            None => {
                let generated = generate_temp_password();
                (generated.clone(), Some(generated))
            }
        };
        let password_hash = hash_password(&password).await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users
               (email, password_hash, first_name, last_name, phone, role, is_verified, force_password_change)
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
             RETURNING {USER_COLS}"
        ))
        .bind(&email)
        .bind(&password_hash)
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(&req.phone)
        .bind(req.role)
        .bind(temp_password.is_some())
        .fetch_one(pool)
        .await?;

        tracing::info!(user = %user.id, role = %user.role, "account created by staff");
        Ok(CreatedUserResponse {
            user: user.into(),
            temp_password,
        })
    }

    pub async fn update(pool: &PgPool, id: Uuid, req: &UpdateUserRequest) -> ApiResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET first_name  = COALESCE($1, first_name),
                 last_name   = COALESCE($2, last_name),
                 phone       = COALESCE($3, phone),
                 role        = COALESCE($4, role),
                 is_active   = COALESCE($5, is_active),
                 is_verified = COALESCE($6, is_verified),
                 updated_at  = NOW()
             WHERE id = $7
             RETURNING {USER_COLS}"
        ))
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(&req.phone)
        .bind(req.role)
        .bind(req.is_active)
        .bind(req.is_verified)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

        if req.is_active == Some(false) {
            AuthService::revoke_all_sessions(pool, id).await?;
        }
        Ok(user)
    }

    /// Hard delete. Owned rows cascade; the stored files that went with them
    /// are returned so the caller can remove them.
    pub async fn delete(pool: &PgPool, id: Uuid) -> ApiResult<Vec<String>> {
        let mut tx = pool.begin().await?;
        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT storage_path FROM documents WHERE owner_id = $1
             UNION ALL
             SELECT m.storage_path FROM media m
             LEFT JOIN children c ON c.id = m.child_id
             WHERE m.uploader_id = $1 OR c.parent_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::NotFound("User"));
        }
        tx.commit().await?;
        Ok(paths)
    }

    pub async fn list_receptions(pool: &PgPool) -> ApiResult<Vec<ReceptionSummary>> {
        let rows = sqlx::query_as::<_, ReceptionSummary>(
            "SELECT u.id, u.email, u.first_name, u.last_name, u.phone,
                    u.is_verified, u.documents_approved, u.is_active,
                    COUNT(d.id) FILTER (WHERE d.status = 'pending')  AS pending_documents,
                    COUNT(d.id) FILTER (WHERE d.status = 'approved') AS approved_documents,
                    COUNT(d.id) FILTER (WHERE d.status = 'rejected') AS rejected_documents,
                    u.created_at
             FROM users u
             LEFT JOIN documents d ON d.owner_id = u.id
             WHERE u.role = 'reception'
             GROUP BY u.id
             ORDER BY u.last_name, u.first_name",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Admin `activate`: the account becomes usable and verified.
    /// Admin `deactivate`: login is refused and open sessions are revoked.
    pub async fn set_active(
        pool: &PgPool,
        id: Uuid,
        expected_role: UserRole,
        active: bool,
    ) -> ApiResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET is_active = $2,
                 is_verified = CASE WHEN $2 THEN TRUE ELSE is_verified END,
                 updated_at = NOW()
             WHERE id = $1 AND role = $3
             RETURNING {USER_COLS}"
        ))
        .bind(id)
        .bind(active)
        .bind(expected_role)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

        if !active {
            AuthService::revoke_all_sessions(pool, id).await?;
        }
        tracing::info!(user = %id, active, "account activation changed");
        Ok(user)
    }

    /// Reception marks a parent or teacher as verified after checking them in person.
    pub async fn verify(pool: &PgPool, id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET is_verified = TRUE, updated_at = NOW()
             WHERE id = $1 AND role IN ('parent', 'teacher')
             RETURNING {USER_COLS}"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("User"))
    }

    /// Teachers of any of the parent's active children, directly or through a group.
    pub async fn teachers_for_parent(pool: &PgPool, parent_id: Uuid) -> ApiResult<Vec<User>> {
        let teachers = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users
             WHERE role = 'teacher' AND is_active = TRUE
               AND id IN (
                   SELECT c.teacher_id FROM children c
                   WHERE c.parent_id = $1 AND c.is_active AND c.teacher_id IS NOT NULL
                   UNION
                   SELECT g.teacher_id FROM children c JOIN groups g ON g.id = c.group_id
                   WHERE c.parent_id = $1 AND c.is_active AND g.teacher_id IS NOT NULL
               )
             ORDER BY last_name, first_name"
        ))
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
        Ok(teachers)
    }

    /// Fails unless `id` is an active user with `role`.
    pub async fn ensure_role(pool: &PgPool, id: Uuid, role: UserRole) -> ApiResult<()> {
        let ok: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND role = $2 AND is_active = TRUE)",
        )
        .bind(id)
        .bind(role)
        .fetch_one(pool)
        .await?;
        if !ok {
            return Err(ApiError::bad_request(format!("{id} is not an active {role}")));
        }
        Ok(())
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("smith"), "smith");
    }
}
