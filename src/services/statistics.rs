use sqlx::PgPool;

use crate::models::{
    document::DocumentStatus,
    statistics::{DashboardStatistics, DocumentCounts, RoleCounts},
    user::UserRole,
};

pub struct StatisticsService;

impl StatisticsService {
    /// Runs every aggregate concurrently. A failing query is logged and
    /// reported as zero so one bad table never blanks the dashboard.
    pub async fn dashboard(pool: &PgPool) -> DashboardStatistics {
        let (users, children, groups, documents, activities, meals, rating) = tokio::join!(
            sqlx::query_as::<_, (UserRole, i64)>(
                "SELECT role, COUNT(*) FROM users WHERE is_active = TRUE GROUP BY role"
            )
            .fetch_all(pool),
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM children WHERE is_active = TRUE")
                .fetch_one(pool),
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM groups").fetch_one(pool),
            sqlx::query_as::<_, (DocumentStatus, i64)>(
                "SELECT status, COUNT(*) FROM documents GROUP BY status"
            )
            .fetch_all(pool),
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM activities WHERE activity_date >= date_trunc('week', CURRENT_DATE)::date"
            )
            .fetch_one(pool),
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM meals WHERE meal_date >= date_trunc('week', CURRENT_DATE)::date"
            )
            .fetch_one(pool),
            sqlx::query_scalar::<_, Option<f64>>("SELECT AVG(rating)::float8 FROM teacher_ratings")
                .fetch_one(pool),
        );

        let mut stats = DashboardStatistics::default();
        let degraded = &mut stats.degraded;
        stats.users = role_counts(settle("users", users, degraded));
        stats.active_children = settle("active_children", children, degraded);
        stats.groups = settle("groups", groups, degraded);
        stats.documents = document_counts(settle("documents", documents, degraded));
        stats.activities_this_week = settle("activities_this_week", activities, degraded);
        stats.meals_this_week = settle("meals_this_week", meals, degraded);
        stats.average_teacher_rating = settle("average_teacher_rating", rating, degraded);
        stats
    }
}

fn settle<T: Default>(
    name: &'static str,
    result: Result<T, sqlx::Error>,
    degraded: &mut Vec<&'static str>,
) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("statistics: {name} query failed: {e}");
            degraded.push(name);
            T::default()
        }
    }
}

fn role_counts(rows: Vec<(UserRole, i64)>) -> RoleCounts {
    let mut counts = RoleCounts::default();
    for (role, n) in rows {
        match role {
            UserRole::Parent => counts.parents = n,
            UserRole::Teacher => counts.teachers = n,
            UserRole::Reception => counts.receptions = n,
            UserRole::Admin => counts.admins = n,
        }
    }
    counts
}

fn document_counts(rows: Vec<(DocumentStatus, i64)>) -> DocumentCounts {
    let mut counts = DocumentCounts::default();
    for (status, n) in rows {
        match status {
            DocumentStatus::Pending => counts.pending = n,
            DocumentStatus::Approved => counts.approved = n,
            DocumentStatus::Rejected => counts.rejected = n,
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_degrades_to_default() {
        let mut degraded = Vec::new();
        assert_eq!(settle("groups", Ok(4_i64), &mut degraded), 4);
        assert!(degraded.is_empty());

        let n: i64 = settle("meals_this_week", Err(sqlx::Error::PoolTimedOut), &mut degraded);
        assert_eq!(n, 0);
        let avg: Option<f64> = settle("average_teacher_rating", Err(sqlx::Error::PoolClosed), &mut degraded);
        assert_eq!(avg, None);
        assert_eq!(degraded, vec!["meals_this_week", "average_teacher_rating"]);
    }

    #[test]
    fn test_role_and_document_counts() {
        let roles = role_counts(vec![(UserRole::Parent, 12), (UserRole::Admin, 1)]);
        assert_eq!(roles, RoleCounts { parents: 12, teachers: 0, receptions: 0, admins: 1 });

        let docs = document_counts(vec![(DocumentStatus::Pending, 3), (DocumentStatus::Rejected, 2)]);
        assert_eq!(docs, DocumentCounts { pending: 3, approved: 0, rejected: 2 });
    }
}
