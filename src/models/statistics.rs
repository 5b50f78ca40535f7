use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RoleCounts {
    pub parents: i64,
    pub teachers: i64,
    pub receptions: i64,
    pub admins: i64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DocumentCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

/// Aggregate numbers for the admin and super-admin dashboards.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DashboardStatistics {
    pub users: RoleCounts,
    pub active_children: i64,
    pub groups: i64,
    pub documents: DocumentCounts,
    pub activities_this_week: i64,
    pub meals_this_week: i64,
    pub average_teacher_rating: Option<f64>,
    /// Names of sub-queries that failed and were reported as zero.
    pub degraded: Vec<&'static str>,
}
