use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec};
use sqlx::PgPool;
use tracing::{info, warn};

lazy_static! {
    // ── Event counters ──────────────────────────────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref DOCUMENT_UPLOADS_COUNTER: CounterVec = register_counter_vec!(
        "api_document_uploads_total",
        "Documents uploaded by owner role",
        &["role"]
    ).unwrap();

    pub static ref DOCUMENT_REVIEWS_COUNTER: CounterVec = register_counter_vec!(
        "api_document_reviews_total",
        "Document review decisions by reviewer role and decision",
        &["reviewer_role", "decision"]
    ).unwrap();

    pub static ref MEDIA_UPLOADS_COUNTER: CounterVec = register_counter_vec!(
        "api_media_uploads_total",
        "Child media files uploaded",
        &["content_kind"]
    ).unwrap();

    pub static ref MESSAGES_COUNTER: CounterVec = register_counter_vec!(
        "api_chat_messages_total",
        "Chat messages sent by sender role",
        &["sender_role"]
    ).unwrap();

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref USERS_GAUGE: GaugeVec = register_gauge_vec!(
        "school_users_active_total",
        "Active users by role",
        &["role"]
    ).unwrap();

    pub static ref CHILDREN_GAUGE: Gauge = register_gauge!(
        "school_children_active_total",
        "Active children"
    ).unwrap();

    pub static ref PENDING_DOCUMENTS_GAUGE: Gauge = register_gauge!(
        "school_documents_pending_total",
        "Documents waiting for review"
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = collect(&pool).await {
                warn!("Metrics: collection failed: {}", e);
            }
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
        }
    });
}

async fn collect(pool: &PgPool) -> anyhow::Result<()> {
    let user_counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT role::TEXT, COUNT(*)::BIGINT FROM users WHERE is_active = TRUE GROUP BY role",
    )
    .fetch_all(pool)
    .await?;
    for (role, count) in user_counts {
        USERS_GAUGE.with_label_values(&[&role]).set(count as f64);
    }

    let children: i64 =
        sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM children WHERE is_active = TRUE")
            .fetch_one(pool)
            .await?;
    CHILDREN_GAUGE.set(children as f64);

    let pending: i64 =
        sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM documents WHERE status = 'pending'")
            .fetch_one(pool)
            .await?;
    PENDING_DOCUMENTS_GAUGE.set(pending as f64);

    info!("Metrics: collected ({children} children, {pending} pending documents)");
    Ok(())
}

/// Coarse label for a media content type.
pub fn content_kind(content_type: &str) -> &'static str {
    if content_type.starts_with("image/") {
        "image"
    } else if content_type.starts_with("video/") {
        "video"
    } else {
        "other"
    }
}
