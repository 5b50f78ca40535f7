pub mod auth;
pub mod chat;
pub mod children;
pub mod documents;
pub mod groups;
pub mod health;
pub mod journal;
pub mod media;
pub mod metrics;
pub mod ratings;
pub mod statistics;
pub mod users;
pub mod websocket;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Decrypted file bytes served inline with their stored content type.
pub(crate) fn file_response(content_type: &str, filename: &str, bytes: Vec<u8>) -> Response {
    let disposition = format!("inline; filename=\"{}\"", sanitize_filename(filename));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, bytes.len().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "private, no-store".to_string()),
        ],
        Body::from(bytes),
    )
        .into_response()
}

/// Keeps the header value printable and the quoted string closed.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();
    if cleaned.trim().is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("id card.pdf"), "id card.pdf");
        assert_eq!(sanitize_filename("a\"b\\c.png"), "abc.png");
        assert_eq!(sanitize_filename("été.jpg"), "_t_.jpg");
        assert_eq!(sanitize_filename("\"\""), "download");
        assert_eq!(sanitize_filename("a\nb"), "a_b");
    }

    #[test]
    fn test_file_response_headers() {
        let res = file_response("application/pdf", "diploma.pdf", b"%PDF".to_vec());
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "4");
        assert_eq!(
            res.headers()[header::CONTENT_DISPOSITION],
            "inline; filename=\"diploma.pdf\""
        );
    }
}
