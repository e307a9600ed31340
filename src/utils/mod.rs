pub mod pagination;

pub use pagination::{PaginatedResponse, PaginationMeta, PaginationParams};

/// Mask sensitive values partially (emails, tokens) before they hit the logs
pub fn mask_sensitive(value: &str) -> String {
    if value.is_empty() {
        return "".to_string();
    }

    if let Some(idx) = value.find('@') {
        let (local, domain) = value.split_at(idx);
        let domain = &domain[1..];
        let visible = if local.chars().count() <= 2 { 1 } else { 2 };
        let head: String = local.chars().take(visible).collect();
        return format!("{}***@{}", head, domain);
    }

    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return format!("{}***", chars[0]);
    }

    let start: String = chars[..4].iter().collect();
    let end: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", start, end)
}

/// Logging helpers
pub mod logging {
    use log::LevelFilter;

    pub fn level_from_string(level: &str) -> LevelFilter {
        match level.to_lowercase().as_str() {
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        }
    }
}

/// Response helpers
pub mod response {
    use actix_web::http::StatusCode;
    use actix_web::HttpResponse;
    use serde::Serialize;

    pub fn json_response<T: Serialize>(data: T, status: u16) -> HttpResponse {
        match StatusCode::from_u16(status) {
            Ok(code) => HttpResponse::build(code).json(data),
            Err(_) => HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "Invalid status code"})),
        }
    }

    pub fn success_response<T: Serialize>(data: T) -> HttpResponse {
        json_response(data, 200)
    }

    pub fn error_response(message: &str, status: u16) -> HttpResponse {
        json_response(serde_json::json!({"error": message}), status)
    }
}
