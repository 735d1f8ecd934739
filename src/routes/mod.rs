pub mod applications;
pub mod bookmarks;
pub mod jobs;
pub mod search_log;
pub mod user_auth;

use crate::errors::AppError;
use actix_web::{error::JsonPayloadError, web, HttpRequest};
use log::debug;

/// Turns undecodable JSON bodies into `400 {"error": ...}`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        debug!("Rejected JSON body: {}", err);
        AppError::bad_request(format!("Invalid request body: {}", err)).into()
    })
}

/// Builds a case-insensitive substring pattern with LIKE wildcards escaped.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub fn config_api_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(user_auth::config_user_auth_routes)
        .configure(jobs::config_job_routes)
        .configure(applications::config_application_routes)
        .configure(bookmarks::config_bookmark_routes)
        .configure(search_log::config_search_log_routes);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::handlers::auth::tests::service;
    use crate::models::all_models::UserRole;
    use actix_web::{dev::ServiceResponse, http::StatusCode, Error};
    use uuid::Uuid;

    /// A fresh identity with `role` and its `Authorization` header value.
    pub(crate) fn bearer(role: UserRole) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let pair = service()
            .issue(id, "Test User", "test@example.com", role)
            .unwrap();
        (id, format!("Bearer {}", pair.access_token))
    }

    pub(crate) fn status_of<B>(result: Result<ServiceResponse<B>, Error>) -> StatusCode {
        match result {
            Ok(res) => res.status(),
            Err(e) => e.as_response_error().status_code(),
        }
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern(" 100%_off "), "%100\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
