use actix_web::{web, HttpRequest, HttpResponse, Result};
use std::sync::Arc;

use crate::auth::{extract_token_from_request, AuthError};
use crate::models::{SignInRequest, SignUpRequest, SubjectListQuery};
use crate::services::{SubjectService, UserService};
use crate::utils;

/// Landing endpoint
pub async fn index() -> Result<HttpResponse> {
    Ok(utils::response::success_response(serde_json::json!({
        "message": "Welcome to the Classroom API"
    })))
}

/// Health check endpoint
pub async fn health_check() -> Result<HttpResponse> {
    Ok(utils::response::success_response(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// `GET /subjects`: search, department filter and pagination
pub async fn list_subjects(
    http: HttpRequest,
    subject_service: web::Data<Arc<SubjectService>>,
) -> Result<HttpResponse> {
    let query = subject_list_query(&http);
    match subject_service.list_subjects(&query).await {
        Ok(page) => Ok(utils::response::success_response(page)),
        Err(err) => {
            log::error!("GET /subjects error: {}", err);
            Ok(utils::response::error_response("Failed to get subjects", 500))
        }
    }
}

/// `POST /api/auth/sign-up/email`
pub async fn sign_up_email(
    http: HttpRequest,
    req: web::Json<SignUpRequest>,
    user_service: web::Data<Arc<UserService>>,
) -> Result<HttpResponse> {
    let (ip, agent) = client_info(&http);
    match user_service.sign_up(req.into_inner(), ip.as_deref(), agent.as_deref()).await {
        Ok(response) => {
            let cookie = user_service.auth.session_cookie(&response.token);
            Ok(HttpResponse::Ok().cookie(cookie).json(response))
        }
        Err(err) => Ok(auth_error_response("sign-up", err)),
    }
}

/// `POST /api/auth/sign-in/email`
pub async fn sign_in_email(
    http: HttpRequest,
    req: web::Json<SignInRequest>,
    user_service: web::Data<Arc<UserService>>,
) -> Result<HttpResponse> {
    let (ip, agent) = client_info(&http);
    match user_service.sign_in(req.into_inner(), ip.as_deref(), agent.as_deref()).await {
        Ok(response) => {
            let cookie = user_service.auth.session_cookie(&response.token);
            Ok(HttpResponse::Ok().cookie(cookie).json(response))
        }
        Err(err) => Ok(auth_error_response("sign-in", err)),
    }
}

/// `POST /api/auth/sign-out`
pub async fn sign_out(
    http: HttpRequest,
    user_service: web::Data<Arc<UserService>>,
) -> Result<HttpResponse> {
    let token = match extract_token_from_request(&http) {
        Some(token) => token,
        None => return Ok(utils::response::error_response("No token provided", 401)),
    };

    match user_service.sign_out(&token).await {
        Ok(()) => Ok(HttpResponse::Ok()
            .cookie(user_service.auth.removal_cookie())
            .json(serde_json::json!({ "success": true }))),
        Err(err) => Ok(auth_error_response("sign-out", err)),
    }
}

/// `GET /api/auth/get-session`
pub async fn get_session(
    http: HttpRequest,
    user_service: web::Data<Arc<UserService>>,
) -> Result<HttpResponse> {
    let token = match extract_token_from_request(&http) {
        Some(token) => token,
        None => return Ok(utils::response::error_response("Unauthorized", 401)),
    };

    match user_service.get_session(&token).await {
        Ok(response) => Ok(utils::response::success_response(response)),
        Err(err) => Ok(auth_error_response("get-session", err)),
    }
}

/// Listing parameters never reject a request: duplicates keep the first
/// value and an undecodable query string lists with defaults.
fn subject_list_query(req: &HttpRequest) -> SubjectListQuery {
    match web::Query::<Vec<(String, String)>>::from_query(req.query_string()) {
        Ok(pairs) => SubjectListQuery::from_pairs(pairs.into_inner()),
        Err(err) => {
            log::debug!("GET /subjects unreadable query string: {}", err);
            SubjectListQuery::default()
        }
    }
}

fn client_info(req: &HttpRequest) -> (Option<String>, Option<String>) {
    let ip = req.connection_info().realip_remote_addr().map(|s| s.to_string());
    let agent = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    (ip, agent)
}

fn auth_error_response(operation: &str, err: AuthError) -> HttpResponse {
    if let AuthError::Internal(_) = err {
        log::error!("{} failed: {}", operation, err);
    }
    utils::response::error_response(&err.public_message(), err.status_code())
}

/// Route table shared by `main` and the integration tests
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/health", web::get().to(health_check))
        .route("/subjects", web::get().to(list_subjects))
        .service(
            web::scope("/api/auth")
                .route("/sign-up/email", web::post().to(sign_up_email))
                .route("/sign-in/email", web::post().to(sign_in_email))
                .route("/sign-out", web::post().to(sign_out))
                .route("/get-session", web::get().to(get_session)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_rt::test]
    async fn index_returns_welcome_message() {
        let app = test::init_service(App::new().route("/", web::get().to(index))).await;
        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Welcome to the Classroom API");
    }

    #[actix_rt::test]
    async fn health_check_returns_ok() {
        let app = test::init_service(App::new().route("/health", web::get().to(health_check))).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
