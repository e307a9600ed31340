use actix_web::{
    body::BoxBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{header, Method},
    Error, HttpResponse,
};

use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::sync::Arc;

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";

/// CORS middleware restricted to the trusted frontend origin(s)
pub struct CorsMiddleware {
    pub trusted_origins: Vec<String>,
}

impl<S> Transform<S, ServiceRequest> for CorsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = CorsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CorsMiddlewareService {
            service: Arc::new(service),
            trusted_origins: Arc::new(self.trusted_origins.clone()),
        }))
    }
}

pub struct CorsMiddlewareService<S> {
    service: Arc<S>,
    trusted_origins: Arc<Vec<String>>,
}

impl<S> Service<ServiceRequest> for CorsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Arc::clone(&self.service);
        let trusted_origins = Arc::clone(&self.trusted_origins);

        Box::pin(async move {
            let origin = req
                .headers()
                .get(header::ORIGIN)
                .filter(|o| {
                    o.to_str()
                        .map(|s| trusted_origins.iter().any(|t| t == s.trim_end_matches('/')))
                        .unwrap_or(false)
                })
                .cloned();

            // Preflight from a trusted origin never reaches the router
            if req.method() == Method::OPTIONS {
                if let Some(origin) = origin {
                    let response = HttpResponse::NoContent()
                        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, origin))
                        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS))
                        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS))
                        .insert_header((header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"))
                        .insert_header((header::VARY, "Origin"))
                        .finish();
                    return Ok(req.into_response(response));
                }
            }

            let mut res = service.call(req).await?;
            let headers = res.headers_mut();

            if let Some(origin) = origin {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    header::HeaderValue::from_static("true"),
                );
            }
            headers.insert(header::VARY, header::HeaderValue::from_static("Origin"));

            Ok(res)
        })
    }
}

/// Logging middleware
pub struct LoggingMiddleware;

impl<S> Transform<S, ServiceRequest> for LoggingMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggingMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggingMiddlewareService {
            service: Arc::new(service),
        }))
    }
}

pub struct LoggingMiddlewareService<S> {
    service: Arc<S>,
}

impl<S> Service<ServiceRequest> for LoggingMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Arc::clone(&self.service);
        let start_time = std::time::Instant::now();
        let method = req.method().clone();
        let path = req.path().to_string();
        let remote_addr = req.connection_info().peer_addr().unwrap_or("unknown").to_string();

        Box::pin(async move {
            let result = service.call(req).await;
            let duration = start_time.elapsed();

            match &result {
                Ok(res) => {
                    let status = res.status().as_u16();
                    let level = if status >= 500 {
                        log::Level::Error
                    } else if status >= 400 {
                        log::Level::Warn
                    } else {
                        log::Level::Info
                    };
                    log::log!(
                        level,
                        "{} {} {} {}ms from {}",
                        method, path, status, duration.as_millis(), remote_addr
                    );
                }
                Err(err) => {
                    log::error!(
                        "Request failed: {} {} {} {}ms from {}",
                        method, path, err, duration.as_millis(), remote_addr
                    );
                }
            }

            result
        })
    }
}
