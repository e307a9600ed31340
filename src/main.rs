use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use std::sync::Arc;
use tokio::time::{interval, Duration};

use classroom_api::auth::AuthService;
use classroom_api::config::AppConfig;
use classroom_api::database::DatabaseService;
use classroom_api::handlers::configure_routes;
use classroom_api::middleware::{CorsMiddleware, LoggingMiddleware};
use classroom_api::services::{SessionService, SubjectService, UserService};
use classroom_api::store::{PgSubjectStore, SubjectStore};
use classroom_api::utils;
use dotenvy::dotenv;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment from .env (if present)
    let _ = dotenv();

    // Missing secrets abort before anything is bound
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging: file + stdout; fall back to env_logger
    if let Ok(logger) = flexi_logger::Logger::try_with_str(config.logging.level.clone()) {
        let file_spec = flexi_logger::FileSpec::default().directory("logs").suppress_timestamp();
        let _ = logger
            .log_to_file(file_spec)
            .duplicate_to_stdout(flexi_logger::Duplicate::Info)
            .start();
    } else {
        let log_level = utils::logging::level_from_string(&config.logging.level);
        env_logger::builder()
            .filter_level(log_level)
            .format_timestamp_secs()
            .init();
    }

    log::info!("Starting Classroom API v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Server: {}:{}", config.server.host, config.server.port);
    log::info!("Trusted origins: {:?}", config.security.trusted_origins);

    let db_service = match DatabaseService::new(&config.database).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            log::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    // The server still starts; listing answers 500 until the database is up
    match db_service.ping().await {
        Ok(()) => log::info!("Database connection established"),
        Err(e) => log::warn!("Database not reachable yet: {}", e),
    }

    if let Err(e) = db_service.init_schema().await {
        log::error!("Failed to initialize DB schema: {}", e);
    } else {
        log::info!("DB schema ensured");
    }

    let auth_service = Arc::new(AuthService::new(config.auth.clone()));

    let subject_store: Arc<dyn SubjectStore> = Arc::new(PgSubjectStore::new(Arc::clone(&db_service)));
    let subject_service = Arc::new(SubjectService::new(subject_store));

    let user_service = Arc::new(UserService::new(
        Arc::clone(&db_service),
        Arc::clone(&auth_service),
    ));

    let session_service = Arc::new(SessionService::new(Arc::clone(&db_service)));

    // Hourly purge of expired sessions
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match session_service.cleanup_expired_sessions().await {
                Ok(removed) => log::info!("Cleaned up {} expired sessions", removed),
                Err(e) => log::error!("Failed to cleanup expired sessions: {}", e),
            }
        }
    });

    let trusted_origins = config.security.trusted_origins.clone();

    log::info!("Server is running at http://{}:{}", config.server.host, config.server.port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(Arc::clone(&subject_service)))
            .app_data(web::Data::new(Arc::clone(&user_service)))
            .wrap(LoggingMiddleware)
            .wrap(CorsMiddleware {
                trusted_origins: trusted_origins.clone(),
            })
            .wrap(actix_middleware::Compress::default())
            .configure(configure_routes)
    })
    .bind((config.server.host.clone(), config.server.port))?
    .workers(config.server.workers)
    .run()
    .await
}
