use std::sync::Arc;
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthError, AuthService};
use crate::database::{is_unique_violation, DatabaseService};
use crate::models::{
    AuthResponse, SessionResponse, SignInRequest, SignUpRequest, SubjectListQuery,
    SubjectWithDepartment, UserRole,
};
use crate::query::SubjectFilter;
use crate::store::{StoreError, SubjectStore};
use crate::utils::{PaginatedResponse, PaginationMeta, PaginationParams};

/// Subject listing
pub struct SubjectService {
    store: Arc<dyn SubjectStore>,
}

impl SubjectService {
    pub fn new(store: Arc<dyn SubjectStore>) -> Self {
        Self { store }
    }

    /// Search, filter and paginate subjects.
    ///
    /// The count and the page run as two independent queries; under
    /// concurrent writes they may observe different snapshots.
    pub async fn list_subjects(
        &self,
        query: &SubjectListQuery,
    ) -> Result<PaginatedResponse<SubjectWithDepartment>, StoreError> {
        let paging = PaginationParams::new(query.page.as_deref(), query.limit.as_deref());
        let (page, limit, offset) = (paging.page(), paging.limit(), paging.offset());

        let filter = SubjectFilter::new(query.search.as_deref(), query.department.as_deref());

        let total = self.store.count_subjects(&filter).await?;
        let data = self.store.list_subjects(&filter, limit, offset).await?;

        log::debug!(
            "listed {} of {} subjects (page {}, limit {})",
            data.len(),
            total,
            page,
            limit
        );

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(page, limit, total),
        })
    }
}

/// Email/password accounts and session issuance
pub struct UserService {
    pub db: Arc<DatabaseService>,
    pub auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseService>, auth: Arc<AuthService>) -> Self {
        Self { db, auth }
    }

    /// Register a new user and sign them in
    pub async fn sign_up(
        &self,
        req: SignUpRequest,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AuthResponse, AuthError> {
        validate_request(&req)?;
        if req.name.trim().is_empty() {
            return Err(AuthError::Validation("Name is required".to_string()));
        }
        let role = resolve_role(req.role.as_deref())?;
        let email = req.email.trim().to_lowercase();

        if self.db.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.auth.hash_password(&req.password)?;
        let image_cld_pub_id = req
            .image_cld_pub_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        // A concurrent sign-up can pass the lookup above; the unique index decides
        let user = match self
            .db
            .create_user_with_password(req.name.trim(), &email, role, image_cld_pub_id, &password_hash)
            .await
        {
            Ok(user) => user,
            Err(e) if is_unique_violation(e.as_ref()) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        };

        log::info!("user registered: {} ({})", crate::utils::mask_sensitive(&user.email), user.role.as_str());

        let (token, session) = self.auth.issue_session(&user, ip_address, user_agent)?;
        self.db.create_session(&session).await?;

        Ok(AuthResponse { token, user })
    }

    /// Authenticate with email and password
    pub async fn sign_in(
        &self,
        req: SignInRequest,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AuthResponse, AuthError> {
        validate_request(&req)?;

        let user = match self.db.get_user_by_email(req.email.trim()).await? {
            Some(u) => u,
            None => return Err(AuthError::InvalidCredentials),
        };

        let hash = match self.db.get_password_hash(&user.id).await? {
            Some(h) => h,
            None => return Err(AuthError::InvalidCredentials),
        };

        if !self.auth.verify_password(&req.password, &hash)? {
            log::warn!("failed sign-in for {}", crate::utils::mask_sensitive(&user.email));
            return Err(AuthError::InvalidCredentials);
        }

        let (token, session) = self.auth.issue_session(&user, ip_address, user_agent)?;
        self.db.create_session(&session).await?;

        Ok(AuthResponse { token, user })
    }

    /// Resolve the session behind a token
    pub async fn get_session(&self, token: &str) -> Result<SessionResponse, AuthError> {
        let claims = self
            .auth
            .validate_token(token)
            .map_err(|_| AuthError::Unauthorized)?;

        let session = self
            .db
            .get_session_by_token_hash(&self.auth.hash_token(token))
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if session.id.to_string() != claims.sid {
            return Err(AuthError::Unauthorized);
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Unauthorized)?;
        let user = self
            .db
            .get_user_by_id(&user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        Ok(SessionResponse { session, user })
    }

    /// Revoke the session behind a token
    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let removed = self.db.delete_session(&self.auth.hash_token(token)).await?;
        if removed == 0 {
            return Err(AuthError::Unauthorized);
        }
        Ok(())
    }
}

fn validate_request<T: Validate>(req: &T) -> Result<(), AuthError> {
    req.validate()
        .map_err(|e| AuthError::Validation(flatten_validation_errors(e).join("; ")))
}

/// Role requested at sign-up; absent means the default role
pub fn resolve_role(requested: Option<&str>) -> Result<UserRole, AuthError> {
    match requested.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(UserRole::default()),
        Some(r) => UserRole::parse(r).ok_or_else(|| AuthError::Validation(format!("Invalid role: {}", r))),
    }
}

pub fn flatten_validation_errors(err: validator::ValidationErrors) -> Vec<String> {
    let mut msgs = Vec::new();
    for (field, errors) in err.field_errors().iter() {
        for e in errors.iter() {
            let message = if let Some(m) = &e.message {
                m.to_string()
            } else {
                format!("{} {}", field, e.code)
            };
            msgs.push(message);
        }
    }
    msgs.sort();
    msgs
}

/// Session housekeeping
pub struct SessionService {
    pub db: Arc<DatabaseService>,
}

impl SessionService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Clean up expired sessions
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        self.db.cleanup_expired_sessions(Utc::now()).await
    }
}
