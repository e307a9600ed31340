#![allow(dead_code)]

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use classroom_api::handlers::list_subjects;
use classroom_api::models::{Department, SubjectWithDepartment};
use classroom_api::query::SubjectFilter;
use classroom_api::services::SubjectService;
use classroom_api::store::{StoreError, SubjectStore};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap()
}

pub fn department(id: i32, code: &str, name: &str) -> Department {
    Department {
        id,
        code: code.to_string(),
        name: name.to_string(),
        description: None,
        created_at: base_time(),
        updated_at: base_time(),
    }
}

/// Subject created `minutes` after the base time
pub fn subject(id: i32, name: &str, code: &str, dept: Option<&Department>, minutes: i64) -> SubjectWithDepartment {
    let created_at = base_time() + Duration::minutes(minutes);
    SubjectWithDepartment {
        id,
        department_id: dept.map(|d| d.id),
        name: name.to_string(),
        code: code.to_string(),
        description: None,
        created_at,
        updated_at: created_at,
        department: dept.cloned(),
    }
}

/// Store that applies the listing semantics to a fixed set of rows
pub struct InMemorySubjectStore {
    rows: Vec<SubjectWithDepartment>,
}

impl InMemorySubjectStore {
    pub fn new(rows: Vec<SubjectWithDepartment>) -> Self {
        Self { rows }
    }

    fn matching(&self, filter: &SubjectFilter) -> Vec<SubjectWithDepartment> {
        let contains = |haystack: &str, needle: &str| haystack.to_lowercase().contains(&needle.to_lowercase());

        let mut rows: Vec<SubjectWithDepartment> = self
            .rows
            .iter()
            .filter(|s| match filter.search() {
                Some(term) => contains(&s.name, term) || contains(&s.code, term),
                None => true,
            })
            .filter(|s| match filter.department() {
                Some(term) => s.department.as_ref().map(|d| contains(&d.name, term)).unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }
}

#[async_trait]
impl SubjectStore for InMemorySubjectStore {
    async fn count_subjects(&self, filter: &SubjectFilter) -> Result<i64, StoreError> {
        Ok(self.matching(filter).len() as i64)
    }

    async fn list_subjects(
        &self,
        filter: &SubjectFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SubjectWithDepartment>, StoreError> {
        Ok(self
            .matching(filter)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

/// Store whose count or page query fails
pub struct FailingSubjectStore {
    pub fail_count: bool,
}

#[async_trait]
impl SubjectStore for FailingSubjectStore {
    async fn count_subjects(&self, _filter: &SubjectFilter) -> Result<i64, StoreError> {
        if self.fail_count {
            Err("connection refused".into())
        } else {
            Ok(3)
        }
    }

    async fn list_subjects(
        &self,
        _filter: &SubjectFilter,
        _limit: i64,
        _offset: i64,
    ) -> Result<Vec<SubjectWithDepartment>, StoreError> {
        Err("relation \"subjects\" does not exist".into())
    }
}

/// Issue `GET uri` against the subjects route backed by `store`
pub async fn get_subjects(store: Arc<dyn SubjectStore>, uri: &str) -> (StatusCode, serde_json::Value) {
    let service = Arc::new(SubjectService::new(store));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service))
            .route("/subjects", web::get().to(list_subjects)),
    )
    .await;

    let req = test::TestRequest::get().uri(uri).to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let body: serde_json::Value = test::read_body_json(resp).await;
    (status, body)
}
