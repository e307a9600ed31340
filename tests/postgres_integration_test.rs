use std::sync::Arc;

use classroom_api::auth::{AuthError, AuthService};
use classroom_api::config::{AuthConfig, DatabaseConfig};
use classroom_api::database::DatabaseService;
use classroom_api::models::{SignInRequest, SignUpRequest, SubjectListQuery, UserRole};
use classroom_api::services::{SubjectService, UserService};
use classroom_api::store::PgSubjectStore;
use uuid::Uuid;

async fn connect() -> Option<Arc<DatabaseService>> {
    // Skip the test if DATABASE_URL is not set in the environment
    let url = match std::env::var("DATABASE_URL") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => {
            eprintln!("Skipping test: DATABASE_URL not set");
            return None;
        }
    };

    let db = DatabaseService::new(&DatabaseConfig { url, max_connections: 4 })
        .await
        .expect("db init");
    db.init_schema().await.expect("init schema");
    Some(Arc::new(db))
}

fn query(search: Option<&str>, department: Option<&str>, page: &str, limit: &str) -> SubjectListQuery {
    SubjectListQuery {
        search: search.map(str::to_string),
        department: department.map(str::to_string),
        page: Some(page.to_string()),
        limit: Some(limit.to_string()),
    }
}

#[tokio::test]
async fn listing_filters_and_pages_against_postgres() {
    let db = match connect().await {
        Some(db) => db,
        None => return,
    };

    // Unique marker keeps concurrent runs from seeing each other's rows
    let marker = Uuid::new_v4().simple().to_string()[..8].to_string();
    let client = db.get_client().await.expect("client");

    let dept_name = format!("Mathematics {}", marker);
    let dept_id: i32 = client
        .query_one(
            "INSERT INTO departments (code, name) VALUES ($1, $2) RETURNING id",
            &[&format!("M{}", marker), &dept_name],
        )
        .await
        .expect("insert department")
        .get(0);

    let rows: [(&str, Option<i32>, i32); 4] = [
        ("Algebra", Some(dept_id), 1),
        ("Geometry", Some(dept_id), 2),
        ("Statistics 100%", Some(dept_id), 3),
        ("Free Period", None, 4),
    ];
    for (name, department_id, minutes) in rows {
        client
            .execute(
                "INSERT INTO subjects (department_id, name, code, created_at) \
                 VALUES ($1, $2, $3, NOW() + make_interval(mins => $4))",
                &[
                    &department_id,
                    &format!("{} {}", name, marker),
                    &format!("{}-{}", marker, minutes),
                    &minutes,
                ],
            )
            .await
            .expect("insert subject");
    }

    let service = SubjectService::new(Arc::new(PgSubjectStore::new(Arc::clone(&db))));

    let page = service
        .list_subjects(&query(Some(&marker.to_uppercase()), None, "1", "2"))
        .await
        .expect("list");
    assert_eq!(page.pagination.total, 4);
    assert_eq!(page.pagination.total_pages, 2);
    assert_eq!(page.data.len(), 2);
    assert!(page.data[0].name.starts_with("Free Period"));
    assert!(page.data[0].department.is_none());
    assert!(page.data[1].name.starts_with("Statistics"));
    assert_eq!(page.data[1].department.as_ref().map(|d| d.id), Some(dept_id));

    let by_dept = service
        .list_subjects(&query(None, Some(&dept_name.to_lowercase()), "1", "10"))
        .await
        .expect("list by department");
    assert_eq!(by_dept.pagination.total, 3);

    let literal = service
        .list_subjects(&query(Some(&format!("100% {}", marker)), None, "1", "10"))
        .await
        .expect("literal percent");
    assert_eq!(literal.pagination.total, 1);

    let wildcard_free = service
        .list_subjects(&query(Some(&format!("Alg_bra {}", marker)), None, "1", "10"))
        .await
        .expect("literal underscore");
    assert_eq!(wildcard_free.pagination.total, 0);
}

#[tokio::test]
async fn sign_up_sign_in_and_sign_out_round_trip() {
    let db = match connect().await {
        Some(db) => db,
        None => return,
    };

    let auth = Arc::new(AuthService::new(AuthConfig {
        secret: "test-secret".to_string(),
        session_expiration_days: 7,
        bcrypt_cost: 4,
    }));
    let users = UserService::new(Arc::clone(&db), Arc::clone(&auth));

    let email = format!("student_{}@example.com", Uuid::new_v4().simple());
    let signed_up = users
        .sign_up(
            SignUpRequest {
                name: "Integration Student".to_string(),
                email: email.clone(),
                password: "TestPass123".to_string(),
                role: None,
                image_cld_pub_id: Some("avatars/abc".to_string()),
            },
            Some("127.0.0.1"),
            Some("test-agent"),
        )
        .await
        .expect("sign up");
    assert_eq!(signed_up.user.role, UserRole::Student);
    assert_eq!(signed_up.user.image_cld_pub_id.as_deref(), Some("avatars/abc"));

    let duplicate = users
        .sign_up(
            SignUpRequest {
                name: "Again".to_string(),
                email: email.to_uppercase(),
                password: "TestPass123".to_string(),
                role: None,
                image_cld_pub_id: None,
            },
            None,
            None,
        )
        .await;
    assert!(matches!(duplicate, Err(AuthError::EmailTaken)));

    let wrong = users
        .sign_in(SignInRequest { email: email.clone(), password: "WrongPass999".to_string() }, None, None)
        .await;
    assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));

    let signed_in = users
        .sign_in(SignInRequest { email: email.clone(), password: "TestPass123".to_string() }, None, None)
        .await
        .expect("sign in");

    let session = users.get_session(&signed_in.token).await.expect("session");
    assert_eq!(session.user.email, email);

    users.sign_out(&signed_in.token).await.expect("sign out");
    assert!(matches!(users.get_session(&signed_in.token).await, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn concurrent_sign_ups_for_one_email_report_email_taken() {
    let db = match connect().await {
        Some(db) => db,
        None => return,
    };

    let auth = Arc::new(AuthService::new(AuthConfig {
        secret: "test-secret".to_string(),
        session_expiration_days: 7,
        bcrypt_cost: 4,
    }));
    let users = UserService::new(Arc::clone(&db), auth);

    let email = format!("race_{}@example.com", Uuid::new_v4().simple());
    let attempts = (0..6).map(|i| {
        users.sign_up(
            SignUpRequest {
                name: format!("Racer {}", i),
                email: email.clone(),
                password: "TestPass123".to_string(),
                role: None,
                image_cld_pub_id: None,
            },
            None,
            None,
        )
    });
    let results = futures_util::future::join_all(attempts).await;

    let created = results.iter().filter(|r| r.is_ok()).count();
    let taken = results.iter().filter(|r| matches!(r, Err(AuthError::EmailTaken))).count();
    assert_eq!(created, 1);
    assert_eq!(taken, 5);
}
