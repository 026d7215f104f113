mod support;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use identity::{
    AppState,
    models::{Role, UserPatch},
    password::PasswordPolicy,
    repositories::{Dependency, InMemoryReferences, InMemoryUserStore, UserLookup, UserStore},
    routes::create_router,
    settings::Settings,
};
use support::{Harness, PASSWORD};

struct TestApp {
    router: Router,
    users: InMemoryUserStore,
    references: InMemoryReferences,
}

impl TestApp {
    fn new() -> Self {
        let Harness {
            service,
            users,
            references,
            ..
        } = Harness::new();
        let state = AppState::new(service, Settings::default(), PasswordPolicy::default());

        Self {
            router: create_router(state),
            users,
            references,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn register(&self, email: &str) -> (StatusCode, Value) {
        self.send(json_request(
            "POST",
            "/register",
            None,
            json!({
                "fullname": "Quang Huy",
                "username": "qhuy",
                "email": email,
                "password": PASSWORD,
                "confirm_password": PASSWORD,
            }),
        ))
        .await
    }

    async fn login(&self, email: &str) -> Value {
        let (status, body) = self
            .send(json_request(
                "POST",
                "/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["result"].clone()
    }

    async fn make_admin(&self, email: &str) {
        let user = self
            .users
            .find_by(UserLookup::Email(email))
            .await
            .unwrap()
            .unwrap();
        self.users
            .update_fields(
                user.id,
                UserPatch {
                    role: Some(Role::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.send(get_request("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_register_login_me() {
    let app = TestApp::new();

    let (status, body) = app.register("huy@example.com").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], true);
    assert!(body["result"]["accessToken"].as_str().is_some());

    let tokens = app.login("huy@example.com").await;
    let access_token = tokens["accessToken"].as_str().unwrap();
    assert!(!access_token.is_empty());
    assert!(!tokens["refreshToken"].as_str().unwrap().is_empty());

    let (status, body) = app.send(get_request("/me", Some(access_token))).await;
    assert_eq!(status, StatusCode::OK);

    let profile = body["result"].as_object().unwrap();
    assert_eq!(profile["email"], "huy@example.com");
    assert_eq!(profile["username"], "qhuy");
    for hidden in [
        "password_hash",
        "refresh_token",
        "email_verify_token",
        "forgot_password_token",
    ] {
        assert!(!profile.contains_key(hidden), "{} leaked", hidden);
    }
}

#[tokio::test]
async fn test_me_requires_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app.send(get_request("/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], false);

    let (status, _) = app.send(get_request("/me", Some("not-a-token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_validation_reports_fields() {
    let app = TestApp::new();

    let (status, body) = app
        .send(json_request(
            "POST",
            "/register",
            None,
            json!({
                "fullname": "Quang Huy",
                "username": "q",
                "email": "not-an-email",
                "password": "weak",
                "confirm_password": "weaker",
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], false);

    let fields: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|error| error["field"].as_str().unwrap())
        .collect();
    assert_eq!(
        fields,
        vec!["username", "email", "password", "confirm_password"]
    );
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], false);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = TestApp::new();
    app.register("huy@example.com").await;

    let (status, body) = app.register("huy@example.com").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email already exists");
}

#[tokio::test]
async fn test_logout_then_refresh_is_unauthorized() {
    let app = TestApp::new();
    app.register("huy@example.com").await;
    let tokens = app.login("huy@example.com").await;
    let access_token = tokens["accessToken"].as_str().unwrap();
    let refresh_token = tokens["refreshToken"].as_str().unwrap();

    let (status, body) = app
        .send(json_request(
            "POST",
            "/logout",
            Some(access_token),
            json!({ "refreshToken": refresh_token }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], true);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/refresh-token",
            None,
            json!({ "refreshToken": refresh_token }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], false);

    // A second logout is understood but has no effect
    let (status, body) = app
        .send(json_request(
            "POST",
            "/logout",
            Some(access_token),
            json!({ "refreshToken": refresh_token }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], false);
}

#[tokio::test]
async fn test_verify_email_redirects_then_reports_already_verified() {
    let app = TestApp::new();
    app.register("huy@example.com").await;
    let token = app
        .users
        .find_by(UserLookup::Email("huy@example.com"))
        .await
        .unwrap()
        .unwrap()
        .email_verify_token
        .unwrap();
    let uri = format!("/verify-email?email_verify_token={}", token);

    let response = app
        .router
        .clone()
        .oneshot(get_request(&uri, None))
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&Settings::default().redirect_verify_email));
    assert!(location.contains("accessToken="));
    assert!(location.contains("refreshToken="));

    let (status, body) = app.send(get_request(&uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], false);
    assert_eq!(body["result"]["alreadyVerified"], true);
}

#[tokio::test]
async fn test_profile_update_requires_verified_account() {
    let app = TestApp::new();
    app.register("huy@example.com").await;
    let tokens = app.login("huy@example.com").await;
    let access_token = tokens["accessToken"].as_str().unwrap();

    let (status, body) = app
        .send(json_request(
            "PATCH",
            "/me",
            Some(access_token),
            json!({ "city": "Hue" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], false);
}

#[tokio::test]
async fn test_admin_routes_are_gated() {
    let app = TestApp::new();
    app.register("member@example.com").await;
    let tokens = app.login("member@example.com").await;
    let access_token = tokens["accessToken"].as_str().unwrap();

    let (status, _) = app.send(get_request("/meAll", Some(access_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_referenced_user_is_refused() {
    let app = TestApp::new();
    app.register("admin@example.com").await;
    app.register("buyer@example.com").await;
    app.make_admin("admin@example.com").await;

    let tokens = app.login("admin@example.com").await;
    let access_token = tokens["accessToken"].as_str().unwrap();

    let buyer = app
        .users
        .find_by(UserLookup::Email("buyer@example.com"))
        .await
        .unwrap()
        .unwrap();
    app.references.add(Dependency::Orders, buyer.id).await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/deleteUser/{}", buyer.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], false);
    assert_eq!(body["data"]["dependency"], "orders");

    assert!(app.users.exists(UserLookup::Id(buyer.id)).await.unwrap());

    let (status, body) = app.send(get_request("/meAll", Some(access_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_with_malformed_id() {
    let app = TestApp::new();
    app.register("admin@example.com").await;
    app.make_admin("admin@example.com").await;
    let tokens = app.login("admin@example.com").await;
    let access_token = tokens["accessToken"].as_str().unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri("/deleteUser/not-a-uuid")
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], false);
}
