use chrono::{Duration as ChronoDuration, Utc};
use eproc_api::app::{HttpSettings, build_app};
use eproc_auth::catalog::{self, all_features};
use eproc_auth::{Claims, FeatureName};
use eproc_core::{RoleId, UserId};
use eproc_infra::Stores;
use eproc_infra::seed::{ADMIN_ROLE, AdminSeed, seed};
use eproc_infra::store::NewUser;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const SECRET: &str = "test-secret";
const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "changeme";

struct TestServer {
    base_url: String,
    stores: Stores,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Same router as prod over the in-memory backend, seeded with the
    /// catalog, bound to an ephemeral port.
    async fn spawn(admin_password: Option<&str>) -> Self {
        let stores = Stores::in_memory();
        seed(
            &stores,
            &AdminSeed {
                email: ADMIN_EMAIL.to_string(),
                password: admin_password.map(String::from),
            },
        )
        .await
        .expect("seed failed");

        let settings = HttpSettings {
            jwt_secret: SECRET.to_string(),
            jwt_ttl_hours: 1,
            frontend_urls: vec!["http://localhost:3000".to_string()],
            cors_max_age_hours: 6,
        };
        let app = build_app(&settings, stores.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            stores,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn admin_role(&self) -> RoleId {
        self.stores
            .roles
            .find_by_name(ADMIN_ROLE)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    /// A user row without a usable password, for ownership and loans.
    async fn insert_user(&self, username: &str, role_id: RoleId) -> UserId {
        self.stores
            .users
            .create(NewUser {
                username: username.to_string(),
                name: format!("{username} name"),
                email: format!("{username}@example.com"),
                password_hash: "unused".to_string(),
                role_id,
            })
            .await
            .unwrap()
            .id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct TokenSpec {
    user_id: i64,
    admin: bool,
    features: Vec<&'static str>,
    issued: chrono::DateTime<Utc>,
    ttl: ChronoDuration,
    secret: &'static str,
}

impl TokenSpec {
    fn user(user_id: i64, features: &[&'static str]) -> Self {
        Self {
            user_id,
            admin: false,
            features: features.to_vec(),
            issued: Utc::now(),
            ttl: ChronoDuration::minutes(10),
            secret: SECRET,
        }
    }

    fn admin(user_id: i64) -> Self {
        Self {
            admin: true,
            features: all_features().collect(),
            ..Self::user(user_id, &[])
        }
    }
}

fn mint_jwt(spec: TokenSpec) -> String {
    let claims = Claims {
        user_id: UserId::new(spec.user_id),
        role_id: RoleId::new(1),
        user: "Tester".to_string(),
        role: if spec.admin { "Administrator" } else { "Staff" }.to_string(),
        is_administrative: spec.admin,
        features: spec.features.into_iter().map(FeatureName::from_static).collect(),
        exp: (spec.issued + spec.ttl).timestamp(),
        iat: spec.issued.timestamp(),
        nbf: spec.issued.timestamp(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(spec.secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn body(res: reqwest::Response) -> (StatusCode, Value) {
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn health_is_public_and_unknown_routes_are_enveloped() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert!(res.headers().contains_key("x-request-id"));
    let (status, json) = body(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": true, "message": "OK", "data": {}}));

    let (status, json) = body(client.get(server.url("/nowhere")).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Resource not found");

    let res = client
        .get(server.url("/health"))
        .header("X-Request-ID", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn authentication_failures_are_401_with_reason() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let url = server.url("/api/v1/accesses/roles");

    let (status, json) = body(client.get(&url).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Authorization token not provided");

    let token = mint_jwt(TokenSpec::admin(1));
    let (status, json) = body(
        client
            .get(&url)
            .header("Authorization", format!("Token {token}"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Authorization token not provided");

    let wrong_key = mint_jwt(TokenSpec {
        secret: "other-secret",
        ..TokenSpec::admin(1)
    });
    let (status, json) = body(client.get(&url).bearer_auth(wrong_key).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid token");

    let expired = mint_jwt(TokenSpec {
        issued: Utc::now() - ChronoDuration::hours(2),
        ttl: ChronoDuration::hours(1),
        ..TokenSpec::admin(1)
    });
    let (status, json) = body(client.get(&url).bearer_auth(expired).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Token has expired");

    let early = mint_jwt(TokenSpec {
        issued: Utc::now() + ChronoDuration::minutes(5),
        ..TokenSpec::admin(1)
    });
    let (status, json) = body(client.get(&url).bearer_auth(early).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Token is not valid yet");

    let (status, json) = body(client.get(&url).bearer_auth("not-a-jwt").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid token");
}

#[tokio::test]
async fn any_one_required_feature_admits() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let url = server.url("/api/v1/accesses/roles");

    let deleter = mint_jwt(TokenSpec::user(9, &[catalog::DELETE_ROLE]));
    let (status, json) = body(client.get(&url).bearer_auth(&deleter).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Success Getting All Role Data");

    // listing is open to Delete Role, creating is not
    let (status, json) = body(
        client
            .post(&url)
            .bearer_auth(&deleter)
            .json(&json!({"name": "Clerk", "features": []}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "Unauthorized to access this resource");

    let outsider = mint_jwt(TokenSpec::user(9, &[catalog::VIEW_USER]));
    let (status, _) = body(client.get(&url).bearer_auth(&outsider).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // users list is also open to Reset User Password
    let resetter = mint_jwt(TokenSpec::user(9, &[catalog::RESET_USER_PASSWORD]));
    let res = client
        .get(server.url("/api/v1/accesses/users"))
        .bearer_auth(&resetter)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = client
        .get(server.url("/api/v1/accesses/users/1"))
        .bearer_auth(&resetter)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_issues_bearer_token_with_role_features() {
    let server = TestServer::spawn(Some(ADMIN_PASSWORD)).await;
    let client = reqwest::Client::new();

    let (status, json) = body(
        client
            .post(server.url("/login"))
            .json(&json!({"username_or_email": ADMIN_EMAIL, "password": "wrong"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid email or password");

    let (status, json) = body(
        client
            .post(server.url("/login"))
            .json(&json!({"username_or_email": "admin", "password": ADMIN_PASSWORD}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "User Login Successfully");
    assert_eq!(json["data"]["role"], ADMIN_ROLE);
    assert!(json["data"]["loginAt"].is_string());

    let token = json["data"]["token"].as_str().unwrap().to_string();
    assert!(token.starts_with("Bearer "));

    let res = client
        .get(server.url("/api/v1/loans"))
        .header("Authorization", token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, json) = body(
        client
            .post(server.url("/login"))
            .json(&json!({"username_or_email": "has space"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["errors"]["username_or_email"], "Field should not contain spaces");
    assert_eq!(json["data"]["errors"]["password"], "Field is required");
}

#[tokio::test]
async fn role_names_are_unique_except_for_self() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(TokenSpec::admin(1));
    let url = server.url("/api/v1/accesses/roles");

    let (status, json) = body(
        client
            .post(&url)
            .bearer_auth(&admin)
            .json(&json!({"name": "Clerk", "features": [1, 2]}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["message"], "Role Created Successfully");
    let id = json["data"]["id"].as_i64().unwrap();

    let (status, json) = body(
        client
            .post(&url)
            .bearer_auth(&admin)
            .json(&json!({"name": "Clerk", "features": []}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["message"], "Error Duplicate Data");
    assert_eq!(json["data"]["errors"]["name"], "Role name Clerk already exist");

    // same name, new feature set: replaces the grants
    let (status, json) = body(
        client
            .put(format!("{url}/{id}"))
            .bearer_auth(&admin)
            .json(&json!({"name": "Clerk", "features": [3]}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Role Updated Successfully");

    let (_, json) = body(
        client
            .get(format!("{url}/{id}"))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    let granted: Vec<i64> = json["data"]["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["id"].as_i64().unwrap())
        .collect();
    assert_eq!(granted, vec![3]);

    let (status, json) = body(
        client
            .post(&url)
            .bearer_auth(&admin)
            .json(&json!({"name": "Ghost", "features": [99999]}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["errors"]["features"], "Feature with id 99999 not found");
}

#[tokio::test]
async fn references_must_exist_and_block_deletes() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(TokenSpec::admin(1));

    let (status, json) = body(
        client
            .post(server.url("/api/v1/accesses/features"))
            .bearer_auth(&admin)
            .json(&json!({"name": "Approve Tender", "module_id": 99999}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Error Invalid Data");
    assert_eq!(json["data"]["errors"]["module_id"], "Module Not Found");

    // the administrator role has a user, so it cannot go
    let role_id = server.admin_role().await;
    server.insert_user("keeper", role_id).await;
    let (status, json) = body(
        client
            .delete(server.url(&format!("/api/v1/accesses/roles/{role_id}")))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        json["message"],
        "Role cannot be deleted, because there are users with that role"
    );
    let res = client
        .get(server.url(&format!("/api/v1/accesses/roles/{role_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, json) = body(
        client
            .get(server.url("/api/v1/accesses/roles/abc"))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid ID");

    let (status, json) = body(
        client
            .get(server.url("/api/v1/accesses/roles/4242"))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Role not found");

    let (status, json) = body(
        client
            .post(server.url("/api/v1/accesses/roles"))
            .bearer_auth(&admin)
            .header("Content-Type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid Input");
}

#[tokio::test]
async fn module_tree_round_trip() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(TokenSpec::admin(1));
    let url = server.url("/api/v1/accesses/modules");

    let (_, a) = body(
        client
            .post(&url)
            .bearer_auth(&admin)
            .json(&json!({"name": "Procurement"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    let a_id = a["data"]["id"].as_i64().unwrap();
    assert_eq!(a["data"]["parent_id"], Value::Null);

    let (status, b) = body(
        client
            .post(&url)
            .bearer_auth(&admin)
            .json(&json!({"name": "Tender", "parent_id": a_id}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let b_id = b["data"]["id"].as_i64().unwrap();

    let (_, detail) = body(
        client
            .get(format!("{url}/{a_id}"))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(detail["message"], "Success Getting Module Data");
    let children = detail["data"]["children"].as_array().unwrap();
    assert!(children.iter().any(|c| c["id"].as_i64() == Some(b_id)));

    let (status, json) = body(
        client
            .put(format!("{url}/{a_id}"))
            .bearer_auth(&admin)
            .json(&json!({"name": "Procurement", "parent_id": b_id}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["data"]["errors"]["parent_id"].is_string());

    let (status, json) = body(
        client
            .delete(format!("{url}/{a_id}"))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        json["message"],
        "Module cannot be deleted, because it still has child modules or features"
    );

    let (status, json) = body(
        client
            .post(&url)
            .bearer_auth(&admin)
            .json(&json!({"name": "Orphan", "parent_id": 99999}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["errors"]["parent_id"], "Parent Module Not Found");
}

#[tokio::test]
async fn self_or_admin_guards_user_records() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(TokenSpec::admin(1));
    let role_id = server.admin_role().await;

    let (status, json) = body(
        client
            .post(server.url("/api/v1/accesses/users"))
            .bearer_auth(&admin)
            .json(&json!({
                "username": "budi",
                "name": "Budi Santoso",
                "email": "budi@example.com",
                "password": "secret1",
                "role_id": role_id.get(),
            }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(json["data"].get("password_hash").is_none());
    let budi = json["data"]["id"].as_i64().unwrap();
    let other = server.insert_user("siti", role_id).await.get();

    let as_budi = mint_jwt(TokenSpec::user(budi, &[catalog::UPDATE_USER, catalog::DELETE_USER]));

    let (status, json) = body(
        client
            .patch(server.url(&format!("/api/v1/accesses/users/change-pass/{other}")))
            .bearer_auth(&as_budi)
            .json(&json!({"old_password": "secret1", "password": "secret2", "re_password": "secret2"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "unable to alter another user's password");

    let (status, json) = body(
        client
            .patch(server.url("/api/v1/accesses/users/change-pass/abc"))
            .bearer_auth(&as_budi)
            .json(&json!({}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid ID");

    let change_own = |old: &str, new: &str, again: &str| {
        client
            .patch(server.url(&format!("/api/v1/accesses/users/change-pass/{budi}")))
            .bearer_auth(&as_budi)
            .json(&json!({"old_password": old, "password": new, "re_password": again}))
    };

    let (status, json) = body(change_own("secret1", "secret2", "secret3").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid Data");
    assert_eq!(json["data"]["errors"]["re_password"], "Re-Password and Password are different");

    let (status, json) = body(change_own("wrong-one", "secret2", "secret2").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["errors"]["old_password"], "The old password is incorrect");

    let (status, json) = body(change_own("secret1", "secret2", "secret2").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "User Password Changed Successfully");

    // an administrator passes the ownership check for any id
    let outside_admin = mint_jwt(TokenSpec::admin(999));
    let change_as_admin = |old: &str| {
        client
            .patch(server.url(&format!("/api/v1/accesses/users/change-pass/{budi}")))
            .bearer_auth(&outside_admin)
            .json(&json!({"old_password": old, "password": "secret3", "re_password": "secret3"}))
    };

    let (status, json) = body(change_as_admin("secret1").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["errors"]["old_password"], "The old password is incorrect");

    let (status, json) = body(change_as_admin("secret2").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "User Password Changed Successfully");

    let (status, json) = body(
        client
            .put(server.url(&format!("/api/v1/accesses/users/{other}")))
            .bearer_auth(&as_budi)
            .json(&json!({
                "username": "siti",
                "name": "Siti Aminah",
                "email": "siti@example.com",
                "role_id": role_id.get(),
            }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "unable to alter another user's data");

    let (status, json) = body(
        client
            .delete(server.url(&format!("/api/v1/accesses/users/{other}")))
            .bearer_auth(&as_budi)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "unable to delete another user");

    let res = client
        .delete(server.url(&format!("/api/v1/accesses/users/{other}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, json) = body(
        client
            .post(server.url("/api/v1/accesses/users"))
            .bearer_auth(&admin)
            .json(&json!({
                "username": "budi",
                "name": "Budi Kedua",
                "email": "budi@example.com",
                "password": "secret1",
                "role_id": role_id.get(),
            }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["data"]["errors"]["email"], "User email budi@example.com already exist");
    assert_eq!(json["data"]["errors"]["username"], "User username budi already exist");
}

#[tokio::test]
async fn lists_paginate_only_on_request() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(TokenSpec::admin(1));
    let url = server.url("/api/v1/accesses/features");
    let catalog_size = all_features().count();

    let (_, json) = body(client.get(&url).bearer_auth(&admin).send().await.unwrap()).await;
    assert_eq!(json["data"].as_array().unwrap().len(), catalog_size);

    let (status, json) = body(
        client
            .get(format!("{url}?page=2&limit=5&order_by=name&order=desc"))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let page = &json["data"];
    assert_eq!(page["page"], 2);
    assert_eq!(page["total_rows"], catalog_size as u64);
    assert_eq!(page["rows"].as_array().unwrap().len(), 5);
    assert_eq!(page["from_row"], 6);
    assert_eq!(page["to_row"], 10);
    assert_eq!(page["previous_page"], "/api/v1/accesses/features?page=1&limit=5");
    let names: Vec<&str> = page["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    let mut sorted = names.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(names, sorted);

    let (status, json) = body(
        client
            .get(format!("{url}?module_id=abc"))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid module_id");
}

#[tokio::test]
async fn loan_lifecycle_tracks_vehicle_availability() {
    let server = TestServer::spawn(None).await;
    let client = reqwest::Client::new();
    let role_id = server.admin_role().await;
    let borrower = server.insert_user("driver", role_id).await.get();
    let admin = mint_jwt(TokenSpec::admin(borrower));

    let (status, json) = body(
        client
            .post(server.url("/api/v1/vehicles/types"))
            .bearer_auth(&admin)
            .json(&json!({"name": "Car"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let type_id = json["data"]["id"].as_i64().unwrap();

    let (status, json) = body(
        client
            .post(server.url("/api/v1/vehicles"))
            .bearer_auth(&admin)
            .json(&json!({"type_id": type_id, "name": "Avanza", "police_number": "B 1234 XY"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["is_available"], true);
    assert_eq!(json["data"]["type"]["name"], "Car");
    let vehicle_id = json["data"]["id"].as_i64().unwrap();

    let (status, json) = body(
        client
            .post(server.url("/api/v1/loans"))
            .bearer_auth(&admin)
            .json(&json!({"vehicle_id": vehicle_id, "purpose": "Site visit"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["user_id"], borrower);
    let loan_id = json["data"]["id"].as_i64().unwrap();

    let (status, json) = body(
        client
            .post(server.url("/api/v1/loans"))
            .bearer_auth(&admin)
            .json(&json!({"vehicle_id": vehicle_id, "purpose": "Second trip"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Vehicle Not Available");

    let (status, json) = body(
        client
            .get(server.url("/api/v1/vehicles?is_available=false"))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (status, json) = body(
        client
            .delete(server.url(&format!("/api/v1/vehicles/{vehicle_id}")))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "Vehicle cannot be deleted, because it is currently loaned");

    let (status, json) = body(
        client
            .delete(server.url(&format!("/api/v1/vehicles/types/{type_id}")))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        json["message"],
        "Vehicle Type cannot be deleted, because there are vehicles with that type"
    );

    let return_url = server.url(&format!("/api/v1/loans/{loan_id}/return"));
    let (status, json) = body(client.post(&return_url).bearer_auth(&admin).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Loan returned successfully");
    assert!(json["data"]["returned_at"].is_string());

    let (status, json) = body(client.post(&return_url).bearer_auth(&admin).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Loan already returned");

    let (_, json) = body(
        client
            .get(server.url(&format!("/api/v1/vehicles/{vehicle_id}")))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json["data"]["is_available"], true);

    let (status, json) = body(
        client
            .post(server.url("/api/v1/loans"))
            .bearer_auth(&admin)
            .json(&json!({"vehicle_id": vehicle_id, "purpose": "Audit", "user_id": 99999}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["errors"]["user_id"], "User Not Found");
}
