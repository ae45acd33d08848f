use chrono::Utc;
use points_api::auth::config::RESET_TOKEN_TTL_SECS;
use points_api::auth::routes::login;
use points_api::auth::{
    AuthConfig, AuthState, JwtService, PasswordService, ResetRateLimiter, ResetTokenStore,
};
use points_api::models::{PaginatedResponse, RegistrationResponse, UserResponse};
use points_api::routes::users::{
    change_password, get_me, get_user, list_users, register_user, update_me, update_user,
};
use points_api::test_support::{TestDatabase, TestDatabaseError, TestFixtures, TestRocketBuilder};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use rocket::routes;
use rocket::serde::json::json;
use sqlx::PgPool;
use uuid::Uuid;

fn test_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "users-route-test-secret".into(),
        superuser_utorid: "superusr".into(),
    }
}

fn build_auth_state(pool: PgPool) -> AuthState {
    let config = test_config();
    let password_service = PasswordService::new().expect("password service");
    let jwt_service = JwtService::from_config(&config).expect("jwt service");
    AuthState::new(
        config,
        password_service,
        jwt_service,
        ResetTokenStore::new(pool),
        ResetRateLimiter::new(),
    )
}

async fn provision(label: &str) -> Option<TestDatabase> {
    match TestDatabase::new_from_env().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::Container(err)) => {
            eprintln!("skipping {label}: container runtime unavailable: {err}");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

async fn spawn_client(test_db: &TestDatabase) -> Client {
    let pool = test_db.pool_clone();
    let auth_state = build_auth_state(pool.clone());
    let rocket = TestRocketBuilder::new()
        .with_points_db(test_db.url())
        .manage_pg_pool(pool)
        .mount_api_routes(routes![
            login,
            register_user,
            list_users,
            get_me,
            update_me,
            change_password,
            get_user,
            update_user
        ])
        .build()
        .manage(auth_state);
    Client::tracked(rocket).await.expect("valid rocket instance")
}

/// Mint a bearer header for a caller. The guards trust the token alone, so
/// the caller needs no row unless the handler reads their account.
fn bearer(jwt: &JwtService, utorid: &str, role: &str) -> Header<'static> {
    let token = jwt.issue(utorid, role).expect("issue token").token;
    Header::new("Authorization", format!("Bearer {token}"))
}

fn jwt_service() -> JwtService {
    JwtService::from_config(&test_config()).expect("jwt service")
}

#[tokio::test]
async fn registration_creates_an_unactivated_account() {
    let Some(test_db) = provision("registration test").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;

    let before = Utc::now();
    let response = client
        .post("/users")
        .header(ContentType::JSON)
        .header(bearer(&jwt, "clerk001", "cashier"))
        .body(
            json!({
                "utorid": "newkid01",
                "name": "New Kid",
                "email": "new.kid@mail.utoronto.ca"
            })
            .to_string(),
        )
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);

    let payload: RegistrationResponse = response.into_json().await.expect("registration payload");
    assert_eq!(payload.utorid, "newkid01");
    assert_eq!(payload.email, "new.kid@mail.utoronto.ca");
    assert!(!payload.verified);
    let token = Uuid::parse_str(&payload.reset_token).expect("activation token is a UUID");
    let lifetime = payload.expires_at.timestamp() - before.timestamp();
    assert!(
        (RESET_TOKEN_TTL_SECS - 30..=RESET_TOKEN_TTL_SECS + 30).contains(&lifetime),
        "activation token lifetime was {lifetime}s"
    );

    // The account starts as an unverified regular with no credential.
    let (role, password_hash, verified, points): (String, Option<String>, bool, i64) =
        sqlx::query_as("SELECT role, password_hash, verified, points FROM users WHERE id = $1")
            .bind(payload.id)
            .fetch_one(&pool)
            .await
            .expect("user lookup");
    assert_eq!(role, "regular");
    assert_eq!(password_hash, None);
    assert!(!verified);
    assert_eq!(points, 0);

    let stored: Uuid =
        sqlx::query_scalar("SELECT token FROM password_reset_tokens WHERE user_id = $1")
            .bind(payload.id)
            .fetch_one(&pool)
            .await
            .expect("token lookup");
    assert_eq!(stored, token);

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn registration_requires_a_cashier() {
    let Some(test_db) = provision("registration gate test").await else {
        return;
    };
    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;

    let body = json!({
        "utorid": "newkid01",
        "name": "New Kid",
        "email": "new.kid@mail.utoronto.ca"
    })
    .to_string();

    let response = client
        .post("/users")
        .header(ContentType::JSON)
        .header(bearer(&jwt, "member01", "regular"))
        .body(body.clone())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
    drop(response);

    let response = client
        .post("/users")
        .header(ContentType::JSON)
        .body(body)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
    drop(response);

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn registration_rejects_duplicate_identities() {
    let Some(test_db) = provision("duplicate registration test").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    fixtures
        .insert_user(
            "member01",
            "Sam Member",
            "sam.member@mail.utoronto.ca",
            "regular",
            None,
        )
        .await
        .expect("insert user");

    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;

    // Same utorid, fresh email.
    let response = client
        .post("/users")
        .header(ContentType::JSON)
        .header(bearer(&jwt, "clerk001", "cashier"))
        .body(
            json!({
                "utorid": "member01",
                "name": "Sam Again",
                "email": "sam.again@mail.utoronto.ca"
            })
            .to_string(),
        )
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(payload["message"], "utorid or email already registered");

    // Fresh utorid, same email.
    let response = client
        .post("/users")
        .header(ContentType::JSON)
        .header(bearer(&jwt, "clerk001", "cashier"))
        .body(
            json!({
                "utorid": "other123",
                "name": "Sam Other",
                "email": "sam.member@mail.utoronto.ca"
            })
            .to_string(),
        )
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);
    drop(response);

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn registration_rejects_privileged_fields() {
    let Some(test_db) = provision("registration smuggling test").await else {
        return;
    };
    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;

    let response = client
        .post("/users")
        .header(ContentType::JSON)
        .header(bearer(&jwt, "clerk001", "cashier"))
        .body(
            json!({
                "utorid": "newkid01",
                "name": "New Kid",
                "email": "new.kid@mail.utoronto.ca",
                "role": "manager"
            })
            .to_string(),
        )
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(payload["message"], "unexpected fields: role");

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn listing_filters_and_paginates_accounts() {
    let Some(test_db) = provision("user listing test").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);

    let alice_id = fixtures
        .insert_user(
            "alice123",
            "Alice Stone",
            "alice.stone@mail.utoronto.ca",
            "regular",
            None,
        )
        .await
        .expect("insert alice");
    fixtures
        .insert_user(
            "bob45678",
            "Bob Jones",
            "bob.jones@mail.utoronto.ca",
            "cashier",
            None,
        )
        .await
        .expect("insert bob");
    let carol_id = fixtures
        .insert_user(
            "carol789",
            "Carol Smith",
            "carol.smith@mail.utoronto.ca",
            "manager",
            None,
        )
        .await
        .expect("insert carol");
    fixtures.verify_user(alice_id).await.expect("verify alice");
    fixtures.verify_user(carol_id).await.expect("verify carol");
    // Only carol has ever logged in.
    sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
        .bind(carol_id)
        .execute(&pool)
        .await
        .expect("stamp last login");

    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;
    let manager = bearer(&jwt, "manager1", "manager");

    let response = client
        .get("/users")
        .header(manager.clone())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let payload: PaginatedResponse<UserResponse> =
        response.into_json().await.expect("listing payload");
    assert_eq!(payload.count, 3);
    assert_eq!(payload.results.len(), 3);
    assert_eq!(payload.results[0].utorid, "alice123");
    // Managers get the full view in listings.
    assert!(payload.results[0].email.is_some());

    let response = client
        .get("/users?role=cashier")
        .header(manager.clone())
        .dispatch()
        .await;
    let payload: PaginatedResponse<UserResponse> =
        response.into_json().await.expect("role filter payload");
    assert_eq!(payload.count, 1);
    assert_eq!(payload.results[0].utorid, "bob45678");

    let response = client
        .get("/users?verified=true")
        .header(manager.clone())
        .dispatch()
        .await;
    let payload: PaginatedResponse<UserResponse> =
        response.into_json().await.expect("verified filter payload");
    assert_eq!(payload.count, 2);

    let response = client
        .get("/users?activated=true")
        .header(manager.clone())
        .dispatch()
        .await;
    let payload: PaginatedResponse<UserResponse> =
        response.into_json().await.expect("activated filter payload");
    assert_eq!(payload.count, 1);
    assert_eq!(payload.results[0].utorid, "carol789");

    // The name filter matches display names and utorids alike.
    let response = client
        .get("/users?name=ali")
        .header(manager.clone())
        .dispatch()
        .await;
    let payload: PaginatedResponse<UserResponse> =
        response.into_json().await.expect("name filter payload");
    assert_eq!(payload.count, 1);
    assert_eq!(payload.results[0].utorid, "alice123");

    let response = client
        .get("/users?name=bob4")
        .header(manager.clone())
        .dispatch()
        .await;
    let payload: PaginatedResponse<UserResponse> =
        response.into_json().await.expect("utorid filter payload");
    assert_eq!(payload.count, 1);
    assert_eq!(payload.results[0].utorid, "bob45678");

    // Count reflects the whole filtered set, not the page.
    let response = client
        .get("/users?limit=2&page=2")
        .header(manager)
        .dispatch()
        .await;
    let payload: PaginatedResponse<UserResponse> =
        response.into_json().await.expect("pagination payload");
    assert_eq!(payload.count, 3);
    assert_eq!(payload.results.len(), 1);
    assert_eq!(payload.results[0].utorid, "carol789");

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn listing_is_fenced_and_filters_are_whitelisted() {
    let Some(test_db) = provision("listing gate test").await else {
        return;
    };
    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;

    let response = client
        .get("/users")
        .header(bearer(&jwt, "clerk001", "cashier"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
    drop(response);

    let response = client
        .get("/users?sort=points")
        .header(bearer(&jwt, "manager1", "manager"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(payload["message"], "unexpected fields: sort");

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn lookup_view_depends_on_caller_tier() {
    let Some(test_db) = provision("tiered lookup test").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    let user_id = fixtures
        .insert_user(
            "member01",
            "Sam Member",
            "sam.member@mail.utoronto.ca",
            "regular",
            None,
        )
        .await
        .expect("insert user");

    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;

    let response = client
        .get(format!("/users/{user_id}"))
        .header(bearer(&jwt, "clerk001", "cashier"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let limited: serde_json::Value = response.into_json().await.expect("limited view");
    assert_eq!(limited["utorid"], "member01");
    assert!(limited.get("email").is_none(), "cashier view leaks email");
    assert!(limited.get("role").is_none(), "cashier view leaks role");

    let response = client
        .get(format!("/users/{user_id}"))
        .header(bearer(&jwt, "manager1", "manager"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let full: serde_json::Value = response.into_json().await.expect("full view");
    assert_eq!(full["email"], "sam.member@mail.utoronto.ca");
    assert_eq!(full["role"], "regular");

    let response = client
        .get("/users/999999")
        .header(bearer(&jwt, "manager1", "manager"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotFound);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(payload["message"], "User 999999 not found");

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn own_profile_is_always_full() {
    let Some(test_db) = provision("own profile test").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    fixtures
        .insert_user(
            "member01",
            "Sam Member",
            "sam.member@mail.utoronto.ca",
            "regular",
            None,
        )
        .await
        .expect("insert user");

    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;

    // `/users/me` wins over `/users/<user_id>` and needs no tier.
    let response = client
        .get("/users/me")
        .header(bearer(&jwt, "member01", "regular"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let payload: serde_json::Value = response.into_json().await.expect("profile payload");
    assert_eq!(payload["utorid"], "member01");
    assert_eq!(payload["email"], "sam.member@mail.utoronto.ca");
    assert_eq!(payload["role"], "regular");

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn profile_edits_apply_to_the_caller() {
    let Some(test_db) = provision("profile edit test").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    fixtures
        .insert_user(
            "member01",
            "Sam Member",
            "sam.member@mail.utoronto.ca",
            "regular",
            None,
        )
        .await
        .expect("insert user");

    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;
    let caller = bearer(&jwt, "member01", "regular");

    let response = client
        .patch("/users/me")
        .header(ContentType::JSON)
        .header(caller.clone())
        .body(json!({"name": "Samwise Member", "birthday": "1999-04-23"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let payload: serde_json::Value = response.into_json().await.expect("profile payload");
    assert_eq!(payload["name"], "Samwise Member");
    assert_eq!(payload["birthday"], "1999-04-23");

    // A patch that names nothing changes nothing.
    let response = client
        .patch("/users/me")
        .header(ContentType::JSON)
        .header(caller.clone())
        .body(json!({}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(payload["message"], "no fields to update");

    // Explicit nulls in every slot amount to the same thing.
    let response = client
        .patch("/users/me")
        .header(ContentType::JSON)
        .header(caller.clone())
        .body(json!({"name": null, "email": null, "birthday": null}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    drop(response);

    // Balance adjustments do not travel through profile edits.
    let response = client
        .patch("/users/me")
        .header(ContentType::JSON)
        .header(caller)
        .body(json!({"points": 5000}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(payload["message"], "unexpected fields: points");

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn role_assignment_is_tiered() {
    let Some(test_db) = provision("role assignment test").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    let user_id = fixtures
        .insert_user(
            "member01",
            "Sam Member",
            "sam.member@mail.utoronto.ca",
            "regular",
            None,
        )
        .await
        .expect("insert user");

    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;
    let manager = bearer(&jwt, "manager1", "manager");
    let superuser = bearer(&jwt, "superusr", "superuser");

    let response = client
        .patch(format!("/users/{user_id}"))
        .header(ContentType::JSON)
        .header(manager.clone())
        .body(json!({"verified": true}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let payload: serde_json::Value = response.into_json().await.expect("update payload");
    assert_eq!(payload["verified"], true);

    // A manager can hand out cashier.
    let response = client
        .patch(format!("/users/{user_id}"))
        .header(ContentType::JSON)
        .header(manager.clone())
        .body(json!({"role": "cashier"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let payload: serde_json::Value = response.into_json().await.expect("update payload");
    assert_eq!(payload["role"], "cashier");

    // Anything above cashier is the superuser's call.
    let response = client
        .patch(format!("/users/{user_id}"))
        .header(ContentType::JSON)
        .header(manager.clone())
        .body(json!({"role": "manager"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(payload["message"], "only the superuser may assign this role");

    let response = client
        .patch(format!("/users/{user_id}"))
        .header(ContentType::JSON)
        .header(superuser)
        .body(json!({"role": "manager"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let payload: serde_json::Value = response.into_json().await.expect("update payload");
    assert_eq!(payload["role"], "manager");

    // Role names outside the hierarchy never reach the database.
    let response = client
        .patch(format!("/users/{user_id}"))
        .header(ContentType::JSON)
        .header(manager.clone())
        .body(json!({"role": "owner"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(
        payload["message"],
        "invalid field role: must be one of regular, cashier, manager, superuser"
    );

    let response = client
        .patch(format!("/users/{user_id}"))
        .header(ContentType::JSON)
        .header(manager.clone())
        .body(json!({}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(payload["message"], "no fields to update");

    let response = client
        .patch("/users/999999")
        .header(ContentType::JSON)
        .header(manager)
        .body(json!({"verified": true}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotFound);
    drop(response);

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn password_change_verifies_the_old_one() {
    let Some(test_db) = provision("password change test").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let hasher = PasswordService::new().expect("password service");
    let hash = hasher.hash_password("OldPass#99").expect("hash password");
    let fixtures = TestFixtures::new(&pool);
    fixtures
        .insert_user(
            "member01",
            "Sam Member",
            "sam.member@mail.utoronto.ca",
            "regular",
            Some(&hash),
        )
        .await
        .expect("insert user");

    let jwt = jwt_service();
    let client = spawn_client(&test_db).await;
    let caller = bearer(&jwt, "member01", "regular");

    let response = client
        .patch("/users/me/password")
        .header(ContentType::JSON)
        .header(caller.clone())
        .body(json!({"old": "WrongOld#1", "new": "NewPass#12"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(payload["message"], "old password does not match");

    let response = client
        .patch("/users/me/password")
        .header(ContentType::JSON)
        .header(caller.clone())
        .body(json!({"old": "OldPass#99", "new": "weak"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(
        payload["message"],
        "invalid field new: must be 8-20 characters with an uppercase letter, \
         a lowercase letter, a number, and a special character"
    );

    let response = client
        .patch("/users/me/password")
        .header(ContentType::JSON)
        .header(caller)
        .body(json!({"old": "OldPass#99", "new": "NewPass#12"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let payload: serde_json::Value = response.into_json().await.expect("json body");
    assert_eq!(payload["message"], "Password updated");

    // The replacement is live immediately.
    let response = client
        .post("/auth/tokens")
        .header(ContentType::JSON)
        .body(json!({"utorid": "member01", "password": "NewPass#12"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    drop(response);

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}
