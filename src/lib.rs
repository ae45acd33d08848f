#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod request_logger;
pub mod routes;
pub mod validation;

use crate::auth::{
    AuthConfig, AuthState, JwtService, PasswordService, ResetRateLimiter, ResetTokenStore,
};
use crate::db::PointsDb;
use crate::request_logger::RequestLogger;
use crate::validation::SchemaRegistry;
use chrono::Utc;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::Once;
use std::time::Duration;

/// Applied at startup and by the ephemeral databases the tests provision.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// How often the background sweeper clears expired reset tokens and stale
/// rate-limit entries.
const SWEEP_INTERVAL_SECS: u64 = 900;

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    // Configure CORS
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Patch, Method::Delete]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(PointsDb::init())
        .attach(cors)
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite("Run Migrations", |rocket| async move {
            match PointsDb::fetch(&rocket) {
                Some(db) => {
                    let pool = (**db).clone();
                    match MIGRATOR.run(&pool).await {
                        Ok(_) => {
                            log::info!("database migrations successful");
                            Ok(rocket)
                        }
                        Err(e) => {
                            log::error!("database migrations failed: {}", e);
                            Err(rocket)
                        }
                    }
                }
                None => {
                    log::error!("database pool not available for migrations");
                    Err(rocket)
                }
            }
        }))
        // Clone and manage the pool directly for handlers that open their own
        // transactions
        .attach(AdHoc::try_on_ignite("Manage DB Pool", |rocket| async move {
            match PointsDb::fetch(&rocket) {
                Some(db) => {
                    let pool = (**db).clone();
                    Ok(rocket.manage(pool))
                }
                None => Err(rocket),
            }
        }))
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let config = match AuthConfig::from_env() {
                Ok(config) => config,
                Err(e) => {
                    log::error!("auth configuration failed: {}", e);
                    return Err(rocket);
                }
            };

            let password_service = match PasswordService::new() {
                Ok(service) => service,
                Err(e) => {
                    log::error!("password hasher initialization failed: {}", e);
                    return Err(rocket);
                }
            };

            let jwt_service = match JwtService::from_config(&config) {
                Ok(service) => service,
                Err(e) => {
                    log::error!("token signer initialization failed: {}", e);
                    return Err(rocket);
                }
            };

            let pool = match rocket.state::<rocket_db_pools::sqlx::PgPool>() {
                Some(pool) => pool.clone(),
                None => {
                    log::error!("database pool not available for auth state");
                    return Err(rocket);
                }
            };

            let state = AuthState::new(
                config,
                password_service,
                jwt_service,
                ResetTokenStore::new(pool),
                ResetRateLimiter::new(),
            );
            Ok(rocket.manage(state))
        }))
        .manage(validation::schemas::build())
        // Refuse to launch if any mounted endpoint that accepts input is
        // missing from the validation schema table
        .attach(AdHoc::try_on_ignite(
            "Validation Coverage",
            |rocket| async move {
                let declared: Vec<(String, String, bool)> = rocket
                    .routes()
                    .map(|route| {
                        let uri = route.uri.to_string();
                        match uri.split_once('?') {
                            Some((path, query)) => {
                                (route.method.to_string(), path.to_string(), !query.is_empty())
                            }
                            None => (route.method.to_string(), uri, false),
                        }
                    })
                    .collect();

                let registry = match rocket.state::<SchemaRegistry>() {
                    Some(registry) => registry,
                    None => {
                        log::error!("validation schema table not managed");
                        return Err(rocket);
                    }
                };

                let missing = registry.missing_coverage(declared);
                if missing.is_empty() {
                    Ok(rocket)
                } else {
                    for key in &missing {
                        log::error!("mounted route has no validation schema: {}", key);
                    }
                    Err(rocket)
                }
            },
        ))
        // Sweep expired reset tokens in the background
        .attach(AdHoc::on_liftoff("Spawn Token Sweeper", |rocket| {
            Box::pin(async move {
                if let Some(state) = rocket.state::<AuthState>() {
                    let state = state.clone();
                    tokio::spawn(async move {
                        let mut ticker =
                            tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
                        loop {
                            ticker.tick().await;
                            let now = Utc::now();
                            match state.reset_store.purge_expired(now).await {
                                Ok(0) => {}
                                Ok(count) => log::info!("swept {} expired reset tokens", count),
                                Err(e) => log::warn!("reset token sweep failed: {}", e),
                            }
                            state.rate_limiter.prune(now);
                        }
                    });
                } else {
                    log::error!("failed to spawn token sweeper: auth state not found");
                }
            })
        }))
        .mount(
            "/",
            openapi_get_routes![
                // Health routes
                routes::health::health_check,
                // Session and password reset routes
                auth::routes::login,
                auth::routes::request_reset,
                auth::routes::consume_reset,
                // User routes
                routes::users::register_user,
                routes::users::list_users,
                routes::users::get_me,
                routes::users::update_me,
                routes::users::change_password,
                routes::users::get_user,
                routes::users::update_user,
            ],
        )
        .mount(
            "/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Points API", "../../openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use chrono::{DateTime, Utc};
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use rocket_db_pools::Database;
    use rocket_db_pools::sqlx::{self, PgPool};
    use uuid::Uuid;

    use crate::db::PointsDb;

    pub use database::{TestDatabase, TestDatabaseError};

    /// Seeding helpers for the tables the API reads and writes.
    pub struct TestFixtures<'a> {
        pool: &'a PgPool,
    }

    impl<'a> TestFixtures<'a> {
        /// Create a fixture helper bound to the provided pool.
        pub fn new(pool: &'a PgPool) -> Self {
            Self { pool }
        }

        /// Insert a user row, returning the new user id. `password_hash`
        /// stays NULL for accounts that never activated.
        pub async fn insert_user(
            &self,
            utorid: &str,
            name: &str,
            email: &str,
            role: &str,
            password_hash: Option<&str>,
        ) -> Result<i32, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO users (utorid, name, email, role, password_hash) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING id",
            )
            .bind(utorid)
            .bind(name)
            .bind(email)
            .bind(role)
            .bind(password_hash.map(|hash| hash.to_string()))
            .fetch_one(self.pool)
            .await
        }

        /// Flip the verified flag, as a manager would through the API.
        pub async fn verify_user(&self, user_id: i32) -> Result<(), sqlx::Error> {
            sqlx::query("UPDATE users SET verified = TRUE WHERE id = $1")
                .bind(user_id)
                .execute(self.pool)
                .await?;

            Ok(())
        }

        /// Insert a reset token row directly, bypassing the issue path.
        pub async fn insert_reset_token(
            &self,
            user_id: i32,
            token: Uuid,
            expires_at: DateTime<Utc>,
        ) -> Result<(), sqlx::Error> {
            sqlx::query(
                "INSERT INTO password_reset_tokens (token, user_id, expires_at, created_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .bind(Utc::now())
            .execute(self.pool)
            .await?;

            Ok(())
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::{GenericImage, ImageExt, core::WaitFor};
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        use crate::MIGRATOR;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Ephemeral database factory for integration tests.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            database_url: String,
            container: Option<ContainerAsync<GenericImage>>,
        }

        impl TestDatabase {
            /// Provision a fresh database by launching a disposable Postgres
            /// container.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                Self::new().await
            }

            /// Provision a fresh, migrated database on a new container.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let image = GenericImage::new("postgres", "16-alpine")
                    .with_wait_for(WaitFor::message_on_stdout(
                        "database system is ready to accept connections",
                    ))
                    .with_wait_for(WaitFor::message_on_stderr(
                        "database system is ready to accept connections",
                    ));

                let request = image
                    .with_env_var("POSTGRES_DB", "postgres")
                    .with_env_var("POSTGRES_USER", "postgres")
                    .with_env_var("POSTGRES_PASSWORD", "postgres");

                let container = request.start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let base_options: PgConnectOptions =
                    admin_url.parse().map_err(TestDatabaseError::Sqlx)?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let base_name = base_options
                    .get_database()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "postgres".to_string());

                let admin_options = base_options.clone().database("postgres");
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                let new_db_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", new_db_name);
                sqlx::query(&create_sql)
                    .execute(&admin_pool)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.clone().database(&new_db_name))
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                MIGRATOR.run(&pool).await?;

                let database_url = format!(
                    "postgres://postgres:postgres@{}:{}/{}",
                    host, port, new_db_name
                );

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name: new_db_name,
                    database_url,
                    container: Some(container),
                })
            }

            /// Connection pool for direct queries in tests.
            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            /// Convenience method returning a clone of the pooled connection
            /// handle.
            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Connection string for wiring the Rocket-managed pool.
            pub fn url(&self) -> &str {
                &self.database_url
            }

            /// Close pool connections and drop the ephemeral database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database_with_fallback(self.admin_options.clone(), &self.database_name)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_database_with_fallback(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_force = format!("DROP DATABASE \"{}\" WITH (FORCE)", database_name);
            match sqlx::query(&drop_force).execute(&admin_pool).await {
                Ok(_) => Ok(()),
                Err(err) if force_drop_unsupported(&err) => {
                    let drop_sql = format!("DROP DATABASE \"{}\"", database_name);
                    sqlx::query(&drop_sql).execute(&admin_pool).await?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }

        fn force_drop_unsupported(err: &sqlx::Error) -> bool {
            matches!(
                err,
                sqlx::Error::Database(db_err)
                    if db_err
                        .code()
                        .map(|code| code == "42601" || code == "0A000")
                        .unwrap_or(false)
            )
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let db_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ =
                                drop_database_with_fallback(admin_options.clone(), &db_name).await;
                        });
                    } else {
                        std::thread::spawn(move || {
                            if let Ok(rt) = tokio::runtime::Runtime::new() {
                                rt.block_on(async move {
                                    pool.close().await;
                                    let _ = drop_database_with_fallback(
                                        admin_options.clone(),
                                        &db_name,
                                    )
                                    .await;
                                });
                            }
                        });
                    }
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration
    /// tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        pg_pool: Option<PgPool>,
        attach_points_db: bool,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging
        /// disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                pg_pool: None,
                attach_points_db: false,
            }
        }

        /// Mount routes at the API root, where the launch builder mounts
        /// them.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/".to_string(), routes));
            self
        }

        /// Manage a `PgPool` for handlers that open their own transactions.
        pub fn manage_pg_pool(mut self, pool: PgPool) -> Self {
            self.pg_pool = Some(pool);
            self
        }

        /// Point the `points_db` pool at the given database and attach it,
        /// so handlers taking a `Connection<PointsDb>` guard resolve.
        pub fn with_points_db(mut self, url: &str) -> Self {
            self.figment = self.figment.merge(("databases.points_db.url", url));
            self.attach_points_db = true;
            self
        }

        /// Finish building the Rocket instance. The validation schema table
        /// is always managed; handlers consult it before reading a payload.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket =
                rocket::custom(self.figment).manage(crate::validation::schemas::build());

            if self.attach_points_db {
                rocket = rocket.attach(PointsDb::init());
            }

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(pool) = self.pg_pool {
                rocket = rocket.manage(pool);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
