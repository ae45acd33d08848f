use std::io::{self, Write};

use clap::Parser;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;

use points_api::auth::Role;
use points_api::auth::passwords::PasswordService;
use points_api::validation::validators;

/// Seed an account directly in the database, bypassing the HTTP cashier
/// flow. Intended for bootstrapping the first superuser on a fresh deploy.
#[derive(Parser, Debug)]
#[command(name = "create_user", about = "Create a loyalty program account")]
struct Args {
    /// Utorid for the account (7-8 alphanumeric characters).
    #[arg(long)]
    utorid: String,

    /// Display name for the account.
    #[arg(long)]
    name: String,

    /// University email address.
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this account.
    #[arg(long)]
    password: String,

    /// Role to assign (regular, cashier, manager, superuser).
    #[arg(long, default_value = "superuser")]
    role: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let utorid = args.utorid.trim().to_string();
    let email = args.email.trim().to_lowercase();

    let checks = [
        ("utorid", validators::utorid(&Value::String(utorid.clone()))),
        (
            "name",
            validators::person_name(&Value::String(args.name.clone())),
        ),
        (
            "email",
            validators::institutional_email(&Value::String(email.clone())),
        ),
        (
            "password",
            validators::password_complexity(&Value::String(args.password.clone())),
        ),
    ];
    for (field, result) in checks {
        if let Err(reason) = result {
            writeln!(io::stderr(), "error: {field} {reason}")?;
            std::process::exit(1);
        }
    }

    let role = match Role::from_str(args.role.trim()) {
        Some(role) => role,
        None => {
            writeln!(
                io::stderr(),
                "error: unsupported role '{}'. Use one of: {}",
                args.role,
                Role::ALL.map(|role| role.as_str()).join(", ")
            )?;
            std::process::exit(1);
        }
    };

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let mut tx = pool.begin().await?;

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE utorid = $1 OR lower(email) = lower($2)",
    )
    .bind(&utorid)
    .bind(&email)
    .fetch_one(&mut *tx)
    .await?;

    if existing > 0 {
        writeln!(
            io::stderr(),
            "error: a user with utorid '{utorid}' or email '{email}' already exists."
        )?;
        std::process::exit(1);
    }

    let password_service = PasswordService::new().map_err(|err| {
        io::Error::new(io::ErrorKind::Other, format!("argon2 init failed: {err}"))
    })?;
    let password_hash = password_service
        .hash_password(&args.password)
        .map_err(|err| {
            io::Error::new(io::ErrorKind::Other, format!("password hash failed: {err}"))
        })?;

    let user_id: i32 = sqlx::query_scalar(
        "INSERT INTO users (utorid, name, email, password_hash, role, verified) \
         VALUES ($1, $2, $3, $4, $5, TRUE) RETURNING id",
    )
    .bind(&utorid)
    .bind(&args.name)
    .bind(&email)
    .bind(password_hash)
    .bind(role.as_str())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    println!("Created {} user '{utorid}' with id {user_id}", role.as_str());
    Ok(())
}
