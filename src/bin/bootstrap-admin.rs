//! Create the first admin account on a fresh database.
//!
//! Usage:
//!   DATABASE_URL=... bootstrap-admin --email admin@school.org --first-name Ada --last-name Admin
//!
//! Without `--password` a temporary password is generated, printed once, and
//! must be changed at first login.

use anyhow::Context;
use clap::Parser;

use schoolhub_api::{
    db,
    models::user::{CreateUserRequest, UserRole},
    services::users::UserService,
};

#[derive(Parser)]
#[command(name = "bootstrap-admin", about = "Create an admin account for the school API")]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long)]
    email: String,

    #[arg(long)]
    first_name: String,

    #[arg(long)]
    last_name: String,

    /// Initial password (at least 8 characters). Generated when omitted.
    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD")]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let pool = db::create_pool(&args.database_url)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool).await?;

    let req = CreateUserRequest {
        email: args.email,
        first_name: args.first_name,
        last_name: args.last_name,
        phone: None,
        role: UserRole::Admin,
        password: args.password,
    };
    let created = UserService::create(&pool, &req)
        .await
        .context("Failed to create admin account")?;

    tracing::info!(user = %created.user.id, "admin account created");
    println!("Admin created: {} ({})", created.user.email, created.user.id);
    if let Some(temp) = created.temp_password {
        println!("Temporary password: {temp}");
    }
    Ok(())
}
