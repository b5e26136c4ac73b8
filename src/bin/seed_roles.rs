use std::sync::Arc;

use clap::Parser;

use exam_portal::{
    config::{Config, StorageBackend},
    db::{Database, MemoryStore, MongoStore, Store},
    errors::AppResult,
    services::{RoleRegistry, UserService},
};

const BOOTSTRAP_ROLE: &str = "superadmin";

/// Replaces every stored role with the built-in system role set and/or
/// promotes an existing account to superadmin.
#[derive(Parser, Debug)]
#[command(name = "seed-roles", version, about)]
struct Args {
    /// Reseed the system roles. Seeding deletes custom roles as well.
    #[arg(long)]
    force: bool,

    /// Promote this registered account to superadmin, verifying and
    /// activating it.
    #[arg(long, value_name = "EMAIL")]
    admin_email: Option<String>,
}

async fn run(config: Config, args: Args) -> AppResult<()> {
    let store: Arc<dyn Store> = match config.storage_backend {
        StorageBackend::Mongo => Arc::new(MongoStore::new(Database::connect(&config).await?)),
        StorageBackend::Memory => {
            log::warn!("seeding the in-memory store has no lasting effect");
            Arc::new(MemoryStore::new())
        }
    };
    store.ensure_indexes().await?;

    let registry = Arc::new(RoleRegistry::load(store.clone()).await?);
    if args.force {
        let existing = registry.list_roles().await.len();
        let seeded = registry.seed().await?;

        log::info!(
            "replaced {} roles with {} system roles",
            existing,
            seeded.len()
        );
        for role in seeded {
            println!("{:<12} {}", role.name, role.permissions.join(","));
        }
    }

    if let Some(email) = args.admin_email {
        let users = UserService::new(store, registry);
        let admin = users.promote_by_email(&email, BOOTSTRAP_ROLE).await?;
        println!("{} is now {}", admin.email, admin.role);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args = Args::parse();
    if !args.force && args.admin_email.is_none() {
        eprintln!(
            "nothing to do: pass --force to reseed roles (every existing role will be deleted) \
             or --admin-email to promote an account"
        );
        std::process::exit(2);
    }

    if let Err(e) = run(Config::from_env(), args).await {
        log::error!("seeding failed: {}", e);
        std::process::exit(1);
    }
}
