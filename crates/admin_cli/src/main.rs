use std::error::Error;

use clap::{Args, Parser, Subcommand};
use engine::{Engine, users};
use migration::MigratorTrait;
use sea_orm::{ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter};

#[derive(Parser, Debug)]
#[command(name = "bank_ledger_admin")]
#[command(about = "Admin utilities for the bank ledger (bootstrap users/accounts, audit)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:./ledger.db?mode=rwc")]
    database_url: String,

    /// Integrity secret shared with the server (also read from `LEDGER_SECRET`).
    #[arg(long, env = "LEDGER_SECRET", hide_env_values = true)]
    secret: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    User(User),
    Account(Account),
    /// Report every account whose balance does not match its tag.
    Audit,
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Create(UserCreateArgs),
}

#[derive(Args, Debug)]
struct UserCreateArgs {
    #[arg(long)]
    username: String,
    #[arg(long, env = "LEDGER_USER_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct Account {
    #[command(subcommand)]
    command: AccountCommand,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    Open(OwnerArgs),
    List(OwnerArgs),
}

#[derive(Args, Debug)]
struct OwnerArgs {
    #[arg(long)]
    owner: String,
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

async fn owner_id(
    db: &DatabaseConnection,
    username: &str,
) -> Result<i64, Box<dyn Error + Send + Sync>> {
    match users::Entity::find()
        .filter(users::Column::Username.eq(username))
        .one(db)
        .await?
    {
        Some(user) => Ok(user.id),
        None => {
            eprintln!("user not found: {username}");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter("bank_ledger_admin=info,engine=info")
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder()
        .database(db.clone())
        .secret(&cli.secret)
        .build()
        .await?;

    match cli.command {
        Command::User(User {
            command: UserCommand::Create(args),
        }) => {
            let (user_id, account) = engine
                .register_user(&args.username, &args.password)
                .await?;
            println!(
                "created user: {} ({user_id}), account {}",
                args.username, account.id
            );
        }
        Command::Account(Account {
            command: AccountCommand::Open(args),
        }) => {
            let owner = owner_id(&db, &args.owner).await?;
            let account = engine.open_account(owner).await?;
            println!("opened account {} for {}", account.id, args.owner);
        }
        Command::Account(Account {
            command: AccountCommand::List(args),
        }) => {
            let owner = owner_id(&db, &args.owner).await?;
            for account in engine.get_accounts(owner).await? {
                println!(
                    "{}\t{}\t{}",
                    account.id,
                    account.balance,
                    account.created_at.to_rfc3339()
                );
            }
        }
        Command::Audit => {
            let tampered = engine.audit().await?;
            if tampered.is_empty() {
                println!("all accounts verified");
                return Ok(());
            }
            for account_id in &tampered {
                tracing::warn!(account_id, "balance does not match its integrity tag");
            }
            println!("{} tampered account(s)", tampered.len());
            std::process::exit(1);
        }
    }

    Ok(())
}
