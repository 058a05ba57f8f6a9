use anyhow::Result;
use clap::{Parser, Subcommand};
use server_api::auth::hash_password;
use storage::Storage;

mod seed;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/dashboard.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the sample customers, invoices, revenue and login.
    Seed,
    CreateUser {
        name: String,
        email: String,
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Seed => {
            let report = seed::seed(&storage).await?;
            println!(
                "seeded customers={} invoices={} revenue_months={} users={}",
                report.customers, report.invoices, report.revenue_months, report.users
            );
        }
        Command::CreateUser {
            name,
            email,
            password,
        } => {
            let hash = hash_password(&password)?;
            let user_id = storage.insert_user(&name, &email, &hash).await?;
            println!("created user_id={user_id}");
        }
    }

    Ok(())
}
