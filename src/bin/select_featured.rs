//! Pick the featured poll from recent voting activity.

use std::error::Error;

use chrono::Utc;
use clap::Parser;
use log::{error, info};

use auditavel::config::DEFAULT_DATABASE_URL;
use auditavel::db::Database;
use auditavel::tasks::featured::{self, FeatureRequest, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};

const CLI_ACTOR: &str = "cli";

#[derive(Parser, Debug)]
#[command(name = "select-featured", about = "Feature the most voted public open poll")]
struct Args {
    /// Only ballots cast in the last N days count
    #[arg(
        long,
        default_value_t = DEFAULT_WINDOW_DAYS,
        value_parser = clap::value_parser!(u32).range(1..=MAX_WINDOW_DAYS as i64)
    )]
    window_days: u32,

    /// Feature this poll instead of choosing by activity
    #[arg(long)]
    poll_id: Option<String>,

    /// Report the choice without changing anything
    #[arg(long)]
    dry_run: bool,

    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let database = Database::connect(&args.database_url, 1).await?;
    let request = FeatureRequest {
        window_days: args.window_days,
        poll_id: args.poll_id,
        dry_run: args.dry_run,
    };

    match featured::select_featured(&database, CLI_ACTOR, &request, Utc::now()).await? {
        Some(chosen) => {
            let votes = chosen
                .recent_votes
                .map(|v| format!("{} vote(s) in the last {} day(s)", v, request.window_days))
                .unwrap_or_else(|| "chosen by id".to_string());
            let verb = if chosen.applied { "Featured" } else { "Would feature" };
            println!("{} poll {} \"{}\" ({})", verb, chosen.poll_id, chosen.title, votes);
        }
        None => {
            info!("No public open poll to feature");
            println!("No public open poll to feature");
        }
    }
    Ok(())
}
