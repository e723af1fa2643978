use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use text2sql::config::{AppConfig, DEFAULT_ROW_LIMIT};
use text2sql::sql::{clean, SqlValidator, ValidationVerdict};
use text2sql::{Pipeline, Question};
use tracing::info;

#[derive(Parser)]
#[command(name = "text2sql")]
#[command(about = "Answer natural-language questions with read-only MySQL queries")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a question through retrieval, generation, validation and execution
    Ask {
        question: String,

        /// Schema index file (overrides INDEX_PATH)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Query timeout in seconds (overrides QUERY_TIMEOUT_SECS)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Check SQL against the read-only rules without touching a database
    Validate { sql: String },
    /// Clean raw model output into a candidate query
    Clean {
        raw: String,

        #[arg(short, long, default_value_t = DEFAULT_ROW_LIMIT)]
        limit: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    text2sql::init_tracing();

    let args = Args::parse();

    match args.command {
        Command::Ask {
            question,
            index,
            timeout_secs,
        } => {
            let mut config = AppConfig::from_env()?;
            if let Some(index) = index {
                config.retrieval.index_path = index;
            }
            if let Some(secs) = timeout_secs.filter(|s| *s > 0) {
                config.pipeline.query_timeout = std::time::Duration::from_secs(secs);
            }

            let question = Question::new(&question)?;
            let pipeline = Pipeline::from_config(&config)?;
            info!("Question: {}", question.as_str());

            let response = pipeline
                .run(&question)
                .await
                .with_context(|| "query failed")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Validate { sql } => match SqlValidator::new().validate(&sql) {
            ValidationVerdict::Accepted => println!("accepted"),
            ValidationVerdict::Rejected(reason) => {
                println!("rejected: {}", reason);
                std::process::exit(1);
            }
        },
        Command::Clean { raw, limit } => {
            let cleaned = clean(&raw, limit);
            if cleaned.is_empty() {
                eprintln!("no SELECT statement found");
                std::process::exit(1);
            }
            println!("{}", cleaned);
        }
    }

    Ok(())
}
