//! fanout-queue - Manage the post queue
//!
//! Unix-style tool for adding, inspecting, editing and publishing posts.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libfanout::logging::{LogFormat, LoggingConfig};
use libfanout::scheduling::parse_schedule;
use libfanout::types::{LogEntry, LogFilter};
use libfanout::{
    Config, Database, FanoutError, NewPost, PlatformRegistry, Post, PostFilter, PostUpdate,
    PublishResult, Publisher, Scheduler, SweepSummary,
};
use serde::Serialize;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "fanout-queue")]
#[command(version)]
#[command(about = "Manage the post queue")]
#[command(long_about = "\
fanout-queue - Manage the post queue

DESCRIPTION:
    fanout-queue adds posts to the Fanout queue and manages them until
    fanout-send (or a manual publish) releases them.

COMMANDS:
    add      Queue a new post (content from an argument or stdin)
    list     List posts
    show     Show one post
    edit     Change an unpublished post
    delete   Remove a post
    publish  Publish a post now, ignoring its schedule
    sweep    Publish every post whose schedule has arrived
    log      Show the action log

USAGE EXAMPLES:
    # Queue a post for two platforms tomorrow
    fanout-queue add \"Hello world\" --platforms archive,stdout --at tomorrow

    # Read the body from stdin; finish with a line containing only '.'
    fanout-queue add --platforms archive

    # List unpublished posts as JSON
    fanout-queue list --format json

    # Move a post to a fixed time
    fanout-queue edit <POST_ID> --at \"2026-11-20 15:00\"

    # Publish right away
    fanout-queue publish <POST_ID>

SCHEDULES:
    2026-11-20              Any time on that (UTC) day
    2026-11-20T15:00:00Z    From that instant
    2026-11-20 15:00        From that instant, UTC
    30m, 2h, 1d             Relative to now
    tomorrow, next monday   Natural language

CONFIGURATION:
    Configuration file: ~/.config/fanout/config.toml
    Database location: ~/.local/share/fanout/posts.db

    Override with environment variables:
        FANOUT_CONFIG    - Path to config file
        FANOUT_DB_PATH   - Path to database file

EXIT CODES:
    0 - Success
    1 - Operation failed (including a publish that failed on every platform)
    2 - Configuration error
    3 - Invalid input
    4 - Post not found or already published
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue a new post
    Add {
        /// Post body; read from stdin when omitted
        content: Option<String>,

        /// Optional title
        #[arg(short, long)]
        title: Option<String>,

        /// Comma-separated platform identifiers
        #[arg(short, long, value_delimiter = ',')]
        platforms: Vec<String>,

        /// When the post becomes eligible (see SCHEDULES)
        #[arg(long, value_name = "WHEN")]
        at: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List posts (unpublished by default)
    List {
        /// Include published posts
        #[arg(long, conflicts_with = "published")]
        all: bool,

        /// Only published posts
        #[arg(long)]
        published: bool,

        /// Only posts targeting this platform
        #[arg(long)]
        platform: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show a single post
    Show {
        post_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Edit an unpublished post
    Edit {
        post_id: String,

        /// New title
        #[arg(long, conflicts_with = "clear_title")]
        title: Option<String>,

        /// Remove the title
        #[arg(long)]
        clear_title: bool,

        /// New body
        #[arg(long)]
        content: Option<String>,

        /// Replace the platform list (comma-separated)
        #[arg(long, value_delimiter = ',')]
        platforms: Option<Vec<String>>,

        /// New schedule (see SCHEDULES)
        #[arg(long, value_name = "WHEN", conflicts_with = "clear_schedule")]
        at: Option<String>,

        /// Make the post eligible immediately
        #[arg(long)]
        clear_schedule: bool,

        /// Apply a JSON object of fields instead of flags
        #[arg(
            long,
            value_name = "OBJECT",
            conflicts_with_all = ["title", "clear_title", "content", "platforms", "at", "clear_schedule"]
        )]
        json: Option<String>,
    },

    /// Delete a post
    Delete { post_id: String },

    /// Publish a post now
    Publish {
        post_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Publish every eligible post once
    Sweep {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the action log
    Log {
        /// Only entries for this post
        #[arg(long)]
        post: Option<String>,

        /// Only entries with this action (e.g. post_published)
        #[arg(long)]
        action: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(format: &str) -> libfanout::Result<Self> {
        match format {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(FanoutError::Validation(format!(
                "Invalid format '{}'. Must be 'text' or 'json'",
                other
            ))),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Quiet by default; command output goes to stdout
    let level = if cli.verbose { "debug" } else { "error" };
    LoggingConfig::new(LogFormat::Text, level.to_string(), cli.verbose).init();

    match run(cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<FanoutError>()
                .map(FanoutError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

/// Run the command and return the process exit code
async fn run(cli: Cli) -> anyhow::Result<i32> {
    // Read stdin before opening the database
    let content = match &cli.command {
        Commands::Add { content: None, .. } => Some(read_content_from_stdin()?),
        _ => None,
    };

    let config = Config::load_or_default()?;
    debug!("Using database {}", config.database.path);
    let db = Arc::new(Database::new(&config.database.path).await?);

    match cli.command {
        Commands::Add {
            content: arg_content,
            title,
            platforms,
            at,
            format,
        } => {
            let format = OutputFormat::parse(&format)?;
            let body = arg_content.or(content).unwrap_or_default();
            cmd_add(&db, body, title, platforms, at.as_deref(), format).await?;
        }
        Commands::List {
            all,
            published,
            platform,
            format,
        } => {
            let format = OutputFormat::parse(&format)?;
            let filter = if all {
                PostFilter::all()
            } else if published {
                PostFilter::published()
            } else {
                PostFilter::unpublished()
            };
            cmd_list(&db, filter, platform.as_deref(), format).await?;
        }
        Commands::Show { post_id, format } => {
            let format = OutputFormat::parse(&format)?;
            cmd_show(&db, &post_id, format).await?;
        }
        Commands::Edit {
            post_id,
            title,
            clear_title,
            content,
            platforms,
            at,
            clear_schedule,
            json,
        } => {
            let update = match json {
                Some(json) => {
                    let value: serde_json::Value = serde_json::from_str(&json).map_err(|e| {
                        FanoutError::Validation(format!("Invalid JSON update: {}", e))
                    })?;
                    let update = PostUpdate::from_json(&value)?;
                    if update.is_empty() {
                        return Err(FanoutError::Validation(
                            "Nothing to update; the JSON object has no fields".to_string(),
                        )
                        .into());
                    }
                    update
                }
                None => build_update(title, clear_title, content, platforms, at, clear_schedule)?,
            };
            cmd_edit(&db, &post_id, &update).await?;
        }
        Commands::Delete { post_id } => {
            if !db.delete_post(&post_id).await? {
                return Err(FanoutError::NotFound(post_id).into());
            }
            println!("Deleted post {}", post_id);
        }
        Commands::Publish { post_id, format } => {
            let format = OutputFormat::parse(&format)?;
            let publisher = publisher_for(&config, db);
            let result = publisher.publish(&post_id).await?;
            print_publish_result(&result, format)?;
            if !result.success {
                return Ok(1);
            }
        }
        Commands::Sweep { format } => {
            let format = OutputFormat::parse(&format)?;
            let scheduler = Scheduler::new(
                publisher_for(&config, db),
                Duration::from_secs(config.scheduler.interval_secs),
            );
            let summary = scheduler.sweep(Utc::now()).await?;
            print_sweep_summary(&summary, format)?;
        }
        Commands::Log {
            post,
            action,
            format,
        } => {
            let format = OutputFormat::parse(&format)?;
            let entries = db
                .list_logs(&LogFilter {
                    action,
                    post_id: post,
                })
                .await?;
            print_log(&entries, format)?;
        }
    }

    Ok(0)
}

fn publisher_for(config: &Config, db: Arc<Database>) -> Publisher {
    Publisher::new(db, Arc::new(PlatformRegistry::from_config(config)))
}

/// Read the post body from stdin
///
/// Stops at EOF or at a line containing only `.`.
fn read_content_from_stdin() -> anyhow::Result<String> {
    let stdin = std::io::stdin();
    let mut lines = Vec::new();

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read content from stdin")?;
        if line.trim_end() == "." {
            break;
        }
        lines.push(line);
    }

    Ok(lines.join("\n"))
}

fn build_update(
    title: Option<String>,
    clear_title: bool,
    content: Option<String>,
    platforms: Option<Vec<String>>,
    at: Option<String>,
    clear_schedule: bool,
) -> libfanout::Result<PostUpdate> {
    let mut update = PostUpdate::new();

    if let Some(title) = title {
        update = update.title(Some(title));
    } else if clear_title {
        update = update.title(None);
    }
    if let Some(content) = content {
        update = update.content(content);
    }
    if let Some(platforms) = platforms {
        update = update.platforms(platforms);
    }
    if let Some(at) = at {
        update = update.scheduled_at(Some(parse_schedule(&at, Utc::now())?));
    } else if clear_schedule {
        update = update.scheduled_at(None);
    }

    if update.is_empty() {
        return Err(FanoutError::Validation(
            "Nothing to update; pass at least one field".to_string(),
        ));
    }
    Ok(update)
}

async fn cmd_add(
    db: &Database,
    content: String,
    title: Option<String>,
    platforms: Vec<String>,
    at: Option<&str>,
    format: OutputFormat,
) -> libfanout::Result<()> {
    let mut new_post = NewPost::new(content).with_platforms(platforms);
    if let Some(title) = title {
        new_post = new_post.with_title(title);
    }
    if let Some(at) = at {
        new_post = new_post.scheduled(parse_schedule(at, Utc::now())?);
    }

    let post_id = db.create_post(new_post).await?;

    match format {
        OutputFormat::Text => println!("{}", post_id),
        OutputFormat::Json => print_json(&serde_json::json!({ "id": post_id }))?,
    }
    Ok(())
}

async fn cmd_list(
    db: &Database,
    filter: PostFilter,
    platform: Option<&str>,
    format: OutputFormat,
) -> libfanout::Result<()> {
    let mut posts = db.list_posts(filter).await?;

    if let Some(platform) = platform {
        let platform = platform.trim().to_lowercase();
        posts.retain(|p| p.platforms.contains(&platform));
    }

    match format {
        OutputFormat::Json => print_json(&posts)?,
        OutputFormat::Text => {
            let now = Utc::now();
            for post in &posts {
                let when = match &post.scheduled_at {
                    None => "unscheduled".to_string(),
                    Some(schedule) => schedule.to_string(),
                };
                let state = if post.published {
                    "published"
                } else if libfanout::eligibility::is_eligible(post, now) {
                    "due"
                } else {
                    "waiting"
                };
                println!(
                    "{} | {} | {} | {} | {}",
                    post.id,
                    state,
                    when,
                    post.platforms.join(","),
                    truncate_content(&post.content, 50)
                );
            }
        }
    }
    Ok(())
}

async fn cmd_show(db: &Database, post_id: &str, format: OutputFormat) -> libfanout::Result<()> {
    let post = db
        .get_post(post_id)
        .await?
        .ok_or_else(|| FanoutError::NotFound(post_id.to_string()))?;

    match format {
        OutputFormat::Json => print_json(&post)?,
        OutputFormat::Text => print_post_text(&post),
    }
    Ok(())
}

async fn cmd_edit(db: &Database, post_id: &str, update: &PostUpdate) -> libfanout::Result<()> {
    if !db.update_post(post_id, update).await? {
        return Err(FanoutError::NotFound(post_id.to_string()));
    }
    println!("Updated post {}", post_id);
    Ok(())
}

fn print_post_text(post: &Post) {
    println!("id:        {}", post.id);
    if let Some(title) = &post.title {
        println!("title:     {}", title);
    }
    println!(
        "schedule:  {}",
        post.scheduled_at
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unscheduled".to_string())
    );
    println!("platforms: {}", post.platforms.join(", "));
    println!("published: {}", post.published);
    println!("created:   {}", format_timestamp(post.created_at));
    println!("updated:   {}", format_timestamp(post.updated_at));
    println!();
    println!("{}", post.content);
}

fn print_publish_result(result: &PublishResult, format: OutputFormat) -> libfanout::Result<()> {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Text => {
            if result.success {
                println!("Published post {}", result.post_id);
            } else {
                println!("Failed to publish post {}", result.post_id);
            }
            for (platform, outcome) in &result.platforms {
                match (&outcome.reference, &outcome.error) {
                    (Some(reference), _) if outcome.success => {
                        println!("  {}: ok ({})", platform, reference)
                    }
                    (_, Some(error)) => println!("  {}: failed ({})", platform, error),
                    _ => println!("  {}: failed", platform),
                }
            }
            Ok(())
        }
    }
}

fn print_sweep_summary(summary: &SweepSummary, format: OutputFormat) -> libfanout::Result<()> {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Text => {
            println!(
                "Sweep complete: {} published, {} failed, {} skipped",
                summary.published, summary.failed, summary.skipped
            );
            for result in &summary.results {
                let failed: Vec<&str> = result.failed().collect();
                if !failed.is_empty() {
                    println!("  {}: failed on {}", result.post_id, failed.join(", "));
                }
            }
            Ok(())
        }
    }
}

fn print_log(entries: &[LogEntry], format: OutputFormat) -> libfanout::Result<()> {
    match format {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Text => {
            for entry in entries {
                println!(
                    "{} | {} | {} | {}",
                    format_timestamp(entry.timestamp),
                    entry.action,
                    entry.post_id.as_deref().unwrap_or("-"),
                    entry.details
                );
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> libfanout::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| FanoutError::InvariantViolation(format!("Cannot encode output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Truncate content to max characters with ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let truncated: String = single_line.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
