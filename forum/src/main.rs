use clap::{Args, Parser, Subcommand};
use forum::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::{GitHubStore, GitStore, InMemoryStore};
use tracing::{info, warn};
use tracker::{
    FileStorage, HttpStatusSource, OperationKind, PageContext, StatusSource, StoreStatusSource,
    SubmissionTracker, TrackerEvent,
};

#[derive(Parser)]
#[command(name = "forum")]
#[command(about = "Publish and manage posts and comments in a git-backed forum")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Write to a throwaway in-memory repository instead of GitHub
    #[arg(long)]
    dry_run: bool,
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new owner token
    Token,
    /// Print the ownership hash stored for a token
    Hash {
        #[arg(short, long)]
        token: String,
    },
    /// Create, edit or delete posts
    #[command(subcommand)]
    Post(PostCommand),
    /// Add, edit or delete comments
    #[command(subcommand)]
    Comment(CommentCommand),
    /// Show the build status of a commit
    Status {
        #[arg(long)]
        sha: String,
    },
    /// Track a submission until its build settles
    Wait(WaitArgs),
}

#[derive(Subcommand)]
enum PostCommand {
    Create {
        #[arg(short, long)]
        token: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// Image file to attach (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },
    Edit {
        #[arg(short, long)]
        token: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Comma separated image names to remove
        #[arg(long)]
        delete_images: Option<String>,
    },
    Delete {
        #[arg(short, long)]
        token: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        date: String,
    },
}

#[derive(Subcommand)]
enum CommentCommand {
    /// Add a comment, or edit one when --id is given
    Submit {
        #[arg(short, long)]
        token: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    Delete {
        #[arg(short, long)]
        token: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        id: String,
    },
}

#[derive(Args)]
struct WaitArgs {
    #[arg(long)]
    sha: String,
    /// Page the submission was made from
    #[arg(long)]
    url: String,
    /// Post slug, or comment id for comment operations
    #[arg(long)]
    resource: String,
    /// new_post, edit_post, delete_post, new_comment, edit_comment or delete_comment
    #[arg(long)]
    operation: OperationKind,
    /// Where tracker state is kept between runs
    #[arg(long, default_value = ".forum-submissions.json")]
    state_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ForumConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Token => {
            println!("{}", OwnerToken::issue().as_str());
        }
        Commands::Hash { token } => {
            let secret = SiteSecret::new(config.site_secret.clone())?;
            println!("{}", secret.ownership_hash(&OwnerToken::new(token)?));
        }
        Commands::Post(command) => {
            let service = content_service(&config, cli.dry_run)?;
            let outcome = run_post(&service, command).await?;
            print_json(&outcome)?;
        }
        Commands::Comment(command) => {
            let service = content_service(&config, cli.dry_run)?;
            let outcome = run_comment(&service, command).await?;
            print_json(&outcome)?;
        }
        Commands::Status { sha } => {
            let service = content_service(&config, cli.dry_run)?;
            print_json(&service.commit_status(&sha).await?)?;
        }
        Commands::Wait(args) => {
            let store = open_store(&config, cli.dry_run)?;
            wait_for(&config, store, args).await?;
        }
    }

    Ok(())
}

fn open_store(config: &ForumConfig, dry_run: bool) -> ForumResult<Arc<dyn GitStore>> {
    if dry_run {
        info!(branch = %config.github.branch, "Using in-memory store");
        return Ok(Arc::new(InMemoryStore::new(&config.github.branch)));
    }
    let store = GitHubStore::new(config.github.clone()).map_err(|e| ForumError::Config {
        message: e.to_string(),
    })?;
    Ok(Arc::new(store))
}

fn content_service(config: &ForumConfig, dry_run: bool) -> ForumResult<ContentService> {
    config
        .validate()
        .map_err(|message| ForumError::Config { message })?;
    let store = open_store(config, dry_run)?;
    let secret = SiteSecret::new(config.site_secret.clone())?;
    Ok(ContentService::new(store, config.github.branch.clone(), secret)
        .with_limits(config.limits.clone()))
}

async fn run_post(service: &ContentService, command: PostCommand) -> ForumResult<store::CommitOutcome> {
    match command {
        PostCommand::Create {
            token,
            title,
            body,
            images,
        } => {
            let post = NewPost {
                title,
                body,
                images: read_images(&images)?,
            };
            service.create_post(post, &OwnerToken::new(token)?).await
        }
        PostCommand::Edit {
            token,
            slug,
            date,
            title,
            body,
            images,
            delete_images,
        } => {
            let edit = PostEdit {
                slug,
                date,
                title,
                body,
                new_images: read_images(&images)?,
                deleted_images: delete_images
                    .as_deref()
                    .map(parse_name_list)
                    .unwrap_or_default(),
            };
            service.edit_post(edit, &OwnerToken::new(token)?).await
        }
        PostCommand::Delete { token, slug, date } => {
            service
                .delete_post(&slug, &date, &OwnerToken::new(token)?)
                .await
        }
    }
}

async fn run_comment(
    service: &ContentService,
    command: CommentCommand,
) -> ForumResult<store::CommitOutcome> {
    match command {
        CommentCommand::Submit {
            token,
            slug,
            date,
            text,
            id,
            image,
        } => {
            let submission = CommentSubmission {
                post_slug: slug,
                post_date: date,
                text,
                comment_id: id,
                image: image.as_deref().map(read_image).transpose()?,
            };
            service
                .submit_comment(submission, &OwnerToken::new(token)?)
                .await
        }
        CommentCommand::Delete {
            token,
            slug,
            date,
            id,
        } => {
            service
                .delete_comment(&slug, &date, &id, &OwnerToken::new(token)?)
                .await
        }
    }
}

async fn wait_for(
    config: &ForumConfig,
    store: Arc<dyn GitStore>,
    args: WaitArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let tracker_config = config.tracker.clone();
    tracker_config.validate()?;

    let source: Arc<dyn StatusSource> = match &tracker_config.status_url {
        Some(url) => Arc::new(HttpStatusSource::new(url, tracker_config.timeout)?),
        None => Arc::new(StoreStatusSource::new(store)),
    };
    let storage = Arc::new(FileStorage::new(args.state_file));
    let poll_every = tracker_config.poll_interval;

    let mut tracker = SubmissionTracker::load(
        storage,
        source,
        tracker_config,
        PageContext::parse(&args.url),
    );
    let evaluation = tracker.track(
        &args.url,
        &args.resource,
        args.operation,
        &args.sha,
        chrono::Utc::now(),
    );
    for restriction in &evaluation.restrictions {
        println!("locked: {}", restriction.message());
    }

    while tracker.get(&args.sha).is_some() {
        if let Some(notice) = tracker.evaluate().notice {
            println!("{} - {}", notice.title, notice.description);
        }
        tokio::time::sleep(poll_every).await;
        for event in tracker.poll(chrono::Utc::now()).await {
            match &event {
                TrackerEvent::PollFailed { .. } => warn!("{}", event.message()),
                _ => println!("{}", event.message()),
            }
        }
    }
    Ok(())
}

fn read_images(paths: &[PathBuf]) -> ForumResult<Vec<ImageUpload>> {
    paths.iter().map(|path| read_image(path)).collect()
}

fn read_image(path: &Path) -> ForumResult<ImageUpload> {
    let bytes = std::fs::read(path).map_err(|e| {
        ForumError::validation(format!("cannot read {}: {}", path.display(), e))
    })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ForumError::validation(format!("invalid file name: {}", path.display())))?;
    Ok(ImageUpload::new(file_name, mime_for(file_name), bytes))
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
