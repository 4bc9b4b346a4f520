use clap::{Parser, Subcommand};
use log::error;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use lesson_admin::config::{AppConfig, BackendKind};
use lesson_admin::credentials::{
    get_api_key, get_credentials_path, get_login, load_credentials, local_accounts, Credentials,
};
use lesson_admin::firebase::FirebaseBackend;
use lesson_admin::model::document_to_json;
use lesson_admin::store::local::LocalStore;
use lesson_admin::store::memory::MemoryStore;
use lesson_admin::transcript::parse_transcript_file;
use lesson_admin::{
    single_email, BlobStore, ContentRecord, DocumentStore, IdentityProvider, LessonForm,
    LessonSubmission, LessonUploader, LocalIdentityProvider, MediaFile, SessionGuard,
    TranscriptTiming, UploadError,
};

/// Environment variable holding the password when --email is given
const PASSWORD_ENV: &str = "LESSON_ADMIN_PASSWORD";

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload language-learning lessons to the content store")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and upload one lesson
    Upload(UploadArgs),
    /// Parse a transcript CSV and print its rows
    CheckTranscript {
        /// Path to the transcript CSV file
        file: PathBuf,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug)]
struct UploadArgs {
    /// Path to config file (TOML format)
    #[arg(short, long)]
    config: PathBuf,

    /// Credentials file (default: ~/.config/lesson_admin/credentials.toml)
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Sign in as this email instead of the configured login profile
    /// (password is read from LESSON_ADMIN_PASSWORD)
    #[arg(long)]
    email: Option<String>,

    /// Lesson language, e.g. Spanish
    #[arg(short, long)]
    language: String,

    /// Lesson number within the language (positive integer)
    #[arg(short = 'n', long)]
    content_number: String,

    #[arg(short, long)]
    title: String,

    #[arg(short, long)]
    description: String,

    /// Transcript CSV (targetLanguage,nativeLanguage,startTime,endTime or
    /// targetLanguage,nativeLanguage,timestamp)
    #[arg(long)]
    transcript: PathBuf,

    /// Video file to upload with the lesson
    #[arg(long, conflicts_with = "video_url")]
    video: Option<PathBuf>,

    /// Already-hosted YouTube video URL
    #[arg(long)]
    video_url: Option<String>,

    /// Clip start within the video (HH:MM:SS.mmm)
    #[arg(long)]
    video_start: Option<String>,

    /// Clip end within the video (HH:MM:SS.mmm)
    #[arg(long)]
    video_end: Option<String>,

    /// Sign in and validate, but write to an in-memory store and print the document
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let result = match args.command {
        Command::Upload(upload_args) => upload(upload_args),
        Command::CheckTranscript { file, json } => check_transcript(file, json),
    };

    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

struct Backend {
    identity: Arc<dyn IdentityProvider>,
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
}

fn build_backend(
    config: &AppConfig,
    credentials: &Option<Credentials>,
) -> Result<Backend, Box<dyn std::error::Error>> {
    match config.backend {
        BackendKind::Local => {
            let Some(local) = &config.local else {
                return Err(config.backend.missing_section_error().into());
            };

            let mut store = LocalStore::new(&local.root_dir);
            if let Some(base) = &local.public_base_url {
                store = store.with_public_base_url(
                    Url::parse(base).map_err(|e| format!("Invalid public_base_url '{}': {}", base, e))?,
                );
            }
            println!("Using local store at {}", local.root_dir.display());

            let store = Arc::new(store);
            Ok(Backend {
                identity: Arc::new(LocalIdentityProvider::new(local_accounts(credentials))),
                documents: store.clone(),
                blobs: store,
            })
        }
        BackendKind::Firebase => {
            let Some(fb) = &config.firebase else {
                return Err(config.backend.missing_section_error().into());
            };
            let api_key = get_api_key(credentials, &fb.credential_profile)?;
            println!("Using Firebase project {}", fb.project_id);

            let backend = Arc::new(FirebaseBackend::new(fb, api_key)?);
            Ok(Backend {
                identity: backend.clone(),
                documents: backend.clone(),
                blobs: backend,
            })
        }
    }
}

fn upload(args: UploadArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(&args.config).map_err(|e| e.to_string())?;

    let credentials_path = match &args.credentials {
        Some(path) => path.clone(),
        None => get_credentials_path()?,
    };
    let credentials = load_credentials(&credentials_path).map_err(|e| {
        format!(
            "Failed to load credentials file '{}': {}",
            credentials_path.display(),
            e
        )
    })?;

    let backend = build_backend(&config, &credentials)?;
    let guard = SessionGuard::new(
        Arc::clone(&backend.identity),
        single_email(config.authorized_email.trim()),
    );

    let (email, password) = match &args.email {
        Some(email) => {
            let password = std::env::var(PASSWORD_ENV)
                .map_err(|_| format!("{} must be set when --email is used", PASSWORD_ENV))?;
            (email.clone(), password)
        }
        None => {
            let login = get_login(&credentials, &config.login_profile)?;
            (login.email, login.password)
        }
    };

    println!("Signing in as {}", email.trim());
    let identity = guard.sign_in(&email, &password)?;
    println!("Signed in as {}", identity.email);

    let transcript = parse_transcript_file(&args.transcript)?;
    println!("Parsed {} transcript rows", transcript.len());

    let media = args.video.as_deref().map(MediaFile::open).transpose()?;
    let form = LessonForm {
        language: args.language,
        content_number: args.content_number,
        title: args.title,
        description: args.description,
        video_url: args.video_url,
        video_start: args.video_start,
        video_end: args.video_end,
    };
    let submission = form.validate(transcript, media)?;

    guard.authorize()?;
    let record = if args.dry_run {
        let store = MemoryStore::new();
        let record = run_upload(&store, &store, submission)?;
        let document = serde_json::Value::Object(document_to_json(&record.to_document()));
        println!("{}", serde_json::to_string_pretty(&document)?);
        println!("Dry run: {} writes recorded, nothing persisted", store.writes().len());
        record
    } else {
        run_upload(backend.documents.as_ref(), backend.blobs.as_ref(), submission)?
    };

    println!("Content uploaded successfully to {}", record.path());
    guard.sign_out()?;
    Ok(())
}

fn run_upload(
    documents: &dyn DocumentStore,
    blobs: &dyn BlobStore,
    submission: LessonSubmission,
) -> Result<ContentRecord, UploadError> {
    let uploader = LessonUploader::new(documents, blobs);
    let mut last_shown: Option<f64> = None;

    let result = uploader.submit(submission, &mut |percent| {
        let due = match last_shown {
            None => true,
            Some(prev) => percent - prev >= 1.0 || (percent >= 100.0 && prev < 100.0),
        };
        if due {
            print!("\rUpload is {:.0}% done", percent);
            let _ = std::io::stdout().flush();
            last_shown = Some(percent);
        }
    });

    if last_shown.is_some() {
        println!();
    }
    result
}

fn check_transcript(file: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let rows = parse_transcript_file(&file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{}: {} rows", file.display(), rows.len());
    for (i, row) in rows.iter().enumerate() {
        let timing = match &row.timing {
            TranscriptTiming::Span {
                start_time,
                end_time,
            } => format!("{} - {}", start_time, end_time),
            TranscriptTiming::Point { timestamp } => timestamp.clone(),
        };
        println!(
            "{:>4}. [{}] {} | {}",
            i + 1,
            timing,
            row.target_language,
            row.native_language
        );
    }
    Ok(())
}
