//! unimi-dl command line entry point.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use unimi_dl::config::{CliOverrides, Settings, load_file_config};
use unimi_dl::fetch::{Fetchers, destination_for, sanitize_component};
use unimi_dl::ledger::{DownloadLedger, LoadOutcome, RecordOptions, RecordOutcome};
use unimi_dl::page::{ArielPageParser, PageResolver};
use unimi_dl::platform::Platform;
use unimi_dl::session::{Credentials, SessionProvider};
use unimi_dl::tree::{Attachment, Catalog, Course};

mod cli;

use cli::{Args, PASSWORD_ENV};

/// One attachment selected for download, with its reserved destination.
struct Planned {
    course: String,
    attachment: Attachment,
    destination: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = load_file_config(args.config.as_deref())?;
    let settings = Settings::resolve(
        &CliOverrides {
            email: args.email.clone(),
            output_dir: args.output_dir.clone(),
        },
        file_config.as_ref(),
    );
    debug!(?settings, "settings resolved");

    let ledger = DownloadLedger::load(&settings.ledger_path)
        .await
        .context("Failed to read the download ledger")?;
    if let LoadOutcome::Corrupted { reason } = ledger.load_outcome() {
        warn!(path = %ledger.path().display(), %reason, "ignoring corrupted ledger; it will be rewritten on save");
    }

    if !args.needs_session() {
        return manage_ledger(&ledger, &args).await;
    }

    if args.platform != Platform::Ariel {
        bail!(
            "Course browsing is only supported for the ariel platform (got '{}')\n  Suggestion: Use --show-downloaded or --forget to manage {} entries",
            args.platform,
            args.platform
        );
    }

    let credentials = credentials(&settings)?;
    let sessions = Arc::new(SessionProvider::new(settings.session_config(), credentials));
    let resolver = Arc::new(
        PageResolver::new(Arc::clone(&sessions), Arc::new(ArielPageParser::new()))
            .with_retry_policy(settings.retry_policy())
            .with_max_concurrent_pages(settings.max_concurrent_pages),
    );
    let catalog = Catalog::with_url(Arc::clone(&resolver), settings.catalog_url.clone());

    let courses = select_courses(&catalog, args.course.as_deref()).await?;
    if courses.is_empty() {
        println!("No course matches the given filter.");
        return Ok(());
    }

    let mut selected = Vec::new();
    for course in &courses {
        let attachments = course
            .attachments(args.section.as_deref())
            .await
            .with_context(|| format!("Failed to read course '{}'", course.name()))?;
        info!(course = course.name(), attachments = attachments.len(), "course resolved");
        selected.push((Arc::clone(course), attachments));
    }

    if args.list {
        print_listing(&ledger, args.platform, &selected).await;
        return Ok(());
    }

    let plan = plan_downloads(&settings.output_dir, selected);
    if args.simulate {
        simulate(&ledger, args.platform, &plan, args.force).await;
        return Ok(());
    }

    let fetchers = Fetchers::for_session_with_retry(Arc::clone(&sessions), &settings.retry_policy());
    let options = RecordOptions {
        dry_run: args.add_to_downloaded_only,
        force: args.force,
    };
    let failed = run_downloads(&ledger, args.platform, &fetchers, plan, options, settings.concurrency, args.quiet).await;

    ledger.save().await.context("Failed to save the download ledger")?;
    info!(path = %ledger.path().display(), "ledger saved");

    if failed > 0 {
        bail!("{failed} download(s) failed; run again to retry them");
    }
    Ok(())
}

fn credentials(settings: &Settings) -> Result<Credentials> {
    let Some(email) = settings.email.clone() else {
        bail!("No login email given\n  Suggestion: Pass --email or set `email` in the config file");
    };
    let password = std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|value| !value.is_empty())
        .with_context(|| format!("No password given\n  Suggestion: Set the {PASSWORD_ENV} environment variable"))?;
    Ok(Credentials::new(email, password))
}

/// Handles the ledger-only commands, which never log in.
async fn manage_ledger(ledger: &DownloadLedger, args: &Args) -> Result<()> {
    let platform = args.platform;
    let Some(url) = &args.forget else {
        for url in ledger.urls(platform).await {
            println!("{url}");
        }
        return Ok(());
    };

    if ledger.forget(platform, url).await {
        ledger.save().await.context("Failed to save the download ledger")?;
        println!("Removed {url} from the {platform} ledger.");
    } else {
        println!("{url} is not recorded for {platform}.");
    }
    Ok(())
}

async fn select_courses(catalog: &Catalog, filter: Option<&str>) -> Result<Vec<Arc<Course>>> {
    let courses = catalog.courses().await.context("Failed to load the course list")?;
    let needle = filter.map(str::to_lowercase);
    Ok(courses
        .into_iter()
        .filter(|course| {
            needle
                .as_deref()
                .is_none_or(|needle| course.name().to_lowercase().contains(needle))
        })
        .collect())
}

async fn print_listing(ledger: &DownloadLedger, platform: Platform, selected: &[(Arc<Course>, Vec<Attachment>)]) {
    for (course, attachments) in selected {
        let teachers = course.teachers().join(", ");
        println!("{} [{}] {}", course.name(), course.edition(), teachers);
        for attachment in attachments {
            let mark = if ledger.is_downloaded(platform, attachment.url()).await {
                "*"
            } else {
                " "
            };
            println!("  {mark} {} / {attachment}", attachment.section_name());
        }
    }
}

/// Assigns each attachment a destination, keeping names unique within the run.
///
/// An attachment reachable from several sections is planned once, at its
/// first occurrence.
fn plan_downloads(output_dir: &Path, selected: Vec<(Arc<Course>, Vec<Attachment>)>) -> Vec<Planned> {
    let mut reserved = HashSet::new();
    let mut seen_urls = HashSet::new();
    let mut plan = Vec::new();
    for (course, attachments) in selected {
        let course_dir = output_dir.join(sanitize_component(course.name()));
        for attachment in attachments {
            if !seen_urls.insert(attachment.url().to_string()) {
                debug!(url = attachment.url(), "skipping duplicate attachment");
                continue;
            }
            let destination = reserve(&mut reserved, destination_for(&course_dir, &attachment));
            plan.push(Planned {
                course: course.name().to_string(),
                attachment,
                destination,
            });
        }
    }
    plan
}

fn reserve(reserved: &mut HashSet<PathBuf>, candidate: PathBuf) -> PathBuf {
    if reserved.insert(candidate.clone()) {
        return candidate;
    }
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = candidate
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let path = (1..)
        .map(|i| candidate.with_file_name(format!("{stem}_{i}{ext}")))
        .find(|path| !path.exists() && !reserved.contains(path))
        .unwrap_or_else(|| candidate.clone());
    reserved.insert(path.clone());
    path
}

async fn simulate(ledger: &DownloadLedger, platform: Platform, plan: &[Planned], force: bool) {
    let mut pending = 0usize;
    for item in plan {
        if !force && ledger.is_downloaded(platform, item.attachment.url()).await {
            continue;
        }
        pending += 1;
        println!(
            "would download {} / {} -> {}",
            item.course,
            item.attachment,
            item.destination.display()
        );
    }
    println!("{pending} attachment(s) would be downloaded.");
}

async fn run_downloads(
    ledger: &DownloadLedger,
    platform: Platform,
    fetchers: &Fetchers,
    plan: Vec<Planned>,
    options: RecordOptions,
    concurrency: usize,
    quiet: bool,
) -> usize {
    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(plan.len() as u64)
    };
    progress.set_style(
        ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let permits = Semaphore::new(concurrency.max(1));
    let recorded = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let (permits, progress_ref) = (&permits, &progress);
    let (recorded_ref, skipped_ref, failed_ref) = (&recorded, &skipped, &failed);
    join_all(plan.iter().map(move |item| async move {
        let Ok(_permit) = permits.acquire().await else {
            return;
        };
        progress_ref.set_message(item.attachment.name().to_string());
        match ledger
            .record_attempt(platform, &item.attachment, fetchers, &item.destination, options)
            .await
        {
            Ok(RecordOutcome::AlreadyDownloaded) => {
                skipped_ref.fetch_add(1, Ordering::SeqCst);
            }
            Ok(RecordOutcome::Recorded { .. } | RecordOutcome::DryRun) => {
                recorded_ref.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                failed_ref.fetch_add(1, Ordering::SeqCst);
                error!(course = %item.course, url = item.attachment.url(), error = %e, "download failed");
            }
        }
        progress_ref.inc(1);
    }))
    .await;

    progress.finish_and_clear();

    let verb = if options.dry_run { "marked" } else { "downloaded" };
    let failed = failed.load(Ordering::SeqCst);
    if !quiet {
        println!(
            "{} {verb}, {} already downloaded, {failed} failed.",
            recorded.load(Ordering::SeqCst),
            skipped.load(Ordering::SeqCst),
        );
    }
    failed
}
