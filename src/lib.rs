pub mod cli;
pub mod concerts;
pub mod config;
pub mod db;
pub mod firestore;
pub mod journal;
pub mod listing;
pub mod models;
pub mod remote;
pub mod scan;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod sync;
mod utils;

use std::{collections::HashSet, path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use chrono_tz::Tz;
use clap::Parser;

use cli::{Cli, Commands, JournalAction, JournalFields, SavedAction, ScannedAction};
use concerts::{SavedConcertStore, ScannedConcertStore};
use config::{AppConfig, ConfigStore};
use db::SqliteStorage;
use firestore::FirestoreClient;
use journal::JournalStore;
use models::{Concert, ConcertRecord, JournalDraft, JournalEntry};
use remote::RemoteConcertLookup;
use scan::{ScanOutcome, ScanService};
use scheduler::SyncScheduler;
use storage::{DetachedStorage, StoragePort};
use sync::SyncReconciler;

pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_secs()
        .try_init();
}

/// Everything a command needs, wired from config and local storage.
pub struct AppContext {
    pub config: AppConfig,
    pub saved: SavedConcertStore,
    pub scanned: ScannedConcertStore,
    pub journal: JournalStore,
}

impl AppContext {
    pub fn new(config: AppConfig, storage: Arc<dyn StoragePort>) -> Self {
        Self {
            config,
            saved: SavedConcertStore::new(Arc::clone(&storage)),
            scanned: ScannedConcertStore::new(Arc::clone(&storage)),
            journal: JournalStore::new(storage),
        }
    }

    pub fn open(config: AppConfig, storage_path: Option<PathBuf>) -> Self {
        let path = storage_path.unwrap_or_else(utils::storage_path);
        let storage: Arc<dyn StoragePort> = match SqliteStorage::open(&path) {
            Ok(storage) => Arc::new(storage),
            Err(err) => {
                log::warn!("local storage at {:?} unavailable, nothing will persist: {err}", path);
                Arc::new(DetachedStorage)
            }
        };
        Self::new(config, storage)
    }

    pub fn tz(&self) -> Tz {
        self.config.tz()
    }

    fn remote(&self) -> anyhow::Result<Arc<FirestoreClient>> {
        let client = FirestoreClient::from_config(&self.config)
            .context("remote concert store is not set up; set CONCERT_FIRESTORE_PROJECT")?;
        Ok(Arc::new(client))
    }

    pub fn reconciler<R: RemoteConcertLookup>(&self, remote: R) -> SyncReconciler<R> {
        let reconciler =
            SyncReconciler::new(remote, self.scanned.clone(), self.config.batch_size());
        if self.config.prune_saved_on_sync {
            reconciler.with_saved(self.saved.clone())
        } else {
            reconciler
        }
    }

    /// Scanned and saved concerts, deduplicated by id, scanned first.
    pub fn known_concerts(&self) -> Vec<ConcertRecord> {
        let mut seen = HashSet::new();
        self.scanned
            .list()
            .into_iter()
            .chain(self.saved.list())
            .filter(|record| seen.insert(record.id.clone()))
            .collect()
    }

    fn find_local(&self, id: &str) -> Option<ConcertRecord> {
        self.scanned
            .get(id)
            .or_else(|| self.saved.list().into_iter().find(|r| r.id == id))
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_store = match cli.config {
        Some(path) => ConfigStore::load_from(path),
        None => ConfigStore::load(),
    };
    let config = config_store.read().apply_env();
    let ctx = AppContext::open(config, cli.storage);

    match cli.command {
        Commands::Scan { payload } => scan(&ctx, &payload).await,
        Commands::Show { id } => show(&ctx, &id).await,
        Commands::Scanned { action } => {
            match action {
                ScannedAction::List => print_concerts(&ctx, &ctx.scanned.list()),
                ScannedAction::Clear => ctx.scanned.clear(),
            }
            Ok(())
        }
        Commands::Saved { action } => saved(&ctx, action).await,
        Commands::Journal { action } => journal(&ctx, action),
        Commands::Browse { past, query } => {
            let (upcoming, previous) =
                listing::partition(ctx.known_concerts(), Utc::now(), ctx.tz());
            let shown = if past { previous } else { upcoming };
            let shown = listing::search(shown, query.as_deref().unwrap_or(""));
            if shown.is_empty() {
                println!("No concerts found.");
            }
            print_concerts(&ctx, &shown);
            Ok(())
        }
        Commands::Sync { force } => sync_once(&ctx, force).await,
        Commands::Watch => watch(&ctx).await,
    }
}

async fn scan(ctx: &AppContext, payload: &str) -> anyhow::Result<()> {
    let service = ScanService::new(ctx.remote()?, ctx.scanned.clone());
    match service.handle_scan(payload).await? {
        ScanOutcome::Loaded { record, concert } => {
            print_concert(&record.id, &concert, ctx);
            Ok(())
        }
        ScanOutcome::NotFound(id) => {
            println!("No concert found for {id}. Try scanning another code.");
            Ok(())
        }
    }
}

async fn show(ctx: &AppContext, id: &str) -> anyhow::Result<()> {
    let remote = ctx.remote()?;
    match remote.fetch_by_id(id).await {
        Ok(Some(concert)) => print_concert(id, &concert, ctx),
        Ok(None) => bail!("no concert found with id {id}"),
        Err(err) => {
            let record = ctx
                .find_local(id)
                .ok_or_else(|| anyhow!("concert {id} unavailable: {err}"))?;
            log::warn!("showing cached copy of {id}: {err}");
            print_concerts(ctx, &[record]);
        }
    }
    Ok(())
}

async fn saved(ctx: &AppContext, action: SavedAction) -> anyhow::Result<()> {
    match action {
        SavedAction::List => {
            let concerts = ctx.saved.list_sorted(ctx.tz());
            if concerts.is_empty() {
                println!("No saved concerts yet.");
            }
            print_concerts(ctx, &concerts);
        }
        SavedAction::Add { id } => {
            let record = match ctx.find_local(&id) {
                Some(record) => record,
                None => ctx
                    .remote()?
                    .fetch_by_id(&id)
                    .await?
                    .map(|concert| concert.to_record(&id, Utc::now()))
                    .ok_or_else(|| anyhow!("no concert found with id {id}"))?,
            };
            ctx.saved.save(record);
            println!("Saved {id}.");
        }
        SavedAction::Remove { id } => ctx.saved.unsave(&id),
        SavedAction::Clear => ctx.saved.clear(),
    }
    Ok(())
}

fn journal(ctx: &AppContext, action: JournalAction) -> anyhow::Result<()> {
    match action {
        JournalAction::List => {
            let entries = ctx.journal.list();
            if entries.is_empty() {
                println!("No journal entries yet.");
            }
            for entry in entries {
                println!(
                    "{}  {}  {}  {}\n    {}",
                    entry.id,
                    stars(entry.rating),
                    entry.title,
                    entry.date,
                    entry.preview
                );
            }
        }
        JournalAction::Show { id } => {
            let entry = ctx
                .journal
                .get(&id)
                .ok_or_else(|| anyhow!("no journal entry {id}"))?;
            print_entry(&entry);
        }
        JournalAction::New { fields, concert } => {
            let base = match concert {
                Some(id) => match start_journal_for(ctx, &id)? {
                    JournalStart::Existing(entry) => {
                        let id = &entry.id;
                        println!("You already wrote about this concert; opening entry {id}.");
                        println!("Use `journal edit {id}` to change it.\n");
                        print_entry(&entry);
                        return Ok(());
                    }
                    JournalStart::Fresh(draft) => draft,
                },
                None => JournalDraft::default(),
            };
            let draft = merge_draft(base, fields);
            validate_draft(&draft)?;
            let entry = ctx.journal.create(draft);
            println!("Created journal entry {}.", entry.id);
        }
        JournalAction::Edit { id, fields } => {
            let current = ctx
                .journal
                .get(&id)
                .ok_or_else(|| anyhow!("no journal entry {id}"))?;
            let draft = merge_draft(draft_from(&current), fields);
            validate_draft(&draft)?;
            ctx.journal.edit(&id, draft);
            println!("Updated journal entry {id}.");
        }
        JournalAction::Delete { id } => ctx.journal.delete(&id),
    }
    Ok(())
}

enum JournalStart {
    Existing(JournalEntry),
    Fresh(JournalDraft),
}

/// Reopens the entry already written about a concert instead of starting a duplicate.
fn start_journal_for(ctx: &AppContext, concert_id: &str) -> anyhow::Result<JournalStart> {
    let record = ctx
        .find_local(concert_id)
        .ok_or_else(|| anyhow!("concert {concert_id} is not stored locally"))?;
    Ok(match ctx.journal.find_for_concert(&record) {
        Some(entry) => JournalStart::Existing(entry),
        None => JournalStart::Fresh(JournalDraft::for_concert(&record, ctx.tz())),
    })
}

fn draft_from(entry: &JournalEntry) -> JournalDraft {
    JournalDraft {
        title: entry.title.clone(),
        date: entry.date.clone(),
        venue: entry.venue.clone(),
        rating: entry.rating,
        content: entry.content.clone(),
    }
}

fn merge_draft(mut draft: JournalDraft, fields: JournalFields) -> JournalDraft {
    if let Some(title) = fields.title {
        draft.title = title;
    }
    if let Some(date) = fields.date {
        draft.date = date;
    }
    if let Some(venue) = fields.venue {
        draft.venue = venue;
    }
    if let Some(rating) = fields.rating {
        draft.rating = rating;
    }
    if let Some(content) = fields.content {
        draft.content = content;
    }
    draft
}

fn validate_draft(draft: &JournalDraft) -> anyhow::Result<()> {
    let missing: Vec<&str> = [
        ("title", &draft.title),
        ("date", &draft.date),
        ("venue", &draft.venue),
        ("content", &draft.content),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        bail!("journal entry needs {}", missing.join(", "))
    }
}

async fn sync_once(ctx: &AppContext, force: bool) -> anyhow::Result<()> {
    let reconciler = ctx.reconciler(ctx.remote()?);
    let now = Utc::now();
    let interval = chrono::Duration::from_std(ctx.config.sync_interval())
        .context("sync interval out of range")?;
    if !force && !reconciler.is_due(now, interval) {
        println!("Synced recently; use --force to sync anyway.");
        return Ok(());
    }
    let report = reconciler.reconcile(now).await;
    println!(
        "Checked {} concerts, removed {}{}.",
        report.checked,
        report.removed.len(),
        if report.failed_batches > 0 {
            format!(" ({} batches could not be verified)", report.failed_batches)
        } else {
            String::new()
        }
    );
    Ok(())
}

async fn watch(ctx: &AppContext) -> anyhow::Result<()> {
    let reconciler = Arc::new(ctx.reconciler(ctx.remote()?));
    let mut scheduler = SyncScheduler::new(reconciler, ctx.config.sync_interval());
    scheduler.start();
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    scheduler.stop().await;
    Ok(())
}

fn stars(rating: u8) -> String {
    let filled = usize::from(rating.min(models::MAX_RATING));
    format!(
        "{}{}",
        "★".repeat(filled),
        "☆".repeat(usize::from(models::MAX_RATING) - filled)
    )
}

fn print_concerts(ctx: &AppContext, concerts: &[ConcertRecord]) {
    let tz = ctx.tz();
    for concert in concerts {
        let badge = listing::month_badge(&concert.date, tz).unwrap_or("---");
        let saved = if ctx.saved.is_saved(&concert.id) { "*" } else { " " };
        println!(
            "{saved} [{badge}] #{}  {}  {}  @ {}  ({})",
            concert.display_color(),
            concert.title,
            concert.date,
            concert.venue,
            concert.id
        );
    }
}

fn print_concert(id: &str, concert: &Concert, ctx: &AppContext) {
    let saved = if ctx.saved.is_saved(id) { " (saved)" } else { "" };
    println!("{}{saved}", concert.title);
    println!("{}  @ {}", concert.date, concert.location);
    if let Some(group) = &concert.performance_group {
        println!("Presented by {group}");
    }
    if let Some(duration) = &concert.duration {
        println!("Duration: {duration}");
    }
    if !concert.programs.is_empty() {
        println!("\nProgram");
        for piece in &concert.programs {
            println!("  {}: {}", piece.composer, piece.piece);
            if let Some(notes) = &piece.notes {
                println!("      {notes}");
            }
        }
    }
    if !concert.performers.is_empty() {
        println!("\nPerformers");
        for performer in &concert.performers {
            match &performer.role {
                Some(role) => println!("  {} ({}, {role})", performer.name, performer.kind),
                None => println!("  {} ({})", performer.name, performer.kind),
            }
        }
    }
    if concert.has_sponsors() {
        println!("\nSponsors");
        println!("  {}", concert.sponsor_text.as_deref().unwrap_or_default());
    }
}

fn print_entry(entry: &JournalEntry) {
    println!("{}  {}", entry.title, stars(entry.rating));
    println!("{}  @ {}", entry.date, entry.venue);
    println!();
    println!("{}", entry.content);
}
