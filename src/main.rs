//! Sheetpad - a side-panel HTML editor fed by the selected spreadsheet cell.
//!
//! # Usage
//!
//! ```bash
//! sheetpad install
//! sheetpad session page.json --watch --preview-out preview.html
//! sheetpad save notes.html
//! sheetpad load
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use sheetpad::app::{CellInfo, KeyChord, Message, Panel};
use sheetpad::clock::{self, SharedClock};
use sheetpad::config::{
    BackupPolicy, ConfigFlags, Settings, clear_config_flags, global_config_path,
    load_config_flags, local_override_path, parse_flag_tokens, save_config_flags,
};
use sheetpad::editor::{EditorSurface, HtmlBuffer};
use sheetpad::gateway::StorageGateway;
use sheetpad::observer::{
    CellObserver, ObserverConfig, ObserverEvent, PageSnapshot, find_selected_cell, label,
};
use sheetpad::perf;
use sheetpad::preview::{FileSurface, PreviewRenderer, RenderSurface};
use sheetpad::protocol::{Origin, Request};
use sheetpad::router::{InstallReason, Router, RouterHandle, spawn};
use sheetpad::store::JsonFileStore;
use sheetpad::watcher::SnapshotWatcher;

/// Upper bound on how long the session loop sleeps between pumps.
const IDLE_POLL_MS: u64 = 25;

/// A side-panel HTML editor fed by the selected spreadsheet cell
#[derive(Parser, Debug)]
#[command(name = "sheetpad", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Storage file backing the background context
    #[arg(long, global = true, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Quiet period before the observer, editor and preview react
    #[arg(long, global = true, value_name = "MS")]
    debounce_ms: Option<u64>,

    /// How long the panel waits for a reply from the background context
    #[arg(long, global = true, value_name = "MS")]
    reply_timeout_ms: Option<u64>,

    /// Delay between checks for the spreadsheet grid
    #[arg(long, global = true, value_name = "MS")]
    probe_interval_ms: Option<u64>,

    /// Grid checks before the observer gives up
    #[arg(long, global = true, value_name = "N")]
    probe_attempts: Option<u32>,

    /// What the backup slot holds after a save
    #[arg(long, global = true, value_enum)]
    backup: Option<BackupPolicy>,

    /// Reload the last selected cell from storage on startup
    #[arg(long, global = true)]
    restore_cell: bool,

    /// Enable performance logging
    #[arg(long, global = true)]
    perf: bool,

    /// Write detailed protocol/render debug events to a file
    #[arg(long, global = true, value_name = "PATH")]
    render_debug_log: Option<PathBuf>,

    /// Save current command-line flags as defaults
    #[arg(long, global = true)]
    save: bool,

    /// Clear saved defaults
    #[arg(long, global = true)]
    clear: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed storage the way a fresh install does
    Install {
        #[arg(long, value_enum, default_value = "install")]
        reason: InstallReason,
    },
    /// Save HTML from FILE (or stdin) as the editor content
    Save {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Print the saved editor content
    Load {
        /// Print the whole record (content, backup, last saved) as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore the backup and print it
    Reset,
    /// Print the cell the background context last heard about
    Current,
    /// Print the letter label of 1-based column numbers
    Label {
        #[arg(required = true, value_parser = clap::value_parser!(u32).range(1..))]
        cols: Vec<u32>,
    },
    /// Detect the selected cell in a page snapshot
    Detect {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
    },
    /// Render the saved content to an HTML preview file
    Preview {
        #[arg(value_name = "OUT")]
        out: PathBuf,
    },
    /// Run a page observer and a side panel against a page snapshot
    Session(SessionArgs),
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Page snapshot (JSON) standing in for the spreadsheet tab
    #[arg(value_name = "SNAPSHOT")]
    snapshot: PathBuf,

    /// Keep running and re-detect whenever the snapshot changes
    #[arg(short, long)]
    watch: bool,

    /// Write the live preview to this HTML file
    #[arg(long, value_name = "PATH")]
    preview_out: Option<PathBuf>,

    /// Import each newly selected cell into the editor
    #[arg(long)]
    load_cell: bool,

    /// Tab id the page observer reports from
    #[arg(long, default_value_t = 1)]
    tab: u32,

    /// Panel shortcut to press once the panel is ready (repeatable)
    #[arg(long = "key", value_name = "CHORD")]
    keys: Vec<KeyChord>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let raw_args = std::env::args().collect::<Vec<_>>();
    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = parse_flag_tokens(&raw_args);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);

    perf::set_enabled(effective.perf);
    let render_debug_log_path = effective
        .render_debug_log
        .clone()
        .or_else(|| std::env::var_os("SHEETPAD_RENDER_DEBUG_LOG").map(PathBuf::from));
    if let Err(err) = perf::set_debug_log_path(render_debug_log_path.as_deref()) {
        eprintln!(
            "[warn] Failed to initialize render debug log {}: {}",
            render_debug_log_path
                .as_ref()
                .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string()),
            err
        );
    }

    let settings = Settings::from_flags(&effective);
    let clock = clock::system();

    // Commands that never touch the background context.
    match &cli.command {
        Command::Label { cols } => {
            for col in cols {
                println!("{col}\t{}", label::column_label(*col));
            }
            return Ok(());
        }
        Command::Detect { snapshot } => {
            let page = PageSnapshot::load(snapshot)?;
            match find_selected_cell(&page, clock.now_ms()) {
                Some(cell) => println!("{}", serde_json::to_string_pretty(&cell)?),
                None => println!("No cell selected"),
            }
            return Ok(());
        }
        _ => {}
    }

    let store = JsonFileStore::open(&settings.store_path)
        .with_context(|| format!("Failed to open store {}", settings.store_path.display()))?;
    let mut router = Router::new(store, clock.clone()).with_backup_policy(settings.backup);
    if settings.restore_cell && router.restore_selection()? {
        info!("restored last cell selection");
    }
    let ctx = spawn(router).context("Failed to start background context")?;
    let handle = ctx.handle();
    let mut gateway = StorageGateway::new(handle.clone(), settings.reply_timeout, clock.clone());

    match cli.command {
        Command::Install { reason } => handle.installed(reason)?,
        Command::Save { file } => {
            let content = read_input(file)?;
            let saved = gateway.save(&content)?;
            println!("Saved at {}", saved.timestamp);
        }
        Command::Load { json } => {
            let record = gateway.load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}", record.content);
            }
        }
        Command::Reset => println!("{}", gateway.reset()?.content),
        Command::Current => match gateway.current_cell()? {
            Some(cell) => println!("{}", serde_json::to_string_pretty(&cell)?),
            None => println!("No cell selected"),
        },
        Command::Preview { out } => {
            let record = gateway.load()?;
            let now = clock.now_ms();
            let mut renderer = PreviewRenderer::new(FileSurface::create(&out)?, settings.debounce_ms());
            renderer.update_content(record.content, now);
            renderer.tick(now + settings.debounce_ms());
            println!("{}", out.display());
        }
        Command::Session(args) => run_session(&handle, gateway, &settings, &clock, &args)?,
        Command::Label { .. } | Command::Detect { .. } => {}
    }

    // Let the router drain (and persist) everything sent to it.
    ctx.shutdown();
    Ok(())
}

fn read_input(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read stdin")?;
            Ok(content)
        }
    }
}

fn run_session(
    handle: &RouterHandle,
    gateway: StorageGateway,
    settings: &Settings,
    clock: &SharedClock,
    args: &SessionArgs,
) -> Result<()> {
    let page = PageSnapshot::load(&args.snapshot)?;
    let origin = Origin::tab(args.tab, page.url.clone());
    let mut observer = CellObserver::new(page, ObserverConfig::from(settings));
    let mut watcher = if args.watch {
        Some(SnapshotWatcher::new(&args.snapshot).with_context(|| {
            format!("Failed to watch {}", args.snapshot.display())
        })?)
    } else {
        None
    };

    let preview = match &args.preview_out {
        Some(path) => PreviewRenderer::new(FileSurface::create(path)?, settings.debounce_ms()),
        None => PreviewRenderer::detached(settings.debounce_ms()),
    };
    let mut panel = Panel::new(
        EditorSurface::new(HtmlBuffer::default(), settings.debounce_ms()),
        preview,
        gateway,
        Some(handle.subscribe()),
    );

    let now = clock.now_ms();
    panel.init(now);
    for chord in &args.keys {
        if !panel.handle_key(*chord, now) {
            warn!(%chord, "not a panel shortcut");
        }
    }
    let mut report = Report::default();
    if report.print(&panel, args.load_cell) {
        panel.dispatch(Message::LoadCell, now);
    }
    post_events(handle, &origin, observer.start(now))?;

    loop {
        let now = clock.now_ms();
        if let Some(event) = watcher.as_mut().and_then(SnapshotWatcher::poll) {
            match PageSnapshot::load(&args.snapshot) {
                Ok(page) => {
                    observer.replace_page(page);
                    observer.notify(&event, now);
                }
                Err(err) => warn!(error = %err, "keeping previous page snapshot"),
            }
        }
        post_events(handle, &origin, observer.tick(now))?;

        panel.pump(now);
        if report.print(&panel, args.load_cell) {
            panel.dispatch(Message::LoadCell, now);
        }

        if watcher.is_none() && observer.next_deadline().is_none() && is_settled(&panel) {
            // One round trip so the router has handled every post before
            // the last look at its broadcasts.
            handle.request(Request::GetCurrentCell, Origin::panel(), settings.reply_timeout)?;
            if !panel.pump(now) && is_settled(&panel) {
                break;
            }
            continue;
        }

        let wait = [observer.next_deadline(), panel.next_deadline()]
            .into_iter()
            .flatten()
            .min()
            .map_or(IDLE_POLL_MS, |deadline| {
                deadline.saturating_sub(now).clamp(1, IDLE_POLL_MS)
            });
        std::thread::sleep(Duration::from_millis(wait));
    }

    observer.destroy();
    report.print(&panel, false);
    info!(status = %panel.model().status.text, "session finished");
    Ok(())
}

/// Nothing pending in the editor or preview debounce.
fn is_settled<S: RenderSurface>(panel: &Panel<S>) -> bool {
    panel.editor().next_deadline().is_none() && panel.preview().next_deadline().is_none()
}

fn post_events(handle: &RouterHandle, origin: &Origin, events: Vec<ObserverEvent>) -> Result<()> {
    for event in events {
        if let ObserverEvent::GaveUp { attempts } = &event {
            warn!(attempts, "no spreadsheet grid found");
        }
        if let Some(request) = event.into_request() {
            handle.post(request, origin.clone())?;
        }
    }
    Ok(())
}

/// What the session has already printed.
#[derive(Debug, Default)]
struct Report {
    cell: Option<CellInfo>,
    last_toast: u64,
}

impl Report {
    /// Print the cell line and any new toasts. Returns `true` when a new
    /// cell should be imported.
    fn print<S: RenderSurface>(&mut self, panel: &Panel<S>, load_cell: bool) -> bool {
        let info = panel.model().cell_info();
        let mut import = false;
        if self.cell.as_ref() != Some(&info) {
            println!("cell: {} {}", info.label, info.preview);
            import = load_cell && panel.model().current_cell.is_some();
            self.cell = Some(info);
        }
        for toast in panel.model().toasts() {
            if toast.id > self.last_toast {
                println!("[{:?}] {}", toast.level, toast.message);
                self.last_toast = toast.id;
            }
        }
        import
    }
}
