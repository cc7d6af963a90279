//! termsurface - a terminal session driven through a headless host surface.
//!
//! Runs a command on a pseudo-terminal through the same reader/renderer
//! pipeline an editor host would use, then prints the final screen.
//!
//! ```text
//! termsurface [--rows N] [--cols N] [--tag TAG] [--title TITLE] [-- command...]
//! ```

mod headless;

use anyhow::{bail, Context, Result};
use headless::HeadlessSurface;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use terminal::{CommandSpec, NativeBackend, Registry, Session, SessionOptions, SurfaceId, TermSize};
use tracing::{debug, error, info};

/// How long the main loop waits for tasks before checking for completion.
const MAIN_LOOP_TICK: Duration = Duration::from_millis(100);

/// Parsed command line.
#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    rows: Option<u16>,
    cols: Option<u16>,
    tag: Option<String>,
    title: Option<String>,
    command: Vec<String>,
}

impl Args {
    fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--rows" => parsed.rows = Some(parse_dimension("--rows", args.next())?),
                "--cols" => parsed.cols = Some(parse_dimension("--cols", args.next())?),
                "--tag" => parsed.tag = Some(args.next().context("--tag needs a value")?),
                "--title" => parsed.title = Some(args.next().context("--title needs a value")?),
                "--" => {
                    parsed.command.extend(args);
                    break;
                }
                other if other.starts_with("--") => bail!("Unknown option: {}", other),
                _ => {
                    parsed.command.push(arg);
                    parsed.command.extend(args);
                    break;
                }
            }
        }
        Ok(parsed)
    }
}

fn parse_dimension(flag: &str, value: Option<String>) -> Result<u16> {
    let value = value.with_context(|| format!("{} needs a value", flag))?;
    let n: u16 = value
        .parse()
        .with_context(|| format!("Invalid {} value: {:?}", flag, value))?;
    if n == 0 {
        bail!("{} must be positive", flag);
    }
    Ok(n)
}

/// Check if debug mode is enabled via environment variable.
fn is_debug_mode() -> bool {
    std::env::var("TERMSURFACE_DEBUG").is_ok()
}

/// Initialize the logging system. Logs go to stderr; stdout carries the screen.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if is_debug_mode() || cfg!(debug_assertions) {
        "termsurface=debug,terminal=debug,settings=debug,warn"
    } else {
        "termsurface=info,terminal=info,warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();

    debug!("termsurface v{} starting up", env!("CARGO_PKG_VERSION"));
}

/// Forward stdin lines to the session until either side goes away.
fn forward_stdin(session: Arc<Session>) {
    let spawned = std::thread::Builder::new()
        .name("termsurface-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if let Err(e) = session.send_string(&format!("{}\n", line), true) {
                    debug!("Stopped forwarding stdin: {}", e);
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        error!("Failed to spawn stdin thread: {}", e);
    }
}

fn run() -> Result<i32> {
    let args = Args::parse(std::env::args().skip(1))?;

    settings::ensure_config_file();
    let config = settings::load_config();

    let size = TermSize::new(
        args.rows.unwrap_or(config.default_rows),
        args.cols.unwrap_or(config.default_columns),
    );

    let mut options = SessionOptions::from_config(&config, CommandSpec::new(args.command));
    options.tag = args.tag;
    options.title = args.title;
    if options.image_dir.is_none() {
        let dir = termsurface_paths::images_dir();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create image directory: {:?}", dir))?;
        options.image_dir = Some(dir.clone());
    }

    let surface = Arc::new(HeadlessSurface::new(SurfaceId(1), size));
    let (main, main_loop) = terminal::main_thread();
    let backend = NativeBackend::new(config.term.clone());

    let session = Session::open(surface.clone(), &backend, main, Registry::global(), options)?;
    info!(size = %session.size(), "Session started");
    forward_stdin(session.clone());

    while !surface.is_finished() {
        main_loop.run_for(MAIN_LOOP_TICK);
    }

    let lines = session.with_screen(|screen| screen.display_lines());
    let end = lines.iter().rposition(|line| !line.is_empty()).map_or(0, |i| i + 1);
    for line in &lines[..end] {
        println!("{}", line);
    }
    println!("{}", surface.appended_text().trim_start_matches('\n'));

    debug!(
        renders = surface.render_count(),
        overlays = surface.overlay_count(),
        "Session finished"
    );
    Ok(session.exit_status().unwrap_or(1))
}

fn main() {
    init_logging();

    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    std::process::exit(code);
}
