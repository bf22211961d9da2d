mod workbench;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scenecast_contracts::events::EventWriter;
use scenecast_contracts::gallery::Gallery;
use scenecast_contracts::prompt::AspectRatio;
use scenecast_contracts::slots::Slot;
use scenecast_engine::session::{new_session_id, save_gallery_images, write_gallery_html};
use scenecast_engine::{EngineConfig, GoogleGenerationClient, Session};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::workbench::Workbench;

#[derive(Debug, Parser)]
#[command(
    name = "scenecast",
    version,
    about = "Compose scenes from reference images with Gemini and Imagen"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive workbench with slot, prompt and aspect-ratio controls.
    Chat(ChatArgs),
    /// Submit a single request and write the gallery.
    Run(RunArgs),
}

#[derive(Debug, Parser)]
struct ModelArgs {
    #[arg(long)]
    composition_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "1:1", value_parser = parse_aspect_ratio)]
    aspect_ratio: AspectRatio,
    #[arg(long)]
    char1: Option<PathBuf>,
    #[arg(long)]
    char2: Option<PathBuf>,
    #[arg(long)]
    char3: Option<PathBuf>,
    #[arg(long)]
    char4: Option<PathBuf>,
    #[arg(long)]
    bg: Option<PathBuf>,
    /// Load a character slot without including it in the request.
    #[arg(long, value_parser = parse_slot)]
    exclude: Vec<Slot>,
    #[command(flatten)]
    models: ModelArgs,
}

impl RunArgs {
    fn slot_paths(&self) -> [(Slot, Option<&Path>); 5] {
        [
            (Slot::Character1, self.char1.as_deref()),
            (Slot::Character2, self.char2.as_deref()),
            (Slot::Character3, self.char3.as_deref()),
            (Slot::Character4, self.char4.as_deref()),
            (Slot::Background, self.bg.as_deref()),
        ]
    }
}

fn parse_aspect_ratio(raw: &str) -> Result<AspectRatio, String> {
    raw.parse()
}

fn parse_slot(raw: &str) -> Result<Slot, String> {
    raw.parse()
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("scenecast error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Run(args) => run_once(args),
    }
}

fn build_session(out: &Path, events: Option<&Path>, models: &ModelArgs) -> Result<Session> {
    std::fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let config = EngineConfig::from_env()
        .with_composition_model(models.composition_model.clone())
        .with_image_model(models.image_model.clone());
    let client = GoogleGenerationClient::new(config)?;
    let events_path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out.join("events.jsonl"));
    Ok(Session::new(Box::new(client)).with_events(EventWriter::new(events_path, new_session_id())))
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let session = build_session(&args.out, args.events.as_deref(), &args.models)?;
    let mut workbench = Workbench::new(session, &args.out);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    workbench.run(stdin.lock(), &mut stdout)
}

fn run_once(args: RunArgs) -> Result<i32> {
    let mut session = build_session(&args.out, args.events.as_deref(), &args.models)?;
    for (slot, path) in args.slot_paths() {
        let Some(path) = path else {
            continue;
        };
        session
            .upload(slot, path)
            .with_context(|| format!("could not load the {} image", slot.label()))?;
        if slot.is_character() && !args.exclude.contains(&slot) {
            session.set_included(slot, true)?;
        }
    }
    session.set_prompt(args.prompt.clone());
    session.set_aspect_ratio(args.aspect_ratio);

    let submission = session.submit()?;
    for path in save_gallery_images(&submission.gallery, &args.out)? {
        println!("{}", path.display());
    }
    let gallery_path = write_gallery_html(&submission.gallery, &args.out)?;
    println!("{}", gallery_path.display());

    match &submission.gallery {
        Gallery::Error { message } => {
            eprintln!("{message}");
            Ok(2)
        }
        Gallery::Empty { message } => {
            eprintln!("{message}");
            Ok(0)
        }
        Gallery::Images(_) => Ok(0),
    }
}
