use anyhow::Result;
use clap::{Parser, Subcommand};
use kuttai::commands::{self, Command, Input};
use kuttai::config::{self, Settings, IMPORTED_MODEL_NAME};
use kuttai::profile::{ProfileStore, UserProfile};
use kuttai::session::ChatSession;
use kuttai::ui;
use kuttai_core::Error;
use kuttai_local::cache::ScrapeCache;
use kuttai_local::ollama::OllamaClient;
use kuttai_local::scraper::{Scraper, KTU_FALLBACK_PATHS};
use kuttai_local::url_guard::ALLOWED_DOMAINS;
use kuttai_local::{download, LocalFetcher};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "kuttai")]
#[command(about = "KuttAI: a terminal study assistant for KTU students", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Debug)]
struct GlobalArgs {
    /// Base directory for the profile and downloaded models.
    #[arg(long, env = "KUTTAI_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,
    /// Local model runtime (Ollama) base URL.
    #[arg(long, env = "KUTTAI_OLLAMA_BASE_URL", global = true)]
    ollama_base_url: Option<String>,
    /// Model name served by the runtime.
    #[arg(long, env = "KUTTAI_OLLAMA_MODEL", global = true)]
    ollama_model: Option<String>,
    /// Timeout for one model completion (ms).
    #[arg(long, env = "KUTTAI_LLM_TIMEOUT_MS", global = true)]
    llm_timeout_ms: Option<u64>,
    /// Timeout for one page fetch (ms).
    #[arg(long, env = "KUTTAI_FETCH_TIMEOUT_MS", global = true)]
    fetch_timeout_ms: Option<u64>,
}

impl GlobalArgs {
    fn settings(&self) -> Settings {
        let d = Settings::default();
        Settings {
            data_dir: self.data_dir.clone().unwrap_or(d.data_dir),
            ollama_base_url: self.ollama_base_url.clone().unwrap_or(d.ollama_base_url),
            ollama_model: self.ollama_model.clone().unwrap_or(d.ollama_model),
            llm_timeout_ms: self.llm_timeout_ms.unwrap_or(d.llm_timeout_ms),
            fetch_timeout_ms: self.fetch_timeout_ms.unwrap_or(d.fetch_timeout_ms),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive chat (the default).
    Chat,
    /// Fetch one allowlisted page and print what was extracted.
    Fetch(FetchCmd),
    /// Manage the local model file.
    #[command(subcommand)]
    Model(ModelCmd),
    /// Diagnose configuration issues (json).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct FetchCmd {
    /// URL on ecocee.in, ktu.edu.in or ktunotes.in (scheme optional).
    url: String,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(Subcommand, Debug)]
enum ModelCmd {
    /// Download the GGUF model file, trying each mirror layout in turn.
    Pull {
        /// Download again even if the file is already present.
        #[arg(long)]
        force: bool,
    },
    /// Print the model file that would be used.
    Path,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Probe the model runtime (`/api/tags`).
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_llm: bool,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

type StdinLines = tokio::io::Lines<BufReader<tokio::io::Stdin>>;

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let filter = tracing_subscriber::EnvFilter::try_from_env("KUTTAI_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

fn build_scraper(settings: &Settings) -> Result<Scraper> {
    let fetcher = LocalFetcher::new(settings.fetch_timeout_ms)?;
    Ok(Scraper::new(Arc::new(fetcher), ScrapeCache::new()).with_timeout_ms(settings.fetch_timeout_ms))
}

fn build_model(settings: &Settings) -> Result<OllamaClient> {
    let client = reqwest::Client::builder().build()?;
    Ok(OllamaClient::new(
        client,
        settings.ollama_base_url.clone(),
        settings.ollama_model.clone(),
        settings.llm_timeout_ms,
    ))
}

fn save_profile(store: &ProfileStore, profile: &UserProfile) {
    if let Err(e) = store.save(profile) {
        eprintln!("⚠️  Could not save user data: {e}");
    }
}

/// Print `prompt`, read one line. `None` on EOF.
async fn ask(lines: &mut StdinLines, prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?.map(|s| s.trim().to_string()))
}

async fn first_run_setup(lines: &mut StdinLines, profile: &mut UserProfile) -> Result<()> {
    println!("\n📝 Let's set up your KuttAI profile!");
    let questions = [
        "What's your name? ",
        "Which semester are you in? ",
        "What's your branch? ",
        "What are your academic interests? ",
    ];
    let mut answers: [String; 4] = Default::default();
    for (slot, q) in answers.iter_mut().zip(questions) {
        *slot = ask(lines, q).await?.unwrap_or_default();
    }
    profile.apply_edits(answers);
    profile.first_time = false;
    println!("✅ Profile setup complete!\n");
    Ok(())
}

async fn edit_profile(lines: &mut StdinLines, profile: &mut UserProfile) -> Result<()> {
    println!("\n📝 Edit your profile (press enter to keep current value):");
    let mut answers: [String; 4] = Default::default();
    let fields: Vec<(&str, String)> = profile
        .fields()
        .iter()
        .map(|(l, v)| (*l, v.to_string()))
        .collect();
    for (slot, (label, current)) in answers.iter_mut().zip(fields) {
        *slot = ask(lines, &format!("{label} [{current}]: "))
            .await?
            .unwrap_or_default();
    }
    profile.apply_edits(answers);
    println!("✅ Profile updated successfully!");
    Ok(())
}

async fn run_fetch_command(scraper: &Scraper, url: Option<String>) {
    let Some(url) = url else {
        println!("{}", commands::FETCH_USAGE);
        return;
    };
    let pb = ui::spinner("Fetching information");
    let res = scraper.fetch_for_command(&url).await;
    pb.finish_and_clear();
    match res {
        Ok(page) => println!("{}\n", commands::fetch_summary(&page)),
        Err(e) => println!("{}\n", ui::render_error("Failed to fetch", &e)),
    }
}

async fn run_chat(settings: Settings) -> Result<()> {
    println!("{}", ui::banner());

    let store = ProfileStore::new(settings.profile_path());
    let mut profile = store.load();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if profile.first_time {
        first_run_setup(&mut lines, &mut profile).await?;
        save_profile(&store, &profile);
    }

    let pb = ui::spinner("Initializing KuttAI");
    let model = build_model(&settings)?;
    let probe = model.list_models().await;
    pb.finish_and_clear();
    match probe {
        Ok(models) if models.iter().any(|m| m == model.model()) => {
            println!("✅ Using model: {}", model.model());
        }
        Ok(_) => {
            println!(
                "⚠️  Model {} is not available in the runtime. Run `ollama pull {}` \
                 or import the file from `kuttai model pull`.",
                model.model(),
                model.model()
            );
        }
        Err(e) => println!("{}", ui::render_error("Model runtime unreachable", &e)),
    }

    let scraper = build_scraper(&settings)?;
    let mut session = ChatSession::new(Arc::new(model), scraper);
    println!("\n✅ KuttAI initialized successfully!\n");
    println!("{}", commands::HELP_TEXT);

    loop {
        print!("{}❯{} ", ui::CYAN, ui::RESET);
        std::io::stdout().flush()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!("\n👋 Goodbye! See you soon, KTUian!");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match commands::parse(&line) {
            Input::Empty => continue,
            Input::Command(Command::Exit) => break,
            Input::Command(cmd) => {
                match cmd {
                    Command::Profile => println!("\n{}", commands::profile_text(&profile)),
                    Command::ProfileEdit => edit_profile(&mut lines, &mut profile).await?,
                    Command::ProfileUnknown(_) => {
                        println!("❌ Unknown profile command. Use /profile or /profile edit")
                    }
                    Command::Sites => println!("\n{}", commands::SITES_TEXT),
                    Command::Clear => {
                        session.clear();
                        println!("🗑️  Chat history cleared. Your profile data remains intact.");
                    }
                    Command::Help => println!("\n{}", commands::HELP_TEXT),
                    Command::Fetch(url) => run_fetch_command(session.scraper(), url).await,
                    Command::About => println!("\n{}", commands::about_text()),
                    Command::Unknown(name) => {
                        println!("❌ Unknown command: {name}");
                        println!("\n{}", commands::HELP_TEXT);
                    }
                    Command::Exit => break,
                }
                save_profile(&store, &profile);
            }
            Input::Chat(message) => {
                let pb = ui::spinner("KuttAI is thinking");
                let res = session.turn(&message, &profile).await;
                pb.finish_and_clear();
                match res {
                    Ok(reply) => println!("{}", ui::assistant_line(&reply.text)),
                    Err(e) => println!("{}", ui::render_error("Error generating response", &e)),
                }
            }
        }
    }

    println!("🔄 Saving your data...");
    save_profile(&store, &profile);
    println!("✅ Cleanup complete. Goodbye!");
    Ok(())
}

fn error_json(e: &Error) -> serde_json::Value {
    serde_json::json!({
        "message": e.to_string(),
        "hint": e.hint(),
    })
}

async fn run_fetch(settings: Settings, args: FetchCmd) -> Result<()> {
    let scraper = build_scraper(&settings)?;
    let res = scraper.fetch_for_command(&args.url).await;
    let text = args.output.eq_ignore_ascii_case("text");
    match res {
        Ok(page) if text => println!("{}", commands::fetch_summary(&page)),
        Ok(page) => println!(
            "{}",
            serde_json::json!({
                "schema_version": 1,
                "kind": "fetch",
                "ok": true,
                "page": page,
            })
        ),
        Err(e) => {
            if text {
                eprintln!("{}", ui::render_error("Failed to fetch", &e));
            } else {
                println!(
                    "{}",
                    serde_json::json!({
                        "schema_version": 1,
                        "kind": "fetch",
                        "ok": false,
                        "error": error_json(&e),
                    })
                );
            }
            std::process::exit(1);
        }
    }
    Ok(())
}

/// The GGUF file is only an import source; chat talks to whatever Ollama model is configured.
fn import_hint(settings: &Settings) -> String {
    format!(
        "💡 Chat currently uses the Ollama model `{}`, not this file. To chat with it, run `{}` \
         and set KUTTAI_OLLAMA_MODEL={IMPORTED_MODEL_NAME}.",
        settings.ollama_model,
        settings.import_command()
    )
}

async fn run_model_pull(settings: Settings, force: bool) -> Result<()> {
    let dest = settings.models_dir().join(download::MODEL_FILE_NAME);
    if dest.exists() && !force {
        println!(
            "{}",
            serde_json::json!({
                "schema_version": 1,
                "kind": "model_pull",
                "ok": true,
                "skipped": true,
                "path": dest.display().to_string(),
                "used_by_chat": settings.uses_imported_model(),
            })
        );
        if !settings.uses_imported_model() {
            eprintln!("{}", import_hint(&settings));
        }
        return Ok(());
    }

    let client = download::download_client(30_000)?;
    let urls = download::model_candidate_urls();
    let pb = ui::download_bar(None);
    pb.set_message("Downloading model");
    let res = download::download_first(&client, &urls, &dest, |n, total| {
        if let Some(t) = total {
            if pb.length() != Some(t) {
                pb.set_length(t);
            }
        }
        pb.set_position(n);
    })
    .await;
    pb.finish_and_clear();

    match res {
        Ok(got) => {
            let modelfile = settings.write_modelfile(&got.path)?;
            println!(
                "{}",
                serde_json::json!({
                    "schema_version": 1,
                    "kind": "model_pull",
                    "ok": true,
                    "skipped": false,
                    "path": got.path.display().to_string(),
                    "url": got.url,
                    "bytes": got.bytes,
                    "sha256": got.sha256,
                    "modelfile": modelfile.display().to_string(),
                    "import_command": settings.import_command(),
                    "used_by_chat": settings.uses_imported_model(),
                })
            );
            if !settings.uses_imported_model() {
                eprintln!("{}", import_hint(&settings));
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", ui::render_error("Could not download model", &e));
            eprintln!("\n💡 Manual download instructions:");
            eprintln!("1. Visit: {}", download::MODEL_REPO_URL);
            eprintln!("2. Download the .gguf model file");
            eprintln!("3. Save it to: {}", settings.models_dir().display());
            std::process::exit(1);
        }
    }
}

async fn run_doctor(settings: Settings, args: DoctorCmd) -> Result<()> {
    let t0 = std::time::Instant::now();
    let mut checks: Vec<serde_json::Value> = Vec::new();

    let data_ok = (|| -> anyhow::Result<()> {
        std::fs::create_dir_all(&settings.data_dir)?;
        let probe = settings.data_dir.join(format!(
            "kuttai-doctor-{}.probe",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis()
        ));
        std::fs::write(&probe, b"ok")?;
        let _ = std::fs::remove_file(&probe);
        Ok(())
    })()
    .is_ok();
    checks.push(serde_json::json!({
        "name": "data_dir_writable",
        "ok": data_ok,
        "message": if data_ok { "data dir is writable" } else { "data dir is not writable" },
        "hint": if data_ok { "" } else { "Set KUTTAI_DATA_DIR to a writable directory." },
    }));

    let model_file = settings.find_model_file();
    let used_by_chat = settings.uses_imported_model();
    checks.push(serde_json::json!({
        "name": "model_file",
        "ok": model_file.is_some(),
        "path": model_file.map(|p| p.display().to_string()),
        "role": "import_source",
        "used_by_chat": used_by_chat,
        "hint": if used_by_chat {
            format!("Chat uses the imported model `{}`.", settings.ollama_model)
        } else {
            format!(
                "Optional import source only; chat uses the Ollama model `{}`. \
                 After `kuttai model pull`, run `{}` and set KUTTAI_OLLAMA_MODEL={IMPORTED_MODEL_NAME}.",
                settings.ollama_model,
                settings.import_command()
            )
        },
    }));

    let llm_check = if args.check_llm {
        let t = std::time::Instant::now();
        let res = build_model(&settings)?.list_models().await;
        let elapsed_ms = t.elapsed().as_millis();
        match res {
            Ok(models) => {
                let has_model = models.iter().any(|m| m == &settings.ollama_model);
                serde_json::json!({
                    "name": "llm_runtime",
                    "ok": has_model,
                    "skipped": false,
                    "elapsed_ms": elapsed_ms,
                    "models": models,
                    "error": serde_json::Value::Null,
                })
            }
            Err(e) => serde_json::json!({
                "name": "llm_runtime",
                "ok": false,
                "skipped": false,
                "elapsed_ms": elapsed_ms,
                "models": [],
                "error": error_json(&e),
            }),
        }
    } else {
        serde_json::json!({
            "name": "llm_runtime",
            "ok": true,
            "skipped": true,
            "elapsed_ms": 0,
            "models": [],
            "error": serde_json::Value::Null,
        })
    };
    checks.push(llm_check);

    let ok = checks
        .iter()
        .filter(|c| c["name"] != "model_file")
        .all(|c| c["ok"].as_bool() == Some(true));
    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "kuttai",
        "version": env!("CARGO_PKG_VERSION"),
        "elapsed_ms": t0.elapsed().as_millis(),
        "configured": {
            "data_dir": settings.data_dir.display().to_string(),
            "models_dir": settings.models_dir().display().to_string(),
            "profile_path": settings.profile_path().display().to_string(),
            "ollama_base_url": settings.ollama_base_url,
            "ollama_model": settings.ollama_model,
            "llm_timeout_ms": settings.llm_timeout_ms,
            "fetch_timeout_ms": settings.fetch_timeout_ms,
            "allowed_domains": ALLOWED_DOMAINS,
            "fallback_paths": { "ktu.edu.in": KTU_FALLBACK_PATHS },
        },
        "checks": checks,
    });

    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("kuttai doctor: {}", if ok { "ok" } else { "issues found" });
            if let Some(arr) = payload["checks"].as_array() {
                for c in arr {
                    let name = c["name"].as_str().unwrap_or("?");
                    let ok = c["ok"].as_bool().unwrap_or(false);
                    println!("- {}: {}", name, if ok { "ok" } else { "fail" });
                }
            }
        }
        _ => println!("{payload}"),
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    if let Ok(p) = std::env::var("KUTTAI_ENV_FILE") {
        let p = p.trim();
        if !p.is_empty() {
            config::load_env_file(std::path::Path::new(p));
        }
    }

    let cli = Cli::parse();
    init_tracing();
    let settings = cli.global.settings();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(settings).await?,
        Commands::Fetch(args) => run_fetch(settings, args).await?,
        Commands::Model(ModelCmd::Pull { force }) => run_model_pull(settings, force).await?,
        Commands::Model(ModelCmd::Path) => match settings.find_model_file() {
            Some(p) => println!("{}", p.display()),
            None => {
                eprintln!(
                    "❌ No model file found in {}\n💡 Run `kuttai model pull`.",
                    settings.models_dir().display()
                );
                std::process::exit(1);
            }
        },
        Commands::Doctor(args) => run_doctor(settings, args).await?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "kuttai",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("kuttai {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}
