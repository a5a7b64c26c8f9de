use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use mingle::config::{self, EngineConfig};
use mingle::db;
use mingle::directory::Directory;
use mingle::graph::GraphWriter;
use mingle::ingest::Ingestor;
use mingle::mcp::McpServer;
use mingle::neo4j::Neo4jHttpStore;
use mingle::providers::{OpenAiEmbedder, OpenAiGenerator};
use mingle::tools::{Services, create_default_registry};
use mingle::types::{AiQueryRequest, PersonStatus, ProfileInput, QueryMode};
use mingle::{EngineClients, QueryEngine};

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "mingle")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Remember who you met: event check-in and network search")]
struct Cli {
    /// Directory holding `.mingle/` (defaults to the current directory)
    #[arg(short = 'p', long = "path", global = true)]
    path: Option<PathBuf>,
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Init,
    #[command(subcommand)]
    Event(EventCommand),
    Join(JoinArgs),
    Met(MetArgs),
    #[command(name = "met-list")]
    MetList(MetListArgs),
    Profile(ProfileArgs),
    /// Hide a person from search results without deleting them
    Deactivate(DeactivateArgs),
    Query(QueryArgs),
    Backfill,
    Serve(ServeArgs),
}

#[derive(Debug, Subcommand)]
enum EventCommand {
    Create(EventCreateArgs),
}

#[derive(Debug, Args)]
struct EventCreateArgs {
    name: String,
    #[arg(long = "date")]
    date: Option<String>,
    #[arg(long = "location", default_value = "")]
    location: String,
    #[arg(long = "capacity")]
    capacity: Option<u32>,
}

#[derive(Debug, Args)]
struct ProfileFields {
    #[arg(long = "name")]
    name: String,
    #[arg(long = "email", default_value = "")]
    email: String,
    #[arg(long = "company", default_value = "")]
    company: String,
    #[arg(long = "job-title", default_value = "")]
    job_title: String,
    #[arg(long = "bio", default_value = "")]
    bio: String,
    #[arg(long = "interests", default_value = "")]
    interests: String,
}

impl From<ProfileFields> for ProfileInput {
    fn from(fields: ProfileFields) -> Self {
        Self {
            name: fields.name,
            email: fields.email,
            company: fields.company,
            job_title: fields.job_title,
            bio: fields.bio,
            interests: fields.interests,
        }
    }
}

#[derive(Debug, Args)]
struct JoinArgs {
    token: String,
    #[command(flatten)]
    profile: ProfileFields,
}

#[derive(Debug, Args)]
struct MetArgs {
    user_a: String,
    user_b: String,
    #[arg(short = 'n', long = "note", default_value = "")]
    note: String,
    #[arg(short = 'e', long = "event")]
    event: Option<String>,
}

#[derive(Debug, Args)]
struct MetListArgs {
    user: String,
    #[arg(short = 'j', long = "json")]
    json: bool,
}

#[derive(Debug, Args)]
struct ProfileArgs {
    user: String,
    #[command(flatten)]
    profile: ProfileFields,
}

#[derive(Debug, Args)]
struct DeactivateArgs {
    user: String,
    /// Make the person searchable again
    #[arg(long = "undo")]
    undo: bool,
}

#[derive(Debug, Args)]
struct QueryArgs {
    query: String,
    #[arg(short = 'm', long = "mode", default_value = "auto")]
    mode: String,
    #[arg(short = 'u', long = "user")]
    user: Option<String>,
    #[arg(short = 'j', long = "json")]
    json: bool,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long = "mcp")]
    mcp: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let project_root = resolve_project_root(cli.path);

    let log_dir = db::data_dir(&project_root).join("logs");
    let _guard = mingle::logging::init(
        is_initialized(&project_root).then_some(log_dir.as_path()),
        cli.verbose,
    );

    match cli.command {
        Command::Init => run_init(&project_root),
        Command::Event(EventCommand::Create(args)) => run_event_create(&project_root, args).await,
        Command::Join(args) => run_join(&project_root, args).await,
        Command::Met(args) => run_met(&project_root, args).await,
        Command::MetList(args) => run_met_list(&project_root, args).await,
        Command::Profile(args) => run_profile(&project_root, args).await,
        Command::Deactivate(args) => run_deactivate(&project_root, args).await,
        Command::Query(args) => run_query(&project_root, args).await,
        Command::Backfill => run_backfill(&project_root).await,
        Command::Serve(args) => {
            if args.mcp {
                let services = build_services(&project_root);
                let server = McpServer::new(create_default_registry(Arc::new(services)));
                if let Err(err) = server.start().await {
                    fail(&format!("MCP server stopped: {err}"));
                }
            } else {
                println!("Use --mcp to start the MCP server.");
            }
        }
    }
}

fn run_init(project_root: &Path) {
    if is_initialized(project_root) {
        eprintln!("mingle already initialized in {}", project_root.display());
        return;
    }

    let cfg = EngineConfig::default();
    if let Err(err) = config::save_config(project_root, &cfg) {
        fail(&format!("Failed to write config: {err}"));
    }
    if let Err(err) = db::initialize_database(project_root) {
        fail(&format!("Failed to initialize database: {err}"));
    }

    println!("Initialized mingle in {}", project_root.display());
}

async fn run_event_create(project_root: &Path, args: EventCreateArgs) {
    let (_, ingestor) = build_parts(project_root);
    match ingestor
        .create_event(&args.name, args.date, &args.location, args.capacity)
        .await
    {
        Ok(event) => {
            println!("Created event {} ({})", event.name, event.id);
            println!("Join token: {}", event.join_token);
        }
        Err(err) => fail(&format!("Failed to create event: {err}")),
    }
}

async fn run_join(project_root: &Path, args: JoinArgs) {
    let (_, ingestor) = build_parts(project_root);
    match ingestor.join_event(&args.token, args.profile.into()).await {
        Ok(outcome) if outcome.newly_joined => {
            println!("{} joined {} (id {})", outcome.person.name, outcome.event.name, outcome.person.id);
        }
        Ok(outcome) => {
            println!("{} had already joined {}", outcome.person.name, outcome.event.name);
        }
        Err(err) => fail(&format!("Failed to join event: {err}")),
    }
}

async fn run_met(project_root: &Path, args: MetArgs) {
    let (_, ingestor) = build_parts(project_root);
    match ingestor
        .record_meeting(&args.user_a, &args.user_b, &args.note, args.event)
        .await
    {
        Ok(meeting) => println!("Recorded meeting between {} and {}", meeting.from, meeting.to),
        Err(err) => fail(&format!("Failed to record meeting: {err}")),
    }
}

async fn run_met_list(project_root: &Path, args: MetListArgs) {
    let cfg = load_config(project_root);
    let directory = open_directory(project_root, &cfg);
    let contacts = directory
        .list_met(&args.user)
        .await
        .unwrap_or_else(|err| fail(&format!("Failed to list meetings: {err}")));

    if args.json {
        print_json(&contacts);
        return;
    }

    if contacts.is_empty() {
        println!("No meetings recorded.");
        return;
    }
    for contact in contacts {
        let role = describe_role(&contact.person.job_title, &contact.person.company);
        println!("{}{}", contact.person.name, role);
        if !contact.note.is_empty() {
            println!("  {}", contact.note);
        }
    }
}

async fn run_profile(project_root: &Path, args: ProfileArgs) {
    let (_, ingestor) = build_parts(project_root);
    match ingestor.update_profile(&args.user, args.profile.into()).await {
        Ok(person) => println!("Updated profile for {}", person.name),
        Err(err) => fail(&format!("Failed to update profile: {err}")),
    }
}

async fn run_deactivate(project_root: &Path, args: DeactivateArgs) {
    let cfg = load_config(project_root);
    let directory = open_directory(project_root, &cfg);
    let status = if args.undo {
        PersonStatus::Active
    } else {
        PersonStatus::Inactive
    };

    match directory.set_status(&args.user, status).await {
        Ok(true) if args.undo => println!("Reactivated {}", args.user),
        Ok(true) => println!("Deactivated {}", args.user),
        Ok(false) => fail(&format!("No person with id {}", args.user)),
        Err(err) => fail(&format!("Failed to update status: {err}")),
    }
}

async fn run_query(project_root: &Path, args: QueryArgs) {
    let mode = args
        .mode
        .parse::<QueryMode>()
        .unwrap_or_else(|err| fail(&err.to_string()));
    let (engine, _) = build_parts(project_root);

    let request = AiQueryRequest {
        query: args.query,
        mode,
        user_id: args.user,
    };
    let response = engine
        .query(&request)
        .await
        .unwrap_or_else(|err| fail(&format!("Query failed: {err}")));

    if args.json {
        print_json(&response);
        return;
    }

    println!("{} [{}]", response.summary, response.mode_used.as_str());
    for result in &response.results {
        let role = describe_role(&result.job_title, &result.company);
        println!("- {}{}", result.name, role);
        if !result.why.is_empty() {
            println!("  {}", result.why);
        }
    }
}

async fn run_backfill(project_root: &Path) {
    let (_, ingestor) = build_parts(project_root);
    let pending = ingestor
        .directory()
        .persons_without_profile_vector()
        .await
        .unwrap_or_else(|err| fail(&format!("Failed to read directory: {err}")));

    if pending.is_empty() {
        println!("All persons already have vectors.");
        return;
    }

    let progress = ProgressBar::new(pending.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
        progress.set_style(style);
    }

    let report = ingestor
        .backfill_vectors(|person| {
            progress.set_message(person.name.clone());
            progress.inc(1);
        })
        .await
        .unwrap_or_else(|err| fail(&format!("Backfill failed: {err}")));
    progress.finish_and_clear();

    println!(
        "Embedded {}, skipped {}, failed {}",
        report.embedded, report.skipped, report.failed
    );
}

fn build_services(project_root: &Path) -> Services {
    let (engine, ingestor) = build_parts(project_root);
    Services { engine, ingestor }
}

fn build_parts(project_root: &Path) -> (QueryEngine, Ingestor) {
    let cfg = load_config(project_root);
    let directory = open_directory(project_root, &cfg);

    let Ok(api_key) = std::env::var(config::ENV_API_KEY) else {
        fail(&format!("{} is not set", config::ENV_API_KEY))
    };
    let neo4j_password = std::env::var(config::ENV_NEO4J_PASSWORD).ok();

    // Transport-level ceiling so a stalled socket cannot outlive the stage timeouts.
    let client = reqwest::Client::builder()
        .timeout(cfg.generation_timeout().max(cfg.graph_timeout()))
        .build()
        .unwrap_or_else(|err| fail(&format!("Failed to build HTTP client: {err}")));
    let embedder = Arc::new(OpenAiEmbedder::new(client.clone(), &cfg, api_key.clone()));
    let model = Arc::new(OpenAiGenerator::new(client.clone(), &cfg, api_key));
    let graph = Arc::new(Neo4jHttpStore::new(client, &cfg, neo4j_password));
    let shared = Arc::new(directory.clone());

    let engine = QueryEngine::new(
        EngineClients {
            embedder: embedder.clone(),
            model,
            index: shared.clone(),
            profiles: shared,
            graph: graph.clone(),
        },
        &cfg,
    );
    let writer: Arc<dyn GraphWriter> = graph;
    let ingestor = Ingestor::new(directory, embedder, Some(writer));
    (engine, ingestor)
}

fn load_config(project_root: &Path) -> EngineConfig {
    let mut cfg = config::load_config(project_root)
        .unwrap_or_else(|err| fail(&format!("Failed to load config: {err}")));
    cfg.apply_env_overrides();
    cfg
}

fn open_directory(project_root: &Path, cfg: &EngineConfig) -> Directory {
    if !is_initialized(project_root) {
        fail(&format!(
            "mingle not initialized in {}. Run 'mingle init' first.",
            project_root.display()
        ));
    }
    Directory::open(project_root, cfg.embedding_dimensions)
        .unwrap_or_else(|err| fail(&format!("Failed to open directory: {err}")))
}

fn describe_role(job_title: &str, company: &str) -> String {
    match (job_title.is_empty(), company.is_empty()) {
        (false, false) => format!(" ({job_title} at {company})"),
        (false, true) => format!(" ({job_title})"),
        (true, false) => format!(" ({company})"),
        (true, true) => String::new(),
    }
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => fail(&format!("Failed to encode output: {err}")),
    }
}

fn resolve_project_root(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn is_initialized(project_root: &Path) -> bool {
    db::database_path(project_root).is_file()
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}
