//! taskcard - Command-line client for the TaskCard notes API
//!
//! Create, search, favorite, and recolor task cards on a TaskCard server,
//! with a local snapshot cache so listings keep working when the server
//! is unreachable.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write as _};
use std::path::PathBuf;

use taskcard::api::{ApiClient, ApiError};
use taskcard::cache::CacheStore;
use taskcard::config::Config;
use taskcard::models::{CreateTaskRequest, RegisterRequest, Task, UpdateTaskRequest};
use taskcard::session::Session;
use taskcard::store::{StoreState, TaskStore};

#[derive(Parser)]
#[command(name = "taskcard")]
#[command(about = "Command-line client for the TaskCard notes API")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config file
    Init {
        /// Output path for the config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Log in and store the session
    Login {
        /// Account email
        email: String,
    },

    /// Create an account and log in
    Register {
        /// Display name
        name: String,
        /// Account email
        email: String,
    },

    /// Log out and clear the stored session
    Logout,

    /// Show the logged-in account
    Whoami,

    /// List task cards
    List {
        /// Page to load
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Server-side title search
        #[arg(short, long)]
        search: Option<String>,

        /// Show the favorites list instead
        #[arg(short, long)]
        favorites: bool,

        /// Keep only cards with this color id
        #[arg(long)]
        color: Option<i64>,

        /// Skip the freshness window and hit the server
        #[arg(short, long)]
        refresh: bool,
    },

    /// Show one card in full
    Show { id: i64 },

    /// Add a card
    Add {
        title: String,

        /// Card body
        content: String,

        /// Color id for the new card
        #[arg(long)]
        color: Option<i64>,
    },

    /// Edit a card's title, content, or color
    Edit {
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        content: Option<String>,

        #[arg(long)]
        color: Option<i64>,
    },

    /// Delete a card
    Rm { id: i64 },

    /// Toggle a card's favorite flag
    Fav { id: i64 },

    /// Move a card to another color
    Recolor { id: i64, color_id: i64 },

    /// List the color palette
    Colors,

    /// Interactive session
    Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("taskcard=warn".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output } => init_config(output),
        command => {
            let config = match cli.config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load()?,
            };

            match command {
                Commands::Init { .. } => unreachable!("handled above"),
                Commands::Login { email } => login(&config, &email).await,
                Commands::Register { name, email } => register(&config, &name, &email).await,
                Commands::Logout => logout(&config).await,
                Commands::Whoami => whoami(&config).await,
                Commands::List {
                    page,
                    search,
                    favorites,
                    color,
                    refresh,
                } => list(&config, page, search, favorites, color, refresh).await,
                Commands::Show { id } => show(&config, id).await,
                Commands::Add {
                    title,
                    content,
                    color,
                } => add(&config, title, content, color).await,
                Commands::Edit {
                    id,
                    title,
                    content,
                    color,
                } => edit(&config, id, title, content, color).await,
                Commands::Rm { id } => remove(&config, id).await,
                Commands::Fav { id } => favorite(&config, id).await,
                Commands::Recolor { id, color_id } => recolor(&config, id, color_id).await,
                Commands::Colors => colors(&config).await,
                Commands::Shell => shell(&config).await,
            }
        }
    }
}

fn init_config(output: Option<PathBuf>) -> Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::default();
    config.save_to(&path)?;

    println!("Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Point base_url at your TaskCard server's API root");
    println!("  2. Sign in: taskcard login <email>");
    println!("  3. List your cards: taskcard list");

    Ok(())
}

async fn login(config: &Config, email: &str) -> Result<()> {
    let mut api = ApiClient::new(&config.server)?;
    let password = prompt_secret("Password")?;

    let login = api.login(email, &password).await.map_err(fail)?;
    Session {
        token: Some(login.token),
        user: Some(login.user.clone()),
    }
    .save()?;

    println!("✅ Logged in as {} <{}>", login.user.name, login.user.email);
    Ok(())
}

async fn register(config: &Config, name: &str, email: &str) -> Result<()> {
    let mut api = ApiClient::new(&config.server)?;
    let password = prompt_secret("Password")?;
    let password_confirmation = prompt_secret("Confirm password")?;

    let request = RegisterRequest {
        name: name.to_string(),
        email: email.to_string(),
        password,
        password_confirmation,
    };
    let login = api.register(&request).await.map_err(fail)?;
    Session {
        token: Some(login.token),
        user: Some(login.user.clone()),
    }
    .save()?;

    println!("✅ Welcome, {}! You are now logged in.", login.user.name);
    Ok(())
}

async fn logout(config: &Config) -> Result<()> {
    let session = Session::load()?;
    if let Some(token) = session.token {
        let mut api = ApiClient::new(&config.server)?;
        api.set_token(Some(token));
        if let Err(err) = api.logout().await {
            tracing::warn!(error = %err, "Server-side logout failed, clearing locally");
        }
    }

    Session::clear()?;
    if let Ok(cache) = CacheStore::open(&config.cache.path)
        && let Err(err) = cache.clear()
    {
        tracing::warn!(error = %err, "Could not clear the snapshot cache");
    }

    println!("Logged out.");
    Ok(())
}

async fn whoami(config: &Config) -> Result<()> {
    let session = Session::load()?;
    if !session.is_logged_in() {
        println!("Not logged in.");
        return Ok(());
    }

    let mut api = ApiClient::new(&config.server)?;
    api.set_token(session.token.clone());
    match api.current_user().await {
        Ok(user) => println!("{} <{}> ({:?})", user.name, user.email, user.profile),
        Err(err) if err.is_unauthorized() => return Err(fail_session(err)),
        Err(err) => {
            tracing::warn!(error = %err, "Could not verify the session with the server");
            match session.user {
                Some(user) => println!("{} <{}> (cached)", user.name, user.email),
                None => println!("Logged in, but account details are unavailable offline."),
            }
        }
    }
    Ok(())
}

async fn list(
    config: &Config,
    page: u32,
    search: Option<String>,
    favorites: bool,
    color: Option<i64>,
    refresh: bool,
) -> Result<()> {
    let store = open_store(config)?;
    store.load_colors().await;

    if favorites {
        store.fetch_favorites(refresh).await;
        let state = store.state();
        check_session_expiry(&state)?;
        print_favorites(&state, color);
        return Ok(());
    }

    let search = search.unwrap_or_default();
    store.fetch_tasks(page, &search, refresh).await;
    let state = store.state();
    check_session_expiry(&state)?;
    print_page(&state, color);
    Ok(())
}

async fn show(config: &Config, id: i64) -> Result<()> {
    let api = open_api(config)?;
    let task = api.get_task(id).await.map_err(fail_session)?;
    print_task_full(&task);
    Ok(())
}

async fn add(config: &Config, title: String, content: String, color: Option<i64>) -> Result<()> {
    require_card_fields(&title, &content)?;
    let store = open_store(config)?;
    let request = CreateTaskRequest {
        title,
        content,
        color_id: color,
    };
    let task = store.create_task(&request).await.map_err(fail_session)?;
    println!("✅ Added #{} \"{}\"", task.id, task.title);
    Ok(())
}

async fn edit(
    config: &Config,
    id: i64,
    title: Option<String>,
    content: Option<String>,
    color: Option<i64>,
) -> Result<()> {
    if title.is_none() && content.is_none() && color.is_none() {
        anyhow::bail!("Nothing to change. Pass --title, --content, or --color.");
    }

    let store = open_store(config)?;
    let request = UpdateTaskRequest {
        title,
        content,
        color_id: color,
    };
    let task = store.update_task(id, &request).await.map_err(fail_session)?;
    println!("✅ Updated #{} \"{}\"", task.id, task.title);
    Ok(())
}

async fn remove(config: &Config, id: i64) -> Result<()> {
    let store = open_store(config)?;
    store.delete_task(id).await.map_err(fail_session)?;
    println!("✅ Deleted #{id}");
    Ok(())
}

async fn favorite(config: &Config, id: i64) -> Result<()> {
    let store = open_store(config)?;
    let favorited = store.toggle_favorite(id).await.map_err(fail_session)?;
    if favorited {
        println!("★ #{id} added to favorites");
    } else {
        println!("☆ #{id} removed from favorites");
    }
    Ok(())
}

async fn recolor(config: &Config, id: i64, color_id: i64) -> Result<()> {
    let store = open_store(config)?;
    let task = store.change_color(id, color_id).await.map_err(fail_session)?;
    println!("✅ #{} is now {}", task.id, task.color.name);
    Ok(())
}

async fn colors(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    store.load_colors().await;

    let state = store.state();
    if state.colors.is_empty() {
        println!("No colors available (server unreachable and nothing cached).");
    } else {
        for color in &state.colors {
            println!("{:>3}  {:<10} {}", color.id, color.name, color.hex_code);
        }
    }
    Ok(())
}

async fn shell(config: &Config) -> Result<()> {
    let api = open_api(config)?;
    let cache = open_cache(config)?;
    let store = TaskStore::new(api.clone(), cache, config);

    let session = Session::load()?;
    match session.user {
        Some(user) => println!(
            "TaskCard shell. Signed in as {}. Type 'help' for commands.",
            user.name
        ),
        None => println!("TaskCard shell. Type 'help' for commands."),
    }

    store.load_colors().await;
    store.fetch_tasks(1, "", false).await;
    let state = store.state();
    check_session_expiry(&state)?;
    print_page(&state, None);

    let stdin = io::stdin();
    loop {
        print!("taskcard> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        if let Err(err) = shell_command(&api, &store, line).await {
            eprintln!("⚠️  {err}");
        }
    }

    println!("Bye.");
    Ok(())
}

async fn shell_command(api: &ApiClient, store: &TaskStore, line: &str) -> Result<()> {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (line, ""),
    };

    match command {
        "help" => print_shell_help(),
        "list" => {
            let state = store.state();
            let page = if rest.is_empty() {
                state.current_page
            } else {
                rest.parse().context("page must be a number")?
            };
            store.fetch_tasks(page, &state.search_query, false).await;
            let state = store.state();
            check_session_expiry(&state)?;
            print_page(&state, None);
        }
        "search" => {
            store.set_search_query(rest);
            store.fetch_tasks(1, rest, false).await;
            let state = store.state();
            check_session_expiry(&state)?;
            print_page(&state, None);
        }
        "filter" => {
            let color_id = parse_id(rest)?;
            print_page(&store.state(), Some(color_id));
        }
        "favorites" => {
            store.fetch_favorites(false).await;
            let state = store.state();
            check_session_expiry(&state)?;
            print_favorites(&state, None);
        }
        "refresh" => {
            let state = store.state();
            store
                .fetch_tasks(state.current_page, &state.search_query, true)
                .await;
            let state = store.state();
            check_session_expiry(&state)?;
            print_page(&state, None);
        }
        "show" => {
            let id = parse_id(rest)?;
            let state = store.state();
            match state.tasks.iter().find(|task| task.id == id) {
                Some(task) => print_task_full(task),
                None => {
                    let task = api.get_task(id).await.map_err(fail_session)?;
                    print_task_full(&task);
                }
            }
        }
        "add" => {
            let Some((title, content)) = rest.split_once("::") else {
                anyhow::bail!("usage: add <title> :: <content>");
            };
            let (title, content) = (title.trim(), content.trim());
            require_card_fields(title, content)?;
            let request = CreateTaskRequest {
                title: title.to_string(),
                content: content.to_string(),
                color_id: None,
            };
            let task = store.create_task(&request).await.map_err(fail_session)?;
            println!("✅ Added #{} \"{}\"", task.id, task.title);
        }
        "rm" => {
            let id = parse_id(rest)?;
            store.delete_task(id).await.map_err(fail_session)?;
            println!("✅ Deleted #{id}");
        }
        "fav" => {
            let id = parse_id(rest)?;
            let favorited = store.toggle_favorite(id).await.map_err(fail_session)?;
            if favorited {
                println!("★ #{id} added to favorites");
            } else {
                println!("☆ #{id} removed from favorites");
            }
        }
        "recolor" => {
            let mut parts = rest.split_whitespace();
            let (Some(id), Some(color_id)) = (parts.next(), parts.next()) else {
                anyhow::bail!("usage: recolor <id> <color-id>");
            };
            let task = store
                .change_color(parse_id(id)?, parse_id(color_id)?)
                .await
                .map_err(fail_session)?;
            println!("✅ #{} is now {}", task.id, task.color.name);
        }
        "colors" => {
            store.load_colors().await;
            let state = store.state();
            if state.colors.is_empty() {
                println!("No colors available.");
            }
            for color in &state.colors {
                println!("{:>3}  {:<10} {}", color.id, color.name, color.hex_code);
            }
        }
        other => anyhow::bail!("unknown command '{other}', try 'help'"),
    }

    Ok(())
}

fn print_shell_help() {
    println!("Commands:");
    println!("  list [page]                  Show a page of cards");
    println!("  search <words>               Search titles server-side");
    println!("  filter <color-id>            Show only cards with a color");
    println!("  favorites                    Show the favorites list");
    println!("  show <id>                    Show one card in full");
    println!("  add <title> :: <content>     Create a card");
    println!("  rm <id>                      Delete a card");
    println!("  fav <id>                     Toggle favorite");
    println!("  recolor <id> <color-id>      Change a card's color");
    println!("  colors                       List the color palette");
    println!("  refresh                      Refetch the current page");
    println!("  quit                         Leave the shell");
}

fn open_api(config: &Config) -> Result<ApiClient> {
    let session = Session::load()?;
    if !session.is_logged_in() {
        anyhow::bail!("Not logged in. Run 'taskcard login <email>' first.");
    }

    let mut api = ApiClient::new(&config.server)?;
    api.set_token(session.token);
    Ok(api)
}

fn open_cache(config: &Config) -> Result<CacheStore> {
    match CacheStore::open(&config.cache.path) {
        Ok(cache) => Ok(cache),
        Err(err) => {
            tracing::warn!(error = %err, "Cache unavailable, continuing without persistence");
            CacheStore::open_in_memory()
        }
    }
}

fn open_store(config: &Config) -> Result<TaskStore> {
    let api = open_api(config)?;
    let cache = open_cache(config)?;
    Ok(TaskStore::new(api, cache, config))
}

fn prompt_secret(label: &str) -> Result<String> {
    // Plain stdin prompt; input is echoed
    print!("{label}: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .with_context(|| format!("'{raw}' is not an id"))
}

/// The server requires both fields; reject locally before the round-trip
fn require_card_fields(title: &str, content: &str) -> Result<()> {
    if title.trim().is_empty() || content.trim().is_empty() {
        anyhow::bail!("A card needs both a title and content.");
    }
    Ok(())
}

/// Print field-level validation messages and produce the final error
fn fail(err: ApiError) -> anyhow::Error {
    let detail = err.detail();
    if let Some(fields) = &detail.errors {
        for (field, messages) in fields {
            for message in messages {
                eprintln!("   {field}: {message}");
            }
        }
    }
    anyhow::anyhow!("{}", detail.message)
}

/// Like [`fail`], but an expired session is also discarded locally
fn fail_session(err: ApiError) -> anyhow::Error {
    if err.is_unauthorized() {
        if Session::clear().is_err() {
            tracing::warn!("Could not remove the stored session");
        }
        return anyhow::anyhow!("Session expired. Run 'taskcard login <email>' to sign in again.");
    }
    fail(err)
}

fn session_expired(state: &StoreState) -> bool {
    state
        .error
        .as_ref()
        .is_some_and(|error| error.status == Some(401))
}

/// Reads swallow failures into state; a swallowed 401 still ends the session
fn check_session_expiry(state: &StoreState) -> Result<()> {
    if session_expired(state) {
        if Session::clear().is_err() {
            tracing::warn!("Could not remove the stored session");
        }
        anyhow::bail!("Session expired. Run 'taskcard login <email>' to sign in again.");
    }
    Ok(())
}

fn print_task_line(task: &Task) {
    let star = if task.is_favorited { "★" } else { " " };
    println!("#{:<5} {} [{}] {}", task.id, star, task.color.name, task.title);
}

fn print_task_full(task: &Task) {
    let star = if task.is_favorited { " ★" } else { "" };
    println!("#{}{} {}", task.id, star, task.title);
    println!("Color: {} ({})", task.color.name, task.color.hex_code);
    if !task.content.is_empty() {
        println!();
        println!("{}", task.content);
    }
}

fn print_page(state: &StoreState, color: Option<i64>) {
    if let Some(error) = &state.error {
        eprintln!("⚠️  {error}");
        if !state.tasks.is_empty() {
            println!("(showing cached results)");
        }
    }

    let shown: Vec<&Task> = match color {
        Some(color_id) => state.tasks_with_color(color_id),
        None => state.tasks.iter().collect(),
    };

    if shown.is_empty() {
        println!("No cards.");
    } else {
        for task in shown {
            print_task_line(task);
        }
    }

    if !state.search_query.is_empty() {
        println!("Search: \"{}\"", state.search_query);
    }
    println!("Page {} of {}", state.current_page, state.total_pages);
}

fn print_favorites(state: &StoreState, color: Option<i64>) {
    if let Some(error) = &state.error {
        eprintln!("⚠️  {error}");
        if !state.favorites.is_empty() {
            println!("(showing cached results)");
        }
    }

    let shown: Vec<&Task> = match color {
        Some(color_id) => state
            .favorites
            .iter()
            .filter(|task| task.color_id == color_id)
            .collect(),
        None => state.favorites.iter().collect(),
    };

    if shown.is_empty() {
        println!("No favorites.");
    } else {
        for task in shown {
            print_task_line(task);
        }
    }
}
