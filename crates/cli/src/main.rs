//! Recipe Box CLI - drive the client stores from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Log in (password can also come from RB_PASSWORD)
//! rb login -e cook@example.com -p hunter2
//!
//! # Browse and search recipes
//! rb recipes list --search soup
//! rb recipes show r1
//!
//! # Manage favorites
//! rb favorites add r1
//!
//! # Fill the cart and place an order
//! rb cart add flour -n Flour -q 2 -u kg --price 1.99
//! rb cart checkout
//!
//! # Switch color scheme
//! rb theme toggle
//! ```
//!
//! # Environment Variables
//!
//! See `recipe_box_client::config` for the API and storage variables. Logging
//! honours `RUST_LOG` and `RB_LOG_FORMAT=json`; `SENTRY_DSN` enables error
//! reporting.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use recipe_box_client::{AppState, ClientConfig};
use recipe_box_core::Theme;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "rb")]
#[command(author, version, about = "Recipe Box command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and save the session
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "RB_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log in
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "RB_PASSWORD", hide_env_values = true)]
        password: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// End the saved session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Browse recipes
    Recipes {
        #[command(subcommand)]
        action: RecipeAction,
    },
    /// Manage favorite recipes
    Favorites {
        #[command(subcommand)]
        action: FavoriteAction,
    },
    /// Manage the shopping cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// List catalog collections
    Catalog {
        #[command(subcommand)]
        collection: CatalogCollection,
    },
    /// Read notifications
    Notifications {
        #[command(subcommand)]
        action: NotificationAction,
    },
    /// Show or change the color scheme
    Theme {
        #[command(subcommand)]
        action: Option<ThemeAction>,
    },
}

#[derive(Subcommand)]
enum RecipeAction {
    /// List recipes, optionally filtered server-side
    List {
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        /// Further narrow the listing locally by title
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Show one recipe
    Show { id: String },
    /// List recipes you authored
    Mine,
    /// Delete one of your recipes
    Delete { id: String },
}

#[derive(Subcommand)]
enum FavoriteAction {
    /// List favorites
    List,
    /// Add a recipe to favorites
    Add { id: String },
    /// Remove a recipe from favorites
    Remove { id: String },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart contents and totals
    Show,
    /// Add an ingredient (merges with an existing line)
    Add {
        /// Ingredient ID
        id: String,

        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        quantity: f64,

        #[arg(short, long, default_value = "")]
        unit: String,

        /// Unit price
        #[arg(long)]
        price: Option<String>,
    },
    /// Remove an ingredient
    Remove { id: String },
    /// Empty the cart
    Clear,
    /// Place an order for the cart
    Checkout,
}

#[derive(Subcommand)]
enum CatalogCollection {
    Ingredients,
    Categories,
    Nutrition,
    Orders,
}

#[derive(Subcommand)]
enum NotificationAction {
    /// List notifications
    List,
    /// Mark a notification as read
    Read { id: String },
}

#[derive(Subcommand)]
enum ThemeAction {
    /// Set the theme (`light`, `dark`, `system`)
    Set { theme: Theme },
    /// Flip between light and dark
    Toggle,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "recipe_box_client=info,recipe_box_cli=info".into());
    let json = std::env::var("RB_LOG_FORMAT").is_ok_and(|format| format == "json");

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter));
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::from_config(config).await?;

    match cli.command {
        Commands::Login { email, password } => {
            commands::auth::login(&state, &email, password).await?;
        }
        Commands::Register {
            email,
            password,
            name,
        } => commands::auth::register(&state, &email, password, name).await?,
        Commands::Logout => commands::auth::logout(&state).await?,
        Commands::Whoami => commands::auth::whoami(&state).await,
        Commands::Recipes { action } => match action {
            RecipeAction::List {
                search,
                category,
                filter,
            } => commands::recipes::list(&state, search, category, filter.as_deref()).await?,
            RecipeAction::Show { id } => commands::recipes::show(&state, &id).await?,
            RecipeAction::Mine => commands::recipes::mine(&state).await?,
            RecipeAction::Delete { id } => commands::recipes::delete(&state, &id).await?,
        },
        Commands::Favorites { action } => match action {
            FavoriteAction::List => commands::recipes::favorites(&state).await?,
            FavoriteAction::Add { id } => commands::recipes::favorite(&state, &id, true).await?,
            FavoriteAction::Remove { id } => {
                commands::recipes::favorite(&state, &id, false).await?;
            }
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&state).await,
            CartAction::Add {
                id,
                name,
                quantity,
                unit,
                price,
            } => commands::cart::add(&state, id, name, quantity, unit, price.as_deref()).await?,
            CartAction::Remove { id } => commands::cart::remove(&state, &id).await?,
            CartAction::Clear => commands::cart::clear(&state).await?,
            CartAction::Checkout => commands::cart::checkout(&state).await?,
        },
        Commands::Catalog { collection } => match collection {
            CatalogCollection::Ingredients => commands::catalog::ingredients(&state).await?,
            CatalogCollection::Categories => commands::catalog::categories(&state).await?,
            CatalogCollection::Nutrition => commands::catalog::nutrition(&state).await?,
            CatalogCollection::Orders => commands::catalog::orders(&state).await?,
        },
        Commands::Notifications { action } => match action {
            NotificationAction::List => commands::catalog::notifications(&state).await?,
            NotificationAction::Read { id } => {
                commands::catalog::mark_read(&state, &id).await?;
            }
        },
        Commands::Theme { action } => match action {
            None => commands::theme::show(&state).await,
            Some(ThemeAction::Set { theme }) => commands::theme::set(&state, theme).await?,
            Some(ThemeAction::Toggle) => commands::theme::toggle(&state).await?,
        },
    }
    Ok(())
}
