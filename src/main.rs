use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use shashinkan::{Config, create_app_with_store, startup_checks, store::Store};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Global options that apply to all commands
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web server (default if no command specified)
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Automatically quit after specified number of seconds (useful for testing)
        #[arg(long)]
        quit_after: Option<u64>,
    },

    /// Manage users
    #[command(subcommand)]
    User(UserCommands),
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    /// List all users
    List,
    /// Add a new user
    Add {
        /// Email address (will be converted to lowercase)
        email: String,
        /// Initial password
        password: String,
        /// Grant the admin role
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set up logging first
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::User(user_cmd)) => handle_user_command(config, user_cmd).await,
        Some(Commands::Serve {
            port,
            host,
            quit_after,
        }) => run_server(config, port, host, quit_after).await,
        None => {
            // Default to serve command if no subcommand specified
            run_server(config, None, None, None).await
        }
    }
}

fn load_config(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
    if config_path.exists() {
        let config_content = std::fs::read_to_string(config_path)?;
        Ok(toml_edit::de::from_str::<Config>(&config_content)?)
    } else {
        info!("Config file not found at {:?}, using defaults", config_path);
        Ok(Config::default())
    }
}

async fn handle_user_command(
    config: Config,
    cmd: UserCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::connect(&config.database.url).await?;

    match cmd {
        UserCommands::List => {
            let users = store.list_users().await?;
            if users.is_empty() {
                println!("No users in database");
            } else {
                println!("Users in database:");
                for user in users {
                    println!("  {} ({}, {})", user.email, user.uuid, user.role);
                }
            }
        }
        UserCommands::Add {
            email,
            password,
            admin,
        } => {
            let email = email.trim().to_lowercase();
            if store.find_user_by_email(&email).await?.is_some() {
                eprintln!("Error: User '{}' already exists", email);
                std::process::exit(1);
            }

            let role = if admin { "admin" } else { "user" };
            let user = store.create_user(&email, &password, role).await?;
            println!("Added user '{}' with role '{}'", user.email, user.role);
        }
    }

    Ok(())
}

async fn run_server(
    config: Config,
    port: Option<u16>,
    host: Option<String>,
    quit_after: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = host.unwrap_or(config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    info!("Starting {} server", config.app.name);
    info!("Database: {}", config.database.url);
    info!("Storage root: {:?}", config.storage.root);

    let store = Store::connect(&config.database.url).await?;

    // Perform startup checks
    match startup_checks::perform_startup_checks(&config, &store).await {
        Ok(()) => info!("All startup checks passed"),
        Err(errors) => {
            for error in &errors {
                tracing::error!("Startup check failed: {}", error);
            }
            if errors.iter().any(|e| e.is_critical()) {
                tracing::error!("Critical startup check failed, exiting");
                return Err("Critical startup check failed".into());
            } else {
                tracing::warn!("Non-critical startup checks failed, continuing");
            }
        }
    }

    let app = create_app_with_store(config, store);

    let addr = SocketAddr::from((host.parse::<std::net::IpAddr>()?, port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Add ConnectInfo layer to track client IPs
    let app = app.into_make_service_with_connect_info::<SocketAddr>();

    // Set up graceful shutdown
    let server = axum::serve(listener, app);
    let graceful = server.with_graceful_shutdown(shutdown_signal(quit_after));

    if let Err(e) = graceful.await {
        tracing::error!("Server error: {}", e);
    }

    Ok(())
}

async fn shutdown_signal(quit_after: Option<u64>) {
    use tokio::signal;
    use tokio::time::{Duration, sleep};

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let quit_timer = async {
        if let Some(seconds) = quit_after {
            info!(
                "Server will automatically shut down after {} seconds",
                seconds
            );
            sleep(Duration::from_secs(seconds)).await;
            info!("Quit timer expired, shutting down");
        } else {
            std::future::pending::<()>().await
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        },
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        },
        _ = quit_timer => {},
    }
}
