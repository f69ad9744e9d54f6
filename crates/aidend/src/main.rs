use aidend::{
    chat_once, is_process_alive, read_pid_file, remove_pid_file, switch_config, write_pid_file,
};
use aiden_config::AppConfig;
use aiden_host::auth::{load_or_create_token, regenerate_token};
use aiden_host::rest::health::init_start_time;
use aiden_host::{build_router, AppState, Host};
use aiden_proto::TransportMode;
use aiden_store::Store;
use aiden_transport::{install_global, TransportSwitch};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "aidend", version = aidend::DAEMON_VERSION, about = "AIDEN host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host and its HTTP surface in the foreground
    Run {
        /// Port to bind to (overrides config)
        #[arg(long)]
        port: Option<u16>,
        /// Serve without requiring a bearer token
        #[arg(long)]
        no_auth: bool,
    },
    /// Check whether a host is running
    Status,
    /// Send one prompt and stream the reply
    Chat {
        prompt: String,
        /// local, remote or hybrid (defaults to config)
        #[arg(long)]
        mode: Option<TransportMode>,
    },
    /// Generate a new auth token
    Token,
    /// Print version
    Version,
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aidend=info,aiden_host=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { port, no_auth } => {
            let mut config = AppConfig::load()?;
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;
            let paths = config.paths()?;
            let pid_path = paths.pid_path();

            if let Some(pid) = read_pid_file(&pid_path) {
                if is_process_alive(pid) && pid != std::process::id() {
                    anyhow::bail!("Host already running (PID {}).", pid);
                }
                tracing::warn!("Removing stale PID file for dead process {}", pid);
                remove_pid_file(&pid_path);
            }

            paths.ensure_config_dir()?;
            write_pid_file(&pid_path)?;

            let token = if no_auth {
                None
            } else {
                Some(
                    config
                        .auth_token
                        .clone()
                        .unwrap_or_else(|| load_or_create_token(&paths)),
                )
            };

            let store = Arc::new(Store::open(&config.database_path()?)?);
            let host = Host::new(&config, store);
            host.reconcile().await;
            init_start_time();

            let addr: SocketAddr = config.server.bind_addr().parse()?;
            println!("AIDEN host running...");
            println!();
            println!("  API:   http://{}", addr);
            match &token {
                Some(token) => println!("  Token: {}", token),
                None => println!("  Token: (none, auth disabled)"),
            }
            println!();

            let state = AppState::new(host.clone(), config.server.clone(), token.as_deref());
            let app = build_router(state);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!("Listening on {}", addr);

            let shutdown = async move {
                shutdown_signal().await;
                tracing::info!("Shutting down...");
                host.shutdown().await;
                remove_pid_file(&pid_path);
            };
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await?;
            Ok(())
        }

        Commands::Status => {
            let config = AppConfig::load()?;
            let paths = config.paths()?;
            match read_pid_file(&paths.pid_path()) {
                Some(pid) if is_process_alive(pid) => println!("Host is running (PID {})", pid),
                Some(pid) => {
                    println!("Host is not running (stale PID {})", pid);
                    remove_pid_file(&paths.pid_path());
                }
                None => println!("No local host PID file"),
            }

            let url = format!("{}/api/health", config.server_url.trim_end_matches('/'));
            match reqwest::get(&url).await {
                Ok(resp) if resp.status().is_success() => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("Server: {}", config.server_url);
                    println!("Version: {}", body["version"].as_str().unwrap_or("unknown"));
                    println!("Uptime: {}s", body["uptime_secs"].as_u64().unwrap_or(0));
                    println!(
                        "Terminals: {}",
                        if body["terminals_available"] == true { "available" } else { "unavailable" }
                    );
                }
                Ok(resp) => println!("(Health endpoint returned HTTP {})", resp.status().as_u16()),
                Err(_) => println!("(Could not reach {})", url),
            }
            Ok(())
        }

        Commands::Chat { prompt, mode } => {
            let config = AppConfig::load()?;
            let mode = mode.unwrap_or(config.mode);
            let (switch, _host) = switch_config(&config, mode)?;
            let switch = install_global(TransportSwitch::new(switch))?;
            let transport = switch.resolve(Some(mode))?;

            let mut stdout = std::io::stdout();
            chat_once(transport.as_ref(), &prompt, |text| {
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
            })
            .await?;
            println!();
            switch.reset();
            Ok(())
        }

        Commands::Token => {
            let config = AppConfig::load()?;
            let paths = config.paths()?;
            paths.ensure_config_dir()?;
            let token = regenerate_token(&paths)?;
            println!("{}", token);
            if let Some(pid) = read_pid_file(&paths.pid_path()) {
                if is_process_alive(pid) {
                    println!("\nNote: restart the host for the new token to take effect.");
                }
            }
            Ok(())
        }

        Commands::Version => {
            println!("aidend {}", aidend::DAEMON_VERSION);
            Ok(())
        }
    }
}
