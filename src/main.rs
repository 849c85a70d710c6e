use std::path::PathBuf;

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use vshs::{
    builtin::builtin_registry,
    config::{ServerConfig, ServerConfigValidator, load_config},
    core::route_table::RouteHandler,
    server, tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(flatten)]
    overrides: Overrides,
}

/// Values taking precedence over the config file and `VSHS_*` variables
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Configuration file (TOML, YAML or JSON)
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[clap(short, long, global = true)]
    port: Option<u16>,

    /// Interface to bind
    #[clap(long, global = true)]
    hostname: Option<String>,

    /// Directory containing the route files
    #[clap(short, long, global = true)]
    routes: Option<PathBuf>,

    /// Directory served when no route matches
    #[clap(long, global = true)]
    static_root: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(hostname) = self.hostname {
            config.hostname = hostname;
        }
        if let Some(routes) = self.routes {
            config.routes = routes;
        }
        if let Some(static_root) = self.static_root {
            config.static_root = Some(static_root);
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the server (default)
    Serve,
    /// Validate the configuration
    Validate,
    /// List discovered routes in match order
    Routes,
}

fn resolve_config(overrides: Overrides) -> Result<ServerConfig> {
    let mut config = load_config(overrides.config.as_deref()).with_context(|| match &overrides.config {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })?;
    overrides.apply(&mut config);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let config = resolve_config(args.overrides)?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => validate_config_command(&config),
        Commands::Routes => list_routes_command(&config),
        Commands::Serve => serve_command(config).await,
    }
}

async fn serve_command(config: ServerConfig) -> Result<()> {
    tracing_setup::init_tracing(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    ServerConfigValidator::validate(&config).context("Invalid configuration")?;

    let dispatcher = server::build_dispatcher(&config, builtin_registry())?;
    tracing::info!(
        "Loaded {} routes from {}",
        dispatcher.routes().len(),
        config.routes.display()
    );

    server::run(&config, dispatcher).await?;
    tracing::info!("Graceful shutdown completed");
    Ok(())
}

fn validate_config_command(config: &ServerConfig) -> Result<()> {
    println!("🔍 Validating configuration");

    match ServerConfigValidator::validate(config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr());
            println!("   • Routes Directory: {}", config.routes.display());
            println!("   • Route Extension: .{}", config.route_extension);
            match &config.static_root {
                Some(root) => println!("   • Static Root: {}", root.display()),
                None => println!("   • Static Root: none"),
            }
            println!("   • Access Log: {}", config.access_log);
            println!("   • Max Body: {} bytes", config.max_body_bytes);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Check that the routes and static directories exist");
            println!("   • Give route_extension without the leading dot");
            std::process::exit(1);
        }
    }
}

fn list_routes_command(config: &ServerConfig) -> Result<()> {
    let routes = server::build_route_table(config, builtin_registry())?;

    println!("📋 {} routes in {}", routes.len(), config.routes.display());
    for (index, route) in routes.routes().iter().enumerate() {
        match route.handler() {
            RouteHandler::Loaded(_) => {
                println!(
                    "{:>4}. {:<8} {}",
                    index + 1,
                    route.method().as_str(),
                    route.template()
                );
            }
            RouteHandler::LoadError(reason) => {
                println!(
                    "{:>4}. {:<8} {}  ❌ {}",
                    index + 1,
                    route.method().as_str(),
                    route.template(),
                    reason
                );
            }
        }
    }

    if routes.load_error_count() > 0 {
        eprintln!(
            "{} route(s) failed to load and will answer 500",
            routes.load_error_count()
        );
    }
    Ok(())
}
