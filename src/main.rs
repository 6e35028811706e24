use pictor::config::Config;
use pictor::sandbox::AllowedRoots;
use pictor::server;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pictor - sandboxed filesystem & image generation tool server", long_about = None)]
struct Cli {
    /// Configuration file (default: ./pictor.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated allowed root directories (default: home + working directory)
    #[arg(long)]
    roots: Option<String>,

    /// Explicit output directory for generated images
    #[arg(long)]
    output_dir: Option<String>,

    /// Try the desktop save tier even where the platform would skip it
    #[arg(long)]
    force_desktop: bool,

    /// Diagnostic logging on stderr
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let config_file = args.config.unwrap_or_else(|| PathBuf::from("pictor.yml"));
    let mut config = Config::load_or_default(&config_file)?;

    // CLI flags win over file and environment.
    if args.roots.is_some() {
        config.sandbox.allowed_roots = args.roots;
    }
    if args.output_dir.is_some() {
        config.output.directory = args.output_dir;
    }
    if args.force_desktop {
        config.output.force_desktop = true;
    }
    if args.debug {
        config.runtime.debug = true;
    }

    let roots = AllowedRoots::from_list(config.sandbox.allowed_roots.as_deref());

    // stdout is the protocol channel, so the banner goes to stderr.
    eprintln!("🚀 Pictor tool server ready on stdio.");
    eprintln!("🔒 Allowed roots: {}", roots.describe());
    if config.runtime.debug {
        eprintln!("🔍 Debug diagnostics enabled.");
    }

    server::run(config, roots).await
}
