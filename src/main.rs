use kitsu_exporter::config::config::Config;
use kitsu_exporter::logging;
use kitsu_exporter::tui_app;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("Kitsu Exporter - export shot sheets with thumbnails");
    println!();
    println!("Usage:");
    println!("  kitsu-exporter [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --generate-config  - Write a commented default config file");
    println!("  --version          - Print version");
    println!("  --help             - Show this help");
    println!();
    println!("Inside the TUI:");
    println!("  Tab    - Next field");
    println!("  Enter  - Login / select project / start export");
    println!("  l      - Logout (project screen)");
    println!("  Esc    - Back / quit");
    println!("  Ctrl+Q - Quit");
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.contains(&"--help".to_string()) {
        print_help();
        return Ok(());
    }

    if args.contains(&"--version".to_string()) {
        println!("kitsu-exporter {}", VERSION);
        return Ok(());
    }

    if args.contains(&"--generate-config".to_string()) {
        let path = Config::get_config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, Config::create_default_with_comments())?;
        println!("Configuration file created at: {:?}", path);
        return Ok(());
    }

    // Stdout belongs to the TUI, so tracing goes to the in-memory buffer
    // rendered in the export screen's log pane.
    let log_buffer = logging::init_tracing();

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(target: "system", "config load failed, using defaults: {}", e);
        Config::default()
    });

    tui_app::run_tui(config, Some(log_buffer))?;
    Ok(())
}
