//! Streakforge - reward and progression engine
//!
//! Single binary with subcommands:
//!   streakforge serve     - Run the HTTP API
//!   streakforge config    - Print the default configuration

mod server;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("serve") => {
            // Pass remaining args (skip binary name and "serve" subcommand)
            let serve_args = args[2..].to_vec();
            if let Err(e) = server::run(serve_args) {
                eprintln!("Server error: {e:#}");
                std::process::exit(1);
            }
        }
        Some("config") => {
            print!("{}", streakforge::config::default_toml());
        }
        Some("--version" | "-V") => {
            println!("streakforge {}", streakforge::VERSION);
        }
        Some("--help" | "-h") | None => {
            print_help();
        }
        Some(other) => {
            eprintln!("Unknown command: {other}\n");
            print_help();
            std::process::exit(2);
        }
    }
}

fn print_help() {
    println!("Streakforge v{}", streakforge::VERSION);
    println!("Reward & progression engine");
    println!();
    println!("USAGE:");
    println!("    streakforge [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    serve       Run the HTTP API");
    println!("    config      Print the default configuration as TOML");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help      Print help");
    println!("    -V, --version   Print version");
    println!();
    println!("EXAMPLES:");
    println!("    streakforge config > streakforge.toml");
    println!("    streakforge serve --config streakforge.toml");
    println!("    streakforge serve --memory --port 9000");
    println!("    streakforge serve --help");
}
