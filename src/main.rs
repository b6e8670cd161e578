//! nico entry point.

fn main() {
    std::process::exit(nico::cli::run_cli());
}
