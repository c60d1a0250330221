#[cfg(feature = "cli")]
use sslpin::cli::{report_error, run_cli};

#[cfg(feature = "cli")]
fn main() {
    if let Err(e) = run_cli() {
        report_error(&e);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("This binary requires the 'cli' feature to be enabled.");
    eprintln!("Build with: cargo build --features cli");
}
