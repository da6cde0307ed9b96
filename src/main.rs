use std::process::ExitCode;

fn main() -> ExitCode {
    headlights::cli::run()
}
