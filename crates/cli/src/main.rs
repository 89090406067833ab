use std::process::ExitCode;

fn main() -> ExitCode {
    bookworm_cli::run()
}
