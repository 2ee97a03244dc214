use std::process::ExitCode;

fn main() -> ExitCode {
    dealwatch_cli::run()
}
