use std::process::ExitCode;

fn main() -> ExitCode {
    orderline_cli::run()
}
