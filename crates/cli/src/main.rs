use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    stratus_cli::run()
}
