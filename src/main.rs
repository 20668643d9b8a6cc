use std::process::ExitCode;

use colored::Colorize;
use fdm::Fdm;

fn main() -> ExitCode {
    match Fdm::new().run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let err = anyhow::Error::from(err);
            eprintln!("{}", format!("{err:#}").red());
            ExitCode::FAILURE
        }
    }
}
