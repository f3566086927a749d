mod audit;
mod cli;
mod commands;
mod env_loader;
mod error;

/// Exit status for a run that completed but found discrepancies.
const EXIT_DISCREPANCIES: i32 = 1;
/// Exit status for a run that could not complete.
const EXIT_FATAL: i32 = 2;

fn main() {
    env_loader::load_dotenv();

    match cli::run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_DISCREPANCIES),
        Err(err) => {
            match error::error_code(&err) {
                Some(code) => eprintln!("error[{code}]: {err:#}"),
                None => eprintln!("error: {err:#}"),
            }
            std::process::exit(EXIT_FATAL);
        }
    }
}
