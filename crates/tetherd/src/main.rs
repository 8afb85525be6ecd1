use std::process::ExitCode;

fn main() -> ExitCode {
    match tetherd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(&error);
            ExitCode::FAILURE
        }
    }
}

fn report(error: &tetherd::LaunchError) {
    eprintln!("tetherd: {error}");
}
