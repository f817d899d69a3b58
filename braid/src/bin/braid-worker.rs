//! Child process of a `ProcessPool`, serving the demonstration jobs.

use braid::pool::{jobs, serve};

use std::process::ExitCode;

fn main() -> ExitCode {
    match serve(&jobs::registry()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("braid-worker: {err}");
            ExitCode::FAILURE
        }
    }
}
