//! Daemon entrypoint for `pytables-server`.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    pytables_server::run(std::env::args_os(), &mut stdout, &mut stderr)
}
