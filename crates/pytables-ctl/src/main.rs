//! Binary entry point for the `pytables` control tool.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    pytables_ctl::run(std::env::args_os(), &mut stdout, &mut stderr)
}
