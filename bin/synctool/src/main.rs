#![deny(unsafe_code)]

use std::env;
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    cli::init_tracing();
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    cli::client::run(env::args_os(), &mut stdout, &mut stderr).into()
}
