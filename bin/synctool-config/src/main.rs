#![deny(unsafe_code)]

use std::env;
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    cli::config_tool::run(env::args_os(), &mut stdout, &mut stderr).into()
}

#[cfg(test)]
mod tests {
    #[test]
    fn version_flag_reports_success() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit = cli::config_tool::run(
            ["synctool-config", "--version"],
            &mut stdout,
            &mut stderr,
        );
        assert!(exit.is_success());
        assert!(!stdout.is_empty(), "version output should not be empty");
    }

    #[test]
    fn missing_action_reports_usage() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit = cli::config_tool::run(["synctool-config"], &mut stdout, &mut stderr);
        assert_eq!(exit, cli::ExitCode::Usage);
        assert!(!stderr.is_empty(), "the missing action should be explained");
    }
}
