use clap::Parser;
use mediaprep::cli::{Cli, init_logging, run_cli};
use mediaprep::output::OutputFormatter;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.net_verbosity());

    let summary = match run_cli(&cli) {
        Ok(summary) => summary,
        Err(e) => {
            OutputFormatter::error(&format!("Error: {}", e));
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match summary.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                OutputFormatter::error(&format!("Error: {}", e));
                return ExitCode::FAILURE;
            }
        }
    } else {
        OutputFormatter::run_summary(&summary);
        if summary.failure_count() == 0 {
            OutputFormatter::success("Done");
        } else {
            OutputFormatter::warning(&format!(
                "Done with {} failures",
                summary.failure_count()
            ));
        }
    }

    ExitCode::SUCCESS
}
