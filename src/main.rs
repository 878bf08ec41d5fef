use std::process::ExitCode;

use xdf_merge_lib::logging::start_logging;
use xdf_merge_lib::pipeline::{self, MergeConfig};

fn main() -> ExitCode {
    if let Err(e) = start_logging() {
        eprintln!("{}", e);
    }

    let config = match MergeConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::from(2);
        }
    };

    match pipeline::run(&config) {
        Ok(outcome) => {
            log::info!(
                "Merged matrix {} x {} saved to {}",
                outcome.rows,
                outcome.columns,
                outcome.output_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
