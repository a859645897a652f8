use clap::Parser;
use log::{debug, error};
use snafu::ErrorCompat;

mod args;
mod survey;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    debug!("args: {:?}", args);

    if let Err(e) = survey::run(&args) {
        error!("The analysis failed");
        eprintln!("Error: {}", survey_sentiment::error_chain(&*e));
        if let Some(bt) = ErrorCompat::backtrace(&*e) {
            eprintln!("{}", bt);
        }
        std::process::exit(1);
    }
}
