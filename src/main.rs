use clap::Parser;
use cxindex::cli::{run, Cli};

fn main() -> cxindex::IndexResult<()> {
    cxindex::logging::init();
    run(Cli::parse())
}
