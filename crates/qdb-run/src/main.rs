use clap::Parser;

mod cli;
mod console;

fn main() -> miette::Result<()> {
    cli::Cli::parse().run()
}
