//! Discord notifications for Twitch, Kick and YouTube.

mod cli;
mod config;
mod secrets;

fn main() -> anyhow::Result<()> {
    cli::main()
}
