use anyhow::Result;
use clap::Parser;

mod cli;
mod util;

mod cmd_del;
mod cmd_exists;
mod cmd_get;
mod cmd_merge;
mod cmd_put;
mod cmd_stat;
mod cmd_sweep;
mod cmd_ttl;
mod cmd_watch;

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Put {
            path,
            key,
            value,
            value_file,
            ttl,
        } => cmd_put::exec(path, key, value, value_file, ttl),

        cli::Cmd::Get { path, key, out } => cmd_get::exec(path, key, out),

        cli::Cmd::Del { path, key } => cmd_del::exec(path, key),

        cli::Cmd::Exists { path, key } => cmd_exists::exec(path, key),

        cli::Cmd::Ttl { path, key } => cmd_ttl::exec_ttl(path, key),

        cli::Cmd::Expire { path, key, ttl } => cmd_ttl::exec_expire(path, key, ttl),

        cli::Cmd::Persist { path, key } => cmd_ttl::exec_persist(path, key),

        cli::Cmd::Stat { path, json } => cmd_stat::exec(path, json),

        cli::Cmd::Merge { path } => cmd_merge::exec(path),

        cli::Cmd::Watch { path, take } => cmd_watch::exec(path, take),

        cli::Cmd::Sweep { path, timeout_ms } => cmd_sweep::exec(path, timeout_ms),
    }
}
