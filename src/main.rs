use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use tokio::task::JoinSet;

use hlquery::address::ServerAddress;
use hlquery::error::QueryError;
use hlquery::info::{InfoLayout, ServerStatus};
use hlquery::packet::Protocol;
use hlquery::query::{execute, QueryRequest};

/// Query GoldSrc/Source game servers and print their status.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Servers as host[:port]; the port defaults to 27015
    #[arg(required = true)]
    addresses: Vec<ServerAddress>,

    /// Give up on a server after this many milliseconds
    #[arg(long, env = "HLQUERY_TIMEOUT_MS", default_value_t = 3000)]
    timeout_ms: u64,

    /// Engine dialect: goldsrc or source
    #[arg(long, env = "HLQUERY_PROTOCOL", default_value_t = Protocol::GoldSrc)]
    protocol: Protocol,

    /// How to read the info reply: auto, full or compact
    #[arg(long, default_value = "auto")]
    layout: InfoLayout,

    /// Also list players
    #[arg(long)]
    players: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let args = Args::parse();

    let mut tasks: JoinSet<Outcome> = JoinSet::new();
    for (slot, address) in args.addresses.into_iter().enumerate() {
        let request = QueryRequest::new(address)
            .with_timeout(Duration::from_millis(args.timeout_ms))
            .with_protocol(args.protocol)
            .with_layout(args.layout)
            .with_players(args.players);
        tasks.spawn(async move {
            let result = execute(&request).await;
            (slot, request.address, result)
        });
    }

    let (results, complete) = collect(tasks).await;

    let mut all_online: bool = complete;
    for (_, address, result) in results {
        match result {
            Ok(status) => print_status(&address, &status),
            Err(err) => {
                all_online = false;
                println!("{address}: offline ({err})");
            }
        }
    }

    if all_online {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

type Outcome = (usize, ServerAddress, Result<ServerStatus, QueryError>);

/// Wait for every query, in submission order. The flag is false if any task
/// died before reporting, since that server's result is lost.
async fn collect(mut tasks: JoinSet<Outcome>) -> (Vec<Outcome>, bool) {
    let mut results: Vec<Outcome> = Vec::new();
    let mut complete: bool = true;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => results.push(outcome),
            Err(err) => {
                complete = false;
                log::error!("query task failed: {err}");
            }
        }
    }
    results.sort_by_key(|(slot, _, _)| *slot);
    (results, complete)
}

fn print_status(address: &ServerAddress, status: &ServerStatus) {
    println!("{address}: {}", status.name);
    println!("  map:     {}", status.map);
    match status.max_players {
        Some(max) => println!("  players: {}/{max}", status.player_count),
        None => println!("  players: {}", status.player_count),
    }
    for player in &status.players {
        let secs = player.connected_secs;
        println!(
            "    {:<32} {:>5}  {:02}:{:02}:{:02}",
            player.name,
            player.score,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline(slot: usize) -> Outcome {
        (
            slot,
            ServerAddress::new("127.0.0.1", 27015 + slot as u16),
            Err(QueryError::Timeout(Duration::from_millis(10))),
        )
    }

    async fn explode() -> Outcome {
        panic!("query task blew up")
    }

    #[tokio::test]
    async fn results_come_back_in_submission_order() {
        let mut tasks: JoinSet<Outcome> = JoinSet::new();
        for slot in [2, 0, 1] {
            tasks.spawn(async move { offline(slot) });
        }
        let (results, complete) = collect(tasks).await;
        assert!(complete);
        let slots: Vec<usize> = results.iter().map(|(slot, _, _)| *slot).collect();
        assert_eq!(slots, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn a_task_that_dies_marks_the_run_incomplete() {
        let mut tasks: JoinSet<Outcome> = JoinSet::new();
        tasks.spawn(async { offline(0) });
        tasks.spawn(explode());

        let (results, complete) = collect(tasks).await;
        assert!(!complete);
        assert_eq!(results.len(), 1);
    }
}
