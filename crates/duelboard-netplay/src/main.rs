use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use duelboard_netplay::{
    PeerCommand, PeerConfig, PeerEvent, SessionHandler, SessionView, TcpTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Duelboard peer
#[derive(Parser, Debug)]
#[command(name = "duelboard-peer")]
#[command(about = "Play tic-tac-toe against one peer over TCP", long_about = None)]
struct Args {
    #[command(flatten)]
    peer: PeerConfig,

    /// Start listening right away.
    #[arg(long, conflicts_with = "connect")]
    listen: bool,

    /// Connect to a listening peer right away.
    #[arg(long)]
    connect: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let transport = Arc::new(TcpTransport::new(args.peer.bind));
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (mut handler, commands, view) = SessionHandler::new(transport, args.peer, event_tx);

    let handler_task = tokio::spawn(async move { handler.run().await });

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    if args.listen {
        commands.send(PeerCommand::StartListening).await?;
    } else if let Some(addr) = args.connect {
        commands.send(PeerCommand::Connect(addr)).await?;
    }

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "status" {
            print_status(&view);
            continue;
        }
        if line == "help" {
            print_help();
            continue;
        }
        match parse_command(line) {
            Ok(cmd) => {
                let quit = cmd == PeerCommand::Shutdown;
                commands.send(cmd).await?;
                if quit {
                    break;
                }
            }
            Err(e) => println!("{e}"),
        }
    }

    drop(commands);
    match handler_task.await? {
        Ok(()) => info!("Session closed"),
        Err(e) => error!(error = %e, "Session handler failed"),
    }
    Ok(())
}

fn parse_command(line: &str) -> anyhow::Result<PeerCommand> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let cmd = match parts.as_slice() {
        ["listen"] => PeerCommand::StartListening,
        ["connect", addr] => PeerCommand::Connect((*addr).to_string()),
        ["first", "me"] => PeerCommand::ClaimFirstMove { self_first: true },
        ["first", "them"] => PeerCommand::ClaimFirstMove { self_first: false },
        ["move", row, col] => PeerCommand::LocalMove {
            row: row.parse()?,
            col: col.parse()?,
        },
        ["reset"] => PeerCommand::Reset,
        ["disconnect"] => PeerCommand::Disconnect,
        ["quit"] | ["exit"] => PeerCommand::Shutdown,
        _ => bail!("unknown command: {line} (try `help`)"),
    };
    Ok(cmd)
}

fn print_help() {
    println!(
        "commands: listen | connect <addr> | first me|them | move <row> <col> | reset | disconnect | status | quit"
    );
}

fn print_status(view: &SessionView) {
    let snap = view.snapshot();
    println!("state: {}  rule: {}", snap.session_state, snap.rule);
    println!("link: {:?}", snap.connection_status);
    if let Some(symbol) = snap.local_symbol {
        println!("you play {symbol}");
    }
    println!("{}", snap.board);
    println!(
        "turn {}  result {:?}  your move: {}",
        snap.turn, snap.result, snap.is_local_turn
    );
}

fn print_event(event: &PeerEvent) {
    match event {
        PeerEvent::Listening { local_addr } => println!("listening on {local_addr}"),
        PeerEvent::Connected { peer, side } => println!("connected to {peer} ({side})"),
        PeerEvent::ConnectFailed { error } => println!("connect failed: {error}"),
        PeerEvent::Disconnected { error: Some(e) } => println!("disconnected: {e}"),
        PeerEvent::Disconnected { error: None } => println!("disconnected"),
        PeerEvent::HandshakeComplete { roles, local_first } => println!(
            "roles set: {} plays X, {} plays O; {}",
            roles.player1,
            roles.player2,
            if *local_first { "you move first" } else { "peer moves first" }
        ),
        PeerEvent::RuleMismatch { local, remote } => {
            println!("peer plays {remote}, you play {local}; claim refused")
        }
        PeerEvent::BoardUpdated {
            state,
            is_local_turn,
        } => {
            println!("{}", state.board);
            if *is_local_turn {
                println!("your move");
            }
        }
        PeerEvent::MoveRejected { reason } => println!("move rejected: {reason}"),
        PeerEvent::CommandRejected { command, state } => {
            println!("{command} not allowed while {state}")
        }
        PeerEvent::GameOver { result, local_won } => match local_won {
            Some(true) => println!("you win ({result:?})"),
            Some(false) => println!("you lose ({result:?})"),
            None => println!("draw"),
        },
        PeerEvent::ResetByPeer => println!("peer reset the board"),
    }
}
