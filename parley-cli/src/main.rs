use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use parley_client::{
    ClientConfig, ClientEvent, ClientEventReceiver, IncomingSession, OutgoingSession, SessionEvent,
    SignalingClient, WebRtcEngine, WsChannel,
};
use parley_core::{IceServerConfig, PeerId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley", about = "Negotiate peer sessions through a signaling server")]
struct Cli {
    /// Signaling server WebSocket URL.
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// STUN/TURN server URL; repeat for several. Overrides PARLEY_ICE_SERVERS.
    #[arg(long = "ice")]
    ice: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Propose a session to a peer and connect once it is accepted.
    Call {
        peer: String,

        #[arg(long, default_value = "opus")]
        media: Vec<String>,
    },
    /// Wait for incoming session proposals.
    Listen {
        /// Accept every proposal without asking.
        #[arg(long)]
        auto_accept: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if !cli.ice.is_empty() {
        config = config.with_ice_servers(vec![IceServerConfig {
            urls: cli.ice.clone(),
            username: None,
            credential: None,
        }]);
    }

    println!("{} {}", "Connecting to".cyan(), cli.url);
    let (channel, inbound) = WsChannel::connect(&cli.url)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.url))?;
    let engine = Arc::new(WebRtcEngine::new().context("Failed to set up the RTC engine")?);

    let (client, events) = SignalingClient::start(channel, inbound, engine, config)
        .await
        .context("Signaling server never welcomed us")?;
    println!("{} {}", "Registered as".green().bold(), client.local_id());

    let outcome = match cli.command {
        Commands::Call { peer, media } => call(&client, events, PeerId::from(peer), media).await,
        Commands::Listen { auto_accept } => listen(events, auto_accept).await,
    };

    client.shutdown().await;
    outcome
}

async fn call(
    client: &SignalingClient,
    events: ClientEventReceiver,
    peer: PeerId,
    media: Vec<String>,
) -> Result<()> {
    println!("{} {}", "Calling".cyan(), peer);
    let session = client
        .create_session(&peer, media)
        .await
        .with_context(|| format!("{} did not take the call", peer))?;

    println!("{} {}", "Ringing, session".cyan(), session.session_id());
    let outcome = run_until_interrupted(events).await;
    hang_up(&session).await;
    outcome
}

/// Withdraws a call the peer has not answered yet.
async fn hang_up(session: &OutgoingSession) {
    if session.is_settled() {
        return;
    }
    let cancel = session.cancel(Some("hung up".to_owned()));
    match tokio::time::timeout(Duration::from_secs(2), cancel).await {
        Ok(Ok(())) => println!("{} {}", "Canceled call to".yellow(), session.peer_id()),
        Ok(Err(e)) => debug!("Cancel to {} failed: {}", session.peer_id(), e),
        Err(_) => warn!("Server never confirmed the cancel to {}", session.peer_id()),
    }
}

async fn listen(events: ClientEventReceiver, auto_accept: bool) -> Result<()> {
    println!("{}", "Waiting for calls, Ctrl-C to quit".cyan());
    let on_incoming = move |session: IncomingSession| {
        tokio::spawn(answer(session, auto_accept));
    };
    run_events(events, on_incoming).await
}

async fn answer(session: IncomingSession, auto_accept: bool) {
    let peer = session.peer_id().clone();
    let accept = auto_accept || {
        let prompt = format!("{} is calling ({}). Accept?", peer, session.media().join(", "));
        tokio::task::spawn_blocking(move || Confirm::new().with_prompt(prompt).default(true).interact())
            .await
            .ok()
            .and_then(|r| r.ok())
            .unwrap_or(false)
    };

    let result = if accept {
        session.accept().await.map(|pc| {
            println!("{} {} ({})", "Connected to".green().bold(), peer, pc.connection_id());
        })
    } else {
        session.reject(Some("declined".to_owned())).await
    };

    if let Err(e) = result {
        println!("{} {}: {}", "Could not answer".red(), peer, e);
    }
}

async fn run_until_interrupted(events: ClientEventReceiver) -> Result<()> {
    run_events(events, |session: IncomingSession| {
        debug!("Declining {} while calling", session.peer_id());
        tokio::spawn(async move {
            let _ = session.reject(Some("busy".to_owned())).await;
        });
    })
    .await
}

async fn run_events<F>(mut events: ClientEventReceiver, on_incoming: F) -> Result<()>
where
    F: Fn(IncomingSession),
{
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Hanging up".yellow());
                return Ok(());
            }

            event = events.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                match event {
                    ClientEvent::IncomingSession(session) => {
                        println!("{} {}", "Incoming call from".cyan().bold(), session.peer_id());
                        on_incoming(session);
                    }
                    ClientEvent::IncomingConnection(pc) => {
                        debug!("Connection from {} opened by offer", pc.peer_id());
                    }
                    ClientEvent::Session { peer_id, event, .. } => print_session_event(&peer_id, &event),
                    ClientEvent::DataChannel { peer_id, channel } => {
                        println!("{} '{}' with {}", "DataChannel".green(), channel.label(), peer_id);
                    }
                    ClientEvent::Track { peer_id, track } => {
                        println!("{} {} from {}", "Track".green(), track.kind(), peer_id);
                    }
                    ClientEvent::IceState { peer_id, state } => {
                        println!("{} {:?} with {}", "ICE".blue(), state, peer_id);
                    }
                    ClientEvent::ConnectionClosed { peer_id, .. } => {
                        println!("{} {}", "Connection closed:".yellow(), peer_id);
                    }
                    ClientEvent::Error(e) => warn!("{}", e),
                    ClientEvent::Disconnected => {
                        println!("{}", "Signaling server went away".red().bold());
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn print_session_event(peer_id: &PeerId, event: &SessionEvent) {
    match event {
        SessionEvent::Accepted(_) => println!("{} {}", "Accepted by".green().bold(), peer_id),
        SessionEvent::Rejected(reason) => println!(
            "{} {} ({})",
            "Rejected by".red(),
            peer_id,
            reason.as_deref().unwrap_or("no reason")
        ),
        SessionEvent::Canceled(reason) => println!(
            "{} {} ({})",
            "Canceled by".yellow(),
            peer_id,
            reason.as_deref().unwrap_or("no reason")
        ),
        SessionEvent::TimedOut => println!("{} {}", "No answer from".yellow(), peer_id),
        SessionEvent::Errored(e) => println!("{} {}: {}", "Session failed with".red(), peer_id, e),
        SessionEvent::Settled(reason) => debug!("Session with {} settled: {:?}", peer_id, reason),
    }
}
