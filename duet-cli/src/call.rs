use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use duet_client::{
    CallConfig, CallController, CallDeps, CallPhase, CallSnapshot, MediaConstraints,
    PeerLostPolicy, RelayClient, RelayClientConfig, RtcTransportFactory, SyntheticMedia,
    TransportConfig,
};
use duet_core::{PeerId, RoomId};
use std::sync::Arc;
use tracing::warn;

#[derive(Args)]
pub struct CallArgs {
    /// Base url of the relay.
    #[arg(long, env = "DUET_RELAY", default_value = "ws://127.0.0.1:8080")]
    relay: String,

    /// Meet in this named room instead of matching with a stranger.
    #[arg(long, conflicts_with = "join")]
    invite: Option<String>,

    /// Join an existing room by id.
    #[arg(long)]
    join: Option<String>,

    /// Go back to matchmaking when the partner leaves.
    #[arg(long)]
    requeue: bool,

    #[arg(long)]
    no_video: bool,
}

pub async fn run(args: CallArgs) -> Result<()> {
    let peer_id = PeerId::new();
    let relay = RelayClient::connect(
        RelayClientConfig {
            url: args.relay.clone(),
            ..RelayClientConfig::default()
        },
        peer_id,
    )
    .await
    .with_context(|| format!("Could not reach relay {}", args.relay))?;

    println!("{} {}", "Connected as".green().bold(), peer_id);

    let config = CallConfig {
        transport: TransportConfig {
            ice_servers: relay.ice_servers(),
        },
        media: MediaConstraints {
            audio: true,
            video: !args.no_video,
        },
        peer_lost: if args.requeue {
            PeerLostPolicy::Requeue
        } else {
            PeerLostPolicy::End
        },
    };
    let controller = CallController::new(
        CallDeps {
            media: Arc::new(SyntheticMedia),
            directory: Arc::new(relay.clone()),
            signaling: Arc::new(relay.clone()),
            transports: Arc::new(RtcTransportFactory),
        },
        config,
    );

    let mut state = controller.subscribe_state();
    let printer = tokio::spawn(async move {
        let mut last = None;
        while state.changed().await.is_ok() {
            let snapshot = state.borrow_and_update().clone();
            let line = describe(&snapshot);
            if last.as_ref() != Some(&line) {
                println!("{}", line);
                last = Some(line);
            }
        }
    });

    controller.start(peer_id).await?;
    match (args.invite, args.join) {
        (Some(name), _) => controller.join_invite(RoomId::from(name)).await?,
        (None, Some(room)) => controller.join_room(RoomId::from(room)).await?,
        (None, None) => controller.find_partner().await?,
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!("{}", "Leaving call...".yellow());

    if let Err(e) = controller.leave().await {
        warn!("Leave failed: {}", e);
    }
    relay.close();
    printer.abort();
    Ok(())
}

fn describe(snapshot: &CallSnapshot) -> String {
    let room = snapshot
        .room_id
        .as_ref()
        .map(|r| format!(" room {}", r))
        .unwrap_or_default();
    let role = snapshot
        .role
        .map(|r| format!(" as {}", r))
        .unwrap_or_default();

    match &snapshot.phase {
        CallPhase::Idle => "idle".dimmed().to_string(),
        CallPhase::AcquiringMedia => "acquiring media".cyan().to_string(),
        CallPhase::AwaitingRoom => "looking for a partner".cyan().to_string(),
        CallPhase::Negotiating => format!("negotiating{}{}", room, role).cyan().to_string(),
        CallPhase::Connected => format!("connected{}{}", room, role)
            .green()
            .bold()
            .to_string(),
        CallPhase::Ended => "call ended".yellow().to_string(),
        CallPhase::Failed(err) => format!("failed: {}", err).red().bold().to_string(),
    }
}
