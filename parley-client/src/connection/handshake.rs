//! Offer/answer/candidate exchange for one [`PeerConnection`].
//!
//! Every step runs on the dispatcher task, so steps for one peer never
//! interleave. An engine failure aborts the current step only; the
//! connection stays up until the engine reports a terminal ICE state.

use crate::connection::candidate_buffer::is_end_of_candidates;
use crate::connection::peer_connection::{HandshakeState, PeerConnection};
use crate::engine::SessionDescription;
use crate::error::Result;
use crate::signaler::Signaler;
use parley_core::{CANDIDATES_COMPLETE, Command};
use tracing::{debug, info, warn};

/// The engine wants to (re)negotiate: offer our local description to the peer.
pub(crate) async fn on_negotiation_needed(signaler: &Signaler, pc: &PeerConnection) -> Result<()> {
    let engine = pc.engine();
    let sdp = engine.create_offer().await?;
    engine
        .set_local_description(SessionDescription::offer(sdp.clone()))
        .await?;

    let command = Command::Offer { sdp };
    let kind = command.kind();
    let pending = signaler.begin(pc.peer_id(), command, None).await?;
    info!("Offer sent to {}", pc.peer_id());
    Signaler::watch_ack(pc.peer_id().clone(), kind, pending);
    Ok(())
}

pub(crate) async fn on_remote_offer(signaler: &Signaler, pc: &PeerConnection, sdp: String) -> Result<()> {
    {
        let mut state = pc.handshake().await;
        pc.engine()
            .set_remote_description(SessionDescription::offer(sdp))
            .await?;
        apply_buffered(pc, &mut state).await;
    }

    let engine = pc.engine();
    let answer = engine.create_answer().await?;
    engine
        .set_local_description(SessionDescription::answer(answer.clone()))
        .await?;

    let command = Command::Answer { sdp: answer };
    let kind = command.kind();
    let pending = signaler.begin(pc.peer_id(), command, None).await?;
    info!("Answer sent to {}", pc.peer_id());
    Signaler::watch_ack(pc.peer_id().clone(), kind, pending);
    Ok(())
}

pub(crate) async fn on_remote_answer(pc: &PeerConnection, sdp: String) -> Result<()> {
    let mut state = pc.handshake().await;
    pc.engine()
        .set_remote_description(SessionDescription::answer(sdp))
        .await?;
    apply_buffered(pc, &mut state).await;
    info!("Answer from {} applied", pc.peer_id());
    Ok(())
}

/// Hands a remote candidate to the engine, or holds it until the remote
/// description is in place.
pub(crate) async fn on_remote_candidate(pc: &PeerConnection, candidate: &str) -> Result<()> {
    if is_end_of_candidates(candidate) {
        debug!("{} finished gathering candidates", pc.peer_id());
        return Ok(());
    }

    let mut state = pc.handshake().await;
    if state.remote_applied {
        pc.engine().add_ice_candidate(candidate).await?;
    } else if state.buffer.push(candidate) {
        debug!(
            "Buffered candidate from {} ({} waiting)",
            pc.peer_id(),
            state.buffer.len()
        );
    }
    Ok(())
}

/// Forwards a locally gathered candidate, `completed` included, to the peer.
pub(crate) async fn on_local_candidate(
    signaler: &Signaler,
    pc: &PeerConnection,
    candidate: String,
) -> Result<()> {
    if candidate == CANDIDATES_COMPLETE {
        debug!("Local candidate gathering for {} complete", pc.peer_id());
    }
    signaler
        .notify(pc.peer_id(), Command::Candidate { candidate })
        .await
}

async fn apply_buffered(pc: &PeerConnection, state: &mut HandshakeState) {
    state.remote_applied = true;
    let buffered = state.buffer.drain();
    if buffered.is_empty() {
        return;
    }

    debug!("Replaying {} buffered candidates for {}", buffered.len(), pc.peer_id());
    for candidate in buffered {
        if let Err(e) = pc.engine().add_ice_candidate(&candidate).await {
            warn!("Buffered candidate rejected for {}: {}", pc.peer_id(), e);
        }
    }
}
