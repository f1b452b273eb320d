//! ANNOUNCE request handler
//!
//! Admission, digest authentication and stream setup for a new client.

use super::audio_pipeline::{DecodePipeline, PipelineHandle};
use super::events::ReceiverEvent;
use super::session::SessionState;
use super::session_manager::{HandlerContext, HandlerResult};
use crate::error::RaopError;
use crate::protocol::crypto::ServerKey;
use crate::protocol::raop::digest;
use crate::protocol::rtsp::headers::names;
use crate::protocol::rtsp::{ResponseBuilder, RtspRequest, StatusCode};
use crate::protocol::sdp::{AnnounceParameters, SdpParser};

/// Parse an ANNOUNCE body into stream parameters
///
/// # Errors
/// Returns `RaopError::UnsupportedMedia` for a codec we cannot name and
/// `RaopError::Crypto` if the session key cannot be unwrapped.
pub fn process_announce(request: &RtspRequest, server_key: &ServerKey) -> Result<AnnounceParameters, RaopError> {
    let body = request.body_text();
    tracing::trace!("ANNOUNCE body:\n{}", body);

    let sdp = SdpParser::parse(&body);
    Ok(AnnounceParameters::from_sdp(&sdp, server_key)?)
}

pub(crate) fn handle_announce(request: &RtspRequest, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    if ctx.state.connected.is_some() {
        tracing::info!("Already streaming; rejecting {}", ctx.conn.peer);
        return Err(RaopError::Capacity);
    }

    if let Some(challenge) = check_password(request, ctx)? {
        return Ok(challenge);
    }

    let params = match process_announce(request, ctx.server_key()) {
        Ok(params) => params,
        Err(err) => return Err(report(ctx, err)),
    };

    let decoder = match ctx.decoders().create(params.codec, &params.decoder_config) {
        Ok(decoder) => decoder,
        Err(err) => return Err(report(ctx, RaopError::UnsupportedMedia(err.to_string()))),
    };

    let (pipeline, stream) = DecodePipeline::new(decoder, ctx.config().output_buffer_chunks);

    let state = &mut *ctx.state;
    state.pipeline = Some(PipelineHandle::start(pipeline));
    state.connected = Some(ctx.conn.clone());
    state.generation += 1;

    let session = &mut state.session;
    session.nonce = None;
    session.metadata.client_name.clone_from(&params.client_name);
    session.transition(SessionState::AwaitingSetup);

    tracing::info!(
        "Client {} connected ({}, {})",
        ctx.conn.peer,
        params.rtpmap,
        if params.is_encrypted() { "encrypted" } else { "clear" }
    );
    if params.ipv6 {
        tracing::debug!("IPv6 usage detected");
    }

    if let Some(name) = &params.client_name {
        ctx.emit(ReceiverEvent::ClientNameChanged(name.clone()));
    }
    ctx.state.session.announce = Some(params);
    ctx.emit(ReceiverEvent::ClientConnected(stream));

    Ok(ResponseBuilder::ok())
}

/// `Ok(Some(_))` is a 401 challenge to send; `Ok(None)` means go ahead
fn check_password(request: &RtspRequest, ctx: &mut HandlerContext<'_>) -> Result<Option<ResponseBuilder>, RaopError> {
    let Some(password) = ctx.config().password.clone().filter(|p| !p.is_empty()) else {
        return Ok(None);
    };

    match request.headers.get(names::AUTHORIZATION) {
        None => {
            let nonce = digest::generate_nonce();
            let challenge = digest::challenge_header(&nonce);
            ctx.state.session.nonce = Some(nonce);
            tracing::debug!("Password required, challenging {}", ctx.conn.peer);
            Ok(Some(
                ResponseBuilder::error(StatusCode::UNAUTHORIZED).header(names::WWW_AUTHENTICATE, &challenge),
            ))
        }
        Some(authorization) => {
            let nonce = ctx.state.session.nonce.as_deref().unwrap_or_default();
            if digest::verify_authorization(authorization, &password, nonce) {
                Ok(None)
            } else {
                tracing::warn!("Digest mismatch from {}", ctx.conn.peer);
                Err(RaopError::Auth)
            }
        }
    }
}

/// Unsupported media is also surfaced as an error event
fn report(ctx: &HandlerContext<'_>, err: RaopError) -> RaopError {
    if let (RaopError::UnsupportedMedia(message), Some(code)) = (&err, err.status()) {
        ctx.emit(ReceiverEvent::Error {
            code: code.as_u16(),
            message: message.clone(),
        });
    }
    err
}
