//! RTSP request handlers for the receiver
//!
//! Each handler takes the request plus the locked controller state and
//! returns a response builder. `CSeq` and `Server` are added by the caller.
//! `ANNOUNCE` and `SET_PARAMETER` live in their own modules.

use super::announce_handler::handle_announce;
use super::rtp_receiver::{RtpReceiver, RtpSockets};
use super::session::{RtpInfo, SessionState};
use super::session_manager::{HandlerContext, HandlerResult};
use super::set_parameter_handler::handle_set_parameter;
use crate::error::RaopError;
use crate::protocol::crypto::AudioCipher;
use crate::protocol::raop;
use crate::protocol::rtsp::headers::{names, raop as raop_headers};
use crate::protocol::rtsp::{Method, ResponseBuilder, RtspRequest, StatusCode};

/// Value of the `Audio-Jack-Status` header sent at `SETUP`
pub const AUDIO_JACK_STATUS: &str = "connected; type=analog";

/// Dispatch a request to its handler
pub(crate) async fn handle_request(request: &RtspRequest, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    match request.method {
        Method::Options => handle_options(request, ctx),
        Method::Announce => handle_announce(request, ctx),
        Method::Setup => handle_setup(ctx),
        Method::Record => handle_record(request, ctx),
        Method::Flush => handle_flush(request, ctx).await,
        Method::Teardown => Ok(handle_teardown(ctx)),
        Method::SetParameter => handle_set_parameter(request, ctx),
        Method::GetParameter => Ok(handle_get_parameter(request, ctx)),
    }
}

/// OPTIONS: method list, plus Apple-Response when challenged
fn handle_options(request: &RtspRequest, ctx: &HandlerContext<'_>) -> HandlerResult {
    let mut response = ResponseBuilder::ok().header(names::PUBLIC, &Method::public_header());

    if let Some(challenge) = request.headers.get(raop_headers::APPLE_CHALLENGE) {
        let signature = raop::generate_response(
            ctx.server_key(),
            challenge,
            &ctx.conn.local.ip(),
            &ctx.config().mac_address.octets(),
        )?;
        tracing::debug!("Answered Apple-Challenge for {}", ctx.conn.peer);
        response = response.header(raop_headers::APPLE_RESPONSE, &signature);
    }

    Ok(response)
}

/// SETUP: bind the UDP ports and start the RTP receiver
fn handle_setup(ctx: &mut HandlerContext<'_>) -> HandlerResult {
    ctx.require_connected(Method::Setup)?;

    let announce = ctx
        .state
        .session
        .announce
        .as_ref()
        .ok_or_else(|| RaopError::InvalidState("SETUP before ANNOUNCE".to_string()))?;

    let cipher = match (&announce.aes_key, &announce.aes_iv) {
        (Some(key), Some(iv)) => Some(AudioCipher::new(key, iv)?),
        _ => None,
    };
    let ipv6 = announce.ipv6;

    let pipeline = ctx
        .state
        .pipeline
        .as_ref()
        .ok_or_else(|| RaopError::InvalidState("no decode pipeline".to_string()))?
        .shared();

    if let Some(mut previous) = ctx.state.rtp.take() {
        tracing::debug!("Repeated SETUP, replacing RTP receiver on {:?}", previous.ports());
        previous.stop();
    }

    let sockets = RtpSockets::bind(ipv6, &ctx.config().rtp_port_range)?;
    let receiver = RtpReceiver::start(
        sockets,
        cipher,
        pipeline,
        ctx.config().control_timeout,
        ctx.timeout_handler(),
    )?;
    let ports = receiver.ports();
    ctx.state.rtp = Some(receiver);

    let session = &mut ctx.state.session;
    let session_id = session
        .session_id
        .get_or_insert_with(|| format!("{:016X}", rand::random::<u64>()))
        .clone();
    session.transition(SessionState::Ready);

    tracing::info!(
        "Setting UDP ports (audio: {}, control: {}, timing: {})",
        ports.audio,
        ports.control,
        ports.timing
    );

    Ok(ResponseBuilder::ok()
        .header(names::TRANSPORT, &ports.transport_header())
        .session(&session_id)
        .header(raop_headers::AUDIO_JACK_STATUS, AUDIO_JACK_STATUS))
}

/// RECORD: note the stream start and report latency
fn handle_record(request: &RtspRequest, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    ctx.require_connected(Method::Record)?;

    if let Some(value) = request.headers.get(names::RTP_INFO) {
        let Some(info) = RtpInfo::parse(value) else {
            tracing::warn!("Malformed RTP-Info: {}", value);
            return Ok(ResponseBuilder::error(StatusCode::BAD_REQUEST));
        };
        tracing::debug!("Stream starts at seq={} rtptime={}", info.seq, info.rtptime);
        ctx.state.session.rtp_info = Some(info);
    }

    if !ctx.state.session.transition(SessionState::Streaming) {
        return Err(RaopError::InvalidState(format!(
            "RECORD in state {:?}",
            ctx.state.session.state()
        )));
    }

    Ok(ResponseBuilder::ok().audio_latency(ctx.config().audio_latency))
}

/// FLUSH: drop queued audio
async fn handle_flush(request: &RtspRequest, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    ctx.require_connected(Method::Flush)?;

    if let Some(pipeline) = ctx.state.pipeline.as_ref() {
        let dropped = pipeline.shared().lock().await.flush();
        tracing::debug!("FLUSH dropped {} queued packets", dropped);
    }

    let mut response = ResponseBuilder::ok();
    if let Some(rtp_info) = request.headers.get(names::RTP_INFO) {
        response = response.header(names::RTP_INFO, rtp_info);
    }
    Ok(response)
}

/// TEARDOWN: end the session if this is the connected client
fn handle_teardown(ctx: &mut HandlerContext<'_>) -> ResponseBuilder {
    if ctx.state.is_connected(ctx.conn) {
        tracing::info!("TEARDOWN from {}", ctx.conn.peer);
        ctx.controller.end_session(ctx.state);
    } else {
        tracing::debug!("TEARDOWN with no session on connection {}", ctx.conn.id);
    }
    ResponseBuilder::ok()
}

/// GET_PARAMETER: only `volume` is answered
fn handle_get_parameter(request: &RtspRequest, ctx: &HandlerContext<'_>) -> ResponseBuilder {
    let body = request.body_text();
    let wants_volume = body.lines().any(|line| line.trim() == "volume");

    if wants_volume && ctx.state.is_connected(ctx.conn) {
        let volume = ctx.state.session.metadata.volume.unwrap_or(0.0);
        return ResponseBuilder::ok().text_body(&format!("volume: {volume:.6}\r\n"));
    }

    if !body.trim().is_empty() {
        tracing::debug!("Unanswered GET_PARAMETER: {}", body.trim());
    }
    ResponseBuilder::ok()
}
