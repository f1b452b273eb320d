//! SET_PARAMETER request routing

use bytes::Bytes;

use super::events::ReceiverEvent;
use super::session::Metadata;
use super::session_manager::{HandlerContext, HandlerResult};
use crate::protocol::daap;
use crate::protocol::rtsp::headers::content_types;
use crate::protocol::rtsp::{Method, ResponseBuilder, RtspRequest, StatusCode};

/// A parsed `text/parameters` line
#[derive(Debug, Clone, PartialEq)]
pub enum TextParameter {
    /// `volume: <dB>`
    Volume(f32),
    /// `progress: <start>/<current>/<end>`, verbatim
    Progress(String),
    /// Anything else
    Other(String, String),
}

impl TextParameter {
    /// Parse the first `key: value` line of a body
    ///
    /// Returns `None` if there is no colon or `volume` is not a number.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let line = body.lines().find(|l| !l.trim().is_empty())?;
        let (key, value) = line.split_once(':')?;
        let value = value.trim();

        Some(match key.trim() {
            "volume" => Self::Volume(value.parse().ok()?),
            "progress" => Self::Progress(value.to_string()),
            other => Self::Other(other.to_string(), value.to_string()),
        })
    }
}

pub(crate) fn handle_set_parameter(request: &RtspRequest, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    ctx.require_connected(Method::SetParameter)?;

    let media_type = request.headers.media_type().unwrap_or_default();

    match media_type.as_str() {
        content_types::DMAP => {
            let tags = daap::decode(&request.body);
            tracing::debug!("Received metadata ({} tags)", tags.len());
            // a DMAP update replaces the whole snapshot
            let metadata = Metadata {
                tags,
                ..Metadata::default()
            };
            ctx.state.session.metadata = metadata.clone();
            ctx.emit(ReceiverEvent::MetadataChanged(metadata));
        }
        content_types::JPEG => {
            let artwork = Bytes::copy_from_slice(&request.body);
            tracing::debug!("Received artwork (length: {})", artwork.len());
            ctx.state.session.metadata.artwork = Some(artwork.clone());
            ctx.emit(ReceiverEvent::ArtworkChanged(artwork));
        }
        content_types::TEXT_PARAMETERS => {
            return Ok(apply_text_parameter(&request.body_text(), ctx));
        }
        content_types::NO_IMAGE => {
            tracing::trace!("Artwork cleared by sender");
        }
        other => {
            tracing::debug!("Uncaptured SET_PARAMETER ({}): {} bytes", other, request.body.len());
        }
    }

    Ok(ResponseBuilder::ok())
}

fn apply_text_parameter(body: &str, ctx: &mut HandlerContext<'_>) -> ResponseBuilder {
    let Some(parameter) = TextParameter::parse(body) else {
        tracing::warn!("Malformed text parameter: {}", body.trim());
        return ResponseBuilder::error(StatusCode::BAD_REQUEST);
    };

    let metadata = &mut ctx.state.session.metadata;
    match parameter {
        TextParameter::Volume(volume) => {
            tracing::debug!("Volume {}", volume);
            metadata.volume = Some(volume);
            ctx.emit(ReceiverEvent::VolumeChanged(volume));
        }
        TextParameter::Progress(progress) => {
            tracing::debug!("Progress {}", progress);
            metadata.progress = Some(progress.clone());
            ctx.emit(ReceiverEvent::ProgressChanged(progress));
        }
        TextParameter::Other(key, value) => {
            tracing::debug!("Ignoring text parameter {}: {}", key, value);
        }
    }
    ResponseBuilder::ok()
}
