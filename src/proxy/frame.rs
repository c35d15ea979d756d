//! Frame model shared by both relay directions.
//!
//! The client side of a session speaks `axum::extract::ws::Message` and the
//! backend side speaks `tungstenite::Message`. `RelayFrame` is the common
//! currency the relay loops move between them; conversions are lossless for
//! everything a peer can legitimately send.

use axum::body::Bytes;
use axum::extract::ws;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TsCloseFrame;

/// Close code written when a direction dies without a clean close frame.
/// 1006 is reserved for local reporting and may not appear on the wire.
pub const ABNORMAL_CLOSE_CODE: u16 = 1011;

/// A control frame payload must fit in 125 bytes; two of those carry the
/// close code.
const MAX_CLOSE_REASON_BYTES: usize = 123;

/// One frame in flight between the two connections of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    /// UTF-8 text data frame.
    Text(String),
    /// Binary data frame.
    Binary(Bytes),
    /// Protocol control frame.
    Control(ControlSignal),
}

/// A non-data frame, held only while it crosses from one connection to the
/// other.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlSignal {
    Ping(Bytes),
    Pong(Bytes),
    /// A close frame; `None` is the no-status close.
    Close(Option<ClosePayload>),
}

/// Close code and reason as received from one side of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosePayload {
    pub code: u16,
    pub reason: String,
}

impl ClosePayload {
    /// Close payload used when a relay direction fails abnormally. The
    /// reason is clipped so code + reason fit in a control frame.
    pub fn abnormal(reason: &str) -> Self {
        Self {
            code: ABNORMAL_CLOSE_CODE,
            reason: truncate_reason(reason),
        }
    }
}

fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON_BYTES {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

impl RelayFrame {
    pub fn is_control(&self) -> bool {
        matches!(self, RelayFrame::Control(_))
    }
}

/// A wire message type the relay can translate to and from [`RelayFrame`].
///
/// Implemented for the two message enums a session touches, so the relay
/// loop itself is written once.
pub trait WireMessage: Sized + Send + 'static {
    fn from_frame(frame: RelayFrame) -> Self;
    fn into_frame(self) -> RelayFrame;
}

impl WireMessage for ws::Message {
    fn from_frame(frame: RelayFrame) -> Self {
        match frame {
            RelayFrame::Text(text) => ws::Message::Text(text.into()),
            RelayFrame::Binary(data) => ws::Message::Binary(data),
            RelayFrame::Control(ControlSignal::Ping(payload)) => ws::Message::Ping(payload),
            RelayFrame::Control(ControlSignal::Pong(payload)) => ws::Message::Pong(payload),
            RelayFrame::Control(ControlSignal::Close(payload)) => {
                ws::Message::Close(payload.map(|p| ws::CloseFrame {
                    code: p.code,
                    reason: p.reason.into(),
                }))
            }
        }
    }

    fn into_frame(self) -> RelayFrame {
        match self {
            ws::Message::Text(text) => RelayFrame::Text(text.as_str().to_owned()),
            ws::Message::Binary(data) => RelayFrame::Binary(data),
            ws::Message::Ping(payload) => RelayFrame::Control(ControlSignal::Ping(payload)),
            ws::Message::Pong(payload) => RelayFrame::Control(ControlSignal::Pong(payload)),
            ws::Message::Close(frame) => {
                RelayFrame::Control(ControlSignal::Close(frame.map(|f| ClosePayload {
                    code: f.code,
                    reason: f.reason.as_str().to_owned(),
                })))
            }
        }
    }
}

impl WireMessage for tungstenite::Message {
    fn from_frame(frame: RelayFrame) -> Self {
        match frame {
            RelayFrame::Text(text) => tungstenite::Message::Text(text.into()),
            RelayFrame::Binary(data) => tungstenite::Message::Binary(data),
            RelayFrame::Control(ControlSignal::Ping(payload)) => {
                tungstenite::Message::Ping(payload)
            }
            RelayFrame::Control(ControlSignal::Pong(payload)) => {
                tungstenite::Message::Pong(payload)
            }
            RelayFrame::Control(ControlSignal::Close(payload)) => {
                tungstenite::Message::Close(payload.map(|p| TsCloseFrame {
                    code: CloseCode::from(p.code),
                    reason: p.reason.into(),
                }))
            }
        }
    }

    fn into_frame(self) -> RelayFrame {
        match self {
            tungstenite::Message::Text(text) => RelayFrame::Text(text.as_str().to_owned()),
            tungstenite::Message::Binary(data) => RelayFrame::Binary(data),
            tungstenite::Message::Ping(payload) => {
                RelayFrame::Control(ControlSignal::Ping(payload))
            }
            tungstenite::Message::Pong(payload) => {
                RelayFrame::Control(ControlSignal::Pong(payload))
            }
            tungstenite::Message::Close(frame) => {
                RelayFrame::Control(ControlSignal::Close(frame.map(|f| ClosePayload {
                    code: f.code.into(),
                    reason: f.reason.as_str().to_owned(),
                })))
            }
            // Raw frames are only produced by manual frame writing, which the
            // relay never does; treat the payload as opaque binary data.
            message @ tungstenite::Message::Frame(_) => RelayFrame::Binary(message.into_data()),
        }
    }
}
