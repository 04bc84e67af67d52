//! Wire framing for the warden daemon protocol.
//!
//! The protocol is a fixed, ordered, sentinel-delimited layout over loopback
//! TCP, not self-describing: both ends must agree on exact field order and the
//! literal marker strings. Integers are network byte order; strings follow the
//! Java `DataOutputStream.writeUTF` convention the daemon reads with (u16
//! big-endian byte length, then UTF-8 bytes).
//!
//! Request frame:
//! ```text
//! i32  messageType
//! i64  token.high        (omitted when VOID)
//! i64  token.low         (omitted when VOID)
//! -- COMMAND only --
//! utf  "HELO"
//! utf  "SERVICE:<service>"
//! utf  "COMMAND:<command>"
//! utf  "ARGUMENTS:<n>"
//! utf  arg[0] .. arg[n-1]
//! utf  "BYE"
//! ```
//!
//! Response frame: `i32 exceptionCode`, then a payload string when the code is
//! NONE (COMMAND requests) or COMMAND_ERROR.

use std::io::Read;

use bytes::BufMut;
use thiserror::Error;

use crate::token::Token;

/// Response code meaning the daemon accepted a VERIFY token.
pub const VERIFICATION_AUTHORIZED: i32 = 0;

/// Fixed result of a successful VOID dispatch, which carries no payload.
pub const VOID_RETURN_PASS: &str = "pass";

const MARKER_HELO: &str = "HELO";
const MARKER_BYE: &str = "BYE";
const PREFIX_SERVICE: &str = "SERVICE:";
const PREFIX_COMMAND: &str = "COMMAND:";
const PREFIX_ARGUMENTS: &str = "ARGUMENTS:";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("string of {len} bytes exceeds the u16 length prefix")]
    StringTooLong { len: usize },
    #[error("payload is not valid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("unknown exception code {0}")]
    UnknownExceptionCode(i32),
}

// =============================================================================
// Message and exception codes
// =============================================================================

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MessageType {
    /// Liveness probe. No token, no payload.
    Void,
    /// Full authenticated request with payload.
    Command,
    /// Token-only exchange confirming the cached token is still accepted.
    Verify,
}

impl MessageType {
    pub fn as_i32(self) -> i32 {
        match self {
            MessageType::Void => 0,
            MessageType::Command => 1,
            MessageType::Verify => 2,
        }
    }
}

/// First field of every non-VOID response.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExceptionCode {
    /// The payload that follows is the result string.
    None,
    /// The daemon rejected the token.
    Security,
    /// The dispatch ran but the requested operation failed; the payload is a
    /// human-readable message.
    CommandError,
}

impl ExceptionCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ExceptionCode::None => 0,
            ExceptionCode::Security => -1,
            ExceptionCode::CommandError => -2,
        }
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExceptionCode::None),
            -1 => Some(ExceptionCode::Security),
            -2 => Some(ExceptionCode::CommandError),
            _ => None,
        }
    }
}

// =============================================================================
// Request / Response
// =============================================================================

/// One request frame. Token presence for COMMAND and VERIFY is enforced by
/// construction; the dispatcher acquires a token before building one.
#[derive(Debug, Clone)]
pub enum Request {
    Void,
    Verify {
        token: Token,
    },
    Command {
        token: Token,
        service: String,
        command: String,
        args: Vec<String>,
    },
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Request::Void => MessageType::Void,
            Request::Verify { .. } => MessageType::Verify,
            Request::Command { .. } => MessageType::Command,
        }
    }
}

/// One decoded response frame.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Response {
    pub code: ExceptionCode,
    pub payload: Option<String>,
}

// =============================================================================
// Encode
// =============================================================================

/// Encode a request into one wire frame.
pub fn encode_request(request: &Request) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(64);
    buf.put_i32(request.message_type().as_i32());

    match request {
        Request::Void => {}
        Request::Verify { token } => {
            put_token(&mut buf, token);
        }
        Request::Command {
            token,
            service,
            command,
            args,
        } => {
            put_token(&mut buf, token);
            put_utf(&mut buf, MARKER_HELO)?;
            put_utf(&mut buf, &format!("{PREFIX_SERVICE}{service}"))?;
            put_utf(&mut buf, &format!("{PREFIX_COMMAND}{command}"))?;
            put_utf(&mut buf, &format!("{PREFIX_ARGUMENTS}{}", args.len()))?;
            for arg in args {
                put_utf(&mut buf, arg)?;
            }
            put_utf(&mut buf, MARKER_BYE)?;
        }
    }

    Ok(buf)
}

fn put_token(buf: &mut Vec<u8>, token: &Token) {
    buf.put_u64(token.high());
    buf.put_u64(token.low());
}

fn put_utf(buf: &mut Vec<u8>, s: &str) -> Result<(), WireError> {
    let bytes = s.as_bytes();
    let len =
        u16::try_from(bytes.len()).map_err(|_| WireError::StringTooLong { len: bytes.len() })?;
    buf.put_u16(len);
    buf.put_slice(bytes);
    Ok(())
}

// =============================================================================
// Decode
// =============================================================================

/// Decode the response to a request of the given type.
///
/// VOID responses carry no payload even on success, so the request type
/// decides whether a NONE code is followed by a result string.
pub fn decode_response(reader: &mut impl Read, sent: MessageType) -> Result<Response, WireError> {
    let raw = read_i32(reader)?;
    let code = ExceptionCode::from_i32(raw).ok_or(WireError::UnknownExceptionCode(raw))?;

    let payload = match (code, sent) {
        (ExceptionCode::CommandError, _) => Some(read_utf(reader)?),
        (ExceptionCode::None, MessageType::Command) => Some(read_utf(reader)?),
        _ => None,
    };

    Ok(Response { code, payload })
}

/// Read the bare verification code of a VERIFY response.
///
/// Deliberately not routed through [`decode_response`]: the authorized
/// sentinel is a raw integer compare, separate from the COMMAND
/// exception-code path even though both happen to use `0`.
pub fn read_verify_code(reader: &mut impl Read) -> Result<i32, WireError> {
    read_i32(reader)
}

fn read_i32(reader: &mut impl Read) -> Result<i32, WireError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_be_bytes(bytes))
}

fn read_utf(reader: &mut impl Read) -> Result<String, WireError> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let len = u16::from_be_bytes(len_bytes) as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn utf(s: &str) -> Vec<u8> {
        let mut out = (s.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(s.as_bytes());
        out
    }

    #[test]
    fn void_frame_is_the_bare_type_word() {
        let frame = encode_request(&Request::Void).unwrap();
        assert_eq!(frame, 0i32.to_be_bytes());
    }

    #[test]
    fn verify_frame_is_type_then_token_halves() {
        let frame = encode_request(&Request::Verify {
            token: Token::new(0x0102_0304_0506_0708, 0x1112_1314_1516_1718),
        })
        .unwrap();

        let mut expected = 2i32.to_be_bytes().to_vec();
        expected.extend_from_slice(&0x0102_0304_0506_0708u64.to_be_bytes());
        expected.extend_from_slice(&0x1112_1314_1516_1718u64.to_be_bytes());
        assert_eq!(frame, expected);
    }

    #[test]
    fn command_frame_reproduces_the_sentinel_layout() {
        let frame = encode_request(&Request::Command {
            token: Token::new(1, 2),
            service: "overlay".to_string(),
            command: "enable".to_string(),
            args: vec!["android.luvie".to_string(), "com.android.settings.luvie".to_string()],
        })
        .unwrap();

        let mut expected = 1i32.to_be_bytes().to_vec();
        expected.extend_from_slice(&1u64.to_be_bytes());
        expected.extend_from_slice(&2u64.to_be_bytes());
        expected.extend(utf("HELO"));
        expected.extend(utf("SERVICE:overlay"));
        expected.extend(utf("COMMAND:enable"));
        expected.extend(utf("ARGUMENTS:2"));
        expected.extend(utf("android.luvie"));
        expected.extend(utf("com.android.settings.luvie"));
        expected.extend(utf("BYE"));
        assert_eq!(frame, expected);
    }

    #[test]
    fn command_frame_with_no_args_still_counts_them() {
        let frame = encode_request(&Request::Command {
            token: Token::new(0, 0),
            service: "status_bar".to_string(),
            command: "expand".to_string(),
            args: Vec::new(),
        })
        .unwrap();

        let text = String::from_utf8_lossy(&frame);
        assert!(text.contains("ARGUMENTS:0"));
        assert!(text.ends_with("BYE"));
    }

    #[test]
    fn oversized_argument_is_an_encode_error() {
        let err = encode_request(&Request::Command {
            token: Token::new(0, 0),
            service: "overlay".to_string(),
            command: "enable".to_string(),
            args: vec!["x".repeat(usize::from(u16::MAX) + 1)],
        })
        .unwrap_err();
        assert!(matches!(err, WireError::StringTooLong { .. }));
    }

    #[test]
    fn success_response_carries_the_payload() {
        let mut bytes = 0i32.to_be_bytes().to_vec();
        bytes.extend(utf("enabled"));

        let response =
            decode_response(&mut Cursor::new(bytes), MessageType::Command).unwrap();
        assert_eq!(response.code, ExceptionCode::None);
        assert_eq!(response.payload.as_deref(), Some("enabled"));
    }

    #[test]
    fn void_success_response_has_no_payload() {
        let bytes = 0i32.to_be_bytes().to_vec();
        let response = decode_response(&mut Cursor::new(bytes), MessageType::Void).unwrap();
        assert_eq!(response.code, ExceptionCode::None);
        assert_eq!(response.payload, None);
    }

    #[test]
    fn security_response_has_no_payload() {
        let bytes = (-1i32).to_be_bytes().to_vec();
        let response = decode_response(&mut Cursor::new(bytes), MessageType::Command).unwrap();
        assert_eq!(response.code, ExceptionCode::Security);
        assert_eq!(response.payload, None);
    }

    #[test]
    fn command_error_response_carries_the_message() {
        let mut bytes = (-2i32).to_be_bytes().to_vec();
        bytes.extend(utf("overlay not found"));

        let response = decode_response(&mut Cursor::new(bytes), MessageType::Command).unwrap();
        assert_eq!(response.code, ExceptionCode::CommandError);
        assert_eq!(response.payload.as_deref(), Some("overlay not found"));
    }

    #[test]
    fn unknown_exception_code_is_a_decode_error() {
        let bytes = 7i32.to_be_bytes().to_vec();
        let err = decode_response(&mut Cursor::new(bytes), MessageType::Command).unwrap_err();
        assert!(matches!(err, WireError::UnknownExceptionCode(7)));
    }

    #[test]
    fn truncated_response_is_an_io_error() {
        let mut bytes = 0i32.to_be_bytes().to_vec();
        bytes.extend_from_slice(&100u16.to_be_bytes()); // promises 100 bytes, sends none

        let err = decode_response(&mut Cursor::new(bytes), MessageType::Command).unwrap_err();
        assert!(matches!(err, WireError::Io(_)));
    }

    #[test]
    fn verify_code_is_a_bare_integer() {
        let bytes = VERIFICATION_AUTHORIZED.to_be_bytes().to_vec();
        assert_eq!(read_verify_code(&mut Cursor::new(bytes)).unwrap(), 0);
    }
}
