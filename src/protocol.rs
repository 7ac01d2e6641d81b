//! Bluno serial service constants and line framing.

use std::string::FromUtf8Error;

use uuid::Uuid;

pub const DEFAULT_DEVICE: &str = "50:65:83:99:4B:5E";

pub const SERIAL_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000dfb0_0000_1000_8000_00805f9b34fb);
/// Serial port characteristic, used both for writes and notifications.
pub const SERIAL_PORT_UUID: Uuid = Uuid::from_u128(0x0000dfb1_0000_1000_8000_00805f9b34fb);
/// AT command characteristic of the Bluno firmware.
pub const COMMAND_UUID: Uuid = Uuid::from_u128(0x0000dfb2_0000_1000_8000_00805f9b34fb);

pub const DEVICE_INFORMATION_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const MODEL_NUMBER_UUID: Uuid = Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb);

/// Terminates every command and, by convention, every response.
pub const TERMINATOR: u8 = b'\r';

/// Keep packets within the lowest possible BLE ATT MTU.
pub const MIN_MTU_PAYLOAD: usize = 20;

/// Appends the terminator to a user line.
pub fn frame_command(line: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(line.len() + 1);
    frame.extend_from_slice(line.as_bytes());
    frame.push(TERMINATOR);
    frame
}

/// A response is complete when it is non-empty and ends with the terminator.
pub fn is_complete(bytes: &[u8]) -> bool {
    bytes.last() == Some(&TERMINATOR)
}

/// Decodes a response for display.
///
/// The trailing terminator is dropped and interior terminators become line
/// breaks.
pub fn render_response(bytes: Vec<u8>) -> Result<String, FromUtf8Error> {
    let text = String::from_utf8(bytes)?;
    let text = text.strip_suffix(TERMINATOR as char).unwrap_or(&text);
    Ok(text.replace(TERMINATOR as char, "\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_command() {
        assert_eq!(frame_command("AT+VERSION"), b"AT+VERSION\r".to_vec());
        assert_eq!(frame_command(""), b"\r".to_vec());
    }

    #[test]
    fn test_is_complete() {
        assert!(!is_complete(b""));
        assert!(!is_complete(b"P"));
        assert!(!is_complete(b"v1.0\r\n"));
        assert!(is_complete(b"v1.0\r"));
        assert!(is_complete(b"\r"));
    }

    #[test]
    fn test_render_response() {
        assert_eq!(render_response(b"v1.0\r".to_vec()).unwrap(), "v1.0");
        assert_eq!(render_response(b"PON".to_vec()).unwrap(), "PON");
        assert_eq!(render_response(Vec::new()).unwrap(), "");
        assert_eq!(render_response(b"a\rb\r".to_vec()).unwrap(), "a\nb");
    }

    #[test]
    fn test_render_response_invalid_utf8() {
        assert!(render_response(vec![0xff, b'\r']).is_err());
    }

    #[test]
    fn test_uuids() {
        assert_eq!(
            SERIAL_PORT_UUID.to_string(),
            "0000dfb1-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            MODEL_NUMBER_UUID.to_string(),
            "00002a24-0000-1000-8000-00805f9b34fb"
        );
    }
}
