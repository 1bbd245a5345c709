//! Wand frame codec
//!
//! Pure conversions between notification/command payloads and typed values.

use crate::error::{Error, Result};
use crate::wand::types::{Pattern, Position, Stream, Vibration, WandEvent};

fn ensure_len(data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(Error::InvalidFrame {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn read_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Decode a quaternion frame
///
/// The wand lays the fields out as `(y, x, w, z)`; `w` is reported as roll.
pub fn decode_motion(data: &[u8]) -> Result<Position> {
    ensure_len(data, 8)?;

    let y = read_i16(data, 0);
    let x = read_i16(data, 2);
    let w = read_i16(data, 4);
    let z = read_i16(data, 6);

    Ok(Position { roll: w, x, y, z })
}

/// Decode a user button frame (pressed iff the byte is 1)
pub fn decode_button(data: &[u8]) -> Result<bool> {
    ensure_len(data, 1)?;
    Ok(data[0] == 1)
}

/// Decode a temperature frame
pub fn decode_temperature(data: &[u8]) -> Result<i16> {
    ensure_len(data, 2)?;
    Ok(read_i16(data, 0))
}

/// Decode a battery frame
pub fn decode_battery(data: &[u8]) -> Result<u8> {
    ensure_len(data, 1)?;
    Ok(data[0])
}

/// Decode a notification frame for `stream`
pub fn decode_event(stream: Stream, data: &[u8]) -> Result<WandEvent> {
    Ok(match stream {
        Stream::Position => WandEvent::Position(decode_motion(data)?),
        Stream::Button => WandEvent::Button(decode_button(data)?),
        Stream::Temperature => WandEvent::Temperature(decode_temperature(data)?),
        Stream::Battery => WandEvent::Battery(decode_battery(data)?),
    })
}

/// Parse `#RRGGBB`, `0xRRGGBB` or `RRGGBB` into its components
pub fn parse_color(color: &str) -> Result<(u8, u8, u8)> {
    let trimmed = color.trim();
    let hex = trimmed
        .strip_prefix('#')
        .or_else(|| trimmed.strip_prefix("0x"))
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidColor(color.to_string()));
    }

    let value = u32::from_str_radix(hex, 16).map_err(|_| Error::InvalidColor(color.to_string()))?;
    let r = ((value >> 16) & 0xFF) as u8;
    let g = ((value >> 8) & 0xFF) as u8;
    let b = (value & 0xFF) as u8;

    Ok((r, g, b))
}

/// Pack an RGB colour into RGB565
pub fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    let r = r as u16;
    let g = g as u16;
    let b = b as u16;

    ((r & 0xF8) << 8) | ((g & 0xFC) << 3) | ((b & 0xF8) >> 3)
}

/// Build the 3-byte LED command
pub fn encode_led(color: &str, on: bool) -> Result<[u8; 3]> {
    let (r, g, b) = parse_color(color)?;
    let packed = rgb565(r, g, b);

    Ok([u8::from(on), (packed >> 8) as u8, (packed & 0xFF) as u8])
}

/// Build the 1-byte vibration command
pub fn encode_vibration(vibration: impl Into<Vibration>) -> [u8; 1] {
    match vibration.into() {
        Vibration::Pattern(pattern) => [pattern.code()],
        Vibration::Raw(code) => [code],
    }
}

impl Pattern {
    /// Firmware code for this pattern
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(y: i16, x: i16, w: i16, z: i16) -> Vec<u8> {
        [y, x, w, z].iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_motion_remaps_fields() {
        let position = decode_motion(&wire(100, 200, 300, 400)).unwrap();
        assert_eq!(position, Position { roll: 300, x: 200, y: 100, z: 400 });
    }

    #[test]
    fn test_decode_motion_signed() {
        let position = decode_motion(&[0xFF, 0xFF, 0x00, 0x80, 0xFF, 0x7F, 0x18, 0xFC]).unwrap();
        assert_eq!(position.y, -1);
        assert_eq!(position.x, i16::MIN);
        assert_eq!(position.roll, i16::MAX);
        assert_eq!(position.z, -1000);
    }

    #[test]
    fn test_decode_motion_short_frame() {
        let err = decode_motion(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, Error::InvalidFrame { expected: 8, actual: 3 }));
    }

    #[test]
    fn test_decode_button() {
        assert!(decode_button(&[1]).unwrap());
        assert!(!decode_button(&[0]).unwrap());
        assert!(!decode_button(&[2]).unwrap());
        assert!(decode_button(&[]).is_err());
    }

    #[test]
    fn test_decode_temperature_and_battery() {
        assert_eq!(decode_temperature(&[0x19, 0x00]).unwrap(), 25);
        assert_eq!(decode_temperature(&[0xF6, 0xFF]).unwrap(), -10);
        assert_eq!(decode_battery(&[0xC8]).unwrap(), 200);
    }

    #[test]
    fn test_decode_event_by_stream() {
        assert_eq!(decode_event(Stream::Button, &[1]).unwrap(), WandEvent::Button(true));
        assert_eq!(decode_event(Stream::Battery, &[87]).unwrap(), WandEvent::Battery(87));
        assert!(decode_event(Stream::Position, &[1, 2]).is_err());
    }

    #[test]
    fn test_encode_led_known_values() {
        assert_eq!(encode_led("#FF0000", true).unwrap(), [1, 0xF8, 0x00]);
        assert_eq!(encode_led("#000000", false).unwrap(), [0, 0x00, 0x00]);
        assert_eq!(encode_led("#FFFFFF", true).unwrap(), [1, 0xFF, 0xFF]);
        assert_eq!(encode_led("00FF00", true).unwrap(), [1, 0x07, 0xE0]);
    }

    #[test]
    fn test_encode_led_prefix_forms_agree() {
        for value in ["2185d0", "a333c8", "21ba45", "fbbd08"] {
            let plain = encode_led(value, true).unwrap();
            assert_eq!(encode_led(&format!("#{}", value), true).unwrap(), plain);
            assert_eq!(encode_led(&format!("0x{}", value), true).unwrap(), plain);
        }
    }

    #[test]
    fn test_encode_led_invalid() {
        for bad in ["", "#", "0x12345", "#GGGGGG", "1234567", "red"] {
            assert!(matches!(encode_led(bad, true), Err(Error::InvalidColor(_))), "{}", bad);
        }
    }

    #[test]
    fn test_encode_vibration() {
        assert_eq!(encode_vibration(Pattern::Regular), [1]);
        assert_eq!(encode_vibration(Pattern::Burst), [3]);
        assert_eq!(encode_vibration(Pattern::BigPause), [7]);
        assert_eq!(encode_vibration(42u8), [42]);
    }
}
