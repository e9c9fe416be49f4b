use crate::error::SessionError;

/// Flags bit 0 of a Heart Rate Measurement frame: value format is u16.
const FLAG_BPM_U16: u8 = 0b0000_0001;

/// Decode a Heart Rate Measurement characteristic value into BPM.
///
/// Layout per the standard profile: byte 0 is a flags bitfield; if bit 0 is
/// clear the value is a u8 at byte 1, otherwise a little-endian u16 at bytes
/// 1-2. Sensor-contact, energy-expended and RR-interval fields may trail the
/// value and are ignored. Frames too short for their declared form are
/// rejected, never indexed past the end.
pub fn decode_bpm(frame: &[u8]) -> Result<u16, SessionError> {
    let undersized = SessionError::DecodeError { len: frame.len() };

    let flags = *frame.first().ok_or(undersized.clone())?;
    if flags & FLAG_BPM_U16 == 0 {
        frame.get(1).map(|value| u16::from(*value)).ok_or(undersized)
    } else {
        let value = frame.get(1..3).ok_or(undersized)?;
        Ok(u16::from_le_bytes([value[0], value[1]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_u8_value() {
        for value in 0..=255u8 {
            assert_eq!(decode_bpm(&[0x00, value]), Ok(u16::from(value)));
        }
    }

    #[test]
    fn decodes_u16_little_endian() {
        assert_eq!(decode_bpm(&[0x01, 0xFF, 0x01]), Ok(511));
        assert_eq!(decode_bpm(&[0x01, 0x00, 0x01]), Ok(256));
        assert_eq!(decode_bpm(&[0x01, 0x48, 0x00]), Ok(72));
    }

    #[test]
    fn decodes_resting_rate() {
        assert_eq!(decode_bpm(&[0x00, 0x4B]), Ok(75));
    }

    #[test]
    fn ignores_non_format_flag_bits() {
        // sensor contact + energy expended set, still the u8 form
        assert_eq!(decode_bpm(&[0b0001_0110, 90]), Ok(90));
    }

    #[test]
    fn ignores_trailing_fields() {
        // RR intervals after the value must not affect the result
        assert_eq!(decode_bpm(&[0x10, 80, 0x34, 0x02]), Ok(80));
        assert_eq!(decode_bpm(&[0x11, 0x40, 0x01, 0x34, 0x02]), Ok(320));
    }

    #[test]
    fn rejects_undersized_frames() {
        assert_eq!(decode_bpm(&[]), Err(SessionError::DecodeError { len: 0 }));
        assert_eq!(decode_bpm(&[0x00]), Err(SessionError::DecodeError { len: 1 }));
        // declared u16 but only one value byte present
        assert_eq!(decode_bpm(&[0x01, 0x50]), Err(SessionError::DecodeError { len: 2 }));
    }
}
