use crate::recipient::{Recipient, Recipients, KEY_ID_SIZE};

use super::PKESK_TAG;

/// Only v3 key records carry a plain key id
const PKESK_V3: u8 = 3;
/// version + key id + public key algorithm
const PKESK_V3_MIN_BODY: usize = 1 + KEY_ID_SIZE + 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("invalid packet header at offset {0}")]
    InvalidHeader(usize),
    #[error("truncated length field at offset {0}")]
    TruncatedLength(usize),
    #[error("packet at offset {offset} declares {declared} bytes but only {remaining} remain")]
    TruncatedBody {
        offset: usize,
        declared: usize,
        remaining: usize,
    },
    #[error("key record at offset {0} has no definite length")]
    IndefiniteLength(usize),
    #[error("key record at offset {0} is too short to hold a key id")]
    KeyRecordTooShort(usize),
    #[error("unsupported key record version {version} at offset {offset}")]
    UnsupportedVersion { offset: usize, version: u8 },
}

/// Extract the recipients named by the session key packets at the
///  head of an OpenPGP message.
///
/// Packets are read in order until the first packet that is not a
///  session key packet, at which point scanning stops without looking
///  at that packet's length or body. Reaching the end of the input on
///  a packet boundary is a normal end of the header, so an empty input
///  yields an empty set.
///
/// # Errors
///
/// Any framing problem inside the recipient header is reported as a
///  [`ContainerError`]; bytes after the header are never inspected.
pub fn extract_recipients(data: &[u8]) -> Result<Recipients, ContainerError> {
    let mut recipients = Recipients::new();
    let mut offset = 0;

    while offset < data.len() {
        let header = data[offset];
        if header & 0x80 == 0 {
            return Err(ContainerError::InvalidHeader(offset));
        }

        let new_format = header & 0x40 != 0;
        let tag = if new_format {
            header & 0x3F
        } else {
            (header >> 2) & 0x0F
        };
        if tag != PKESK_TAG {
            break;
        }

        let (body_start, body_len) = if new_format {
            new_format_length(data, offset)?
        } else {
            old_format_length(data, offset, header)?
        };

        let remaining = data.len() - body_start;
        if body_len > remaining {
            return Err(ContainerError::TruncatedBody {
                offset,
                declared: body_len,
                remaining,
            });
        }

        let body = &data[body_start..body_start + body_len];
        recipients.insert(key_id(body, offset)?);
        offset = body_start + body_len;
    }

    Ok(recipients)
}

/// Returns the offset of the body and its length
fn old_format_length(
    data: &[u8],
    offset: usize,
    header: u8,
) -> Result<(usize, usize), ContainerError> {
    let width = match header & 0x03 {
        0 => 1,
        1 => 2,
        2 => 4,
        _ => return Err(ContainerError::IndefiniteLength(offset)),
    };
    let start = offset + 1;
    let field = data
        .get(start..start + width)
        .ok_or(ContainerError::TruncatedLength(offset))?;
    let len = field.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok((start + width, len))
}

fn new_format_length(data: &[u8], offset: usize) -> Result<(usize, usize), ContainerError> {
    let start = offset + 1;
    let first = *data
        .get(start)
        .ok_or(ContainerError::TruncatedLength(offset))? as usize;

    match first {
        0..=191 => Ok((start + 1, first)),
        192..=223 => {
            let second = *data
                .get(start + 1)
                .ok_or(ContainerError::TruncatedLength(offset))? as usize;
            Ok((start + 2, ((first - 192) << 8) + second + 192))
        }
        255 => {
            let field = data
                .get(start + 1..start + 5)
                .ok_or(ContainerError::TruncatedLength(offset))?;
            let len = u32::from_be_bytes([field[0], field[1], field[2], field[3]]) as usize;
            Ok((start + 5, len))
        }
        // partial body lengths are never valid for a key record
        _ => Err(ContainerError::IndefiniteLength(offset)),
    }
}

fn key_id(body: &[u8], offset: usize) -> Result<Recipient, ContainerError> {
    let version = *body
        .first()
        .ok_or(ContainerError::KeyRecordTooShort(offset))?;
    if version != PKESK_V3 {
        return Err(ContainerError::UnsupportedVersion { offset, version });
    }
    if body.len() < PKESK_V3_MIN_BODY {
        return Err(ContainerError::KeyRecordTooShort(offset));
    }

    let mut id = [0u8; KEY_ID_SIZE];
    id.copy_from_slice(&body[1..1 + KEY_ID_SIZE]);
    Ok(Recipient::from_bytes(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ContainerBuilder;

    fn ids(ids: &[u64]) -> Vec<Recipient> {
        ids.iter().map(|id| Recipient::from_u64(*id)).collect()
    }

    #[test]
    fn test_recipients_then_payload() {
        let data = ContainerBuilder::new()
            .recipients(ids(&[0xA, 0xB, 0xC]))
            .payload(b"ciphertext")
            .build();

        let recipients = extract_recipients(&data).unwrap();
        assert_eq!(recipients.as_slice(), ids(&[0xA, 0xB, 0xC]).as_slice());
    }

    #[test]
    fn test_no_recipients_then_payload() {
        let data = ContainerBuilder::new().payload(b"ciphertext").build();
        assert!(extract_recipients(&data).unwrap().is_empty());
    }

    #[test]
    fn test_empty_input_is_empty_header() {
        assert!(extract_recipients(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_header_only_is_accepted() {
        let data = ContainerBuilder::new().recipients(ids(&[0x1])).build();
        assert_eq!(extract_recipients(&data).unwrap().len(), 1);
    }

    #[test]
    fn test_old_format_headers() {
        let data = ContainerBuilder::new()
            .old_format()
            .recipients(ids(&[0x11, 0x22]))
            .payload(b"x")
            .build();
        assert_eq!(
            extract_recipients(&data).unwrap().as_slice(),
            ids(&[0x11, 0x22]).as_slice()
        );
    }

    #[test]
    fn test_payload_is_not_parsed() {
        // a payload packet with a bogus length must not matter
        let mut data = ContainerBuilder::new().recipients(ids(&[0x1])).build();
        data.extend_from_slice(&[0xD2, 0xFF, 0xFF]);
        assert_eq!(extract_recipients(&data).unwrap().len(), 1);
    }

    #[test]
    fn test_truncated_body() {
        let mut data = ContainerBuilder::new()
            .recipients(ids(&[0x1, 0x2]))
            .build();
        data.truncate(data.len() - 3);
        assert!(matches!(
            extract_recipients(&data),
            Err(ContainerError::TruncatedBody { .. })
        ));
    }

    #[test]
    fn test_truncated_length() {
        // new format, two octet length with the second octet missing
        assert_eq!(
            extract_recipients(&[0xC1, 0xC0]),
            Err(ContainerError::TruncatedLength(0))
        );
    }

    #[test]
    fn test_invalid_header_bit() {
        assert_eq!(
            extract_recipients(&[0x01, 0x02]),
            Err(ContainerError::InvalidHeader(0))
        );
    }

    #[test]
    fn test_partial_length_key_record() {
        assert_eq!(
            extract_recipients(&[0xC1, 0xE0, 0x00]),
            Err(ContainerError::IndefiniteLength(0))
        );
    }

    #[test]
    fn test_unsupported_version() {
        let mut packet = vec![0xC1, 12, 6];
        packet.extend_from_slice(&[0u8; 11]);
        assert!(matches!(
            extract_recipients(&packet),
            Err(ContainerError::UnsupportedVersion { version: 6, .. })
        ));
    }

    #[test]
    fn test_duplicate_records_collapse() {
        let data = ContainerBuilder::new()
            .recipients(ids(&[0x5, 0x5, 0x6]))
            .payload(b"x")
            .build();
        assert_eq!(extract_recipients(&data).unwrap().len(), 2);
    }
}
