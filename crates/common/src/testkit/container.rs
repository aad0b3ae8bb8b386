use crate::container::PKESK_TAG;
use crate::recipient::{Recipient, Recipients};

/// Symmetrically Encrypted and Integrity Protected Data
const SEIPD_TAG: u8 = 18;
/// RSA, the most common key record algorithm
const RSA_ALGORITHM: u8 = 1;
/// Stand-in for the encrypted session key MPI
const FAKE_SESSION_KEY: [u8; 6] = [0x00, 0x20, 0xDE, 0xAD, 0xBE, 0xEF];

/// Builds OpenPGP framed containers with chosen key records
#[derive(Debug, Clone, Default)]
pub struct ContainerBuilder {
    old_format: bool,
    recipients: Vec<Recipient>,
    payload: Option<Vec<u8>>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use old format packet headers
    pub fn old_format(mut self) -> Self {
        self.old_format = true;
        self
    }

    /// Add key records, duplicates included, in order
    pub fn recipients(mut self, recipients: impl IntoIterator<Item = Recipient>) -> Self {
        self.recipients.extend(recipients);
        self
    }

    pub fn recipient(mut self, recipient: Recipient) -> Self {
        self.recipients.push(recipient);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = Some(payload.to_vec());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for recipient in self.recipients.iter() {
            let mut body = vec![3];
            body.extend_from_slice(recipient.as_bytes());
            body.push(RSA_ALGORITHM);
            body.extend_from_slice(&FAKE_SESSION_KEY);
            self.write_packet(&mut out, PKESK_TAG, &body);
        }
        if let Some(payload) = &self.payload {
            let mut body = vec![1];
            body.extend_from_slice(payload);
            self.write_packet(&mut out, SEIPD_TAG, &body);
        }
        out
    }

    /// A container for `recipients` whose payload is `plaintext`
    pub fn seal(recipients: &Recipients, plaintext: &[u8]) -> Vec<u8> {
        Self::new()
            .recipients(recipients.iter().copied())
            .payload(plaintext)
            .build()
    }

    /// Recover the payload of a container made by [`ContainerBuilder`]
    pub fn open(data: &[u8]) -> Option<Vec<u8>> {
        let mut offset = 0;
        while offset < data.len() {
            let header = data[offset];
            if header & 0x80 == 0 {
                return None;
            }
            let (tag, start, len) = if header & 0x40 != 0 {
                let first = *data.get(offset + 1)? as usize;
                match first {
                    0..=191 => (header & 0x3F, offset + 2, first),
                    192..=223 => {
                        let second = *data.get(offset + 2)? as usize;
                        (header & 0x3F, offset + 3, ((first - 192) << 8) + second + 192)
                    }
                    255 => {
                        let f = data.get(offset + 2..offset + 6)?;
                        let len = u32::from_be_bytes([f[0], f[1], f[2], f[3]]) as usize;
                        (header & 0x3F, offset + 6, len)
                    }
                    _ => return None,
                }
            } else {
                let width = match header & 0x03 {
                    0 => 1,
                    1 => 2,
                    2 => 4,
                    _ => return None,
                };
                let field = data.get(offset + 1..offset + 1 + width)?;
                let len = field.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
                ((header >> 2) & 0x0F, offset + 1 + width, len)
            };

            let body = data.get(start..start + len)?;
            if tag == SEIPD_TAG {
                return body.get(1..).map(|p| p.to_vec());
            }
            offset = start + len;
        }
        None
    }

    fn write_packet(&self, out: &mut Vec<u8>, tag: u8, body: &[u8]) {
        let len = body.len();
        if self.old_format {
            let tag_bits = (tag & 0x0F) << 2;
            if len < 0x100 {
                out.push(0x80 | tag_bits);
                out.push(len as u8);
            } else if len < 0x10000 {
                out.push(0x80 | tag_bits | 1);
                out.extend_from_slice(&(len as u16).to_be_bytes());
            } else {
                out.push(0x80 | tag_bits | 2);
                out.extend_from_slice(&(len as u32).to_be_bytes());
            }
        } else {
            out.push(0xC0 | tag);
            if len < 192 {
                out.push(len as u8);
            } else if len < 8384 {
                let adjusted = len - 192;
                out.push(((adjusted >> 8) + 192) as u8);
                out.push((adjusted & 0xFF) as u8);
            } else {
                out.push(0xFF);
                out.extend_from_slice(&(len as u32).to_be_bytes());
            }
        }
        out.extend_from_slice(body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::extract_recipients;

    #[test]
    fn test_seal_and_open() {
        let recipients: Recipients = vec![Recipient::from_u64(7)].into();
        let sealed = ContainerBuilder::seal(&recipients, b"secret");
        assert_eq!(extract_recipients(&sealed).unwrap(), recipients);
        assert_eq!(ContainerBuilder::open(&sealed).unwrap(), b"secret".to_vec());
    }

    #[test]
    fn test_long_payload_lengths() {
        for size in [191usize, 192, 8383, 8384, 70_000] {
            let payload = vec![0xAB; size];
            for builder in [ContainerBuilder::new(), ContainerBuilder::new().old_format()] {
                let data = builder
                    .recipient(Recipient::from_u64(1))
                    .payload(&payload)
                    .build();
                assert_eq!(extract_recipients(&data).unwrap().len(), 1);
                assert_eq!(ContainerBuilder::open(&data).unwrap().len(), size);
            }
        }
    }
}
