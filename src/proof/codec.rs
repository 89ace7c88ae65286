//! Binary encoding of proof blobs
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! proof    := MAGIC digest[32] u32 seq_count sequence*
//! sequence := u32 step_count step*
//! step     := u32 output_len output[..] att
//! att      := 0x00 | 0x01 u32 uri_len uri[..] | 0x02 u64 height
//! ```

use thiserror::Error;

use super::{Attestation, ProofFile, Sequence, Step};

/// Magic header of the on-disk proof blob
pub const MAGIC: &[u8] = b"\x00OTS\x01";

const ATT_NONE: u8 = 0x00;
const ATT_PENDING: u8 = 0x01;
const ATT_BITCOIN: u8 = 0x02;

/// Proof blob parse errors
#[derive(Debug, Clone, Error)]
pub enum ProofError {
    #[error("proof blob truncated")]
    Truncated,

    #[error("bad magic bytes")]
    BadMagic,

    #[error("invalid attestation tag {0:#04x}")]
    InvalidTag(u8),

    #[error("calendar uri is not utf-8")]
    InvalidUri,

    #[error("trailing bytes after proof")]
    TrailingBytes,
}

pub fn encode_proof(proof: &ProofFile) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&proof.digest);
    out.extend_from_slice(&(proof.sequences.len() as u32).to_le_bytes());
    for seq in &proof.sequences {
        write_sequence(&mut out, seq);
    }
    out
}

pub fn decode_proof(bytes: &[u8]) -> Result<ProofFile, ProofError> {
    let mut cursor = Cursor::new(bytes);
    if cursor.take(MAGIC.len())? != MAGIC {
        return Err(ProofError::BadMagic);
    }
    let digest: [u8; 32] = cursor
        .take(32)?
        .try_into()
        .map_err(|_| ProofError::Truncated)?;
    let seq_count = cursor.take_u32()?;
    // counts are attacker-controlled, cap the pre-allocation
    let mut sequences = Vec::with_capacity((seq_count as usize).min(64));
    for _ in 0..seq_count {
        sequences.push(read_sequence(&mut cursor)?);
    }
    cursor.finish()?;
    Ok(ProofFile { digest, sequences })
}

pub fn encode_sequence(seq: &Sequence) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    write_sequence(&mut out, seq);
    out
}

/// Decode a bare sequence, rejecting trailing bytes
pub fn decode_sequence_exact(bytes: &[u8]) -> Result<Sequence, ProofError> {
    let mut cursor = Cursor::new(bytes);
    let seq = read_sequence(&mut cursor)?;
    cursor.finish()?;
    Ok(seq)
}

fn write_sequence(out: &mut Vec<u8>, seq: &Sequence) {
    out.extend_from_slice(&(seq.steps.len() as u32).to_le_bytes());
    for step in &seq.steps {
        out.extend_from_slice(&(step.output.len() as u32).to_le_bytes());
        out.extend_from_slice(&step.output);
        match &step.attestation {
            None => out.push(ATT_NONE),
            Some(Attestation::Pending { uri }) => {
                out.push(ATT_PENDING);
                out.extend_from_slice(&(uri.len() as u32).to_le_bytes());
                out.extend_from_slice(uri.as_bytes());
            }
            Some(Attestation::Bitcoin { height }) => {
                out.push(ATT_BITCOIN);
                out.extend_from_slice(&height.to_le_bytes());
            }
        }
    }
}

fn read_sequence(cursor: &mut Cursor<'_>) -> Result<Sequence, ProofError> {
    let step_count = cursor.take_u32()?;
    let mut steps = Vec::with_capacity((step_count as usize).min(64));
    for _ in 0..step_count {
        let output_len = cursor.take_u32()? as usize;
        let output = cursor.take(output_len)?.to_vec();
        let attestation = match cursor.take_u8()? {
            ATT_NONE => None,
            ATT_PENDING => {
                let uri_len = cursor.take_u32()? as usize;
                let uri = std::str::from_utf8(cursor.take(uri_len)?)
                    .map_err(|_| ProofError::InvalidUri)?
                    .to_string();
                Some(Attestation::Pending { uri })
            }
            ATT_BITCOIN => {
                let raw: [u8; 8] = cursor
                    .take(8)?
                    .try_into()
                    .map_err(|_| ProofError::Truncated)?;
                Some(Attestation::Bitcoin {
                    height: u64::from_le_bytes(raw),
                })
            }
            other => return Err(ProofError::InvalidTag(other)),
        };
        steps.push(Step {
            output,
            attestation,
        });
    }
    Ok(Sequence { steps })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProofError> {
        let end = self.pos.checked_add(n).ok_or(ProofError::Truncated)?;
        if end > self.bytes.len() {
            return Err(ProofError::Truncated);
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, ProofError> {
        Ok(self.take(1)?[0])
    }

    fn take_u32(&mut self) -> Result<u32, ProofError> {
        let raw: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| ProofError::Truncated)?;
        Ok(u32::from_le_bytes(raw))
    }

    fn finish(&self) -> Result<(), ProofError> {
        if self.pos != self.bytes.len() {
            return Err(ProofError::TrailingBytes);
        }
        Ok(())
    }
}
