use serde::{Deserialize, Serialize};

/// Checksum appended after the payload bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChecksumScheme {
    None,
    /// One even-parity bit.
    Parity,
    /// MSB-first CRC of width `bits` with generator `poly` (implicit top bit).
    Crc { bits: u8, poly: u32 },
}

impl Default for ChecksumScheme {
    fn default() -> Self {
        Self::crc4()
    }
}

impl ChecksumScheme {
    /// CRC-4 with generator `x^4 + x + 1`.
    pub const fn crc4() -> Self {
        Self::Crc { bits: 4, poly: 0x3 }
    }

    /// Number of grid cells the checksum occupies.
    pub fn bits(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Parity => 1,
            Self::Crc { bits, .. } => *bits as usize,
        }
    }

    /// Checksum over the low `payload_bits` bits of `payload`, MSB first.
    pub fn compute(&self, payload: u64, payload_bits: usize) -> u64 {
        match *self {
            Self::None => 0,
            Self::Parity => (payload_bits_masked(payload, payload_bits).count_ones() & 1) as u64,
            Self::Crc { bits, poly } => crc(payload, payload_bits, bits as u32, poly as u64),
        }
    }

    #[inline]
    pub fn verify(&self, payload: u64, payload_bits: usize, observed: u64) -> bool {
        self.compute(payload, payload_bits) == observed
    }
}

#[inline]
fn payload_bits_masked(payload: u64, bits: usize) -> u64 {
    if bits >= 64 {
        payload
    } else {
        payload & ((1u64 << bits) - 1)
    }
}

fn crc(payload: u64, payload_bits: usize, width: u32, poly: u64) -> u64 {
    if width == 0 {
        return 0;
    }
    let mask = if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };
    let mut reg = 0u64;
    for i in (0..payload_bits.min(64)).rev() {
        let bit = (payload >> i) & 1;
        let top = (reg >> (width - 1)) & 1;
        reg = (reg << 1) & mask;
        if top ^ bit == 1 {
            reg ^= poly & mask;
        }
    }
    reg
}
