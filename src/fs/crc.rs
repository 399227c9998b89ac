//! ANT-FS CRC-16 (spec §3's "CRC-16/ARC" property), grounded on
//! `ant/fs/commons.py`'s `crc(data, seed=0)`.

use crc::{Crc, CRC_16_ARC};

const ALGORITHM: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Reflected-0xA001 CRC-16, resumable: `crc(crc(seed, a), b) == crc(seed, a ++ b)`.
pub fn crc16(seed: u16, data: &[u8]) -> u16 {
    let mut digest = ALGORITHM.digest_with_initial(seed);
    digest.update(data);
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc16(0, b"123456789"), 0xBB3D);
    }

    #[test]
    fn incremental_law() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let whole = crc16(0, data);
        let (a, b) = data.split_at(17);
        let incremental = crc16(crc16(0, a), b);
        assert_eq!(whole, incremental);
    }

    #[test]
    fn zero_length_is_seed() {
        assert_eq!(crc16(0x1234, &[]), 0x1234);
    }
}
