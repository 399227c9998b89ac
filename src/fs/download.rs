//! Download engine (spec §4.7), grounded on `ant/fs/manager.py`'s
//! `Application.download`.

use crate::error::{Error, Result};
use crate::fs::command::{DownloadRequest, DownloadResponse, DownloadResponseCode};
use crate::fs::session::Session;

/// Spec §4.7: retries a stalled request this many times before giving up.
const MAX_STALLS: u32 = 5;

/// Download file `index`, calling `progress(fraction_complete)` after each
/// response. Implements the three-piece `(offset, crc_seed, accumulator)`
/// loop from spec §4.7.
pub fn download(
    session: &Session,
    index: u16,
    mut progress: impl FnMut(f64),
) -> Result<Vec<u8>> {
    let mut offset: u32 = 0;
    let mut crc_seed: u16 = 0;
    let mut accumulator: Vec<u8> = Vec::new();
    let mut stalls = 0;

    loop {
        session.send_command(
            DownloadRequest {
                data_index: index,
                data_offset: offset,
                initial_request: offset == 0,
                crc_seed,
                maximum_block_size: 0,
            }
            .encode(),
        )?;

        let raw = match session.next_command(std::time::Duration::from_secs(3)) {
            Ok(raw) => raw,
            Err(Error::TimedOut) if stalls < MAX_STALLS => {
                stalls += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        stalls = 0;

        let response = DownloadResponse::decode(&raw)?;
        if response.response != DownloadResponseCode::Ok {
            return Err(Error::DownloadFailed(response.response as u8));
        }

        let remaining = response.remaining as usize;
        let total = response.offset as usize + remaining;
        if accumulator.len() < total {
            accumulator.resize(total, 0);
        }
        accumulator[response.offset as usize..total].copy_from_slice(&response.data[..remaining]);

        progress(total as f64 / response.size as f64);

        if total as u32 == response.size {
            return Ok(accumulator);
        }

        offset = total as u32;
        crc_seed = response.crc;
    }
}

/// Download file 0 and parse it as the device's directory listing.
pub fn download_directory(session: &Session, progress: impl FnMut(f64)) -> Result<crate::fs::file::Directory> {
    let data = download(session, 0, progress)?;
    crate::fs::file::Directory::parse(&data)
}
