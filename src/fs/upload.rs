//! Upload engine (spec §4.8). `ant/fs/manager.py`'s own `Application.upload`
//! is an unimplemented stub, so the capacity-query and retry flow here is
//! built directly from the wire commands in `ant/fs/command.py` and the
//! sequencing spec.md §4.8 describes.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::fs::command::{
    UploadDataCommand, UploadDataResponse, UploadDataResponseCode, UploadRequest, UploadResponse,
    UploadResponseCode, UPLOAD_CAPACITY_QUERY_OFFSET,
};
use crate::fs::crc::crc16;
use crate::fs::session::Session;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Ask the device how much of `data` it is willing to accept starting
/// from where it left off (`UPLOAD_CAPACITY_QUERY_OFFSET` sentinel).
fn query_capacity(session: &Session, index: u16, data_len: u32) -> Result<UploadResponse> {
    session.send_command(
        UploadRequest {
            data_index: index,
            max_size: data_len,
            data_offset: UPLOAD_CAPACITY_QUERY_OFFSET,
        }
        .encode(),
    )?;
    let raw = session.next_command(RESPONSE_TIMEOUT)?;
    let response = UploadResponse::decode(&raw)?;
    if response.response != UploadResponseCode::Ok {
        return Err(Error::UploadFailed(response.response as u8));
    }
    Ok(response)
}

/// Upload `data` as file `index`, calling `progress(fraction_complete)`
/// after each accepted block.
pub fn upload(session: &Session, index: u16, data: &[u8], mut progress: impl FnMut(f64)) -> Result<()> {
    let mut capacity = query_capacity(session, index, data.len() as u32)?;
    let mut offset = capacity.last_data_offset;
    let mut crc_seed = capacity.crc;

    while (offset as usize) < data.len() {
        let block_size = (capacity.maximum_block_size as usize)
            .min(data.len() - offset as usize)
            .max(1);
        let block = &data[offset as usize..offset as usize + block_size];
        let crc_so_far = crc16(crc_seed, block);

        session.send_command(
            UploadDataCommand {
                crc_seed,
                data_offset: offset,
                data: block.to_vec(),
                crc: crc_so_far,
            }
            .encode(),
        )?;

        let raw = session.next_command(RESPONSE_TIMEOUT)?;
        let response = UploadDataResponse::decode(&raw)?;
        match response.response {
            UploadDataResponseCode::Ok => {
                offset += block_size as u32;
                crc_seed = crc_so_far;
                progress(offset as f64 / data.len() as f64);
            }
            UploadDataResponseCode::Failed => {
                // Re-query capacity to learn where the device wants us to
                // resume from; UploadDataResponse itself carries no offset.
                capacity = query_capacity(session, index, data.len() as u32)?;
                offset = capacity.last_data_offset;
                crc_seed = capacity.crc;
            }
        }
    }

    Ok(())
}
