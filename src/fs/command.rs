//! ANT-FS session command envelope (spec §3 "Session command envelope"),
//! grounded on `ant/fs/command.py`'s `Command` hierarchy. Every command
//! starts with a fixed `0x44` mark byte followed by a one-byte command
//! id; the Python registry-dict dispatch becomes a fixed `match` here
//! (per spec.md's redesign note on replacing string/dict-keyed lookups
//! with enums).

use crate::error::{Error, Result};

pub const MARK: u8 = 0x44;

/// Offset sentinel for `UploadRequest`: "start from zero, tell me your
/// limits" (spec §4.8), named so the magic value only appears once.
pub const UPLOAD_CAPACITY_QUERY_OFFSET: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Link = 0x02,
    Disconnect = 0x03,
    Authenticate = 0x04,
    Ping = 0x05,
    DownloadRequest = 0x09,
    UploadRequest = 0x0A,
    EraseRequest = 0x0B,
    UploadData = 0x0C,
    AuthenticateResponse = 0x84,
    DownloadResponse = 0x89,
    UploadResponse = 0x8A,
    EraseResponse = 0x8B,
    UploadDataResponse = 0x8C,
}

fn expect_header(data: &[u8], id: u8) -> Result<()> {
    if data.len() < 2 {
        return Err(Error::CommandDecode("frame shorter than the 2-byte header".into()));
    }
    if data[0] != MARK {
        return Err(Error::CommandDecode(format!("bad mark byte {:#04x}", data[0])));
    }
    if data[1] != id {
        return Err(Error::CommandDecode(format!(
            "expected command id {:#04x}, got {:#04x}",
            id, data[1]
        )));
    }
    Ok(())
}

fn need(data: &[u8], len: usize, what: &str) -> Result<()> {
    if data.len() < len {
        Err(Error::CommandDecode(format!(
            "{what} needs {len} bytes, got {}",
            data.len()
        )))
    } else {
        Ok(())
    }
}

// -- LINK ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCommand {
    pub channel_frequency: u8,
    pub channel_period: u8,
    pub host_serial_number: u32,
}

impl LinkCommand {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![MARK, CommandType::Link as u8, self.channel_frequency, self.channel_period];
        out.extend_from_slice(&self.host_serial_number.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::Link as u8)?;
        need(data, 8, "LinkCommand")?;
        Ok(LinkCommand {
            channel_frequency: data[2],
            channel_period: data[3],
            host_serial_number: u32::from_le_bytes(data[4..8].try_into().unwrap()),
        })
    }
}

// -- DISCONNECT --------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectType {
    ReturnLink = 0,
    ReturnBroadcast = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectCommand {
    pub command_type: u8,
    pub time_duration: u8,
    pub application_specific_duration: u8,
}

impl DisconnectCommand {
    pub fn encode(&self) -> Vec<u8> {
        vec![
            MARK,
            CommandType::Disconnect as u8,
            self.command_type,
            self.time_duration,
            self.application_specific_duration,
            0,
            0,
            0,
        ]
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::Disconnect as u8)?;
        need(data, 5, "DisconnectCommand")?;
        Ok(DisconnectCommand {
            command_type: data[2],
            time_duration: data[3],
            application_specific_duration: data[4],
        })
    }
}

// -- AUTHENTICATE ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthRequestType {
    PassThrough = 0,
    Serial = 1,
    Pairing = 2,
    PasskeyExchange = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResponseType {
    NotAvailable,
    Accept,
    Reject,
}

impl AuthResponseType {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(AuthResponseType::NotAvailable),
            1 => Ok(AuthResponseType::Accept),
            2 => Ok(AuthResponseType::Reject),
            other => Err(Error::CommandDecode(format!("bad auth response type {other}"))),
        }
    }
}

/// Pad `data` up to the next 8-byte boundary, matching
/// `AuthenticateBase._pad`: a length that is already a multiple of 8
/// (including zero) is left untouched.
fn pad8(data: &[u8]) -> Vec<u8> {
    let missing = 8 - data.len() % 8;
    let mut out = data.to_vec();
    if missing < 8 {
        out.extend(std::iter::repeat(0u8).take(missing));
    }
    out
}

fn encode_auth(id: u8, x_type: u8, serial_number: u32, data: &[u8]) -> Vec<u8> {
    let mut out = vec![MARK, id, x_type, data.len() as u8];
    out.extend_from_slice(&serial_number.to_le_bytes());
    out.extend_from_slice(&pad8(data));
    out
}

fn decode_auth(data: &[u8], id: u8) -> Result<(u8, u32, Vec<u8>)> {
    expect_header(data, id)?;
    need(data, 8, "AuthenticateBase header")?;
    let length = data[3] as usize;
    let serial_number = u32::from_le_bytes(data[4..8].try_into().unwrap());
    let payload = data
        .get(8..8 + length)
        .ok_or_else(|| Error::CommandDecode("auth payload shorter than declared length".into()))?
        .to_vec();
    Ok((data[2], serial_number, payload))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateCommand {
    pub request_type: u8,
    pub host_serial_number: u32,
    pub data: Vec<u8>,
}

impl AuthenticateCommand {
    pub fn encode(&self) -> Vec<u8> {
        encode_auth(
            CommandType::Authenticate as u8,
            self.request_type,
            self.host_serial_number,
            &self.data,
        )
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let (request_type, host_serial_number, payload) =
            decode_auth(data, CommandType::Authenticate as u8)?;
        Ok(AuthenticateCommand {
            request_type,
            host_serial_number,
            data: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateResponse {
    pub response_type: AuthResponseType,
    pub client_serial_number: u32,
    pub data: Vec<u8>,
}

impl AuthenticateResponse {
    pub fn encode(&self) -> Vec<u8> {
        encode_auth(
            CommandType::AuthenticateResponse as u8,
            self.response_type as u8,
            self.client_serial_number,
            &self.data,
        )
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let (response_type, client_serial_number, payload) =
            decode_auth(data, CommandType::AuthenticateResponse as u8)?;
        Ok(AuthenticateResponse {
            response_type: AuthResponseType::from_u8(response_type)?,
            client_serial_number,
            data: payload,
        })
    }
}

// -- PING --------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingCommand;

impl PingCommand {
    pub fn encode(&self) -> Vec<u8> {
        vec![MARK, CommandType::Ping as u8]
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::Ping as u8)?;
        Ok(PingCommand)
    }
}

// -- DOWNLOAD ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadRequest {
    pub data_index: u16,
    pub data_offset: u32,
    pub initial_request: bool,
    pub crc_seed: u16,
    pub maximum_block_size: u32,
}

impl DownloadRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![MARK, CommandType::DownloadRequest as u8];
        out.extend_from_slice(&self.data_index.to_le_bytes());
        out.extend_from_slice(&self.data_offset.to_le_bytes());
        out.push(0); // padding byte
        out.push(self.initial_request as u8);
        out.extend_from_slice(&self.crc_seed.to_le_bytes());
        out.extend_from_slice(&self.maximum_block_size.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::DownloadRequest as u8)?;
        need(data, 16, "DownloadRequest")?;
        Ok(DownloadRequest {
            data_index: u16::from_le_bytes(data[2..4].try_into().unwrap()),
            data_offset: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            initial_request: data[9] != 0,
            crc_seed: u16::from_le_bytes(data[10..12].try_into().unwrap()),
            maximum_block_size: u32::from_le_bytes(data[12..16].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DownloadResponseCode {
    Ok = 0,
    NotExist = 1,
    NotReadable = 2,
    NotReady = 3,
    InvalidRequest = 4,
    IncorrectCrc = 5,
}

impl DownloadResponseCode {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(DownloadResponseCode::Ok),
            1 => Ok(DownloadResponseCode::NotExist),
            2 => Ok(DownloadResponseCode::NotReadable),
            3 => Ok(DownloadResponseCode::NotReady),
            4 => Ok(DownloadResponseCode::InvalidRequest),
            5 => Ok(DownloadResponseCode::IncorrectCrc),
            other => Err(Error::CommandDecode(format!("bad download response code {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResponse {
    pub response: DownloadResponseCode,
    pub remaining: u32,
    pub offset: u32,
    pub size: u32,
    pub data: Vec<u8>,
    pub crc: u16,
}

impl DownloadResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![MARK, CommandType::DownloadResponse as u8, self.response as u8, 0];
        out.extend_from_slice(&self.remaining.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.data);
        out.extend(std::iter::repeat(0u8).take(6));
        out.extend_from_slice(&self.crc.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::DownloadResponse as u8)?;
        need(data, 24, "DownloadResponse")?;
        let payload_end = data.len() - 8;
        Ok(DownloadResponse {
            response: DownloadResponseCode::from_u8(data[2])?,
            remaining: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            offset: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            size: u32::from_le_bytes(data[12..16].try_into().unwrap()),
            data: data[16..payload_end].to_vec(),
            crc: u16::from_le_bytes(data[data.len() - 2..].try_into().unwrap()),
        })
    }
}

// -- UPLOAD --------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadRequest {
    pub data_index: u16,
    pub max_size: u32,
    pub data_offset: u32,
}

impl UploadRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![MARK, CommandType::UploadRequest as u8];
        out.extend_from_slice(&self.data_index.to_le_bytes());
        out.extend_from_slice(&self.max_size.to_le_bytes());
        out.extend(std::iter::repeat(0u8).take(4));
        out.extend_from_slice(&self.data_offset.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::UploadRequest as u8)?;
        need(data, 16, "UploadRequest")?;
        Ok(UploadRequest {
            data_index: u16::from_le_bytes(data[2..4].try_into().unwrap()),
            max_size: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            data_offset: u32::from_le_bytes(data[12..16].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UploadResponseCode {
    Ok = 0,
    NotExist = 1,
    NotWriteable = 2,
    NotEnoughSpace = 3,
    InvalidRequest = 4,
    NotReady = 5,
}

impl UploadResponseCode {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(UploadResponseCode::Ok),
            1 => Ok(UploadResponseCode::NotExist),
            2 => Ok(UploadResponseCode::NotWriteable),
            3 => Ok(UploadResponseCode::NotEnoughSpace),
            4 => Ok(UploadResponseCode::InvalidRequest),
            5 => Ok(UploadResponseCode::NotReady),
            other => Err(Error::CommandDecode(format!("bad upload response code {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadResponse {
    pub response: UploadResponseCode,
    pub last_data_offset: u32,
    pub maximum_file_size: u32,
    pub maximum_block_size: u32,
    pub crc: u16,
}

impl UploadResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![MARK, CommandType::UploadResponse as u8, self.response as u8, 0];
        out.extend_from_slice(&self.last_data_offset.to_le_bytes());
        out.extend_from_slice(&self.maximum_file_size.to_le_bytes());
        out.extend_from_slice(&self.maximum_block_size.to_le_bytes());
        out.extend(std::iter::repeat(0u8).take(6));
        out.extend_from_slice(&self.crc.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::UploadResponse as u8)?;
        need(data, 24, "UploadResponse")?;
        Ok(UploadResponse {
            response: UploadResponseCode::from_u8(data[2])?,
            last_data_offset: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            maximum_file_size: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            maximum_block_size: u32::from_le_bytes(data[12..16].try_into().unwrap()),
            crc: u16::from_le_bytes(data[22..24].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDataCommand {
    pub crc_seed: u16,
    pub data_offset: u32,
    pub data: Vec<u8>,
    pub crc: u16,
}

impl UploadDataCommand {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![MARK, CommandType::UploadData as u8];
        out.extend_from_slice(&self.crc_seed.to_le_bytes());
        out.extend_from_slice(&self.data_offset.to_le_bytes());
        out.extend_from_slice(&self.data);
        out.extend(std::iter::repeat(0u8).take(6));
        out.extend_from_slice(&self.crc.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::UploadData as u8)?;
        need(data, 16, "UploadDataCommand")?;
        let payload_end = data.len() - 8;
        Ok(UploadDataCommand {
            crc_seed: u16::from_le_bytes(data[2..4].try_into().unwrap()),
            data_offset: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            data: data[8..payload_end].to_vec(),
            crc: u16::from_le_bytes(data[data.len() - 2..].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UploadDataResponseCode {
    Ok = 0,
    Failed = 1,
}

impl UploadDataResponseCode {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(UploadDataResponseCode::Ok),
            1 => Ok(UploadDataResponseCode::Failed),
            other => Err(Error::CommandDecode(format!("bad upload data response code {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadDataResponse {
    pub response: UploadDataResponseCode,
}

impl UploadDataResponse {
    pub fn encode(&self) -> Vec<u8> {
        vec![MARK, CommandType::UploadDataResponse as u8, self.response as u8, 0, 0, 0, 0, 0]
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::UploadDataResponse as u8)?;
        need(data, 3, "UploadDataResponse")?;
        Ok(UploadDataResponse {
            response: UploadDataResponseCode::from_u8(data[2])?,
        })
    }
}

// -- ERASE ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseRequestCommand {
    pub data_file_index: u32,
}

impl EraseRequestCommand {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![MARK, CommandType::EraseRequest as u8];
        out.extend_from_slice(&self.data_file_index.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::EraseRequest as u8)?;
        need(data, 6, "EraseRequestCommand")?;
        Ok(EraseRequestCommand {
            data_file_index: u32::from_le_bytes(data[2..6].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EraseResponseCode {
    Successful = 0,
    Failed = 1,
    NotReady = 2,
}

impl EraseResponseCode {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(EraseResponseCode::Successful),
            1 => Ok(EraseResponseCode::Failed),
            2 => Ok(EraseResponseCode::NotReady),
            other => Err(Error::CommandDecode(format!("bad erase response code {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseResponse {
    pub response: EraseResponseCode,
}

impl EraseResponse {
    pub fn encode(&self) -> Vec<u8> {
        vec![MARK, CommandType::EraseResponse as u8, self.response as u8]
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        expect_header(data, CommandType::EraseResponse as u8)?;
        need(data, 3, "EraseResponse")?;
        Ok(EraseResponse {
            response: EraseResponseCode::from_u8(data[2])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_command_encode_matches_test_vector() {
        let cmd = LinkCommand {
            channel_frequency: 19,
            channel_period: 4,
            host_serial_number: 1337,
        };
        assert_eq!(cmd.encode(), vec![0x44, 0x02, 0x13, 0x04, 0x39, 0x05, 0x00, 0x00]);
    }

    #[test]
    fn link_command_round_trips() {
        let cmd = LinkCommand {
            channel_frequency: 19,
            channel_period: 4,
            host_serial_number: 1337,
        };
        assert_eq!(LinkCommand::decode(&cmd.encode()).unwrap(), cmd);
    }

    #[test]
    fn authenticate_command_encode_matches_test_vector() {
        let cmd = AuthenticateCommand {
            request_type: AuthRequestType::Serial as u8,
            host_serial_number: 123_456_789,
            data: vec![],
        };
        assert_eq!(cmd.encode(), vec![0x44, 0x04, 0x01, 0x00, 0x15, 0xCD, 0x5B, 0x07]);
    }

    #[test]
    fn authenticate_command_round_trips_with_payload() {
        let cmd = AuthenticateCommand {
            request_type: AuthRequestType::Pairing as u8,
            host_serial_number: 42,
            data: vec![1, 2, 3],
        };
        let decoded = AuthenticateCommand::decode(&cmd.encode()).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn authenticate_response_round_trips() {
        let resp = AuthenticateResponse {
            response_type: AuthResponseType::Accept,
            client_serial_number: 99,
            data: vec![0xAA; 9],
        };
        let decoded = AuthenticateResponse::decode(&resp.encode()).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn download_request_round_trips() {
        let req = DownloadRequest {
            data_index: 7,
            data_offset: 4096,
            initial_request: true,
            crc_seed: 0xBEEF,
            maximum_block_size: 0,
        };
        assert_eq!(DownloadRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn download_response_round_trips_with_data() {
        let resp = DownloadResponse {
            response: DownloadResponseCode::Ok,
            remaining: 4,
            offset: 0,
            size: 4,
            data: vec![1, 2, 3, 4],
            crc: 0xBB3D,
        };
        assert_eq!(DownloadResponse::decode(&resp.encode()).unwrap(), resp);
    }

    #[test]
    fn upload_request_query_capacity_round_trips() {
        let req = UploadRequest {
            data_index: 3,
            max_size: 1024,
            data_offset: UPLOAD_CAPACITY_QUERY_OFFSET,
        };
        assert_eq!(UploadRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn upload_data_round_trips() {
        let cmd = UploadDataCommand {
            crc_seed: 0,
            data_offset: 8,
            data: vec![9, 9, 9, 9, 9, 9, 9, 9],
            crc: 0x1234,
        };
        assert_eq!(UploadDataCommand::decode(&cmd.encode()).unwrap(), cmd);
    }
}
