//! ANT-FS session state machine (spec §4.6 "Session state machine"),
//! grounded on `ant/fs/manager.py`'s `Application` (beacon/command
//! demultiplexing, `link`/`authentication_*`/`disconnect`) and
//! `antfs_cli/program.py`'s `AntFSCLI.setup_channel`.

use std::cell::RefCell;
use std::time::Duration;

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::fs::beacon::{Beacon, ClientDeviceState, BEACON_ID};
use crate::fs::command::{AuthRequestType, AuthResponseType, AuthenticateCommand, AuthenticateResponse, DisconnectCommand, DisconnectType, LinkCommand, MARK};
use crate::frame::MessageId;

/// Default ANT-FS RF frequency (channel 19, i.e. 2419 MHz) and host
/// serial, matching `Application._frequency`/`_serial_number`.
pub const DEFAULT_FREQUENCY: u8 = 19;
pub const DEFAULT_HOST_SERIAL: u32 = 1337;

const BEACON_WAIT: Duration = Duration::from_secs(5);

/// One decoded broadcast/burst payload, split the way `Application._on_data`
/// splits a beacon-plus-trailing-command packet.
struct SplitEvent {
    beacon: Option<Beacon>,
    command: Option<Vec<u8>>,
}

fn split_data_event(data: &[u8]) -> SplitEvent {
    if data.is_empty() {
        return SplitEvent { beacon: None, command: None };
    }
    if data[0] == BEACON_ID {
        let beacon = Beacon::parse(&data[..data.len().min(8)]).ok();
        let command = if data.len() > 8 { Some(data[8..].to_vec()) } else { None };
        SplitEvent { beacon, command }
    } else if data[0] == MARK {
        SplitEvent { beacon: None, command: Some(data.to_vec()) }
    } else {
        SplitEvent { beacon: None, command: None }
    }
}

/// Owns the ANT-FS channel and the beacon/command demultiplexing that
/// `Application._on_data` does inline in the Python original.
pub struct Session<'a> {
    channel: Channel<'a>,
    host_serial_number: u32,
    frequency: u8,
    pending_command: RefCell<Option<Vec<u8>>>,
}

impl<'a> Session<'a> {
    pub fn new(channel: Channel<'a>) -> Self {
        Session {
            channel,
            host_serial_number: DEFAULT_HOST_SERIAL,
            frequency: DEFAULT_FREQUENCY,
            pending_command: RefCell::new(None),
        }
    }

    /// Pre-search channel configuration (spec §4.6), grounded on
    /// `AntFSCLI.setup_channel`.
    pub fn setup_channel(&self) -> Result<()> {
        self.channel.set_period(4096)?;
        self.channel.set_search_timeout(255)?;
        self.channel.set_rf_freq(50)?;
        self.channel.set_search_waveform(&[0x53, 0x00])?;
        self.channel.set_id(0, 0x01, 0)?;
        self.channel.open()
    }

    fn next_beacon_or_command(&self, timeout: Duration) -> Result<SplitEvent> {
        let record = self.channel.recv_data_event(timeout)?;
        Ok(split_data_event(&record.data))
    }

    pub fn next_beacon(&self, timeout: Duration) -> Result<Beacon> {
        loop {
            let event = self.next_beacon_or_command(timeout)?;
            if let Some(command) = event.command {
                *self.pending_command.borrow_mut() = Some(command);
            }
            if let Some(beacon) = event.beacon {
                return Ok(beacon);
            }
        }
    }

    pub fn next_command(&self, timeout: Duration) -> Result<Vec<u8>> {
        if let Some(command) = self.pending_command.borrow_mut().take() {
            return Ok(command);
        }
        loop {
            let event = self.next_beacon_or_command(timeout)?;
            if let Some(command) = event.command {
                return Ok(command);
            }
            // A beacon with no trailing command: keep waiting.
        }
    }

    /// Send a session command, choosing acknowledged vs. burst transfer by
    /// length the way `Application._send_command` does.
    pub fn send_command(&self, data: Vec<u8>) -> Result<()> {
        if data.len() == 8 {
            let packet: [u8; 8] = data.try_into().expect("checked len == 8");
            self.channel.send_acknowledged_data(&packet)
        } else {
            self.channel.send_burst_transfer(&data)
        }
    }

    /// Link-level handshake: request the channel id, then announce
    /// ourselves with a LINK command and re-tighten period/timeout/freq
    /// (spec §4.6), grounded on `Application.link`.
    pub fn link(&self) -> Result<()> {
        self.channel.request_message(MessageId::ResponseChannelId as u8)?;
        self.send_command(
            LinkCommand {
                channel_frequency: self.frequency,
                channel_period: 4,
                host_serial_number: self.host_serial_number,
            }
            .encode(),
        )?;
        self.channel.set_period(4096)?;
        self.channel.set_search_timeout(3)?;
        self.channel.set_rf_freq(self.frequency)
    }

    /// Serial-number authentication, returning `(client_serial, friendly_name)`.
    pub fn authenticate_serial(&self) -> Result<(u32, Option<String>)> {
        self.send_command(
            AuthenticateCommand {
                request_type: AuthRequestType::Serial as u8,
                host_serial_number: self.host_serial_number,
                data: vec![],
            }
            .encode(),
        )?;
        let response = AuthenticateResponse::decode(&self.next_command(BEACON_WAIT)?)?;
        let name = if response.data.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&response.data).trim_end_matches('\0').to_string())
        };
        Ok((response.client_serial_number, name))
    }

    /// Passkey-based re-authentication against a previously paired device.
    pub fn authenticate_passkey(&self, passkey: &[u8]) -> Result<Vec<u8>> {
        self.send_command(
            AuthenticateCommand {
                request_type: AuthRequestType::PasskeyExchange as u8,
                host_serial_number: self.host_serial_number,
                data: passkey.to_vec(),
            }
            .encode(),
        )?;
        let response = AuthenticateResponse::decode(&self.next_command(BEACON_WAIT)?)?;
        match response.response_type {
            AuthResponseType::Accept => Ok(response.data),
            other => Err(Error::AuthFailed(other)),
        }
    }

    /// First-time pairing, waiting up to 30s for the user to accept on
    /// the device (matches `Application.authentication_pair`'s timeout).
    pub fn authenticate_pair(&self, friendly_name: &str) -> Result<Vec<u8>> {
        self.send_command(
            AuthenticateCommand {
                request_type: AuthRequestType::Pairing as u8,
                host_serial_number: self.host_serial_number,
                data: friendly_name.as_bytes().to_vec(),
            }
            .encode(),
        )?;
        let response = AuthenticateResponse::decode(&self.next_command(Duration::from_secs(30))?)?;
        match response.response_type {
            AuthResponseType::Accept => Ok(response.data),
            other => Err(Error::AuthFailed(other)),
        }
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send_command(
            DisconnectCommand {
                command_type: DisconnectType::ReturnLink as u8,
                time_duration: 0,
                application_specific_duration: 0,
            }
            .encode(),
        )
    }

    pub fn channel(&self) -> &Channel<'a> {
        &self.channel
    }
}

/// Wait for the beacon to report a specific client device state, for the
/// §4.6 link → authentication → transport progression.
pub fn wait_for_state(
    session: &Session,
    state: ClientDeviceState,
    retries: u32,
) -> Result<Beacon> {
    for _ in 0..retries {
        let beacon = session.next_beacon(BEACON_WAIT)?;
        if beacon.client_device_state() == Some(state) {
            return Ok(beacon);
        }
    }
    Err(Error::TimedOut)
}
