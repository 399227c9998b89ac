//! Channel façade (spec §4.4): typed send-and-await wrappers over the
//! transport core's raw response/event queues.
//!
//! Grounded on `ant/easy/filter.py` (`wait_for_message`'s retry-until-match
//! loop and the three `wait_for_*` wrappers) and `ant/easy/channel.py`
//! (`Channel.send_acknowledged_data`/`send_burst_transfer`'s recursive
//! retry-on-failure).

use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::error::{Error, Result};
use crate::frame::{code, Frame, MessageId};
use crate::transport::{RoutedRecord, Transport};

/// Spec §4.4: how many times a wait will retry past a timeout before
/// giving up, mirroring `ant/easy/filter.py`'s ten retries.
const RETRY_BUDGET: u32 = 10;
const RETRY_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Channel<'a> {
    transport: &'a Transport,
    number: u8,
}

impl<'a> Channel<'a> {
    pub fn new(transport: &'a Transport, number: u8) -> Self {
        Channel { transport, number }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    // -- waits -----------------------------------------------------------

    /// Wait for a response on this channel matching `code`, retrying past
    /// recv timeouts up to [`RETRY_BUDGET`] times. Fails fast on
    /// `EVENT_TRANSFER_TX_FAILED`, as the Python original does.
    fn wait_for_response(&self, expected_code: u16) -> Result<RoutedRecord> {
        self.wait_for(&self.transport.responses, expected_code)
    }

    fn wait_for_event(&self, expected_code: u16) -> Result<RoutedRecord> {
        self.wait_for(&self.transport.events, expected_code)
    }

    fn wait_for(
        &self,
        rx: &crossbeam_channel::Receiver<RoutedRecord>,
        expected_code: u16,
    ) -> Result<RoutedRecord> {
        for _ in 0..RETRY_BUDGET {
            match rx.recv_timeout(RETRY_TIMEOUT) {
                Ok(record) => {
                    if record.code as u16 == code::EVENT_TRANSFER_TX_FAILED as u16
                        && record.channel == Some(self.number)
                    {
                        return Err(Error::TransferFailed);
                    }
                    if record.channel == Some(self.number) || record.channel.is_none() {
                        if record.code == expected_code {
                            return Ok(record);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Cancelled),
            }
        }
        Err(Error::TimedOut)
    }

    /// Wait for a plain `RESPONSE_NO_ERROR` acknowledgement to `message_id`.
    fn wait_for_ack(&self, message_id: u8) -> Result<()> {
        let record = self.wait_for_response(message_id as u16)?;
        match record.data.first().copied() {
            Some(code::RESPONSE_NO_ERROR) => Ok(()),
            Some(other) => Err(Error::UnexpectedCode(other)),
            None => Err(Error::UnexpectedCode(0xff)),
        }
    }

    // -- configuration commands -------------------------------------------

    pub fn assign(&self, channel_type: u8, network: u8) -> Result<()> {
        self.transport.write_message(&Frame::new(
            MessageId::AssignChannel as u8,
            vec![self.number, channel_type, network],
        ))?;
        self.wait_for_ack(MessageId::AssignChannel as u8)
    }

    pub fn unassign(&self) -> Result<()> {
        self.transport
            .write_message(&Frame::new(MessageId::UnassignChannel as u8, vec![self.number]))
    }

    pub fn set_id(&self, device_number: u16, device_type: u8, transmission_type: u8) -> Result<()> {
        let [lo, hi] = device_number.to_le_bytes();
        self.transport.write_message(&Frame::new(
            MessageId::SetChannelId as u8,
            vec![self.number, lo, hi, device_type, transmission_type],
        ))?;
        self.wait_for_ack(MessageId::SetChannelId as u8)
    }

    pub fn set_period(&self, period: u16) -> Result<()> {
        let [lo, hi] = period.to_le_bytes();
        self.transport.write_message(&Frame::new(
            MessageId::SetChannelPeriod as u8,
            vec![self.number, lo, hi],
        ))?;
        self.wait_for_ack(MessageId::SetChannelPeriod as u8)
    }

    pub fn set_search_timeout(&self, timeout: u8) -> Result<()> {
        self.transport.write_message(&Frame::new(
            MessageId::SetChannelSearchTimeout as u8,
            vec![self.number, timeout],
        ))?;
        self.wait_for_ack(MessageId::SetChannelSearchTimeout as u8)
    }

    pub fn set_rf_freq(&self, freq: u8) -> Result<()> {
        self.transport.write_message(&Frame::new(
            MessageId::SetChannelRfFreq as u8,
            vec![self.number, freq],
        ))?;
        self.wait_for_ack(MessageId::SetChannelRfFreq as u8)
    }

    pub fn set_network_key(&self, network: u8, key: &[u8; 8]) -> Result<()> {
        let mut payload = vec![network];
        payload.extend_from_slice(key);
        self.transport
            .write_message(&Frame::new(MessageId::SetNetworkKey as u8, payload))?;
        self.wait_for_ack(MessageId::SetNetworkKey as u8)
    }

    pub fn set_search_waveform(&self, waveform: &[u8]) -> Result<()> {
        let mut payload = vec![self.number];
        payload.extend_from_slice(waveform);
        self.transport
            .write_message(&Frame::new(MessageId::SetSearchWaveform as u8, payload))?;
        self.wait_for_ack(MessageId::SetSearchWaveform as u8)
    }

    pub fn open(&self) -> Result<()> {
        self.transport
            .write_message(&Frame::new(MessageId::OpenChannel as u8, vec![self.number]))?;
        self.wait_for_ack(MessageId::OpenChannel as u8)
    }

    pub fn close(&self) -> Result<()> {
        self.transport
            .write_message(&Frame::new(MessageId::CloseChannel as u8, vec![self.number]))?;
        // Closing only takes effect once the radio reports
        // EVENT_CHANNEL_CLOSED on the event queue.
        self.wait_for_event(code::EVENT_CHANNEL_CLOSED as u16)?;
        Ok(())
    }

    pub fn request_message(&self, message_id: u8) -> Result<RoutedRecord> {
        self.transport.write_message(&Frame::new(
            MessageId::RequestMessage as u8,
            vec![self.number, message_id],
        ))?;
        self.wait_for_response(message_id as u16)
    }

    pub fn reset_system(&self) -> Result<()> {
        self.transport
            .write_message(&Frame::new(MessageId::ResetSystem as u8, vec![0x00]))
    }

    // -- data transfer -----------------------------------------------------

    /// Send one acknowledged 8-byte packet, retrying on transfer failure
    /// the way `Channel.send_acknowledged_data` recurses in the original.
    pub fn send_acknowledged_data(&self, data: &[u8; 8]) -> Result<()> {
        let mut payload = vec![self.number];
        payload.extend_from_slice(data);
        for attempt in 0..RETRY_BUDGET {
            self.transport
                .queue_timeslot(Frame::new(MessageId::AcknowledgeData as u8, payload.clone()));
            match self.wait_for_event(code::EVENT_TRANSFER_TX_COMPLETED as u16) {
                Ok(_) => return Ok(()),
                Err(Error::TransferFailed) if attempt + 1 < RETRY_BUDGET => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::TransferFailed)
    }

    /// Send a burst transfer, chunked into 8-byte packets with the 3-bit
    /// sequence/last-packet encoding (spec §3's Burst buffer), retrying
    /// the whole burst on transfer failure.
    pub fn send_burst_transfer(&self, data: &[u8]) -> Result<()> {
        assert_eq!(data.len() % 8, 0, "burst payload must be a multiple of 8 bytes");
        for attempt in 0..RETRY_BUDGET {
            let packets = data.len() / 8;
            for i in 0..packets {
                let mut sequence = (i % 4) as u8;
                if i == packets - 1 {
                    sequence |= 0b100;
                }
                let channel_seq = self.number | (sequence << 5);
                let mut payload = vec![channel_seq];
                payload.extend_from_slice(&data[i * 8..i * 8 + 8]);
                self.transport
                    .queue_timeslot(Frame::new(MessageId::BurstTransferData as u8, payload));
            }
            self.wait_for_event(code::EVENT_TRANSFER_TX_START as u16).ok();
            match self.wait_for_event(code::EVENT_TRANSFER_TX_COMPLETED as u16) {
                Ok(_) => return Ok(()),
                Err(Error::TransferFailed) if attempt + 1 < RETRY_BUDGET => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::TransferFailed)
    }

    /// Block for the next reassembled burst / broadcast / acknowledged-data
    /// event addressed to this channel.
    pub fn recv_data_event(&self, timeout: Duration) -> Result<RoutedRecord> {
        loop {
            match self.transport.events.recv_timeout(timeout) {
                Ok(record) if record.channel == Some(self.number) => return Ok(record),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Err(Error::TimedOut),
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Cancelled),
            }
        }
    }
}
