//! The readout driver.
//!
//! One task owns the port: it brings the station into a known-good
//! configuration, then loops waiting for card-detection frames and reads
//! each card out block by block. Progress, wire traffic and decoded cards
//! are all surfaced through the event channel.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use siread_common::card5::Card5View;
use siread_common::card6::Si6View;
use siread_common::error::Error as DataError;
use siread_common::frame::{self, SiFrame, requests};
use siread_common::punch::CardRecord;
use tokio_util::sync::CancellationToken;

use crate::accumulator::FrameAccumulator;
use crate::error::Error;
use crate::events::{EventSender, LogDirection, ReaderStatus};
use crate::port::{HIGH_BAUD_RATE, LOW_BAUD_RATE, SiPort};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(2000);
const CARD_REMOVAL_TIMEOUT: Duration = Duration::from_millis(5000);

/// Bits of the protocol-configuration byte.
const EXTENDED_PROTOCOL_BIT: u8 = 0x01;
const HANDSHAKE_BIT: u8 = 0x04;
/// First data byte of a system-value response.
const CONFIG_BYTE_AT: usize = 6;

/// Punch-count positions within a block-0 response frame.
const CARD6_PUNCH_COUNT_AT: usize = 24;
const CARD10PLUS_PUNCH_COUNT_AT: usize = 28;
/// Punches stored per 128-byte data block.
const PUNCHES_PER_BLOCK: usize = 32;

pub struct SiDriver<P: SiPort> {
    port: P,
    events: EventSender,
    accumulator: FrameAccumulator,
    pending: VecDeque<SiFrame>,
    zero_hour: i64,
    long_card6: bool,
}

impl<P: SiPort> SiDriver<P> {
    /// `zero_hour` anchors decoded card times, in milliseconds since the
    /// local midnight.
    pub fn new(port: P, events: EventSender, zero_hour: i64) -> Self {
        Self {
            port,
            events,
            accumulator: FrameAccumulator::new(),
            pending: VecDeque::new(),
            zero_hour,
            long_card6: false,
        }
    }

    /// Runs the driver until cancelled or until a fatal error.
    pub async fn run(&mut self, cancel: CancellationToken) -> crate::Result<()> {
        self.events.status(ReaderStatus::Starting);
        let result = self.run_inner(&cancel).await;
        if let Err(err) = &result {
            self.events.log(LogDirection::Error, err.to_string());
            self.events.status(ReaderStatus::FatalError(err.to_string()));
        }
        self.events.status(ReaderStatus::Off);
        result
    }

    async fn run_inner(&mut self, cancel: &CancellationToken) -> crate::Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = self.bootstrap() => result?,
        }
        loop {
            self.events.status(ReaderStatus::Ready);
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                frame = self.next_frame(None) => frame?,
            };
            self.dispatch(frame).await?;
        }
    }

    /// Startup handshake with baud-rate fallback.
    async fn bootstrap(&mut self) -> crate::Result<()> {
        self.port.set_baud_rate(HIGH_BAUD_RATE).await?;
        match self.startup().await {
            Err(Error::Timeout) => {
                self.events.log(LogDirection::Info, "No answer at 38400 Bd, retrying at 4800 Bd");
                self.port.set_baud_rate(LOW_BAUD_RATE).await?;
                self.startup().await.map_err(|err| match err {
                    Error::Timeout => Error::StartupTimeout,
                    other => other,
                })
            }
            result => result,
        }
    }

    async fn startup(&mut self) -> crate::Result<()> {
        self.send(&requests::startup()).await?;
        self.expect(frame::SET_MASTER_MODE, HANDSHAKE_TIMEOUT).await?;

        self.send(&requests::get_protocol_config()).await?;
        let config = self.expect(frame::GET_SYSTEM_VALUE, HANDSHAKE_TIMEOUT).await?;
        let mode = frame_byte(&config, CONFIG_BYTE_AT)?;
        if mode & EXTENDED_PROTOCOL_BIT == 0 {
            return Err(Error::ConfigurationMismatch(
                "Master station should be configured with extended protocol".to_string(),
            ));
        }
        if mode & HANDSHAKE_BIT == 0 {
            return Err(Error::ConfigurationMismatch(
                "Master station should be configured in handshake mode (no autosend)".to_string(),
            ));
        }

        self.send(&requests::get_cardblocks_config()).await?;
        let cardblocks = self.expect(frame::GET_SYSTEM_VALUE, HANDSHAKE_TIMEOUT).await?;
        if frame_byte(&cardblocks, CONFIG_BYTE_AT)? == 0xFF {
            self.long_card6 = true;
            self.events.log(LogDirection::Info, "Station reads SiCard 6 with 192 punches");
        }

        self.send(&requests::beep_twice()).await?;
        self.events.status(ReaderStatus::On);
        Ok(())
    }

    async fn dispatch(&mut self, frame: SiFrame) -> crate::Result<()> {
        let result = match frame.command() {
            frame::CARD5_DETECTED => self.retrieve_card5().await,
            frame::CARD6PLUS_DETECTED => self.retrieve_card6().await,
            frame::CARD8PLUS_DETECTED => {
                // The series byte tells Card 10 and newer apart from Card 8/9.
                if frame.byte_at(5) == Some(0x0F) {
                    self.retrieve_card10plus().await
                } else {
                    self.retrieve_card8_9().await
                }
            }
            frame::BEEP => return Ok(()),
            frame::CARD_REMOVED => {
                self.events.log(LogDirection::Info, "Late card removal");
                return Ok(());
            }
            _ => {
                self.events.log(LogDirection::Info, format!("Unexpected message: {frame}"));
                return Ok(());
            }
        };
        match result {
            Ok(()) => Ok(()),
            // A failed card read leaves the station running.
            Err(err @ (Error::Timeout | Error::UnexpectedMessage { .. } | Error::Data(_))) => {
                self.events.log(LogDirection::Error, err.to_string());
                self.events.status(ReaderStatus::ProcessingError(err.to_string()));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn retrieve_card5(&mut self) -> crate::Result<()> {
        self.events.status(ReaderStatus::Processing);
        self.events.log(LogDirection::Info, "SiCard 5 detected");
        self.send(&requests::read_card5()).await?;
        let response = self.expect(frame::GET_CARD5, HANDSHAKE_TIMEOUT).await?;
        let block = response
            .as_bytes()
            .get(5..133)
            .ok_or(Error::Data(DataError::TruncatedData))?;
        let record = Card5View::new(block)?.decode(self.zero_hour);
        self.finish_readout(record).await
    }

    async fn retrieve_card6(&mut self) -> crate::Result<()> {
        self.events.status(ReaderStatus::Processing);
        let label = if self.long_card6 { "SiCard 6 detected (192-punch mode)" } else { "SiCard 6 detected" };
        self.events.log(LogDirection::Info, label);
        let commands: Vec<SiFrame> =
            requests::CARD6_BLOCKS.iter().map(|&block| requests::read_card6_block(block)).collect();
        let responses = self.read_multiple(&commands, CARD6_PUNCH_COUNT_AT).await?;
        let buffer = block_buffer(&responses)?;
        let record = Si6View::card6(&buffer)?.decode(self.zero_hour)?;
        self.finish_readout(record).await
    }

    async fn retrieve_card8_9(&mut self) -> crate::Result<()> {
        self.events.status(ReaderStatus::Processing);
        self.events.log(LogDirection::Info, "SiCard 8/9 detected");
        let commands: Vec<SiFrame> = requests::CARD8_9_BLOCKS
            .iter()
            .map(|&block| requests::read_card8plus_block(block))
            .collect();
        let responses = self.read_all(&commands).await?;
        let buffer = block_buffer(&responses)?;
        let record = Si6View::card8plus(&buffer)?.decode(self.zero_hour)?;
        self.finish_readout(record).await
    }

    async fn retrieve_card10plus(&mut self) -> crate::Result<()> {
        self.events.status(ReaderStatus::Processing);
        self.events.log(LogDirection::Info, "SiCard 10/11/SIAC detected");
        let commands: Vec<SiFrame> = requests::CARD10PLUS_BLOCKS
            .iter()
            .map(|&block| requests::read_card8plus_block(block))
            .collect();
        let responses = self.read_multiple(&commands, CARD10PLUS_PUNCH_COUNT_AT).await?;
        let buffer = block_buffer(&responses)?;
        let record = Si6View::card8plus(&buffer)?.decode(self.zero_hour)?;
        self.finish_readout(record).await
    }

    /// Sends each request and collects the response to each.
    async fn read_all(&mut self, commands: &[SiFrame]) -> crate::Result<Vec<SiFrame>> {
        let mut responses = Vec::with_capacity(commands.len());
        for command in commands {
            self.send(command).await?;
            responses.push(self.expect(command.command(), HANDSHAKE_TIMEOUT).await?);
        }
        Ok(responses)
    }

    /// Reads block 0, derives the number of data blocks from the punch
    /// count, and fetches only as many further blocks as needed.
    async fn read_multiple(
        &mut self,
        commands: &[SiFrame],
        punch_count_at: usize,
    ) -> crate::Result<Vec<SiFrame>> {
        let mut responses = self.read_all(&commands[..1]).await?;
        let punches = usize::from(frame_byte(&responses[0], punch_count_at)?);
        let data_blocks = punches / PUNCHES_PER_BLOCK + usize::from(punches % PUNCHES_PER_BLOCK != 0);
        let total = (1 + data_blocks).min(commands.len());
        responses.extend(self.read_all(&commands[1..total]).await?);
        Ok(responses)
    }

    async fn finish_readout(&mut self, record: CardRecord) -> crate::Result<()> {
        self.events.card_read(record);
        self.ack_and_wait_removal().await
    }

    /// Acknowledges the readout so the station beeps, then waits for the
    /// card to leave the station.
    async fn ack_and_wait_removal(&mut self) -> crate::Result<()> {
        self.send(&SiFrame::control(frame::ACK)).await?;
        match self.next_frame(Some(CARD_REMOVAL_TIMEOUT)).await {
            Ok(frame) if frame.command() != frame::CARD_REMOVED => {
                self.events.log(LogDirection::Info, format!("Unexpected message: {frame}"));
            }
            Ok(_) => {}
            Err(Error::Timeout) => {
                self.events.log(LogDirection::Info, "Card not removed after 5 s");
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    async fn send(&mut self, frame: &SiFrame) -> crate::Result<()> {
        self.events.log(LogDirection::Send, frame.to_string());
        self.port.write(frame.as_bytes()).await
    }

    /// Waits for a frame carrying the given command byte.
    async fn expect(&mut self, command: u8, wait: Duration) -> crate::Result<SiFrame> {
        let frame = self.next_frame(Some(wait)).await?;
        if frame.command() != command {
            return Err(Error::UnexpectedMessage { received: frame.command(), expected: command });
        }
        Ok(frame)
    }

    /// Takes the next whole frame, reading the port as needed. Without a
    /// wait limit this blocks until a frame arrives.
    async fn next_frame(&mut self, wait: Option<Duration>) -> crate::Result<SiFrame> {
        let deadline = wait.map(|wait| tokio::time::Instant::now() + wait);
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(frame);
            }
            let mut chunk = [0u8; 64];
            let count = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, self.port.read(&mut chunk))
                    .await
                    .map_err(|_| Error::Timeout)??,
                None => self.port.read(&mut chunk).await?,
            };
            for frame in self.accumulator.accumulate(&chunk[..count], Instant::now()) {
                self.events.log(LogDirection::Read, frame.to_string());
                if frame.is_valid() {
                    self.pending.push_back(frame);
                } else {
                    self.events.log(LogDirection::Error, format!("Invalid frame: {frame}"));
                }
            }
        }
    }
}

fn frame_byte(frame: &SiFrame, index: usize) -> crate::Result<u8> {
    frame.byte_at(index).ok_or(Error::Data(DataError::TruncatedData))
}

/// Concatenates the 128-byte data block of every response frame.
fn block_buffer(responses: &[SiFrame]) -> crate::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(responses.len() * siread_common::card6::BLOCK_LEN);
    for frame in responses {
        let block = frame
            .as_bytes()
            .get(6..134)
            .ok_or(Error::Data(DataError::TruncatedData))?;
        buffer.extend_from_slice(block);
    }
    Ok(buffer)
}
