//! Serial proximity card reader (125 kHz EM4100 modules)
//!
//! Protocol:
//! - Baud: 9600, 8N1, reader pushes a frame whenever a tag enters the field
//! - Frame: 14 bytes, [0x02][10 ASCII hex data][2 ASCII hex checksum][0x03]
//! - Checksum: XOR of the 5 decoded data bytes
//!
//! The port is opened per scan and dropped when the scan returns, so the
//! reader is released on success, failure, timeout, cancellation, and when
//! the scan future itself is dropped.

use crate::domain::types::CardId;
use crate::infra::config::Config;
use crate::io::reader::{CardReader, ScanError, ScanResult};
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

// Protocol constants
const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const FRAME_LEN: usize = 14;
const DATA_END: usize = 11;
const CHECKSUM_END: usize = 13;

/// Port-level read timeout; the scan deadline is enforced separately
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Accumulates bytes across reads and cuts them into frames.
/// Tags can arrive split over several reads (e.g., 8 bytes + 6 bytes).
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buffer: BytesMut::with_capacity(64) }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete frame, if any. Bytes before a start byte are discarded.
    pub fn next_frame(&mut self) -> Option<Result<CardId, ScanError>> {
        match self.buffer.iter().position(|&b| b == STX) {
            Some(0) => {}
            Some(start_idx) => {
                debug!(discarded = start_idx, "serial_reader_sync_discarded_bytes");
                self.buffer.advance(start_idx);
            }
            None => {
                if !self.buffer.is_empty() {
                    debug!(discarded = self.buffer.len(), "serial_reader_sync_no_start_byte");
                    self.buffer.clear();
                }
                return None;
            }
        }

        if self.buffer.len() < FRAME_LEN {
            return None;
        }

        let frame = self.buffer.split_to(FRAME_LEN);
        Some(parse_frame(&frame))
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Parse one 14-byte frame into a card identifier
pub fn parse_frame(frame: &[u8]) -> Result<CardId, ScanError> {
    if frame.len() != FRAME_LEN || frame[0] != STX || frame[FRAME_LEN - 1] != ETX {
        warn!(len = frame.len(), "serial_reader_malformed_frame");
        return Err(ScanError::InvalidCard);
    }

    let data_hex = &frame[1..DATA_END];
    let checksum_hex = &frame[DATA_END..CHECKSUM_END];

    let (Ok(data), Ok(checksum)) = (hex::decode(data_hex), hex::decode(checksum_hex)) else {
        warn!(raw = %hex::encode_upper(frame), "serial_reader_non_hex_frame");
        return Err(ScanError::InvalidCard);
    };

    let computed = data.iter().fold(0u8, |acc, &b| acc ^ b);
    if computed != checksum[0] {
        warn!(
            checksum_error = true,
            expected = checksum[0],
            computed = computed,
            "serial_reader_checksum_failed"
        );
        return Err(ScanError::InvalidCard);
    }

    // Hex decode succeeded, so the data is ASCII
    let id = String::from_utf8_lossy(data_hex).to_ascii_uppercase();
    Ok(CardId(id))
}

pub struct SerialCardReader {
    device: String,
    baud: u32,
    enabled: bool,
    present: OnceLock<bool>,
    /// Bumped by `cancel`; in-flight scans watch for the change
    cancel_epoch: watch::Sender<u64>,
}

impl SerialCardReader {
    pub fn new(config: &Config) -> Self {
        let (cancel_epoch, _) = watch::channel(0);
        Self {
            device: config.reader_device().to_string(),
            baud: config.reader_baud(),
            enabled: config.reader_enabled(),
            present: OnceLock::new(),
            cancel_epoch,
        }
    }

    fn open(&self) -> Result<SerialStream, tokio_serial::Error> {
        tokio_serial::new(&self.device, self.baud).timeout(PORT_TIMEOUT).open_native_async()
    }
}

#[async_trait]
impl CardReader for SerialCardReader {
    async fn capability(&self) -> bool {
        *self.present.get_or_init(|| Path::new(&self.device).exists())
    }

    async fn availability(&self) -> bool {
        if !self.enabled {
            return false;
        }
        // Fresh open each time: USB readers can be unplugged mid-run, and a
        // path that exists may still refuse to open (permissions, not a tty)
        match self.open() {
            Ok(_) => true,
            Err(e) => {
                debug!(device = %self.device, error = %e, "serial_reader_unavailable");
                false
            }
        }
    }

    async fn scan(&self, timeout: Duration) -> ScanResult {
        let mut cancel_rx = self.cancel_epoch.subscribe();

        if !self.enabled {
            return ScanResult::failed(ScanError::Disabled);
        }

        let mut port = match self.open() {
            Ok(p) => p,
            Err(e) => {
                warn!(device = %self.device, error = %e, "serial_reader_open_failed");
                return ScanResult::failed(ScanError::Disabled);
            }
        };

        let started = Instant::now();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut decoder = FrameDecoder::new();
        let mut temp_buf = [0u8; 64];

        let result = loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!(
                        device = %self.device,
                        buffered = decoder.buffered(),
                        "serial_reader_timeout"
                    );
                    break ScanResult::failed(ScanError::Timeout);
                }
                _ = cancel_rx.changed() => {
                    debug!(device = %self.device, "serial_reader_cancelled");
                    break ScanResult::failed(ScanError::Unknown);
                }
                read = port.read(&mut temp_buf) => match read {
                    Ok(0) => {}
                    Ok(n) => {
                        decoder.push(&temp_buf[..n]);
                        match decoder.next_frame() {
                            Some(Ok(card_id)) => break ScanResult::card(card_id),
                            Some(Err(e)) => break ScanResult::failed(e),
                            None => {}
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::TimedOut => {}
                    Err(e) => {
                        warn!(device = %self.device, error = %e, "serial_reader_read_error");
                        break ScanResult::failed(ScanError::Unknown);
                    }
                }
            }
        };

        drop(port);
        tracing::trace!(
            device = %self.device,
            success = %result.success(),
            elapsed_ms = %started.elapsed().as_millis(),
            "serial_reader_released"
        );
        result
    }

    async fn cancel(&self) {
        self.cancel_epoch.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }
}
