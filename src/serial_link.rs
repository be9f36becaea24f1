//! Framed, checksummed command exchange with the motor controllers.
//!
//! Each outbound command is a newline, the ASCII command bytes, a single
//! checksum byte and a final newline. The controller answers with a single
//! ACK byte, followed by a checksummed value line when one was requested.

use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::{sleep, timeout},
};
use tokio_serial::SerialPortBuilderExt;

use crate::{
    config::Config,
    error::{DomeError, DomeResult},
};

const FRAME_BYTE: u8 = 0x0A;
const ACK_BYTE: u8 = 0x06;
const REBOOT_BYTE: u8 = 0x03;

/// Settle time after rebooting the controllers.
const REBOOT_SETTLE: Duration = Duration::from_secs(5);
/// Quiet period between flushing the buffers and sending a command.
const SEND_SETTLE: Duration = Duration::from_millis(100);
const RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_REPLY_LENGTH: usize = 256;

pub trait SerialStreamIo: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialStreamIo for T {}

/// Checksum over the command or reply payload bytes: the low seven bits of
/// the byte sum, two's-complemented, with the top bit forced on.
pub fn checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&byte| byte as u32).sum();
    (!((sum & 0x7F) as u8)).wrapping_add(1) | 0x80
}

pub struct SerialLink {
    stream: Box<dyn SerialStreamIo>,
    read_timeout: Duration,
    retries: u32,
}

impl SerialLink {
    /// Open the configured port and reboot the controllers.
    pub async fn open_port(config: &Config) -> DomeResult<SerialLink> {
        let stream =
            tokio_serial::new(&config.serial_port, config.serial_baud).open_native_async()?;
        let mut link = SerialLink::from_stream(
            Box::new(stream),
            Duration::from_secs_f64(config.serial_timeout),
            config.serial_retries,
        );
        link.reboot_controllers().await?;
        Ok(link)
    }

    /// Adopt an already-open stream without rebooting the far end.
    pub fn from_stream(
        stream: Box<dyn SerialStreamIo>,
        read_timeout: Duration,
        retries: u32,
    ) -> SerialLink {
        SerialLink {
            stream,
            read_timeout,
            retries,
        }
    }

    pub async fn reboot_controllers(&mut self) -> DomeResult<()> {
        self.flush_buffers().await?;
        self.stream.write_all(&[REBOOT_BYTE]).await?;
        self.stream.flush().await?;
        sleep(REBOOT_SETTLE).await;
        Ok(())
    }

    /// Send one command, retrying transient failures, and return the value
    /// payload when one was requested.
    pub async fn send_command(
        &mut self,
        command: &str,
        expects_value: bool,
    ) -> DomeResult<Option<String>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if attempt > 1 {
                sleep(RETRY_DELAY).await;
                log::warn!(
                    "Retrying command {command} (attempt {attempt} of {}).",
                    self.retries
                );
            }

            self.flush_buffers().await?;
            sleep(SEND_SETTLE).await;

            match self.exchange(command, expects_value).await {
                Ok(reply) => return Ok(reply),
                Err(error) if attempt < self.retries => {
                    log::warn!("Command {command} failed: {error}.");
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn exchange(
        &mut self,
        command: &str,
        expects_value: bool,
    ) -> DomeResult<Option<String>> {
        let mut frame = Vec::with_capacity(command.len() + 3);
        frame.push(FRAME_BYTE);
        frame.extend_from_slice(command.as_bytes());
        frame.push(checksum(command.as_bytes()));
        frame.push(FRAME_BYTE);

        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        let ack = self.read_byte().await?;
        if ack != ACK_BYTE {
            return Err(DomeError::new(&format!(
                "command {command} rejected by controller (0x{ack:02x})"
            )));
        }

        if !expects_value {
            return Ok(None);
        }

        let line = self.read_reply_line().await?;
        if line.is_empty() {
            return Err(DomeError::new(&format!("empty reply to command {command}")));
        }

        let (payload, reply_checksum) = line.split_at(line.len() - 1);
        let expected = checksum(payload);
        if reply_checksum[0] != expected {
            return Err(DomeError::new(&format!(
                "reply checksum mismatch for command {command}: got 0x{:02x}, expected 0x{:02x}",
                reply_checksum[0], expected
            )));
        }

        match String::from_utf8(payload.to_vec()) {
            Ok(payload) => Ok(Some(payload)),
            Err(_) => Err(DomeError::new(&format!(
                "reply to command {command} is not valid ascii"
            ))),
        }
    }

    /// Drain anything buffered on the input side and flush the output side.
    async fn flush_buffers(&mut self) -> DomeResult<()> {
        self.stream.flush().await?;

        let mut scratch = [0u8; 64];
        loop {
            match timeout(Duration::from_millis(1), self.stream.read(&mut scratch)).await {
                Ok(Ok(0)) => return Err(DomeError::new("serial stream closed")),
                Ok(Ok(_)) => continue,
                Ok(Err(error)) => return Err(error.into()),
                Err(_) => return Ok(()),
            }
        }
    }

    async fn read_byte(&mut self) -> DomeResult<u8> {
        let mut byte = [0u8; 1];
        match timeout(self.read_timeout, self.stream.read_exact(&mut byte)).await {
            Ok(Ok(_)) => Ok(byte[0]),
            Ok(Err(error)) => Err(error.into()),
            Err(_) => Err(DomeError::new("timed out waiting for controller reply")),
        }
    }

    /// Read a value line up to the `\r\n` terminator, returning the payload
    /// bytes with the trailing checksum byte still attached.
    async fn read_reply_line(&mut self) -> DomeResult<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            let byte = self.read_byte().await?;
            if byte == b'\n' && line.last() == Some(&b'\r') {
                line.pop();
                return Ok(line);
            }
            line.push(byte);
            if line.len() > MAX_REPLY_LENGTH {
                return Err(DomeError::new("controller reply exceeds maximum length"));
            }
        }
    }
}
