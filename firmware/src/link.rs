//! Bridges the async UART between the halves onto the core's
//! non-blocking `Transport`: a pump task moves bytes between the
//! BufferedUarte and a pair of pipes, and `UartLink` exposes the pipe
//! ends to the frame loop.

use defmt::debug;
use embassy_futures::join::join;
use embassy_nrf::buffered_uarte::{BufferedUarteRx, BufferedUarteTx};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::pipe::Pipe;
use embedded_io_async::{Read, Write};
use mkx::interface::{LoopbackTransport, Transport, TransportError};
use mkx::message::Message;

const PIPE_SIZE: usize = 256;

/// Static storage for the two byte pipes of one link.
pub struct LinkBuffers {
    rx: Pipe<ThreadModeRawMutex, PIPE_SIZE>,
    tx: Pipe<ThreadModeRawMutex, PIPE_SIZE>,
}

#[allow(clippy::new_without_default)]
impl LinkBuffers {
    pub const fn new() -> Self {
        Self {
            rx: Pipe::new(),
            tx: Pipe::new(),
        }
    }

    pub fn transport(&self) -> UartLink<'_> {
        UartLink { buffers: self }
    }

    /// Moves bytes between the UART and the pipes until either side
    /// fails. Run this as its own task.
    pub async fn pump(&self, mut rx: BufferedUarteRx<'_>, mut tx: BufferedUarteTx<'_>) {
        let uart_to_pipe = async {
            let mut buf = [0u8; 64];
            loop {
                match rx.read(&mut buf).await {
                    Ok(0) => {}
                    Ok(n) => {
                        self.rx.write_all(&buf[..n]).await;
                    }
                    Err(err) => {
                        debug!("link rx error: {}", err);
                    }
                }
            }
        };
        let pipe_to_uart = async {
            let mut buf = [0u8; 64];
            loop {
                let n = self.tx.read(&mut buf).await;
                if let Err(err) = tx.write_all(&buf[..n]).await {
                    debug!("link tx error: {}", err);
                }
            }
        };
        join(uart_to_pipe, pipe_to_uart).await;
    }
}

/// The frame loop's view of the link.
pub struct UartLink<'a> {
    buffers: &'a LinkBuffers,
}

impl Transport for UartLink<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(self.buffers.rx.try_read(buf).unwrap_or(0))
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        while written < buf.len() {
            match self.buffers.tx.try_write(&buf[written..]) {
                Ok(n) => written += n,
                // full pipe mid-frame would desync the stream, so
                // give up on the whole message
                Err(_) => return Err(TransportError::Bus),
            }
        }
        Ok(())
    }
}

/// The central registers its own matrix as interface 0 behind an
/// in-memory loopback while remote halves arrive over the UART, and
/// the frame loop needs both behind one transport type.
pub enum CentralTransport<'a> {
    Local(LoopbackTransport),
    Uart(UartLink<'a>),
}

impl CentralTransport<'_> {
    /// Feeds a locally scanned key event into the loopback side; a
    /// no-op on the UART side.
    pub fn push_local_message(&mut self, message: &Message) {
        if let CentralTransport::Local(loopback) = self {
            loopback.push_message(message);
        }
    }
}

impl Transport for CentralTransport<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self {
            CentralTransport::Local(loopback) => loopback.read(buf),
            CentralTransport::Uart(link) => link.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        match self {
            CentralTransport::Local(loopback) => loopback.write(buf),
            CentralTransport::Uart(link) => link.write(buf),
        }
    }
}
