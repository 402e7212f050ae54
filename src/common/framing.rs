use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_cbor;

use errors::Result;
use MAX_MSG_SIZE;

/// Auxiliary trait for reading framed CBOR messages from and writing them to
/// sockets. A frame is a u32-LE length prefix followed by the CBOR payload.
pub trait SocketExt {
    fn write_frame(&mut self, data: &[u8]) -> Result<()>;
    fn read_frame(&mut self) -> Result<Vec<u8>>;

    fn write_msg<T: Serialize>(&mut self, msg: &T) -> Result<()>;
    fn read_msg<T: DeserializeOwned>(&mut self) -> Result<T>;

    /// Like `read_msg`, but gives up after `timeout` when no frame has
    /// started to arrive (`Ok(None)`). Used where a blocking poll needs an
    /// idle sentinel.
    fn read_msg_timeout<T: DeserializeOwned>(&mut self, timeout: Duration) -> Result<Option<T>>;
}

impl SocketExt for TcpStream {
    fn write_msg<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        let data = serde_cbor::to_vec(msg)?;
        self.write_frame(&data)
    }

    fn read_msg<T: DeserializeOwned>(&mut self) -> Result<T> {
        let data = self.read_frame()?;
        let msg = serde_cbor::from_slice::<T>(&data)?;
        Ok(msg)
    }

    fn read_msg_timeout<T: DeserializeOwned>(&mut self, timeout: Duration) -> Result<Option<T>> {
        // Peek rather than read so that a timeout can never split a frame.
        self.set_read_timeout(Some(timeout))?;
        let mut probe = [0u8; 1];
        let probed = self.peek(&mut probe);
        self.set_read_timeout(None)?;
        match probed {
            Ok(0) => bail!("connection closed by peer"),
            Ok(_) => Ok(Some(self.read_msg()?)),
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        check_frame_len(data.len(), "outgoing")?;
        let mut header = [0u8; 4];
        LittleEndian::write_u32(&mut header, data.len() as u32);
        self.write_all(&header)?;
        self.write_all(data)?;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; 4];
        self.read_exact(&mut header)?;
        let len = LittleEndian::read_u32(&header) as usize;
        check_frame_len(len, "incoming")?;
        let mut data = vec![0u8; len];
        self.read_exact(&mut data)?;
        Ok(data)
    }
}

/// Both directions enforce the same frame size ceiling, so a runaway length
/// prefix can neither be sent nor make the reader allocate unbounded memory.
fn check_frame_len(len: usize, direction: &str) -> Result<()> {
    if len > MAX_MSG_SIZE {
        bail!(
            "{} frame of {} bytes exceeds the {}-byte message limit",
            direction,
            len,
            MAX_MSG_SIZE
        );
    }
    Ok(())
}
