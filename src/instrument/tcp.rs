// src/instrument/tcp.rs
use crate::error::{WaveLogError, Result};
use crate::instrument::{scpi, Instrument};
use log::{debug, trace};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Raw-socket SCPI connection (Rigol LAN instruments listen on port 5555)
///
/// Commands are newline-terminated. Binary replies are IEEE-488.2
/// definite-length blocks followed by a newline terminator.
pub struct TcpInstrument {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    expect_termination: bool,
}

impl TcpInstrument {
    pub const DEFAULT_PORT: u16 = 5555;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connect with the default 60 s I/O timeout (large block transfers are slow)
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with_timeout(addr, Self::DEFAULT_TIMEOUT)
    }

    pub fn connect_with_timeout(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        debug!("Connected to {:?}", stream.peer_addr().ok());

        let writer = stream.try_clone()?;
        Ok(TcpInstrument {
            reader: BufReader::with_capacity(1024 * 1024, stream),
            writer,
            expect_termination: true,
        })
    }

    /// Whether a trailing newline follows each binary block (default `true`)
    pub fn set_expect_termination(&mut self, expect: bool) {
        self.expect_termination = expect;
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).map_err(map_timeout)?;
        if n == 0 {
            return Err(WaveLogError::Instrument("connection closed by instrument".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_block(&mut self) -> Result<Vec<u8>> {
        let mut prefix = Vec::with_capacity(11);
        let (prefix_len, payload_len) = loop {
            if let Some(parsed) = scpi::parse_block_prefix(&prefix)? {
                break parsed;
            }
            let mut byte = [0u8; 1];
            self.reader.read_exact(&mut byte).map_err(map_timeout)?;
            prefix.push(byte[0]);
        };
        trace!("IEEE block: {} prefix bytes, {} payload bytes", prefix_len, payload_len);

        // read_exact keeps reading until a split transfer is complete
        let mut payload = vec![0u8; payload_len];
        self.reader.read_exact(&mut payload).map_err(map_timeout)?;

        if self.expect_termination {
            let mut term = [0u8; 1];
            self.reader.read_exact(&mut term).map_err(map_timeout)?;
            if term[0] != b'\n' {
                return Err(WaveLogError::Instrument(format!(
                    "expected block terminator, found {:#04x}",
                    term[0]
                )));
            }
        }
        Ok(payload)
    }
}

fn map_timeout(err: std::io::Error) -> WaveLogError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            WaveLogError::Instrument(format!("instrument I/O timed out: {}", err))
        }
        _ => WaveLogError::Io(err),
    }
}

impl Instrument for TcpInstrument {
    fn write(&mut self, command: &str) -> Result<()> {
        trace!("-> {}", command);
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        let reply = self.read_line()?;
        trace!("<- {}", reply);
        Ok(reply)
    }

    fn query_binary_values(&mut self, command: &str) -> Result<Vec<u8>> {
        self.write(command)?;
        self.read_block()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_query_and_block_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut out = stream;

            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, ":TRIG:STAT?\n");
            out.write_all(b"STOP\n").unwrap();

            line.clear();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, ":WAV:DATA?\n");
            let mut block = scpi::encode_block(&[10, 20, 30, 40]);
            block.push(b'\n');
            // split write exercises the continued read
            out.write_all(&block[..5]).unwrap();
            out.flush().unwrap();
            out.write_all(&block[5..]).unwrap();
        });

        let mut inst = TcpInstrument::connect_with_timeout(addr, Duration::from_secs(5)).unwrap();
        assert_eq!(inst.trigger_status().unwrap(), crate::types::TriggerStatus::Stopped);
        assert_eq!(inst.query_binary_values(":WAV:DATA?").unwrap(), vec![10, 20, 30, 40]);

        server.join().unwrap();
    }
}
