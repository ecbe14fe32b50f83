//! Client side of one scripted SMTP exchange
//!
//! A session owns exactly one connection. `run` consumes the session, so the
//! connection is gone by the time the caller goes on to stop the server.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use crate::common::{Error, Result};
use crate::testing::Directive;

use super::codec::FramedReader;

/// Address family used to reach the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Loopback address of this family
    pub fn loopback(self, port: u16) -> SocketAddr {
        match self {
            AddressFamily::Ipv4 => SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            AddressFamily::Ipv6 => SocketAddr::from((Ipv6Addr::LOCALHOST, port)),
        }
    }
}

/// Number of leading characters compared between expected and received lines
pub const REPLY_CODE_LEN: usize = 3;

/// Scripted client session
pub struct Session<S = TcpStream> {
    reader: FramedReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    receive_timeout: Duration,
}

impl Session<TcpStream> {
    /// Connect to the server on the loopback address of `family`
    pub async fn connect(
        family: AddressFamily,
        port: u16,
        receive_timeout: Duration,
    ) -> Result<Self> {
        let addr = family.loopback(port);
        tracing::debug!("Connecting to {}", addr);

        let stream = match tokio::time::timeout(receive_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(Error::ConnectFailure {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(Error::ConnectFailure {
                    addr: addr.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "connect timed out",
                    ),
                })
            }
        };

        Ok(Self::new(stream, receive_timeout))
    }
}

impl<S: AsyncRead + AsyncWrite> Session<S> {
    /// Wrap an already-established stream
    pub fn new(stream: S, receive_timeout: Duration) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        Self {
            reader: FramedReader::new(read_half),
            writer,
            receive_timeout,
        }
    }

    /// Replay directives in order, stopping at the first failure
    ///
    /// The connection is shut down before this returns, whatever the outcome.
    pub async fn run(mut self, directives: &[Directive]) -> Result<()> {
        let result = self.replay(directives).await;

        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("Connection shutdown failed: {}", e);
        }

        result
    }

    async fn replay(&mut self, directives: &[Directive]) -> Result<()> {
        for directive in directives {
            match directive {
                Directive::Send(payload) => self.send(payload).await?,
                Directive::ExpectCode(expected) => self.expect(expected).await?,
            }
        }
        Ok(())
    }

    async fn send(&mut self, payload: &str) -> Result<()> {
        tracing::trace!("C: {}", payload);
        let mut bytes = Vec::with_capacity(payload.len() + 2);
        bytes.extend_from_slice(payload.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn expect(&mut self, expected: &str) -> Result<()> {
        let line = match tokio::time::timeout(self.receive_timeout, self.reader.next_line()).await
        {
            Ok(line) => line?,
            Err(_) => return Err(Error::ReceiveTimeout(self.receive_timeout.as_secs())),
        };

        let line = line.ok_or_else(|| Error::ConnectionClosed {
            expected: expected.to_string(),
        })?;
        tracing::trace!("S: {}", line);

        let got = reply_code(&line);
        if got != expected {
            return Err(Error::protocol_mismatch(expected, &got));
        }
        Ok(())
    }
}

/// Leading reply-code characters of a line
pub fn reply_code(line: &str) -> String {
    line.chars().take(REPLY_CODE_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn send(s: &str) -> Directive {
        Directive::Send(s.to_string())
    }

    fn expect(s: &str) -> Directive {
        Directive::ExpectCode(s.to_string())
    }

    fn pair() -> (Session<DuplexStream>, DuplexStream) {
        let (client, server) = tokio::io::duplex(1024);
        (Session::new(client, Duration::from_millis(200)), server)
    }

    #[tokio::test]
    async fn test_send_appends_exactly_one_crlf() {
        let (session, mut server) = pair();

        session
            .run(&[send("HELO client.example"), send("QUIT")])
            .await
            .unwrap();

        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, b"HELO client.example\r\nQUIT\r\n");
    }

    #[tokio::test]
    async fn test_can_quit_exchange() {
        let (session, mut server) = pair();
        server
            .write_all(b"220 mysmtp Service ready\r\n221 mysmtp closing\r\n")
            .await
            .unwrap();

        session
            .run(&[expect("220"), send("QUIT"), expect("221")])
            .await
            .unwrap();

        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, b"QUIT\r\n");
    }

    #[tokio::test]
    async fn test_mismatch_skips_remaining_directives() {
        let (session, mut server) = pair();
        server.write_all(b"500 Syntax error\r\n").await.unwrap();

        let err = session
            .run(&[expect("250"), send("QUIT")])
            .await
            .unwrap_err();

        match err {
            Error::ProtocolMismatch { expected, got } => {
                assert_eq!(expected, "250");
                assert_eq!(got, "500");
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();
        assert!(wire.is_empty(), "QUIT must not be sent after a mismatch");
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let (session, _server) = pair();

        let err = session.run(&[expect("220")]).await.unwrap_err();
        assert!(matches!(err, Error::ReceiveTimeout(_)));
    }

    #[tokio::test]
    async fn test_peer_close_while_expecting() {
        let (session, mut server) = pair();
        server.write_all(b"220 ready\r\n").await.unwrap();
        server.shutdown().await.unwrap();

        let err = session
            .run(&[expect("220"), expect("250")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed { .. }));
    }

    #[tokio::test]
    async fn test_only_prefix_is_compared() {
        let (session, mut server) = pair();
        server
            .write_all(b"250-host greets you\r\n250 VRFY\r\n")
            .await
            .unwrap();

        session.run(&[expect("250"), expect("250")]).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Session::connect(AddressFamily::Ipv4, port, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::ConnectFailure { .. })));
    }

    #[test]
    fn test_reply_code_of_short_line() {
        assert_eq!(reply_code("25"), "25");
        assert_eq!(reply_code("221 bye"), "221");
    }

    #[tokio::test]
    async fn test_short_expected_code_matches_only_equally_short_line() {
        // Truncation without padding: a two-character code equals the
        // prefix of a two-character line, never of a full reply.
        let (session, mut server) = pair();
        server.write_all(b"25\r\n").await.unwrap();
        session.run(&[expect("25")]).await.unwrap();

        let (session, mut server) = pair();
        server.write_all(b"250 OK\r\n").await.unwrap();
        let err = session.run(&[expect("25")]).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolMismatch { ref got, .. } if got == "250"));
    }

    #[test]
    fn test_loopback_addresses() {
        assert_eq!(
            AddressFamily::Ipv4.loopback(7548).to_string(),
            "127.0.0.1:7548"
        );
        assert_eq!(AddressFamily::Ipv6.loopback(7548).to_string(), "[::1]:7548");
    }
}
