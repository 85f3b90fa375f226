//! Server side of the plaintext RTMP handshake
//!
//! ```text
//! Client                                   Server
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536: ts+zero+random) ---->|
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536: ts+zero+random) -----|
//!   |<------ S2 (1536: echo of C1) ---------|
//!   |------- C2 (1536: echo of S1) -------->|
//! ```
//!
//! S0/S1 are sent only after C0 arrives; waiting for C1 as well is
//! permitted and is what this implementation does. C2 must echo the random
//! block of S1 or the handshake fails.
//!
//! The RTMP specification describes S2 as `(C1 timestamp, receive
//! timestamp, C1 random)`, but widely deployed encoders expect a verbatim
//! 1536-byte echo of C1.
//! Both forms are valid for conforming peers; the verbatim echo is the
//! default and [`ServerHandshake::new`] takes the choice as a flag.

use std::time::Instant;

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_RANDOM_SIZE, HANDSHAKE_SIZE, RTMP_VERSION};

/// One-shot server handshake engine
#[derive(Debug)]
pub struct ServerHandshake {
    /// Send S2 as a verbatim echo of C1 instead of the specified layout
    echo_c1: bool,
    /// Epoch for the millisecond timestamps in S1/S2
    epoch: Instant,
}

impl ServerHandshake {
    pub fn new(echo_c1: bool) -> Self {
        Self {
            echo_c1,
            epoch: Instant::now(),
        }
    }

    /// Drive the full C0/C1/C2 exchange on a fresh connection.
    ///
    /// Any failure is fatal to the connection: version mismatch, random
    /// block mismatch, or I/O error. EOF mid-handshake surfaces as
    /// [`Error::ConnectionClosed`].
    pub async fn perform<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        // C0
        let mut c0 = [0u8; 1];
        read_full(reader, &mut c0).await?;
        if c0[0] != RTMP_VERSION {
            return Err(HandshakeError::InvalidVersion(c0[0]).into());
        }

        // C1
        let mut c1 = [0u8; HANDSHAKE_SIZE];
        read_full(reader, &mut c1).await?;

        // S0 + S1
        let s1 = self.build_s1();
        writer.write_all(&[RTMP_VERSION]).await?;
        writer.write_all(&s1).await?;
        writer.flush().await?;

        // S2
        if self.echo_c1 {
            writer.write_all(&c1).await?;
        } else {
            let mut s2 = c1;
            s2[4..8].copy_from_slice(&self.now_millis().to_be_bytes());
            writer.write_all(&s2).await?;
        }
        writer.flush().await?;

        // C2: the peer must echo our S1 random block. The first 8 bytes
        // (timestamp echo + receive time) are not verified.
        let mut c2 = [0u8; HANDSHAKE_SIZE];
        read_full(reader, &mut c2).await?;
        if c2[8..] != s1[8..] {
            return Err(HandshakeError::AckMismatch.into());
        }

        Ok(())
    }

    fn build_s1(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut s1 = [0u8; HANDSHAKE_SIZE];
        s1[0..4].copy_from_slice(&self.now_millis().to_be_bytes());
        // bytes 4..8 stay zero for the plaintext handshake
        rand::rng().fill_bytes(&mut s1[HANDSHAKE_SIZE - HANDSHAKE_RANDOM_SIZE..]);
        s1
    }

    fn now_millis(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}

async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    /// Run the server handshake against a scripted client. Returns the
    /// server result and the client's C2 echo check material.
    async fn run_handshake(
        c0: u8,
        tamper: Option<std::ops::Range<usize>>,
        echo_c1: bool,
    ) -> (Result<()>, Vec<u8>, Vec<u8>) {
        let (mut client, server) = duplex(16 * 1024);
        let (mut rd, mut wr) = tokio::io::split(server);

        let server_task = tokio::spawn(async move {
            ServerHandshake::new(echo_c1).perform(&mut rd, &mut wr).await
        });

        // C0 + C1 (all-zero payload)
        let c1 = [0u8; HANDSHAKE_SIZE];
        client.write_all(&[c0]).await.unwrap();
        client.write_all(&c1).await.unwrap();

        // S0 + S1 + S2
        let mut s0 = [0u8; 1];
        client.read_exact(&mut s0).await.unwrap();
        let mut s1 = [0u8; HANDSHAKE_SIZE];
        client.read_exact(&mut s1).await.unwrap();
        let mut s2 = [0u8; HANDSHAKE_SIZE];
        client.read_exact(&mut s2).await.unwrap();
        assert_eq!(s0[0], RTMP_VERSION);

        // C2 echoes S1, optionally corrupted in the given byte range
        let mut c2 = s1;
        if let Some(range) = tamper {
            for b in &mut c2[range] {
                *b ^= 0xFF;
            }
        }
        client.write_all(&c2).await.unwrap();

        let result = server_task.await.unwrap();
        (result, s1.to_vec(), s2.to_vec())
    }

    #[tokio::test]
    async fn test_handshake_ok() {
        let (result, _, _) = run_handshake(0x03, None, true).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bad_version_rejected() {
        let (mut client, server) = duplex(16 * 1024);
        let (mut rd, mut wr) = tokio::io::split(server);
        let server_task = tokio::spawn(async move {
            ServerHandshake::new(true).perform(&mut rd, &mut wr).await
        });

        client.write_all(&[0x06]).await.unwrap();
        client.write_all(&[0u8; HANDSHAKE_SIZE]).await.unwrap();

        let result = server_task.await.unwrap();
        assert!(matches!(
            result,
            Err(Error::Handshake(HandshakeError::InvalidVersion(0x06)))
        ));
    }

    #[tokio::test]
    async fn test_tampered_random_block_rejected() {
        // any corrupted byte in [8..1536) must fail the ack check
        let (result, _, _) = run_handshake(0x03, Some(700..701), true).await;
        assert!(matches!(
            result,
            Err(Error::Handshake(HandshakeError::AckMismatch))
        ));
    }

    #[tokio::test]
    async fn test_tampered_timestamp_prefix_accepted() {
        // bytes [0..8) of C2 carry timestamps and are not verified
        let (result, _, _) = run_handshake(0x03, Some(0..8), true).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_s2_verbatim_echo_of_c1() {
        let (result, _, s2) = run_handshake(0x03, None, true).await;
        assert!(result.is_ok());
        assert_eq!(s2, vec![0u8; HANDSHAKE_SIZE]);
    }

    #[tokio::test]
    async fn test_s2_timestamp_form_echoes_c1_random() {
        let (result, _, s2) = run_handshake(0x03, None, false).await;
        assert!(result.is_ok());
        // C1 timestamp echoed, receive time in [4..8), C1 random after
        assert_eq!(&s2[0..4], &[0u8; 4]);
        assert_eq!(&s2[8..], &[0u8; HANDSHAKE_SIZE - 8][..]);
    }

    #[tokio::test]
    async fn test_peer_disconnect_mid_handshake() {
        let (mut client, server) = duplex(16 * 1024);
        let (mut rd, mut wr) = tokio::io::split(server);
        let server_task = tokio::spawn(async move {
            ServerHandshake::new(true).perform(&mut rd, &mut wr).await
        });

        client.write_all(&[0x03]).await.unwrap();
        client.write_all(&[0u8; 100]).await.unwrap();
        drop(client);

        let result = server_task.await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_s1_random_block_is_not_constant() {
        let hs = ServerHandshake::new(true);
        let a = hs.build_s1();
        let b = hs.build_s1();
        assert_ne!(&a[8..], &b[8..]);
        assert_eq!(&a[4..8], &[0u8; 4]);
    }
}
