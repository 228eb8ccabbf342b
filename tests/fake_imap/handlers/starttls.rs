//! STARTTLS command handler.
//!
//! RFC 3501 Section 6.2.1: the server answers with a tagged OK and the
//! TLS negotiation starts right after the CRLF.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the STARTTLS command on the plaintext stream.
pub async fn handle_starttls<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    write_line(stream, &format!("{tag} OK Begin TLS negotiation now\r\n")).await
}

/// Refuse the STARTTLS command, as a server without TLS support does.
pub async fn refuse_starttls<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    write_line(stream, &format!("{tag} NO STARTTLS not available\r\n")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn refuses_with_tag() {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);
        refuse_starttls("A1", &mut stream).await.unwrap();
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "A1 NO STARTTLS not available\r\n");
    }

    #[tokio::test]
    async fn acknowledges_with_tag() {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);
        handle_starttls("A1", &mut stream).await.unwrap();
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "A1 OK Begin TLS negotiation now\r\n");
    }
}
