//! CAPABILITY command handler.
//!
//! After STARTTLS the server does not greet again (RFC 3501 6.2.1), so
//! clients re-issue CAPABILITY to learn what the encrypted session
//! supports.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Capabilities advertised once the session is encrypted.
pub const TLS_CAPABILITIES: &str = "IMAP4rev1 AUTH=PLAIN IDLE";

/// Handle the CAPABILITY command.
pub async fn handle_capability<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    write_line(stream, &format!("* CAPABILITY {TLS_CAPABILITIES}\r\n")).await?;
    write_line(stream, &format!("{tag} OK CAPABILITY completed\r\n")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn run(tag: &str) -> String {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);

        handle_capability(tag, &mut stream).await.unwrap();
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn untagged_list_then_tagged_ok() {
        let output = run("A2").await;
        assert_eq!(
            output,
            "* CAPABILITY IMAP4rev1 AUTH=PLAIN IDLE\r\nA2 OK CAPABILITY completed\r\n"
        );
    }
}
