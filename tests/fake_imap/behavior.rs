//! What the fake server does on each connection
//!
//! Built step by step, like a real deployment with its quirks:
//!
//! ```ignore
//! let behavior = Behavior::starttls()
//!     .greeting("* OK ready\r\n")
//!     .close_after_noops(3);
//! ```

/// How the connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Plaintext greeting, then STARTTLS (port 143 style).
    StartTls,
    /// TLS from the first byte (port 993 style).
    ImplicitTls,
    /// Answer STARTTLS with a tagged NO and keep the connection open.
    RefuseStartTls,
    /// Acknowledge STARTTLS, then keep talking plaintext.
    PlaintextAfterStartTls,
    /// Plaintext greeting where the client expects TLS.
    PlaintextOnTlsPort,
    /// Accept the connection and never say anything.
    Silent,
}

#[derive(Debug, Clone)]
pub struct Behavior {
    pub mode: Mode,
    /// First line sent on the connection (pre-TLS for STARTTLS modes).
    pub greeting: String,
    /// Close the connection instead of answering the NOOP after this
    /// many successful ones.
    pub noop_limit: Option<usize>,
    /// Answer this 1-based NOOP with a tagged NO instead of OK.
    pub noop_reject: Option<usize>,
    /// Untagged `* n EXISTS` line sent before each NOOP completion.
    pub exists: Option<u32>,
}

impl Behavior {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            greeting: "* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] Fake server ready\r\n"
                .to_string(),
            noop_limit: None,
            noop_reject: None,
            exists: None,
        }
    }

    pub fn starttls() -> Self {
        Self::with_mode(Mode::StartTls)
    }

    pub fn implicit_tls() -> Self {
        let mut behavior = Self::with_mode(Mode::ImplicitTls);
        behavior.greeting = "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] Fake server ready\r\n".to_string();
        behavior
    }

    pub fn refuse_starttls() -> Self {
        Self::with_mode(Mode::RefuseStartTls)
    }

    pub fn plaintext_after_starttls() -> Self {
        Self::with_mode(Mode::PlaintextAfterStartTls)
    }

    pub fn plaintext_on_tls_port() -> Self {
        Self::with_mode(Mode::PlaintextOnTlsPort)
    }

    pub fn silent() -> Self {
        Self::with_mode(Mode::Silent)
    }

    /// Replace the greeting line (must end with CRLF).
    pub fn greeting(mut self, line: &str) -> Self {
        self.greeting = line.to_string();
        self
    }

    pub fn close_after_noops(mut self, k: usize) -> Self {
        self.noop_limit = Some(k);
        self
    }

    pub fn reject_noop(mut self, k: usize) -> Self {
        self.noop_reject = Some(k);
        self
    }

    pub fn exists(mut self, n: u32) -> Self {
        self.exists = Some(n);
        self
    }
}
