//! Terminal credential prompt.

use std::io;

use console::Term;
use tabris_platform::{Credential, CredentialPrompt};

/// Asks for the build key on the terminal without echoing it.
pub(crate) struct TerminalPrompt {
    term: Term,
}

impl TerminalPrompt {
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl CredentialPrompt for TerminalPrompt {
    fn prompt_credential(&self) -> io::Result<Credential> {
        if !self.term.is_term() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "a build key is required but no terminal is attached",
            ));
        }
        self.term.write_str("Build key: ")?;
        let key = self.term.read_secure_line()?;
        Ok(Credential::new(key.trim()))
    }
}
