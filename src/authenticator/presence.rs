use anyhow::Result;
use std::io::{self, BufRead, Write};

/// Asks the person at the keyboard to approve an authenticator operation.
pub trait UserPresence: Send + Sync {
    /// `Ok(false)` means the user declined.
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Prompts on the terminal and waits for `y`.
pub struct ConsolePresence;

impl UserPresence for ConsolePresence {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        eprint!("{} (y/n) ", prompt);
        let _ = io::stderr().flush();
        let mut buffer = String::new();
        io::stdin().lock().read_line(&mut buffer)?;
        // remove \n on unix or \r\n on windows
        let len = buffer.trim_end_matches(&['\r', '\n'][..]).len();
        buffer.truncate(len);

        Ok(buffer == "y")
    }
}

/// Approves every request without asking.
pub struct AutoApprove;

impl UserPresence for AutoApprove {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}
