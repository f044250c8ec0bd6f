use crate::error::CeremonyError;
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ceremony {
    Registration,
    Authentication,
}

impl Ceremony {
    pub fn name(&self) -> &'static str {
        match self {
            Ceremony::Registration => "Registration",
            Ceremony::Authentication => "Authentication",
        }
    }
}

/// Steps of a single ceremony invocation.
///
/// Registration walks `Idle, OptionsRequested, OptionsReceived, CredentialCreating,
/// CredentialCreated, ResultSent, Complete`; authentication swaps the two credential steps
/// for `AssertionRequesting, AssertionReceived`. `Failed` can follow any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyState {
    Idle,
    OptionsRequested,
    OptionsReceived,
    CredentialCreating,
    CredentialCreated,
    AssertionRequesting,
    AssertionReceived,
    ResultSent,
    Complete,
    Failed,
}

/// Records the states one invocation passes through.
pub(crate) struct Trace {
    ceremony: Ceremony,
    states: Vec<CeremonyState>,
}

impl Trace {
    pub(crate) fn new(ceremony: Ceremony) -> Self {
        Trace {
            ceremony,
            states: vec![CeremonyState::Idle],
        }
    }

    pub(crate) fn enter(&mut self, state: CeremonyState) {
        debug!("{} ceremony: {:?}", self.ceremony.name(), state);
        self.states.push(state);
    }

    pub(crate) fn finish(mut self, result: Result<String, CeremonyError>) -> CeremonyOutcome {
        match &result {
            Ok(_) => self.enter(CeremonyState::Complete),
            Err(e) => {
                warn!("{} ceremony failed: {}", self.ceremony.name(), e);
                self.enter(CeremonyState::Failed);
            }
        }

        CeremonyOutcome {
            ceremony: self.ceremony,
            states: self.states,
            result,
        }
    }
}

/// How a ceremony invocation ended. Never a fault: failures are carried in `result`.
#[derive(Debug)]
pub struct CeremonyOutcome {
    ceremony: Ceremony,
    states: Vec<CeremonyState>,
    result: Result<String, CeremonyError>,
}

impl CeremonyOutcome {
    pub fn ceremony(&self) -> Ceremony {
        self.ceremony
    }

    pub fn states(&self) -> &[CeremonyState] {
        &self.states
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The credential id the relying party reported.
    pub fn credential_id(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }

    pub fn error(&self) -> Option<&CeremonyError> {
        self.result.as_ref().err()
    }

    /// The single line shown to the user.
    pub fn status_message(&self) -> String {
        let name = self.ceremony.name();

        match &self.result {
            Ok(credential_id) => format!("{} complete. CredentialId: {}", name, credential_id),
            Err(CeremonyError::UnsupportedPlatform) => {
                String::from("WebAuthn is not supported on this platform.")
            }
            Err(CeremonyError::MissingInput(what)) => format!("Enter the {} first.", what),
            Err(CeremonyError::NoCredentialCreated) => String::from("No credential created."),
            Err(CeremonyError::NoAssertionReturned) => String::from("No assertion returned."),
            Err(e) => format!("{} failed: {}", name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_outcome() {
        let mut trace = Trace::new(Ceremony::Registration);
        trace.enter(CeremonyState::OptionsRequested);
        let outcome = trace.finish(Ok(String::from("abc")));

        assert!(outcome.is_success());
        assert_eq!(outcome.credential_id(), Some("abc"));
        assert_eq!(
            outcome.states(),
            &[
                CeremonyState::Idle,
                CeremonyState::OptionsRequested,
                CeremonyState::Complete
            ]
        );
        assert_eq!(
            outcome.status_message(),
            "Registration complete. CredentialId: abc"
        );
    }

    #[test]
    fn test_failure_messages() {
        let cases = vec![
            (
                CeremonyError::UnsupportedPlatform,
                "WebAuthn is not supported on this platform.",
            ),
            (
                CeremonyError::MissingInput("username"),
                "Enter the username first.",
            ),
            (CeremonyError::NoAssertionReturned, "No assertion returned."),
            (
                CeremonyError::Request(String::from("username taken")),
                "Authentication failed: username taken",
            ),
        ];

        for (error, message) in cases {
            let outcome = Trace::new(Ceremony::Authentication).finish(Err(error));

            assert!(!outcome.is_success());
            assert_eq!(outcome.states().last(), Some(&CeremonyState::Failed));
            assert_eq!(outcome.status_message(), message);
        }
    }
}
