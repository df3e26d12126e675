//! Configuration scripts and failure-marker scanning.
//!
//! Appliance CLIs report errors in command output rather than exit codes,
//! so each command's output is scanned for the known error prefixes. The
//! first hit aborts the remaining script and reports the failing command
//! together with the device's literal response.

use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::RemoteSession;

/// Output substrings the appliance CLI uses to signal command failure.
const FAILURE_MARKERS: &[&str] = &[
    "% Error",
    "Syntax error",
    "Unknown command",
    "Unknown action",
    "Permission denied",
    "Command fail",
    "node_check_object fail",
];

/// An ordered sequence of configuration commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigScript {
    commands: Vec<String>,
}

impl ConfigScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a script from raw configuration text, one command per line.
    /// Blank lines and `#` comments are skipped.
    pub fn from_text(text: &str) -> Self {
        let commands = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { commands }
    }

    /// Append one command.
    pub fn push(&mut self, command: impl Into<String>) -> &mut Self {
        self.commands.push(command.into());
        self
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Scan command output for a failure marker.
pub fn find_failure_marker(output: &str) -> Option<&'static str> {
    FAILURE_MARKERS
        .iter()
        .find(|marker| output.contains(*marker))
        .copied()
}

/// Apply a script to a session, command by command.
///
/// Stops at the first command whose output carries a failure marker and
/// returns `RemoteError::Command` with the literal device response. The
/// remaining commands are not executed and nothing is retried.
pub async fn apply(session: &mut dyn RemoteSession, script: &ConfigScript) -> RemoteResult<()> {
    for command in script.commands() {
        let output = session.execute(command).await?;
        if find_failure_marker(&output).is_some() {
            return Err(RemoteError::Command {
                command: command.clone(),
                response: output,
            });
        }
        debug!(%command, "command applied");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::ScriptedRemote;
    use crate::{Credentials, RemoteConfigClient};

    fn creds() -> Credentials {
        Credentials {
            user: "admin".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn from_text_skips_blanks_and_comments() {
        let script = ConfigScript::from_text(
            "# day-0 config\n\nset interface port1 ip 10.0.0.5/24\n  \nset admin timeout 30\n",
        );
        assert_eq!(
            script.commands(),
            &[
                "set interface port1 ip 10.0.0.5/24".to_string(),
                "set admin timeout 30".to_string(),
            ]
        );
    }

    #[test]
    fn detects_known_failure_markers() {
        assert_eq!(find_failure_marker("% Error: bad value"), Some("% Error"));
        assert_eq!(
            find_failure_marker("Unknown command: sho sys"),
            Some("Unknown command")
        );
        assert_eq!(find_failure_marker("config applied"), None);
    }

    #[tokio::test]
    async fn apply_runs_all_commands_in_order() {
        let remote = ScriptedRemote::new();
        let mut session = remote.connect("10.0.0.5", &creds()).await.unwrap();

        let mut script = ConfigScript::new();
        script.push("config system interface");
        script.push("set ip 10.0.1.5/24");
        script.push("end");

        apply(session.as_mut(), &script).await.unwrap();
        assert_eq!(
            remote.executed(),
            vec![
                "config system interface".to_string(),
                "set ip 10.0.1.5/24".to_string(),
                "end".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn apply_aborts_on_first_failure_marker() {
        let remote = ScriptedRemote::new();
        remote.respond("set bogus", "Unknown command: set bogus");
        let mut session = remote.connect("10.0.0.5", &creds()).await.unwrap();

        let mut script = ConfigScript::new();
        script.push("config system interface");
        script.push("set bogus");
        script.push("end");

        let err = apply(session.as_mut(), &script).await.unwrap_err();
        match err {
            RemoteError::Command { command, response } => {
                assert_eq!(command, "set bogus");
                assert!(response.contains("Unknown command"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // "end" never ran.
        assert_eq!(remote.executed().len(), 2);
    }
}
