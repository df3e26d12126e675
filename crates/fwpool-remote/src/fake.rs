//! Scripted test double for the remote configuration client.
//!
//! Used by handler and metrics tests and by the `fwpoold` simulator:
//! responses are canned per command, connect failures can be injected to
//! exercise the bounded-retry path, and every executed command is recorded
//! so tests can assert ordering.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{RemoteError, RemoteResult};
use crate::ssh::Credentials;
use crate::{RemoteConfigClient, RemoteSession};

#[derive(Default)]
struct ScriptedState {
    /// Exact-match command → canned output.
    responses: HashMap<String, String>,
    /// (host, command) → canned output; takes precedence over `responses`.
    host_responses: HashMap<(String, String), String>,
    /// Connect attempts to reject before succeeding.
    connect_failures: u32,
    /// Successful connects.
    connects: u32,
    /// Every command executed across all sessions, in order.
    log: Vec<String>,
}

/// Remote client returning canned responses.
#[derive(Clone, Default)]
pub struct ScriptedRemote {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned output for an exact command. Commands without a canned
    /// response return `"OK"`.
    pub fn respond(&self, command: impl Into<String>, output: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(command.into(), output.into());
    }

    /// Canned output for a command, only when executed on `host`.
    pub fn respond_for_host(
        &self,
        host: impl Into<String>,
        command: impl Into<String>,
        output: impl Into<String>,
    ) {
        self.state
            .lock()
            .unwrap()
            .host_responses
            .insert((host.into(), command.into()), output.into());
    }

    /// Reject the next `count` connect calls.
    pub fn fail_connects(&self, count: u32) {
        self.state.lock().unwrap().connect_failures = count;
    }

    /// Commands executed so far, across all sessions, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Number of successful connects.
    pub fn connects(&self) -> u32 {
        self.state.lock().unwrap().connects
    }
}

#[async_trait]
impl RemoteConfigClient for ScriptedRemote {
    async fn connect(
        &self,
        host: &str,
        _credentials: &Credentials,
    ) -> RemoteResult<Box<dyn RemoteSession>> {
        let mut state = self.state.lock().unwrap();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(RemoteError::Connect {
                host: host.to_string(),
                attempts: 1,
                reason: "injected connect failure".to_string(),
            });
        }
        state.connects += 1;
        Ok(Box::new(ScriptedSession {
            host: host.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct ScriptedSession {
    host: String,
    state: Arc<Mutex<ScriptedState>>,
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn execute(&mut self, command: &str) -> RemoteResult<String> {
        let mut state = self.state.lock().unwrap();
        state.log.push(command.to_string());
        if let Some(output) = state
            .host_responses
            .get(&(self.host.clone(), command.to_string()))
        {
            return Ok(output.clone());
        }
        Ok(state
            .responses
            .get(command)
            .cloned()
            .unwrap_or_else(|| "OK".to_string()))
    }

    async fn transfer_file(&mut self, _contents: &[u8], remote_path: &str) -> RemoteResult<()> {
        self.state
            .lock()
            .unwrap()
            .log
            .push(format!("put {remote_path}"));
        Ok(())
    }

    async fn close(&mut self) {}
}
