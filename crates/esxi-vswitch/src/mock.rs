//! Scripted in-memory session for unit tests.

use crate::error::EsxiResult;
use crate::session::HostSession;
use crate::types::CommandOutput;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Answers commands from a script and records everything it was asked.
#[derive(Default)]
pub struct ScriptedSession {
    responses: Mutex<HashMap<String, CommandOutput>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to exactly `command`.
    pub fn on(self, command: impl Into<String>, output: CommandOutput) -> Self {
        self.responses.lock().unwrap().insert(command.into(), output);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls except listings, queries and version checks.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                c != "esxcfg-vswitch -l"
                    && c != "vmware -v"
                    && !c.contains(" get ")
                    && !c.ends_with(" list")
                    && !c.contains(" list ")
            })
            .collect()
    }
}

#[async_trait]
impl HostSession for ScriptedSession {
    fn host(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, command: &str) -> EsxiResult<CommandOutput> {
        self.calls.lock().unwrap().push(command.to_string());
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .get(command)
            .cloned()
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}
