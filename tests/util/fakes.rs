use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use anyhow::anyhow;
use mos_integration_tests::migration::{ComputeApi, Server};
use mos_integration_tests::{Remote, RemoteResult};

/// Remote which replays scripted results and records the executed
/// commands
#[derive(Default)]
pub struct ScriptedRemote {
    responses: VecDeque<anyhow::Result<RemoteResult>>,
    fallback: Option<RemoteResult>,
    pub commands: Vec<String>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        ScriptedRemote::default()
    }

    pub fn then_stdout(self, exit_status: i32, stdout: &str) -> Self {
        self.then_result(RemoteResult::new(exit_status, stdout, ""))
    }

    pub fn then_result(mut self, result: RemoteResult) -> Self {
        self.responses.push_back(Ok(result));
        self
    }

    pub fn then_error(mut self, error: impl Into<anyhow::Error>) -> Self {
        self.responses.push_back(Err(error.into()));
        self
    }

    /// Result which is returned once the script is exhausted
    pub fn otherwise(mut self, result: RemoteResult) -> Self {
        self.fallback = Some(result);
        self
    }
}

impl Remote for ScriptedRemote {
    fn execute(&mut self, command: &str) -> anyhow::Result<RemoteResult> {
        self.commands.push(command.to_owned());
        match self.responses.pop_front() {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("No scripted result left for [{}]", command)),
        }
    }
}

/// Compute API whose servers move through scripted states
///
/// Every lookup of a server returns its next state; the last state is
/// kept once all others were returned.
#[derive(Default)]
pub struct FakeCompute {
    states: RefCell<HashMap<String, VecDeque<Server>>>,
    pub lookups: Cell<usize>,
}

impl FakeCompute {
    pub fn new() -> Self {
        FakeCompute::default()
    }

    /// Adds a server which is on the given hosts in subsequent lookups.
    pub fn with_server(self, id: &str, states: &[(&str, &str)]) -> Self {
        let servers = states
            .iter()
            .map(|(host, status)| Server {
                id: id.to_owned(),
                name: format!("server-{}", id),
                host: String::from(*host),
                status: String::from(*status),
            })
            .collect();
        self.states.borrow_mut().insert(id.to_owned(), servers);
        self
    }
}

impl ComputeApi for FakeCompute {
    fn server(&self, id: &str) -> anyhow::Result<Server> {
        self.lookups.set(self.lookups.get() + 1);
        let mut states = self.states.borrow_mut();
        let servers = states
            .get_mut(id)
            .ok_or_else(|| anyhow!("Server [{}] not found", id))?;
        let server = if servers.len() > 1 {
            servers.pop_front()
        } else {
            servers.front().cloned()
        };
        server.ok_or_else(|| anyhow!("Server [{}] has no state", id))
    }
}
