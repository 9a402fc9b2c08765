// Copyright 2023 Bitwise IO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A scripted connection for exercising the coordination logic without remote nodes.

use std::collections::VecDeque;

use crate::connection::{RemoteConnection, RemoteResult, TransactionStatus};
use crate::error::InternalError;

#[derive(Clone, Debug)]
pub enum MockResponse {
    Ok,
    Error(String),
    /// The result could not be read.
    Lost,
}

/// Each sent command takes the next scripted batch of responses as its results. A command
/// without a scripted batch has no results.
#[derive(Debug)]
pub struct MockConnection {
    host: String,
    port: u16,
    sent: Vec<String>,
    scripted: VecDeque<Vec<MockResponse>>,
    pending: VecDeque<MockResponse>,
    fail_sends: bool,
    busy: bool,
    status: TransactionStatus,
    modified: bool,
    unclaimed: bool,
    shut_down: bool,
    cancellations: usize,
    waits: usize,
}

impl MockConnection {
    pub fn new(host: &str, port: u16) -> Self {
        MockConnection {
            host: host.to_string(),
            port,
            sent: Vec::new(),
            scripted: VecDeque::new(),
            pending: VecDeque::new(),
            fail_sends: false,
            busy: false,
            status: TransactionStatus::Idle,
            modified: false,
            unclaimed: false,
            shut_down: false,
            cancellations: 0,
            waits: 0,
        }
    }

    pub fn respond(mut self, responses: Vec<MockResponse>) -> Self {
        self.push_responses(responses);
        self
    }

    pub fn fail_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn modified(mut self) -> Self {
        self.modified = true;
        self
    }

    pub fn push_responses(&mut self, responses: Vec<MockResponse>) {
        self.scripted.push_back(responses);
    }

    /// Adds results of a command which is already in flight.
    pub fn push_pending(&mut self, responses: Vec<MockResponse>) {
        self.pending.extend(responses);
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn set_status(&mut self, status: TransactionStatus) {
        self.status = status;
    }

    pub fn set_fail_sends(&mut self, fail_sends: bool) {
        self.fail_sends = fail_sends;
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn is_unclaimed(&self) -> bool {
        self.unclaimed
    }

    pub fn cancellations(&self) -> usize {
        self.cancellations
    }

    pub fn waits(&self) -> usize {
        self.waits
    }
}

impl RemoteConnection for MockConnection {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn send_command(&mut self, command: &str) -> Result<(), InternalError> {
        if self.fail_sends {
            return Err(InternalError::with_message(format!(
                "could not send command to {}:{}",
                self.host, self.port
            )));
        }

        self.sent.push(command.to_string());
        self.pending = self.scripted.pop_front().unwrap_or_default().into();
        Ok(())
    }

    fn next_result(&mut self) -> Result<Option<RemoteResult>, InternalError> {
        match self.pending.pop_front() {
            Some(MockResponse::Ok) => Ok(Some(RemoteResult::CommandOk)),
            Some(MockResponse::Error(message)) => Ok(Some(RemoteResult::Error(message))),
            Some(MockResponse::Lost) => Err(InternalError::with_message::<String>(
                "server closed the connection unexpectedly".into(),
            )),
            None => Ok(None),
        }
    }

    fn is_busy(&mut self) -> bool {
        self.busy
    }

    fn send_cancellation(&mut self) -> Result<(), InternalError> {
        self.cancellations += 1;
        if self.busy {
            self.busy = false;
            self.pending.push_back(MockResponse::Error(
                "canceling statement due to user request".into(),
            ));
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
        self.pending.clear();
    }

    fn unclaim(&mut self) {
        self.unclaimed = true;
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.status
    }

    fn modified_placement(&self) -> bool {
        self.modified
    }

    fn wait_for_all(
        connections: &mut [&mut Self],
        _raise_interrupts: bool,
    ) -> Result<(), InternalError> {
        for connection in connections.iter_mut() {
            connection.waits += 1;
        }
        Ok(())
    }
}
