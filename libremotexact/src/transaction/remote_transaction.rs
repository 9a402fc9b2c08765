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

use crate::coordinated::{SubTransactionId, INVALID_SUB_TRANSACTION_ID};
use crate::error::InvalidStateError;
use crate::identifier::PreparedTransactionName;

use super::RemoteTransactionState;

/// The state of the transaction open on one remote connection.
///
/// A zeroed (default) value is a transaction which has not been started.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteTransaction {
    state: RemoteTransactionState,
    failed: bool,
    critical: bool,
    recovering: bool,
    begin_sent: bool,
    prepared_name: Option<PreparedTransactionName>,
    last_successful_sub_xact: SubTransactionId,
    last_queued_sub_xact: SubTransactionId,
}

impl Default for RemoteTransaction {
    fn default() -> Self {
        RemoteTransaction {
            state: RemoteTransactionState::NotStarted,
            failed: false,
            critical: false,
            recovering: false,
            begin_sent: false,
            prepared_name: None,
            last_successful_sub_xact: INVALID_SUB_TRANSACTION_ID,
            last_queued_sub_xact: INVALID_SUB_TRANSACTION_ID,
        }
    }
}

impl RemoteTransaction {
    pub fn state(&self) -> RemoteTransactionState {
        self.state
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Returns true if a failure of this transaction must fail the coordinated transaction.
    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// Returns true while a ROLLBACK TO SAVEPOINT is attempting to clear a failure.
    pub fn is_recovering(&self) -> bool {
        self.recovering
    }

    pub fn begin_sent(&self) -> bool {
        self.begin_sent
    }

    pub fn prepared_name(&self) -> Option<&PreparedTransactionName> {
        self.prepared_name.as_ref()
    }

    pub fn last_successful_sub_xact(&self) -> SubTransactionId {
        self.last_successful_sub_xact
    }

    pub fn last_queued_sub_xact(&self) -> SubTransactionId {
        self.last_queued_sub_xact
    }

    pub(crate) fn set_state(
        &mut self,
        next: RemoteTransactionState,
    ) -> Result<(), InvalidStateError> {
        self.state = self.state.transition_to(next)?;
        Ok(())
    }

    /// Moves a transaction whose savepoint was rolled back to `Started`, so further commands
    /// can be issued. This is the only move outside the transition table.
    pub(crate) fn reset_to_started(&mut self) -> Result<(), InvalidStateError> {
        if !self.state.is_in_progress() || self.state.is_terminal() {
            return Err(InvalidStateError::with_message(format!(
                "cannot roll back to a savepoint of a remote transaction in state {}",
                self.state
            )));
        }

        self.state = RemoteTransactionState::Started;
        Ok(())
    }

    pub(crate) fn set_failed(&mut self) {
        self.failed = true;
    }

    pub(crate) fn set_critical(&mut self) {
        self.critical = true;
    }

    pub(crate) fn set_recovering(&mut self) {
        self.recovering = true;
    }

    /// Clears a failure after a successful rollback to a savepoint.
    pub(crate) fn recover(&mut self) {
        self.failed = false;
        self.recovering = false;
    }

    pub(crate) fn abandon_recovery(&mut self) {
        self.recovering = false;
    }

    pub(crate) fn set_begin_sent(&mut self) {
        self.begin_sent = true;
    }

    pub(crate) fn set_prepared_name(&mut self, name: PreparedTransactionName) {
        self.prepared_name = Some(name);
    }

    pub(crate) fn set_last_successful_sub_xact(&mut self, sub_id: SubTransactionId) {
        self.last_successful_sub_xact = sub_id;
    }

    pub(crate) fn set_last_queued_sub_xact(&mut self, sub_id: SubTransactionId) {
        self.last_queued_sub_xact = sub_id;
    }
}
