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

//! The two-phase commit protocol over the participants of a coordinated transaction.
//!
//! Each phase sends its command to every eligible participant, waits once for all of their
//! connections, and then consumes every result. A phase always consumes the result of every
//! command it sent before returning the first error it observed.
//!
//! Atomicity is enforced by the caller: if [`prepare`](CoordinatedTransaction::prepare) fails,
//! the caller must [`abort`](CoordinatedTransaction::abort). The protocol never commits a
//! participant whose prepare did not succeed.

use crate::connection::RemoteConnection;
use crate::coordinated::{CoordinatedTransaction, CoordinatedTransactionState};
use crate::error::{FirstError, InvalidStateError, RemoteTransactionError};
use crate::recovery::{NodeDirectory, RecoveryLog};
use crate::transaction::RemoteTransactionState;

impl<C> CoordinatedTransaction<C>
where
    C: RemoteConnection,
{
    /// Prepares every participant which performed a write.
    ///
    /// Participants without writes are not prepared; they are committed with a plain COMMIT.
    /// Failed participants are skipped.
    pub fn prepare(
        &mut self,
        nodes: &dyn NodeDirectory,
        log: &mut dyn RecoveryLog,
    ) -> Result<(), RemoteTransactionError> {
        if self.state != CoordinatedTransactionState::Started {
            return Err(RemoteTransactionError::InvalidState(
                InvalidStateError::with_message(format!(
                    "cannot prepare a coordinated transaction which is {:?}",
                    self.state
                )),
            ));
        }

        debug!(
            "preparing distributed transaction {}",
            self.context.distributed_transaction_id().transaction_number()
        );

        let transaction_number = self
            .context
            .distributed_transaction_id()
            .transaction_number();
        let mut errors = FirstError::default();
        let mut dispatched = Vec::new();

        for (id, participant) in self.participants.iter_mut() {
            let transaction = participant.transaction();
            if !transaction.state().is_in_progress() || transaction.is_failed() {
                continue;
            }

            if !participant.connection().modified_placement() {
                debug!(
                    "not preparing read-only transaction on {}",
                    participant.describe()
                );
                continue;
            }

            errors.record(participant.start_prepare(
                &self.allocator,
                transaction_number,
                self.outer_transaction_id,
                nodes,
                log,
            ));

            if participant.transaction().state() == RemoteTransactionState::Preparing {
                dispatched.push(id);
            }
        }

        if let Err(err) = self.participants.wait_for(&dispatched, true) {
            errors.record(Err(err));
            return errors.into_result();
        }

        for id in dispatched {
            let participant = self.participants.get_registered_mut(id)?;
            errors.record(participant.finish_prepare());
        }

        errors.into_result()?;
        self.state = CoordinatedTransactionState::Prepared;
        Ok(())
    }

    /// Commits every participant which has begun a transaction.
    ///
    /// Prepared participants receive COMMIT PREPARED, failed ones are rolled back. Failures are
    /// logged; once commit commands are sent, their outcome can no longer be reported as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if two-phase commit is in use and the transaction was not prepared.
    pub fn commit(&mut self) -> Result<(), RemoteTransactionError> {
        let allowed = match self.state {
            CoordinatedTransactionState::Prepared => true,
            CoordinatedTransactionState::Started => !self.two_phase_commit,
            _ => false,
        };
        if !allowed {
            return Err(RemoteTransactionError::InvalidState(
                InvalidStateError::with_message(format!(
                    "cannot commit a coordinated transaction which is {:?}",
                    self.state
                )),
            ));
        }

        let mut errors = FirstError::default();
        let mut dispatched = Vec::new();

        for (id, participant) in self.participants.iter_mut() {
            let state = participant.transaction().state();
            if !state.is_in_progress()
                || state.is_committing()
                || state.is_aborting()
                || state.is_terminal()
            {
                continue;
            }

            errors.record(participant.start_commit());
            dispatched.push(id);
        }

        if let Err(err) = self.participants.wait_for(&dispatched, false) {
            errors.record(Err(err));
            return errors.into_result();
        }

        for id in dispatched {
            let participant = self.participants.get_registered_mut(id)?;
            let state = participant.transaction().state();
            if !state.is_committing() && !state.is_aborting() {
                continue;
            }

            errors.record(participant.finish_commit());
        }

        self.state = CoordinatedTransactionState::Committed;
        errors.into_result()
    }

    /// Rolls back every participant which has begun a transaction and has not ended it.
    pub fn abort(&mut self) -> Result<(), RemoteTransactionError> {
        if self.state == CoordinatedTransactionState::Committed {
            return Err(RemoteTransactionError::InvalidState(
                InvalidStateError::with_message(
                    "cannot abort a coordinated transaction which committed".into(),
                ),
            ));
        }

        let mut errors = FirstError::default();
        let mut dispatched = Vec::new();

        for (id, participant) in self.participants.iter_mut() {
            let state = participant.transaction().state();
            if !state.is_in_progress() || state.is_aborting() || state.is_terminal() {
                continue;
            }

            errors.record(participant.start_abort());
            dispatched.push(id);
        }

        if let Err(err) = self.participants.wait_for(&dispatched, false) {
            errors.record(Err(err));
            return errors.into_result();
        }

        for id in dispatched {
            let participant = self.participants.get_registered_mut(id)?;
            if !participant.transaction().state().is_aborting() {
                continue;
            }

            errors.record(participant.finish_abort());
        }

        self.state = CoordinatedTransactionState::Aborted;
        errors.into_result()
    }

    /// Runs the work which must precede the commit decision: the prepare phase if two-phase
    /// commit is in use, then the health check.
    pub fn pre_commit(
        &mut self,
        nodes: &dyn NodeDirectory,
        log: &mut dyn RecoveryLog,
    ) -> Result<(), RemoteTransactionError> {
        if self.two_phase_commit {
            self.prepare(nodes, log)?;
        }

        self.check_health()
    }
}
