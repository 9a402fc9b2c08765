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

use std::sync::Arc;

use crate::connection::{commands, RemoteConnection};
use crate::error::{FirstError, InvalidStateError, RemoteTransactionError};
use crate::identifier::IdentifierAllocator;
use crate::transaction::{Participant, RemoteTransactionState};

use super::{CoordinatedTransactionSet, ParticipantId, TransactionContext};

/// The outcome of the coordinated transaction as a whole.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CoordinatedTransactionState {
    Started,
    Prepared,
    Committed,
    Aborted,
}

/// A local transaction together with the remote transactions it coordinates.
///
/// Dropping it (or calling [`end`](CoordinatedTransaction::end)) discards the state of every
/// remote transaction; the connections themselves are handed back by `end` and `release`.
#[derive(Debug)]
pub struct CoordinatedTransaction<C> {
    pub(crate) allocator: Arc<IdentifierAllocator>,
    pub(crate) context: TransactionContext,
    pub(crate) participants: CoordinatedTransactionSet<C>,
    pub(crate) state: CoordinatedTransactionState,
    pub(crate) two_phase_commit: bool,
    pub(crate) outer_transaction_id: u64,
}

impl<C> CoordinatedTransaction<C> {
    pub fn new(allocator: Arc<IdentifierAllocator>, context: TransactionContext) -> Self {
        CoordinatedTransaction {
            allocator,
            context,
            participants: CoordinatedTransactionSet::new(),
            state: CoordinatedTransactionState::Started,
            two_phase_commit: false,
            outer_transaction_id: 0,
        }
    }

    pub fn state(&self) -> CoordinatedTransactionState {
        self.state
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    /// Allows the embedding system to update the open sub-transactions and pending settings
    /// which are replayed onto newly begun remote transactions.
    pub fn context_mut(&mut self) -> &mut TransactionContext {
        &mut self.context
    }

    pub fn participants(&self) -> &CoordinatedTransactionSet<C> {
        &self.participants
    }

    pub fn is_two_phase_commit(&self) -> bool {
        self.two_phase_commit
    }

    /// Requires the participants to be prepared before they are committed.
    pub fn use_two_phase_commit(&mut self) {
        self.two_phase_commit = true;
    }

    /// Starts a management transaction within the local transaction `outer_transaction_id`.
    ///
    /// Prepared transactions are recorded against the outer transaction, and two-phase commit
    /// is always used.
    pub fn start_management_transaction(&mut self, outer_transaction_id: u64) {
        self.outer_transaction_id = outer_transaction_id;
        self.use_two_phase_commit();
    }

    pub fn outer_transaction_id(&self) -> u64 {
        self.outer_transaction_id
    }

    pub fn register(&mut self, connection: C) -> ParticipantId {
        self.participants.register(connection)
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant<C>> {
        self.participants.get(id)
    }

    pub fn participant_mut(&mut self, id: ParticipantId) -> Option<&mut Participant<C>> {
        self.participants.get_mut(id)
    }

    /// Removes a participant, for example because its connection is returned to a pool.
    pub fn release(&mut self, id: ParticipantId) -> Option<C> {
        self.participants.release(id)
    }

    /// Ends the coordinated transaction, returning every connection in registration order.
    pub fn end(mut self) -> Vec<C> {
        self.participants.drain()
    }
}

impl<C> CoordinatedTransaction<C>
where
    C: RemoteConnection,
{
    /// The command which begins a remote transaction and assigns the distributed transaction
    /// id, without replaying sub-transactions.
    pub fn begin_and_assign_command(&self) -> String {
        let mut command = commands::begin_transaction(self.context.begin_options());
        command.push_str(&commands::assign_distributed_transaction_id(
            self.context.distributed_transaction_id(),
        ));
        command
    }

    /// Begins the remote transaction of every given participant which has not begun one.
    ///
    /// All BEGIN commands are sent before the results are awaited.
    pub fn begin_if_necessary(
        &mut self,
        ids: &[ParticipantId],
    ) -> Result<(), RemoteTransactionError> {
        let mut errors = FirstError::default();
        let mut dispatched = Vec::new();

        for id in ids {
            let participant = self.participants.get_registered_mut(*id)?;
            if participant.transaction().state() != RemoteTransactionState::NotStarted {
                continue;
            }

            errors.record(participant.start_begin(&self.context));
            dispatched.push(*id);
        }

        if let Err(err) = self.participants.wait_for(&dispatched, true) {
            errors.record(Err(err));
            return errors.into_result();
        }

        for id in dispatched {
            let participant = self.participants.get_registered_mut(id)?;
            let transaction = participant.transaction();
            if transaction.state() != RemoteTransactionState::Starting || transaction.is_failed() {
                continue;
            }

            errors.record(participant.finish_begin());
        }

        errors.into_result()
    }

    /// Begins the remote transaction of every given participant.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the participants has already begun a transaction.
    pub fn begin(&mut self, ids: &[ParticipantId]) -> Result<(), RemoteTransactionError> {
        for id in ids {
            let state = self
                .participants
                .get_registered_mut(*id)?
                .transaction()
                .state();
            if state != RemoteTransactionState::NotStarted {
                return Err(RemoteTransactionError::InvalidState(
                    InvalidStateError::with_message(format!(
                        "{} has already begun a transaction, it is {}",
                        id, state
                    )),
                ));
            }
        }

        self.begin_if_necessary(ids)
    }

    pub fn begin_blocking(&mut self, id: ParticipantId) -> Result<(), RemoteTransactionError> {
        let participant = self.participants.get_registered_mut(id)?;
        participant.start_begin(&self.context)?;
        participant.finish_begin()
    }

    pub fn commit_blocking(&mut self, id: ParticipantId) -> Result<(), RemoteTransactionError> {
        let participant = self.participants.get_registered_mut(id)?;
        participant.start_commit()?;
        participant.finish_commit()
    }

    pub fn abort_blocking(&mut self, id: ParticipantId) -> Result<(), RemoteTransactionError> {
        let participant = self.participants.get_registered_mut(id)?;
        participant.start_abort()?;
        if participant.transaction().state().is_aborting() {
            participant.finish_abort()?;
        }
        Ok(())
    }

    /// Flags a participant whose failure must fail the coordinated transaction.
    pub fn mark_critical(&mut self, id: ParticipantId) -> Result<(), RemoteTransactionError> {
        self.participants.get_registered_mut(id)?.mark_critical();
        Ok(())
    }

    /// Fails if a critical participant failed or has a broken connection; must be called
    /// before deciding to commit.
    pub fn check_health(&mut self) -> Result<(), RemoteTransactionError> {
        self.participants.check_health()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BeginOptions;
    use crate::coordinated::{DistributedTransactionId, SubXactContext};
    use crate::testing::{MockConnection, MockResponse};

    use super::*;

    fn transaction() -> CoordinatedTransaction<MockConnection> {
        CoordinatedTransaction::new(
            Arc::new(IdentifierAllocator::new(0, 100)),
            TransactionContext::new(
                DistributedTransactionId::new(0, 8, "2023-05-01 10:00:00+00"),
                BeginOptions::default(),
            ),
        )
    }

    #[test]
    fn begin_if_necessary_skips_started_participants() {
        let mut transaction = transaction();
        let first = transaction
            .register(MockConnection::new("w1", 5432).respond(vec![MockResponse::Ok]));
        transaction.begin_blocking(first).unwrap();

        let second = transaction
            .register(MockConnection::new("w2", 5432).respond(vec![MockResponse::Ok]));
        transaction.begin_if_necessary(&[first, second]).unwrap();

        for id in [first, second] {
            let participant = transaction.participant(id).unwrap();
            assert_eq!(participant.connection().sent().len(), 1);
            assert_eq!(
                participant.transaction().state(),
                RemoteTransactionState::Started
            );
        }
        assert_eq!(
            transaction.participant(second).unwrap().connection().waits(),
            1
        );
        assert!(transaction.begin(&[second]).is_err());
    }

    #[test]
    fn begin_replays_context() {
        let mut transaction = transaction();
        transaction
            .context_mut()
            .set_sub_transactions(vec![SubXactContext::new(2, None)]);
        let id = transaction
            .register(MockConnection::new("w1", 5432).respond(vec![MockResponse::Ok]));

        transaction.begin(&[id]).unwrap();

        let participant = transaction.participant(id).unwrap();
        assert!(participant.connection().sent()[0].contains("SAVEPOINT savepoint_2;"));
        assert_eq!(participant.transaction().last_successful_sub_xact(), 2);
    }

    #[test]
    fn failed_begin_is_not_finished() {
        let mut transaction = transaction();
        let id = transaction.register(MockConnection::new("w1", 5432).fail_sends());

        transaction.begin(&[id]).unwrap();

        let participant = transaction.participant(id).unwrap();
        assert!(participant.transaction().is_failed());
        assert_eq!(
            participant.transaction().state(),
            RemoteTransactionState::Starting
        );
    }

    #[test]
    fn critical_begin_failure_is_returned() {
        let mut transaction = transaction();
        let ok = transaction
            .register(MockConnection::new("w1", 5432).respond(vec![MockResponse::Ok]));
        let bad = transaction.register(
            MockConnection::new("w2", 5432).respond(vec![MockResponse::Error("no".into())]),
        );
        transaction.mark_critical(bad).unwrap();

        assert!(transaction.begin(&[ok, bad]).is_err());
        assert_eq!(
            transaction.participant(ok).unwrap().transaction().state(),
            RemoteTransactionState::Started
        );
    }

    #[test]
    fn begin_and_assign_command() {
        assert_eq!(
            transaction().begin_and_assign_command(),
            concat!(
                "BEGIN TRANSACTION ISOLATION LEVEL READ COMMITTED;",
                "SELECT assign_distributed_transaction_id(0, 8, '2023-05-01 10:00:00+00');"
            )
        );
    }

    #[test]
    fn management_transaction_forces_two_phase_commit() {
        let mut transaction = transaction();
        assert!(!transaction.is_two_phase_commit());

        transaction.start_management_transaction(55);
        assert!(transaction.is_two_phase_commit());
        assert_eq!(transaction.outer_transaction_id(), 55);
    }

    #[test]
    fn end_returns_connections_in_order() {
        let mut transaction = transaction();
        transaction.register(MockConnection::new("w2", 5432));
        let released = transaction.register(MockConnection::new("w9", 5432));
        transaction.register(MockConnection::new("w1", 5432));

        assert_eq!(transaction.release(released).unwrap().host(), "w9");

        let hosts: Vec<String> = transaction
            .end()
            .iter()
            .map(|connection| connection.host().to_string())
            .collect();
        assert_eq!(hosts, vec!["w2", "w1"]);
    }
}
