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

//! Replicates the savepoints of the local transaction onto every participant.
//!
//! Rolling back to a savepoint is the only way a failed participant can recover: if the
//! participant's last successful savepoint is still reachable from the rollback target, the
//! rollback is attempted and on success the failure is cleared.

use crate::connection::RemoteConnection;
use crate::coordinated::{CoordinatedTransaction, SubTransactionId};
use crate::error::{FirstError, RemoteTransactionError};

impl<C> CoordinatedTransaction<C>
where
    C: RemoteConnection,
{
    /// Sends SAVEPOINT to every participant which has not failed.
    pub fn savepoint_begin(
        &mut self,
        sub_id: SubTransactionId,
    ) -> Result<(), RemoteTransactionError> {
        let mut errors = FirstError::default();
        let mut dispatched = Vec::new();

        for (id, participant) in self.participants.iter_mut() {
            let transaction = participant.transaction();
            if !transaction.state().is_in_progress() || transaction.is_failed() {
                continue;
            }

            let started = participant.start_savepoint_begin(sub_id);
            if started.is_ok() {
                dispatched.push(id);
            }
            errors.record(started);
        }

        if let Err(err) = self.participants.wait_for(&dispatched, true) {
            errors.record(Err(err));
            return errors.into_result();
        }

        for id in dispatched {
            let participant = self.participants.get_registered_mut(id)?;
            if participant.transaction().is_failed() {
                continue;
            }

            errors.record(participant.finish_savepoint_begin(sub_id));
        }

        errors.into_result()
    }

    /// Sends RELEASE SAVEPOINT to every participant which has not failed.
    pub fn savepoint_release(
        &mut self,
        sub_id: SubTransactionId,
    ) -> Result<(), RemoteTransactionError> {
        let mut errors = FirstError::default();
        let mut dispatched = Vec::new();

        for (id, participant) in self.participants.iter_mut() {
            let transaction = participant.transaction();
            if !transaction.state().is_in_progress() || transaction.is_failed() {
                continue;
            }

            let started = participant.start_savepoint_release(sub_id);
            if started.is_ok() {
                dispatched.push(id);
            }
            errors.record(started);
        }

        if let Err(err) = self.participants.wait_for(&dispatched, true) {
            errors.record(Err(err));
            return errors.into_result();
        }

        for id in dispatched {
            let participant = self.participants.get_registered_mut(id)?;
            if participant.transaction().is_failed() {
                continue;
            }

            errors.record(participant.finish_savepoint_release());
        }

        errors.into_result()
    }

    /// Sends ROLLBACK TO SAVEPOINT to every participant, after cancelling any command still in
    /// flight.
    ///
    /// A failed participant is rolled back only if its last successful savepoint is at or below
    /// `sub_id`; if that succeeds its failure is cleared. Other failed participants are left
    /// untouched. Participants which are not failed afterwards are unclaimed so the local
    /// transaction can use them again.
    pub fn savepoint_rollback(
        &mut self,
        sub_id: SubTransactionId,
    ) -> Result<(), RemoteTransactionError> {
        let mut errors = FirstError::default();
        let mut dispatched = Vec::new();

        for (id, participant) in self.participants.iter_mut() {
            let state = participant.transaction().state();
            if !state.is_in_progress() || state.is_terminal() {
                continue;
            }

            if let Err(err) = participant.connection_mut().send_cancellation() {
                debug!(
                    "could not cancel command on {}: {}",
                    participant.describe(),
                    err
                );
            }

            // the cancelled command reports an error which is expected here
            errors.record(
                participant
                    .clear_results_discard_warnings(false)
                    .map(|_| ()),
            );

            if participant.transaction().is_failed() {
                if participant.transaction().last_successful_sub_xact() > sub_id {
                    debug!(
                        "not rolling back {} to savepoint {}, it failed before",
                        participant.describe(),
                        sub_id
                    );
                    continue;
                }

                participant.transaction_mut().set_recovering();
                participant.forget_results();
            }

            let started = participant.start_savepoint_rollback(sub_id);
            if started.is_ok() {
                dispatched.push(id);
            }
            errors.record(started);
        }

        if let Err(err) = self.participants.wait_for(&dispatched, false) {
            errors.record(Err(err));
            return errors.into_result();
        }

        for id in dispatched {
            let participant = self.participants.get_registered_mut(id)?;
            let transaction = participant.transaction();
            if transaction.is_failed() && !transaction.is_recovering() {
                continue;
            }

            errors.record(participant.finish_savepoint_rollback());

            if !participant.transaction().is_failed() {
                participant.connection_mut().unclaim();
            }
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::config::BeginOptions;
    use crate::coordinated::{DistributedTransactionId, ParticipantId, TransactionContext};
    use crate::identifier::IdentifierAllocator;
    use crate::recovery::TransactionRecord;
    use crate::testing::{MockConnection, MockResponse};
    use crate::coordinated::CoordinatedTransactionState;
    use crate::transaction::RemoteTransactionState;

    use super::*;

    fn transaction() -> CoordinatedTransaction<MockConnection> {
        CoordinatedTransaction::new(
            Arc::new(IdentifierAllocator::new(0, 1)),
            TransactionContext::new(
                DistributedTransactionId::new(0, 3, "2023-05-01 10:00:00+00"),
                BeginOptions::default(),
            ),
        )
    }

    /// Begins a participant per host and establishes savepoints 2 and 3 on them.
    fn with_savepoints(
        transaction: &mut CoordinatedTransaction<MockConnection>,
        hosts: &[&str],
    ) -> Vec<ParticipantId> {
        let ids: Vec<ParticipantId> = hosts
            .iter()
            .map(|host| {
                transaction.register(
                    MockConnection::new(host, 5432)
                        .respond(vec![MockResponse::Ok])
                        .respond(vec![MockResponse::Ok])
                        .respond(vec![MockResponse::Ok]),
                )
            })
            .collect();
        transaction.begin(&ids).unwrap();
        transaction.savepoint_begin(2).unwrap();
        transaction.savepoint_begin(3).unwrap();
        ids
    }

    /// Fails a participant the way a statement error does, leaving the error unread.
    fn fail_statement(transaction: &mut CoordinatedTransaction<MockConnection>, id: ParticipantId) {
        let participant = transaction.participant_mut(id).unwrap();
        participant
            .connection_mut()
            .push_pending(vec![MockResponse::Error("division by zero".into())]);
        participant.mark_failed(false).unwrap();
    }

    #[test]
    fn savepoint_begin_advances_last_successful() {
        let mut transaction = transaction();
        let id = with_savepoints(&mut transaction, &["w1"])[0];

        let participant = transaction.participant(id).unwrap();
        assert_eq!(participant.transaction().last_successful_sub_xact(), 3);
        assert_eq!(
            participant.connection().sent()[1..],
            ["SAVEPOINT savepoint_2", "SAVEPOINT savepoint_3"]
        );
    }

    #[test]
    fn failed_savepoint_does_not_advance() {
        let mut transaction = transaction();
        let id = transaction.register(
            MockConnection::new("w1", 5432)
                .respond(vec![MockResponse::Ok])
                .respond(vec![MockResponse::Error("out of memory".into())]),
        );
        transaction.begin(&[id]).unwrap();
        transaction.savepoint_begin(2).unwrap();

        let participant = transaction.participant(id).unwrap();
        assert!(participant.transaction().is_failed());
        assert_eq!(participant.transaction().last_successful_sub_xact(), 1);

        // failed participants no longer take part
        transaction.savepoint_release(2).unwrap();
        assert_eq!(
            transaction.participant(id).unwrap().connection().sent().len(),
            2
        );
    }

    #[test]
    fn critical_savepoint_failure_is_returned() {
        let mut transaction = transaction();
        let id = transaction.register(
            MockConnection::new("w1", 5432)
                .respond(vec![MockResponse::Ok])
                .respond(vec![MockResponse::Error("out of memory".into())]),
        );
        transaction.begin(&[id]).unwrap();
        transaction.mark_critical(id).unwrap();

        assert!(transaction.savepoint_begin(2).is_err());
    }

    #[test]
    fn savepoint_on_prepared_participant_is_refused() {
        let mut transaction = transaction();
        transaction.use_two_phase_commit();
        let id = transaction.register(
            MockConnection::new("w1", 5432)
                .modified()
                .respond(vec![MockResponse::Ok])
                .respond(vec![MockResponse::Ok])
                .respond(vec![MockResponse::Ok]),
        );
        transaction.begin(&[id]).unwrap();
        let nodes: HashMap<(String, u16), u32> = HashMap::new();
        let mut log: Vec<TransactionRecord> = Vec::new();
        transaction.prepare(&nodes, &mut log).unwrap();

        assert!(matches!(
            transaction.savepoint_begin(5),
            Err(RemoteTransactionError::InvalidState(_))
        ));
        assert!(matches!(
            transaction.savepoint_release(5),
            Err(RemoteTransactionError::InvalidState(_))
        ));

        let participant = transaction.participant(id).unwrap();
        assert!(!participant.transaction().is_failed());
        assert_eq!(
            participant.transaction().state(),
            RemoteTransactionState::Prepared
        );

        transaction.commit().unwrap();

        let participant = transaction.participant(id).unwrap();
        assert_eq!(
            participant.connection().sent().last().unwrap(),
            "COMMIT PREPARED 'rxact_0_1_3_0'"
        );
        assert_eq!(
            participant.transaction().state(),
            RemoteTransactionState::Committed
        );
        assert_eq!(transaction.state(), CoordinatedTransactionState::Committed);
    }

    #[test]
    fn release_is_broadcast() {
        let mut transaction = transaction();
        let ids = with_savepoints(&mut transaction, &["w1", "w2"]);
        for id in ids.iter().copied() {
            transaction
                .participant_mut(id)
                .unwrap()
                .connection_mut()
                .push_responses(vec![MockResponse::Ok]);
        }

        transaction.savepoint_release(3).unwrap();

        for id in ids {
            let participant = transaction.participant(id).unwrap();
            assert_eq!(
                participant.connection().sent().last().unwrap(),
                "RELEASE SAVEPOINT savepoint_3"
            );
            assert!(!participant.transaction().is_failed());
        }
    }

    #[test]
    fn rollback_recovers_failure_after_the_target() {
        let mut transaction = transaction();
        let id = with_savepoints(&mut transaction, &["w1"])[0];
        fail_statement(&mut transaction, id);
        transaction
            .participant_mut(id)
            .unwrap()
            .connection_mut()
            .push_responses(vec![MockResponse::Ok]);

        transaction.savepoint_rollback(3).unwrap();

        let participant = transaction.participant(id).unwrap();
        assert!(!participant.transaction().is_failed());
        assert!(!participant.transaction().is_recovering());
        assert_eq!(
            participant.transaction().state(),
            RemoteTransactionState::Started
        );
        assert_eq!(
            participant.connection().sent().last().unwrap(),
            "ROLLBACK TO SAVEPOINT savepoint_3"
        );
        assert!(participant.connection().is_unclaimed());
    }

    #[test]
    fn rollback_skips_failure_before_the_target() {
        let mut transaction = transaction();
        let id = with_savepoints(&mut transaction, &["w1"])[0];
        fail_statement(&mut transaction, id);

        transaction.savepoint_rollback(2).unwrap();

        let participant = transaction.participant(id).unwrap();
        assert!(participant.transaction().is_failed());
        assert!(!participant.transaction().is_recovering());
        assert_eq!(
            participant.transaction().state(),
            RemoteTransactionState::Started
        );
        assert_eq!(
            participant.connection().sent().last().unwrap(),
            "SAVEPOINT savepoint_3"
        );
        assert!(!participant.connection().is_unclaimed());
    }

    #[test]
    fn rollback_cancels_command_in_flight() {
        let mut transaction = transaction();
        let ids = with_savepoints(&mut transaction, &["w1", "w2"]);
        let (id, healthy) = (ids[0], ids[1]);
        {
            let connection = transaction.participant_mut(id).unwrap().connection_mut();
            connection.set_busy(true);
            connection.push_responses(vec![MockResponse::Ok]);
        }
        transaction
            .participant_mut(healthy)
            .unwrap()
            .connection_mut()
            .push_responses(vec![MockResponse::Ok]);

        transaction.savepoint_rollback(3).unwrap();

        for id in [id, healthy] {
            let participant = transaction.participant(id).unwrap();
            assert_eq!(participant.connection().cancellations(), 1);
            assert!(!participant.transaction().is_failed());
            assert!(participant.connection().is_unclaimed());
            assert_eq!(
                participant.connection().sent().last().unwrap(),
                "ROLLBACK TO SAVEPOINT savepoint_3"
            );
        }
    }

    #[test]
    fn failed_rollback_stays_failed() {
        let mut transaction = transaction();
        let id = with_savepoints(&mut transaction, &["w1"])[0];
        fail_statement(&mut transaction, id);
        transaction
            .participant_mut(id)
            .unwrap()
            .connection_mut()
            .push_responses(vec![MockResponse::Error("no such savepoint".into())]);

        transaction.savepoint_rollback(3).unwrap();

        let participant = transaction.participant(id).unwrap();
        assert!(participant.transaction().is_failed());
        assert!(!participant.transaction().is_recovering());
        assert!(!participant.connection().is_unclaimed());
    }
}
