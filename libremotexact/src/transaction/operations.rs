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

//! The transaction control operations of a single participant.
//!
//! Each operation is split into a non-blocking `start_*` half, which sends the command, and a
//! `finish_*` half, which blocks to consume its result. Coordinated phases call every start,
//! wait once for all connections, and then call every finish.

use crate::connection::{commands, RemoteConnection};
use crate::coordinated::{SubTransactionId, TransactionContext, TOP_SUB_TRANSACTION_ID};
use crate::error::{
    FailureKind, InternalError, InvalidStateError, RemoteFailure, RemoteTransactionError,
    Severity,
};
use crate::identifier::IdentifierAllocator;
use crate::recovery::{NodeDirectory, RecoveryLog, TransactionRecord};

use super::{Participant, RemoteTransactionState};

impl<C> Participant<C>
where
    C: RemoteConnection,
{
    fn require(
        &self,
        allowed: bool,
        operation: &str,
    ) -> Result<(), RemoteTransactionError> {
        if allowed {
            Ok(())
        } else {
            Err(RemoteTransactionError::InvalidState(
                InvalidStateError::with_message(format!(
                    "cannot {} remote transaction on {} in state {}",
                    operation,
                    self.describe(),
                    self.transaction().state()
                )),
            ))
        }
    }

    /// Sends BEGIN, replaying the open sub-transactions and pending settings of the local
    /// transaction, followed by the distributed transaction id assignment, in one round trip.
    pub(crate) fn start_begin(
        &mut self,
        context: &TransactionContext,
    ) -> Result<(), RemoteTransactionError> {
        self.transaction_mut()
            .set_state(RemoteTransactionState::Starting)?;

        let mut command = commands::begin_transaction(context.begin_options());

        self.transaction_mut()
            .set_last_successful_sub_xact(TOP_SUB_TRANSACTION_ID);
        self.transaction_mut()
            .set_last_queued_sub_xact(TOP_SUB_TRANSACTION_ID);

        for sub_transaction in context.sub_transactions() {
            if let Some(set_local_commands) = sub_transaction.set_local_commands() {
                command.push_str(set_local_commands);
            }
            command.push_str(&commands::savepoint(sub_transaction.sub_id()));
            command.push(';');
            self.transaction_mut()
                .set_last_queued_sub_xact(sub_transaction.sub_id());
        }

        if let Some(pending) = context.pending_set_commands() {
            command.push_str(pending);
        }

        command.push_str(&commands::assign_distributed_transaction_id(
            context.distributed_transaction_id(),
        ));

        if let Err(err) = self.send(&command) {
            self.handle_connection_error(&err, true).escalate()?;
        }

        self.transaction_mut().set_begin_sent();
        Ok(())
    }

    pub(crate) fn finish_begin(&mut self) -> Result<(), RemoteTransactionError> {
        self.require(
            self.transaction().state() == RemoteTransactionState::Starting,
            "finish begin of",
        )?;

        if self.clear_results(true)? {
            self.transaction_mut()
                .set_state(RemoteTransactionState::Started)?;
            let queued = self.transaction().last_queued_sub_xact();
            self.transaction_mut().set_last_successful_sub_xact(queued);
        }

        Ok(())
    }

    /// Sends the command which ends the transaction on this participant.
    ///
    /// A failed transaction is rolled back instead, a prepared one is committed with COMMIT
    /// PREPARED.
    pub(crate) fn start_commit(&mut self) -> Result<(), RemoteTransactionError> {
        let state = self.transaction().state();
        self.require(
            state.is_in_progress()
                && !state.is_committing()
                && !state.is_aborting()
                && !state.is_terminal(),
            "commit",
        )?;

        if self.transaction().is_failed() {
            self.transaction_mut()
                .set_state(RemoteTransactionState::OnePhaseAborting)?;
            self.forget_results();

            // reporting a send failure here would hide the original failure
            if let Err(err) = self.send(commands::ROLLBACK) {
                debug!(
                    "ignoring failure to send ROLLBACK to {}: {}",
                    self.describe(),
                    err
                );
            }
            return Ok(());
        }

        let command = match (state, self.transaction().prepared_name().copied()) {
            (RemoteTransactionState::Prepared, Some(name)) => {
                let command = commands::commit_prepared(&name);
                self.transaction_mut()
                    .set_state(RemoteTransactionState::TwoPhaseCommitting)?;
                command
            }
            (RemoteTransactionState::Prepared, None) => {
                return Err(RemoteTransactionError::Internal(
                    InternalError::with_message(format!(
                        "prepared transaction on {} has no name",
                        self.describe()
                    )),
                ));
            }
            _ => {
                self.transaction_mut()
                    .set_state(RemoteTransactionState::OnePhaseCommitting)?;
                commands::COMMIT.to_string()
            }
        };

        if let Err(err) = self.send(&command) {
            self.handle_connection_error(&err, false).escalate()?;
        }

        Ok(())
    }

    /// Consumes the result of COMMIT, COMMIT PREPARED or the ROLLBACK sent for a failed
    /// transaction. A failure here is only ever a warning: the outcome is unknown.
    pub(crate) fn finish_commit(&mut self) -> Result<(), RemoteTransactionError> {
        let state = self.transaction().state();
        self.require(state.is_committing() || state.is_aborting(), "finish commit of")?;

        match self.take_result(false) {
            Some(failure) => {
                failure.escalate()?;
                if state.is_committing() {
                    warn!("failed to commit transaction on {}", self.describe());
                }
            }
            None if state.is_aborting() => {
                self.transaction_mut()
                    .set_state(RemoteTransactionState::Aborted)?;
            }
            None => {
                self.transaction_mut()
                    .set_state(RemoteTransactionState::Committed)?;
            }
        }

        self.forget_results();
        Ok(())
    }

    /// Sends the command which rolls back the transaction on this participant.
    ///
    /// A prepared (or preparing) transaction is rolled back with ROLLBACK PREPARED. If the
    /// connection still has a command in flight, it is closed instead and the transaction is
    /// considered aborted.
    pub(crate) fn start_abort(&mut self) -> Result<(), RemoteTransactionError> {
        let state = self.transaction().state();
        self.require(
            state.is_in_progress() && !state.is_aborting() && !state.is_terminal(),
            "abort",
        )?;

        if state.is_preparing() {
            self.forget_results();

            let command = match self.transaction().prepared_name() {
                Some(name) => commands::rollback_prepared(name),
                None => {
                    return Err(RemoteTransactionError::Internal(
                        InternalError::with_message(format!(
                            "preparing transaction on {} has no name",
                            self.describe()
                        )),
                    ))
                }
            };

            match self.send(&command) {
                Ok(()) => self
                    .transaction_mut()
                    .set_state(RemoteTransactionState::TwoPhaseAborting)?,
                Err(err) => self.handle_connection_error(&err, false).escalate()?,
            }

            return Ok(());
        }

        if !self.clear_results_if_ready() {
            warn!(
                "closing connection to {} which still has a command in progress",
                self.describe()
            );
            self.connection_mut().shutdown();
            self.transaction_mut()
                .set_state(RemoteTransactionState::Aborted)?;
            return Ok(());
        }

        match self.send(commands::ROLLBACK) {
            Ok(()) => self
                .transaction_mut()
                .set_state(RemoteTransactionState::OnePhaseAborting)?,
            Err(err) => {
                warn!("failed to send ROLLBACK to {}: {}", self.describe(), err);
                self.mark_failed(false)?;
            }
        }

        Ok(())
    }

    pub(crate) fn finish_abort(&mut self) -> Result<(), RemoteTransactionError> {
        let state = self.transaction().state();
        self.require(state.is_aborting(), "finish abort of")?;

        if state == RemoteTransactionState::TwoPhaseAborting {
            if let Some(failure) = self.take_result(false) {
                failure.escalate()?;
            }
        }

        if !self.clear_results(false)? {
            self.connection_mut().shutdown();
        }

        self.transaction_mut()
            .set_state(RemoteTransactionState::Aborted)?;
        Ok(())
    }

    /// Assigns a prepared transaction name, records it in the recovery log and sends PREPARE
    /// TRANSACTION.
    pub(crate) fn start_prepare(
        &mut self,
        allocator: &IdentifierAllocator,
        transaction_number: u64,
        outer_transaction_id: u64,
        nodes: &dyn NodeDirectory,
        log: &mut dyn RecoveryLog,
    ) -> Result<(), RemoteTransactionError> {
        self.require(
            self.transaction().state() == RemoteTransactionState::Started
                && !self.transaction().is_failed(),
            "prepare",
        )?;

        let name = allocator.next_name(transaction_number)?;
        self.transaction_mut().set_prepared_name(name);

        match nodes.find_group_id(self.connection().host(), self.connection().port()) {
            Some(group_id) => log.log_transaction_record(TransactionRecord::new(
                group_id,
                name,
                outer_transaction_id,
            ))?,
            None => debug!(
                "no group known for {}, not logging prepared transaction {}",
                self.describe(),
                name
            ),
        }

        match self.send(&commands::prepare_transaction(&name)) {
            Ok(()) => self
                .transaction_mut()
                .set_state(RemoteTransactionState::Preparing)?,
            Err(err) => self.handle_connection_error(&err, true).escalate()?,
        }

        Ok(())
    }

    /// Consumes the result of PREPARE TRANSACTION. A rejected prepare leaves the transaction
    /// aborted.
    pub(crate) fn finish_prepare(&mut self) -> Result<(), RemoteTransactionError> {
        self.require(
            self.transaction().state() == RemoteTransactionState::Preparing,
            "finish prepare of",
        )?;

        let failure = self.take_result(true);
        let next = match failure {
            Some(_) => RemoteTransactionState::Aborted,
            None => RemoteTransactionState::Prepared,
        };
        self.transaction_mut().set_state(next)?;

        let cleared = match self.clear_results(true) {
            Ok(cleared) => cleared,
            Err(err) => {
                if let Some(failure) = &failure {
                    warn!("{}", failure);
                }
                return Err(err);
            }
        };

        if let Some(failure) = failure {
            failure.escalate()?;
        }

        if !cleared {
            let name = self
                .transaction()
                .prepared_name()
                .map(|name| name.to_string())
                .unwrap_or_default();
            return Err(RemoteTransactionError::Remote(
                RemoteFailure::new(
                    Severity::Error,
                    FailureKind::Prepare,
                    self.connection().host(),
                    self.connection().port(),
                    format!(
                        "failed to prepare transaction '{}' on host {}",
                        name,
                        self.describe()
                    ),
                )
                .with_hint("Try re-running the command."),
            ));
        }

        Ok(())
    }

    pub(crate) fn start_savepoint_begin(
        &mut self,
        sub_id: SubTransactionId,
    ) -> Result<(), RemoteTransactionError> {
        self.require(
            self.transaction().state() == RemoteTransactionState::Started,
            "start a savepoint in",
        )?;

        if let Err(err) = self.send(&commands::savepoint(sub_id)) {
            self.handle_connection_error(&err, true).escalate()?;
        }

        Ok(())
    }

    pub(crate) fn finish_savepoint_begin(
        &mut self,
        sub_id: SubTransactionId,
    ) -> Result<(), RemoteTransactionError> {
        self.require(
            self.transaction().state() == RemoteTransactionState::Started,
            "finish a savepoint in",
        )?;

        let failure = self.take_result(true);
        self.forget_results();

        match failure {
            Some(failure) => failure.escalate(),
            None => {
                self.transaction_mut().set_last_successful_sub_xact(sub_id);
                Ok(())
            }
        }
    }

    pub(crate) fn start_savepoint_release(
        &mut self,
        sub_id: SubTransactionId,
    ) -> Result<(), RemoteTransactionError> {
        self.require(
            self.transaction().state() == RemoteTransactionState::Started,
            "release a savepoint of",
        )?;

        if let Err(err) = self.send(&commands::release_savepoint(sub_id)) {
            self.handle_connection_error(&err, true).escalate()?;
        }

        Ok(())
    }

    pub(crate) fn finish_savepoint_release(&mut self) -> Result<(), RemoteTransactionError> {
        self.require(
            self.transaction().state() == RemoteTransactionState::Started,
            "finish releasing a savepoint of",
        )?;

        let failure = self.take_result(true);
        self.forget_results();

        match failure {
            Some(failure) => failure.escalate(),
            None => Ok(()),
        }
    }

    pub(crate) fn start_savepoint_rollback(
        &mut self,
        sub_id: SubTransactionId,
    ) -> Result<(), RemoteTransactionError> {
        let state = self.transaction().state();
        self.require(
            state.is_in_progress() && !state.is_terminal(),
            "roll back to a savepoint of",
        )?;

        if let Err(err) = self.send(&commands::rollback_to_savepoint(sub_id)) {
            self.handle_connection_error(&err, false).escalate()?;
        }

        Ok(())
    }

    /// Consumes the result of ROLLBACK TO SAVEPOINT. If the participant was recovering from a
    /// failure and the rollback succeeded, the failure is cleared.
    pub(crate) fn finish_savepoint_rollback(&mut self) -> Result<(), RemoteTransactionError> {
        let failure = self.take_result(false);

        match failure {
            None if self.transaction().is_recovering() => {
                debug!("recovered remote transaction on {}", self.describe());
                self.transaction_mut().recover();
            }
            None => (),
            Some(_) => self.transaction_mut().abandon_recovery(),
        }

        self.forget_results();
        self.transaction_mut().reset_to_started()?;

        match failure {
            Some(failure) => failure.escalate(),
            None => Ok(()),
        }
    }
}
