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

use crate::connection::RemoteConnection;
use crate::error::{InternalError, RemoteFailure, RemoteTransactionError};

use super::RemoteTransaction;

/// A remote connection taking part in the coordinated transaction, together with the state of
/// the transaction open on it.
#[derive(Debug)]
pub struct Participant<C> {
    connection: C,
    transaction: RemoteTransaction,
}

impl<C> Participant<C> {
    pub(crate) fn new(connection: C) -> Self {
        Participant {
            connection,
            transaction: RemoteTransaction::default(),
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Gives access to the connection to run statements within the remote transaction.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    pub fn transaction(&self) -> &RemoteTransaction {
        &self.transaction
    }

    pub(crate) fn transaction_mut(&mut self) -> &mut RemoteTransaction {
        &mut self.transaction
    }

    pub(crate) fn into_connection(self) -> C {
        self.connection
    }
}

impl<C> Participant<C>
where
    C: RemoteConnection,
{
    pub(crate) fn describe(&self) -> String {
        format!("{}:{}", self.connection.host(), self.connection.port())
    }

    pub(crate) fn send(&mut self, command: &str) -> Result<(), InternalError> {
        debug!("sending to {}: {}", self.describe(), command);
        self.connection.send_command(command)
    }

    /// Reads the result of the command in flight.
    ///
    /// A missing or non-OK result marks the transaction failed; the classified failure is
    /// returned for the caller to escalate.
    pub(crate) fn take_result(&mut self, raise_errors: bool) -> Option<RemoteFailure> {
        match self.connection.next_result() {
            Ok(Some(result)) if result.is_ok() => None,
            Ok(Some(result)) => Some(self.handle_result_error(Some(&result), raise_errors)),
            Ok(None) => Some(self.handle_result_error(None, raise_errors)),
            Err(err) => Some(self.handle_connection_error(&err, raise_errors)),
        }
    }

    /// Consumes every pending result.
    ///
    /// Returns `Ok(false)` if a result was not OK or could not be read, after marking the
    /// transaction failed.
    pub(crate) fn clear_results(
        &mut self,
        raise_errors: bool,
    ) -> Result<bool, RemoteTransactionError> {
        self.clear_results_internal(raise_errors, false)
    }

    /// Like `clear_results`, without logging the errors of the drained results.
    pub(crate) fn clear_results_discard_warnings(
        &mut self,
        raise_errors: bool,
    ) -> Result<bool, RemoteTransactionError> {
        self.clear_results_internal(raise_errors, true)
    }

    fn clear_results_internal(
        &mut self,
        raise_errors: bool,
        discard_warnings: bool,
    ) -> Result<bool, RemoteTransactionError> {
        loop {
            match self.connection.next_result() {
                Ok(None) => return Ok(true),
                Ok(Some(result)) if result.is_ok() => {
                    trace!("drained result from {}", self.describe());
                }
                Ok(Some(result)) => {
                    if !discard_warnings {
                        warn!(
                            "remote command on {} failed: {}",
                            self.describe(),
                            result.error_message().unwrap_or("unknown error")
                        );
                    }
                    self.mark_failed(raise_errors)?;
                    return Ok(false);
                }
                Err(err) => {
                    self.handle_connection_error(&err, raise_errors)
                        .escalate()?;
                    return Ok(false);
                }
            }
        }
    }

    /// Consumes pending results without blocking.
    ///
    /// Returns false if the connection is still busy or a result was not OK.
    pub(crate) fn clear_results_if_ready(&mut self) -> bool {
        loop {
            if self.connection.is_busy() {
                return false;
            }

            match self.connection.next_result() {
                Ok(None) => return true,
                Ok(Some(result)) if result.is_ok() => (),
                Ok(Some(_)) | Err(_) => return false,
            }
        }
    }

    /// Consumes and ignores every pending result.
    pub(crate) fn forget_results(&mut self) {
        while let Ok(Some(_)) = self.connection.next_result() {}
    }
}
