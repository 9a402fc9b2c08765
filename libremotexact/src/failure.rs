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

//! Decides whether a fault on a remote participant aborts the operation which observed it.
//!
//! Every transport or result fault marks the participant failed. It becomes a hard error only
//! if the participant is critical and the call site asked for errors to be raised; otherwise it
//! is logged as a warning and the operation continues.

use crate::connection::{RemoteConnection, RemoteResult};
use crate::error::{FailureKind, InternalError, RemoteFailure, RemoteTransactionError, Severity};
use crate::transaction::Participant;

/// Returns the severity of a fault on a participant.
pub fn classify(critical: bool, raise_errors: bool) -> Severity {
    if critical && raise_errors {
        Severity::Error
    } else {
        Severity::Warning
    }
}

impl<C> Participant<C>
where
    C: RemoteConnection,
{
    fn severity(&self, raise_errors: bool) -> Severity {
        classify(self.transaction().is_critical(), raise_errors)
    }

    fn critical_failure(&self) -> RemoteFailure {
        RemoteFailure::new(
            Severity::Error,
            FailureKind::Critical,
            self.connection().host(),
            self.connection().port(),
            format!(
                "failure on connection marked as essential: {}",
                self.describe()
            ),
        )
    }

    /// Records that a command could not be sent or its result could not be read.
    pub(crate) fn handle_connection_error(
        &mut self,
        err: &InternalError,
        raise_errors: bool,
    ) -> RemoteFailure {
        self.transaction_mut().set_failed();

        RemoteFailure::new(
            self.severity(raise_errors),
            FailureKind::Connection,
            self.connection().host(),
            self.connection().port(),
            err.to_string(),
        )
    }

    /// Records that the remote node did not respond with an OK result.
    pub(crate) fn handle_result_error(
        &mut self,
        result: Option<&RemoteResult>,
        raise_errors: bool,
    ) -> RemoteFailure {
        self.transaction_mut().set_failed();

        let message = match result {
            Some(result) => result
                .error_message()
                .unwrap_or("unexpected result")
                .to_string(),
            None => "no result received".to_string(),
        };

        RemoteFailure::new(
            self.severity(raise_errors),
            FailureKind::Result,
            self.connection().host(),
            self.connection().port(),
            message,
        )
    }

    /// Marks the transaction failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is critical and `allow_error_promotion` is true.
    pub fn mark_failed(
        &mut self,
        allow_error_promotion: bool,
    ) -> Result<(), RemoteTransactionError> {
        self.transaction_mut().set_failed();

        if self.transaction().is_critical() && allow_error_promotion {
            return Err(RemoteTransactionError::Remote(self.critical_failure()));
        }

        Ok(())
    }

    /// Marks the transaction critical: once it fails, the coordinated transaction fails.
    pub fn mark_critical(&mut self) {
        self.transaction_mut().set_critical();
    }

    /// Promotes a participant whose session is in an error or unknown state to failed.
    ///
    /// Returns an error if the participant is failed and critical.
    pub(crate) fn check_health(&mut self) -> Result<(), RemoteTransactionError> {
        if !self.transaction().state().is_in_progress() {
            return Ok(());
        }

        if self.connection().transaction_status().is_broken() {
            warn!("connection to {} is in a broken state", self.describe());
            self.transaction_mut().set_failed();
        }

        if self.transaction().is_failed() && self.transaction().is_critical() {
            return Err(RemoteTransactionError::Remote(self.critical_failure()));
        }

        Ok(())
    }
}
