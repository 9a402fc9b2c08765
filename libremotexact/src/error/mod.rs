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

//! Errors returned while coordinating remote transactions.

mod failure;
mod malformed_name;
mod remote;

pub use errling::{InternalError, InvalidStateError};

pub use failure::{FailureKind, RemoteFailure, Severity};
pub use malformed_name::MalformedNameError;
pub use remote::RemoteTransactionError;

/// Keeps the first error seen while a phase continues to finish every participant.
#[derive(Default)]
pub(crate) struct FirstError {
    error: Option<RemoteTransactionError>,
}

impl FirstError {
    pub fn record(&mut self, result: Result<(), RemoteTransactionError>) {
        if let Err(err) = result {
            if self.error.is_none() {
                self.error = Some(err);
            } else {
                debug!("suppressing subsequent error in same phase: {}", err);
            }
        }
    }

    pub fn into_result(self) -> Result<(), RemoteTransactionError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
