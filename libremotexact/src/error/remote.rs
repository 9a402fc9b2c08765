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

//! Contains RemoteTransactionError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use super::InternalError;
use super::InvalidStateError;
use super::RemoteFailure;

/// An error which aborts the operation coordinating remote transactions.
#[derive(Debug)]
pub enum RemoteTransactionError {
    /// The operation was invoked from a state which does not permit it.
    InvalidState(InvalidStateError),

    /// A connection or result failure which was classified as a hard error.
    Remote(RemoteFailure),

    /// A collaborator failed unexpectedly.
    Internal(InternalError),
}

impl RemoteTransactionError {
    /// Returns the escalated remote failure, if this error is one.
    pub fn remote_failure(&self) -> Option<&RemoteFailure> {
        match self {
            RemoteTransactionError::Remote(failure) => Some(failure),
            _ => None,
        }
    }
}

impl Error for RemoteTransactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RemoteTransactionError::InvalidState(e) => Some(e),
            RemoteTransactionError::Remote(e) => Some(e),
            RemoteTransactionError::Internal(e) => Some(e),
        }
    }
}

impl Display for RemoteTransactionError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            RemoteTransactionError::InvalidState(e) => write!(f, "{}", e),
            RemoteTransactionError::Remote(e) => write!(f, "{}", e),
            RemoteTransactionError::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl From<InvalidStateError> for RemoteTransactionError {
    fn from(err: InvalidStateError) -> Self {
        RemoteTransactionError::InvalidState(err)
    }
}

impl From<InternalError> for RemoteTransactionError {
    fn from(err: InternalError) -> Self {
        RemoteTransactionError::Internal(err)
    }
}

impl From<RemoteFailure> for RemoteTransactionError {
    fn from(err: RemoteFailure) -> Self {
        RemoteTransactionError::Remote(err)
    }
}
