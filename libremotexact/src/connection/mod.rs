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

//! Defines the connection abstraction transaction control commands are sent over.
//!
//! Connections are established, pooled and multiplexed by the embedding system. This crate
//! only needs to submit a command without blocking, wait once for a set of connections to
//! become ready, and then read each connection's results.

pub(crate) mod commands;

pub use commands::quote_literal;

use crate::error::InternalError;

/// The outcome of one command, as reported by the remote node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RemoteResult {
    /// A command without a result set completed.
    CommandOk,
    /// A command returning rows completed.
    TuplesOk,
    /// The remote node reported an error.
    Error(String),
}

impl RemoteResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, RemoteResult::CommandOk | RemoteResult::TuplesOk)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RemoteResult::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// The transaction status of the remote session, as tracked by the transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionStatus {
    Idle,
    Active,
    InTransaction,
    InError,
    Unknown,
}

impl TransactionStatus {
    /// Returns true if the session can no longer be trusted to commit.
    pub fn is_broken(&self) -> bool {
        matches!(self, TransactionStatus::InError | TransactionStatus::Unknown)
    }
}

/// An open connection to a remote node.
pub trait RemoteConnection {
    fn host(&self) -> &str;

    fn port(&self) -> u16;

    /// Submits a command without waiting for it to complete.
    ///
    /// # Errors
    ///
    /// An [`InternalError`] is returned if the command could not be sent.
    fn send_command(&mut self, command: &str) -> Result<(), InternalError>;

    /// Returns the next result of the command in flight, blocking until it is available.
    ///
    /// `Ok(None)` is returned once the command has no further results.
    ///
    /// # Errors
    ///
    /// An [`InternalError`] is returned if the result could not be read.
    fn next_result(&mut self) -> Result<Option<RemoteResult>, InternalError>;

    /// Returns true if reading the next result would block.
    fn is_busy(&mut self) -> bool;

    /// Asks the remote node to cancel the command in flight.
    fn send_cancellation(&mut self) -> Result<(), InternalError>;

    /// Closes the connection without further communication.
    fn shutdown(&mut self);

    /// Makes the connection available to other statements of the same local transaction.
    fn unclaim(&mut self);

    fn transaction_status(&self) -> TransactionStatus;

    /// Returns true if a write was executed over this connection.
    fn modified_placement(&self) -> bool;

    /// Blocks until every given connection has a result ready or has failed.
    ///
    /// If `raise_interrupts` is true, a pending interrupt of the local session aborts the wait
    /// with an error.
    ///
    /// # Errors
    ///
    /// An [`InternalError`] is returned if the wait was interrupted or the connections could
    /// not be polled.
    fn wait_for_all(
        connections: &mut [&mut Self],
        raise_interrupts: bool,
    ) -> Result<(), InternalError>
    where
        Self: Sized;
}
