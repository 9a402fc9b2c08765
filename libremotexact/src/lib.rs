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

//! Coordinates atomic commit of a local transaction across remote database connections.
//!
//! Every remote connection taking part in the local transaction is registered with a
//! [`CoordinatedTransaction`](coordinated::CoordinatedTransaction). The lifecycle events of the
//! local transaction (begin, savepoints, pre-commit, commit and abort) are then fanned out to
//! all participants: the commands are sent to every connection first, a single wait covers all
//! of them, and the results are consumed afterwards.
//!
//! Transactions which wrote on more than one node are committed with two-phase commit. Each
//! prepared transaction gets a globally unique name (see [`identifier`]) which is recorded in a
//! [`RecoveryLog`](recovery::RecoveryLog) before PREPARE TRANSACTION is sent.

#[macro_use]
extern crate log;

pub mod config;
pub mod connection;
pub mod coordinated;
mod coordinator;
pub mod error;
pub mod failure;
pub mod identifier;
pub mod recovery;
#[cfg(feature = "savepoint")]
pub mod savepoint;
#[cfg(test)]
mod testing;
pub mod transaction;
pub mod two_phase_commit;

pub use coordinated::{CoordinatedTransaction, ParticipantId};
pub use coordinator::Coordinator;
pub use error::RemoteTransactionError;
