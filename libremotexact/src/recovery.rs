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

//! Collaborators consulted while preparing transactions.
//!
//! Before a participant is prepared, the pairing of its node group and prepared transaction
//! name is written to a recovery log. A recovery process can then tell which prepared
//! transactions on a node belong to local transactions which committed.

use std::collections::HashMap;

use crate::error::InternalError;
use crate::identifier::{GroupId, PreparedTransactionName};

/// A prepared transaction written to the recovery log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionRecord {
    group_id: GroupId,
    prepared_name: PreparedTransactionName,
    outer_transaction_id: u64,
}

impl TransactionRecord {
    pub fn new(
        group_id: GroupId,
        prepared_name: PreparedTransactionName,
        outer_transaction_id: u64,
    ) -> Self {
        TransactionRecord {
            group_id,
            prepared_name,
            outer_transaction_id,
        }
    }

    /// The group of the node the transaction is prepared on.
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn prepared_name(&self) -> &PreparedTransactionName {
        &self.prepared_name
    }

    /// The id of the local transaction which must commit for the prepared transaction to be
    /// committed.
    pub fn outer_transaction_id(&self) -> u64 {
        self.outer_transaction_id
    }
}

/// Durable log of prepared transactions.
pub trait RecoveryLog {
    /// Writes a record. The write must be part of the local transaction, so it only becomes
    /// visible if the local transaction commits.
    ///
    /// # Errors
    ///
    /// An [`InternalError`] is returned if the record could not be written.
    fn log_transaction_record(&mut self, record: TransactionRecord) -> Result<(), InternalError>;
}

impl RecoveryLog for Vec<TransactionRecord> {
    fn log_transaction_record(&mut self, record: TransactionRecord) -> Result<(), InternalError> {
        self.push(record);
        Ok(())
    }
}

/// Looks up which node group a connection's host and port belong to.
pub trait NodeDirectory {
    fn find_group_id(&self, host: &str, port: u16) -> Option<GroupId>;
}

impl NodeDirectory for HashMap<(String, u16), GroupId> {
    fn find_group_id(&self, host: &str, port: u16) -> Option<GroupId> {
        self.get(&(host.to_string(), port)).copied()
    }
}
