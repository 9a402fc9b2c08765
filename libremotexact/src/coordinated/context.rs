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

use crate::config::BeginOptions;
use crate::identifier::GroupId;

/// Identifies a sub-transaction (savepoint level) of the local transaction.
pub type SubTransactionId = u32;

pub const INVALID_SUB_TRANSACTION_ID: SubTransactionId = 0;

/// The id of the top-level local transaction; sub-transactions are numbered above it.
pub const TOP_SUB_TRANSACTION_ID: SubTransactionId = 1;

/// Identifies one logical transaction across all nodes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DistributedTransactionId {
    initiator_group_id: GroupId,
    transaction_number: u64,
    timestamp: String,
}

impl DistributedTransactionId {
    pub fn new(initiator_group_id: GroupId, transaction_number: u64, timestamp: &str) -> Self {
        DistributedTransactionId {
            initiator_group_id,
            transaction_number,
            timestamp: timestamp.to_string(),
        }
    }

    pub fn initiator_group_id(&self) -> GroupId {
        self.initiator_group_id
    }

    pub fn transaction_number(&self) -> u64 {
        self.transaction_number
    }

    /// The start time of the transaction, rendered the way the remote nodes parse it.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

/// A local sub-transaction which is still open.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubXactContext {
    sub_id: SubTransactionId,
    set_local_commands: Option<String>,
}

impl SubXactContext {
    /// `set_local_commands` are the session-local settings that were pending when the
    /// sub-transaction was entered.
    pub fn new(sub_id: SubTransactionId, set_local_commands: Option<String>) -> Self {
        SubXactContext {
            sub_id,
            set_local_commands,
        }
    }

    pub fn sub_id(&self) -> SubTransactionId {
        self.sub_id
    }

    pub fn set_local_commands(&self) -> Option<&str> {
        self.set_local_commands.as_deref()
    }
}

/// What a remote transaction must replay when it begins, so it matches the local one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionContext {
    begin_options: BeginOptions,
    distributed_transaction_id: DistributedTransactionId,
    sub_transactions: Vec<SubXactContext>,
    pending_set_commands: Option<String>,
}

impl TransactionContext {
    pub fn new(
        distributed_transaction_id: DistributedTransactionId,
        begin_options: BeginOptions,
    ) -> Self {
        TransactionContext {
            begin_options,
            distributed_transaction_id,
            sub_transactions: Vec::new(),
            pending_set_commands: None,
        }
    }

    pub fn begin_options(&self) -> &BeginOptions {
        &self.begin_options
    }

    pub fn distributed_transaction_id(&self) -> &DistributedTransactionId {
        &self.distributed_transaction_id
    }

    /// The open sub-transactions, outermost first.
    pub fn sub_transactions(&self) -> &[SubXactContext] {
        &self.sub_transactions
    }

    /// Session-local settings issued in the deepest open sub-transaction.
    pub fn pending_set_commands(&self) -> Option<&str> {
        self.pending_set_commands.as_deref()
    }

    pub fn set_sub_transactions(&mut self, sub_transactions: Vec<SubXactContext>) {
        self.sub_transactions = sub_transactions;
    }

    pub fn set_pending_set_commands(&mut self, commands: Option<String>) {
        self.pending_set_commands = commands;
    }
}
