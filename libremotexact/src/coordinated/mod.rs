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

//! The coordinated transaction: one local transaction and the remote transactions it drives.

mod context;
mod set;
mod transaction;

pub use context::{
    DistributedTransactionId, SubTransactionId, SubXactContext, TransactionContext,
    INVALID_SUB_TRANSACTION_ID, TOP_SUB_TRANSACTION_ID,
};
pub use set::{CoordinatedTransactionSet, ParticipantId};
pub use transaction::{CoordinatedTransaction, CoordinatedTransactionState};
