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

use std::sync::Arc;

use crate::config::{BeginOptions, CoordinatorConfig};
use crate::coordinated::{CoordinatedTransaction, DistributedTransactionId, TransactionContext};
use crate::identifier::IdentifierAllocator;

/// Starts coordinated transactions for this process.
///
/// All transactions share one identifier allocator, so no prepared transaction name is handed
/// out twice during the lifetime of the coordinator.
#[derive(Debug)]
pub struct Coordinator {
    config: CoordinatorConfig,
    allocator: Arc<IdentifierAllocator>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let allocator = Arc::new(IdentifierAllocator::new(
            config.local_group_id(),
            config.process_id(),
        ));

        Coordinator { config, allocator }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Starts coordinating the local transaction with the given distributed transaction number.
    ///
    /// `timestamp` is the start time of the local transaction, as the remote nodes parse it.
    pub fn begin_transaction<C>(
        &self,
        transaction_number: u64,
        timestamp: &str,
        options: BeginOptions,
    ) -> CoordinatedTransaction<C> {
        debug!("coordinating distributed transaction {}", transaction_number);

        CoordinatedTransaction::new(
            self.allocator.clone(),
            TransactionContext::new(
                DistributedTransactionId::new(
                    self.config.local_group_id(),
                    transaction_number,
                    timestamp,
                ),
                options,
            ),
        )
    }
}
