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

//! Text of the transaction control commands sent to remote nodes.

use crate::config::BeginOptions;
use crate::coordinated::{DistributedTransactionId, SubTransactionId};
use crate::identifier::PreparedTransactionName;

pub const COMMIT: &str = "COMMIT";
pub const ROLLBACK: &str = "ROLLBACK";

const ASSIGN_DISTRIBUTED_TRANSACTION_ID_FUNCTION: &str = "assign_distributed_transaction_id";

/// Quotes a string as an SQL literal.
///
/// Single quotes are doubled; if the string contains a backslash the literal uses the escape
/// string syntax and backslashes are doubled as well.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 3);

    if value.contains('\\') {
        quoted.push('E');
    }

    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push(c);
        }
        quoted.push(c);
    }
    quoted.push('\'');

    quoted
}

/// The BEGIN command for the given options.
///
/// The isolation level is always stated, as the remote default may differ. Deferrable and
/// read-only are only stated when they were set explicitly.
pub fn begin_transaction(options: &BeginOptions) -> String {
    let mut command = format!(
        "BEGIN TRANSACTION ISOLATION LEVEL {}",
        options.isolation_level().as_sql()
    );

    match options.deferrable() {
        Some(true) => command.push_str(" DEFERRABLE"),
        Some(false) => command.push_str(" NOT DEFERRABLE"),
        None => (),
    }

    match options.read_only() {
        Some(true) => command.push_str(" READ ONLY"),
        Some(false) => command.push_str(" READ WRITE"),
        None => (),
    }

    command.push(';');
    command
}

pub fn assign_distributed_transaction_id(id: &DistributedTransactionId) -> String {
    format!(
        "SELECT {}({}, {}, {});",
        ASSIGN_DISTRIBUTED_TRANSACTION_ID_FUNCTION,
        id.initiator_group_id(),
        id.transaction_number(),
        quote_literal(id.timestamp())
    )
}

pub fn savepoint(sub_id: SubTransactionId) -> String {
    format!("SAVEPOINT savepoint_{}", sub_id)
}

pub fn release_savepoint(sub_id: SubTransactionId) -> String {
    format!("RELEASE SAVEPOINT savepoint_{}", sub_id)
}

pub fn rollback_to_savepoint(sub_id: SubTransactionId) -> String {
    format!("ROLLBACK TO SAVEPOINT savepoint_{}", sub_id)
}

pub fn prepare_transaction(name: &PreparedTransactionName) -> String {
    format!("PREPARE TRANSACTION {}", quote_literal(&name.to_string()))
}

pub fn commit_prepared(name: &PreparedTransactionName) -> String {
    format!("COMMIT PREPARED {}", quote_literal(&name.to_string()))
}

pub fn rollback_prepared(name: &PreparedTransactionName) -> String {
    format!("ROLLBACK PREPARED {}", quote_literal(&name.to_string()))
}
