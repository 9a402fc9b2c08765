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

//! Globally unique names for prepared transactions.
//!
//! A prepared transaction name has the layout
//!
//! ```text
//! rxact_<source group>_<pid>_<distributed transaction number>_<connection number>
//! ```
//!
//! - The source group distinguishes transactions prepared by different coordinators; a
//!   coordinator only recovers its own prepared transactions.
//! - The pid distinguishes processes on the same coordinator and adds entropy across restarts.
//! - The distributed transaction number distinguishes transactions started by the same node.
//! - The connection number distinguishes the connections to a node within one transaction.
//!
//! The layout is shared with the recovery sweep, which parses names found on remote nodes:
//!
//! ```
//! use remotexact::identifier::PreparedTransactionName;
//!
//! let name = PreparedTransactionName::new(3, 4242, 17, 0);
//! assert_eq!(name.to_string(), "rxact_3_4242_17_0");
//!
//! let parsed: PreparedTransactionName = "rxact_3_4242_17_0".parse().unwrap();
//! assert_eq!(parsed, name);
//!
//! assert!("bad_1_2".parse::<PreparedTransactionName>().is_err());
//! ```

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{InternalError, MalformedNameError};

/// Identifies a group of nodes holding the same data.
pub type GroupId = u32;

/// The prefix shared by every prepared transaction name.
pub const PREPARED_NAME_PREFIX: &str = "rxact";

/// The longest name a remote node accepts for a prepared transaction.
pub const MAX_PREPARED_NAME_LEN: usize = 63;

const SEPARATOR: char = '_';

/// The longest name `PreparedTransactionName` can encode, derived from its field widths.
pub const MAX_ENCODED_NAME_LEN: usize = PREPARED_NAME_PREFIX.len()
    + 4 * SEPARATOR.len_utf8()
    + decimal_width(GroupId::MAX as u64)
    + decimal_width(u32::MAX as u64)
    + decimal_width(u64::MAX)
    + decimal_width(u32::MAX as u64);

const _: () = assert!(MAX_ENCODED_NAME_LEN <= MAX_PREPARED_NAME_LEN);

const fn decimal_width(mut value: u64) -> usize {
    let mut width = 1;
    while value >= 10 {
        value /= 10;
        width += 1;
    }
    width
}

/// The decoded fields of a prepared transaction name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PreparedTransactionName {
    group_id: GroupId,
    process_id: u32,
    transaction_number: u64,
    connection_number: u32,
}

impl PreparedTransactionName {
    pub fn new(
        group_id: GroupId,
        process_id: u32,
        transaction_number: u64,
        connection_number: u32,
    ) -> Self {
        PreparedTransactionName {
            group_id,
            process_id,
            transaction_number,
            connection_number,
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn transaction_number(&self) -> u64 {
        self.transaction_number
    }

    pub fn connection_number(&self) -> u32 {
        self.connection_number
    }
}

impl Display for PreparedTransactionName {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        write!(
            f,
            "{prefix}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.group_id,
            self.process_id,
            self.transaction_number,
            self.connection_number,
            prefix = PREPARED_NAME_PREFIX,
            sep = SEPARATOR,
        )
    }
}

impl FromStr for PreparedTransactionName {
    type Err = MalformedNameError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name.len() > MAX_ENCODED_NAME_LEN {
            return Err(MalformedNameError::new(
                name,
                format!("longer than {} characters", MAX_ENCODED_NAME_LEN),
            ));
        }

        let mut fields = name.split(SEPARATOR);

        match fields.next() {
            Some(PREPARED_NAME_PREFIX) => (),
            _ => {
                return Err(MalformedNameError::new(
                    name,
                    format!("missing '{}' prefix", PREPARED_NAME_PREFIX),
                ))
            }
        }

        let group_id = parse_field(name, fields.next(), "group id")?;
        let process_id = parse_field(name, fields.next(), "process id")?;
        let transaction_number = parse_field(name, fields.next(), "transaction number")?;
        let connection_number = parse_field(name, fields.next(), "connection number")?;

        if fields.next().is_some() {
            return Err(MalformedNameError::new(
                name,
                "unexpected trailing field".into(),
            ));
        }

        Ok(PreparedTransactionName {
            group_id,
            process_id,
            transaction_number,
            connection_number,
        })
    }
}

// Only plain ASCII digits are accepted, so signs and whitespace that `str::parse` would
// tolerate are rejected here.
fn parse_field<T: FromStr>(
    name: &str,
    field: Option<&str>,
    field_name: &str,
) -> Result<T, MalformedNameError> {
    let field = field
        .ok_or_else(|| MalformedNameError::new(name, format!("missing {}", field_name)))?;

    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedNameError::new(
            name,
            format!("{} '{}' is not a non-negative integer", field_name, field),
        ));
    }

    field
        .parse()
        .map_err(|_| MalformedNameError::new(name, format!("{} is out of range", field_name)))
}

/// Hands out prepared transaction names for this process.
///
/// The connection number increases with every name and is never reused, so one allocator must
/// be shared by every transaction in the process.
#[derive(Debug)]
pub struct IdentifierAllocator {
    group_id: GroupId,
    process_id: u32,
    next_connection_number: AtomicU32,
}

impl IdentifierAllocator {
    pub fn new(group_id: GroupId, process_id: u32) -> Self {
        IdentifierAllocator {
            group_id,
            process_id,
            next_connection_number: AtomicU32::new(0),
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Allocates the name for the next prepared transaction of the given distributed
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an [`InternalError`] once the connection number reaches `u32::MAX`, which is never
    /// handed out.
    pub fn next_name(
        &self,
        transaction_number: u64,
    ) -> Result<PreparedTransactionName, InternalError> {
        let connection_number = self
            .next_connection_number
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .map_err(|_| {
                InternalError::with_message::<String>(
                    "prepared transaction connection numbers are exhausted".into(),
                )
            })?;

        Ok(PreparedTransactionName::new(
            self.group_id,
            self.process_id,
            transaction_number,
            connection_number,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encode_layout() {
        let name = PreparedTransactionName::new(14, 31337, 9_000_000_000, 2);
        assert_eq!(name.to_string(), "rxact_14_31337_9000000000_2");
    }

    #[test]
    fn widest_name_fits_the_limit() {
        let name = PreparedTransactionName::new(u32::MAX, u32::MAX, u64::MAX, u32::MAX);
        let encoded = name.to_string();

        assert_eq!(encoded.len(), MAX_ENCODED_NAME_LEN);
        assert!(encoded.len() <= MAX_PREPARED_NAME_LEN);
        assert_eq!(encoded.parse::<PreparedTransactionName>().unwrap(), name);
    }

    #[test]
    fn reject_malformed_names() {
        for malformed in [
            "",
            "bad_1_2",
            "rxact",
            "rxact_1_2_3",
            "rxact_1_2_3_",
            "rxact__2_3_4",
            "rxact_1_2_3_4_5",
            "rxact_a_2_3_4",
            "rxact_1_-2_3_4",
            "rxact_1_+2_3_4",
            "rxact_1_2_3_ 4",
            "rxact_4294967296_2_3_4",
            "rxact_1_2_18446744073709551616_4",
            "other_1_2_3_4",
            "rxact-1-2-3-4",
        ] {
            assert!(
                malformed.parse::<PreparedTransactionName>().is_err(),
                "{:?} should not parse",
                malformed
            );
        }
    }

    #[test]
    fn malformed_error_names_the_field() {
        let err = "rxact_1_2_x_4"
            .parse::<PreparedTransactionName>()
            .unwrap_err();

        assert_eq!(err.name(), "rxact_1_2_x_4");
        assert!(err.reason().contains("transaction number"));
    }

    #[test]
    fn sequential_names_are_unique() {
        let allocator = IdentifierAllocator::new(1, 100);
        let names: Vec<_> = (0..64).map(|_| allocator.next_name(55).unwrap()).collect();

        for pair in names.windows(2) {
            assert!(pair[0].connection_number() < pair[1].connection_number());
        }

        let encoded: HashSet<String> = names.iter().map(|n| n.to_string()).collect();
        assert_eq!(encoded.len(), names.len());
    }

    #[test]
    fn allocator_refuses_to_wrap() {
        let allocator = IdentifierAllocator::new(1, 100);
        allocator
            .next_connection_number
            .store(u32::MAX - 1, Ordering::Relaxed);

        assert_eq!(
            allocator.next_name(1).unwrap().connection_number(),
            u32::MAX - 1
        );
        assert!(allocator.next_name(1).is_err());
        assert!(allocator.next_name(1).is_err());
    }

    proptest! {
        #[test]
        fn prop_encode_parse_round_trip(
            group_id in any::<u32>(),
            process_id in any::<u32>(),
            transaction_number in any::<u64>(),
            connection_number in any::<u32>(),
        ) {
            let name = PreparedTransactionName::new(
                group_id,
                process_id,
                transaction_number,
                connection_number,
            );
            let parsed: PreparedTransactionName = name.to_string().parse().unwrap();
            prop_assert_eq!(parsed, name);
        }

        #[test]
        fn prop_parse_never_panics(input in "\\PC*") {
            let _ = input.parse::<PreparedTransactionName>();
        }

        #[test]
        fn prop_allocations_strictly_increase(count in 1usize..200) {
            let allocator = IdentifierAllocator::new(7, 1);
            let mut last = None;
            for _ in 0..count {
                let name = allocator.next_name(9).unwrap();
                if let Some(prev) = last {
                    prop_assert!(name.connection_number() > prev);
                }
                last = Some(name.connection_number());
            }
        }
    }
}
