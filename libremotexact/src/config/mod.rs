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

//! Process-level and per-transaction settings.

mod begin_options;
mod builder;

pub use begin_options::{BeginOptions, IsolationLevel};
pub use builder::CoordinatorConfigBuilder;

use crate::identifier::GroupId;

/// Settings shared by every coordinated transaction started by this process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoordinatorConfig {
    local_group_id: GroupId,
    process_id: u32,
}

impl CoordinatorConfig {
    /// The group this node belongs to; it initiates distributed transactions and is embedded in
    /// the names of the transactions it prepares.
    pub fn local_group_id(&self) -> GroupId {
        self.local_group_id
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }
}
