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

use crate::error::InvalidStateError;
use crate::identifier::GroupId;

use super::CoordinatorConfig;

#[derive(Default)]
pub struct CoordinatorConfigBuilder {
    local_group_id: Option<GroupId>,
    process_id: Option<u32>,
}

impl CoordinatorConfigBuilder {
    pub fn new() -> Self {
        Self {
            local_group_id: None,
            process_id: None,
        }
    }

    pub fn with_local_group_id(mut self, local_group_id: GroupId) -> Self {
        self.local_group_id = Some(local_group_id);
        self
    }

    pub fn with_process_id(mut self, process_id: u32) -> Self {
        self.process_id = Some(process_id);
        self
    }

    /// Builds the config; the process id defaults to the id of the running process.
    pub fn build(self) -> Result<CoordinatorConfig, InvalidStateError> {
        let local_group_id = self.local_group_id.ok_or_else(|| {
            InvalidStateError::with_message("missing local_group_id field".into())
        })?;

        let process_id = self.process_id.unwrap_or_else(std::process::id);

        Ok(CoordinatorConfig {
            local_group_id,
            process_id,
        })
    }
}
