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

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

/// A prepared transaction name which is not well-formed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MalformedNameError {
    name: String,
    reason: String,
}

impl MalformedNameError {
    pub fn new(name: &str, reason: String) -> Self {
        MalformedNameError {
            name: name.to_string(),
            reason,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Error for MalformedNameError {}

impl Display for MalformedNameError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        write!(
            f,
            "prepared transaction name '{}' is not well-formed: {}",
            self.name, self.reason
        )
    }
}
