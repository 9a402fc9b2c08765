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

//! Contains RemoteFailure, the severity-tagged report of a remote fault.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use super::RemoteTransactionError;

/// How a remote fault affects the operation that observed it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    /// The participant is recorded as failed and the operation continues.
    Warning,
    /// The operation must be aborted now.
    Error,
}

/// The class of fault a `RemoteFailure` describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// A command could not be sent or a result could not be read.
    Connection,
    /// The remote node returned a non-OK response.
    Result,
    /// A failed participant is marked critical.
    Critical,
    /// The outcome of PREPARE TRANSACTION could not be established.
    Prepare,
}

/// A fault observed on a single remote participant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteFailure {
    severity: Severity,
    kind: FailureKind,
    host: String,
    port: u16,
    message: String,
    hint: Option<String>,
}

impl RemoteFailure {
    pub fn new(
        severity: Severity,
        kind: FailureKind,
        host: &str,
        port: u16,
        message: String,
    ) -> Self {
        RemoteFailure {
            severity,
            kind,
            host: host.to_string(),
            port,
            message,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Applies the failure's severity.
    ///
    /// A warning is logged and swallowed; an error is returned so the caller can propagate it
    /// with `?`.
    pub fn escalate(self) -> Result<(), RemoteTransactionError> {
        match self.severity {
            Severity::Warning => {
                warn!("{}", self);
                Ok(())
            }
            Severity::Error => Err(RemoteTransactionError::Remote(self)),
        }
    }
}

impl Error for RemoteFailure {}

impl Display for RemoteFailure {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self.kind {
            FailureKind::Connection => write!(
                f,
                "connection to the remote node {}:{} failed: {}",
                self.host, self.port, self.message
            )?,
            FailureKind::Result => write!(
                f,
                "remote command on {}:{} failed: {}",
                self.host, self.port, self.message
            )?,
            FailureKind::Critical | FailureKind::Prepare => write!(f, "{}", self.message)?,
        }

        if let Some(hint) = &self.hint {
            write!(f, " (hint: {})", hint)?;
        }

        Ok(())
    }
}
