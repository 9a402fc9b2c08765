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

use std::fmt::{Display, Formatter, Result as FormatResult};

use crate::error::InvalidStateError;

/// The lifecycle of a transaction on one remote connection.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum RemoteTransactionState {
    #[default]
    NotStarted,
    Starting,
    Started,
    Preparing,
    Prepared,
    OnePhaseCommitting,
    TwoPhaseCommitting,
    OnePhaseAborting,
    TwoPhaseAborting,
    Committed,
    Aborted,
}

impl RemoteTransactionState {
    /// Returns true if BEGIN has been sent.
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, RemoteTransactionState::NotStarted)
    }

    /// Returns true if PREPARE TRANSACTION has been sent and not yet resolved.
    pub fn is_preparing(&self) -> bool {
        matches!(
            self,
            RemoteTransactionState::Preparing | RemoteTransactionState::Prepared
        )
    }

    pub fn is_committing(&self) -> bool {
        matches!(
            self,
            RemoteTransactionState::OnePhaseCommitting | RemoteTransactionState::TwoPhaseCommitting
        )
    }

    pub fn is_aborting(&self) -> bool {
        matches!(
            self,
            RemoteTransactionState::OnePhaseAborting | RemoteTransactionState::TwoPhaseAborting
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteTransactionState::Committed | RemoteTransactionState::Aborted
        )
    }

    /// Returns true if the transition table allows moving from this state to `next`.
    pub fn can_transition_to(&self, next: RemoteTransactionState) -> bool {
        use RemoteTransactionState::*;

        match self {
            NotStarted => matches!(next, Starting),
            Starting => matches!(
                next,
                Started | OnePhaseCommitting | OnePhaseAborting | Aborted
            ),
            Started => matches!(
                next,
                Preparing | OnePhaseCommitting | OnePhaseAborting | Aborted
            ),
            Preparing => matches!(next, Prepared | TwoPhaseAborting | Aborted),
            Prepared => matches!(
                next,
                TwoPhaseCommitting | OnePhaseAborting | TwoPhaseAborting
            ),
            OnePhaseCommitting | TwoPhaseCommitting => {
                matches!(next, Committed | OnePhaseAborting | Aborted)
            }
            OnePhaseAborting | TwoPhaseAborting => matches!(next, Aborted),
            Committed | Aborted => false,
        }
    }

    /// Validates a move to `next` against the transition table.
    pub fn transition_to(
        &self,
        next: RemoteTransactionState,
    ) -> Result<RemoteTransactionState, InvalidStateError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidStateError::with_message(format!(
                "remote transaction cannot move from {} to {}",
                self, next
            )))
        }
    }
}

impl Display for RemoteTransactionState {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        let name = match self {
            RemoteTransactionState::NotStarted => "NOT_STARTED",
            RemoteTransactionState::Starting => "STARTING",
            RemoteTransactionState::Started => "STARTED",
            RemoteTransactionState::Preparing => "PREPARING",
            RemoteTransactionState::Prepared => "PREPARED",
            RemoteTransactionState::OnePhaseCommitting => "1PC_COMMITTING",
            RemoteTransactionState::TwoPhaseCommitting => "2PC_COMMITTING",
            RemoteTransactionState::OnePhaseAborting => "1PC_ABORTING",
            RemoteTransactionState::TwoPhaseAborting => "2PC_ABORTING",
            RemoteTransactionState::Committed => "COMMITTED",
            RemoteTransactionState::Aborted => "ABORTED",
        };

        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::RemoteTransactionState::*;
    use super::*;

    const ALL: [RemoteTransactionState; 11] = [
        NotStarted,
        Starting,
        Started,
        Preparing,
        Prepared,
        OnePhaseCommitting,
        TwoPhaseCommitting,
        OnePhaseAborting,
        TwoPhaseAborting,
        Committed,
        Aborted,
    ];

    #[test]
    fn happy_paths() {
        let two_phase = [
            NotStarted,
            Starting,
            Started,
            Preparing,
            Prepared,
            TwoPhaseCommitting,
            Committed,
        ];
        for pair in two_phase.windows(2) {
            assert_eq!(pair[0].transition_to(pair[1]).unwrap(), pair[1]);
        }

        let one_phase = [NotStarted, Starting, Started, OnePhaseCommitting, Committed];
        for pair in one_phase.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }

        let abort_prepared = [Prepared, TwoPhaseAborting, Aborted];
        for pair in abort_prepared.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for next in ALL {
            assert!(!Committed.can_transition_to(next));
            assert!(!Aborted.can_transition_to(next));
        }
    }

    #[test]
    fn no_skipping_ahead() {
        assert!(NotStarted.transition_to(Started).is_err());
        assert!(NotStarted.transition_to(Preparing).is_err());
        assert!(Starting.transition_to(Preparing).is_err());
        assert!(Started.transition_to(Prepared).is_err());
        assert!(Started.transition_to(TwoPhaseCommitting).is_err());
        assert!(Preparing.transition_to(TwoPhaseCommitting).is_err());
        assert!(Prepared.transition_to(OnePhaseCommitting).is_err());
        assert!(OnePhaseAborting.transition_to(Committed).is_err());
    }

    #[test]
    fn no_state_moves_to_itself() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{} -> {}", state, state);
        }
    }

    #[test]
    fn predicates() {
        assert!(!NotStarted.is_in_progress());
        assert!(Starting.is_in_progress());
        assert!(Preparing.is_preparing() && Prepared.is_preparing());
        assert!(!Started.is_preparing());
        assert!(OnePhaseCommitting.is_committing() && TwoPhaseCommitting.is_committing());
        assert!(OnePhaseAborting.is_aborting() && TwoPhaseAborting.is_aborting());
        assert!(Committed.is_terminal() && Aborted.is_terminal());
        assert!(!Prepared.is_terminal());
    }
}
