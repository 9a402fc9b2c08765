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

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FormatResult};

use crate::connection::RemoteConnection;
use crate::error::{InvalidStateError, RemoteTransactionError};
use crate::transaction::Participant;

/// Identifies a participant within its coordinated transaction set.
///
/// Ids are handed out in increasing order, so ordering by id is registration order.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ParticipantId(u64);

impl Display for ParticipantId {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        write!(f, "participant {}", self.0)
    }
}

/// The participants of the active local transaction, iterated in registration order.
#[derive(Debug)]
pub struct CoordinatedTransactionSet<C> {
    participants: BTreeMap<ParticipantId, Participant<C>>,
    next_id: u64,
}

impl<C> Default for CoordinatedTransactionSet<C> {
    fn default() -> Self {
        CoordinatedTransactionSet {
            participants: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<C> CoordinatedTransactionSet<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection whose transaction has not been started.
    pub fn register(&mut self, connection: C) -> ParticipantId {
        let id = ParticipantId(self.next_id);
        self.next_id += 1;
        self.participants.insert(id, Participant::new(connection));
        id
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant<C>> {
        self.participants.get(&id)
    }

    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Participant<C>> {
        self.participants.get_mut(&id)
    }

    pub(crate) fn get_registered_mut(
        &mut self,
        id: ParticipantId,
    ) -> Result<&mut Participant<C>, RemoteTransactionError> {
        self.participants.get_mut(&id).ok_or_else(|| {
            RemoteTransactionError::InvalidState(InvalidStateError::with_message(format!(
                "{} is not registered",
                id
            )))
        })
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn ids(&self) -> Vec<ParticipantId> {
        self.participants.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticipantId, &Participant<C>)> {
        self.participants.iter().map(|(id, p)| (*id, p))
    }

    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (ParticipantId, &mut Participant<C>)> {
        self.participants.iter_mut().map(|(id, p)| (*id, p))
    }

    /// Removes a participant, returning its connection.
    pub fn release(&mut self, id: ParticipantId) -> Option<C> {
        self.participants
            .remove(&id)
            .map(Participant::into_connection)
    }

    /// Removes every participant, returning the connections in registration order.
    pub fn drain(&mut self) -> Vec<C> {
        std::mem::take(&mut self.participants)
            .into_values()
            .map(Participant::into_connection)
            .collect()
    }
}

impl<C> CoordinatedTransactionSet<C>
where
    C: RemoteConnection,
{
    /// Waits once for every given participant's connection to have a result ready.
    pub(crate) fn wait_for(
        &mut self,
        ids: &[ParticipantId],
        raise_interrupts: bool,
    ) -> Result<(), RemoteTransactionError> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut connections: Vec<&mut C> = self
            .participants
            .iter_mut()
            .filter(|(id, _)| ids.contains(*id))
            .map(|(_, participant)| participant.connection_mut())
            .collect();

        C::wait_for_all(&mut connections, raise_interrupts)?;
        Ok(())
    }

    /// Checks every participant which began a transaction, failing if a critical one failed.
    pub fn check_health(&mut self) -> Result<(), RemoteTransactionError> {
        for (_, participant) in self.iter_mut() {
            participant.check_health()?;
        }
        Ok(())
    }
}
