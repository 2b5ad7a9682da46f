use crate::*;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Persistent storage for polls, voters and ballots.
///
/// Implementations must make [`Store::upsert_ballot`] atomic per `(poll_id, voter_id)`: two
/// racing upserts for the same pair leave exactly one ballot behind.
pub trait Store {
    /// Get a poll
    fn get_poll(&self, poll_id: PollId) -> Result<Option<Poll>, Error>;

    /// Insert a new poll
    fn put_poll(&self, poll: &Poll) -> Result<(), Error>;

    /// All polls, in no particular order
    fn list_polls(&self) -> Result<Vec<Poll>, Error>;

    /// Delete a poll and every ballot cast in it. Returns false if the poll did not exist.
    fn delete_poll(&self, poll_id: PollId) -> Result<bool, Error>;

    /// Get a registered voter
    fn get_voter(&self, voter_id: VoterId) -> Result<Option<VoterIdentity>, Error>;

    /// Register a voter
    fn put_voter(&self, voter: &VoterIdentity) -> Result<(), Error>;

    /// Insert the ballot, or replace the existing ballot with the same `(poll_id, voter_id)`
    fn upsert_ballot(&self, ballot: Ballot) -> Result<Ack, Error>;

    /// Get the live ballot of a voter in a poll
    fn get_ballot(&self, poll_id: PollId, voter_id: VoterId) -> Result<Option<Ballot>, Error>;

    /// All live ballots of a poll, in no particular order
    fn list_ballots(&self, poll_id: PollId) -> Result<Vec<Ballot>, Error>;
}

#[derive(Default)]
struct Tables {
    polls: BTreeMap<PollId, Poll>,
    voters: BTreeMap<VoterId, VoterIdentity>,
    ballots: BTreeMap<(PollId, VoterId), Ballot>,
}

/// A simple store that uses in-memory BTreeMaps behind a lock
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Tables>,
}

impl MemStore {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, Error> {
        self.inner
            .read()
            .map_err(|_| Error::Store("store lock poisoned".to_owned()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, Error> {
        self.inner
            .write()
            .map_err(|_| Error::Store("store lock poisoned".to_owned()))
    }
}

impl Store for MemStore {
    fn get_poll(&self, poll_id: PollId) -> Result<Option<Poll>, Error> {
        Ok(self.read()?.polls.get(&poll_id).cloned())
    }

    fn put_poll(&self, poll: &Poll) -> Result<(), Error> {
        let mut tables = self.write()?;
        if tables.polls.contains_key(&poll.id) {
            return Err(Error::Store(format!("poll {} already exists", poll.id)));
        }
        tables.polls.insert(poll.id, poll.clone());
        Ok(())
    }

    fn list_polls(&self) -> Result<Vec<Poll>, Error> {
        Ok(self.read()?.polls.values().cloned().collect())
    }

    fn delete_poll(&self, poll_id: PollId) -> Result<bool, Error> {
        let mut tables = self.write()?;
        if tables.polls.remove(&poll_id).is_none() {
            return Ok(false);
        }
        tables.ballots.retain(|(ballot_poll, _), _| *ballot_poll != poll_id);
        Ok(true)
    }

    fn get_voter(&self, voter_id: VoterId) -> Result<Option<VoterIdentity>, Error> {
        Ok(self.read()?.voters.get(&voter_id).cloned())
    }

    fn put_voter(&self, voter: &VoterIdentity) -> Result<(), Error> {
        let mut tables = self.write()?;
        if tables.voters.contains_key(&voter.id) {
            return Err(Error::Store(format!("voter {} already exists", voter.id)));
        }
        tables.voters.insert(voter.id, voter.clone());
        Ok(())
    }

    fn upsert_ballot(&self, ballot: Ballot) -> Result<Ack, Error> {
        // One write lock covers the existence check and the write
        let mut tables = self.write()?;
        if !tables.polls.contains_key(&ballot.poll_id) {
            return Err(NotFound::Poll(ballot.poll_id).into());
        }

        let key = (ballot.poll_id, ballot.voter_id);
        match tables.ballots.insert(key, ballot) {
            Some(_) => Ok(Ack::Replaced),
            None => Ok(Ack::Inserted),
        }
    }

    fn get_ballot(&self, poll_id: PollId, voter_id: VoterId) -> Result<Option<Ballot>, Error> {
        Ok(self.read()?.ballots.get(&(poll_id, voter_id)).cloned())
    }

    fn list_ballots(&self, poll_id: PollId) -> Result<Vec<Ballot>, Error> {
        let tables = self.read()?;
        let ballots = tables
            .ballots
            .iter()
            .filter(|((ballot_poll, _), _)| *ballot_poll == poll_id)
            .map(|(_, ballot)| ballot.clone())
            .collect();
        Ok(ballots)
    }
}
