use super::{
    body::{BodyId, RigidBody},
    Contact,
};
use crate::config::SolverParams;

/// Somewhere bodies can be borrowed from two at a time.
pub trait BodyStore {
    /// Mutable access to two distinct bodies,
    /// or `None` if either is missing or the ids are equal.
    fn pair_mut(&mut self, ids: [BodyId; 2]) -> Option<(&mut RigidBody, &mut RigidBody)>;
}

impl BodyStore for [RigidBody] {
    fn pair_mut(&mut self, ids: [BodyId; 2]) -> Option<(&mut RigidBody, &mut RigidBody)> {
        let i = self.iter().position(|b| b.id() == ids[0])?;
        let j = self.iter().position(|b| b.id() == ids[1])?;
        if i == j {
            return None;
        }
        if i < j {
            let (low, high) = self.split_at_mut(j);
            Some((&mut low[i], &mut high[0]))
        } else {
            let (low, high) = self.split_at_mut(i);
            Some((&mut high[0], &mut low[j]))
        }
    }
}

/// Resolves a region's contacts one at a time.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContactSolver {
    pub params: SolverParams,
}

impl ContactSolver {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    /// Resolve every contact once in order and leave the list empty.
    ///
    /// Contacts whose bodies can't be found in the store are dropped.
    /// Returns the number of contacts that were resolved.
    pub fn solve(&self, contacts: &mut Vec<Contact>, store: &mut (impl BodyStore + ?Sized)) -> usize {
        let mut resolved = 0;
        for contact in contacts.drain(..) {
            if let Some((a, b)) = store.pair_mut(contact.bodies) {
                contact.resolve(a, b, &self.params);
                resolved += 1;
            }
        }
        resolved
    }
}
