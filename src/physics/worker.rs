//! The per-region simulation loop.

use super::{
    body::{BodyId, RigidBody},
    collision::{detect, quadtree::OverlayNode, Placement, QuadTree},
    solver::{BodyStore, ContactSolver},
    world::{SimContext, WorkerMessage},
    Contact, PhysicsError,
};
use crate::math::{Vec2, AABB};

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use thunderdome as td;

/// Shared flag telling workers to stop between phases.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a worker is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Integrating,
    BroadPhase,
    NarrowPhase,
    Resolving,
    Migrating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Completed {
        /// Contacts resolved this step, including ones with bodies of other regions.
        contacts: usize,
        /// Bodies handed off to other regions or dropped for leaving the world.
        handed_off: usize,
    },
    Cancelled,
}

/// What a worker last published for readers on other threads.
#[derive(Clone, Debug, Default)]
pub struct RegionView {
    pub bodies: Vec<RigidBody>,
    pub contacts: Vec<Contact>,
    pub overlay: Vec<OverlayNode>,
}

/// Bodies owned by one worker, addressable by id.
#[derive(Debug, Default)]
struct LocalBodies {
    arena: td::Arena<RigidBody>,
    handles: HashMap<BodyId, td::Index>,
}

impl LocalBodies {
    fn insert(&mut self, body: RigidBody) {
        let id = body.id();
        self.remove(id);
        let handle = self.arena.insert(body);
        self.handles.insert(id, handle);
    }

    fn remove(&mut self, id: BodyId) -> Option<RigidBody> {
        let handle = self.handles.remove(&id)?;
        self.arena.remove(handle)
    }

    fn get(&self, id: BodyId) -> Option<&RigidBody> {
        self.handles.get(&id).and_then(|h| self.arena.get(*h))
    }

    fn get_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        match self.handles.get(&id) {
            Some(h) => self.arena.get_mut(*h),
            None => None,
        }
    }

    #[inline]
    fn contains(&self, id: BodyId) -> bool {
        self.handles.contains_key(&id)
    }

    fn ids(&self) -> Vec<BodyId> {
        self.handles.keys().copied().collect()
    }

    fn iter(&self) -> impl Iterator<Item = &RigidBody> {
        self.arena.iter().map(|(_, body)| body)
    }

    #[inline]
    fn len(&self) -> usize {
        self.handles.len()
    }
}

impl BodyStore for LocalBodies {
    fn pair_mut(&mut self, ids: [BodyId; 2]) -> Option<(&mut RigidBody, &mut RigidBody)> {
        if ids[0] == ids[1] {
            return None;
        }
        let h0 = *self.handles.get(&ids[0])?;
        let h1 = *self.handles.get(&ids[1])?;
        match self.arena.get2_mut(h0, h1) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }
}

/// A body that might collide with a local one.
enum Candidate {
    Local(BodyId),
    /// Snapshot of a shared body owned by another worker.
    Foreign(RigidBody),
}

/// Owner of one region of the world, its partition subtree, and the bodies in it.
pub struct Worker {
    index: usize,
    region: AABB,
    tree: QuadTree,
    bodies: LocalBodies,
    /// Local bodies the subtree can't contain, published to the shared region.
    escalated: HashSet<BodyId>,
    contacts: Vec<Contact>,
    solver: ContactSolver,
    phase: Phase,
    inbox: Receiver<WorkerMessage>,
    pub(crate) ctx: SimContext,
    view: Arc<RwLock<RegionView>>,
}

impl Worker {
    pub fn new(index: usize, tree: QuadTree, inbox: Receiver<WorkerMessage>, ctx: SimContext) -> Self {
        Worker {
            index,
            region: tree.bounds(),
            tree,
            bodies: LocalBodies::default(),
            escalated: HashSet::new(),
            contacts: Vec::new(),
            solver: ContactSolver::new(ctx.solver),
            phase: Phase::Idle,
            inbox,
            ctx,
            view: Arc::new(RwLock::new(RegionView::default())),
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn region(&self) -> AABB {
        self.region
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    /// Handle to the view this worker publishes at the end of every step.
    pub fn view(&self) -> Arc<RwLock<RegionView>> {
        Arc::clone(&self.view)
    }

    /// Run one full cycle of the simulation loop for this region.
    ///
    /// The cancel token is checked between phases.
    pub fn step(&mut self, dt: f64, cancel: &CancelToken) -> Result<StepOutcome, PhysicsError> {
        if dt < 0.0 {
            return Err(PhysicsError::NegativeTimeStep(dt));
        }

        self.phase = Phase::Integrating;
        let handed_off = self.integrate(dt)?;
        if self.cancelled(cancel) {
            return Ok(StepOutcome::Cancelled);
        }

        self.phase = Phase::BroadPhase;
        let pairs = self.broad_phase();
        if self.cancelled(cancel) {
            return Ok(StepOutcome::Cancelled);
        }

        self.phase = Phase::NarrowPhase;
        let foreign = self.narrow_phase(pairs);
        if self.cancelled(cancel) {
            return Ok(StepOutcome::Cancelled);
        }

        self.phase = Phase::Resolving;
        let step_contacts: Vec<Contact> = self
            .contacts
            .iter()
            .copied()
            .chain(foreign.iter().map(|(c, _)| *c))
            .collect();
        let resolved = self.resolve(foreign);
        if self.cancelled(cancel) {
            return Ok(StepOutcome::Cancelled);
        }

        self.phase = Phase::Migrating;
        self.migrate();
        self.publish(step_contacts);
        self.phase = Phase::Idle;

        log::trace!(
            "Region {} stepped {} bodies, {} contacts, {} handed off",
            self.index,
            self.bodies.len(),
            resolved,
            handed_off
        );

        Ok(StepOutcome::Completed {
            contacts: resolved,
            handed_off,
        })
    }

    /// Receive queued messages and publish the view without simulating.
    pub fn settle(&mut self) {
        self.phase = Phase::Migrating;
        self.migrate();
        let contacts = self.view.read().contacts.clone();
        self.publish(contacts);
        self.phase = Phase::Idle;
    }

    fn cancelled(&mut self, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            self.contacts.clear();
            self.phase = Phase::Idle;
            true
        } else {
            false
        }
    }

    //
    // phases
    //

    /// Returns the number of bodies that left the region.
    fn integrate(&mut self, dt: f64) -> Result<usize, PhysicsError> {
        let mut handed_off = 0;
        for id in self.bodies.ids() {
            let body = match self.bodies.get_mut(id) {
                Some(body) => body,
                None => continue,
            };
            if body.is_awake() {
                let force = self.ctx.forcefield.force_on(body);
                if force != Vec2::zero() {
                    body.add_force(force);
                }
            }
            let moved = body.integrate(dt, self.ctx.sleep_epsilon)?;
            let still_here = self.region.contains_point(body.center());

            if !still_here {
                if let Some(body) = self.take(id) {
                    self.ctx.router.route(body);
                    handed_off += 1;
                }
            } else if moved {
                self.place(id);
            }
        }
        Ok(handed_off)
    }

    fn broad_phase(&self) -> Vec<(BodyId, Candidate)> {
        let shared = self.ctx.shared.snapshot();
        let mut seen = HashSet::new();
        let mut pairs = Vec::new();

        for body in self.bodies.iter() {
            let id = body.id();
            let is_escalated = self.escalated.contains(&id);
            if !is_escalated {
                for other in self.tree.retrieve_candidates(body) {
                    if seen.insert(BodyId::pair(id, other)) {
                        pairs.push((id, Candidate::Local(other)));
                    }
                }
            }

            for snapshot in &shared {
                let other = snapshot.id();
                if other == id {
                    continue;
                }
                if self.bodies.contains(other) {
                    if seen.insert(BodyId::pair(id, other)) {
                        pairs.push((id, Candidate::Local(other)));
                    }
                    continue;
                }
                // when both are shared the owner of the smaller id handles the pair
                if is_escalated && id > other {
                    continue;
                }
                if seen.insert(BodyId::pair(id, other)) {
                    pairs.push((id, Candidate::Foreign(snapshot.clone())));
                }
            }
        }

        pairs
    }

    /// Collects local contacts into `self.contacts`
    /// and returns contacts with foreign bodies alongside their snapshots.
    fn narrow_phase(&mut self, pairs: Vec<(BodyId, Candidate)>) -> Vec<(Contact, RigidBody)> {
        let mut foreign = Vec::new();
        for (id, candidate) in pairs {
            let body = match self.bodies.get(id) {
                Some(body) => body,
                None => continue,
            };
            match candidate {
                Candidate::Local(other) => {
                    if let Some(contact) = self.bodies.get(other).and_then(|o| detect(body, o)) {
                        self.contacts.push(contact);
                    }
                }
                Candidate::Foreign(snapshot) => {
                    if let Some(contact) = detect(body, &snapshot) {
                        foreign.push((contact, snapshot));
                    }
                }
            }
        }
        foreign
    }

    fn resolve(&mut self, foreign: Vec<(Contact, RigidBody)>) -> usize {
        let touched: HashSet<BodyId> = self
            .contacts
            .iter()
            .flat_map(|c| c.bodies)
            .chain(foreign.iter().map(|(c, _)| c.bodies[0]))
            .collect();
        let mut resolved = self.solver.solve(&mut self.contacts, &mut self.bodies);

        // other workers own these, send them the change instead of mutating
        for (contact, mut snapshot) in foreign {
            let body = match self.bodies.get_mut(contact.bodies[0]) {
                Some(body) => body,
                None => continue,
            };
            let old_velocity = snapshot.velocity();
            let old_center = snapshot.center();
            contact.resolve(body, &mut snapshot, &self.solver.params);
            self.ctx.router.nudge(
                snapshot.id(),
                snapshot.velocity() - old_velocity,
                snapshot.center() - old_center,
            );
            resolved += 1;
        }

        // positional correction may have moved bodies across node boundaries
        for id in touched {
            self.place(id);
        }

        resolved
    }

    fn migrate(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            match message {
                WorkerMessage::Insert(body) => {
                    let mut body = *body;
                    let id = body.id();
                    body.owner = self.index;
                    log::debug!("Region {} received body {}", self.index, id);
                    self.bodies.insert(body);
                    self.place(id);
                }
                WorkerMessage::Remove(id) => {
                    if self.take(id).is_some() {
                        log::debug!("Region {} removed body {}", self.index, id);
                    }
                }
                WorkerMessage::Nudge {
                    id,
                    velocity,
                    translation,
                } => {
                    match self.bodies.get_mut(id) {
                        Some(body) => {
                            body.nudge(velocity, translation);
                            self.place(id);
                        }
                        // handed off before the nudge arrived
                        None => log::debug!(
                            "Region {} dropped nudge for body {} it no longer holds",
                            self.index,
                            id
                        ),
                    }
                }
            }
        }
    }

    fn publish(&mut self, contacts: Vec<Contact>) {
        for id in &self.escalated {
            if let Some(body) = self.bodies.get(*id) {
                self.ctx.shared.publish(body);
            }
        }
        *self.view.write() = RegionView {
            bodies: self.bodies.iter().cloned().collect(),
            contacts,
            overlay: self.tree.overlay(),
        };
    }

    //
    // membership
    //

    /// Put a local body into the subtree, or the shared region if the subtree can't hold it.
    fn place(&mut self, id: BodyId) {
        let body = match self.bodies.get_mut(id) {
            Some(body) => body,
            None => return,
        };
        match self.tree.insert(body) {
            Placement::Node { .. } => {
                if self.escalated.remove(&id) {
                    self.ctx.shared.withdraw(id);
                }
            }
            Placement::Escalated => {
                body.depth = self.tree.depth().saturating_sub(1);
                self.escalated.insert(id);
                self.ctx.shared.publish(body);
            }
        }
    }

    /// Stop tracking a body entirely.
    fn take(&mut self, id: BodyId) -> Option<RigidBody> {
        self.tree.remove(id);
        if self.escalated.remove(&id) {
            self.ctx.shared.withdraw(id);
        }
        self.bodies.remove(id)
    }
}
