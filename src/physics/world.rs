//! The coordinator that owns the regions of the world and routes bodies between them.

use super::{
    body::{BodyId, RigidBody},
    collision::{quadtree::OverlayNode, QuadTree},
    forcefield::{ForceField, NoneField},
    worker::{CancelToken, RegionView, StepOutcome, Worker},
    Contact, PhysicsError, Velocity,
};
use crate::{
    config::{PhysicsConfig, RegionLayout, SolverParams},
    math::{Vec2, AABB},
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Instant,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Messages delivered to a worker's inbox.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Take ownership of a body.
    Insert(Box<RigidBody>),
    Remove(BodyId),
    /// Apply the result of a contact that another worker resolved.
    Nudge {
        id: BodyId,
        velocity: Velocity,
        translation: Vec2,
    },
}

/// Bodies that don't fit entirely inside their owner's region.
///
/// Owners publish snapshots here so that every worker can test against them.
/// The lock is only held for single publish, withdraw and snapshot calls.
#[derive(Debug, Default)]
pub struct SharedRegion {
    bodies: Mutex<HashMap<BodyId, RigidBody>>,
}

impl SharedRegion {
    pub fn publish(&self, body: &RigidBody) {
        self.bodies.lock().insert(body.id(), body.clone());
    }

    pub fn withdraw(&self, id: BodyId) -> bool {
        self.bodies.lock().remove(&id).is_some()
    }

    pub fn snapshot(&self) -> Vec<RigidBody> {
        self.bodies.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bodies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.lock().is_empty()
    }
}

/// Hands bodies and messages to the worker responsible for them.
///
/// Keeps the authoritative record of which worker owns each body.
/// Every change to that record and the message that goes with it
/// happen under one lock, so a removal racing with a migration
/// always reaches the worker that ends up holding the body.
#[derive(Debug)]
pub struct Router {
    bounds: AABB,
    regions: Vec<AABB>,
    inboxes: Vec<Sender<WorkerMessage>>,
    // kept to count messages in flight
    receivers: Vec<Receiver<WorkerMessage>>,
    owners: Mutex<HashMap<BodyId, usize>>,
    next_id: AtomicU64,
}

impl Router {
    /// Create a router for the given regions,
    /// returning it with the inbox of each region's worker.
    pub fn new(bounds: AABB, regions: Vec<AABB>) -> (Arc<Self>, Vec<Receiver<WorkerMessage>>) {
        let (inboxes, receivers): (Vec<_>, Vec<_>) = regions
            .iter()
            .map(|_| crossbeam_channel::unbounded())
            .unzip();
        let router = Router {
            bounds,
            regions,
            inboxes,
            receivers: receivers.clone(),
            owners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        };
        (Arc::new(router), receivers)
    }

    #[inline]
    pub fn bounds(&self) -> AABB {
        self.bounds
    }

    #[inline]
    pub fn regions(&self) -> &[AABB] {
        &self.regions
    }

    /// Index of the region containing a point, or 0 if none does.
    pub fn region_of(&self, point: Vec2) -> usize {
        self.regions
            .iter()
            .position(|r| r.contains_point(point))
            .unwrap_or(0)
    }

    /// Current owner of a body, if it's in the world.
    pub fn owner_of(&self, id: BodyId) -> Option<usize> {
        self.owners.lock().get(&id).copied()
    }

    /// Give a new body an id and queue it for the worker whose region contains its center.
    ///
    /// Returns `None` and drops the body if its center is outside the world.
    pub fn add(&self, mut body: RigidBody) -> Option<BodyId> {
        if !self.bounds.contains_point(body.center()) {
            log::debug!(
                "Dropped new body at {:?} outside of the world",
                body.center()
            );
            return None;
        }
        let id = BodyId(self.next_id.fetch_add(1, Ordering::Relaxed));
        body.id = id;
        let mut owners = self.owners.lock();
        let target = self.region_of(body.center());
        owners.insert(id, target);
        body.owner = target;
        log::debug!("Added body {} to region {}", id, target);
        self.send(target, WorkerMessage::Insert(Box::new(body)));
        Some(id)
    }

    /// Forward a body that left its worker's region to its new owner.
    ///
    /// Bodies that were removed while in flight or left the world are dropped.
    pub fn route(&self, mut body: RigidBody) -> Option<usize> {
        let id = body.id();
        let mut owners = self.owners.lock();
        if !owners.contains_key(&id) {
            log::debug!("Dropped body {} that was removed during handoff", id);
            return None;
        }
        if !self.bounds.contains_point(body.center()) {
            owners.remove(&id);
            log::debug!("Body {} left the world at {:?}", id, body.center());
            return None;
        }
        let target = self.region_of(body.center());
        owners.insert(id, target);
        log::debug!("Body {} migrating from region {} to {}", id, body.owner, target);
        body.owner = target;
        self.send(target, WorkerMessage::Insert(Box::new(body)));
        Some(target)
    }

    /// Ask the owner of a body to drop it.
    /// Returns false if no such body is in the world.
    pub fn remove(&self, id: BodyId) -> bool {
        let mut owners = self.owners.lock();
        match owners.remove(&id) {
            Some(owner) => {
                self.send(owner, WorkerMessage::Remove(id));
                true
            }
            None => false,
        }
    }

    /// Send the change computed for a body to whoever owns it now.
    pub fn nudge(&self, id: BodyId, velocity: Velocity, translation: Vec2) {
        let owners = self.owners.lock();
        match owners.get(&id) {
            Some(owner) => self.send(
                *owner,
                WorkerMessage::Nudge {
                    id,
                    velocity,
                    translation,
                },
            ),
            None => log::debug!("Dropped nudge for body {} that is no longer in the world", id),
        }
    }

    /// Number of messages sent but not yet received by workers.
    pub fn in_transit(&self) -> usize {
        self.receivers.iter().map(|r| r.len()).sum()
    }

    fn send(&self, target: usize, message: WorkerMessage) {
        if let Err(err) = self.inboxes[target].send(message) {
            log::warn!("Inbox of region {} is closed: {:?}", target, err.0);
        }
    }
}

/// Everything a worker shares with the rest of the world.
#[derive(Clone)]
pub struct SimContext {
    pub router: Arc<Router>,
    pub shared: Arc<SharedRegion>,
    pub forcefield: Arc<dyn ForceField + Send + Sync>,
    pub solver: SolverParams,
    pub sleep_epsilon: f64,
}

/// A physics world split into regions, each simulated by its own worker.
///
/// Workers can either be stepped together with [`step`][Self::step]
/// or left to run freely on their own threads with [`start_workers`][Self::start_workers].
pub struct World {
    config: PhysicsConfig,
    ctx: SimContext,
    workers: Vec<Arc<Mutex<Worker>>>,
    views: Vec<Arc<RwLock<RegionView>>>,
    cancel: CancelToken,
    threads: Vec<JoinHandle<()>>,
}

impl World {
    pub fn new(config: PhysicsConfig) -> Self {
        let regions = config.regions();
        let (router, inboxes) = Router::new(config.bounds, regions.clone());
        let ctx = SimContext {
            router,
            shared: Arc::new(SharedRegion::default()),
            forcefield: Arc::new(NoneField),
            solver: config.solver,
            sleep_epsilon: config.sleep_epsilon,
        };

        // a single region is the world root itself,
        // otherwise regions are its children
        let root_depth = match config.layout {
            RegionLayout::Single => 0,
            RegionLayout::Quad => 1,
        };
        let workers: Vec<Worker> = regions
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(index, (region, inbox))| {
                let tree = QuadTree::subtree(region, root_depth, config.max_depth);
                Worker::new(index, tree, inbox, ctx.clone())
            })
            .collect();
        let views = workers.iter().map(|w| w.view()).collect();

        World {
            config,
            ctx,
            workers: workers
                .into_iter()
                .map(|w| Arc::new(Mutex::new(w)))
                .collect(),
            views,
            cancel: CancelToken::new(),
            threads: Vec::new(),
        }
    }

    /// Set the force field applied to every body before integration.
    pub fn with_force_field(mut self, field: impl ForceField + Send + Sync + 'static) -> Self {
        let field: Arc<dyn ForceField + Send + Sync> = Arc::new(field);
        self.ctx.forcefield = Arc::clone(&field);
        for worker in &self.workers {
            worker.lock().ctx.forcefield = Arc::clone(&field);
        }
        self
    }

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Add a body to the world. It shows up in [`all_bodies`][Self::all_bodies]
    /// once its worker has received it.
    ///
    /// Returns `None` if the body's center is outside of the world.
    pub fn add_body(&self, body: RigidBody) -> Option<BodyId> {
        self.ctx.router.add(body)
    }

    /// Remove a body wherever it currently is.
    /// Returns false if the body isn't in the world.
    pub fn remove_body(&self, id: BodyId) -> bool {
        self.ctx.router.remove(id)
    }

    /// Every body owned by a worker as of its last step.
    /// Bodies that are moving between workers are not included.
    ///
    /// A worker's view can lag behind a handoff, so each body is only taken
    /// from the view of the worker the router currently assigns it to.
    pub fn all_bodies(&self) -> Vec<RigidBody> {
        let owners = self.ctx.router.owners.lock();
        self.views
            .iter()
            .enumerate()
            .flat_map(|(region, v)| {
                v.read()
                    .bodies
                    .iter()
                    .filter(|b| owners.get(&b.id()) == Some(&region))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// The rectangle of each worker's region.
    pub fn regions(&self) -> Vec<AABB> {
        self.ctx.router.regions().to_vec()
    }

    /// Contacts found by a worker in its last step.
    pub fn contacts(&self, region: usize) -> Vec<Contact> {
        self.views
            .get(region)
            .map(|v| v.read().contacts.clone())
            .unwrap_or_default()
    }

    /// Partition nodes of a region worth drawing in a debug view.
    pub fn overlay(&self, region: usize) -> Vec<OverlayNode> {
        self.views
            .get(region)
            .map(|v| v.read().overlay.clone())
            .unwrap_or_default()
    }

    /// Bodies straddling the boundaries of their regions.
    pub fn shared_bodies(&self) -> Vec<RigidBody> {
        self.ctx.shared.snapshot()
    }

    /// Number of messages between workers that haven't been received yet.
    pub fn in_transit(&self) -> usize {
        self.ctx.router.in_transit()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        !self.threads.is_empty()
    }

    /// Advance every region once by `dt` seconds on the calling thread
    /// (or the rayon thread pool with the `parallel` feature).
    ///
    /// Bodies handed between regions during the step are received before this returns.
    pub fn step(&mut self, dt: f64) -> Result<(), PhysicsError> {
        if self.is_running() {
            return Err(PhysicsError::WorkersRunning);
        }
        if dt < 0.0 {
            return Err(PhysicsError::NegativeTimeStep(dt));
        }

        let cancel = &self.cancel;
        #[cfg(feature = "parallel")]
        let results: Vec<_> = self
            .workers
            .par_iter()
            .map(|w| w.lock().step(dt, cancel))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<_> = self
            .workers
            .iter()
            .map(|w| w.lock().step(dt, cancel))
            .collect();

        for worker in &self.workers {
            worker.lock().settle();
        }

        for result in results {
            result?;
        }
        Ok(())
    }

    /// Start one free-running thread per region.
    ///
    /// Each iteration uses the wall-clock duration of the previous one,
    /// multiplied by the configured time scale, as its time step.
    pub fn start_workers(&mut self) -> Result<(), PhysicsError> {
        if self.is_running() {
            return Err(PhysicsError::WorkersRunning);
        }
        self.cancel = CancelToken::new();
        let time_scale = self.config.time_scale;

        for (index, worker) in self.workers.iter().enumerate() {
            let worker = Arc::clone(worker);
            let cancel = self.cancel.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("physics-region-{}", index))
                .spawn(move || run_free(index, worker, cancel, time_scale));
            match spawned {
                Ok(handle) => self.threads.push(handle),
                Err(err) => {
                    self.join_threads();
                    return Err(PhysicsError::SpawnFailed(err.to_string()));
                }
            }
        }
        log::info!("Started {} region workers", self.threads.len());
        Ok(())
    }

    /// Stop the worker threads and wait for them to finish their current phase.
    pub fn shutdown(&mut self) -> Result<(), PhysicsError> {
        if !self.is_running() {
            return Err(PhysicsError::WorkersStopped);
        }
        self.join_threads();
        log::info!("Stopped region workers");
        Ok(())
    }

    fn join_threads(&mut self) {
        self.cancel.cancel();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::warn!("A region worker panicked");
            }
        }
        // synchronous steps check this token too
        self.cancel = CancelToken::new();
    }
}

impl Drop for World {
    fn drop(&mut self) {
        if self.is_running() {
            self.join_threads();
        }
    }
}

fn run_free(index: usize, worker: Arc<Mutex<Worker>>, cancel: CancelToken, time_scale: f64) {
    log::info!("Region worker {} started", index);
    let mut dt = 0.0;
    while !cancel.is_cancelled() {
        let start = Instant::now();
        let result = worker.lock().step(dt, &cancel);
        match result {
            Ok(StepOutcome::Completed { .. }) => {}
            Ok(StepOutcome::Cancelled) => break,
            Err(err) => {
                log::warn!("Region worker {} stopped: {}", index, err);
                break;
            }
        }
        dt = start.elapsed().as_secs_f64() * time_scale;
    }
    log::info!("Region worker {} finished", index);
}
