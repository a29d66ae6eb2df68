use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chisel_types::ChunkPos;
use chisel_world::{encode_column, World};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::state::ConnectionHandle;

/// Desired-set updates settle for this long before installing.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(150);
/// The drainer polls for an installable pending set at this cadence.
const DRAIN_INTERVAL: Duration = Duration::from_millis(100);
/// Health monitor scan cadence.
const HEALTH_INTERVAL: Duration = Duration::from_secs(2);
/// A LOADING request older than this is forcibly re-queued.
const STUCK_TIMEOUT: Duration = Duration::from_secs(10);
/// Idle workers re-check the queue at least this often.
const IDLE_WAIT: Duration = Duration::from_millis(50);
/// Bound on the synchronous spawn-batch wait.
pub const SPAWN_WAIT: Duration = Duration::from_secs(5);
/// Bound on joining each streamer task at shutdown.
const JOIN_WAIT: Duration = Duration::from_secs(2);

/// The desired columns around a center chunk: a (2r+1) x (2r+1) square.
pub fn view_square(center: ChunkPos, radius: i32) -> HashSet<ChunkPos> {
    let mut set = HashSet::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
    for cx in (center.x - radius)..=(center.x + radius) {
        for cz in (center.z - radius)..=(center.z + radius) {
            set.insert(ChunkPos::new(cx, cz));
        }
    }
    set
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Loading,
    Done,
    Cancelled,
}

#[derive(Debug)]
struct ChunkRequest {
    state: RequestState,
    enqueued_at: Instant,
    started_at: Option<Instant>,
}

struct PendingUpdate {
    desired: HashSet<ChunkPos>,
    recorded_at: Instant,
}

/// Owns one player's desired chunk set and the outstanding load requests.
/// Updates are debounced; installation diffs the new set against requests
/// and the player's loaded columns.
pub struct RequestManager {
    desired: HashSet<ChunkPos>,
    pending: Option<PendingUpdate>,
    requests: HashMap<ChunkPos, ChunkRequest>,
    center: ChunkPos,
}

impl RequestManager {
    pub fn new(center: ChunkPos) -> Self {
        Self {
            desired: HashSet::new(),
            pending: None,
            requests: HashMap::new(),
            center,
        }
    }

    /// Record a new desired set; it installs on a later process call.
    pub fn update_desired_chunks(&mut self, desired: HashSet<ChunkPos>, now: Instant) {
        self.pending = Some(PendingUpdate {
            desired,
            recorded_at: now,
        });
    }

    /// Install the pending set iff the debounce window has elapsed.
    /// Returns true when an install happened.
    pub fn process_pending_updates(
        &mut self,
        center: ChunkPos,
        now: Instant,
        loaded: &mut HashSet<ChunkPos>,
    ) -> bool {
        let elapsed = match &self.pending {
            Some(pending) => now.duration_since(pending.recorded_at) >= DEBOUNCE_WINDOW,
            None => false,
        };
        if !elapsed {
            return false;
        }
        self.install(center, now, loaded)
    }

    /// Install the pending set right away, bypassing the debounce (used for
    /// the spawn batch).
    pub fn process_updates_immediately(
        &mut self,
        center: ChunkPos,
        now: Instant,
        loaded: &mut HashSet<ChunkPos>,
    ) -> bool {
        self.install(center, now, loaded)
    }

    fn install(&mut self, center: ChunkPos, now: Instant, loaded: &mut HashSet<ChunkPos>) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        self.center = center;
        self.desired = pending.desired;

        // Cancel requests for columns no longer desired. LOADING entries stay
        // marked so the in-flight worker discards its result; everything else
        // drops immediately.
        let stale: Vec<ChunkPos> = self
            .requests
            .keys()
            .filter(|pos| !self.desired.contains(pos))
            .copied()
            .collect();
        for pos in stale {
            let request = self.requests.get_mut(&pos).expect("stale key exists");
            if request.state == RequestState::Loading {
                request.state = RequestState::Cancelled;
            } else {
                self.requests.remove(&pos);
            }
        }

        // The client drops columns that leave view distance on its own; only
        // the bookkeeping set needs updating.
        loaded.retain(|pos| self.desired.contains(pos));

        // Queue the additions, skipping columns already loaded or in flight.
        for &pos in &self.desired {
            if loaded.contains(&pos) || self.requests.contains_key(&pos) {
                continue;
            }
            self.requests.insert(
                pos,
                ChunkRequest {
                    state: RequestState::Queued,
                    enqueued_at: now,
                    started_at: None,
                },
            );
        }
        true
    }

    pub fn center(&self) -> ChunkPos {
        self.center
    }

    pub fn is_desired(&self, pos: ChunkPos) -> bool {
        self.desired.contains(&pos)
    }

    pub fn request_state(&self, pos: ChunkPos) -> Option<RequestState> {
        self.requests.get(&pos).map(|r| r.state)
    }

    pub fn queued_count(&self) -> usize {
        self.requests
            .values()
            .filter(|r| r.state == RequestState::Queued)
            .count()
    }

    /// Claim the QUEUED request nearest to the player chunk (Chebyshev),
    /// marking it LOADING.
    pub fn next_queued(&mut self, now: Instant) -> Option<ChunkPos> {
        let center = self.center;
        let pos = self
            .requests
            .iter()
            .filter(|(_, r)| r.state == RequestState::Queued)
            .min_by_key(|(pos, r)| (pos.chebyshev_distance(&center), r.enqueued_at))
            .map(|(pos, _)| *pos)?;
        let request = self.requests.get_mut(&pos).expect("claimed key exists");
        request.state = RequestState::Loading;
        request.started_at = Some(now);
        Some(pos)
    }

    /// True (and the entry is dropped) when the request was cancelled while
    /// the worker held it.
    pub fn take_if_cancelled(&mut self, pos: ChunkPos) -> bool {
        if self.requests.get(&pos).map(|r| r.state) == Some(RequestState::Cancelled) {
            self.requests.remove(&pos);
            true
        } else {
            false
        }
    }

    /// Mark a request delivered and retire it.
    pub fn complete(&mut self, pos: ChunkPos) {
        if let Some(request) = self.requests.get_mut(&pos) {
            request.state = RequestState::Done;
        }
        self.requests.remove(&pos);
    }

    /// Drop a request that cannot be served (generation or encoding failure).
    pub fn abandon(&mut self, pos: ChunkPos) {
        self.requests.remove(&pos);
    }

    /// Re-queue every LOADING request older than the stuck timeout.
    pub fn requeue_stuck(&mut self, now: Instant) -> Vec<ChunkPos> {
        let mut requeued = Vec::new();
        for (&pos, request) in self.requests.iter_mut() {
            if request.state != RequestState::Loading {
                continue;
            }
            let started = request.started_at.unwrap_or(request.enqueued_at);
            if now.duration_since(started) >= STUCK_TIMEOUT {
                request.state = RequestState::Queued;
                request.started_at = None;
                request.enqueued_at = now;
                requeued.push(pos);
            }
        }
        requeued
    }
}

/// Per-player chunk streaming: a worker pool pulling nearest-first from the
/// request manager, a debounce drainer, and a health monitor, all cancelled
/// together through one shutdown channel.
pub struct ChunkStreamer {
    manager: Arc<Mutex<RequestManager>>,
    refresh: Arc<Notify>,
    completion: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    handle: ConnectionHandle,
}

impl ChunkStreamer {
    pub fn start(world: Arc<World>, handle: ConnectionHandle, workers: usize) -> Self {
        let manager = Arc::new(Mutex::new(RequestManager::new(handle.player.chunk_pos())));
        let refresh = Arc::new(Notify::new());
        let completion = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = Vec::new();
        for worker_id in 0..workers {
            tasks.push(tokio::spawn(worker_loop(
                worker_id,
                world.clone(),
                handle.clone(),
                manager.clone(),
                refresh.clone(),
                completion.clone(),
                shutdown_rx.clone(),
            )));
        }
        tasks.push(tokio::spawn(drainer_loop(
            handle.clone(),
            manager.clone(),
            refresh.clone(),
            shutdown_rx.clone(),
        )));
        tasks.push(tokio::spawn(health_loop(
            manager.clone(),
            refresh.clone(),
            shutdown_rx,
        )));

        Self {
            manager,
            refresh,
            completion,
            shutdown_tx,
            tasks,
            handle,
        }
    }

    /// Record a new desired set; the drainer installs it after the debounce.
    pub fn update_desired(&self, desired: HashSet<ChunkPos>) {
        self.manager
            .lock()
            .update_desired_chunks(desired, Instant::now());
    }

    /// Install a desired set immediately (spawn batch path) and wake workers.
    pub fn desire_now(&self, desired: HashSet<ChunkPos>, center: ChunkPos) {
        let now = Instant::now();
        let mut loaded = self.handle.player.loaded_chunks.lock();
        let mut manager = self.manager.lock();
        manager.update_desired_chunks(desired, now);
        manager.process_updates_immediately(center, now, &mut loaded);
        drop(manager);
        drop(loaded);
        self.refresh.notify_waiters();
    }

    /// Block until every column of `batch` is in the player's loaded set, or
    /// the spawn wait bound expires. Returns whether the batch completed.
    pub async fn wait_for_loaded(&self, batch: &HashSet<ChunkPos>) -> bool {
        let deadline = Instant::now() + SPAWN_WAIT;
        loop {
            {
                let loaded = self.handle.player.loaded_chunks.lock();
                if batch.iter().all(|pos| loaded.contains(pos)) {
                    return true;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = tokio::time::timeout(
                (deadline - now).min(Duration::from_millis(100)),
                self.completion.notified(),
            )
            .await;
        }
    }

    /// Cancel workers, drainer and health monitor, joining each within the
    /// bounded wait.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.refresh.notify_waiters();
        for task in self.tasks {
            if tokio::time::timeout(JOIN_WAIT, task).await.is_err() {
                warn!("streamer task for {} did not stop in time", self.handle.name);
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    world: Arc<World>,
    handle: ConnectionHandle,
    manager: Arc<Mutex<RequestManager>>,
    refresh: Arc<Notify>,
    completion: Arc<Notify>,
    shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let next = manager.lock().next_queued(Instant::now());
        let Some(pos) = next else {
            // Nothing queued: sleep until a refresh or the next poll slot.
            let _ = tokio::time::timeout(IDLE_WAIT, refresh.notified()).await;
            continue;
        };

        if !manager.lock().is_desired(pos) {
            manager.lock().abandon(pos);
            continue;
        }

        let column = match world.store().get_or_create(pos) {
            Ok(column) => column,
            Err(e) => {
                warn!("worker {}: chunk {:?} generation failed: {}", worker_id, pos, e);
                manager.lock().abandon(pos);
                continue;
            }
        };

        let payload = match encode_column(&column.read()) {
            Ok(payload) => payload,
            Err(e) => {
                // Encoder invariant violation: drop the request, keep the
                // connection.
                error!("worker {}: chunk {:?} failed to encode: {}", worker_id, pos, e);
                manager.lock().abandon(pos);
                continue;
            }
        };

        // A cancellation that landed while encoding discards the result.
        if manager.lock().take_if_cancelled(pos) {
            debug!("worker {}: discarding cancelled chunk {:?}", worker_id, pos);
            continue;
        }

        handle.send(payload.into_packet(pos.x, pos.z));
        handle.player.loaded_chunks.lock().insert(pos);
        manager.lock().complete(pos);
        completion.notify_waiters();
    }
}

async fn drainer_loop(
    handle: ConnectionHandle,
    manager: Arc<Mutex<RequestManager>>,
    refresh: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(DRAIN_INTERVAL) => {
                let center = handle.player.chunk_pos();
                let installed = {
                    let mut loaded = handle.player.loaded_chunks.lock();
                    manager
                        .lock()
                        .process_pending_updates(center, Instant::now(), &mut loaded)
                };
                if installed {
                    refresh.notify_waiters();
                }
            }
        }
    }
}

async fn health_loop(
    manager: Arc<Mutex<RequestManager>>,
    refresh: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(HEALTH_INTERVAL) => {
                let requeued = manager.lock().requeue_stuck(Instant::now());
                if !requeued.is_empty() {
                    warn!("re-queued {} stuck chunk loads", requeued.len());
                    refresh.notify_waiters();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Player;
    use chisel_protocol_core::InternalPacket;
    use chisel_types::{GameProfile, Vec3d};
    use chisel_world::FlatGenerator;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn installed_manager(center: ChunkPos, radius: i32) -> (RequestManager, HashSet<ChunkPos>) {
        let mut manager = RequestManager::new(center);
        let mut loaded = HashSet::new();
        let now = Instant::now();
        manager.update_desired_chunks(view_square(center, radius), now);
        manager.process_updates_immediately(center, now, &mut loaded);
        (manager, loaded)
    }

    #[test]
    fn test_view_square_sizes() {
        assert_eq!(view_square(ChunkPos::new(0, 0), 10).len(), 441);
        assert_eq!(view_square(ChunkPos::new(0, 0), 1).len(), 9);
    }

    #[test]
    fn test_install_queues_all_additions() {
        let (manager, _) = installed_manager(ChunkPos::new(0, 0), 10);
        assert_eq!(manager.queued_count(), 441);
        assert_eq!(
            manager.request_state(ChunkPos::new(10, -10)),
            Some(RequestState::Queued)
        );
    }

    #[test]
    fn test_debounce_defers_install() {
        let mut manager = RequestManager::new(ChunkPos::new(0, 0));
        let mut loaded = HashSet::new();
        let start = Instant::now();
        manager.update_desired_chunks(view_square(ChunkPos::new(0, 0), 1), start);
        assert!(!manager.process_pending_updates(ChunkPos::new(0, 0), start, &mut loaded));
        assert!(!manager.process_pending_updates(
            ChunkPos::new(0, 0),
            start + Duration::from_millis(100),
            &mut loaded
        ));
        assert!(manager.process_pending_updates(
            ChunkPos::new(0, 0),
            start + DEBOUNCE_WINDOW,
            &mut loaded
        ));
        // Nothing pending afterwards.
        assert!(!manager.process_pending_updates(
            ChunkPos::new(0, 0),
            start + Duration::from_secs(1),
            &mut loaded
        ));
    }

    #[test]
    fn test_move_diff_adds_and_cancels() {
        let (mut manager, mut loaded) = installed_manager(ChunkPos::new(0, 0), 10);
        // Deliver everything.
        let now = Instant::now();
        while let Some(pos) = manager.next_queued(now) {
            loaded.insert(pos);
            manager.complete(pos);
        }
        assert_eq!(loaded.len(), 441);

        // Move five chunks east: 5 columns of 21 leave, 5 columns enter.
        let new_center = ChunkPos::new(5, 0);
        manager.update_desired_chunks(view_square(new_center, 10), now);
        manager.process_updates_immediately(new_center, now, &mut loaded);
        assert_eq!(loaded.len(), 441 - 105);
        assert_eq!(manager.queued_count(), 105);
        // Already-loaded overlap is not re-queued.
        assert_eq!(manager.request_state(ChunkPos::new(0, 0)), None);
        assert_eq!(
            manager.request_state(ChunkPos::new(15, 0)),
            Some(RequestState::Queued)
        );
    }

    #[test]
    fn test_cancel_loading_request_discards_result() {
        let (mut manager, mut loaded) = installed_manager(ChunkPos::new(0, 0), 1);
        let now = Instant::now();
        let pos = manager.next_queued(now).unwrap();
        assert_eq!(manager.request_state(pos), Some(RequestState::Loading));

        // Desired set moves far away while the worker is loading.
        manager.update_desired_chunks(view_square(ChunkPos::new(100, 100), 1), now);
        manager.process_updates_immediately(ChunkPos::new(100, 100), now, &mut loaded);
        assert_eq!(manager.request_state(pos), Some(RequestState::Cancelled));
        assert!(manager.take_if_cancelled(pos));
        assert_eq!(manager.request_state(pos), None);
    }

    #[test]
    fn test_nearest_first_ordering() {
        let (mut manager, _) = installed_manager(ChunkPos::new(0, 0), 2);
        let now = Instant::now();
        let first = manager.next_queued(now).unwrap();
        assert_eq!(first, ChunkPos::new(0, 0));
        let mut last_distance = 0;
        while let Some(pos) = manager.next_queued(now) {
            let distance = pos.chebyshev_distance(&ChunkPos::new(0, 0));
            assert!(distance >= last_distance, "queue order regressed");
            last_distance = distance;
            manager.complete(pos);
        }
        assert_eq!(last_distance, 2);
    }

    #[test]
    fn test_stuck_loading_requeues() {
        let (mut manager, _) = installed_manager(ChunkPos::new(0, 0), 1);
        let now = Instant::now();
        let pos = manager.next_queued(now).unwrap();
        // Not yet stuck.
        assert!(manager.requeue_stuck(now + Duration::from_secs(5)).is_empty());
        let requeued = manager.requeue_stuck(now + STUCK_TIMEOUT);
        assert_eq!(requeued, vec![pos]);
        assert_eq!(manager.request_state(pos), Some(RequestState::Queued));
    }

    #[tokio::test]
    async fn test_worker_pool_ships_spawn_batch() {
        let world = Arc::new(World::new(Arc::new(FlatGenerator::new())));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let uuid = Uuid::new_v4();
        let handle = ConnectionHandle {
            entity_id: 1,
            uuid,
            name: "tester".into(),
            sender: tx,
            player: Arc::new(Player::new(
                1,
                GameProfile {
                    uuid,
                    name: "tester".into(),
                    properties: Vec::new(),
                },
                Vec3d::new(0.0, 65.0, 0.0),
            )),
        };

        let streamer = ChunkStreamer::start(world, handle.clone(), 6);
        let batch = view_square(ChunkPos::new(0, 0), 1);
        streamer.desire_now(batch.clone(), ChunkPos::new(0, 0));
        assert!(streamer.wait_for_loaded(&batch).await, "spawn batch must complete");

        let mut shipped = HashSet::new();
        while let Ok(packet) = rx.try_recv() {
            match packet {
                InternalPacket::ChunkDataAndUpdateLight { chunk_x, chunk_z, .. } => {
                    assert!(
                        shipped.insert(ChunkPos::new(chunk_x, chunk_z)),
                        "column ({}, {}) shipped twice",
                        chunk_x,
                        chunk_z
                    );
                }
                other => panic!("unexpected packet from worker: {:?}", other),
            }
        }
        assert_eq!(shipped, batch);
        assert_eq!(*handle.player.loaded_chunks.lock(), batch);

        streamer.shutdown().await;
    }

    #[test]
    fn test_completion_is_exactly_once_per_enqueue() {
        let (mut manager, mut loaded) = installed_manager(ChunkPos::new(0, 0), 1);
        let now = Instant::now();
        let mut delivered = Vec::new();
        while let Some(pos) = manager.next_queued(now) {
            loaded.insert(pos);
            manager.complete(pos);
            delivered.push(pos);
        }
        assert_eq!(delivered.len(), 9);
        let unique: HashSet<_> = delivered.iter().collect();
        assert_eq!(unique.len(), 9, "no duplicate deliveries");

        // Re-installing the same set queues nothing new.
        manager.update_desired_chunks(view_square(ChunkPos::new(0, 0), 1), now);
        manager.process_updates_immediately(ChunkPos::new(0, 0), now, &mut loaded);
        assert_eq!(manager.queued_count(), 0);
    }
}
