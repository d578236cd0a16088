//! The replication session: both registers, every client's pool and the
//! per-tick generation pass that feeds them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use protocol::{
    Delta, DeltaPayload, MobjDdFlags, MobjFlags, PlayerFlags, SoundFlags, SoundSource, SoundState,
    ThingId, MAX_PLAYERS,
};
use tracing::{debug, info, trace, warn};

use super::compare::{compare_mobj, compare_player, compare_poly, compare_sector, compare_side, CompareClock};
use super::pool::{ClientPool, DeltaHandle, FrameIds, PoolContext};
use super::rating::{DeltaOrigins, OwnerInfo};
use super::register::{register_mobj, register_player, register_poly, WorldRegister};
use crate::clock::Clock;
use crate::config::PoolConfig;
use crate::error::SessionError;
use crate::world::World;

/// Every client slot.
pub const ALL_CLIENTS: u32 = (1 << MAX_PLAYERS) - 1;

/// Which sound origin of a sector emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorEmitter {
    Sector,
    Floor,
    Ceiling,
}

/// Where a sound comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundOrigin {
    World,
    Mobj(ThingId),
    Sector { index: u32, emitter: SectorEmitter },
    Poly(u32),
}

#[derive(Debug, Clone, Default)]
struct ClientSlot {
    connected: bool,
    ready: bool,
    ack_times: VecDeque<u32>,
}

/// The pools a generation pass writes into.
struct Targets<'a> {
    pools: &'a mut [ClientPool],
    targets: &'a [usize],
    ctx: PoolContext<'a>,
}

impl Targets<'_> {
    fn add(&mut self, delta: &Delta) {
        for &i in self.targets {
            self.pools[i].add_delta(delta, &self.ctx);
        }
    }
}

#[derive(Debug)]
pub struct ReplicationSession {
    clock: Arc<dyn Clock>,
    config: PoolConfig,
    world_register: WorldRegister,
    initial_register: WorldRegister,
    pools: Vec<ClientPool>,
    clients: Vec<ClientSlot>,
    origins: DeltaOrigins,
    side_owners: Vec<Option<u32>>,
    side_shift: u32,
}

impl ReplicationSession {
    /// A session for the map in `world`.
    pub fn new(world: &World, clock: Arc<dyn Clock>, config: PoolConfig) -> Self {
        let side_owners = world.side_owners();
        let gametic = clock.tic();
        let mut session = Self {
            world_register: WorldRegister::capture(world, &side_owners, false, gametic),
            initial_register: WorldRegister::capture(world, &side_owners, true, gametic),
            origins: DeltaOrigins::new(world, &side_owners),
            side_owners,
            pools: (0..MAX_PLAYERS).map(ClientPool::new).collect(),
            clients: vec![ClientSlot::default(); MAX_PLAYERS],
            side_shift: 0,
            clock,
            config,
        };
        session.init_pools(world);
        session
    }

    /// Registers a newly loaded map and resets every pool. Frame set
    /// numbers carry over.
    pub fn init_pools(&mut self, world: &World) {
        let start = Instant::now();
        for pool in &mut self.pools {
            pool.reset_for_map();
        }

        self.side_owners = world.side_owners();
        self.origins = DeltaOrigins::new(world, &self.side_owners);
        let gametic = self.clock.tic();
        self.world_register = WorldRegister::capture(world, &self.side_owners, false, gametic);
        self.initial_register = WorldRegister::capture(world, &self.side_owners, true, gametic);
        self.side_shift = 0;

        info!(
            "World registered: {} sectors, {} sides, {} polyobjs in {:.2?}",
            world.sectors.len(),
            world.sides.len(),
            world.polyobjs.len(),
            start.elapsed()
        );
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[inline]
    pub fn world_register(&self) -> &WorldRegister {
        &self.world_register
    }

    pub fn pool(&self, client: usize) -> Option<&ClientPool> {
        self.pools.get(client)
    }

    fn slot(&self, client: usize) -> Result<&ClientSlot, SessionError> {
        self.clients.get(client).ok_or(SessionError::ClientOutOfRange(client))
    }

    fn connected_pool(&mut self, client: usize) -> Result<&mut ClientPool, SessionError> {
        if !self.slot(client)?.connected {
            return Err(SessionError::NotConnected(client));
        }
        Ok(&mut self.pools[client])
    }

    pub fn is_connected(&self, client: usize) -> bool {
        self.clients.get(client).is_some_and(|c| c.connected)
    }

    pub fn connect_client(&mut self, client: usize) -> Result<(), SessionError> {
        self.slot(client)?;
        self.clients[client] = ClientSlot { connected: true, ..Default::default() };
        info!("Client {} connected", client);
        Ok(())
    }

    pub fn disconnect_client(&mut self, client: usize) -> Result<(), SessionError> {
        self.slot(client)?;
        self.pools[client].drain();
        self.clients[client] = ClientSlot::default();
        info!("Client {} disconnected", client);
        Ok(())
    }

    pub fn set_client_ready(&mut self, client: usize, ready: bool) -> Result<(), SessionError> {
        self.connected_pool(client)?;
        self.clients[client].ready = ready;
        info!("Client {} ready: {}", client, ready);
        Ok(())
    }

    /// Fills a joining client's pool with everything that differs from the
    /// map as loaded. The initial register is left as it is.
    pub fn init_pool_for_client(&mut self, world: &World, client: usize) -> Result<(), SessionError> {
        self.connected_pool(client)?.drain();
        self.generate_new_deltas(world, true, 1 << client, false);
        self.pools[client].set_first(true);
        debug!("Pool of client {} initialised with {} deltas", client, self.pools[client].len());
        Ok(())
    }

    /// Compares the world with the world register, adds the deltas to every
    /// connected pool and brings the register up to date.
    pub fn generate_frame_deltas(&mut self, world: &World) {
        self.generate_new_deltas(world, false, ALL_CLIENTS, true);
    }

    /// Pools of connected clients in `mask`.
    pub fn target_pools(&self, mask: u32) -> Vec<usize> {
        (0..MAX_PLAYERS)
            .filter(|&i| mask & (1 << i) != 0 && self.clients[i].connected)
            .collect()
    }

    /// Remote players that are in game and have told us they are ready.
    pub fn is_frame_target(&self, world: &World, client: usize) -> bool {
        let Some(player) = world.players.get(client) else {
            return false;
        };
        player.in_game && !player.local && self.clients[client].ready
    }

    /// Ack threshold of a client: a multiple of its average ack time.
    pub fn ack_threshold(&self, client: usize) -> u32 {
        let min = self.config.min_ack_threshold_ms;
        let Some(slot) = self.clients.get(client) else {
            return min;
        };
        if slot.ack_times.is_empty() {
            return min;
        }
        let sum: u64 = slot.ack_times.iter().map(|&t| u64::from(t)).sum();
        let average = (sum / slot.ack_times.len() as u64) as u32;
        average.saturating_mul(self.config.ack_threshold_multiplier).max(min)
    }

    fn generate_new_deltas(&mut self, world: &World, use_initial: bool, mask: u32, do_update: bool) {
        let now_ms = self.clock.now_ms();
        let clock = CompareClock { now_ms, tic: self.clock.tic() };
        let targets = self.target_pools(mask);
        for &i in &targets {
            let threshold = self.ack_threshold(i);
            self.pools[i].owner_info = OwnerInfo::of_player(world, i, threshold);
        }

        let Self {
            config,
            world_register,
            initial_register,
            pools,
            origins,
            side_owners,
            side_shift,
            ..
        } = self;
        let reg = if use_initial { initial_register } else { world_register };
        let mut out = Targets {
            pools,
            targets: &targets,
            ctx: PoolContext { world, origins: &*origins, config: &*config, now_ms },
        };

        new_player_deltas(reg, world, do_update, now_ms, &mut out);
        new_null_deltas(reg, world, do_update, now_ms, &mut out);
        new_mobj_deltas(reg, world, do_update, config, clock, &mut out);
        for i in 0..world.sectors.len() {
            if let Some(d) = compare_sector(reg, world, i, do_update, config, now_ms) {
                out.add(&d);
            }
        }
        new_side_deltas(reg, world, side_owners, side_shift, config, do_update, now_ms, &mut out);
        for i in 0..world.polyobjs.len() {
            if let Some(d) = compare_poly(reg, world, i, now_ms) {
                out.add(&d);
            }
            if do_update {
                reg.polys[i] = register_poly(&world.polyobjs[i]);
            }
        }

        if do_update {
            reg.gametic = clock.tic;
        }
    }

    /// Queues a sound start, or a stop when `volume <= 0`, for the clients
    /// in `client_mask`. Sounds need no register.
    pub fn new_sound_delta(
        &mut self,
        world: &World,
        sound_id: i32,
        origin: SoundOrigin,
        volume: f32,
        repeating: bool,
        client_mask: u32,
    ) {
        let mut flags = SoundFlags::VOLUME;
        if repeating {
            flags |= SoundFlags::REPEAT;
        }
        let (source, id, emitter) = match origin {
            SoundOrigin::World => (SoundSource::World, sound_id as u32, None),
            SoundOrigin::Mobj(mobj) => (SoundSource::Mobj, mobj, Some(mobj)),
            SoundOrigin::Sector { index, emitter } => {
                match emitter {
                    SectorEmitter::Floor => flags |= SoundFlags::FLOOR,
                    SectorEmitter::Ceiling => flags |= SoundFlags::CEILING,
                    SectorEmitter::Sector => {}
                }
                (SoundSource::Sector, index, None)
            }
            SoundOrigin::Poly(index) => (SoundSource::Poly, index, None),
        };
        let now_ms = self.clock.now_ms();
        let delta = Delta::new(
            id,
            now_ms,
            DeltaPayload::Sound { source, flags, sound: SoundState { sound_id, emitter, volume } },
        );

        let targets = self.target_pools(client_mask);
        let ctx = PoolContext { world, origins: &self.origins, config: &self.config, now_ms };
        for i in targets {
            self.pools[i].add_delta(&delta, &ctx);
        }
    }

    /// A mobj removed in a predictable way: the clients remove it on their
    /// own, so no null delta is generated and pending NEW deltas are moot.
    pub fn mobj_removed(&mut self, id: ThingId) {
        if self.world_register.remove_mobj(id).is_none() {
            return;
        }
        for (pool, client) in self.pools.iter_mut().zip(&self.clients) {
            if client.connected {
                pool.mobj_removed(id);
            }
        }
    }

    /// Forgets a player so a reconnect receives everything again.
    pub fn player_removed(&mut self, slot: usize) {
        self.world_register.remove_player(slot);
    }

    pub fn rate_pool(&mut self, world: &World, client: usize) -> Result<(), SessionError> {
        let now_ms = self.clock.now_ms();
        self.connected_pool(client)?;
        let ctx = PoolContext { world, origins: &self.origins, config: &self.config, now_ms };
        self.pools[client].rate(&ctx);
        Ok(())
    }

    pub fn extract_highest_priority(&mut self, client: usize) -> Option<DeltaHandle> {
        self.pools.get_mut(client)?.extract()
    }

    pub fn delta(&self, client: usize, handle: DeltaHandle) -> Option<&Delta> {
        self.pools.get(client)?.get(handle)
    }

    /// Ids of the next frame for `client`. The client's first frame is
    /// over once this is called.
    pub fn begin_frame(&mut self, client: usize) -> Result<FrameIds, SessionError> {
        let pool = self.connected_pool(client)?;
        let ids = pool.begin_frame();
        pool.set_first(false);
        Ok(ids)
    }

    pub fn mark_sent(&mut self, client: usize, handle: DeltaHandle, ids: FrameIds) -> Result<bool, SessionError> {
        let now_ms = self.clock.now_ms();
        Ok(self.connected_pool(client)?.mark_sent(handle, ids, now_ms))
    }

    /// Entry point for acknowledgements from the transport.
    pub fn ack_delta_set(&mut self, client: usize, set: u8, resent: bool) {
        let now_ms = self.clock.now_ms();
        let history = self.config.ack_history.max(1);
        let pool = match self.connected_pool(client) {
            Ok(pool) => pool,
            Err(err) => {
                warn!("Ignoring ack of set {}: {}", set, err);
                return;
            }
        };
        if let Some(age) = pool.ack_set(set, resent, now_ms) {
            let times = &mut self.clients[client].ack_times;
            times.push_back(age);
            while times.len() > history {
                times.pop_front();
            }
        }
    }

    pub fn count_unacked_deltas(&self, client: usize) -> usize {
        self.pools.get(client).map_or(0, ClientPool::count_unacked)
    }
}

fn new_player_deltas(reg: &mut WorldRegister, world: &World, do_update: bool, now_ms: u32, out: &mut Targets) {
    for slot in 0..MAX_PLAYERS {
        if !world.players[slot].in_game {
            continue;
        }
        if let Some(delta) = compare_player(reg, world, slot, now_ms) {
            // the new camera's viewer must get its full state
            if do_update && delta.payload.bits() & PlayerFlags::MOBJ.bits() != 0 {
                let old = reg.players[slot].mobj;
                if let Some(registered) = reg.find_mobj_mut(old) {
                    registered.reset();
                }
            }
            out.add(&delta);
        }
        if do_update {
            reg.players[slot] = register_player(world, slot);
        }
    }
}

/// Null deltas for registered mobjs that no longer exist. They carry the
/// last known state so the clients can place the removal.
fn new_null_deltas(reg: &mut WorldRegister, world: &World, do_update: bool, now_ms: u32, out: &mut Targets) {
    for id in reg.mobj_ids() {
        if world.is_used_id(id) {
            continue;
        }
        let Some(registered) = reg.find_mobj(id) else {
            continue;
        };
        trace!("New null delta for mobj {}", id);
        let null = Delta::new(
            id,
            now_ms,
            DeltaPayload::Mobj { flags: MobjFlags::NULL, mobj: registered.mobj },
        );
        out.add(&null);
        if do_update {
            reg.remove_mobj(id);
        }
    }
}

fn new_mobj_deltas(
    reg: &mut WorldRegister,
    world: &World,
    do_update: bool,
    config: &PoolConfig,
    clock: CompareClock,
    out: &mut Targets,
) {
    for mo in world.mobjs() {
        if mo.dd_flags.contains(MobjDdFlags::LOCAL) {
            continue;
        }
        let Some(delta) = compare_mobj(reg, mo, &world.states, config, clock) else {
            continue;
        };
        out.add(&delta);
        if do_update {
            reg.add_mobj(mo.id).mobj = register_mobj(mo);
        }
    }
}

/// Compares a rotating share of the sides. Comparisons against the initial
/// register cover them all.
#[allow(clippy::too_many_arguments)]
fn new_side_deltas(
    reg: &mut WorldRegister,
    world: &World,
    owners: &[Option<u32>],
    shift: &mut u32,
    config: &PoolConfig,
    do_update: bool,
    now_ms: u32,
    out: &mut Targets,
) {
    let count = world.sides.len();
    let range = if reg.is_initial() {
        0..count
    } else {
        let shifts = config.side_compare_shifts.max(1) as usize;
        let current = (*shift as usize) % shifts;
        *shift = ((current + 1) % shifts) as u32;
        current * count / shifts..(current + 1) * count / shifts
    };
    for i in range {
        if owners.get(i).copied().flatten().is_none() {
            continue;
        }
        if let Some(delta) = compare_side(reg, world, owners, i, do_update, now_ms) {
            out.add(&delta);
        }
    }
}
