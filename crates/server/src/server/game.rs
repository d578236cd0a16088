//! Headless demo world. Mobjs wander, missiles fly and expire, doors cycle,
//! lights flicker and an ambient sound comes and goes, so every delta kind
//! gets exercised.

use std::f64::consts::TAU;

use glam::{DVec3, Vec2, Vec3};
use protocol::delta::{PLANE_CEILING, PLANE_FLOOR};
use protocol::{MobjDdFlags, StateId, ThingId, MAX_PLAYERS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace};

use crate::config::{Config, SimulationConfig};
use crate::delta::{SectorEmitter, SoundOrigin};
use crate::error::MapError;
use crate::objlink::ObjlinkIndex;
use crate::world::{MapBuilder, Mobj, Player, StateDef, StateTable, World};

const SOUND_MISSILE: i32 = 1;
const SOUND_DOOR: i32 = 2;
const SOUND_WALL_HIT: i32 = 3;
const SOUND_AMBIENT: i32 = 10;

const WANDER_SPEED: f32 = 4.0;
const MISSILE_SPEED: f32 = 20.0;
const MISSILE_LIFE_TICKS: u32 = 35;
const DOOR_SPEED: f32 = 4.0;
const DOOR_CLOSED_GAP: f32 = 16.0;
const POLY_SPEED: f32 = 2.0;

/// Walking animation loop followed by a frame that never advances.
const STATE_WALK: StateId = StateId(0);
const STATE_MISSILE: StateId = StateId(3);

fn demo_states() -> StateTable {
    StateTable::new(vec![
        StateDef { tics: 4, next: Some(StateId(1)) },
        StateDef { tics: 4, next: Some(StateId(2)) },
        StateDef { tics: 4, next: Some(StateId(0)) },
        StateDef { tics: -1, next: None },
    ])
}

/// Binary angle of a direction in radians.
fn to_bam(theta: f64) -> u32 {
    (theta.rem_euclid(TAU) / TAU * 4_294_967_296.0) as u32
}

fn bam_dir(angle: u32) -> Vec3 {
    let theta = f64::from(angle) / 4_294_967_296.0 * TAU;
    Vec3::new(theta.cos() as f32, theta.sin() as f32, 0.0)
}

/// Something the replication layer must hear about besides the world diff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEvent {
    Sound {
        sound_id: i32,
        origin: SoundOrigin,
        /// 0 stops the sound.
        volume: f32,
        repeating: bool,
    },
    /// A mobj removed in a way every client predicts.
    MobjExpired(ThingId),
}

#[derive(Debug, Clone, Copy)]
struct Missile {
    id: ThingId,
    ticks_left: u32,
}

#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    pub world: World,
    pub objlink: ObjlinkIndex,
    rng: StdRng,
    tick: u64,
    walkers: Vec<ThingId>,
    missiles: Vec<Missile>,
    doors: Vec<u32>,
    doors_open: bool,
    flicker: Vec<u32>,
    ambient_on: bool,
    poly_out: bool,
}

impl Simulation {
    pub fn new(config: &Config) -> Result<Self, MapError> {
        let settings = &config.simulation;
        let seed = settings.seed.unwrap_or_else(|| rand::rng().random());
        let rng = StdRng::seed_from_u64(seed);

        let s = settings.sector_size;
        let width = f64::from(settings.grid_columns) * s;
        let height = f64::from(settings.grid_rows) * s;
        let mut builder = MapBuilder::new(settings.grid_columns, settings.grid_rows, s)
            .states(demo_states())
            .polyobj(Vec2::new((width / 2.0) as f32, (height / 2.0) as f32));
        for i in 0..4u32 {
            let x = width * (f64::from(i) + 0.5) / 4.0;
            builder = builder.lumobj(DVec3::new(x, height / 2.0, 64.0), s * 0.75, i % 2 == 0);
        }
        let world = builder.build(config.blockmap.cell_size)?;
        let objlink = ObjlinkIndex::new(&world, &config.objlink)?;

        let count = world.sectors.len() as u32;
        let doors = (0..count).filter(|i| i % 5 == 2).collect();
        let flicker = (0..count).filter(|i| i % 7 == 3).collect();

        let mut sim = Self {
            config: settings.clone(),
            world,
            objlink,
            rng,
            tick: 0,
            walkers: Vec::new(),
            missiles: Vec::new(),
            doors,
            doors_open: true,
            flicker,
            ambient_on: false,
            poly_out: false,
        };
        for _ in 0..sim.config.mobjs {
            let id = sim.spawn_walker(None);
            sim.walkers.push(id);
        }
        for slot in 0..sim.config.clients.min(MAX_PLAYERS) {
            sim.join_player(slot);
        }
        sim.objlink.rebuild(&sim.world);

        info!(
            "Demo map: {}x{} sectors, {} mobjs, seed {}",
            sim.config.grid_columns,
            sim.config.grid_rows,
            sim.world.mobj_count(),
            seed
        );
        Ok(sim)
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    #[inline]
    pub fn missile_count(&self) -> usize {
        self.missiles.len()
    }

    fn random_pos(&mut self) -> Vec3 {
        let b = self.world.bounds();
        let margin = 32.0;
        let x = self.rng.random_range(b.min_x + margin..b.max_x - margin);
        let y = self.rng.random_range(b.min_y + margin..b.max_y - margin);
        Vec3::new(x as f32, y as f32, 0.0)
    }

    fn spawn_walker(&mut self, player: Option<u8>) -> ThingId {
        let pos = self.random_pos();
        let mut mobj = Mobj::new(pos, 20.0, 56.0);
        mobj.player = player;
        mobj.angle = to_bam(self.rng.random_range(0.0..TAU));
        mobj.state = Some(STATE_WALK);
        mobj.tics = self.world.states.tics(mobj.state);
        self.world.spawn_mobj(mobj)
    }

    /// Puts a player in game with a camera mobj of their own.
    pub fn join_player(&mut self, slot: usize) {
        if slot >= MAX_PLAYERS || self.world.players[slot].in_game {
            return;
        }
        let id = self.spawn_walker(Some(slot as u8));
        self.walkers.push(id);
        self.world.players[slot] = Player { in_game: true, mobj: Some(id), ..Default::default() };
        debug!("Player {} joined with mobj {}", slot, id);
    }

    /// Takes a player out of the game and removes their mobj.
    pub fn leave_player(&mut self, slot: usize) {
        let Some(player) = self.world.players.get_mut(slot) else {
            return;
        };
        let mobj = player.mobj.take();
        *player = Player::default();
        if let Some(id) = mobj {
            self.walkers.retain(|&w| w != id);
            self.world.remove_mobj(id);
        }
    }

    /// Advances the world by one tick.
    pub fn tick(&mut self) -> Vec<SimEvent> {
        self.tick += 1;
        let mut events = Vec::new();

        self.move_walkers();
        self.update_players();
        self.move_missiles(&mut events);
        if self.rng.random_bool(self.config.missile_chance.clamp(0.0, 1.0)) {
            self.fire_missile(&mut events);
        }

        let period = self.config.door_period_ticks.max(1);
        if self.tick % period == 0 {
            self.toggle_doors(&mut events);
            self.poly_out = !self.poly_out;
        }
        self.move_planes();
        self.move_polys();
        self.flicker_lights();

        if self.rng.random_bool(self.config.sound_chance.clamp(0.0, 1.0)) {
            self.ambient_on = !self.ambient_on;
            events.push(SimEvent::Sound {
                sound_id: SOUND_AMBIENT,
                origin: SoundOrigin::World,
                volume: if self.ambient_on { 0.8 } else { 0.0 },
                repeating: self.ambient_on,
            });
        }

        self.objlink.rebuild(&self.world);
        events
    }

    fn move_walkers(&mut self) {
        let bounds = self.world.bounds();
        let states = self.world.states.clone();
        for i in 0..self.walkers.len() {
            let id = self.walkers[i];
            let turn = self.rng.random_bool(0.05);
            let new_angle = to_bam(self.rng.random_range(0.0..TAU));
            let Some(mo) = self.world.mobj_mut(id) else {
                continue;
            };
            if turn {
                mo.angle = new_angle;
            }
            mo.mom = bam_dir(mo.angle) * WANDER_SPEED;
            let mut pos = mo.pos + mo.mom;
            let r = f64::from(mo.radius);
            let (x, y) = (f64::from(pos.x), f64::from(pos.y));
            if x - r < bounds.min_x || x + r > bounds.max_x || y - r < bounds.min_y || y + r > bounds.max_y {
                // turn around at the outer walls
                mo.angle = mo.angle.wrapping_add(1 << 31);
                mo.mom = -mo.mom;
                pos = mo.pos;
            }
            advance_state(&states, mo);
            self.world.move_mobj(id, pos);
        }
    }

    fn update_players(&mut self) {
        for slot in 0..MAX_PLAYERS {
            let player = self.world.players[slot];
            let Some(id) = player.mobj.filter(|_| player.in_game) else {
                continue;
            };
            let moving = self.world.mobj(id).is_some_and(|mo| mo.mom != Vec3::ZERO);
            let p = &mut self.world.players[slot];
            p.forward_move = if moving { 25 } else { 0 };
            p.psprites[0].offset.y = ((self.tick % 16) as f32 - 8.0).abs();
        }
    }

    fn fire_missile(&mut self, events: &mut Vec<SimEvent>) {
        if self.walkers.is_empty() {
            return;
        }
        let shooter = self.walkers[self.rng.random_range(0..self.walkers.len())];
        let Some(mo) = self.world.mobj(shooter) else {
            return;
        };
        let dir = bam_dir(mo.angle);
        let mut missile = Mobj::new(mo.pos + dir * (mo.radius + 8.0) + Vec3::Z * 32.0, 6.0, 8.0);
        missile.angle = mo.angle;
        missile.mom = dir * MISSILE_SPEED;
        missile.dd_flags = MobjDdFlags::MISSILE;
        missile.state = Some(STATE_MISSILE);
        missile.tics = -1;
        let id = self.world.spawn_mobj(missile);
        self.missiles.push(Missile { id, ticks_left: MISSILE_LIFE_TICKS });
        trace!("Mobj {} fired missile {}", shooter, id);
        events.push(SimEvent::Sound {
            sound_id: SOUND_MISSILE,
            origin: SoundOrigin::Mobj(shooter),
            volume: 1.0,
            repeating: false,
        });
    }

    fn move_missiles(&mut self, events: &mut Vec<SimEvent>) {
        let bounds = self.world.bounds();
        let mut i = 0;
        while i < self.missiles.len() {
            let m = &mut self.missiles[i];
            m.ticks_left = m.ticks_left.saturating_sub(1);
            let (id, expired) = (m.id, m.ticks_left == 0);
            let next = self.world.mobj(id).map(|mo| mo.pos + mo.mom);
            let hit_wall = next.is_none_or(|p| !bounds.contains(f64::from(p.x), f64::from(p.y)));

            if hit_wall || expired {
                self.missiles.swap_remove(i);
                self.world.remove_mobj(id);
                if hit_wall {
                    // the null delta carries the impact position
                    events.push(SimEvent::Sound {
                        sound_id: SOUND_WALL_HIT,
                        origin: SoundOrigin::World,
                        volume: 0.6,
                        repeating: false,
                    });
                } else {
                    events.push(SimEvent::MobjExpired(id));
                }
                continue;
            }
            if let Some(pos) = next {
                self.world.move_mobj(id, pos);
            }
            i += 1;
        }
    }

    fn toggle_doors(&mut self, events: &mut Vec<SimEvent>) {
        self.doors_open = !self.doors_open;
        for &index in &self.doors {
            let Some(sector) = self.world.sectors.get_mut(index as usize) else {
                continue;
            };
            let floor = sector.planes[PLANE_FLOOR].height;
            let ceiling = &mut sector.planes[PLANE_CEILING];
            ceiling.target = if self.doors_open { floor + 128.0 } else { floor + DOOR_CLOSED_GAP };
            ceiling.speed = DOOR_SPEED;
            events.push(SimEvent::Sound {
                sound_id: SOUND_DOOR,
                origin: SoundOrigin::Sector { index, emitter: SectorEmitter::Ceiling },
                volume: 1.0,
                repeating: false,
            });
        }
        debug!("Doors {}", if self.doors_open { "opening" } else { "closing" });
    }

    fn move_planes(&mut self) {
        for sector in &mut self.world.sectors {
            for plane in &mut sector.planes {
                if plane.speed == 0.0 {
                    continue;
                }
                let gap = plane.target - plane.height;
                if gap.abs() <= plane.speed {
                    plane.height = plane.target;
                    plane.speed = 0.0;
                } else {
                    plane.height += plane.speed.copysign(gap);
                }
            }
        }
    }

    fn move_polys(&mut self) {
        let b = self.world.bounds();
        let home = Vec2::new((b.max_x / 2.0) as f32, (b.max_y / 2.0) as f32);
        let out = home + Vec2::new(64.0, 0.0);
        let poly_out = self.poly_out;
        for poly in &mut self.world.polyobjs {
            poly.dest = if poly_out { out } else { home };
            let gap = poly.dest - poly.pos;
            if gap.length() <= POLY_SPEED {
                poly.pos = poly.dest;
                poly.speed = 0.0;
            } else {
                poly.speed = POLY_SPEED;
                poly.pos += gap.normalize() * POLY_SPEED;
            }
        }
    }

    fn flicker_lights(&mut self) {
        for &index in &self.flicker {
            if !self.rng.random_bool(0.1) {
                continue;
            }
            let level = self.rng.random_range(0.4..1.0);
            if let Some(sector) = self.world.sectors.get_mut(index as usize) {
                sector.light_level = level;
            }
        }
    }
}

fn advance_state(states: &StateTable, mo: &mut Mobj) {
    if mo.tics <= 0 {
        return;
    }
    mo.tics -= 1;
    if mo.tics == 0 {
        mo.state = mo.state.and_then(|s| states.get(s)).and_then(|s| s.next);
        mo.tics = states.tics(mo.state);
    }
}
