//! Tick loop: advances the demo world, generates deltas and serves them to
//! loopback clients.

mod client;
mod frame;
mod game;

pub use client::LoopbackClient;
pub use frame::{assemble_frame, FrameStats};
pub use game::{SimEvent, Simulation};

use std::sync::Arc;
use std::time::Duration;

use protocol::packets::read_ack;
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::delta::{ReplicationSession, ALL_CLIENTS};

/// Totals of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub frames: usize,
    pub deltas: usize,
    pub bytes: usize,
    pub acks: usize,
}

/// Everything the tick loop owns.
#[derive(Debug)]
pub struct ServerState {
    pub config: Config,
    pub sim: Simulation,
    pub session: ReplicationSession,
    pub clients: Vec<LoopbackClient>,
    /// Smoothed tick duration in milliseconds.
    pub update_time_avg: f64,
    pub bytes_sent: u64,
}

impl ServerState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let sim = Simulation::new(&config)?;
        let session = ReplicationSession::new(&sim.world, clock, config.pool.clone());
        let mut state = Self {
            clients: Vec::new(),
            update_time_avg: 0.0,
            bytes_sent: 0,
            sim,
            session,
            config,
        };
        let count = state
            .config
            .simulation
            .clients
            .min(state.config.server.max_clients)
            .min(protocol::MAX_PLAYERS);
        for slot in 0..count {
            state.connect(slot)?;
        }
        Ok(state)
    }

    /// Brings a loopback client into the game and fills its pool.
    pub fn connect(&mut self, slot: usize) -> anyhow::Result<()> {
        self.sim.join_player(slot);
        self.session.connect_client(slot)?;
        self.session.init_pool_for_client(&self.sim.world, slot)?;
        self.session.set_client_ready(slot, true)?;
        let latency = u64::from(self.config.simulation.client_latency_ticks);
        self.clients.retain(|c| c.slot != slot);
        self.clients.push(LoopbackClient::new(slot, latency));
        Ok(())
    }

    pub fn disconnect(&mut self, slot: usize) -> anyhow::Result<()> {
        self.session.disconnect_client(slot)?;
        self.session.player_removed(slot);
        self.sim.leave_player(slot);
        self.clients.retain(|c| c.slot != slot);
        Ok(())
    }

    /// One simulation and replication step.
    pub fn tick(&mut self) -> anyhow::Result<TickStats> {
        let mut stats = TickStats::default();

        for event in self.sim.tick() {
            match event {
                SimEvent::Sound { sound_id, origin, volume, repeating } => {
                    self.session.new_sound_delta(
                        &self.sim.world,
                        sound_id,
                        origin,
                        volume,
                        repeating,
                        ALL_CLIENTS,
                    );
                }
                SimEvent::MobjExpired(id) => self.session.mobj_removed(id),
            }
        }
        self.session.generate_frame_deltas(&self.sim.world);

        let tick = self.sim.tick_count();
        let budget = self.config.server.frame_budget_bytes;
        for client in &mut self.clients {
            if !self.session.is_frame_target(&self.sim.world, client.slot) {
                continue;
            }
            let Some((frame, frame_stats)) =
                assemble_frame(&mut self.session, &self.sim.world, client.slot, budget)?
            else {
                continue;
            };
            stats.frames += 1;
            stats.deltas += frame_stats.deltas;
            stats.bytes += frame_stats.bytes;
            client.receive(tick, frame);
        }

        for client in &mut self.clients {
            for ack in client.poll_acks(tick)? {
                let (id, resent) = read_ack(ack)?;
                self.session.ack_delta_set(client.slot, id, resent);
                stats.acks += 1;
            }
        }

        self.bytes_sent += stats.bytes as u64;
        Ok(stats)
    }

    fn log_pool_stats(&self) {
        for client in &self.clients {
            let Some(pool) = self.session.pool(client.slot) else {
                continue;
            };
            let counts = pool.counts();
            debug!(
                "Client {}: {} pending, {} unacked, {} queued, {} missiles on record, {} frames acked",
                client.slot,
                counts.new,
                counts.unacked,
                counts.queued,
                pool.missiles().len(),
                client.frames_received
            );
        }
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        "Tick {}ms, frame budget {} bytes, {} clients",
        config.server.tick_interval_ms,
        config.server.frame_budget_bytes,
        config.simulation.clients
    );
    let tick_interval = config.server.tick_interval_ms;
    let state = Arc::new(RwLock::new(ServerState::new(config)?));

    let loop_state = Arc::clone(&state);
    let game_loop = tokio::spawn(async move { run_tick_loop(loop_state, tick_interval).await });

    tokio::select! {
        res = game_loop => res??,
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Shutting down");
        }
    }

    let state = state.read().await;
    info!(
        "Ran {} ticks, sent {} bytes",
        state.sim.tick_count(),
        state.bytes_sent
    );
    Ok(())
}

pub async fn run_tick_loop(state: Arc<RwLock<ServerState>>, tick_interval_ms: u64) -> anyhow::Result<()> {
    let start = Instant::now() + Duration::from_millis(tick_interval_ms);
    let mut ticker = interval_at(start, Duration::from_millis(tick_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let mut server = state.write().await;
        let tick_start = std::time::Instant::now();
        let stats = server.tick()?;
        let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;
        server.update_time_avg = server.update_time_avg * 0.5 + tick_ms * 0.5;

        let tick_budget = tick_interval_ms as f64 * 0.9;
        let tick = server.sim.tick_count();
        if tick_ms > tick_budget {
            warn!(
                "Slow tick #{}: {:.3}ms (budget: {:.1}ms) - {} mobjs, {} contacts",
                tick,
                tick_ms,
                tick_budget,
                server.sim.world.mobj_count(),
                server.sim.objlink.contact_count()
            );
        }

        let interval = server.config.server.stats_interval_ticks.max(1);
        if tick % interval == 0 {
            debug!(
                "Tick #{}: {} frames, {} deltas, {} bytes, {} acks, avg {:.3}ms",
                tick, stats.frames, stats.deltas, stats.bytes, stats.acks, server.update_time_avg
            );
            server.log_pool_stats();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn config() -> Config {
        let mut config = Config::default();
        config.simulation.grid_columns = 4;
        config.simulation.grid_rows = 4;
        config.simulation.mobjs = 10;
        config.simulation.clients = 2;
        config.simulation.client_latency_ticks = 2;
        config.simulation.seed = Some(11);
        config
    }

    fn run_ticks(state: &mut ServerState, clock: &ManualClock, n: usize) -> Vec<TickStats> {
        (0..n)
            .map(|_| {
                clock.advance(28);
                state.tick().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_clients_receive_and_ack() {
        let clock = Arc::new(ManualClock::new(0));
        let mut state = ServerState::with_clock(config(), clock.clone()).unwrap();
        assert!(state.session.is_connected(0));
        assert!(state.session.is_connected(1));

        let stats = run_ticks(&mut state, &clock, 40);
        assert!(stats[0].frames == 2);
        assert!(stats.iter().map(|s| s.acks).sum::<usize>() > 0);
        for client in &state.clients {
            assert!(client.frames_received > 0);
            assert!(client.deltas_received > 0);
        }
    }

    #[test]
    fn test_frames_respect_budget() {
        let mut cfg = config();
        cfg.server.frame_budget_bytes = 200;
        let clock = Arc::new(ManualClock::new(0));
        let mut state = ServerState::with_clock(cfg, clock.clone()).unwrap();
        for stats in run_ticks(&mut state, &clock, 10) {
            assert!(stats.bytes <= 200 * stats.frames);
        }
    }

    #[test]
    fn test_disconnect_drains_pool() {
        let clock = Arc::new(ManualClock::new(0));
        let mut state = ServerState::with_clock(config(), clock.clone()).unwrap();
        run_ticks(&mut state, &clock, 5);
        state.disconnect(1).unwrap();
        assert!(!state.session.is_connected(1));
        assert!(state.session.pool(1).unwrap().is_empty());
        assert_eq!(state.clients.len(), 1);
        assert!(!state.sim.world.players[1].in_game);

        run_ticks(&mut state, &clock, 5);
        assert!(state.session.pool(1).unwrap().is_empty());
    }

    #[test]
    fn test_reconnect_starts_with_first_frame() {
        let clock = Arc::new(ManualClock::new(0));
        let mut state = ServerState::with_clock(config(), clock.clone()).unwrap();
        run_ticks(&mut state, &clock, 5);
        state.disconnect(1).unwrap();
        state.connect(1).unwrap();
        let pool = state.session.pool(1).unwrap();
        assert!(pool.is_first());
        assert!(!pool.is_empty());
    }
}
