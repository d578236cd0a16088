//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use protocol::DeltaType;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub objlink: ObjlinkConfig,
    #[serde(default)]
    pub blockmap: BlockmapConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load configuration from `path`, writing the defaults there if missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No {} found, creating default config", path.display());
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }
}

/// Tick loop and transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Number of client slots in use (at most `MAX_PLAYERS`).
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Byte budget of one transmitted frame.
    #[serde(default = "default_frame_budget")]
    pub frame_budget_bytes: usize,
    /// Ticks between pool statistics log lines.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_ticks: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            max_clients: default_max_clients(),
            frame_budget_bytes: default_frame_budget(),
            stats_interval_ticks: default_stats_interval(),
        }
    }
}

fn default_tick_interval() -> u64 {
    28
}
fn default_max_clients() -> usize {
    protocol::MAX_PLAYERS
}
fn default_frame_budget() -> usize {
    1400
}
fn default_stats_interval() -> u64 {
    175
}

/// Delta generation and scheduling tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// A moving plane only gets a height correction beyond this difference.
    #[serde(default = "default_plane_skip_limit")]
    pub plane_skip_limit: f32,
    /// Minimum tics between periodic resends of a changing mobj state.
    #[serde(default = "default_state_resend_base")]
    pub state_resend_base_tics: u32,
    /// Modulus of the per-id phase added to the resend interval.
    #[serde(default = "default_state_resend_phase")]
    pub state_resend_phase_tics: u32,
    /// The live register compares 1/N of the sides per pass.
    #[serde(default = "default_side_compare_shifts")]
    pub side_compare_shifts: u32,
    /// Audible distance of a full-volume sound.
    #[serde(default = "default_sound_max_distance")]
    pub sound_max_distance: f32,
    /// Seconds for a pending delta's age bonus to double its score.
    #[serde(default = "default_age_score_double")]
    pub age_score_double_secs: f32,
    /// Ack threshold as a multiple of the average ack time.
    #[serde(default = "default_ack_multiplier")]
    pub ack_threshold_multiplier: u32,
    /// Lower bound of the ack threshold.
    #[serde(default = "default_min_ack_threshold")]
    pub min_ack_threshold_ms: u32,
    /// Number of recent ack times averaged.
    #[serde(default = "default_ack_history")]
    pub ack_history: usize,
    #[serde(default)]
    pub base_scores: BaseScores,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            plane_skip_limit: default_plane_skip_limit(),
            state_resend_base_tics: default_state_resend_base(),
            state_resend_phase_tics: default_state_resend_phase(),
            side_compare_shifts: default_side_compare_shifts(),
            sound_max_distance: default_sound_max_distance(),
            age_score_double_secs: default_age_score_double(),
            ack_threshold_multiplier: default_ack_multiplier(),
            min_ack_threshold_ms: default_min_ack_threshold(),
            ack_history: default_ack_history(),
            base_scores: BaseScores::default(),
        }
    }
}

fn default_plane_skip_limit() -> f32 {
    40.0
}
fn default_state_resend_base() -> u32 {
    60
}
fn default_state_resend_phase() -> u32 {
    35
}
fn default_side_compare_shifts() -> u32 {
    2
}
fn default_sound_max_distance() -> f32 {
    2025.0
}
fn default_age_score_double() -> f32 {
    1.0
}
fn default_ack_multiplier() -> u32 {
    3
}
fn default_min_ack_threshold() -> u32 {
    50
}
fn default_ack_history() -> usize {
    8
}

/// Base priority score of each delta type.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BaseScores {
    #[serde(default = "default_score_1000")]
    pub mobj: f32,
    #[serde(default = "default_score_1000")]
    pub player: f32,
    #[serde(default = "default_score_2000")]
    pub sector: f32,
    #[serde(default = "default_score_800")]
    pub side: f32,
    #[serde(default = "default_score_2000")]
    pub poly: f32,
    #[serde(default = "default_score_2000")]
    pub sound: f32,
    #[serde(default = "default_score_3000")]
    pub mobj_sound: f32,
    #[serde(default = "default_score_5000")]
    pub sector_sound: f32,
    #[serde(default = "default_score_5000")]
    pub poly_sound: f32,
}

impl BaseScores {
    #[inline]
    pub fn get(&self, t: DeltaType) -> f32 {
        match t {
            DeltaType::Mobj => self.mobj,
            DeltaType::Player => self.player,
            DeltaType::Sector => self.sector,
            DeltaType::Side => self.side,
            DeltaType::Poly => self.poly,
            DeltaType::Sound => self.sound,
            DeltaType::MobjSound => self.mobj_sound,
            DeltaType::SectorSound => self.sector_sound,
            DeltaType::PolySound => self.poly_sound,
        }
    }
}

impl Default for BaseScores {
    fn default() -> Self {
        Self {
            mobj: 1000.0,
            player: 1000.0,
            sector: 2000.0,
            side: 800.0,
            poly: 2000.0,
            sound: 2000.0,
            mobj_sound: 3000.0,
            sector_sound: 5000.0,
            poly_sound: 5000.0,
        }
    }
}

fn default_score_800() -> f32 {
    800.0
}
fn default_score_1000() -> f32 {
    1000.0
}
fn default_score_2000() -> f32 {
    2000.0
}
fn default_score_3000() -> f32 {
    3000.0
}
fn default_score_5000() -> f32 {
    5000.0
}

/// Object-link blockmap settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjlinkConfig {
    /// Block edge length in map units.
    #[serde(default = "default_objlink_block")]
    pub block_size: f64,
    /// Factor applied to the radius in the edge distance test.
    #[serde(default = "default_radius_shrink")]
    pub radius_shrink: f64,
    /// Largest visual radius of a mobj.
    #[serde(default = "default_mobj_radius_max")]
    pub mobj_radius_max: f64,
}

impl Default for ObjlinkConfig {
    fn default() -> Self {
        Self {
            block_size: default_objlink_block(),
            radius_shrink: default_radius_shrink(),
            mobj_radius_max: default_mobj_radius_max(),
        }
    }
}

fn default_objlink_block() -> f64 {
    128.0
}
fn default_radius_shrink() -> f64 {
    0.98
}
fn default_mobj_radius_max() -> f64 {
    32.0
}

/// The world's mobj blockmap.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockmapConfig {
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
}

impl Default for BlockmapConfig {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
        }
    }
}

fn default_cell_size() -> f64 {
    128.0
}

/// Headless demo simulation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "default_grid_dim")]
    pub grid_columns: u32,
    #[serde(default = "default_grid_dim")]
    pub grid_rows: u32,
    /// Edge length of one sector.
    #[serde(default = "default_sector_size")]
    pub sector_size: f64,
    /// Wandering mobjs spawned at start.
    #[serde(default = "default_mobjs")]
    pub mobjs: usize,
    /// Loopback clients.
    #[serde(default = "default_clients")]
    pub clients: usize,
    /// Ticks before a loopback client acks a frame.
    #[serde(default = "default_latency")]
    pub client_latency_ticks: u32,
    /// Per-tick chance of a missile being fired.
    #[serde(default = "default_missile_chance")]
    pub missile_chance: f64,
    /// Per-tick chance of a sound being started or stopped.
    #[serde(default = "default_sound_chance")]
    pub sound_chance: f64,
    /// Ticks between door toggles.
    #[serde(default = "default_door_period")]
    pub door_period_ticks: u64,
    /// RNG seed; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid_columns: default_grid_dim(),
            grid_rows: default_grid_dim(),
            sector_size: default_sector_size(),
            mobjs: default_mobjs(),
            clients: default_clients(),
            client_latency_ticks: default_latency(),
            missile_chance: default_missile_chance(),
            sound_chance: default_sound_chance(),
            door_period_ticks: default_door_period(),
            seed: None,
        }
    }
}

fn default_grid_dim() -> u32 {
    8
}
fn default_sector_size() -> f64 {
    256.0
}
fn default_mobjs() -> usize {
    48
}
fn default_clients() -> usize {
    4
}
fn default_latency() -> u32 {
    3
}
fn default_missile_chance() -> f64 {
    0.05
}
fn default_sound_chance() -> f64 {
    0.02
}
fn default_door_period() -> u64 {
    140
}
