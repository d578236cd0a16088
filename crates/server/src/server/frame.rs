//! Packs the most urgent deltas of a client's pool into one frame.

use bytes::Bytes;
use protocol::packets::FrameBuilder;

use crate::delta::ReplicationSession;
use crate::error::SessionError;
use crate::world::World;

/// What went into an assembled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub deltas: usize,
    pub bytes: usize,
    /// Deltas left queued because the budget ran out.
    pub deferred: usize,
}

/// Rates the pool of `client` and writes deltas in priority order until
/// the next one would exceed `budget` bytes. Included deltas are marked
/// sent. Returns `None` when there is nothing to send, except for the
/// client's first frame which always goes out.
pub fn assemble_frame(
    session: &mut ReplicationSession,
    world: &World,
    client: usize,
    budget: usize,
) -> Result<Option<(Bytes, FrameStats)>, SessionError> {
    session.rate_pool(world, client)?;
    let first = session.pool(client).is_some_and(|p| p.is_first());
    let ids = session.begin_frame(client)?;

    let mut builder = FrameBuilder::new(ids.set, ids.resend, first);
    let mut stats = FrameStats::default();
    while let Some(handle) = session.extract_highest_priority(client) {
        let Some(delta) = session.delta(client, handle) else {
            continue;
        };
        if !builder.try_push(delta, budget) {
            stats.deferred += 1;
            break;
        }
        session.mark_sent(client, handle, ids)?;
        stats.deltas += 1;
    }
    while session.extract_highest_priority(client).is_some() {
        stats.deferred += 1;
    }

    if builder.is_empty() && !first {
        return Ok(None);
    }
    let frame = builder.finish();
    stats.bytes = frame.len();
    Ok(Some((frame, stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PoolConfig;
    use crate::world::{MapBuilder, Mobj};
    use glam::Vec3;
    use protocol::packets::read_frame;
    use protocol::DeltaType;
    use std::sync::Arc;

    fn setup(mobjs: usize) -> (World, Arc<ManualClock>, ReplicationSession) {
        let mut world = MapBuilder::new(4, 4, 128.0).build(64.0).unwrap();
        let clock = Arc::new(ManualClock::new(1000));
        let mut session = ReplicationSession::new(&world, clock.clone(), PoolConfig::default());
        session.connect_client(1).unwrap();
        for i in 0..mobjs {
            world.spawn_mobj(Mobj::new(Vec3::new(20.0 + i as f32 * 8.0, 40.0, 0.0), 20.0, 20.0));
        }
        session.generate_frame_deltas(&world);
        (world, clock, session)
    }

    #[test]
    fn test_first_frame_sent_even_when_empty() {
        let (world, _clock, mut session) = setup(0);
        let (frame, stats) = assemble_frame(&mut session, &world, 1, 1400).unwrap().unwrap();
        assert_eq!(stats.deltas, 0);
        let (header, records) = read_frame(frame).unwrap();
        assert!(header.first);
        assert!(records.is_empty());
        assert!(assemble_frame(&mut session, &world, 1, 1400).unwrap().is_none());
    }

    #[test]
    fn test_frame_marks_deltas_sent() {
        let (world, _clock, mut session) = setup(3);
        let (frame, stats) = assemble_frame(&mut session, &world, 1, 1400).unwrap().unwrap();
        assert_eq!(stats.deltas, 3);
        assert_eq!(session.count_unacked_deltas(1), 3);
        let (header, records) = read_frame(frame).unwrap();
        assert_eq!(header.count, 3);
        assert!(records.iter().all(|r| r.delta_type == DeltaType::Mobj));

        session.ack_delta_set(1, header.set, false);
        assert_eq!(session.count_unacked_deltas(1), 0);
    }

    #[test]
    fn test_budget_defers_the_rest() {
        let (world, _clock, mut session) = setup(40);
        let (frame, stats) = assemble_frame(&mut session, &world, 1, 300).unwrap().unwrap();
        assert!(frame.len() <= 300);
        assert!(stats.deltas > 0);
        assert_eq!(stats.deltas + stats.deferred, 40);
        assert_eq!(session.pool(1).unwrap().len(), 40);
    }

    #[test]
    fn test_unconnected_client_is_an_error() {
        let (world, _clock, mut session) = setup(1);
        assert_eq!(
            assemble_frame(&mut session, &world, 2, 1400),
            Err(SessionError::NotConnected(2))
        );
    }
}
