//! Collaborators shared by every task of a destruction sequence.

use std::sync::Arc;
use std::time::Duration;

use drydock_sched::Scheduler;
use glam::Vec3;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::config::DestroyConfig;
use crate::store::ShipStore;

/// Scheduler, store delegate, config and the random source for cosmetic and
/// load-spreading draws.
pub struct TaskContext {
    scheduler: Arc<dyn Scheduler>,
    store: Arc<dyn ShipStore>,
    config: DestroyConfig,
    rng: Mutex<Pcg64Mcg>,
}

impl TaskContext {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn ShipStore>,
        config: DestroyConfig,
    ) -> Arc<Self> {
        let rng = match config.seed {
            Some(seed) => Pcg64Mcg::seed_from_u64(seed),
            None => Pcg64Mcg::from_entropy(),
        };
        Arc::new(Self {
            scheduler,
            store,
            config,
            rng: Mutex::new(rng),
        })
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    pub fn store(&self) -> &dyn ShipStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &DestroyConfig {
        &self.config
    }

    /// Cosmetic intensity of the destruction effect, in `[0, 1]`.
    pub fn severity(&self) -> f32 {
        let steps = self.config.severity_steps.max(1);
        let roll = self.rng.lock().gen_range(0..=steps);
        roll as f32 / steps as f32
    }

    /// Planar offset around a station: x and y in `[-r, r]`, z zero.
    pub fn station_offset(&self) -> Vec3 {
        // Widened so that `i32::MIN` has a magnitude.
        let r = i64::from(self.config.station_offset.unsigned_abs());
        let mut rng = self.rng.lock();
        let x = rng.gen_range(-r..=r) as f32;
        let y = rng.gen_range(-r..=r) as f32;
        Vec3::new(x, y, 0.0)
    }

    /// Base transfer delay plus jitter in `[0, jitter)`, saturating.
    pub fn transfer_delay(&self) -> Duration {
        let jitter = match self.config.transfer_jitter_ms {
            0 => 0,
            max => self.rng.lock().gen_range(0..max),
        };
        Duration::from_millis(self.config.transfer_delay_ms.saturating_add(jitter))
    }
}
