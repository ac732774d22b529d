//! A durable, owned ship with two occupants run through the whole sequence
//! on virtual time.

use std::sync::Arc;
use std::time::Duration;

use drydock_common::Transform;
use drydock_kernel::{
    ComponentSlot, ContainmentType, Entity, EntityKind, EntitySpec, OptionBits, Station,
    StationIndex, World, WorldEvent, Zone, COMPONENT_ACTIVE,
};
use drydock_sched::{ManualScheduler, Scheduler};
use drydock_tasks::{DestroyConfig, DestroyShipTask, DeviceStore, Stage, TaskContext};
use glam::{Quat, Vec3};

const ZONE: &str = "space_tatooine";

struct Scenario {
    world: Arc<World>,
    sched: Arc<ManualScheduler>,
    ctx: Arc<TaskContext>,
    ship: Arc<Entity>,
    owner: Arc<Entity>,
    device: Arc<Entity>,
    pilot: Arc<Entity>,
    gunner: Arc<Entity>,
    turret: Arc<Entity>,
}

fn scenario(seed: u64) -> Scenario {
    let world = World::new();
    let stations = StationIndex::new(vec![
        Station::new("Mos Eisley Orbital", "neutral", Vec3::new(-2000.0, 500.0, 100.0)),
        Station::new("Imperial Outpost", "imperial", Vec3::new(10.0, 10.0, 10.0)),
    ]);
    world.add_zone(Zone::new(ZONE).with_lookup(Arc::new(stations)));
    world.add_zone(Zone::new("tatooine"));

    let owner = world
        .spawn(EntitySpec::new(EntityKind::Creature).in_zone(ZONE))
        .unwrap();
    let device = world
        .spawn(
            EntitySpec::new(EntityKind::ShipControlDevice)
                .persistence(1)
                .stored_at("tatooine", Vec3::new(3528.0, 5.0, -4804.0)),
        )
        .unwrap();
    let ship = world
        .spawn(
            EntitySpec::new(EntityKind::Ship)
                .in_zone(ZONE)
                .owned_by(owner.id())
                .persistence(1)
                .controlled_by(device.id())
                .with_options(OptionBits::WINGS_OPEN)
                .with_component(ComponentSlot::Booster, COMPONENT_ACTIVE)
                .with_transform(Transform {
                    position: Vec3::new(40.0, 40.0, 40.0),
                    rotation: Quat::from_rotation_y(0.75),
                }),
        )
        .unwrap();
    let turret = world
        .spawn(
            EntitySpec::new(EntityKind::Fixture)
                .in_zone(ZONE)
                .parented_to(ship.id(), ContainmentType::Contained)
                .with_transform(Transform {
                    position: Vec3::ZERO,
                    rotation: Quat::from_rotation_x(-0.3),
                }),
        )
        .unwrap();
    let pilot = world
        .spawn(
            EntitySpec::new(EntityKind::Creature)
                .in_zone(ZONE)
                .parented_to(ship.id(), ContainmentType::Onboard)
                .with_transform(Transform::at(Vec3::new(0.0, 1.0, 2.0))),
        )
        .unwrap();
    let gunner = world
        .spawn(
            EntitySpec::new(EntityKind::Creature)
                .in_zone(ZONE)
                .parented_to(turret.id(), ContainmentType::Slotted)
                .with_transform(Transform::at(Vec3::new(0.0, -1.0, 0.0))),
        )
        .unwrap();
    world.board(&ship, &pilot);
    world.board(&ship, &gunner);

    let sched = Arc::new(ManualScheduler::new());
    let scheduler: Arc<dyn Scheduler> = sched.clone();
    let ctx = TaskContext::new(
        scheduler,
        Arc::new(DeviceStore),
        DestroyConfig::default().with_seed(seed),
    );
    world.drain_events();
    world.drain_broadcasts();

    Scenario {
        world,
        sched,
        ctx,
        ship,
        owner,
        device,
        pilot,
        gunner,
        turret,
    }
}

impl Scenario {
    fn start(&self) {
        DestroyShipTask::start(self.world.weak(self.ship.id()), Arc::clone(&self.ctx));
    }

    fn zone_switches(&self) -> Vec<WorldEvent> {
        self.world
            .events()
            .into_iter()
            .filter(|e| matches!(e, WorldEvent::ZoneSwitched { .. }))
            .collect()
    }
}

#[test]
fn durable_owned_ship_is_relocated_with_its_crew() {
    let s = scenario(11);
    s.start();

    // Stage 0 runs immediately and asks to come back after the relocate delay.
    assert_eq!(s.sched.advance(Duration::ZERO), 1);
    {
        let ship = s.ship.lock();
        assert!(ship.has_option(OptionBits::DESTROYING));
        assert!(!ship.has_option(OptionBits::WINGS_OPEN));
        assert!(!ship.is_component_active(ComponentSlot::Booster));
    }
    let pending = s.sched.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].delay, Duration::from_millis(5000));
    assert!(s.world.events().contains(&WorldEvent::DespawnNotified {
        id: s.ship.id(),
        zone: ZONE.into()
    }));
    assert!(s.world.get_object(s.ship.id()).is_some());

    // Nothing else happens before the delay elapses.
    assert_eq!(s.sched.advance(Duration::from_millis(4999)), 0);
    assert_eq!(s.sched.advance(Duration::from_millis(1)), 1);

    {
        let ship = s.ship.lock();
        assert!(!ship.has_option(OptionBits::DESTROYING));
        assert_eq!(ship.rotation(), Quat::IDENTITY);
        let p = ship.position();
        // Near the neutral station, with y and z swapped.
        assert!((-2050.0..=-1950.0).contains(&p.x));
        assert_eq!(p.y, 100.0);
        assert!((450.0..=550.0).contains(&p.z));
    }

    let transfers = s.sched.pending();
    assert_eq!(transfers.len(), 2);
    for t in &transfers {
        assert!(t.delay >= Duration::from_millis(6000));
        assert!(t.delay < Duration::from_millis(8000));
    }
    assert!(s.zone_switches().is_empty());

    assert_eq!(s.sched.run_until_idle(), 2);
    assert!(s.sched.is_empty());
    assert_eq!(s.zone_switches().len(), 2);

    let pilot = s.pilot.lock();
    assert_eq!(pilot.rotation(), Quat::IDENTITY);
    assert_eq!(pilot.zone().unwrap().name(), ZONE);
    assert_eq!(pilot.position(), Vec3::new(0.0, 1.0, 2.0));
    assert_eq!(pilot.parent_id(), Some(s.ship.id()));
    drop(pilot);

    let gunner = s.gunner.lock();
    assert_eq!(gunner.rotation(), Quat::from_rotation_x(-0.3));
    assert_eq!(gunner.parent_id(), Some(s.turret.id()));
    assert_eq!(gunner.containment(), ContainmentType::Slotted);
}

#[test]
fn ship_lost_between_stages_stops_the_sequence() {
    let s = scenario(5);
    s.start();
    s.sched.advance(Duration::ZERO);
    {
        let mut ship = s.ship.lock();
        s.world.destroy_from_world(&mut ship);
    }
    s.world.drain_events();
    s.world.drain_broadcasts();

    assert_eq!(s.sched.run_until_idle(), 1);
    assert!(s.world.events().is_empty());
    assert!(s.world.broadcasts().is_empty());
    assert!(s.sched.is_empty());
}

#[test]
fn occupant_leaving_before_transfer_is_skipped() {
    let s = scenario(9);
    s.start();
    s.sched.advance(Duration::from_millis(5000));
    assert_eq!(s.sched.len(), 2);

    s.world.registry().remove(s.gunner.id());
    s.sched.run_until_idle();

    let switches = s.zone_switches();
    assert_eq!(switches.len(), 1);
    assert!(matches!(
        &switches[0],
        WorldEvent::ZoneSwitched { id, force_reconnect: false, .. } if *id == s.pilot.id()
    ));
}

#[test]
fn late_invocation_stores_the_ship_with_its_owner() {
    let s = scenario(2);
    let mut task =
        DestroyShipTask::new(s.world.weak(s.ship.id()), Arc::clone(&s.ctx)).at_stage(Stage::Finalize(2));
    task.run_stage().unwrap();

    assert!(s.world.get_object(s.ship.id()).is_none());
    assert!(s.world.is_persisted(s.ship.id()));
    assert_eq!(s.device.lock().stored_ship(), Some(s.ship.id()));
    assert!(s.world.events().contains(&WorldEvent::Stored {
        ship: s.ship.id(),
        device: s.device.id(),
        owner: s.owner.id(),
        zone: "tatooine".into(),
        position: Vec3::new(3528.0, 5.0, -4804.0),
    }));

    // Running it again finds nothing left to do.
    assert!(task.run_stage().unwrap_err().is_silent());
}

#[test]
fn same_seed_gives_same_timeline() {
    fn timeline(seed: u64) -> (Vec3, Vec<Duration>) {
        let s = scenario(seed);
        s.start();
        s.sched.advance(Duration::from_millis(5000));
        let delays = s.sched.pending().into_iter().map(|p| p.delay).collect();
        let position = s.ship.lock().position();
        (position, delays)
    }
    assert_eq!(timeline(77), timeline(77));
}
